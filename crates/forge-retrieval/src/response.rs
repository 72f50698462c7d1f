use serde_json::Value;

/// Normalize a retrieval endpoint response into a list of text snippets.
///
/// Accepted shapes:
/// - `{"documents": ["...", ...]}` (one level of nesting is flattened)
/// - `{"results": [{"text": "..."} | {"page_content": "..."} | "...", ...]}`
/// - `{"text": "..."}`
///
/// Returns `None` when none of the shapes match. Blank snippets are dropped.
pub(crate) fn extract_snippets(body: &Value) -> Option<Vec<String>> {
    let snippets: Vec<String> = if let Some(documents) = body.get("documents").and_then(Value::as_array) {
        documents
            .iter()
            .flat_map(|doc| match doc {
                Value::Array(inner) => inner.iter().filter_map(as_text).collect::<Vec<_>>(),
                other => as_text(other).into_iter().collect(),
            })
            .collect()
    } else if let Some(results) = body.get("results").and_then(Value::as_array) {
        results
            .iter()
            .filter_map(|result| match result {
                Value::Object(obj) => obj
                    .get("text")
                    .or_else(|| obj.get("page_content"))
                    .or_else(|| obj.get("content"))
                    .and_then(as_text),
                other => as_text(other),
            })
            .collect()
    } else if let Some(text) = body.get("text").and_then(as_text) {
        vec![text]
    } else {
        return None;
    };

    Some(
        snippets
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect(),
    )
}

fn as_text(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Join snippets into one annotated context block.
pub(crate) fn annotate(collection: &str, snippets: &[String]) -> String {
    let mut block = format!("[Retrieved knowledge: {collection}]");
    for (index, snippet) in snippets.iter().enumerate() {
        block.push_str(&format!("\n--- snippet {} ---\n{}", index + 1, snippet.trim()));
    }
    block
}
