use serde::{Deserialize, Serialize};

/// Progress against a plan's step list, inferred from inline markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    /// 1-based index of the highest step reached.
    pub current: usize,
    pub total: usize,
}

/// A progressively-complete view of the document being streamed.
///
/// Always the whole cleaned document so far, never a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSnapshot {
    pub code: String,
    /// 0 for the first snapshot of a stream.
    pub sequence: usize,
    pub step: Option<StepProgress>,
}

/// Output of one component worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricatedComponent {
    pub name: String,
    pub code: String,
    /// Set when `code` is a failure placeholder rather than real output.
    pub failed: bool,
}

impl FabricatedComponent {
    #[must_use]
    pub fn success(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            failed: false,
        }
    }

    /// Clearly marked placeholder for a worker that produced nothing usable.
    ///
    /// `name` comes from model output, so it is scrubbed for the comment and
    /// escaped for the attribute and text it lands in.
    #[must_use]
    pub fn failure(name: &str, reason: &str) -> Self {
        let comment_name = comment_safe(name);
        let reason = comment_safe(reason);
        let html_name = escape_html(name);
        Self {
            name: name.to_string(),
            code: format!(
                "<!-- FABRICATION FAILED: {comment_name}: {reason} -->\n\
                 <div data-fabrication-failed=\"{html_name}\" class=\"p-4 border border-dashed border-red-400 text-red-600\">\
                 Component {html_name} could not be generated.</div>"
            ),
            failed: true,
        }
    }
}

/// Break up every `--` so the text cannot end an HTML comment.
fn comment_safe(text: &str) -> String {
    let mut text = text.to_string();
    // one pass leaves a pair behind in runs of three or more dashes
    while text.contains("--") {
        text = text.replace("--", "- -");
    }
    text
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Marker prefix that identifies a failure placeholder in assembled output.
pub const FABRICATION_FAILED_MARKER: &str = "FABRICATION FAILED:";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_placeholder_is_tagged_with_name() {
        let component = FabricatedComponent::failure("PriceTable", "timeout -- retry later");
        assert!(component.failed);
        assert!(component.code.contains(FABRICATION_FAILED_MARKER));
        assert!(component.code.contains("data-fabrication-failed=\"PriceTable\""));
        // "--" would terminate the HTML comment early
        assert!(!component.code.contains("timeout -- retry"));
    }

    #[test]
    fn test_dash_runs_cannot_close_the_comment() {
        let component = FabricatedComponent::failure("Nav", "bad ---> input");
        let (comment, rest) = component.code.split_once("-->").unwrap();
        assert!(comment.contains("bad - - ->"));
        assert!(rest.starts_with("\n<div"));
    }

    #[test]
    fn test_hostile_name_stays_inside_comment_and_attribute() {
        let component = FabricatedComponent::failure("Bad-->\"Name<b>", "timeout");
        assert_eq!(component.name, "Bad-->\"Name<b>");

        let (comment, rest) = component.code.split_once("-->").unwrap();
        assert!(comment.contains("FABRICATION FAILED: Bad- ->"));
        assert!(rest.starts_with(
            "\n<div data-fabrication-failed=\"Bad--&gt;&quot;Name&lt;b&gt;\" class="
        ));
        assert!(rest.contains("Component Bad--&gt;&quot;Name&lt;b&gt; could not"));
    }
}
