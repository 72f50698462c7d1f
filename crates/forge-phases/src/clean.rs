//! Cleaning of model code output and inline progress markers.

use once_cell::sync::Lazy;
use regex::Regex;

use forge_phase_api::StepProgress;

static STEP_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"STEP:(\d+)").expect("step marker regex is valid"));

/// Strip enclosing Markdown code fences from (possibly partial) model output.
///
/// Safe to call on every prefix of a stream: a fence that has not been closed
/// yet keeps its body, and a closing fence cut off after one or two backticks
/// is dropped rather than leaking into the document.
#[must_use]
pub fn clean_code(raw: &str) -> String {
    let mut text = raw.trim();
    let fenced = text.starts_with("```") || (!text.is_empty() && "```".starts_with(text));

    if fenced {
        match text.find('\n') {
            Some(newline) => text = &text[newline + 1..],
            // only the fence header has arrived so far
            None => return String::new(),
        }
    }

    let text = text.trim_end();
    let body = match text.rfind('\n') {
        Some(newline) if is_fence_fragment(&text[newline + 1..]) => &text[..newline],
        None if fenced && is_fence_fragment(text) => "",
        _ => text.strip_suffix("```").unwrap_or(text),
    };

    body.trim().to_string()
}

fn is_fence_fragment(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.len() <= 3 && line.chars().all(|c| c == '`')
}

/// Highest `STEP:n` marker in `code`, clamped to `total`.
///
/// Returns `None` when there are no steps to report against or no marker
/// has appeared yet.
#[must_use]
pub fn scan_steps(code: &str, total: usize) -> Option<StepProgress> {
    if total == 0 {
        return None;
    }
    let highest = STEP_MARKER
        .captures_iter(code)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .filter(|n| *n > 0)
        .max()?;
    Some(StepProgress {
        current: highest.min(total),
        total,
    })
}
