//! Code-block extraction from model responses.
//!
//! Chat-style models wrap code in Markdown fences, sometimes with prose
//! around them. [`extract_code_block`] pulls out the first fenced body so
//! that [`reconcile`](crate::reconcile()) only ever sees code.

use crate::reconcile::{reconcile_detailed, Reconciliation};

const FENCE: &str = "```";

/// Return the body of the first fenced code block in `response`.
///
/// The opening fence may carry a language tag (```` ```rust ````). A fence
/// that is never closed runs to the end of the response. Without any fence
/// the response is returned with leading and trailing blank lines removed.
pub fn extract_code_block(response: &str) -> String {
    let lines: Vec<&str> = response.split('\n').collect();

    let Some(open) = lines
        .iter()
        .position(|line| line.trim_start().starts_with(FENCE))
    else {
        return trim_blank_lines(&lines).join("\n");
    };

    let body = &lines[open + 1..];
    let close = body
        .iter()
        .position(|line| line.trim() == FENCE)
        .unwrap_or(body.len());

    body[..close].join("\n")
}

/// Extract the code block from a raw model response, then reconcile it
/// against the document region it targets.
pub fn reconcile_response(
    document_text: &str,
    response: &str,
    start_line: usize,
    end_line: Option<usize>,
) -> Reconciliation {
    let candidate = extract_code_block(response);
    reconcile_detailed(document_text, &candidate, start_line, end_line)
}

fn trim_blank_lines<'a>(lines: &'a [&'a str]) -> &'a [&'a str] {
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(start, |i| i + 1);
    &lines[start..end]
}
