//! `splice reconcile`: trim a model suggestion against a document.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;

use context_splice_core::extract::reconcile_response;
use context_splice_core::reconcile_detailed;

/// Read `document` and `candidate` (`-` for stdin), reconcile, print the
/// surviving fragment.
///
/// Unless `raw` is set the candidate is treated as a model response and its
/// first fenced code block is extracted first. An empty result is an error.
pub fn run_reconcile(
    document: &Path,
    candidate: &Path,
    start_line: usize,
    end_line: Option<usize>,
    raw: bool,
) -> Result<()> {
    let document_text = std::fs::read_to_string(document)
        .with_context(|| format!("Failed to read document: {}", document.display()))?;
    let candidate_text = read_input(candidate)?;

    let result = if raw {
        reconcile_detailed(&document_text, &candidate_text, start_line, end_line)
    } else {
        reconcile_response(&document_text, &candidate_text, start_line, end_line)
    };

    tracing::info!(
        trimmed_prefix = result.trimmed_prefix,
        trimmed_suffix = result.trimmed_suffix,
        "suggestion reconciled"
    );

    if result.text.is_empty() {
        bail!("Suggestion is empty after reconciliation");
    }

    println!("{}", result.text);
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidate: {}", path.display()))
}
