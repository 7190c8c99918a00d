//! Surrounding-code reconciliation.
//!
//! Language models asked to rewrite a region of a document routinely echo
//! the lines around that region back, often re-indented. Applying such a
//! suggestion verbatim duplicates the context. [`reconcile`] trims those
//! echoed lines so only the real delta is applied.
//!
//! # Algorithm
//!
//! 1. Split the document and the candidate on `'\n'`.
//! 2. `before` is every document line strictly above `start_line`,
//!    `after` every line strictly below `end_line`.
//! 3. **Prefix pass.** Try successively shorter suffixes of `before`,
//!    longest first. The first window whose lines all equal the leading
//!    candidate lines (after whitespace removal) is dropped from the
//!    candidate.
//! 4. **Suffix pass.** Symmetric: try successively shorter prefixes of
//!    `after`, longest first, against the trailing candidate lines. Skipped
//!    when the prefix pass consumed the whole candidate.
//! 5. Join the surviving candidate lines with `'\n'`.
//!
//! Comparison ignores all whitespace; output never does. Only whole
//! contiguous windows anchored at the region boundary are considered, so the
//! cost is `O(before × candidate)` in the worst case.
//!
//! # Example
//!
//! ```rust
//! use context_splice_core::reconcile;
//!
//! let document = "fn main() {\n    let x = 1;\n    println!(\"{x}\");\n}";
//! let candidate = "fn main() {\n    let x = 2;";
//! assert_eq!(reconcile(document, candidate, 1, None), "    let x = 2;");
//! ```

/// Outcome of a reconciliation, with the number of lines each pass removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The trimmed candidate. Empty when the candidate had no lines or was
    /// entirely echoed context.
    pub text: String,
    /// Leading candidate lines that echoed the lines above the region.
    pub trimmed_prefix: usize,
    /// Trailing candidate lines that echoed the lines below the region.
    pub trimmed_suffix: usize,
}

impl Reconciliation {
    fn untouched(text: &str) -> Self {
        Self {
            text: text.to_string(),
            trimmed_prefix: 0,
            trimmed_suffix: 0,
        }
    }
}

/// Trim echoed surrounding lines from `candidate_text`.
///
/// `start_line` and `end_line` are zero-based and inclusive; `end_line`
/// defaults to `start_line`. See [`reconcile_detailed`] for the range policy.
///
/// Only lines strictly above `start_line` are matched as an echoed prefix.
/// The replaced lines themselves are never trimmed, so a candidate
/// `"B\nC\nX"` for line 2 of `A B C D` keeps `"C\nX"`:
///
/// ```rust
/// use context_splice_core::reconcile;
///
/// assert_eq!(reconcile("A\nB\nC\nD", "B\nC\nX", 2, None), "C\nX");
/// ```
pub fn reconcile(
    document_text: &str,
    candidate_text: &str,
    start_line: usize,
    end_line: Option<usize>,
) -> String {
    reconcile_detailed(document_text, candidate_text, start_line, end_line).text
}

/// Like [`reconcile`], but also reports how many lines were trimmed.
///
/// # Range policy
///
/// - An empty candidate yields an empty result. Callers must treat this as
///   a failed suggestion, distinct from a valid but unchanged fragment.
/// - A range with `start_line > end_line`, or one reaching past the last
///   document line, disables both passes and returns the candidate as is.
pub fn reconcile_detailed(
    document_text: &str,
    candidate_text: &str,
    start_line: usize,
    end_line: Option<usize>,
) -> Reconciliation {
    if candidate_text.is_empty() {
        return Reconciliation::untouched("");
    }

    let document: Vec<&str> = document_text.split('\n').collect();
    let candidate: Vec<&str> = candidate_text.split('\n').collect();

    let end_line = end_line.unwrap_or(start_line);
    if start_line > end_line || end_line >= document.len() {
        return Reconciliation::untouched(candidate_text);
    }

    let before = normalize_all(&document[..start_line]);
    let after = normalize_all(&document[end_line + 1..]);
    let normalized = normalize_all(&candidate);

    let trimmed_prefix = echoed_prefix_len(&before, &normalized);
    let remaining = &normalized[trimmed_prefix..];
    let trimmed_suffix = if remaining.is_empty() {
        0
    } else {
        echoed_suffix_len(&after, remaining)
    };

    let kept = &candidate[trimmed_prefix..candidate.len() - trimmed_suffix];
    Reconciliation {
        text: kept.join("\n"),
        trimmed_prefix,
        trimmed_suffix,
    }
}

/// Remove every whitespace character from a line.
///
/// Used only for equality checks; never for output.
pub fn normalize_line(line: &str) -> String {
    line.chars().filter(|c| !c.is_whitespace()).collect()
}

fn normalize_all(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| normalize_line(line)).collect()
}

/// Length of the longest suffix of `before` that the candidate starts with.
fn echoed_prefix_len(before: &[String], candidate: &[String]) -> usize {
    let Some(first) = candidate.first() else {
        return 0;
    };

    for i in 0..before.len() {
        let window = before.len() - i;
        if candidate.len() < window || before[i] != *first {
            continue;
        }
        if candidate[..window] == before[i..] {
            return window;
        }
    }
    0
}

/// Length of the longest prefix of `after` that the candidate ends with.
fn echoed_suffix_len(after: &[String], candidate: &[String]) -> usize {
    let Some(last) = candidate.last() else {
        return 0;
    };

    for window in (1..=after.len()).rev() {
        if candidate.len() < window || after[window - 1] != *last {
            continue;
        }
        if candidate[candidate.len() - window..] == after[..window] {
            return window;
        }
    }
    0
}
