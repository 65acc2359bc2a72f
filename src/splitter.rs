//! Splits free-form optimizer output into the rewritten statement and its
//! rationale. Oracle text follows a convention, not a contract, so `split`
//! accepts anything and always returns two strings.

use serde::Serialize;

pub const PRIMARY_MARKER: &str = "Optimized SQL Query:";
pub const RATIONALE_MARKER: &str = "Rationale:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitResult {
    pub primary: String,
    pub rationale: String,
}

impl SplitResult {
    fn new(primary: &str, rationale: &str) -> Self {
        Self {
            primary: primary.trim().to_string(),
            rationale: rationale.trim().to_string(),
        }
    }
}

pub fn split(raw: Option<&str>) -> SplitResult {
    let Some(raw) = raw else {
        return SplitResult::default();
    };
    if raw.trim().is_empty() {
        return SplitResult::default();
    }

    let text = dedent(raw);
    let text = text.trim();

    if let Some(start) = text.find(PRIMARY_MARKER) {
        let after = &text[start + PRIMARY_MARKER.len()..];
        return match after.find(RATIONALE_MARKER) {
            Some(r) => SplitResult::new(&after[..r], &after[r + RATIONALE_MARKER.len()..]),
            None => SplitResult::new(after, ""),
        };
    }

    match text.find(RATIONALE_MARKER) {
        Some(r) => SplitResult::new(&text[..r], &text[r + RATIONALE_MARKER.len()..]),
        None => SplitResult::new(text, ""),
    }
}

/// Strips the indentation shared by every non-blank line.
fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                &line[indent..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
