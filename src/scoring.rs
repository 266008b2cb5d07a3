/// Cheap divergence measure between an original and a revised text.
///
/// This is a positional character diff, not an edit distance: O(n),
/// good enough for telemetry, not a correctness check.
#[derive(Debug, Clone, Default)]
pub struct ImprovementScorer;

impl ImprovementScorer {
    pub fn new() -> Self {
        Self
    }

    /// Percentage in [0, 100] of how much `revised` diverges from
    /// `original`, rounded to one decimal. Identical texts score 0.0;
    /// fully disjoint same-length texts score 100.0.
    pub fn score(&self, original: &str, revised: &str) -> f64 {
        let original_norm = normalize(original);
        let revised_norm = normalize(revised);

        let original_chars: Vec<char> = original_norm.chars().collect();
        let revised_chars: Vec<char> = revised_norm.chars().collect();

        let shorter = original_chars.len().min(revised_chars.len());
        let mut mismatches = original_chars.len().abs_diff(revised_chars.len());
        for i in 0..shorter {
            if original_chars[i] != revised_chars[i] {
                mismatches += 1;
            }
        }

        let base = original_chars.len().max(1) as f64;
        let percentage = (mismatches as f64 / base * 100.0).min(100.0);
        (percentage * 10.0).round() / 10.0
    }
}

/// Collapse whitespace runs to single spaces, drop common punctuation,
/// lowercase and trim, so formatting-only edits do not count as change.
fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | ';' | '!' | '?'))
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
