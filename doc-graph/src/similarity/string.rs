//! Lexical scorer: diff-derived fuzzy ratios over word tokens

use super::ComparableDocument;
use crate::config::StringMode;
use similar::{Algorithm, TextDiff};

/// Block pairs at or above this ratio are reported as matched
const MATCHED_BLOCK_FLOOR: f64 = 0.8;

/// Token-order-aware ratio `2·M / (len_a + len_b)` over whitespace tokens.
///
/// Inputs are put in a canonical order before diffing so the result is
/// symmetric even where the diff algorithm is not.
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let first: Vec<&str> = first.split_whitespace().collect();
    let second: Vec<&str> = second.split_whitespace().collect();
    if first == second {
        return 1.0;
    }
    if first.is_empty() || second.is_empty() {
        return 0.0;
    }
    let ratio = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&first, &second)
        .ratio();
    f64::from(ratio).clamp(0.0, 1.0)
}

/// Document-level string scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct StringScorer {
    mode: StringMode,
}

impl StringScorer {
    pub fn new(mode: StringMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> StringMode {
        self.mode
    }

    /// Score two documents; best-block mode also returns matched block
    /// index pairs `(index in a, index in b)`
    pub fn compare(
        &self,
        a: &ComparableDocument,
        b: &ComparableDocument,
    ) -> (f64, Vec<(usize, usize)>) {
        match self.mode {
            StringMode::WholeDocument => (fuzzy_ratio(&a.text, &b.text), Vec::new()),
            StringMode::BestBlockAverage => best_block_average(a, b),
        }
    }
}

fn best_block_average(a: &ComparableDocument, b: &ComparableDocument) -> (f64, Vec<(usize, usize)>) {
    if a.text == b.text {
        let pairs = a.blocks.iter().zip(&b.blocks).map(|(x, y)| (x.0, y.0)).collect();
        return (1.0, pairs);
    }
    if a.blocks.is_empty() || b.blocks.is_empty() {
        return (0.0, Vec::new());
    }

    // Full score table, so both directions read the same numbers
    let table: Vec<Vec<f64>> = a
        .blocks
        .iter()
        .map(|(_, x)| b.blocks.iter().map(|(_, y)| fuzzy_ratio(x, y)).collect())
        .collect();

    let mut matched = Vec::new();
    let mut forward = 0.0;
    for (i, row) in table.iter().enumerate() {
        let (j, best) = argmax(row.iter().copied());
        forward += best;
        if best >= MATCHED_BLOCK_FLOOR {
            matched.push((a.blocks[i].0, b.blocks[j].0));
        }
    }

    let mut backward = 0.0;
    for j in 0..b.blocks.len() {
        let (_, best) = argmax(table.iter().map(|row| row[j]));
        backward += best;
    }

    let score = (forward / a.blocks.len() as f64 + backward / b.blocks.len() as f64) / 2.0;
    (score.clamp(0.0, 1.0), matched)
}

/// First index of the maximum; `(0, 0.0)` for an empty iterator
fn argmax(values: impl Iterator<Item = f64>) -> (usize, f64) {
    let mut best = (0, 0.0);
    for (idx, value) in values.enumerate() {
        if value > best.1 {
            best = (idx, value);
        }
    }
    best
}
