// src/classifier/scorer.rs - Sentence verdicts from per-token tallies

use serde::Serialize;

use super::Tier;

/// A sentence passes when the failing share of countable tokens is at most
/// `1 - p`. Sentences with nothing countable pass vacuously, so empty or fully
/// filtered messages are never moderated.
pub fn score(fail_count: usize, total_count: usize, p: f64) -> bool {
    if total_count == 0 {
        return true;
    }
    (fail_count as f64 / total_count as f64) <= (1.0 - p)
}

/// Tally of one sentence at one tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub tier: Tier,
    pub total: usize,
    pub failed: usize,
    pub valid: bool,
}

impl Verdict {
    pub fn new(tier: Tier, failed: usize, total: usize, p: f64) -> Self {
        Self {
            tier,
            total,
            failed,
            valid: score(failed, total, p),
        }
    }

    pub fn fail_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}
