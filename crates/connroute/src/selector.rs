//! Rank-ordered strategy selection.

use crate::availability::{self, Environment, SkipReason};
use crate::Strategy;
use serde::Serialize;

/// A strategy that was evaluated and passed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedStrategy {
    /// Method name of the skipped strategy.
    pub method: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Outcome of walking a candidate list.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// The first available strategy, if any.
    pub selected: Option<Strategy>,
    /// Every strategy evaluated before the selection (or all of them when
    /// nothing was selected), in evaluation order.
    pub skipped: Vec<SkippedStrategy>,
}

impl Selection {
    /// Environment variables whose presence would have made a skipped
    /// strategy usable, de-duplicated, in evaluation order.
    pub fn missing_env_vars(&self) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for skipped in &self.skipped {
            if let Some(name) = skipped.reason.missing_env_var() {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
            }
        }
        missing
    }
}

/// Selects the first available strategy.
///
/// Candidates are walked in the order given; ordering is the job of whoever
/// produced the list, so equal ranks keep their source order. Evaluation stops
/// at the first available strategy, so later candidates never appear in
/// `skipped`.
pub fn select(candidates: &[Strategy], env: &dyn Environment) -> Selection {
    let mut skipped = Vec::new();

    for candidate in candidates {
        match availability::check(candidate, env) {
            Ok(()) => {
                return Selection {
                    selected: Some(candidate.clone()),
                    skipped,
                };
            }
            Err(reason) => skipped.push(SkippedStrategy {
                method: candidate.method_name.clone(),
                reason,
            }),
        }
    }

    Selection {
        selected: None,
        skipped,
    }
}
