//! Candidate scoring for statement lines.
//!
//! Pure functions: the service loads candidates, this module decides which
//! of them are worth suggesting and in what order.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::config::ReconciliationConfig;

use super::types::{MatchCandidate, MatchTarget, StatementLine, StatementProvider};

/// Points for an exact amount.
pub const AMOUNT_SCORE: u32 = 50;
/// Points for a matching payment reference.
pub const REFERENCE_SCORE: u32 = 20;
/// Points for a matching counterparty.
pub const COUNTERPARTY_SCORE: u32 = 5;
/// Bonus that ranks payment executions above their own money transactions.
pub const PAYMENT_EXECUTION_BONUS: u32 = 3;

/// What the matcher needs to know about a candidate.
#[derive(Debug, Clone)]
pub struct CandidateFacts<'a> {
    /// Candidate entity.
    pub target: MatchTarget,
    /// Candidate amount in its own currency.
    pub amount: Decimal,
    /// Candidate date.
    pub occurred_on: NaiveDate,
    /// Candidate reference.
    pub reference: Option<&'a str>,
    /// Candidate counterparty.
    pub counterparty: Option<&'a str>,
}

/// Statement candidate matcher.
pub struct Matcher;

impl Matcher {
    /// Search window in days either side of the line date.
    #[must_use]
    pub fn window_days(provider: StatementProvider, config: &ReconciliationConfig) -> i64 {
        match provider {
            StatementProvider::Bank => config.bank_window_days,
            StatementProvider::Marketplace | StatementProvider::Acquiring => {
                config.marketplace_window_days
            }
        }
    }

    /// Date proximity points.
    #[must_use]
    pub const fn date_score(day_distance: i64) -> u32 {
        match day_distance {
            0 => 25,
            1 => 20,
            2 | 3 => 15,
            4 | 5 => 8,
            _ => 0,
        }
    }

    /// Scores one candidate; `None` if it cannot match the line at all.
    ///
    /// Amounts must be equal and the candidate must lie inside `window_days`.
    #[must_use]
    pub fn score(
        line: &StatementLine,
        candidate: &CandidateFacts<'_>,
        window_days: i64,
    ) -> Option<MatchCandidate> {
        if candidate.amount != line.amount.amount {
            return None;
        }
        let day_distance = line
            .occurred_on
            .signed_duration_since(candidate.occurred_on)
            .num_days()
            .abs();
        if day_distance > window_days {
            return None;
        }

        let mut score = AMOUNT_SCORE + Self::date_score(day_distance);
        if contains_either(line.reference.as_deref(), candidate.reference) {
            score += REFERENCE_SCORE;
        }
        if contains(candidate.counterparty, line.counterparty.as_deref()) {
            score += COUNTERPARTY_SCORE;
        }
        if matches!(candidate.target, MatchTarget::PaymentExecution(_)) {
            score += PAYMENT_EXECUTION_BONUS;
        }

        Some(MatchCandidate {
            target: candidate.target,
            score,
            day_distance,
            amount: candidate.amount,
            occurred_on: candidate.occurred_on,
        })
    }

    /// Drops candidates under the minimum score and keeps the best ones,
    /// highest score first, closest date breaking ties.
    #[must_use]
    pub fn rank(mut candidates: Vec<MatchCandidate>, config: &ReconciliationConfig) -> Vec<MatchCandidate> {
        candidates.retain(|c| c.score >= config.min_score);
        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.day_distance.cmp(&b.day_distance))
        });
        candidates.truncate(config.max_candidates);
        candidates
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn contains(haystack: Option<&str>, needle: Option<&str>) -> bool {
    match (normalize(haystack), normalize(needle)) {
        (Some(h), Some(n)) => h.contains(&n),
        _ => false,
    }
}

fn contains_either(a: Option<&str>, b: Option<&str>) -> bool {
    contains(a, b) || contains(b, a)
}
