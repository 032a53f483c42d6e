use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};

/// One named eligibility criterion, in the order it was evaluated.
#[derive(Debug, Clone, Serialize)]
pub struct Criterion {
    pub criterion: &'static str,
    pub description: String,
    pub met: bool,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EligibilityStatus {
    #[serde(rename = "likely_eligible")]
    LikelyEligible,
    #[serde(rename = "needs_review")]
    NeedsReview,
    #[serde(rename = "not_eligible")]
    NotEligible,
}

impl EligibilityStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EligibilityStatus::LikelyEligible => "Likely Eligible",
            EligibilityStatus::NeedsReview => "Needs Review",
            EligibilityStatus::NotEligible => "Not Eligible",
        }
    }
}

/// Overall status from the gating criteria (the ones that disqualify
/// outright) and the review conditions (forced review, missing evidence).
pub fn derive_status(gating_met: bool, needs_review: bool) -> EligibilityStatus {
    if !gating_met {
        EligibilityStatus::NotEligible
    } else if needs_review {
        EligibilityStatus::NeedsReview
    } else {
        EligibilityStatus::LikelyEligible
    }
}

/// FDA approval dates arrive as `YYYY-MM-DD` or a full RFC 3339 timestamp.
/// Anything else is the caller's error, not an implicit "approved today".
pub fn parse_approval_date(s: &str) -> EngineResult<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    Err(EngineError::validation(format!(
        "FDA approval date must be YYYY-MM-DD or RFC 3339, got: {s}"
    )))
}

/// Approval age in fractional years.
pub fn years_since(date: NaiveDate, today: NaiveDate) -> f64 {
    (today - date).num_days() as f64 / 365.25
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_derivation() {
        assert_eq!(derive_status(false, false), EligibilityStatus::NotEligible);
        assert_eq!(derive_status(false, true), EligibilityStatus::NotEligible);
        assert_eq!(derive_status(true, true), EligibilityStatus::NeedsReview);
        assert_eq!(derive_status(true, false), EligibilityStatus::LikelyEligible);
    }

    #[test]
    fn date_formats() {
        assert!(parse_approval_date("2024-06-01").is_ok());
        assert!(parse_approval_date("2024-06-01T00:00:00Z").is_ok());
        assert!(parse_approval_date("June 1, 2024").is_err());
        assert!(parse_approval_date("").is_err());
    }

    #[test]
    fn age_in_years() {
        let approved = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let age = years_since(approved, today);
        assert!((age - 2.0).abs() < 0.01);
    }
}
