use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::eligibility::{
    Criterion, EligibilityStatus, derive_status, parse_approval_date, years_since,
};
use crate::error::{EngineError, EngineResult};

/// Claims are matched against these by case-insensitive substring in either
/// direction.
const CLINICAL_IMPROVEMENT_CATEGORIES: [&str; 6] = [
    "Reduced mortality",
    "Reduced complications",
    "Reduced hospital stay",
    "Improved patient outcomes",
    "Reduced readmissions",
    "Treatment for unmet need",
];

const NEWNESS_WINDOW_YEARS: f64 = 3.0;

/// NTAP program reference data (`ntap_approved.json`). Values present in the
/// file override the engine config defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NtapProgram {
    pub drg_base_payments: HashMap<String, f64>,
    pub ntap_percentage: Option<f64>,
    pub max_ntap_cap: Option<f64>,
    pub cost_threshold_multiplier: Option<f64>,
    pub fiscal_year: Option<serde_json::Value>,
    pub last_updated: Option<String>,
    pub technologies: Vec<serde_json::Value>,
}

impl NtapProgram {
    pub fn drg_payment(&self, drg_code: Option<&str>) -> f64 {
        drg_code
            .and_then(|c| self.drg_base_payments.get(c))
            .copied()
            .unwrap_or(0.0)
    }

    fn percentage(&self, config: &EngineConfig) -> f64 {
        self.ntap_percentage.unwrap_or(config.ntap_percentage)
    }

    fn max_cap(&self, config: &EngineConfig) -> f64 {
        self.max_ntap_cap.unwrap_or(config.ntap_max_cap)
    }

    fn threshold_multiplier(&self, config: &EngineConfig) -> f64 {
        self.cost_threshold_multiplier
            .unwrap_or(config.ntap_cost_threshold_multiplier)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NtapPaymentRequest {
    pub device_cost: f64,
    pub drg_code: Option<String>,
    /// Overrides the program data lookup when supplied and positive.
    pub drg_payment: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NtapBreakdown {
    pub base_drg_payment: f64,
    pub ntap_add_on: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NtapPaymentResult {
    pub eligible: bool,
    pub device_cost: f64,
    pub drg_code: Option<String>,
    pub drg_payment: f64,
    pub cost_difference: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ntap_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculated_ntap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cap: Option<f64>,
    pub ntap_payment: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_reimbursement: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<NtapBreakdown>,
}

/// NTAP = min(percentage x (device cost - DRG payment), cap). A device that
/// costs no more than the DRG payment gets no add-on.
pub fn calculate_payment(
    program: &NtapProgram,
    config: &EngineConfig,
    request: &NtapPaymentRequest,
) -> EngineResult<NtapPaymentResult> {
    if !request.device_cost.is_finite() || request.device_cost <= 0.0 {
        return Err(EngineError::validation(
            "Device cost is required and must be positive",
        ));
    }

    let drg_payment = request
        .drg_payment
        .filter(|v| *v > 0.0)
        .unwrap_or_else(|| program.drg_payment(request.drg_code.as_deref()));

    let cost_difference = request.device_cost - drg_payment;
    if cost_difference <= 0.0 {
        return Ok(NtapPaymentResult {
            eligible: false,
            device_cost: request.device_cost,
            drg_code: request.drg_code.clone(),
            drg_payment,
            cost_difference,
            ntap_percentage: None,
            calculated_ntap: None,
            max_cap: None,
            ntap_payment: 0.0,
            total_reimbursement: None,
            reason: Some("Device cost does not exceed DRG payment"),
            breakdown: None,
        });
    }

    let percentage = program.percentage(config);
    let max_cap = program.max_cap(config);
    let calculated = cost_difference * percentage;
    let ntap_payment = calculated.min(max_cap).round();

    Ok(NtapPaymentResult {
        eligible: true,
        device_cost: request.device_cost,
        drg_code: request.drg_code.clone(),
        drg_payment,
        cost_difference,
        ntap_percentage: Some(percentage * 100.0),
        calculated_ntap: Some(calculated.round()),
        max_cap: Some(max_cap),
        ntap_payment,
        total_reimbursement: Some((drg_payment + ntap_payment).round()),
        reason: None,
        breakdown: Some(NtapBreakdown {
            base_drg_payment: drg_payment,
            ntap_add_on: ntap_payment,
            total: (drg_payment + ntap_payment).round(),
        }),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NtapEligibilityRequest {
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub device_cost: f64,
    pub drg_code: Option<String>,
    pub fda_approval_date: String,
    pub fda_approval_type: Option<String>,
    pub clinical_improvements: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnologySummary {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub device_cost: f64,
    pub fda_approval_date: String,
    pub fda_approval_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NtapEligibilityResult {
    pub status: EligibilityStatus,
    pub status_label: &'static str,
    pub technology: TechnologySummary,
    pub eligibility_criteria: Vec<Criterion>,
    pub criteria_met_count: usize,
    pub total_criteria: usize,
    pub potential_payment: Option<NtapPaymentResult>,
    pub recommendations: Vec<String>,
}

pub fn check_eligibility(
    program: &NtapProgram,
    config: &EngineConfig,
    request: &NtapEligibilityRequest,
) -> EngineResult<NtapEligibilityResult> {
    check_eligibility_at(program, config, request, Utc::now().date_naive())
}

/// Evaluates the four NTAP criteria in fixed order against a reference date
/// (injected for determinism).
pub fn check_eligibility_at(
    program: &NtapProgram,
    config: &EngineConfig,
    request: &NtapEligibilityRequest,
    today: NaiveDate,
) -> EngineResult<NtapEligibilityResult> {
    let mut errors = Vec::new();
    if !request.device_cost.is_finite() || request.device_cost < 0.0 {
        errors.push("Device cost must be a non-negative number".to_string());
    }
    let approval_date = match parse_approval_date(&request.fda_approval_date) {
        Ok(d) => Some(d),
        Err(EngineError::Validation(mut v)) => {
            errors.append(&mut v);
            None
        }
        Err(e) => return Err(e),
    };
    let Some(approval_date) = approval_date else {
        return Err(EngineError::Validation(errors));
    };
    if !errors.is_empty() {
        return Err(EngineError::Validation(errors));
    }

    let mut criteria = Vec::with_capacity(4);

    // 1. Newness
    let years_old = years_since(approval_date, today);
    let newness_met = years_old <= NEWNESS_WINDOW_YEARS;
    criteria.push(Criterion {
        criterion: "Newness",
        description: "FDA approval within qualifying timeframe (2-3 years)".to_string(),
        met: newness_met,
        details: format!(
            "Approved {years_old:.1} years ago - {}",
            if newness_met {
                "within timeframe"
            } else {
                "may not qualify as \"new\""
            }
        ),
    });

    // 2. Cost threshold
    let drg_payment = program.drg_payment(request.drg_code.as_deref());
    let cost_threshold = drg_payment * program.threshold_multiplier(config);
    let cost_met = request.device_cost > cost_threshold;
    criteria.push(Criterion {
        criterion: "Cost Threshold",
        description: "Device cost exceeds DRG payment threshold".to_string(),
        met: cost_met,
        details: format!(
            "Device cost (${:.0}) {} threshold (${cost_threshold:.0})",
            request.device_cost,
            if cost_met { "exceeds" } else { "does not exceed" }
        ),
    });

    // 3. Not in current weights. Always reported met; CMS still has to
    // verify, so this criterion unconditionally forces review.
    criteria.push(Criterion {
        criterion: "Not in Current Weights",
        description: "Technology not yet reflected in DRG payment weights".to_string(),
        met: true,
        details: "Requires CMS verification - assumed not in current weights for new FDA approvals"
            .to_string(),
    });
    let review_forced = true;

    // 4. Substantial clinical improvement
    let valid_improvements: Vec<&String> = request
        .clinical_improvements
        .iter()
        .filter(|claim| claim_matches_category(claim))
        .collect();
    let clinical_met = !valid_improvements.is_empty();
    criteria.push(Criterion {
        criterion: "Substantial Clinical Improvement",
        description: "Demonstrates meaningful clinical benefit over existing treatments"
            .to_string(),
        met: clinical_met,
        details: if clinical_met {
            format!(
                "Claims: {}",
                valid_improvements
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        } else {
            "No clinical improvement claims provided - documentation required".to_string()
        },
    });

    let gating_met = newness_met && cost_met;
    let status = derive_status(gating_met, review_forced || !clinical_met);

    let potential_payment = if status != EligibilityStatus::NotEligible {
        calculate_payment(
            program,
            config,
            &NtapPaymentRequest {
                device_cost: request.device_cost,
                drg_code: request.drg_code.clone(),
                drg_payment: None,
            },
        )
        .ok()
    } else {
        None
    };

    let criteria_met_count = criteria.iter().filter(|c| c.met).count();
    let recommendations = recommendations_for(&criteria, status);

    Ok(NtapEligibilityResult {
        status,
        status_label: status.label(),
        technology: TechnologySummary {
            name: request.device_name.clone(),
            manufacturer: request.manufacturer.clone(),
            device_cost: request.device_cost,
            fda_approval_date: request.fda_approval_date.clone(),
            fda_approval_type: request.fda_approval_type.clone(),
        },
        total_criteria: criteria.len(),
        criteria_met_count,
        eligibility_criteria: criteria,
        potential_payment,
        recommendations,
    })
}

fn claim_matches_category(claim: &str) -> bool {
    let claim = claim.to_lowercase();
    CLINICAL_IMPROVEMENT_CATEGORIES.iter().any(|cat| {
        let cat = cat.to_lowercase();
        cat.contains(&claim) || claim.contains(&cat)
    })
}

fn recommendations_for(criteria: &[Criterion], status: EligibilityStatus) -> Vec<String> {
    let mut out = Vec::new();
    for c in criteria.iter().filter(|c| !c.met) {
        match c.criterion {
            "Newness" => out.push(
                "Consider applying in next fiscal year if technology becomes newly eligible"
                    .to_string(),
            ),
            "Cost Threshold" => out.push(
                "Review device pricing or identify additional costs that may be included"
                    .to_string(),
            ),
            "Substantial Clinical Improvement" => {
                out.push(
                    "Compile clinical trial data demonstrating improvement over existing treatments"
                        .to_string(),
                );
                out.push(
                    "Document specific clinical benefits (mortality, complications, outcomes)"
                        .to_string(),
                );
            }
            _ => {}
        }
    }
    if status == EligibilityStatus::LikelyEligible {
        out.push("Prepare formal NTAP application for CMS submission".to_string());
        out.push("Gather supporting clinical documentation and cost data".to_string());
    }
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedTechnologies {
    pub fiscal_year: Option<serde_json::Value>,
    pub last_updated: Option<String>,
    pub technologies: Vec<serde_json::Value>,
    pub total_count: usize,
}

pub fn approved_technologies(program: &NtapProgram) -> ApprovedTechnologies {
    ApprovedTechnologies {
        fiscal_year: program.fiscal_year.clone(),
        last_updated: program.last_updated.clone(),
        total_count: program.technologies.len(),
        technologies: program.technologies.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CodePayment {
    pub code: String,
    pub payment: f64,
}

pub fn available_drgs(program: &NtapProgram) -> Vec<CodePayment> {
    let mut out: Vec<CodePayment> = program
        .drg_base_payments
        .iter()
        .map(|(code, payment)| CodePayment {
            code: code.clone(),
            payment: *payment,
        })
        .collect();
    out.sort_by(|a, b| a.code.cmp(&b.code));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> NtapProgram {
        NtapProgram {
            drg_base_payments: HashMap::from([
                ("291".to_string(), 45_000.0),
                ("266".to_string(), 40_000.0),
            ]),
            ..Default::default()
        }
    }

    fn payment(device_cost: f64, drg_code: &str) -> NtapPaymentResult {
        calculate_payment(
            &program(),
            &EngineConfig::default(),
            &NtapPaymentRequest {
                device_cost,
                drg_code: Some(drg_code.to_string()),
                drg_payment: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn device_under_drg_payment_gets_no_add_on() {
        let r = payment(32_500.0, "291");
        assert!(!r.eligible);
        assert_eq!(r.cost_difference, -12_500.0);
        assert_eq!(r.ntap_payment, 0.0);
        assert!(r.reason.is_some());
    }

    #[test]
    fn add_on_is_65_percent_of_cost_difference() {
        let r = payment(100_000.0, "266");
        assert!(r.eligible);
        assert_eq!(r.cost_difference, 60_000.0);
        assert_eq!(r.calculated_ntap, Some(39_000.0));
        assert_eq!(r.ntap_payment, 39_000.0);
        assert_eq!(r.total_reimbursement, Some(79_000.0));
    }

    #[test]
    fn add_on_is_capped() {
        let r = payment(400_000.0, "266");
        // 65% of 360k exceeds the 150k cap.
        assert_eq!(r.ntap_payment, 150_000.0);
    }

    #[test]
    fn provided_drg_payment_overrides_lookup() {
        let r = calculate_payment(
            &program(),
            &EngineConfig::default(),
            &NtapPaymentRequest {
                device_cost: 50_000.0,
                drg_code: Some("291".to_string()),
                drg_payment: Some(20_000.0),
            },
        )
        .unwrap();
        assert_eq!(r.drg_payment, 20_000.0);
        assert_eq!(r.cost_difference, 30_000.0);
    }

    #[test]
    fn zero_or_negative_cost_is_rejected() {
        for cost in [0.0, -5.0] {
            let err = calculate_payment(
                &program(),
                &EngineConfig::default(),
                &NtapPaymentRequest {
                    device_cost: cost,
                    ..Default::default()
                },
            );
            assert!(matches!(err, Err(EngineError::Validation(_))));
        }
    }

    fn eligibility_request(device_cost: f64, approved: &str) -> NtapEligibilityRequest {
        NtapEligibilityRequest {
            device_name: Some("Test Device".to_string()),
            manufacturer: Some("Acme Medical".to_string()),
            device_cost,
            drg_code: Some("266".to_string()),
            fda_approval_date: approved.to_string(),
            fda_approval_type: Some("PMA".to_string()),
            clinical_improvements: vec!["Reduced mortality in trials".to_string()],
        }
    }

    fn check(req: &NtapEligibilityRequest) -> NtapEligibilityResult {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        check_eligibility_at(&program(), &EngineConfig::default(), req, today).unwrap()
    }

    #[test]
    fn review_is_always_forced() {
        // Everything met, but the weights criterion still forces review.
        let r = check(&eligibility_request(100_000.0, "2024-01-15"));
        assert_eq!(r.status, EligibilityStatus::NeedsReview);
        assert_eq!(r.criteria_met_count, 4);
        assert_eq!(r.total_criteria, 4);
        assert!(r.potential_payment.is_some());
    }

    #[test]
    fn old_approval_fails_newness_and_disqualifies() {
        let r = check(&eligibility_request(100_000.0, "2018-01-15"));
        assert_eq!(r.status, EligibilityStatus::NotEligible);
        assert!(!r.eligibility_criteria[0].met);
        assert!(r.potential_payment.is_none());
    }

    #[test]
    fn cheap_device_fails_cost_threshold() {
        let r = check(&eligibility_request(10_000.0, "2024-01-15"));
        assert_eq!(r.status, EligibilityStatus::NotEligible);
        assert!(!r.eligibility_criteria[1].met);
    }

    #[test]
    fn clinical_claims_fuzzy_match_both_directions() {
        assert!(claim_matches_category("significantly reduced mortality"));
        assert!(claim_matches_category("mortality"));
        assert!(claim_matches_category("REDUCED READMISSIONS"));
        assert!(!claim_matches_category("tastes great"));
    }

    #[test]
    fn missing_clinical_claims_keeps_review_status() {
        let mut req = eligibility_request(100_000.0, "2024-01-15");
        req.clinical_improvements.clear();
        let r = check(&req);
        assert_eq!(r.status, EligibilityStatus::NeedsReview);
        assert!(!r.eligibility_criteria[3].met);
        assert!(
            r.recommendations
                .iter()
                .any(|s| s.contains("clinical trial data"))
        );
    }

    #[test]
    fn malformed_date_is_a_validation_error() {
        let mut req = eligibility_request(100_000.0, "2024-01-15");
        req.fda_approval_date = "last spring".to_string();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let err = check_eligibility_at(&program(), &EngineConfig::default(), &req, today);
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }
}
