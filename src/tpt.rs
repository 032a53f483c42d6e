use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::eligibility::{
    Criterion, EligibilityStatus, derive_status, parse_approval_date, years_since,
};
use crate::error::{EngineError, EngineResult};
use crate::ntap::CodePayment;

const VALID_CATEGORIES: [&str; 3] = ["device", "drug", "biological"];

/// TPT program reference data (`tpt_approved.json`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TptProgram {
    pub apc_base_payments: HashMap<String, f64>,
    pub max_pass_through_duration: Option<f64>,
    pub fiscal_year: Option<serde_json::Value>,
    pub last_updated: Option<String>,
    pub technologies: Vec<serde_json::Value>,
}

impl TptProgram {
    pub fn apc_payment(&self, apc_code: Option<&str>) -> f64 {
        apc_code
            .and_then(|c| self.apc_base_payments.get(c))
            .copied()
            .unwrap_or(0.0)
    }

    fn max_duration_years(&self, config: &EngineConfig) -> f64 {
        self.max_pass_through_duration
            .unwrap_or(config.tpt_max_duration_years)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TptPaymentRequest {
    pub device_cost: f64,
    pub apc_code: Option<String>,
    /// Overrides the program data lookup when supplied and positive.
    pub apc_payment: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TptBreakdown {
    pub base_apc_payment: f64,
    pub device_pass_through: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TptPaymentResult {
    pub device_cost: f64,
    pub apc_code: Option<String>,
    pub apc_payment: f64,
    pub packaged_amount: f64,
    pub pass_through_payment: f64,
    pub total_reimbursement: f64,
    pub breakdown: TptBreakdown,
}

/// Pass-through pays the device cost minus the slice of it already packaged
/// into the APC rate.
pub fn calculate_payment(
    program: &TptProgram,
    config: &EngineConfig,
    request: &TptPaymentRequest,
) -> EngineResult<TptPaymentResult> {
    if !request.device_cost.is_finite() || request.device_cost <= 0.0 {
        return Err(EngineError::validation(
            "Device cost is required and must be positive",
        ));
    }

    let apc_payment = request
        .apc_payment
        .filter(|v| *v > 0.0)
        .unwrap_or_else(|| program.apc_payment(request.apc_code.as_deref()));

    let packaged_amount = (apc_payment * config.tpt_packaged_share).round();
    let pass_through_payment = (request.device_cost - apc_payment * config.tpt_packaged_share)
        .max(0.0)
        .round();
    let total_reimbursement = (apc_payment + pass_through_payment).round();

    Ok(TptPaymentResult {
        device_cost: request.device_cost,
        apc_code: request.apc_code.clone(),
        apc_payment,
        packaged_amount,
        pass_through_payment,
        total_reimbursement,
        breakdown: TptBreakdown {
            base_apc_payment: apc_payment,
            device_pass_through: pass_through_payment,
            total: total_reimbursement,
        },
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TptEligibilityRequest {
    pub device_name: Option<String>,
    pub manufacturer: Option<String>,
    pub device_cost: f64,
    pub apc_code: Option<String>,
    pub fda_approval_date: String,
    pub fda_approval_type: Option<String>,
    pub category: String,
}

impl Default for TptEligibilityRequest {
    fn default() -> Self {
        Self {
            device_name: None,
            manufacturer: None,
            device_cost: 0.0,
            apc_code: None,
            fda_approval_date: String::new(),
            fda_approval_type: None,
            category: "device".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TptTechnologySummary {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub device_cost: f64,
    pub category: String,
    pub fda_approval_date: String,
    pub fda_approval_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TptEligibilityResult {
    pub status: EligibilityStatus,
    pub status_label: &'static str,
    pub technology: TptTechnologySummary,
    pub eligibility_criteria: Vec<Criterion>,
    pub criteria_met_count: usize,
    pub total_criteria: usize,
    pub potential_payment: Option<TptPaymentResult>,
    pub recommendations: Vec<String>,
}

pub fn check_eligibility(
    program: &TptProgram,
    config: &EngineConfig,
    request: &TptEligibilityRequest,
) -> EngineResult<TptEligibilityResult> {
    check_eligibility_at(program, config, request, Utc::now().date_naive())
}

/// Four criteria in fixed order: Newness, Eligible Category, Cost
/// Significance, Not Packaged. Newness and category gate eligibility; cost
/// significance only flags review.
pub fn check_eligibility_at(
    program: &TptProgram,
    config: &EngineConfig,
    request: &TptEligibilityRequest,
    today: NaiveDate,
) -> EngineResult<TptEligibilityResult> {
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
    let max_duration = program.max_duration_years(config);
    let years_old = years_since(approval_date, today);
    let newness_met = years_old <= max_duration;
    criteria.push(Criterion {
        criterion: "Newness",
        description: format!("Recent FDA approval (within {max_duration:.0}-year window)"),
        met: newness_met,
        details: format!(
            "Approved {years_old:.1} years ago - {} {max_duration:.0}-year window",
            if newness_met { "within" } else { "exceeds" }
        ),
    });

    // 2. Eligible category
    let category = request.category.to_lowercase();
    let category_met = VALID_CATEGORIES.contains(&category.as_str());
    criteria.push(Criterion {
        criterion: "Eligible Category",
        description: "Must be a device, drug, or biological".to_string(),
        met: category_met,
        details: format!(
            "Category: {} - {}",
            request.category,
            if category_met { "Valid" } else { "Invalid" }
        ),
    });

    // 3. Cost significance
    let apc_payment = program.apc_payment(request.apc_code.as_deref());
    let cost_significant = apc_payment > 0.0
        && request.device_cost > apc_payment * config.tpt_cost_significance_share;
    criteria.push(Criterion {
        criterion: "Cost Significance",
        description: "Device cost represents significant portion of procedure cost".to_string(),
        met: cost_significant,
        details: if apc_payment > 0.0 {
            format!(
                "Device cost (${:.0}) is {:.1}% of APC payment",
                request.device_cost,
                request.device_cost / apc_payment * 100.0
            )
        } else {
            "APC payment not specified".to_string()
        },
    });

    // 4. Not packaged. Always met, always forces review.
    criteria.push(Criterion {
        criterion: "Not Packaged",
        description: "Device/drug not already packaged into APC payment".to_string(),
        met: true,
        details: "Requires CMS verification - assumed not currently packaged for new approvals"
            .to_string(),
    });
    let review_forced = true;

    let gating_met = newness_met && category_met;
    let status = derive_status(gating_met, review_forced || !cost_significant);

    let potential_payment = if status != EligibilityStatus::NotEligible {
        calculate_payment(
            program,
            config,
            &TptPaymentRequest {
                device_cost: request.device_cost,
                apc_code: request.apc_code.clone(),
                apc_payment: None,
            },
        )
        .ok()
    } else {
        None
    };

    let criteria_met_count = criteria.iter().filter(|c| c.met).count();
    let recommendations = recommendations_for(&criteria, status);

    Ok(TptEligibilityResult {
        status,
        status_label: status.label(),
        technology: TptTechnologySummary {
            name: request.device_name.clone(),
            manufacturer: request.manufacturer.clone(),
            device_cost: request.device_cost,
            category: request.category.clone(),
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

fn recommendations_for(criteria: &[Criterion], status: EligibilityStatus) -> Vec<String> {
    let mut out = Vec::new();
    for c in criteria.iter().filter(|c| !c.met) {
        match c.criterion {
            "Newness" => {
                out.push("Pass-through status may have expired - verify with CMS".to_string())
            }
            "Cost Significance" => out.push(
                "Consider if separate payment is warranted given cost relative to APC".to_string(),
            ),
            _ => {}
        }
    }
    if matches!(
        status,
        EligibilityStatus::LikelyEligible | EligibilityStatus::NeedsReview
    ) {
        out.push("Prepare HCPCS code application if not already assigned".to_string());
        out.push("Submit pass-through application to CMS with supporting cost data".to_string());
    }
    out
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedTechnologies {
    pub fiscal_year: Option<serde_json::Value>,
    pub last_updated: Option<String>,
    pub max_duration: f64,
    pub technologies: Vec<serde_json::Value>,
    pub total_count: usize,
}

pub fn approved_technologies(program: &TptProgram, config: &EngineConfig) -> ApprovedTechnologies {
    ApprovedTechnologies {
        fiscal_year: program.fiscal_year.clone(),
        last_updated: program.last_updated.clone(),
        max_duration: program.max_duration_years(config),
        total_count: program.technologies.len(),
        technologies: program.technologies.clone(),
    }
}

pub fn available_apcs(program: &TptProgram) -> Vec<CodePayment> {
    let mut out: Vec<CodePayment> = program
        .apc_base_payments
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

    fn program() -> TptProgram {
        TptProgram {
            apc_base_payments: HashMap::from([("5193".to_string(), 11_639.0)]),
            ..Default::default()
        }
    }

    #[test]
    fn pass_through_subtracts_packaged_share() {
        let r = calculate_payment(
            &program(),
            &EngineConfig::default(),
            &TptPaymentRequest {
                device_cost: 8_000.0,
                apc_code: Some("5193".to_string()),
                apc_payment: None,
            },
        )
        .unwrap();
        assert_eq!(r.apc_payment, 11_639.0);
        assert_eq!(r.packaged_amount, 1_164.0);
        assert_eq!(r.pass_through_payment, (8_000.0f64 - 1_163.9).round());
        assert_eq!(
            r.total_reimbursement,
            (11_639.0 + r.pass_through_payment).round()
        );
    }

    #[test]
    fn pass_through_never_goes_negative() {
        let r = calculate_payment(
            &program(),
            &EngineConfig::default(),
            &TptPaymentRequest {
                device_cost: 500.0,
                apc_code: Some("5193".to_string()),
                apc_payment: None,
            },
        )
        .unwrap();
        assert_eq!(r.pass_through_payment, 0.0);
        assert_eq!(r.total_reimbursement, 11_639.0);
    }

    #[test]
    fn provided_apc_payment_overrides_lookup() {
        let r = calculate_payment(
            &program(),
            &EngineConfig::default(),
            &TptPaymentRequest {
                device_cost: 5_000.0,
                apc_code: Some("5193".to_string()),
                apc_payment: Some(10_000.0),
            },
        )
        .unwrap();
        assert_eq!(r.apc_payment, 10_000.0);
        assert_eq!(r.packaged_amount, 1_000.0);
    }

    fn eligibility_request(device_cost: f64, category: &str) -> TptEligibilityRequest {
        TptEligibilityRequest {
            device_name: Some("Test Implant".to_string()),
            manufacturer: Some("Acme Medical".to_string()),
            device_cost,
            apc_code: Some("5193".to_string()),
            fda_approval_date: "2024-01-15".to_string(),
            fda_approval_type: Some("510(k)".to_string()),
            category: category.to_string(),
        }
    }

    fn check(req: &TptEligibilityRequest) -> TptEligibilityResult {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        check_eligibility_at(&program(), &EngineConfig::default(), req, today).unwrap()
    }

    #[test]
    fn packaged_criterion_always_forces_review() {
        let r = check(&eligibility_request(8_000.0, "device"));
        assert_eq!(r.status, EligibilityStatus::NeedsReview);
        assert_eq!(r.criteria_met_count, 4);
        assert!(r.potential_payment.is_some());
    }

    #[test]
    fn invalid_category_disqualifies() {
        let r = check(&eligibility_request(8_000.0, "procedure"));
        assert_eq!(r.status, EligibilityStatus::NotEligible);
        assert!(!r.eligibility_criteria[1].met);
        assert!(r.potential_payment.is_none());
    }

    #[test]
    fn category_is_case_insensitive() {
        let r = check(&eligibility_request(8_000.0, "Biological"));
        assert!(r.eligibility_criteria[1].met);
    }

    #[test]
    fn insignificant_cost_reviews_rather_than_disqualifies() {
        // 15% of 11639 is ~1746; a $1000 device fails significance.
        let r = check(&eligibility_request(1_000.0, "device"));
        assert_eq!(r.status, EligibilityStatus::NeedsReview);
        assert!(!r.eligibility_criteria[2].met);
        assert!(
            r.recommendations
                .iter()
                .any(|s| s.contains("separate payment"))
        );
    }

    #[test]
    fn old_approval_disqualifies() {
        let mut req = eligibility_request(8_000.0, "device");
        req.fda_approval_date = "2019-01-15".to_string();
        let r = check(&req);
        assert_eq!(r.status, EligibilityStatus::NotEligible);
    }

    #[test]
    fn program_duration_overrides_config() {
        let mut p = program();
        p.max_pass_through_duration = Some(10.0);
        let req = {
            let mut r = eligibility_request(8_000.0, "device");
            r.fda_approval_date = "2019-01-15".to_string();
            r
        };
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let r = check_eligibility_at(&p, &EngineConfig::default(), &req, today).unwrap();
        assert!(r.eligibility_criteria[0].met);
    }
}
