use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::index::codes::CodeIndex;
use crate::payments::SitePayments;
use crate::record::{CodeDetail, CodeType};

/// The four site-of-service payment systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    Ipps,
    Hopd,
    Asc,
    Obl,
}

pub const ALL_SITES: [Site; 4] = [Site::Ipps, Site::Hopd, Site::Asc, Site::Obl];

impl Site {
    pub fn key(&self) -> &'static str {
        match self {
            Site::Ipps => "IPPS",
            Site::Hopd => "HOPD",
            Site::Asc => "ASC",
            Site::Obl => "OBL",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Site::Ipps => "Inpatient (DRG)",
            Site::Hopd => "Hospital Outpatient (OPPS)",
            Site::Asc => "Ambulatory Surgical Center",
            Site::Obl => "Office-Based Lab",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Site::Ipps => "Inpatient Prospective Payment System",
            Site::Hopd => "Outpatient Prospective Payment System",
            Site::Asc => "ASC Payment System",
            Site::Obl => "Physician Fee Schedule (Non-Facility)",
        }
    }

    /// Many-to-one alias resolution. Input is uppercased and stripped of
    /// non-alphanumerics, so "hospital outpatient" and "HOSPITAL_OUTPATIENT"
    /// both land on HOPD.
    pub fn normalize(input: &str) -> Option<Site> {
        let key: String = input
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "IPPS" | "INPATIENT" | "DRG" => Some(Site::Ipps),
            "HOPD" | "OPPS" | "HOSPITALOUTPATIENT" => Some(Site::Hopd),
            "ASC" | "AMBULATORY" => Some(Site::Asc),
            "OBL" | "OFFICE" | "NONFACILITY" | "PHYSICIAN" => Some(Site::Obl),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    #[serde(rename = "profitable")]
    Profitable,
    #[serde(rename = "break-even")]
    BreakEven,
    #[serde(rename = "loss")]
    Loss,
}

/// Three-way profitability call on the margin ratio. A zero total payment
/// classifies on the sign of the margin alone.
pub fn classify_margin(margin: f64, total_payment: f64, config: &EngineConfig) -> Classification {
    if total_payment == 0.0 {
        return if margin >= 0.0 {
            Classification::BreakEven
        } else {
            Classification::Loss
        };
    }
    let ratio = margin / total_payment;
    if ratio >= config.profitable_min_margin {
        Classification::Profitable
    } else if ratio >= config.break_even_min_margin {
        Classification::BreakEven
    } else {
        Classification::Loss
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub site_of_service: String,
    #[serde(default)]
    pub device_cost: f64,
    #[serde(default)]
    pub ntap_add_on: f64,
}

impl ScenarioRequest {
    /// Per-field validation; all problems are reported at once.
    pub fn validate(&self) -> EngineResult<Site> {
        let mut errors = Vec::new();

        if self.code.trim().is_empty() {
            errors.push("Code is required and must be a non-empty string".to_string());
        }

        let site = if self.site_of_service.trim().is_empty() {
            errors.push("Site of service is required".to_string());
            None
        } else {
            let site = Site::normalize(&self.site_of_service);
            if site.is_none() {
                errors.push(format!(
                    "Invalid site of service: {}. Valid options: IPPS, HOPD, ASC, OBL",
                    self.site_of_service
                ));
            }
            site
        };

        if !self.device_cost.is_finite() || self.device_cost < 0.0 {
            errors.push("Device cost must be a non-negative number".to_string());
        }
        if !self.ntap_add_on.is_finite() || self.ntap_add_on < 0.0 {
            errors.push("NTAP add-on must be a non-negative number".to_string());
        }

        match site {
            Some(site) if errors.is_empty() => Ok(site),
            _ => Err(EngineError::Validation(errors)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownItem {
    pub label: &'static str,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioBreakdown {
    pub base_payment: BreakdownItem,
    pub add_on_payment: BreakdownItem,
    pub total_payment: BreakdownItem,
    pub device_cost: BreakdownItem,
    pub margin: BreakdownItem,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioCodeDetails {
    #[serde(rename = "type")]
    pub code_type: CodeType,
    pub category: String,
    pub all_payments: SitePayments,
    pub apc: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub code: String,
    pub description: String,
    pub site_of_service: &'static str,
    pub site_key: &'static str,
    pub base_payment: f64,
    pub add_on_payment: f64,
    pub total_payment: f64,
    pub device_cost: f64,
    pub margin: f64,
    pub margin_percentage: String,
    pub classification: Classification,
    pub breakdown: ScenarioBreakdown,
    pub code_details: ScenarioCodeDetails,
}

fn build_result(
    detail: &CodeDetail,
    site: Site,
    device_cost: f64,
    ntap_add_on: f64,
    config: &EngineConfig,
) -> ScenarioResult {
    let base_payment = detail.payments.for_site(site);
    let add_on_payment = ntap_add_on.max(0.0);
    let total_payment = base_payment + add_on_payment;
    let margin = total_payment - device_cost;
    let margin_percentage = if total_payment > 0.0 {
        margin / total_payment * 100.0
    } else {
        0.0
    };

    ScenarioResult {
        code: detail.code.clone(),
        description: detail.description.clone(),
        site_of_service: site.name(),
        site_key: site.key(),
        base_payment,
        add_on_payment,
        total_payment,
        device_cost,
        margin,
        margin_percentage: format!("{margin_percentage:.1}"),
        classification: classify_margin(margin, total_payment, config),
        breakdown: ScenarioBreakdown {
            base_payment: BreakdownItem {
                label: "Base Payment",
                value: base_payment,
                source: Some(format!("{} @ {}", detail.code, site.name())),
                formula: None,
            },
            add_on_payment: BreakdownItem {
                label: "NTAP Add-On",
                value: add_on_payment,
                source: Some(
                    if add_on_payment > 0.0 {
                        "New Technology Add-on Payment"
                    } else {
                        "Not applied"
                    }
                    .to_string(),
                ),
                formula: None,
            },
            total_payment: BreakdownItem {
                label: "Total Payment",
                value: total_payment,
                source: None,
                formula: Some("Base + Add-On"),
            },
            device_cost: BreakdownItem {
                label: "Device Cost",
                value: device_cost,
                source: Some("User provided".to_string()),
                formula: None,
            },
            margin: BreakdownItem {
                label: "Margin",
                value: margin,
                source: None,
                formula: Some("Total Payment - Device Cost"),
            },
        },
        code_details: ScenarioCodeDetails {
            code_type: detail.code_type,
            category: detail.category.clone(),
            all_payments: detail.payments,
            apc: detail.optional.apc.clone(),
        },
    }
}

/// Validate a scenario request, resolve the code, and compute margin and
/// classification for the requested site.
pub fn calculate_scenario(
    index: &CodeIndex,
    config: &EngineConfig,
    request: &ScenarioRequest,
) -> EngineResult<ScenarioResult> {
    let site = request.validate()?;
    let detail = index
        .detail(&request.code, config)
        .ok_or_else(|| EngineError::not_found(format!("code {}", request.code)))?;
    Ok(build_result(
        &detail,
        site,
        request.device_cost,
        request.ntap_add_on,
        config,
    ))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteComparison {
    pub site: &'static str,
    pub site_key: &'static str,
    pub base_payment: f64,
    pub total_payment: f64,
    pub margin: f64,
    pub margin_percentage: String,
    pub classification: Classification,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub code: String,
    pub description: String,
    pub device_cost: f64,
    pub ntap_add_on: f64,
    pub comparisons: Vec<SiteComparison>,
    pub best_site: Option<SiteComparison>,
    pub worst_site: Option<SiteComparison>,
}

/// Run the calculator for all four sites, margin-descending. Sites where the
/// code has no payment entry are included with a zero base payment.
pub fn compare_all_sites(
    index: &CodeIndex,
    config: &EngineConfig,
    code: &str,
    device_cost: f64,
    ntap_add_on: f64,
) -> EngineResult<ComparisonResult> {
    if !device_cost.is_finite() || device_cost < 0.0 {
        return Err(EngineError::validation(
            "Device cost must be a non-negative number",
        ));
    }
    if !ntap_add_on.is_finite() || ntap_add_on < 0.0 {
        return Err(EngineError::validation(
            "NTAP add-on must be a non-negative number",
        ));
    }
    let detail = index
        .detail(code, config)
        .ok_or_else(|| EngineError::not_found(format!("code {code}")))?;

    let mut comparisons: Vec<SiteComparison> = ALL_SITES
        .iter()
        .map(|&site| {
            let r = build_result(&detail, site, device_cost, ntap_add_on, config);
            SiteComparison {
                site: r.site_of_service,
                site_key: r.site_key,
                base_payment: r.base_payment,
                total_payment: r.total_payment,
                margin: r.margin,
                margin_percentage: r.margin_percentage,
                classification: r.classification,
            }
        })
        .collect();

    comparisons.sort_by(|a, b| {
        b.margin
            .partial_cmp(&a.margin)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(ComparisonResult {
        code: detail.code.clone(),
        description: detail.description.clone(),
        device_cost,
        ntap_add_on,
        best_site: comparisons.first().cloned(),
        worst_site: comparisons.last().cloned(),
        comparisons,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdInfo {
    pub condition: String,
    pub color: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteCatalog {
    pub sites: Vec<SiteInfo>,
    pub thresholds: Vec<ThresholdInfo>,
}

pub fn site_catalog(config: &EngineConfig) -> SiteCatalog {
    let profitable = config.profitable_min_margin * 100.0;
    let break_even = config.break_even_min_margin * 100.0;
    SiteCatalog {
        sites: ALL_SITES
            .iter()
            .map(|s| SiteInfo {
                key: s.key(),
                name: s.name(),
                description: s.description(),
            })
            .collect(),
        thresholds: vec![
            ThresholdInfo {
                condition: format!("Margin >= {profitable}% of Total Payment"),
                color: "green",
                label: "Profitable",
            },
            ThresholdInfo {
                condition: format!("Margin between {break_even}% and {profitable}%"),
                color: "yellow",
                label: "Break-Even",
            },
            ThresholdInfo {
                condition: format!("Margin < {break_even}% of Total Payment"),
                color: "red",
                label: "Loss",
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::record::{CodeRecord, RateMetadata, RawCode};

    fn index_with_hopd_10000() -> CodeIndex {
        // Route HOPD through the APC table so the base payment is a clean
        // round number.
        let mut config_rates_code = RawCode {
            code: "C9999".to_string(),
            description: "Implant procedure".to_string(),
            code_type: Some("HCPCS".to_string()),
            labels: Vec::new(),
            metadata: HashMap::new(),
        };
        config_rates_code.metadata.insert(
            "HCPCS".to_string(),
            RateMetadata {
                apc: Some(5055),
                ..Default::default()
            },
        );
        CodeIndex::build(vec![CodeRecord::from_raw(config_rates_code).unwrap()])
    }

    fn config_with_hopd(rate: f64) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.apc_rates.insert(5055, rate);
        config
    }

    fn scenario(device_cost: f64, ntap_add_on: f64) -> ScenarioRequest {
        ScenarioRequest {
            code: "C9999".to_string(),
            site_of_service: "HOPD".to_string(),
            device_cost,
            ntap_add_on,
        }
    }

    #[test]
    fn site_aliases_resolve() {
        assert_eq!(Site::normalize("inpatient"), Some(Site::Ipps));
        assert_eq!(Site::normalize("DRG"), Some(Site::Ipps));
        assert_eq!(Site::normalize("opps"), Some(Site::Hopd));
        assert_eq!(Site::normalize("hospital outpatient"), Some(Site::Hopd));
        assert_eq!(Site::normalize("HOSPITAL_OUTPATIENT"), Some(Site::Hopd));
        assert_eq!(Site::normalize("ambulatory"), Some(Site::Asc));
        assert_eq!(Site::normalize("physician"), Some(Site::Obl));
        assert_eq!(Site::normalize("non-facility"), Some(Site::Obl));
        assert_eq!(Site::normalize("clinic"), None);
    }

    #[test]
    fn validation_reports_every_problem() {
        let req = ScenarioRequest {
            code: "".to_string(),
            site_of_service: "moon base".to_string(),
            device_cost: -1.0,
            ntap_add_on: -2.0,
        };
        let Err(EngineError::Validation(errors)) = req.validate() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn classification_boundaries_are_inclusive() {
        let config = EngineConfig::default();
        // ratio exactly 0.10 -> profitable
        assert_eq!(
            classify_margin(10.0, 100.0, &config),
            Classification::Profitable
        );
        // ratio exactly -0.05 -> break-even
        assert_eq!(
            classify_margin(-5.0, 100.0, &config),
            Classification::BreakEven
        );
        assert_eq!(
            classify_margin(-5.01, 100.0, &config),
            Classification::Loss
        );
    }

    #[test]
    fn zero_total_classifies_on_margin_sign() {
        let config = EngineConfig::default();
        assert_eq!(classify_margin(0.0, 0.0, &config), Classification::BreakEven);
        assert_eq!(classify_margin(-1.0, 0.0, &config), Classification::Loss);
    }

    #[test]
    fn classification_depends_only_on_ratio() {
        let config = EngineConfig::default();
        assert_eq!(
            classify_margin(20.0, 100.0, &config),
            classify_margin(20_000.0, 100_000.0, &config)
        );
    }

    #[test]
    fn hopd_10000_device_5000_is_profitable() {
        let index = index_with_hopd_10000();
        let config = config_with_hopd(10_000.0);
        let r = calculate_scenario(&index, &config, &scenario(5_000.0, 0.0)).unwrap();
        assert_eq!(r.base_payment, 10_000.0);
        assert_eq!(r.total_payment, 10_000.0);
        assert_eq!(r.margin, 5_000.0);
        assert_eq!(r.margin_percentage, "50.0");
        assert_eq!(r.classification, Classification::Profitable);
    }

    #[test]
    fn five_percent_margin_is_break_even() {
        let index = index_with_hopd_10000();
        let config = config_with_hopd(10_000.0);
        let r = calculate_scenario(&index, &config, &scenario(9_500.0, 0.0)).unwrap();
        assert_eq!(r.margin, 500.0);
        assert_eq!(r.classification, Classification::BreakEven);
    }

    #[test]
    fn ntap_add_on_raises_total() {
        let index = index_with_hopd_10000();
        let config = config_with_hopd(10_000.0);
        let r = calculate_scenario(&index, &config, &scenario(11_000.0, 2_000.0)).unwrap();
        assert_eq!(r.total_payment, 12_000.0);
        assert_eq!(r.margin, 1_000.0);
    }

    #[test]
    fn increasing_cost_never_increases_margin() {
        let index = index_with_hopd_10000();
        let config = config_with_hopd(10_000.0);
        let mut last_margin = f64::INFINITY;
        for cost in [0.0, 2_500.0, 9_000.0, 10_500.0, 20_000.0] {
            let r = calculate_scenario(&index, &config, &scenario(cost, 0.0)).unwrap();
            assert!(r.margin <= last_margin);
            last_margin = r.margin;
        }
    }

    #[test]
    fn unknown_code_is_not_found() {
        let index = index_with_hopd_10000();
        let config = EngineConfig::default();
        let mut req = scenario(100.0, 0.0);
        req.code = "00000".to_string();
        assert!(matches!(
            calculate_scenario(&index, &config, &req),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn compare_includes_all_sites_sorted_by_margin() {
        let index = index_with_hopd_10000();
        let config = config_with_hopd(10_000.0);
        let r = compare_all_sites(&index, &config, "C9999", 5_000.0, 0.0).unwrap();
        assert_eq!(r.comparisons.len(), 4);
        for pair in r.comparisons.windows(2) {
            assert!(pair[0].margin >= pair[1].margin);
        }
        // IPPS = HOPD * 1.5 is the largest payment here.
        assert_eq!(r.best_site.as_ref().unwrap().site_key, "IPPS");
        assert_eq!(r.worst_site.as_ref().unwrap().site_key, "OBL");
    }
}
