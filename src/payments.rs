use serde::Serialize;

use crate::config::EngineConfig;
use crate::record::{CodeRecord, CodeType};

/// Estimated payment per site of service, whole-dollar rounded. Zero means
/// "not applicable or unknown", not "free".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct SitePayments {
    pub ipps: f64,
    pub hopd: f64,
    pub asc: f64,
    pub obl: f64,
}

/// Derive per-site payment estimates from a code's rate metadata. Only CPT
/// and HCPCS codes price out; every other type is all-zero.
///
/// HOPD is derived first: ASC and IPPS fall back to fractions of it when an
/// APC rate is available. This is an estimation scheme over RVUs and a small
/// APC table, not an authoritative CMS rate lookup.
pub fn derive_payments(record: &CodeRecord, config: &EngineConfig) -> SitePayments {
    let mut p = SitePayments::default();
    if !matches!(record.code_type, CodeType::Cpt | CodeType::Hcpcs) {
        return p;
    }
    let Some(meta) = record.fee_metadata() else {
        return p;
    };

    let facility_rvu = meta.facility_rvu.unwrap_or(0.0);
    let nonfacility_rvu = meta.nonfacility_rvu.unwrap_or(0.0);

    if nonfacility_rvu > 0.0 {
        p.obl = (nonfacility_rvu * config.non_facility_cf).round();
    }

    let apc_rate = meta.apc.and_then(|apc| config.apc_rates.get(&apc).copied());
    if let Some(rate) = apc_rate {
        p.hopd = rate;
    } else if facility_rvu > 0.0 {
        p.hopd = (facility_rvu * config.facility_cf * 35.0).round();
    }

    if p.hopd > 0.0 {
        p.asc = (p.hopd * 0.65).round();
    } else if facility_rvu > 0.0 {
        p.asc = (facility_rvu * 50.0 * 20.0).round();
    }

    if p.hopd > 0.0 {
        p.ipps = (p.hopd * config.ipps_multiplier).round();
    } else if facility_rvu > 0.0 {
        p.ipps = (facility_rvu * config.facility_cf * 50.0).round();
    }

    p
}

impl SitePayments {
    pub fn for_site(&self, site: crate::reimbursement::Site) -> f64 {
        use crate::reimbursement::Site;
        match site {
            Site::Ipps => self.ipps,
            Site::Hopd => self.hopd,
            Site::Asc => self.asc,
            Site::Obl => self.obl,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::record::{RateMetadata, RawCode};

    fn record(code_type: &str, meta_key: &str, meta: RateMetadata) -> CodeRecord {
        CodeRecord::from_raw(RawCode {
            code: "36903".to_string(),
            description: "test".to_string(),
            code_type: Some(code_type.to_string()),
            labels: Vec::new(),
            metadata: HashMap::from([(meta_key.to_string(), meta)]),
        })
        .unwrap()
    }

    #[test]
    fn non_fee_types_price_to_zero() {
        for t in ["DX", "PCS", "OTHER"] {
            let rec = record(
                t,
                t,
                RateMetadata {
                    facility_rvu: Some(10.0),
                    nonfacility_rvu: Some(10.0),
                    ..Default::default()
                },
            );
            assert_eq!(derive_payments(&rec, &EngineConfig::default()), SitePayments::default());
        }
    }

    #[test]
    fn apc_rate_drives_hopd_asc_ipps() {
        let rec = record(
            "CPT",
            "CPT",
            RateMetadata {
                apc: Some(5193),
                facility_rvu: Some(21.76),
                nonfacility_rvu: Some(80.64),
                ..Default::default()
            },
        );
        let p = derive_payments(&rec, &EngineConfig::default());
        assert_eq!(p.hopd, 11_639.0);
        assert_eq!(p.asc, (11_639.0f64 * 0.65).round());
        assert_eq!(p.ipps, (11_639.0f64 * 1.5).round());
        assert_eq!(p.obl, (80.64f64 * 33.89).round());
    }

    #[test]
    fn rvu_fallback_when_apc_unknown() {
        let rec = record(
            "CPT",
            "CPT",
            RateMetadata {
                apc: Some(9999),
                facility_rvu: Some(10.0),
                ..Default::default()
            },
        );
        let p = derive_payments(&rec, &EngineConfig::default());
        let hopd = (10.0f64 * 33.89 * 35.0).round();
        assert_eq!(p.hopd, hopd);
        assert_eq!(p.asc, (hopd * 0.65).round());
        assert_eq!(p.ipps, (hopd * 1.5).round());
        assert_eq!(p.obl, 0.0);
    }

    #[test]
    fn hcpcs_metadata_key_is_honored() {
        let rec = record(
            "HCPCS",
            "HCPCS",
            RateMetadata {
                nonfacility_rvu: Some(2.5),
                ..Default::default()
            },
        );
        let p = derive_payments(&rec, &EngineConfig::default());
        assert_eq!(p.obl, (2.5f64 * 33.89).round());
        assert_eq!(p.hopd, 0.0);
        assert_eq!(p.asc, 0.0);
        assert_eq!(p.ipps, 0.0);
    }

    #[test]
    fn no_metadata_means_all_zero() {
        let rec = CodeRecord::from_raw(RawCode {
            code: "A0001".to_string(),
            description: "test".to_string(),
            code_type: Some("HCPCS".to_string()),
            labels: Vec::new(),
            metadata: HashMap::new(),
        })
        .unwrap();
        assert_eq!(derive_payments(&rec, &EngineConfig::default()), SitePayments::default());
    }
}
