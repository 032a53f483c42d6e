use std::collections::HashMap;

/// Numeric constants the payment and eligibility engines run on. These are
/// configuration, not rate-setting truth: the conversion factors and the APC
/// rate table are approximate 2025 values and every derived payment is an
/// estimate, not an authoritative CMS lookup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Physician fee schedule conversion factor, facility setting.
    pub facility_cf: f64,
    /// Physician fee schedule conversion factor, non-facility setting.
    pub non_facility_cf: f64,
    /// Inpatient estimate as a multiple of the outpatient payment.
    pub ipps_multiplier: f64,
    /// APC id -> approximate national payment rate.
    pub apc_rates: HashMap<i64, f64>,

    /// Margin ratio at or above which a scenario is profitable.
    pub profitable_min_margin: f64,
    /// Margin ratio at or above which a scenario is break-even.
    pub break_even_min_margin: f64,

    /// Share of the cost difference NTAP reimburses.
    pub ntap_percentage: f64,
    /// Hard cap on a single NTAP payment.
    pub ntap_max_cap: f64,
    /// Device cost must exceed drg_payment * this multiplier.
    pub ntap_cost_threshold_multiplier: f64,

    /// Pass-through eligibility window, in years from FDA approval.
    pub tpt_max_duration_years: f64,
    /// Share of the APC payment treated as already packaged.
    pub tpt_packaged_share: f64,
    /// Device cost must exceed apc_payment * this share to be significant.
    pub tpt_cost_significance_share: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            facility_cf: 33.89,
            non_facility_cf: 33.89,
            ipps_multiplier: 1.5,
            apc_rates: default_apc_rates(),
            profitable_min_margin: 0.10,
            break_even_min_margin: -0.05,
            ntap_percentage: 0.65,
            ntap_max_cap: 150_000.0,
            ntap_cost_threshold_multiplier: 1.0,
            tpt_max_duration_years: 3.0,
            tpt_packaged_share: 0.10,
            tpt_cost_significance_share: 0.15,
        }
    }
}

fn default_apc_rates() -> HashMap<i64, f64> {
    HashMap::from([
        (5193, 11_639.0),
        (5054, 2_850.0),
        (5055, 4_200.0),
        (5056, 6_500.0),
        (5183, 8_500.0),
        (5192, 9_200.0),
        (5194, 14_500.0),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_apc_table_covers_known_apcs() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.apc_rates.get(&5193), Some(&11_639.0));
        assert_eq!(cfg.apc_rates.len(), 7);
    }
}
