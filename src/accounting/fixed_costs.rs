use crate::config::FixedCostsConfig;

/// Breakdown of fixed costs accrued over a billing period.
#[derive(Debug, Clone, Copy)]
pub struct FixedCostBreakdown {
    pub supply_charge_cents: i64,
    pub access_fee_cents: i64,
    pub hedging_cents: i64,
    pub total_cents: i64,
}

pub fn calculate_fixed_costs(
    config: &FixedCostsConfig,
    days_in_cycle: i64,
    total_consumption_kwh: f64,
) -> FixedCostBreakdown {
    let supply = config.monthly_supply_charge_cents;
    let access = config.daily_access_fee_cents * days_in_cycle;
    let hedging = (total_consumption_kwh * config.hedging_per_kwh_cents) as i64;

    FixedCostBreakdown {
        supply_charge_cents: supply,
        access_fee_cents: access,
        hedging_cents: hedging,
        total_cents: supply + access + hedging,
    }
}

/// Daily arbitrage profit needed to offset fixed costs over the cycle.
pub fn daily_arbitrage_target(
    config: &FixedCostsConfig,
    days_in_cycle: i64,
    estimated_daily_consumption_kwh: f64,
) -> f64 {
    let supply_daily = config.monthly_supply_charge_cents as f64 / days_in_cycle.max(1) as f64;
    let access_daily = config.daily_access_fee_cents as f64;
    let hedging_daily = estimated_daily_consumption_kwh * config.hedging_per_kwh_cents;

    supply_daily + access_daily + hedging_daily
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> FixedCostsConfig {
        FixedCostsConfig {
            monthly_supply_charge_cents: 30_000,
            daily_access_fee_cents: 200,
            hedging_per_kwh_cents: 5.0,
        }
    }

    #[test]
    fn breakdown_sums_components() {
        let b = calculate_fixed_costs(&cfg(), 30, 600.0);
        assert_eq!(b.supply_charge_cents, 30_000);
        assert_eq!(b.access_fee_cents, 6_000);
        assert_eq!(b.hedging_cents, 3_000);
        assert_eq!(b.total_cents, 39_000);
    }

    #[test]
    fn daily_target_divides_by_cycle_length() {
        let target = daily_arbitrage_target(&cfg(), 30, 20.0);
        assert!((target - (1_000.0 + 200.0 + 100.0)).abs() < 1e-6);
    }
}
