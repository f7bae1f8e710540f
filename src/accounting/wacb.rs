use crate::domain::{Energy, Price};

/// Snapshot of the weighted-average-cost-basis tracking state.
#[derive(Debug, Clone, Copy, Default)]
pub struct WacbState {
    pub wacb_cents: f64,
    pub stored_wh: f64,
    pub total_charged_wh: f64,
    pub total_cost_cents: f64,
}

/// Tracks the weighted-average cost per kWh of energy currently stored in the
/// battery. Grid charges cost the import rate; PV charges cost the feed-in
/// rate (the revenue forgone by not exporting it instead).
#[derive(Debug, Clone)]
pub struct CostBasisTracker {
    capacity_wh: f64,
    state: WacbState,
}

impl CostBasisTracker {
    pub fn new(capacity: Energy, initial_soc: f64, initial_wacb_cents: f64) -> Self {
        let capacity_wh = capacity.as_watt_hours();
        Self {
            capacity_wh,
            state: WacbState {
                wacb_cents: initial_wacb_cents,
                stored_wh: initial_soc * capacity_wh,
                total_charged_wh: 0.0,
                total_cost_cents: 0.0,
            },
        }
    }

    pub fn state(&self) -> WacbState {
        self.state
    }

    pub fn wacb_cents(&self) -> f64 {
        self.state.wacb_cents
    }

    /// Total value of the energy currently held in the battery, at cost.
    pub fn stored_value_cents(&self) -> f64 {
        (self.state.stored_wh / 1000.0) * self.state.wacb_cents
    }

    /// `wacb' = (prev_stored·wacb + E·R) / (prev_stored + E)`.
    pub fn record_charge(&mut self, energy: Energy, rate: Price) {
        let energy_wh = energy.as_watt_hours();
        if energy_wh <= 0.0 {
            return;
        }

        let energy_kwh = energy_wh / 1000.0;
        let cost = energy_kwh * rate.as_cents_per_kwh();

        let prev_stored_kwh = self.state.stored_wh / 1000.0;
        let prev_cost = prev_stored_kwh * self.state.wacb_cents;

        let new_stored_kwh = prev_stored_kwh + energy_kwh;
        let new_total_cost = prev_cost + cost;

        if new_stored_kwh > 0.0 {
            self.state.wacb_cents = new_total_cost / new_stored_kwh;
        }
        self.state.stored_wh = new_stored_kwh * 1000.0;
        self.state.total_charged_wh += energy_wh;
        self.state.total_cost_cents += cost;

        tracing::debug!(
            energy_wh,
            rate_cents = rate.as_cents_per_kwh(),
            wacb_cents = self.state.wacb_cents,
            stored_wh = self.state.stored_wh,
            "wacb updated on charge"
        );
    }

    /// Removes `energy` from the tracked store at the current WACB; the WACB
    /// itself is unchanged -- it is the average cost of what remains.
    /// Returns the cost basis of the discharged energy, in cents.
    pub fn record_discharge(&mut self, energy: Energy) -> f64 {
        let energy_wh = energy.as_watt_hours();
        if energy_wh <= 0.0 {
            return 0.0;
        }

        let energy_kwh = energy_wh / 1000.0;
        let cost_basis = energy_kwh * self.state.wacb_cents;

        self.state.stored_wh = (self.state.stored_wh - energy_wh).max(0.0);

        cost_basis
    }

    /// Corrects drift between tracked and actual stored energy using a fresh
    /// SOC reading; does not touch the WACB.
    pub fn sync_soc(&mut self, soc: f64) {
        self.state.stored_wh = soc * self.capacity_wh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_moves_wacb_toward_new_rate() {
        let mut t = CostBasisTracker::new(Energy::kilowatt_hours(10.0), 0.5, 10.0);
        assert_eq!(t.wacb_cents(), 10.0);
        t.record_charge(Energy::kilowatt_hours(5.0), Price::cents_per_kwh(20.0));
        // (5kWh*10 + 5kWh*20) / 10kWh = 15
        assert!((t.wacb_cents() - 15.0).abs() < 1e-9);
        assert_eq!(t.state().stored_wh, 10_000.0);
    }

    #[test]
    fn discharge_preserves_wacb_and_floors_stored_at_zero() {
        let mut t = CostBasisTracker::new(Energy::kilowatt_hours(1.0), 0.5, 10.0);
        let basis = t.record_discharge(Energy::kilowatt_hours(2.0));
        assert_eq!(t.wacb_cents(), 10.0);
        assert_eq!(t.state().stored_wh, 0.0);
        assert!((basis - 20.0).abs() < 1e-9);
    }

    #[test]
    fn zero_energy_charge_is_a_no_op() {
        let mut t = CostBasisTracker::new(Energy::kilowatt_hours(10.0), 0.5, 10.0);
        t.record_charge(Energy::watt_hours(0.0), Price::cents_per_kwh(99.0));
        assert_eq!(t.wacb_cents(), 10.0);
    }
}
