use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::domain::{Energy, Price, Timestamp};

/// Kind of financial event recorded against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountingEventKind {
    GridImport,
    GridExport,
    SelfConsumption,
}

/// A single accounting event. `cost_cents` is signed: positive is a cost,
/// negative is revenue or savings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountingEvent {
    pub kind: AccountingEventKind,
    pub energy_wh: f64,
    pub rate_cents: f64,
    pub cost_cents: i64,
    pub cost_basis_cents: i64,
    pub profit_loss_cents: i64,
    pub timestamp: Timestamp,
}

pub fn create_import_event(energy: Energy, rate: Price, now: Timestamp) -> AccountingEvent {
    let cost = (rate * energy) as i64;
    AccountingEvent {
        kind: AccountingEventKind::GridImport,
        energy_wh: energy.as_watt_hours(),
        rate_cents: rate.as_cents_per_kwh(),
        cost_cents: cost,
        cost_basis_cents: 0,
        profit_loss_cents: 0,
        timestamp: now,
    }
}

pub fn create_export_event(energy: Energy, rate: Price, cost_basis_cents: i64, now: Timestamp) -> AccountingEvent {
    let revenue = (rate * energy) as i64;
    let profit = revenue - cost_basis_cents;
    AccountingEvent {
        kind: AccountingEventKind::GridExport,
        energy_wh: energy.as_watt_hours(),
        rate_cents: rate.as_cents_per_kwh(),
        cost_cents: -revenue,
        cost_basis_cents,
        profit_loss_cents: profit,
        timestamp: now,
    }
}

pub fn create_self_consumption_event(energy: Energy, avoided_rate: Price, now: Timestamp) -> AccountingEvent {
    let value = (avoided_rate * energy) as i64;
    AccountingEvent {
        kind: AccountingEventKind::SelfConsumption,
        energy_wh: energy.as_watt_hours(),
        rate_cents: avoided_rate.as_cents_per_kwh(),
        cost_cents: -value,
        cost_basis_cents: 0,
        profit_loss_cents: 0,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_profit_is_revenue_minus_cost_basis() {
        let now = Timestamp::from_unix(1_704_844_800).unwrap();
        let event = create_export_event(Energy::watt_hours(2000.0), Price::cents_per_kwh(25.0), 20, now);

        assert_eq!(event.profit_loss_cents, 30);
        assert_eq!(event.cost_cents, -50);
    }

    #[test]
    fn import_event_has_no_profit_or_cost_basis() {
        let now = Timestamp::from_unix(1_704_844_800).unwrap();
        let event = create_import_event(Energy::watt_hours(1000.0), Price::cents_per_kwh(30.0), now);

        assert_eq!(event.cost_cents, 30);
        assert_eq!(event.profit_loss_cents, 0);
        assert_eq!(event.cost_basis_cents, 0);
    }
}
