use chrono::{Datelike, FixedOffset, TimeZone};
use serde::Serialize;

use crate::domain::Timestamp;

/// Running financial summary of a single billing cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BillingCycleSummary {
    pub cycle_start: Timestamp,
    pub cycle_end: Timestamp,
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub total_import_cost_cents: i64,
    pub total_export_revenue_cents: i64,
    pub total_self_consumption_value_cents: i64,
    pub total_arbitrage_profit_cents: i64,
    pub total_fixed_costs_cents: i64,
    pub net_cost_cents: i64,
}

impl BillingCycleSummary {
    fn new(cycle_start: Timestamp, cycle_end: Timestamp, days_elapsed: i64, days_remaining: i64) -> Self {
        Self {
            cycle_start,
            cycle_end,
            days_elapsed,
            days_remaining,
            total_import_cost_cents: 0,
            total_export_revenue_cents: 0,
            total_self_consumption_value_cents: 0,
            total_arbitrage_profit_cents: 0,
            total_fixed_costs_cents: 0,
            net_cost_cents: 0,
        }
    }

    fn update_net(&mut self) {
        self.net_cost_cents = self.total_import_cost_cents + self.total_fixed_costs_cents
            - self.total_export_revenue_cents
            - self.total_self_consumption_value_cents
            - self.total_arbitrage_profit_cents;
    }
}

/// Tracks billing cycle boundaries anchored to a fixed day-of-month and
/// accumulates per-cycle totals as events are recorded.
pub struct BillingCycleManager {
    billing_day: u32,
    current: Option<BillingCycleSummary>,
}

impl BillingCycleManager {
    pub fn new(billing_day: u32) -> Self {
        Self { billing_day, current: None }
    }

    pub fn current(&self) -> Option<&BillingCycleSummary> {
        self.current.as_ref()
    }

    /// Returns the cycle covering `now`, creating or rolling one over as needed.
    pub fn get_or_create_cycle(&mut self, now: Timestamp) -> BillingCycleSummary {
        let (start, end) = self.cycle_boundaries(now);

        if let Some(current) = self.current {
            if !current.cycle_start.is_after(&now) && now.is_before(&current.cycle_end) {
                let days_elapsed = now.duration_since(&current.cycle_start).as_days();
                let days_remaining = current.cycle_end.duration_since(&now).as_days().max(0);
                let refreshed = BillingCycleSummary { days_elapsed, days_remaining, ..current };
                self.current = Some(refreshed);
                return refreshed;
            }
        }

        let days_total = end.duration_since(&start).as_days();
        let days_elapsed = now.duration_since(&start).as_days();
        let summary = BillingCycleSummary::new(start, end, days_elapsed, (days_total - days_elapsed).max(0));
        self.current = Some(summary);
        summary
    }

    pub fn record_import(&mut self, cost_cents: i64) {
        if let Some(c) = self.current.as_mut() {
            c.total_import_cost_cents += cost_cents;
            c.update_net();
        }
    }

    pub fn record_export(&mut self, revenue_cents: i64) {
        if let Some(c) = self.current.as_mut() {
            c.total_export_revenue_cents += revenue_cents;
            c.update_net();
        }
    }

    pub fn record_self_consumption(&mut self, value_cents: i64) {
        if let Some(c) = self.current.as_mut() {
            c.total_self_consumption_value_cents += value_cents;
            c.update_net();
        }
    }

    pub fn record_arbitrage_profit(&mut self, profit_cents: i64) {
        if let Some(c) = self.current.as_mut() {
            c.total_arbitrage_profit_cents += profit_cents;
            c.update_net();
        }
    }

    pub fn set_fixed_costs(&mut self, fixed_costs_cents: i64) {
        if let Some(c) = self.current.as_mut() {
            c.total_fixed_costs_cents = fixed_costs_cents;
            c.update_net();
        }
    }

    /// `billing_day` clamped to the last day of the month when it doesn't
    /// exist there (e.g. day 31 in a February).
    fn day_in_month(&self, year: i32, month: u32) -> Timestamp {
        let tz = FixedOffset::east_opt(0).unwrap();
        if let Some(dt) = tz.with_ymd_and_hms(year, month, self.billing_day, 0, 0, 0).single() {
            return Timestamp(dt);
        }
        let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let first_of_next = tz.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).single().unwrap();
        Timestamp(first_of_next - chrono::Duration::days(1))
    }

    fn cycle_boundaries(&self, now: Timestamp) -> (Timestamp, Timestamp) {
        let year = now.year();
        let month = now.month();

        let mut start = self.day_in_month(year, month);
        if start.is_after(&now) {
            let (py, pm) = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
            start = self.day_in_month(py, pm);
        }

        let (ey, em) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let mut end = self.day_in_month(ey, em);
        if !end.is_after(&now) {
            let (ey2, em2) = if em == 12 { (ey + 1, 1) } else { (ey, em + 1) };
            end = self.day_in_month(ey2, em2);
        }

        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> Timestamp {
        Timestamp(FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(y, m, d, h, 0, 0).unwrap())
    }

    #[test]
    fn creates_cycle_spanning_billing_day_to_next() {
        let mut mgr = BillingCycleManager::new(1);
        let summary = mgr.get_or_create_cycle(ts(2026, 3, 15, 12));
        assert_eq!(summary.cycle_start.day(), 1);
        assert_eq!(summary.cycle_start.month(), 3);
        assert_eq!(summary.cycle_end.day(), 1);
        assert_eq!(summary.cycle_end.month(), 4);
    }

    #[test]
    fn before_billing_day_uses_previous_month_start() {
        let mut mgr = BillingCycleManager::new(15);
        let summary = mgr.get_or_create_cycle(ts(2026, 3, 5, 0));
        assert_eq!(summary.cycle_start.month(), 2);
        assert_eq!(summary.cycle_end.month(), 3);
    }

    #[test]
    fn billing_day_not_in_month_falls_back_to_last_day() {
        // billing_day=31 in February -> clamp to Feb 28 (2026 is not a leap year).
        let mut mgr = BillingCycleManager::new(31);
        let summary = mgr.get_or_create_cycle(ts(2026, 2, 20, 0));
        assert_eq!(summary.cycle_start.month(), 1);
        assert_eq!(summary.cycle_start.day(), 31);
        assert_eq!(summary.cycle_end.month(), 2);
        assert_eq!(summary.cycle_end.day(), 28);
    }

    #[test]
    fn accumulates_net_cost() {
        let mut mgr = BillingCycleManager::new(1);
        mgr.get_or_create_cycle(ts(2026, 3, 15, 12));
        mgr.record_import(1000);
        mgr.record_export(200);
        mgr.record_self_consumption(150);
        mgr.record_arbitrage_profit(50);
        mgr.set_fixed_costs(300);
        let c = mgr.current().unwrap();
        assert_eq!(c.net_cost_cents, 1000 + 300 - 200 - 150 - 50);
    }
}
