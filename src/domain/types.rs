use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

// ============================================================================
// Time Helper Types
// ============================================================================

/// Duration helper type for time intervals.
/// Wraps chrono::Duration with convenience methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(pub chrono::Duration);

impl Duration {
    pub fn seconds(secs: i64) -> Self {
        Self(chrono::Duration::seconds(secs))
    }

    pub fn minutes(mins: i64) -> Self {
        Self(chrono::Duration::minutes(mins))
    }

    pub fn hours(hours: i64) -> Self {
        Self(chrono::Duration::hours(hours))
    }

    pub fn days(days: i64) -> Self {
        Self(chrono::Duration::days(days))
    }

    pub fn as_seconds(&self) -> i64 {
        self.0.num_seconds()
    }

    pub fn as_minutes(&self) -> i64 {
        self.0.num_minutes()
    }

    pub fn as_hours(&self) -> i64 {
        self.0.num_hours()
    }

    pub fn as_hours_f64(&self) -> f64 {
        self.0.num_seconds() as f64 / 3600.0
    }

    pub fn as_days(&self) -> i64 {
        self.0.num_days()
    }

    pub fn inner(&self) -> chrono::Duration {
        self.0
    }
}

impl From<chrono::Duration> for Duration {
    fn from(d: chrono::Duration) -> Self {
        Self(d)
    }
}

impl From<Duration> for chrono::Duration {
    fn from(d: Duration) -> Self {
        d.0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.as_hours();
        let minutes = (self.as_seconds() % 3600) / 60;
        write!(f, "{}h{}m", hours, minutes)
    }
}

/// Timestamp helper type for specific points in time.
/// Wraps DateTime<FixedOffset> with convenience methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<FixedOffset>);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().fixed_offset())
    }

    pub fn from_unix(secs: i64) -> Option<Self> {
        chrono::DateTime::from_timestamp(secs, 0).map(|dt| Self(dt.fixed_offset()))
    }

    pub fn as_unix(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn add(&self, duration: Duration) -> Self {
        Self(self.0 + duration.0)
    }

    pub fn sub(&self, duration: Duration) -> Self {
        Self(self.0 - duration.0)
    }

    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        Duration(self.0 - other.0)
    }

    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// ISO weekday, Monday = 0 .. Sunday = 6, matching the load scheduler's `days_of_week` convention.
    pub fn weekday_index(&self) -> u8 {
        self.0.weekday().num_days_from_monday() as u8
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    pub fn inner(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<FixedOffset> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S %Z"))
    }
}

// ============================================================================
// Physical Unit Newtypes
// ============================================================================

/// Power in Watts (W). Sign conventions are context-dependent: battery power
/// positive = charging, grid power positive = importing (see telemetry module).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Power(pub f64);

impl Power {
    pub fn watts(w: f64) -> Self {
        Self(w)
    }

    pub fn kilowatts(kw: f64) -> Self {
        Self(kw * 1000.0)
    }

    pub fn as_watts(&self) -> f64 {
        self.0
    }

    pub fn as_kilowatts(&self) -> f64 {
        self.0 / 1000.0
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.abs() >= 1000.0 {
            write!(f, "{:.2} kW", self.as_kilowatts())
        } else {
            write!(f, "{:.1} W", self.0)
        }
    }
}

impl Add for Power {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Power {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Energy in Watt-hours (Wh).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Energy(pub f64);

impl Energy {
    pub fn watt_hours(wh: f64) -> Self {
        Self(wh)
    }

    pub fn kilowatt_hours(kwh: f64) -> Self {
        Self(kwh * 1000.0)
    }

    pub fn as_watt_hours(&self) -> f64 {
        self.0
    }

    pub fn as_kilowatt_hours(&self) -> f64 {
        self.0 / 1000.0
    }
}

impl fmt::Display for Energy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.abs() >= 1000.0 {
            write!(f, "{:.2} kWh", self.as_kilowatt_hours())
        } else {
            write!(f, "{:.1} Wh", self.0)
        }
    }
}

impl Add for Energy {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Energy {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Temperature in Celsius (°C).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Temperature(pub f64);

impl Temperature {
    pub fn celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn as_celsius(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C", self.0)
    }
}

/// A fraction in [0,1], used for state-of-charge and similar ratios.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Fraction(pub f64);

impl Fraction {
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn as_ratio(&self) -> f64 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        self.0 * 100.0
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.as_percent())
    }
}

/// Price in cents per kilowatt-hour (c/kWh), the unit every tariff figure in
/// this crate is expressed in. Export revenue is normalised positive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Price(pub f64);

impl Price {
    pub fn cents_per_kwh(price: f64) -> Self {
        Self(price)
    }

    pub fn as_cents_per_kwh(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} c/kWh", self.0)
    }
}

impl Mul<Energy> for Price {
    /// Cost in cents.
    type Output = f64;
    fn mul(self, energy: Energy) -> Self::Output {
        self.0 * energy.as_kilowatt_hours()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_conversions() {
        let power = Power::kilowatts(5.0);
        assert_eq!(power.as_watts(), 5000.0);
        assert_eq!(power.as_kilowatts(), 5.0);

        let power2 = Power::watts(2500.0);
        assert_eq!(power2.as_kilowatts(), 2.5);
    }

    #[test]
    fn test_power_arithmetic() {
        let p1 = Power::kilowatts(3.0);
        let p2 = Power::kilowatts(2.0);

        let sum = p1 + p2;
        assert_eq!(sum.as_kilowatts(), 5.0);

        let diff = p1 - p2;
        assert_eq!(diff.as_kilowatts(), 1.0);
    }

    #[test]
    fn test_power_display() {
        let p1 = Power::watts(500.0);
        assert_eq!(format!("{}", p1), "500.0 W");

        let p2 = Power::kilowatts(5.5);
        assert_eq!(format!("{}", p2), "5.50 kW");
    }

    #[test]
    fn test_energy_conversions() {
        let energy = Energy::kilowatt_hours(10.0);
        assert_eq!(energy.as_watt_hours(), 10000.0);
        assert_eq!(energy.as_kilowatt_hours(), 10.0);

        let energy2 = Energy::watt_hours(5000.0);
        assert_eq!(energy2.as_kilowatt_hours(), 5.0);
    }

    #[test]
    fn test_energy_arithmetic() {
        let e1 = Energy::kilowatt_hours(10.0);
        let e2 = Energy::kilowatt_hours(3.0);

        let sum = e1 + e2;
        assert_eq!(sum.as_kilowatt_hours(), 13.0);

        let diff = e1 - e2;
        assert_eq!(diff.as_kilowatt_hours(), 7.0);
    }

    #[test]
    fn test_fraction_clamping() {
        let f1 = Fraction::new(1.5);
        assert_eq!(f1.as_ratio(), 1.0);

        let f2 = Fraction::new(-0.2);
        assert_eq!(f2.as_ratio(), 0.0);

        let f3 = Fraction::new(0.5);
        assert_eq!(f3.as_percent(), 50.0);
    }

    #[test]
    fn test_price_energy_multiplication() {
        let price = Price::cents_per_kwh(2.0);
        let energy = Energy::kilowatt_hours(10.0);
        let cost = price * energy;
        assert_eq!(cost, 20.0);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let power = Power::kilowatts(5.0);
        let json = serde_json::to_string(&power).unwrap();
        let deserialized: Power = serde_json::from_str(&json).unwrap();
        assert_eq!(power, deserialized);
    }
}
