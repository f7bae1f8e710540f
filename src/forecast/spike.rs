use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::Timestamp;

use super::types::TariffSchedule;

/// A detected price spike event, open until prices fall back below threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub peak_price_cents: f64,
    pub slots_affected: u32,
    pub active: bool,
}

/// Detects and tracks price spike events on every tariff update.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    spike_threshold_cents: f64,
    current: Option<SpikeEvent>,
    history: Vec<SpikeEvent>,
}

impl SpikeDetector {
    pub fn new(spike_threshold_cents: f64) -> Self {
        Self {
            spike_threshold_cents,
            current: None,
            history: Vec::new(),
        }
    }

    pub fn is_spike_active(&self) -> bool {
        self.current.as_ref().is_some_and(|e| e.active)
    }

    pub fn current_spike(&self) -> Option<&SpikeEvent> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[SpikeEvent] {
        &self.history
    }

    /// Check for a spike in the slot covering `now`. Returns true if the spike
    /// state (active/inactive) changed as a result of this call.
    pub fn evaluate(&mut self, schedule: &TariffSchedule, now: Timestamp) -> bool {
        let Some(slot) = schedule.slot_at(now) else {
            return self.end_spike_if_active(now);
        };

        let is_spike_price = slot.import_price_cents >= self.spike_threshold_cents;

        if is_spike_price && !self.is_spike_active() {
            self.current = Some(SpikeEvent {
                started_at: now,
                ended_at: None,
                peak_price_cents: slot.import_price_cents,
                slots_affected: 1,
                active: true,
            });
            warn!(
                price = slot.import_price_cents,
                threshold = self.spike_threshold_cents,
                "price spike detected"
            );
            return true;
        }

        if !is_spike_price && self.is_spike_active() {
            return self.end_spike_if_active(now);
        }

        if let Some(event) = self.current.as_mut().filter(|e| e.active) {
            event.peak_price_cents = event.peak_price_cents.max(slot.import_price_cents);
            event.slots_affected += 1;
        }

        false
    }

    /// Future slots above the spike threshold.
    pub fn upcoming_spikes<'a>(
        &self,
        schedule: &'a TariffSchedule,
        now: Timestamp,
    ) -> Vec<&'a super::types::TariffSlot> {
        schedule
            .slots
            .iter()
            .filter(|s| s.start.inner() > now.inner() && s.import_price_cents >= self.spike_threshold_cents)
            .collect()
    }

    fn end_spike_if_active(&mut self, now: Timestamp) -> bool {
        if let Some(mut event) = self.current.take().filter(|e| e.active) {
            event.ended_at = Some(now);
            event.active = false;
            info!(
                peak = event.peak_price_cents,
                slots = event.slots_affected,
                "price spike ended"
            );
            self.history.push(event);
            true
        } else {
            false
        }
    }
}
