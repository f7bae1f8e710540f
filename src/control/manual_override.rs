//! User-forced operating mode with a timeout. Takes precedence over the
//! optimiser (priority 3) but not over safety or storm reserve (1, 2) --
//! the hierarchy still applies on top of whatever this returns.

use std::time::Instant;

use crate::domain::{ControlCommand, Mode, Source, Timestamp};

const DEFAULT_TIMEOUT_SECONDS: u64 = 4 * 3600;

#[derive(Debug, Clone, Copy)]
struct OverrideState {
    mode: Mode,
    power_w: f64,
    set_at: Instant,
    timeout_seconds: u64,
}

pub struct ManualOverride {
    state: Option<OverrideState>,
    default_timeout_seconds: u64,
}

impl Default for ManualOverride {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECONDS)
    }
}

impl ManualOverride {
    pub fn new(default_timeout_seconds: u64) -> Self {
        Self { state: None, default_timeout_seconds }
    }

    /// Active and not timed out. Mutates state to clear on timeout.
    pub fn is_active(&mut self) -> bool {
        match self.state {
            Some(s) if s.set_at.elapsed().as_secs() >= s.timeout_seconds => {
                self.clear();
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn remaining_seconds(&self) -> u64 {
        match self.state {
            Some(s) => s.timeout_seconds.saturating_sub(s.set_at.elapsed().as_secs()),
            None => 0,
        }
    }

    pub fn set(&mut self, mode: Mode, power_w: f64, timeout_seconds: Option<u64>) {
        self.state = Some(OverrideState {
            mode,
            power_w,
            set_at: Instant::now(),
            timeout_seconds: timeout_seconds.unwrap_or(self.default_timeout_seconds),
        });
        tracing::info!(mode = %mode, power_w, "manual override activated");
    }

    pub fn clear(&mut self) {
        if self.state.take().is_some() {
            tracing::info!("manual override cleared");
        }
    }

    pub fn command(&mut self, now: Timestamp) -> Option<ControlCommand> {
        if !self.is_active() {
            return None;
        }
        let s = self.state.unwrap();
        Some(ControlCommand::with_priority(s.mode, s.power_w, Source::Manual, 3, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_returns_command_while_active() {
        let mut ov = ManualOverride::new(3600);
        ov.set(Mode::ForceCharge, 2000.0, None);
        let cmd = ov.command(Timestamp::now()).unwrap();
        assert_eq!(cmd.mode, Mode::ForceCharge);
        assert_eq!(cmd.priority, 3);
    }

    #[test]
    fn inactive_override_returns_none() {
        let mut ov = ManualOverride::new(3600);
        assert!(ov.command(Timestamp::now()).is_none());
    }

    #[test]
    fn clear_deactivates() {
        let mut ov = ManualOverride::new(3600);
        ov.set(Mode::ForceCharge, 2000.0, None);
        ov.clear();
        assert!(ov.command(Timestamp::now()).is_none());
    }
}
