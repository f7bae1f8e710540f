//! Async control loop -- one tick per `evaluation_interval_seconds` (default
//! 300s), plus a faster watchdog task that re-sends the last dispatched
//! remote-control command so the inverter doesn't revert to self-use between
//! ticks. Both tasks share one `CancellationToken` stop signal.
//!
//! Within a tick, telemetry is read once and held for the rest of the tick --
//! no `.await` that could yield happens between reading SOC and evaluating
//! the hierarchy against it, so the hierarchy always sees a consistent
//! snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::domain::{ControlCommand, Mode, Source, Telemetry, Timestamp};
use crate::hardware::InverterAdapter;
use crate::optimizer::OptimisationPlan;
use crate::resilience::{get_fallback_command, ResilienceLevel};

use super::anti_oscillation::AntiOscillationGuard;
use super::command::{command_from_slot, dispatch_command};
use super::hierarchy::{evaluate_hierarchy, HierarchyInputs};
use super::manual_override::ManualOverride;

const REMOTE_MODES: [Mode; 2] = [Mode::ForceCharge, Mode::ForceDischarge];

/// Registered per §4.9 step 2 ("invoke registered telemetry callbacks");
/// called once per tick, right after telemetry is read and before the
/// hierarchy runs. `Coordinator` registers one to drive accounting and load
/// shedding/scheduling without `ControlLoop` depending on their types.
#[async_trait]
pub trait TelemetryObserver: Send + Sync {
    async fn on_telemetry(&self, telemetry: &Telemetry, now: Timestamp);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStats {
    pub tick_count: u64,
    pub last_tick_at: Option<Timestamp>,
    pub current_mode: Mode,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::SelfUse
    }
}

pub struct ControlLoop<A: InverterAdapter> {
    config: AppConfig,
    adapter: Arc<A>,
    manual_override: parking_lot::Mutex<ManualOverride>,
    anti_oscillation: parking_lot::Mutex<AntiOscillationGuard>,
    current_plan: RwLock<Option<Arc<OptimisationPlan>>>,
    last_telemetry: RwLock<Option<Telemetry>>,
    last_dispatched: parking_lot::Mutex<Option<ControlCommand>>,
    storm_active: std::sync::atomic::AtomicBool,
    storm_reserve_soc: parking_lot::Mutex<f64>,
    resilience_level: parking_lot::Mutex<ResilienceLevel>,
    tick_count: AtomicU64,
    observers: parking_lot::Mutex<Vec<Arc<dyn TelemetryObserver>>>,
}

impl<A: InverterAdapter + 'static> ControlLoop<A> {
    pub fn new(config: AppConfig, adapter: Arc<A>) -> Self {
        let anti_oscillation = AntiOscillationGuard::new(config.anti_oscillation.clone());
        Self {
            manual_override: parking_lot::Mutex::new(ManualOverride::default()),
            anti_oscillation: parking_lot::Mutex::new(anti_oscillation),
            current_plan: RwLock::new(None),
            last_telemetry: RwLock::new(None),
            last_dispatched: parking_lot::Mutex::new(None),
            storm_active: std::sync::atomic::AtomicBool::new(false),
            storm_reserve_soc: parking_lot::Mutex::new(0.0),
            resilience_level: parking_lot::Mutex::new(ResilienceLevel::Normal),
            tick_count: AtomicU64::new(0),
            observers: parking_lot::Mutex::new(Vec::new()),
            config,
            adapter,
        }
    }

    pub fn set_plan(&self, plan: Arc<OptimisationPlan>) {
        *self.current_plan.write() = Some(plan);
    }

    /// Registers a telemetry observer invoked once per tick (§4.9 step 2).
    pub fn add_observer(&self, observer: Arc<dyn TelemetryObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn current_plan(&self) -> Option<Arc<OptimisationPlan>> {
        self.current_plan.read().clone()
    }

    pub fn last_telemetry(&self) -> Option<Telemetry> {
        *self.last_telemetry.read()
    }

    pub fn manual_override(&self) -> &parking_lot::Mutex<ManualOverride> {
        &self.manual_override
    }

    pub fn update_storm_state(&self, active: bool, reserve_soc: f64) {
        self.storm_active.store(active, Ordering::SeqCst);
        *self.storm_reserve_soc.lock() = reserve_soc;
    }

    /// Called by the resilience manager whenever its level changes. The next
    /// tick's fallback candidate is drawn from this level.
    pub fn update_resilience_level(&self, level: ResilienceLevel) {
        *self.resilience_level.lock() = level;
    }

    pub fn resilience_level(&self) -> ResilienceLevel {
        *self.resilience_level.lock()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    /// Runs the main tick loop and the watchdog refresh loop until `token` is
    /// cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.config.planning.evaluation_interval_seconds);
        tracing::info!(interval_s = interval.as_secs(), "control loop starting");

        let watchdog = {
            let this = Arc::clone(&self);
            let token = token.clone();
            tokio::spawn(async move { this.watchdog_loop(token).await })
        };

        loop {
            self.tick().await;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        watchdog.abort();
        tracing::info!(ticks = self.tick_count(), "control loop stopped");
    }

    async fn watchdog_loop(&self, token: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.config.hardware.remote_refresh_interval_seconds);
        tracing::info!(interval_s = interval.as_secs(), "watchdog refresh loop starting");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let cmd = *self.last_dispatched.lock();
            let Some(cmd) = cmd else { continue };
            if !REMOTE_MODES.contains(&cmd.mode) {
                continue;
            }

            match dispatch_command(self.adapter.as_ref(), cmd).await {
                Ok(result) if result.success => {
                    tracing::debug!(mode = %cmd.mode, latency_ms = result.latency_ms, "command refresh sent");
                }
                Ok(result) => tracing::warn!(message = %result.message, "command refresh failed"),
                Err(e) => tracing::warn!(error = %e, "command refresh error"),
            }
        }
    }

    /// Executes a single tick; `pub` so tests can drive it without waiting
    /// on the interval.
    pub async fn tick(&self) -> Option<ControlCommand> {
        self.tick_count.fetch_add(1, Ordering::SeqCst);
        let now = Timestamp::now();

        let telemetry = match self.adapter.get_telemetry().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read telemetry, skipping tick");
                return None;
            }
        };
        *self.last_telemetry.write() = Some(telemetry);

        let observers = self.observers.lock().clone();
        for observer in &observers {
            observer.on_telemetry(&telemetry, now).await;
        }

        let plan_command = self.determine_command(&telemetry, now);

        let inputs = HierarchyInputs {
            current_soc: telemetry.soc,
            soc_min_hard: self.config.battery.soc_min_hard,
            soc_max_hard: self.config.battery.soc_max_hard,
            storm_active: self.storm_active.load(Ordering::SeqCst),
            storm_reserve_soc: *self.storm_reserve_soc.lock(),
            grid_available: telemetry.grid_available,
        };
        let hierarchy_result = evaluate_hierarchy(plan_command, &inputs, now);
        let final_command = hierarchy_result.command;

        if !self.anti_oscillation.lock().should_allow(&final_command, Some(telemetry.soc)) {
            tracing::debug!("tick: command suppressed by anti-oscillation");
            return None;
        }

        let result = dispatch_command(self.adapter.as_ref(), final_command).await;
        match result {
            Ok(r) if r.success => {
                self.anti_oscillation.lock().record_command(&final_command);
                *self.last_dispatched.lock() = Some(final_command);
                tracing::info!(
                    mode = %final_command.mode,
                    power_w = final_command.power_w,
                    source = %final_command.source,
                    level = hierarchy_result.winning_level,
                    "tick dispatched"
                );
            }
            Ok(r) => tracing::warn!(message = %r.message, "tick dispatch rejected"),
            Err(e) => tracing::warn!(error = %e, "tick dispatch error"),
        }

        Some(final_command)
    }

    /// Picks the lowest-priority-number candidate among the resilience
    /// fallback, a manual override, the current plan slot, and the default.
    /// `evaluate_hierarchy` still has the final say on safety/storm overrides.
    fn determine_command(&self, telemetry: &Telemetry, now: Timestamp) -> ControlCommand {
        let level = self.resilience_level();
        let fallback = (level != ResilienceLevel::Normal)
            .then(|| get_fallback_command(level, telemetry.soc, &self.config));

        let plan_slot = self
            .current_plan()
            .and_then(|plan| plan.slot_at(now).map(|slot| command_from_slot(slot, now)));

        let candidates = [
            self.manual_override.lock().command(now),
            plan_slot,
            fallback,
            Some(ControlCommand::new(Mode::SelfUse, 0.0, Source::Default, now)),
        ];

        candidates
            .into_iter()
            .flatten()
            .min_by_key(|cmd| cmd.priority)
            .expect("default candidate is always present")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::hardware::SimulatedInverterAdapter;
    use crate::optimizer::{OptimisationPlan, PlanMetrics, PlanSlot, PlanStatus, TriggerReason};

    fn loop_with_adapter() -> ControlLoop<SimulatedInverterAdapter> {
        let config = AppConfig::test_default();
        let adapter = Arc::new(SimulatedInverterAdapter::new(13_500.0, 5000.0, 5000.0, 0.5));
        ControlLoop::new(config, adapter)
    }

    fn telemetry(soc: f64, now: Timestamp) -> Telemetry {
        Telemetry {
            soc,
            battery_power_w: 0.0,
            solar_power_w: 0.0,
            grid_power_w: 0.0,
            load_power_w: 0.0,
            voltage_v: None,
            temperature_c: None,
            grid_available: true,
            timestamp: now,
        }
    }

    fn plan_with_slot(now: Timestamp, mode: Mode) -> Arc<OptimisationPlan> {
        let slot = PlanSlot {
            index: 0,
            start: now.sub(crate::domain::Duration::minutes(1)),
            end: now.add(crate::domain::Duration::minutes(29)),
            mode,
            target_power_w: 1000.0,
            expected_soc: 0.5,
            import_rate_cents: 20.0,
            export_rate_cents: 5.0,
            solar_forecast_w: 0.0,
            load_forecast_w: 0.0,
            scheduled_loads: Vec::new(),
            constraint_flags: Vec::new(),
        };
        Arc::new(OptimisationPlan {
            version: 1,
            created_at: now,
            trigger_reason: TriggerReason::Initial,
            horizon_start: slot.start,
            horizon_end: slot.end,
            slots: vec![slot],
            objective_score: 0.0,
            solver_time_ms: 0,
            active_constraints: Vec::new(),
            metrics: PlanMetrics {
                status: PlanStatus::Optimal,
                n_slots: 1,
                current_soc: 0.5,
                wacb_cents: 0.0,
                storm_active: false,
            },
        })
    }

    #[test]
    fn default_wins_with_no_plan_no_override_no_fallback() {
        let loop_ = loop_with_adapter();
        let now = Timestamp::now();
        let cmd = loop_.determine_command(&telemetry(0.5, now), now);
        assert_eq!(cmd.source, Source::Default);
        assert_eq!(cmd.mode, Mode::SelfUse);
    }

    #[test]
    fn plan_slot_outranks_default_when_normal() {
        let loop_ = loop_with_adapter();
        let now = Timestamp::now();
        loop_.set_plan(plan_with_slot(now, Mode::ForceCharge));

        let cmd = loop_.determine_command(&telemetry(0.5, now), now);
        assert_eq!(cmd.source, Source::Optimiser);
        assert_eq!(cmd.mode, Mode::ForceCharge);
    }

    #[test]
    fn degraded_fallback_outranks_a_stale_plan() {
        let loop_ = loop_with_adapter();
        let now = Timestamp::now();
        loop_.set_plan(plan_with_slot(now, Mode::ForceDischarge));
        loop_.update_resilience_level(ResilienceLevel::Offline);

        let cmd = loop_.determine_command(&telemetry(0.5, now), now);
        assert_eq!(cmd.source, Source::Fallback);
    }

    #[test]
    fn manual_override_wins_the_priority_tie_against_a_same_tier_fallback() {
        // DegradedTariff's fallback also carries priority 3, same as manual
        // override; on a tie the earlier candidate (manual) wins.
        let loop_ = loop_with_adapter();
        let now = Timestamp::now();
        loop_.set_plan(plan_with_slot(now, Mode::ForceCharge));
        loop_.update_resilience_level(ResilienceLevel::DegradedTariff);
        loop_.manual_override.lock().set(Mode::ForceDischarge, 2000.0, Some(60));

        let cmd = loop_.determine_command(&telemetry(0.5, now), now);
        assert_eq!(cmd.source, Source::Manual);
        assert_eq!(cmd.mode, Mode::ForceDischarge);
    }

    #[test]
    fn critical_fallback_outranks_a_manual_override() {
        // Offline's fallback carries priority 1, stricter than manual's fixed
        // 3 -- a degraded-hardware fallback cannot be overridden by hand.
        let loop_ = loop_with_adapter();
        let now = Timestamp::now();
        loop_.update_resilience_level(ResilienceLevel::Offline);
        loop_.manual_override.lock().set(Mode::ForceDischarge, 2000.0, Some(60));

        let cmd = loop_.determine_command(&telemetry(0.5, now), now);
        assert_eq!(cmd.source, Source::Fallback);
    }
}
