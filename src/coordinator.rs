//! App-assembly layer: owns every piece of shared mutable state and spawns
//! the background tasks that keep it current. This is the one place that
//! wires config, the control loop, and the resilience/storm/accounting/load
//! components together; nothing downstream constructs its own copy of any
//! of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::accounting::{AccountingEngine, AccountingSummary};
use crate::config::AppConfig;
use crate::control::{ControlLoop, TelemetryObserver};
use crate::domain::{Telemetry, Timestamp};
use crate::error::CoreError;
use crate::forecast::{ForecastAggregator, HistoryAverages, HistoryMetric, ValidityWindows};
use crate::hardware::{InverterAdapter, SimulatedInverterAdapter};
use crate::loads::LoadManager;
use crate::optimizer::{RebuildEvaluator, ScheduledLoad};
use crate::resilience::{HealthChecker, ResilienceManager};
use crate::storm::StormMonitor;

const FORECAST_PROVIDER_NAMES: [&str; 2] = ["solar_forecast", "weather_forecast"];

/// Snapshot served by the `/status` ambient endpoint.
pub struct StatusSnapshot {
    pub resilience_level: String,
    pub tick_count: u64,
    pub last_telemetry_age_seconds: Option<i64>,
    pub plan_version: Option<u64>,
    pub accounting: AccountingSummary,
}

pub struct Coordinator {
    config: AppConfig,
    control_loop: Arc<ControlLoop<SimulatedInverterAdapter>>,
    resilience: Mutex<ResilienceManager>,
    health: Mutex<HealthChecker>,
    storm: Mutex<StormMonitor>,
    accounting: Arc<Mutex<AccountingEngine>>,
    history: Mutex<HistoryAverages>,
    loads: Arc<LoadManager>,
    aggregator: Arc<AsyncMutex<ForecastAggregator>>,
    rebuild_evaluator: Mutex<RebuildEvaluator>,
    scheduled_loads: Arc<Mutex<Vec<ScheduledLoad>>>,
    plan_version: AtomicU64,
    started_at: Timestamp,
}

/// Drives accounting and load shedding/scheduling off the telemetry the
/// control loop reads each tick (§4.9 step 2). Kept separate from
/// `Coordinator` so `ControlLoop` depends only on the `TelemetryObserver`
/// trait, not on the accounting/load types themselves.
struct TickObserver {
    accounting: Arc<Mutex<AccountingEngine>>,
    loads: Arc<LoadManager>,
    aggregator: Arc<AsyncMutex<ForecastAggregator>>,
    scheduled_loads: Arc<Mutex<Vec<ScheduledLoad>>>,
    control_loop: Arc<ControlLoop<SimulatedInverterAdapter>>,
    config: AppConfig,
}

#[async_trait]
impl TelemetryObserver for TickObserver {
    async fn on_telemetry(&self, telemetry: &Telemetry, now: Timestamp) {
        let tick_hours = self.config.planning.evaluation_interval_seconds as f64 / 3600.0;

        let (import_rate_cents, export_rate_cents, spike_active) = {
            let aggregator = self.aggregator.lock().await;
            let tariff = aggregator.state().tariff.as_ref();
            (
                tariff.and_then(|t| t.current_import_price(now)).unwrap_or(0.0),
                tariff.and_then(|t| t.current_export_price(now)).unwrap_or(0.0),
                aggregator.spike_detector().is_spike_active(),
            )
        };

        self.accounting.lock().record_tick(telemetry, import_rate_cents, export_rate_cents, tick_hours, now);

        if spike_active {
            self.loads.shed_for_spike(2).await;
        } else {
            self.loads.restore_after_spike().await;
        }
        self.loads
            .shed_for_overload(telemetry.grid_power_w.max(0.0), self.config.load_profile.max_grid_import_w)
            .await;

        if let Some(plan) = self.control_loop.current_plan() {
            if let Some(slot) = plan.slot_at(now) {
                let scheduled = self.scheduled_loads.lock().clone();
                self.loads.execute_schedule(&scheduled, slot.index).await;
            }
        }
    }
}

impl Coordinator {
    pub async fn new(config: AppConfig) -> Result<Self, CoreError> {
        let adapter = Arc::new(SimulatedInverterAdapter::new(
            config.battery.capacity.as_watt_hours(),
            config.battery.max_charge_rate_w,
            config.battery.max_discharge_rate_w,
            config.battery.initial_soc,
        ));
        adapter.connect().await?;

        let control_loop = Arc::new(ControlLoop::new(config.clone(), adapter));

        let mut health = HealthChecker::new(config.resilience.max_consecutive_failures);
        health.register("inverter");
        health.register("tariff");
        for name in FORECAST_PROVIDER_NAMES {
            health.register(name);
        }

        let resilience = ResilienceManager::new(FORECAST_PROVIDER_NAMES.iter().map(|s| s.to_string()).collect());
        let storm = StormMonitor::new(config.storm.clone());
        let accounting =
            Arc::new(Mutex::new(AccountingEngine::new(config.clone(), config.battery.initial_soc, config.battery.initial_wacb_cents)));
        let aggregator = Arc::new(AsyncMutex::new(ForecastAggregator::new(
            config.arbitrage.spike_threshold_cents,
            ValidityWindows::from(&config.providers),
        )));
        let loads = Arc::new(LoadManager::new());
        let scheduled_loads = Arc::new(Mutex::new(Vec::new()));

        control_loop.add_observer(Arc::new(TickObserver {
            accounting: Arc::clone(&accounting),
            loads: Arc::clone(&loads),
            aggregator: Arc::clone(&aggregator),
            scheduled_loads: Arc::clone(&scheduled_loads),
            control_loop: Arc::clone(&control_loop),
            config: config.clone(),
        }));

        Ok(Self {
            control_loop,
            resilience: Mutex::new(resilience),
            health: Mutex::new(health),
            storm: Mutex::new(storm),
            accounting,
            history: Mutex::new(HistoryAverages::new()),
            loads,
            aggregator,
            rebuild_evaluator: Mutex::new(RebuildEvaluator::new(config.clone())),
            scheduled_loads,
            plan_version: AtomicU64::new(0),
            started_at: Timestamp::now(),
            config,
        })
    }

    pub fn control_loop(&self) -> &Arc<ControlLoop<SimulatedInverterAdapter>> {
        &self.control_loop
    }

    pub fn loads(&self) -> &Arc<LoadManager> {
        &self.loads
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn status(&self) -> StatusSnapshot {
        let now = Timestamp::now();
        let last_telemetry = self.control_loop.last_telemetry();
        let accounting = self.accounting.lock().get_summary(now);

        StatusSnapshot {
            resilience_level: self.resilience.lock().current_level().to_string(),
            tick_count: self.control_loop.tick_count(),
            last_telemetry_age_seconds: last_telemetry.map(|t| t.age_seconds(now)),
            plan_version: self.control_loop.current_plan().map(|p| p.version),
            accounting,
        }
    }

    pub fn resilience_level(&self) -> crate::resilience::ResilienceLevel {
        self.resilience.lock().current_level()
    }

    /// Spawns the control loop's own tasks (tick + watchdog, see
    /// `ControlLoop::run`) plus this layer's health/resilience evaluation
    /// loop, the periodic history-flush task, and the planning loop (forecast
    /// refresh, rebuild evaluation, MILP solve, load scheduling). Returns
    /// once every task has been spawned; does not block.
    pub fn spawn_tasks(self: &Arc<Self>, token: CancellationToken) {
        let control_loop = Arc::clone(&self.control_loop);
        let control_token = token.clone();
        tokio::spawn(async move { control_loop.run(control_token).await });

        let this = Arc::clone(self);
        let health_token = token.clone();
        tokio::spawn(async move { this.health_loop(health_token).await });

        let this = Arc::clone(self);
        let history_token = token.clone();
        tokio::spawn(async move { this.history_flush_loop(history_token).await });

        let this = Arc::clone(self);
        tokio::spawn(async move { this.planning_loop(token).await });
    }

    async fn health_loop(&self, token: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.config.resilience.health_check_interval_seconds);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let inverter_connected = self.control_loop.adapter().is_connected().await;
            {
                let mut health = self.health.lock();
                if inverter_connected {
                    health.record_success("inverter");
                } else {
                    health.record_failure("inverter", "adapter not connected");
                }
            }

            let transitioned = {
                let health = self.health.lock();
                self.resilience.lock().evaluate(&health)
            };
            if transitioned {
                let level = self.resilience.lock().current_level();
                self.control_loop.update_resilience_level(level);
            }
        }
    }

    /// Every 30 minutes (the backpressure window the history flush batches
    /// on), feeds the last tick's telemetry into the running averages and
    /// the accounting engine's SOC sync.
    async fn history_flush_loop(&self, token: CancellationToken) {
        let interval = std::time::Duration::from_secs(30 * 60);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let Some(telemetry) = self.control_loop.last_telemetry() else { continue };
            let now = Timestamp::now();

            {
                let mut history = self.history.lock();
                history.record(HistoryMetric::Production, now, telemetry.solar_power_w);
                history.record(HistoryMetric::Consumption, now, telemetry.load_power_w);
            }

            self.accounting.lock().sync_soc(telemetry.soc);
            tracing::debug!(soc = telemetry.soc, "history flush recorded telemetry sample");
        }
    }

    /// Dataflow backbone: providers -> C1 (aggregator) -> C6 (rebuild
    /// evaluator) <-> C4 (MILP) -> plan, with C12 (storm) and C5 (load
    /// scheduling) folded in since they run on the same forecast refresh
    /// cadence.
    async fn planning_loop(&self, token: CancellationToken) {
        let interval = std::time::Duration::from_secs(self.config.planning.evaluation_interval_seconds);
        tracing::info!(interval_s = interval.as_secs(), "planning loop starting");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            self.run_planning_cycle().await;
        }
    }

    async fn run_planning_cycle(&self) {
        let now = Timestamp::now();

        let outcomes = self.aggregator.lock().await.update_all(true).await;
        for outcome in &outcomes {
            let mut health = self.health.lock();
            if outcome.success {
                health.record_success(outcome.provider.as_str());
            } else {
                health.record_failure(outcome.provider.as_str(), "forecast refresh failed");
            }
        }

        let storm_probability = self.aggregator.lock().await.state().storm_probability();
        if self.storm.lock().update(storm_probability) {
            let storm = self.storm.lock();
            self.control_loop.update_storm_state(storm.is_active(), storm.reserve_soc());
        }

        let Some(telemetry) = self.control_loop.last_telemetry() else {
            tracing::debug!("planning cycle: no telemetry yet, skipping rebuild check");
            return;
        };

        let rebuild = {
            let aggregator = self.aggregator.lock().await;
            let current_plan = self.control_loop.current_plan();
            self.rebuild_evaluator.lock().evaluate(current_plan.as_deref(), telemetry.soc, &aggregator, now)
        };

        if !rebuild.should_rebuild {
            return;
        }
        tracing::info!(reason = %rebuild.reason, trigger = ?rebuild.trigger, "rebuilding plan");

        #[cfg(feature = "optimization")]
        {
            let trigger = rebuild.trigger.unwrap_or(crate::optimizer::TriggerReason::Periodic);
            self.rebuild_plan(trigger, &telemetry, now).await;
        }
        #[cfg(not(feature = "optimization"))]
        {
            tracing::warn!("optimization feature disabled, cannot solve a new plan");
        }

        self.rebuild_evaluator.lock().mark_rebuilt(now);
    }

    #[cfg(feature = "optimization")]
    async fn rebuild_plan(&self, trigger_reason: crate::optimizer::TriggerReason, telemetry: &Telemetry, now: Timestamp) {
        let slot_minutes = self.config.planning.slot_duration_minutes as i64;
        let n_slots = (self.config.planning.horizon_hours as i64 * 60) / slot_minutes;
        let starts: Vec<Timestamp> =
            (0..n_slots).map(|i| now.add(crate::domain::Duration::minutes(slot_minutes * i))).collect();

        let history = self.history.lock().clone();
        let forecast_slots = self.aggregator.lock().await.build_forecast_slots(&starts, slot_minutes, &history);

        let solar_forecast_w: Vec<f64> = forecast_slots.iter().map(|s| s.pv_p50_w).collect();
        let load_forecast_w: Vec<f64> = starts
            .iter()
            .map(|&t| history.average_for(HistoryMetric::Consumption, t).unwrap_or_else(|| telemetry.load_power_w.max(0.0)))
            .collect();
        let import_rate_cents: Vec<f64> = forecast_slots.iter().map(|s| s.import_price_cents).collect();
        let export_rate_cents: Vec<f64> = forecast_slots.iter().map(|s| s.export_price_cents).collect();

        let spike_active = self.aggregator.lock().await.spike_detector().is_spike_active();
        let is_spike = vec![spike_active; forecast_slots.len()];

        let (storm_active, storm_reserve_soc) = {
            let storm = self.storm.lock();
            (storm.is_active(), storm.reserve_soc())
        };
        let wacb_cents = self.accounting.lock().wacb_cents();

        let solver_inputs = crate::optimizer::SolverInputs {
            solar_forecast_w,
            load_forecast_w,
            import_rate_cents,
            export_rate_cents,
            is_spike,
            slot_start_times: starts,
            current_soc: telemetry.soc,
            wacb_cents,
            storm_active,
            storm_reserve_soc,
        };

        let version = self.plan_version.fetch_add(1, Ordering::SeqCst) + 1;
        let mut plan = match crate::optimizer::solve(&self.config, &solver_inputs, trigger_reason, version) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(error = %e, "MILP solve failed structurally, keeping the prior plan");
                return;
            }
        };

        // Actual runtime credit tracking (deferrable loads already satisfied
        // today) is not wired up; every rebuild schedules from a clean slate.
        let scheduled = crate::optimizer::schedule_loads(
            &mut plan,
            &self.config.loads,
            spike_active,
            &std::collections::BTreeMap::new(),
        );
        *self.scheduled_loads.lock() = scheduled;

        self.control_loop.set_plan(Arc::new(plan));
    }
}
