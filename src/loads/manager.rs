use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::Timestamp;
use crate::optimizer::ScheduledLoad;

use super::types::{LoadController, LoadControllerError, LoadState, LoadStatus};

/// A command issued to a load, kept for the audit trail.
#[derive(Debug, Clone)]
pub struct LoadCommand {
    pub load_id: String,
    pub action: &'static str,
    pub reason: String,
    pub issued_at: Timestamp,
    pub success: bool,
}

/// Coordinates all registered load controllers: executes the scheduler's
/// slot assignments, sheds non-essential loads on a price spike or grid
/// overload, and restores them afterward.
pub struct LoadManager {
    controllers: Mutex<HashMap<String, Arc<dyn LoadController>>>,
    command_history: Mutex<Vec<LoadCommand>>,
    shed_loads: Mutex<HashSet<String>>,
}

impl LoadManager {
    pub fn new() -> Self {
        Self {
            controllers: Mutex::new(HashMap::new()),
            command_history: Mutex::new(Vec::new()),
            shed_loads: Mutex::new(HashSet::new()),
        }
    }

    pub fn register(&self, controller: Arc<dyn LoadController>) {
        let id = controller.load_id().to_string();
        let name = controller.name().to_string();
        self.controllers.lock().insert(id.clone(), controller);
        tracing::info!(load_id = %id, name = %name, "registered load controller");
    }

    pub fn unregister(&self, load_id: &str) {
        self.controllers.lock().remove(load_id);
    }

    pub fn command_history(&self) -> Vec<LoadCommand> {
        self.command_history.lock().clone()
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn LoadController>)> {
        self.controllers.lock().iter().map(|(id, c)| (id.clone(), c.clone())).collect()
    }

    fn record(&self, cmd: LoadCommand) {
        self.command_history.lock().push(cmd);
    }

    pub async fn get_all_statuses(&self) -> Vec<LoadStatus> {
        let mut statuses = Vec::new();
        for (_, controller) in self.snapshot() {
            if let Ok(status) = controller.get_status().await {
                statuses.push(status);
            }
        }
        statuses
    }

    /// Turns on loads assigned to `current_slot_index`; turns off loads
    /// currently shed for a spike that are still running.
    pub async fn execute_schedule(
        &self,
        scheduled: &[ScheduledLoad],
        current_slot_index: usize,
    ) -> Vec<LoadCommand> {
        let active_load_ids: HashSet<&str> = scheduled
            .iter()
            .filter(|s| s.assigned_slots.contains(&current_slot_index))
            .map(|s| s.load_id.as_str())
            .collect();

        let shed = self.shed_loads.lock().clone();
        let mut commands = Vec::new();

        for (load_id, controller) in self.snapshot() {
            let status = match controller.get_status().await {
                Ok(s) => s,
                Err(_) => continue,
            };

            if active_load_ids.contains(load_id.as_str()) {
                if status.state != LoadState::On {
                    let success = controller.turn_on().await.unwrap_or(false);
                    let cmd = LoadCommand {
                        load_id: load_id.clone(),
                        action: "on",
                        reason: "scheduled".to_string(),
                        issued_at: Timestamp::now(),
                        success,
                    };
                    self.record(cmd.clone());
                    commands.push(cmd);
                }
            } else if shed.contains(&load_id) && status.state != LoadState::Off {
                let success = controller.turn_off().await.unwrap_or(false);
                let cmd = LoadCommand {
                    load_id: load_id.clone(),
                    action: "off",
                    reason: "spike_shed".to_string(),
                    issued_at: Timestamp::now(),
                    success,
                };
                self.record(cmd.clone());
                commands.push(cmd);
            }
        }

        commands
    }

    /// Sheds every load whose priority class is below the household's
    /// essential cutoff (1-2 = essential, 3-5 = deferrable).
    pub async fn shed_for_spike(&self, max_priority: u8) -> Vec<LoadCommand> {
        let mut commands = Vec::new();

        for (load_id, controller) in self.snapshot() {
            if controller.priority_class() <= max_priority {
                continue;
            }
            if let Ok(status) = controller.get_status().await {
                if status.state == LoadState::On {
                    let success = controller.turn_off().await.unwrap_or(false);
                    let cmd = LoadCommand {
                        load_id: load_id.clone(),
                        action: "off",
                        reason: format!(
                            "spike_shed (priority {} > {})",
                            controller.priority_class(),
                            max_priority
                        ),
                        issued_at: Timestamp::now(),
                        success,
                    };
                    self.record(cmd.clone());
                    commands.push(cmd);
                }
            }
            self.shed_loads.lock().insert(load_id);
        }

        if !commands.is_empty() {
            tracing::warn!(count = commands.len(), "shed loads for spike event");
        }
        commands
    }

    /// Clears the spike-shed flags. Does not turn loads back on; the next
    /// `execute_schedule` call decides that from the current plan.
    pub async fn restore_after_spike(&self) -> Vec<LoadCommand> {
        let mut shed = self.shed_loads.lock();
        if !shed.is_empty() {
            tracing::info!(count = shed.len(), "cleared spike shed flags");
        }
        shed.clear();
        Vec::new()
    }

    /// Sheds least-essential loads (highest priority number first) until
    /// grid import would drop back under the configured maximum.
    pub async fn shed_for_overload(&self, grid_import_w: f64, max_grid_import_w: f64) -> Vec<LoadCommand> {
        if max_grid_import_w <= 0.0 {
            return Vec::new();
        }
        let excess_w = grid_import_w - max_grid_import_w;
        if excess_w <= 0.0 {
            return Vec::new();
        }

        let mut controllers = self.snapshot();
        controllers.sort_by(|a, b| b.1.priority_class().cmp(&a.1.priority_class()));

        let mut commands = Vec::new();
        let mut shed_total = 0.0;

        for (load_id, controller) in controllers {
            if shed_total >= excess_w {
                break;
            }
            let status = match controller.get_status().await {
                Ok(s) => s,
                Err(_) => continue,
            };
            if status.state == LoadState::On {
                let success = controller.turn_off().await.unwrap_or(false);
                let cmd = LoadCommand {
                    load_id: load_id.clone(),
                    action: "off",
                    reason: format!("overload_shed (grid {grid_import_w:.0}W > max {max_grid_import_w:.0}W)"),
                    issued_at: Timestamp::now(),
                    success,
                };
                self.record(cmd.clone());
                commands.push(cmd);
                shed_total += controller.power_w();
                self.shed_loads.lock().insert(load_id);
            }
        }

        if !commands.is_empty() {
            tracing::warn!(
                count = commands.len(),
                shed_total_w = shed_total,
                grid_import_w,
                max_grid_import_w,
                "shed loads for grid overload"
            );
        }
        commands
    }

    /// Emergency: unconditionally turns off every registered load.
    pub async fn turn_all_off(&self, reason: &str) -> Vec<LoadCommand> {
        let mut commands = Vec::new();
        for (load_id, controller) in self.snapshot() {
            let success = controller.turn_off().await.unwrap_or(false);
            let cmd = LoadCommand {
                load_id,
                action: "off",
                reason: reason.to_string(),
                issued_at: Timestamp::now(),
                success,
            };
            self.record(cmd.clone());
            commands.push(cmd);
        }
        tracing::warn!(reason, "all loads turned off");
        commands
    }
}

impl Default for LoadManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as PMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeLoad {
        id: String,
        power_w: f64,
        priority_class: u8,
        on: AtomicBool,
        fail_turn_off: PMutex<bool>,
    }

    impl FakeLoad {
        fn new(id: &str, power_w: f64, priority_class: u8) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                power_w,
                priority_class,
                on: AtomicBool::new(true),
                fail_turn_off: PMutex::new(false),
            })
        }
    }

    #[async_trait]
    impl LoadController for FakeLoad {
        fn load_id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn power_w(&self) -> f64 {
            self.power_w
        }
        fn priority_class(&self) -> u8 {
            self.priority_class
        }
        async fn turn_on(&self) -> Result<bool, LoadControllerError> {
            self.on.store(true, Ordering::SeqCst);
            Ok(true)
        }
        async fn turn_off(&self) -> Result<bool, LoadControllerError> {
            if *self.fail_turn_off.lock() {
                return Ok(false);
            }
            self.on.store(false, Ordering::SeqCst);
            Ok(true)
        }
        async fn get_status(&self) -> Result<LoadStatus, LoadControllerError> {
            Ok(LoadStatus {
                load_id: self.id.clone(),
                name: self.id.clone(),
                state: if self.on.load(Ordering::SeqCst) { LoadState::On } else { LoadState::Off },
                power_w: self.power_w,
                is_available: true,
                error: None,
            })
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn shed_for_spike_turns_off_deferrable_loads_only() {
        let mgr = LoadManager::new();
        mgr.register(FakeLoad::new("pool", 1200.0, 4));
        mgr.register(FakeLoad::new("fridge", 150.0, 1));

        let cmds = mgr.shed_for_spike(2).await;
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].load_id, "pool");
    }

    #[tokio::test]
    async fn shed_for_overload_sheds_until_excess_covered() {
        let mgr = LoadManager::new();
        mgr.register(FakeLoad::new("pool", 1200.0, 4));
        mgr.register(FakeLoad::new("ev", 3000.0, 5));

        let cmds = mgr.shed_for_overload(11_000.0, 10_000.0).await;
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].load_id, "ev");
    }

    #[tokio::test]
    async fn shed_for_overload_noop_under_limit() {
        let mgr = LoadManager::new();
        mgr.register(FakeLoad::new("pool", 1200.0, 4));
        let cmds = mgr.shed_for_overload(9_000.0, 10_000.0).await;
        assert!(cmds.is_empty());
    }

    #[tokio::test]
    async fn restore_after_spike_clears_shed_set_without_turning_on() {
        let mgr = LoadManager::new();
        mgr.register(FakeLoad::new("pool", 1200.0, 4));
        mgr.shed_for_spike(2).await;
        mgr.restore_after_spike().await;
        assert!(mgr.shed_loads.lock().is_empty());
    }

    #[tokio::test]
    async fn turn_all_off_commands_every_load() {
        let mgr = LoadManager::new();
        mgr.register(FakeLoad::new("pool", 1200.0, 4));
        mgr.register(FakeLoad::new("fridge", 150.0, 1));
        let cmds = mgr.turn_all_off("safety").await;
        assert_eq!(cmds.len(), 2);
        assert!(cmds.iter().all(|c| c.success));
    }
}
