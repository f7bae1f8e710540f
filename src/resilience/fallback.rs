use crate::config::AppConfig;
use crate::domain::{ControlCommand, Mode, Source, Timestamp};

use super::modes::ResilienceLevel;

/// Picks the command to enforce when the optimiser's own plan can no longer
/// be trusted at the given resilience level. Priority follows the five-level
/// control hierarchy: a fallback command at priority 1 or 2 overrides the
/// optimiser and manual override; one at priority 3 only overrides the
/// optimiser; `Normal` produces no override (the caller keeps using the
/// plan/default command as usual).
pub fn get_fallback_command(level: ResilienceLevel, current_soc: f64, config: &AppConfig) -> ControlCommand {
    let now = Timestamp::now();
    match level {
        ResilienceLevel::Normal => {
            ControlCommand::with_priority(Mode::SelfUse, 0.0, Source::Fallback, 5, now)
        }
        ResilienceLevel::DegradedForecast | ResilienceLevel::DegradedTariff => {
            ControlCommand::with_priority(Mode::SelfUse, 0.0, Source::Fallback, 3, now)
        }
        ResilienceLevel::SafeMode => {
            let _ = current_soc;
            ControlCommand::with_priority(Mode::SelfUseZeroExport, 0.0, Source::Fallback, 2, now)
        }
        ResilienceLevel::DegradedHardware | ResilienceLevel::Offline => {
            let _ = &config.battery;
            ControlCommand::with_priority(Mode::SelfUse, 0.0, Source::Fallback, 1, now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn normal_level_passes_through_at_lowest_priority() {
        let cfg = AppConfig::test_default();
        let cmd = get_fallback_command(ResilienceLevel::Normal, 0.5, &cfg);
        assert_eq!(cmd.priority, 5);
        assert_eq!(cmd.mode, Mode::SelfUse);
    }

    #[test]
    fn safe_mode_blocks_export() {
        let cfg = AppConfig::test_default();
        let cmd = get_fallback_command(ResilienceLevel::SafeMode, 0.5, &cfg);
        assert_eq!(cmd.mode, Mode::SelfUseZeroExport);
        assert_eq!(cmd.priority, 2);
    }

    #[test]
    fn hardware_degradation_outranks_manual_and_optimiser() {
        let cfg = AppConfig::test_default();
        let cmd = get_fallback_command(ResilienceLevel::DegradedHardware, 0.5, &cfg);
        assert_eq!(cmd.priority, 1);
        assert!(cmd.priority < Source::Manual.priority());
        assert!(cmd.priority < Source::Optimiser.priority());
    }

    #[test]
    fn degraded_tariff_only_overrides_optimiser() {
        let cfg = AppConfig::test_default();
        let cmd = get_fallback_command(ResilienceLevel::DegradedTariff, 0.5, &cfg);
        assert_eq!(cmd.priority, 3);
        assert!(cmd.priority < Source::Optimiser.priority());
        assert!(cmd.priority > Source::Manual.priority());
    }
}
