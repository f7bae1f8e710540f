use crate::domain::{ControlCommand, InverterCommand, Mode, Source, Timestamp};
use crate::hardware::{AdapterError, InverterAdapter};
use crate::optimizer::PlanSlot;

pub fn command_from_slot(slot: &PlanSlot, now: Timestamp) -> ControlCommand {
    ControlCommand::new(slot.mode, slot.target_power_w, Source::Optimiser, now)
}

pub async fn dispatch_command(
    adapter: &dyn InverterAdapter,
    command: ControlCommand,
) -> Result<crate::domain::CommandResult, AdapterError> {
    let export_limit_w = if command.mode == Mode::SelfUseZeroExport { Some(0) } else { None };
    let inverter_cmd = InverterCommand { mode: command.mode, power_w: command.power_w.round() as i32, export_limit_w };

    tracing::info!(
        mode = %command.mode,
        power_w = command.power_w,
        source = %command.source,
        "dispatching control command"
    );

    let result = adapter.send_command(inverter_cmd).await?;
    if !result.success {
        tracing::error!(message = %result.message, "command dispatch failed");
    }
    Ok(result)
}
