use crate::capability::{
    Capability, CapabilityModule, CharValue, Characteristic, ModuleContext, ModuleDescriptor,
    ServiceKind, keys,
};
use crate::device::DeviceModel;
use crate::error::CoreError;
use crate::model::keys::{
    ELAPSED_PROGRAM_TIME, OPERATION_STATE, PROGRAM_PROGRESS, REMAINING_PROGRAM_TIME,
};

use super::active_program::ProgramState;

/// Upper bound of the remaining-duration characteristic, in seconds.
pub const MAX_REMAINING_SECS: i64 = 3600 * 24;

/// Remaining seconds of the active program; zero when idle.
///
/// Prefers the reported remaining time. Appliances that only report
/// elapsed time and progress get a linear estimate.
pub fn remaining_secs(device: &dyn DeviceModel) -> i64 {
    if !ProgramState::of(device).active {
        return 0;
    }

    let value = |key| device.item(key).and_then(|item| item.as_i64());
    let remaining = value(REMAINING_PROGRAM_TIME).or_else(|| {
        let elapsed = value(ELAPSED_PROGRAM_TIME)?;
        let progress = value(PROGRAM_PROGRESS).filter(|p| (1..100).contains(p))?;
        Some(elapsed.saturating_mul(100 - progress) / progress)
    });

    remaining.unwrap_or(0).clamp(0, MAX_REMAINING_SECS)
}

/// Remaining program time on the power switch.
#[derive(Default)]
pub struct RemainingTimeModule;

impl RemainingTimeModule {
    pub fn new() -> Self {
        Self
    }
}

impl CapabilityModule for RemainingTimeModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("remaining_time")
            .requires(Capability::ActiveProgram)
            .provides(Capability::RemainingTime)
    }

    fn attach(&mut self, ctx: &ModuleContext) -> Result<(), CoreError> {
        let Some(service) = ctx.surface(Capability::ActiveProgram) else {
            return Ok(());
        };
        if !ctx.allows(ServiceKind::Switch, "Remaining Time", None) {
            return Ok(());
        }
        ctx.provide(Capability::RemainingTime, std::sync::Arc::clone(&service));

        ctx.watch_status(
            keys(&[
                OPERATION_STATE,
                REMAINING_PROGRAM_TIME,
                ELAPSED_PROGRAM_TIME,
                PROGRAM_PROGRESS,
            ]),
            move |device| {
                service.update(
                    Characteristic::RemainingDuration,
                    CharValue::Int(remaining_secs(device)),
                );
            },
        );
        Ok(())
    }
}
