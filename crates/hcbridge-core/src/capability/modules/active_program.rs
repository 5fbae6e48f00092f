use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::capability::{
    Capability, CapabilityModule, CharValue, Characteristic, ModuleContext, ModuleDescriptor,
    Service, ServiceKind, keys,
};
use crate::device::DeviceModel;
use crate::error::CoreError;
use crate::model::keys::{ACTIVE_OPERATION_STATES, OPERATION_STATE};
use crate::serializer::UpdateSerializer;

/// Program state as seen from `OperationState` and connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramState {
    pub active: bool,
    pub in_use: bool,
    pub fault: bool,
}

impl ProgramState {
    pub fn of(device: &dyn DeviceModel) -> Self {
        if !device.is_connected() {
            return Self {
                active: false,
                in_use: false,
                fault: true,
            };
        }

        let state = device.item(OPERATION_STATE);
        let is = |suffix: &str| state.as_ref().is_some_and(|s| s.is_enum(suffix));
        Self {
            active: ACTIVE_OPERATION_STATES.iter().any(|s| is(s)),
            in_use: is("Run"),
            fault: is("Error"),
        }
    }
}

/// Active/in-use/fault characteristics on the power switch. Writing
/// `Active = false` stops the running program.
#[derive(Default)]
pub struct ActiveProgramModule {
    power: Option<Arc<Service>>,
}

impl ActiveProgramModule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CapabilityModule for ActiveProgramModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("active_program")
            .requires(Capability::PowerSwitch)
            .provides(Capability::ActiveProgram)
    }

    fn attach(&mut self, ctx: &ModuleContext) -> Result<(), CoreError> {
        let Some(power) = ctx.surface(Capability::PowerSwitch) else {
            return Ok(());
        };
        if !ctx.allows(ServiceKind::Switch, "Active Program", None) {
            return Ok(());
        }
        ctx.provide(Capability::ActiveProgram, Arc::clone(&power));

        let service = Arc::clone(&power);
        ctx.watch_status(keys(&[OPERATION_STATE]), move |device| {
            let state = ProgramState::of(device);
            service.update(Characteristic::Active, CharValue::Bool(state.active));
            service.update(Characteristic::InUse, CharValue::Bool(state.in_use));
            service.update(Characteristic::StatusFault, CharValue::Bool(state.fault));
        });

        self.power = Some(power);
        Ok(())
    }

    fn initialize(
        self: Box<Self>,
        ctx: Arc<ModuleContext>,
    ) -> BoxFuture<'static, Result<(), CoreError>> {
        Box::pin(async move {
            let Some(power) = self.power else {
                return Ok(());
            };

            let device = Arc::clone(&ctx.device);
            let stop = Arc::new(UpdateSerializer::edge(
                format!("{} stop program", ctx.name()),
                false,
                ctx.verbose,
                move |requested: bool| {
                    let device = Arc::clone(&device);
                    async move {
                        if requested {
                            device.stop_program().await?;
                        }
                        Ok(())
                    }
                },
            ));

            power.on_set(Characteristic::Active, move |value| -> BoxFuture<'static, _> {
                match value.as_bool() {
                    Some(false) => Box::pin(stop.trigger(Some(true))),
                    _ => Box::pin(async {
                        Err(CoreError::Unsupported {
                            operation: "start program".into(),
                            reason: "programs can only be started on the appliance".into(),
                        })
                    }),
                }
            });
            Ok(())
        })
    }
}
