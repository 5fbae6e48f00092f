use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::capability::{
    Capability, CapabilityModule, CharValue, Characteristic, ModuleContext, ModuleDescriptor,
    ServiceKind,
};
use crate::error::CoreError;
use crate::model::keys::CHILD_LOCK;
use crate::serializer::UpdateSerializer;

/// Values a two-state setting takes.
#[derive(Debug, Clone, PartialEq)]
struct SwitchValues {
    on: Value,
    off: Value,
}

/// A two-state appliance setting (boolean, or an `On`/`Off` enumeration)
/// exposed as a switch or lock.
///
/// Attached only if the appliance lists the setting, which requires a
/// remote query; all wiring happens during initialisation, or when an
/// offline appliance first connects.
pub struct ModeSwitchModule {
    capability: Capability,
    kind: ServiceKind,
    key: String,
    name: String,
    group: Option<String>,
}

impl ModeSwitchModule {
    /// An appliance setting exposed as a switch in the `modes` group.
    pub fn setting(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            capability: Capability::ModeSwitch,
            kind: ServiceKind::Switch,
            key: key.into(),
            name: name.into(),
            group: Some("modes".into()),
        }
    }

    pub fn child_lock() -> Self {
        Self {
            capability: Capability::ChildLock,
            kind: ServiceKind::Lock,
            key: CHILD_LOCK.into(),
            name: "Child Lock".into(),
            group: None,
        }
    }

    /// Characteristics holding the current and the requested state.
    fn characteristics(&self) -> (Characteristic, Characteristic) {
        match self.kind {
            ServiceKind::Lock => (Characteristic::LockCurrentState, Characteristic::LockTargetState),
            _ => (Characteristic::On, Characteristic::On),
        }
    }

    async fn switch_values(&self, ctx: &ModuleContext, current: &Value) -> Option<SwitchValues> {
        if current.is_boolean() {
            return Some(SwitchValues {
                on: json!(true),
                off: json!(false),
            });
        }

        let detail = match ctx.device.setting(&self.key).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Could not read setting constraints");
                return None;
            }
        };
        let on = detail.allowed_value("On")?;
        let off = detail.allowed_value("Off")?;
        Some(SwitchValues {
            on: json!(on),
            off: json!(off),
        })
    }

    async fn setup(self: Box<Self>, ctx: Arc<ModuleContext>) -> Result<(), CoreError> {
        let settings = ctx.device.settings().await?;
        let Some(setting) = settings.into_iter().find(|s| s.key == self.key) else {
            debug!(key = %self.key, "Setting not supported");
            return Ok(());
        };
        let Some(values) = self.switch_values(&ctx, &setting.value).await else {
            warn!(key = %self.key, value = %setting.value, "Setting is not a two-state value");
            return Ok(());
        };

        let service = ctx.factory.create(self.kind, &self.name, Some(&self.key));
        ctx.provide(self.capability, Arc::clone(&service));

        let (current, target) = self.characteristics();
        let key = self.key.clone();
        let on_value = values.on.clone();
        let published = Arc::clone(&service);
        ctx.watch_status(vec![key.clone()], move |device| {
            if let Some(item) = device.item(&key) {
                let on = CharValue::Bool(item.value == on_value);
                published.update(current, on.clone());
                if target != current {
                    published.update(target, on);
                }
            }
        });

        if !setting.is_writable() {
            debug!(key = %self.key, "Setting is read-only");
            return Ok(());
        }

        let device = Arc::clone(&ctx.device);
        let key = self.key.clone();
        let serializer = Arc::new(UpdateSerializer::level(
            format!("{} {}", ctx.name(), self.name),
            false,
            ctx.verbose,
            move |on: bool| {
                let device = Arc::clone(&device);
                let key = key.clone();
                let value = if on { values.on.clone() } else { values.off.clone() };
                async move { device.set_setting(&key, value).await }
            },
        ));

        service.on_set(target, move |value| -> BoxFuture<'static, _> {
            match value.as_bool() {
                Some(on) => Box::pin(serializer.trigger(Some(on))),
                None => Box::pin(async move {
                    Err(CoreError::Internal(format!("switch expects a boolean, got {value}")))
                }),
            }
        });
        Ok(())
    }
}

impl CapabilityModule for ModeSwitchModule {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new(format!("{}:{}", self.capability, self.name)).provides(self.capability)
    }

    fn initialize(
        self: Box<Self>,
        ctx: Arc<ModuleContext>,
    ) -> BoxFuture<'static, Result<(), CoreError>> {
        if !ctx.allows(self.kind, &self.name, self.group.as_deref()) {
            return Box::pin(async { Ok(()) });
        }
        let name = self.descriptor().name;
        ctx.when_connected(&name, self.setup(Arc::clone(&ctx)))
    }
}
