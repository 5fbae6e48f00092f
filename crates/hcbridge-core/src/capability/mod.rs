// ── Capability composition ──
//
// An accessory is assembled from capability modules. Each module declares
// what it requires from modules listed before it and what it provides to
// those after it. Attachment runs in two phases: a synchronous phase that
// wires everything derivable from cached state, then an asynchronous
// phase for anything that needs a remote query first.

pub mod catalog;
mod host;
pub mod modules;
pub mod policy;
pub mod sink;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::future::BoxFuture;
use strum::Display;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::AbortHandle;
use tracing::Instrument;

use crate::device::DeviceModel;
use crate::error::CoreError;
use crate::model::DeviceEvent;

pub use host::{Accessory, CompositionHost};
pub use policy::{CapabilityDescriptor, FeaturePolicy, FeatureRule};
pub use sink::{
    AccessoryServices, CharValue, Characteristic, LogSink, ProtocolSink, RecordingSink, Service,
    ServiceFactory, ServiceId, ServiceKind, SinkUpdate,
};

/// Named surface a module provides to later modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    PowerSwitch,
    ActiveProgram,
    RemainingTime,
    Battery,
    RemoteControl,
    ChildLock,
    ModeSwitch,
    Events,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub requires: Vec<Capability>,
    pub provides: Vec<Capability>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            provides: Vec::new(),
        }
    }

    #[must_use]
    pub fn requires(mut self, capability: Capability) -> Self {
        self.requires.push(capability);
        self
    }

    #[must_use]
    pub fn provides(mut self, capability: Capability) -> Self {
        self.provides.push(capability);
        self
    }
}

/// One unit of accessory behaviour.
pub trait CapabilityModule: Send {
    fn descriptor(&self) -> ModuleDescriptor;

    /// Synchronous phase: wire what cached state allows.
    fn attach(&mut self, _ctx: &ModuleContext) -> Result<(), CoreError> {
        Ok(())
    }

    /// Asynchronous phase: remote queries, then the rest of the wiring.
    /// Runs concurrently with every other module's initialisation.
    fn initialize(
        self: Box<Self>,
        _ctx: Arc<ModuleContext>,
    ) -> BoxFuture<'static, Result<(), CoreError>> {
        Box::pin(async { Ok(()) })
    }
}

// ── ModuleContext ────────────────────────────────────────────────────

/// Everything a module may touch while attaching.
pub struct ModuleContext {
    pub span: tracing::Span,
    pub device: Arc<dyn DeviceModel>,
    pub factory: Arc<dyn ServiceFactory>,
    pub policy: Arc<FeaturePolicy>,
    /// Log every remote write at info level.
    pub verbose: bool,
    surface: Mutex<HashMap<Capability, Arc<Service>>>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl ModuleContext {
    pub fn new(
        device: Arc<dyn DeviceModel>,
        factory: Arc<dyn ServiceFactory>,
        policy: Arc<FeaturePolicy>,
        verbose: bool,
    ) -> Self {
        let info = device.info();
        let span = tracing::info_span!("accessory", ha_id = %info.ha_id, name = %info.name);
        Self {
            span,
            device,
            factory,
            policy,
            verbose,
            surface: Mutex::default(),
            tasks: Mutex::default(),
        }
    }

    /// Display name of the appliance.
    pub fn name(&self) -> &str {
        &self.device.info().name
    }

    pub fn allows(&self, kind: ServiceKind, name: &str, group: Option<&str>) -> bool {
        let allowed = self
            .policy
            .allows(&CapabilityDescriptor::new(kind, name, group));
        if !allowed {
            tracing::debug!(parent: &self.span, %kind, name, "Feature disabled");
        }
        allowed
    }

    /// Create a service if policy allows it.
    pub fn optional_service(
        &self,
        kind: ServiceKind,
        name: &str,
        subtype: Option<&str>,
        group: Option<&str>,
    ) -> Option<Arc<Service>> {
        self.allows(kind, name, group)
            .then(|| self.factory.create(kind, name, subtype))
    }

    /// Make `service` available to later modules.
    pub fn provide(&self, capability: Capability, service: Arc<Service>) {
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capability, service);
    }

    pub fn surface(&self, capability: Capability) -> Option<Arc<Service>> {
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&capability)
            .cloned()
    }

    /// Spawn a background task that lives as long as the accessory.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future.instrument(self.span.clone()));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.abort_handle());
    }

    /// Run `setup` now if the appliance is online, otherwise in the
    /// background once it next connects. Remote queries fail while the
    /// appliance is offline.
    pub fn when_connected<F>(&self, module: &str, setup: F) -> BoxFuture<'static, Result<(), CoreError>>
    where
        F: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        if self.device.is_connected() {
            return Box::pin(setup);
        }

        tracing::debug!(parent: &self.span, module, "Appliance offline; deferring until it connects");
        let module = module.to_owned();
        let mut connectivity = self.device.connectivity();
        self.spawn(async move {
            let online = connectivity.wait_for(|connected| *connected).await.is_ok();
            if !online {
                return;
            }
            match setup.await {
                Ok(()) => tracing::debug!(module = %module, "Module initialised after connecting"),
                Err(e) => tracing::warn!(module = %module, error = %e, "Module failed to initialise"),
            }
        });
        Box::pin(async { Ok(()) })
    }

    /// Run `wire` once `key` has a cached value: now if it already has
    /// one, otherwise the first time the appliance reports it.
    pub fn when_reported<F>(self: &Arc<Self>, key: &'static str, wire: F)
    where
        F: FnOnce(&ModuleContext) + Send + 'static,
    {
        let mut rx = self.device.subscribe();
        if self.device.item(key).is_some() {
            wire(self.as_ref());
            return;
        }

        let device = Arc::clone(&self.device);
        let ctx: Weak<Self> = Arc::downgrade(self);
        self.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(DeviceEvent::Item(item)) if item.key == key => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {
                        if device.item(key).is_some() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => return,
                }
            }
            if let Some(ctx) = ctx.upgrade() {
                tracing::debug!(key, "First report received");
                wire(ctx.as_ref());
            }
        });
    }

    pub(crate) fn abort_tasks(&self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }

    /// Recompute derived values now, and again whenever one of `keys`
    /// changes or connectivity changes.
    pub fn watch_status<F>(&self, keys: Vec<String>, mut derive: F)
    where
        F: FnMut(&dyn DeviceModel) + Send + 'static,
    {
        let device = Arc::clone(&self.device);
        let mut rx = device.subscribe();
        derive(device.as_ref());

        self.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(DeviceEvent::Connected(_)) => derive(device.as_ref()),
                    Ok(DeviceEvent::Item(item)) => {
                        if keys.iter().any(|k| *k == item.key) {
                            derive(device.as_ref());
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Change feed lagged; recomputing");
                        derive(device.as_ref());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

impl Drop for ModuleContext {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Owned key list for `watch_status`.
pub(crate) fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| (*k).to_owned()).collect()
}
