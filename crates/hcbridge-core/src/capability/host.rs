use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, warn};

use super::{CapabilityModule, ModuleContext, Service};
use crate::error::CoreError;
use crate::model::ApplianceInfo;

/// Ordered list of modules making up one accessory.
#[derive(Default)]
pub struct CompositionHost {
    modules: Vec<Box<dyn CapabilityModule>>,
}

impl CompositionHost {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, module: impl CapabilityModule + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn push(&mut self, module: Box<dyn CapabilityModule>) {
        self.modules.push(module);
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.descriptor().name).collect()
    }

    /// Every module's requirements must be provided by a module listed
    /// before it.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut provided = HashSet::new();
        for module in &self.modules {
            let descriptor = module.descriptor();
            if let Some(missing) = descriptor.requires.iter().find(|c| !provided.contains(*c)) {
                return Err(CoreError::MissingCapability {
                    module: descriptor.name,
                    capability: missing.to_string(),
                });
            }
            provided.extend(descriptor.provides);
        }
        Ok(())
    }

    /// Attach every module to the accessory described by `ctx`.
    ///
    /// The synchronous phase runs before this returns. Module failures in
    /// either phase are logged and leave the rest of the accessory intact.
    pub fn compose(self, ctx: ModuleContext) -> Result<Accessory, CoreError> {
        self.validate()?;
        let ctx = Arc::new(ctx);

        let mut attached = Vec::with_capacity(self.modules.len());
        {
            let _entered = ctx.span.enter();
            for mut module in self.modules {
                let name = module.descriptor().name;
                match module.attach(&ctx) {
                    Ok(()) => {
                        debug!(module = %name, "Module attached");
                        attached.push(module);
                    }
                    Err(e) => warn!(module = %name, error = %e, "Module failed to attach"),
                }
            }
        }

        let (ready_tx, ready_rx) = watch::channel(false);
        let init_ctx = Arc::clone(&ctx);
        let span = ctx.span.clone();
        let init = tokio::spawn(
            async move {
                // Let the caller finish its synchronous work first.
                tokio::task::yield_now().await;

                let pending = attached.into_iter().map(|module| {
                    let name = module.descriptor().name;
                    let fut = module.initialize(Arc::clone(&init_ctx));
                    async move {
                        match fut.await {
                            Ok(()) => debug!(module = %name, "Module initialised"),
                            Err(e) => warn!(module = %name, error = %e, "Module failed to initialise"),
                        }
                    }
                });
                join_all(pending).await;
                drop(init_ctx);

                debug!("Accessory ready");
                let _ = ready_tx.send(true);
            }
            .instrument(span),
        );

        Ok(Accessory {
            ctx,
            ready: ready_rx,
            init,
        })
    }
}

/// A composed accessory. Dropping it stops every task its modules started.
pub struct Accessory {
    ctx: Arc<ModuleContext>,
    ready: watch::Receiver<bool>,
    init: JoinHandle<()>,
}

impl Accessory {
    pub fn info(&self) -> &ApplianceInfo {
        self.ctx.device.info()
    }

    pub fn services(&self) -> Vec<Arc<Service>> {
        self.ctx.factory.services()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until every module has finished initialising.
    pub async fn ready(&self) {
        let mut ready = self.ready.clone();
        let _ = ready.wait_for(|r| *r).await;
    }
}

impl Drop for Accessory {
    fn drop(&mut self) {
        self.init.abort();
        self.ctx.abort_tasks();
    }
}
