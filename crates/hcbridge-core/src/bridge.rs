// ── Bridge abstraction ──
//
// Full lifecycle of one cloud account: list appliances, build a model and
// an accessory per appliance, then keep every model current from the
// all-appliance event stream.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use hcbridge_api::{
    EventKind, EventStream, HomeConnectClient, SessionEnvelope, SseSource, StreamState,
};

use crate::capability::{
    Accessory, AccessoryServices, ModuleContext, ProtocolSink, catalog,
};
use crate::config::BridgeConfig;
use crate::device::{ApplianceApi, ApplianceModel, DeviceModel};
use crate::error::CoreError;
use crate::model::ApplianceInfo;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
    Reconnecting { attempt: u32 },
}

impl From<StreamState> for ConnectionState {
    fn from(state: StreamState) -> Self {
        match state {
            StreamState::Idle | StreamState::Connecting => Self::Connecting,
            StreamState::Streaming => Self::Streaming,
            StreamState::Closed => Self::Reconnecting { attempt: 0 },
            StreamState::Failed { attempt } => Self::Reconnecting { attempt },
        }
    }
}

// ── Bridge ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<BridgeInner>`.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    client: HomeConnectClient,
    sink: Arc<dyn ProtocolSink>,
    connection_state: watch::Sender<ConnectionState>,
    models: RwLock<HashMap<String, Arc<ApplianceModel>>>,
    accessories: Mutex<Vec<Arc<Accessory>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Create a bridge from configuration. Does NOT connect; call
    /// [`connect()`](Self::connect) to build accessories and start streaming.
    pub fn new(config: BridgeConfig, sink: Arc<dyn ProtocolSink>) -> Result<Self, CoreError> {
        let client = config.client()?;
        Ok(Self::with_client(config, client, sink))
    }

    /// Create a bridge around an existing client.
    pub fn with_client(
        config: BridgeConfig,
        client: HomeConnectClient,
        sink: Arc<dyn ProtocolSink>,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                config,
                client,
                sink,
                connection_state: watch::Sender::new(ConnectionState::Disconnected),
                models: RwLock::default(),
                accessories: Mutex::default(),
                cancel: CancellationToken::new(),
                task_handles: Mutex::default(),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &HomeConnectClient {
        &self.inner.client
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// List appliances, compose an accessory for each, and start the
    /// event stream.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Connecting);

        let appliances = match self.inner.client.list_appliances().await {
            Ok(appliances) => appliances,
            Err(e) => {
                let _ = self
                    .inner
                    .connection_state
                    .send(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        debug!(count = appliances.len(), "listed appliances");

        let api: Arc<dyn ApplianceApi> = Arc::new(self.inner.client.clone());
        for appliance in appliances {
            let options = self.inner.config.appliance(&appliance.ha_id);
            if !options.enabled {
                info!(ha_id = %appliance.ha_id, "appliance disabled in configuration");
                continue;
            }

            let mut info = ApplianceInfo::from(appliance);
            if let Some(name) = options.name {
                info.name = name;
            }

            let model = Arc::new(ApplianceModel::new(info, Arc::clone(&api)));
            // Seed the cache so the synchronous attach phase sees real state.
            // Offline appliances are read once they report `CONNECTED`.
            if model.is_connected() {
                model.resync_logged().await;
            }

            let info = model.info().clone();
            let ctx = ModuleContext::new(
                Arc::clone(&model) as Arc<dyn DeviceModel>,
                Arc::new(AccessoryServices::new(info.name.clone(), Arc::clone(&self.inner.sink))),
                Arc::new(options.policy),
                options.verbose.unwrap_or(self.inner.config.verbose),
            );
            match catalog::modules_for(&info.appliance_type).compose(ctx) {
                Ok(accessory) => {
                    info!(
                        ha_id = %info.ha_id,
                        name = %info.name,
                        kind = %info.appliance_type,
                        "accessory composed"
                    );
                    self.inner.accessories.lock().await.push(Arc::new(accessory));
                }
                Err(e) => warn!(ha_id = %info.ha_id, error = %e, "could not compose accessory"),
            }

            self.inner
                .models
                .write()
                .await
                .insert(info.ha_id.clone(), model);
        }

        let stream = EventStream::new(SseSource::new(self.inner.client.clone()))
            .with_reconnect(self.inner.config.reconnect.clone());
        let state = stream.state();

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(state_task(
            self.clone(),
            state,
            self.inner.cancel.clone(),
        )));
        handles.push(tokio::spawn(stream_task(
            self.clone(),
            stream,
            self.inner.cancel.clone(),
        )));

        info!("bridge connected");
        Ok(())
    }

    /// Stop streaming and tear down every accessory.
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.inner.accessories.lock().await.clear();
        self.inner.models.write().await.clear();
        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    // ── State observation ────────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub async fn appliance(&self, ha_id: &str) -> Option<Arc<ApplianceModel>> {
        self.inner.models.read().await.get(ha_id).cloned()
    }

    pub async fn appliances(&self) -> Vec<Arc<ApplianceModel>> {
        let mut models: Vec<_> = self.inner.models.read().await.values().cloned().collect();
        models.sort_by(|a, b| a.info().name.cmp(&b.info().name));
        models
    }

    pub async fn accessories(&self) -> Vec<Arc<Accessory>> {
        self.inner.accessories.lock().await.clone()
    }

    /// Wait until every accessory has finished initialising.
    pub async fn ready(&self) {
        let accessories = self.accessories().await;
        join_all(accessories.iter().map(|a| a.ready())).await;
    }

    // ── Envelope routing ─────────────────────────────────────────────

    async fn route(&self, envelope: SessionEnvelope) {
        match envelope {
            SessionEnvelope::Start => {
                let models = self.appliances().await;
                let stale: Vec<_> = models.iter().filter(|m| m.session_started()).collect();
                if !stale.is_empty() {
                    debug!(appliances = stale.len(), "stream restarted; resynchronising");
                    join_all(stale.iter().map(|m| m.resync_logged())).await;
                }
            }
            SessionEnvelope::Event(event) => {
                let Some(ha_id) = event.ha_id() else {
                    trace!(kind = %event.event.as_str(), "event without appliance id");
                    return;
                };
                match self.appliance(ha_id).await {
                    Some(model) => {
                        if model.apply_event(&event) {
                            info!(ha_id, "appliance back online; resynchronising");
                            model.resync_logged().await;
                        }
                    }
                    None if event.event == EventKind::KeepAlive => {}
                    None => debug!(ha_id, kind = %event.event.as_str(), "event for unknown appliance"),
                }
            }
            SessionEnvelope::Stop { error } => {
                if error.is_none() {
                    debug!("stream session closed");
                }
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Read the all-appliance stream and route envelopes to models.
async fn stream_task(
    bridge: Bridge,
    stream: EventStream<SseSource>,
    cancel: CancellationToken,
) {
    let envelopes = stream.start();
    tokio::pin!(envelopes);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = envelopes.next() => match envelope {
                Some(envelope) => bridge.route(envelope).await,
                None => break,
            },
        }
    }
}

/// Mirror the reader's connection cycle into `ConnectionState`.
async fn state_task(
    bridge: Bridge,
    mut state: watch::Receiver<StreamState>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = ConnectionState::from(*state.borrow_and_update());
                bridge.inner.connection_state.send_if_modified(|current| {
                    let modified = *current != next;
                    *current = next;
                    modified
                });
            }
        }
    }
}
