//! `hcbridge run`: compose every appliance and keep it live until Ctrl-C.

use std::sync::Arc;

use tracing::{info, warn};

use hcbridge_core::{Bridge, BridgeConfig, ConnectionState, LogSink};

use crate::cli::RunArgs;
use crate::error::CliError;

pub async fn handle(mut config: BridgeConfig, args: RunArgs) -> Result<(), CliError> {
    config.verbose |= args.verbose_writes;

    let bridge = Bridge::new(config, Arc::new(LogSink))?;
    bridge.connect().await?;
    bridge.ready().await;

    for accessory in bridge.accessories().await {
        let info = accessory.info();
        info!(
            ha_id = %info.ha_id,
            name = %info.name,
            services = accessory.services().len(),
            "accessory ready"
        );
    }

    let mut state = bridge.connection_state();
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            match *state.borrow_and_update() {
                ConnectionState::Streaming => info!("event stream connected"),
                ConnectionState::Reconnecting { attempt } if attempt > 0 => {
                    warn!(attempt, "event stream lost; reconnecting");
                }
                _ => {}
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    bridge.disconnect().await;
    watcher.abort();
    Ok(())
}
