//! Command dispatch: CLI args -> bridge or API calls -> output formatting.

pub mod appliances;
pub mod config_cmd;
pub mod events;
pub mod run;

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;

/// Dispatch a cloud-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let bridge_config = config::resolve(global)?;
    match cmd {
        Command::Run(args) => run::handle(bridge_config, args).await,
        Command::Events(args) => {
            events::handle(&bridge_config.client()?, &bridge_config, args, global).await
        }
        Command::Appliances(args) => {
            appliances::handle(&bridge_config.client()?, args, global).await
        }
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
