//! Resolve the runtime configuration from the config file, the active
//! profile and command-line overrides.

use secrecy::SecretString;

use hcbridge_config::{Config, ConfigError, Profile};
use hcbridge_core::BridgeConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Profile selected by `--profile`, else the file's default, else `default`.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `BridgeConfig` for the active profile.
///
/// Without a config file the bridge can still run from `--token` (or
/// `HCBRIDGE_TOKEN`) alone, against the production endpoint unless
/// `--base-url` says otherwise. An explicitly named profile must exist.
pub fn resolve(global: &GlobalOpts) -> Result<BridgeConfig, CliError> {
    let cfg = hcbridge_config::load_config_or_default();
    resolve_from(global, &cfg)
}

pub fn resolve_from(global: &GlobalOpts, cfg: &Config) -> Result<BridgeConfig, CliError> {
    let name = active_profile_name(global, cfg);

    let mut profile = match cfg.profiles.get(&name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            return Err(ConfigError::UnknownProfile { profile: name }.into());
        }
        None => Profile::default(),
    };
    if let Some(ref url) = global.base_url {
        profile.base_url = Some(url.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => hcbridge_config::resolve_token(&profile, &name)?,
    };

    Ok(hcbridge_config::build_bridge_config(
        &profile,
        &cfg.defaults,
        token,
    )?)
}
