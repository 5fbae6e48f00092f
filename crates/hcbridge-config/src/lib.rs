//! Configuration for the hcbridge binary.
//!
//! TOML profiles, access-token resolution (env + keyring + plaintext),
//! and translation to `hcbridge_core::BridgeConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hcbridge_api::{DEFAULT_BASE_URL, ReconnectConfig};
use hcbridge_core::{
    ApplianceOptions, BridgeConfig, FeaturePolicy, FeatureRule, ServiceKind, TlsVerification,
};

const KEYRING_SERVICE: &str = "hcbridge";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// The named profile, or the default one.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name.to_owned(), profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// First reconnect delay after a stream error (`"1s"`, `"500ms"`).
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial: String,

    /// Upper bound on the reconnect delay.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max: String,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            reconnect_initial: default_reconnect_initial(),
            reconnect_max: default_reconnect_max(),
            verbose: false,
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_reconnect_initial() -> String {
    "1s".into()
}
fn default_reconnect_max() -> String {
    "60s".into()
}
fn default_true() -> bool {
    true
}

/// One Home Connect account.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL; defaults to the production endpoint.
    pub base_url: Option<String>,

    /// Access token (plaintext; prefer keyring or env var).
    pub access_token: Option<String>,

    /// Environment variable name containing the access token.
    pub access_token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override request timeout.
    pub timeout: Option<u64>,

    /// Override verbose logging of remote writes.
    pub verbose: Option<bool>,

    /// Per-appliance sections keyed by `haId`.
    #[serde(default)]
    pub appliances: HashMap<String, ApplianceSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplianceSection {
    /// Display name override.
    pub name: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub verbose: Option<bool>,

    /// Optional features keyed by display name.
    #[serde(default)]
    pub features: HashMap<String, FeatureSection>,

    /// Optional feature groups (`events`, `modes`, `indicators`).
    #[serde(default)]
    pub groups: HashMap<String, GroupSection>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct FeatureSection {
    pub enabled: bool,
    /// Restrict the rule to one surface kind.
    pub kind: Option<ServiceKind>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct GroupSection {
    pub enabled: bool,
}

impl From<&ApplianceSection> for ApplianceOptions {
    fn from(section: &ApplianceSection) -> Self {
        let policy = section.features.iter().fold(
            FeaturePolicy::allow_all(),
            |policy, (name, feature)| {
                policy.with_feature(
                    name.clone(),
                    FeatureRule {
                        enabled: feature.enabled,
                        kind: feature.kind,
                    },
                )
            },
        );
        let policy = section
            .groups
            .iter()
            .fold(policy, |policy, (group, g)| policy.with_group(group.clone(), g.enabled));

        Self {
            name: section.name.clone(),
            enabled: section.enabled,
            policy,
            verbose: section.verbose,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "hcbridge", "hcbridge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hcbridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// Environment variables use `HCBRIDGE_` and `__` as the nesting
/// separator, e.g. `HCBRIDGE_DEFAULTS__TIMEOUT=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HCBRIDGE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Store an access token for `profile_name` in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/access-token")
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the access token from the credential chain.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        |user| {
            keyring::Entry::new(KEYRING_SERVICE, user)
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's access_token_env → env var lookup
    if let Some(token) = profile.access_token_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(token));
    }

    // 2. System keyring
    if let Some(token) = keyring(&keyring_user(profile_name)) {
        return Ok(SecretString::from(token));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.access_token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{value}': {e}"),
    })
}

/// Build a `BridgeConfig` from a profile and the global defaults.
pub fn profile_to_bridge_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<BridgeConfig, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    build_bridge_config(profile, defaults, token)
}

/// Build a `BridgeConfig` with an already-resolved token.
pub fn build_bridge_config(
    profile: &Profile,
    defaults: &Defaults,
    token: SecretString,
) -> Result<BridgeConfig, ConfigError> {
    let raw_url = profile.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let base_url: url::Url = raw_url.parse().map_err(|_| ConfigError::Validation {
        field: "base_url".into(),
        reason: format!("invalid URL: {raw_url}"),
    })?;

    let reconnect = ReconnectConfig {
        initial_delay: parse_duration("reconnect_initial", &defaults.reconnect_initial)?,
        max_delay: parse_duration("reconnect_max", &defaults.reconnect_max)?,
    };
    if reconnect.max_delay < reconnect.initial_delay {
        return Err(ConfigError::Validation {
            field: "reconnect_max".into(),
            reason: "must not be shorter than reconnect_initial".into(),
        });
    }

    let mut config = BridgeConfig::new(base_url, token);
    config.tls = profile
        .ca_cert
        .clone()
        .map_or(TlsVerification::SystemDefaults, TlsVerification::CustomCa);
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.reconnect = reconnect;
    config.verbose = profile.verbose.unwrap_or(defaults.verbose);
    config.appliances = profile
        .appliances
        .iter()
        .map(|(ha_id, section)| (ha_id.clone(), ApplianceOptions::from(section)))
        .collect();
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use hcbridge_core::CapabilityDescriptor;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
timeout = 20
reconnect_initial = "500ms"
reconnect_max = "2m"

[profiles.home]
access_token = "plain-token"
verbose = true

[profiles.home.appliances."BOSCH-SMV68-0001"]
name = "Kitchen Dishwasher"

[profiles.home.appliances."BOSCH-SMV68-0001".features."Child Lock"]
enabled = false
kind = "lock"

[profiles.home.appliances."BOSCH-SMV68-0001".groups.events]
enabled = false

[profiles.home.appliances."SIEMENS-TI9-0002"]
enabled = false
"#;

    fn load(contents: &str) -> Config {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        load_config_from(file.path()).unwrap()
    }

    #[test]
    fn loads_profiles_and_appliance_sections() {
        let config = load(SAMPLE);
        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(config.defaults.timeout, 20);

        let bridge =
            build_bridge_config(profile, &config.defaults, SecretString::from("t".to_owned()))
                .unwrap();
        assert_eq!(bridge.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(bridge.timeout, Duration::from_secs(20));
        assert_eq!(bridge.reconnect.initial_delay, Duration::from_millis(500));
        assert_eq!(bridge.reconnect.max_delay, Duration::from_secs(120));
        assert!(bridge.verbose);

        let dishwasher = bridge.appliance("BOSCH-SMV68-0001");
        assert_eq!(dishwasher.name.as_deref(), Some("Kitchen Dishwasher"));
        assert!(!dishwasher.policy.allows(&CapabilityDescriptor::new(
            ServiceKind::Lock,
            "Child Lock",
            None
        )));
        assert!(!dishwasher.policy.allows(&CapabilityDescriptor::new(
            ServiceKind::ProgrammableButton,
            "Program Finished",
            Some("events")
        )));
        assert!(!bridge.appliance("SIEMENS-TI9-0002").enabled);
        assert!(bridge.appliance("unknown").enabled);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
        assert!(matches!(
            config.profile(None),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                access_token_env: Some("HOME_CONNECT_TOKEN".into()),
                ..Profile::default()
            },
        );

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        let (_, profile) = loaded.profile(None).unwrap();
        assert_eq!(profile.access_token_env.as_deref(), Some("HOME_CONNECT_TOKEN"));
    }

    #[test]
    fn token_chain_order() {
        let profile = Profile {
            access_token: Some("plain".into()),
            access_token_env: Some("HC_TOKEN".into()),
            ..Profile::default()
        };

        let from_env = resolve_token_with(
            &profile,
            "home",
            |name| (name == "HC_TOKEN").then(|| "env".to_owned()),
            |_| Some("keyring".to_owned()),
        )
        .unwrap();
        assert_eq!(from_env.expose_secret(), "env");

        let from_keyring = resolve_token_with(
            &profile,
            "home",
            |_| None,
            |user| (user == "home/access-token").then(|| "keyring".to_owned()),
        )
        .unwrap();
        assert_eq!(from_keyring.expose_secret(), "keyring");

        let plain = resolve_token_with(&profile, "home", |_| None, |_| None).unwrap();
        assert_eq!(plain.expose_secret(), "plain");

        let err = resolve_token_with(&Profile::default(), "home", |_| None, |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn bad_durations_are_rejected() {
        let defaults = Defaults {
            reconnect_initial: "soon".into(),
            ..Defaults::default()
        };
        let err = build_bridge_config(
            &Profile::default(),
            &defaults,
            SecretString::from("t".to_owned()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "reconnect_initial"));

        let defaults = Defaults {
            reconnect_initial: "10s".into(),
            reconnect_max: "1s".into(),
            ..Defaults::default()
        };
        assert!(
            build_bridge_config(&Profile::default(), &defaults, SecretString::from("t".to_owned()))
                .is_err()
        );
    }
}
