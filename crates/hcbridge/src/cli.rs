//! Clap derive structures for the `hcbridge` CLI.
//!
//! Only depends on `clap` and `clap_complete` so `build.rs` can include it
//! for man page generation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hcbridge -- Home Connect appliances as home-automation accessories
#[derive(Debug, Parser)]
#[command(
    name = "hcbridge",
    version,
    about = "Bridge Home Connect appliances into a home-automation protocol",
    long_about = "Keeps a live model of every appliance on a Home Connect account\n\
        from the cloud event stream and exposes each one as an accessory\n\
        composed of capability modules.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "HCBRIDGE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API base URL (overrides profile)
    #[arg(long, env = "HCBRIDGE_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// OAuth access token (overrides profile credentials)
    #[arg(long, env = "HCBRIDGE_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HCBRIDGE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "HCBRIDGE_LOG_JSON", global = true)]
    pub log_json: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "HCBRIDGE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge until interrupted
    Run(RunArgs),

    /// Print the cloud event stream
    #[command(alias = "ev")]
    Events(EventsArgs),

    /// Inspect appliances on the account
    #[command(alias = "app", alias = "a")]
    Appliances(AppliancesArgs),

    /// Manage configuration profiles and credentials
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  RUN
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Log every remote write at info level
    #[arg(long)]
    pub verbose_writes: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  EVENTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct EventsArgs {
    /// Only stream events for this appliance (haId)
    #[arg(long, short = 'a')]
    pub appliance: Option<String>,

    /// Stop after this many domain events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Hide KEEP-ALIVE events
    #[arg(long)]
    pub no_keep_alive: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  APPLIANCES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct AppliancesArgs {
    #[command(subcommand)]
    pub command: AppliancesCommand,
}

#[derive(Debug, Subcommand)]
pub enum AppliancesCommand {
    /// List appliances paired with the account
    #[command(alias = "ls")]
    List,

    /// Show the current status values of an appliance
    Status {
        /// Appliance identifier (haId)
        ha_id: String,
    },

    /// Show the current settings of an appliance
    Settings {
        /// Appliance identifier (haId)
        ha_id: String,
    },

    /// Show the capability modules composed for an appliance
    Modules {
        /// Appliance identifier (haId)
        ha_id: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Create a config file with one profile
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Custom CA certificate for the API endpoint
        #[arg(long)]
        ca_cert: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Display the resolved configuration (tokens redacted)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store an access token in the system keyring
    SetToken {
        /// Read the token from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
