//! Clap derive structures for the `hublink` CLI.
//!
//! Defines the command tree, global flags, and shared value enums. Kept
//! free of workspace crates so `build.rs` can include it for man pages.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hublink -- reach a home-automation hub and commission devices
#[derive(Debug, Parser)]
#[command(
    name = "hublink",
    version,
    about = "Connect to a home-automation hub and commission devices",
    long_about = "Reach a home-automation hub over the local network or a cloud relay,\n\
        inspect its state and registries, and drive device commissioning flows.",
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
    /// Hub profile to use
    #[arg(long, short = 'p', env = "HUBLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Hub URL on the local network (overrides profile)
    #[arg(long, env = "HUBLINK_HUB", global = true)]
    pub hub: Option<String>,

    /// Hub access token (overrides profile)
    #[arg(long, env = "HUBLINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Transport to use
    #[arg(long, short = 'm', env = "HUBLINK_MODE", global = true)]
    pub mode: Option<ModeArg>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HUBLINK_OUTPUT",
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

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "HUBLINK_INSECURE", global = true)]
    pub insecure: bool,

    /// Per-call timeout in seconds
    #[arg(long, env = "HUBLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Direct connection on the local network
    Local,
    /// Cloud relay
    Relay,
    /// Probe the configured mode, fall back to the other
    Auto,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check which transports reach the hub
    Probe,

    /// Show the endpoint a transport resolves to
    Resolve,

    /// List entity states, or show one
    #[command(alias = "st")]
    States(StatesArgs),

    /// Send a raw REST call to the hub
    Rest(RestArgs),

    /// Send a raw WebSocket command to the hub
    Ws(WsArgs),

    /// Inspect the hub's device, entity, area and label registries
    #[command(alias = "reg")]
    Registry(RegistryArgs),

    /// Commission a new device through a hub config flow
    #[command(alias = "add")]
    Commission(CommissionArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── States ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatesArgs {
    /// Entity id (e.g. light.kitchen); lists all states when omitted
    pub entity_id: Option<String>,

    /// Only list entities in this domain (e.g. light)
    #[arg(long, short = 'd', conflicts_with = "entity_id")]
    pub domain: Option<String>,
}

// ── Raw calls ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RestArgs {
    /// HTTP method
    #[arg(value_enum)]
    pub method: HttpMethod,

    /// Path relative to the hub root (e.g. /api/config)
    pub path: String,

    /// JSON request body
    #[arg(long, short = 'd', conflicts_with = "data_file")]
    pub data: Option<String>,

    /// Read the JSON request body from a file
    #[arg(long, short = 'F')]
    pub data_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct WsArgs {
    /// Command type (e.g. config/area_registry/list)
    pub command_type: String,

    /// JSON object merged into the command
    #[arg(long, short = 'd')]
    pub data: Option<String>,
}

// ── Registry ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RegistryArgs {
    #[command(subcommand)]
    pub command: RegistryCommand,
}

#[derive(Debug, Subcommand)]
pub enum RegistryCommand {
    /// List devices
    Devices,
    /// List entities
    Entities {
        /// Only entities of this device
        #[arg(long)]
        device: Option<String>,
    },
    /// List areas
    Areas,
    /// List labels
    Labels,
}

// ── Commissioning ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CommissionArgs {
    /// Integration that owns the flow (e.g. matter, zha)
    pub handler: String,

    /// Input for the first form step, as key=value (repeatable)
    #[arg(long = "input", short = 'i', value_name = "KEY=VALUE")]
    pub inputs: Vec<String>,

    /// Input for the first form step as a JSON object
    #[arg(long, conflicts_with = "inputs")]
    pub input_json: Option<String>,

    /// Area id or name to assign
    #[arg(long)]
    pub area: Option<String>,

    /// Name for the new device
    #[arg(long)]
    pub name: Option<String>,

    /// Device type recorded with the platform
    #[arg(long = "type", value_name = "TYPE")]
    pub device_type: Option<String>,

    /// Label id to apply to new devices and entities
    #[arg(long)]
    pub label: Option<String>,

    /// Return after starting the flow instead of waiting for it to finish
    #[arg(long)]
    pub no_wait: bool,

    /// Poll interval while waiting (e.g. 2s, 500ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Give up and abort the flow after this long (e.g. 5m)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5m")]
    pub max_wait: Duration,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Store a hub token (or kiosk secret) in the system keyring
    SetToken {
        /// Store the kiosk secret instead of the hub token
        #[arg(long)]
        kiosk: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
