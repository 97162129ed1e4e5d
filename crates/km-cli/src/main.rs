//! Kilometers CLI: a thin binary composing the config resolver, the
//! entitlement/provisioning drivers, and the monitor driver.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

//! Binary crates don't publish a library API; `missing_docs` is still
//! honored for anything `pub` so internal modules stay documented the
//! same way the library crates are.
#![allow(rustdoc::private_intra_doc_links)]

use std::collections::BTreeMap;

use anyhow::Result;
use clap::{Parser, Subcommand};
use km_config::ResolveInput;
use km_core::{ConfigKey, ConfigValue, KilometersHome};

mod commands;
mod logging;
mod theme;

use commands::{auth, config, init, monitor, plugins};
use theme::print_banner;

/// Kilometers: an MCP stdio proxy with plugin fan-out and entitlement-gated
/// installs.
#[derive(Parser)]
#[command(name = "km")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the API key and provision entitled plugins.
    Init {
        /// API key to use for this run (also persisted to the config file).
        #[arg(long)]
        api_key: Option<String>,
        /// Entitlement service base URL.
        #[arg(long)]
        endpoint: Option<String>,
        /// Skip interactive confirmation prompts.
        #[arg(long)]
        force: bool,
        /// Skip interactive install prompts for this and future runs.
        #[arg(long)]
        auto_provision_plugins: bool,
        /// Reserved for future platform auto-detection; accepted for
        /// forward compatibility with scripted invocations.
        #[arg(long)]
        auto_detect: bool,
    },

    /// Proxy an MCP server's stdio, capturing messages for installed plugins.
    Monitor {
        /// Marks this invocation as a server-monitoring run.
        #[arg(long, required = true)]
        server: bool,
        /// The server command to run, after `--`.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Manage installed plugins.
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },

    /// Manage the cached API key credential.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Inspect the resolved configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum PluginCommands {
    /// List installed plugins.
    List,
    /// Install an entitled plugin not yet installed.
    Install {
        /// Plugin name.
        name: String,
    },
    /// Update one plugin, or every out-of-date plugin if no name is given.
    Update {
        /// Plugin name; omit to update everything out of date.
        name: Option<String>,
    },
    /// Remove an installed plugin.
    Remove {
        /// Plugin name.
        name: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Validate and cache an API key.
    Login {
        /// API key; prompted interactively if omitted.
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Remove the cached API key.
    Logout,
    /// Report whether an API key is effectively set.
    Status,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration with source annotations.
    Show {
        /// Output format: `text` or `json`.
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List every config file location checked, in precedence order.
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = KilometersHome::resolve();
    let workspace_root = std::env::current_dir().ok();

    let cli_overrides = cli_config_overrides(&cli.command);
    let resolved = km_config::resolve(
        &ResolveInput {
            cli: cli_overrides,
            workspace_root,
            ..Default::default()
        },
        &home,
    )?;

    logging::init(&resolved.snapshot);

    let exit_code = match cli.command {
        Commands::Init { force, .. } => {
            print_banner();
            init::run_init(&resolved.snapshot, &home, force).await?
        }
        Commands::Monitor { command, .. } => {
            monitor::run_monitor(&resolved.snapshot, &home, &command).await?
        }
        Commands::Plugins { command } => match command {
            PluginCommands::List => plugins::list(&home)?,
            PluginCommands::Install { name } => plugins::install(&resolved.snapshot, &home, &name).await?,
            PluginCommands::Update { name } => plugins::update(&resolved.snapshot, &home, name.as_deref()).await?,
            PluginCommands::Remove { name, force } => plugins::remove(&home, &name, force)?,
        },
        Commands::Auth { command } => match command {
            AuthCommands::Login { api_key } => auth::login(&resolved.snapshot, &home, api_key).await?,
            AuthCommands::Logout => auth::logout(&home)?,
            AuthCommands::Status => auth::status(&resolved.snapshot)?,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => config::show(&resolved, &format)?,
            ConfigCommands::Path => config::path(&resolved)?,
        },
    };

    std::process::exit(exit_code);
}

/// Translate the handful of `init`-only flags that double as config
/// overrides into the CLI layer the resolver merges first.
fn cli_config_overrides(command: &Commands) -> BTreeMap<ConfigKey, ConfigValue> {
    let mut overrides = BTreeMap::new();
    if let Commands::Init {
        api_key,
        endpoint,
        auto_provision_plugins,
        ..
    } = command
    {
        if let Some(key) = api_key {
            overrides.insert(ConfigKey::ApiKey, ConfigValue::String(key.clone()));
        }
        if let Some(endpoint) = endpoint {
            overrides.insert(ConfigKey::ApiEndpoint, ConfigValue::String(endpoint.clone()));
        }
        if *auto_provision_plugins {
            overrides.insert(ConfigKey::AutoProvision, ConfigValue::Bool(true));
        }
    }
    overrides
}
