//! Command-line tool to inspect LogToGraph plugin directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ltg_plugins::prelude::*;
use serde_json::json;

/// Environment variable switching logs to JSON.
const LOG_JSON_VAR: &str = "LTG_LOG_JSON";

/// LogToGraph plugin inspector - discover, load and probe plugin libraries.
#[derive(Parser, Debug)]
#[command(name = "ltg-plugins")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Plugin host configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Load every plugin of an application directory and list them.
    List {
        /// Application directory containing the plugin directory.
        #[arg(long, default_value = ".")]
        app_path: PathBuf,
        /// Keep only plugins declaring a module of this type (repeatable).
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        types: Vec<PluginModuleType>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Load a single library and report whether it is a usable plugin.
    Probe {
        /// Path to the library file.
        #[arg(required = true)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;
    match args.command {
        Command::List {
            app_path,
            types,
            json,
        } => list_plugins(config, &app_path, &types, json),
        Command::Probe { path } => probe_plugin(&config, &path),
    }
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var(LOG_JSON_VAR)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "ltg_plugins={default_level},ltg_cli={default_level},warn"
        ))
    });

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<PluginManagerConfig> {
    let config = match path {
        Some(path) => PluginManagerConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PluginManagerConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn list_plugins(
    config: PluginManagerConfig,
    app_path: &Path,
    types: &[PluginModuleType],
    as_json: bool,
) -> Result<()> {
    let mut manager = PluginManager::new(config);
    let report = manager.load_plugins(app_path, types);

    if as_json {
        let plugins: Vec<_> = manager
            .plugin_names()
            .into_iter()
            .filter_map(|name| {
                let plugin = manager.get(&name)?.upgrade()?;
                Some(json!({
                    "id": name,
                    "name": plugin.name(),
                    "author": plugin.author(),
                    "version": plugin.version(),
                    "description": plugin.description(),
                    "minimal_host_version": plugin.minimal_host_version(),
                    "modules": plugin.modules_infos(),
                }))
            })
            .collect();

        let output = json!({
            "plugins": plugins,
            "failed": report.failed,
            "not_plugins": report.not_plugins,
            "filtered_out": report.filtered_out,
            "duplicates": report.duplicates,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Loaded Plugins");
        println!("==============\n");

        for line in manager.summary_lines() {
            println!("  {}", line);
        }
        for infos in manager.plugin_modules_infos() {
            println!("    - {} [{}]", infos.label, infos.module_type);
        }

        println!();
        println!(
            "{} loaded, {} failed, {} not a plugin, {} filtered out, {} duplicate",
            manager.len(),
            report.failed.len(),
            report.not_plugins.len(),
            report.filtered_out.len(),
            report.duplicates.len()
        );
    }

    manager.unload_plugins();
    Ok(())
}

fn probe_plugin(config: &PluginManagerConfig, path: &Path) -> Result<()> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Invalid plugin file name: {}", path.display()))?;
    let host = HostContext::new(std::env::current_dir()?).with_host_version(config.host_version);

    let mut instance: PluginInstance = PluginInstance::new();
    match instance.init(name, path, &config.symbol_names(), &host) {
        LoadOutcome::LoadingSucceeded => {}
        LoadOutcome::NotAPlugin => anyhow::bail!("Not a plugin: {}", path.display()),
        LoadOutcome::LoadingFailed => anyhow::bail!("Plugin failed to load: {}", path.display()),
    }

    let plugin = instance
        .interface()
        .context("Plugin unloaded during probe")?;
    println!("Plugin: {}", plugin.name());
    println!("  Version:     {}", plugin.version());
    println!("  Author:      {}", plugin.author());
    if !plugin.contact().is_empty() {
        println!("  Contact:     {}", plugin.contact());
    }
    println!("  Description: {}", plugin.description());
    if let Some(loaded_at) = instance.loaded_at() {
        println!("  Loaded at:   {}", loaded_at.to_rfc3339());
    }
    println!("  Modules:");
    for infos in plugin.modules_infos() {
        println!("    - {} [{}]", infos.label, infos.module_type);
    }

    instance.unit();
    Ok(())
}
