//! Implementation of the `phylomatic config` commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{load_config, ConfigOverrides};
use crate::cli::display::key_value_table;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::{ConfigLoader, PROJECT_CONFIG};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Persist the effective configuration as the new defaults
    Save {
        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Destination file
        #[arg(long, value_name = "FILE", default_value = PROJECT_CONFIG)]
        output: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    #[serde(flatten)]
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        let value = serde_json::to_value(&self.config).unwrap_or_default();
        key_value_table(flatten_settings(&value)).to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigSaveOutput {
    pub success: bool,
    pub path: PathBuf,
}

impl CommandOutput for ConfigSaveOutput {
    fn to_human(&self) -> String {
        format!("Saved configuration to {}", self.path.display())
    }
}

pub fn execute(args: ConfigArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommand::Show { overrides } => {
            let config = load_config(config_path, &overrides)?;
            output(&ConfigShowOutput { config }, json_mode);
        }
        ConfigCommand::Save {
            overrides,
            output: path,
        } => {
            let config = load_config(config_path, &overrides)?;
            ConfigLoader::save(&config, &path)?;
            output(&ConfigSaveOutput { success: true, path }, json_mode);
        }
    }
    Ok(())
}

/// Dotted `section.key` names paired with rendered values.
fn flatten_settings(value: &serde_json::Value) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    flatten_into(None, value, &mut rows);
    rows
}

fn flatten_into(prefix: Option<&str>, value: &serde_json::Value, rows: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, nested) in map {
                let name = prefix.map_or_else(|| key.clone(), |p| format!("{p}.{key}"));
                flatten_into(Some(&name), nested, rows);
            }
        }
        serde_json::Value::Array(items) => {
            let joined: Vec<String> = items.iter().map(render_scalar).collect();
            rows.push((prefix.unwrap_or_default().to_string(), joined.join(" ")));
        }
        scalar => rows.push((prefix.unwrap_or_default().to_string(), render_scalar(scalar))),
    }
}

fn render_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
