//! Config command - inspect and edit the configuration file.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Args, Subcommand, ValueEnum};
use console::style;

use invex_core::InvexConfig;

use super::config_path;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the configuration in effect
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print one configuration value
    Get { key: ConfigKey },

    /// Change one configuration value ("none" clears optional keys)
    Set { key: ConfigKey, value: String },

    /// Show the configuration file path
    Path,
}

/// Settable configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConfigKey {
    #[value(name = "gemini.model")]
    GeminiModel,
    #[value(name = "gemini.api_base")]
    GeminiApiBase,
    #[value(name = "gemini.api_key_env")]
    GeminiApiKeyEnv,
    #[value(name = "gemini.request_timeout_secs")]
    GeminiRequestTimeoutSecs,
    #[value(name = "gemini.temperature")]
    GeminiTemperature,
    #[value(name = "pdf.render_dpi")]
    PdfRenderDpi,
    #[value(name = "pdf.max_pages")]
    PdfMaxPages,
    #[value(name = "pdf.renderer")]
    PdfRenderer,
    #[value(name = "output.json_dir")]
    OutputJsonDir,
    #[value(name = "output.history_file")]
    OutputHistoryFile,
}

impl ConfigKey {
    fn get(self, config: &InvexConfig) -> String {
        fn or_none<T: ToString>(value: Option<T>) -> String {
            value.map(|v| v.to_string()).unwrap_or_else(|| "none".to_string())
        }

        match self {
            ConfigKey::GeminiModel => config.gemini.model.clone(),
            ConfigKey::GeminiApiBase => config.gemini.api_base.clone(),
            ConfigKey::GeminiApiKeyEnv => config.gemini.api_key_env.clone(),
            ConfigKey::GeminiRequestTimeoutSecs => or_none(config.gemini.request_timeout_secs),
            ConfigKey::GeminiTemperature => or_none(config.gemini.temperature),
            ConfigKey::PdfRenderDpi => config.pdf.render_dpi.to_string(),
            ConfigKey::PdfMaxPages => config.pdf.max_pages.to_string(),
            ConfigKey::PdfRenderer => config.pdf.renderer.display().to_string(),
            ConfigKey::OutputJsonDir => config.output.json_dir.display().to_string(),
            ConfigKey::OutputHistoryFile => config.output.history_file.display().to_string(),
        }
    }

    fn set(self, config: &mut InvexConfig, raw: &str) -> anyhow::Result<()> {
        match self {
            ConfigKey::GeminiModel => config.gemini.model = text(raw)?,
            ConfigKey::GeminiApiBase => config.gemini.api_base = text(raw)?,
            ConfigKey::GeminiApiKeyEnv => config.gemini.api_key_env = text(raw)?,
            ConfigKey::GeminiRequestTimeoutSecs => {
                config.gemini.request_timeout_secs = optional(self, raw)?
            }
            ConfigKey::GeminiTemperature => config.gemini.temperature = optional(self, raw)?,
            ConfigKey::PdfRenderDpi => config.pdf.render_dpi = number(self, raw)?,
            ConfigKey::PdfMaxPages => config.pdf.max_pages = number(self, raw)?,
            ConfigKey::PdfRenderer => config.pdf.renderer = PathBuf::from(text(raw)?),
            ConfigKey::OutputJsonDir => config.output.json_dir = PathBuf::from(text(raw)?),
            ConfigKey::OutputHistoryFile => config.output.history_file = PathBuf::from(text(raw)?),
        }
        Ok(())
    }

    fn name(self) -> String {
        self.to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default()
    }
}

fn text(raw: &str) -> anyhow::Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        anyhow::bail!("value must not be empty");
    }
    Ok(value.to_string())
}

fn number<T: FromStr>(key: ConfigKey, raw: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {}: {} ({})", key.name(), raw, e))
}

fn optional<T: FromStr>(key: ConfigKey, raw: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match raw.trim() {
        "none" | "null" | "" => Ok(None),
        _ => number(key, raw).map(Some),
    }
}

pub async fn run(args: ConfigArgs, explicit: Option<&str>) -> anyhow::Result<()> {
    let path = config_path(explicit);
    match args.command {
        ConfigCommand::Show => show_config(&path),
        ConfigCommand::Init { force } => init_config(&path, force),
        ConfigCommand::Get { key } => {
            println!("{}", key.get(&load_or_default(&path)?));
            Ok(())
        }
        ConfigCommand::Set { key, value } => set_config(&path, key, &value),
        ConfigCommand::Path => show_path(&path),
    }
}

fn load_or_default(path: &Path) -> anyhow::Result<InvexConfig> {
    if path.exists() {
        Ok(InvexConfig::from_file(path)?)
    } else {
        Ok(InvexConfig::default())
    }
}

fn save(config: &InvexConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(config.save(path)?)
}

fn show_config(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        println!("{} No config file found, showing defaults.", style("ℹ").blue());
    }
    let config = load_or_default(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    save(&InvexConfig::default(), path)?;
    println!("{} Created configuration file at {}", style("✓").green(), path.display());
    Ok(())
}

fn set_config(path: &Path, key: ConfigKey, value: &str) -> anyhow::Result<()> {
    let mut config = load_or_default(path)?;
    key.set(&mut config, value)?;
    save(&config, path)?;

    println!("{} Set {} = {}", style("✓").green(), key.name(), key.get(&config));
    Ok(())
}

fn show_path(path: &Path) -> anyhow::Result<()> {
    println!("Configuration file: {}", path.display());

    if path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'invex config init' to create a configuration file.");
    }

    Ok(())
}
