// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use commitzilla::{
    characters::{bundled_characters, CharacterMap},
    config::DEFAULT_MODEL,
    discover_repo_root,
    install::Artifact,
    secret::{resolve_api_key, API_KEY, SERVICE},
    CharacterSeed, CharacterStore, CommitMessageTransformer, ConfigStore, FileSecretStore,
    HookScript, InstallationManager, OpenAiClient, Outcome, Prefix, SecretStore, SettingKey,
    Settings,
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{
    validator::ValueRequiredValidator, Confirm, Password, PasswordDisplayMode, Select, Text,
};
use std::{
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  commitzilla [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Install => run_install(),
            Command::Uninstall(opts) => run_uninstall(opts),
            Command::Configure(opts) => run_configure(opts),
            Command::Character => run_character(),
            Command::Prefix(opts) => run_prefix(opts),
            Command::Status => run_status(),
            Command::Hook(opts) => {
                run_hook(opts).await;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install commitzilla as the prepare-commit-msg hook of this repository.
    #[command(override_usage = "commitzilla install")]
    Install,

    /// Remove every commitzilla artifact from this repository.
    #[command(override_usage = "commitzilla uninstall [options]")]
    Uninstall(UninstallOptions),

    /// Update model or API key.
    #[command(override_usage = "commitzilla configure [options]")]
    Configure(ConfigureOptions),

    /// Pick or create the character commit messages are written by.
    #[command(override_usage = "commitzilla character")]
    Character,

    /// Toggle the "[character] " prefix of rewritten messages.
    #[command(override_usage = "commitzilla prefix [yes|no]")]
    Prefix(PrefixOptions),

    /// Show installation state and current settings.
    #[command(override_usage = "commitzilla status")]
    Status,

    /// Rewrite commit message file. Invoked by Git, not by hand.
    #[command(hide = true)]
    Hook(HookOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct UninstallOptions {
    /// Also delete the stored API key.
    #[arg(long)]
    pub forget_key: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigureOptions {
    /// Completion model to request, e.g., gpt-4o-mini.
    #[arg(short, long, value_name = "model")]
    pub model: Option<String>,

    /// OpenAI API key.
    #[arg(short, long, value_name = "key")]
    pub api_key: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PrefixOptions {
    /// Either yes or no. Prompts when omitted.
    #[arg(value_name = "yes|no")]
    pub value: Option<String>,
}

#[derive(Parser, Clone, Debug)]
struct HookOptions {
    /// Path to commit message file.
    #[arg(required = true, value_name = "message_file")]
    pub message_file: PathBuf,

    /// Source of the commit message, passed along by Git.
    #[arg(value_name = "source")]
    pub source: Option<String>,

    /// Commit object name, passed along by Git.
    #[arg(value_name = "sha")]
    pub sha: Option<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn run_install() -> Result<()> {
    let root = repo_root()?;
    let manager = InstallationManager::open(&root)?;
    if manager.is_installed() {
        bail!(
            "commitzilla is already installed in {:?}, run `commitzilla uninstall` first",
            root.display()
        );
    }

    let secrets = FileSecretStore::open_default()?;
    let api_key = Password::new("OpenAI API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_validator(ValueRequiredValidator::default())
        .without_confirmation()
        .prompt()?;
    let (name, prompt, _) = prompt_character(&bundled_characters()?)?;

    secrets.set(SERVICE, API_KEY, &api_key)?;
    let settings = Settings {
        model: Some(DEFAULT_MODEL.into()),
        prefix: Some(Prefix::No),
        character_name: Some(name.clone()),
        character_prompt: Some(prompt),
    };
    manager.install(&settings, CharacterSeed::Bundled, &HookScript::for_current_exe())?;
    info!("Successfully installed commitzilla, now using {name}");

    Ok(())
}

fn run_uninstall(opts: UninstallOptions) -> Result<()> {
    let root = repo_root()?;
    let manager = InstallationManager::open(&root)?;
    if manager.is_installed() {
        manager.uninstall()?;
        info!("Successfully uninstalled commitzilla");
    } else {
        info!("commitzilla is not installed in {:?}", root.display());
    }

    if opts.forget_key {
        FileSecretStore::open_default()?.delete(SERVICE, API_KEY)?;
        info!("forgot stored API key");
    }

    Ok(())
}

fn run_configure(opts: ConfigureOptions) -> Result<()> {
    let mut updated = Vec::new();

    if let Some(model) = opts.model {
        let root = repo_root()?;
        require_installed(&root)?;
        let mut store = ConfigStore::open(&root)?;
        store.write(&Settings {
            model: Some(model),
            ..Default::default()
        })?;
        updated.push("model");
    }

    if let Some(api_key) = opts.api_key {
        FileSecretStore::open_default()?.set(SERVICE, API_KEY, &api_key)?;
        updated.push("api key");
    }

    if updated.is_empty() {
        info!("nothing to configure, see `commitzilla configure --help`");
    } else {
        info!("updated {}", updated.join(", "));
    }

    Ok(())
}

fn run_character() -> Result<()> {
    let root = repo_root()?;
    require_installed(&root)?;

    let mut characters = CharacterStore::open(&root, CharacterSeed::Bundled)?;
    let (name, prompt, custom) = prompt_character(characters.characters())?;
    if custom {
        characters.set(name.as_str(), prompt.as_str())?;
        info!("saved character {name:?}");
    }

    let use_now = Confirm::new(&format!("Use {name} for your commits now?"))
        .with_default(true)
        .prompt()?;
    if use_now {
        ConfigStore::open(&root)?.write(&Settings {
            character_name: Some(name.clone()),
            character_prompt: Some(prompt),
            ..Default::default()
        })?;
        info!("Now using {name}");
    }

    Ok(())
}

fn run_prefix(opts: PrefixOptions) -> Result<()> {
    let root = repo_root()?;
    require_installed(&root)?;
    let mut store = ConfigStore::open(&root)?;

    let prefix = match opts.value {
        Some(value) => value.parse::<Prefix>()?,
        None => {
            let current = store.settings()?.prefix_enabled();
            Confirm::new("Prefix commit messages with the character name?")
                .with_default(current)
                .prompt()?
                .into()
        }
    };

    store.write(&Settings {
        prefix: Some(prefix),
        ..Default::default()
    })?;
    info!("prefix set to {prefix}");

    Ok(())
}

fn run_status() -> Result<()> {
    let root = repo_root()?;
    let manager = InstallationManager::open(&root)?;
    let state = manager.state();

    for artifact in Artifact::ALL {
        let mark = if state.is_present(artifact) {
            "present"
        } else {
            "missing"
        };
        info!(
            "{artifact}: {mark} ({:?})",
            artifact.path(manager.paths()).display()
        );
    }

    if !state.is_installed() {
        info!("commitzilla is not installed");
        return Ok(());
    }

    if state.is_partial() {
        warn!("partial install, run `commitzilla uninstall` then `commitzilla install` to repair");
    }

    if state.is_present(Artifact::Settings) {
        let store = ConfigStore::open(&root)?;
        for key in SettingKey::ALL {
            info!("{key} = {}", store.get(key).unwrap_or("<unset>"));
        }
    }

    let credential = match resolve_api_key(&FileSecretStore::open_default()?)? {
        Some(_) => "available",
        None => "missing",
    };
    info!("api key: {credential}");

    Ok(())
}

async fn run_hook(opts: HookOptions) {
    debug!("hook called with source {:?} and sha {:?}", opts.source, opts.sha);
    if let Err(error) = hook(&opts.message_file).await {
        warn!("{error}, keeping the original message");
    }
}

async fn hook(message_file: &Path) -> Result<()> {
    let root = repo_root()?;
    let transformer =
        CommitMessageTransformer::new(root, OpenAiClient::new()?, FileSecretStore::open_default()?);

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.yellow} {msg}")?);

    if let Outcome::Rewritten(text) = transformer.run(message_file, &bar).await {
        debug!("new commit message: {text:?}");
    }

    Ok(())
}

fn repo_root() -> Result<PathBuf> {
    Ok(discover_repo_root(std::env::current_dir()?)?)
}

fn require_installed(root: &Path) -> Result<()> {
    if !commitzilla::is_installed(root) {
        bail!("commitzilla is not installed, run `commitzilla install` first");
    }

    Ok(())
}

const CUSTOM_CHARACTER: &str = "Create a custom character";
const PRECONFIGURED_CHARACTER: &str = "Choose a preconfigured character";

/// Ask for a character. Returns name, prompt, and whether it is new.
fn prompt_character(characters: &CharacterMap) -> Result<(String, String, bool)> {
    if !characters.is_empty() {
        let kind = Select::new(
            "Which character should write your commits?",
            vec![PRECONFIGURED_CHARACTER, CUSTOM_CHARACTER],
        )
        .prompt()?;

        if kind == PRECONFIGURED_CHARACTER {
            let name = Select::new("Character:", characters.keys().cloned().collect()).prompt()?;
            let prompt = characters.get(&name).cloned().unwrap_or_default();
            return Ok((name, prompt, false));
        }
    }

    let name = Text::new("Character name:")
        .with_validator(ValueRequiredValidator::default())
        .prompt()?;
    let prompt = Text::new("Describe how they talk:")
        .with_validator(ValueRequiredValidator::default())
        .prompt()?;

    Ok((name.trim().to_string(), prompt.trim().to_string(), true))
}
