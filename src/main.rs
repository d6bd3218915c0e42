use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use modechat::config::settings::{load_config, load_config_at};
use modechat::core::conversation::HttpModelClient;
use modechat::core::store::TranscriptStore;
use modechat::tools::{builtin_tools, Workspace};
use modechat::ui::console::ConsoleUi;
use modechat::{Chat, SlashCommand};

#[derive(Parser, Debug)]
#[command(name = "modechat", version, about = "Terminal chat with mode-scoped tools")]
struct Args {
    /// Model id from the config's model table
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// System prompt for the assistant
    #[arg(long, short = 's')]
    system: Option<String>,

    /// Mode to start in
    #[arg(long)]
    mode: Option<String>,

    /// Show debug output and verbose logs
    #[arg(long, short = 'd')]
    debug: bool,

    /// Skip the startup banner
    #[arg(long)]
    no_banner: bool,

    /// Read configuration from this file instead of ~/.modechat/config.json
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not record turns in the transcript database
    #[arg(long)]
    no_log: bool,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("MODECHAT_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("modechat={}", default_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let mut config = match &args.config {
        Some(path) => load_config_at(path)?,
        None => load_config(),
    };

    // Apply CLI overrides
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(system) = args.system {
        config.system_prompt = Some(system);
    }
    if let Some(mode) = args.mode {
        config.initial_mode = Some(mode);
    }
    config.debug |= args.debug;
    config.show_banner &= !args.no_banner;

    let catalog = builtin_tools(&Workspace::current_dir());
    let modes = config.build_modes(&catalog)?;
    let client = Arc::new(HttpModelClient::new(config.model_specs()));

    let mut builder = Chat::builder(client, config.model.clone())
        .debug(config.debug)
        .show_banner(config.show_banner);
    builder = if modes.is_empty() {
        builder.tools_only(catalog)
    } else {
        builder.modes(modes)
    };
    if let Some(mode) = config.initial_mode.clone() {
        builder = builder.initial_mode(mode);
    }
    if let Some(prompt) = config.system_prompt.clone() {
        builder = builder.system_prompt(prompt);
    }
    if let Some(message) = config.first_message.clone() {
        builder = builder.first_message(message);
    }
    for (name, text) in &config.slash_commands {
        builder = builder.slash_command(name.clone(), SlashCommand::prompt(text.clone()));
    }

    if config.log_transcripts && !args.no_log {
        match TranscriptStore::open().and_then(|store| {
            let store = Arc::new(store);
            let session = store.create_session(&config.model)?;
            Ok(store.turn_sink(session.id))
        }) {
            Ok(sink) => builder = builder.turn_sink(sink),
            Err(e) => tracing::warn!(error = %e, "transcript logging disabled"),
        }
    }

    let mut chat = builder.build()?;
    let mut ui = ConsoleUi::new()?;
    chat.run(&mut ui).await
}
