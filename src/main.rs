//! convwatch CLI - follow a remote conversion task from the terminal.
//!
//! This is the main binary entry point. See the `convwatch` library for the
//! channel itself.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use convwatch::challenge::{self, StdinAnswerSource};
use convwatch::constants::{ENV_LOG_FILE, EVENT_CAPTCHA};
use convwatch::{Config, EventChannel, HandshakeVariant, Monitor, Outcome};

// CLI
#[derive(Parser)]
#[command(name = "convwatch")]
#[command(version)]
#[command(about = "Watch a conversion task's live event stream")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to a task and print its progress until it finishes
    Watch {
        /// Ticket issued for the task
        ticket: String,
        /// Event endpoint (overrides config)
        #[arg(long)]
        url: Option<String>,
        /// Handshake the endpoint speaks: ready or ticket-push
        #[arg(long)]
        handshake: Option<HandshakeVariant>,
        /// Save captcha images into this directory
        #[arg(long)]
        captcha_dir: Option<PathBuf>,
        /// Never prompt for captcha answers
        #[arg(long)]
        no_prompt: bool,
    },
    /// Inspect or initialize the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,
    /// Print the config file location
    Path,
    /// Write the effective configuration to the config file
    Init,
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            ticket,
            url,
            handshake,
            captcha_dir,
            no_prompt,
        } => {
            let mut config = Config::load()?;
            if let Some(url) = url {
                config.server_url = url;
            }
            if let Some(handshake) = handshake {
                config.handshake = handshake;
            }
            if captcha_dir.is_some() {
                config.captcha_dir = captcha_dir;
            }

            let outcome = watch(&config, ticket, !no_prompt)?;
            log::info!("Watch finished: {:?}", outcome);
            if outcome == Outcome::Disconnected {
                eprintln!("Connection closed before the task finished.");
            }
            std::process::exit(outcome.exit_code());
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = Config::load()?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Path => {
                println!("{}", Config::path()?.display());
            }
            ConfigAction::Init => {
                let path = Config::load()?.save()?;
                println!("Wrote {}", path.display());
            }
        },
    }

    Ok(())
}

/// Log to stderr, or to `CONVWATCH_LOG_FILE` when set.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Ok(path) = std::env::var(ENV_LOG_FILE) {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.format_timestamp_secs().init();
    Ok(())
}

fn watch(config: &Config, ticket: String, prompt: bool) -> Result<Outcome> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;

    let result = runtime.block_on(async {
        let mut channel = EventChannel::builder()
            .url(&config.server_url)
            .ticket(ticket)
            .handshake(config.handshake)
            .build()?;
        let monitor = Monitor::attach(&mut channel, std::io::stdout());

        let responder = if prompt {
            let rx = challenge::subscribe(&mut channel);
            let source = StdinAnswerSource::new(config.captcha_dir.clone());
            Some(tokio::spawn(challenge::respond(rx, source)))
        } else {
            channel.on(EVENT_CAPTCHA, |_| {
                eprintln!("Captcha required, but prompting is disabled (--no-prompt).");
                Ok(())
            });
            challenge::decline(&mut channel);
            None
        };

        channel.connect().await?;

        let sender = channel.sender();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, closing channel");
                if let Err(e) = sender.close() {
                    log::debug!("Close after interrupt failed: {}", e);
                }
            }
        });

        channel.run().await?;

        if let Some(responder) = responder {
            responder.abort();
        }
        Ok::<_, anyhow::Error>(monitor.outcome())
    });

    // A prompt may still be blocked on stdin.
    runtime.shutdown_background();
    result
}
