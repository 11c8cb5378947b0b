//! Console front end for a voice session that drives MCP tools.
//!
//! This binary:
//! 1. Loads configuration from the environment and the command line.
//! 2. Reads the tool-provider registry and the optional system instruction.
//! 3. Wires the live client and the MCP connector into a session orchestrator.
//! 4. Reads commands from stdin until `/quit` or Ctrl+C, then tears the
//!    session down.

use anyhow::Context;
use clap::Parser;
use gemini_realtime::{LiveClient, LiveEvent, types::GenerationConfig};
use parley::{
    config::{Config, load_system_instruction},
    console::{Command, HELP, parse_command, render_event, render_status},
    voice::pcm_file,
};
use parley_core::{
    McpConnector, OrchestratorConfig, ProviderRegistry, SessionEvent, SessionOrchestrator,
};
use std::{io::Write, path::PathBuf, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Provider registry file, overrides PROVIDERS_PATH.
    #[arg(long)]
    providers: Option<PathBuf>,
    /// Provider to bind on startup.
    #[arg(long)]
    connect: Option<String>,
}

/// Listens for the `Ctrl+C` signal to shut down gracefully.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn print_flush(text: &str) {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

/// Prints session events until the orchestrator goes away.
async fn print_events(orchestrator: Arc<SessionOrchestrator>) {
    let mut events = orchestrator.subscribe();
    drop(orchestrator);
    loop {
        match events.recv().await {
            Ok(SessionEvent::Stream(LiveEvent::Audio(pcm))) => {
                debug!(bytes = pcm.len(), "Model audio received");
            }
            Ok(event) => {
                if let Some(text) = render_event(&event) {
                    print_flush(&text);
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Console fell behind session events"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Runs one console command. Returns `false` when the console should exit.
async fn handle_command(orchestrator: &SessionOrchestrator, command: Command) -> bool {
    match command {
        Command::Connect(provider) => {
            // Failures are reported through ProviderFailed.
            let _ = orchestrator.connect_to_provider(&provider).await;
        }
        Command::Disconnect => {
            let _ = orchestrator.disconnect_provider().await;
        }
        Command::Voice(None) => {
            if orchestrator.stop_voice_capture().await {
                print_flush("[voice capture off]\n");
            } else {
                print_flush("[voice capture is not running]\n");
            }
        }
        Command::Voice(Some(path)) => {
            if orchestrator.stop_voice_capture().await {
                print_flush("[voice capture off]\n");
                return true;
            }
            match pcm_file(&path).await {
                Ok(source) => match orchestrator.toggle_voice_capture(source).await {
                    Ok(_) => print_flush("[voice capture on]\n"),
                    Err(e) => print_flush(&format!("[voice capture unavailable: {e}]\n")),
                },
                Err(e) => print_flush(&format!("[{e:#}]\n")),
            }
        }
        Command::Status => {
            let status = orchestrator.status().await;
            print_flush(&format!("{}\n", render_status(&status)));
            for tool in orchestrator.tools().await {
                print_flush(&format!("  {} - {}\n", tool.name, tool.description));
            }
        }
        Command::Help => print_flush(&format!("{HELP}\n")),
        Command::Quit => return false,
        Command::Say(text) => {
            if let Err(e) = orchestrator.send_text(&text).await {
                print_flush(&format!("[not sent: {e}]\n"));
            }
        }
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!("Configuration loaded. Initializing session...");

    // --- 3. Load Providers and Instruction ---
    let providers_path = args.providers.unwrap_or(config.providers_path.clone());
    let registry = if providers_path.exists() {
        ProviderRegistry::load(&providers_path)?
    } else {
        warn!(path = %providers_path.display(), "Provider registry not found, no providers available");
        ProviderRegistry::default()
    };

    let system_instruction = load_system_instruction(config.system_instruction_path.as_deref())?;

    let mut generation = GenerationConfig {
        response_modalities: vec![config.response_modality],
        ..GenerationConfig::default()
    };
    if let Some(voice) = &config.voice_name {
        generation = generation.with_voice(voice.clone());
    }

    // --- 4. Wire the Session ---
    let client = LiveClient::new(config.live_endpoint.clone()).with_api_key(config.gemini_api_key);
    let connector = Arc::new(McpConnector::new(registry));
    info!(providers = ?connector.registry().ids().collect::<Vec<_>>(), "Provider registry loaded");
    let orchestrator = SessionOrchestrator::new(
        Arc::new(client),
        connector,
        OrchestratorConfig {
            model: config.live_model.clone(),
            generation,
            system_instruction,
        },
    );
    let printer = tokio::spawn(print_events(orchestrator.clone()));

    if let Some(provider) = &args.connect {
        let _ = orchestrator.connect_to_provider(provider).await;
    }

    // --- 5. Console Loop ---
    print_flush(&format!("{HELP}\n"));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if !handle_command(&orchestrator, command).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => print_flush(&format!("[{e}]\n")),
                }
            }
            _ = &mut shutdown => break,
        }
    }

    orchestrator.disconnect_provider().await?;
    printer.abort();
    info!("Session has shut down.");
    Ok(())
}
