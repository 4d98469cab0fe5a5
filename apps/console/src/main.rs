use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use sync_engine::{
    ConversationSyncClient, HttpMessageApi, Intent, SendOutcome, ViewportState,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{parse_command, Command, HELP};
use config::load_settings;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "console.toml")]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    cache_capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(server_url) = args.server_url {
        settings.api_base_url = server_url;
    }
    if let Some(cache_capacity) = args.cache_capacity {
        settings.engine.cache_capacity = cache_capacity;
    }
    info!(
        api_base_url = %settings.api_base_url,
        cache_capacity = settings.engine.cache_capacity,
        "console starting"
    );

    let api = HttpMessageApi::new(&settings.api_base_url, settings.request_timeout())?;
    let client = ConversationSyncClient::new_with_api(settings.engine.clone(), Arc::new(api));
    tokio::spawn(print_intents(client.subscribe_intents()));

    let mut viewport = ViewportState::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };

        match command {
            Command::Push(raw) => client.handle_push_json(&raw).await,
            Command::Select(conversation_id) => {
                let client = client.clone();
                tokio::spawn(async move { client.select_conversation(&conversation_id).await });
            }
            Command::Clear => {
                if let Some(previous) = client.clear_selection().await {
                    info!(conversation_id = %previous, "conversation closed");
                }
            }
            Command::Refresh(conversation_id) => {
                let client = client.clone();
                tokio::spawn(async move { client.refresh_conversation(&conversation_id).await });
            }
            Command::Send(content) => {
                let client = client.clone();
                tokio::spawn(async move {
                    if let Ok(outcome) = client.send_message(content).await {
                        report_outcome(&outcome);
                    }
                });
            }
            Command::Retry {
                conversation_id,
                local_id,
            } => {
                let client = client.clone();
                tokio::spawn(async move {
                    match client.retry_send(&conversation_id, &local_id).await {
                        Some(outcome) => report_outcome(&outcome),
                        None => eprintln!("{local_id} is not a failed message in {conversation_id}"),
                    }
                });
            }
            Command::Focus(focused) => {
                viewport.focused = focused;
                client.set_viewport(viewport).await;
            }
            Command::Scroll(distance) => {
                viewport.distance_from_bottom_px = distance.max(0.0);
                client.set_viewport(viewport).await;
            }
            Command::List => {
                println!("{}", serde_json::to_string(&client.conversations().await)?);
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    Ok(())
}

async fn print_intents(mut rx: broadcast::Receiver<Intent>) {
    loop {
        match rx.recv().await {
            Ok(intent) => {
                debug!(
                    conversation_id = intent.conversation_id().map_or("-", |id| id.as_str()),
                    "intent dispatched"
                );
                match serde_json::to_string(&intent) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!("failed to encode intent: {err}"),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "intent printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn report_outcome(outcome: &SendOutcome) {
    match outcome {
        SendOutcome::Confirmed {
            local_id,
            message_id,
        } => info!(%local_id, %message_id, "message delivered"),
        SendOutcome::Failed { local_id, reason } => {
            warn!(%local_id, "message not delivered: {reason}")
        }
    }
}
