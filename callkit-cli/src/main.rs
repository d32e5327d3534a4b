use anyhow::{Context, Result, bail};
use callkit_client::{ChannelStatus, Refusal, SignalingChannel, SignalingConfig, SignalingLink};
use callkit_core::{IceServerConfig, SessionId, SignalKind, SignalMessage};
use callkit_relay::{Authenticator, RelayConfig, StaticTokens, TokenAsIdentity};
use clap::{Parser, Subcommand};
use colored::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "callkit")]
#[command(bin_name = "callkit")]
#[command(about = "Signaling relay and diagnostics for 1:1 interview calls")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Relay {
        /// JSON file with relay settings; flags below override it.
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        bind: Option<String>,

        /// STUN/TURN URL pushed to clients. Repeatable; replaces the configured list.
        #[arg(long = "ice-server")]
        ice_servers: Vec<String>,

        #[arg(long)]
        backlog_limit: Option<usize>,

        #[arg(long)]
        seat_grace_ms: Option<u64>,

        /// JSON object of token -> participant id. Without it the token is the identity.
        #[arg(long)]
        tokens: Option<PathBuf>,
    },

    /// Join a call room and print its signaling traffic until Ctrl-C.
    Listen {
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,

        #[arg(long)]
        token: String,

        #[arg(long)]
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Relay {
            config,
            bind,
            ice_servers,
            backlog_limit,
            seat_grace_ms,
            tokens,
        } => {
            let mut relay = load_config(config.as_deref())?;
            if let Some(bind) = bind {
                relay.bind = bind;
            }
            if !ice_servers.is_empty() {
                relay.ice_servers = ice_servers.into_iter().map(IceServerConfig::stun).collect();
            }
            if let Some(limit) = backlog_limit {
                relay.backlog_limit = limit;
            }
            if let Some(grace) = seat_grace_ms {
                relay.seat_grace_ms = grace;
            }
            let authenticator = load_authenticator(tokens.as_deref())?;

            println!("{}", "📡 Starting callkit relay...".green().bold());
            println!("   🔌 Bind:        {}", relay.bind);
            for server in &relay.ice_servers {
                println!("   🧊 ICE server:  {}", server.urls.join(", "));
            }
            callkit_relay::serve(relay, authenticator).await?;
        }

        Commands::Listen { url, token, session } => listen(url, token, SessionId::from(session)).await?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RelayConfig> {
    let Some(path) = path else {
        return Ok(RelayConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read relay config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid relay config {}", path.display()))
}

fn load_authenticator(path: Option<&Path>) -> Result<Arc<dyn Authenticator>> {
    let Some(path) = path else {
        return Ok(Arc::new(TokenAsIdentity));
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read token file {}", path.display()))?;
    let table: HashMap<String, String> = serde_json::from_str(&text)
        .with_context(|| format!("Token file {} must be a JSON object of strings", path.display()))?;
    if table.is_empty() {
        bail!("Token file {} has no tokens", path.display());
    }

    info!("Loaded {} relay tokens", table.len());
    let tokens = table
        .into_iter()
        .fold(StaticTokens::new(), |tokens, (token, participant)| {
            tokens.with_token(token, participant)
        });
    Ok(Arc::new(tokens))
}

async fn listen(url: String, token: String, session: SessionId) -> Result<()> {
    let config = SignalingConfig {
        url,
        ..Default::default()
    };
    let channel = SignalingChannel::connect(config, token)
        .await
        .context("Failed to connect to the relay")?;
    let me = channel.participant_id().clone();
    println!("{} as {}", "✅ Connected".green().bold(), me.to_string().cyan());

    let (tx, mut rx) = mpsc::unbounded_channel();
    for kind in SignalKind::INBOUND {
        let tx = tx.clone();
        channel.on(
            &session,
            kind,
            Arc::new(move |message| {
                let _ = tx.send(message);
            }),
        );
    }
    let (refused_tx, mut refused) = mpsc::unbounded_channel();
    channel.on_refusal(
        &session,
        Arc::new(move |refusal: Refusal| {
            let _ = refused_tx.send(refusal);
        }),
    );
    channel
        .send(SignalMessage::new(SignalKind::Join, session.clone(), me.clone()))
        .await;

    let mut status = channel.status();
    loop {
        tokio::select! {
            Some(message) = rx.recv() => print_signal(&message),
            Some(refusal) = refused.recv() => {
                println!("{} {}: {}", "refused".red().bold(), refusal.kind, refusal.reason);
                if refusal.kind == SignalKind::Join {
                    break;
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("{} {:?}", "relay".yellow(), current);
                if current == ChannelStatus::Closed {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    channel
        .send(SignalMessage::new(SignalKind::Leave, session.clone(), me))
        .await;
    channel.off_all(&session);
    channel.close();
    let _ = timeout(
        Duration::from_secs(1),
        status.wait_for(|s| *s == ChannelStatus::Closed),
    )
    .await;
    println!("{}", "👋 Left the room".green());
    Ok(())
}

fn print_signal(message: &SignalMessage) {
    let detail = match (message.sdp(), message.candidate()) {
        (Some(sdp), _) => format!("{} bytes of SDP", sdp.len()),
        (None, Some(candidate)) => candidate.candidate.clone(),
        (None, None) => String::new(),
    };
    println!(
        "{} {} {}",
        message.kind.to_string().bold(),
        message.from_participant_id.to_string().cyan(),
        detail.dimmed()
    );
}
