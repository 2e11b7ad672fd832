// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent process entry point and CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

use sonde_agent::{host::RealHost, AgentConfig, Connection, Executor, Scrubber};
use sonde_packs::{missing_requirements, PackRegistry};
use sonde_wire::{decode, encode, AckPayload, Envelope, MessageType};

#[derive(Parser)]
#[command(name = "sonde-agent", version, about = "Sonde diagnostic agent")]
struct Cli {
    /// Config file path (default ~/.sonde/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll this host with a hub
    Enroll {
        /// Hub URL, e.g. ws://hub.example:8420
        #[arg(long)]
        hub: String,
        /// Existing API key
        #[arg(long, conflicts_with = "token")]
        key: Option<String>,
        /// One-time enrollment token
        #[arg(long)]
        token: Option<String>,
        /// Agent name (default: hostname)
        #[arg(long)]
        name: Option<String>,
    },
    /// Connect to the hub and serve probes
    Start {
        /// Run in the foreground without prompting
        #[arg(long)]
        headless: bool,
    },
    /// Show enrollment and pack status
    Status,
    /// Pack operations
    Packs {
        #[command(subcommand)]
        command: PacksCommand,
    },
}

#[derive(Subcommand)]
enum PacksCommand {
    /// List known packs and whether they are enabled
    List,
    /// Check pack requirements against this host
    Scan,
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn config_path(cli_override: &Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match cli_override {
        Some(path) => Ok(path.clone()),
        None => Ok(AgentConfig::default_path()?),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let path = config_path(&cli.config)?;
    match cli.command {
        Command::Enroll { hub, key, token, name } => enroll(&path, hub, key, token, name),
        Command::Start { headless: _ } => start(&path),
        Command::Status => status(&path),
        Command::Packs { command } => packs(&path, command),
    }
}

fn load_config(path: &PathBuf) -> anyhow::Result<AgentConfig> {
    AgentConfig::load(path)
        .with_context(|| format!("not enrolled (missing {})", path.display()))
}

fn build_executor(config: &AgentConfig) -> Arc<Executor> {
    let registry = PackRegistry::local_for_agent(&config.disabled_packs);
    Arc::new(Executor::new(
        registry,
        Arc::new(sonde_agent::exec::TokioExec),
        Scrubber::new(&config.scrub_patterns),
        config.agent_name.clone(),
    ))
}

fn start(path: &PathBuf) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let executor = build_executor(&config);
    let connection = Arc::new(Connection::new(config, path.clone(), executor));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let conn = Arc::clone(&connection);
        let handle = tokio::spawn(conn.run());
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("stopping");
        connection.stop();
        handle.abort();
    });
    Ok(())
}

fn status(path: &PathBuf) -> anyhow::Result<()> {
    let config = load_config(path)?;
    println!("hub:        {}", config.hub_url);
    println!("agent:      {}", config.agent_name);
    println!("agent id:   {}", config.agent_id.as_deref().unwrap_or("(not assigned)"));
    println!("mtls:       {}", if config.cert_path.is_some() { "enabled" } else { "disabled" });
    let disabled: Vec<&str> = config.disabled_packs.iter().map(String::as_str).collect();
    println!(
        "packs off:  {}",
        if disabled.is_empty() { "(none)".to_string() } else { disabled.join(", ") }
    );
    Ok(())
}

fn packs(path: &PathBuf, command: PacksCommand) -> anyhow::Result<()> {
    let config = AgentConfig::load(path).unwrap_or_default();
    let registry = PackRegistry::local_for_agent(&Default::default());
    match command {
        PacksCommand::List => {
            for pack in registry.iter() {
                let state = if config.disabled_packs.contains(&pack.manifest.name) {
                    "disabled"
                } else {
                    "active"
                };
                println!(
                    "{:<12} {:<8} {:<9} {}",
                    pack.manifest.name, pack.manifest.version, state, pack.manifest.description
                );
            }
        }
        PacksCommand::Scan => {
            let host = RealHost;
            for pack in registry.iter() {
                let missing = missing_requirements(&pack.manifest.requires, &host);
                if missing.is_empty() {
                    println!("{:<12} ok", pack.manifest.name);
                } else {
                    println!(
                        "{:<12} missing: {}",
                        pack.manifest.name,
                        serde_json::to_string(&missing)?
                    );
                }
            }
        }
    }
    Ok(())
}

fn enroll(
    path: &PathBuf,
    hub: String,
    key: Option<String>,
    token: Option<String>,
    name: Option<String>,
) -> anyhow::Result<()> {
    let credential = key
        .clone()
        .or_else(|| token.clone())
        .ok_or_else(|| anyhow!("one of --key or --token is required"))?;
    let agent_name = match name {
        Some(n) => n,
        None => hostname()?,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let ack = runtime.block_on(enroll_handshake(&hub, &credential, token.as_deref(), &agent_name))?;

    if let Some(error) = ack.error {
        bail!("hub rejected enrollment: {error}");
    }
    let agent_id =
        ack.agent_id.as_ref().ok_or_else(|| anyhow!("hub ack carried no agent id"))?;
    let api_key = ack
        .api_key
        .clone()
        .or(key)
        .ok_or_else(|| anyhow!("hub ack carried no API key"))?;

    let dir = path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir)?;
    let mut config = AgentConfig {
        hub_url: hub,
        api_key,
        agent_name: agent_name.clone(),
        agent_id: Some(agent_id.to_string()),
        ..Default::default()
    };

    let write_pem = |file: &str, pem: &Option<String>| -> anyhow::Result<Option<PathBuf>> {
        match pem {
            Some(pem) => {
                let p = dir.join(file);
                std::fs::write(&p, pem)?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    };
    config.cert_path = write_pem("agent-cert.pem", &ack.cert_pem)?;
    config.key_path = write_pem("agent-key.pem", &ack.key_pem)?;
    config.ca_cert_path = write_pem("hub-ca.pem", &ack.ca_cert_pem)?;
    config.hub_key_path = write_pem("hub-key.pub.pem", &ack.hub_key_pem)?;

    config.save(path)?;
    println!("enrolled as {agent_name} ({agent_id})");
    println!("config written to {}", path.display());
    Ok(())
}

/// One-shot register over a fresh socket; returns the hub's ack.
async fn enroll_handshake(
    hub: &str,
    bearer: &str,
    token: Option<&str>,
    agent_name: &str,
) -> anyhow::Result<AckPayload> {
    let url = format!("{}/ws/agent", hub.trim_end_matches('/'));
    let mut request = url.into_client_request()?;
    request.headers_mut().insert("authorization", format!("Bearer {bearer}").parse()?);
    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .context("hub connection failed")?;
    let (mut write, mut read) = ws.split();

    let payload = sonde_wire::RegisterPayload {
        name: agent_name.to_string(),
        os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        version: env!("CARGO_PKG_VERSION").to_string(),
        enrollment_token: token.map(str::to_string),
        ..Default::default()
    };
    let envelope =
        Envelope::new(MessageType::AgentRegister, serde_json::to_value(&payload)?);
    write.send(Message::Text(encode(&envelope)?.into())).await?;

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                let Ok(envelope) = decode(text.as_str()) else { continue };
                if envelope.message_type == MessageType::HubAck {
                    return Ok(envelope.payload_as::<AckPayload>()?);
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    bail!("hub closed before acking the registration")
}

fn hostname() -> anyhow::Result<String> {
    let output = std::process::Command::new("hostname").output().context("hostname")?;
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if name.is_empty() {
        bail!("could not determine hostname; pass --name");
    }
    Ok(name)
}
