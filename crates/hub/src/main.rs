// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub process entry point.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use sonde_hub::{
    env, identity, tls, DenyAllDashboards, Dispatcher, IntegrationExecutor, ProbeRouter,
    RunbookEngine, ToolSurface, Transport, TransportCtx,
};
use sonde_packs::{builtin_runbooks, PackKind, PackRegistry};
use sonde_storage::Store;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();
    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "hub failed");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let secret = env::hub_secret();
    if secret.is_none() {
        tracing::warn!("SONDE_SECRET not set; stored credentials will not be encrypted");
    }
    let store = Arc::new(Store::open(&env::db_path(), secret.as_deref())?);
    let ca = identity::init_ca(&store);

    let registry = Arc::new(PackRegistry::builtin());
    bootstrap_integrations(&store, &registry);

    let dispatcher = Arc::new(Dispatcher::new());
    if let Some(ca) = &ca {
        dispatcher.set_signing_key(ca.envelope_key());
    }

    let fetch = Arc::new(sonde_hub::fetch::ReqwestFetch::new());
    let integrations = Arc::new(IntegrationExecutor::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        fetch,
    ));
    let router = Arc::new(ProbeRouter::new(
        Arc::clone(&registry),
        Arc::clone(&dispatcher),
        Arc::clone(&integrations),
        Arc::clone(&store),
    ));
    let engine = Arc::new(RunbookEngine::new(
        Arc::clone(&router),
        Arc::clone(&dispatcher),
        Arc::clone(&store),
        builtin_runbooks(),
    ));
    // The MCP transport (out of core) consumes this surface.
    let _tools = Arc::new(ToolSurface::new(
        Arc::clone(&router),
        Arc::clone(&engine),
        Arc::clone(&dispatcher),
        Arc::clone(&store),
        Arc::clone(&registry),
    ));

    let ctx = Arc::new(TransportCtx {
        store: Arc::clone(&store),
        dispatcher: Arc::clone(&dispatcher),
        ca: ca.clone(),
        dashboard_auth: Arc::new(DenyAllDashboards),
    });
    let transport = Transport::new(ctx);

    let addr = format!("{}:{}", env::host(), env::port());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, tls = env::tls_enabled(), "hub listening");

    match (&ca, env::tls_enabled()) {
        (Some(ca), true) => {
            let (server_cert, server_key) = ca.issue_server_cert(&[env::host()])?;
            let acceptor = tls::acceptor(ca.cert_pem(), &server_cert, &server_key)?;
            transport.run_tls(listener, acceptor).await;
        }
        (None, true) => {
            tracing::warn!("SONDE_TLS=1 but no CA is available; serving plain TCP");
            transport.run(listener).await;
        }
        _ => transport.run(listener).await,
    }
    Ok(())
}

/// Ensure every built-in integration pack has a registered instance row so
/// probe events have an FK target.
fn bootstrap_integrations(store: &Store, registry: &PackRegistry) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    for pack in registry.iter() {
        if !matches!(pack.kind, PackKind::Integration { .. }) {
            continue;
        }
        let name = &pack.manifest.name;
        match store.integrations_for_pack(name) {
            Ok(existing) if existing.is_empty() => {
                if let Err(e) = store.create_integration(
                    name,
                    name,
                    name,
                    &serde_json::json!({}),
                    None,
                    now,
                ) {
                    tracing::error!(pack = %name, error = %e, "integration bootstrap failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(pack = %name, error = %e, "integration lookup failed"),
        }
    }
}
