// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use dugout::config;
use dugout::registry::SessionRegistry;
use dugout::server::{self, AppState};
use dugout::source::{GeminiSource, InsightSource};

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dugout", about = "Streaming match-insight relay")]
struct Cli {
    /// Path to the dugout.yaml config file
    #[arg(long, default_value = "dugout.yaml", env = "DUGOUT_CONFIG")]
    config: String,

    /// Port to listen on (overrides the config file)
    #[arg(long, env = "DUGOUT_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let path = std::path::PathBuf::from(&cli.config);
    let config = if path.exists() {
        match config::load_config(&config::FileSource { path }) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("failed to load config: {e}");
                std::process::exit(1);
            }
        }
    } else {
        tracing::info!(path = %cli.config, "config file not found, using defaults");
        config::Config::default()
    };

    let source: Arc<dyn InsightSource> = match GeminiSource::from_env(&config.upstream) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("failed to build upstream source: {e}");
            std::process::exit(1);
        }
    };

    let port = cli.port.unwrap_or(config.server.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    tracing::info!(
        %addr,
        model = %config.upstream.model,
        max_sessions = config.stream.max_concurrent_sessions,
        heartbeat_secs = config.stream.heartbeat_interval_secs,
        "dugout starting"
    );

    let state = AppState {
        source,
        registry: SessionRegistry::new(config.stream.max_concurrent_sessions),
        options: config.stream.session_options(),
        supported_sports: Arc::new(config.server.supported_sports.clone()),
    };

    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "dugout listening");

    axum::serve(listener, app).await.expect("server error");
}
