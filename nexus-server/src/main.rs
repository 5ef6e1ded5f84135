// Copyright 2025 Nexus Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CLI entry point. Also doubles as the static-file server the replay
//! orchestrator's `StaticHtmlAdapter` re-execs into: `--serve-static <dir>
//! <host> <port>` is checked before normal argument parsing since the
//! orchestrator invokes `current_exe()` directly with those three
//! positional arguments, not through clap.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use nexus_server::config::ServerConfig;

const SERVE_STATIC_FLAG: &str = "--serve-static";

#[derive(Debug, Parser)]
#[command(name = "nexus-server", about = "Nexus: a local GitHub developer command center")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw_args: Vec<String> = std::env::args().collect();
    if raw_args.len() == 5 && raw_args[1] == SERVE_STATIC_FLAG {
        return serve_static(&raw_args[2], &raw_args[3], &raw_args[4]).await;
    }

    let args = Args::parse();
    let mut config = ServerConfig::load(args.config).context("loading configuration")?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    nexus_server::run_server(config).await
}

/// The minimal static-file server used to serve a materialized replay
/// workspace: bound to loopback only, no directory listing beyond what
/// `ServeDir` provides by default.
async fn serve_static(dir: &str, host: &str, port: &str) -> Result<()> {
    use axum::Router;
    use tower_http::services::{ServeDir, ServeFile};

    let port: u16 = port.parse().context("invalid port argument")?;
    if host != "127.0.0.1" {
        anyhow::bail!("static server must bind to loopback only");
    }

    let index = PathBuf::from(dir).join("index.html");
    let serve_dir = ServeDir::new(dir).not_found_service(ServeFile::new(index));
    let app = Router::new().fallback_service(serve_dir);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("static server loop failed")?;
    Ok(())
}
