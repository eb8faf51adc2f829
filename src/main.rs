mod api;
mod config;
mod drafts;
mod grading;
mod ipc;
mod logging;
mod marks;
mod model;
mod publish;
mod selection;
mod view;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

/// Result grading and publication sidecar. Reads one JSON request per line on
/// stdin and answers one JSON line per request on stdout.
#[derive(Debug, Parser)]
#[command(name = "resultsd", version)]
struct Cli {
    /// JSON config file
    #[arg(long, env = "RESULTSD_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL, e.g. https://school.example/api
    #[arg(long, env = "RESULTSD_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "RESULTSD_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long)]
    log_json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.log_level.as_deref(), cli.log_json)
        .context("failed to initialize logging")?;

    let mut cfg = config::AppConfig::load(cli.config.as_deref())?;
    cfg.apply_overrides(cli.api_url, cli.api_token);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        api = %cfg.api.base_url,
        "resultsd starting"
    );

    let api = api::HttpApi::new(cfg.http());
    let mut state = ipc::AppState::new(cfg, Box::new(api));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                tracing::debug!(id = %req.id, method = %req.method, "request");
                ipc::handle_request(&mut state, req)
            }
            Err(e) => ipc::bad_json(e.to_string()),
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("resultsd exiting");
    Ok(())
}
