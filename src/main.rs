use clap::Parser;
use schoold::config::{Args, Config};
use schoold::ipc::{self, AppState};
use schoold::notify::LogNotifier;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    // stdout carries replies; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args)?;
    info!("Starting schoold v{}", env!("CARGO_PKG_VERSION"));

    let mut state = AppState::new(cfg.wages.clone(), Arc::new(LogNotifier));
    if let Some(workspace) = cfg.workspace.clone() {
        ipc::select_workspace(&mut state, workspace)?;
    }

    match cfg.http {
        Some(addr) => {
            if state.db.is_none() {
                anyhow::bail!("--http requires a workspace (--workspace or config file)");
            }
            serve_http(state, addr)
        }
        None => {
            serve_stdio(&mut state);
            Ok(())
        }
    }
}

fn serve_http(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let app = schoold::http::build_router(Arc::new(Mutex::new(state)));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("schoold listening on http://{}", addr);
        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn serve_stdio(state: &mut AppState) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = writeln!(stdout, "{}", ipc::err("", "bad_json", e.to_string(), None));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, shutting down");
}
