// CrabPhoto node
// Drives the camera owned by this process and serves JSON commands on stdin.
//
// Usage: crabphoto-node [config.toml] [--owner <name>]
//
// Each stdin line is one request, e.g. {"op":"trigger"}; each response is
// written as one JSON line on stdout. Picture notifications are interleaved
// as {"event":"picture",...} lines.

use anyhow::{bail, Context};
use crabphoto::commands::handle_line;
use crabphoto::{Backend, PhotoNode, PhotoNodeConfig};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, Notify};

struct Args {
    config_path: PathBuf,
    owner: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut config_path = None;
    let mut owner = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--owner" => {
                i += 1;
                owner = Some(args.get(i).context("--owner needs a value")?.clone());
            }
            "-h" | "--help" => {
                eprintln!("Usage: crabphoto-node [config.toml] [--owner <name>]");
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("Unknown option: {}", other),
            other => {
                if config_path.is_some() {
                    bail!("Unexpected argument: {}", other);
                }
                config_path = Some(PathBuf::from(other));
            }
        }
        i += 1;
    }

    Ok(Args {
        config_path: config_path.unwrap_or_else(PhotoNodeConfig::default_path),
        owner,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crabphoto::init_logging();
    let args = parse_args()?;

    let mut config = PhotoNodeConfig::load_from_file(&args.config_path)
        .with_context(|| format!("loading {}", args.config_path.display()))?;
    if let Some(owner) = args.owner {
        config.camera.owner = owner;
    }

    let backend = Backend::gphoto().context("initialising libgphoto2")?;
    let node = Arc::new(PhotoNode::start(config, backend).context("starting photo node")?);

    let interrupted = Arc::new(Notify::new());
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.notify_one())
            .context("installing Ctrl-C handler")?;
    }

    let mut notifications = node.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    let line = serde_json::json!({ "event": "picture", "picture": notification });
                    println!("{}", line);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Dropped {} picture notifications", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = interrupted.notified() => {
                log::info!("Interrupted, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    log::info!("stdin closed, shutting down");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Keep watching for Ctrl-C while a command blocks on the camera
                let response = tokio::select! {
                    response = handle_line(node.clone(), line) => response,
                    _ = interrupted.notified() => {
                        log::info!("Interrupted during a command, shutting down");
                        break;
                    }
                };
                println!("{}", serde_json::to_string(&response)?);
            }
        }
    }

    printer.abort();
    // Also fails any download still waiting for pictures
    tokio::task::spawn_blocking(move || node.shutdown())
        .await
        .context("shutting down photo node")?;
    Ok(())
}
