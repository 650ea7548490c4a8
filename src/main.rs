//! `peer_process <peerId> [--config-dir DIR]`
//!
//! Runs one peer of the swarm until every peer holds the file, or until
//! Ctrl-C. Reads `Common.cfg` and `PeerInfo.cfg` from the config directory
//! (default: the current directory), keeps the file under `peer_<id>/` and
//! logs to `log_peer_<id>.log`.

use peerswarm::constants::LOG_FILE_PREFIX;
use peerswarm::{Engine, EngineConfig, PeerId};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};

const USAGE: &str = "Usage: peer_process <peerId> [--config-dir DIR]";

struct Args {
    peer_id: PeerId,
    config_dir: PathBuf,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut peer_id = None;
        let mut config_dir = PathBuf::from(".");

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config-dir" => {
                    let dir = args.next().ok_or("--config-dir needs a value")?;
                    config_dir = PathBuf::from(dir);
                }
                "-h" | "--help" => return Err(String::new()),
                _ if peer_id.is_none() => {
                    let id: u32 = arg
                        .parse()
                        .map_err(|_| format!("invalid peer id '{}'", arg))?;
                    peer_id = Some(PeerId::new(id));
                }
                _ => return Err(format!("unexpected argument '{}'", arg)),
            }
        }

        Ok(Self {
            peer_id: peer_id.ok_or("missing peer id")?,
            config_dir,
        })
    }
}

fn init_logging(path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load(args.peer_id, &args.config_dir)?;

    std::fs::create_dir_all(config.peer_dir())?;
    let log_path = config
        .work_dir
        .join(format!("{}{}.log", LOG_FILE_PREFIX, config.local_id));
    init_logging(&log_path)?;

    let engine = Engine::new(config).await?;
    engine.start().await?;

    tokio::select! {
        _ = engine.wait_for_swarm() => {
            info!("Peer {} is done: every peer has the complete file", engine.local_id());
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Peer {} interrupted", engine.local_id());
        }
    }

    engine.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("peer_process: {}", msg);
            }
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("peer_process: {}", e);
            ExitCode::FAILURE
        }
    }
}
