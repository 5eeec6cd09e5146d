//! Retro - peer-to-peer retrospective board for the terminal

mod command;
mod error;
mod render;
mod session;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use retro_core::{
    Database, MemoryStore, PeerAddress, PersistenceSettings, RetroConfig, Role,
    SettingsRepository, Storage,
};
use retro_net::{JoinLink, Node, SyncEngine, Transport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::prelude::*;

use crate::error::{Error, Result};
use crate::session::{Reply, Session};

#[derive(Parser, Debug)]
#[command(name = "retro", version, about = "Peer-to-peer retrospective board")]
struct Cli {
    /// Config file, defaults to the platform config directory
    #[arg(long, env = "RETRO_CONFIG")]
    config: Option<PathBuf>,

    /// Where snapshots and settings are stored
    #[arg(long, env = "RETRO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Start a new session and wait for peers
    Host {
        #[arg(long)]
        name: Option<String>,

        /// Listen port, 0 picks a free one
        #[arg(long)]
        port: Option<u16>,

        /// Address peers use to reach this machine
        #[arg(long, default_value = "127.0.0.1")]
        advertise: String,
    },
    /// Join a session from a join link or session id
    Join {
        link: String,

        #[arg(long)]
        name: Option<String>,

        /// moderator, participant or guest
        #[arg(long)]
        role: Option<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        tracing::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "onyx", "retro").ok_or(Error::NoDataDir)
}

fn load_config(path: Option<PathBuf>) -> Result<RetroConfig> {
    let path = match path {
        Some(path) => path,
        None => project_dirs()?.config_dir().join("retro.toml"),
    };
    if !path.exists() {
        let config = RetroConfig::default();
        config.save(&path)?;
        tracing::info!(path = %path.display(), "Wrote default config");
        return Ok(config);
    }
    Ok(RetroConfig::load(&path)?)
}

/// Pick the snapshot store and the persistence settings to start with
///
/// Settings saved by an earlier run win over the config file.
fn open_store(
    config: &RetroConfig,
    data_dir: &Path,
) -> Result<(Box<dyn Storage + Send>, PersistenceSettings)> {
    let store: Box<dyn Storage + Send> = if config.persistence.use_durable_store {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join("retro.db");
        tracing::info!(path = %path.display(), "Opening snapshot store");
        Box::new(Database::open(&path)?.with_quota(config.snapshot_quota_bytes))
    } else {
        tracing::info!("Using session-only snapshot store");
        Box::new(MemoryStore::new().with_quota(config.snapshot_quota_bytes))
    };

    let settings = match store.load_settings()? {
        Some(settings) => settings,
        None => {
            store.save_settings(&config.persistence)?;
            config.persistence.clone()
        }
    };
    Ok((store, settings))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config)?;
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => project_dirs()?.data_dir().to_path_buf(),
    };
    let (store, settings) = open_store(&config, &data_dir)?;
    let debounce = Duration::from_millis(config.autosave_debounce_ms);
    let transport = Transport::new();

    let session = match cli.mode {
        Mode::Host {
            name,
            port,
            advertise,
        } => {
            let listener = transport
                .listen(port.unwrap_or(config.listen_port))
                .await?;
            let address = PeerAddress::new(format!("{}:{}", advertise, listener.port()));
            let name = name.unwrap_or_else(|| config.display_name.clone());
            let engine = SyncEngine::host(name, address, config.vote_budget);
            let link = JoinLink::new(config.join_base_url.clone(), engine.session_id());

            println!("Hosting session {}", engine.session_id());
            println!("Join link: {}", link.to_url());
            let node = Node::spawn(engine, transport, Some(listener), store, settings, debounce);
            Session::new(node, link, std::env::current_dir()?)
        }
        Mode::Join { link, name, role } => {
            let session_id = JoinLink::session_from_input(&link)?;
            let role = match role {
                Some(role) => role.parse::<Role>()?,
                None => config.role,
            };
            let name = name.unwrap_or_else(|| config.display_name.clone());
            let engine = SyncEngine::join(
                name,
                PeerAddress::generate(),
                role,
                session_id.clone(),
                config.vote_budget,
            );
            let link = JoinLink::new(config.join_base_url.clone(), session_id.clone());
            let node = Node::spawn(engine, transport, None, store, settings, debounce);
            if let Err(e) = node.connect(session_id.clone()).await {
                node.shutdown().await;
                return Err(e.into());
            }
            println!("Joined session {}", session_id);
            Session::new(node, link, std::env::current_dir()?)
        }
    };

    println!("Type `help` for commands.");
    prompt_loop(session).await
}

async fn prompt_loop(mut session: Session) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match command::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                match session.execute(command).await {
                    Ok(Reply::Text(text)) => println!("{}", text),
                    Ok(Reply::Quit) => break,
                    Err(e) => println!("{}", e),
                }
            }
            event = session.next_event() => {
                let Some(event) = event else { break };
                if let Some(notice) = render::event(&event) {
                    println!("* {}", notice);
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
