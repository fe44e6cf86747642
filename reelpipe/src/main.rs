use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use reelpipe_api::RelayServer;
use reelpipe_core::{load_config, logging, Config, MediaKind, PlaybackSession, ResolvedStream};
use reelpipe_proxy::{HeaderSet, ProxyTarget};

/// The player page heartbeats every couple of seconds while a tab is open;
/// silence this long means the tab is gone or wedged.
const STALE_PLAYER_AFTER: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "reelpipe")]
#[command(about = "Local relay that streams header-guarded media to any player", long_about = None)]
struct Args {
    /// Upstream media URL (HLS manifest or direct file)
    url: String,

    /// How to frame the source; auto sniffs manifest vs file from the URL
    #[arg(long, value_enum, default_value_t = SourceKind::Auto)]
    kind: SourceKind,

    /// Request header the upstream host requires, as NAME:VALUE (repeatable)
    #[arg(long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,

    /// Local subtitle file wired into the player (SubRip is converted)
    #[arg(long, value_name = "PATH")]
    subtitle: Option<String>,

    /// Bind host for the relay
    #[arg(long, env = "REELPIPE_SERVER_HOST")]
    host: Option<String>,

    /// Bind port for the relay; 0 picks a free port
    #[arg(long, env = "REELPIPE_SERVER_PORT")]
    port: Option<u16>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Auto,
    Manifest,
    File,
}

impl SourceKind {
    fn resolve(self, url: &str) -> MediaKind {
        match self {
            Self::Auto => MediaKind::guess_for_url(url),
            Self::Manifest => MediaKind::Manifest,
            Self::File => MediaKind::SingleFile,
        }
    }
}

/// The command line stands in for a scraper result: a single stream whose
/// site label is the URL host. Nothing reported a quality.
fn resolved_stream(target: &ProxyTarget, kind: MediaKind) -> ResolvedStream {
    ResolvedStream {
        source: target.url.host_str().unwrap_or("direct").to_string(),
        quality: "unknown".to_string(),
        url: target.url.to_string(),
        kind,
    }
}

/// Idle duration once the player has been silent long enough to call stale.
fn stale_idle(idle: Option<Duration>) -> Option<Duration> {
    idle.filter(|idle| *idle >= STALE_PLAYER_AFTER)
}

/// Parse repeated NAME:VALUE pairs into an ordered header set. Later
/// duplicates overwrite earlier ones without disturbing their position.
fn parse_cli_headers(raw: &[String]) -> Result<HeaderSet> {
    let mut headers = HeaderSet::new();
    for entry in raw {
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid header {entry:?}, expected NAME:VALUE"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow::anyhow!(
                "invalid header {entry:?}, name must not be empty"
            ));
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }
    Ok(headers)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = match args.config.as_deref() {
        Some(path) => Config::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {path}: {e}"))?,
        None => load_config()?,
    };

    // 2. Apply command-line overrides
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // 3. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 4. Initialize logging
    logging::init_logging(&config.logging)?;

    // 5. Resolve the playback target
    let kind = args.kind.resolve(&args.url);
    let headers = parse_cli_headers(&args.headers)?;
    let target = ProxyTarget::parse(&args.url, headers)
        .map_err(|e| anyhow::anyhow!("invalid url {}: {e}", args.url))?;
    let stream = resolved_stream(&target, kind);
    info!(
        source = %stream.source,
        url = %stream.url,
        kind = ?stream.kind,
        "resolved playback target"
    );

    if let Some(sub) = args.subtitle.as_deref() {
        if !Path::new(sub).exists() {
            warn!(path = %sub, "subtitle file not found, the player will skip it");
        }
    }

    // 6. Start the relay on its own session
    let session = Arc::new(PlaybackSession::new());
    let mut server = RelayServer::start_with_session(&config, Arc::clone(&session)).await?;
    let base = server.base();

    // 7. Hand the URLs to the consumer
    println!(
        "Player: {}",
        base.player_url(stream.kind, &target, args.subtitle.as_deref())
    );
    println!("Stream: {}", base.playback_url(stream.kind, &target));

    // 8. Serve until the player finishes or a signal arrives, warning once
    //    per episode of heartbeat silence
    let finished = session.finished();
    tokio::pin!(finished);
    let signal = shutdown_signal();
    tokio::pin!(signal);
    let mut stale_check = tokio::time::interval(Duration::from_secs(10));
    let mut warned_stale = false;
    loop {
        tokio::select! {
            () = &mut finished => {
                info!("Playback finished, stopping relay...");
                break;
            }
            () = &mut signal => {
                info!("Shutdown signal received, stopping relay...");
                break;
            }
            _ = stale_check.tick() => {
                match stale_idle(session.idle_for()) {
                    Some(idle) if !warned_stale => {
                        warn!(
                            idle_secs = idle.as_secs(),
                            "player heartbeats stopped; close it or press Ctrl+C to stop the relay"
                        );
                        warned_stale = true;
                    }
                    Some(_) => {}
                    None => warned_stale = false,
                }
            }
        }
    }

    // 9. Graceful shutdown
    server.shutdown().await;
    info!("Relay stopped");

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
