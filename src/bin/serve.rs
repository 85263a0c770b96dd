//! rulecast: geosite ruleset conversion server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use rulecast::index::IndexPublisher;
use rulecast::server::{build_router, AppState};
use rulecast::{Fetcher, HttpTransport, ResultCache, RulesetService, SourceCache};

const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Parser, Debug)]
#[command(name = "rulecast")]
#[command(version)]
#[command(about = "Republishes the v2fly domain-list-community dataset as proxy rulesets")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "RULECAST_PORT")]
    port: u16,

    /// Upstream archive URL
    #[arg(long, default_value = rulecast::DEFAULT_UPSTREAM_URL, env = "RULECAST_UPSTREAM_URL")]
    upstream_url: String,

    /// Base URL for generated index entries (optional)
    #[arg(long, env = "RULECAST_BASE_URL")]
    base_url: Option<String>,

    /// Local index.json mirror path (optional)
    #[arg(long, env = "RULECAST_INDEX_PATH")]
    index_path: Option<PathBuf>,

    /// Repository URL for the root redirect
    #[arg(
        long,
        default_value = "https://github.com/rulecast/rulecast",
        env = "RULECAST_REPO_URL"
    )]
    repo_url: String,

    /// Source cache TTL in seconds
    #[arg(long, default_value_t = 1800, env = "RULECAST_SOURCE_TTL")]
    source_ttl: u64,

    /// Result cache TTL in seconds
    #[arg(long, default_value_t = 86400, env = "RULECAST_RESULT_TTL")]
    result_ttl: u64,

    /// Source cache snapshot file path (optional)
    #[arg(long, env = "RULECAST_SNAPSHOT_PATH")]
    snapshot_path: Option<PathBuf>,

    /// Source refresh interval in seconds (0 disables the refresh loop)
    #[arg(long, default_value_t = 1800, env = "RULECAST_REFRESH_INTERVAL")]
    refresh_interval: u64,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let source = Arc::new(match &args.snapshot_path {
        Some(path) => SourceCache::with_persistence(Duration::from_secs(args.source_ttl), path),
        None => SourceCache::new(Duration::from_secs(args.source_ttl)),
    });
    if let Some(path) = &args.snapshot_path {
        match source.load_from_file(path) {
            Ok(true) => log::info!("restored source snapshot from {}", path.display()),
            Ok(false) => {}
            Err(e) => log::warn!("failed to restore snapshot from {}: {}", path.display(), e),
        }
    }

    let fetcher = Fetcher::new(
        Box::new(HttpTransport::new(&args.upstream_url)),
        Arc::clone(&source),
    );
    let results = Arc::new(ResultCache::new(Duration::from_secs(args.result_ttl)));
    let service = Arc::new(RulesetService::new(fetcher, results));
    let index = Arc::new(IndexPublisher::new(args.index_path.clone()));

    // Initial index derivation; a cold upstream is not fatal.
    if let Some(base_url) = args.base_url.clone() {
        let service = Arc::clone(&service);
        let index = Arc::clone(&index);
        let outcome = tokio::task::spawn_blocking(move || {
            refresh_index(&service, &index, &base_url)
        })
        .await;
        if let Ok(Err(e)) = outcome {
            log::warn!("initial index refresh failed: {e}");
        }
    }

    // Result cache sweep loop.
    {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                service.sweep_results();
            }
        });
    }

    // Source refresh loop.
    if args.refresh_interval > 0 {
        let service = Arc::clone(&service);
        let index = Arc::clone(&index);
        let source = Arc::clone(&source);
        let base_url = args.base_url.clone();
        let interval = Duration::from_secs(args.refresh_interval);
        tokio::spawn(async move {
            // First tick is immediate, so the archive is pre-warmed at
            // startup before any request hits a cold cache.
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let service = Arc::clone(&service);
                let index = Arc::clone(&index);
                let source = Arc::clone(&source);
                let base_url = base_url.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    refresh_source(&service, &index, &source, base_url.as_deref())
                })
                .await;
                if let Ok(Err(e)) = outcome {
                    log::warn!("source refresh failed: {e}");
                }
            }
        });
    }

    let state = Arc::new(AppState {
        service,
        index,
        repo_url: args.repo_url.clone(),
        base_url: args.base_url.clone(),
        index_path: args.index_path.clone(),
    });
    let app = build_router(state);

    log::info!("starting rulecast on port {}", args.port);
    log::info!(
        "source TTL: {}s, result TTL: {}s, refresh interval: {}s",
        args.source_ttl,
        args.result_ttl,
        args.refresh_interval
    );
    if let Some(path) = &args.snapshot_path {
        log::info!("source snapshot: {}", path.display());
    }
    if let Some(base_url) = &args.base_url {
        log::info!("base URL: {base_url}");
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    axum::serve(listener, app).await
}

/// One background refresh pass: probe upstream and re-derive the index
/// when the fingerprint moved.
fn refresh_source(
    service: &RulesetService,
    index: &IndexPublisher,
    source: &SourceCache,
    base_url: Option<&str>,
) -> rulecast::Result<()> {
    let before = source.fingerprint();
    let (archive, fingerprint) = service.refresh_source()?;
    if before.as_deref() != Some(&fingerprint) {
        log::info!("source archive refreshed (fingerprint {fingerprint})");
    }
    if let Some(base_url) = base_url {
        let base = format!("{}/geosite", base_url.trim_end_matches('/'));
        index.refresh(&archive, &fingerprint, &base)?;
    }
    Ok(())
}

fn refresh_index(
    service: &RulesetService,
    index: &IndexPublisher,
    base_url: &str,
) -> rulecast::Result<()> {
    let (archive, fingerprint) = service.current()?;
    let base = format!("{}/geosite", base_url.trim_end_matches('/'));
    index.refresh(&archive, &fingerprint, &base)?;
    Ok(())
}
