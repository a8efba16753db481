use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use keyword_scan::fetcher::FetchStrategy;
use keyword_scan::matcher::split_keywords;
use keyword_scan::registry::ScanRegistry;
use keyword_scan::scanner::{ScanConfig, ScanService};
use keyword_scan::server::{self, AppState};
use keyword_scan::store::{load_targets_from_path, JsonFileStore};
use keyword_scan::types::ScanRecord;

/// keyword-scan: background keyword scanner for web pages with live progress polling.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "keyword-scan",
    version,
    about = "Background keyword scanner for web pages with live progress polling.",
    long_about = None
)]
struct Cli {
    /// Serve the HTTP API instead of running a single scan.
    #[arg(long, default_value_t = false)]
    serve: bool,

    /// Address the HTTP API binds to.
    #[arg(long, default_value = "127.0.0.1:5000")]
    bind: String,

    /// Comma-separated keywords for a one-shot scan.
    #[arg(long)]
    keywords: Option<String>,

    /// Comma-separated URLs or path to a targets file. If omitted, enabled URLs from --urls-file.
    #[arg(long)]
    targets: Option<String>,

    /// JSON array of URL records; enabled entries are scanned when no targets are given.
    #[arg(long = "urls-file", default_value = "urls.json")]
    urls_file: PathBuf,

    /// JSON file finished scans are appended to.
    #[arg(long = "history-file", default_value = "scan_history.json")]
    history_file: PathBuf,

    /// Timeout of the first (browser-like) fetch attempt.
    #[arg(long = "default-timeout-ms", default_value_t = 10_000)]
    default_timeout_ms: u64,

    /// Timeout of the polite fallback attempt.
    #[arg(long = "polite-timeout-ms", default_value_t = 20_000)]
    polite_timeout_ms: u64,

    /// Pause after each URL.
    #[arg(long = "delay-ms", default_value_t = 100)]
    delay_ms: u64,

    /// Write the finished scan record as pretty JSON to this path (one-shot mode).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    println!("keyword-scan configuration:");
    println!("  mode         : {}", if cli.serve { "serve" } else { "one-shot" });
    if cli.serve {
        println!("  bind         : {}", cli.bind);
    }
    println!(
        "  targets      : {}",
        cli.targets.as_deref().unwrap_or("<enabled urls from store>")
    );
    println!("  urls_file    : {}", cli.urls_file.display());
    println!("  history_file : {}", cli.history_file.display());
    println!("  timeouts_ms  : {} / {}", cli.default_timeout_ms, cli.polite_timeout_ms);
    println!("  delay_ms     : {}", cli.delay_ms);

    let config = ScanConfig {
        strategies: FetchStrategy::default_chain(
            Duration::from_millis(cli.default_timeout_ms),
            Duration::from_millis(cli.polite_timeout_ms),
        ),
        delay: Duration::from_millis(cli.delay_ms),
    };
    let store = Arc::new(JsonFileStore::new(&cli.urls_file, &cli.history_file));
    let service = ScanService::from_config(&config, ScanRegistry::new(), store)
        .context("failed to build HTTP client")?;

    if cli.serve {
        return serve(&cli.bind, service).await;
    }

    let Some(raw_keywords) = cli.keywords.as_deref() else {
        bail!("nothing to do: pass --serve, or --keywords for a one-shot scan");
    };
    let targets = match cli.targets.as_deref() {
        Some(t) => Some(resolve_targets(t)?),
        None => None,
    };

    let record = run_once(&service, split_keywords(raw_keywords), targets).await?;
    print_results_table(&record);
    if let Some(path) = cli.output.as_deref() {
        if let Err(e) = write_record_json(path, &record) {
            eprintln!("Failed to write JSON to {}: {:#}", path.display(), e);
        } else {
            println!("Wrote JSON results to {}", path.display());
        }
    }
    Ok(())
}

async fn serve(bind: &str, service: ScanService) -> Result<()> {
    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn({
        let bind = bind.to_string();
        let shutdown = shutdown.clone();
        async move { server::spawn_server(&bind, AppState::new(service), shutdown).await }
    });
    println!("Press Ctrl+C to stop the server...");

    // The server only exits on its own if it failed to start.
    let exited = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            false
        }
        res = &mut server => {
            res??;
            true
        }
    };
    if !exited {
        shutdown.cancel();
        server.await??;
    }
    Ok(())
}

/// Start one scan and print progress until it completes.
async fn run_once(
    service: &ScanService,
    keywords: Vec<String>,
    targets: Option<Vec<String>>,
) -> Result<ScanRecord> {
    let id = service.trigger(keywords, targets).await?;
    let registry = service.registry();
    println!("\nScan {id} started");

    let mut last_current = None;
    while !registry.is_finished(&id).await? {
        let record = service.status(&id).await?;
        if last_current != Some(record.progress.current) {
            last_current = Some(record.progress.current);
            println!(
                "  [{}/{}] {}",
                record.progress.current,
                record.progress.total,
                record.progress.url.as_deref().unwrap_or("")
            );
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Ok(registry.wait(&id).await?)
}

fn resolve_targets(raw: &str) -> Result<Vec<String>> {
    let path = Path::new(raw);
    if path.is_file() {
        return load_targets_from_path(path);
    }
    Ok(raw.split(',').map(|t| t.trim().to_string()).collect())
}

fn print_results_table(record: &ScanRecord) {
    let mut kw_w = "keyword".len();
    let mut url_w = "url".len();
    for m in &record.matches {
        kw_w = kw_w.max(m.keyword.len());
        url_w = url_w.max(m.url.len().min(60));
    }

    println!(
        "\nMatches: {} (urls: {}, errors: {})",
        record.matches.len(),
        record.progress.total,
        record.errors.len()
    );
    println!("{:<kw_w$}  {:<url_w$}", "keyword", "url", kw_w = kw_w, url_w = url_w);
    println!("{:-<kw_w$}  {:-<url_w$}", "", "", kw_w = kw_w, url_w = url_w);
    for m in &record.matches {
        println!(
            "{:<kw_w$}  {:<url_w$}",
            m.keyword,
            truncate(&m.url, 60),
            kw_w = kw_w,
            url_w = url_w
        );
    }

    if !record.errors.is_empty() {
        println!("\nErrors:");
        for e in &record.errors {
            println!("  {}  {}", e.url, truncate(&e.error, 120));
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    &s[..cut]
}

fn write_record_json(path: &Path, record: &ScanRecord) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, record)?;
    Ok(())
}
