/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Live quotes and bars of the watch list logged until shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use chartfeed_adapter::{
    ClientConfig, ConnectionState, HttpClient, Multiplexer, RequestCache, WsTransport,
};
use chartfeed_datafeed::{BinanceDatafeed, DatafeedConfig, QuoteResult, WatchConfig};

/// Seconds of history requested per watched symbol at startup
const STARTUP_HISTORY_SECS: i64 = 3600;

#[derive(Parser, Debug)]
#[command(name = "chartfeed-datafeed", version, about = "Binance chart datafeed runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting chartfeed-datafeed"
    );

    let config = load_config(&args.config_path)?;
    info!(watch_count = config.watch.len(), "configuration loaded");

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let http = HttpClient::with_config(ClientConfig::default(), &config.rest_base_url)
        .context("build http client")?;
    let cache = RequestCache::new(Arc::new(http));
    let multiplexer = Arc::new(Multiplexer::new(
        Arc::new(WsTransport::new(config.stream_url.clone())),
        config.multiplexer_config(),
    ));
    let datafeed = BinanceDatafeed::new(multiplexer.clone(), cache, config.datafeed_options());

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());
    spawn_state_logger(&multiplexer, shutdown.clone());

    let ready = datafeed.on_ready().await.context("initialize datafeed")?;
    info!(resolutions = ready.supported_resolutions.len(), "datafeed ready");

    match datafeed.get_server_time().await {
        Ok(server_time) => info!(server_time, "exchange clock"),
        Err(err) => warn!(error = %err, "server time unavailable"),
    }

    let mut listeners = Vec::new();
    for watch in &config.watch {
        match start_watch(&datafeed, watch).await {
            Ok(ids) => listeners.push(ids),
            Err(err) => warn!(symbol = %watch.symbol, error = %err, "watch not started"),
        }
    }
    info!(symbols = listeners.len(), "watch list streaming");

    shutdown.cancelled().await;
    info!("shutdown signal received");

    for (quotes_id, bars_id) in &listeners {
        datafeed.unsubscribe_quotes(quotes_id);
        datafeed.unsubscribe_bars(bars_id);
    }
    multiplexer.shutdown();
    info!("multiplexer shutdown complete");

    Ok(())
}

/// Resolve, load recent history, then stream quotes and bars for one symbol.
async fn start_watch(datafeed: &BinanceDatafeed, watch: &WatchConfig) -> Result<(String, String)> {
    let symbol = datafeed
        .resolve_symbol(&watch.symbol)
        .with_context(|| format!("resolve {}", watch.symbol))?;
    info!(
        symbol = %symbol.name,
        description = %symbol.description,
        pricescale = symbol.pricescale,
        "symbol resolved"
    );

    let now = chrono::Utc::now().timestamp();
    let history = datafeed
        .get_bars(&symbol.name, &watch.resolution, now - STARTUP_HISTORY_SECS, now)
        .await
        .with_context(|| format!("history for {}", symbol.name))?;
    info!(
        symbol = %symbol.name,
        resolution = %watch.resolution,
        bars = history.bars.len(),
        no_data = history.no_data,
        "history loaded"
    );

    for quote in datafeed.get_quotes(std::slice::from_ref(&symbol.name)).await? {
        log_quote(&quote);
    }

    let quotes_id = Uuid::new_v4().to_string();
    datafeed.subscribe_quotes(std::slice::from_ref(&symbol.name), &quotes_id, |quotes| {
        for quote in &quotes {
            log_quote(quote);
        }
    })?;

    let bars_id = Uuid::new_v4().to_string();
    let name = symbol.name.clone();
    datafeed.subscribe_bars(&symbol.name, &watch.resolution, &bars_id, move |bar| {
        info!(
            symbol = %name,
            time = bar.time,
            open = %bar.open,
            high = %bar.high,
            low = %bar.low,
            close = %bar.close,
            volume = %bar.volume,
            "bar"
        );
    })?;

    Ok((quotes_id, bars_id))
}

fn log_quote(quote: &QuoteResult) {
    match quote {
        QuoteResult::Ok { name, values } => info!(
            symbol = %name,
            last = %values.lp,
            bid = %values.bid,
            ask = %values.ask,
            change_pct = %values.chp,
            "quote"
        ),
        QuoteResult::Error { name } => warn!(symbol = %name, "quote unavailable"),
    }
}

fn spawn_state_logger(multiplexer: &Multiplexer, shutdown: CancellationToken) {
    let mut state_rx = multiplexer.connection_state();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *state_rx.borrow_and_update();
                    match state {
                        ConnectionState::Disconnected => warn!(?state, "stream connection state"),
                        _ => info!(?state, "stream connection state"),
                    }
                }
            }
        }
    });
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<DatafeedConfig> {
    let path_str = path
        .to_str()
        .context("config path must be valid utf-8")?;
    DatafeedConfig::from_file(path_str).context("load config")
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
