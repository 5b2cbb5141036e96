use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use avl_exchange::{logging, Config, Exchange, OrderGenerator};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

/// Run the exchange against synthetic order flow.
#[derive(Debug, Parser)]
#[command(name = "simulator", version, about)]
struct Args {
    /// TOML config file; built-in defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the starting last traded price
    #[arg(long)]
    initial_price: Option<i64>,

    /// Seed the order generator for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Default tracing filter (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    log_filter: String,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    run_for: Option<u64>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    if let Some(price) = args.initial_price {
        config.exchange.initial_price = price;
    }
    if args.seed.is_some() {
        config.generator.seed = args.seed;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(&args.log_filter);

    let config = load_config(&args)?;
    info!(initial_price = config.exchange.initial_price, "starting exchange simulator");

    let exchange = Arc::new(Exchange::with_config(config.exchange.clone()));
    exchange.subscribe(|price| info!(target: "price", ltp = price, "last traded price updated"))?;

    let tasks = exchange.spawn();
    let generator = tokio::spawn(OrderGenerator::new(config.generator.clone()).run(Arc::clone(&exchange)));

    // Periodic book summary
    let reporter = {
        let exchange = Arc::clone(&exchange);
        let period = config.exchange.match_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = exchange.snapshot().await;
                        let stats = exchange.stats().await;
                        info!(
                            ltp = snapshot.last_traded_price,
                            best_bid = snapshot.buy_orders.first().map(|o| o.price()),
                            best_ask = snapshot.sell_orders.first().map(|o| o.price()),
                            resting_buys = stats.resting_buys,
                            resting_sells = stats.resting_sells,
                            trades = stats.trades,
                            rejected = stats.rejected,
                            skipped_cycles = stats.skipped_cycles,
                            "book summary"
                        );
                    }
                    _ = exchange.wait_for_shutdown() => break,
                }
            }
        })
    };

    info!("press Ctrl+C to exit");
    match args.run_for {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {},
                _ = shutdown_signal() => {},
            }
        }
        None => shutdown_signal().await,
    }

    info!("shutting down");
    exchange.shutdown();
    generator.await?;
    reporter.await?;
    tasks.matching.await?;
    tasks.ingestion.await??;

    let stats = exchange.stats().await;
    info!(
        trades = stats.trades,
        accepted = stats.accepted,
        rejected = stats.rejected,
        buy_nodes_allocated = stats.buy_pool.allocated,
        buy_nodes_recycled = stats.buy_pool.recycled,
        sell_nodes_allocated = stats.sell_pool.allocated,
        sell_nodes_recycled = stats.sell_pool.recycled,
        "exchange stopped"
    );
    Ok(())
}
