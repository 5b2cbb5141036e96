use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Sparkline},
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::{io, time::Duration};

use avl_exchange::{BookSnapshot, Config, Exchange, ExchangeStats, Order, OrderGenerator};
use clap::Parser;
use parking_lot::Mutex;
use tokio::runtime::Runtime;

const HISTORY_LEN: usize = 200;

/// Live view of the exchange: resting books, last traded price and pool telemetry.
#[derive(Debug, Parser)]
#[command(name = "tui-demo", version, about)]
struct Args {
    /// TOML config file; built-in defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed the order generator
    #[arg(long)]
    seed: Option<u64>,
}

/// Updated from the price subscriber thread.
#[derive(Default)]
struct PriceTicker {
    updates: AtomicU64,
    history: Mutex<VecDeque<u64>>,
}

impl PriceTicker {
    fn record(&self, price: i64) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        let mut history = self.history.lock();
        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(price.max(0) as u64);
    }

    fn history(&self) -> Vec<u64> {
        self.history.lock().iter().copied().collect()
    }
}

fn render_orders(orders: &[Order]) -> String {
    let mut out = String::new();
    for order in orders {
        out.push_str(&format!("{:>8}  {}\n", order.price(), order.id()));
    }
    out
}

fn render_stats(stats: &ExchangeStats, updates: u64) -> String {
    format!(
        "Accepted: {}  Rejected: {}  Trades: {}  Skipped cycles: {}\n\
         Resting: {} buys / {} sells  Price updates: {}\n\
         Buy pool:  live {} free {} allocated {} recycled {}\n\
         Sell pool: live {} free {} allocated {} recycled {}",
        stats.accepted,
        stats.rejected,
        stats.trades,
        stats.skipped_cycles,
        stats.resting_buys,
        stats.resting_sells,
        updates,
        stats.buy_pool.live,
        stats.buy_pool.free,
        stats.buy_pool.allocated,
        stats.buy_pool.recycled,
        stats.sell_pool.live,
        stats.sell_pool.free,
        stats.sell_pool.allocated,
        stats.sell_pool.recycled,
    )
}

fn draw(f: &mut Frame, snapshot: &BookSnapshot, history: &[u64], stats_text: String) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(
            [
                Constraint::Length(3),  // Header
                Constraint::Min(12),    // Book
                Constraint::Length(5),  // Price history
                Constraint::Length(6),  // Stats
            ]
            .as_ref(),
        )
        .split(f.size());

    // 1. Header
    let header = Block::default().borders(Borders::ALL).title("AVL Exchange");
    let title = Paragraph::new(format!(
        "LTP: {} | {} | Press 'q' to quit",
        snapshot.last_traded_price,
        snapshot.timestamp.format("%H:%M:%S")
    ))
    .block(header)
    .alignment(Alignment::Center)
    .style(Style::default().fg(Color::Cyan));
    f.render_widget(title, chunks[0]);

    // 2. Book
    let book_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    let bids_widget = Paragraph::new(render_orders(&snapshot.buy_orders))
        .block(Block::default().borders(Borders::ALL).title("BIDS").style(Style::default().fg(Color::Green)));
    let asks_widget = Paragraph::new(render_orders(&snapshot.sell_orders))
        .block(Block::default().borders(Borders::ALL).title("ASKS").style(Style::default().fg(Color::Red)));
    f.render_widget(bids_widget, book_chunks[0]);
    f.render_widget(asks_widget, book_chunks[1]);

    // 3. Price history
    let sparkline = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title("Last Traded Price"))
        .data(history)
        .style(Style::default().fg(Color::Magenta));
    f.render_widget(sparkline, chunks[2]);

    // 4. Stats
    let stats_block = Paragraph::new(stats_text)
        .block(Block::default().borders(Borders::ALL).title("Exchange Telemetry"))
        .style(Style::default().fg(Color::Yellow));
    f.render_widget(stats_block, chunks[3]);
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    rt: &Runtime,
    exchange: &Exchange,
    ticker: &PriceTicker,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        // Handle input
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') {
                    return Ok(());
                }
            }
        }

        let snapshot = rt.block_on(exchange.snapshot());
        let stats = rt.block_on(exchange.stats());
        let history = ticker.history();
        let stats_text = render_stats(&stats, ticker.updates.load(Ordering::Relaxed));

        terminal.draw(|f| draw(f, &snapshot, &history, stats_text))?;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    if args.seed.is_some() {
        config.generator.seed = args.seed;
    }
    config.validate()?;

    // The alternate screen owns stdout, so no tracing subscriber is installed here.
    let rt = Runtime::new()?;
    let exchange = Arc::new(Exchange::with_config(config.exchange.clone()));

    let ticker = Arc::new(PriceTicker::default());
    {
        let ticker = Arc::clone(&ticker);
        exchange.subscribe(move |price| ticker.record(price))?;
    }

    let tasks = {
        let _guard = rt.enter();
        let tasks = exchange.spawn();
        rt.spawn(OrderGenerator::new(config.generator.clone()).run(Arc::clone(&exchange)));
        tasks
    };

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &rt, &exchange, &ticker);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    exchange.shutdown();
    rt.block_on(async {
        let _ = tasks.matching.await;
        let _ = tasks.ingestion.await;
    });
    result
}
