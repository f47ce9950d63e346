//! Darvas CLI: scan, order placement, watchlist and data commands.
//!
//! Commands:
//! - `scan`: classify a universe, merge the watchlist, optionally order the HOT basket
//! - `place`: one order from the latest scan with a manual quantity
//! - `watchlist`: print the persisted watchlist
//! - `alerts`: movements between the two most recent scans
//! - `download`: refresh the bar cache

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use darvas_core::compute_movements;
use darvas_core::data::{DataProvider, StdoutProgress, Universe};
use darvas_core::domain::{Order, OrderStatus};
use darvas_core::WatchlistEntry;
use darvas_runner::export::read_scan_csv;
use darvas_runner::{
    latest_scan_files, load_bars, load_latest_market_scan, network_provider, place_basket, place_single,
    run_scan_cycle, save_order_log, BasketOutcome, Credentials, DarvasConfig, LoadOptions, RestOrderSink, ScanCycle,
    Submission, WatchlistStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "darvas", about = "Darvas box scanner with a persistent watchlist")]
struct Cli {
    /// Path to a TOML config file. Defaults to ./darvas.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a universe and update the watchlist.
    Scan {
        /// Symbols to scan (e.g., TITAN HAL IRCTC).
        symbols: Vec<String>,

        /// Universe file: one symbol per line, or TOML with [sectors].
        #[arg(long)]
        file: Option<PathBuf>,

        /// Build orders for HOT APPROACHING symbols after the scan.
        #[arg(long, default_value_t = false)]
        auto_order: bool,

        /// Submit orders to the broker (without this flag orders are a dry run).
        #[arg(long, default_value_t = false, requires = "auto_order")]
        live: bool,

        /// Maximum loss per trade at the stop, overrides [orders].risk_per_trade.
        #[arg(long)]
        risk: Option<f64>,

        /// Scan worker threads, overrides [scan].workers.
        #[arg(long)]
        workers: Option<usize>,

        /// Offline mode: cached bars only.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Use synthetic data as fallback.
        #[arg(long, default_value_t = false, conflicts_with = "offline")]
        synthetic: bool,
    },
    /// Place one order from the latest scan.
    Place {
        /// Symbol from the latest scan.
        #[arg(long)]
        symbol: String,

        /// Share quantity.
        #[arg(long)]
        qty: u64,

        /// Submit to the broker (without this flag the order is a dry run).
        #[arg(long, default_value_t = false)]
        live: bool,
    },
    /// Print the persisted watchlist.
    Watchlist,
    /// Compare the two most recent scans.
    Alerts {
        /// Print alerts as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Download daily bars into the cache.
    Download {
        /// Symbols to download.
        symbols: Vec<String>,

        /// Universe file: one symbol per line, or TOML with [sectors].
        #[arg(long)]
        file: Option<PathBuf>,

        /// Re-download even if the cache is current.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = DarvasConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            symbols,
            file,
            auto_order,
            live,
            risk,
            workers,
            offline,
            synthetic,
        } => {
            if let Some(risk) = risk {
                config.orders.risk_per_trade = risk;
            }
            if let Some(workers) = workers {
                config.scan.workers = workers;
            }
            config.scan.offline |= offline;
            config.scan.synthetic |= synthetic;
            config.validate()?;
            let universe = resolve_universe(symbols, file.as_deref())?;
            run_scan_cmd(&config, &universe, auto_order, live)
        }
        Commands::Place { symbol, qty, live } => run_place(&config, &symbol, qty, live),
        Commands::Watchlist => run_watchlist(&config),
        Commands::Alerts { json } => run_alerts(&config, json),
        Commands::Download { symbols, file, force } => {
            let universe = resolve_universe(symbols, file.as_deref())?;
            run_download(&config, &universe, force)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn resolve_universe(symbols: Vec<String>, file: Option<&Path>) -> Result<Universe> {
    match (symbols.is_empty(), file) {
        (false, None) => Ok(Universe::from_symbols(symbols)?),
        (true, Some(path)) => {
            Universe::from_file(path).with_context(|| format!("failed to load universe {}", path.display()))
        }
        (false, Some(_)) => bail!("pass symbols or --file, not both"),
        (true, None) => bail!("no symbols to scan; pass symbols or --file"),
    }
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

// ─── scan ───────────────────────────────────────────────────────────

fn run_scan_cmd(config: &DarvasConfig, universe: &Universe, auto_order: bool, live: bool) -> Result<()> {
    let provider = network_provider(&config.scan)?;
    let provider_ref: Option<&dyn DataProvider> = provider.as_ref().map(|p| p as &dyn DataProvider);

    let now = local_now();
    let symbols = universe.all_tickers();
    info!(symbols = symbols.len(), offline = config.scan.offline, "universe loaded");
    let cycle = run_scan_cycle(config, &symbols, provider_ref, now.date(), now)?;
    print_scan_summary(&cycle);

    if auto_order {
        // Artifacts and watchlist are already on disk; failures below only
        // affect the order phase.
        run_basket(config, &cycle, live, now)?;
    }
    Ok(())
}

fn print_scan_summary(cycle: &ScanCycle) {
    let report = &cycle.report;
    println!();
    println!("=== Darvas Scan ===");
    println!("Universe:       {}", report.universe_size);
    for (status, count) in report.status_counts() {
        println!("{:<15} {count}", format!("{status}:"));
    }
    println!("Excluded:       {} (box too wide)", report.excluded.len());
    println!("Skipped:        {}", report.skipped.len());
    for s in &report.skipped {
        println!("  {:<12} {}", s.symbol, s.reason);
    }

    if !cycle.ranked.is_empty() {
        println!();
        println!(
            "{:<12} {:<15} {:<9} {:>10} {:>10} {:>8} {:>6} {:>5}",
            "Symbol", "Status", "Tier", "Close", "Ceiling", "Dist%", "VolX", "Days"
        );
        println!("{}", "-".repeat(82));
        for r in &cycle.ranked {
            let res = &r.result;
            let mark = if r.upgraded { " ^" } else { "" };
            println!(
                "{:<12} {:<15} {:<9} {:>10.2} {:>10} {:>8} {:>6.2} {:>5}{mark}",
                res.symbol,
                res.status.to_string(),
                res.tier.map(|t| t.to_string()).unwrap_or_default(),
                res.close,
                fmt_opt(res.box_ceiling),
                fmt_opt(res.dist_to_ceil_pct),
                res.volume_ratio,
                res.days_in_box.map(|d| d.to_string()).unwrap_or_default(),
            );
        }
    }

    if !cycle.add_candidates.is_empty() {
        println!();
        println!("--- Add-on candidates ---");
        for c in &cycle.add_candidates {
            println!(
                "{:<12} entry {:.2} -> new ceiling {:.2} (+{:.2}%) {}",
                c.symbol, c.entry_price, c.new_ceiling, c.gain_pct, c.status
            );
        }
    }

    let m = &cycle.merge;
    println!();
    println!(
        "Watchlist:      {} entries ({} added, {} updated, {} graduated, {} expired)",
        cycle.watchlist_size,
        m.added.len(),
        m.updated.len(),
        m.graduated.len(),
        m.expired.len()
    );
    if let Some(backup) = &cycle.watchlist_load.backup {
        println!("WARNING: corrupt watchlist backed up to {}", backup.display());
    }
    if report.has_synthetic() {
        println!();
        println!("WARNING: Results include SYNTHETIC data: {}", report.synthetic.join(", "));
        println!("         These symbols are not added to the watchlist or ordered.");
    }
    println!("Scan saved to:  {}", cycle.artifacts.csv.display());
    println!("Run id:         {}", cycle.artifacts.run_id);
    println!();
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".into())
}

// ─── orders ─────────────────────────────────────────────────────────

fn live_sink(config: &DarvasConfig) -> Result<RestOrderSink> {
    let credentials = Credentials::from_env().context("live orders need broker credentials")?;
    Ok(RestOrderSink::new(credentials, &config.broker)?)
}

fn run_basket(config: &DarvasConfig, cycle: &ScanCycle, live: bool, now: NaiveDateTime) -> Result<()> {
    let sink;
    let submission = if live {
        sink = live_sink(config)?;
        Submission::Live(&sink)
    } else {
        Submission::DryRun
    };

    let outcome = place_basket(&cycle.market, &config.orders, submission, now);
    print_basket(&outcome, submission.is_live());

    if let Some(path) = save_order_log(&outcome.orders, submission.audit_tag(false), &config.scan.output_dir, now)? {
        println!("Order log:      {}", path.display());
    }
    Ok(())
}

fn print_basket(outcome: &BasketOutcome, live: bool) {
    println!();
    println!("=== Order Basket ({}) ===", if live { "LIVE" } else { "DRY RUN" });
    if outcome.orders.is_empty() {
        println!("No HOT APPROACHING candidates.");
        return;
    }
    if outcome.capped > 0 {
        println!(
            "{} candidates, {} dropped by max_orders (kept closest to ceiling)",
            outcome.candidates, outcome.capped
        );
    }
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>6} {:>12} {:>10} {:<8}",
        "Symbol", "Entry", "Stop", "Target", "Qty", "Capital", "Risk", "Status"
    );
    println!("{}", "-".repeat(86));
    for o in &outcome.orders {
        print_order_row(o);
    }
    println!("{}", "-".repeat(86));
    println!(
        "Total capital {:.2}, risk {:.2}, reward {:.2}",
        outcome.total_capital(),
        outcome.total_risk(),
        outcome.total_reward()
    );
    if live {
        println!(
            "Placed {}, failed {}. Stop losses are not sent to the broker; place them manually.",
            outcome.count(OrderStatus::Placed),
            outcome.count(OrderStatus::Error)
        );
    }
}

fn print_order_row(o: &Order) {
    println!(
        "{:<12} {:>10.2} {:>10.2} {:>10.2} {:>6} {:>12.2} {:>10.2} {:<8}",
        o.symbol,
        o.entry_price,
        o.stop_loss,
        o.target,
        o.quantity,
        o.capital,
        o.risk_amount,
        o.status.to_string()
    );
    if let Some(id) = &o.order_id {
        println!("  order id {id}");
    }
    if let Some(err) = &o.error {
        println!("  error: {err}");
    }
}

fn run_place(config: &DarvasConfig, symbol: &str, qty: u64, live: bool) -> Result<()> {
    let (scan_path, results) = load_latest_market_scan(&config.scan.output_dir)?;
    println!("Using scan {}", scan_path.display());

    let sink;
    let submission = if live {
        sink = live_sink(config)?;
        Submission::Live(&sink)
    } else {
        Submission::DryRun
    };

    let now = local_now();
    let order = place_single(&results, symbol, qty, &config.orders, submission, now)?;
    println!();
    print_order_row(&order);
    println!(
        "Reward/risk {:.2}. Stop loss {:.2} is not sent to the broker; place it manually.",
        order.reward_risk_ratio, order.stop_loss
    );

    let orders = [order];
    if let Some(path) = save_order_log(&orders, submission.audit_tag(true), &config.scan.output_dir, now)? {
        println!("Order log:      {}", path.display());
    }
    if orders[0].status == OrderStatus::Error {
        bail!("order for {} failed", orders[0].symbol);
    }
    Ok(())
}

// ─── watchlist / alerts / download ──────────────────────────────────

fn run_watchlist(config: &DarvasConfig) -> Result<()> {
    let store = WatchlistStore::new(&config.watchlist.path);
    let (watchlist, load) = store.load();
    if let Some(backup) = &load.backup {
        println!("WARNING: corrupt watchlist backed up to {}", backup.display());
    }
    if watchlist.is_empty() {
        println!("Watchlist is empty: {}", store.path().display());
        return Ok(());
    }

    println!("Watchlist: {} ({} entries)", store.path().display(), watchlist.len());
    println!();
    println!(
        "{:<12} {:<15} {:<15} {:>10} {:>10} {:>10} {:<10} {:<10}",
        "Symbol", "Status", "Prev", "Ceiling", "Floor", "Stop", "Added", "Updated"
    );
    println!("{}", "-".repeat(98));
    for entry in watchlist.entries() {
        let row = entry.to_row();
        let status = match entry {
            WatchlistEntry::Scanner(_) => row.status.clone(),
            WatchlistEntry::External(_) => format!("{} *", row.status),
        };
        println!(
            "{:<12} {:<15} {:<15} {:>10} {:>10} {:>10} {:<10} {:<10}",
            row.symbol,
            status,
            row.prev_status,
            row.box_ceiling,
            row.box_floor,
            row.stop_loss,
            row.date_added,
            row.date_updated
        );
    }
    println!();
    println!("* managed outside the scanner, never modified");
    Ok(())
}

fn run_alerts(config: &DarvasConfig, json: bool) -> Result<()> {
    let files = latest_scan_files(&config.scan.output_dir, 2)?;
    let [latest_path, previous_path] = files.as_slice() else {
        bail!(
            "need two scans in {} to compare; run `darvas scan` again",
            config.scan.output_dir.display()
        );
    };
    let latest = read_scan_csv(latest_path)?;
    let previous = read_scan_csv(previous_path)?;

    let alerts = compute_movements(&latest, &previous);
    if json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }
    println!(
        "Comparing {} with {}",
        file_label(latest_path),
        file_label(previous_path)
    );
    if alerts.is_empty() {
        println!("No movements.");
        return Ok(());
    }
    println!();
    for a in &alerts {
        println!("{:<10} {:<12} {}", a.kind.to_string(), a.symbol, a.detail);
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run_download(config: &DarvasConfig, universe: &Universe, force: bool) -> Result<()> {
    if config.scan.offline {
        bail!("download needs network access; [scan].offline is set");
    }
    let provider = network_provider(&config.scan)?;
    let provider_ref: Option<&dyn DataProvider> = provider.as_ref().map(|p| p as &dyn DataProvider);
    let store = darvas_core::data::CsvBarStore::new(&config.scan.data_dir);
    let opts = LoadOptions {
        force,
        ..LoadOptions::trailing(local_now().date(), config.scan.history_days)
    };

    let symbols = universe.all_tickers();
    let batch = load_bars(&symbols, &store, provider_ref, Some(&StdoutProgress), &opts);

    if !batch.failed.is_empty() {
        for (sym, err) in &batch.failed {
            eprintln!("Error for {sym}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}
