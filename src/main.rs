//! Whale-flow paper trading bot for Polymarket prediction markets

use clap::{Parser, Subcommand};
use polyflow_bot::{
    client::GammaClient,
    config::Config,
    detector::SignalAggregator,
    gate::{AdvisoryClient, TradeGate},
    ledger::{CloseResult, PositionLedger},
    monitor::Monitor,
    perf::{self, history::OutcomeChecker, Severity},
    storage::{Database, NewPosition},
    types::Side,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "polyflow-bot")]
#[command(about = "Whale-flow signal detection and paper trading for Polymarket")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor loop (detect, gate, mark-to-market, exits)
    Run,
    /// Run one detection + aggregation pass and print the ranked signals
    Scan,
    /// Run one gate pass over the stored snapshot
    Trade,
    /// Position ledger operations
    Positions {
        #[command(subcommand)]
        command: PositionsCommand,
    },
    /// Performance and signal-accuracy report
    Report,
}

#[derive(Subcommand)]
enum PositionsCommand {
    /// Open a paper position manually
    Open {
        market_slug: String,
        question: String,
        outcome: String,
        /// BUY or SELL
        direction: String,
        price: String,
        #[arg(default_value = "70")]
        confidence: u32,
    },
    /// Close a position at the given exit price
    Close { position_id: i64, exit_price: String },
    /// Mark all open positions to market
    Update,
    /// Aggregate performance summary
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run => run_monitor(config).await,
        Commands::Scan => run_scan(config).await,
        Commands::Trade => run_trade(config).await,
        Commands::Positions { command } => run_positions(config, command).await,
        Commands::Report => run_report(config).await,
    }
}

async fn run_monitor(config: Config) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;
    let gamma = GammaClient::new(&config.client)?;
    let advisor = AdvisoryClient::new(&config.advisory);

    let gate = TradeGate::new(db.clone(), gamma.clone(), advisor, config.gate.clone());
    let ledger = PositionLedger::new(db.clone());
    let outcome_checker = OutcomeChecker::new(db.clone(), gamma);

    let monitor = Monitor::new(
        db,
        SignalAggregator::new(),
        gate,
        ledger,
        outcome_checker,
        config.detector.clone(),
        config.monitor.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    monitor.run(shutdown_rx).await?;
    Ok(())
}

async fn run_scan(config: Config) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;
    let snapshot = SignalAggregator::new()
        .aggregate(&db, &config.detector)
        .await?;

    println!("Signals detected:");
    println!("  whale clusters:         {}", snapshot.whale_clusters.len());
    println!("  smart money divergence: {}", snapshot.divergences.len());
    println!("  momentum reversals:     {}", snapshot.reversals.len());
    println!();

    if snapshot.top_signals.is_empty() {
        println!("No high-confidence signals detected");
        return Ok(());
    }

    println!("Top signals:");
    for (i, sig) in snapshot.top_signals.iter().enumerate() {
        println!(
            "  #{} [{}%] {} - {} {} @ {:.2}",
            i + 1,
            sig.confidence,
            sig.kind,
            sig.direction,
            sig.outcome,
            sig.price
        );
        println!("     {}", sig.market_question);
    }
    Ok(())
}

async fn run_trade(config: Config) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;
    let gamma = GammaClient::new(&config.client)?;
    let advisor = AdvisoryClient::new(&config.advisory);
    let gate = TradeGate::new(db.clone(), gamma, advisor, config.gate.clone());

    let Some(snapshot) = db.load_snapshot().await? else {
        println!("No aggregated snapshot found - run `scan` first");
        return Ok(());
    };

    let summary = gate.process_snapshot(&snapshot).await;
    println!(
        "Gate pass: {} processed, {} stored, {} opened, {} rejected, {} failed",
        summary.processed, summary.stored, summary.opened, summary.rejected, summary.failed
    );
    for (slug, reason) in &summary.rejections {
        println!("  rejected {}: {}", slug, reason);
    }
    for alert in &summary.alerts {
        println!(
            "  ALERT {}% {}: {} {} @ {:.2} - {}",
            alert.confidence,
            alert.signal_type,
            alert.direction,
            alert.outcome,
            alert.price,
            alert.market_question
        );
    }
    Ok(())
}

async fn run_positions(config: Config, command: PositionsCommand) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;
    let ledger = PositionLedger::new(db);

    match command {
        PositionsCommand::Open {
            market_slug,
            question,
            outcome,
            direction,
            price,
            confidence,
        } => {
            let direction = Side::from_str(&direction)?;
            let price = Decimal::from_str(&price)?;

            let new = NewPosition {
                signal_id: None,
                market_slug: market_slug.clone(),
                market_question: question,
                outcome: outcome.clone(),
                direction,
                entry_price: price,
                size: config.gate.position_size,
                confidence,
                notes: serde_json::json!({"reasoning": "manual open"}),
            };

            match ledger.open(&new).await? {
                Some(id) => println!("Opened position #{}: {} {} @ {}", id, direction, outcome, price),
                None => println!("Rejected: open position already exists for {} / {}", market_slug, outcome),
            }
        }
        PositionsCommand::Close {
            position_id,
            exit_price,
        } => {
            let exit_price = Decimal::from_str(&exit_price)?;
            match ledger.close(position_id, exit_price, "manual").await? {
                CloseResult::Closed { pnl, roi } => {
                    println!(
                        "Closed position #{}: P&L ${:.2} ({:.1}%)",
                        position_id,
                        pnl,
                        roi * dec!(100)
                    );
                }
                CloseResult::NotFound => println!("Position not found (or already closed)"),
            }
        }
        PositionsCommand::Update => {
            let summary = ledger.mark_to_market().await?;
            println!(
                "Updated {} position(s), {} missing price",
                summary.updated, summary.missing_price
            );
        }
        PositionsCommand::Stats => {
            let stats = ledger.stats().await?;
            println!("Paper trading performance:");
            println!("  total trades:    {}", stats.portfolio.total_trades);
            if let Some(win_rate) = stats.win_rate {
                println!("  win rate:        {:.1}%", win_rate * dec!(100));
            }
            println!("  realized P&L:    ${:.2}", stats.portfolio.total_pnl);
            println!("  unrealized P&L:  ${:.2}", stats.total_unrealized_pnl);
            println!(
                "  combined P&L:    ${:.2}",
                stats.portfolio.total_pnl + stats.total_unrealized_pnl
            );
            println!("  open positions:  {}", stats.open_positions);
        }
    }
    Ok(())
}

async fn run_report(config: Config) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;

    let report = perf::analyze_performance(&db).await?;

    println!("Trading signal analysis");
    println!("=======================");
    if report.total_closed == 0 {
        println!("No closed positions yet - insufficient data for analysis");
    } else {
        println!("{} closed position(s)", report.total_closed);
        println!();
        println!("By signal type:");
        for t in &report.by_signal_type {
            println!(
                "  {}: {} trades, {:.1}% win rate, ${:.2} total P&L (avg ${:.2}, avg conf {:.0}%)",
                t.signal_type,
                t.trades,
                t.win_rate * 100.0,
                t.total_pnl,
                t.avg_pnl,
                t.avg_confidence
            );
        }
        println!();
        println!("By confidence:");
        for b in &report.by_confidence {
            println!(
                "  {}: {} trades, {:.1}% win rate, ${:.2} avg P&L",
                b.bucket,
                b.trades,
                b.win_rate * 100.0,
                b.avg_pnl
            );
        }
        if !report.recommendations.is_empty() {
            println!();
            println!("Recommendations:");
            for rec in &report.recommendations {
                let tag = match rec.severity {
                    Severity::Error => "ERROR",
                    Severity::Warning => "WARN",
                    Severity::Success => "OK",
                };
                println!("  [{}] {}", tag, rec.issue);
                println!("        {}", rec.detail);
                println!("        -> {}", rec.action);
            }
        }
    }

    // Signal accuracy from the history ledger
    let resolved = db.resolved_history().await?;
    let accuracy = perf::history::accuracy_report(&resolved);
    println!();
    println!("Signal accuracy (resolved history)");
    println!("==================================");
    if accuracy.total == 0 {
        println!("No resolved signals yet");
    } else {
        println!(
            "{}/{} correct ({:.1}%)",
            accuracy.correct,
            accuracy.total,
            accuracy.correct as f64 / accuracy.total as f64 * 100.0
        );
        if let Some(edge) = accuracy.avg_edge {
            println!("average edge: {:+.3}", edge);
        }
        for line in &accuracy.by_type {
            println!(
                "  {}: {}/{} ({:.1}%), edge {:+.3}",
                line.label,
                line.correct,
                line.total,
                line.accuracy * 100.0,
                line.avg_edge
            );
        }
        for line in &accuracy.by_bucket {
            println!(
                "  {}: {}/{} ({:.1}%)",
                line.label,
                line.correct,
                line.total,
                line.accuracy * 100.0
            );
        }
    }

    Ok(())
}
