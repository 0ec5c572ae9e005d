use std::path::PathBuf;

use tokio::sync::mpsc;

use auxobot::config::Config;
use auxobot::engine::runner::Replay;
use auxobot::feeds::history;
use auxobot::types::*;

/// Replay historical 1m bars through the live engine and report how the
/// grid would have traded.
///
/// Usage: backtest <bars.csv>
/// All grid/risk parameters come from the environment, same as the bot.
/// The replay itself is synchronous; no runtime is needed.
fn main() {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let path: PathBuf = match std::env::args().nth(1) {
        Some(p) => p.into(),
        None => {
            eprintln!("Usage: backtest <bars.csv>");
            std::process::exit(1);
        }
    };

    let bars = match history::load_bars(&path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("[BT] Failed to load bars: {}", e);
            std::process::exit(1);
        }
    };

    let span_mins = (bars.last().unwrap().close_ts_ms - bars[0].close_ts_ms) / 60_000;
    eprintln!(
        "[BT] {} bars ({} to {}, ~{}h) on {} [{}]",
        bars.len(),
        bars[0].close_ts_ms,
        bars.last().unwrap().close_ts_ms,
        span_mins / 60,
        config.symbol,
        config.profile.label(),
    );

    let starting_equity = config.starting_equity;

    // The replay engine runs in dry-run mode: nothing reaches the gateway,
    // telemetry is drained locally instead of hitting disk.
    let (gw_tx, _gw_rx) = mpsc::channel::<GatewayCommand>(64);
    let (telem_tx, mut telem_rx) = mpsc::channel::<TelemetryEvent>(4096);

    let mut replay = Replay::new(config, gw_tx, telem_tx);

    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut equity_curve: Vec<f64> = Vec::new();

    for bar in &bars {
        replay.on_bar(bar);
        while let Ok(event) = telem_rx.try_recv() {
            match event {
                TelemetryEvent::TradeClosed(t) => trades.push(t),
                TelemetryEvent::Equity(e) => equity_curve.push(e.margin_balance),
                _ => {}
            }
        }
    }

    let summary = replay.finish(format!("backtest-{}", bars[0].close_ts_ms));
    while let Ok(event) = telem_rx.try_recv() {
        if let TelemetryEvent::TradeClosed(t) = event {
            trades.push(t);
        }
    }

    print_report(starting_equity, &summary, &trades, &equity_curve);
}

fn print_report(
    starting_equity: f64,
    summary: &SessionEndRecord,
    trades: &[TradeRecord],
    equity_curve: &[f64],
) {
    let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
    let losses: Vec<f64> = trades.iter().filter(|t| t.pnl <= 0.0).map(|t| t.pnl).collect();

    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().sum::<f64>().abs();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    let expectancy = if trades.is_empty() {
        0.0
    } else {
        summary.total_pnl / trades.len() as f64
    };
    let avg = |v: &[f64]| if v.is_empty() { 0.0 } else { v.iter().sum::<f64>() / v.len() as f64 };
    let extreme = |v: &[f64], max: bool| {
        v.iter().copied().fold(
            if max { f64::MIN } else { f64::MAX },
            if max { f64::max } else { f64::min },
        )
    };

    // Peak-to-trough on the equity curve
    let mut peak = starting_equity;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }

    let ending = starting_equity + summary.total_pnl;

    println!("═══════════════════ BACKTEST REPORT ═══════════════════");
    println!("Starting balance:   ${:.2}", starting_equity);
    println!("Ending balance:     ${:.2}", ending);
    println!(
        "Total PnL:          ${:.2} ({:+.2}%)",
        summary.total_pnl,
        summary.total_pnl / starting_equity * 100.0,
    );
    println!("Total trades:       {}", summary.total_trades);
    println!(
        "Win rate:           {:.1}% ({}/{})",
        summary.win_rate * 100.0,
        summary.winning_trades,
        summary.total_trades,
    );
    println!("Profit factor:      {:.2}", profit_factor);
    println!("Expectancy:         ${:.2} per trade", expectancy);
    if !wins.is_empty() {
        println!(
            "Avg win / max win:  ${:.2} / ${:.2}",
            avg(&wins),
            extreme(&wins, true),
        );
    }
    if !losses.is_empty() {
        println!(
            "Avg loss / max loss: ${:.2} / ${:.2}",
            avg(&losses),
            extreme(&losses, false),
        );
    }
    println!("Max drawdown:       {:.1}%", max_dd * 100.0);
    println!("Risk pauses:        {}", summary.pauses);
    println!("Recenters:          {}", summary.recenters);
    println!("════════════════════════════════════════════════════════");
}
