use std::fs::{self, File, OpenOptions};
use std::io::Write;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::telemetry::telegram::TelegramClient;
use crate::types::*;

/// Simple CSV writer that buffers writes.
struct CsvWriter {
    file: File,
}

impl CsvWriter {
    fn new(path: &str, header: &str) -> Option<Self> {
        let mut file = match File::create(path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("[TELEM] Cannot create {}: {}", path, e);
                return None;
            }
        };
        writeln!(file, "{}", header).ok();
        Some(Self { file })
    }

    fn flush(&mut self) {
        self.file.flush().ok();
    }
}

macro_rules! csv_row {
    ($writer:expr, $($arg:tt)*) => {
        if let Some(w) = $writer.as_mut() {
            writeln!(w.file, $($arg)*).ok();
        }
    };
}

/// Full parameter echo for `session_info.txt`, so a session's results can
/// be reproduced from its log directory alone.
fn session_info(config: &Config, s: &SessionStartRecord) -> String {
    use std::fmt::Write as _;
    let mut out = String::new();
    let mut line = |k: &str, v: String| {
        let _ = writeln!(out, "{}={}", k, v);
    };

    line("session_id", s.session_id.clone());
    line("start_ts_ms", s.ts_ms.to_string());
    line("symbol", config.symbol.clone());
    line("profile", config.profile.label().to_string());
    line("dry_run", config.dry_run.to_string());
    line("starting_equity", config.starting_equity.to_string());

    line("price_tick", config.price_tick.to_string());
    line("qty_step", config.qty_step.to_string());
    line("min_qty", config.min_qty.to_string());

    line("grid_levels", config.grid_levels.to_string());
    line("min_grid_levels", config.min_grid_levels.to_string());
    line("max_grid_levels", config.max_grid_levels.to_string());
    line("order_qty", config.effective_qty().to_string());
    line("grid_offset", config.grid_offset.to_string());
    line("grid_profit_pct", config.grid_profit_pct.to_string());
    line("recenter_drift", config.recenter_drift.to_string());
    line("recenter_interval_secs", config.recenter_interval_secs.to_string());
    line("order_validation_distance", config.order_validation_distance.to_string());
    line("volatility_adapt", config.volatility_adapt.to_string());
    line("dynamic_grid", config.dynamic_grid.to_string());

    line("breakout_threshold", config.breakout_threshold.to_string());
    line("trailing_stop_threshold", config.trailing_stop_threshold.to_string());
    line("max_drawdown", config.max_drawdown.to_string());
    line("max_long_notional", config.max_long_notional.to_string());
    line("max_short_notional", config.max_short_notional.to_string());
    line("max_total_notional", config.max_total_notional.to_string());
    line("margin_safety_threshold", config.margin_safety_threshold.to_string());
    line("stop_loss_pct", config.stop_loss_pct.to_string());
    line("max_position_multiplier", config.max_position_multiplier.to_string());
    line("asymmetric_profit_factor", config.asymmetric_profit_factor.to_string());
    line("auto_resume", config.auto_resume.to_string());
    line("resume_cooldown_mins", config.resume_cooldown_mins.to_string());
    line("resume_tolerance", config.resume_tolerance.to_string());
    line("consider_funding_rate", config.consider_funding_rate.to_string());

    line("enable_breakout_stop", config.enable_breakout_stop.to_string());
    line("enable_exposure_limits", config.enable_exposure_limits.to_string());
    line("enable_margin_monitoring", config.enable_margin_monitoring.to_string());
    line("enable_trailing_stop", config.enable_trailing_stop.to_string());
    line("enable_max_drawdown", config.enable_max_drawdown.to_string());

    out
}

/// Single background task that handles ALL telemetry:
/// grid CSV, orders CSV, fills CSV, trades CSV, risk CSV, equity CSV,
/// AND Telegram alerts. Consolidates all I/O into one task that never
/// touches the hot path.
pub async fn telemetry_writer(
    mut rx: mpsc::Receiver<TelemetryEvent>,
    config: Config,
    session_id: String,
) {
    let dir = format!("logs/{}/{}", config.profile.label(), session_id);
    fs::create_dir_all(&dir).ok();

    let mut grid_csv = CsvWriter::new(
        &format!("{}/grid.csv", dir),
        "ts_ms,mid,lower,upper,levels,orders_placed,atr_multiplier,reason",
    );
    let mut orders_csv = CsvWriter::new(
        &format!("{}/orders.csv", dir),
        "ts_ms,order_id,side,purpose,price,qty,reduce_only",
    );
    let mut fills_csv = CsvWriter::new(
        &format!("{}/fills.csv", dir),
        "ts_ms,order_id,purpose,side,status,filled_price,filled_qty,submit_to_ack_ms",
    );
    let mut trades_csv = CsvWriter::new(
        &format!("{}/trades.csv", dir),
        "ts_ms,exit_kind,entry_price,exit_price,qty,pnl,session_pnl",
    );
    let mut risk_csv = CsvWriter::new(
        &format!("{}/risk.csv", dir),
        "ts_ms,trigger,mid,long_notional,short_notional,margin_balance",
    );
    let mut equity_csv = CsvWriter::new(
        &format!("{}/equity.csv", dir),
        "ts_ms,wallet_balance,margin_balance,maint_margin,unrealized_pnl",
    );

    let tg = match (&config.tg_bot_token, &config.tg_chat_id) {
        (Some(token), Some(chat)) => {
            eprintln!("[TELEM] Telegram alerts enabled");
            Some(TelegramClient::new(token, chat, &config.symbol))
        }
        _ => {
            eprintln!("[TELEM] Telegram not configured, skipping alerts");
            None
        }
    };

    while let Some(event) = rx.recv().await {
        match event {
            TelemetryEvent::GridCentered(g) => {
                csv_row!(
                    grid_csv,
                    "{},{:.4},{:.4},{:.4},{},{},{:.3},{}",
                    g.ts_ms, g.mid, g.lower, g.upper, g.levels,
                    g.orders_placed, g.atr_multiplier, g.reason,
                );
            }

            TelemetryEvent::OrderSent(o) => {
                csv_row!(
                    orders_csv,
                    "{},{},{},{},{:.4},{},{}",
                    o.ts_ms, o.order_id, o.side, o.purpose, o.price, o.qty,
                    if o.reduce_only { 1 } else { 0 },
                );
            }

            TelemetryEvent::OrderResult(f) => {
                csv_row!(
                    fills_csv,
                    "{},{},{},{},{},{},{},{:.3}",
                    f.ts_ms, f.order_id, f.purpose, f.side, f.status,
                    f.filled_price.map_or("".to_string(), |p| format!("{:.4}", p)),
                    f.filled_qty.map_or("".to_string(), |q| format!("{}", q)),
                    f.submit_to_ack_ms,
                );
            }

            TelemetryEvent::TradeClosed(t) => {
                csv_row!(
                    trades_csv,
                    "{},{},{:.4},{:.4},{},{:.4},{:.4}",
                    t.ts_ms, t.exit_kind, t.entry_price, t.exit_price, t.qty,
                    t.pnl, t.session_pnl,
                );
                if let Some(tg) = &tg {
                    tg.send_trade_alert(&t).await;
                }
            }

            TelemetryEvent::Risk(r) => {
                csv_row!(
                    risk_csv,
                    "{},{},{:.4},{:.2},{:.2},{:.2}",
                    r.ts_ms, r.trigger, r.mid, r.long_notional, r.short_notional,
                    r.margin_balance,
                );
                if let Some(tg) = &tg {
                    tg.send_risk_alert(&r).await;
                }
            }

            TelemetryEvent::Equity(e) => {
                csv_row!(
                    equity_csv,
                    "{},{:.4},{:.4},{:.4},{:.4}",
                    e.ts_ms, e.wallet_balance, e.margin_balance, e.maint_margin,
                    e.unrealized_pnl,
                );
            }

            TelemetryEvent::SessionStart(s) => {
                eprintln!(
                    "[TELEM] Session started: {} on {} [{}]",
                    s.session_id, s.symbol, s.profile,
                );
                let info_path = format!("{}/session_info.txt", dir);
                if let Ok(mut f) = File::create(&info_path) {
                    f.write_all(session_info(&config, &s).as_bytes()).ok();
                }
                if let Some(tg) = &tg {
                    tg.send_session_start(&s).await;
                }
            }

            TelemetryEvent::SessionEnd(s) => {
                eprintln!(
                    "[TELEM] Session ended: {} trades={} pnl=${:.2}",
                    s.session_id, s.total_trades, s.total_pnl,
                );
                let info_path = format!("{}/session_info.txt", dir);
                if let Ok(mut f) = OpenOptions::new().append(true).open(&info_path) {
                    writeln!(f, "end_ts_ms={}", s.ts_ms).ok();
                    writeln!(f, "total_trades={}", s.total_trades).ok();
                    writeln!(f, "winning_trades={}", s.winning_trades).ok();
                    writeln!(f, "win_rate={:.4}", s.win_rate).ok();
                    writeln!(f, "total_pnl={:.4}", s.total_pnl).ok();
                    writeln!(f, "pauses={}", s.pauses).ok();
                    writeln!(f, "recenters={}", s.recenters).ok();
                }
                if let Some(tg) = &tg {
                    tg.send_session_summary(&s).await;
                }
            }
        }
    }

    // Flush on shutdown
    for w in [
        &mut grid_csv,
        &mut orders_csv,
        &mut fills_csv,
        &mut trades_csv,
        &mut risk_csv,
        &mut equity_csv,
    ] {
        if let Some(w) = w.as_mut() {
            w.flush();
        }
    }
    eprintln!("[TELEM] Writer stopped, files flushed");
}
