use tokio::sync::mpsc;

use auxobot::config::Config;
use auxobot::engine::runner::run_engine;
use auxobot::feeds::binance::binance_feed;
use auxobot::gateway::order::order_gateway;
use auxobot::telemetry::writer::telemetry_writer;
use auxobot::types::*;

#[tokio::main]
async fn main() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let session_id = format!(
        "{}-{:x}",
        config.symbol.to_lowercase(),
        chrono::Utc::now().timestamp_millis(),
    );

    eprintln!("╔══════════════════════════════════════════════════╗");
    eprintln!("║  Auxobot Grid Trading System");
    eprintln!("║  {} [{}] | Dry run: {}", config.symbol, config.profile.label(), config.dry_run);
    eprintln!("║  Levels: {} ({}..{}) | Qty: {} | Band: ±{:.1}%",
        config.grid_levels, config.min_grid_levels, config.max_grid_levels,
        config.effective_qty(), config.grid_offset * 50.0);
    eprintln!("║  TP: {:.2}% | SL: {:.2}% | Breakout: {:.0}% | DD: {:.0}%",
        config.grid_profit_pct, config.stop_loss_pct,
        config.breakout_threshold * 100.0, config.max_drawdown * 100.0);
    eprintln!("║  Session: {}", session_id);
    eprintln!("╚══════════════════════════════════════════════════╝");

    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(4096);
    let (gw_tx, gw_rx) = mpsc::channel::<GatewayCommand>(256);
    let (telem_tx, telem_rx) = mpsc::channel::<TelemetryEvent>(4096);

    // ── Market data feed ──
    let bn_feed_tx = feed_tx.clone();
    let stream_url = config.stream_url();
    let bn_handle = tokio::spawn(async move {
        binance_feed(bn_feed_tx, stream_url).await;
    });

    // ── Order gateway ──
    let gw_feed_tx = feed_tx.clone();
    let gw_config = config.clone();
    let gw_session = session_id.clone();
    let gw_handle = tokio::spawn(async move {
        order_gateway(gw_rx, gw_feed_tx, gw_config, gw_session).await;
    });

    // ── Telemetry writer ──
    let telem_config = config.clone();
    let telem_session = session_id.clone();
    let telem_handle = tokio::spawn(async move {
        telemetry_writer(telem_rx, telem_config, telem_session).await;
    });

    // ── Heartbeat (1s tick events) ──
    let tick_tx = feed_tx.clone();
    let tick_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
        loop {
            interval.tick().await;
            if tick_tx.send(FeedEvent::Tick).await.is_err() {
                break;
            }
        }
    });

    // ── Ctrl-C → graceful shutdown through the feed channel ──
    let shutdown_tx = feed_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[MAIN] Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(FeedEvent::Shutdown).await;
        }
    });

    let _ = telem_tx.try_send(TelemetryEvent::SessionStart(SessionStartRecord {
        ts_ms: chrono::Utc::now().timestamp_millis(),
        session_id: session_id.clone(),
        symbol: config.symbol.clone(),
        profile: config.profile.label(),
        grid_levels: config.grid_levels,
        order_qty: config.effective_qty(),
        grid_offset: config.grid_offset,
    }));

    // Drop our copy of feed_tx so the engine's receiver closes when all
    // producers stop
    drop(feed_tx);

    // ── Core engine (blocks until shutdown) ──
    let summary = run_engine(config, session_id, feed_rx, gw_tx, telem_tx).await;

    // Let telemetry flush
    tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
    bn_handle.abort();
    tick_handle.abort();
    gw_handle.abort();
    telem_handle.abort();

    eprintln!(
        "[MAIN] Done. {} trades, ${:.2} pnl.",
        summary.total_trades, summary.total_pnl,
    );
}
