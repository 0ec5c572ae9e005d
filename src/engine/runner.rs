use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::risk::{RiskMonitor, RiskVerdict, MARGIN_CHECK_INTERVAL_MS};
use crate::engine::sim;
use crate::engine::state::{ActiveBracket, GridState, RestingOrder};
use crate::grid::bracket::{self, TrendBias};
use crate::grid::geometry::{self, GridBand};
use crate::types::*;

/// Funding above this magnitude gets surfaced in the log.
const FUNDING_WARN_THRESHOLD: f64 = 0.0005;

/// Core engine event loop. Single task, owns all state.
/// No shared mutable state — race conditions impossible by construction.
pub async fn run_engine(
    config: Config,
    session_id: String,
    mut feed_rx: mpsc::Receiver<FeedEvent>,
    gw_tx: mpsc::Sender<GatewayCommand>,
    telem_tx: mpsc::Sender<TelemetryEvent>,
) -> SessionEndRecord {
    let mut engine = Engine::new(config, gw_tx, telem_tx);

    eprintln!(
        "[ENGINE] {} on {} | levels={} qty={} offset={:.1}% {}",
        engine.config.profile.label(),
        engine.config.symbol,
        engine.config.grid_levels,
        engine.config.effective_qty(),
        engine.config.grid_offset * 100.0,
        if engine.config.dry_run { "(dry run)" } else { "(submitting)" },
    );

    while let Some(event) = feed_rx.recv().await {
        let now_ms = chrono::Utc::now().timestamp_millis();

        match event {
            FeedEvent::Book(bt) => {
                engine.on_price(bt.mid(), now_ms);
            }

            FeedEvent::Trade(t) => {
                // Book ticker is the primary price source; trades only
                // drive the engine before the first book update arrives.
                if engine.state.mid.is_none() {
                    engine.on_price(t.price, now_ms);
                }
            }

            FeedEvent::Bar(bar) => {
                if bar.closed {
                    engine.state.on_closed_bar(&bar, &engine.config);
                }
            }

            FeedEvent::MarkPrice(m) => {
                engine.on_mark_price(m);
            }

            FeedEvent::Account(snap) => {
                engine.state.on_account(snap);
                engine.emit_equity(now_ms);
            }

            FeedEvent::OrderUpdate(update) => {
                engine.on_order_update(update, now_ms);
            }

            FeedEvent::Tick => {
                engine.on_tick(now_ms);
            }

            FeedEvent::Shutdown => {
                eprintln!("[ENGINE] Shutdown requested, unwinding");
                break;
            }
        }
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    engine.unwind(now_ms);

    let record = SessionEndRecord {
        ts_ms: now_ms,
        session_id,
        total_trades: engine.state.perf.total_trades,
        winning_trades: engine.state.perf.winning_trades,
        win_rate: engine.state.perf.win_rate(),
        total_pnl: engine.state.perf.total_pnl,
        pauses: engine.state.pauses,
        recenters: engine.state.recenters,
    };

    eprintln!(
        "[ENGINE] Session over | trades={} wins={} win_rate={:.0}% pnl=${:.2} pauses={} recenters={}",
        record.total_trades,
        record.winning_trades,
        record.win_rate * 100.0,
        record.total_pnl,
        record.pauses,
        record.recenters,
    );

    let _ = engine.telem_tx.try_send(TelemetryEvent::SessionEnd(SessionEndRecord {
        ts_ms: record.ts_ms,
        session_id: record.session_id.clone(),
        total_trades: record.total_trades,
        winning_trades: record.winning_trades,
        win_rate: record.win_rate,
        total_pnl: record.total_pnl,
        pauses: record.pauses,
        recenters: record.recenters,
    }));

    record
}

/// Synchronous driver over historical bars, reusing the exact same engine
/// the live loop runs. Time comes from bar timestamps, fills from bar
/// ranges, so risk intervals and cooldowns behave as they would live.
pub struct Replay {
    engine: Engine,
}

impl Replay {
    pub fn new(
        mut config: Config,
        gw_tx: mpsc::Sender<GatewayCommand>,
        telem_tx: mpsc::Sender<TelemetryEvent>,
    ) -> Self {
        config.dry_run = true;
        Self {
            engine: Engine::new(config, gw_tx, telem_tx),
        }
    }

    /// Feed one closed bar. The intrabar path is approximated by walking
    /// open, the adverse extreme, the favorable extreme, then close.
    pub fn on_bar(&mut self, bar: &Bar) {
        let now_ms = bar.close_ts_ms;
        self.engine.state.on_closed_bar(bar, &self.engine.config);

        let path = if bar.close >= bar.open {
            [bar.open, bar.low, bar.high, bar.close]
        } else {
            [bar.open, bar.high, bar.low, bar.close]
        };
        for price in path {
            self.engine.on_price(price, now_ms);
        }
        self.engine.on_tick(now_ms);
    }

    /// Flatten, cancel, and summarize.
    pub fn finish(mut self, session_id: String) -> SessionEndRecord {
        let now_ms = self
            .engine
            .state
            .account
            .map(|a| a.ts_ms)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        self.engine.unwind(now_ms);
        SessionEndRecord {
            ts_ms: now_ms,
            session_id,
            total_trades: self.engine.state.perf.total_trades,
            winning_trades: self.engine.state.perf.winning_trades,
            win_rate: self.engine.state.perf.win_rate(),
            total_pnl: self.engine.state.perf.total_pnl,
            pauses: self.engine.state.pauses,
            recenters: self.engine.state.recenters,
        }
    }
}

struct Engine {
    config: Config,
    state: GridState,
    monitor: RiskMonitor,
    gw_tx: mpsc::Sender<GatewayCommand>,
    telem_tx: mpsc::Sender<TelemetryEvent>,
    next_order_id: u64,
    trim_order_id: Option<u64>,
    // Canceled live orders kept until the exchange confirms; one of them
    // may come back FILLED instead.
    awaiting_cancel: HashMap<u64, RestingOrder>,
    ticks: u64,
}

impl Engine {
    fn new(
        config: Config,
        gw_tx: mpsc::Sender<GatewayCommand>,
        telem_tx: mpsc::Sender<TelemetryEvent>,
    ) -> Self {
        let state = GridState::new(&config);
        let monitor = RiskMonitor::new(&config);
        Self {
            config,
            state,
            monitor,
            gw_tx,
            telem_tx,
            next_order_id: 1,
            trim_order_id: None,
            awaiting_cancel: HashMap::new(),
            ticks: 0,
        }
    }

    // ── price path ──

    fn on_price(&mut self, mid: f64, now_ms: i64) {
        if mid <= 0.0 {
            return;
        }
        self.state.on_mid(mid);

        // First price seeds the grid
        if self.state.band.is_none() && !self.state.paused_due_to_risk {
            self.center_grid(mid, now_ms, "start");
            return;
        }

        if self.config.dry_run {
            self.simulate_fills(mid, mid, now_ms);
        }

        match self.monitor.evaluate(&self.state, mid, now_ms) {
            RiskVerdict::Hold => {}
            RiskVerdict::Resume => {
                eprintln!("[RISK] Resuming: price back near original band");
                self.center_grid(mid, now_ms, "resume");
            }
            RiskVerdict::Pause(reason) => {
                self.flatten_and_pause(&reason, mid, now_ms);
                return;
            }
            RiskVerdict::Recenter(reason) => {
                eprintln!(
                    "[GRID] Recentering on drift: mid={:.4} center={:.4}",
                    mid,
                    self.state.band.map(|b| b.mid).unwrap_or(0.0),
                );
                self.cancel_grid_orders(now_ms);
                self.center_grid(mid, now_ms, reason);
            }
        }

        // Oversized position gets trimmed back under the ceiling
        if self.trim_order_id.is_none() {
            if let Some(excess) = self.monitor.position_excess(&self.state) {
                let qty = geometry::round_to_step(excess, self.config.qty_step);
                if qty > 0.0 {
                    let side = if self.state.position.qty > 0.0 {
                        Side::Sell
                    } else {
                        Side::Buy
                    };
                    eprintln!("[RISK] Trimming oversized position by {} {}", qty, side);
                    let id = self.place(side, qty, OrderKind::Market, true, OrderPurpose::Trim, now_ms);
                    self.trim_order_id = Some(id);
                    if self.config.dry_run {
                        self.fill_market_locally(id, qty, mid, now_ms);
                    }
                }
            }
        }
    }

    // ── grid management ──

    fn center_grid(&mut self, mid: f64, now_ms: i64, reason: &'static str) {
        let multiplier = if self.config.volatility_adapt {
            self.state.atr.offset_multiplier(mid)
        } else {
            1.0
        };
        let offset = self.config.grid_offset * multiplier;

        let band = match GridBand::centered(mid, offset) {
            Some(b) => b,
            None => {
                eprintln!("[GRID] Refusing to center on degenerate mid {:.4}", mid);
                return;
            }
        };

        let plans = geometry::plan_levels(
            &band,
            self.state.effective_levels,
            self.config.order_validation_distance,
            self.config.price_tick,
        );
        let qty = geometry::round_to_step(self.config.effective_qty(), self.config.qty_step);

        if self.state.band.is_some() {
            self.state.recenters += 1;
        }
        self.state.band = Some(band);
        if self.state.original_band.is_none() {
            self.state.original_band = Some(band);
        }

        let mut placed = 0u32;
        for plan in &plans {
            self.place(
                plan.side,
                qty,
                OrderKind::Limit { price: plan.price, post_only: true },
                false,
                OrderPurpose::Grid { level: plan.level },
                now_ms,
            );
            placed += 1;
        }

        self.state.grid_active = true;
        self.state.paused_due_to_risk = false;
        self.state.last_recenter_ms = now_ms;

        eprintln!(
            "[GRID] Centered at {:.4} [{:.4}, {:.4}] | {} levels, {} orders, atr_mult={:.2} ({})",
            mid, band.lower, band.upper, self.state.effective_levels, placed, multiplier, reason,
        );

        let _ = self.telem_tx.try_send(TelemetryEvent::GridCentered(GridRecord {
            ts_ms: now_ms,
            mid,
            lower: band.lower,
            upper: band.upper,
            levels: self.state.effective_levels,
            orders_placed: placed,
            atr_multiplier: multiplier,
            reason,
        }));
    }

    fn cancel_grid_orders(&mut self, now_ms: i64) {
        for id in self.state.grid_order_ids() {
            self.cancel_order(id, now_ms);
        }
        self.state.grid_active = false;
    }

    fn cancel_order(&mut self, id: u64, now_ms: i64) {
        if let Some(order) = self.state.open_orders.remove(&id) {
            if !self.config.dry_run {
                let _ = self.gw_tx.try_send(GatewayCommand::Cancel(id));
                // The exchange may have filled it first; keep the
                // context until the cancel is confirmed.
                self.awaiting_cancel.insert(id, order);
            }
            let _ = self.telem_tx.try_send(TelemetryEvent::OrderResult(FillRecord {
                ts_ms: now_ms,
                order_id: id,
                purpose: order.purpose.label(),
                side: order.side,
                status: "CANCELED".into(),
                filled_price: None,
                filled_qty: None,
                submit_to_ack_ms: 0.0,
            }));
        }
    }

    fn flatten_and_pause(&mut self, reason: &str, mid: f64, now_ms: i64) {
        if self.state.paused_due_to_risk {
            return;
        }
        eprintln!("[RISK] PAUSING: {}", reason);

        // Exposure at trigger time, before the flatten zeroes it
        let (long_n, short_n) = self.state.position.notional(mid);

        if self.config.dry_run {
            self.state.open_orders.clear();
        } else {
            for (id, order) in self.state.open_orders.drain() {
                self.awaiting_cancel.insert(id, order);
            }
            let _ = self.gw_tx.try_send(GatewayCommand::CancelAll);
        }
        self.state.bracket = None;

        if !self.state.position.is_flat() {
            let qty = self.state.position.qty.abs();
            let side = if self.state.position.qty > 0.0 {
                Side::Sell
            } else {
                Side::Buy
            };
            let id = self.place(side, qty, OrderKind::Market, true, OrderPurpose::Flatten, now_ms);
            if self.config.dry_run {
                self.fill_market_locally(id, qty, mid, now_ms);
            }
        }

        self.state.grid_active = false;
        self.state.paused_due_to_risk = true;
        self.state.last_pause_ms = now_ms;
        self.state.pauses += 1;

        let _ = self.telem_tx.try_send(TelemetryEvent::Risk(RiskRecord {
            ts_ms: now_ms,
            trigger: reason.to_string(),
            mid,
            long_notional: long_n,
            short_notional: short_n,
            margin_balance: self.state.account.map(|a| a.margin_balance).unwrap_or(0.0),
        }));
    }

    // ── order submission ──

    fn place(
        &mut self,
        side: Side,
        qty: f64,
        kind: OrderKind,
        reduce_only: bool,
        purpose: OrderPurpose,
        now_ms: i64,
    ) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;

        let price = match kind {
            OrderKind::Limit { price, .. } => price,
            OrderKind::StopMarket { trigger } => trigger,
            OrderKind::Market => self.state.mid.unwrap_or(0.0),
        };

        // Resting orders are tracked for fill simulation and cancellation
        if !matches!(kind, OrderKind::Market) {
            self.state.open_orders.insert(
                id,
                RestingOrder { side, price, qty, purpose },
            );
        }

        let _ = self.telem_tx.try_send(TelemetryEvent::OrderSent(OrderRecord {
            ts_ms: now_ms,
            order_id: id,
            side,
            purpose: purpose.label(),
            price,
            qty,
            reduce_only,
        }));

        if !self.config.dry_run {
            let _ = self.gw_tx.try_send(GatewayCommand::Place(Order {
                id,
                side,
                qty,
                kind,
                reduce_only,
                purpose,
                created_at: Instant::now(),
            }));
        }

        id
    }

    /// Dry-run market orders fill at the current mid without a gateway trip.
    fn fill_market_locally(&mut self, id: u64, qty: f64, mid: f64, now_ms: i64) {
        self.on_order_update(
            OrderUpdate {
                order_id: id,
                state: OrderState::Filled { price: mid, qty },
                latency_ms: 0.0,
            },
            now_ms,
        );
    }

    // ── fills ──

    /// Fill resting orders crossed by the [low, high] range. One at a time,
    /// re-scanning after each, because a fill mutates the book (an entry
    /// pulls the rest of the ladder and arms new exits). When one step
    /// crosses several levels the price path reaches the one nearest the
    /// market first: the highest crossed buy, the lowest crossed sell.
    fn simulate_fills(&mut self, low: f64, high: f64, now_ms: i64) {
        loop {
            let mut crossed: Option<(u64, RestingOrder)> = None;
            for (&id, o) in &self.state.open_orders {
                let hit = match o.purpose {
                    OrderPurpose::StopLoss => sim::stop_triggered(o.side, o.price, low, high),
                    _ => sim::limit_crossed(o.side, o.price, low, high),
                };
                if !hit {
                    continue;
                }
                let wins = match &crossed {
                    None => true,
                    Some((_, best)) if o.side == best.side && o.price != best.price => {
                        match o.side {
                            Side::Buy => o.price > best.price,
                            Side::Sell => o.price < best.price,
                        }
                    }
                    Some((best_id, _)) => id < *best_id,
                };
                if wins {
                    crossed = Some((id, *o));
                }
            }
            let (id, order) = match crossed {
                Some(c) => c,
                None => break,
            };
            self.on_order_update(
                OrderUpdate {
                    order_id: id,
                    state: OrderState::Filled { price: order.price, qty: order.qty },
                    latency_ms: 0.0,
                },
                now_ms,
            );
        }
    }

    fn on_order_update(&mut self, update: OrderUpdate, now_ms: i64) {
        let on_book = self.state.open_orders.remove(&update.order_id);
        // A fill can land after we asked for a cancel; the context for
        // those orders lives in awaiting_cancel until confirmation.
        let resting = on_book.or_else(|| self.awaiting_cancel.remove(&update.order_id));

        let (purpose, side) = match &resting {
            Some(o) => (o.purpose, o.side),
            None => match self.market_order_context(update.order_id) {
                Some(ctx) => ctx,
                None => {
                    // Late update for an order we stopped tracking
                    if !matches!(update.state, OrderState::Canceled) {
                        eprintln!(
                            "[ORDER] Update for unknown order #{}: {:?}",
                            update.order_id, update.state,
                        );
                    }
                    return;
                }
            },
        };

        match update.state {
            OrderState::Accepted => {
                // Still resting; put it back where it came from
                if let Some(o) = on_book {
                    self.state.open_orders.insert(update.order_id, o);
                } else if let Some(o) = resting {
                    self.awaiting_cancel.insert(update.order_id, o);
                }
            }

            OrderState::Filled { price, qty } => {
                let _ = self.telem_tx.try_send(TelemetryEvent::OrderResult(FillRecord {
                    ts_ms: now_ms,
                    order_id: update.order_id,
                    purpose: purpose.label(),
                    side,
                    status: "FILLED".into(),
                    filled_price: Some(price),
                    filled_qty: Some(qty),
                    submit_to_ack_ms: update.latency_ms,
                }));
                eprintln!(
                    "[FILL] #{} {} {} {:.4} x {} latency={:.1}ms",
                    update.order_id, purpose.label(), side, price, qty, update.latency_ms,
                );
                self.on_fill(update.order_id, purpose, side, price, qty, now_ms);
            }

            OrderState::Canceled => {}

            OrderState::Rejected(reason) => {
                eprintln!("[ORDER] #{} rejected: {}", update.order_id, reason);
                let _ = self.telem_tx.try_send(TelemetryEvent::OrderResult(FillRecord {
                    ts_ms: now_ms,
                    order_id: update.order_id,
                    purpose: purpose.label(),
                    side,
                    status: format!("REJECTED: {}", reason),
                    filled_price: None,
                    filled_qty: None,
                    submit_to_ack_ms: update.latency_ms,
                }));
            }
        }
    }

    /// Market orders are not in open_orders; recover their context from the
    /// bracket and trim bookkeeping.
    fn market_order_context(&self, order_id: u64) -> Option<(OrderPurpose, Side)> {
        if self.trim_order_id == Some(order_id) {
            let side = if self.state.position.qty > 0.0 { Side::Sell } else { Side::Buy };
            return Some((OrderPurpose::Trim, side));
        }
        // Flatten orders are placed when unwinding
        if !self.state.position.is_flat() {
            let side = if self.state.position.qty > 0.0 { Side::Sell } else { Side::Buy };
            return Some((OrderPurpose::Flatten, side));
        }
        None
    }

    fn on_fill(
        &mut self,
        order_id: u64,
        purpose: OrderPurpose,
        side: Side,
        price: f64,
        qty: f64,
        now_ms: i64,
    ) {
        let entry_price = self.state.position.avg_entry;
        let realized = self.state.position.on_fill(side, price, qty);

        if let Some(pnl) = realized {
            self.state.perf.add_trade(pnl);
            let _ = self.telem_tx.try_send(TelemetryEvent::TradeClosed(TradeRecord {
                ts_ms: now_ms,
                exit_kind: purpose.label(),
                entry_price,
                exit_price: price,
                qty,
                pnl,
                session_pnl: self.state.perf.total_pnl,
            }));
            eprintln!(
                "[TRADE] {} exit for ${:.2} | session pnl=${:.2} ({} trades, {:.0}% wins)",
                purpose.label(),
                pnl,
                self.state.perf.total_pnl,
                self.state.perf.total_trades,
                self.state.perf.win_rate() * 100.0,
            );
        }

        match purpose {
            OrderPurpose::Grid { .. } => {
                // Single-position mode: first entry wins, the rest of the
                // ladder is pulled while the bracket works the exit.
                if self.state.bracket.is_none() {
                    self.arm_bracket(order_id, side, price, now_ms);
                }
                self.cancel_grid_orders(now_ms);
            }

            OrderPurpose::TakeProfit | OrderPurpose::StopLoss => {
                // Pull the sibling exit and rebuild the ladder
                if let Some(bracket) = self.state.bracket.take() {
                    let sibling = if order_id == bracket.tp_order_id {
                        bracket.sl_order_id
                    } else {
                        bracket.tp_order_id
                    };
                    self.cancel_order(sibling, now_ms);
                }
                if let Some(mid) = self.state.mid {
                    if !self.state.paused_due_to_risk {
                        self.center_grid(mid, now_ms, purpose.label());
                    }
                }
            }

            OrderPurpose::Flatten => {}

            OrderPurpose::Trim => {
                self.trim_order_id = None;
            }
        }

        if self.config.dry_run {
            self.emit_equity(now_ms);
        }
    }

    fn on_mark_price(&mut self, m: MarkPriceUpdate) {
        self.state.funding_rate = m.funding_rate;
        if self.config.consider_funding_rate && m.funding_rate.abs() > FUNDING_WARN_THRESHOLD {
            eprintln!(
                "[FUND] Elevated funding rate {:.4}% on {}",
                m.funding_rate * 100.0,
                self.config.symbol,
            );
        }
    }

    fn arm_bracket(&mut self, entry_order_id: u64, entry_side: Side, entry_price: f64, now_ms: i64) {
        let bias = self.state.trend.bias;
        let profit_pct = bracket::profit_pct_for(
            entry_side,
            bias,
            self.config.grid_profit_pct,
            self.config.asymmetric_profit_factor,
        );
        let plan = match bracket::plan(
            entry_price,
            entry_side,
            profit_pct,
            self.config.stop_loss_pct,
            self.config.price_tick,
        ) {
            Some(p) => p,
            None => {
                eprintln!("[ORDER] No bracket for entry at {:.4}", entry_price);
                return;
            }
        };

        let qty = self.state.position.qty.abs();
        if qty <= 0.0 {
            return;
        }

        let tp_id = self.place(
            plan.exit_side,
            qty,
            OrderKind::Limit { price: plan.tp_price, post_only: true },
            true,
            OrderPurpose::TakeProfit,
            now_ms,
        );
        let sl_id = self.place(
            plan.exit_side,
            qty,
            OrderKind::StopMarket { trigger: plan.sl_trigger },
            true,
            OrderPurpose::StopLoss,
            now_ms,
        );

        if bias != TrendBias::Flat && (profit_pct - self.config.grid_profit_pct).abs() > 1e-12 {
            eprintln!(
                "[ORDER] With-trend entry, profit target boosted to {:.2}%",
                profit_pct,
            );
        }
        eprintln!(
            "[ORDER] Bracket armed: entry {:.4} tp {:.4} sl {:.4}",
            entry_price, plan.tp_price, plan.sl_trigger,
        );

        self.state.bracket = Some(ActiveBracket {
            entry_order_id,
            entry_price,
            entry_side,
            qty,
            tp_order_id: tp_id,
            sl_order_id: sl_id,
        });
    }

    // ── housekeeping ──

    fn on_tick(&mut self, now_ms: i64) {
        self.ticks += 1;

        // Dry run synthesizes the account the exchange would report
        if self.config.dry_run {
            if let Some(mid) = self.state.mid {
                let unrealized = if self.state.position.is_flat() {
                    0.0
                } else {
                    (mid - self.state.position.avg_entry) * self.state.position.qty
                };
                let (long_n, short_n) = self.state.position.notional(mid);
                let margin_balance =
                    self.config.starting_equity + self.state.perf.total_pnl + unrealized;
                self.state.on_account(AccountSnapshot {
                    ts_ms: now_ms,
                    wallet_balance: self.config.starting_equity + self.state.perf.total_pnl,
                    margin_balance,
                    maint_margin: (long_n + short_n) * 0.005,
                    unrealized_pnl: unrealized,
                });
                if self.ticks % 10 == 0 {
                    self.emit_equity(now_ms);
                }
            }
        }

        if now_ms - self.state.last_margin_check_ms >= MARGIN_CHECK_INTERVAL_MS {
            self.state.last_margin_check_ms = now_ms;
            if let Some(reason) = self.monitor.margin_breach(&self.state) {
                let mid = self.state.mid.unwrap_or(0.0);
                self.flatten_and_pause(&reason, mid, now_ms);
            }
        }

        if self.ticks % 30 == 0 {
            let mid = self.state.mid.unwrap_or(0.0);
            eprintln!(
                "[STATUS] mid={:.4} orders={} pos={:.4} pnl=${:.2} {}",
                mid,
                self.state.open_orders.len(),
                self.state.position.qty,
                self.state.perf.total_pnl,
                if self.state.paused_due_to_risk { "PAUSED" } else { "active" },
            );
        }
    }

    fn emit_equity(&self, now_ms: i64) {
        if let Some(acct) = &self.state.account {
            let _ = self.telem_tx.try_send(TelemetryEvent::Equity(EquityRecord {
                ts_ms: now_ms,
                wallet_balance: acct.wallet_balance,
                margin_balance: acct.margin_balance,
                maint_margin: acct.maint_margin,
                unrealized_pnl: acct.unrealized_pnl,
            }));
        }
    }

    /// Cancel everything and close the position on the way out.
    fn unwind(&mut self, now_ms: i64) {
        if self.config.dry_run {
            self.state.open_orders.clear();
        } else {
            for (id, order) in self.state.open_orders.drain() {
                self.awaiting_cancel.insert(id, order);
            }
            let _ = self.gw_tx.try_send(GatewayCommand::CancelAll);
        }
        self.state.bracket = None;

        if !self.state.position.is_flat() {
            let qty = self.state.position.qty.abs();
            let side = if self.state.position.qty > 0.0 { Side::Sell } else { Side::Buy };
            let mid = self.state.mid.unwrap_or(self.state.position.avg_entry);
            eprintln!("[ENGINE] Flattening {} {} at shutdown", qty, side);
            let id = self.place(side, qty, OrderKind::Market, true, OrderPurpose::Flatten, now_ms);
            if self.config.dry_run {
                self.fill_market_locally(id, qty, mid, now_ms);
            }
        }
    }
}
