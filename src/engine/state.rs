use std::collections::{HashMap, VecDeque};

use crate::config::Config;
use crate::grid::bracket::TrendBias;
use crate::grid::geometry::GridBand;
use crate::math::atr::Atr;
use crate::math::sma::Sma;
use crate::types::{AccountSnapshot, Bar, OrderPurpose, Side};

/// SMA cross + price slope trend detector, fed by closed 1m bars.
pub struct TrendDetector {
    sma_fast: Sma,
    sma_slow: Sma,
    price_history: VecDeque<f64>,
    pub strength: f64, // |price change| over the history window, in percent
    pub bias: TrendBias,
}

const HISTORY_LEN: usize = 50;
const MIN_HISTORY: usize = 20;

impl TrendDetector {
    pub fn new() -> Self {
        Self {
            sma_fast: Sma::new(9),
            sma_slow: Sma::new(21),
            price_history: VecDeque::with_capacity(HISTORY_LEN),
            strength: 0.0,
            bias: TrendBias::Flat,
        }
    }

    pub fn on_close(&mut self, close: f64) {
        self.sma_fast.update(close);
        self.sma_slow.update(close);
        if self.price_history.len() == HISTORY_LEN {
            self.price_history.pop_front();
        }
        self.price_history.push_back(close);

        if self.price_history.len() < MIN_HISTORY {
            return;
        }

        let oldest = self.price_history[0];
        let newest = *self.price_history.back().unwrap();
        if oldest > 0.0 {
            self.strength = ((newest - oldest) / oldest).abs() * 100.0;
        }

        if let (Some(fast), Some(slow)) = (self.sma_fast.value(), self.sma_slow.value()) {
            self.bias = if fast > slow { TrendBias::Up } else { TrendBias::Down };
        }
    }
}

/// Rolling per-bar volatility: |close - open| / open over the last 20 bars.
pub struct VolatilityWindow {
    values: VecDeque<f64>,
}

const VOL_WINDOW: usize = 20;
const VOL_MIN_SAMPLES: usize = 5;

impl VolatilityWindow {
    pub fn new() -> Self {
        Self {
            values: VecDeque::with_capacity(VOL_WINDOW),
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        if bar.open <= 0.0 {
            return;
        }
        if self.values.len() == VOL_WINDOW {
            self.values.pop_front();
        }
        self.values.push_back(((bar.close - bar.open) / bar.open).abs());
    }

    /// Average bar volatility, once enough samples exist.
    pub fn average(&self) -> Option<f64> {
        if self.values.len() < VOL_MIN_SAMPLES {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }
}

/// Level count adapted to conditions: fewer levels in high volatility or
/// strong trends, more in quiet ranges. Always within [min, max].
pub fn effective_levels(
    base: u32,
    min: u32,
    max: u32,
    avg_vol: Option<f64>,
    trend_strength: f64,
) -> u32 {
    let mut adjusted = match avg_vol {
        Some(v) if v > 0.03 => {
            let factor = (1.0 - v / 0.05).max(0.5);
            (base as f64 * factor) as u32
        }
        Some(v) if v > 0.0 && v < 0.01 => {
            let factor = (1.0 + 0.01 / v).min(1.5);
            (base as f64 * factor) as u32
        }
        _ => base,
    };

    if trend_strength > 4.0 {
        adjusted = (adjusted / 2).max(min);
    } else if trend_strength > 2.0 {
        adjusted = (adjusted * 2 / 3).max(min);
    }

    adjusted.clamp(min, max)
}

/// A resting order the engine is tracking.
#[derive(Clone, Copy, Debug)]
pub struct RestingOrder {
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    pub purpose: OrderPurpose,
}

/// The single open bracket in single-position mode.
#[derive(Clone, Copy, Debug)]
pub struct ActiveBracket {
    pub entry_order_id: u64,
    pub entry_price: f64,
    pub entry_side: Side,
    pub qty: f64,
    pub tp_order_id: u64,
    pub sl_order_id: u64,
}

/// Net position with average entry. Reducing fills realize PnL.
pub struct PositionTracker {
    pub qty: f64, // signed: >0 long, <0 short
    pub avg_entry: f64,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            qty: 0.0,
            avg_entry: 0.0,
        }
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.qty.abs() < 1e-12
    }

    /// Apply a fill. Returns realized PnL for the reduced portion, if any.
    pub fn on_fill(&mut self, side: Side, price: f64, qty: f64) -> Option<f64> {
        let signed = match side {
            Side::Buy => qty,
            Side::Sell => -qty,
        };

        // Same direction (or flat): extend, re-average
        if self.qty == 0.0 || self.qty.signum() == signed.signum() {
            let total = self.qty + signed;
            if total.abs() > 1e-12 {
                self.avg_entry =
                    (self.avg_entry * self.qty.abs() + price * qty) / total.abs();
            }
            self.qty = total;
            return None;
        }

        // Opposite direction: reduce (and possibly flip)
        let closed = qty.min(self.qty.abs());
        let direction = self.qty.signum(); // +1 long, -1 short
        let realized = (price - self.avg_entry) * closed * direction;

        let remainder = signed + self.qty;
        if remainder.abs() < 1e-12 {
            self.qty = 0.0;
            self.avg_entry = 0.0;
        } else if remainder.signum() == self.qty.signum() {
            self.qty = remainder; // partial reduce, avg unchanged
        } else {
            self.qty = remainder; // flipped: remainder entered at this price
            self.avg_entry = price;
        }

        Some(realized)
    }

    /// (long, short) notional at the given mark.
    pub fn notional(&self, mark: f64) -> (f64, f64) {
        if self.qty > 0.0 {
            (self.qty * mark, 0.0)
        } else {
            (0.0, -self.qty * mark)
        }
    }
}

/// Session performance counters.
pub struct PerformanceTracker {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub total_pnl: f64,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            total_pnl: 0.0,
        }
    }

    pub fn add_trade(&mut self, pnl: f64) {
        self.total_trades += 1;
        if pnl > 0.0 {
            self.winning_trades += 1;
        }
        self.total_pnl += pnl;
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }

    pub fn avg_profit(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.total_pnl / self.total_trades as f64
    }
}

/// Owned by the engine task — no Arc, no RwLock, no shared references.
pub struct GridState {
    pub mid: Option<f64>,
    pub band: Option<GridBand>,
    pub original_band: Option<GridBand>,
    pub highest_mid: f64,

    pub grid_active: bool,
    pub paused_due_to_risk: bool,
    pub last_pause_ms: i64,
    pub last_recenter_ms: i64,
    pub last_margin_check_ms: i64,

    pub atr: Atr,
    pub trend: TrendDetector,
    pub vol: VolatilityWindow,
    pub effective_levels: u32,

    pub open_orders: HashMap<u64, RestingOrder>,
    pub bracket: Option<ActiveBracket>,
    pub position: PositionTracker,
    pub perf: PerformanceTracker,

    pub starting_equity: Option<f64>,
    pub account: Option<AccountSnapshot>,
    pub funding_rate: f64,

    pub pauses: u32,
    pub recenters: u32,
}

impl GridState {
    pub fn new(config: &Config) -> Self {
        Self {
            mid: None,
            band: None,
            original_band: None,
            highest_mid: 0.0,
            grid_active: false,
            paused_due_to_risk: false,
            last_pause_ms: 0,
            last_recenter_ms: 0,
            last_margin_check_ms: 0,
            atr: Atr::new(14),
            trend: TrendDetector::new(),
            vol: VolatilityWindow::new(),
            effective_levels: config.grid_levels,
            open_orders: HashMap::new(),
            bracket: None,
            position: PositionTracker::new(),
            perf: PerformanceTracker::new(),
            starting_equity: None,
            account: None,
            funding_rate: 0.0,
            pauses: 0,
            recenters: 0,
        }
    }

    #[inline]
    pub fn on_mid(&mut self, mid: f64) {
        self.mid = Some(mid);
        if mid > self.highest_mid {
            self.highest_mid = mid;
        }
    }

    /// Feed a closed bar into the indicators and recompute the adaptive
    /// level count.
    pub fn on_closed_bar(&mut self, bar: &Bar, config: &Config) {
        self.atr.update(bar);
        self.vol.update(bar);
        self.trend.on_close(bar.close);

        if config.dynamic_grid {
            let levels = effective_levels(
                config.grid_levels,
                config.min_grid_levels,
                config.max_grid_levels,
                self.vol.average(),
                self.trend.strength,
            );
            if levels != self.effective_levels {
                eprintln!(
                    "[ENGINE] Dynamic grid: {} -> {} levels (vol={:.2}%, trend={:.1}%)",
                    self.effective_levels,
                    levels,
                    self.vol.average().unwrap_or(0.0) * 100.0,
                    self.trend.strength,
                );
                self.effective_levels = levels;
            }
        }
    }

    pub fn on_account(&mut self, snap: AccountSnapshot) {
        if self.starting_equity.is_none() && snap.margin_balance > 0.0 {
            self.starting_equity = Some(snap.margin_balance);
            eprintln!("[ENGINE] Starting equity set to {:.2}", snap.margin_balance);
        }
        self.account = Some(snap);
    }

    /// Ids of resting grid entries (not TP/SL).
    pub fn grid_order_ids(&self) -> Vec<u64> {
        self.open_orders
            .iter()
            .filter(|(_, o)| matches!(o.purpose, OrderPurpose::Grid { .. }))
            .map(|(&id, _)| id)
            .collect()
    }
}
