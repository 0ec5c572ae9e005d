use std::time::Instant;

// ─── Feed Events (produced by WS/gateway tasks, consumed by engine) ───

pub enum FeedEvent {
    Book(BookTicker),
    Trade(AggTrade),
    Bar(Bar),
    MarkPrice(MarkPriceUpdate),
    Account(AccountSnapshot),
    OrderUpdate(OrderUpdate),
    Tick,
    Shutdown,
}

#[derive(Clone)]
pub struct BookTicker {
    pub recv_at: Instant,
    pub bid: f64,
    pub ask: f64,
}

impl BookTicker {
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

#[derive(Clone)]
pub struct AggTrade {
    pub exchange_ts_ms: i64,
    pub recv_at: Instant,
    pub price: f64,
    pub qty: f64,
    pub is_buy: bool,
}

/// One kline. The feed emits both in-progress and closed bars;
/// indicators only consume closed ones.
#[derive(Clone, Copy, Debug)]
pub struct Bar {
    pub close_ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub closed: bool,
}

#[derive(Clone, Copy)]
pub struct MarkPriceUpdate {
    pub ts_ms: i64,
    pub mark_price: f64,
    pub funding_rate: f64,
}

/// Futures account state, polled by the gateway (live) or synthesized (dry run).
#[derive(Clone, Copy, Debug)]
pub struct AccountSnapshot {
    pub ts_ms: i64,
    pub wallet_balance: f64,
    pub margin_balance: f64,
    pub maint_margin: f64,
    pub unrealized_pnl: f64,
}

// ─── Orders ───

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// What an order is for. Grid entries carry their level index so fills
/// can be attributed back to the ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderPurpose {
    Grid { level: u32 },
    TakeProfit,
    StopLoss,
    Flatten,
    Trim,
}

impl OrderPurpose {
    pub fn label(&self) -> &'static str {
        match self {
            OrderPurpose::Grid { .. } => "grid",
            OrderPurpose::TakeProfit => "tp",
            OrderPurpose::StopLoss => "sl",
            OrderPurpose::Flatten => "flatten",
            OrderPurpose::Trim => "trim",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OrderKind {
    /// Post-only resting limit (GTX on Binance futures).
    Limit { price: f64, post_only: bool },
    /// Stop-market with a trigger price.
    StopMarket { trigger: f64 },
    Market,
}

pub struct Order {
    pub id: u64,
    pub side: Side,
    pub qty: f64,
    pub kind: OrderKind,
    pub reduce_only: bool,
    pub purpose: OrderPurpose,
    pub created_at: Instant,
}

/// Commands accepted by the order gateway.
pub enum GatewayCommand {
    Place(Order),
    Cancel(u64),
    CancelAll,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderState {
    Accepted,
    Filled { price: f64, qty: f64 },
    Canceled,
    Rejected(String),
}

#[derive(Clone, Debug)]
pub struct OrderUpdate {
    pub order_id: u64,
    pub state: OrderState,
    pub latency_ms: f64,
}

// ─── Telemetry Events ───

pub enum TelemetryEvent {
    GridCentered(GridRecord),
    OrderSent(OrderRecord),
    OrderResult(FillRecord),
    TradeClosed(TradeRecord),
    Risk(RiskRecord),
    Equity(EquityRecord),
    SessionStart(SessionStartRecord),
    SessionEnd(SessionEndRecord),
}

pub struct GridRecord {
    pub ts_ms: i64,
    pub mid: f64,
    pub lower: f64,
    pub upper: f64,
    pub levels: u32,
    pub orders_placed: u32,
    pub atr_multiplier: f64,
    pub reason: &'static str,
}

pub struct OrderRecord {
    pub ts_ms: i64,
    pub order_id: u64,
    pub side: Side,
    pub purpose: &'static str,
    pub price: f64,
    pub qty: f64,
    pub reduce_only: bool,
}

pub struct FillRecord {
    pub ts_ms: i64,
    pub order_id: u64,
    pub purpose: &'static str,
    pub side: Side,
    pub status: String,
    pub filled_price: Option<f64>,
    pub filled_qty: Option<f64>,
    pub submit_to_ack_ms: f64,
}

/// A completed round trip: entry averaged in, exit realized out.
pub struct TradeRecord {
    pub ts_ms: i64,
    pub exit_kind: &'static str,
    pub entry_price: f64,
    pub exit_price: f64,
    pub qty: f64,
    pub pnl: f64,
    pub session_pnl: f64,
}

pub struct RiskRecord {
    pub ts_ms: i64,
    pub trigger: String,
    pub mid: f64,
    pub long_notional: f64,
    pub short_notional: f64,
    pub margin_balance: f64,
}

pub struct EquityRecord {
    pub ts_ms: i64,
    pub wallet_balance: f64,
    pub margin_balance: f64,
    pub maint_margin: f64,
    pub unrealized_pnl: f64,
}

pub struct SessionStartRecord {
    pub ts_ms: i64,
    pub session_id: String,
    pub symbol: String,
    pub profile: &'static str,
    pub grid_levels: u32,
    pub order_qty: f64,
    pub grid_offset: f64,
}

pub struct SessionEndRecord {
    pub ts_ms: i64,
    pub session_id: String,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub pauses: u32,
    pub recenters: u32,
}
