/// Trading profile: demo runs against the Binance futures testnet,
/// live against production with tighter risk defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Demo,
    Live,
}

impl Profile {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "live" => Profile::Live,
            _ => Profile::Demo,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Profile::Demo => "demo",
            Profile::Live => "live",
        }
    }

    /// Market-data WebSocket base URL.
    pub fn ws_base(&self) -> &'static str {
        match self {
            Profile::Demo => "wss://stream.binancefuture.com",
            Profile::Live => "wss://fstream.binance.com",
        }
    }

    /// REST API base URL.
    pub fn rest_base(&self) -> &'static str {
        match self {
            Profile::Demo => "https://testnet.binancefuture.com",
            Profile::Live => "https://fapi.binance.com",
        }
    }
}

/// Configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    pub profile: Profile,
    pub symbol: String,

    // Exchange precision (filters come from env; see DESIGN.md)
    pub price_tick: f64,
    pub qty_step: f64,
    pub min_qty: f64,

    // Grid
    pub grid_levels: u32,
    pub min_grid_levels: u32,
    pub max_grid_levels: u32,
    pub order_qty: f64,
    pub grid_offset: f64,
    pub grid_profit_pct: f64,
    pub recenter_drift: f64,
    pub recenter_interval_secs: i64,
    pub order_validation_distance: f64,
    pub volatility_adapt: bool,
    pub dynamic_grid: bool,

    // Risk
    pub breakout_threshold: f64,
    pub trailing_stop_threshold: f64,
    pub max_drawdown: f64,
    pub max_long_notional: f64,
    pub max_short_notional: f64,
    pub max_total_notional: f64,
    pub margin_safety_threshold: f64,
    pub stop_loss_pct: f64,
    pub max_position_multiplier: f64,
    pub asymmetric_profit_factor: f64,
    pub auto_resume: bool,
    pub resume_cooldown_mins: i64,
    pub resume_tolerance: f64,
    pub consider_funding_rate: bool,

    // Feature toggles
    pub enable_breakout_stop: bool,
    pub enable_exposure_limits: bool,
    pub enable_margin_monitoring: bool,
    pub enable_trailing_stop: bool,
    pub enable_max_drawdown: bool,

    // Execution
    pub dry_run: bool,
    pub starting_equity: f64,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,

    // Telegram
    pub tg_bot_token: Option<String>,
    pub tg_chat_id: Option<String>,
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let profile = Profile::from_str(
            &std::env::var("PROFILE").unwrap_or_else(|_| "demo".into()),
        );
        let symbol = std::env::var("SYMBOL")
            .unwrap_or_else(|_| "SOLUSDT".into())
            .to_uppercase();

        // Live defaults are deliberately more conservative than demo.
        let live = profile == Profile::Live;

        Self {
            profile,
            symbol,
            price_tick: env_f64("PRICE_TICK", 0.01),
            qty_step: env_f64("QTY_STEP", 0.001),
            min_qty: env_f64("MIN_QTY", 0.001),

            grid_levels: env_u32("GRID_LEVELS", 15),
            min_grid_levels: env_u32("MIN_GRID_LEVELS", 5),
            max_grid_levels: env_u32("MAX_GRID_LEVELS", if live { 25 } else { 30 }),
            order_qty: env_f64("ORDER_QTY", if live { 0.040 } else { 1.000 }),
            grid_offset: env_f64("GRID_OFFSET", 0.08),
            grid_profit_pct: env_f64("GRID_PROFIT_PCT", 1.2),
            recenter_drift: env_f64("RECENTER_DRIFT", 0.03),
            recenter_interval_secs: env_i64("RECENTER_INTERVAL_SECS", 300),
            order_validation_distance: env_f64(
                "ORDER_VALIDATION_DISTANCE",
                if live { 0.002 } else { 0.001 },
            ),
            volatility_adapt: env_bool("VOL_ADAPT", true),
            dynamic_grid: env_bool("DYNAMIC_GRID", true),

            breakout_threshold: env_f64("BREAKOUT_THRESHOLD", if live { 0.05 } else { 0.06 }),
            trailing_stop_threshold: env_f64(
                "TRAILING_STOP_THRESHOLD",
                if live { 0.06 } else { 0.08 },
            ),
            max_drawdown: env_f64("MAX_DRAWDOWN", if live { 0.10 } else { 0.15 }),
            max_long_notional: env_f64("MAX_LONG_NOTIONAL", if live { 500.0 } else { 800.0 }),
            max_short_notional: env_f64("MAX_SHORT_NOTIONAL", if live { 500.0 } else { 800.0 }),
            max_total_notional: env_f64("MAX_TOTAL_NOTIONAL", if live { 800.0 } else { 1200.0 }),
            margin_safety_threshold: env_f64(
                "MARGIN_SAFETY_THRESHOLD",
                if live { 0.50 } else { 0.60 },
            ),
            stop_loss_pct: env_f64("STOP_LOSS_PCT", if live { 1.5 } else { 2.0 }),
            max_position_multiplier: env_f64(
                "MAX_POSITION_MULTIPLIER",
                if live { 2.0 } else { 3.0 },
            ),
            asymmetric_profit_factor: env_f64(
                "ASYMMETRIC_PROFIT_FACTOR",
                if live { 1.3 } else { 1.5 },
            ),
            auto_resume: env_bool("AUTO_RESUME", true),
            resume_cooldown_mins: env_i64("RESUME_COOLDOWN_MINS", if live { 45 } else { 30 }),
            resume_tolerance: env_f64("RESUME_TOLERANCE", if live { 0.02 } else { 0.03 }),
            consider_funding_rate: env_bool("CONSIDER_FUNDING_RATE", true),

            enable_breakout_stop: env_bool("ENABLE_BREAKOUT_STOP", true),
            enable_exposure_limits: env_bool("ENABLE_EXPOSURE_LIMITS", true),
            enable_margin_monitoring: env_bool("ENABLE_MARGIN_MONITORING", true),
            enable_trailing_stop: env_bool("ENABLE_TRAILING_STOP", true),
            enable_max_drawdown: env_bool("ENABLE_MAX_DRAWDOWN", true),

            dry_run: env_bool("DRY_RUN", true),
            starting_equity: env_f64("STARTING_EQUITY", 1000.0),
            api_key: std::env::var("BINANCE_API_KEY").ok(),
            api_secret: std::env::var("BINANCE_API_SECRET").ok(),

            tg_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            tg_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
        }
    }

    /// Order quantity floored at the exchange minimum.
    pub fn effective_qty(&self) -> f64 {
        self.order_qty.max(self.min_qty)
    }

    /// Combined market stream URL: book ticker + agg trades + 1m klines + mark price.
    pub fn stream_url(&self) -> String {
        let s = self.symbol.to_lowercase();
        format!(
            "{}/stream?streams={s}@bookTicker/{s}@aggTrade/{s}@kline_1m/{s}@markPrice@1s",
            self.profile.ws_base(),
        )
    }

    pub fn resume_cooldown_ms(&self) -> i64 {
        self.resume_cooldown_mins * 60 * 1000
    }

    pub fn recenter_interval_ms(&self) -> i64 {
        self.recenter_interval_secs * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_endpoints() {
        assert!(Profile::Demo.rest_base().contains("testnet"));
        assert!(!Profile::Live.rest_base().contains("testnet"));
        assert!(Profile::Demo.ws_base().starts_with("wss://"));
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!(Profile::from_str("live"), Profile::Live);
        assert_eq!(Profile::from_str("LIVE"), Profile::Live);
        assert_eq!(Profile::from_str("demo"), Profile::Demo);
        assert_eq!(Profile::from_str("anything"), Profile::Demo);
    }
}
