use crate::config::Config;
use crate::engine::state::GridState;

/// What the engine should do after a risk sweep. Checks run in a fixed
/// order and the first firing check wins.
#[derive(Debug, PartialEq)]
pub enum RiskVerdict {
    Hold,
    /// Cooldown elapsed and price is back near the original band.
    Resume,
    /// Flatten everything and stop quoting. Carries the trigger reason.
    Pause(String),
    /// Cancel the grid and re-center on the current mid.
    Recenter(&'static str),
}

/// Stateless evaluator over the engine's `GridState`. Thresholds are
/// frozen from config at startup.
pub struct RiskMonitor {
    auto_resume: bool,
    resume_cooldown_ms: i64,
    resume_tolerance: f64,

    enable_breakout_stop: bool,
    breakout_threshold: f64,

    enable_exposure_limits: bool,
    max_long_notional: f64,
    max_short_notional: f64,
    max_total_notional: f64,

    enable_max_drawdown: bool,
    max_drawdown: f64,

    enable_trailing_stop: bool,
    trailing_stop_threshold: f64,

    enable_margin_monitoring: bool,
    margin_safety_threshold: f64,

    recenter_drift: f64,
    recenter_interval_ms: i64,

    max_position: f64,
    min_trim: f64,
}

/// Margin ratio is expensive to react to, so it is only swept this often.
pub const MARGIN_CHECK_INTERVAL_MS: i64 = 60_000;

impl RiskMonitor {
    pub fn new(config: &Config) -> Self {
        Self {
            auto_resume: config.auto_resume,
            resume_cooldown_ms: config.resume_cooldown_ms(),
            resume_tolerance: config.resume_tolerance,
            enable_breakout_stop: config.enable_breakout_stop,
            breakout_threshold: config.breakout_threshold,
            enable_exposure_limits: config.enable_exposure_limits,
            max_long_notional: config.max_long_notional,
            max_short_notional: config.max_short_notional,
            max_total_notional: config.max_total_notional,
            enable_max_drawdown: config.enable_max_drawdown,
            max_drawdown: config.max_drawdown,
            enable_trailing_stop: config.enable_trailing_stop,
            trailing_stop_threshold: config.trailing_stop_threshold,
            enable_margin_monitoring: config.enable_margin_monitoring,
            margin_safety_threshold: config.margin_safety_threshold,
            recenter_drift: config.recenter_drift,
            recenter_interval_ms: config.recenter_interval_ms(),
            max_position: config.effective_qty()
                * config.grid_levels as f64
                * config.max_position_multiplier,
            min_trim: 1.5 * config.effective_qty(),
        }
    }

    /// Run the ladder against the current price.
    pub fn evaluate(&self, state: &GridState, mid: f64, now_ms: i64) -> RiskVerdict {
        if state.paused_due_to_risk {
            if self.should_resume(state, mid, now_ms) {
                return RiskVerdict::Resume;
            }
            return RiskVerdict::Hold;
        }

        // Nothing quoted and nothing held: nothing to protect.
        if !state.grid_active && state.position.is_flat() {
            return RiskVerdict::Hold;
        }

        if self.enable_breakout_stop {
            if let Some(band) = &state.original_band {
                if band.is_breakout(mid, self.breakout_threshold) {
                    return RiskVerdict::Pause(format!(
                        "breakout: {:.4} escaped [{:.4}, {:.4}] by more than {:.1}%",
                        mid,
                        band.lower,
                        band.upper,
                        self.breakout_threshold * 100.0,
                    ));
                }
            }
        }

        if self.enable_exposure_limits {
            let (long_n, short_n) = state.position.notional(mid);
            if long_n > self.max_long_notional {
                return RiskVerdict::Pause(format!(
                    "long exposure {:.0} over cap {:.0}",
                    long_n, self.max_long_notional,
                ));
            }
            if short_n > self.max_short_notional {
                return RiskVerdict::Pause(format!(
                    "short exposure {:.0} over cap {:.0}",
                    short_n, self.max_short_notional,
                ));
            }
            if long_n + short_n > self.max_total_notional {
                return RiskVerdict::Pause(format!(
                    "total exposure {:.0} over cap {:.0}",
                    long_n + short_n,
                    self.max_total_notional,
                ));
            }
        }

        if self.enable_max_drawdown {
            if let (Some(start), Some(acct)) = (state.starting_equity, &state.account) {
                let floor = start * (1.0 - self.max_drawdown);
                if acct.margin_balance < floor {
                    return RiskVerdict::Pause(format!(
                        "drawdown: equity {:.2} below floor {:.2} ({:.0}% of {:.2})",
                        acct.margin_balance,
                        floor,
                        (1.0 - self.max_drawdown) * 100.0,
                        start,
                    ));
                }
            }
        }

        if self.enable_trailing_stop && state.highest_mid > 0.0 {
            let stop = state.highest_mid * (1.0 - self.trailing_stop_threshold);
            if mid < stop {
                return RiskVerdict::Pause(format!(
                    "trailing stop: {:.4} below {:.4} ({:.0}% off high {:.4})",
                    mid,
                    stop,
                    self.trailing_stop_threshold * 100.0,
                    state.highest_mid,
                ));
            }
        }

        // Drift recenter only applies while the ladder is quoting; a working
        // bracket keeps the grid down until its exit fills.
        if state.grid_active {
            if let Some(band) = &state.band {
                if now_ms - state.last_recenter_ms >= self.recenter_interval_ms
                    && band.drift_from_center(mid) > self.recenter_drift
                {
                    return RiskVerdict::Recenter("drift");
                }
            }
        }

        RiskVerdict::Hold
    }

    fn should_resume(&self, state: &GridState, mid: f64, now_ms: i64) -> bool {
        if !self.auto_resume {
            return false;
        }
        if now_ms - state.last_pause_ms < self.resume_cooldown_ms {
            return false;
        }
        // Price must have come back near where we were last comfortable.
        match &state.original_band {
            Some(band) => {
                mid >= band.lower * (1.0 - self.resume_tolerance)
                    && mid <= band.upper * (1.0 + self.resume_tolerance)
            }
            None => true,
        }
    }

    /// Maintenance margin vs margin balance. Fires above the safety
    /// threshold. Callers gate this on MARGIN_CHECK_INTERVAL_MS.
    pub fn margin_breach(&self, state: &GridState) -> Option<String> {
        if !self.enable_margin_monitoring {
            return None;
        }
        let acct = state.account.as_ref()?;
        if acct.margin_balance <= 0.0 {
            return None;
        }
        let ratio = acct.maint_margin / acct.margin_balance;
        if ratio > self.margin_safety_threshold {
            return Some(format!(
                "margin ratio {:.2} over safety threshold {:.2}",
                ratio, self.margin_safety_threshold,
            ));
        }
        None
    }

    /// Amount the position exceeds its ceiling by. Excess smaller than
    /// 1.5x a single trade is left alone to avoid churning tiny trims.
    pub fn position_excess(&self, state: &GridState) -> Option<f64> {
        let excess = state.position.qty.abs() - self.max_position;
        if excess > self.min_trim {
            Some(excess)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Profile};
    use crate::grid::geometry::GridBand;
    use crate::types::{AccountSnapshot, Side};

    fn test_config() -> Config {
        Config {
            profile: Profile::Demo,
            symbol: "SOLUSDT".into(),
            price_tick: 0.01,
            qty_step: 0.001,
            min_qty: 0.001,
            grid_levels: 15,
            min_grid_levels: 5,
            max_grid_levels: 30,
            order_qty: 1.0,
            grid_offset: 0.08,
            grid_profit_pct: 1.2,
            recenter_drift: 0.03,
            recenter_interval_secs: 300,
            order_validation_distance: 0.001,
            volatility_adapt: true,
            dynamic_grid: true,
            breakout_threshold: 0.06,
            trailing_stop_threshold: 0.08,
            max_drawdown: 0.15,
            max_long_notional: 800.0,
            max_short_notional: 800.0,
            max_total_notional: 1200.0,
            margin_safety_threshold: 0.60,
            stop_loss_pct: 2.0,
            max_position_multiplier: 3.0,
            asymmetric_profit_factor: 1.5,
            auto_resume: true,
            resume_cooldown_mins: 30,
            resume_tolerance: 0.03,
            consider_funding_rate: true,
            enable_breakout_stop: true,
            enable_exposure_limits: true,
            enable_margin_monitoring: true,
            enable_trailing_stop: true,
            enable_max_drawdown: true,
            dry_run: true,
            starting_equity: 1000.0,
            api_key: None,
            api_secret: None,
            tg_bot_token: None,
            tg_chat_id: None,
        }
    }

    fn active_state(config: &Config, mid: f64) -> GridState {
        let mut state = GridState::new(config);
        state.on_mid(mid);
        let band = GridBand::centered(mid, config.grid_offset).unwrap();
        state.band = Some(band);
        state.original_band = Some(band);
        state.grid_active = true;
        state
    }

    fn account(margin_balance: f64, maint: f64) -> AccountSnapshot {
        AccountSnapshot {
            ts_ms: 0,
            wallet_balance: margin_balance,
            margin_balance,
            maint_margin: maint,
            unrealized_pnl: 0.0,
        }
    }

    #[test]
    fn test_quiet_market_holds() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let state = active_state(&config, 100.0);
        assert_eq!(monitor.evaluate(&state, 100.5, 1_000), RiskVerdict::Hold);
    }

    /// Band [96, 104] with 6% breakout margin: 90.24 is the lower trip wire.
    #[test]
    fn test_breakout_pauses() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let state = active_state(&config, 100.0);
        match monitor.evaluate(&state, 90.0, 1_000) {
            RiskVerdict::Pause(reason) => assert!(reason.contains("breakout"), "{}", reason),
            v => panic!("expected pause, got {:?}", v),
        }
        // Just inside the wire (and above the 92.0 trailing stop): no trigger
        assert_eq!(monitor.evaluate(&state, 92.5, 1_000), RiskVerdict::Hold);
    }

    #[test]
    fn test_breakout_uses_original_band_not_current() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        // Grid recentered higher, but the breakout anchor stays put
        state.band = Some(GridBand::centered(120.0, config.grid_offset).unwrap());
        match monitor.evaluate(&state, 111.0, 1_000) {
            RiskVerdict::Pause(reason) => assert!(reason.contains("breakout"), "{}", reason),
            v => panic!("expected pause, got {:?}", v),
        }
    }

    #[test]
    fn test_long_exposure_cap() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.position.on_fill(Side::Buy, 100.0, 9.0); // 900 notional at 100
        match monitor.evaluate(&state, 100.0, 1_000) {
            RiskVerdict::Pause(reason) => assert!(reason.contains("long exposure"), "{}", reason),
            v => panic!("expected pause, got {:?}", v),
        }
    }

    #[test]
    fn test_short_exposure_cap() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.position.on_fill(Side::Sell, 100.0, 9.0);
        match monitor.evaluate(&state, 100.0, 1_000) {
            RiskVerdict::Pause(reason) => assert!(reason.contains("short exposure"), "{}", reason),
            v => panic!("expected pause, got {:?}", v),
        }
    }

    #[test]
    fn test_exposure_within_caps_holds() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.position.on_fill(Side::Buy, 100.0, 5.0); // 500 notional
        assert_eq!(monitor.evaluate(&state, 100.0, 1_000), RiskVerdict::Hold);
    }

    #[test]
    fn test_drawdown_pauses() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.on_account(account(1000.0, 10.0));
        // 15% drawdown floor is 850
        state.account = Some(account(840.0, 10.0));
        match monitor.evaluate(&state, 100.0, 1_000) {
            RiskVerdict::Pause(reason) => assert!(reason.contains("drawdown"), "{}", reason),
            v => panic!("expected pause, got {:?}", v),
        }
    }

    #[test]
    fn test_drawdown_needs_starting_equity() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.account = Some(account(500.0, 10.0));
        state.starting_equity = None;
        assert_eq!(monitor.evaluate(&state, 100.0, 1_000), RiskVerdict::Hold);
    }

    /// 8% trailing stop off a 110 high fires below 101.2.
    #[test]
    fn test_trailing_stop() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.on_mid(110.0);
        match monitor.evaluate(&state, 101.0, 1_000) {
            RiskVerdict::Pause(reason) => assert!(reason.contains("trailing"), "{}", reason),
            v => panic!("expected pause, got {:?}", v),
        }
        assert_eq!(monitor.evaluate(&state, 101.5, 1_000), RiskVerdict::Hold);
    }

    #[test]
    fn test_recenter_requires_interval_and_drift() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.last_recenter_ms = 0;

        // 3.5% drift but interval not yet elapsed
        assert_eq!(monitor.evaluate(&state, 103.5, 100_000), RiskVerdict::Hold);
        // Interval elapsed, drift too small
        assert_eq!(monitor.evaluate(&state, 101.0, 400_000), RiskVerdict::Hold);
        // Both conditions met
        assert_eq!(
            monitor.evaluate(&state, 103.5, 400_000),
            RiskVerdict::Recenter("drift"),
        );
    }

    #[test]
    fn test_paused_state_resumes_after_cooldown_near_band() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.paused_due_to_risk = true;
        state.grid_active = false;
        state.last_pause_ms = 0;

        let cooldown = config.resume_cooldown_ms();
        // Cooldown not elapsed
        assert_eq!(
            monitor.evaluate(&state, 100.0, cooldown - 1_000),
            RiskVerdict::Hold,
        );
        // Elapsed but price far from the original band
        assert_eq!(
            monitor.evaluate(&state, 150.0, cooldown + 1_000),
            RiskVerdict::Hold,
        );
        // Elapsed and back inside the tolerance
        assert_eq!(
            monitor.evaluate(&state, 100.0, cooldown + 1_000),
            RiskVerdict::Resume,
        );
        // Tolerance extends the band: 96 * 0.97 = 93.12
        assert_eq!(
            monitor.evaluate(&state, 93.5, cooldown + 1_000),
            RiskVerdict::Resume,
        );
    }

    #[test]
    fn test_no_resume_when_disabled() {
        let mut config = test_config();
        config.auto_resume = false;
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.paused_due_to_risk = true;
        state.last_pause_ms = 0;
        assert_eq!(
            monitor.evaluate(&state, 100.0, 10 * config.resume_cooldown_ms()),
            RiskVerdict::Hold,
        );
    }

    #[test]
    fn test_margin_breach() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.account = Some(account(1000.0, 650.0)); // ratio 0.65 > 0.60
        assert!(monitor.margin_breach(&state).is_some());
        state.account = Some(account(1000.0, 400.0));
        assert!(monitor.margin_breach(&state).is_none());
    }

    #[test]
    fn test_margin_ignores_empty_account() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.account = None;
        assert!(monitor.margin_breach(&state).is_none());
        state.account = Some(account(0.0, 0.0));
        assert!(monitor.margin_breach(&state).is_none());
    }

    #[test]
    fn test_position_excess() {
        let config = test_config();
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        // Ceiling: 1.0 * 15 * 3.0 = 45
        state.position.on_fill(Side::Buy, 100.0, 50.0);
        let excess = monitor.position_excess(&state).unwrap();
        assert!((excess - 5.0).abs() < 1e-9);

        let mut small = active_state(&config, 100.0);
        small.position.on_fill(Side::Buy, 100.0, 10.0);
        assert!(monitor.position_excess(&small).is_none());

        // Excess under 1.5x the trade size is tolerated
        let mut slight = active_state(&config, 100.0);
        slight.position.on_fill(Side::Buy, 100.0, 46.0);
        assert!(monitor.position_excess(&slight).is_none());
    }

    #[test]
    fn test_disabled_checks_never_fire() {
        let mut config = test_config();
        config.enable_breakout_stop = false;
        config.enable_trailing_stop = false;
        config.enable_exposure_limits = false;
        config.enable_max_drawdown = false;
        let monitor = RiskMonitor::new(&config);
        let mut state = active_state(&config, 100.0);
        state.on_mid(200.0);
        state.position.on_fill(Side::Buy, 100.0, 100.0);
        state.account = Some(account(100.0, 10.0));
        // Way past every threshold, but everything is off
        assert_eq!(monitor.evaluate(&state, 50.0, 1_000), RiskVerdict::Hold);
    }
}
