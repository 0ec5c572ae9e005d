use crate::grid::geometry::round_to_tick;
use crate::types::Side;

/// Exit pair for a filled grid entry: a reduce-only take-profit limit and
/// a reduce-only stop-market.
#[derive(Clone, Copy, Debug)]
pub struct BracketPlan {
    pub exit_side: Side,
    pub tp_price: f64,
    pub sl_trigger: f64,
}

/// Trend context at fill time. With-trend entries earn a larger profit
/// target (asymmetric factor); counter-trend entries keep the base target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrendBias {
    Up,
    Down,
    Flat,
}

/// Profit percentage for an entry, boosted when trading with the trend.
pub fn profit_pct_for(entry_side: Side, bias: TrendBias, base_pct: f64, asym_factor: f64) -> f64 {
    match (entry_side, bias) {
        (Side::Buy, TrendBias::Up) | (Side::Sell, TrendBias::Down) => base_pct * asym_factor,
        _ => base_pct,
    }
}

/// Plan TP/SL for a filled entry.
/// `profit_pct` is in percent (1.2 = 1.2%), `stop_loss_pct` likewise.
pub fn plan(
    entry_price: f64,
    entry_side: Side,
    profit_pct: f64,
    stop_loss_pct: f64,
    tick: f64,
) -> Option<BracketPlan> {
    if entry_price <= 0.0 || profit_pct <= 0.0 || stop_loss_pct <= 0.0 {
        return None;
    }
    let profit = profit_pct / 100.0;
    let stop = stop_loss_pct / 100.0;

    let (tp_raw, sl_raw) = match entry_side {
        Side::Buy => (entry_price * (1.0 + profit), entry_price * (1.0 - stop)),
        Side::Sell => (entry_price * (1.0 - profit), entry_price * (1.0 + stop)),
    };

    Some(BracketPlan {
        exit_side: entry_side.opposite(),
        tp_price: round_to_tick(tp_raw, tick),
        sl_trigger: round_to_tick(sl_raw, tick),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_bracket_sides() {
        let b = plan(100.0, Side::Buy, 1.2, 2.0, 0.01).unwrap();
        assert_eq!(b.exit_side, Side::Sell);
        assert!((b.tp_price - 101.2).abs() < 1e-9);
        assert!((b.sl_trigger - 98.0).abs() < 1e-9);
    }

    #[test]
    fn test_sell_bracket_sides() {
        let b = plan(100.0, Side::Sell, 1.2, 2.0, 0.01).unwrap();
        assert_eq!(b.exit_side, Side::Buy);
        assert!((b.tp_price - 98.8).abs() < 1e-9);
        assert!((b.sl_trigger - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_degenerate_inputs() {
        assert!(plan(0.0, Side::Buy, 1.2, 2.0, 0.01).is_none());
        assert!(plan(100.0, Side::Buy, 0.0, 2.0, 0.01).is_none());
        assert!(plan(100.0, Side::Buy, 1.2, -1.0, 0.01).is_none());
    }

    #[test]
    fn test_asymmetric_profit_with_trend() {
        // Buy in an uptrend gets the boosted target
        assert!((profit_pct_for(Side::Buy, TrendBias::Up, 1.2, 1.5) - 1.8).abs() < 1e-12);
        // Sell in a downtrend likewise
        assert!((profit_pct_for(Side::Sell, TrendBias::Down, 1.2, 1.5) - 1.8).abs() < 1e-12);
        // Counter-trend keeps the base
        assert!((profit_pct_for(Side::Buy, TrendBias::Down, 1.2, 1.5) - 1.2).abs() < 1e-12);
        assert!((profit_pct_for(Side::Sell, TrendBias::Up, 1.2, 1.5) - 1.2).abs() < 1e-12);
        // No trend, no boost
        assert!((profit_pct_for(Side::Buy, TrendBias::Flat, 1.2, 1.5) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_prices_rounded_to_tick() {
        let b = plan(99.995, Side::Buy, 1.2, 2.0, 0.01).unwrap();
        let frac = (b.tp_price / 0.01).fract();
        assert!(frac < 1e-6 || frac > 1.0 - 1e-6, "tp {} not on tick", b.tp_price);
    }
}
