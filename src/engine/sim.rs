use crate::types::Side;

/// Whether a resting limit fills inside the [low, high] range. For a tick
/// stream low == high == mid.
pub fn limit_crossed(side: Side, price: f64, low: f64, high: f64) -> bool {
    match side {
        Side::Buy => low <= price,
        Side::Sell => high >= price,
    }
}

/// Whether a stop-market triggers inside the range. The exit side implies
/// the trigger direction: a sell stop protects a long and fires on the way
/// down, a buy stop protects a short and fires on the way up.
pub fn stop_triggered(exit_side: Side, trigger: f64, low: f64, high: f64) -> bool {
    match exit_side {
        Side::Sell => low <= trigger,
        Side::Buy => high >= trigger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_limit_fills_on_dip() {
        assert!(limit_crossed(Side::Buy, 99.0, 98.5, 100.0));
        assert!(!limit_crossed(Side::Buy, 99.0, 99.5, 100.0));
    }

    #[test]
    fn test_sell_limit_fills_on_rally() {
        assert!(limit_crossed(Side::Sell, 101.0, 100.0, 101.5));
        assert!(!limit_crossed(Side::Sell, 101.0, 100.0, 100.5));
    }

    #[test]
    fn test_tick_stream_degenerate_range() {
        // low == high == mid
        assert!(limit_crossed(Side::Buy, 99.0, 98.0, 98.0));
        assert!(limit_crossed(Side::Sell, 101.0, 102.0, 102.0));
        assert!(!limit_crossed(Side::Buy, 99.0, 100.0, 100.0));
    }

    #[test]
    fn test_stop_directions() {
        // Sell stop under a long: fires when price falls through
        assert!(stop_triggered(Side::Sell, 98.0, 97.5, 100.0));
        assert!(!stop_triggered(Side::Sell, 98.0, 98.5, 100.0));
        // Buy stop over a short: fires when price rises through
        assert!(stop_triggered(Side::Buy, 102.0, 100.0, 102.5));
        assert!(!stop_triggered(Side::Buy, 102.0, 100.0, 101.5));
    }
}
