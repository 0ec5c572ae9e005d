use crate::types::Side;

/// Price band the grid operates in, centered on the mid at placement time.
#[derive(Clone, Copy, Debug)]
pub struct GridBand {
    pub mid: f64,
    pub lower: f64,
    pub upper: f64,
}

impl GridBand {
    /// Center a band of total width `offset` (as a fraction of mid) on `mid`.
    /// Returns None for non-positive mids or degenerate offsets.
    pub fn centered(mid: f64, offset: f64) -> Option<GridBand> {
        if mid <= 0.0 || offset <= 0.0 || offset >= 2.0 {
            return None;
        }
        let half = offset / 2.0;
        Some(GridBand {
            mid,
            lower: mid * (1.0 - half),
            upper: mid * (1.0 + half),
        })
    }

    /// Geometric spacing ratio so that `levels` steps per side span the band:
    /// ratio = (upper/lower)^(1 / (2*levels)).
    pub fn ratio(&self, levels: u32) -> f64 {
        (self.upper / self.lower).powf(1.0 / (2.0 * levels as f64))
    }

    /// Drift of `price` from the band center, as a fraction of the center.
    pub fn drift_from_center(&self, price: f64) -> f64 {
        (price - self.mid).abs() / self.mid
    }

    /// Whether `price` has escaped the band by more than `threshold`.
    pub fn is_breakout(&self, price: f64, threshold: f64) -> bool {
        price < self.lower * (1.0 - threshold) || price > self.upper * (1.0 + threshold)
    }
}

/// One planned grid entry order.
#[derive(Clone, Copy, Debug)]
pub struct LevelPlan {
    pub level: u32,
    pub side: Side,
    pub price: f64,
}

/// A grid price is only usable when it rests on the correct side of the
/// market and at least `min_distance` (fraction of mid) away from it.
pub fn price_is_valid(price: f64, mid: f64, side: Side, min_distance: f64) -> bool {
    if mid <= 0.0 {
        return false;
    }
    match side {
        Side::Buy if price >= mid => return false,
        Side::Sell if price <= mid => return false,
        _ => {}
    }
    (price - mid).abs() / mid >= min_distance
}

/// Round a price down to the exchange tick.
pub fn round_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    (price / tick).floor() * tick
}

/// Round a quantity down to the exchange step.
pub fn round_to_step(qty: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return qty;
    }
    (qty / step).floor() * step
}

/// Plan the full ladder: one buy below and one sell above per level,
/// geometrically spaced. Levels whose rounded price fails validation are
/// skipped rather than clamped toward the market.
pub fn plan_levels(
    band: &GridBand,
    levels: u32,
    min_distance: f64,
    tick: f64,
) -> Vec<LevelPlan> {
    let ratio = band.ratio(levels);
    let mut plans = Vec::with_capacity(levels as usize * 2);

    for i in 1..=levels {
        let buy_price = round_to_tick(band.mid * ratio.powi(-(i as i32)), tick);
        if price_is_valid(buy_price, band.mid, Side::Buy, min_distance) {
            plans.push(LevelPlan {
                level: i,
                side: Side::Buy,
                price: buy_price,
            });
        }

        let sell_price = round_to_tick(band.mid * ratio.powi(i as i32), tick);
        if price_is_valid(sell_price, band.mid, Side::Sell, min_distance) {
            plans.push(LevelPlan {
                level: i,
                side: Side::Sell,
                price: sell_price,
            });
        }
    }

    plans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_symmetric_around_mid() {
        let band = GridBand::centered(100.0, 0.08).unwrap();
        assert!((band.lower - 96.0).abs() < 1e-9);
        assert!((band.upper - 104.0).abs() < 1e-9);
    }

    #[test]
    fn test_band_rejects_bad_inputs() {
        assert!(GridBand::centered(0.0, 0.08).is_none());
        assert!(GridBand::centered(-5.0, 0.08).is_none());
        assert!(GridBand::centered(100.0, 0.0).is_none());
        assert!(GridBand::centered(100.0, 2.5).is_none());
    }

    #[test]
    fn test_ratio_spans_band() {
        let band = GridBand::centered(150.0, 0.16).unwrap();
        let levels = 8;
        let ratio = band.ratio(levels);
        assert!(ratio > 1.0);
        // 2*levels steps from lower must reach upper
        let spanned = band.lower * ratio.powi(2 * levels as i32);
        assert!((spanned - band.upper).abs() / band.upper < 1e-9);
    }

    #[test]
    fn test_levels_alternate_sides_of_mid() {
        let band = GridBand::centered(100.0, 0.08).unwrap();
        let plans = plan_levels(&band, 5, 0.001, 0.01);
        assert!(!plans.is_empty());
        for p in &plans {
            match p.side {
                Side::Buy => assert!(p.price < 100.0, "buy at {} not below mid", p.price),
                Side::Sell => assert!(p.price > 100.0, "sell at {} not above mid", p.price),
            }
        }
    }

    #[test]
    fn test_levels_monotone_per_side() {
        let band = GridBand::centered(100.0, 0.08).unwrap();
        let plans = plan_levels(&band, 10, 0.0001, 0.0001);
        let buys: Vec<f64> = plans
            .iter()
            .filter(|p| p.side == Side::Buy)
            .map(|p| p.price)
            .collect();
        let sells: Vec<f64> = plans
            .iter()
            .filter(|p| p.side == Side::Sell)
            .map(|p| p.price)
            .collect();
        assert!(buys.windows(2).all(|w| w[1] < w[0]), "buys descend from mid");
        assert!(sells.windows(2).all(|w| w[1] > w[0]), "sells ascend from mid");
    }

    #[test]
    fn test_validation_skips_levels_near_market() {
        let band = GridBand::centered(100.0, 0.08).unwrap();
        // Huge minimum distance: inner levels must be dropped
        let strict = plan_levels(&band, 5, 0.02, 0.01);
        let loose = plan_levels(&band, 5, 0.0001, 0.01);
        assert!(strict.len() < loose.len());
        for p in &strict {
            assert!((p.price - 100.0).abs() / 100.0 >= 0.02);
        }
    }

    #[test]
    fn test_price_validation_sides() {
        assert!(!price_is_valid(100.5, 100.0, Side::Buy, 0.001));
        assert!(!price_is_valid(99.5, 100.0, Side::Sell, 0.001));
        assert!(price_is_valid(99.5, 100.0, Side::Buy, 0.001));
        assert!(price_is_valid(100.5, 100.0, Side::Sell, 0.001));
        // Too close
        assert!(!price_is_valid(99.99, 100.0, Side::Buy, 0.001));
    }

    #[test]
    fn test_rounding() {
        assert!((round_to_tick(100.237, 0.01) - 100.23).abs() < 1e-9);
        assert!((round_to_step(1.2345, 0.001) - 1.234).abs() < 1e-9);
        // Zero tick passes through
        assert_eq!(round_to_tick(100.237, 0.0), 100.237);
    }

    #[test]
    fn test_breakout_detection() {
        let band = GridBand::centered(100.0, 0.08).unwrap(); // [96, 104]
        assert!(!band.is_breakout(100.0, 0.06));
        assert!(!band.is_breakout(96.5, 0.06));
        // 96 * 0.94 = 90.24
        assert!(band.is_breakout(90.0, 0.06));
        // 104 * 1.06 = 110.24
        assert!(band.is_breakout(110.5, 0.06));
    }

    #[test]
    fn test_drift_from_center() {
        let band = GridBand::centered(100.0, 0.08).unwrap();
        assert!((band.drift_from_center(103.0) - 0.03).abs() < 1e-12);
        assert!((band.drift_from_center(97.0) - 0.03).abs() < 1e-12);
    }
}
