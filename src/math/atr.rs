use std::collections::VecDeque;

use crate::types::Bar;

/// Average true range over a fixed bar window (Wilder's TR, simple mean).
/// Drives the volatility adaptation of the grid band width.
pub struct Atr {
    period: usize,
    values: VecDeque<f64>,
    prev_close: Option<f64>,
}

/// Minimum samples before the multiplier deviates from neutral.
const MIN_SAMPLES: usize = 5;

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            values: VecDeque::with_capacity(period),
            prev_close: None,
        }
    }

    /// Update with a closed bar. The first bar only seeds prev_close.
    pub fn update(&mut self, bar: &Bar) {
        let prev = match self.prev_close {
            Some(p) => p,
            None => {
                self.prev_close = Some(bar.close);
                return;
            }
        };
        let tr = (bar.high - bar.low)
            .max((bar.high - prev).abs())
            .max((bar.low - prev).abs());
        if self.values.len() == self.period {
            self.values.pop_front();
        }
        self.values.push_back(tr);
        self.prev_close = Some(bar.close);
    }

    /// Mean true range over the window, if any samples exist.
    pub fn value(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Volatility multiplier for the grid offset: ATR as a fraction of the
    /// mid price, normalized so 1% ATR maps to 1.0, clamped to [0.7, 1.8].
    /// Neutral (1.0) until enough bars have been seen.
    pub fn offset_multiplier(&self, mid: f64) -> f64 {
        if self.values.len() < MIN_SAMPLES || mid <= 0.0 {
            return 1.0;
        }
        let atr = match self.value() {
            Some(v) => v,
            None => return 1.0,
        };
        let atr_pct = atr / mid;
        (atr_pct / 0.01).clamp(0.7, 1.8)
    }
}
