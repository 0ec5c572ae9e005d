use std::collections::VecDeque;

/// Simple moving average over a fixed window.
/// Reports a value only once the window is full.
pub struct Sma {
    period: usize,
    prices: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prices: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    /// O(1): evicts the oldest sample once the window is full.
    #[inline]
    pub fn update(&mut self, price: f64) {
        if self.prices.len() == self.period {
            if let Some(old) = self.prices.pop_front() {
                self.sum -= old;
            }
        }
        self.prices.push_back(price);
        self.sum += price;
    }

    #[inline]
    pub fn value(&self) -> Option<f64> {
        if self.prices.len() == self.period {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }

    #[inline]
    pub fn initialized(&self) -> bool {
        self.prices.len() == self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_warmup() {
        let mut sma = Sma::new(3);
        sma.update(1.0);
        sma.update(2.0);
        assert!(sma.value().is_none(), "Not initialized before full window");
        sma.update(3.0);
        assert!(sma.initialized());
        assert!((sma.value().unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sma_rolls_window() {
        let mut sma = Sma::new(3);
        for p in [1.0, 2.0, 3.0, 10.0] {
            sma.update(p);
        }
        // Window is now [2, 3, 10]
        assert!((sma.value().unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_sma_constant_series() {
        let mut sma = Sma::new(21);
        for _ in 0..100 {
            sma.update(150.25);
        }
        assert!((sma.value().unwrap() - 150.25).abs() < 1e-9);
    }
}
