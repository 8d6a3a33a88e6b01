/// Exponential Moving Average over a close series.
///
/// Seeded with the SMA of the first `period` values, then
/// `ema = prev + alpha * (close - prev)` with `alpha = 2 / (period + 1)`, which
/// holds a constant series exactly.
/// Output is aligned to the input; the warm-up prefix is NaN.
#[derive(Debug, Clone)]
pub struct Ema {
    pub period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self { period }
    }

    /// Compute the full EMA series from close prices (oldest first).
    /// A NaN after the seed taints every later value.
    pub fn compute(&self, closes: &[f64]) -> Vec<f64> {
        let mut out = vec![f64::NAN; closes.len()];
        if closes.len() < self.period {
            return out;
        }

        let seed_window = &closes[..self.period];
        if seed_window.iter().any(|v| v.is_nan()) {
            return out;
        }
        let k = 2.0 / (self.period as f64 + 1.0);
        let mut ema_val = seed_window.iter().sum::<f64>() / self.period as f64;
        out[self.period - 1] = ema_val;

        for (i, &price) in closes.iter().enumerate().skip(self.period) {
            if price.is_nan() {
                break;
            }
            ema_val += k * (price - ema_val);
            out[i] = ema_val;
        }
        out
    }
}
