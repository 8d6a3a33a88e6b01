/// Bollinger Bands: SMA middle +/- `std_mult` population standard deviations.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub period: usize,
    pub std_mult: f64,
}

/// Band values aligned to the input closes; NaN until `period` values exist.
#[derive(Debug, Clone, PartialEq)]
pub struct BandSeries {
    pub middle: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerBands {
    pub fn new(period: usize, std_mult: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self { period, std_mult }
    }

    pub fn compute(&self, closes: &[f64]) -> BandSeries {
        let n = closes.len();
        let mut bands = BandSeries {
            middle: vec![f64::NAN; n],
            upper: vec![f64::NAN; n],
            lower: vec![f64::NAN; n],
        };
        if n < self.period {
            return bands;
        }

        for (end, window) in closes.windows(self.period).enumerate() {
            let i = end + self.period - 1;
            let mean = window.iter().sum::<f64>() / self.period as f64;
            let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.period as f64;
            let sd = var.sqrt();
            bands.middle[i] = mean;
            bands.upper[i] = mean + self.std_mult * sd;
            bands.lower[i] = mean - self.std_mult * sd;
        }
        bands
    }
}
