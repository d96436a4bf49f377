//! Price bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// A bar is tradeable when its close is a finite, positive price.
    pub fn has_valid_close(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}

/// Check that bar dates are strictly ascending (unique and ordered).
pub fn dates_strictly_ascending(bars: &[PriceBar]) -> bool {
    bars.windows(2).all(|w| w[0].date < w[1].date)
}
