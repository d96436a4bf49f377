//! Market data access port trait.

use crate::domain::error::StratlabError;
use crate::domain::price::PriceBar;
use crate::domain::series::ConditionSet;

/// Price bars for one symbol plus the boolean conditions computed on them.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub bars: Vec<PriceBar>,
    pub conditions: ConditionSet,
}

impl MarketData {
    pub fn condition_names(&self) -> Vec<&str> {
        crate::domain::expression_eval::condition_names(&self.conditions)
    }
}

pub trait DataPort {
    fn fetch_market_data(&self, symbol: &str) -> Result<MarketData, StratlabError>;
}
