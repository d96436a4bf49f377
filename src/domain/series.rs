//! Date-aligned series and the condition/position aliases built on them.

use crate::domain::error::StratlabError;
use crate::domain::position::Position;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// A column of values keyed by strictly ascending dates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Series<T> {
    dates: Vec<NaiveDate>,
    values: Vec<T>,
}

pub type ConditionSeries = Series<bool>;
pub type PositionSeries = Series<Position>;
pub type ScoreSeries = Series<f64>;

/// Named condition series sharing one date axis.
pub type ConditionSet = HashMap<String, ConditionSeries>;

impl<T> Series<T> {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<T>) -> Result<Self, StratlabError> {
        if dates.len() != values.len() {
            return Err(StratlabError::schema(format!(
                "series has {} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(StratlabError::schema(format!(
                "series dates must be strictly ascending ({} then {})",
                w[0], w[1]
            )));
        }
        Ok(Self { dates, values })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&T> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| &self.values[i])
    }

    pub fn same_axis<U>(&self, other: &Series<U>) -> bool {
        self.dates == other.dates
    }

    pub fn map<U, F>(&self, f: F) -> Series<U>
    where
        F: FnMut(&T) -> U,
    {
        Series {
            dates: self.dates.clone(),
            values: self.values.iter().map(f).collect(),
        }
    }
}

impl<T: Copy> Series<T> {
    pub fn value_at(&self, date: NaiveDate) -> Option<T> {
        self.get(date).copied()
    }
}

/// Dates present in every series, ascending.
pub fn intersect_dates<'a, T: 'a, I>(series: I) -> Vec<NaiveDate>
where
    I: IntoIterator<Item = &'a Series<T>>,
{
    let mut iter = series.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let mut common: BTreeSet<NaiveDate> = first.dates.iter().copied().collect();
    for s in iter {
        let dates: BTreeSet<NaiveDate> = s.dates.iter().copied().collect();
        common = common.intersection(&dates).copied().collect();
    }
    common.into_iter().collect()
}
