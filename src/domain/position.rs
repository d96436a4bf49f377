//! Directional position held by a strategy or portfolio.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Position {
    Long,
    #[default]
    Cash,
    Short,
}

impl Position {
    pub fn as_i8(self) -> i8 {
        match self {
            Position::Long => 1,
            Position::Cash => 0,
            Position::Short => -1,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.as_i8())
    }

    pub fn is_invested(self) -> bool {
        self != Position::Cash
    }
}

impl TryFrom<i8> for Position {
    type Error = i8;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Position::Long),
            0 => Ok(Position::Cash),
            -1 => Ok(Position::Short),
            other => Err(other),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Position::Long => "LONG",
            Position::Cash => "CASH",
            Position::Short => "SHORT",
        };
        f.write_str(s)
    }
}
