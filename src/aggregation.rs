//! The five on-disk aggregation methods, plus the reserved/invalid code
//! 0 accepted on read. A closed sum: no open dispatch.

use crate::error::{Result, WhisperError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationType {
    /// Code 0. Reserved/invalid for new files; accepted when reading so
    /// `open()` never panics on an old or foreign file.
    Unknown,
    Average,
    Sum,
    Last,
    Max,
    Min,
}

impl AggregationType {
    pub fn from_code(code: u32) -> Result<AggregationType> {
        match code {
            0 => Ok(AggregationType::Unknown),
            1 => Ok(AggregationType::Average),
            2 => Ok(AggregationType::Sum),
            3 => Ok(AggregationType::Last),
            4 => Ok(AggregationType::Max),
            5 => Ok(AggregationType::Min),
            other => Err(WhisperError::InvalidAggregationMethod(format!(
                "unknown aggregation code {other}"
            ))),
        }
    }

    pub fn to_code(self) -> u32 {
        match self {
            AggregationType::Unknown => 0,
            AggregationType::Average => 1,
            AggregationType::Sum => 2,
            AggregationType::Last => 3,
            AggregationType::Max => 4,
            AggregationType::Min => 5,
        }
    }

    pub fn from_name(name: &str) -> Result<AggregationType> {
        match name {
            "average" => Ok(AggregationType::Average),
            "sum" => Ok(AggregationType::Sum),
            "last" => Ok(AggregationType::Last),
            "max" => Ok(AggregationType::Max),
            "min" => Ok(AggregationType::Min),
            other => Err(WhisperError::InvalidConfiguration(format!(
                "unknown aggregation method '{other}'"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregationType::Unknown => "unknown",
            AggregationType::Average => "average",
            AggregationType::Sum => "sum",
            AggregationType::Last => "last",
            AggregationType::Max => "max",
            AggregationType::Min => "min",
        }
    }

    /// Applies this method to the known values of an aggregation window,
    /// `known` given in scan order (the order the window was walked in,
    /// oldest-slot-first) so that `Last` picks the highest-indexed known
    /// slot, not necessarily the largest timestamp.
    pub fn aggregate(self, known: &[f64]) -> Result<f64> {
        if known.is_empty() {
            return Err(WhisperError::InvalidAggregationMethod(
                "cannot aggregate an empty window".to_string(),
            ));
        }
        match self {
            AggregationType::Average => {
                let sum: f64 = known.iter().sum();
                Ok(sum / known.len() as f64)
            }
            AggregationType::Sum => Ok(known.iter().sum()),
            AggregationType::Last => Ok(*known.last().unwrap()),
            AggregationType::Max => Ok(known.iter().cloned().fold(f64::MIN, f64::max)),
            AggregationType::Min => Ok(known.iter().cloned().fold(f64::MAX, f64::min)),
            AggregationType::Unknown => Err(WhisperError::InvalidAggregationMethod(
                "aggregation method code 0 is reserved and cannot aggregate".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trip() {
        for code in 1..=5u32 {
            let method = AggregationType::from_code(code).unwrap();
            assert_eq!(method.to_code(), code);
        }
    }

    #[test]
    fn unknown_code_is_accepted_on_read() {
        assert_eq!(AggregationType::from_code(0).unwrap(), AggregationType::Unknown);
    }

    #[test]
    fn invalid_code_rejected() {
        assert!(AggregationType::from_code(6).is_err());
    }

    #[test]
    fn average_sum_last_max_min() {
        let vals = vec![10.0, 20.0, 30.0];
        assert_eq!(AggregationType::Average.aggregate(&vals).unwrap(), 20.0);
        assert_eq!(AggregationType::Sum.aggregate(&vals).unwrap(), 60.0);
        assert_eq!(AggregationType::Last.aggregate(&vals).unwrap(), 30.0);
        assert_eq!(AggregationType::Max.aggregate(&vals).unwrap(), 30.0);
        assert_eq!(AggregationType::Min.aggregate(&vals).unwrap(), 10.0);
    }

    #[test]
    fn unknown_cannot_aggregate() {
        assert!(AggregationType::Unknown.aggregate(&[1.0]).is_err());
    }
}
