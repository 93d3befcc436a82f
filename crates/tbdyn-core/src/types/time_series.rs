use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Values observed at strictly increasing time points
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeSeries")]
pub struct TimeSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawTimeSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TryFrom<RawTimeSeries> for TimeSeries {
    type Error = ModelError;

    fn try_from(raw: RawTimeSeries) -> Result<Self> {
        Self::new(raw.times, raw.values)
    }
}

impl TimeSeries {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(ModelError::configuration(format!(
                "time series has {} times but {} values",
                times.len(),
                values.len()
            )));
        }
        if times.iter().chain(&values).any(|x| !x.is_finite()) {
            return Err(ModelError::configuration("time series entries must be finite"));
        }
        if times.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(ModelError::configuration(
                "time series times must be strictly increasing",
            ));
        }
        Ok(Self { times, values })
    }

    /// Build from `(time, value)` pairs
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        let (times, values) = pairs.iter().copied().unzip();
        Self::new(times, values)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_validates() {
        let series: TimeSeries =
            serde_json::from_str(r#"{"times": [2015, 2018], "values": [0.1, 0.2]}"#).unwrap();
        assert_eq!(series.iter().collect::<Vec<_>>(), vec![(2015.0, 0.1), (2018.0, 0.2)]);

        let unsorted = serde_json::from_str::<TimeSeries>(r#"{"times": [2018, 2015], "values": [0.1, 0.2]}"#);
        assert!(unsorted.is_err());
        assert!(TimeSeries::new(vec![1.0], vec![]).is_err());
    }
}
