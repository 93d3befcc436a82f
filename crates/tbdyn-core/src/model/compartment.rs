use std::collections::BTreeMap;
use std::fmt;

/// Filter over stratifications, e.g. `{"age": "15", "organ": "smear_positive"}`
pub type StrataFilter = BTreeMap<String, String>;

/// Build a [`StrataFilter`] from `(stratification, stratum)` pairs
pub fn strata_filter(pairs: &[(&str, &str)]) -> StrataFilter {
    pairs
        .iter()
        .map(|(stratification, stratum)| (stratification.to_string(), stratum.to_string()))
        .collect()
}

/// A compartment after stratification: the base name plus the stratum it
/// belongs to in each stratification that covers it, in application order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompartmentId {
    name: String,
    strata: Vec<(String, String)>,
}

impl CompartmentId {
    /// An unstratified compartment
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strata: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strata(&self) -> &[(String, String)] {
        &self.strata
    }

    /// The stratum of this compartment in the given stratification
    pub fn stratum(&self, stratification: &str) -> Option<&str> {
        self.strata
            .iter()
            .find(|(name, _)| name == stratification)
            .map(|(_, stratum)| stratum.as_str())
    }

    /// Copy of this compartment placed in a stratum of a further stratification
    pub fn with_stratum(&self, stratification: &str, stratum: &str) -> Self {
        let mut strata = self.strata.clone();
        strata.push((stratification.to_string(), stratum.to_string()));
        Self {
            name: self.name.clone(),
            strata,
        }
    }

    /// True when the compartment is in every stratum named by the filter.
    ///
    /// A compartment not covered by a filtered stratification does not match.
    pub fn matches(&self, filter: &StrataFilter) -> bool {
        filter
            .iter()
            .all(|(stratification, stratum)| self.stratum(stratification) == Some(stratum.as_str()))
    }

    /// Number of filter conditions satisfied, or `None` if any is violated
    pub(crate) fn match_specificity(&self, filter: &StrataFilter) -> Option<usize> {
        self.matches(filter).then_some(filter.len())
    }
}

impl fmt::Display for CompartmentId {
    /// `infectiousXage_15Xorgan_smear_positive`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (stratification, stratum) in &self.strata {
            write!(f, "X{}_{}", stratification, stratum)?;
        }
        Ok(())
    }
}
