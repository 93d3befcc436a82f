//! Display names for calibrated parameters

use std::collections::HashMap;

/// Display name for `key`, falling back to the key itself
pub fn parameter_label<'a>(names: &'a HashMap<String, String>, key: &'a str) -> &'a str {
    names.get(key).map(String::as_str).unwrap_or(key)
}

/// Display name for `key`, falling back to the key with underscores as spaces
pub fn readable_label(names: &HashMap<String, String>, key: &str) -> String {
    names
        .get(key)
        .cloned()
        .unwrap_or_else(|| key.replace('_', " "))
}

/// Target dispersion parameters are left out of parameter summaries
pub fn is_dispersion_parameter(key: &str) -> bool {
    key.contains("_dispersion")
}
