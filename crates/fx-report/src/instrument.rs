//! The two currency pairs the report is built from.

use serde::Serialize;

/// A currency pair as the portal presents it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instrument {
    /// Display code, e.g. `USD/RUB`.
    pub code: String,
    /// Substring that identifies this pair's exported file name.
    pub marker: String,
    /// Text of the entry in the portal's instrument dropdown.
    pub selector_text: String,
}

impl Instrument {
    pub fn usd_rub() -> Self {
        Self {
            code: "USD/RUB".to_string(),
            marker: "USD_RUB".to_string(),
            selector_text: "USD/RUB - Доллар США к российскому рублю".to_string(),
        }
    }

    pub fn jpy_rub() -> Self {
        Self {
            code: "JPY/RUB".to_string(),
            marker: "JPY_RUB".to_string(),
            selector_text: "JPY/RUB - Японская йена к российскому рублю".to_string(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}
