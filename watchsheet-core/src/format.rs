//! Numeric normalization for provider strings.
//!
//! Provider numbers arrive as strings (`"4440000000000.000000"`, `"187.230000"`)
//! and are published as fixed-point text with two fractional digits. Rendering
//! uses Rust's `{:.2}`, which rounds the exact binary value of the `f64`
//! half-to-even. The magnitude unit is chosen from the unscaled value *before*
//! rounding, so `999_999_999_999.99` stays in billions and renders `1000.00`.

use crate::domain::NOT_AVAILABLE;
use serde::Serialize;
use std::fmt;

const TRILLION: f64 = 1e12;
const BILLION: f64 = 1e9;
const MILLION: f64 = 1e6;

/// Scale suffix of a formatted magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MagnitudeUnit {
    None,
    Million,
    Billion,
    Trillion,
}

impl MagnitudeUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            MagnitudeUnit::None => "",
            MagnitudeUnit::Million => "M",
            MagnitudeUnit::Billion => "B",
            MagnitudeUnit::Trillion => "T",
        }
    }
}

impl fmt::Display for MagnitudeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scaled value and its unit, e.g. `("4.44", Trillion)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Magnitude {
    pub value: String,
    pub unit: MagnitudeUnit,
}

impl Magnitude {
    fn not_available() -> Self {
        Self {
            value: NOT_AVAILABLE.to_string(),
            unit: MagnitudeUnit::None,
        }
    }

    /// `(value, unit)` as published in the output table.
    pub fn into_parts(self) -> (String, &'static str) {
        (self.value, self.unit.as_str())
    }
}

/// Parse a provider numeric string. Blank, malformed and non-finite input is `None`.
///
/// Digit separators are not accepted: `"1_000"` and `"1,000"` are malformed.
pub fn parse_numeric(raw: Option<&str>) -> Option<f64> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a raw market-cap string into a scaled value and unit.
///
/// Total over its input: anything that does not parse to a finite number
/// yields `("N/A", "")`.
pub fn format_magnitude(raw: Option<&str>) -> Magnitude {
    let Some(cap) = parse_numeric(raw) else {
        return Magnitude::not_available();
    };

    let (scaled, unit) = if cap >= TRILLION {
        (cap / TRILLION, MagnitudeUnit::Trillion)
    } else if cap >= BILLION {
        (cap / BILLION, MagnitudeUnit::Billion)
    } else if cap >= MILLION {
        (cap / MILLION, MagnitudeUnit::Million)
    } else {
        (cap, MagnitudeUnit::None)
    };

    Magnitude {
        value: format!("{scaled:.2}"),
        unit,
    }
}

/// Format a raw price as `$` + two decimals. `None` when it does not parse.
pub fn format_price(raw: Option<&str>) -> Option<String> {
    parse_numeric(raw).map(|price| format!("${price:.2}"))
}
