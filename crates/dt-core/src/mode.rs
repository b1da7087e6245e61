//! Filter strength (φ)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DompteurError;

/// Selects the code path of one invocation.
///
/// `Identity` is a true passthrough: no transform runs and no threshold
/// surface is consulted. `Masked(phi)` shifts the hearing thresholds by `phi`
/// dB before the masking decision.
///
/// The textual form is `None` for identity and a signed integer otherwise,
/// which is what the `PHI` environment variable carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterMode {
    Identity,
    Masked(i32),
}

impl FilterMode {
    /// φ, if filtering is enabled
    pub fn phi(self) -> Option<i32> {
        match self {
            Self::Identity => None,
            Self::Masked(phi) => Some(phi),
        }
    }

    pub fn is_identity(self) -> bool {
        matches!(self, Self::Identity)
    }
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::Identity
    }
}

impl From<Option<i32>> for FilterMode {
    fn from(phi: Option<i32>) -> Self {
        match phi {
            Some(phi) => Self::Masked(phi),
            None => Self::Identity,
        }
    }
}

impl FromStr for FilterMode {
    type Err = DompteurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(Self::Identity);
        }
        s.parse::<i32>()
            .map(Self::Masked)
            .map_err(|_| DompteurError::Config(format!("phi must be `None` or an integer, got `{}`", s)))
    }
}

impl TryFrom<String> for FilterMode {
    type Error = DompteurError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FilterMode> for String {
    fn from(mode: FilterMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "None"),
            Self::Masked(phi) => write!(f, "{}", phi),
        }
    }
}
