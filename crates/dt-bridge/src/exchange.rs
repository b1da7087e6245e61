//! Array exchange files
//!
//! The optimizer hands arrays over as files. Two encodings are understood:
//!
//! - **Csv**: a comma-separated float matrix (shape `[rows, cols]`), the
//!   layout the optimizer's own writer produces
//! - **Envelope**: JSON carrying the shape and element type next to the
//!   row-major payload, so a mismatched producer fails on read
//!
//! The encoding is picked from the file extension: `.json` is an envelope,
//! anything else is CSV.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use dt_core::table::Table;
use dt_core::{DompteurError, Result, persist};

/// Envelope layout version written and accepted
pub const ENVELOPE_VERSION: u32 = 1;

/// Element type tag of envelope payloads
pub const ENVELOPE_DTYPE: &str = "f64";

// ═══════════════════════════════════════════════════════════════════════════════
// ARRAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Row-major array with its original shape
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl ArrayData {
    /// Wrap `data`, checking it fills `shape`
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(DompteurError::shape(format!(
                "shape {:?} holds {} values, payload has {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array
    pub fn flat(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flattened payload
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same shape, new payload
    pub fn with_data(&self, data: Vec<f64>) -> Result<Self> {
        Self::new(self.shape.clone(), data)
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Rows and columns used for the CSV layout: the last axis becomes the
    /// columns, all leading axes fold into rows
    fn matrix_dims(&self) -> (usize, usize) {
        match self.shape.split_last() {
            None => (1, 1),
            Some((&cols, leading)) => (leading.iter().product(), cols),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORMATS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeFormat {
    Csv,
    Envelope,
}

impl ExchangeFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ExchangeFormat::Envelope,
            _ => ExchangeFormat::Csv,
        }
    }

    pub fn decode(&self, text: &str) -> Result<ArrayData> {
        match self {
            ExchangeFormat::Csv => {
                let table = Table::parse(text)?;
                let shape = vec![table.rows(), table.cols()];
                ArrayData::new(shape, table.into_values())
            }
            ExchangeFormat::Envelope => {
                let envelope: Envelope = serde_json::from_str(text)
                    .map_err(|e| DompteurError::Format(format!("invalid envelope: {}", e)))?;
                envelope.into_array()
            }
        }
    }

    pub fn encode(&self, array: &ArrayData) -> Result<String> {
        match self {
            ExchangeFormat::Csv => {
                let (rows, cols) = array.matrix_dims();
                Ok(Table::new(rows, cols, array.data.clone())?.to_csv())
            }
            ExchangeFormat::Envelope => serde_json::to_string(&Envelope::from_array(array)?)
                .map_err(|e| DompteurError::Format(format!("cannot encode envelope: {}", e))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    dtype: String,
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Envelope {
    /// JSON has no NaN or infinity; serde_json would write them as `null`
    fn from_array(array: &ArrayData) -> Result<Self> {
        if let Some(index) = array.data.iter().position(|v| !v.is_finite()) {
            return Err(DompteurError::Format(format!(
                "envelope cannot hold non-finite value {} at index {}",
                array.data[index], index
            )));
        }
        Ok(Self {
            version: ENVELOPE_VERSION,
            dtype: ENVELOPE_DTYPE.to_string(),
            shape: array.shape.clone(),
            data: array.data.clone(),
        })
    }

    fn into_array(self) -> Result<ArrayData> {
        if self.version != ENVELOPE_VERSION {
            return Err(DompteurError::Format(format!(
                "envelope version {} not supported (expected {})",
                self.version, ENVELOPE_VERSION
            )));
        }
        if self.dtype != ENVELOPE_DTYPE {
            return Err(DompteurError::Format(format!(
                "envelope dtype `{}` not supported (expected `{}`)",
                self.dtype, ENVELOPE_DTYPE
            )));
        }
        ArrayData::new(self.shape, self.data)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILES
// ═══════════════════════════════════════════════════════════════════════════════

/// Read an exchange file in the encoding its extension selects
pub fn read_array<P: AsRef<Path>>(path: P) -> Result<ArrayData> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    ExchangeFormat::for_path(path).decode(&text).map_err(|e| match e {
        DompteurError::Format(msg) => DompteurError::Format(format!("{}: {}", path.display(), msg)),
        DompteurError::Shape(msg) => DompteurError::Shape(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Atomically replace an exchange file
pub fn write_array<P: AsRef<Path>>(path: P, array: &ArrayData) -> Result<()> {
    let path = path.as_ref();
    let text = ExchangeFormat::for_path(path).encode(array)?;
    persist::write_atomic(path, text.as_bytes())
}
