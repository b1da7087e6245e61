//! Comma-separated float matrices
//!
//! Both the threshold surfaces written by the estimator and the arrays
//! exchanged with the external optimizer use the same layout: one matrix row
//! per line, values separated by commas. The optimizer's writer terminates
//! each row with a trailing comma, which is accepted and ignored.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::{DompteurError, Result, persist};

/// Row-major float matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Table {
    /// Create a table, checking that `values` fills `rows × cols`
    pub fn new(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self> {
        if rows * cols != values.len() {
            return Err(DompteurError::shape(format!(
                "{} values cannot fill a {}x{} table",
                values.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, values })
    }

    /// Parse comma-separated text. Blank lines are skipped; rows of unequal
    /// length are a shape error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut rows = 0;
        let mut cols = None;
        let mut values = Vec::new();

        for (line_idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let line = line.strip_suffix(',').unwrap_or(line);
            let mut count = 0;
            for cell in line.split(',') {
                let cell = cell.trim();
                let value = cell.parse::<f64>().map_err(|_| {
                    DompteurError::Format(format!(
                        "line {}: `{}` is not a number",
                        line_idx + 1,
                        cell
                    ))
                })?;
                values.push(value);
                count += 1;
            }

            match cols {
                None => cols = Some(count),
                Some(expected) if expected != count => {
                    return Err(DompteurError::shape(format!(
                        "line {} has {} columns, expected {}",
                        line_idx + 1,
                        count,
                        expected
                    )));
                }
                Some(_) => {}
            }
            rows += 1;
        }

        Ok(Self {
            rows,
            cols: cols.unwrap_or(0),
            values,
        })
    }

    /// Read and parse a file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| match e {
            DompteurError::Format(msg) => DompteurError::Format(format!("{}: {}", path.display(), msg)),
            DompteurError::Shape(msg) => DompteurError::Shape(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Render as comma-separated text, one row per line.
    ///
    /// Values use Rust's shortest round-trip exponent form, so reading the
    /// text back reproduces every value bit for bit.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(self.values.len() * 12);
        for row in 0..self.rows {
            for (i, value) in self.row(row).iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{:e}", value);
            }
            out.push('\n');
        }
        out
    }

    /// Atomically replace `path` with this table
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persist::write_atomic(path.as_ref(), self.to_csv().as_bytes())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One row as a slice
    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.cols..(row + 1) * self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}
