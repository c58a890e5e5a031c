//! Plain-text matrix dumps and binary persistence of PCA results.

use crate::pca::RandomPcaOutput;
use crate::ThreadSafeStdError;
use ndarray::{Array2, ArrayView2};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Writes `matrix` as text: one row per line, values separated by single spaces.
///
/// Values use Rust's shortest round-trip formatting, so `load_text` restores them exactly.
pub fn save_text<P: AsRef<Path>>(path: P, matrix: &ArrayView2<f64>) -> Result<(), ThreadSafeStdError> {
    let file = File::create(path.as_ref())
        .map_err(|e| format!("Failed to create file at {:?}: {}", path.as_ref(), e))?;
    let mut writer = BufWriter::new(file);
    for row in matrix.rows() {
        let mut first = true;
        for value in row.iter() {
            if !first {
                writer.write_all(b" ")?;
            }
            write!(writer, "{}", value)?;
            first = false;
        }
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a matrix written by [`save_text`]. Blank lines are skipped; rows must all
/// have the same number of whitespace-separated values.
pub fn load_text<P: AsRef<Path>>(path: P) -> Result<Array2<f64>, ThreadSafeStdError> {
    let file = File::open(path.as_ref())
        .map_err(|e| format!("Failed to open file at {:?}: {}", path.as_ref(), e))?;
    let reader = BufReader::new(file);

    let mut values: Vec<f64> = Vec::new();
    let mut n_cols: Option<usize> = None;
    let mut n_rows = 0;
    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|e| format!("Line {}: cannot parse {:?}: {}", line_idx + 1, token, e))
            })
            .collect::<Result<Vec<f64>, String>>()?;
        match n_cols {
            None => n_cols = Some(row.len()),
            Some(expected) if expected != row.len() => {
                return Err(format!(
                    "Line {} has {} values, expected {}.",
                    line_idx + 1,
                    row.len(),
                    expected
                )
                .into());
            }
            Some(_) => {}
        }
        values.extend(row);
        n_rows += 1;
    }
    let matrix = Array2::from_shape_vec((n_rows, n_cols.unwrap_or(0)), values)?;
    Ok(matrix)
}

impl RandomPcaOutput {
    /// Saves the result with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ThreadSafeStdError> {
        let file = File::create(path.as_ref())
            .map_err(|e| format!("Failed to create file at {:?}: {}", path.as_ref(), e))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| format!("Failed to serialize PCA output: {}", e))?;
        Ok(())
    }

    /// Loads a result saved with [`save`](Self::save) and checks that its parts agree
    /// on the number of components and samples.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ThreadSafeStdError> {
        let file = File::open(path.as_ref())
            .map_err(|e| format!("Failed to open file at {:?}: {}", path.as_ref(), e))?;
        let mut reader = BufReader::new(file);
        let output: RandomPcaOutput =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| format!("Failed to deserialize PCA output: {}", e))?;

        let k = output.eigenvalues.len();
        let inconsistent = output.pve.len() != k
            || output.scores.ncols() != k
            || output.left_vectors.ncols() != k
            || output.loadings.as_ref().is_some_and(|v| v.ncols() != k)
            || output.scores.nrows() != output.n_samples;
        if inconsistent {
            return Err(format!(
                "Loaded PCA output is inconsistent: {} eigenvalues, pve {}, scores {:?}, U {:?}, N {}.",
                k,
                output.pve.len(),
                output.scores.dim(),
                output.left_vectors.dim(),
                output.n_samples
            )
            .into());
        }
        Ok(output)
    }
}
