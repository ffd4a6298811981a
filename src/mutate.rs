//! Mutation model construction.
//!
//! A locus carries one mutation model per sex. The parser resolves each
//! model's kind and parameters from the file and calls [`build_matrix`] to
//! materialize the transition matrix; stationary stepwise models
//! additionally go through [`stabilize`], which is fallible by design (the
//! caller substitutes a fallback matrix and reports it when stabilization
//! fails).

use serde::{Deserialize, Serialize};

use crate::error::FamError;

/// The supported mutation model kinds. The stepwise variants of the file
/// format (codes 2, 3, and 4) all collapse to [`ModelKind::Stepwise`]; the
/// stationary flavour is tracked separately on [`MutationModel`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ModelKind {
    Equal,
    Proportional,
    Stepwise,
}

/// The model substituted when a declared stepwise model is structurally
/// incompatible with the observed allele set.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, clap::ValueEnum)]
pub enum FallbackModel {
    #[default]
    Equal,
    Proportional,
}

impl FallbackModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            FallbackModel::Equal => ModelKind::Equal,
            FallbackModel::Proportional => ModelKind::Proportional,
        }
    }
}

/// A row-stochastic allele transition matrix.
///
/// Row `i`, column `j` is the probability that a parental allele
/// `labels[i]` is transmitted as `labels[j]`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MutationMatrix {
    pub labels: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl MutationMatrix {
    pub fn n(&self) -> usize {
        self.labels.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i][j]
    }

    /// Whether `freqs` is a stationary distribution of this matrix.
    pub fn is_stationary(&self, freqs: &[f64], tol: f64) -> bool {
        let n = self.n();
        (0..n).all(|j| {
            let image: f64 = (0..n).map(|i| freqs[i] * self.rows[i][j]).sum();
            (image - freqs[j]).abs() <= tol
        })
    }
}

/// One sex's fully resolved mutation model.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MutationModel {
    pub kind: ModelKind,
    /// Set for the stationary stepwise variant (file model code 3).
    pub stationary: bool,
    pub rate: f64,
    pub rate2: f64,
    pub range: f64,
    pub matrix: MutationMatrix,
}

/// Build the transition matrix for a model kind over the given allele set.
///
/// `rate2` and `range` are only meaningful for stepwise models: `range` is
/// the geometric decay per integer step and `rate2` the total probability
/// of mutating to a microvariant (an allele with a different fractional
/// part).
pub fn build_matrix(
    kind: ModelKind,
    labels: &[String],
    freqs: &[f64],
    rate: f64,
    rate2: f64,
    range: f64,
) -> Result<MutationMatrix, FamError> {
    let n = labels.len();
    if n == 0 {
        return Err(FamError::InvalidMutationModel(
            "empty allele set".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&rate) {
        return Err(FamError::InvalidMutationModel(format!(
            "mutation rate {rate} outside [0, 1]"
        )));
    }
    let rows = match kind {
        ModelKind::Equal => equal_rows(n, rate),
        ModelKind::Proportional => proportional_rows(freqs, rate),
        ModelKind::Stepwise => stepwise_rows(labels, rate, rate2, range)?,
    };
    Ok(MutationMatrix {
        labels: labels.to_vec(),
        rows,
    })
}

fn equal_rows(n: usize, rate: f64) -> Vec<Vec<f64>> {
    if n == 1 {
        return vec![vec![1.0]];
    }
    let off = rate / (n as f64 - 1.0);
    (0..n)
        .map(|i| {
            (0..n)
                .map(|j| if i == j { 1.0 - rate } else { off })
                .collect()
        })
        .collect()
}

fn proportional_rows(freqs: &[f64], rate: f64) -> Vec<Vec<f64>> {
    let n = freqs.len();
    // The overall mutation rate is Σ f_i α (1 - f_i) = rate, so
    // α = rate / Σ f_i (1 - f_i). A single-allele locus cannot mutate.
    let denom: f64 = freqs.iter().map(|f| f * (1.0 - f)).sum();
    if denom == 0.0 {
        return (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
    }
    let alpha = rate / denom;
    (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    if i == j {
                        1.0 - alpha * (1.0 - freqs[i])
                    } else {
                        alpha * freqs[j]
                    }
                })
                .collect()
        })
        .collect()
}

fn stepwise_rows(
    labels: &[String],
    rate: f64,
    rate2: f64,
    range: f64,
) -> Result<Vec<Vec<f64>>, FamError> {
    let values: Vec<f64> = labels
        .iter()
        .map(|l| {
            l.parse::<f64>().map_err(|_| {
                FamError::InvalidMutationModel(format!(
                    "stepwise model requires numeric alleles, got '{l}'"
                ))
            })
        })
        .collect::<Result<_, _>>()?;
    if !(0.0 < range && range < 1.0) && values.len() > 1 {
        return Err(FamError::InvalidMutationModel(format!(
            "stepwise range {range} outside (0, 1)"
        )));
    }

    let n = values.len();
    let mut rows = vec![vec![0.0; n]; n];
    for i in 0..n {
        // Integer-distance neighbours share the allele's fractional part;
        // everything else is a microvariant.
        let mut integer_weights = vec![0.0; n];
        let mut micro_count = 0usize;
        let mut integer_total = 0.0;
        for j in 0..n {
            if i == j {
                continue;
            }
            let dist = (values[i] - values[j]).abs();
            if (dist - dist.round()).abs() < 1e-9 && dist.round() >= 1.0 {
                let w = range.powi(dist.round() as i32);
                integer_weights[j] = w;
                integer_total += w;
            } else {
                micro_count += 1;
            }
        }
        let step_mass = if integer_total > 0.0 { rate } else { 0.0 };
        let micro_mass = if micro_count > 0 { rate2 } else { 0.0 };
        for j in 0..n {
            if i == j {
                rows[i][j] = 1.0 - step_mass - micro_mass;
            } else if integer_weights[j] > 0.0 {
                rows[i][j] = step_mass * integer_weights[j] / integer_total;
            } else {
                rows[i][j] = micro_mass / micro_count.max(1) as f64;
            }
        }
        if rows[i][i] < 0.0 {
            return Err(FamError::InvalidMutationModel(format!(
                "stepwise rates {rate} + {rate2} exceed 1 for allele '{}'",
                labels[i]
            )));
        }
    }
    Ok(rows)
}

const STABILIZE_TOL: f64 = 1e-9;
const STABILIZE_MAX_ITER: usize = 1000;

/// Transform `matrix` so that `freqs` is a stationary distribution.
///
/// Off-diagonal mass into each allele is rescaled toward the target
/// frequency and diagonals re-normalized, iterating to a fixed point.
/// Fails when a diagonal entry would go negative or the iteration does
/// not converge; the caller is expected to fall back to a freshly built
/// non-stationary model and report the substitution.
pub fn stabilize(matrix: &MutationMatrix, freqs: &[f64]) -> Result<MutationMatrix, FamError> {
    let n = matrix.n();
    if freqs.len() != n {
        return Err(FamError::NotStabilizable(format!(
            "{} frequencies for a {n}x{n} matrix",
            freqs.len()
        )));
    }
    let mut current = matrix.clone();
    if current.is_stationary(freqs, STABILIZE_TOL) {
        return Ok(current);
    }

    for _ in 0..STABILIZE_MAX_ITER {
        let mut next = current.rows.clone();
        for j in 0..n {
            let image: f64 = (0..n).map(|i| freqs[i] * current.rows[i][j]).sum();
            if image <= 0.0 {
                return Err(FamError::NotStabilizable(format!(
                    "no probability mass flows into allele '{}'",
                    current.labels[j]
                )));
            }
            let factor = freqs[j] / image;
            for (i, next_row) in next.iter_mut().enumerate() {
                if i != j {
                    next_row[j] = current.rows[i][j] * factor;
                }
            }
        }
        for (i, next_row) in next.iter_mut().enumerate() {
            let off: f64 = next_row
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, v)| v)
                .sum();
            let diag = 1.0 - off;
            if diag < 0.0 {
                return Err(FamError::NotStabilizable(format!(
                    "diagonal entry for allele '{}' driven negative",
                    current.labels[i]
                )));
            }
            next_row[i] = diag;
        }
        current.rows = next;
        if current.is_stationary(freqs, STABILIZE_TOL) {
            return Ok(current);
        }
    }
    Err(FamError::NotStabilizable(
        "iteration did not converge".to_string(),
    ))
}
