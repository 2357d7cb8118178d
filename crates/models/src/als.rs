//! Latent-factor model for implicit feedback, fitted by alternating least squares.
//!
//! Each interaction weight `r` becomes a confidence `1 + alpha * r` on a
//! binary preference. Every half-step solves one regularized least-squares
//! system per row:
//!
//! ```text
//! (YᵀY + Yᵀ(Cᵤ - I)Y + λI) xᵤ = YᵀCᵤp(u)
//! ```
//!
//! `YᵀY` is shared by all rows, so only the observed cells are visited per
//! row. Rows are solved in parallel with rayon.
//!
//! There is no incremental primitive: a partial run refits on the extended
//! matrix. At serving time the user vector is re-solved from the live
//! interaction row, so interactions logged after the last training run
//! already move the ranking.

use crate::error::{ModelError, Result};
use crate::family::Family;
use crate::features::ItemFeatureMatrix;
use crate::linalg::solve_cholesky;
use crate::traits::ModelFamily;
use data_loader::InteractionMatrix;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlsConfig {
    /// Number of latent factors
    pub factors: usize,
    pub iterations: usize,
    /// L2 penalty (lambda)
    pub regularization: f32,
    /// Confidence scaling for implicit weights
    pub alpha: f32,
    /// Seed of the factor initialization
    pub seed: u64,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            factors: 20,
            iterations: 10,
            regularization: 0.01,
            alpha: 40.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlsModel {
    config: AlsConfig,
    /// [num_users x factors]
    user_factors: Array2<f32>,
    /// [num_items x factors]
    item_factors: Array2<f32>,
}

impl AlsModel {
    pub fn new(config: AlsConfig) -> Self {
        let k = config.factors;
        Self {
            config,
            user_factors: Array2::zeros((0, k)),
            item_factors: Array2::zeros((0, k)),
        }
    }

    pub fn config(&self) -> &AlsConfig {
        &self.config
    }

    pub fn user_factors(&self) -> &Array2<f32> {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &Array2<f32> {
        &self.item_factors
    }

    /// Solve a user vector against the current item factors.
    ///
    /// Cells whose item is outside the fitted item range are ignored.
    pub fn user_vector(&self, user_row: &[(usize, f32)]) -> Result<Array1<f32>> {
        let known: Vec<(usize, f32)> = user_row
            .iter()
            .copied()
            .filter(|&(item, weight)| item < self.item_factors.nrows() && weight > 0.0)
            .collect();
        let gram = gram(&self.item_factors);
        solve_row(&known, &self.item_factors, &gram, &self.config)
    }

    /// Weighted squared error of the binary preferences over observed cells
    fn observed_loss(&self, rows: &[Vec<(usize, f32)>]) -> f32 {
        let mut loss = 0.0;
        let mut count = 0usize;
        for (u, row) in rows.iter().enumerate() {
            for &(i, r) in row {
                let confidence = 1.0 + self.config.alpha * r;
                let prediction = self.user_factors.row(u).dot(&self.item_factors.row(i));
                loss += confidence * (1.0 - prediction).powi(2);
                count += 1;
            }
        }
        if count > 0 { loss / count as f32 } else { 0.0 }
    }
}

impl ModelFamily for AlsModel {
    fn family(&self) -> Family {
        Family::Als
    }

    fn excludes_row_items(&self) -> bool {
        true
    }

    #[instrument(skip_all, fields(nnz = matrix.nnz()))]
    fn fit_full(
        &mut self,
        matrix: &InteractionMatrix,
        _features: &ItemFeatureMatrix,
    ) -> Result<()> {
        if matrix.nnz() == 0 {
            return Err(ModelError::EmptyTrainingData { family: "als" });
        }

        let (num_users, num_items) = matrix.shape();
        let k = self.config.factors;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut user_factors =
            Array2::from_shape_fn((num_users, k), |_| rng.random_range(-0.1f32..0.1));
        let mut item_factors =
            Array2::from_shape_fn((num_items, k), |_| rng.random_range(-0.1f32..0.1));

        let user_rows: Vec<Vec<(usize, f32)>> =
            (0..num_users).map(|u| matrix.csr.row(u).collect()).collect();
        let item_columns = matrix.csr.columns();

        for iteration in 0..self.config.iterations {
            user_factors = solve_all(&user_rows, &item_factors, &self.config)?;
            item_factors = solve_all(&item_columns, &user_factors, &self.config)?;
            debug!("ALS iteration {} done", iteration);
        }

        self.user_factors = user_factors;
        self.item_factors = item_factors;
        debug!("ALS observed loss = {:.4}", self.observed_loss(&user_rows));
        Ok(())
    }

    fn score(&self, user_idx: usize, user_row: &[(usize, f32)]) -> Result<Vec<f32>> {
        let has_live_row = user_row
            .iter()
            .any(|&(item, weight)| item < self.item_factors.nrows() && weight > 0.0);

        let user = if has_live_row {
            self.user_vector(user_row)?
        } else if user_idx < self.user_factors.nrows() {
            self.user_factors.row(user_idx).to_owned()
        } else {
            Array1::zeros(self.config.factors)
        };

        Ok(self.item_factors.dot(&user).to_vec())
    }
}

/// YᵀY in double precision
fn gram(fixed: &Array2<f32>) -> Array2<f64> {
    let fixed = fixed.mapv(f64::from);
    fixed.t().dot(&fixed)
}

/// Solve every row of one half-step in parallel
fn solve_all(
    rows: &[Vec<(usize, f32)>],
    fixed: &Array2<f32>,
    config: &AlsConfig,
) -> Result<Array2<f32>> {
    let gram = gram(fixed);
    let solved = rows
        .par_iter()
        .map(|row| solve_row(row, fixed, &gram, config))
        .collect::<Result<Vec<_>>>()?;

    let mut factors = Array2::zeros((rows.len(), config.factors));
    for (idx, vector) in solved.iter().enumerate() {
        factors.row_mut(idx).assign(vector);
    }
    Ok(factors)
}

fn solve_row(
    row: &[(usize, f32)],
    fixed: &Array2<f32>,
    gram: &Array2<f64>,
    config: &AlsConfig,
) -> Result<Array1<f32>> {
    let k = config.factors;
    if row.is_empty() {
        return Ok(Array1::zeros(k));
    }

    let alpha = f64::from(config.alpha);
    let mut a = gram.clone();
    let mut b = Array1::<f64>::zeros(k);

    for &(j, r) in row {
        let y = fixed.row(j);
        let confidence = 1.0 + alpha * f64::from(r);
        for p in 0..k {
            let yp = f64::from(y[p]);
            b[p] += confidence * yp;
            for q in 0..k {
                a[[p, q]] += (confidence - 1.0) * yp * f64::from(y[q]);
            }
        }
    }

    for p in 0..k {
        a[[p, p]] += f64::from(config.regularization);
    }

    let x = solve_cholesky(&a, &b)?;
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Numerical("non-finite ALS factor".to_string()));
    }
    Ok(x.mapv(|v| v as f32))
}
