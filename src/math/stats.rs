//! Residual statistics for comparing two spectra sampled on the same grid.

use std::fmt;

use ndarray::{Array1, ArrayBase, Data, Ix1, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{AsadError, Result};

/// Per-element squared difference `(xs[i] - ys[i])^2`.
pub fn chi_squared_elementwise<S1, S2>(xs: &ArrayBase<S1, Ix1>, ys: &ArrayBase<S2, Ix1>) -> Result<Array1<f64>>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    ensure_same_len(xs.len(), ys.len())?;
    Ok(Zip::from(xs).and(ys).map_collect(|&x, &y| (x - y).powi(2)))
}

/// Sum of squared differences. No variance weighting is applied.
pub fn chi_squared_total<S1, S2>(xs: &ArrayBase<S1, Ix1>, ys: &ArrayBase<S2, Ix1>) -> Result<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    Ok(chi_squared_elementwise(xs, ys)?.sum())
}

/// Two-sample Kolmogorov–Smirnov distance between the cumulative flux
/// distributions of `xs` and `ys`.
pub fn ks_two_sample<S1, S2>(xs: &ArrayBase<S1, Ix1>, ys: &ArrayBase<S2, Ix1>) -> Result<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    ensure_same_len(xs.len(), ys.len())?;
    let cx = cumulative_fraction(xs)?;
    let cy = cumulative_fraction(ys)?;
    Ok(Zip::from(&cx)
        .and(&cy)
        .fold(0.0_f64, |acc, &a, &b| acc.max((a - b).abs())))
}

fn cumulative_fraction<S>(xs: &ArrayBase<S, Ix1>) -> Result<Array1<f64>>
where
    S: Data<Elem = f64>,
{
    if xs.is_empty() {
        return Err(AsadError::EmptyInput("KS statistic", 1));
    }
    let mut running = 0.0;
    let mut cumsum = xs.mapv(|x| {
        running += x;
        running
    });
    let total = cumsum[cumsum.len() - 1];
    if total == 0.0 {
        return Err(AsadError::ZeroTotalFlux);
    }
    cumsum.mapv_inplace(|c| c / total);
    Ok(cumsum)
}

fn ensure_same_len(left: usize, right: usize) -> Result<()> {
    if left != right {
        return Err(AsadError::LengthMismatch { left, right });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// StatTest – selectable goodness-of-fit statistic
// ---------------------------------------------------------------------------

/// Statistic used to score an observation row against a model row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatTest {
    #[default]
    #[serde(rename = "chi-squared")]
    ChiSquared,
    #[serde(rename = "ks")]
    KolmogorovSmirnov,
}

impl StatTest {
    pub fn apply<S1, S2>(self, xs: &ArrayBase<S1, Ix1>, ys: &ArrayBase<S2, Ix1>) -> Result<f64>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
    {
        match self {
            StatTest::ChiSquared => chi_squared_total(xs, ys),
            StatTest::KolmogorovSmirnov => ks_two_sample(xs, ys),
        }
    }
}

impl fmt::Display for StatTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatTest::ChiSquared => write!(f, "chi-squared"),
            StatTest::KolmogorovSmirnov => write!(f, "ks"),
        }
    }
}
