//! Sorted-grid search and fixed-window block averaging.
//!
//! The resamplers here do not interpolate. Each output sample is the mean of
//! `nsample = floor(2 * sample_step - 1)` consecutive inputs starting at
//! `trunc(i * sample_step)`, so neighbouring windows overlap by roughly half.
//! When `interp / step` is not an integer the window starts drift with the
//! truncation; pick `interp` as a multiple of `step` to keep them aligned.

pub mod stats;

use ndarray::{s, Array1, Array2, ArrayBase, ArrayView2, Data, Ix1, Ix2, Zip};

use crate::error::{AsadError, Result};

/// Index of the first element of the ascending `xs` that is `>= value`.
///
/// Returns `xs.len()` when every element is smaller than `value`.
pub fn search_sorted<S>(xs: &ArrayBase<S, Ix1>, value: f64) -> usize
where
    S: Data<Elem = f64>,
{
    let (mut lo, mut hi) = (0, xs.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if xs[mid] < value {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

// ---------------------------------------------------------------------------
// ResampleWindow – the stride / width pair shared by every resampler
// ---------------------------------------------------------------------------

/// Window geometry derived from a target spacing `interp` and the current
/// spacing `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleWindow {
    /// `interp / step`, the stride between window starts.
    pub sample_step: f64,
    /// Number of inputs averaged per output sample.
    pub nsample: usize,
    interp: f64,
    step: f64,
}

impl ResampleWindow {
    /// Validate `interp` and `step` for an input of `len` samples.
    pub fn new(interp: f64, step: f64, len: usize) -> Result<Self> {
        let valid = interp.is_finite() && step.is_finite() && step > 0.0 && interp >= step;
        if !valid {
            return Err(AsadError::InvalidResampleParameters { interp, step, len });
        }
        let sample_step = interp / step;
        if !sample_step.is_finite() {
            return Err(AsadError::InvalidResampleParameters { interp, step, len });
        }
        Ok(Self {
            sample_step,
            nsample: (2.0 * sample_step - 1.0).floor() as usize,
            interp,
            step,
        })
    }

    /// Start offset of window `i`.
    pub fn offset(&self, i: usize) -> usize {
        (i as f64 * self.sample_step) as usize
    }

    /// `floor(len / sample_step) - margin`, failing when nothing is left.
    pub fn output_len(&self, len: usize, margin: usize) -> Result<usize> {
        let blocks = (len as f64 / self.sample_step).floor() as usize;
        match blocks.checked_sub(margin) {
            Some(count) if count > 0 => Ok(count),
            _ => Err(AsadError::InvalidResampleParameters {
                interp: self.interp,
                step: self.step,
                len,
            }),
        }
    }

    /// Check that the windows for `count` outputs stay inside `len` inputs.
    ///
    /// Offsets grow with the output index, so only the last window matters.
    pub fn check_bounds(&self, count: usize, len: usize) -> Result<()> {
        let Some(last) = count.checked_sub(1) else {
            return Ok(());
        };
        let start = self.offset(last);
        match start.checked_add(self.nsample) {
            Some(end) if end <= len => Ok(()),
            end => Err(AsadError::WindowOutOfBounds {
                start,
                end: end.unwrap_or(usize::MAX),
                len,
            }),
        }
    }

    /// Mean of window `i` over `xs`. Callers check bounds first.
    fn mean_at<S>(&self, xs: &ArrayBase<S, Ix1>, i: usize) -> f64
    where
        S: Data<Elem = f64>,
    {
        let start = self.offset(i);
        let total: f64 = xs.slice(s![start..start + self.nsample]).sum();
        total / self.nsample as f64
    }
}

// ---------------------------------------------------------------------------
// Wavelength resampling
// ---------------------------------------------------------------------------

/// Block-average a wavelength grid onto spacing `interp`.
///
/// Produces `floor(len / sample_step) - 1` samples. `interp == step` returns
/// a copy of `xs`.
pub fn wavelength_resample<S>(xs: &ArrayBase<S, Ix1>, interp: f64, step: f64) -> Result<Array1<f64>>
where
    S: Data<Elem = f64>,
{
    let window = ResampleWindow::new(interp, step, xs.len())?;
    if interp == step {
        return Ok(xs.to_owned());
    }
    let count = window.output_len(xs.len(), 1)?;
    window.check_bounds(count, xs.len())?;
    Ok(Array1::from_shape_fn(count, |i| window.mean_at(xs, i)))
}

/// Like [`wavelength_resample`], but keeps `xs[0]` as an exact first sample.
///
/// Windows are taken over `xs[1..]` and only `floor(len / sample_step) - 3`
/// of them are averaged, so the result has one more element than that.
pub fn wavelength_resample_edge_aware<S>(
    xs: &ArrayBase<S, Ix1>,
    interp: f64,
    step: f64,
) -> Result<Array1<f64>>
where
    S: Data<Elem = f64>,
{
    let window = ResampleWindow::new(interp, step, xs.len())?;
    if interp == step {
        return Ok(xs.to_owned());
    }
    let count = window.output_len(xs.len(), 3)?;
    let tail = xs.slice(s![1..]);
    window.check_bounds(count, tail.len())?;

    let mut result = Array1::zeros(count + 1);
    result[0] = xs[0];
    for i in 0..count {
        result[i + 1] = window.mean_at(&tail, i);
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Flux resampling
// ---------------------------------------------------------------------------

/// Block-average every row of `flux`, keeping the column count unchanged.
///
/// Column `j` of each output row is the mean of the window anchored at
/// `trunc(j * sample_step)`. Rows too short for a single window fail like
/// [`wavelength_resample`]. Otherwise, with any real downsampling the trailing
/// windows run past the row, which is reported as
/// [`AsadError::WindowOutOfBounds`] before anything is computed. Use [`flux_resample_aligned`] to get columns
/// that line up with [`wavelength_resample`].
pub fn flux_resample<S>(flux: &ArrayBase<S, Ix2>, interp: f64, step: f64) -> Result<Array2<f64>>
where
    S: Data<Elem = f64>,
{
    let ncols = flux.ncols();
    let window = ResampleWindow::new(interp, step, ncols)?;
    if interp == step {
        return Ok(flux.to_owned());
    }
    window.output_len(ncols, 1)?;
    window.check_bounds(ncols, ncols)?;
    Ok(resample_rows(flux.view(), &window, ncols, false))
}

/// Block-average every row of `flux` to `floor(ncols / sample_step) - 1`
/// columns, matching the length produced by [`wavelength_resample`].
pub fn flux_resample_aligned<S>(flux: &ArrayBase<S, Ix2>, interp: f64, step: f64) -> Result<Array2<f64>>
where
    S: Data<Elem = f64>,
{
    let ncols = flux.ncols();
    let window = ResampleWindow::new(interp, step, ncols)?;
    if interp == step {
        return Ok(flux.to_owned());
    }
    let count = window.output_len(ncols, 1)?;
    window.check_bounds(count, ncols)?;
    Ok(resample_rows(flux.view(), &window, count, false))
}

/// Row-wise counterpart of [`wavelength_resample_edge_aware`].
pub fn flux_resample_edge_aware<S>(
    flux: &ArrayBase<S, Ix2>,
    interp: f64,
    step: f64,
) -> Result<Array2<f64>>
where
    S: Data<Elem = f64>,
{
    let ncols = flux.ncols();
    let window = ResampleWindow::new(interp, step, ncols)?;
    if interp == step {
        return Ok(flux.to_owned());
    }
    let count = window.output_len(ncols, 3)?;
    window.check_bounds(count, ncols - 1)?;
    Ok(resample_rows(flux.view(), &window, count, true))
}

/// Average `count` windows per row into a fresh matrix. With `keep_first`
/// the windows read from column 1 onwards and column 0 is copied through.
fn resample_rows(
    flux: ArrayView2<'_, f64>,
    window: &ResampleWindow,
    count: usize,
    keep_first: bool,
) -> Array2<f64> {
    let lead = usize::from(keep_first);
    let mut result = Array2::zeros((flux.nrows(), count + lead));

    Zip::from(result.rows_mut())
        .and(flux.rows())
        .par_for_each(|mut out, row| {
            if keep_first {
                out[0] = row[0];
            }
            let source = row.slice(s![lead..]);
            for (i, cell) in out.slice_mut(s![lead..]).iter_mut().enumerate() {
                *cell = window.mean_at(&source, i);
            }
        });

    result
}
