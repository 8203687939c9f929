use thiserror::Error;

/// Failures raised by the numeric core and the spectrum container.
///
/// Every variant is a local, recoverable condition: functions validate their
/// inputs before allocating output and return one of these instead of
/// producing non-finite or truncated results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AsadError {
    #[error("invalid resample parameters: interp = {interp}, step = {step}, input length = {len}")]
    InvalidResampleParameters { interp: f64, step: f64, len: usize },

    #[error("averaging window {start}..{end} reads past the end of a row of length {len}")]
    WindowOutOfBounds { start: usize, end: usize, len: usize },

    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("flux row {row} is zero at reference column {column}")]
    ZeroReferenceValue { row: usize, column: usize },

    #[error("wavelength range [{start}, {end}] is outside the grid [{min}, {max}]")]
    WavelengthOutOfRange {
        start: f64,
        end: f64,
        min: f64,
        max: f64,
    },

    #[error("wavelength grid must be strictly increasing (index {index})")]
    UnsortedWavelength { index: usize },

    #[error("parameter grid needs a positive step and non-negative extent (max = {max}, step = {step})")]
    InvalidGrid { max: f64, step: f64 },

    #[error("cumulative flux sums to zero")]
    ZeroTotalFlux,

    #[error("{0} needs at least {1} elements")]
    EmptyInput(&'static str, usize),
}

pub type Result<T> = std::result::Result<T, AsadError>;
