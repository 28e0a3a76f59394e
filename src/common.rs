//! Common functionality shared across the scoring core and the CLI.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Floor applied to any background or foreground frequency, `1 : 20 000`.
///
/// Keeps likelihood ratios finite and encodes the prior that an apparently
/// never-seen term is more plausibly a false-positive observation than a
/// truly impossible one.
pub const FP_FLOOR: f64 = 5e-6;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program.
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
///
/// Best-effort only: on platforms without `/proc` this silently does nothing.
pub fn trace_rss_now() {
    match procfs::process::Process::myself() {
        Ok(me) => {
            let page_size = procfs::page_size();
            if let Ok(stat) = me.stat() {
                tracing::debug!(
                    "RSS now: {}",
                    byte_unit::Byte::from_bytes((stat.rss * page_size) as u128)
                        .get_appropriate_unit(true)
                );
            }
        }
        Err(e) => tracing::trace!("could not read process stats: {}", e),
    }
}

/// Clamp a probability into `[floor, 1 - floor]`.
pub fn clamp_prob(p: f64, floor: f64) -> f64 {
    p.max(floor).min(1.0 - floor)
}

/// Sum an iterator of natural-log values in a numerically stable way
/// (plain summation is exact here; the helper exists so that every
/// log-space accumulation in the crate goes through one audited spot).
pub fn log_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    values.into_iter().sum()
}

/// Check that a floating point value is finite, turning non-finite values
/// into a `NumericError` rather than letting them propagate silently.
pub fn checked_finite(label: &str, value: f64) -> Result<f64, crate::err::AppError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(crate::err::AppError::NumericError {
            context: label.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_prob_respects_bounds() {
        assert_eq!(clamp_prob(-1.0, FP_FLOOR), FP_FLOOR);
        assert_eq!(clamp_prob(2.0, FP_FLOOR), 1.0 - FP_FLOOR);
        assert_eq!(clamp_prob(0.5, FP_FLOOR), 0.5);
    }

    #[test]
    fn checked_finite_rejects_nan_and_inf() {
        assert!(checked_finite("test", f64::NAN).is_err());
        assert!(checked_finite("test", f64::INFINITY).is_err());
        assert!(checked_finite("test", 1.0).is_ok());
    }
}
