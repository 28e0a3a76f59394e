//! Error kinds for the scoring core.
//!
//! These map directly onto the error taxonomy the case evaluator must
//! surface: configuration problems, unknown ontology terms, inconsistent
//! case inputs, non-finite numeric intermediates and background-index
//! construction bugs.

/// Errors raised by the scoring core.
#[derive(thiserror::Error, Debug, Clone)]
pub enum AppError {
    /// Missing required input path, unrecognized genome assembly, or a
    /// mismatch between assembly and variant database.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A term was not found in the ontology, even after alias
    /// canonicalization was attempted.
    #[error("unknown term: {0}")]
    UnknownTerm(String),

    /// Observed and excluded term sets overlap, or a genotype map
    /// references a gene the ontology/gene index does not know about.
    #[error("inconsistent inputs: {0}")]
    InconsistentInputs(String),

    /// A non-finite value (`NaN` or `±inf`) appeared in a numeric
    /// intermediate and was not allowed to propagate silently.
    #[error("numeric error in {context}: value was {value}")]
    NumericError { context: String, value: f64 },

    /// A term had no entry in the background index after construction.
    /// This indicates a construction bug, not a bad query: fail fast.
    #[error("missing background entry for term: {0}")]
    MissingBackground(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
