//! Configuration for the scoring engine: an explicit, validated record
//! rather than implicit global state.

use std::path::PathBuf;

use clap::ValueEnum;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

use crate::err::AppError;

/// Supported genome releases.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    Default,
    ValueEnum,
    EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GenomeRelease {
    #[default]
    Grch37,
    Grch38,
}

/// Which transcript database a VCF's variants were annotated against.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    Default,
    ValueEnum,
    EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TranscriptDb {
    #[default]
    Refseq,
    Ucsc,
    Ensembl,
}

/// Output rendering for the ranked disease list. TSV/HTML rendering
/// itself lives outside this crate; this enum only pins the selector so
/// a downstream renderer has a stable contract to implement against.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    Default,
    ValueEnum,
    EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Tsv,
    Html,
}

/// The engine's full configuration, validated once before scoring begins.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate_builder"))]
pub struct LiricalConfig {
    /// Directory holding the ontology document and disease corpus.
    pub data_dir: PathBuf,
    /// Optional exomiser-style variant frequency/pathogenicity database.
    #[builder(default)]
    pub exomiser_dir: Option<PathBuf>,
    /// Optional VCF supplying the patient's genotype.
    #[builder(default)]
    pub vcf: Option<PathBuf>,
    #[builder(default)]
    pub assembly: GenomeRelease,
    #[builder(default)]
    pub transcript_db: TranscriptDb,
    /// Optional precomputed background index, bypassing corpus-wide
    /// propagation at scoring time.
    #[builder(default)]
    pub background_file: Option<PathBuf>,
    /// Drop variants that failed the VCF FILTER column before computing
    /// genotype burden.
    #[builder(default = "true")]
    pub filter_on_filter_column: bool,
    #[builder(default)]
    pub output_format: OutputFormat,
}

impl LiricalConfigBuilder {
    fn validate_builder(&self) -> Result<(), String> {
        if matches!(&self.data_dir, None) {
            return Err("data_dir is required".to_string());
        }
        Ok(())
    }
}

impl LiricalConfig {
    /// Cross-field validation beyond what the builder itself enforces:
    /// `data_dir` must exist, and a VCF implies genotype scoring needs an
    /// exomiser-style frequency/pathogenicity database to draw from.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.data_dir.is_dir() {
            return Err(AppError::ConfigError(format!(
                "data_dir {} is not a directory",
                self.data_dir.display()
            )));
        }
        if self.vcf.is_some() && self.exomiser_dir.is_none() {
            return Err(AppError::ConfigError(
                "a VCF was supplied but no exomiser_dir to source variant annotations from"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
