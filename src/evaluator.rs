//! The case evaluator: combines phenotype and (optional) genotype
//! likelihood ratios across every disease in the corpus into a ranked,
//! normalized posterior distribution.

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::background::BackgroundIndex;
use crate::common::{checked_finite, log_sum};
use crate::corpus::{DiseaseCorpus, DiseaseId};
use crate::err::AppError;
use crate::gene_index::GeneDiseaseIndex;
use crate::genotype::{genotype_lr, GeneLikelihoodRatio, GenotypeMap};
use crate::ontology::{Ontology, TermId};
use crate::pheno_lr::{excluded_pheno_lr, pheno_lr, TermLikelihoodRatio};

/// A single case: the patient's observed and explicitly excluded phenotype
/// terms, plus an optional per-gene genotype summary.
#[derive(Debug, Clone, Default)]
pub struct CaseQuery {
    pub observed: Vec<TermId>,
    pub excluded: Vec<TermId>,
    pub genotypes: Option<GenotypeMap>,
}

/// Per-disease breakdown retained for reporting: which term contributed
/// what, and the winning gene's genotype LR if any.
#[derive(Debug, Clone)]
pub struct DiseaseScore {
    pub disease: DiseaseId,
    pub disease_name: String,
    /// Natural-log sum of every contributing LR (phenotype + genotype),
    /// before the uniform/override prior is folded in.
    pub log_lr: f64,
    /// Posterior probability after normalizing across the corpus so the
    /// scores sum to 1.
    pub posterior: f64,
    pub observed_terms: Vec<TermLikelihoodRatio>,
    pub excluded_terms: Vec<TermLikelihoodRatio>,
    pub genotype_breakdown: Vec<GeneLikelihoodRatio>,
}

/// Per-case metadata surfaced alongside the ranked scores: which terms
/// were canonicalized, and how many diseases were actually scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseMetadata {
    pub diseases_scored: usize,
    pub corpus_size: usize,
    pub genotype_informed: bool,
}

/// Canonicalize a single term and reject it unless it is a genuine
/// phenotypic-abnormality term, i.e. reachable from the ontology root.
fn canonicalize_phenotype_term(ontology: &Ontology, t: &TermId) -> Result<TermId, AppError> {
    let primary = ontology.primary_id(t)?;
    if !ontology.is_phenotypic_abnormality(&primary) {
        return Err(AppError::UnknownTerm(format!(
            "{t} is not a descendant of the phenotypic-abnormality root"
        )));
    }
    Ok(primary)
}

/// Validate that no term appears in both the observed and excluded sets,
/// and that every term resolves against the ontology and is a genuine
/// descendant of the root. Returns the canonicalized (primary-id)
/// observed/excluded term lists.
fn validate_and_canonicalize(
    ontology: &Ontology,
    query: &CaseQuery,
) -> Result<(Vec<TermId>, Vec<TermId>), AppError> {
    let observed = query
        .observed
        .iter()
        .map(|t| canonicalize_phenotype_term(ontology, t))
        .collect::<Result<Vec<_>, _>>()?;
    let excluded = query
        .excluded
        .iter()
        .map(|t| canonicalize_phenotype_term(ontology, t))
        .collect::<Result<Vec<_>, _>>()?;

    for t in &observed {
        if excluded.contains(t) {
            return Err(AppError::InconsistentInputs(format!(
                "term {t} is both observed and excluded"
            )));
        }
    }

    Ok((observed, excluded))
}

/// Genes referenced by the genotype map but unknown to the gene/ontology
/// index are a non-fatal condition: logged and skipped rather than
/// failing the case.
fn warn_on_unknown_genotype_genes(gene_index: &GeneDiseaseIndex, genotypes: &GenotypeMap) {
    for gene in genotypes.keys() {
        if !gene_index.known_gene(gene) {
            tracing::warn!(gene = %gene, "genotype map references a gene unknown to the gene index, skipping");
        }
    }
}

/// Score every disease in `corpus` against `query`: for each disease, sum
/// the log phenotype LRs over observed and excluded terms, optionally
/// add the log genotype LR, then normalize the exponentiated sums into a
/// posterior distribution over the corpus.
///
/// `prior` overrides the default uniform prior over diseases; a disease
/// absent from `prior` falls back to `1.0 / corpus.len()`. Ranking is by
/// descending posterior, ties broken by ascending disease id so the
/// output order is fully deterministic.
pub fn evaluate_case(
    ontology: &Ontology,
    background: &BackgroundIndex,
    corpus: &DiseaseCorpus,
    gene_index: &GeneDiseaseIndex,
    query: &CaseQuery,
    prior: Option<&IndexMap<DiseaseId, f64>>,
    filter_on_filter_column: bool,
) -> Result<(Vec<DiseaseScore>, CaseMetadata), AppError> {
    let (observed, excluded) = validate_and_canonicalize(ontology, query)?;
    if let Some(genotypes) = query.genotypes.as_ref() {
        warn_on_unknown_genotype_genes(gene_index, genotypes);
    }

    let diseases: Vec<_> = corpus.iter().collect();
    let uniform_prior = 1.0 / diseases.len().max(1) as f64;

    let raw: Vec<Result<(DiseaseId, String, f64, Vec<TermLikelihoodRatio>, Vec<TermLikelihoodRatio>, Vec<GeneLikelihoodRatio>), AppError>> = diseases
        .par_iter()
        .map(|disease| {
            let mut observed_terms = Vec::with_capacity(observed.len());
            for t in &observed {
                observed_terms.push(pheno_lr(ontology, background, disease, t)?);
            }
            let mut excluded_terms = Vec::with_capacity(excluded.len());
            for t in &excluded {
                excluded_terms.push(excluded_pheno_lr(ontology, background, disease, t)?);
            }

            let mut log_terms: Vec<f64> = observed_terms
                .iter()
                .chain(excluded_terms.iter())
                .map(|t| t.lr.ln())
                .collect();

            let genotype_breakdown = if let Some(genotypes) = query.genotypes.as_ref() {
                let (gt_lr, breakdown) =
                    genotype_lr(disease, gene_index, genotypes, filter_on_filter_column)?;
                log_terms.push(gt_lr.ln());
                breakdown
            } else {
                Vec::new()
            };

            let prior_p = prior
                .and_then(|p| p.get(&disease.id))
                .copied()
                .unwrap_or(uniform_prior);
            log_terms.push(prior_p.max(f64::MIN_POSITIVE).ln());

            let log_lr = checked_finite("evaluate_case::log_lr", log_sum(log_terms))?;

            Ok((
                disease.id.clone(),
                disease.name.clone(),
                log_lr,
                observed_terms,
                excluded_terms,
                genotype_breakdown,
            ))
        })
        .collect();

    let mut scored = Vec::with_capacity(raw.len());
    for entry in raw {
        scored.push(entry?);
    }

    // Normalize: posterior(d) = exp(log_lr(d)) / Σ exp(log_lr(d')), using
    // the standard log-sum-exp shift for numerical stability.
    let max_log_lr = scored
        .iter()
        .map(|(_, _, log_lr, ..)| *log_lr)
        .fold(f64::NEG_INFINITY, f64::max);
    let denom: f64 = scored
        .iter()
        .map(|(_, _, log_lr, ..)| (*log_lr - max_log_lr).exp())
        .sum();
    let denom = if denom > 0.0 { denom } else { 1.0 };

    let mut result: Vec<DiseaseScore> = scored
        .into_iter()
        .map(|(disease, disease_name, log_lr, observed_terms, excluded_terms, genotype_breakdown)| {
            let posterior = (log_lr - max_log_lr).exp() / denom;
            DiseaseScore {
                disease,
                disease_name,
                log_lr,
                posterior,
                observed_terms,
                excluded_terms,
                genotype_breakdown,
            }
        })
        .collect();

    result.sort_by(|a, b| {
        b.posterior
            .partial_cmp(&a.posterior)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.disease.cmp(&b.disease))
    });

    let metadata = CaseMetadata {
        diseases_scored: result.len(),
        corpus_size: corpus.len(),
        genotype_informed: query.genotypes.is_some(),
    };

    Ok((result, metadata))
}
