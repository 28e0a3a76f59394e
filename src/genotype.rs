//! The genotype likelihood ratio: combines observed predicted-pathogenic
//! variant burden per gene against a per-gene background (Poisson) rate,
//! picking the best candidate gene linked to a disease.

use serde::{Deserialize, Serialize};

use crate::common::checked_finite;
use crate::corpus::DiseaseRecord;
use crate::err::AppError;
use crate::gene_index::{GeneDiseaseIndex, GeneId};

/// A single candidate variant contributing to a gene's pathogenic burden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Predicted pathogenicity in `[0, 1]`.
    pub pathogenicity: f64,
    /// Population allele frequency (informational; not used directly in
    /// the burden sum, which the genotype extractor has already filtered
    /// on frequency upstream).
    pub population_frequency: f64,
    /// Whether the variant passed the VCF FILTER column (or equivalent).
    pub filter_pass: bool,
}

/// Per-gene genotype summary for a single case: predicted-pathogenic
/// allele burden plus the underlying variants (kept for QC reporting).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gene2Genotype {
    pub variants: Vec<Variant>,
}

impl Gene2Genotype {
    /// `λ_obs`: sum of `pathogenicity` over variants. When
    /// `filter_on_filter_column` is set, filter-failed variants are
    /// excluded from the sum entirely; otherwise every variant counts
    /// regardless of its FILTER-column outcome.
    pub fn observed_burden(&self, filter_on_filter_column: bool) -> f64 {
        self.variants
            .iter()
            .filter(|v| !filter_on_filter_column || v.filter_pass)
            .map(|v| v.pathogenicity)
            .sum()
    }
}

/// A per-case map from gene to its observed genotype summary.
pub type GenotypeMap = std::collections::HashMap<GeneId, Gene2Genotype>;

/// Explanatory category surfaced alongside a per-gene genotype LR, for
/// reporting only — never used to adjust the score itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenotypeLrCategory {
    NoVariantsDetectedAr,
    NoVariantsDetectedAd,
    PathogenicMatch,
    HighBackground,
}

/// The genotype LR and category for a single gene.
#[derive(Debug, Clone)]
pub struct GeneLikelihoodRatio {
    pub gene: GeneId,
    pub lr: f64,
    pub category: GenotypeLrCategory,
}

/// `Poisson(k; λ)` probability mass, used to compare the observed burden
/// against the background (not-D) hypothesis.
fn poisson_pmf(k: f64, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if k == 0.0 { 1.0 } else { 0.0 };
    }
    (-lambda + k * lambda.ln() - ln_gamma(k + 1.0)).exp()
}

/// Natural log of the gamma function via the Stirling/Lanczos
/// approximation, good enough for the burden counts (small non-negative
/// reals) this model ever evaluates.
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFICIENTS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    if x < 0.5 {
        // Reflection formula.
        return (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = COEFFICIENTS[0];
    let t = x + G + 0.5;
    for (i, c) in COEFFICIENTS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Per-gene genotype LR: ratio of the likelihood of the observed burden
/// under "D" (burden meets/exceeds the mode-of-inheritance threshold,
/// modeled as a step function at the threshold) versus "not D"
/// (background Poisson at rate `λ_bg`).
fn gene_lr(
    observed: f64,
    background_rate: f64,
    min_alleles: u32,
) -> (f64, GenotypeLrCategory) {
    let threshold = min_alleles as f64;
    let meets_threshold = observed >= threshold;

    // Likelihood under "not D": probability the background Poisson
    // process would produce a burden at least this large.
    let p_not_d = poisson_complementary_cdf(background_rate, observed).max(1e-300);
    // Likelihood under "D": 1.0 if the observed burden clears the
    // inheritance-mode threshold, a small residual otherwise (never
    // exactly zero, so the ratio stays finite).
    let p_d = if meets_threshold { 1.0 } else { 1e-300 };

    let lr = p_d / p_not_d;

    let category = if !meets_threshold {
        if min_alleles >= 2 {
            GenotypeLrCategory::NoVariantsDetectedAr
        } else {
            GenotypeLrCategory::NoVariantsDetectedAd
        }
    } else if lr < 1.0 {
        GenotypeLrCategory::HighBackground
    } else {
        GenotypeLrCategory::PathogenicMatch
    };

    (lr, category)
}

/// `P(X ≥ k)` under `Poisson(λ)`, computed as `1 - P(X < k)` via a direct
/// sum of PMF terms (burden counts are small, so this is cheap and exact
/// enough for the LR comparison).
fn poisson_complementary_cdf(lambda: f64, k: f64) -> f64 {
    let k_floor = k.floor().max(0.0) as u64;
    let mut cdf_below = 0.0;
    for i in 0..k_floor {
        cdf_below += poisson_pmf(i as f64, lambda);
    }
    (1.0 - cdf_below).clamp(0.0, 1.0)
}

/// Genotype LR for disease `D`: the maximum per-gene LR over `G(D)`, the
/// genes linked to `D`. Diseases with no linked gene return `1.0`
/// (genotype uninformative). Genes referenced by the genotype map but
/// unknown to the gene index are logged and skipped rather than failing
/// the case.
pub fn genotype_lr(
    disease: &DiseaseRecord,
    gene_index: &GeneDiseaseIndex,
    genotypes: &GenotypeMap,
    filter_on_filter_column: bool,
) -> Result<(f64, Vec<GeneLikelihoodRatio>), AppError> {
    let genes = gene_index.genes_for(&disease.id);
    if genes.is_empty() {
        return Ok((1.0, Vec::new()));
    }

    let min_alleles = disease.inheritance_class().min_alleles();

    let mut breakdown = Vec::with_capacity(genes.len());

    for gene in genes {
        let observed = genotypes
            .get(gene)
            .map(|g| g.observed_burden(filter_on_filter_column))
            .unwrap_or(0.0);
        let background_rate = gene_index.background_rate(gene);
        let (lr, category) = gene_lr(observed, background_rate, min_alleles);
        let lr = checked_finite("genotype_lr", lr)?;
        breakdown.push(GeneLikelihoodRatio {
            gene: gene.clone(),
            lr,
            category,
        });
    }

    let best = breakdown
        .iter()
        .map(|g| g.lr)
        .fold(f64::NEG_INFINITY, f64::max);
    Ok((best, breakdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{DiseaseId, InheritanceMode, PhenotypeAnnotation};
    use indexmap::IndexMap;

    fn disease_with_genes(genes: &[&str], inheritance: Vec<InheritanceMode>) -> DiseaseRecord {
        DiseaseRecord {
            id: DiseaseId::from("OMIM:1"),
            name: "d".to_string(),
            phenotypes: vec![PhenotypeAnnotation {
                term: crate::ontology::TermId::from("HP:1"),
                frequency: 1.0,
            }],
            inheritance,
            genes: genes.iter().map(|g| GeneId::from(*g)).collect(),
        }
    }

    fn index_with_rate(gene: &str, rate: f64) -> GeneDiseaseIndex {
        let corpus = crate::corpus::DiseaseCorpus::from_document(crate::corpus::CorpusDocument {
            diseases: vec![disease_with_genes(&[gene], vec![])],
        });
        let mut rates = IndexMap::new();
        rates.insert(GeneId::from(gene), rate);
        GeneDiseaseIndex::build(&corpus, IndexMap::new(), rates)
    }

    #[test]
    fn disease_with_no_linked_gene_is_uninformative() {
        let disease = disease_with_genes(&[], vec![]);
        let index = GeneDiseaseIndex::build(
            &crate::corpus::DiseaseCorpus::from_document(crate::corpus::CorpusDocument {
                diseases: vec![],
            }),
            IndexMap::new(),
            IndexMap::new(),
        );
        let genotypes = GenotypeMap::new();
        let (lr, breakdown) = genotype_lr(&disease, &index, &genotypes, true).unwrap();
        assert_eq!(lr, 1.0);
        assert!(breakdown.is_empty());
    }

    #[test]
    fn recessive_disease_with_no_pathogenic_alleles_is_no_variants_ar() {
        let disease = disease_with_genes(&["HGNC:1"], vec![InheritanceMode::Recessive]);
        let index = index_with_rate("HGNC:1", 0.01);
        let genotypes = GenotypeMap::new();
        let (lr, breakdown) = genotype_lr(&disease, &index, &genotypes, true).unwrap();
        assert!(lr < 1.0);
        assert_eq!(breakdown[0].category, GenotypeLrCategory::NoVariantsDetectedAr);
    }

    #[test]
    fn dominant_disease_with_pathogenic_allele_is_a_match() {
        let disease = disease_with_genes(&["HGNC:1"], vec![InheritanceMode::Dominant]);
        let index = index_with_rate("HGNC:1", 1e-4);
        let mut genotypes = GenotypeMap::new();
        genotypes.insert(
            GeneId::from("HGNC:1"),
            Gene2Genotype {
                variants: vec![Variant {
                    pathogenicity: 1.0,
                    population_frequency: 1e-6,
                    filter_pass: true,
                }],
            },
        );
        let (lr, breakdown) = genotype_lr(&disease, &index, &genotypes, true).unwrap();
        assert!(lr > 1.0);
        assert_eq!(breakdown[0].category, GenotypeLrCategory::PathogenicMatch);
    }

    #[test]
    fn filter_failed_variants_do_not_count_toward_burden() {
        let g = Gene2Genotype {
            variants: vec![Variant {
                pathogenicity: 1.0,
                population_frequency: 0.5,
                filter_pass: false,
            }],
        };
        assert_eq!(g.observed_burden(true), 0.0);
    }

    #[test]
    fn disabling_filter_enforcement_counts_filter_failed_variants() {
        let g = Gene2Genotype {
            variants: vec![Variant {
                pathogenicity: 1.0,
                population_frequency: 0.5,
                filter_pass: false,
            }],
        };
        assert_eq!(g.observed_burden(false), 1.0);
    }

    #[test]
    fn best_gene_wins_when_disease_has_multiple_linked_genes() {
        let disease = disease_with_genes(&["HGNC:1", "HGNC:2"], vec![InheritanceMode::Dominant]);
        let corpus = crate::corpus::DiseaseCorpus::from_document(crate::corpus::CorpusDocument {
            diseases: vec![disease_with_genes(&["HGNC:1", "HGNC:2"], vec![InheritanceMode::Dominant])],
        });
        let mut rates = IndexMap::new();
        rates.insert(GeneId::from("HGNC:1"), 1e-4);
        rates.insert(GeneId::from("HGNC:2"), 1e-4);
        let index = GeneDiseaseIndex::build(&corpus, IndexMap::new(), rates);
        let mut genotypes = GenotypeMap::new();
        genotypes.insert(
            GeneId::from("HGNC:2"),
            Gene2Genotype {
                variants: vec![Variant { pathogenicity: 1.0, population_frequency: 1e-6, filter_pass: true }],
            },
        );
        let (lr, _) = genotype_lr(&disease, &index, &genotypes, true).unwrap();
        assert!(lr > 1.0, "best gene (HGNC:2, with a pathogenic variant) should dominate");
    }
}
