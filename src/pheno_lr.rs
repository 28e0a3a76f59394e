//! The phenotype likelihood ratio, including the fuzzy-match policy
//! applied when a queried term is not directly annotated on a disease.

use crate::background::BackgroundIndex;
use crate::common::{checked_finite, clamp_prob, FP_FLOOR};
use crate::corpus::DiseaseRecord;
use crate::err::AppError;
use crate::ontology::{Ontology, TermId};

/// How a term's foreground frequency on a disease was determined. Kept
/// around for the case evaluator's per-term breakdown, not used in the
/// LR computation itself.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchKind {
    /// Directly annotated on the disease.
    Direct,
    /// Fuzzy-match branch 1: query is an ancestor of one or more
    /// annotated terms; frequency is their mean.
    QueryIsAncestor,
    /// Fuzzy-match branch 2: query is more specific than an annotated
    /// term; frequency derived from BFS distance to the nearest shared
    /// informative ancestor.
    QueryIsDescendant { distance: usize },
    /// No informative common ancestor beyond the root: treated as a
    /// false-positive observation.
    NoMatch,
}

/// The result of scoring a single term against a single disease.
#[derive(Debug, Clone)]
pub struct TermLikelihoodRatio {
    pub term: TermId,
    pub lr: f64,
    pub match_kind: MatchKind,
}

/// Foreground frequency of `q` on `disease`: a direct annotation if one
/// exists, else the best of the two fuzzy-match branches, else the
/// false-positive floor. Returns `(frequency, match_kind)`.
fn foreground_frequency(
    ontology: &Ontology,
    disease: &DiseaseRecord,
    q: &TermId,
) -> Result<(f64, MatchKind), AppError> {
    if let Some(f) = disease.direct_frequency(q) {
        return Ok((f, MatchKind::Direct));
    }

    // Branch 1: q is an ancestor of some annotated term t on D, i.e. D
    // annotates something more specific than q, which entails q.
    // Deterministic iteration order: the order D stores its annotations in.
    let mut matching_freqs = Vec::new();
    for annotation in &disease.phenotypes {
        if ontology.is_subclass(&annotation.term, q)? {
            matching_freqs.push(annotation.frequency);
        }
    }
    if !matching_freqs.is_empty() {
        let mean = matching_freqs.iter().sum::<f64>() / matching_freqs.len() as f64;
        return Ok((mean, MatchKind::QueryIsAncestor));
    }

    // Branch 2: q is more specific than some annotated term t on D. Walk
    // from q upward toward the root and find the first ancestor `td` that
    // lies in ancestors(D) = ⋃ ancestors(t, incl=true) over t in D.
    let disease_ancestors = ontology.ancestors_of_set(disease.phenotypes.iter().map(|p| &p.term))?;
    let root = ontology.root_id().clone();
    for (td, distance) in ontology.ancestors_with_distance(q)? {
        if !disease_ancestors.contains(&td) {
            continue;
        }
        if td == root {
            // Only the root is shared: carries no information, branch
            // produces no match (fall through to branch 3).
            break;
        }
        let freq = if distance == 0 {
            1.0
        } else {
            1.0 / (1.0 + (distance as f64).ln())
        };
        return Ok((freq, MatchKind::QueryIsDescendant { distance }));
    }

    // Branch 3: no common informative ancestor.
    Ok((FP_FLOOR, MatchKind::NoMatch))
}

/// `pheno_lr(q, D) = foreground_frequency(D, q) / background(q)`.
pub fn pheno_lr(
    ontology: &Ontology,
    background: &BackgroundIndex,
    disease: &DiseaseRecord,
    q: &TermId,
) -> Result<TermLikelihoodRatio, AppError> {
    let (numerator, match_kind) = foreground_frequency(ontology, disease, q)?;
    let denominator = background.background(q)?;
    let lr = checked_finite("pheno_lr", numerator / denominator)?;
    Ok(TermLikelihoodRatio {
        term: q.clone(),
        lr,
        match_kind,
    })
}

/// The LR for a term reported as *excluded* in the patient: the
/// numerator and denominator are complemented, each clamped away from 0
/// and 1 by `FP_FLOOR`.
pub fn excluded_pheno_lr(
    ontology: &Ontology,
    background: &BackgroundIndex,
    disease: &DiseaseRecord,
    q: &TermId,
) -> Result<TermLikelihoodRatio, AppError> {
    let (foreground, match_kind) = foreground_frequency(ontology, disease, q)?;
    let bg = background.background(q)?;
    let numerator = clamp_prob(1.0 - foreground, FP_FLOOR);
    let denominator = clamp_prob(1.0 - bg, FP_FLOOR);
    let lr = checked_finite("excluded_pheno_lr", numerator / denominator)?;
    Ok(TermLikelihoodRatio {
        term: q.clone(),
        lr,
        match_kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundIndex;
    use crate::corpus::{CorpusDocument, DiseaseCorpus, DiseaseRecord, PhenotypeAnnotation};
    use crate::ontology::{OntologyBuilder, OntologyDocument, OntologyTermDocument};
    use float_cmp::approx_eq;

    /// root
    ///  └─ eye
    ///      └─ cataract
    ///          ├─ nuclear_cataract
    ///          └─ cortical_cataract
    fn ontology() -> Ontology {
        let doc = OntologyDocument {
            root: "HP:ROOT".to_string(),
            version: None,
            aliases: indexmap::IndexMap::new(),
            terms: vec![
                OntologyTermDocument { id: "HP:ROOT".into(), name: "root".into(), parents: vec![] },
                OntologyTermDocument { id: "HP:EYE".into(), name: "eye".into(), parents: vec!["HP:ROOT".into()] },
                OntologyTermDocument { id: "HP:CATARACT".into(), name: "cataract".into(), parents: vec!["HP:EYE".into()] },
                OntologyTermDocument { id: "HP:NUCCAT".into(), name: "nuclear cataract".into(), parents: vec!["HP:CATARACT".into()] },
                OntologyTermDocument { id: "HP:CORTCAT".into(), name: "cortical cataract".into(), parents: vec!["HP:CATARACT".into()] },
                OntologyTermDocument { id: "HP:OTHER".into(), name: "other system".into(), parents: vec!["HP:ROOT".into()] },
            ],
        };
        OntologyBuilder::new().from_document(doc).build().unwrap()
    }

    fn disease_annotating(term: &str, freq: f64) -> DiseaseRecord {
        DiseaseRecord {
            id: "OMIM:1".into(),
            name: "d1".to_string(),
            phenotypes: vec![PhenotypeAnnotation { term: term.into(), frequency: freq }],
            inheritance: vec![],
            genes: vec![],
        }
    }

    #[test]
    fn direct_match_is_frequency_over_background() {
        let o = ontology();
        let corpus = DiseaseCorpus::from_document(CorpusDocument {
            diseases: vec![disease_annotating("HP:CATARACT", 0.8)],
        });
        let bg = BackgroundIndex::build(&o, &corpus).unwrap();
        let d = corpus.get(&"OMIM:1".into()).unwrap();
        let result = pheno_lr(&o, &bg, d, &"HP:CATARACT".into()).unwrap();
        assert_eq!(result.match_kind, MatchKind::Direct);
        let expected = 0.8 / bg.background(&"HP:CATARACT".into()).unwrap();
        assert!(approx_eq!(f64, result.lr, expected, epsilon = 1e-9));
    }

    #[test]
    fn query_is_ancestor_of_annotated_term_averages_frequencies() {
        let o = ontology();
        let d = DiseaseRecord {
            id: "OMIM:1".into(),
            name: "d1".to_string(),
            phenotypes: vec![
                PhenotypeAnnotation { term: "HP:NUCCAT".into(), frequency: 1.0 },
                PhenotypeAnnotation { term: "HP:CORTCAT".into(), frequency: 0.5 },
            ],
            inheritance: vec![],
            genes: vec![],
        };
        let corpus = DiseaseCorpus::from_document(CorpusDocument { diseases: vec![d] });
        let bg = BackgroundIndex::build(&o, &corpus).unwrap();
        let d = corpus.get(&"OMIM:1".into()).unwrap();
        // Query HP:CATARACT is an ancestor of both annotated terms.
        let result = pheno_lr(&o, &bg, d, &"HP:CATARACT".into()).unwrap();
        assert_eq!(result.match_kind, MatchKind::QueryIsAncestor);
        let expected_numerator = 0.75; // mean(1.0, 0.5)
        let expected = expected_numerator / bg.background(&"HP:CATARACT".into()).unwrap();
        assert!(approx_eq!(f64, result.lr, expected, epsilon = 1e-9));
    }

    #[test]
    fn query_is_direct_child_of_annotated_term_yields_lr_one_branch_two() {
        let o = ontology();
        let d = disease_annotating("HP:CATARACT", 1.0);
        let corpus = DiseaseCorpus::from_document(CorpusDocument { diseases: vec![d] });
        let bg = BackgroundIndex::build(&o, &corpus).unwrap();
        let d = corpus.get(&"OMIM:1".into()).unwrap();
        // HP:NUCCAT is a child of the annotated HP:CATARACT: distance 1.
        let (numerator, kind) = foreground_frequency(&o, d, &"HP:NUCCAT".into()).unwrap();
        assert_eq!(kind, MatchKind::QueryIsDescendant { distance: 1 });
        assert!(approx_eq!(f64, numerator, 1.0, epsilon = 1e-9)); // 1/(1+ln 1) = 1
        let _ = bg; // background value not needed for this numerator assertion
    }

    #[test]
    fn query_sharing_only_root_falls_back_to_fp_floor() {
        let o = ontology();
        let d = disease_annotating("HP:OTHER", 1.0);
        let corpus = DiseaseCorpus::from_document(CorpusDocument { diseases: vec![d] });
        let bg = BackgroundIndex::build(&o, &corpus).unwrap();
        let d = corpus.get(&"OMIM:1".into()).unwrap();
        let result = pheno_lr(&o, &bg, d, &"HP:NUCCAT".into()).unwrap();
        assert_eq!(result.match_kind, MatchKind::NoMatch);
        let expected = FP_FLOOR / bg.background(&"HP:NUCCAT".into()).unwrap();
        assert!(approx_eq!(f64, result.lr, expected, epsilon = 1e-9));
    }

    #[test]
    fn excluded_term_lr_negates_sign_of_observed_lr() {
        let o = ontology();
        // High foreground frequency relative to background: observing the
        // term favors the disease (log-LR > 0); excluding it should
        // therefore disfavor the disease (log-LR < 0), and vice versa.
        // A second, unrelated disease keeps background(HP:CATARACT) below
        // the foreground frequency so the two LRs actually diverge.
        let d = disease_annotating("HP:CATARACT", 0.95);
        let other = DiseaseRecord {
            id: "OMIM:2".into(),
            name: "d2".to_string(),
            phenotypes: vec![PhenotypeAnnotation { term: "HP:OTHER".into(), frequency: 1.0 }],
            inheritance: vec![],
            genes: vec![],
        };
        let corpus = DiseaseCorpus::from_document(CorpusDocument { diseases: vec![d, other] });
        let bg = BackgroundIndex::build(&o, &corpus).unwrap();
        let d = corpus.get(&"OMIM:1".into()).unwrap();
        let observed = pheno_lr(&o, &bg, d, &"HP:CATARACT".into()).unwrap();
        let excluded = excluded_pheno_lr(&o, &bg, d, &"HP:CATARACT".into()).unwrap();
        assert!(observed.lr.ln() > 0.0);
        assert!(excluded.lr.ln() < 0.0);
    }

    #[rstest::rstest]
    #[case("HP:ROOT")]
    #[case("HP:EYE")]
    #[case("HP:CATARACT")]
    #[case("HP:NUCCAT")]
    #[case("HP:OTHER")]
    fn lr_is_always_positive_and_finite(#[case] term: &str) {
        let o = ontology();
        let d = disease_annotating("HP:CATARACT", 1.0);
        let corpus = DiseaseCorpus::from_document(CorpusDocument { diseases: vec![d] });
        let bg = BackgroundIndex::build(&o, &corpus).unwrap();
        let d = corpus.get(&"OMIM:1".into()).unwrap();
        let result = pheno_lr(&o, &bg, d, &term.into()).unwrap();
        assert!(result.lr > 0.0);
        assert!(result.lr.is_finite());
    }
}
