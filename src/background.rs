//! Construction of the background term-frequency index: for every
//! term reachable from the ontology root, the fraction of the disease
//! corpus annotated — directly or through ontology propagation — with it.

use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};

use crate::common::FP_FLOOR;
use crate::corpus::DiseaseCorpus;
use crate::err::AppError;
use crate::ontology::{Ontology, TermId};

/// `term → probability ∈ (0, 1]`, normalized by corpus size.
#[derive(Debug, Clone, Default)]
pub struct BackgroundIndex {
    raw: IndexMap<TermId, f64>,
    corpus_size: usize,
}

/// Construct the `indicatif` progress bar style used while sweeping the
/// corpus.
fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} diseases")
        .unwrap()
        .progress_chars("#>-")
}

impl BackgroundIndex {
    /// Build the index:
    ///
    /// 1. seed every descendant of the root with `0.0`;
    /// 2. for each disease, for each annotated `(term, frequency)`, add
    ///    `frequency` to every ancestor-or-self of `term`;
    /// 3. normalize by corpus size.
    ///
    /// `background()` lookups clamp to `FP_FLOOR` afterwards; the raw,
    /// un-clamped values are what the propagation-law tests check
    /// ("background(t) = 1 (pre-clamp)").
    pub fn build(ontology: &Ontology, corpus: &DiseaseCorpus) -> Result<Self, AppError> {
        let mut raw: IndexMap<TermId, f64> = ontology
            .descendants(ontology.root_id())?
            .into_iter()
            .map(|t| (t, 0.0))
            .collect();

        let bar = ProgressBar::new(corpus.len() as u64);
        bar.set_style(progress_style());

        for disease in corpus.iter() {
            for annotation in &disease.phenotypes {
                let ancestors = ontology.ancestors(&annotation.term)?;
                for ancestor in ancestors {
                    *raw.entry(ancestor).or_insert(0.0) += annotation.frequency;
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        let corpus_size = corpus.len().max(1);
        for value in raw.values_mut() {
            *value /= corpus_size as f64;
        }

        tracing::info!(
            terms = raw.len(),
            corpus_size,
            "built background frequency index"
        );

        Ok(BackgroundIndex {
            raw,
            corpus_size: corpus.len(),
        })
    }

    /// The un-clamped background probability, if the term has an entry.
    /// Exposed for the propagation-law tests; scoring code should use
    /// [`BackgroundIndex::background`] instead.
    pub fn raw(&self, term: &TermId) -> Option<f64> {
        self.raw.get(term).copied()
    }

    /// `background(t)`, clamped to `[FP_FLOOR, 1]`. A missing entry is
    /// either resolved via ontology alias canonicalization (the caller is
    /// expected to have already canonicalized `term` through
    /// `Ontology::primary_id`) or is a `MissingBackground` construction
    /// bug — never a silent zero.
    pub fn background(&self, term: &TermId) -> Result<f64, AppError> {
        match self.raw.get(term) {
            Some(&p) => Ok(p.max(FP_FLOOR).min(1.0)),
            None => Err(AppError::MissingBackground(term.as_str().to_string())),
        }
    }

    pub fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    /// Reconstruct an index from its serialized entries, bypassing
    /// corpus-wide propagation entirely. Used by the RocksDB-backed cache
    /// when a fingerprint-matching entry is already on disk.
    pub fn from_entries(entries: Vec<(TermId, f64)>, corpus_size: usize) -> Self {
        BackgroundIndex {
            raw: entries.into_iter().collect(),
            corpus_size,
        }
    }

    /// The raw `(term, probability)` entries, in iteration order, for
    /// serializing this index into the cache.
    pub fn entries(&self) -> Vec<(TermId, f64)> {
        self.raw.iter().map(|(t, p)| (t.clone(), *p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{CorpusDocument, DiseaseRecord, PhenotypeAnnotation};
    use crate::ontology::{OntologyBuilder, OntologyDocument, OntologyTermDocument};
    use float_cmp::approx_eq;

    fn chain_ontology() -> Ontology {
        let doc = OntologyDocument {
            root: "HP:ROOT".to_string(),
            version: None,
            aliases: IndexMap::new(),
            terms: vec![
                OntologyTermDocument {
                    id: "HP:ROOT".into(),
                    name: "root".into(),
                    parents: vec![],
                },
                OntologyTermDocument {
                    id: "HP:EYE".into(),
                    name: "eye".into(),
                    parents: vec!["HP:ROOT".into()],
                },
                OntologyTermDocument {
                    id: "HP:CATARACT".into(),
                    name: "cataract".into(),
                    parents: vec!["HP:EYE".into()],
                },
            ],
        };
        OntologyBuilder::new().from_document(doc).build().unwrap()
    }

    fn disease(id: &str, term: &str, freq: f64) -> DiseaseRecord {
        DiseaseRecord {
            id: id.into(),
            name: id.to_string(),
            phenotypes: vec![PhenotypeAnnotation {
                term: term.into(),
                frequency: freq,
            }],
            inheritance: vec![],
            genes: vec![],
        }
    }

    #[test]
    fn single_disease_propagation_law_gives_background_one() {
        let ontology = chain_ontology();
        let corpus = DiseaseCorpus::from_document(CorpusDocument {
            diseases: vec![disease("OMIM:1", "HP:CATARACT", 1.0)],
        });
        let bg = BackgroundIndex::build(&ontology, &corpus).unwrap();
        assert!(approx_eq!(f64, bg.raw(&"HP:CATARACT".into()).unwrap(), 1.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, bg.raw(&"HP:EYE".into()).unwrap(), 1.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, bg.raw(&"HP:ROOT".into()).unwrap(), 1.0, epsilon = 1e-9));
    }

    #[test]
    fn two_diseases_average_to_point_seven_five() {
        let ontology = chain_ontology();
        let corpus = DiseaseCorpus::from_document(CorpusDocument {
            diseases: vec![
                disease("OMIM:1", "HP:CATARACT", 1.0),
                disease("OMIM:2", "HP:CATARACT", 0.5),
            ],
        });
        let bg = BackgroundIndex::build(&ontology, &corpus).unwrap();
        assert!(approx_eq!(f64, bg.raw(&"HP:CATARACT".into()).unwrap(), 0.75, epsilon = 1e-9));
    }

    #[test]
    fn ancestor_coverage_is_monotone_along_the_dag() {
        let ontology = chain_ontology();
        let corpus = DiseaseCorpus::from_document(CorpusDocument {
            diseases: vec![disease("OMIM:1", "HP:CATARACT", 1.0)],
        });
        let bg = BackgroundIndex::build(&ontology, &corpus).unwrap();
        assert!(bg.background(&"HP:EYE".into()).unwrap() >= bg.background(&"HP:CATARACT".into()).unwrap());
        assert!(bg.background(&"HP:ROOT".into()).unwrap() >= bg.background(&"HP:EYE".into()).unwrap());
    }

    #[test]
    fn unannotated_term_clamps_to_fp_floor() {
        let ontology = chain_ontology();
        let corpus = DiseaseCorpus::from_document(CorpusDocument {
            diseases: vec![disease("OMIM:1", "HP:ROOT", 1.0)],
        });
        let bg = BackgroundIndex::build(&ontology, &corpus).unwrap();
        // HP:CATARACT is never directly or transitively annotated here.
        assert!(approx_eq!(f64, bg.raw(&"HP:CATARACT".into()).unwrap(), 0.0, epsilon = 1e-12));
        assert_eq!(bg.background(&"HP:CATARACT".into()).unwrap(), FP_FLOOR);
    }

    #[test]
    fn a_term_annotated_on_one_of_many_diseases_gets_a_small_background() {
        // 196 diseases, term appears on exactly one: background ≈ 1/196.
        let ontology = chain_ontology();
        let mut diseases: Vec<DiseaseRecord> = (0..195)
            .map(|i| disease(&format!("OMIM:{i}"), "HP:EYE", 1.0))
            .collect();
        diseases.push(disease("OMIM:195", "HP:CATARACT", 1.0));
        let corpus = DiseaseCorpus::from_document(CorpusDocument { diseases });
        let bg = BackgroundIndex::build(&ontology, &corpus).unwrap();
        let expected = 1.0 / 196.0;
        assert!(approx_eq!(
            f64,
            bg.raw(&"HP:CATARACT".into()).unwrap(),
            expected,
            epsilon = 1e-6
        ));
    }

    #[tracing_test::traced_test]
    #[test]
    fn build_logs_the_normalized_corpus_size() {
        use pretty_assertions::assert_eq;

        let ontology = chain_ontology();
        let corpus = DiseaseCorpus::from_document(CorpusDocument {
            diseases: vec![
                disease("OMIM:1", "HP:CATARACT", 1.0),
                disease("OMIM:2", "HP:EYE", 1.0),
            ],
        });
        let bg = BackgroundIndex::build(&ontology, &corpus).unwrap();
        assert_eq!(bg.corpus_size(), 2);
        assert!(tracing_test::logs_contain("built background frequency index"));
    }

    #[test]
    fn missing_entry_is_a_hard_error_not_a_silent_zero() {
        let ontology = chain_ontology();
        let corpus = DiseaseCorpus::from_document(CorpusDocument {
            diseases: vec![disease("OMIM:1", "HP:CATARACT", 1.0)],
        });
        let bg = BackgroundIndex::build(&ontology, &corpus).unwrap();
        let err = bg.background(&"HP:NOT_IN_ONTOLOGY".into());
        assert!(matches!(err, Err(AppError::MissingBackground(_))));
    }
}
