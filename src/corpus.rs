//! The disease corpus: the external input mapping disease id to its
//! annotated phenotypic-abnormality terms, inheritance modes, and linked
//! genes.
//!
//! Parsing the real HPO annotation file format (`phenotype.hpoa`) lives
//! outside this crate; `DiseaseCorpus::from_document` pins the minimal
//! JSON shape an external collaborator would need to produce.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::gene_index::GeneId;
use crate::ontology::TermId;

/// A disease identifier, e.g. `"OMIM:154700"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiseaseId(pub String);

impl std::fmt::Display for DiseaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DiseaseId {
    fn from(s: &str) -> Self {
        DiseaseId(s.to_string())
    }
}

impl From<String> for DiseaseId {
    fn from(s: String) -> Self {
        DiseaseId(s)
    }
}

/// A single phenotype annotation: a term plus its frequency in the disease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhenotypeAnnotation {
    pub term: TermId,
    /// Frequency in `[0, 1]`. Defaults to `1.0` when absent in the source
    /// annotation.
    #[serde(default = "default_frequency")]
    pub frequency: f64,
}

fn default_frequency() -> f64 {
    1.0
}

/// The mode(s) of inheritance annotated for a disease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceMode {
    #[default]
    Dominant,
    Recessive,
    XLinked,
    /// No mode of inheritance could be extracted from the source record.
    /// Treated identically to `Dominant`: this avoids over-penalizing
    /// candidates whose MoI annotation is simply missing rather than
    /// genuinely unknown.
    Unknown,
}

/// Which allele-count threshold a disease's mode of inheritance implies
/// for the genotype LR model: dominant-like diseases expect at least one
/// pathogenic allele, recessive diseases expect at least two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritanceClass {
    Dominant,
    Recessive,
}

impl InheritanceClass {
    pub fn min_alleles(self) -> u32 {
        match self {
            InheritanceClass::Dominant => 1,
            InheritanceClass::Recessive => 2,
        }
    }
}

/// An immutable disease record: its annotated phenotypes (in source
/// order — fuzzy-match phenotype scoring requires a deterministic
/// iteration order over a disease's annotations), its inheritance
/// mode(s), and any genes linked to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseRecord {
    pub id: DiseaseId,
    pub name: String,
    pub phenotypes: Vec<PhenotypeAnnotation>,
    #[serde(default)]
    pub inheritance: Vec<InheritanceMode>,
    #[serde(default)]
    pub genes: Vec<GeneId>,
}

impl DiseaseRecord {
    /// The recorded frequency for `term` if directly annotated, else `None`.
    pub fn direct_frequency(&self, term: &TermId) -> Option<f64> {
        self.phenotypes
            .iter()
            .find(|p| &p.term == term)
            .map(|p| p.frequency)
    }

    /// The inheritance class used to size the genotype-LR threshold.
    /// Missing/unknown MoI, X-linked, and dominant annotations are all
    /// treated as dominant-like (threshold ≥ 1); only a disease annotated
    /// as recessive and *not* also dominant gets the stricter ≥ 2
    /// threshold.
    pub fn inheritance_class(&self) -> InheritanceClass {
        let is_recessive_only = !self.inheritance.is_empty()
            && self.inheritance.contains(&InheritanceMode::Recessive)
            && !self.inheritance.contains(&InheritanceMode::Dominant);
        if is_recessive_only {
            InheritanceClass::Recessive
        } else {
            InheritanceClass::Dominant
        }
    }

    /// A disease record with zero phenotypic abnormality annotations is a
    /// non-fatal warning condition: it is logged and dropped from scoring
    /// rather than failing the whole case.
    pub fn is_scoreable(&self) -> bool {
        !self.phenotypes.is_empty()
    }
}

/// The full disease corpus, keyed by disease id, preserving insertion
/// order (so iteration for background-index construction is
/// deterministic run-to-run).
#[derive(Debug, Clone, Default)]
pub struct DiseaseCorpus {
    records: IndexMap<DiseaseId, DiseaseRecord>,
}

/// On-disk shape of the corpus document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub diseases: Vec<DiseaseRecord>,
}

impl DiseaseCorpus {
    pub fn from_document(doc: CorpusDocument) -> Self {
        let mut records = IndexMap::new();
        let mut dropped = 0usize;
        for record in doc.diseases {
            if !record.is_scoreable() {
                tracing::warn!(
                    disease = %record.id,
                    "dropping disease record with zero phenotype annotations"
                );
                dropped += 1;
                continue;
            }
            records.insert(record.id.clone(), record);
        }
        if dropped > 0 {
            tracing::info!(dropped, "dropped disease records with no annotations");
        }
        DiseaseCorpus { records }
    }

    pub fn get(&self, id: &DiseaseId) -> Option<&DiseaseRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiseaseRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
