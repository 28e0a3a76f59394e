//! Gene identifiers and the gene↔disease index: gene→diseases and
//! disease→genes multimaps, gene id→symbol, and the background gene
//! mutation-rate table consumed by the genotype LR.

use indexmap::IndexMap;
use multimap::MultiMap;
use serde::{Deserialize, Serialize};

use crate::corpus::{DiseaseCorpus, DiseaseId};

/// A gene identifier, e.g. an NCBI/Entrez gene id or an HGNC id string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeneId(pub String);

impl std::fmt::Display for GeneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GeneId {
    fn from(s: &str) -> Self {
        GeneId(s.to_string())
    }
}

/// The gene→disease / disease→gene multimaps plus gene metadata, built
/// once from the disease corpus (a disease's `genes` field) and an
/// external gene-symbol / background-rate table.
#[derive(Debug, Clone, Default)]
pub struct GeneDiseaseIndex {
    gene_to_diseases: MultiMap<GeneId, DiseaseId>,
    disease_to_genes: MultiMap<DiseaseId, GeneId>,
    symbols: IndexMap<GeneId, String>,
    /// Background expected pathogenic-allele count per gene, `λ_bg`.
    background_rates: IndexMap<GeneId, f64>,
}

/// Default background rate applied to a gene absent from the supplied
/// rate table, so a gene with no tabulated background still yields a
/// finite, conservative genotype LR rather than a numeric error.
pub const DEFAULT_BACKGROUND_RATE: f64 = 1e-4;

/// On-disk shape of the external gene→symbol / gene→background-rate
/// tables, loaded alongside the disease corpus to build a
/// [`GeneDiseaseIndex`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneIndexDocument {
    #[serde(default)]
    pub symbols: IndexMap<GeneId, String>,
    #[serde(default)]
    pub background_rates: IndexMap<GeneId, f64>,
}

impl GeneDiseaseIndex {
    /// Build the index from the corpus's per-disease `genes` links plus an
    /// external gene→symbol table and gene→λ_bg background-rate table.
    pub fn build(
        corpus: &DiseaseCorpus,
        symbols: IndexMap<GeneId, String>,
        background_rates: IndexMap<GeneId, f64>,
    ) -> Self {
        let mut gene_to_diseases: MultiMap<GeneId, DiseaseId> = MultiMap::new();
        let mut disease_to_genes: MultiMap<DiseaseId, GeneId> = MultiMap::new();

        for record in corpus.iter() {
            for gene in &record.genes {
                disease_to_genes.insert(record.id.clone(), gene.clone());
                gene_to_diseases.insert(gene.clone(), record.id.clone());
            }
        }

        GeneDiseaseIndex {
            gene_to_diseases,
            disease_to_genes,
            symbols,
            background_rates,
        }
    }

    /// Build the index from a corpus plus a [`GeneIndexDocument`] loaded
    /// from disk.
    pub fn from_document(corpus: &DiseaseCorpus, doc: GeneIndexDocument) -> Self {
        Self::build(corpus, doc.symbols, doc.background_rates)
    }

    /// Genes linked to `disease`. Empty if the disease has no linked gene
    /// (the genotype LR is then uninformative, i.e. `1.0`).
    pub fn genes_for(&self, disease: &DiseaseId) -> &[GeneId] {
        self.disease_to_genes
            .get_vec(disease)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn diseases_for(&self, gene: &GeneId) -> &[DiseaseId] {
        self.gene_to_diseases
            .get_vec(gene)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn symbol(&self, gene: &GeneId) -> Option<&str> {
        self.symbols.get(gene).map(String::as_str)
    }

    /// `λ_bg` for `gene`, falling back to `DEFAULT_BACKGROUND_RATE` (logged)
    /// when the gene is absent from the background-rate table rather than
    /// being treated as a hard failure — an unrecognized gene is non-fatal.
    pub fn background_rate(&self, gene: &GeneId) -> f64 {
        match self.background_rates.get(gene) {
            Some(&rate) => rate,
            None => {
                tracing::debug!(gene = %gene, "no background rate tabulated, using default");
                DEFAULT_BACKGROUND_RATE
            }
        }
    }

    pub fn known_gene(&self, gene: &GeneId) -> bool {
        self.symbols.contains_key(gene) || self.gene_to_diseases.contains_key(gene)
    }
}
