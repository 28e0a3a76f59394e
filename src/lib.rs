//! LIRICAL-style phenotype- and genotype-driven likelihood ratio scoring
//! core: given an ontology, a disease corpus, a gene index, and a case
//! query, ranks candidate diseases by posterior probability.

pub mod background;
pub mod cache;
pub mod common;
pub mod config;
pub mod corpus;
pub mod err;
pub mod evaluator;
pub mod gene_index;
pub mod genotype;
pub mod ontology;
pub mod pheno_lr;

pub use background::BackgroundIndex;
pub use corpus::{DiseaseCorpus, DiseaseId, DiseaseRecord};
pub use err::{AppError, Result};
pub use evaluator::{evaluate_case, CaseMetadata, CaseQuery, DiseaseScore};
pub use gene_index::{GeneDiseaseIndex, GeneId, GeneIndexDocument};
pub use genotype::{Gene2Genotype, GenotypeMap};
pub use ontology::{Ontology, TermId};
