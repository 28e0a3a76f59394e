//! LIRICAL-style phenotype/genotype likelihood ratio scoring CLI.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args as ClapArgs, Parser, Subcommand};
use console::Term;
use indexmap::IndexMap;
use tracing::info;

use lirical_core::background::BackgroundIndex;
use lirical_core::cache;
use lirical_core::common::{self, trace_rss_now};
use lirical_core::config::{GenomeRelease, LiricalConfigBuilder, OutputFormat, TranscriptDb};
use lirical_core::corpus::{CorpusDocument, DiseaseCorpus, DiseaseId};
use lirical_core::evaluator::{evaluate_case, CaseQuery};
use lirical_core::gene_index::{GeneDiseaseIndex, GeneIndexDocument};
use lirical_core::ontology::{Ontology, OntologyBuilder, OntologyDocument, TermId};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Phenotype- and genotype-driven likelihood ratio scoring",
    long_about = "Ranks candidate Mendelian diseases for a patient by combining phenotype and genotype likelihood ratios"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build (and cache) the background term-frequency index for an
    /// ontology + disease corpus.
    PrepareBackground(PrepareBackgroundArgs),
    /// Score every disease in the corpus against a case query.
    Score(ScoreArgs),
}

#[derive(Debug, ClapArgs)]
pub struct PrepareBackgroundArgs {
    /// Path to the ontology JSON document.
    #[arg(long, required = true)]
    pub ontology: PathBuf,
    /// Path to the disease corpus JSON document.
    #[arg(long, required = true)]
    pub corpus: PathBuf,
    /// Path to the RocksDB cache directory to populate.
    #[arg(long, required = true)]
    pub cache: PathBuf,
}

#[derive(Debug, ClapArgs)]
pub struct ScoreArgs {
    /// Path to the ontology JSON document.
    #[arg(long, required = true)]
    pub ontology: PathBuf,
    /// Path to the disease corpus JSON document.
    #[arg(long, required = true)]
    pub corpus: PathBuf,
    /// Path to the gene index JSON document (symbols + background rates).
    #[arg(long)]
    pub genes: Option<PathBuf>,
    /// Path to the RocksDB cache directory; built on the fly if absent or
    /// stale.
    #[arg(long)]
    pub cache: Option<PathBuf>,
    /// Path to the case query JSON document (observed/excluded terms,
    /// optional genotype map).
    #[arg(long, required = true)]
    pub case: PathBuf,
    /// Path to an optional JSON document of disease id -> prior
    /// probability, overriding the uniform prior.
    #[arg(long)]
    pub prior: Option<PathBuf>,
    /// Optional exomiser-style variant frequency/pathogenicity database,
    /// required if the case query's genotype map is itself derived from
    /// one.
    #[arg(long)]
    pub exomiser_dir: Option<PathBuf>,
    /// Genome assembly the supplied gene/variant data was called against.
    #[arg(long, value_enum, default_value_t = GenomeRelease::Grch37)]
    pub assembly: GenomeRelease,
    /// Transcript database the supplied gene/variant data was annotated
    /// against.
    #[arg(long, value_enum, default_value_t = TranscriptDb::Refseq)]
    pub transcript_db: TranscriptDb,
    /// Rendering selector for the ranked output; this binary always
    /// prints JSON, but the selector is still validated and threaded
    /// through for a downstream renderer to act on.
    #[arg(long, value_enum, default_value_t = OutputFormat::Tsv)]
    pub output_format: OutputFormat,
    /// Count variants that failed the VCF FILTER column toward a gene's
    /// pathogenic burden instead of excluding them.
    #[arg(long)]
    pub ignore_filter_column: bool,
}

/// On-disk shape of a case query document.
#[derive(Debug, serde::Deserialize)]
struct CaseQueryDocument {
    #[serde(default)]
    observed: Vec<String>,
    #[serde(default)]
    excluded: Vec<String>,
    #[serde(default)]
    genotypes: Option<lirical_core::genotype::GenotypeMap>,
}

fn load_ontology(path: &PathBuf) -> anyhow::Result<Ontology> {
    let raw = std::fs::read_to_string(path)?;
    let doc: OntologyDocument = serde_json::from_str(&raw)?;
    Ok(OntologyBuilder::new().from_document(doc).build()?)
}

fn load_corpus(path: &PathBuf) -> anyhow::Result<DiseaseCorpus> {
    let raw = std::fs::read_to_string(path)?;
    let doc: CorpusDocument = serde_json::from_str(&raw)?;
    Ok(DiseaseCorpus::from_document(doc))
}

fn load_genes(path: Option<&PathBuf>, corpus: &DiseaseCorpus) -> anyhow::Result<GeneDiseaseIndex> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let doc: GeneIndexDocument = serde_json::from_str(&raw)?;
            Ok(GeneDiseaseIndex::from_document(corpus, doc))
        }
        None => Ok(GeneDiseaseIndex::from_document(corpus, GeneIndexDocument::default())),
    }
}

fn run_prepare_background(args: &PrepareBackgroundArgs) -> anyhow::Result<()> {
    info!("loading ontology from {:?}", args.ontology);
    let ontology = load_ontology(&args.ontology)?;
    info!("loading disease corpus from {:?}", args.corpus);
    let corpus = load_corpus(&args.corpus)?;

    trace_rss_now();
    let before = Instant::now();
    let index = BackgroundIndex::build(&ontology, &corpus)?;
    info!("built background index in {:?}", before.elapsed());
    trace_rss_now();

    cache::store(&args.cache, &ontology, &corpus, &index)?;
    info!("cached background index at {:?}", args.cache);
    Ok(())
}

fn run_score(args: &ScoreArgs) -> anyhow::Result<()> {
    let data_dir = args
        .ontology
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = LiricalConfigBuilder::default()
        .data_dir(data_dir)
        .exomiser_dir(args.exomiser_dir.clone())
        .assembly(args.assembly)
        .transcript_db(args.transcript_db)
        .background_file(args.cache.clone())
        .filter_on_filter_column(!args.ignore_filter_column)
        .output_format(args.output_format)
        .build()?;
    config.validate()?;
    info!(
        assembly = %config.assembly,
        transcript_db = %config.transcript_db,
        filter_on_filter_column = config.filter_on_filter_column,
        "scoring engine configuration validated"
    );

    info!("loading ontology from {:?}", args.ontology);
    let ontology = load_ontology(&args.ontology)?;
    info!("loading disease corpus from {:?}", args.corpus);
    let corpus = load_corpus(&args.corpus)?;
    let gene_index = load_genes(args.genes.as_ref(), &corpus)?;

    let background = match args.cache.as_ref().and_then(|p| cache::load(p, &ontology, &corpus).transpose()) {
        Some(cached) => cached?,
        None => {
            info!("no usable cache, building background index from scratch");
            let index = BackgroundIndex::build(&ontology, &corpus)?;
            if let Some(cache_path) = args.cache.as_ref() {
                cache::store(cache_path, &ontology, &corpus, &index)?;
            }
            index
        }
    };

    let raw = std::fs::read_to_string(&args.case)?;
    let case_doc: CaseQueryDocument = serde_json::from_str(&raw)?;
    let query = CaseQuery {
        observed: case_doc.observed.into_iter().map(TermId::from).collect(),
        excluded: case_doc.excluded.into_iter().map(TermId::from).collect(),
        genotypes: case_doc.genotypes,
    };

    let prior: Option<IndexMap<DiseaseId, f64>> = match args.prior.as_ref() {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Some(serde_json::from_str(&raw)?)
        }
        None => None,
    };

    trace_rss_now();
    let before = Instant::now();
    let (scores, metadata) = evaluate_case(
        &ontology,
        &background,
        &corpus,
        &gene_index,
        &query,
        prior.as_ref(),
        config.filter_on_filter_column,
    )?;
    info!("scored {} diseases in {:?}", metadata.diseases_scored, before.elapsed());
    trace_rss_now();

    let rendered: Vec<_> = scores
        .iter()
        .map(|s| {
            serde_json::json!({
                "disease": s.disease.0,
                "disease_name": s.disease_name,
                "log_lr": s.log_lr,
                "posterior": s.posterior,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rendered)?);

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::PrepareBackground(args) => run_prepare_background(args)?,
            Commands::Score(args) => run_score(args)?,
        }
        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line("done.")?;

    Ok(())
}
