//! A RocksDB-backed cache for the computed [`BackgroundIndex`]: avoids
//! re-sweeping the full disease corpus on every invocation when the
//! corpus and ontology haven't changed since the last run. Two column
//! families: `"meta"` holds a fingerprint over the inputs, `"background"`
//! holds the serialized index payload.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use rocksdb::{Options, DB};

use crate::background::BackgroundIndex;
use crate::corpus::DiseaseCorpus;
use crate::err::AppError;
use crate::ontology::Ontology;

const CF_META: &str = "meta";
const CF_BACKGROUND: &str = "background";
const KEY_FINGERPRINT: &[u8] = b"fingerprint";
const KEY_CORPUS_SIZE: &[u8] = b"corpus_size";
const KEY_ENTRIES: &[u8] = b"entries";

/// A fingerprint over the inputs that determine a `BackgroundIndex`'s
/// contents: if either changes, any cached index is stale. Uses the
/// standard library's `DefaultHasher` rather than a cryptographic digest —
/// this is a cache-invalidation key, not a security boundary.
fn fingerprint(ontology: &Ontology, corpus: &DiseaseCorpus) -> u64 {
    let mut hasher = DefaultHasher::new();
    ontology.len().hash(&mut hasher);
    corpus.len().hash(&mut hasher);
    for disease in corpus.iter() {
        disease.id.0.hash(&mut hasher);
        disease.phenotypes.len().hash(&mut hasher);
    }
    hasher.finish()
}

fn open(path: &Path) -> Result<DB, AppError> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);
    DB::open_cf(&opts, path, [CF_META, CF_BACKGROUND])
        .map_err(|e| AppError::ConfigError(format!("could not open cache at {}: {e}", path.display())))
}

/// Load a cached `BackgroundIndex` from `path` if present and its
/// fingerprint matches `(ontology, corpus)`. Returns `Ok(None)` on a cold
/// or stale cache rather than an error — the caller is expected to build
/// and then [`store`] a fresh index in that case.
pub fn load(path: &Path, ontology: &Ontology, corpus: &DiseaseCorpus) -> Result<Option<BackgroundIndex>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let db = open(path)?;
    let cf_meta = db
        .cf_handle(CF_META)
        .expect("meta column family created at open");
    let cf_bg = db
        .cf_handle(CF_BACKGROUND)
        .expect("background column family created at open");

    let stored_fp = match db
        .get_cf(&cf_meta, KEY_FINGERPRINT)
        .map_err(|e| AppError::ConfigError(e.to_string()))?
    {
        Some(bytes) => u64::from_le_bytes(bytes.as_slice().try_into().map_err(|_| {
            AppError::ConfigError("corrupt fingerprint in cache".to_string())
        })?),
        None => return Ok(None),
    };

    if stored_fp != fingerprint(ontology, corpus) {
        tracing::info!("cache fingerprint mismatch, ignoring stale entry");
        return Ok(None);
    }

    let corpus_size = match db
        .get_cf(&cf_meta, KEY_CORPUS_SIZE)
        .map_err(|e| AppError::ConfigError(e.to_string()))?
    {
        Some(bytes) => usize::from_le_bytes(bytes.as_slice().try_into().map_err(|_| {
            AppError::ConfigError("corrupt corpus_size in cache".to_string())
        })?),
        None => return Ok(None),
    };

    let entries_bytes = match db
        .get_cf(&cf_bg, KEY_ENTRIES)
        .map_err(|e| AppError::ConfigError(e.to_string()))?
    {
        Some(bytes) => bytes,
        None => return Ok(None),
    };

    let entries: Vec<(crate::ontology::TermId, f64)> = serde_json::from_slice(&entries_bytes)
        .map_err(|e| AppError::ConfigError(format!("corrupt background entries in cache: {e}")))?;

    tracing::info!(terms = entries.len(), "loaded background index from cache");
    Ok(Some(BackgroundIndex::from_entries(entries, corpus_size)))
}

/// Persist `index` into the cache at `path`, stamped with the current
/// fingerprint of `(ontology, corpus)`.
pub fn store(
    path: &Path,
    ontology: &Ontology,
    corpus: &DiseaseCorpus,
    index: &BackgroundIndex,
) -> Result<(), AppError> {
    let db = open(path)?;
    let cf_meta = db
        .cf_handle(CF_META)
        .expect("meta column family created at open");
    let cf_bg = db
        .cf_handle(CF_BACKGROUND)
        .expect("background column family created at open");

    let fp = fingerprint(ontology, corpus);
    db.put_cf(&cf_meta, KEY_FINGERPRINT, fp.to_le_bytes())
        .map_err(|e| AppError::ConfigError(e.to_string()))?;
    db.put_cf(&cf_meta, KEY_CORPUS_SIZE, index.corpus_size().to_le_bytes())
        .map_err(|e| AppError::ConfigError(e.to_string()))?;

    let entries_bytes = serde_json::to_vec(&index.entries())
        .map_err(|e| AppError::ConfigError(format!("could not serialize background index: {e}")))?;
    db.put_cf(&cf_bg, KEY_ENTRIES, entries_bytes)
        .map_err(|e| AppError::ConfigError(e.to_string()))?;

    tracing::info!("stored background index in cache");
    Ok(())
}
