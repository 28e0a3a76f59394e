//! A from-scratch, vocabulary-agnostic phenotype ontology representation.
//!
//! Terms are stored as two parallel arrays (dense `u32` indices, CSR-style
//! child→parent edge lists) with a `TermId → index` map built once at
//! construction time. Every term's ancestor set (including itself) is
//! precomputed as a bitset, so `is_subclass` and `ancestors` are O(1) /
//! O(bitset words) instead of a per-query graph walk.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::err::AppError;

/// A stable string identifier for an ontology term, e.g. `"HP:0001250"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TermId(pub String);

impl TermId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TermId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TermId {
    fn from(s: &str) -> Self {
        TermId(s.to_string())
    }
}

impl From<String> for TermId {
    fn from(s: String) -> Self {
        TermId(s)
    }
}

/// A fixed-size-word bitset over dense term indices.
///
/// Rolled by hand rather than pulling in a bitset crate: a `Vec<u64>` of
/// words is all a medium-sized ontology (HPO fits comfortably) needs.
#[derive(Debug, Clone, Default)]
struct Bitset {
    words: Vec<u64>,
}

impl Bitset {
    fn with_capacity(n_bits: usize) -> Self {
        Bitset {
            words: vec![0u64; (n_bits + 63) / 64],
        }
    }

    fn insert(&mut self, idx: u32) {
        let (word, bit) = (idx as usize / 64, idx as usize % 64);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << bit;
    }

    fn contains(&self, idx: u32) -> bool {
        let (word, bit) = (idx as usize / 64, idx as usize % 64);
        self.words.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
    }

    fn union_with(&mut self, other: &Bitset) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    fn iter_set_bits(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..64u32).filter_map(move |bit| {
                if w & (1u64 << bit) != 0 {
                    Some((wi as u32) * 64 + bit)
                } else {
                    None
                }
            })
        })
    }

    fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// The phenotype ontology: a DAG of terms rooted at a single "phenotypic
/// abnormality" term, plus a name table and an alias/primary-id table.
#[derive(Debug, Clone)]
pub struct Ontology {
    /// Dense index → term id.
    terms: Vec<TermId>,
    /// Term id → dense index, built once.
    index: IndexMap<TermId, u32>,
    /// Dense index → human-readable name.
    names: Vec<String>,
    /// Dense index → direct parent indices (`is_a` edges).
    parents: Vec<Vec<u32>>,
    /// Dense index → direct child indices (inverse of `parents`).
    children: Vec<Vec<u32>>,
    /// Dense index → ancestor-or-self bitset, precomputed at construction.
    ancestor_bitsets: Vec<Bitset>,
    /// Alternate/obsolete id → primary id, for canonicalization.
    aliases: IndexMap<TermId, TermId>,
    /// Index of the designated root, e.g. "phenotypic abnormality".
    root: u32,
}

impl Ontology {
    /// Canonicalize a term id via the alias table, then resolve to its
    /// dense index. Fails with `UnknownTerm` if neither the id nor its
    /// alias target is known.
    pub fn resolve(&self, t: &TermId) -> Result<u32, AppError> {
        if let Some(&idx) = self.index.get(t) {
            return Ok(idx);
        }
        if let Some(primary) = self.aliases.get(t) {
            if let Some(&idx) = self.index.get(primary) {
                return Ok(idx);
            }
        }
        Err(AppError::UnknownTerm(t.as_str().to_string()))
    }

    /// The canonical (primary) id for a term, resolving aliases.
    pub fn primary_id(&self, t: &TermId) -> Result<TermId, AppError> {
        let idx = self.resolve(t)?;
        Ok(self.terms[idx as usize].clone())
    }

    /// Whether `t` is reachable from the ontology root, i.e. is a genuine
    /// phenotypic abnormality term (not, say, a "mode of inheritance" term).
    pub fn is_phenotypic_abnormality(&self, t: &TermId) -> bool {
        match self.resolve(t) {
            Ok(idx) => self.ancestor_bitsets[idx as usize].contains(self.root) || idx == self.root,
            Err(_) => false,
        }
    }

    pub fn term_name(&self, t: &TermId) -> Result<&str, AppError> {
        let idx = self.resolve(t)?;
        Ok(&self.names[idx as usize])
    }

    /// `is_subclass(child, parent)`: true iff `parent` is an ancestor of
    /// `child` (reflexively: a term is a subclass of itself).
    pub fn is_subclass(&self, child: &TermId, parent: &TermId) -> Result<bool, AppError> {
        let child_idx = self.resolve(child)?;
        let parent_idx = self.resolve(parent)?;
        Ok(child_idx == parent_idx || self.ancestor_bitsets[child_idx as usize].contains(parent_idx))
    }

    /// All ancestors of `t`, including `t` itself.
    pub fn ancestors(&self, t: &TermId) -> Result<Vec<TermId>, AppError> {
        let idx = self.resolve(t)?;
        Ok(self
            .ancestor_bitsets[idx as usize]
            .iter_set_bits()
            .map(|i| self.terms[i as usize].clone())
            .collect())
    }

    fn ancestor_bitset(&self, t: &TermId) -> Result<&Bitset, AppError> {
        let idx = self.resolve(t)?;
        Ok(&self.ancestor_bitsets[idx as usize])
    }

    /// The union of `ancestors(t, incl=true)` over a set of annotated terms
    /// — the combined ancestor closure used when averaging the query-is-
    /// ancestor fuzzy-match case over every disease annotation it subsumes.
    pub fn ancestors_of_set<'a>(
        &self,
        terms: impl IntoIterator<Item = &'a TermId>,
    ) -> Result<Vec<TermId>, AppError> {
        let mut acc = Bitset::with_capacity(self.terms.len());
        for t in terms {
            acc.union_with(self.ancestor_bitset(t)?);
        }
        Ok(acc
            .iter_set_bits()
            .map(|i| self.terms[i as usize].clone())
            .collect())
    }

    /// Breadth-first walk from `q` upward through `is_a` parents, yielding
    /// `(term, distance)` pairs in order of first discovery (`q` itself at
    /// distance 0). Used by the phenotype-LR fuzzy-match branch that
    /// searches for the nearest informative shared ancestor.
    ///
    /// `distance` is edge-count from `q` (see DESIGN.md for why this, and
    /// not raw BFS visit order, is the chosen reading of the open question
    /// in the distilled spec).
    pub fn ancestors_with_distance(&self, q: &TermId) -> Result<Vec<(TermId, usize)>, AppError> {
        let start = self.resolve(q)?;
        let mut seen = vec![false; self.terms.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((start, 0usize));
        seen[start as usize] = true;
        while let Some((idx, dist)) = queue.pop_front() {
            order.push((self.terms[idx as usize].clone(), dist));
            for &p in &self.parents[idx as usize] {
                if !seen[p as usize] {
                    seen[p as usize] = true;
                    queue.push_back((p, dist + 1));
                }
            }
        }
        Ok(order)
    }

    /// All descendants of `root_term` (including itself), via BFS over the
    /// inverse (`children`) edges. Used to enumerate every phenotypic
    /// abnormality term for background-index seeding.
    pub fn descendants(&self, root_term: &TermId) -> Result<Vec<TermId>, AppError> {
        let start = self.resolve(root_term)?;
        let mut seen = vec![false; self.terms.len()];
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        seen[start as usize] = true;
        while let Some(idx) = queue.pop_front() {
            out.push(self.terms[idx as usize].clone());
            for &c in &self.children[idx as usize] {
                if !seen[c as usize] {
                    seen[c as usize] = true;
                    queue.push_back(c);
                }
            }
        }
        Ok(out)
    }

    pub fn root_id(&self) -> &TermId {
        &self.terms[self.root as usize]
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Raw, on-disk representation of an ontology, e.g. loaded from a JSON
/// document. Parsing the real HPO OBO/JSON release format lives outside
/// this crate; this struct pins the minimal shape the scoring core needs
/// from whatever external parser produces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyDocument {
    pub root: String,
    pub terms: Vec<OntologyTermDocument>,
    #[serde(default)]
    pub aliases: IndexMap<String, String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyTermDocument {
    pub id: String,
    pub name: String,
    /// Direct `is_a` parents.
    #[serde(default)]
    pub parents: Vec<String>,
}

/// Builder for `Ontology`: accumulate terms and edges, then a single
/// `build()` that performs the one-time topological sweep computing
/// ancestor bitsets and fails fast on a malformed (non-DAG, or
/// disconnected-from-root) input.
#[derive(Debug, Default)]
pub struct OntologyBuilder {
    doc: Option<OntologyDocument>,
}

impl OntologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(mut self, doc: OntologyDocument) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn build(self) -> Result<Ontology, AppError> {
        let doc = self
            .doc
            .ok_or_else(|| AppError::ConfigError("no ontology document supplied".to_string()))?;

        let mut index: IndexMap<TermId, u32> = IndexMap::new();
        let mut terms: Vec<TermId> = Vec::with_capacity(doc.terms.len());
        let mut names: Vec<String> = Vec::with_capacity(doc.terms.len());
        for t in &doc.terms {
            let id = TermId::from(t.id.clone());
            let idx = terms.len() as u32;
            index.insert(id.clone(), idx);
            terms.push(id);
            names.push(t.name.clone());
        }

        let root = TermId::from(doc.root.clone());
        let root_idx = *index
            .get(&root)
            .ok_or_else(|| AppError::ConfigError(format!("root term {} not in ontology", root)))?;

        let mut parents: Vec<Vec<u32>> = vec![Vec::new(); terms.len()];
        for (i, t) in doc.terms.iter().enumerate() {
            for p in &t.parents {
                let pid = TermId::from(p.clone());
                let pidx = *index.get(&pid).ok_or_else(|| {
                    AppError::ConfigError(format!("parent term {} not in ontology", pid))
                })?;
                parents[i].push(pidx);
            }
        }

        let mut children: Vec<Vec<u32>> = vec![Vec::new(); terms.len()];
        for (child_idx, ps) in parents.iter().enumerate() {
            for &p in ps {
                children[p as usize].push(child_idx as u32);
            }
        }

        let ancestor_bitsets = Self::compute_ancestor_bitsets(&parents)?;

        let aliases = doc
            .aliases
            .into_iter()
            .map(|(k, v)| (TermId::from(k), TermId::from(v)))
            .collect();

        Ok(Ontology {
            terms,
            index,
            names,
            parents,
            children,
            ancestor_bitsets,
            aliases,
            root: root_idx,
        })
    }

    /// Kahn-style topological sweep: a term's ancestor bitset is the union
    /// of its parents' ancestor bitsets plus itself, so parents must be
    /// fully processed before any child is. Detects cycles by checking
    /// every node was eventually processed.
    fn compute_ancestor_bitsets(parents: &[Vec<u32>]) -> Result<Vec<Bitset>, AppError> {
        let n = parents.len();
        let mut children: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut indegree = vec![0u32; n];
        for (child, ps) in parents.iter().enumerate() {
            indegree[child] = ps.len() as u32;
            for &p in ps {
                children[p as usize].push(child as u32);
            }
        }

        let mut bitsets: Vec<Option<Bitset>> = vec![None; n];
        let mut queue: VecDeque<u32> = (0..n as u32).filter(|&i| indegree[i as usize] == 0).collect();
        let mut processed = 0usize;

        while let Some(idx) = queue.pop_front() {
            let mut bs = Bitset::with_capacity(n);
            bs.insert(idx);
            for &p in &parents[idx as usize] {
                let parent_bs = bitsets[p as usize]
                    .as_ref()
                    .expect("parent processed before child by construction");
                bs.union_with(parent_bs);
            }
            bitsets[idx as usize] = Some(bs);
            processed += 1;

            for &c in &children[idx as usize] {
                indegree[c as usize] -= 1;
                if indegree[c as usize] == 0 {
                    queue.push_back(c);
                }
            }
        }

        if processed != n {
            return Err(AppError::ConfigError(
                "ontology is not acyclic: could not topologically order all terms".to_string(),
            ));
        }

        Ok(bitsets.into_iter().map(|b| b.expect("all processed")).collect())
    }
}
