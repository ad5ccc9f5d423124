//! In-memory generational vector index.
//!
//! Chunks and their embeddings are built into an immutable
//! [`IndexGeneration`]; the process-wide [`ActiveIndex`] holds the current
//! generation behind an `Arc` and swaps it atomically on re-index.
//! Readers take a snapshot `Arc` and are never exposed to a half-populated
//! index, and a build failure leaves the previous generation serving.
//!
//! Search applies the metadata predicate **before** similarity ranking:
//! excluded chunks never appear in results regardless of similarity.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use sha2::{Digest, Sha256};

use crate::embedding::{cosine_similarity, unit_similarity};
use crate::error::IndexBuildError;
use crate::models::{Chunk, ChunkMeta, ChunkType, DateRange};

/// A chunk paired with its embedding, ready for indexing.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Hard metadata predicate applied before similarity ranking.
///
/// Campaign restriction applies to every chunk kind; the date range only
/// constrains `daily_performance` and `insight` chunks, whose text speaks
/// about specific dates. Metric and audience preferences are soft and
/// belong to reranking, not to this predicate.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub campaign_ids: Vec<String>,
    pub date_range: Option<DateRange>,
}

impl ChunkFilter {
    pub fn is_empty(&self) -> bool {
        self.campaign_ids.is_empty() && self.date_range.is_none()
    }

    pub fn matches(&self, kind: ChunkType, meta: &ChunkMeta) -> bool {
        if !self.campaign_ids.is_empty() {
            let hit = meta
                .campaign_ids
                .iter()
                .any(|id| self.campaign_ids.iter().any(|f| f.eq_ignore_ascii_case(id)));
            if !hit {
                return false;
            }
        }

        if let Some(range) = &self.date_range {
            if matches!(kind, ChunkType::DailyPerformance | ChunkType::Insight) {
                match &meta.date_range {
                    Some(chunk_range) => {
                        if !range.overlaps(chunk_range) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
        }

        true
    }
}

/// One immutable, fully-built index generation.
#[derive(Debug, Default)]
pub struct IndexGeneration {
    entries: Vec<IndexEntry>,
    by_id: HashMap<String, usize>,
}

impl IndexGeneration {
    /// Build a generation from entries.
    ///
    /// Re-indexing is idempotent: a repeated id with byte-identical text
    /// replaces the earlier entry. A repeated id with *different* text is
    /// a consistency failure — the whole generation is rejected so the
    /// previously active one keeps serving.
    pub fn build(entries: Vec<IndexEntry>) -> Result<IndexGeneration, IndexBuildError> {
        let dims = entries.first().map(|e| e.vector.len()).unwrap_or(0);

        let mut by_id: HashMap<String, usize> = HashMap::new();
        let mut kept: Vec<IndexEntry> = Vec::with_capacity(entries.len());
        let mut hashes: HashMap<String, [u8; 32]> = HashMap::new();

        for entry in entries {
            if entry.vector.len() != dims {
                return Err(IndexBuildError::DimensionMismatch {
                    chunk_id: entry.chunk.id.clone(),
                    got: entry.vector.len(),
                    expected: dims,
                });
            }

            let hash: [u8; 32] = Sha256::digest(entry.chunk.text.as_bytes()).into();
            match by_id.get(&entry.chunk.id) {
                Some(&slot) => {
                    let prior = hashes.get(&entry.chunk.id).expect("hash recorded with slot");
                    if *prior != hash {
                        return Err(IndexBuildError::ChunkCollision {
                            chunk_id: entry.chunk.id.clone(),
                        });
                    }
                    kept[slot] = entry;
                }
                None => {
                    by_id.insert(entry.chunk.id.clone(), kept.len());
                    hashes.insert(entry.chunk.id.clone(), hash);
                    kept.push(entry);
                }
            }
        }

        Ok(IndexGeneration { entries: kept, by_id })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, chunk_id: &str) -> Option<&Chunk> {
        self.by_id.get(chunk_id).map(|&i| &self.entries[i].chunk)
    }

    /// Chunk counts per kind, for stats output.
    pub fn kind_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.chunk.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Filter-then-rank search.
    ///
    /// Applies `filter` first, then ranks the survivors by cosine
    /// similarity mapped into `[0, 1]`, descending, with chunk id as the
    /// deterministic tiebreak. Returns at most `k` results.
    pub fn search(
        &self,
        query_vec: &[f32],
        filter: Option<&ChunkFilter>,
        k: usize,
    ) -> Vec<(&Chunk, f64)> {
        let mut hits: Vec<(&Chunk, f64)> = self
            .entries
            .iter()
            .filter(|e| {
                filter.map_or(true, |f| f.matches(e.chunk.kind, &e.chunk.meta))
            })
            .map(|e| {
                let sim = unit_similarity(cosine_similarity(query_vec, &e.vector));
                (&e.chunk, sim)
            })
            .collect();

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        hits.truncate(k);
        hits
    }
}

/// Process-scoped handle to the currently active index generation.
///
/// Owned by the orchestrator's construction context and passed explicitly
/// to the retriever; there is no module-level singleton. `load` is cheap
/// (an `Arc` clone) and queries keep their snapshot for the whole request,
/// so an in-flight re-index never disturbs them.
pub struct ActiveIndex {
    current: RwLock<Arc<IndexGeneration>>,
}

impl ActiveIndex {
    /// Start with an empty generation; queries against it degrade rather
    /// than fail.
    pub fn empty() -> ActiveIndex {
        ActiveIndex {
            current: RwLock::new(Arc::new(IndexGeneration::default())),
        }
    }

    pub fn new(generation: IndexGeneration) -> ActiveIndex {
        ActiveIndex {
            current: RwLock::new(Arc::new(generation)),
        }
    }

    /// Snapshot the active generation.
    pub fn load(&self) -> Arc<IndexGeneration> {
        self.current.read().expect("index lock poisoned").clone()
    }

    /// Atomically replace the active generation, returning the previous
    /// one. Callers that fail to *build* a generation simply never reach
    /// this point, which is how a failed run keeps the old data serving.
    pub fn swap(&self, generation: IndexGeneration) -> Arc<IndexGeneration> {
        let mut guard = self.current.write().expect("index lock poisoned");
        std::mem::replace(&mut *guard, Arc::new(generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMeta, Metric};

    fn chunk(id: &str, kind: ChunkType, text: &str, campaign: Option<&str>, range: Option<DateRange>) -> Chunk {
        Chunk {
            id: id.to_string(),
            kind,
            text: text.to_string(),
            meta: ChunkMeta {
                campaign_ids: campaign.map(|c| vec![c.to_string()]).unwrap_or_default(),
                industry: None,
                audience: None,
                date_range: range,
                metrics: vec![Metric::Cpm],
                tier: None,
            },
        }
    }

    fn entry(id: &str, kind: ChunkType, campaign: Option<&str>, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: chunk(id, kind, &format!("text for {}", id), campaign, None),
            vector,
        }
    }

    fn range(a: &str, b: &str) -> DateRange {
        DateRange::new(a.parse().unwrap(), b.parse().unwrap())
    }

    #[test]
    fn test_build_rejects_conflicting_duplicate_ids() {
        let a = IndexEntry {
            chunk: chunk("c1", ChunkType::Overview, "one", Some("camp_001"), None),
            vector: vec![1.0, 0.0],
        };
        let b = IndexEntry {
            chunk: chunk("c1", ChunkType::Overview, "different", Some("camp_001"), None),
            vector: vec![0.0, 1.0],
        };
        let err = IndexGeneration::build(vec![a, b]).unwrap_err();
        assert!(matches!(err, IndexBuildError::ChunkCollision { .. }));
    }

    #[test]
    fn test_build_replaces_identical_duplicates() {
        let a = IndexEntry {
            chunk: chunk("c1", ChunkType::Overview, "same", Some("camp_001"), None),
            vector: vec![1.0, 0.0],
        };
        let b = IndexEntry {
            chunk: chunk("c1", ChunkType::Overview, "same", Some("camp_001"), None),
            vector: vec![0.0, 1.0],
        };
        let generation = IndexGeneration::build(vec![a, b]).unwrap();
        assert_eq!(generation.len(), 1);
    }

    #[test]
    fn test_build_rejects_dimension_mismatch() {
        let a = entry("c1", ChunkType::Overview, Some("camp_001"), vec![1.0, 0.0]);
        let b = entry("c2", ChunkType::Overview, Some("camp_002"), vec![1.0]);
        let err = IndexGeneration::build(vec![a, b]).unwrap_err();
        assert!(matches!(err, IndexBuildError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_filter_excludes_regardless_of_similarity() {
        // c2 is a perfect match for the query vector but belongs to the
        // wrong campaign; it must never appear.
        let a = entry("c1", ChunkType::Overview, Some("camp_001"), vec![0.1, 1.0]);
        let b = entry("c2", ChunkType::Overview, Some("camp_002"), vec![1.0, 0.0]);
        let generation = IndexGeneration::build(vec![a, b]).unwrap();

        let filter = ChunkFilter {
            campaign_ids: vec!["camp_001".to_string()],
            date_range: None,
        };
        let hits = generation.search(&[1.0, 0.0], Some(&filter), 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, "c1");
    }

    #[test]
    fn test_date_filter_constrains_dated_kinds_only() {
        let daily_in = IndexEntry {
            chunk: chunk("d1", ChunkType::DailyPerformance, "in range", Some("camp_001"), Some(range("2024-11-03", "2024-11-03"))),
            vector: vec![1.0, 0.0],
        };
        let daily_out = IndexEntry {
            chunk: chunk("d2", ChunkType::DailyPerformance, "out of range", Some("camp_001"), Some(range("2024-10-01", "2024-10-01"))),
            vector: vec![1.0, 0.0],
        };
        let overview = IndexEntry {
            chunk: chunk("o1", ChunkType::Overview, "overview", Some("camp_001"), Some(range("2024-10-01", "2024-11-30"))),
            vector: vec![1.0, 0.0],
        };
        let generation = IndexGeneration::build(vec![daily_in, daily_out, overview]).unwrap();

        let filter = ChunkFilter {
            campaign_ids: Vec::new(),
            date_range: Some(range("2024-11-01", "2024-11-07")),
        };
        let hits = generation.search(&[1.0, 0.0], Some(&filter), 10);
        let ids: Vec<&str> = hits.iter().map(|(c, _)| c.id.as_str()).collect();
        assert!(ids.contains(&"d1"));
        assert!(!ids.contains(&"d2"));
        assert!(ids.contains(&"o1"), "undated kinds pass the date filter");
    }

    #[test]
    fn test_search_respects_k_and_similarity_bounds() {
        let entries: Vec<IndexEntry> = (0..20)
            .map(|i| entry(&format!("c{:02}", i), ChunkType::Overview, Some("camp_001"), vec![i as f32, 1.0]))
            .collect();
        let generation = IndexGeneration::build(entries).unwrap();
        let hits = generation.search(&[1.0, 1.0], None, 5);
        assert_eq!(hits.len(), 5);
        for (_, score) in &hits {
            assert!((0.0..=1.0).contains(score));
        }
    }

    #[test]
    fn test_swap_is_atomic_for_readers() {
        let gen1 = IndexGeneration::build(vec![entry("c1", ChunkType::Overview, Some("camp_001"), vec![1.0, 0.0])]).unwrap();
        let active = ActiveIndex::new(gen1);

        let snapshot = active.load();
        assert_eq!(snapshot.len(), 1);

        let gen2 = IndexGeneration::build(vec![
            entry("c2", ChunkType::Overview, Some("camp_002"), vec![1.0, 0.0]),
            entry("c3", ChunkType::Overview, Some("camp_003"), vec![0.0, 1.0]),
        ])
        .unwrap();
        let old = active.swap(gen2);

        // The reader's snapshot still sees the old generation in full.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(old.len(), 1);
        assert_eq!(active.load().len(), 2);
    }

    #[test]
    fn test_failed_build_leaves_previous_generation_serving() {
        let gen1 = IndexGeneration::build(vec![entry("c1", ChunkType::Overview, Some("camp_001"), vec![1.0, 0.0])]).unwrap();
        let active = ActiveIndex::new(gen1);

        let bad = vec![
            IndexEntry { chunk: chunk("dup", ChunkType::Overview, "x", None, None), vector: vec![1.0, 0.0] },
            IndexEntry { chunk: chunk("dup", ChunkType::Overview, "y", None, None), vector: vec![1.0, 0.0] },
        ];
        assert!(IndexGeneration::build(bad).is_err());
        assert_eq!(active.load().len(), 1);
    }
}
