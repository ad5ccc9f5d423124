//! Core data models for the adlens retrieval pipeline.
//!
//! These types represent the campaign records that flow into the chunker,
//! the chunks stored in the vector index, and the entities extracted from
//! user queries.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single campaign as supplied by the data-loading collaborator.
///
/// Immutable once loaded. Schema validation (non-empty id, parseable
/// dates, non-negative metrics) is the loader's responsibility, not the
/// chunker's.
#[derive(Debug, Clone)]
pub struct CampaignRecord {
    /// Unique campaign identifier, e.g. `camp_001`.
    pub id: String,
    /// Human-readable campaign name.
    pub name: String,
    /// Industry vertical, e.g. `Fashion`, `Electronics`.
    pub industry: String,
    /// Audience type, e.g. `retargeting`, `lookalike`.
    pub audience: String,
    /// Optional campaign objective, e.g. `conversions`.
    pub objective: Option<String>,
    /// Optional delivery status, e.g. `active`, `paused`.
    pub status: Option<String>,
    /// Per-day metrics, ordered by date.
    pub daily: BTreeMap<NaiveDate, DailyMetrics>,
}

/// One day of campaign performance.
///
/// `ctr`, `cpm`, and `cpc` are derived values carried alongside the raw
/// counts; the chunker checks them against the counts within a tolerance
/// and flags (but does not reject) inconsistencies.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub conversions: u64,
    /// Click-through rate, percent.
    pub ctr: f64,
    /// Cost per thousand impressions, dollars.
    pub cpm: f64,
    /// Cost per click, dollars.
    pub cpc: f64,
    /// Return on ad spend, multiple.
    pub roas: f64,
    /// Average impressions per reached user.
    #[serde(default)]
    pub frequency: f64,
}

/// Closed metric vocabulary used by entity extraction and chunk metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Impressions,
    Clicks,
    Spend,
    Conversions,
    Ctr,
    Cpm,
    Cpc,
    Roas,
    Frequency,
}

impl Metric {
    /// Parse a normalized (lowercase) query token into a metric name.
    ///
    /// Accepts the singular/plural and a few common aliases; returns
    /// `None` for anything outside the closed vocabulary.
    pub fn parse(token: &str) -> Option<Metric> {
        match token {
            "impression" | "impressions" => Some(Metric::Impressions),
            "click" | "clicks" => Some(Metric::Clicks),
            "spend" | "spending" | "cost" | "costs" => Some(Metric::Spend),
            "conversion" | "conversions" => Some(Metric::Conversions),
            "ctr" => Some(Metric::Ctr),
            "cpm" => Some(Metric::Cpm),
            "cpc" => Some(Metric::Cpc),
            "roas" => Some(Metric::Roas),
            "frequency" => Some(Metric::Frequency),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Impressions => "impressions",
            Metric::Clicks => "clicks",
            Metric::Spend => "spend",
            Metric::Conversions => "conversions",
            Metric::Ctr => "ctr",
            Metric::Cpm => "cpm",
            Metric::Cpc => "cpc",
            Metric::Roas => "roas",
            Metric::Frequency => "frequency",
        }
    }
}

/// The five chunk kinds produced by the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Overview,
    DailyPerformance,
    Insight,
    Comparison,
    GlobalInsight,
}

impl ChunkType {
    /// Slug used in chunk ids and attribution prefixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Overview => "overview",
            ChunkType::DailyPerformance => "daily_performance",
            ChunkType::Insight => "insight",
            ChunkType::Comparison => "comparison",
            ChunkType::GlobalInsight => "global_insight",
        }
    }

    /// Specificity rank used for deterministic tie-breaking: higher means
    /// the chunk speaks about a narrower slice of the data.
    pub fn specificity(&self) -> u8 {
        match self {
            ChunkType::Insight => 4,
            ChunkType::DailyPerformance => 3,
            ChunkType::Comparison => 2,
            ChunkType::Overview => 1,
            ChunkType::GlobalInsight => 0,
        }
    }
}

/// Coarse performance bucket derived from average ROAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    High,
    Mid,
    Low,
}

impl PerformanceTier {
    pub fn from_roas(avg_roas: f64) -> PerformanceTier {
        if avg_roas >= 3.0 {
            PerformanceTier::High
        } else if avg_roas >= 1.5 {
            PerformanceTier::Mid
        } else {
            PerformanceTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTier::High => "high",
            PerformanceTier::Mid => "mid",
            PerformanceTier::Low => "low",
        }
    }
}

/// An inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> DateRange {
        if start <= end {
            DateRange { start, end }
        } else {
            DateRange { start: end, end: start }
        }
    }

    pub fn single(date: NaiveDate) -> DateRange {
        DateRange { start: date, end: date }
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

/// Metadata attached to every chunk; drives predicate filtering and
/// source attribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Campaigns this chunk speaks about. Empty for portfolio-level chunks,
    /// two entries for pairwise comparisons.
    pub campaign_ids: Vec<String>,
    pub industry: Option<String>,
    pub audience: Option<String>,
    pub date_range: Option<DateRange>,
    /// Metric names whose values appear in the chunk text.
    pub metrics: Vec<Metric>,
    pub tier: Option<PerformanceTier>,
}

/// A retrievable, metadata-tagged text fragment derived from campaign data.
///
/// Immutable after creation. `id` is a deterministic function of the
/// campaign ids, the chunk kind, and the date range, so re-chunking the
/// same record always reproduces the same ids (idempotent re-indexing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub kind: ChunkType,
    pub text: String,
    pub meta: ChunkMeta,
}
