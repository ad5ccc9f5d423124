//! Campaign data loading.
//!
//! Reads the campaigns JSON file and normalizes it into
//! [`CampaignRecord`]s. Schema violations — missing ids, duplicate ids,
//! unparseable dates, negative metrics — are rejected here, before the
//! chunker ever sees a record.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use adlens_core::models::{CampaignRecord, DailyMetrics};

#[derive(Debug, Deserialize)]
struct CampaignsFile {
    campaigns: Vec<CampaignEntry>,
}

#[derive(Debug, Deserialize)]
struct CampaignEntry {
    id: String,
    name: String,
    industry: String,
    audience: String,
    #[serde(default)]
    objective: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    daily_performance: BTreeMap<String, DailyEntry>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DailyEntry {
    impressions: u64,
    clicks: u64,
    spend: f64,
    conversions: u64,
    ctr: f64,
    cpm: f64,
    cpc: f64,
    roas: f64,
    frequency: f64,
}

/// Load and validate campaign records from `path`.
pub fn load_campaigns(path: &Path) -> Result<Vec<CampaignRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read campaigns file: {}", path.display()))?;
    let file: CampaignsFile =
        serde_json::from_str(&content).with_context(|| "Failed to parse campaigns file")?;

    let mut records = Vec::with_capacity(file.campaigns.len());
    let mut seen_ids = Vec::new();

    for entry in file.campaigns {
        if entry.id.trim().is_empty() {
            bail!("campaign with empty id");
        }
        if entry.name.trim().is_empty() {
            bail!("campaign '{}' has an empty name", entry.id);
        }
        if seen_ids.contains(&entry.id) {
            bail!("duplicate campaign id: {}", entry.id);
        }
        seen_ids.push(entry.id.clone());

        let mut daily = BTreeMap::new();
        for (date_str, m) in entry.daily_performance {
            let date: NaiveDate = date_str.parse().with_context(|| {
                format!("campaign '{}': bad date '{}'", entry.id, date_str)
            })?;
            for (field, value) in [
                ("spend", m.spend),
                ("ctr", m.ctr),
                ("cpm", m.cpm),
                ("cpc", m.cpc),
                ("roas", m.roas),
                ("frequency", m.frequency),
            ] {
                if !value.is_finite() || value < 0.0 {
                    bail!(
                        "campaign '{}' on {}: {} must be a non-negative number",
                        entry.id,
                        date,
                        field
                    );
                }
            }
            daily.insert(
                date,
                DailyMetrics {
                    impressions: m.impressions,
                    clicks: m.clicks,
                    spend: m.spend,
                    conversions: m.conversions,
                    ctr: m.ctr,
                    cpm: m.cpm,
                    cpc: m.cpc,
                    roas: m.roas,
                    frequency: m.frequency,
                },
            );
        }

        records.push(CampaignRecord {
            id: entry.id,
            name: entry.name,
            industry: entry.industry,
            audience: entry.audience,
            objective: entry.objective,
            status: entry.status,
            daily,
        });
    }

    info!(campaigns = records.len(), path = %path.display(), "loaded campaign data");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_valid_file() {
        let f = write_file(
            r#"{
              "campaigns": [
                {
                  "id": "camp_001",
                  "name": "Summer Fashion",
                  "industry": "Fashion",
                  "audience": "retargeting",
                  "objective": "conversions",
                  "status": "active",
                  "daily_performance": {
                    "2024-11-01": {"impressions": 85000, "clicks": 1700, "spend": 610.0,
                                   "conversions": 68, "ctr": 2.0, "cpm": 7.18, "cpc": 0.36,
                                   "roas": 3.1, "frequency": 2.1}
                  }
                }
              ]
            }"#,
        );
        let records = load_campaigns(f.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "camp_001");
        assert_eq!(records[0].daily.len(), 1);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let f = write_file(
            r#"{"campaigns": [
              {"id": "camp_001", "name": "A", "industry": "Fashion", "audience": "broad"},
              {"id": "camp_001", "name": "B", "industry": "Travel", "audience": "broad"}
            ]}"#,
        );
        assert!(load_campaigns(f.path()).is_err());
    }

    #[test]
    fn test_bad_date_rejected() {
        let f = write_file(
            r#"{"campaigns": [
              {"id": "camp_001", "name": "A", "industry": "Fashion", "audience": "broad",
               "daily_performance": {"not-a-date": {"impressions": 1}}}
            ]}"#,
        );
        assert!(load_campaigns(f.path()).is_err());
    }

    #[test]
    fn test_negative_metric_rejected() {
        let f = write_file(
            r#"{"campaigns": [
              {"id": "camp_001", "name": "A", "industry": "Fashion", "audience": "broad",
               "daily_performance": {"2024-11-01": {"spend": -5.0}}}
            ]}"#,
        );
        assert!(load_campaigns(f.path()).is_err());
    }
}
