//! Query-intent classification and entity extraction.
//!
//! Each intent owns a weighted trigger-term set plus optional regex
//! patterns, scored independently over the normalized query; the highest
//! score wins, with a fixed priority ordering breaking ties. This replaces
//! order-dependent `if/elif` branching with a table that can be
//! property-tested in isolation.
//!
//! Entity extraction runs regardless of which intent wins: a comparison
//! query and an anomaly query may reference the same campaigns, metrics,
//! and dates.

use chrono::{Days, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{DateRange, Metric};

/// Closed set of query intents, in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PerformanceAnomaly,
    CampaignComparison,
    TrendAnalysis,
    OptimizationAdvice,
    Forecasting,
    DemographicAnalysis,
    BudgetAnalysis,
    Benchmark,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PerformanceAnomaly => "performance_anomaly",
            Intent::CampaignComparison => "campaign_comparison",
            Intent::TrendAnalysis => "trend_analysis",
            Intent::OptimizationAdvice => "optimization_advice",
            Intent::Forecasting => "forecasting",
            Intent::DemographicAnalysis => "demographic_analysis",
            Intent::BudgetAnalysis => "budget_analysis",
            Intent::Benchmark => "benchmark",
            Intent::General => "general",
        }
    }
}

/// Entities extracted from a single query. Discarded after the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySet {
    /// Campaign identifiers, normalized to `camp_<digits>` form.
    pub campaigns: Vec<String>,
    /// Quoted campaign names, resolved to ids by the caller.
    pub campaign_names: Vec<String>,
    /// Metric names from the closed vocabulary.
    pub metrics: Vec<Metric>,
    pub date_range: Option<DateRange>,
    /// Audience type mentioned in the query, e.g. `retargeting`.
    pub audience: Option<String>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
            && self.campaign_names.is_empty()
            && self.metrics.is_empty()
            && self.date_range.is_none()
            && self.audience.is_none()
    }
}

/// Result of classifying one query.
#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    /// In `[0, 1]`; `0.0` when falling back to [`Intent::General`].
    pub confidence: f64,
    pub entities: EntitySet,
}

/// A matched trigger weight sum of this value or more scores `1.0`.
const SATURATION_WEIGHT: f64 = 5.0;

/// Weight contributed by each matching regex pattern.
const PATTERN_WEIGHT: f64 = 2.0;

struct Rule {
    intent: Intent,
    triggers: &'static [(&'static str, f64)],
    patterns: Vec<Regex>,
}

const ANOMALY_TRIGGERS: &[(&str, f64)] = &[
    ("spike", 2.0),
    ("spiked", 2.0),
    ("surge", 2.0),
    ("surged", 2.0),
    ("jump", 1.5),
    ("jumped", 1.5),
    ("drop", 1.5),
    ("dropped", 1.5),
    ("crash", 2.0),
    ("crashed", 2.0),
    ("plummet", 1.5),
    ("anomaly", 2.0),
    ("unusual", 1.5),
    ("unexpected", 1.0),
    ("why did", 1.5),
    ("why is", 1.5),
    ("what happened", 1.5),
    ("went wrong", 1.5),
    ("so high", 1.5),
    ("too high", 1.5),
    ("too low", 1.5),
];

const COMPARISON_TRIGGERS: &[(&str, f64)] = &[
    ("compare", 2.0),
    ("comparison", 1.5),
    ("vs", 2.0),
    ("versus", 2.0),
    ("compared to", 2.0),
    ("difference between", 2.0),
    ("better", 1.0),
    ("worse", 1.0),
    ("outperform", 1.5),
    ("outperforms", 1.5),
    ("against", 1.0),
];

const TREND_TRIGGERS: &[(&str, f64)] = &[
    ("trend", 2.0),
    ("trends", 2.0),
    ("over time", 2.0),
    ("pattern", 1.5),
    ("seasonal", 1.5),
    ("timeline", 1.0),
    ("history", 1.5),
    ("week over week", 1.5),
    ("month over month", 1.5),
    ("trajectory", 1.5),
];

const OPTIMIZATION_TRIGGERS: &[(&str, f64)] = &[
    ("optimize", 2.0),
    ("optimization", 2.0),
    ("improve", 2.0),
    ("recommend", 2.0),
    ("recommendation", 2.0),
    ("recommendations", 2.0),
    ("suggest", 1.5),
    ("advice", 2.0),
    ("how can i", 1.5),
    ("how do i", 1.5),
    ("should i", 1.5),
    ("fix", 1.0),
    ("boost", 1.0),
];

const FORECAST_TRIGGERS: &[(&str, f64)] = &[
    ("predict", 2.0),
    ("prediction", 2.0),
    ("forecast", 2.0),
    ("projection", 1.5),
    ("next week", 1.5),
    ("next month", 1.5),
    ("next quarter", 1.5),
    ("future", 1.5),
    ("expect", 1.0),
    ("anticipate", 1.5),
];

const DEMOGRAPHIC_TRIGGERS: &[(&str, f64)] = &[
    ("audience", 1.5),
    ("audiences", 1.5),
    ("demographic", 2.0),
    ("demographics", 2.0),
    ("age group", 2.0),
    ("gender", 1.5),
    ("segment", 1.5),
    ("segments", 1.5),
    ("which audience", 2.0),
];

const BUDGET_TRIGGERS: &[(&str, f64)] = &[
    ("budget", 2.0),
    ("budgets", 2.0),
    ("allocate", 1.5),
    ("allocation", 1.5),
    ("overspend", 2.0),
    ("overspending", 2.0),
    ("underspend", 1.5),
    ("spend efficiency", 1.5),
    ("cost efficiency", 1.5),
    ("expensive", 1.0),
    ("cheaper", 1.0),
    ("waste", 1.5),
    ("daily budget", 1.5),
];

const BENCHMARK_TRIGGERS: &[(&str, f64)] = &[
    ("benchmark", 2.0),
    ("benchmarks", 2.0),
    ("industry average", 2.0),
    ("industry standard", 1.5),
    ("typical", 1.5),
    ("normal", 1.5),
    ("baseline", 1.5),
    ("on par", 1.5),
    ("good", 0.75),
];

/// Audience vocabulary shared by entity extraction and the comparison
/// patterns.
const AUDIENCE_TYPES: [&str; 5] = ["retargeting", "lookalike", "interest", "broad", "custom"];

/// Scores queries against the intent table and extracts entities.
pub struct IntentClassifier {
    rules: Vec<Rule>,
    min_confidence: f64,
    re_campaign_id: Regex,
    re_quoted: Regex,
    re_iso_date: Regex,
    re_slash_date: Regex,
    re_relative: Regex,
    re_ahead: Regex,
}

impl IntentClassifier {
    /// Build the classifier. `min_confidence` is the floor below which the
    /// result falls back to [`Intent::General`] with confidence `0.0`.
    pub fn new(min_confidence: f64) -> Self {
        let p = |s: &str| Regex::new(s).expect("static intent pattern");

        let rules = vec![
            Rule {
                intent: Intent::PerformanceAnomaly,
                triggers: ANOMALY_TRIGGERS,
                patterns: vec![
                    p(r"\b(cpm|cpc|ctr|roas|spend|cost|conversions?)\b.*\b(spike|spiked|surge|surged|jump|jumped|drop|dropped|crash|crashed|fell|rose)\b"),
                    p(r"\b(spike|spiked|surge|surged|jump|jumped|drop|dropped|crash|crashed)\b.*\b(cpm|cpc|ctr|roas|spend|cost|conversions?)\b"),
                    p(r"\bwhy\b.*\b(high|low|bad|poor|expensive|wrong)\b"),
                    p(r"\bwhat\b.*\b(happened|wrong|caused|problem)\b"),
                ],
            },
            Rule {
                intent: Intent::CampaignComparison,
                triggers: COMPARISON_TRIGGERS,
                patterns: vec![
                    p(r"\b(retargeting|lookalike|interest|broad|custom)\b.*\b(vs|versus|or|against)\b"),
                    p(r"\bwhich\b.*\b(best|better|worst|top)\b"),
                ],
            },
            Rule {
                intent: Intent::TrendAnalysis,
                triggers: TREND_TRIGGERS,
                patterns: vec![
                    p(r"\b(growth|decline|change|changed)\b.*\b(over|during|across)\b"),
                    p(r"\b(last|past|previous)\s+(week|month|quarter|year)\b"),
                ],
            },
            Rule {
                intent: Intent::OptimizationAdvice,
                triggers: OPTIMIZATION_TRIGGERS,
                patterns: vec![
                    p(r"\bhow\b.*\b(improve|optimize|fix|increase|decrease|reduce|lower)\b"),
                ],
            },
            Rule {
                intent: Intent::Forecasting,
                triggers: FORECAST_TRIGGERS,
                patterns: vec![p(r"\bwill\b.*\b(perform|cost|convert|spend|deliver)\b")],
            },
            Rule {
                intent: Intent::DemographicAnalysis,
                triggers: DEMOGRAPHIC_TRIGGERS,
                patterns: vec![
                    p(r"\b(1[89]|[2-6]\d)\s*(?:-|to)\s*(1[89]|[2-6]\d)\b"),
                    p(r"\b(age|gender|location)\b.*\b(perform|performs|convert|converts)\b"),
                ],
            },
            Rule {
                intent: Intent::BudgetAnalysis,
                triggers: BUDGET_TRIGGERS,
                patterns: vec![
                    p(r"\bbudget\b.*\b(increase|decrease|shift|move|raise|cut)\b"),
                    p(r"\b(increase|decrease|raise|cut|shift)\b.*\bbudget\b"),
                ],
            },
            Rule {
                intent: Intent::Benchmark,
                triggers: BENCHMARK_TRIGGERS,
                patterns: vec![p(r"\bis\b.*\b(good|bad|normal|typical|average)\b")],
            },
        ];

        Self {
            rules,
            min_confidence,
            re_campaign_id: p(r"(?i)\bcamp[_-]?(\d{1,6})\b"),
            re_quoted: p(r#"'([^']{2,64})'|"([^"]{2,64})""#),
            re_iso_date: p(r"\b(\d{4})-(\d{2})-(\d{2})\b"),
            re_slash_date: p(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b"),
            re_relative: p(r"\b(last|past|previous)\s+(day|week|month|quarter|year)\b"),
            re_ahead: p(r"\bnext\s+(week|month|quarter)\b"),
        }
    }

    /// Classify a query against the current UTC date.
    pub fn classify(&self, query: &str) -> Classification {
        self.classify_at(query, Utc::now().date_naive())
    }

    /// Classify a query, resolving relative date expressions against
    /// `today`. Deterministic for a fixed `today`.
    pub fn classify_at(&self, query: &str, today: NaiveDate) -> Classification {
        let normalized = normalize(query);
        let lowercased = query.to_lowercase();
        let entities = self.extract_entities(query, &normalized, today);

        let mut best_intent = Intent::General;
        let mut best_score = 0.0f64;
        for rule in &self.rules {
            let score = score_rule(rule, &normalized, &lowercased);
            // Strict comparison: on ties the earlier (higher-priority) rule wins.
            if score > best_score {
                best_score = score;
                best_intent = rule.intent;
            }
        }

        if best_score < self.min_confidence {
            return Classification {
                intent: Intent::General,
                confidence: 0.0,
                entities,
            };
        }

        Classification {
            intent: best_intent,
            confidence: best_score.clamp(0.0, 1.0),
            entities,
        }
    }

    fn extract_entities(&self, raw: &str, normalized: &str, today: NaiveDate) -> EntitySet {
        let mut campaigns = Vec::new();
        for cap in self.re_campaign_id.captures_iter(raw) {
            let id = format!("camp_{}", &cap[1]);
            if !campaigns.contains(&id) {
                campaigns.push(id);
            }
        }

        let mut campaign_names = Vec::new();
        for cap in self.re_quoted.captures_iter(raw) {
            if let Some(name) = cap.get(1).or_else(|| cap.get(2)) {
                let name = name.as_str().trim().to_string();
                if !name.is_empty() && !campaign_names.contains(&name) {
                    campaign_names.push(name);
                }
            }
        }

        let mut metrics = Vec::new();
        for token in normalized.split_whitespace() {
            if let Some(metric) = Metric::parse(token) {
                if !metrics.contains(&metric) {
                    metrics.push(metric);
                }
            }
        }
        if normalized.contains(" return on ad spend ") && !metrics.contains(&Metric::Roas) {
            metrics.push(Metric::Roas);
        }

        let audience = AUDIENCE_TYPES
            .iter()
            .find(|a| contains_phrase(normalized, a))
            .map(|a| a.to_string());

        let date_range = self.extract_date_range(raw, normalized, today);

        EntitySet {
            campaigns,
            campaign_names,
            metrics,
            date_range,
            audience,
        }
    }

    fn extract_date_range(
        &self,
        raw: &str,
        normalized: &str,
        today: NaiveDate,
    ) -> Option<DateRange> {
        let mut dates: Vec<NaiveDate> = Vec::new();
        for cap in self.re_iso_date.captures_iter(raw) {
            let (y, m, d) = (cap[1].parse().ok()?, cap[2].parse().ok()?, cap[3].parse().ok()?);
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                dates.push(date);
            }
        }
        for cap in self.re_slash_date.captures_iter(raw) {
            let (m, d, y) = (cap[1].parse().ok()?, cap[2].parse().ok()?, cap[3].parse().ok()?);
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                dates.push(date);
            }
        }
        if !dates.is_empty() {
            let start = *dates.iter().min().expect("non-empty dates");
            let end = *dates.iter().max().expect("non-empty dates");
            return Some(DateRange::new(start, end));
        }

        if let Some(cap) = self.re_relative.captures(normalized) {
            let days = period_days(&cap[2]);
            let start = today.checked_sub_days(Days::new(days))?;
            return Some(DateRange::new(start, today));
        }

        if let Some(cap) = self.re_ahead.captures(normalized) {
            let days = period_days(&cap[1]);
            let end = today.checked_add_days(Days::new(days))?;
            return Some(DateRange::new(today, end));
        }

        None
    }
}

fn period_days(unit: &str) -> u64 {
    match unit {
        "day" => 1,
        "week" => 7,
        "month" => 30,
        "quarter" => 90,
        _ => 365,
    }
}

/// Triggers are matched as whole phrases on the normalized query;
/// patterns run over the raw lowercased query so punctuation-sensitive
/// forms (`25-34`, `40%`) stay visible to them.
fn score_rule(rule: &Rule, normalized: &str, lowercased: &str) -> f64 {
    let mut matched = 0.0;
    for (trigger, weight) in rule.triggers {
        if contains_phrase(normalized, trigger) {
            matched += weight;
        }
    }
    for pattern in &rule.patterns {
        if pattern.is_match(lowercased) {
            matched += PATTERN_WEIGHT;
        }
    }
    (matched / SATURATION_WEIGHT).min(1.0)
}

/// Lowercase, strip punctuation to spaces, collapse runs, and pad with
/// spaces so trigger phrases can be matched with word boundaries by plain
/// substring search.
fn normalize(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in query.chars() {
        if c.is_alphanumeric() {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {} ", phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(0.15)
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_cpm_spike_scenario() {
        let c = classifier();
        let result = c.classify_at(
            "Why did CPM spike 40% last week in campaign camp_001?",
            d("2024-11-15"),
        );
        assert_eq!(result.intent, Intent::PerformanceAnomaly);
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
        assert_eq!(result.entities.campaigns, vec!["camp_001".to_string()]);
        assert_eq!(result.entities.metrics, vec![Metric::Cpm]);
        let range = result.entities.date_range.expect("relative range");
        assert_eq!(range.start, d("2024-11-08"));
        assert_eq!(range.end, d("2024-11-15"));
    }

    #[test]
    fn test_comparison_scenario_without_ids() {
        let c = classifier();
        let result = c.classify_at("Compare retargeting vs lookalike ROAS", d("2024-11-15"));
        assert_eq!(result.intent, Intent::CampaignComparison);
        assert!(result.entities.campaigns.is_empty());
        assert_eq!(result.entities.metrics, vec![Metric::Roas]);
        assert_eq!(result.entities.audience.as_deref(), Some("retargeting"));
    }

    #[test]
    fn test_unmatched_query_falls_back_to_general() {
        let c = classifier();
        let result = c.classify_at("xyzzy plugh quux", d("2024-11-15"));
        assert_eq!(result.intent, Intent::General);
        assert_eq!(result.confidence, 0.0);
        assert!(result.entities.is_empty());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = classifier();
        let q = "Should I increase my budget for the fitness campaign?";
        let a = c.classify_at(q, d("2024-11-15"));
        let b = c.classify_at(q, d("2024-11-15"));
        assert_eq!(a.intent, b.intent);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.entities, b.entities);
    }

    #[test]
    fn test_confidence_always_in_unit_range() {
        let c = classifier();
        let queries = [
            "Why did my CPM spike and crash and jump unexpectedly? anomaly spike surge drop",
            "compare versus vs against better worse",
            "",
            "budget budget budget budget",
            "How can I improve and optimize my ROAS with your recommendations?",
        ];
        for q in queries {
            let r = c.classify_at(q, d("2024-11-15"));
            assert!(
                (0.0..=1.0).contains(&r.confidence),
                "confidence {} out of range for {:?}",
                r.confidence,
                q
            );
        }
    }

    #[test]
    fn test_budget_intent() {
        let c = classifier();
        let r = c.classify_at("Should I increase my budget for the fitness campaign?", d("2024-11-15"));
        assert_eq!(r.intent, Intent::BudgetAnalysis);
    }

    #[test]
    fn test_forecast_intent_with_forward_range() {
        let c = classifier();
        let r = c.classify_at("Predict next week's performance for camp_002", d("2024-11-15"));
        assert_eq!(r.intent, Intent::Forecasting);
        let range = r.entities.date_range.expect("forward range");
        assert_eq!(range.start, d("2024-11-15"));
        assert_eq!(range.end, d("2024-11-22"));
        assert_eq!(r.entities.campaigns, vec!["camp_002".to_string()]);
    }

    #[test]
    fn test_explicit_dates_take_precedence_over_relative() {
        let c = classifier();
        let r = c.classify_at(
            "What was the trend between 2024-11-01 and 2024-11-07 last month?",
            d("2024-12-01"),
        );
        let range = r.entities.date_range.expect("explicit range");
        assert_eq!(range.start, d("2024-11-01"));
        assert_eq!(range.end, d("2024-11-07"));
    }

    #[test]
    fn test_quoted_campaign_name_extraction() {
        let c = classifier();
        let r = c.classify_at("How is 'Black Friday Electronics' performing?", d("2024-11-15"));
        assert_eq!(r.entities.campaign_names, vec!["Black Friday Electronics".to_string()]);
    }

    #[test]
    fn test_metric_aliases_and_dedup() {
        let c = classifier();
        let r = c.classify_at("Is our cost per click too high? cpc cost", d("2024-11-15"));
        assert!(r.entities.metrics.contains(&Metric::Cpc));
        assert!(r.entities.metrics.contains(&Metric::Spend));
        let cpc_count = r.entities.metrics.iter().filter(|m| **m == Metric::Cpc).count();
        assert_eq!(cpc_count, 1);
    }

    #[test]
    fn test_campaign_id_forms_normalized() {
        let c = classifier();
        let r = c.classify_at("compare CAMP-003 with camp_004", d("2024-11-15"));
        assert_eq!(
            r.entities.campaigns,
            vec!["camp_003".to_string(), "camp_004".to_string()]
        );
    }

    #[test]
    fn test_demographic_intent() {
        let c = classifier();
        let r = c.classify_at("Which audience segment converts best for 25-34 year olds?", d("2024-11-15"));
        assert_eq!(r.intent, Intent::DemographicAnalysis);
    }

    #[test]
    fn test_trend_intent() {
        let c = classifier();
        let r = c.classify_at("What's the trend in my spend over time?", d("2024-11-15"));
        assert_eq!(r.intent, Intent::TrendAnalysis);
    }
}
