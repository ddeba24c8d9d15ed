use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Journal-level quality metrics; every metric independently nullable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QualityMetrics {
    pub journal_name: String,
    pub impact_factor: Option<f64>,
    /// JCR quartile, `Q1`..`Q4`
    pub quartile: Option<String>,
    /// Journal Citation Indicator
    pub jci: Option<f64>,
    /// Chinese Academy of Sciences partition zone
    pub cas_zone: Option<String>,
    pub h_index: Option<u64>,
    /// Two-year mean citedness
    pub citation_rate: Option<f64>,
    pub cited_by_count: Option<u64>,
    pub works_count: Option<u64>,
    pub i10_index: Option<u64>,
    /// Providers that contributed at least one value
    #[serde(default)]
    pub data_sources: Vec<String>,
}

/// Metric names accepted by [`QualityMetrics::sort_value`]
pub const SORTABLE_METRICS: [&str; 9] = [
    "impact_factor",
    "quartile",
    "jci",
    "cas_zone",
    "h_index",
    "citation_rate",
    "cited_by_count",
    "works_count",
    "i10_index",
];

impl QualityMetrics {
    pub fn new(journal_name: impl Into<String>) -> Self {
        Self {
            journal_name: journal_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_any_metric(&self) -> bool {
        self.impact_factor.is_some()
            || self.quartile.is_some()
            || self.jci.is_some()
            || self.cas_zone.is_some()
            || self.h_index.is_some()
            || self.citation_rate.is_some()
            || self.cited_by_count.is_some()
            || self.works_count.is_some()
            || self.i10_index.is_some()
    }

    /// Numeric value of a named metric where larger is better. Quartiles and
    /// CAS zones are inverted so that `Q1`/zone 1 sort first.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn sort_value(&self, metric: &str) -> Option<f64> {
        match metric {
            "impact_factor" => self.impact_factor,
            "jci" => self.jci,
            "citation_rate" => self.citation_rate,
            "h_index" => self.h_index.map(|v| v as f64),
            "cited_by_count" => self.cited_by_count.map(|v| v as f64),
            "works_count" => self.works_count.map(|v| v as f64),
            "i10_index" => self.i10_index.map(|v| v as f64),
            "quartile" => self.quartile.as_deref().and_then(leading_rank).map(|q| 5.0 - q),
            "cas_zone" => self.cas_zone.as_deref().and_then(leading_rank).map(|z| 5.0 - z),
            _ => None,
        }
    }
}

/// Check that `metric` names something [`QualityMetrics::sort_value`] knows
pub fn validate_sort_metric(metric: &str) -> Result<()> {
    if SORTABLE_METRICS.contains(&metric) {
        Ok(())
    } else {
        Err(Error::invalid_input(
            "sort_by",
            format!(
                "unknown metric '{metric}' (expected one of: {})",
                SORTABLE_METRICS.join(", ")
            ),
        ))
    }
}

/// Union two providers' metrics for one journal: per field the first
/// provider that has a value wins. A missing provider contributes nulls.
#[must_use]
pub fn merge_quality(
    journal_name: &str,
    primary: Option<&QualityMetrics>,
    secondary: Option<&QualityMetrics>,
) -> QualityMetrics {
    let pick = |f: fn(&QualityMetrics) -> Option<f64>| {
        primary.and_then(f).or_else(|| secondary.and_then(f))
    };
    let pick_count = |f: fn(&QualityMetrics) -> Option<u64>| {
        primary.and_then(f).or_else(|| secondary.and_then(f))
    };
    let pick_text = |f: fn(&QualityMetrics) -> Option<String>| {
        primary.and_then(f).or_else(|| secondary.and_then(f))
    };

    let mut data_sources: Vec<String> = Vec::new();
    for provider in [primary, secondary].into_iter().flatten() {
        if provider.has_any_metric() {
            for source in &provider.data_sources {
                if !data_sources.contains(source) {
                    data_sources.push(source.clone());
                }
            }
        }
    }

    QualityMetrics {
        journal_name: journal_name.to_string(),
        impact_factor: pick(|m| m.impact_factor),
        quartile: pick_text(|m| m.quartile.clone()),
        jci: pick(|m| m.jci),
        cas_zone: pick_text(|m| m.cas_zone.clone()),
        h_index: pick_count(|m| m.h_index),
        citation_rate: pick(|m| m.citation_rate),
        cited_by_count: pick_count(|m| m.cited_by_count),
        works_count: pick_count(|m| m.works_count),
        i10_index: pick_count(|m| m.i10_index),
        data_sources,
    }
}

fn leading_rank(value: &str) -> Option<f64> {
    value
        .chars()
        .find(char::is_ascii_digit)
        .and_then(|c| c.to_digit(10))
        .map(f64::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn easyscholar() -> QualityMetrics {
        QualityMetrics {
            impact_factor: Some(42.7),
            quartile: Some("Q1".to_string()),
            cas_zone: Some("1区".to_string()),
            data_sources: vec!["easyscholar".to_string()],
            ..QualityMetrics::new("Nature")
        }
    }

    fn openalex() -> QualityMetrics {
        QualityMetrics {
            h_index: Some(1200),
            citation_rate: Some(20.5),
            works_count: Some(400_000),
            impact_factor: Some(1.0),
            data_sources: vec!["openalex".to_string()],
            ..QualityMetrics::new("Nature")
        }
    }

    #[test]
    fn test_disjoint_union() {
        let merged = merge_quality("Nature", Some(&easyscholar()), Some(&openalex()));
        assert_eq!(merged.impact_factor, Some(42.7));
        assert_eq!(merged.h_index, Some(1200));
        assert_eq!(merged.quartile.as_deref(), Some("Q1"));
        assert_eq!(merged.data_sources, vec!["easyscholar", "openalex"]);
    }

    #[test]
    fn test_missing_provider_yields_nulls() {
        let merged = merge_quality("Nature", None, Some(&openalex()));
        assert_eq!(merged.impact_factor, Some(1.0));
        assert_eq!(merged.quartile, None);
        assert_eq!(merged.data_sources, vec!["openalex"]);

        let empty = merge_quality("Unknown Journal", None, None);
        assert!(!empty.has_any_metric());
        assert!(empty.data_sources.is_empty());
    }

    #[test]
    fn test_sort_value() {
        let metrics = easyscholar();
        assert_eq!(metrics.sort_value("impact_factor"), Some(42.7));
        assert_eq!(metrics.sort_value("quartile"), Some(4.0));
        assert_eq!(metrics.sort_value("cas_zone"), Some(4.0));
        assert_eq!(metrics.sort_value("h_index"), None);
        assert!(validate_sort_metric("h_index").is_ok());
        assert!(validate_sort_metric("popularity").is_err());
    }
}
