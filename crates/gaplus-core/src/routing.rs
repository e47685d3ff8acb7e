//! Source selection
//!
//! Chooses between the live reporting API and the warehouse with a weighted
//! five-factor score. Each factor is in [0, 1] where higher favors the
//! warehouse: the warehouse collects `score * weight` and the live API
//! `(1 - score) * weight`. Pre-checks (routing disabled, warehouse down, mock
//! mode) decide outright without scoring.
//!
//! Selection is a pure function of the descriptor, the config and the
//! [`RoutingContext`], so it is deterministic and cheap to call inline.

use crate::config::{RoutingConfig, RoutingThresholds, RoutingWeights};
use crate::models::{DataSource, QueryDescriptor};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Facts about the world at selection time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingContext {
    /// Day relative dates resolve against
    pub today: NaiveDate,
    /// Warehouse adapter reports ready
    pub warehouse_available: bool,
}

/// Outcome of [`SourceSelector::select`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub selected_source: DataSource,
    /// Weighted total per scored source (empty when a pre-check decided)
    pub score_breakdown: BTreeMap<DataSource, f64>,
    /// Raw factor scores by name (empty when a pre-check decided)
    pub factor_scores: BTreeMap<String, f64>,
    pub reasoning: Vec<String>,
    /// False when a pre-check decided without scoring
    pub scored: bool,
}

impl RoutingDecision {
    fn precheck(source: DataSource, reason: &str) -> Self {
        Self {
            selected_source: source,
            score_breakdown: BTreeMap::new(),
            factor_scores: BTreeMap::new(),
            reasoning: vec![reason.to_string()],
            scored: false,
        }
    }

    /// Reasoning as one line
    pub fn summary(&self) -> String {
        self.reasoning.join("; ")
    }
}

// ===== Factors =====

/// Size of the job: range length, dimension count, metric count, row limit
pub fn data_volume_score(
    descriptor: &QueryDescriptor,
    today: NaiveDate,
    t: &RoutingThresholds,
) -> f64 {
    let mut score: f64 = 0.0;

    if let Some(range) = descriptor.date_ranges.first() {
        let span = range.span_days(today);
        if span > t.long_span_days {
            score += 0.4;
        } else if span > t.medium_span_days {
            score += 0.2;
        }
    }

    let dims = descriptor.dimensions.len();
    if dims > t.many_dimensions {
        score += 0.3;
    } else if dims > t.several_dimensions {
        score += 0.1;
    }

    let metrics = descriptor.metrics.len();
    if metrics > t.many_metrics {
        score += 0.2;
    } else if metrics > t.several_metrics {
        score += 0.1;
    }

    if descriptor.limit > t.large_limit {
        score += 0.1;
    }

    score.min(1.0)
}

/// Filters, high-cardinality dimensions, period comparison
pub fn query_complexity_score(descriptor: &QueryDescriptor, high_cardinality: &[String]) -> f64 {
    let mut score: f64 = 0.0;

    if descriptor.has_filters() {
        score += 0.3;
    }

    let high_card = descriptor.dimension_names().any(|dim| {
        high_cardinality
            .iter()
            .any(|pattern| dim.contains(pattern.as_str()))
    });
    if high_card {
        score += 0.3;
    }

    if descriptor.date_ranges.len() > 1 {
        score += 0.4;
    }

    score.min(1.0)
}

/// How far back the first range starts
pub fn date_range_score(descriptor: &QueryDescriptor, today: NaiveDate) -> f64 {
    let Some(range) = descriptor.date_ranges.first() else {
        return 0.0;
    };

    match range.start_date.days_before(today) {
        0 | 1 => 0.1,
        d if d > 365 => 1.0,
        d if d > 90 => 0.8,
        d if d > 30 => 0.5,
        _ => 0.2,
    }
}

// ===== Selector =====

pub struct SourceSelector {
    config: RoutingConfig,
}

impl SourceSelector {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn weights(&self) -> &RoutingWeights {
        &self.config.weights
    }

    /// Pick the source for one request
    ///
    /// Pre-checks run in order: warehouse routing disabled, warehouse
    /// unavailable, mock mode. Otherwise the higher weighted total wins and
    /// ties go to the live API.
    pub fn select(&self, descriptor: &QueryDescriptor, ctx: &RoutingContext) -> RoutingDecision {
        if !self.config.warehouse_enabled {
            return RoutingDecision::precheck(DataSource::LiveApi, "warehouse routing disabled in settings");
        }
        if !ctx.warehouse_available {
            return RoutingDecision::precheck(DataSource::LiveApi, "warehouse service not available");
        }
        if self.config.mock_mode {
            return RoutingDecision::precheck(DataSource::Mock, "mock mode enabled");
        }

        let w = &self.config.weights;
        let t = &self.config.thresholds;

        let factors = [
            (
                "data_volume",
                data_volume_score(descriptor, ctx.today, t),
                w.data_volume,
                "large data volume favors warehouse",
                "small data volume favors live API",
            ),
            (
                "query_complexity",
                query_complexity_score(descriptor, &t.high_cardinality_dimensions),
                w.query_complexity,
                "complex query favors warehouse",
                "simple query favors live API",
            ),
            (
                "date_range",
                date_range_score(descriptor, ctx.today),
                w.date_range,
                "historical data favors warehouse",
                "recent data favors live API",
            ),
        ];

        let mut live = 0.0;
        let mut warehouse = 0.0;
        let mut reasoning = Vec::new();
        let mut factor_scores = BTreeMap::new();

        for (name, score, weight, high_note, low_note) in factors {
            warehouse += score * weight;
            live += (1.0 - score) * weight;
            factor_scores.insert(name.to_string(), score);

            if score > t.strong_signal {
                reasoning.push(high_note.to_string());
            } else if score < t.weak_signal {
                reasoning.push(low_note.to_string());
            }
        }

        live += t.live_performance * w.performance;
        warehouse += t.warehouse_performance * w.performance;
        factor_scores.insert("performance".to_string(), t.warehouse_performance);
        if t.live_performance > t.warehouse_performance {
            reasoning.push("live API generally faster".to_string());
        }

        live += t.live_availability * w.availability;
        warehouse += t.warehouse_availability * w.availability;
        factor_scores.insert("availability".to_string(), t.warehouse_availability);

        let selected = if warehouse > live {
            DataSource::Warehouse
        } else {
            DataSource::LiveApi
        };
        reasoning.push(format!(
            "selected {} (live_api {:.3}, warehouse {:.3})",
            selected, live, warehouse
        ));

        debug!(%selected, live_score = live, warehouse_score = warehouse, "Source scored");

        let mut score_breakdown = BTreeMap::new();
        score_breakdown.insert(DataSource::LiveApi, live);
        score_breakdown.insert(DataSource::Warehouse, warehouse);

        RoutingDecision {
            selected_source: selected,
            score_breakdown,
            factor_scores,
            reasoning,
            scored: true,
        }
    }
}
