//! Plain-language insights
//!
//! Rule-based sentences summarizing a trend report for the answer writer.

use super::anomalies::{Anomaly, AnomalyKind};
use super::statistics::ChangeAnalysis;
use super::trends::{TrendDirection, TrendStrength};

/// Series shorter than this get a data-quality caveat
const LOW_DATA_POINTS: usize = 7;

/// Generate insights for one analyzed series
///
/// Rules, in output order:
/// - Direction and strength narrative (always)
/// - Overall change when |overall| > 20%
/// - Volatility callout when > 0.3 (high) or < 0.1 (steady)
/// - High and low anomaly counts
/// - Caveat when fewer than 7 points
pub fn generate_insights(
    data_points: usize,
    direction: TrendDirection,
    strength: TrendStrength,
    changes: &ChangeAnalysis,
    anomalies: &[Anomaly],
) -> Vec<String> {
    let mut insights = Vec::new();

    let narrative = match (direction, strength) {
        (TrendDirection::Increasing, TrendStrength::Strong) => {
            "Strong upward trend with solid growth momentum"
        }
        (TrendDirection::Increasing, _) => "Upward trend, growth is moderate",
        (TrendDirection::Decreasing, TrendStrength::Strong) => {
            "Clear downward trend, worth investigating potential issues"
        }
        (TrendDirection::Decreasing, _) => "Downward trend, keep monitoring upcoming periods",
        (TrendDirection::Volatile, _) => "Values fluctuate widely; look into what drives the swings",
        (TrendDirection::Stable, _) => "Values remain relatively stable",
    };
    insights.push(narrative.to_string());

    if changes.overall.abs() > 0.2 {
        let label = if changes.overall > 0.0 { "growth" } else { "decline" };
        insights.push(format!(
            "Overall {} across the period: {:.1}%",
            label,
            changes.overall.abs() * 100.0
        ));
    }

    if changes.volatility > 0.3 {
        insights.push("High period-over-period volatility".to_string());
    } else if changes.volatility < 0.1 {
        insights.push("Period-over-period changes are steady".to_string());
    }

    let high = anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::OutlierHigh)
        .count();
    let low = anomalies.len() - high;
    if high > 0 {
        insights.push(format!("Detected {} unusually high value(s)", high));
    }
    if low > 0 {
        insights.push(format!("Detected {} unusually low value(s)", low));
    }

    if data_points < LOW_DATA_POINTS {
        insights.push("Few data points; collect more data for a more reliable analysis".to_string());
    }

    insights
}
