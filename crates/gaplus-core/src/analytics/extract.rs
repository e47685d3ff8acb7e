//! Turn result rows into a dated metric series
//!
//! Two row shapes are accepted:
//! - flat: `{"date": "20240101", "sessions": 120}`
//! - columnar: `{"dimension_values": ["20240101"], "metric_values": ["120"]}`
//!
//! Columnar rows use position 0 of each list. Points are sorted by their date
//! string, so `YYYYMMDD` and `YYYY-MM-DD` both order chronologically.

use crate::models::{Row, Scalar};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One dated observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: String,
    pub value: f64,
}

/// Extract from typed result rows (flat shape)
pub fn series_from_rows(rows: &[Row], metric: &str, time_dimension: &str) -> Vec<SeriesPoint> {
    let mut series: Vec<SeriesPoint> = rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let date = row.get(time_dimension)?.as_text();
            let raw = row.get(metric)?;
            match raw.as_f64() {
                Some(value) => Some(SeriesPoint { date, value }),
                None => {
                    warn!(row = idx, metric, value = %raw, "Skipping non-numeric metric value");
                    None
                }
            }
        })
        .collect();

    sort_by_date(&mut series);
    series
}

/// Extract from arbitrary JSON rows (flat or columnar)
pub fn series_from_json(rows: &[Value], metric: &str, time_dimension: &str) -> Vec<SeriesPoint> {
    let mut series = Vec::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let Some(obj) = row.as_object() else {
            warn!(row = idx, "Skipping non-object row");
            continue;
        };

        let point = if let (Some(dims), Some(metrics)) = (
            obj.get("dimension_values").and_then(Value::as_array),
            obj.get("metric_values").and_then(Value::as_array),
        ) {
            let (Some(date), Some(raw)) = (dims.first(), metrics.first()) else {
                continue;
            };
            columnar_value(raw).map(|value| SeriesPoint {
                date: json_text(date),
                value,
            })
        } else {
            let (Some(date), Some(raw)) = (obj.get(time_dimension), obj.get(metric)) else {
                continue;
            };
            json_number(raw).map(|value| SeriesPoint {
                date: json_text(date),
                value,
            })
        };

        match point {
            Some(p) => series.push(p),
            None => warn!(row = idx, metric, "Skipping non-numeric metric value"),
        }
    }

    sort_by_date(&mut series);
    series
}

fn sort_by_date(series: &mut [SeriesPoint]) {
    series.sort_by(|a, b| a.date.cmp(&b.date));
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Scalar::parse_numeric(s).as_f64(),
        _ => None,
    }
}

/// Columnar cells treat empty and null as zero
fn columnar_value(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        other => json_number(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_json_sorted_by_date() {
        let rows = vec![
            json!({"date": "20240103", "sessions": 30}),
            json!({"date": "20240101", "sessions": "10"}),
            json!({"date": "20240102", "sessions": 20.5}),
            json!({"date": "20240104", "sessions": "n/a"}),
            json!({"sessions": 99}),
        ];
        let series = series_from_json(&rows, "sessions", "date");

        assert_eq!(series.len(), 3);
        assert_eq!(series[0], SeriesPoint { date: "20240101".into(), value: 10.0 });
        assert_eq!(series[1].value, 20.5);
        assert_eq!(series[2].date, "20240103");
    }

    #[test]
    fn test_columnar_rows() {
        let rows = vec![
            json!({"dimension_values": ["20240102"], "metric_values": [""]}),
            json!({"dimension_values": ["20240101"], "metric_values": ["7"]}),
            json!({"dimension_values": [], "metric_values": ["1"]}),
        ];
        let series = series_from_json(&rows, "ignored", "date");

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].value, 7.0);
        assert_eq!(series[1].value, 0.0, "Empty columnar value counts as zero");
    }

    #[test]
    fn test_typed_rows_custom_time_dimension() {
        let rows: Vec<Row> = (0..3)
            .rev()
            .map(|i| {
                let mut row = Row::new();
                row.insert("month".into(), Scalar::Text(format!("20240{}", i + 1)));
                row.insert("users".into(), Scalar::Int(i * 10));
                row
            })
            .collect();
        let series = series_from_rows(&rows, "users", "month");

        let dates: Vec<_> = series.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec!["202401", "202402", "202403"]);
        assert!(series_from_rows(&rows, "users", "date").is_empty());
    }
}
