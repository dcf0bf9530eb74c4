use super::count;
use crate::{error::Result, executor::Row};
use serde::Serialize;

const REPORT: &str = "summary";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetSummary {
    pub servers: i64,
    pub desktops: i64,
    #[serde(rename = "deltaV")]
    pub delta_v: i64,
    pub laptops: i64,
}

/// A single-row aggregate; no row at all reads as all zeros.
pub(super) fn from_rows(rows: &[Row]) -> Result<AssetSummary> {
    let Some(row) = rows.first() else {
        return Ok(AssetSummary::default());
    };
    Ok(AssetSummary {
        servers: count(row, REPORT, "servers")?,
        desktops: count(row, REPORT, "desktops")?,
        delta_v: count(row, REPORT, "delta_v")?,
        laptops: count(row, REPORT, "laptops")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Taxonomy,
        error::ServiceError,
        executor::testing::RecordingExecutor,
        reports::ReportEngine,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn summary_maps_counts_and_serializes_delta_v() {
        let executor = Arc::new(RecordingExecutor::returning(vec![json!({
            "servers": "2", "desktops": 1, "delta_v": null, "laptops": 1
        })]));
        let engine = ReportEngine::new(executor.clone(), Taxonomy::default());

        let summary = engine.summary(None).await.expect("summary");
        assert_eq!(
            summary,
            AssetSummary {
                servers: 2,
                desktops: 1,
                delta_v: 0,
                laptops: 1,
            }
        );
        assert_eq!(
            serde_json::to_value(summary).expect("serialize"),
            json!({"servers": 2, "desktops": 1, "deltaV": 0, "laptops": 1})
        );

        let statement = executor.last().expect("statement recorded");
        assert_eq!(statement.params.len(), 4);
        assert!(!statement.sql.contains("AgileReleaseTrain"));
    }

    #[tokio::test]
    async fn dimension_is_bound_once_per_count() {
        let executor = Arc::new(RecordingExecutor::returning(vec![json!({
            "servers": 0, "desktops": 0, "delta_v": 0, "laptops": 0
        })]));
        let engine = ReportEngine::new(executor.clone(), Taxonomy::default());
        engine.summary(Some("ART-3")).await.expect("summary");

        let statement = executor.last().expect("statement recorded");
        assert_eq!(statement.params.len(), 8);
        for index in [2, 4, 6, 8] {
            assert!(
                statement
                    .sql
                    .contains(&format!("\"AgileReleaseTrain\" = ${index})")),
                "{}",
                statement.sql
            );
        }
    }

    #[test]
    fn missing_aggregate_column_is_malformed() {
        let rows = vec![json!({"servers": 1, "desktops": 1, "laptops": 1})];
        let rows: Vec<Row> = rows
            .into_iter()
            .filter_map(|row| row.as_object().cloned())
            .collect();
        let err = from_rows(&rows).expect_err("delta_v is missing");
        assert!(
            matches!(err, ServiceError::MalformedRow { ref column, .. } if column == "delta_v"),
            "{err:?}"
        );
    }
}
