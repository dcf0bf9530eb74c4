use super::count;
use crate::{
    error::{Result, ServiceError},
    executor::Row,
};
use serde::Serialize;

const MONTHLY: &str = "monthly_series";
const YEARLY: &str = "yearly_series";

/// Per-month acquisition counts for the current year; index 0 is January.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonthlySeries {
    pub servers: [i64; 12],
    pub desktops: [i64; 12],
    #[serde(rename = "deltaV")]
    pub delta_v: [i64; 12],
}

pub(super) fn monthly_from_rows(rows: &[Row]) -> Result<MonthlySeries> {
    let mut series = MonthlySeries::default();
    for row in rows {
        let month = count(row, MONTHLY, "month")?;
        let slot = usize::try_from(month - 1)
            .ok()
            .filter(|slot| *slot < 12)
            .ok_or_else(|| {
                ServiceError::Internal(anyhow::anyhow!("month {month} outside 1..=12"))
            })?;
        series.servers[slot] = count(row, MONTHLY, "servers_count")?;
        series.desktops[slot] = count(row, MONTHLY, "desktops_count")?;
        series.delta_v[slot] = count(row, MONTHLY, "deltav_count")?;
    }
    Ok(series)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearBucket {
    pub year: i32,
    pub total_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct YearlySeries {
    pub years: Vec<YearBucket>,
}

/// A dimension filter restricts the counted rows, never the bucket shape.
pub(super) fn yearly_from_rows(rows: &[Row]) -> Result<YearlySeries> {
    let mut years = rows
        .iter()
        .map(|row| {
            let year = count(row, YEARLY, "acquisition_year")?;
            let year = i32::try_from(year).map_err(|_| {
                ServiceError::Internal(anyhow::anyhow!("acquisition year {year} out of range"))
            })?;
            Ok(YearBucket {
                year,
                total_count: count(row, YEARLY, "total_count")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    years.sort_by_key(|bucket| bucket.year);
    Ok(YearlySeries { years })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Taxonomy, executor::testing::RecordingExecutor, reports::ReportEngine,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn skeleton(filled: &[(i64, Value, Value, Value)]) -> Vec<Value> {
        (1..=12)
            .map(|month| {
                match filled.iter().find(|(m, ..)| *m == month) {
                    Some((_, servers, desktops, deltav)) => json!({
                        "month": month,
                        "servers_count": servers,
                        "desktops_count": desktops,
                        "deltav_count": deltav,
                    }),
                    None => json!({
                        "month": month,
                        "servers_count": 0,
                        "desktops_count": 0,
                        "deltav_count": 0,
                    }),
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn monthly_series_fills_twelve_buckets() {
        let rows = skeleton(&[
            (1, json!("3"), json!(1), json!(null)),
            (12, json!(2), json!("0"), json!(5)),
        ]);
        let engine = ReportEngine::new(
            Arc::new(RecordingExecutor::returning(rows)),
            Taxonomy::default(),
        );

        let series = engine.monthly_series(Some("ART-1")).await.expect("series");
        assert_eq!(series.servers, [3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(series.desktops, [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(series.delta_v, [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5]);

        let body = serde_json::to_value(&series).expect("serialize");
        assert_eq!(body["deltaV"].as_array().map(Vec::len), Some(12));
    }

    #[tokio::test]
    async fn monthly_filter_is_bound_in_counts_and_join() {
        let executor = Arc::new(RecordingExecutor::returning(skeleton(&[])));
        let engine = ReportEngine::new(executor.clone(), Taxonomy::default());
        engine.monthly_series(Some("ART-4")).await.expect("series");

        let statement = executor.last().expect("statement recorded");
        let dimension_binds = statement
            .params
            .iter()
            .filter(|param| **param == crate::compose::BindValue::Text("ART-4".into()))
            .count();
        assert_eq!(dimension_binds, 4);
        assert!(statement.sql.contains("LEFT JOIN assets a ON"), "{}", statement.sql);
        assert!(
            statement.sql.contains("a.\"AgileReleaseTrain\" = $7\nGROUP BY"),
            "{}",
            statement.sql
        );
    }

    #[test]
    fn out_of_range_month_is_rejected() {
        let rows: Vec<Row> = vec![json!({
            "month": 13, "servers_count": 0, "desktops_count": 0, "deltav_count": 0
        })]
        .into_iter()
        .filter_map(|row| row.as_object().cloned())
        .collect();
        assert!(monthly_from_rows(&rows).is_err());
    }

    #[tokio::test]
    async fn yearly_series_sorts_years_ascending() {
        let rows = vec![
            json!({"acquisition_year": 2024, "total_count": "5"}),
            json!({"acquisition_year": "2021", "total_count": 2}),
        ];
        let engine = ReportEngine::new(
            Arc::new(RecordingExecutor::returning(rows)),
            Taxonomy::default(),
        );

        let series = engine.yearly_series(None).await.expect("series");
        assert_eq!(
            series.years,
            vec![
                YearBucket {
                    year: 2021,
                    total_count: 2,
                },
                YearBucket {
                    year: 2024,
                    total_count: 5,
                },
            ]
        );
        assert_eq!(
            serde_json::to_value(&series).expect("serialize"),
            json!({"years": [
                {"year": 2021, "totalCount": 2},
                {"year": 2024, "totalCount": 5}
            ]})
        );
    }

    #[tokio::test]
    async fn yearly_dimension_restricts_rows_in_where() {
        let executor = Arc::new(RecordingExecutor::returning(vec![]));
        let engine = ReportEngine::new(executor.clone(), Taxonomy::default());
        engine.yearly_series(Some("ART-3")).await.expect("series");

        let statement = executor.last().expect("statement recorded");
        assert_eq!(statement.params, vec![crate::compose::BindValue::Text("ART-3".into())]);
        assert!(
            statement.sql.contains("AND \"AgileReleaseTrain\" = $1"),
            "{}",
            statement.sql
        );
    }
}
