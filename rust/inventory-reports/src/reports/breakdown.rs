use super::{count, templates::WARRANTY_COLUMNS};
use crate::{
    error::{Result, ServiceError},
    executor::Row,
};
use serde::Serialize;
use serde_json::Value;

const CATEGORIES: &str = "category_breakdown";
const WARRANTY: &str = "warranty_breakdown";

/// One condition bucket. `name`/`y` match the chart series format; a null
/// condition keeps a null label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    #[serde(rename = "name")]
    pub label: Option<String>,
    #[serde(rename = "y")]
    pub count: i64,
}

pub(super) fn categories_from_rows(rows: &[Row]) -> Result<Vec<CategoryCount>> {
    rows.iter()
        .map(|row| {
            let label = match row.get("label") {
                Some(Value::String(label)) => Some(label.clone()),
                Some(Value::Null) => None,
                Some(other) => Some(other.to_string()),
                None => {
                    return Err(ServiceError::MalformedRow {
                        report: CATEGORIES,
                        column: "label".into(),
                    })
                }
            };
            Ok(CategoryCount {
                label,
                count: count(row, CATEGORIES, "count")?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyCounts {
    pub has_warranty: i64,
    pub no_warranty: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarrantyBreakdown {
    pub laptop: WarrantyCounts,
    pub desktop: WarrantyCounts,
    pub workstation: WarrantyCounts,
    pub server: WarrantyCounts,
}

impl WarrantyBreakdown {
    fn class_mut(&mut self, class: &str) -> Option<&mut WarrantyCounts> {
        match class {
            "laptop" => Some(&mut self.laptop),
            "desktop" => Some(&mut self.desktop),
            "workstation" => Some(&mut self.workstation),
            "server" => Some(&mut self.server),
            _ => None,
        }
    }
}

pub(super) fn warranty_from_rows(rows: &[Row]) -> Result<WarrantyBreakdown> {
    let mut breakdown = WarrantyBreakdown::default();
    let Some(row) = rows.first() else {
        return Ok(breakdown);
    };
    for (class, has_column, no_column) in WARRANTY_COLUMNS {
        let counts = WarrantyCounts {
            has_warranty: count(row, WARRANTY, has_column)?,
            no_warranty: count(row, WARRANTY, no_column)?,
        };
        if let Some(slot) = breakdown.class_mut(class) {
            *slot = counts;
        }
    }
    Ok(breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Taxonomy, executor::testing::RecordingExecutor, reports::ReportEngine,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn categories_keep_open_labels_and_null() {
        let rows = vec![
            json!({"label": "Good", "count": "7"}),
            json!({"label": "Defective", "count": 2}),
            json!({"label": null, "count": 1}),
        ];
        let engine = ReportEngine::new(
            Arc::new(RecordingExecutor::returning(rows)),
            Taxonomy::default(),
        );

        let buckets = engine.category_breakdown(None).await.expect("breakdown");
        assert_eq!(
            serde_json::to_value(&buckets).expect("serialize"),
            json!([
                {"name": "Good", "y": 7},
                {"name": "Defective", "y": 2},
                {"name": null, "y": 1}
            ])
        );
    }

    #[tokio::test]
    async fn warranty_counts_are_reshaped_per_class() {
        let rows = vec![json!({
            "laptop_has_warranty": 1, "laptop_no_warranty": 1,
            "desktop_has_warranty": "4", "desktop_no_warranty": 0,
            "workstation_has_warranty": null, "workstation_no_warranty": 3,
            "server_has_warranty": 2, "server_no_warranty": "6"
        })];
        let executor = Arc::new(RecordingExecutor::returning(rows));
        let engine = ReportEngine::new(executor.clone(), Taxonomy::default());

        let breakdown = engine.warranty_breakdown(Some("ART-5")).await.expect("breakdown");
        assert_eq!(
            breakdown.laptop,
            WarrantyCounts {
                has_warranty: 1,
                no_warranty: 1,
            }
        );
        assert_eq!(breakdown.workstation.has_warranty, 0);
        assert_eq!(breakdown.server.no_warranty, 6);
        assert_eq!(
            serde_json::to_value(breakdown).expect("serialize")["desktop"],
            json!({"hasWarranty": 4, "noWarranty": 0})
        );

        let statement = executor.last().expect("statement recorded");
        assert_eq!(statement.sql.matches("NOW()").count(), 8);
        assert_eq!(statement.params.len(), 16);
    }

    #[test]
    fn missing_warranty_column_is_malformed() {
        let rows: Vec<Row> = vec![json!({"laptop_has_warranty": 1})]
            .into_iter()
            .filter_map(|row| row.as_object().cloned())
            .collect();
        assert!(matches!(
            warranty_from_rows(&rows),
            Err(ServiceError::MalformedRow { .. })
        ));
    }
}
