//! Aggregation reports over the asset inventory.
//!
//! Each shape composes exactly one statement, runs it through a
//! [`QueryExecutor`], and reshapes the returned rows through an explicit
//! column mapping. Counts that come back null (an empty bucket) become 0; a
//! column that is missing altogether is a [`ServiceError::MalformedRow`].

mod breakdown;
mod series;
mod summary;
pub mod templates;

pub use breakdown::{CategoryCount, WarrantyBreakdown, WarrantyCounts};
pub use series::{MonthlySeries, YearBucket, YearlySeries};
pub use summary::AssetSummary;

use crate::{
    compose::{self, ComposedQuery},
    config::Taxonomy,
    error::{Result, ServiceError},
    executor::{QueryExecutor, Row},
    filter::{FilterCriterion, PredicateSet},
};
use serde::Serialize;
use serde_json::Value;
use std::{fmt, str::FromStr, sync::Arc};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportShape {
    Summary,
    MonthlySeries,
    YearlySeries,
    CategoryBreakdown,
    WarrantyBreakdown,
}

impl ReportShape {
    pub const ALL: [ReportShape; 5] = [
        ReportShape::Summary,
        ReportShape::MonthlySeries,
        ReportShape::YearlySeries,
        ReportShape::CategoryBreakdown,
        ReportShape::WarrantyBreakdown,
    ];

    /// Route segment under `/api/assets/`.
    pub fn slug(self) -> &'static str {
        match self {
            ReportShape::Summary => "summary",
            ReportShape::MonthlySeries => "by-month",
            ReportShape::YearlySeries => "by-year",
            ReportShape::CategoryBreakdown => "by-condition",
            ReportShape::WarrantyBreakdown => "warranty-status",
        }
    }
}

impl fmt::Display for ReportShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ReportShape {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        ReportShape::ALL
            .into_iter()
            .find(|shape| shape.slug() == normalized)
            .ok_or_else(|| ServiceError::InvalidFilter(format!("unknown report template '{value}'")))
    }
}

#[derive(Clone)]
pub struct ReportEngine {
    executor: Arc<dyn QueryExecutor>,
    taxonomy: Arc<Taxonomy>,
}

impl ReportEngine {
    pub fn new(executor: Arc<dyn QueryExecutor>, taxonomy: Taxonomy) -> Self {
        Self {
            executor,
            taxonomy: Arc::new(taxonomy),
        }
    }

    /// Composes the statement for `shape` without running it.
    pub fn preview(&self, shape: ReportShape, dimension: Option<&str>) -> Result<ComposedQuery> {
        let template = templates::for_shape(shape, &self.taxonomy);
        compose::compose(&template, &dimension_filter(dimension))
    }

    pub async fn summary(&self, dimension: Option<&str>) -> Result<AssetSummary> {
        let rows = self.run(ReportShape::Summary, dimension).await?;
        summary::from_rows(&rows)
    }

    pub async fn monthly_series(&self, dimension: Option<&str>) -> Result<MonthlySeries> {
        let rows = self.run(ReportShape::MonthlySeries, dimension).await?;
        series::monthly_from_rows(&rows)
    }

    pub async fn yearly_series(&self, dimension: Option<&str>) -> Result<YearlySeries> {
        let rows = self.run(ReportShape::YearlySeries, dimension).await?;
        series::yearly_from_rows(&rows)
    }

    pub async fn category_breakdown(&self, dimension: Option<&str>) -> Result<Vec<CategoryCount>> {
        let rows = self.run(ReportShape::CategoryBreakdown, dimension).await?;
        breakdown::categories_from_rows(&rows)
    }

    pub async fn warranty_breakdown(&self, dimension: Option<&str>) -> Result<WarrantyBreakdown> {
        let rows = self.run(ReportShape::WarrantyBreakdown, dimension).await?;
        breakdown::warranty_from_rows(&rows)
    }

    async fn run(&self, shape: ReportShape, dimension: Option<&str>) -> Result<Vec<Row>> {
        let template = templates::for_shape(shape, &self.taxonomy);
        let composed = compose::compose(&template, &dimension_filter(dimension))?;
        let rows = self.executor.fetch_rows(&composed).await?;
        debug!(report = %shape, rows = rows.len(), "report rows fetched");

        let expected = template.output_columns();
        for row in &rows {
            if let Some(missing) = expected.iter().find(|column| !row.contains_key(**column)) {
                return Err(ServiceError::MalformedRow {
                    report: template.name,
                    column: (*missing).to_string(),
                });
            }
        }
        Ok(rows)
    }
}

pub fn dimension_filter(value: Option<&str>) -> PredicateSet {
    PredicateSet::new().with(FilterCriterion::dimension(
        templates::DIMENSION_COLUMN,
        value,
    ))
}

/// Reads an aggregate column: null or unparseable becomes 0, absent is an
/// error.
pub(crate) fn count(row: &Row, report: &'static str, column: &str) -> Result<i64> {
    let value = row.get(column).ok_or_else(|| ServiceError::MalformedRow {
        report,
        column: column.to_string(),
    })?;
    Ok(coerce_count(value))
}

fn coerce_count(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64))
            .unwrap_or(0),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|float| float as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}
