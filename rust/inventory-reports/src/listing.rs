//! Filtered listings of assets and licenses.

use crate::{
    compose::{self, Paging},
    error::Result,
    executor::QueryExecutor,
    filter::{FilterCriterion, PredicateSet},
    models::{decode_rows, AssetRecord, LicenseRecord},
    pagination::{clamp_limit, decode_cursor, PaginationMeta},
    reports::templates::{self, ASSET_SEARCH_COLUMNS, DIMENSION_COLUMN},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Query-string filters for the asset listing. Blank values are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetQuery {
    pub search: Option<String>,
    #[serde(rename = "AgileReleaseTrain")]
    pub agile_release_train: Option<String>,
    #[serde(rename = "GroupAssetCategory")]
    pub group_asset_category: Option<String>,
    #[serde(rename = "AssetCondition")]
    pub asset_condition: Option<String>,
    #[serde(rename = "CheckoutTo")]
    pub checkout_to: Option<String>,
    #[serde(rename = "ScrumTeam")]
    pub scrum_team: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

impl AssetQuery {
    pub fn predicates(&self) -> PredicateSet {
        PredicateSet::new()
            .with(FilterCriterion::dimension(
                DIMENSION_COLUMN,
                self.agile_release_train.as_deref(),
            ))
            .with(FilterCriterion::search(
                ASSET_SEARCH_COLUMNS,
                self.search.as_deref(),
            ))
            .with(FilterCriterion::equality(
                "GroupAssetCategory",
                self.group_asset_category.as_deref(),
            ))
            .with(FilterCriterion::equality(
                "AssetCondition",
                self.asset_condition.as_deref(),
            ))
            .with(FilterCriterion::equality("CheckoutTo", self.checkout_to.as_deref()))
            .with(FilterCriterion::equality("ScrumTeam", self.scrum_team.as_deref()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LicenseQuery {
    pub license_type: Option<String>,
}

impl LicenseQuery {
    /// `All` is the picker's "no filter" entry.
    pub fn predicates(&self) -> PredicateSet {
        let license_type = self
            .license_type
            .as_deref()
            .filter(|value| !value.trim().eq_ignore_ascii_case("all"));
        PredicateSet::new().with(FilterCriterion::equality("license_type", license_type))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing<T> {
    pub results: Vec<T>,
    pub pagination: PaginationMeta,
}

#[derive(Clone)]
pub struct InventoryListing {
    executor: Arc<dyn QueryExecutor>,
    default_limit: i64,
    max_limit: i64,
}

impl InventoryListing {
    pub fn new(executor: Arc<dyn QueryExecutor>, default_limit: i64, max_limit: i64) -> Self {
        Self {
            executor,
            default_limit,
            max_limit,
        }
    }

    pub async fn assets(&self, query: &AssetQuery) -> Result<Listing<AssetRecord>> {
        let limit = clamp_limit(query.limit, self.default_limit, self.max_limit);
        let offset = query
            .cursor
            .as_deref()
            .filter(|cursor| !cursor.trim().is_empty())
            .map(decode_cursor)
            .transpose()?
            .unwrap_or(0);

        let template = templates::asset_listing(Paging { limit, offset });
        let composed = compose::compose(&template, &query.predicates())?;
        let rows = self.executor.fetch_rows(&composed).await?;
        debug!(rows = rows.len(), offset, limit, "asset listing fetched");

        let results: Vec<AssetRecord> = decode_rows(template.name, rows)?;
        let pagination = PaginationMeta::for_page(offset, limit, results.len());
        Ok(Listing {
            results,
            pagination,
        })
    }

    pub async fn licenses(&self, query: &LicenseQuery) -> Result<Vec<LicenseRecord>> {
        let template = templates::license_listing();
        let composed = compose::compose(&template, &query.predicates())?;
        let rows = self.executor.fetch_rows(&composed).await?;
        decode_rows(template.name, rows)
    }
}
