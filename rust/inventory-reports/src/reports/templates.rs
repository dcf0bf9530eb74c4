//! Statement templates for every report shape and listing.
//!
//! Category vocabularies come from the configured [`Taxonomy`] and are always
//! bound as parameters.

use super::ReportShape;
use crate::{
    compose::{
        BindValue, ColumnRef, Condition, CountSpec, Join, Paging, RowFilterSlot, SelectItem,
        Template,
    },
    config::Taxonomy,
};

pub const DIMENSION_COLUMN: &str = "AgileReleaseTrain";

/// Asset columns filters may reference.
pub const ASSET_FILTER_COLUMNS: &[&str] = &[
    "AssetTag",
    "Description",
    "SerialNumber",
    "CostCenter",
    "AgileReleaseTrain",
    "GroupAssetCategory",
    "AssetCondition",
    "AssetCategory",
    "CheckoutTo",
    "ScrumTeam",
    "Location",
];

/// Columns the listing search term is matched against.
pub const ASSET_SEARCH_COLUMNS: [&str; 5] = [
    "AssetTag",
    "Description",
    "SerialNumber",
    "CostCenter",
    "AgileReleaseTrain",
];

pub const ASSET_COLUMNS: [&str; 16] = [
    "id",
    "AssetTag",
    "Description",
    "Location",
    "SerialNumber",
    "AssetCondition",
    "Specification",
    "GroupAssetCategory",
    "PoNumber",
    "Warranty",
    "DateAcquired",
    "CheckoutTo",
    "AssetCategory",
    "CostCenter",
    "ScrumTeam",
    "AgileReleaseTrain",
];

pub const LICENSE_FILTER_COLUMNS: &[&str] = &["license_type", "vendor", "cost_center"];

pub const LICENSE_COLUMNS: [&str; 8] = [
    "id",
    "product_name",
    "license_key",
    "license_type",
    "serial_number",
    "cost_center",
    "vendor",
    "contract_date",
];

const CATEGORY: ColumnRef = ColumnRef::new("AssetCategory");
const GROUP_CATEGORY: ColumnRef = ColumnRef::new("GroupAssetCategory");
const WARRANTY: ColumnRef = ColumnRef::new("Warranty");

pub fn for_shape(shape: ReportShape, taxonomy: &Taxonomy) -> Template {
    match shape {
        ReportShape::Summary => summary(taxonomy),
        ReportShape::MonthlySeries => monthly_series(taxonomy),
        ReportShape::YearlySeries => yearly_series(),
        ReportShape::CategoryBreakdown => category_breakdown(),
        ReportShape::WarrantyBreakdown => warranty_breakdown(taxonomy),
    }
}

fn asset_template(name: &'static str, from: &'static str) -> Template {
    let mut template = Template::new(name, from);
    template.allowed_columns = ASSET_FILTER_COLUMNS;
    template.dimension_column = Some(DIMENSION_COLUMN);
    template
}

fn aware_count(alias: &'static str, target: &'static str, condition: Condition) -> SelectItem {
    SelectItem::Count(CountSpec::new(alias, target).when(condition).dimension_aware())
}

fn summary(taxonomy: &Taxonomy) -> Template {
    let mut template = asset_template("summary", "assets");
    template.select = vec![
        aware_count("servers", "*", Condition::AnyOf(CATEGORY, taxonomy.servers.clone())),
        aware_count("desktops", "*", Condition::AnyOf(CATEGORY, taxonomy.desktops.clone())),
        aware_count(
            "delta_v",
            "*",
            Condition::Eq(GROUP_CATEGORY, BindValue::Text(taxonomy.delta_v_group.clone())),
        ),
        aware_count("laptops", "*", Condition::AnyOf(CATEGORY, taxonomy.laptops.clone())),
    ];
    template
}

fn monthly_series(taxonomy: &Taxonomy) -> Template {
    let category = ColumnRef::qualified("a", "AssetCategory");
    let group = ColumnRef::qualified("a", "GroupAssetCategory");
    let series_count = |alias, condition| {
        SelectItem::Count(
            CountSpec::new(alias, "a.id")
                .when(condition)
                .dimension_aware()
                .coalesced(),
        )
    };

    let mut template = asset_template("monthly_series", "generate_series(1, 12) AS m(month)");
    template.select = vec![
        SelectItem::Expr {
            expr: "m.month",
            alias: "month",
        },
        series_count(
            "servers_count",
            Condition::AnyOf(category, taxonomy.servers.clone()),
        ),
        series_count(
            "desktops_count",
            Condition::AnyOf(category, taxonomy.desktops.clone()),
        ),
        series_count(
            "deltav_count",
            Condition::Eq(group, BindValue::Text(taxonomy.delta_v_group.clone())),
        ),
    ];
    template.join = Some(Join {
        relation: "assets a",
        on: vec![
            Condition::Sql("m.month = EXTRACT(MONTH FROM a.\"DateAcquired\")"),
            Condition::Sql("EXTRACT(YEAR FROM a.\"DateAcquired\") = EXTRACT(YEAR FROM NOW())"),
        ],
        dimension_aware: true,
    });
    template.row_filter_slot = RowFilterSlot::Join;
    template.row_qualifier = Some("a");
    template.group_by = Some("m.month");
    template.order_by = Some("m.month");
    template.result_order = Some("month");
    template
}

fn yearly_series() -> Template {
    let mut template = asset_template("yearly_series", "assets");
    template.select = vec![
        SelectItem::Expr {
            expr: "EXTRACT(YEAR FROM \"DateAcquired\")::int",
            alias: "acquisition_year",
        },
        SelectItem::Count(CountSpec::new("total_count", "id")),
    ];
    template.filters = vec![Condition::IsNotNull(ColumnRef::new("DateAcquired"))];
    template.where_dimension_aware = true;
    template.group_by = Some("acquisition_year");
    template.order_by = Some("acquisition_year ASC");
    template.result_order = Some("acquisition_year ASC");
    template
}

fn category_breakdown() -> Template {
    let mut template = asset_template("category_breakdown", "assets");
    template.select = vec![
        SelectItem::Expr {
            expr: "\"AssetCondition\"",
            alias: "label",
        },
        SelectItem::Count(CountSpec::new("count", "*")),
    ];
    template.where_dimension_aware = true;
    template.group_by = Some("\"AssetCondition\"");
    template.order_by = Some("\"AssetCondition\" ASC NULLS LAST");
    template.result_order = Some("label ASC NULLS LAST");
    template
}

/// Output aliases per asset class: (class, has-warranty, no-warranty).
pub(super) const WARRANTY_COLUMNS: [(&str, &str, &str); 4] = [
    ("laptop", "laptop_has_warranty", "laptop_no_warranty"),
    ("desktop", "desktop_has_warranty", "desktop_no_warranty"),
    (
        "workstation",
        "workstation_has_warranty",
        "workstation_no_warranty",
    ),
    ("server", "server_has_warranty", "server_no_warranty"),
];

fn warranty_breakdown(taxonomy: &Taxonomy) -> Template {
    let classes = [
        taxonomy.laptops.clone(),
        taxonomy.desktops_only(),
        taxonomy.workstations.clone(),
        taxonomy.servers.clone(),
    ];

    let mut template = asset_template("warranty_breakdown", "assets");
    for ((_, has_alias, no_alias), categories) in WARRANTY_COLUMNS.into_iter().zip(classes) {
        let covered = Condition::And(vec![
            Condition::AnyOf(CATEGORY, categories.clone()),
            Condition::IsNotNull(WARRANTY),
            Condition::Compare(WARRANTY, ">=", "NOW()"),
        ]);
        let uncovered = Condition::And(vec![
            Condition::AnyOf(CATEGORY, categories),
            Condition::Or(vec![
                Condition::IsNull(WARRANTY),
                Condition::Compare(WARRANTY, "<", "NOW()"),
            ]),
        ]);
        template.select.push(aware_count(has_alias, "*", covered));
        template.select.push(aware_count(no_alias, "*", uncovered));
    }
    template
}

pub fn asset_listing(paging: Paging) -> Template {
    let mut template = asset_template("asset_listing", "assets");
    template.select = ASSET_COLUMNS.into_iter().map(SelectItem::Column).collect();
    template.where_dimension_aware = true;
    template.order_by = Some("id ASC");
    template.result_order = Some("id ASC");
    template.paging = Some(paging);
    template
}

pub fn license_listing() -> Template {
    let mut template = Template::new("license_listing", "licenses");
    template.select = LICENSE_COLUMNS.into_iter().map(SelectItem::Column).collect();
    template.allowed_columns = LICENSE_FILTER_COLUMNS;
    template.order_by = Some("id DESC");
    template.result_order = Some("id DESC");
    template
}
