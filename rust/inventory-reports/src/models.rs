//! Read-side inventory records.

use crate::{
    error::{Result, ServiceError},
    executor::Row,
    listview::TableRecord,
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Asset row; field names on the wire keep the store's column casing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssetRecord {
    #[serde(rename = "id")]
    pub id: i64,
    pub asset_tag: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub serial_number: Option<String>,
    pub asset_condition: Option<String>,
    pub specification: Option<String>,
    pub group_asset_category: Option<String>,
    pub po_number: Option<String>,
    pub warranty: Option<NaiveDate>,
    pub date_acquired: Option<NaiveDate>,
    pub checkout_to: Option<String>,
    pub asset_category: Option<String>,
    pub cost_center: Option<String>,
    pub scrum_team: Option<String>,
    pub agile_release_train: Option<String>,
}

impl TableRecord for AssetRecord {
    fn cell(&self, column: &str) -> Option<String> {
        let text = |value: &Option<String>| value.clone();
        match column {
            "id" => Some(self.id.to_string()),
            "AssetTag" => text(&self.asset_tag),
            "Description" => text(&self.description),
            "Location" => text(&self.location),
            "SerialNumber" => text(&self.serial_number),
            "AssetCondition" => text(&self.asset_condition),
            "Specification" => text(&self.specification),
            "GroupAssetCategory" => text(&self.group_asset_category),
            "PoNumber" => text(&self.po_number),
            "Warranty" => self.warranty.map(|date| date.to_string()),
            "DateAcquired" => self.date_acquired.map(|date| date.to_string()),
            "CheckoutTo" => text(&self.checkout_to),
            "AssetCategory" => text(&self.asset_category),
            "CostCenter" => text(&self.cost_center),
            "ScrumTeam" => text(&self.scrum_team),
            "AgileReleaseTrain" => text(&self.agile_release_train),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub id: i64,
    pub product_name: Option<String>,
    pub license_key: Option<String>,
    pub license_type: Option<String>,
    pub serial_number: Option<String>,
    pub cost_center: Option<String>,
    pub vendor: Option<String>,
    pub contract_date: Option<NaiveDate>,
}

impl TableRecord for LicenseRecord {
    fn cell(&self, column: &str) -> Option<String> {
        match column {
            "id" => Some(self.id.to_string()),
            "product_name" => self.product_name.clone(),
            "license_key" => self.license_key.clone(),
            "license_type" => self.license_type.clone(),
            "serial_number" => self.serial_number.clone(),
            "cost_center" => self.cost_center.clone(),
            "vendor" => self.vendor.clone(),
            "contract_date" => self.contract_date.map(|date| date.to_string()),
            _ => None,
        }
    }
}

/// Decodes executor rows into records. Timestamps serialized by the store
/// (`2024-05-01T00:00:00`) are narrowed to their date part first.
pub fn decode_rows<T: DeserializeOwned>(report: &'static str, rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|mut row| {
            for value in row.values_mut() {
                narrow_timestamp(value);
            }
            serde_json::from_value(Value::Object(row)).map_err(|err| {
                ServiceError::Internal(anyhow::anyhow!("{report}: undecodable row: {err}"))
            })
        })
        .collect()
}

fn narrow_timestamp(value: &mut Value) {
    if let Value::String(text) = value {
        let is_timestamp = text.as_bytes().get(10) == Some(&b'T')
            && text
                .get(..10)
                .is_some_and(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok());
        if is_timestamp {
            text.truncate(10);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn asset_rows_decode_with_store_casing() {
        let row = json!({
            "id": 7,
            "AssetTag": "A-0007",
            "Description": "Dell Latitude",
            "Warranty": "2026-03-01T00:00:00",
            "DateAcquired": "2023-03-01",
            "AgileReleaseTrain": "ART-1",
            "Location": null
        });
        let rows = vec![row.as_object().cloned().unwrap_or_default()];
        let assets: Vec<AssetRecord> = decode_rows("asset_listing", rows).expect("decode");
        let asset = &assets[0];
        assert_eq!(asset.id, 7);
        assert_eq!(asset.cell("AssetTag").as_deref(), Some("A-0007"));
        assert_eq!(asset.cell("Warranty").as_deref(), Some("2026-03-01"));
        assert_eq!(asset.cell("Location"), None);
        assert_eq!(asset.cell("Unknown"), None);

        let back = serde_json::to_value(asset).expect("serialize");
        assert_eq!(back["AgileReleaseTrain"], json!("ART-1"));
        assert_eq!(back["id"], json!(7));
    }

    #[test]
    fn license_rows_decode() {
        let row = json!({
            "id": 3,
            "product_name": "Visio",
            "license_type": "Subscription",
            "contract_date": "2024-01-15"
        });
        let rows = vec![row.as_object().cloned().unwrap_or_default()];
        let licenses: Vec<LicenseRecord> = decode_rows("license_listing", rows).expect("decode");
        assert_eq!(licenses[0].cell("contract_date").as_deref(), Some("2024-01-15"));
        assert_eq!(licenses[0].vendor, None);
    }
}
