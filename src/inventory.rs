use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{ManufacturerEntity, MedicineEntity};

pub const UNKNOWN_MANUFACTURER: &str = "Unknown";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MedicineType {
    Tablets,
    Liquid,
    Powder,
    Other,
}

impl MedicineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MedicineType::Tablets => "tablets",
            MedicineType::Liquid => "liquid",
            MedicineType::Powder => "powder",
            MedicineType::Other => "other",
        }
    }
}

impl fmt::Display for MedicineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MedicineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tablets" => Ok(MedicineType::Tablets),
            "liquid" => Ok(MedicineType::Liquid),
            "powder" => Ok(MedicineType::Powder),
            "other" => Ok(MedicineType::Other),
            other => Err(format!("Unknown medicine type: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Validate, ToSchema)]
pub struct CustomField {
    #[validate(length(min = 1, message = "Field name is required"))]
    pub key: String,
    #[validate(length(min = 1, message = "Field value is required"))]
    pub value: String,
}

/// Case-insensitive match of a search query against a medicine's text fields.
/// A blank query matches nothing.
pub fn matches_query(medicine: &MedicineEntity, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return false;
    }

    let contains = |text: &str| text.to_lowercase().contains(&q);

    contains(&medicine.name)
        || contains(&medicine.chemicals)
        || contains(&medicine.description)
        || medicine
            .custom_field_list()
            .iter()
            .any(|field| contains(&field.key) || contains(&field.value))
}

pub fn manufacturer_names(manufacturers: Vec<ManufacturerEntity>) -> HashMap<Uuid, String> {
    manufacturers.into_iter().map(|m| (m.id, m.name)).collect()
}

pub fn manufacturer_name(names: &HashMap<Uuid, String>, id: &Uuid) -> String {
    names
        .get(id)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_MANUFACTURER.to_string())
}

#[derive(Serialize, Debug, Default, PartialEq, ToSchema)]
pub struct InventorySummary {
    pub total_medicines: usize,
    pub by_type: HashMap<String, usize>,
    pub units_in_stock: i64,
}

pub fn summarize(medicines: &[MedicineEntity]) -> InventorySummary {
    let mut summary = InventorySummary {
        total_medicines: medicines.len(),
        ..Default::default()
    };

    for medicine in medicines {
        *summary
            .by_type
            .entry(medicine.medicine_type.clone())
            .or_default() += 1;
        summary.units_in_stock += i64::from(medicine.quantity);
    }

    summary
}
