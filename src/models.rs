use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::inventory::CustomField;

// Manufacturers

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::manufacturers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ManufacturerEntity {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::manufacturers)]
pub struct CreateManufacturerEntity {
    pub name: String,
}

// Users

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct CreateUserEntity {
    pub uid: String,
    pub email: String,
    pub role: String,
    pub pharmacy_id: Option<String>,
    pub branch_name: Option<String>,
}

// Branches

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::branches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BranchEntity {
    pub pharmacy_id: String,
    pub name: String,
    pub city: String,
    pub state: String,
    pub manager_uid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::branches)]
pub struct CreateBranchEntity {
    pub pharmacy_id: String,
    pub name: String,
    pub city: String,
    pub state: String,
    pub manager_uid: Option<String>,
}

// Medicines

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::medicines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MedicineEntity {
    pub id: Uuid,
    pub pharmacy_id: String,
    pub branch_name: String,
    pub name: String,
    pub manufacturer_id: Uuid,
    pub chemicals: String,
    pub description: String,
    #[schema(value_type = Vec<CustomField>)]
    pub custom_fields: Value,
    pub medicine_type: String,
    pub quantity: i32,
    pub price_per_unit: f64,
    pub liquid_ml: Option<i32>,
    pub tablets_per_box: Option<i32>,
    pub powder_weight: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicineEntity {
    /// Custom fields decoded from the stored JSON; malformed data reads as empty.
    pub fn custom_field_list(&self) -> Vec<CustomField> {
        serde_json::from_value(self.custom_fields.clone()).unwrap_or_default()
    }
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::medicines)]
#[diesel(treat_none_as_null = true)]
pub struct MedicineFormEntity {
    pub pharmacy_id: String,
    pub branch_name: String,
    pub name: String,
    pub manufacturer_id: Uuid,
    pub chemicals: String,
    pub description: String,
    pub custom_fields: Value,
    pub medicine_type: String,
    pub quantity: i32,
    pub price_per_unit: f64,
    pub liquid_ml: Option<i32>,
    pub tablets_per_box: Option<i32>,
    pub powder_weight: Option<f64>,
}

// Carts

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::carts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartEntity {
    pub id: i32,
    pub owner_uid: String,
    pub pharmacy_id: String,
    pub branch_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::carts)]
pub struct CreateCartEntity {
    pub owner_uid: String,
    pub pharmacy_id: String,
    pub branch_name: String,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemEntity {
    pub id: i32,
    pub cart_id: i32,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub medicine_type: String,
    pub unit: String,
    pub quantity: i32,
    pub price_per_unit: f64,
    pub tablets_per_box: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct CreateCartItemEntity {
    pub cart_id: i32,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub medicine_type: String,
    pub unit: String,
    pub quantity: i32,
    pub price_per_unit: f64,
    pub tablets_per_box: Option<i32>,
}

// Sales

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::sales)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SaleEntity {
    pub id: Uuid,
    pub pharmacy_id: String,
    pub branch_name: String,
    pub cashier_uid: String,
    pub total: f64,
    pub temperature_c: Option<f64>,
    pub weather_condition: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::sales)]
pub struct CreateSaleEntity {
    pub pharmacy_id: String,
    pub branch_name: String,
    pub cashier_uid: String,
    pub total: f64,
    pub temperature_c: Option<f64>,
    pub weather_condition: Option<String>,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::sale_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SaleItemEntity {
    pub id: i32,
    pub sale_id: Uuid,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub unit: String,
    pub quantity: i32,
    pub pieces: i32,
    pub unit_price: f64,
    pub line_total: f64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::sale_items)]
pub struct CreateSaleItemEntity {
    pub sale_id: Uuid,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub unit: String,
    pub quantity: i32,
    pub pieces: i32,
    pub unit_price: f64,
    pub line_total: f64,
}

// Stock requests

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::stock_requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StockRequestEntity {
    pub id: Uuid,
    pub pharmacy_id: String,
    pub branch_name: String,
    pub medicine_id: Uuid,
    pub quantity: i32,
    pub status: String,
    pub note: Option<String>,
    pub requested_by: String,
    pub decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::stock_requests)]
pub struct CreateStockRequestEntity {
    pub pharmacy_id: String,
    pub branch_name: String,
    pub medicine_id: Uuid,
    pub quantity: i32,
    pub status: String,
    pub note: Option<String>,
    pub requested_by: String,
}

// Assistant chat

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::chat_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChatMessageEntity {
    pub id: Uuid,
    pub pharmacy_id: String,
    pub owner_uid: String,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::chat_messages)]
pub struct CreateChatMessageEntity {
    pub pharmacy_id: String,
    pub owner_uid: String,
    pub sender: String,
    pub content: String,
}
