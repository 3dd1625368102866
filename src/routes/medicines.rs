use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{BranchScope, CurrentUser},
    inventory::{self, CustomField, MedicineType},
    middleware,
    models::{ManufacturerEntity, MedicineEntity, MedicineFormEntity},
    schema::{manufacturers, medicines},
};

/// Defines the branch inventory routes.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/medicines",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_medicines))
            .routes(utoipa_axum::routes!(search_medicines))
            .routes(utoipa_axum::routes!(get_medicine))
            .routes(utoipa_axum::routes!(create_medicine))
            .routes(utoipa_axum::routes!(update_medicine))
            .routes(utoipa_axum::routes!(delete_medicine))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

#[derive(Deserialize, Validate, ToSchema, Debug)]
#[validate(schema(function = "validate_packaging"))]
pub(crate) struct MedicineReq {
    #[validate(length(min = 1, message = "Medicine name is required"))]
    pub name: String,
    pub manufacturer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Chemicals are required"))]
    pub chemicals: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[serde(default)]
    #[validate]
    pub custom_fields: Vec<CustomField>,
    pub medicine_type: MedicineType,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price_per_unit: f64,
    pub liquid_ml: Option<i32>,
    pub tablets_per_box: Option<i32>,
    pub powder_weight: Option<f64>,
}

fn packaging_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Each medicine type carries its own packaging measure.
fn validate_packaging(req: &MedicineReq) -> Result<(), ValidationError> {
    match req.medicine_type {
        MedicineType::Tablets if !req.tablets_per_box.is_some_and(|n| n >= 1) => Err(
            packaging_error("tablets_per_box", "Tablets per box must be at least 1"),
        ),
        MedicineType::Liquid if !req.liquid_ml.is_some_and(|ml| ml > 0) => Err(packaging_error(
            "liquid_ml",
            "Liquid volume must be greater than 0",
        )),
        MedicineType::Powder if !req.powder_weight.is_some_and(|w| w > 0.0) => Err(
            packaging_error("powder_weight", "Powder weight must be greater than 0"),
        ),
        _ => Ok(()),
    }
}

impl MedicineReq {
    /// Validates the form and resolves the manufacturer, which is required but
    /// checked here so a missing one reports alongside the other field errors.
    fn validated_manufacturer(&self) -> Result<Uuid, AppError> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        let manufacturer_id = self.manufacturer_id;
        if manufacturer_id.is_none() {
            errors.add(
                "manufacturer_id",
                packaging_error("required", "Manufacturer is required"),
            );
        }

        match manufacturer_id {
            Some(id) if errors.errors().is_empty() => Ok(id),
            _ => Err(AppError::Validation(errors)),
        }
    }

    fn into_form(self, scope: BranchScope, manufacturer_id: Uuid) -> MedicineFormEntity {
        // Only the measure matching the type is stored.
        let (liquid_ml, tablets_per_box, powder_weight) = match self.medicine_type {
            MedicineType::Tablets => (None, self.tablets_per_box, None),
            MedicineType::Liquid => (self.liquid_ml, None, None),
            MedicineType::Powder => (None, None, self.powder_weight),
            MedicineType::Other => (None, None, None),
        };

        MedicineFormEntity {
            pharmacy_id: scope.pharmacy_id,
            branch_name: scope.branch_name,
            name: self.name,
            manufacturer_id,
            chemicals: self.chemicals,
            description: self.description,
            custom_fields: serde_json::to_value(self.custom_fields)
                .unwrap_or_else(|_| serde_json::Value::Array(Vec::new())),
            medicine_type: self.medicine_type.as_str().to_string(),
            quantity: self.quantity,
            price_per_unit: self.price_per_unit,
            liquid_ml,
            tablets_per_box,
            powder_weight,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(crate) struct MedicineRes {
    #[serde(flatten)]
    pub medicine: MedicineEntity,
    pub manufacturer_name: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct SearchQuery {
    /// Matched against name, chemicals, description and custom fields.
    pub q: Option<String>,
}

async fn ensure_manufacturer_exists(
    conn: &mut AsyncPgConnection,
    manufacturer_id: Uuid,
) -> Result<(), AppError> {
    let found: i64 = manufacturers::table
        .find(manufacturer_id)
        .count()
        .get_result(conn)
        .await
        .context("Failed to check manufacturer")?;

    if found == 0 {
        let mut errors = ValidationErrors::new();
        errors.add(
            "manufacturer_id",
            packaging_error("unknown_manufacturer", "Manufacturer does not exist"),
        );
        return Err(AppError::Validation(errors));
    }
    Ok(())
}

async fn with_manufacturer_names(
    conn: &mut AsyncPgConnection,
    medicines: Vec<MedicineEntity>,
) -> Result<Vec<MedicineRes>, AppError> {
    let ids: Vec<Uuid> = medicines.iter().map(|m| m.manufacturer_id).collect();
    let manufacturers: Vec<ManufacturerEntity> = manufacturers::table
        .filter(manufacturers::id.eq_any(ids))
        .get_results(conn)
        .await
        .context("Failed to get manufacturers")?;
    let names = inventory::manufacturer_names(manufacturers);

    Ok(medicines
        .into_iter()
        .map(|medicine| MedicineRes {
            manufacturer_name: inventory::manufacturer_name(&names, &medicine.manufacturer_id),
            medicine,
        })
        .collect())
}

async fn branch_medicines(
    conn: &mut AsyncPgConnection,
    scope: &BranchScope,
) -> Result<Vec<MedicineEntity>, AppError> {
    let medicines = medicines::table
        .filter(medicines::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(medicines::branch_name.eq(&scope.branch_name))
        .order_by(medicines::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get medicines")?;
    Ok(medicines)
}

/// List every medicine of the current branch with its manufacturer name.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List medicines", body = StdResponse<Vec<MedicineRes>, String>)
    )
)]
async fn get_medicines(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicines = branch_medicines(conn, &scope).await?;
    let medicines = with_manufacturer_names(conn, medicines).await?;

    Ok(StdResponse {
        data: Some(medicines),
        message: Some("Get medicines successfully"),
    })
}

/// Search the current branch's medicines. A blank query returns nothing.
#[utoipa::path(
    get,
    path = "/search",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    params(SearchQuery),
    responses(
        (status = 200, description = "Search medicines", body = StdResponse<Vec<MedicineRes>, String>)
    )
)]
async fn search_medicines(
    Query(query): Query<SearchQuery>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;
    let q = query.q.unwrap_or_default();

    if q.trim().is_empty() {
        return Ok(StdResponse {
            data: Some(Vec::new()),
            message: Some("Search medicines successfully"),
        });
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let matches: Vec<MedicineEntity> = branch_medicines(conn, &scope)
        .await?
        .into_iter()
        .filter(|medicine| inventory::matches_query(medicine, &q))
        .collect();
    let matches = with_manufacturer_names(conn, matches).await?;

    Ok(StdResponse {
        data: Some(matches),
        message: Some("Search medicines successfully"),
    })
}

/// Fetch one medicine of the current branch.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Medicine ID")),
    responses(
        (status = 200, description = "Get medicine successfully", body = StdResponse<MedicineRes, String>)
    )
)]
async fn get_medicine(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicine: MedicineEntity = medicines::table
        .find(id)
        .filter(medicines::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(medicines::branch_name.eq(&scope.branch_name))
        .get_result(conn)
        .await?;

    let mut found = with_manufacturer_names(conn, vec![medicine]).await?;
    let medicine = found.pop().ok_or(AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(medicine),
        message: Some("Get medicine successfully"),
    })
}

/// Add a medicine to the current branch.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    request_body = MedicineReq,
    responses(
        (status = 200, description = "Medicine added successfully", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn create_medicine(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<MedicineReq>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;
    let manufacturer_id = body.validated_manufacturer()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    ensure_manufacturer_exists(conn, manufacturer_id).await?;

    let medicine = diesel::insert_into(medicines::table)
        .values(body.into_form(scope, manufacturer_id))
        .returning(MedicineEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create medicine")?;

    tracing::info!(id = %medicine.id, branch = %medicine.branch_name, "Added medicine {}", medicine.name);

    Ok(StdResponse {
        data: Some(medicine),
        message: Some("Medicine added successfully"),
    })
}

/// Replace a medicine's details.
#[utoipa::path(
    put,
    path = "/{id}",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Medicine ID")),
    request_body = MedicineReq,
    responses(
        (status = 200, description = "Medicine updated successfully", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn update_medicine(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<MedicineReq>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;
    let manufacturer_id = body.validated_manufacturer()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    ensure_manufacturer_exists(conn, manufacturer_id).await?;

    let target = medicines::table
        .filter(medicines::id.eq(id))
        .filter(medicines::pharmacy_id.eq(scope.pharmacy_id.clone()))
        .filter(medicines::branch_name.eq(scope.branch_name.clone()));

    let medicine = diesel::update(target)
        .set((
            body.into_form(scope, manufacturer_id),
            medicines::updated_at.eq(diesel::dsl::now),
        ))
        .returning(MedicineEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(medicine),
        message: Some("Medicine updated successfully"),
    })
}

/// Remove a medicine from the current branch.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Medicines"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Medicine ID")),
    responses(
        (status = 200, description = "Medicine deleted successfully", body = StdResponse<MedicineEntity, String>)
    )
)]
async fn delete_medicine(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let target = medicines::table
        .filter(medicines::id.eq(id))
        .filter(medicines::pharmacy_id.eq(scope.pharmacy_id))
        .filter(medicines::branch_name.eq(scope.branch_name));

    let medicine = diesel::delete(target)
        .returning(MedicineEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(medicine),
        message: Some("Medicine deleted successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(medicine_type: MedicineType) -> MedicineReq {
        MedicineReq {
            name: "Panadol".into(),
            manufacturer_id: Some(Uuid::new_v4()),
            chemicals: "Paracetamol 500mg".into(),
            description: "Pain relief".into(),
            custom_fields: vec![],
            medicine_type,
            quantity: 10,
            price_per_unit: 0.5,
            liquid_ml: None,
            tablets_per_box: None,
            powder_weight: None,
        }
    }

    fn scope() -> BranchScope {
        BranchScope {
            pharmacy_id: "pharmacy-1".into(),
            branch_name: "Downtown".into(),
        }
    }

    #[test]
    fn tablets_need_tablets_per_box() {
        let mut body = req(MedicineType::Tablets);
        assert!(matches!(
            body.validated_manufacturer(),
            Err(AppError::Validation(_))
        ));

        body.tablets_per_box = Some(10);
        assert!(body.validated_manufacturer().is_ok());
    }

    #[test]
    fn liquid_and_powder_need_positive_measures() {
        let mut liquid = req(MedicineType::Liquid);
        liquid.liquid_ml = Some(0);
        assert!(liquid.validate().is_err());
        liquid.liquid_ml = Some(120);
        assert!(liquid.validate().is_ok());

        let mut powder = req(MedicineType::Powder);
        powder.powder_weight = Some(0.0);
        assert!(powder.validate().is_err());
        powder.powder_weight = Some(2.5);
        assert!(powder.validate().is_ok());
    }

    #[test]
    fn other_type_needs_no_measure() {
        assert!(req(MedicineType::Other).validate().is_ok());
    }

    #[test]
    fn missing_manufacturer_is_reported_with_field_errors() {
        let mut body = req(MedicineType::Other);
        body.manufacturer_id = None;
        body.name = String::new();

        let Err(AppError::Validation(errors)) = body.validated_manufacturer() else {
            panic!("expected validation errors");
        };
        let fields = errors.field_errors();
        assert_eq!(
            fields["manufacturer_id"][0].message.as_deref(),
            Some("Manufacturer is required")
        );
        assert_eq!(
            fields["name"][0].message.as_deref(),
            Some("Medicine name is required")
        );
    }

    #[test]
    fn negative_quantity_and_price_are_rejected() {
        let mut body = req(MedicineType::Other);
        body.quantity = -1;
        body.price_per_unit = -0.1;
        let errors = body.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("quantity"));
        assert!(errors.field_errors().contains_key("price_per_unit"));
    }

    #[test]
    fn blank_custom_fields_are_rejected() {
        let mut body = req(MedicineType::Other);
        body.custom_fields = vec![CustomField {
            key: String::new(),
            value: "x".into(),
        }];
        assert!(body.validate().is_err());
    }

    #[test]
    fn form_keeps_only_the_matching_measure() {
        let mut body = req(MedicineType::Liquid);
        body.liquid_ml = Some(100);
        body.tablets_per_box = Some(10);
        let id = Uuid::new_v4();
        let form = body.into_form(scope(), id);
        assert_eq!(form.liquid_ml, Some(100));
        assert_eq!(form.tablets_per_box, None);
        assert_eq!(form.medicine_type, "liquid");
        assert_eq!(form.manufacturer_id, id);
        assert_eq!(form.branch_name, "Downtown");
    }
}
