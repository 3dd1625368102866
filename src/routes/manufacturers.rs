use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;
use validator::Validate;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    middleware,
    models::{CreateManufacturerEntity, ManufacturerEntity},
    schema::manufacturers,
};

/// Defines manufacturer routes. Reads are open to any signed-in user; writes need a pharmacy admin.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/manufacturers",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_manufacturers))
            .routes(utoipa_axum::routes!(get_manufacturer))
            .routes(utoipa_axum::routes!(create_manufacturer))
            .routes(utoipa_axum::routes!(update_manufacturer))
            .routes(utoipa_axum::routes!(delete_manufacturer))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

#[derive(Deserialize, Validate, ToSchema)]
pub(crate) struct ManufacturerReq {
    #[validate(length(min = 1, message = "Manufacturer name is required"))]
    pub name: String,
}

pub(crate) const DUPLICATE_NAME: &str = "A manufacturer with this name already exists";

/// A name is free when nobody holds it, or when the holder is the manufacturer being renamed.
pub(crate) fn name_available(existing: Option<Uuid>, updating: Option<Uuid>) -> bool {
    match (existing, updating) {
        (None, _) => true,
        (Some(holder), Some(id)) => holder == id,
        (Some(_), None) => false,
    }
}

/// A unique-name race lost at insert or update reads like the up-front check.
fn duplicate_name(err: DieselError) -> AppError {
    match AppError::from(err) {
        AppError::Conflict(_) => AppError::Conflict(DUPLICATE_NAME.into()),
        other => other,
    }
}

/// Fetch all manufacturers.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Manufacturers"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List manufacturers", body = StdResponse<Vec<ManufacturerEntity>, String>)
    )
)]
async fn get_manufacturers(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let manufacturers: Vec<ManufacturerEntity> = manufacturers::table
        .order_by(manufacturers::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get manufacturers")?;

    Ok(StdResponse {
        data: Some(manufacturers),
        message: Some("Get manufacturers successfully"),
    })
}

/// Fetch a single manufacturer.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Manufacturers"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Manufacturer ID")),
    responses(
        (status = 200, description = "Get manufacturer successfully", body = StdResponse<ManufacturerEntity, String>)
    )
)]
async fn get_manufacturer(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let manufacturer: ManufacturerEntity = manufacturers::table.find(id).get_result(conn).await?;

    Ok(StdResponse {
        data: Some(manufacturer),
        message: Some("Get manufacturer successfully"),
    })
}

/// Create a manufacturer with a unique name.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Manufacturers"],
    security(("bearerAuth" = [])),
    request_body = ManufacturerReq,
    responses(
        (status = 200, description = "Added successfully", body = StdResponse<ManufacturerEntity, String>)
    )
)]
async fn create_manufacturer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<ManufacturerReq>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_pharmacy_admin()?;
    body.validate()?;
    let name = body.name;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let existing: Option<Uuid> = manufacturers::table
        .filter(manufacturers::name.eq(&name))
        .select(manufacturers::id)
        .first(conn)
        .await
        .optional()
        .context("Failed to check manufacturer name")?;

    if !name_available(existing, None) {
        return Err(AppError::Conflict(DUPLICATE_NAME.into()));
    }

    let manufacturer = diesel::insert_into(manufacturers::table)
        .values(CreateManufacturerEntity { name })
        .returning(ManufacturerEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(duplicate_name)?;

    tracing::info!(id = %manufacturer.id, "Created manufacturer {}", manufacturer.name);

    Ok(StdResponse {
        data: Some(manufacturer),
        message: Some("Added successfully"),
    })
}

/// Rename a manufacturer.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Manufacturers"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Manufacturer ID")),
    request_body = ManufacturerReq,
    responses(
        (status = 200, description = "Updated successfully", body = StdResponse<ManufacturerEntity, String>)
    )
)]
async fn update_manufacturer(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<ManufacturerReq>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_pharmacy_admin()?;
    body.validate()?;
    let name = body.name;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let existing: Option<Uuid> = manufacturers::table
        .filter(manufacturers::name.eq(&name))
        .select(manufacturers::id)
        .first(conn)
        .await
        .optional()
        .context("Failed to check manufacturer name")?;

    if !name_available(existing, Some(id)) {
        return Err(AppError::Conflict(DUPLICATE_NAME.into()));
    }

    let manufacturer = diesel::update(manufacturers::table.find(id))
        .set((
            manufacturers::name.eq(name),
            manufacturers::updated_at.eq(diesel::dsl::now),
        ))
        .returning(ManufacturerEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(duplicate_name)?;

    Ok(StdResponse {
        data: Some(manufacturer),
        message: Some("Updated successfully"),
    })
}

/// Delete a manufacturer. Medicines referencing it will show an unknown manufacturer.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Manufacturers"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Manufacturer ID")),
    responses(
        (status = 200, description = "Deleted successfully", body = StdResponse<ManufacturerEntity, String>)
    )
)]
async fn delete_manufacturer(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_pharmacy_admin()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let manufacturer = diesel::delete(manufacturers::table.find(id))
        .returning(ManufacturerEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(manufacturer),
        message: Some("Deleted successfully"),
    })
}
