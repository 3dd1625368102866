use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    middleware,
    models::{CreateStockRequestEntity, StockRequestEntity},
    schema::{medicines, stock_requests},
    stock::StockRequestStatus,
};

/// Defines restock request routes. Branches ask, pharmacy admins decide.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/stock-requests",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_stock_requests))
            .routes(utoipa_axum::routes!(create_stock_request))
            .routes(utoipa_axum::routes!(approve_stock_request))
            .routes(utoipa_axum::routes!(reject_stock_request))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

#[derive(Deserialize, Validate, ToSchema)]
pub(crate) struct CreateStockRequestReq {
    pub medicine_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub note: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct StockRequestFilter {
    pub status: Option<StockRequestStatus>,
}

/// List restock requests. Branch context sees its own branch; a pharmacy
/// admin outside any branch sees the whole pharmacy.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Stock Requests"],
    security(("bearerAuth" = [])),
    params(StockRequestFilter),
    responses(
        (status = 200, description = "List stock requests", body = StdResponse<Vec<StockRequestEntity>, String>)
    )
)]
async fn get_stock_requests(
    Query(filter): Query<StockRequestFilter>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let pharmacy_id = user.pharmacy_id()?.to_string();
    let branch_name = if user.is_pharmacy_admin() {
        None
    } else {
        Some(user.branch_scope()?.branch_name)
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut query = stock_requests::table
        .filter(stock_requests::pharmacy_id.eq(pharmacy_id))
        .order_by(stock_requests::created_at.desc())
        .into_boxed();

    if let Some(branch_name) = branch_name {
        query = query.filter(stock_requests::branch_name.eq(branch_name));
    }
    if let Some(status) = filter.status {
        query = query.filter(stock_requests::status.eq(status.as_str()));
    }

    let requests: Vec<StockRequestEntity> = query
        .get_results(conn)
        .await
        .context("Failed to get stock requests")?;

    Ok(StdResponse {
        data: Some(requests),
        message: Some("Get stock requests successfully"),
    })
}

/// Ask the pharmacy admin to restock a medicine of the current branch.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Stock Requests"],
    security(("bearerAuth" = [])),
    request_body = CreateStockRequestReq,
    responses(
        (status = 200, description = "Stock request submitted", body = StdResponse<StockRequestEntity, String>)
    )
)]
async fn create_stock_request(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateStockRequestReq>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;
    body.validate()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicine_id: Option<Uuid> = medicines::table
        .find(body.medicine_id)
        .filter(medicines::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(medicines::branch_name.eq(&scope.branch_name))
        .select(medicines::id)
        .first(conn)
        .await
        .optional()
        .context("Failed to get medicine")?;

    let medicine_id = medicine_id.ok_or_else(|| {
        AppError::BadRequest(format!("Medicine {} not found in this branch", body.medicine_id))
    })?;

    let request = diesel::insert_into(stock_requests::table)
        .values(CreateStockRequestEntity {
            pharmacy_id: scope.pharmacy_id,
            branch_name: scope.branch_name,
            medicine_id,
            quantity: body.quantity,
            status: StockRequestStatus::Pending.as_str().to_string(),
            note: body.note.filter(|note| !note.trim().is_empty()),
            requested_by: user.uid.clone(),
        })
        .returning(StockRequestEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create stock request")?;

    tracing::info!(id = %request.id, branch = %request.branch_name, "Stock request submitted");

    Ok(StdResponse {
        data: Some(request),
        message: Some("Stock request submitted"),
    })
}

/// Moves a pending request to `next`. Approval adds the requested quantity
/// to the medicine's stock in the same transaction.
async fn decide(
    state: AppState,
    user: CurrentUser,
    id: Uuid,
    next: StockRequestStatus,
) -> Result<StockRequestEntity, AppError> {
    user.ensure_pharmacy_admin()?;
    let pharmacy_id = user.pharmacy_id()?.to_string();
    let decided_by = user.uid.clone();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let request = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let current: StockRequestEntity = stock_requests::table
                    .find(id)
                    .filter(stock_requests::pharmacy_id.eq(&pharmacy_id))
                    .for_update()
                    .get_result(conn)
                    .await?;

                let status = current.status.parse::<StockRequestStatus>()?.transition(next)?;

                let request: StockRequestEntity = diesel::update(
                    stock_requests::table
                        .filter(stock_requests::id.eq(current.id))
                        .filter(stock_requests::status.eq(StockRequestStatus::Pending.as_str())),
                )
                .set((
                    stock_requests::status.eq(status.as_str()),
                    stock_requests::decided_by.eq(Some(decided_by)),
                    stock_requests::updated_at.eq(diesel::dsl::now),
                ))
                .returning(StockRequestEntity::as_returning())
                .get_result(conn)
                .await?;

                if status == StockRequestStatus::Approved {
                    let restocked = diesel::update(
                        medicines::table
                            .filter(medicines::id.eq(request.medicine_id))
                            .filter(medicines::pharmacy_id.eq(&request.pharmacy_id))
                            .filter(medicines::branch_name.eq(&request.branch_name)),
                    )
                    .set((
                        medicines::quantity.eq(medicines::quantity + request.quantity),
                        medicines::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await?;

                    if restocked == 0 {
                        return Err(AppError::Conflict(
                            "The requested medicine no longer exists".into(),
                        ));
                    }
                }

                Ok::<StockRequestEntity, AppError>(request)
            })
        })
        .await?;

    tracing::info!(id = %request.id, status = %request.status, "Stock request decided");
    Ok(request)
}

/// Approve a pending request and restock the medicine.
#[utoipa::path(
    patch,
    path = "/{id}/approve",
    tags = ["Stock Requests"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Stock request ID")),
    responses(
        (status = 200, description = "Stock request approved", body = StdResponse<StockRequestEntity, String>)
    )
)]
async fn approve_stock_request(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let request = decide(state, user, id, StockRequestStatus::Approved).await?;

    Ok(StdResponse {
        data: Some(request),
        message: Some("Stock request approved"),
    })
}

/// Reject a pending request.
#[utoipa::path(
    patch,
    path = "/{id}/reject",
    tags = ["Stock Requests"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Stock request ID")),
    responses(
        (status = 200, description = "Stock request rejected", body = StdResponse<StockRequestEntity, String>)
    )
)]
async fn reject_stock_request(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let request = decide(state, user, id, StockRequestStatus::Rejected).await?;

    Ok(StdResponse {
        data: Some(request),
        message: Some("Stock request rejected"),
    })
}
