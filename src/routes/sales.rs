use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{BranchScope, CurrentUser},
    middleware,
    models::{SaleEntity, SaleItemEntity},
    receipt,
    schema::{sale_items, sales},
};

/// Defines sales history and receipt routes of the current branch.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/sales",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_sales))
            .routes(utoipa_axum::routes!(get_sale))
            .routes(utoipa_axum::routes!(get_sale_receipt))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
pub(crate) struct SaleRes {
    pub sale: SaleEntity,
    pub items: Vec<SaleItemEntity>,
}

async fn find_sale(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    scope: &BranchScope,
) -> Result<(SaleEntity, Vec<SaleItemEntity>), AppError> {
    let sale: SaleEntity = sales::table
        .find(id)
        .filter(sales::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(sales::branch_name.eq(&scope.branch_name))
        .get_result(conn)
        .await?;

    let items: Vec<SaleItemEntity> = sale_items::table
        .filter(sale_items::sale_id.eq(sale.id))
        .order_by(sale_items::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get sale items")?;

    Ok((sale, items))
}

/// Fetch the branch's sales, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Sales"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List sales", body = StdResponse<Vec<SaleEntity>, String>)
    )
)]
async fn get_sales(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let sales: Vec<SaleEntity> = sales::table
        .filter(sales::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(sales::branch_name.eq(&scope.branch_name))
        .order_by(sales::created_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get sales")?;

    Ok(StdResponse {
        data: Some(sales),
        message: Some("Get sales successfully"),
    })
}

/// Fetch a sale with its lines.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Sales"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Sale ID")),
    responses(
        (status = 200, description = "Get sale successfully", body = StdResponse<SaleRes, String>)
    )
)]
async fn get_sale(
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

    let (sale, items) = find_sale(conn, id, &scope).await?;

    Ok(StdResponse {
        data: Some(SaleRes { sale, items }),
        message: Some("Get sale successfully"),
    })
}

/// Download the sale's receipt as a PDF.
#[utoipa::path(
    get,
    path = "/{id}/receipt",
    tags = ["Sales"],
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Sale ID")),
    responses(
        (status = 200, description = "Receipt PDF", content_type = "application/pdf", body = Vec<u8>)
    )
)]
async fn get_sale_receipt(
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

    let (sale, items) = find_sale(conn, id, &scope).await?;

    let pdf = receipt::render_pdf(&state.pharmacy_display_name, &sale, &items)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"receipt-{}.pdf\"", sale.id),
            ),
        ],
        pdf,
    ))
}
