use anyhow::Context;
use axum::{
    Extension,
    extract::{Query, State},
    response::IntoResponse,
};
use diesel::{
    ExpressionMethods, OptionalExtension, QueryDsl,
    dsl::{count_star, sum},
};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    api::forecasts::{self, MedicineForecast, SalesForecast},
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    cart::round_cents,
    inventory::{self, InventorySummary},
    middleware,
    models::MedicineEntity,
    schema::{medicines, sales},
};

/// Defines the dashboard routes: forecast charts and the branch summary.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest(
            "/forecasts",
            OpenApiRouter::new()
                .routes(utoipa_axum::routes!(get_sales_forecast))
                .routes(utoipa_axum::routes!(get_medicine_forecast)),
        )
        .nest(
            "/dashboard",
            OpenApiRouter::new().routes(utoipa_axum::routes!(get_dashboard_summary)),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authorization,
        ))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct MedicineForecastQuery {
    /// Defaults to the branch's first medicine by name.
    pub name: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub(crate) struct DashboardSummary {
    pub inventory: InventorySummary,
    pub sales_count: i64,
    pub revenue: f64,
}

/// Forecast of overall daily sales.
#[utoipa::path(
    get,
    path = "/sales",
    tags = ["Forecasts"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Sales forecast", body = StdResponse<SalesForecast, String>)
    )
)]
async fn get_sales_forecast(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let forecast = forecasts::get_sales_forecast(state.http_client, &state.api_urls).await?;

    Ok(StdResponse {
        data: Some(forecast),
        message: Some("Get sales forecast successfully"),
    })
}

/// Forecast of daily sales for one medicine.
#[utoipa::path(
    get,
    path = "/medicines",
    tags = ["Forecasts"],
    security(("bearerAuth" = [])),
    params(MedicineForecastQuery),
    responses(
        (status = 200, description = "Medicine forecast", body = StdResponse<MedicineForecast, String>)
    )
)]
async fn get_medicine_forecast(
    Query(query): Query<MedicineForecastQuery>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let name = match query.name.filter(|name| !name.trim().is_empty()) {
        Some(name) => name,
        None => {
            let scope = user.branch_scope()?;
            let conn = &mut state
                .db_pool
                .get()
                .await
                .context("Failed to obtain a DB connection pool")?;

            let first: Option<String> = medicines::table
                .filter(medicines::pharmacy_id.eq(&scope.pharmacy_id))
                .filter(medicines::branch_name.eq(&scope.branch_name))
                .order_by(medicines::name.asc())
                .select(medicines::name)
                .first(conn)
                .await
                .optional()
                .context("Failed to get medicines")?;

            first.ok_or(AppError::NotFound)?
        }
    };

    let forecast =
        forecasts::get_medicine_forecast(state.http_client.clone(), &state.api_urls, &name).await?;

    Ok(StdResponse {
        data: Some(forecast),
        message: Some("Get medicine forecast successfully"),
    })
}

/// Inventory breakdown plus sales totals for the current branch.
#[utoipa::path(
    get,
    path = "/summary",
    tags = ["Forecasts"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Dashboard summary", body = StdResponse<DashboardSummary, String>)
    )
)]
async fn get_dashboard_summary(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicines: Vec<MedicineEntity> = medicines::table
        .filter(medicines::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(medicines::branch_name.eq(&scope.branch_name))
        .get_results(conn)
        .await
        .context("Failed to get medicines")?;

    let (sales_count, revenue): (i64, Option<f64>) = sales::table
        .filter(sales::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(sales::branch_name.eq(&scope.branch_name))
        .select((count_star(), sum(sales::total)))
        .get_result(conn)
        .await
        .context("Failed to get sales totals")?;

    Ok(StdResponse {
        data: Some(DashboardSummary {
            inventory: inventory::summarize(&medicines),
            sales_count,
            revenue: round_cents(revenue.unwrap_or_default()),
        }),
        message: Some("Get dashboard summary successfully"),
    })
}
