pub mod aliases;
pub mod api;
pub mod app_error;
pub mod app_state;
pub mod auth;
pub mod bootstrap;
pub mod cart;
pub mod config;
pub mod db;
pub mod inventory;
pub mod middleware;
pub mod models;
pub mod receipt;
pub mod routes;
pub mod schema;
pub mod stock;
pub mod swagger;

use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa_axum::router::OpenApiRouter;

use app_state::AppState;

/// Every API route with its OpenAPI description.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(routes::me::routes_with_openapi(state.clone()))
        .merge(routes::manufacturers::routes_with_openapi(state.clone()))
        .merge(routes::branches::routes_with_openapi(state.clone()))
        .merge(routes::medicines::routes_with_openapi(state.clone()))
        .merge(routes::carts::routes_with_openapi(state.clone()))
        .merge(routes::sales::routes_with_openapi(state.clone()))
        .merge(routes::stock_requests::routes_with_openapi(state.clone()))
        .merge(routes::forecasts::routes_with_openapi(state.clone()))
        .merge(routes::assistant::routes_with_openapi(state))
}

/// Builds the HTTP application: API routes, Swagger UI and request tracing.
pub fn app(state: AppState) -> Router {
    let (router, mut openapi) = routes_with_openapi(state.clone()).split_for_parts();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("Pharmacy POS API")
        .version(env!("CARGO_PKG_VERSION"))
        .build();

    router
        .merge(swagger::create_swagger_ui(openapi))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
