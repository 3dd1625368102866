use axum::{Extension, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    middleware,
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_me))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::authorization,
        ))
}

#[derive(Serialize, ToSchema)]
pub(crate) struct MeRes {
    pub user: CurrentUser,
    pub pharmacy_id: Option<String>,
    pub is_pharmacy_admin: bool,
    pub is_branch_manager: bool,
    pub can_return_to_admin: bool,
}

impl From<CurrentUser> for MeRes {
    fn from(user: CurrentUser) -> Self {
        MeRes {
            pharmacy_id: user.pharmacy_id().ok().map(str::to_string),
            is_pharmacy_admin: user.is_pharmacy_admin(),
            is_branch_manager: user.is_branch_manager(),
            can_return_to_admin: user.can_return_to_admin(),
            user,
        }
    }
}

/// The signed-in user with role flags.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Auth"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user", body = StdResponse<MeRes, String>)
    )
)]
async fn get_me(Extension(user): Extension<CurrentUser>) -> Result<impl IntoResponse, AppError> {
    Ok(StdResponse {
        data: Some(MeRes::from(user)),
        message: Some("Get current user successfully"),
    })
}
