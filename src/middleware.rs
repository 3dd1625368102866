use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{app_error::AppError, app_state::AppState, auth::CurrentUser};

/// Header a pharmacy admin sends to act as one of their branches.
pub const ACT_AS_BRANCH_HEADER: &str = "x-branch";

/// Verifies the bearer token and attaches the `CurrentUser` extension.
pub async fn authorization(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;

    let claims = state.token_verifier.verify(token.trim())?;

    let act_as_branch = request
        .headers()
        .get(ACT_AS_BRANCH_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let user = CurrentUser::from_claims(claims, act_as_branch);
    tracing::debug!(uid = %user.uid, role = user.role.as_str(), "Authorized request");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
