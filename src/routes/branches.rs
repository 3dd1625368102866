use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use validator::{Validate, ValidationError};

use crate::{
    api::identity,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{CurrentUser, UserRole},
    middleware,
    models::{BranchEntity, CreateBranchEntity, CreateUserEntity},
    schema::{branches, users},
};

/// Defines branch routes. Every route is restricted to pharmacy admins.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/branches",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_branches))
            .routes(utoipa_axum::routes!(get_branch))
            .routes(utoipa_axum::routes!(create_branch))
            .routes(utoipa_axum::routes!(update_branch))
            .routes(utoipa_axum::routes!(delete_branch))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

#[derive(Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_manager_account"))]
pub(crate) struct CreateBranchReq {
    #[validate(custom = "validate_branch_name")]
    pub name: String,
    #[validate(custom = "validate_city")]
    pub city: String,
    #[validate(custom = "validate_state")]
    pub state: String,
    #[validate(email(message = "Manager email must be a valid email address"))]
    pub manager_email: Option<String>,
    #[validate(length(min = 6, message = "Manager password must be at least 6 characters"))]
    pub manager_password: Option<String>,
}

/// Blank input reports `required`; anything shorter than `min` reports `too_short`.
fn required_with_min_length(
    value: &str,
    min: usize,
    required: &'static str,
    too_short: &'static str,
) -> Result<(), ValidationError> {
    let (code, message) = if value.trim().is_empty() {
        ("required", required)
    } else if value.chars().count() < min {
        ("length", too_short)
    } else {
        return Ok(());
    };
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    Err(err)
}

fn validate_branch_name(name: &str) -> Result<(), ValidationError> {
    required_with_min_length(
        name,
        3,
        "Branch name is required",
        "Branch name must be at least 3 characters",
    )
}

fn validate_city(city: &str) -> Result<(), ValidationError> {
    required_with_min_length(city, 2, "City is required", "City must be at least 2 characters")
}

fn validate_state(state: &str) -> Result<(), ValidationError> {
    required_with_min_length(state, 2, "State is required", "State must be at least 2 characters")
}

fn validate_manager_account(req: &CreateBranchReq) -> Result<(), ValidationError> {
    match (&req.manager_email, &req.manager_password) {
        (Some(_), None) | (None, Some(_)) => {
            let mut err = ValidationError::new("manager_account");
            err.message =
                Some("Manager email and password must be provided together".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

#[derive(Deserialize, Validate, ToSchema)]
pub(crate) struct UpdateBranchReq {
    #[validate(custom = "validate_city")]
    pub city: String,
    #[validate(custom = "validate_state")]
    pub state: String,
}

/// Fetch all branches of the caller's pharmacy.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Branches"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List branches", body = StdResponse<Vec<BranchEntity>, String>)
    )
)]
async fn get_branches(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_pharmacy_admin()?;
    let pharmacy_id = user.pharmacy_id()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let branches: Vec<BranchEntity> = branches::table
        .filter(branches::pharmacy_id.eq(pharmacy_id))
        .order_by(branches::created_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get branches")?;

    Ok(StdResponse {
        data: Some(branches),
        message: Some("Get branches successfully"),
    })
}

/// Fetch a branch by name.
#[utoipa::path(
    get,
    path = "/{name}",
    tags = ["Branches"],
    security(("bearerAuth" = [])),
    params(("name" = String, Path, description = "Branch name")),
    responses(
        (status = 200, description = "Get branch successfully", body = StdResponse<BranchEntity, String>)
    )
)]
async fn get_branch(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_pharmacy_admin()?;
    let pharmacy_id = user.pharmacy_id()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let branch: BranchEntity = branches::table
        .find((pharmacy_id, &name))
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(branch),
        message: Some("Get branch successfully"),
    })
}

/// Create a branch, optionally registering its manager account.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Branches"],
    security(("bearerAuth" = [])),
    request_body = CreateBranchReq,
    responses(
        (status = 200, description = "Branch saved successfully", body = StdResponse<BranchEntity, String>)
    )
)]
async fn create_branch(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateBranchReq>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_pharmacy_admin()?;
    body.validate()?;
    let pharmacy_id = user.pharmacy_id()?.to_string();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let taken: i64 = branches::table
        .find((&pharmacy_id, &body.name))
        .count()
        .get_result(conn)
        .await
        .context("Failed to check branch name")?;

    if taken > 0 {
        return Err(AppError::Conflict(format!(
            "A branch named {} already exists",
            body.name
        )));
    }

    let manager = match (&body.manager_email, &body.manager_password) {
        (Some(email), Some(password)) => {
            let account =
                identity::create_account(state.http_client.clone(), &state.api_urls, email, password)
                    .await?;

            if let Err(err) = identity::send_verification_email(
                state.http_client.clone(),
                &state.api_urls,
                &account.id_token,
            )
            .await
            {
                tracing::warn!("Failed to send verification email to {}: {:#}", email, err);
            }

            Some(CreateUserEntity {
                uid: account.uid,
                email: email.clone(),
                role: UserRole::BranchManager.as_str().to_string(),
                pharmacy_id: Some(pharmacy_id.clone()),
                branch_name: Some(body.name.clone()),
            })
        }
        _ => None,
    };

    let branch = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let manager_uid = match manager {
                    Some(manager) => {
                        let uid = manager.uid.clone();
                        diesel::insert_into(users::table)
                            .values(manager)
                            .execute(conn)
                            .await
                            .context("Failed to create manager user")?;
                        Some(uid)
                    }
                    None => None,
                };

                let branch = diesel::insert_into(branches::table)
                    .values(CreateBranchEntity {
                        pharmacy_id,
                        name: body.name,
                        city: body.city,
                        state: body.state,
                        manager_uid,
                    })
                    .returning(BranchEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create branch")?;

                Ok::<BranchEntity, anyhow::Error>(branch)
            })
        })
        .await
        .context("Transaction failed")?;

    tracing::info!("Created branch {} for pharmacy {}", branch.name, branch.pharmacy_id);

    Ok(StdResponse {
        data: Some(branch),
        message: Some("Branch saved successfully"),
    })
}

/// Update a branch's location. The name is the branch key and cannot change.
#[utoipa::path(
    patch,
    path = "/{name}",
    tags = ["Branches"],
    security(("bearerAuth" = [])),
    params(("name" = String, Path, description = "Branch name")),
    request_body = UpdateBranchReq,
    responses(
        (status = 200, description = "Branch saved successfully", body = StdResponse<BranchEntity, String>)
    )
)]
async fn update_branch(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UpdateBranchReq>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_pharmacy_admin()?;
    body.validate()?;
    let pharmacy_id = user.pharmacy_id()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let branch = diesel::update(branches::table.find((pharmacy_id, &name)))
        .set((
            branches::city.eq(body.city),
            branches::state.eq(body.state),
            branches::updated_at.eq(diesel::dsl::now),
        ))
        .returning(BranchEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(branch),
        message: Some("Branch saved successfully"),
    })
}

/// Delete a branch together with its inventory, carts, sales and requests.
#[utoipa::path(
    delete,
    path = "/{name}",
    tags = ["Branches"],
    security(("bearerAuth" = [])),
    params(("name" = String, Path, description = "Branch name")),
    responses(
        (status = 200, description = "Branch Deleted", body = StdResponse<BranchEntity, String>)
    )
)]
async fn delete_branch(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_pharmacy_admin()?;
    let pharmacy_id = user.pharmacy_id()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let branch = diesel::delete(branches::table.find((pharmacy_id, &name)))
        .returning(BranchEntity::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!("Deleted branch {} for pharmacy {}", branch.name, branch.pharmacy_id);

    Ok(StdResponse {
        data: Some(branch),
        message: Some("Branch Deleted"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, city: &str, state: &str) -> CreateBranchReq {
        CreateBranchReq {
            name: name.into(),
            city: city.into(),
            state: state.into(),
            manager_email: None,
            manager_password: None,
        }
    }

    fn messages(errors: &validator::ValidationErrors, field: &str) -> Vec<String> {
        errors
            .field_errors()
            .get(field)
            .map(|errs| {
                errs.iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn branch_name_rejected_if_under_three_characters() {
        let errors = req("AB", "Lahore", "Punjab").validate().unwrap_err();
        assert_eq!(
            messages(&errors, "name"),
            vec!["Branch name must be at least 3 characters"]
        );
    }

    #[test]
    fn city_and_state_need_two_characters() {
        let errors = req("Downtown", "L", "P").validate().unwrap_err();
        assert_eq!(messages(&errors, "city"), vec!["City must be at least 2 characters"]);
        assert_eq!(messages(&errors, "state"), vec!["State must be at least 2 characters"]);
    }

    #[test]
    fn blank_fields_are_reported_as_required() {
        let errors = req("", " ", "").validate().unwrap_err();
        assert_eq!(messages(&errors, "name"), vec!["Branch name is required"]);
        assert_eq!(messages(&errors, "city"), vec!["City is required"]);
        assert_eq!(messages(&errors, "state"), vec!["State is required"]);
    }

    #[test]
    fn branch_updates_use_the_same_rules() {
        let body = UpdateBranchReq {
            city: String::new(),
            state: "P".into(),
        };
        let errors = body.validate().unwrap_err();
        assert_eq!(messages(&errors, "city"), vec!["City is required"]);
        assert_eq!(messages(&errors, "state"), vec!["State must be at least 2 characters"]);
    }

    #[test]
    fn valid_branch_without_manager_passes() {
        assert!(req("Downtown", "Lahore", "Punjab").validate().is_ok());
    }

    #[test]
    fn manager_email_must_come_with_password() {
        let mut body = req("Downtown", "Lahore", "Punjab");
        body.manager_email = Some("manager@example.com".into());
        assert!(body.validate().is_err());

        body.manager_password = Some("secret1".into());
        assert!(body.validate().is_ok());
    }

    #[test]
    fn manager_credentials_are_checked() {
        let mut body = req("Downtown", "Lahore", "Punjab");
        body.manager_email = Some("not-an-email".into());
        body.manager_password = Some("123".into());
        let errors = body.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("manager_email"));
        assert!(errors.field_errors().contains_key("manager_password"));
    }
}
