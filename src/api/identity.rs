use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::{api::ApiUrls, app_error::AppError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
    id_token: String,
}

#[derive(Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: String,
}

pub struct CreatedAccount {
    pub uid: String,
    pub id_token: String,
}

fn api_key(urls: &ApiUrls) -> Result<&str, AppError> {
    urls.identity_api_key
        .as_deref()
        .ok_or_else(|| AppError::Other(anyhow!("IDENTITY_API_KEY is not configured")))
}

/// Registers a manager account with the identity provider.
pub async fn create_account(
    client: Client,
    urls: &ApiUrls,
    email: &str,
    password: &str,
) -> Result<CreatedAccount, AppError> {
    let response = client
        .post(format!("{}/accounts:signUp", urls.identity_api_url))
        .query(&[("key", api_key(urls)?)])
        .json(&json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        }))
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("IdentityService".into()))?;

    if !response.status().is_success() {
        let reason = response
            .json::<ProviderError>()
            .await
            .map(|e| e.error.message)
            .unwrap_or_else(|_| "unknown error".to_string());

        return Err(match reason.as_str() {
            "EMAIL_EXISTS" => AppError::Conflict("Manager email is already registered".into()),
            _ => AppError::BadRequest(format!("Failed to create manager account: {reason}")),
        });
    }

    let account: SignUpResponse = response.json().await.context("Failed to parse JSON")?;
    Ok(CreatedAccount {
        uid: account.local_id,
        id_token: account.id_token,
    })
}

pub async fn send_verification_email(client: Client, urls: &ApiUrls, id_token: &str) -> Result<()> {
    let key = urls
        .identity_api_key
        .as_deref()
        .ok_or_else(|| anyhow!("IDENTITY_API_KEY is not configured"))?;

    client
        .post(format!("{}/accounts:sendOobCode", urls.identity_api_url))
        .query(&[("key", key)])
        .json(&json!({ "requestType": "VERIFY_EMAIL", "idToken": id_token }))
        .send()
        .await
        .context("IdentityService is unreachable")?
        .error_for_status()
        .context("IdentityService rejected the verification request")?;

    Ok(())
}
