use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;

use crate::{
    api::ApiUrls,
    auth::TokenVerifier,
    config::Config,
    db::{self, DbPool},
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub http_client: Client,
    pub api_urls: Arc<ApiUrls>,
    pub token_verifier: Arc<TokenVerifier>,
    pub pharmacy_display_name: Arc<str>,
}

impl AppState {
    pub fn new(config: &Config, api_urls: ApiUrls) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            db_pool: db::create_pool(&config.database.url, config.database.max_connections),
            http_client,
            api_urls: Arc::new(api_urls),
            token_verifier: Arc::new(TokenVerifier::new(&config.auth.jwt_secret)),
            pharmacy_display_name: config.pharmacy_display_name.as_str().into(),
        })
    }
}
