#![allow(dead_code)]

use axum::{
    body::{Body, to_bytes},
    http::{Request, header},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use pharmacy_pos::{
    api::ApiUrls,
    auth::{Claims, UserRole},
    config::{AuthConfig, Config, DatabaseConfig, ServerConfig},
};
use serde_json::Value;

pub const SECRET: &str = "test-secret";

pub fn config(database_url: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseConfig {
            url: database_url.into(),
            max_connections: 2,
        },
        auth: AuthConfig {
            jwt_secret: SECRET.into(),
        },
        pharmacy_display_name: "City Pharmacy".into(),
    }
}

pub fn api_urls(forecast_service_url: &str) -> ApiUrls {
    ApiUrls {
        forecast_service_url: forecast_service_url.into(),
        weather_api_url: "http://127.0.0.1:1".into(),
        weather_api_key: None,
        assistant_api_url: "http://127.0.0.1:1".into(),
        assistant_api_key: None,
        identity_api_url: "http://127.0.0.1:1".into(),
        identity_api_key: None,
    }
}

pub fn token(sub: &str, role: UserRole, branch: Option<&str>) -> String {
    let claims = Claims {
        sub: sub.into(),
        email: Some("user@example.com".into()),
        role,
        pharmacy_id: Some("pharmacy-9".into()),
        branch: branch.map(str::to_string),
        exp: 4_102_444_800,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
