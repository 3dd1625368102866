use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::api::ApiUrls;

#[derive(Deserialize)]
struct WeatherResponse {
    main: WeatherMain,
    #[serde(default)]
    weather: Vec<WeatherCondition>,
}

#[derive(Deserialize)]
struct WeatherMain {
    temp: f64,
}

#[derive(Deserialize)]
struct WeatherCondition {
    main: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub temperature_c: f64,
    pub condition: Option<String>,
}

/// Current weather for a city, in metric units.
pub async fn get_current_weather(client: Client, urls: &ApiUrls, city: &str) -> Result<WeatherSnapshot> {
    let api_key = urls
        .weather_api_key
        .as_deref()
        .ok_or_else(|| anyhow!("WEATHER_API_KEY is not configured"))?;

    let response: WeatherResponse = client
        .get(format!("{}/weather", urls.weather_api_url))
        .query(&[("q", city), ("appid", api_key), ("units", "metric")])
        .send()
        .await
        .context("WeatherService is unreachable")?
        .error_for_status()
        .context("WeatherService rejected the request")?
        .json()
        .await
        .context("Failed to parse JSON")?;

    Ok(WeatherSnapshot {
        temperature_c: response.main.temp,
        condition: response.weather.into_iter().next().map(|w| w.main),
    })
}

/// Like [`get_current_weather`], but a failure only logs and yields `None`.
pub async fn try_get_current_weather(
    client: Client,
    urls: &ApiUrls,
    city: &str,
) -> Option<WeatherSnapshot> {
    match get_current_weather(client, urls, city).await {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            tracing::warn!("Weather lookup for {} failed: {:#}", city, err);
            None
        }
    }
}
