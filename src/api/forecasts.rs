use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::{api::ApiUrls, app_error::AppError};

/// One row of a precomputed forecast.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub ds: String,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// Chart-ready series. Values are scaled down by ten and floored.
#[derive(Serialize, Debug, Default, PartialEq, ToSchema)]
pub struct ForecastSeries {
    pub dates: Vec<String>,
    pub yhat: Vec<i64>,
    pub yhat_lower: Vec<i64>,
    pub yhat_upper: Vec<i64>,
}

#[derive(Serialize, Debug, PartialEq, ToSchema)]
pub struct SalesForecast {
    #[serde(flatten)]
    pub series: ForecastSeries,
    pub average: i64,
}

#[derive(Serialize, Debug, PartialEq, ToSchema)]
pub struct MedicineForecast {
    pub name: String,
    #[serde(flatten)]
    pub series: ForecastSeries,
    pub average: i64,
    pub average_lower: i64,
    pub average_upper: i64,
}

fn scaled(value: f64) -> i64 {
    (value / 10.0).floor() as i64
}

fn floored_mean(total: f64, count: usize) -> i64 {
    if count == 0 {
        0
    } else {
        (total / count as f64).floor() as i64
    }
}

pub fn build_series(points: &[ForecastPoint]) -> ForecastSeries {
    let mut series = ForecastSeries::default();
    for point in points {
        let date = point.ds.split('T').next().unwrap_or(&point.ds);
        series.dates.push(date.to_string());
        series.yhat.push(scaled(point.yhat));
        series.yhat_lower.push(scaled(point.yhat_lower));
        series.yhat_upper.push(scaled(point.yhat_upper));
    }
    series
}

pub fn shape_sales_forecast(points: &[ForecastPoint]) -> SalesForecast {
    let total: f64 = points.iter().map(|p| p.yhat).sum();
    SalesForecast {
        series: build_series(points),
        average: floored_mean(total, points.len()),
    }
}

pub fn shape_medicine_forecast(name: String, points: &[ForecastPoint]) -> MedicineForecast {
    let n = points.len();
    MedicineForecast {
        name,
        series: build_series(points),
        average: floored_mean(points.iter().map(|p| p.yhat).sum(), n),
        average_lower: floored_mean(points.iter().map(|p| p.yhat_lower).sum(), n),
        average_upper: floored_mean(points.iter().map(|p| p.yhat_upper).sum(), n),
    }
}

fn malformed() -> AppError {
    AppError::BadGateway("Forecast service returned malformed data".into())
}

fn parse_points(value: Value) -> Result<Vec<ForecastPoint>, AppError> {
    if !value.is_array() {
        return Err(malformed());
    }
    serde_json::from_value(value).map_err(|err| {
        tracing::warn!("Unexpected forecast row shape: {}", err);
        malformed()
    })
}

pub async fn get_sales_forecast(client: Client, urls: &ApiUrls) -> Result<SalesForecast, AppError> {
    let body: Value = client
        .get(format!("{}/predict-sales", urls.forecast_service_url))
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("ForecastService".into()))?
        .error_for_status()
        .map_err(|_| AppError::ServiceUnreachable("ForecastService".into()))?
        .json()
        .await
        .map_err(|_| malformed())?;

    let points = parse_points(body)?;
    Ok(shape_sales_forecast(&points))
}

pub async fn get_medicine_forecast(
    client: Client,
    urls: &ApiUrls,
    name: &str,
) -> Result<MedicineForecast, AppError> {
    let mut body: Value = client
        .get(format!("{}/predict-sales-medicine/", urls.forecast_service_url))
        .query(&[("name", name)])
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("ForecastService".into()))?
        .error_for_status()
        .map_err(|_| AppError::ServiceUnreachable("ForecastService".into()))?
        .json()
        .await
        .map_err(|_| malformed())?;

    let name = body
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(name)
        .to_string();
    let points = parse_points(body.get_mut("forecast").map(Value::take).unwrap_or(Value::Null))?;

    Ok(shape_medicine_forecast(name, &points))
}
