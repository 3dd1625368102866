pub mod assistant;
pub mod forecasts;
pub mod identity;
pub mod weather;

#[derive(Clone, Debug)]
pub struct ApiUrls {
    pub forecast_service_url: String,
    pub weather_api_url: String,
    pub weather_api_key: Option<String>,
    pub assistant_api_url: String,
    pub assistant_api_key: Option<String>,
    pub identity_api_url: String,
    pub identity_api_key: Option<String>,
}

impl ApiUrls {
    pub fn init() -> Self {
        Self {
            forecast_service_url: Self::get_forecast_service_url(),
            weather_api_url: Self::get_weather_api_url(),
            weather_api_key: std::env::var("WEATHER_API_KEY").ok(),
            assistant_api_url: Self::get_assistant_api_url(),
            assistant_api_key: std::env::var("ASSISTANT_API_KEY").ok(),
            identity_api_url: Self::get_identity_api_url(),
            identity_api_key: std::env::var("IDENTITY_API_KEY").ok(),
        }
    }

    pub fn get_forecast_service_url() -> String {
        std::env::var("FORECAST_SERVICE_URL").unwrap_or("http://127.0.0.1:8000".to_string())
    }

    pub fn get_weather_api_url() -> String {
        std::env::var("WEATHER_API_URL")
            .unwrap_or("https://api.openweathermap.org/data/2.5".to_string())
    }

    pub fn get_assistant_api_url() -> String {
        std::env::var("ASSISTANT_API_URL").unwrap_or(
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
                .to_string(),
        )
    }

    pub fn get_identity_api_url() -> String {
        std::env::var("IDENTITY_API_URL")
            .unwrap_or("https://identitytoolkit.googleapis.com/v1".to_string())
    }
}
