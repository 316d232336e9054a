use std::time::Instant;

use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{AssessmentForm, PredictionResult};
use crate::settings::Settings;

/// Map a non-2xx response to `AppError::Upstream`, keeping the body text.
pub(crate) async fn ensure_success(service: &'static str, response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("{} error ({}): {}", service, status, body);
    Err(AppError::Upstream {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Client for the prediction service (`/predict`, `/weather`).
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.backend_url)
    }

    pub async fn predict(&self, form: &AssessmentForm) -> Result<PredictionResult, AppError> {
        let url = format!("{}/predict", self.base_url);
        info!("Requesting prediction from {}", url);

        let start = Instant::now();
        let response = self.http.post(&url).json(form).send().await?;
        let response = ensure_success("Backend", response).await?;
        let result: PredictionResult = response.json().await?;

        info!(
            label = %result.risk_label(),
            confidence = ?result.confidence,
            latency_ms = start.elapsed().as_millis() as u64,
            "Prediction received"
        );
        Ok(result)
    }

    /// Hand the latest raw weather reading to the backend as model input.
    pub async fn forward_weather(&self, weather: &Value) -> Result<(), AppError> {
        let url = format!("{}/weather", self.base_url);
        let response = self.http.post(&url).json(weather).send().await?;
        ensure_success("Backend", response).await?;
        info!("Forwarded weather reading to {}", url);
        Ok(())
    }
}

/// Client for OpenWeather current conditions.
#[derive(Clone)]
pub struct WeatherClient {
    http: Client,
    url: String,
    api_key: Option<String>,
}

impl WeatherClient {
    pub fn new(url: &str, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.to_string(),
            api_key,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.openweather_url, settings.openweather_api_key.clone())
    }

    /// Raw OpenWeather JSON for the given coordinates (metric units).
    pub async fn current(&self, lat: Option<&str>, lon: Option<&str>) -> Result<Value, AppError> {
        let (lat, lon) = match (lat.map(str::trim), lon.map(str::trim)) {
            (Some(lat), Some(lon)) if !lat.is_empty() && !lon.is_empty() => (lat, lon),
            _ => return Err(AppError::InvalidInput("Missing latitude or longitude".into())),
        };
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AppError::MissingConfig("OPENWEATHER_API_KEY"))?;

        let response = self
            .http
            .get(&self.url)
            .query(&[("lat", lat), ("lon", lon), ("appid", api_key), ("units", "metric")])
            .send()
            .await?;
        let response = ensure_success("OpenWeather", response).await?;
        Ok(response.json().await?)
    }
}
