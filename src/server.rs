use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::backend::{BackendClient, WeatherClient};
use crate::chat::{ChatClient, ChatReply, ChatRequest};
use crate::db;
use crate::error::AppError;
use crate::models::{AssessmentForm, PatientSnapshot, PredictionResult, SavedAssessment};
use crate::parser::summary::{self, CaregiverSummary};
use crate::parser::{self, ParsedAnalysis};
use crate::settings::Settings;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    backend: BackendClient,
    weather: WeatherClient,
    chat: ChatClient,
    history_limit: usize,
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(settings: &Settings, conn: Connection) -> Self {
        Self {
            backend: BackendClient::from_settings(settings),
            weather: WeatherClient::from_settings(settings),
            chat: ChatClient::from_settings(settings),
            history_limit: settings.history_limit,
            db: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Other(anyhow::anyhow!("database lock poisoned")))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/predict", post(predict))
        .route("/api/chat", post(chat))
        .route("/api/weather", get(weather))
        .route("/api/analysis", post(analysis))
        .route("/api/history", get(history))
        .route("/api/profile", get(profile))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(settings: &Settings, conn: Connection) -> anyhow::Result<()> {
    let app = router(AppState::new(settings, conn));
    let listener = tokio::net::TcpListener::bind(settings.bind_addr.as_str()).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::InvalidInput(e.body_text()))
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<AssessmentForm>, JsonRejection>,
) -> Result<Json<PredictionResult>, AppError> {
    let form = body(payload)?;
    form.validate()?;
    db::save_profile(&*state.conn()?, &form.snapshot())?;

    let result = state.backend.predict(&form).await?;

    // A history write failure does not fail the request.
    if let Err(e) = db::save_assessment(&*state.conn()?, &result, state.history_limit) {
        warn!("Unable to persist assessment: {:#}", e);
    }
    Ok(Json(result))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, AppError> {
    let request = body(payload)?;
    let reply = state.chat.reply(&request.messages).await?;
    Ok(Json(ChatReply { reply }))
}

#[derive(Debug, Deserialize)]
struct WeatherQuery {
    lat: Option<String>,
    lon: Option<String>,
}

async fn weather(
    State(state): State<AppState>,
    Query(q): Query<WeatherQuery>,
) -> Result<Json<Value>, AppError> {
    let raw = state.weather.current(q.lat.as_deref(), q.lon.as_deref()).await?;
    Ok(Json(raw))
}

#[derive(Debug, Deserialize)]
struct AnalysisRequest {
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    prediction_label: Option<String>,
    #[serde(default)]
    prediction: Option<i64>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    sections: ParsedAnalysis,
    summary: CaregiverSummary,
    summary_text: String,
}

async fn analysis(payload: Result<Json<AnalysisRequest>, JsonRejection>) -> Result<Json<AnalysisResponse>, AppError> {
    let req = body(payload)?;
    let label = PredictionResult {
        prediction: req.prediction,
        prediction_label: req.prediction_label,
        ..Default::default()
    }
    .risk_label();

    let sections = parser::analyze(req.analysis.as_deref().unwrap_or_default());
    let summary = summary::synthesize(&sections, &label, req.confidence);
    let summary_text = summary.to_text();
    Ok(Json(AnalysisResponse {
        sections,
        summary,
        summary_text,
    }))
}

async fn history(State(state): State<AppState>) -> Result<Json<Vec<SavedAssessment>>, AppError> {
    let rows = db::fetch_history(&*state.conn()?, Some(state.history_limit))?;
    Ok(Json(rows))
}

async fn profile(State(state): State<AppState>) -> Result<Json<PatientSnapshot>, AppError> {
    let snapshot = db::load_profile(&*state.conn()?)?.unwrap_or_default();
    Ok(Json(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(backend_url: &str) -> Settings {
        Settings {
            backend_url: backend_url.to_string(),
            db_path: ":memory:".into(),
            bind_addr: "127.0.0.1:0".into(),
            anthropic_url: "http://unused.invalid".into(),
            anthropic_model: "claude-test".into(),
            max_tokens: 128,
            openweather_url: "http://unused.invalid".into(),
            history_limit: 6,
            anthropic_api_key: None,
            openweather_api_key: None,
        }
    }

    fn app(backend_url: &str) -> Router {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        router(AppState::new(&settings(backend_url), conn))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_ok() {
        let (status, body) = send(app("http://unused.invalid"), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn analysis_route_parses_and_summarizes() {
        let req = post_json(
            "/api/analysis",
            json!({
                "analysis": "KEY RISK FACTORS:\n1. Hunger\n   - skipped lunch\n2. Noise sensitivity\nPROTECTIVE FACTORS:\n- Calm morning routine",
                "prediction": 1,
                "confidence": 0.92
            }),
        );
        let (status, body) = send(app("http://unused.invalid"), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["sections"]["keyRiskFactors"],
            json!([{ "main": "Hunger", "subPoints": ["skipped lunch"] }, { "main": "Noise sensitivity" }])
        );
        assert_eq!(body["summary"]["header"], "Risk snapshot: High Risk (92% confidence).");
        assert_eq!(
            body["summaryText"],
            "Risk snapshot: High Risk (92% confidence).\n\nWatch Fors:\n- Hunger\n- Noise sensitivity\n\nLeverage Supports:\n- Calm morning routine"
        );
    }

    #[tokio::test]
    async fn chat_without_messages_is_bad_request() {
        let (status, body) = send(app("http://unused.invalid"), post_json("/api/chat", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing \"messages\" array in request body.");
    }

    #[tokio::test]
    async fn chat_without_key_is_server_error() {
        let req = post_json("/api/chat", json!({ "messages": [{ "role": "user", "content": "hi" }] }));
        let (status, body) = send(app("http://unused.invalid"), req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "ANTHROPIC_API_KEY is not configured on the server.");
    }

    #[tokio::test]
    async fn weather_requires_coordinates() {
        let req = Request::get("/api/weather?lat=43.6").body(Body::empty()).unwrap();
        let (status, body) = send(app("http://unused.invalid"), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing latitude or longitude");
    }

    #[tokio::test]
    async fn predict_forwards_and_records_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "prediction": 0,
                "prediction_label": "Low Risk",
                "confidence": 0.77,
                "analysis": "BEHAVIORAL ANALYSIS:\nSettled morning."
            })))
            .mount(&server)
            .await;

        let app = app(&server.uri());
        let form = json!({
            "sleepQuality": "good",
            "socialInteractionContext": "plus_one",
            "patientName": "Sam"
        });
        let (status, body) = send(app.clone(), post_json("/api/predict", form)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction_label"], "Low Risk");

        let (_, history) = send(app.clone(), Request::get("/api/history").body(Body::empty()).unwrap()).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["confidenceLabel"], "77%");

        let (_, profile) = send(app, Request::get("/api/profile").body(Body::empty()).unwrap()).await;
        assert_eq!(profile["patientName"], "Sam");
    }

    #[tokio::test]
    async fn predict_rejects_incomplete_form() {
        let (status, _) = send(app("http://unused.invalid"), post_json("/api/predict", json!({ "sleepQuality": "good" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn predict_backend_failure_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let form = json!({ "sleepQuality": "good", "socialInteractionContext": "alone" });
        let (status, body) = send(app(&server.uri()), post_json("/api/predict", form)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Backend returned 500");
        assert_eq!(body["details"], "boom");
    }
}
