use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::parser::summary::{self, CaregiverSummary};
use crate::parser::{self, ParsedAnalysis};

// ── Intake ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealKind {
    Meal,
    Snack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MealKind,
    pub time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BathroomKind {
    #[serde(rename = "no void")]
    NoVoid,
    #[serde(rename = "urine")]
    Urine,
    #[serde(rename = "bowel movement")]
    BowelMovement,
    #[serde(rename = "urine accident")]
    UrineAccident,
    #[serde(rename = "bowel movement accident")]
    BowelMovementAccident,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BathroomEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BathroomKind,
    pub time: String,
}

fn default_transition() -> String {
    "none".to_string()
}

/// Caregiver intake. Unknown fields are kept and forwarded to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentForm {
    #[serde(default)]
    pub sleep_quality: String,
    #[serde(default)]
    pub prediction_time: String,
    #[serde(default)]
    pub meals: Vec<MealEntry>,
    #[serde(default)]
    pub bathroom_visits: Vec<BathroomEntry>,
    #[serde(default)]
    pub social_interaction_context: String,
    #[serde(default = "default_transition")]
    pub transition_type: String,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub primary_concern: String,
    #[serde(default)]
    pub support_focus: String,
    #[serde(default)]
    pub clinic_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssessmentForm {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.sleep_quality.trim().is_empty() || self.social_interaction_context.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Sleep quality and social interaction context are required".into(),
            ));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PatientSnapshot {
        PatientSnapshot {
            patient_name: self.patient_name.clone(),
            primary_concern: self.primary_concern.clone(),
            support_focus: self.support_focus.clone(),
            clinic_name: self.clinic_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSnapshot {
    pub patient_name: String,
    pub primary_concern: String,
    pub support_focus: String,
    pub clinic_name: String,
}

impl PatientSnapshot {
    pub fn is_empty(&self) -> bool {
        [&self.patient_name, &self.primary_concern, &self.support_focus, &self.clinic_name]
            .iter()
            .all(|f| f.is_empty())
    }
}

// ── Prediction ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub low_risk: f64,
    pub high_risk: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherUsed {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub condition: Option<String>,
    pub type_numeric: Option<i64>,
}

/// Response of the prediction backend. Unknown fields are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Probabilities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_used: Option<WeatherUsed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PredictionResult {
    pub fn risk_label(&self) -> String {
        match &self.prediction_label {
            Some(label) if !label.trim().is_empty() => label.clone(),
            _ if self.prediction == Some(1) => "High Risk".to_string(),
            _ => "Low Risk".to_string(),
        }
    }

    /// Confidence as a whole percentage; zero counts as absent.
    pub fn confidence_percent(&self) -> Option<i64> {
        self.confidence
            .filter(|c| c.is_finite() && *c != 0.0)
            .map(|c| (c * 100.0).round() as i64)
    }

    pub fn analysis_text(&self) -> &str {
        self.analysis.as_deref().unwrap_or_default()
    }

    pub fn parsed(&self) -> ParsedAnalysis {
        parser::analyze(self.analysis_text())
    }

    pub fn caregiver_summary(&self) -> CaregiverSummary {
        summary::synthesize(&self.parsed(), &self.risk_label(), self.confidence)
    }
}

// ── Weather ──

/// Condensed current conditions, as shown next to the assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub temperature: i64,
    pub condition: String,
    pub humidity: f64,
    pub wind_speed: f64,
    pub location: String,
    pub feels_like: i64,
}

impl WeatherSnapshot {
    /// Picks the fields out of an OpenWeather "current weather" response.
    pub fn from_openweather(raw: &Value) -> Option<Self> {
        let main = raw.get("main")?;
        Some(Self {
            temperature: main.get("temp")?.as_f64()?.round() as i64,
            condition: raw
                .pointer("/weather/0/main")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            humidity: main.get("humidity").and_then(Value::as_f64).unwrap_or_default(),
            wind_speed: raw.pointer("/wind/speed").and_then(Value::as_f64).unwrap_or_default(),
            location: raw.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            feels_like: main
                .get("feels_like")
                .and_then(Value::as_f64)
                .map_or(0, |f| f.round() as i64),
        })
    }
}

// ── History ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAssessment {
    pub id: i64,
    pub created_at: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_label: Option<String>,
    pub summary: String,
}
