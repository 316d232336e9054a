use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{PatientSnapshot, PredictionResult, SavedAssessment};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS assessments (
            id               INTEGER PRIMARY KEY,
            created_at       TEXT NOT NULL,
            label            TEXT NOT NULL,
            confidence_label TEXT,
            summary          TEXT NOT NULL,
            prediction_json  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_assessments_created ON assessments(created_at);

        CREATE TABLE IF NOT EXISTS patient_profile (
            id              INTEGER PRIMARY KEY CHECK (id = 1),
            patient_name    TEXT NOT NULL DEFAULT '',
            primary_concern TEXT NOT NULL DEFAULT '',
            support_focus   TEXT NOT NULL DEFAULT '',
            clinic_name     TEXT NOT NULL DEFAULT '',
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Assessment history ──

/// One-line history entry: label, confidence and the first line of the analysis.
pub fn summarize_assessment(result: Option<&PredictionResult>) -> String {
    let Some(result) = result else {
        return "Assessment details pending.".to_string();
    };

    let mut headline = result.risk_label();
    if let Some(pct) = result.confidence_percent() {
        headline.push_str(&format!(" ({}% confidence)", pct));
    }

    let insight = result
        .analysis_text()
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty());

    match insight {
        Some(line) => format!("{} — Key insight: {}", headline, line),
        None => headline,
    }
}

/// Store a prediction and keep only the newest `limit` entries (at least the new one).
pub fn save_assessment(conn: &Connection, result: &PredictionResult, limit: usize) -> Result<SavedAssessment> {
    let created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    let label = result.risk_label();
    let confidence_label = result.confidence_percent().map(|c| format!("{}%", c));
    let summary = summarize_assessment(Some(result));
    let json = serde_json::to_string(result)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO assessments (created_at, label, confidence_label, summary, prediction_json)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![created_at, label, confidence_label, summary, json],
    )?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "DELETE FROM assessments WHERE id NOT IN (
             SELECT id FROM assessments ORDER BY id DESC LIMIT ?1
         )",
        params![limit.max(1) as i64],
    )?;
    tx.commit()?;

    Ok(SavedAssessment {
        id,
        created_at,
        label,
        confidence_label,
        summary,
    })
}

pub fn fetch_history(conn: &Connection, limit: Option<usize>) -> Result<Vec<SavedAssessment>> {
    let sql = format!(
        "SELECT id, created_at, label, confidence_label, summary
         FROM assessments ORDER BY id DESC{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SavedAssessment {
                id: row.get(0)?,
                created_at: row.get(1)?,
                label: row.get(2)?,
                confidence_label: row.get(3)?,
                summary: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Full prediction of the newest stored assessment.
pub fn latest_prediction(conn: &Connection) -> Result<Option<PredictionResult>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT prediction_json FROM assessments ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    json.map(|j| serde_json::from_str(&j).context("Stored prediction is not valid JSON"))
        .transpose()
}

// ── Patient snapshot ──

pub fn save_profile(conn: &Connection, snapshot: &PatientSnapshot) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO patient_profile
         (id, patient_name, primary_concern, support_focus, clinic_name, updated_at)
         VALUES (1, ?1, ?2, ?3, ?4, datetime('now'))",
        params![
            snapshot.patient_name,
            snapshot.primary_concern,
            snapshot.support_focus,
            snapshot.clinic_name,
        ],
    )?;
    Ok(())
}

pub fn load_profile(conn: &Connection) -> Result<Option<PatientSnapshot>> {
    let snapshot = conn
        .query_row(
            "SELECT patient_name, primary_concern, support_focus, clinic_name
             FROM patient_profile WHERE id = 1",
            [],
            |row| {
                Ok(PatientSnapshot {
                    patient_name: row.get(0)?,
                    primary_concern: row.get(1)?,
                    support_focus: row.get(2)?,
                    clinic_name: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(snapshot)
}
