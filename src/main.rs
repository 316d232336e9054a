mod backend;
mod chat;
mod db;
mod error;
mod models;
mod parser;
mod server;
mod settings;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use models::{AssessmentForm, PredictionResult, WeatherSnapshot};
use settings::Settings;

#[derive(Parser)]
#[command(name = "aba_forecast", about = "Behavior risk forecasts and caregiver summaries for ABA sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse analysis text (or saved prediction JSON) into sections and a caregiver summary
    Analyze {
        /// Files holding raw analysis text or a prediction response
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Risk label to use when the file does not carry one
        #[arg(short, long)]
        label: Option<String>,
        /// Confidence (0-1) to use when the file does not carry one
        #[arg(short, long)]
        confidence: Option<f64>,
        /// Print parsed sections and summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Submit an assessment form (JSON) to the prediction backend
    Predict {
        /// Path to the assessment form JSON
        form: PathBuf,
    },
    /// Caregiver summary for the most recent prediction
    Summary,
    /// Ask the session-support assistant (interactive when no message is given)
    Chat {
        message: Option<String>,
        /// Do not include the latest prediction as context
        #[arg(long)]
        no_context: bool,
    },
    /// Current weather for a location
    Weather {
        #[arg(long, allow_hyphen_values = true)]
        lat: String,
        #[arg(long, allow_hyphen_values = true)]
        lon: String,
        /// Also send the reading to the prediction backend
        #[arg(long)]
        forward: bool,
    },
    /// Recent assessments
    History {
        /// Max rows to display
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Patient snapshot from the last submitted form
    Profile,
    /// Run the HTTP API
    Serve {
        /// Bind address (default from ABA_BIND_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load().context("Failed to load settings")?;

    let result = match cli.command {
        Commands::Analyze { files, label, confidence, json } => {
            analyze_files(&files, label.as_deref(), confidence, json)
        }
        Commands::Predict { form } => {
            let raw = std::fs::read_to_string(&form)
                .with_context(|| format!("Failed to read {:?}", form))?;
            let form: AssessmentForm = serde_json::from_str(&raw).context("Form is not valid JSON")?;
            form.validate()?;

            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            db::save_profile(&conn, &form.snapshot())?;

            let client = backend::BackendClient::from_settings(&settings);
            let pb = spinner("Waiting for prediction...");
            let outcome = client.predict(&form).await;
            pb.finish_and_clear();
            let prediction = outcome?;

            let saved = db::save_assessment(&conn, &prediction, settings.history_limit)?;
            print_prediction(&prediction);
            println!("\nSaved as assessment #{} ({})", saved.id, saved.created_at);
            Ok(())
        }
        Commands::Summary => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            match db::latest_prediction(&conn)? {
                Some(prediction) => {
                    let summary = prediction.caregiver_summary();
                    println!("{}", summary.to_text());
                    if summary.is_header_only() {
                        println!("\nThe analysis had no recognized sections to summarize.");
                    }
                }
                None => println!("No assessments yet. Run 'predict' first."),
            }
            Ok(())
        }
        Commands::Chat { message, no_context } => {
            let prediction = if no_context {
                None
            } else {
                let conn = db::connect(&settings.db_path)?;
                db::init_schema(&conn)?;
                db::latest_prediction(&conn)?
            };
            run_chat(&settings, prediction.as_ref(), message).await
        }
        Commands::Weather { lat, lon, forward } => {
            let client = backend::WeatherClient::from_settings(&settings);
            let raw = client.current(Some(&lat), Some(&lon)).await?;
            match WeatherSnapshot::from_openweather(&raw) {
                Some(w) => println!(
                    "{}: {}, {}°C (feels like {}°C), {}% humidity, wind {} m/s",
                    w.location, w.condition, w.temperature, w.feels_like, w.humidity, w.wind_speed
                ),
                None => println!("{}", serde_json::to_string_pretty(&raw)?),
            }
            if forward {
                backend::BackendClient::from_settings(&settings)
                    .forward_weather(&raw)
                    .await?;
                println!("Forwarded to {}", settings.backend_url);
            }
            Ok(())
        }
        Commands::History { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_history(&conn, limit.or(Some(settings.history_limit)))?;
            if rows.is_empty() {
                println!("No assessments yet.");
                return Ok(());
            }
            println!("{:>3} | {:<24} | {:<10} | {:>5} | Summary", "#", "Created", "Label", "Conf");
            println!("{}", "-".repeat(90));
            for r in &rows {
                println!(
                    "{:>3} | {:<24} | {:<10} | {:>5} | {}",
                    r.id,
                    truncate(&r.created_at, 24),
                    truncate(&r.label, 10),
                    r.confidence_label.as_deref().unwrap_or("-"),
                    truncate(&r.summary, 60)
                );
            }
            Ok(())
        }
        Commands::Profile => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            match db::load_profile(&conn)?.filter(|p| !p.is_empty()) {
                Some(p) => {
                    println!("Patient:         {}", or_dash(&p.patient_name));
                    println!("Primary concern: {}", or_dash(&p.primary_concern));
                    println!("Support focus:   {}", or_dash(&p.support_focus));
                    println!("Clinic:          {}", or_dash(&p.clinic_name));
                }
                None => println!("No patient snapshot yet. Submit an assessment first."),
            }
            Ok(())
        }
        Commands::Serve { addr } => {
            if let Some(addr) = addr {
                settings.bind_addr = addr;
            }
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            server::serve(&settings, conn).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct AnalyzedFile {
    path: PathBuf,
    prediction: PredictionResult,
}

/// Raw text, or a prediction response whose `analysis` field holds the text.
fn load_analysis(path: &Path, label: Option<&str>, confidence: Option<f64>) -> anyhow::Result<AnalyzedFile> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let mut prediction = serde_json::from_str::<PredictionResult>(&raw)
        .ok()
        .filter(|p| p.analysis.is_some() || p.prediction_label.is_some() || p.prediction.is_some())
        .unwrap_or_else(|| PredictionResult {
            analysis: Some(raw),
            ..Default::default()
        });

    if let Some(label) = label {
        if prediction.prediction_label.is_none() {
            prediction.prediction_label = Some(label.to_string());
        }
    }
    if prediction.confidence.is_none() {
        prediction.confidence = confidence;
    }
    Ok(AnalyzedFile {
        path: path.to_path_buf(),
        prediction,
    })
}

fn analyze_files(files: &[PathBuf], label: Option<&str>, confidence: Option<f64>, as_json: bool) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    if files.len() > 1 {
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")?
                .progress_chars("#>-"),
        );
    } else {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let results: Vec<anyhow::Result<AnalyzedFile>> = files
        .par_iter()
        .map(|path| {
            let loaded = load_analysis(path, label, confidence);
            pb.inc(1);
            loaded
        })
        .collect();
    pb.finish_and_clear();

    for result in results {
        let file = result?;
        let parsed = file.prediction.parsed();
        let summary = file.prediction.caregiver_summary();

        if as_json {
            let out = json!({
                "file": file.path,
                "sections": parsed,
                "summary": summary,
                "summaryText": summary.to_text(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            continue;
        }

        if files.len() > 1 {
            println!("== {}", file.path.display());
        }
        if parsed.is_empty() {
            println!("(no recognized sections)");
        } else {
            println!("{}", parser::render_sections(&parsed));
        }
        println!("\n--- Caregiver summary ---\n{}\n", summary.to_text());
    }
    Ok(())
}

fn print_prediction(p: &PredictionResult) {
    println!("Prediction: {}", p.risk_label());
    if let Some(pct) = p.confidence_percent() {
        println!("Confidence: {}%", pct);
    }
    if let Some(probs) = &p.probabilities {
        println!(
            "High risk:  {:.1}% | Low risk: {:.1}%",
            probs.high_risk * 100.0,
            probs.low_risk * 100.0
        );
    }
    let parsed = p.parsed();
    if !parsed.is_empty() {
        println!("\n{}", parser::render_sections(&parsed));
    }
    println!("\n--- Caregiver summary ---\n{}", p.caregiver_summary().to_text());
}

async fn run_chat(settings: &Settings, prediction: Option<&PredictionResult>, message: Option<String>) -> anyhow::Result<()> {
    let client = chat::ChatClient::from_settings(settings);
    let mut history = chat::seed_history(prediction);

    if let Some(message) = message {
        let reply = client.reply(&chat::conversation(prediction, &history, &message)).await?;
        println!("{}", chat::displayed_reply(reply));
        return Ok(());
    }

    if let Some(welcome) = history.last() {
        println!("{}\n", welcome.content);
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        let messages = chat::conversation(prediction, &history, line);
        match client.reply(&messages).await {
            Ok(reply) => {
                let reply = chat::displayed_reply(reply);
                println!("\n{}\n", reply);
                history.push(chat::ChatMessage::new(chat::ChatRole::User, line));
                history.push(chat::ChatMessage::new(chat::ChatRole::Assistant, reply));
            }
            Err(e) => eprintln!("Sorry, I'm having trouble connecting to the AI server right now ({}).", e),
        }
    }
    Ok(())
}

fn spinner(message: &str) -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("aba_forecast_{}_{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_raw_text_file() {
        let path = write_temp("raw.txt", "KEY RISK FACTORS:\n1. Hunger");
        let file = load_analysis(&path, Some("High Risk"), Some(0.92)).unwrap();
        assert_eq!(file.prediction.risk_label(), "High Risk");
        assert_eq!(
            file.prediction.caregiver_summary().to_text(),
            "Risk snapshot: High Risk (92% confidence).\n\nWatch Fors:\n- Hunger"
        );
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn load_prediction_json_file() {
        let body = json!({
            "prediction": 0,
            "confidence": 0.64,
            "analysis": "PROTECTIVE FACTORS:\n- Calm morning routine"
        });
        let path = write_temp("prediction.json", &body.to_string());
        let file = load_analysis(&path, Some("Fallback Label"), Some(0.1)).unwrap();
        // No label in the file, so the fallback fills it; the file's confidence wins.
        assert_eq!(file.prediction.risk_label(), "Fallback Label");
        assert_eq!(file.prediction.confidence, Some(0.64));
        assert_eq!(file.prediction.parsed().protective_factors.unwrap().len(), 1);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn file_label_wins_over_fallback() {
        let body = json!({
            "prediction": 1,
            "prediction_label": "High Risk",
            "analysis": "KEY RISK FACTORS:\n1. Hunger"
        });
        let path = write_temp("labelled.json", &body.to_string());
        let file = load_analysis(&path, Some("Low Risk"), None).unwrap();
        assert_eq!(file.prediction.risk_label(), "High Risk");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn truncate_and_duration() {
        assert_eq!(truncate("Low Risk", 10), "Low Risk");
        assert_eq!(truncate("abcdefghijkl", 4), "abcd...");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
    }
}
