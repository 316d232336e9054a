use serde::Serialize;

use super::items::ListItem;
use super::sections::SectionKind;
use super::ParsedAnalysis;

const POINTS_PER_SECTION: usize = 3;

/// Caregiver-readable digest of a prediction and its analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaregiverSummary {
    pub header: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    pub watch_fors: Vec<String>,
    pub leverage_supports: Vec<String>,
    pub how_to_help: Vec<String>,
    pub monitor_closely: Vec<String>,
}

pub fn header_line(label: &str, confidence: Option<f64>) -> String {
    match confidence.filter(|c| c.is_finite()) {
        Some(c) => format!("Risk snapshot: {} ({}% confidence).", label, (c * 100.0).round() as i64),
        None => format!("Risk snapshot: {} (confidence pending).", label),
    }
}

pub fn synthesize(parsed: &ParsedAnalysis, label: &str, confidence: Option<f64>) -> CaregiverSummary {
    let overview = parsed
        .behavioral_analysis
        .as_deref()
        .map(collapse_lines)
        .filter(|s| !s.is_empty());

    CaregiverSummary {
        header: header_line(label, confidence),
        overview,
        watch_fors: leading_points(parsed.list(SectionKind::KeyRiskFactors)),
        leverage_supports: leading_points(parsed.list(SectionKind::ProtectiveFactors)),
        how_to_help: leading_points(parsed.list(SectionKind::ActionableRecommendations)),
        monitor_closely: leading_points(parsed.list(SectionKind::MonitoringPriorities)),
    }
}

fn leading_points(items: &[ListItem]) -> Vec<String> {
    items
        .iter()
        .take(POINTS_PER_SECTION)
        .map(|item| item.main.clone())
        .collect()
}

fn collapse_lines(prose: &str) -> String {
    prose
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl CaregiverSummary {
    /// True when nothing beyond the header line was derived.
    pub fn is_header_only(&self) -> bool {
        self.overview.is_none()
            && self.watch_fors.is_empty()
            && self.leverage_supports.is_empty()
            && self.how_to_help.is_empty()
            && self.monitor_closely.is_empty()
    }

    /// Plain text for clipboard export. Empty sections are left out.
    pub fn to_text(&self) -> String {
        let mut blocks = vec![self.header.clone()];

        if let Some(overview) = &self.overview {
            blocks.push(format!("Summary:\n{}", overview));
        }
        let lists: [(&str, &[String], bool); 4] = [
            ("Watch Fors", &self.watch_fors, false),
            ("Leverage Supports", &self.leverage_supports, false),
            ("How to Help", &self.how_to_help, true),
            ("Monitor Closely", &self.monitor_closely, false),
        ];
        for (heading, entries, numbered) in lists {
            if entries.is_empty() {
                continue;
            }
            let body: Vec<String> = entries
                .iter()
                .enumerate()
                .map(|(i, e)| if numbered { format!("{}. {}", i + 1, e) } else { format!("- {}", e) })
                .collect();
            blocks.push(format!("{}:\n{}", heading, body.join("\n")));
        }

        blocks.join("\n\n")
    }
}
