pub mod items;
pub mod lines;
pub mod sections;
pub mod summary;

use serde::Serialize;
use tracing::debug;

use items::ListItem;
use sections::SectionKind;

/// Structured view of one analysis text. Absent sections stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavioral_analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_risk_factors: Option<Vec<ListItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protective_factors: Option<Vec<ListItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actionable_recommendations: Option<Vec<ListItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_priorities: Option<Vec<ListItem>>,
}

impl ParsedAnalysis {
    pub fn list(&self, kind: SectionKind) -> &[ListItem] {
        self.list_slot(kind).unwrap_or_default()
    }

    fn list_slot(&self, kind: SectionKind) -> Option<&[ListItem]> {
        match kind {
            SectionKind::KeyRiskFactors => self.key_risk_factors.as_deref(),
            SectionKind::ProtectiveFactors => self.protective_factors.as_deref(),
            SectionKind::ActionableRecommendations => self.actionable_recommendations.as_deref(),
            SectionKind::MonitoringPriorities => self.monitoring_priorities.as_deref(),
            SectionKind::BehavioralAnalysis => None,
        }
    }

    pub fn has_section(&self, kind: SectionKind) -> bool {
        match kind {
            SectionKind::BehavioralAnalysis => self.behavioral_analysis.is_some(),
            _ => self.list_slot(kind).is_some(),
        }
    }

    pub fn section_count(&self) -> usize {
        SectionKind::ALL.iter().filter(|k| self.has_section(**k)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.section_count() == 0
    }
}

/// Pipeline: analysis text → sections → list items.
pub fn analyze(text: &str) -> ParsedAnalysis {
    let mut parsed = ParsedAnalysis::default();

    for section in sections::extract_sections(text) {
        if !section.kind.is_list() {
            parsed.behavioral_analysis = Some(section.body);
            continue;
        }
        let list = Some(items::parse_items(&section.body));
        match section.kind {
            SectionKind::KeyRiskFactors => parsed.key_risk_factors = list,
            SectionKind::ProtectiveFactors => parsed.protective_factors = list,
            SectionKind::ActionableRecommendations => parsed.actionable_recommendations = list,
            SectionKind::MonitoringPriorities => parsed.monitoring_priorities = list,
            SectionKind::BehavioralAnalysis => {}
        }
    }

    debug!(
        sections = parsed.section_count(),
        risk_factors = parsed.list(SectionKind::KeyRiskFactors).len(),
        recommendations = parsed.list(SectionKind::ActionableRecommendations).len(),
        "analysis parsed"
    );
    parsed
}

/// Terminal rendering: numbered main points, indented sub-points.
pub fn render_sections(parsed: &ParsedAnalysis) -> String {
    let mut out = Vec::new();

    if let Some(prose) = &parsed.behavioral_analysis {
        out.push(format!("{}\n{}", SectionKind::BehavioralAnalysis.label(), prose));
    }
    for kind in SectionKind::ALL.into_iter().filter(|k| k.is_list()) {
        if !parsed.has_section(kind) {
            continue;
        }
        let mut block = vec![kind.label().to_string()];
        for (i, item) in parsed.list(kind).iter().enumerate() {
            block.push(format!("{:>2}. {}", i + 1, item.main));
            for sub in item.sub_points() {
                block.push(format!("      - {}", sub));
            }
        }
        out.push(block.join("\n"));
    }

    out.join("\n\n")
}

// ── Tests ──
