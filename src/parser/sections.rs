use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

// Optional markdown heading/bold markup around the label belongs to the header,
// so the previous body ends before it.
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:#{1,6}[ \t]*)?(?:\*\*)?(behavioral analysis|key risk factors|protective factors|actionable recommendations|monitoring priorities)(?:\*\*)?[ \t]*:(?:[ \t]*\*\*)?",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionKind {
    BehavioralAnalysis,
    KeyRiskFactors,
    ProtectiveFactors,
    ActionableRecommendations,
    MonitoringPriorities,
}

impl SectionKind {
    /// Canonical header order.
    pub const ALL: [SectionKind; 5] = [
        SectionKind::BehavioralAnalysis,
        SectionKind::KeyRiskFactors,
        SectionKind::ProtectiveFactors,
        SectionKind::ActionableRecommendations,
        SectionKind::MonitoringPriorities,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SectionKind::BehavioralAnalysis => "Behavioral Analysis",
            SectionKind::KeyRiskFactors => "Key Risk Factors",
            SectionKind::ProtectiveFactors => "Protective Factors",
            SectionKind::ActionableRecommendations => "Actionable Recommendations",
            SectionKind::MonitoringPriorities => "Monitoring Priorities",
        }
    }

    pub fn from_label(label: &str) -> Option<SectionKind> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(label))
    }

    /// Everything except the behavioral analysis prose is itemized.
    pub fn is_list(self) -> bool {
        self != SectionKind::BehavioralAnalysis
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub body: String,
}

struct HeaderMatch {
    kind: SectionKind,
    start: usize,
    end: usize,
}

/// Split analysis text into its labeled sections, in canonical order.
///
/// Each label is looked up after the previously accepted header, so headers
/// that appear out of order are treated as absent. A body runs up to the next
/// accepted header (or end of text) and is trimmed.
pub fn extract_sections(text: &str) -> Vec<Section> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let found: Vec<HeaderMatch> = HEADER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = SectionKind::from_label(&caps[1])?;
            Some(HeaderMatch {
                kind,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect();

    let mut accepted: Vec<&HeaderMatch> = Vec::new();
    let mut cursor = 0;
    for kind in SectionKind::ALL {
        if let Some(m) = found.iter().find(|m| m.kind == kind && m.start >= cursor) {
            cursor = m.end;
            accepted.push(m);
        }
    }

    accepted
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let stop = accepted.get(i + 1).map_or(text.len(), |next| next.start);
            Section {
                kind: m.kind,
                body: text[m.end..stop].trim().to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "BEHAVIORAL ANALYSIS:\nSlept poorly and skipped lunch.\n\n\
KEY RISK FACTORS:\n1. Hunger\n2. Fatigue\n\n\
PROTECTIVE FACTORS:\n- Familiar staff\n\n\
ACTIONABLE RECOMMENDATIONS:\n1. Offer a snack\n\n\
MONITORING PRIORITIES:\n- Watch for whining";

    fn kinds(sections: &[Section]) -> Vec<SectionKind> {
        sections.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn all_five_in_order() {
        let sections = extract_sections(FULL);
        assert_eq!(kinds(&sections), SectionKind::ALL.to_vec());
        assert_eq!(sections[0].body, "Slept poorly and skipped lunch.");
        assert_eq!(sections[1].body, "1. Hunger\n2. Fatigue");
        assert_eq!(sections[4].body, "- Watch for whining");
    }

    #[test]
    fn bodies_reconstruct_text() {
        let sections = extract_sections(FULL);
        let joined: String = sections.iter().map(|s| s.body.as_str()).collect();
        let mut expected = FULL.to_string();
        for kind in SectionKind::ALL {
            expected = expected.replace(&format!("{}:", kind.label().to_uppercase()), "");
        }
        let squash = |s: &str| s.split_whitespace().collect::<String>();
        assert_eq!(squash(&joined), squash(&expected));
    }

    #[test]
    fn missing_header_does_not_merge_neighbours() {
        let text = "Key Risk Factors:\n1. Hunger\nActionable Recommendations:\n1. Snack";
        let sections = extract_sections(text);
        assert_eq!(
            kinds(&sections),
            vec![SectionKind::KeyRiskFactors, SectionKind::ActionableRecommendations]
        );
        assert_eq!(sections[0].body, "1. Hunger");
        assert_eq!(sections[1].body, "1. Snack");
    }

    #[test]
    fn case_insensitive_and_markdown_wrapped() {
        let text = "**Key Risk Factors:**\n- Noise\n## protective factors:\n- Routine";
        let sections = extract_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].body, "- Noise");
        assert_eq!(sections[1].body, "- Routine");
    }

    #[test]
    fn label_without_colon_is_not_a_header() {
        let text = "Behavioral Analysis:\nKey risk factors include hunger.";
        let sections = extract_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].body, "Key risk factors include hunger.");
    }

    #[test]
    fn out_of_order_header_is_absent() {
        let text = "Protective Factors:\n- Routine\nKey Risk Factors:\n- Hunger";
        let sections = extract_sections(text);
        assert_eq!(kinds(&sections), vec![SectionKind::KeyRiskFactors]);
        assert_eq!(sections[0].body, "- Hunger");
    }

    #[test]
    fn empty_and_unstructured_input() {
        assert!(extract_sections("").is_empty());
        assert!(extract_sections("   \n ").is_empty());
        assert!(extract_sections("Just some prose with no headers.").is_empty());
    }

    #[test]
    fn from_label_round_trips() {
        for kind in SectionKind::ALL {
            assert_eq!(SectionKind::from_label(&kind.label().to_lowercase()), Some(kind));
        }
        assert_eq!(SectionKind::from_label("Summary"), None);
    }
}
