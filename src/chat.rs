use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::ensure_success;
use crate::error::AppError;
use crate::models::PredictionResult;
use crate::settings::Settings;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const SESSION_SUPPORT_PROMPT: &str = "\
You are a Board Certified Behavior Analyst (BCBA) providing real-time session support for ABA therapists, RBTs, and technicians working in clinic settings with learners. Your responses should be practical, concrete, and immediately implementable during table work, NET (Natural Environment Teaching), transitions, and other ABA activities.

When providing guidance:
- Use clear ABA terminology (MOs/EOs, antecedents, functions, reinforcement schedules, etc.)
- Focus on the four functions of behavior: Escape, Attention, Tangible, and Automatic/Sensory
- Provide concrete \"do this\" recommendations, not vague suggestions
- Prioritize antecedent interventions and proactive strategies BEFORE problem behavior occurs
- Suggest specific tools: visual schedules, first/then boards, token systems, choice boards, timers
- Recommend specific reinforcement strategies: dense schedules (FR1, VR2), differential reinforcement (DRA, DRO, DRI), behavioral momentum
- Include replacement behaviors: functional communication training (FCT), coping skills, appropriate mands
- Consider current MOs/EOs (hunger, sleep, toileting, sensory needs) in your recommendations
- Provide session-ready strategies that can be implemented in the next 1-2 hours

Format your responses to be actionable:
- Start with the most important/urgent strategy
- Use bullet points for multiple recommendations
- Be specific about timing, frequency, and implementation
- Include what to watch for (precursor behaviors, early warning signs)
- Suggest what data to collect for the BCBA

Important limitations:
- You are providing session support, not conducting formal FBAs or writing BIPs
- You cannot diagnose or replace a supervising BCBA
- Always recommend documenting observations and escalating concerns to the supervising BCBA
- For safety or crisis situations, prioritize immediate safety protocols and professional consultation

Your goal is to help ABA staff implement effective, function-based interventions during active sessions.";

const CONTEXT_PROMPT_BASE: &str = "You are a Board Certified Behavior Analyst (BCBA) providing real-time session support for ABA therapists and RBTs in a clinic setting. Provide practical, concrete, session-ready strategies for table work, NET, transitions, and other ABA activities. Use \"do this\" language, not vague suggestions.";

const CONTEXT_RESPONSE_RULES: &[&str] = &[
    "Always reference the specific numbered items from the analysis when the user asks about them",
    "Provide concrete, \"do this now\" strategies that can be implemented in the next 1-2 hours",
    "Reference specific MOs/EOs, antecedents, and functions from the data",
    "Suggest specific ABA tools: visual schedules, first/then boards, token systems, timers, choice boards",
    "Recommend specific reinforcement strategies: dense SR+ schedules (FR1, VR2), DRA, DRO, behavioral momentum",
    "Include replacement behaviors: FCT, appropriate mands, coping skills",
    "Tell them what precursor behaviors to watch for",
    "Suggest what data to collect and communicate to the supervising BCBA",
    "Be specific about timing, frequency, and implementation details",
];

pub const WELCOME_WITH_CONTEXT: &str = "Hi! I'm your BCBA session support assistant. I have access to the behavioral prediction analysis above and can provide practical, session-ready strategies for table work, NET, transitions, and other ABA activities. Ask me about specific antecedents, functions, interventions, or recommendations!";

pub const WELCOME: &str = "Hi! I'm your BCBA session support assistant. I can help with practical ABA strategies for clinic sessions, including antecedent interventions, reinforcement schedules, replacement behaviors, and what to document. How can I support your session today?";

const EMPTY_REPLY: &str = "I'm not sure how to respond to that just yet.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

// ── Anthropic wire types ──

#[derive(Debug, Serialize, PartialEq)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AnthropicMessage {
    pub role: ChatRole,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<AnthropicMessage>,
}

#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl ChatClient {
    pub fn new(url: &str, api_key: Option<String>, model: &str, max_tokens: u32) -> Self {
        Self {
            http: Client::new(),
            url: url.to_string(),
            api_key,
            model: model.to_string(),
            max_tokens,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.anthropic_url,
            settings.anthropic_api_key.clone(),
            &settings.anthropic_model,
            settings.max_tokens,
        )
    }

    /// The first system message overrides the default prompt; system turns
    /// are never sent as conversation turns.
    pub fn build_request(&self, messages: &[ChatMessage]) -> Result<MessagesRequest, AppError> {
        if messages.is_empty() {
            return Err(AppError::InvalidInput(
                "Missing \"messages\" array in request body.".into(),
            ));
        }

        let system = messages
            .iter()
            .find(|m| m.role == ChatRole::System && !m.content.is_empty())
            .map_or(SESSION_SUPPORT_PROMPT, |m| m.content.as_str())
            .to_string();

        let turns = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| AnthropicMessage {
                role: m.role,
                content: vec![ContentBlock {
                    kind: "text",
                    text: m.content.clone(),
                }],
            })
            .collect();

        Ok(MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system,
            messages: turns,
        })
    }

    pub async fn reply(&self, messages: &[ChatMessage]) -> Result<String, AppError> {
        let request = self.build_request(messages)?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AppError::MissingConfig("ANTHROPIC_API_KEY"))?;

        debug!(turns = request.messages.len(), model = %request.model, "Sending chat request");
        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success("Anthropic API", response).await?;
        let data: Value = response.json().await?;

        let reply = data
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        info!(chars = reply.len(), "Chat reply received");
        Ok(reply)
    }
}

/// System prompt carrying the prediction's headline numbers.
pub fn context_system_prompt(prediction: Option<&PredictionResult>) -> String {
    let mut prompt = CONTEXT_PROMPT_BASE.to_string();
    let Some(p) = prediction else {
        return prompt;
    };

    let confidence = p
        .confidence_percent()
        .map_or_else(|| "N/A".to_string(), |c| c.to_string());
    prompt.push_str("\n\nYou have access to a behavioral prediction analysis that was provided in the conversation history. The analysis includes:");
    prompt.push_str(&format!("\n- Risk Level: {} (Confidence: {}%)", p.risk_label(), confidence));

    if let Some(probs) = &p.probabilities {
        prompt.push_str(&format!(
            "\n- Probability of Challenging Behavior: {}%",
            (probs.high_risk * 100.0).round() as i64
        ));
        prompt.push_str(&format!(
            "\n- Probability of Appropriate Behavior: {}%",
            (probs.low_risk * 100.0).round() as i64
        ));
    }

    if let Some(w) = &p.weather_used {
        let show = |v: Option<f64>| v.map_or_else(|| "N/A".to_string(), |v| v.to_string());
        prompt.push_str(&format!(
            "\n- Environmental Context: {}°C, {}% humidity, {}",
            show(w.temperature),
            show(w.humidity),
            w.condition.as_deref().unwrap_or("Unknown")
        ));
    }

    prompt.push_str("\n\nThe full behavioral analysis with risk factors, protective factors, actionable recommendations, and monitoring priorities is available in the conversation history. When the user refers to specific numbered items (like \"recommendation 4\" or \"risk factor 2\"), refer to the EXACT numbering from the analysis provided earlier in the conversation.");
    prompt.push_str("\n\nWhen responding:\n");
    let rules: Vec<String> = CONTEXT_RESPONSE_RULES.iter().map(|r| format!("- {}", r)).collect();
    prompt.push_str(&rules.join("\n"));
    prompt
}

/// Opening turns of a conversation: the analysis (when there is one) and the welcome.
pub fn seed_history(prediction: Option<&PredictionResult>) -> Vec<ChatMessage> {
    let analysis = prediction.map(|p| p.analysis_text().trim()).filter(|a| !a.is_empty());
    match analysis {
        Some(text) => vec![
            ChatMessage::new(ChatRole::User, format!("Behavioral prediction analysis:\n\n{}", text)),
            ChatMessage::new(ChatRole::Assistant, WELCOME_WITH_CONTEXT),
        ],
        None if prediction.is_some() => vec![ChatMessage::new(ChatRole::Assistant, WELCOME_WITH_CONTEXT)],
        None => vec![ChatMessage::new(ChatRole::Assistant, WELCOME)],
    }
}

/// Text to show for a model reply; a blank reply gets a stock answer.
pub fn displayed_reply(reply: String) -> String {
    if reply.trim().is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        reply
    }
}

/// Full message list for one user turn.
pub fn conversation(
    prediction: Option<&PredictionResult>,
    history: &[ChatMessage],
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(ChatRole::System, context_system_prompt(prediction))];
    messages.extend_from_slice(history);
    messages.push(ChatMessage::new(ChatRole::User, user_message.trim()));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Probabilities, WeatherUsed};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(url: &str, key: Option<&str>) -> ChatClient {
        ChatClient::new(url, key.map(String::from), "claude-test", 256)
    }

    fn prediction() -> PredictionResult {
        PredictionResult {
            prediction: Some(1),
            confidence: Some(0.92),
            probabilities: Some(Probabilities { low_risk: 0.08, high_risk: 0.92 }),
            weather_used: Some(WeatherUsed {
                temperature: Some(21.5),
                humidity: Some(60.0),
                condition: Some("Rain".into()),
                type_numeric: Some(2),
            }),
            analysis: Some("KEY RISK FACTORS:\n1. Hunger".into()),
            ..Default::default()
        }
    }

    #[test]
    fn empty_messages_rejected() {
        let err = client("http://unused.invalid", Some("k")).build_request(&[]).unwrap_err();
        assert_eq!(err.to_string(), "Missing \"messages\" array in request body.");
    }

    #[test]
    fn system_messages_become_the_prompt() {
        let messages = vec![
            ChatMessage::new(ChatRole::System, "custom prompt"),
            ChatMessage::new(ChatRole::Assistant, "hello"),
            ChatMessage::new(ChatRole::User, "what now?"),
        ];
        let req = client("http://unused.invalid", None).build_request(&messages).unwrap();
        assert_eq!(req.system, "custom prompt");
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[1].role, ChatRole::User);
        assert_eq!(req.messages[1].content[0].text, "what now?");
    }

    #[test]
    fn default_prompt_without_system_message() {
        let req = client("http://unused.invalid", None)
            .build_request(&[ChatMessage::new(ChatRole::User, "hi")])
            .unwrap();
        assert!(req.system.starts_with("You are a Board Certified Behavior Analyst"));
        assert_eq!(req.max_tokens, 256);
    }

    #[test]
    fn context_prompt_includes_prediction() {
        let prompt = context_system_prompt(Some(&prediction()));
        assert!(prompt.contains("- Risk Level: High Risk (Confidence: 92%)"));
        assert!(prompt.contains("- Probability of Challenging Behavior: 92%"));
        assert!(prompt.contains("- Environmental Context: 21.5°C, 60% humidity, Rain"));
        assert!(prompt.ends_with("- Be specific about timing, frequency, and implementation details"));

        let plain = context_system_prompt(None);
        assert!(!plain.contains("Risk Level"));
    }

    #[test]
    fn seed_history_carries_analysis() {
        let seeded = seed_history(Some(&prediction()));
        assert_eq!(seeded.len(), 2);
        assert_eq!(seeded[0].role, ChatRole::User);
        assert!(seeded[0].content.ends_with("1. Hunger"));
        assert_eq!(seed_history(None), vec![ChatMessage::new(ChatRole::Assistant, WELCOME)]);
    }

    #[test]
    fn conversation_order() {
        let p = prediction();
        let msgs = conversation(Some(&p), &seed_history(Some(&p)), "  recommendation 1? ");
        assert_eq!(msgs.first().unwrap().role, ChatRole::System);
        assert_eq!(msgs.last().unwrap(), &ChatMessage::new(ChatRole::User, "recommendation 1?"));
        assert_eq!(msgs.len(), 4);
    }

    #[test]
    fn blank_reply_gets_stock_answer() {
        assert_eq!(displayed_reply(String::new()), EMPTY_REPLY);
        assert_eq!(displayed_reply("  \n".into()), EMPTY_REPLY);
        assert_eq!(displayed_reply("Offer a first/then board.".into()), "Offer a first/then board.");
    }

    #[tokio::test]
    async fn missing_key_after_validation() {
        let c = client("http://unused.invalid", None);
        assert!(matches!(c.reply(&[]).await, Err(AppError::InvalidInput(_))));
        assert!(matches!(
            c.reply(&[ChatMessage::new(ChatRole::User, "hi")]).await,
            Err(AppError::MissingConfig("ANTHROPIC_API_KEY"))
        ));
    }

    #[tokio::test]
    async fn reply_text_from_first_content_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-test",
                "messages": [{ "role": "user", "content": [{ "type": "text", "text": "hi" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{ "type": "text", "text": "Use a first/then board." }]
            })))
            .mount(&server)
            .await;

        let c = client(&format!("{}/v1/messages", server.uri()), Some("sk-test"));
        let reply = c.reply(&[ChatMessage::new(ChatRole::User, "hi")]).await.unwrap();
        assert_eq!(reply, "Use a first/then board.");
    }

    #[tokio::test]
    async fn upstream_error_keeps_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .mount(&server)
            .await;

        let c = client(&server.uri(), Some("bad"));
        match c.reply(&[ChatMessage::new(ChatRole::User, "hi")]).await {
            Err(AppError::Upstream { status: 401, body, .. }) => assert_eq!(body, "invalid x-api-key"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
