use std::collections::BTreeMap;
use std::env;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use recall_core::model::{
    AnalysisResult, AnalysisSettings, AnalysisSettingsDraft, CapturedResponse, Provenance,
    ResponseBody, ResponseSlot, SessionId, Unit,
};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Everything the analysis collaborator sees for one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub session_id: SessionId,
    pub unit_index: usize,
    pub prompt: String,
    pub key_points: Vec<String>,
    pub responses: BTreeMap<ResponseSlot, CapturedResponse>,
}

impl AnalysisRequest {
    #[must_use]
    pub fn for_unit(session_id: &SessionId, unit: &Unit) -> Self {
        let (prompt, key_points) = unit
            .content()
            .map(|c| (c.prompt.clone(), c.key_points.clone()))
            .unwrap_or_default();
        Self {
            session_id: session_id.clone(),
            unit_index: unit.index(),
            prompt,
            key_points,
            responses: unit.responses().clone(),
        }
    }
}

/// Scores a unit's captured responses against its reference key points.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// # Errors
    ///
    /// Returns `AnalysisError` on any failure; the controller falls back to a
    /// neutral result rather than blocking the session.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;
}

/// Reads analysis settings from `RECALL_AI_*` environment variables.
pub struct AnalysisConfig;

impl AnalysisConfig {
    /// `None` when no API key is set or the settings are invalid.
    #[must_use]
    pub fn from_env() -> Option<AnalysisSettings> {
        let draft = AnalysisSettingsDraft {
            api_key: env::var("RECALL_AI_API_KEY").ok(),
            base_url: env::var("RECALL_AI_BASE_URL").ok(),
            model: env::var("RECALL_AI_MODEL").ok(),
            timeout_secs: None,
        };
        draft.api_key.as_ref()?;
        match draft.validate() {
            Ok(settings) => Some(settings),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring invalid analysis settings");
                None
            }
        }
    }
}

/// Chat-completions client that asks the model for a JSON verdict.
#[derive(Clone)]
pub struct HttpAnalysisService {
    client: Client,
    settings: Option<AnalysisSettings>,
}

impl HttpAnalysisService {
    /// # Errors
    ///
    /// Returns `AnalysisError::Http` if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, AnalysisError> {
        Self::new(AnalysisConfig::from_env())
    }

    /// # Errors
    ///
    /// Returns `AnalysisError::Http` if the HTTP client cannot be built.
    pub fn new(settings: Option<AnalysisSettings>) -> Result<Self, AnalysisError> {
        let timeout = settings
            .as_ref()
            .map_or(30, AnalysisSettings::timeout_secs);
        let client = Client::builder()
            .timeout(Duration::from_secs(u64::from(timeout)))
            .build()?;
        Ok(Self { client, settings })
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.settings.is_some()
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let settings = self.settings.as_ref().ok_or(AnalysisError::Disabled)?;

        let url = format!("{}/chat/completions", settings.base_url());
        let payload = ChatRequest {
            model: settings.model().to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: render_request(request),
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(settings.api_key())
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnalysisError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AnalysisError::EmptyResponse)?;

        parse_verdict(&content)
    }
}

const SYSTEM_PROMPT: &str = "You grade a student's spoken or written recall of study material. \
Reply with a single JSON object with the fields is_relevant (bool), score (0-100), \
coverage_percent (0-100), strengths, concepts, penalties (arrays of strings) and feedback (string).";

fn render_request(request: &AnalysisRequest) -> String {
    let mut out = format!("Prompt: {}\n", request.prompt);
    if !request.key_points.is_empty() {
        out.push_str("Key points:\n");
        for point in &request.key_points {
            let _ = writeln!(out, "- {point}");
        }
    }
    for (slot, response) in &request.responses {
        let _ = match response.body() {
            ResponseBody::Text { text } => writeln!(out, "{slot} response (text): {text}"),
            ResponseBody::Audio {
                payload,
                duration_secs,
            } => writeln!(
                out,
                "{slot} response (audio, {duration_secs}s): {payload}"
            ),
            ResponseBody::Images { payloads } => {
                let refs: Vec<&str> = payloads.iter().map(|p| p.as_str()).collect();
                writeln!(out, "{slot} response (images): {}", refs.join(", "))
            }
        };
    }
    out
}

fn parse_verdict(content: &str) -> Result<AnalysisResult, AnalysisError> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let verdict: Verdict =
        serde_json::from_str(trimmed).map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    Ok(AnalysisResult {
        is_relevant: verdict.is_relevant,
        score: verdict.score.min(100),
        coverage_percent: verdict.coverage_percent.min(100),
        strengths: verdict.strengths,
        concepts: verdict.concepts,
        penalties: verdict.penalties,
        feedback: verdict.feedback,
        provenance: Provenance::AiGenerated,
    })
}

#[derive(Debug, Deserialize)]
struct Verdict {
    is_relevant: bool,
    score: u8,
    #[serde(default)]
    coverage_percent: u8,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    concepts: Vec<String>,
    #[serde(default)]
    penalties: Vec<String>,
    #[serde(default)]
    feedback: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::model::{PayloadRef, SessionKey};
    use recall_core::time::fixed_now;

    #[test]
    fn verdict_parses_fenced_json() {
        let result = parse_verdict(
            "```json\n{\"is_relevant\": false, \"score\": 12, \"feedback\": \"off topic\"}\n```",
        )
        .unwrap();
        assert!(!result.is_relevant);
        assert_eq!(result.score, 12);
        assert_eq!(result.provenance, Provenance::AiGenerated);
        assert!(result.strengths.is_empty());
    }

    #[test]
    fn malformed_verdict_is_an_error() {
        assert!(matches!(
            parse_verdict("the answer looks fine"),
            Err(AnalysisError::Malformed(_))
        ));
    }

    #[test]
    fn request_rendering_lists_every_slot() {
        let mut responses = BTreeMap::new();
        responses.insert(
            ResponseSlot::Before,
            CapturedResponse::audio(PayloadRef::new("blob-a"), 310, fixed_now()),
        );
        responses.insert(
            ResponseSlot::After,
            CapturedResponse::text("mitochondria make ATP", fixed_now()),
        );
        let request = AnalysisRequest {
            session_id: SessionKey::part(1, 1, 1).session_id(),
            unit_index: 0,
            prompt: "What do mitochondria do?".into(),
            key_points: vec!["ATP".into()],
            responses,
        };

        let text = render_request(&request);
        assert!(text.contains("- ATP"));
        assert!(text.contains("(audio, 310s): blob-a"));
        assert!(text.contains("(text): mitochondria make ATP"));
    }

    #[tokio::test]
    async fn disabled_service_reports_disabled() {
        let service = HttpAnalysisService::new(None).unwrap();
        assert!(!service.enabled());
        let request = AnalysisRequest {
            session_id: SessionKey::part(1, 1, 1).session_id(),
            unit_index: 0,
            prompt: String::new(),
            key_points: Vec::new(),
            responses: BTreeMap::new(),
        };
        assert!(matches!(
            service.analyze(&request).await,
            Err(AnalysisError::Disabled)
        ));
    }
}
