use serde::{Deserialize, Serialize};

/// Score assigned when the analysis collaborator is unavailable.
pub const FALLBACK_SCORE: u8 = 50;

/// Where an analysis result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    AiGenerated,
    FallbackTemplate,
}

impl Provenance {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::AiGenerated => "ai_generated",
            Provenance::FallbackTemplate => "fallback_template",
        }
    }
}

/// Scored assessment of a unit's responses.
///
/// Everything except `is_relevant` is opaque to the controller; it is kept
/// for display and persistence only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub is_relevant: bool,
    pub score: u8,
    pub coverage_percent: u8,
    pub strengths: Vec<String>,
    pub concepts: Vec<String>,
    pub penalties: Vec<String>,
    pub feedback: String,
    pub provenance: Provenance,
}

impl AnalysisResult {
    /// Neutral result substituted when the collaborator call fails, so a
    /// backend outage never blocks the session.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            is_relevant: true,
            score: FALLBACK_SCORE,
            coverage_percent: FALLBACK_SCORE,
            strengths: Vec::new(),
            concepts: Vec::new(),
            penalties: Vec::new(),
            feedback: "Automatic analysis is unavailable right now. Your answer was saved \
                       and a neutral score was recorded."
                .into(),
            provenance: Provenance::FallbackTemplate,
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.provenance == Provenance::FallbackTemplate
    }
}
