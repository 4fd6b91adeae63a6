use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::PayloadRef;

//
// ─── SLOTS ─────────────────────────────────────────────────────────────────────
//

/// Named place a unit keeps one captured response in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSlot {
    Before,
    After,
    Single,
}

impl ResponseSlot {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseSlot::Before => "before",
            ResponseSlot::After => "after",
            ResponseSlot::Single => "single",
        }
    }
}

impl fmt::Display for ResponseSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── CAPTURED RESPONSES ────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Audio,
    Image,
    Text,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResponseKind::Audio => "audio",
            ResponseKind::Image => "image",
            ResponseKind::Text => "text",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    Audio {
        payload: PayloadRef,
        duration_secs: u32,
    },
    Images {
        payloads: Vec<PayloadRef>,
    },
    Text {
        text: String,
    },
}

/// Descriptor of a response the student produced. The bytes themselves live
/// with the media collaborator; only references are kept here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    body: ResponseBody,
    captured_at: DateTime<Utc>,
}

impl CapturedResponse {
    #[must_use]
    pub fn new(body: ResponseBody, captured_at: DateTime<Utc>) -> Self {
        Self { body, captured_at }
    }

    #[must_use]
    pub fn audio(payload: PayloadRef, duration_secs: u32, captured_at: DateTime<Utc>) -> Self {
        Self::new(
            ResponseBody::Audio {
                payload,
                duration_secs,
            },
            captured_at,
        )
    }

    #[must_use]
    pub fn images(payloads: Vec<PayloadRef>, captured_at: DateTime<Utc>) -> Self {
        Self::new(ResponseBody::Images { payloads }, captured_at)
    }

    #[must_use]
    pub fn text(text: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self::new(ResponseBody::Text { text: text.into() }, captured_at)
    }

    #[must_use]
    pub fn kind(&self) -> ResponseKind {
        match self.body {
            ResponseBody::Audio { .. } => ResponseKind::Audio,
            ResponseBody::Images { .. } => ResponseKind::Image,
            ResponseBody::Text { .. } => ResponseKind::Text,
        }
    }

    #[must_use]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

//
// ─── MINIMUM-CONTENT POLICY ────────────────────────────────────────────────────
//

/// Why a gated step refused to advance. The `Display` text is meant for the student.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateViolation {
    #[error("submit your {slot} response before continuing")]
    Missing { slot: ResponseSlot },

    #[error("record at least {} minutes (recorded {got_secs}s)", .min_secs / 60)]
    AudioTooShort { min_secs: u32, got_secs: u32 },

    #[error("upload at least {min} image(s)")]
    TooFewImages { min: u32, got: u32 },

    #[error("write at least {min} characters")]
    TextTooShort { min: u32, got: u32 },

    #[error("a {expected} response is required, got {got}")]
    WrongKind {
        expected: ResponseKind,
        got: ResponseKind,
    },
}

/// Smallest response a gated step accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "min", rename_all = "snake_case")]
pub enum MinimumContentPolicy {
    AudioSeconds(u32),
    Images(u32),
    TextChars(u32),
    Any,
}

impl MinimumContentPolicy {
    /// Checks the response held in `slot` against this policy.
    ///
    /// # Errors
    ///
    /// Returns the `GateViolation` to surface when the response is missing or too small.
    pub fn check(
        &self,
        slot: ResponseSlot,
        response: Option<&CapturedResponse>,
    ) -> Result<(), GateViolation> {
        let Some(response) = response else {
            return Err(GateViolation::Missing { slot });
        };

        match (*self, response.body()) {
            (MinimumContentPolicy::Any, _) => Ok(()),
            (MinimumContentPolicy::AudioSeconds(min), ResponseBody::Audio { duration_secs, .. }) => {
                if *duration_secs >= min {
                    Ok(())
                } else {
                    Err(GateViolation::AudioTooShort {
                        min_secs: min,
                        got_secs: *duration_secs,
                    })
                }
            }
            (MinimumContentPolicy::Images(min), ResponseBody::Images { payloads }) => {
                let got = u32::try_from(payloads.len()).unwrap_or(u32::MAX);
                if got >= min.max(1) {
                    Ok(())
                } else {
                    Err(GateViolation::TooFewImages { min: min.max(1), got })
                }
            }
            (MinimumContentPolicy::TextChars(min), ResponseBody::Text { text }) => {
                let got = u32::try_from(text.trim().chars().count()).unwrap_or(u32::MAX);
                if got >= min {
                    Ok(())
                } else {
                    Err(GateViolation::TextTooShort { min, got })
                }
            }
            (policy, _) => Err(GateViolation::WrongKind {
                expected: policy.expected_kind().unwrap_or(ResponseKind::Text),
                got: response.kind(),
            }),
        }
    }

    fn expected_kind(self) -> Option<ResponseKind> {
        match self {
            MinimumContentPolicy::AudioSeconds(_) => Some(ResponseKind::Audio),
            MinimumContentPolicy::Images(_) => Some(ResponseKind::Image),
            MinimumContentPolicy::TextChars(_) => Some(ResponseKind::Text),
            MinimumContentPolicy::Any => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn audio(secs: u32) -> CapturedResponse {
        CapturedResponse::audio(PayloadRef::new("a"), secs, fixed_now())
    }

    #[test]
    fn audio_policy_rejects_short_recordings() {
        let policy = MinimumContentPolicy::AudioSeconds(300);
        let err = policy
            .check(ResponseSlot::Before, Some(&audio(290)))
            .unwrap_err();
        assert_eq!(
            err,
            GateViolation::AudioTooShort {
                min_secs: 300,
                got_secs: 290
            }
        );
        assert_eq!(err.to_string(), "record at least 5 minutes (recorded 290s)");
        assert!(policy.check(ResponseSlot::Before, Some(&audio(300))).is_ok());
    }

    #[test]
    fn image_policy_needs_at_least_one_image() {
        let policy = MinimumContentPolicy::Images(0);
        let empty = CapturedResponse::images(Vec::new(), fixed_now());
        let err = policy.check(ResponseSlot::After, Some(&empty)).unwrap_err();
        assert_eq!(err.to_string(), "upload at least 1 image(s)");

        let one = CapturedResponse::images(vec![PayloadRef::new("img")], fixed_now());
        assert!(policy.check(ResponseSlot::After, Some(&one)).is_ok());
    }

    #[test]
    fn missing_response_is_reported_per_slot() {
        let err = MinimumContentPolicy::Any
            .check(ResponseSlot::Single, None)
            .unwrap_err();
        assert_eq!(err, GateViolation::Missing {
            slot: ResponseSlot::Single
        });
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let policy = MinimumContentPolicy::AudioSeconds(300);
        let text = CapturedResponse::text("long enough answer", fixed_now());
        let err = policy.check(ResponseSlot::Single, Some(&text)).unwrap_err();
        assert!(matches!(err, GateViolation::WrongKind { .. }));
    }

    #[test]
    fn text_policy_ignores_surrounding_whitespace() {
        let policy = MinimumContentPolicy::TextChars(5);
        let padded = CapturedResponse::text("  abc   ", fixed_now());
        assert!(policy.check(ResponseSlot::Single, Some(&padded)).is_err());
    }
}
