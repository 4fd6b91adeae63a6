use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which body of work a practice session covers.
///
/// Drill sessions are keyed by calendar date; segment sessions by their
/// position in the course (cycle, day, part).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionKey {
    Daily { date: NaiveDate },
    Part { cycle: u32, day: u32, part: u32 },
}

impl SessionKey {
    #[must_use]
    pub fn daily(date: NaiveDate) -> Self {
        Self::Daily { date }
    }

    #[must_use]
    pub fn part(cycle: u32, day: u32, part: u32) -> Self {
        Self::Part { cycle, day, part }
    }

    /// Returns the opaque identifier used as the durable store key.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        SessionId(self.to_string())
    }
}

/// Opaque durable-store key for a session.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the identifier back into the key it was derived from.
    ///
    /// # Errors
    ///
    /// Returns `ParseIdError` if the identifier was not produced by `SessionKey::session_id`.
    pub fn key(&self) -> Result<SessionKey, ParseIdError> {
        self.0.parse()
    }
}

impl From<SessionKey> for SessionId {
    fn from(key: SessionKey) -> Self {
        key.session_id()
    }
}

/// Reference to captured bytes held by the media collaborator.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadRef(String);

impl PayloadRef {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mints a fresh reference for a newly captured payload.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("blob-{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Debug for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadRef({})", self.0)
    }
}

// ─── Display Implementations ───────────────────────────────────────────────────

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Daily { date } => write!(f, "daily-{}", date.format("%Y-%m-%d")),
            SessionKey::Part { cycle, day, part } => write!(f, "part-{cycle}-{day}-{part}"),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PayloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── FromStr Implementations ───────────────────────────────────────────────────

/// Error type for parsing an identifier from a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

impl FromStr for SessionKey {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseIdError {
            kind: "SessionKey".to_string(),
        };

        if let Some(date) = s.strip_prefix("daily-") {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| err())?;
            return Ok(SessionKey::daily(date));
        }

        let rest = s.strip_prefix("part-").ok_or_else(err)?;
        let mut parts = rest.split('-').map(str::parse::<u32>);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(cycle)), Some(Ok(day)), Some(Ok(part)), None) => {
                Ok(SessionKey::part(cycle, day, part))
            }
            _ => Err(err()),
        }
    }
}

impl FromStr for SessionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SessionKey>()
            .map(|key| key.session_id())
            .map_err(|_| ParseIdError {
                kind: "SessionId".to_string(),
            })
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
