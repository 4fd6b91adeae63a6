use thiserror::Error;
use url::Url;

/// Connection settings for the external analysis service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisSettings {
    api_key: String,
    base_url: String,
    model: String,
    timeout_secs: u32,
}

#[derive(Clone, Debug, Default)]
pub struct AnalysisSettingsDraft {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u32>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnalysisSettingsError {
    #[error("analysis API key is missing")]
    MissingApiKey,
    #[error("invalid base URL")]
    InvalidBaseUrl,
    #[error("timeout must be > 0")]
    InvalidTimeout,
}

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u32 = 30;

impl AnalysisSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalize the draft.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisSettingsError` if the key is blank, the base URL does not
    /// parse, or the timeout is zero.
    pub fn validate(self) -> Result<AnalysisSettings, AnalysisSettingsError> {
        let api_key = normalize_optional(self.api_key).ok_or(AnalysisSettingsError::MissingApiKey)?;
        let base_url =
            normalize_optional(self.base_url).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = normalize_optional(self.model).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        if Url::parse(&base_url).is_err() {
            return Err(AnalysisSettingsError::InvalidBaseUrl);
        }
        if timeout_secs == 0 {
            return Err(AnalysisSettingsError::InvalidTimeout);
        }

        Ok(AnalysisSettings {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout_secs,
        })
    }
}

impl AnalysisSettings {
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn timeout_secs(&self) -> u32 {
        self.timeout_secs
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_rejected() {
        let draft = AnalysisSettingsDraft {
            api_key: Some("   ".into()),
            ..AnalysisSettingsDraft::default()
        };
        assert_eq!(draft.validate(), Err(AnalysisSettingsError::MissingApiKey));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let settings = AnalysisSettingsDraft {
            api_key: Some("sk-test".into()),
            ..AnalysisSettingsDraft::default()
        }
        .validate()
        .unwrap();
        assert_eq!(settings.base_url(), DEFAULT_BASE_URL);
        assert_eq!(settings.model(), DEFAULT_MODEL);
        assert_eq!(settings.timeout_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn invalid_url_is_rejected() {
        let draft = AnalysisSettingsDraft {
            api_key: Some("sk-test".into()),
            base_url: Some("not a url".into()),
            ..AnalysisSettingsDraft::default()
        };
        assert_eq!(draft.validate(), Err(AnalysisSettingsError::InvalidBaseUrl));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let settings = AnalysisSettingsDraft {
            api_key: Some("sk-test".into()),
            base_url: Some("https://analysis.example.com/v1/".into()),
            ..AnalysisSettingsDraft::default()
        }
        .validate()
        .unwrap();
        assert_eq!(settings.base_url(), "https://analysis.example.com/v1");
    }
}
