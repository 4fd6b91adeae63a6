use async_trait::async_trait;
use recall_core::model::{SessionKey, UnitContent};

use crate::error::ContentError;

/// Supplies the read-only payload for each unit, once per activation.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns `ContentError` if the unit cannot be supplied; the controller
    /// substitutes a placeholder.
    async fn unit_content(
        &self,
        key: &SessionKey,
        unit_index: usize,
    ) -> Result<UnitContent, ContentError>;
}

/// Serves a fixed list of units regardless of the session key.
#[derive(Clone, Debug, Default)]
pub struct StaticContentProvider {
    units: Vec<UnitContent>,
}

impl StaticContentProvider {
    #[must_use]
    pub fn new(units: Vec<UnitContent>) -> Self {
        Self { units }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[async_trait]
impl ContentProvider for StaticContentProvider {
    async fn unit_content(
        &self,
        _key: &SessionKey,
        unit_index: usize,
    ) -> Result<UnitContent, ContentError> {
        self.units
            .get(unit_index)
            .cloned()
            .ok_or(ContentError::Unavailable { unit: unit_index })
    }
}
