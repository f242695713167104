use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum interface a caller-supplied metadata record must satisfy: at least a
/// correlation/account identifier.
///
/// A store is configured with exactly one `Metadata` type, fixed by its `Aggregate::Metadata`
/// associated type; there is no per-event-class override. A produced metadata record that fails
/// to serialize (e.g. a non-finite float) aborts the `sink` transaction with
/// [`crate::error::StoreError::EventMetadataSerialization`] before any row is written.
pub trait Metadata: Serialize + DeserializeOwned + Send + Sync + Clone + PartialEq {
    /// The correlation/account identifier this metadata record carries.
    fn correlation_id(&self) -> Uuid;
}

/// Default metadata type. Most aggregates never need anything richer than this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StandardMetadata {
    pub correlation_id: Uuid,
    pub user_id: Option<Uuid>,
}

impl StandardMetadata {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            user_id: None,
        }
    }

    pub fn with_user(correlation_id: Uuid, user_id: Uuid) -> Self {
        Self {
            correlation_id,
            user_id: Some(user_id),
        }
    }
}

impl Metadata for StandardMetadata {
    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Metadata carrying nothing but a correlation id, for aggregates that need no richer audit
/// trail than that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmptyMetadata {
    pub correlation_id: Uuid,
}

impl Metadata for EmptyMetadata {
    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
