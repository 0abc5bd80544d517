use crate::chrono::{DateTime, Utc};
use crate::entity::EntityRef;

/// A per-field do-not-overwrite marker set by the operator. Presence
/// forbids any provider-sourced write to `(entity, field)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldLock {
    pub entity: EntityRef,
    pub field: String,
    pub locked_at: DateTime<Utc>,
}

impl FieldLock {
    pub fn new(entity: EntityRef, field: impl Into<String>) -> Self {
        Self {
            entity,
            field: field.into(),
            locked_at: Utc::now(),
        }
    }
}
