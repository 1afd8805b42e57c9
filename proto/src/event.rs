use serde_json::Value;

use crate::resource::ResourceKind;

/// What happened to a registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Set,
    Delete,
}

/// A normalized registry-side mutation as produced by a registry adapter.
///
/// `Set` carries the previous image when the backend knows it (`None` for a
/// fresh create or a backend without history); `Delete` carries the previous
/// image when one was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub kind: ResourceKind,
    pub id: String,
    pub pre: Option<Value>,
    pub post: Option<Value>,
}

impl ChangeEvent {
    pub fn set(kind: ResourceKind, id: impl Into<String>, pre: Option<Value>, post: Value) -> Self {
        ChangeEvent { action: ChangeAction::Set, kind, id: id.into(), pre, post: Some(post) }
    }

    pub fn delete(kind: ResourceKind, id: impl Into<String>, pre: Option<Value>) -> Self {
        ChangeEvent { action: ChangeAction::Delete, kind, id: id.into(), pre, post: None }
    }

    /// A `set` whose images are structurally identical changes nothing worth
    /// telling anyone about.
    pub fn is_noop(&self) -> bool {
        self.action == ChangeAction::Set && self.pre == self.post
    }
}
