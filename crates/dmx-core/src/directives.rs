//! # Directives
//!
//! Messages describing what an operation changed, for fan-out to connected
//! clients. They accumulate in the operation's [`OpContext`](crate::context::OpContext)
//! and are flushed once when the operation ends.

use serde::{Deserialize, Serialize};

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectiveKind {
    UpdateTopic,
    DeleteTopic,
    UpdateAssoc,
    DeleteAssoc,
    UpdateTopicType,
    DeleteTopicType,
    UpdateAssocType,
    DeleteAssocType,
}

/// One change notification: `{"type": ..., "arg": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    #[serde(rename = "type")]
    pub kind: DirectiveKind,
    pub arg: serde_json::Value,
}

impl Directive {
    #[must_use]
    pub fn new(kind: DirectiveKind, arg: serde_json::Value) -> Self {
        Self { kind, arg }
    }
}

/// Directives of one operation, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directives {
    items: Vec<Directive>,
}

impl Directives {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: DirectiveKind, arg: serde_json::Value) {
        tracing::trace!(?kind, "directive added");
        self.items.push(Directive::new(kind, arg));
    }

    /// Take all directives, leaving the list empty.
    pub fn flush(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.items)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.items.iter()
    }
}

/// Wire form of a directive batch: a JSON array.
pub fn to_json(directives: &[Directive]) -> Result<String, crate::DmxError> {
    serde_json::to_string(directives).map_err(|e| crate::DmxError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_empties_the_list() {
        let mut directives = Directives::new();
        directives.add(DirectiveKind::UpdateTopic, serde_json::json!({"id": 1}));
        directives.add(DirectiveKind::DeleteAssoc, serde_json::json!({"id": 2}));
        assert_eq!(directives.len(), 2);

        let flushed = directives.flush();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].kind, DirectiveKind::UpdateTopic);
        assert!(directives.is_empty());
        assert!(directives.flush().is_empty());
    }

    #[test]
    fn wire_names_distinguish_type_kinds() {
        let batch = vec![
            Directive::new(DirectiveKind::DeleteTopicType, serde_json::json!("dmx.notes.note")),
            Directive::new(DirectiveKind::DeleteAssocType, serde_json::json!("dmx.notes.link")),
        ];
        let json = to_json(&batch).expect("json");
        assert_eq!(
            json,
            r#"[{"type":"DELETE_TOPIC_TYPE","arg":"dmx.notes.note"},{"type":"DELETE_ASSOC_TYPE","arg":"dmx.notes.link"}]"#
        );
    }
}
