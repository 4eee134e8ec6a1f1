//! Topics: typed nodes carrying a scalar value and optional child topics.

use super::{
    ChildTopics, ChildValue, Identifiable, ObjectFields, RelatedTopicModel, TopicReference,
    impl_object_traits,
};
use crate::storage::TopicRecord;
use crate::{DmxError, ObjectId, ObjectKind, SimpleValue};

/// A graph node: identity, type, scalar value and composite children.
///
/// Created transient (no id) by the constructors below; the id is assigned
/// when the core stores it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicModel {
    pub(crate) fields: ObjectFields,
}

impl_object_traits!(TopicModel, ObjectKind::Topic);

impl TopicModel {
    /// A transient topic of the given type with an empty value.
    #[must_use]
    pub fn new(type_uri: impl Into<String>) -> Self {
        Self {
            fields: ObjectFields::new(type_uri),
        }
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.fields.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<SimpleValue>) -> Self {
        self.fields.set_value(value.into());
        self
    }

    /// Set the child of a `one` CompDef.
    #[must_use]
    pub fn with_child(mut self, comp_def_uri: impl Into<String>, child: TopicModel) -> Self {
        self.fields
            .childs
            .set_one(comp_def_uri, Some(RelatedTopicModel::new(child)));
        self
    }

    /// Set the children of a `many` CompDef.
    #[must_use]
    pub fn with_children(
        mut self,
        comp_def_uri: impl Into<String>,
        children: impl IntoIterator<Item = TopicModel>,
    ) -> Self {
        let list = children.into_iter().map(RelatedTopicModel::new).collect();
        self.fields.childs.put(comp_def_uri, ChildValue::Many(list));
        self
    }

    /// Set the child of a `one` CompDef to an existing topic.
    #[must_use]
    pub fn with_child_ref(mut self, comp_def_uri: impl Into<String>, reference: TopicReference) -> Self {
        self.fields
            .childs
            .set_one(comp_def_uri, Some(RelatedTopicModel::reference(reference)));
        self
    }

    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.fields.id = Some(id);
    }

    pub(crate) fn set_uri_field(&mut self, uri: Option<String>) {
        self.fields.uri = uri;
    }

    pub(crate) fn set_type_uri_field(&mut self, type_uri: impl Into<String>) {
        self.fields.type_uri = type_uri.into();
    }

    /// Shortcut for the child topics.
    #[must_use]
    pub fn childs(&self) -> &ChildTopics {
        &self.fields.childs
    }

    /// Shortcut for the scalar value.
    #[must_use]
    pub fn value(&self) -> &SimpleValue {
        &self.fields.value
    }

    pub(crate) fn from_record(record: TopicRecord) -> Self {
        Self {
            fields: ObjectFields {
                id: Some(record.id),
                uri: record.uri,
                type_uri: record.type_uri,
                value: record.value,
                value_set: true,
                childs: ChildTopics::default(),
            },
        }
    }

    pub(crate) fn to_record(&self) -> Result<TopicRecord, DmxError> {
        Ok(TopicRecord {
            id: self.id()?,
            uri: self.fields.uri.clone(),
            type_uri: self.fields.type_uri.clone(),
            value: self.fields.value.clone(),
        })
    }

    /// Wire form: `{id, uri, typeUri, value, childs}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.fields.to_json())
    }

    /// Parse a topic from its wire form.
    ///
    /// `typeUri` may be omitted for child topics (it is derived from the
    /// CompDef when stored). Child values may be:
    /// - a scalar: a simple child topic with that value
    /// - an object: a (possibly composite) child topic
    /// - `"ref_id:<id>"` / `"ref_uri:<uri>"`: a reference to an existing topic
    /// - an array of the above: the children of a `many` CompDef
    pub fn from_json(json: &serde_json::Value) -> Result<Self, DmxError> {
        let obj = json.as_object().ok_or_else(|| {
            DmxError::SerializationError(format!("topic must be a JSON object, got {}", json))
        })?;

        let mut topic = Self::new(
            obj.get("typeUri")
                .and_then(|v| v.as_str())
                .unwrap_or_default(),
        );

        if let Some(id) = obj.get("id").and_then(|v| v.as_i64()).filter(|id| *id >= 0) {
            topic.fields.id = Some(ObjectId(id as u64));
        }
        if let Some(uri) = obj.get("uri").and_then(|v| v.as_str()).filter(|u| !u.is_empty()) {
            topic.fields.uri = Some(uri.to_string());
        }
        if let Some(value) = obj.get("value").filter(|v| !v.is_null()) {
            topic.fields.set_value(SimpleValue::from_json(value)?);
        }
        if let Some(childs) = obj.get("childs") {
            let childs = childs.as_object().ok_or_else(|| {
                DmxError::SerializationError("\"childs\" must be a JSON object".to_string())
            })?;
            for (comp_def_uri, value) in childs {
                let child = match value {
                    serde_json::Value::Array(items) => ChildValue::Many(
                        items
                            .iter()
                            .map(parse_child)
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                    other => ChildValue::One(Some(parse_child(other)?)),
                };
                topic.fields.childs.put(comp_def_uri.clone(), child);
            }
        }
        Ok(topic)
    }
}

fn parse_child(json: &serde_json::Value) -> Result<RelatedTopicModel, DmxError> {
    if let Some(text) = json.as_str()
        && let Some(reference) = TopicReference::parse(text)?
    {
        return Ok(RelatedTopicModel::reference(reference));
    }
    if json.is_object() {
        return TopicModel::from_json(json).map(RelatedTopicModel::new);
    }
    let value = SimpleValue::from_json(json)?;
    Ok(RelatedTopicModel::new(TopicModel::default().with_value(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_fields() {
        let topic = TopicModel::new("dmx.contacts.person")
            .with_uri("people.alice")
            .with_child("dmx.contacts.name", TopicModel::new("dmx.contacts.name").with_value("Alice"));

        assert_eq!(topic.uri(), Some("people.alice"));
        assert_eq!(topic.id_opt(), None);
        assert_eq!(
            topic.childs().string_value("dmx.contacts.name").as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn to_json_wire_shape() {
        let topic = TopicModel::new("dmx.notes.note").with_value("hello");
        let json = topic.to_json();
        assert_eq!(json["id"], -1);
        assert_eq!(json["uri"], serde_json::Value::Null);
        assert_eq!(json["typeUri"], "dmx.notes.note");
        assert_eq!(json["value"], "hello");
        assert!(json["childs"].as_object().is_some_and(|m| m.is_empty()));
    }

    #[test]
    fn from_json_parses_childs_and_references() {
        let json = json!({
            "typeUri": "dmx.contacts.person",
            "childs": {
                "dmx.contacts.name": "Alice",
                "dmx.contacts.phone": ["123", "456"],
                "dmx.contacts.city": "ref_uri:city.berlin",
                "dmx.contacts.address": { "childs": { "dmx.contacts.street": "Main St" } }
            }
        });
        let topic = TopicModel::from_json(&json).expect("parse");

        assert_eq!(topic.type_uri(), "dmx.contacts.person");
        let childs = topic.childs();
        assert_eq!(childs.string_value("dmx.contacts.name").as_deref(), Some("Alice"));
        assert_eq!(childs.get_many("dmx.contacts.phone").len(), 2);
        assert_eq!(
            childs
                .get_one("dmx.contacts.city")
                .and_then(|c| c.reference.clone()),
            Some(TopicReference::ByUri("city.berlin".to_string()))
        );
        let address = childs.get_one("dmx.contacts.address").expect("address");
        assert_eq!(
            address.topic.childs().string_value("dmx.contacts.street").as_deref(),
            Some("Main St")
        );
    }

    #[test]
    fn from_json_rejects_non_objects() {
        let err = TopicModel::from_json(&json!([1, 2])).expect_err("array");
        assert_eq!(err.kind(), crate::ErrorKind::SerializationFailure);
        let err = TopicModel::from_json(&json!({"typeUri": "x", "value": 0.5})).expect_err("float");
        assert_eq!(err.kind(), crate::ErrorKind::SerializationFailure);
    }
}
