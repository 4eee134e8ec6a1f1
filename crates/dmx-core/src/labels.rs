//! # Label Calculation
//!
//! The label of a composite is built from the children named by its type's
//! label configuration, in CompDef order. Each CompDef contributes the scalar
//! value of its child, or the values of a list child joined with `", "`.
//! Contributions are joined with `" "` only when both sides are non-empty.

use crate::constants::{LABEL_COMP_DEF_SEPARATOR, LABEL_LIST_SEPARATOR};
use crate::fetcher::ChildTopicsFetcher;
use crate::model::{ChildValue, HasChildTopics, HasCompDefs, RelatedTopicModel};
use crate::types::ResultExt;
use crate::DmxError;

/// Compute the label of `object` from its type's label configuration.
///
/// Label children that are not loaded yet are fetched (non-deep) into the
/// object. Returns `None` for an object of a simple type, whose value is its
/// own label.
pub fn calculate<O>(fetcher: &ChildTopicsFetcher<'_>, object: &mut O) -> Result<Option<String>, DmxError>
where
    O: HasChildTopics + ?Sized,
{
    let model = fetcher.types().get(object.type_uri())?;
    if model.is_simple() {
        return Ok(None);
    }
    let label_config = model.label_config();
    build_label(fetcher, object, model, &label_config)
        .map(Some)
        .with_context(|| {
            format!(
                "calculating label of {} with label config [{}]",
                object.describe(),
                label_config.join(", ")
            )
        })
}

fn build_label<O, T>(
    fetcher: &ChildTopicsFetcher<'_>,
    object: &mut O,
    model: &T,
    label_config: &[String],
) -> Result<String, DmxError>
where
    O: HasChildTopics + ?Sized,
    T: HasCompDefs + ?Sized,
{
    let mut contributions = Vec::with_capacity(label_config.len());
    for comp_def_uri in label_config {
        if !object.child_topics().is_loaded(comp_def_uri) {
            fetcher.fetch(object, model.comp_def(comp_def_uri)?, false)?;
        }
        contributions.push(contribution(object.child_topics().get(comp_def_uri))?);
    }
    Ok(join_contributions(contributions))
}

/// What one label CompDef contributes.
fn contribution(value: Option<&ChildValue>) -> Result<String, DmxError> {
    match value {
        None | Some(ChildValue::One(None)) => Ok(String::new()),
        Some(ChildValue::One(Some(child))) => scalar_of(child),
        Some(ChildValue::Many(children)) => Ok(children
            .iter()
            .map(scalar_of)
            .collect::<Result<Vec<_>, _>>()?
            .join(LABEL_LIST_SEPARATOR)),
    }
}

fn scalar_of(child: &RelatedTopicModel) -> Result<String, DmxError> {
    if let Some(reference) = &child.reference {
        return Err(DmxError::InvalidState(format!(
            "label child {} is an unresolved reference",
            reference
        )));
    }
    Ok(child.topic.value().to_string())
}

/// Join label contributions with `" "`, skipping empty ones.
pub fn join_contributions<I, S>(contributions: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut label = String::new();
    for part in contributions {
        let part = part.as_ref();
        if part.is_empty() {
            continue;
        }
        if !label.is_empty() {
            label.push_str(LABEL_COMP_DEF_SEPARATOR);
        }
        label.push_str(part);
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TopicModel, TopicReference};
    use crate::ObjectId;

    fn child(value: &str) -> RelatedTopicModel {
        RelatedTopicModel::new(TopicModel::new("dmx.contacts.phone").with_value(value))
    }

    #[test]
    fn name_and_phones() {
        let name = contribution(Some(&ChildValue::One(Some(child("Alice"))))).expect("name");
        let phones =
            contribution(Some(&ChildValue::Many(vec![child("123"), child("456")]))).expect("phones");
        assert_eq!(join_contributions([name, phones]), "Alice 123, 456");
    }

    #[test]
    fn absent_child_adds_no_separator() {
        let name = contribution(Some(&ChildValue::One(None))).expect("name");
        let phones =
            contribution(Some(&ChildValue::Many(vec![child("123"), child("456")]))).expect("phones");
        assert_eq!(join_contributions([name.as_str(), phones.as_str()]), "123, 456");
        assert_eq!(join_contributions(["", "a", "", "b", ""]), "a b");
        assert_eq!(contribution(None).expect("unloaded"), "");
    }

    #[test]
    fn unresolved_reference_fails() {
        let reference = RelatedTopicModel::reference(TopicReference::ById(ObjectId(9)));
        let err = contribution(Some(&ChildValue::One(Some(reference)))).expect_err("reference");
        assert_eq!(err.kind(), crate::ErrorKind::InvalidState);
    }
}
