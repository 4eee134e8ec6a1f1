//! # Model Tier Tests (T0-T4)
//!
//! End-to-end behavior of the core over a bootstrapped store.
//!
//! ## Tiers
//! - T0: Bootstrap and the meta model
//! - T1: Composite values, fetching and labels
//! - T2: Updates, deletes and directives
//! - T3: Read filtering and traversal
//! - T4: Schema mutation, transactions and persistence

use dmx_core::constants::{
    ASSOC_TYPE, ASSOCIATION, COMPOSITION, COMPOSITION_DEF, ROLE_CHILD, ROLE_DEFAULT, ROLE_PARENT,
    ROLE_PREDECESSOR, ROLE_SUCCESSOR, SEQUENCE, TOPIC_TYPE,
};
use dmx_core::{
    AssocModel, Cardinality, ChildValue, CompDefModel, CoreService, DataType, DirectiveKind,
    DmxError, ErrorKind, HasCompDefs, Identifiable, MemoryStore, ObjectId, PlayerModel, PlayerRef,
    RedbStore, RelatedFilter, SimpleValue, Storage, TopicModel, TopicReference, TypeKind, TypeModel,
};

const PERSON: &str = "dmx.contacts.person";
const NAME: &str = "dmx.contacts.name";
const PHONE: &str = "dmx.contacts.phone";
const NOTE: &str = "dmx.notes.note";

/// A service with a person type: a `one` name and a `many` phone list, both
/// in the label.
fn contacts<S: Storage>(storage: S) -> CoreService<S> {
    let mut core = CoreService::new(storage).expect("bootstrap");
    core.transact("install contacts", |core, ctx| {
        core.create_topic_type(ctx, TypeModel::topic_type(NAME, "Name", DataType::Value)?)?;
        core.create_topic_type(ctx, TypeModel::topic_type(PHONE, "Phone", DataType::Value)?)?;
        let mut person = TypeModel::topic_type(PERSON, "Person", DataType::Identity)?;
        person.add_comp_def(CompDefModel::new(PERSON, NAME, Cardinality::One).with_include_in_label(true))?;
        person.add_comp_def(CompDefModel::new(PERSON, PHONE, Cardinality::Many).with_include_in_label(true))?;
        core.create_topic_type(ctx, person)
    })
    .expect("install contacts");
    core
}

fn alice() -> TopicModel {
    TopicModel::new(PERSON)
        .with_child(NAME, TopicModel::new(NAME).with_value("Alice"))
        .with_children(
            PHONE,
            [
                TopicModel::new(PHONE).with_value("123"),
                TopicModel::new(PHONE).with_value("456"),
            ],
        )
}

fn create(core: &mut CoreService<MemoryStore>, topic: TopicModel) -> TopicModel {
    let (topic, _) = core
        .transact("create topic", |core, ctx| core.create_topic(ctx, topic))
        .expect("create");
    topic
}

// =============================================================================
// TIER T0: BOOTSTRAP
// =============================================================================

mod t0_bootstrap {
    use super::*;

    /// T0.1: The meta types are themselves typed by the meta type.
    #[test]
    fn meta_model_is_installed() {
        let core = CoreService::new(MemoryStore::new()).expect("bootstrap");
        let topic_type = core.get_topic_by_uri(TOPIC_TYPE, false).expect("topic type");
        assert_eq!(topic_type.type_uri(), dmx_core::constants::META_TYPE);
        assert!(core.get_assoc_type(COMPOSITION).is_ok());
        assert!(core.get_assoc_type(ASSOCIATION).is_ok());
        assert!(core.get_topic_by_uri(ROLE_DEFAULT, false).is_ok());
    }

    /// T0.2: Bootstrapping an already bootstrapped store changes nothing.
    #[test]
    fn bootstrap_is_idempotent() {
        let core = CoreService::new(MemoryStore::new()).expect("first");
        let topics = core.storage().topic_count();
        let assocs = core.storage().assoc_count();

        let storage = core.storage().clone();
        let again = CoreService::new(storage).expect("second");
        assert_eq!(again.storage().topic_count(), topics);
        assert_eq!(again.storage().assoc_count(), assocs);
    }

    /// T0.3: Asking for a topic type by an association type's URI fails.
    #[test]
    fn type_kind_is_checked() {
        let core = CoreService::new(MemoryStore::new()).expect("bootstrap");
        let err = core.get_topic_type(COMPOSITION).expect_err("assoc type");
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        let err = core.get_topic_type("dmx.nowhere").expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

// =============================================================================
// TIER T1: COMPOSITE VALUES
// =============================================================================

mod t1_composites {
    use super::*;

    /// T1.1: Creating a composite stores the tree and computes the label.
    #[test]
    fn label_from_children() {
        let mut core = contacts(MemoryStore::new());
        let person = create(&mut core, alice());

        assert_eq!(person.value(), &SimpleValue::from("Alice 123, 456"));
        let stored = core.get_topic(person.id().expect("id"), false).expect("stored");
        assert_eq!(stored.value().to_string(), "Alice 123, 456");
    }

    /// T1.2: A deep fetch yields the children in creation order with their
    /// relating associations.
    #[test]
    fn deep_fetch_restores_tree() {
        let mut core = contacts(MemoryStore::new());
        let id = create(&mut core, alice()).id().expect("id");

        let person = core.get_topic(id, true).expect("fetch");
        assert_eq!(person.childs().related_topics().count(), 3);
        let name = person.childs().get_one(NAME).expect("name");
        assert_eq!(name.topic.value().to_string(), "Alice");
        let relating = name.relating_assoc.as_ref().expect("relating");
        assert_eq!(relating.assoc.type_uri(), COMPOSITION);
        assert!(relating.assoc.role_by_type(ROLE_PARENT).is_some());

        let phones: Vec<String> = person
            .childs()
            .get_many(PHONE)
            .iter()
            .map(|p| p.topic.value().to_string())
            .collect();
        assert_eq!(phones, ["123", "456"]);
    }

    /// T1.3: Fetching twice yields the same tree.
    #[test]
    fn fetch_is_idempotent() {
        let mut core = contacts(MemoryStore::new());
        let id = create(&mut core, alice()).id().expect("id");
        let first = core.get_topic(id, true).expect("first");
        let second = core.get_topic(id, true).expect("second");
        assert_eq!(first, second);
    }

    /// T1.4: A missing `one` child is loaded as an empty entry.
    #[test]
    fn absent_one_child_is_loaded_empty() {
        let mut core = contacts(MemoryStore::new());
        let nameless = TopicModel::new(PERSON).with_children(PHONE, [TopicModel::new(PHONE).with_value("789")]);
        let id = create(&mut core, nameless).id().expect("id");

        let person = core.get_topic(id, true).expect("fetch");
        assert!(person.childs().is_loaded(NAME));
        assert!(matches!(person.childs().get(NAME), Some(ChildValue::One(None))));
        assert_eq!(person.value().to_string(), "789");
    }

    /// T1.5: Equal simple values of a `value` type share one topic.
    #[test]
    fn value_topics_are_deduplicated() {
        let mut core = contacts(MemoryStore::new());
        let a = create(&mut core, alice());
        let b = create(
            &mut core,
            TopicModel::new(PERSON).with_children(PHONE, [TopicModel::new(PHONE).with_value("123")]),
        );
        let phone_of = |topic: &TopicModel, i: usize| topic.childs().get_many(PHONE)[i].topic.id().expect("id");
        assert_eq!(phone_of(&a, 0), phone_of(&b, 0));
        assert_ne!(a.id().expect("a"), b.id().expect("b"));
    }

    /// T1.6: A child given as a reference relates the existing topic.
    #[test]
    fn child_reference_relates_existing_topic() {
        let mut core = contacts(MemoryStore::new());
        let name = create(&mut core, TopicModel::new(NAME).with_value("Carol"));
        let name_id = name.id().expect("id");
        let person = create(
            &mut core,
            TopicModel::new(PERSON).with_child_ref(NAME, TopicReference::ById(name_id)),
        );
        assert_eq!(person.value().to_string(), "Carol");
        assert_eq!(person.childs().get_one(NAME).expect("name").topic.id().expect("id"), name_id);
    }

    /// T1.7: Unknown CompDefs and too many `one` children are rejected.
    #[test]
    fn schema_is_enforced() {
        let mut core = contacts(MemoryStore::new());
        let stray = TopicModel::new(PERSON).with_child(NOTE, TopicModel::new(NOTE).with_value("x"));
        let err = core
            .transact("create", |core, ctx| core.create_topic(ctx, stray))
            .expect_err("unknown comp def");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let twins = TopicModel::new(PERSON).with_children(
            NAME,
            [TopicModel::new(NAME).with_value("A"), TopicModel::new(NAME).with_value("B")],
        );
        let err = core
            .transact("create", |core, ctx| core.create_topic(ctx, twins))
            .expect_err("two names");
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert_eq!(core.get_topics_by_type(NAME).expect("names").len(), 0);
    }

    /// T1.8: A fetch failure behind a URI lookup keeps its kind and context.
    #[test]
    fn uri_lookup_keeps_fetch_errors() {
        let mut core = contacts(MemoryStore::new());
        let person = create(&mut core, alice().with_uri("person.alice")).id().expect("person");
        let eve = create(&mut core, TopicModel::new(NAME).with_value("Eve")).id().expect("eve");
        let second_name = AssocModel::new(
            COMPOSITION,
            PlayerModel::topic(person, ROLE_PARENT),
            PlayerModel::topic(eve, ROLE_CHILD),
        );
        core.transact("relate", |core, ctx| core.create_assoc(ctx, second_name))
            .expect("relate");

        let err = core.get_topic_by_uri("person.alice", true).expect_err("two names");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(err.to_string().contains("person.alice"));
        assert!(err.to_string().contains(NAME));

        let err = core.get_topic_by_uri("person.nobody", true).expect_err("missing");
        assert!(matches!(err, DmxError::UriNotFound(_)));
    }
}

// =============================================================================
// TIER T2: UPDATES AND DELETES
// =============================================================================

mod t2_changes {
    use super::*;

    /// T2.1: Replacing a child relabels the parent and emits directives.
    #[test]
    fn update_replaces_child() {
        let mut core = contacts(MemoryStore::new());
        let id = create(&mut core, alice()).id().expect("id");

        let update = TopicModel::from_json(&serde_json::json!({
            "id": id.0,
            "typeUri": PERSON,
            "childs": { NAME: "Bob" }
        }))
        .expect("update json");

        let (person, directives) = core
            .transact("update", |core, ctx| core.update_topic(ctx, update))
            .expect("update");
        assert_eq!(person.value().to_string(), "Bob 123, 456");
        assert!(directives.iter().any(|d| d.kind == DirectiveKind::UpdateTopic));
        assert!(directives.iter().any(|d| d.kind == DirectiveKind::DeleteAssoc));

        // the old name topic is kept
        assert!(core.get_topic_by_value(NAME, &"Alice".into()).expect("lookup").is_some());
    }

    /// T2.2: Changing a shared child relabels every composite parent.
    #[test]
    fn label_change_propagates_upward() {
        let mut core = contacts(MemoryStore::new());
        let a = create(&mut core, alice()).id().expect("a");
        let phone = core
            .get_topic_by_value(PHONE, &"123".into())
            .expect("lookup")
            .expect("phone");

        let json = serde_json::json!({"id": phone.id().expect("id").0, "typeUri": PHONE, "value": "999"});
        let update = TopicModel::from_json(&json).expect("json");
        let (_, directives) = core
            .transact("update", |core, ctx| core.update_topic(ctx, update))
            .expect("update");

        assert_eq!(core.get_topic(a, false).expect("a").value().to_string(), "Alice 999, 456");
        let updated: Vec<_> = directives
            .iter()
            .filter(|d| d.kind == DirectiveKind::UpdateTopic)
            .collect();
        assert_eq!(updated.len(), 2);
    }

    /// T2.3: An update without a value leaves the stored value alone.
    #[test]
    fn update_without_value_keeps_value() {
        let mut core = contacts(MemoryStore::new());
        let person = create(&mut core, alice()).id().expect("person");
        let name = core
            .get_topic_by_value(NAME, &"Alice".into())
            .expect("lookup")
            .expect("name");

        let json = serde_json::json!({"id": name.id().expect("id").0, "uri": "names.alice"});
        let update = TopicModel::from_json(&json).expect("json");
        let (name, _) = core
            .transact("update", |core, ctx| core.update_topic(ctx, update))
            .expect("update");

        assert_eq!(name.value().to_string(), "Alice");
        assert_eq!(name.uri(), Some("names.alice"));
        let stored = core.get_topic_by_uri("names.alice", false).expect("by uri");
        assert_eq!(stored.value().to_string(), "Alice");
        assert_eq!(core.get_topic(person, false).expect("person").value().to_string(), "Alice 123, 456");
    }

    /// T2.4: A value topic can't take a value another topic of its type holds.
    #[test]
    fn value_update_keeps_values_unique() {
        let mut core = contacts(MemoryStore::new());
        create(&mut core, alice());
        let bob = create(&mut core, TopicModel::new(PERSON).with_child(NAME, TopicModel::new(NAME).with_value("Bob")))
            .id()
            .expect("bob");
        let bob_name = core
            .get_topic_by_value(NAME, &"Bob".into())
            .expect("lookup")
            .expect("name");

        let json = serde_json::json!({"id": bob_name.id().expect("id").0, "value": "Alice"});
        let update = TopicModel::from_json(&json).expect("json");
        let err = core
            .transact("update", |core, ctx| core.update_topic(ctx, update))
            .expect_err("taken");
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);

        let alices = core
            .get_topics_by_type(NAME)
            .expect("names")
            .into_iter()
            .filter(|t| t.value().to_string() == "Alice")
            .count();
        assert_eq!(alices, 1);
        assert_eq!(core.get_topic(bob, false).expect("bob").value().to_string(), "Bob");
    }

    /// T2.5: Deleting a topic cascades to its associations.
    #[test]
    fn delete_cascades_to_assocs() {
        let mut core = contacts(MemoryStore::new());
        let person = create(&mut core, alice());
        let id = person.id().expect("id");

        let (_, directives) = core
            .transact("delete", |core, ctx| core.delete_topic(ctx, id))
            .expect("delete");
        assert_eq!(directives[directives.len() - 1].kind, DirectiveKind::DeleteTopic);
        let deleted_assocs = directives.iter().filter(|d| d.kind == DirectiveKind::DeleteAssoc).count();
        assert_eq!(deleted_assocs, 3);

        let err = core.get_topic(id, false).expect_err("gone");
        assert!(matches!(err, DmxError::TopicNotFound(_)));
        // children survive
        assert_eq!(core.get_topics_by_type(PHONE).expect("phones").len(), 2);
    }

    /// T2.6: Type topics can't be deleted as plain topics.
    #[test]
    fn type_topics_are_guarded() {
        let mut core = contacts(MemoryStore::new());
        let person_type = core.get_topic_by_uri(PERSON, false).expect("type topic");
        let err = core
            .transact("delete", |core, ctx| core.delete_topic(ctx, person_type.id()?))
            .expect_err("guarded");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(core.get_topic_type(PERSON).is_ok());
    }

    /// T2.7: Associations need known role types and existing players.
    #[test]
    fn assoc_roles_are_checked() {
        let mut core = contacts(MemoryStore::new());
        let a = create(&mut core, alice()).id().expect("a");
        let b = create(&mut core, TopicModel::new(NAME).with_value("Dave")).id().expect("b");

        let assoc = AssocModel::new(
            ASSOCIATION,
            PlayerModel::topic(a, ROLE_DEFAULT),
            PlayerModel::topic(b, ROLE_DEFAULT),
        );
        let (assoc, _) = core
            .transact("relate", |core, ctx| core.create_assoc(ctx, assoc))
            .expect("relate");
        assert!(assoc.matches(ROLE_DEFAULT, b, ROLE_DEFAULT, a));
        assert_eq!(assoc.other_player_id(a).expect("other"), b);

        let bogus = AssocModel::new(
            ASSOCIATION,
            PlayerModel::topic(a, "dmx.nowhere"),
            PlayerModel::topic(b, ROLE_DEFAULT),
        );
        let err = core
            .transact("relate", |core, ctx| core.create_assoc(ctx, bogus))
            .expect_err("unknown role");
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }

    /// T2.8: An association update sets the URI and keeps both roles.
    #[test]
    fn assoc_update_keeps_roles() {
        let mut core = contacts(MemoryStore::new());
        let a = create(&mut core, alice()).id().expect("a");
        let b = create(&mut core, TopicModel::new(NAME).with_value("Dave")).id().expect("b");
        let assoc = AssocModel::new(
            ASSOCIATION,
            PlayerModel::topic(a, ROLE_DEFAULT),
            PlayerModel::topic(b, ROLE_DEFAULT),
        );
        let (assoc, _) = core
            .transact("relate", |core, ctx| core.create_assoc(ctx, assoc))
            .expect("relate");
        let id = assoc.id().expect("id");

        let (_, directives) = core
            .transact("rename", |core, ctx| core.update_assoc(ctx, assoc.with_uri("links.alice_dave")))
            .expect("update");
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].kind, DirectiveKind::UpdateAssoc);

        let stored = core.get_assoc(id, false).expect("stored");
        assert_eq!(stored.uri(), Some("links.alice_dave"));
        assert_eq!(stored.other_player_id(a).expect("other"), b);
    }
}

// =============================================================================
// TIER T3: READ FILTERING AND TRAVERSAL
// =============================================================================

mod t3_traversal {
    use super::*;

    fn parent_filter() -> RelatedFilter {
        RelatedFilter::new().assoc_type(COMPOSITION).my_role(ROLE_PARENT).others_role(ROLE_CHILD)
    }

    /// T3.1: Related topics come with the association they were reached through.
    #[test]
    fn related_topics_carry_assoc() {
        let mut core = contacts(MemoryStore::new());
        let id = create(&mut core, alice()).id().expect("id");

        let related = core.get_related_topics(PlayerRef::Topic(id), &parent_filter()).expect("related");
        let values: Vec<String> = related.iter().map(|r| r.topic.value().to_string()).collect();
        assert_eq!(values, ["Alice", "123", "456"]);
        assert!(related.iter().all(|r| r.relating_assoc.is_some()));
    }

    /// T3.2: Unreadable objects and topics behind unreadable associations vanish.
    #[test]
    fn unreadable_objects_are_hidden() {
        let mut core = contacts(MemoryStore::new());
        let person = create(&mut core, alice());
        let id = person.id().expect("id");
        let name_assoc = person
            .childs()
            .get_one(NAME)
            .and_then(|n| n.relating_assoc.as_ref())
            .map(|r| r.assoc.id().expect("assoc id"))
            .expect("relating");
        let phone = person.childs().get_many(PHONE)[0].topic.id().expect("phone");

        let core = core.with_access_control(move |object: &dyn Identifiable| {
            object.id_opt() != Some(name_assoc) && object.id_opt() != Some(phone)
        });

        let related = core.get_related_topics(PlayerRef::Topic(id), &parent_filter()).expect("related");
        let values: Vec<String> = related.iter().map(|r| r.topic.value().to_string()).collect();
        assert_eq!(values, ["456"]);

        let err = core.get_topic(phone, false).expect_err("hidden");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(core.get_topics_by_type(PHONE).expect("phones").len(), 1);
        let all: Vec<_> = core.all_topics().collect::<Result<_, _>>().expect("all");
        assert!(all.iter().all(|t| t.id().ok() != Some(phone)));
    }

    /// T3.3: Type views drop CompDefs whose association is unreadable.
    #[test]
    fn type_views_are_filtered() {
        let core = contacts(MemoryStore::new());
        let person = core.get_topic_type(PERSON).expect("person");
        let phone_def = person.comp_def(PHONE).expect("phone").assoc().id().expect("stored");
        assert_eq!(core.get_assocs_by_type(COMPOSITION_DEF).expect("comp defs").len(), 2);

        let core = core.with_access_control(move |object: &dyn Identifiable| object.id_opt() != Some(phone_def));
        let view = core.get_topic_type(PERSON).expect("view");
        assert_eq!(view.comp_def_uris(), [NAME]);
    }

    /// T3.4: Properties are readable only through readable objects.
    #[test]
    fn properties_follow_objects() {
        let mut core = contacts(MemoryStore::new());
        let id = create(&mut core, alice()).id().expect("id");
        core.transact("tag", |core, ctx| {
            core.set_property(ctx, id, "dmx.test.rank", SimpleValue::from(7), true)
        })
        .expect("tag");

        assert_eq!(core.get_property(id, "dmx.test.rank").expect("rank"), SimpleValue::Number(7));
        let found = core.find_by_property("dmx.test.rank", &SimpleValue::Number(7)).expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_topic().map(|t| t.type_uri()), Some(PERSON));
        assert!(found[0].as_assoc().is_none());
        let properties = core.get_properties(id).expect("properties");
        assert_eq!(properties.get("dmx.test.rank"), Some(&SimpleValue::Number(7)));

        let core = core.with_access_control(move |object: &dyn Identifiable| object.id_opt() != Some(id));
        assert!(core.find_by_property("dmx.test.rank", &SimpleValue::Number(7)).expect("find").is_empty());
        assert_eq!(
            core.get_property(id, "dmx.test.rank").expect_err("hidden").kind(),
            ErrorKind::NotFound
        );
    }

    /// T3.5: Related associations are chained to the association that reached them.
    #[test]
    fn related_assocs_follow_sequence() {
        let core = contacts(MemoryStore::new());
        let person = core.get_topic_type(PERSON).expect("person");
        let name_def = person.comp_def(NAME).expect("name").id().expect("id");
        let phone_def = person.comp_def(PHONE).expect("phone").id().expect("id");
        let successor = RelatedFilter::new()
            .assoc_type(SEQUENCE)
            .my_role(ROLE_PREDECESSOR)
            .others_role(ROLE_SUCCESSOR);

        let related = core.get_related_assocs(PlayerRef::Assoc(name_def), &successor).expect("related");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].assoc.id().expect("id"), phone_def);
        let via = related[0].relating_assoc.as_ref().expect("via");
        assert_eq!(via.assoc.type_uri(), SEQUENCE);
        assert!(core.get_related_assocs(PlayerRef::Assoc(phone_def), &successor).expect("last").is_empty());
    }
}

// =============================================================================
// TIER T4: SCHEMA, TRANSACTIONS, PERSISTENCE
// =============================================================================

mod t4_schema {
    use super::*;

    /// T4.1: Adding a CompDef before a sibling reorders and emits a type directive.
    #[test]
    fn add_comp_def_before_sibling() {
        let mut core = contacts(MemoryStore::new());
        core.transact("note type", |core, ctx| {
            core.create_topic_type(ctx, TypeModel::topic_type(NOTE, "Note", DataType::Value)?)
        })
        .expect("note");

        let (view, directives) = core
            .transact("add comp def", |core, ctx| {
                core.add_comp_def_before(ctx, PERSON, CompDefModel::new(PERSON, NOTE, Cardinality::One), PHONE)
            })
            .expect("add");
        assert_eq!(view.comp_def_uris(), [NAME, NOTE, PHONE]);
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].kind, DirectiveKind::UpdateTopicType);

        // the order survives a reload from storage
        let reloaded = CoreService::new(core.storage().clone()).expect("reload");
        assert_eq!(reloaded.get_topic_type(PERSON).expect("person").comp_def_uris(), [NAME, NOTE, PHONE]);
    }

    /// T4.2: Types in use and built-in types can't be deleted.
    #[test]
    fn delete_type_guards() {
        let mut core = contacts(MemoryStore::new());
        create(&mut core, alice());

        let err = core
            .transact("delete", |core, ctx| core.delete_topic_type(ctx, PERSON))
            .expect_err("has instances");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = core
            .transact("delete", |core, ctx| core.delete_topic_type(ctx, NAME))
            .expect_err("used as child");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = core
            .transact("delete", |core, ctx| core.delete_assoc_type(ctx, COMPOSITION))
            .expect_err("core type");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    /// T4.3: An unused type is deleted together with its schema associations.
    #[test]
    fn delete_unused_type() {
        let mut core = contacts(MemoryStore::new());
        let before = core.storage().assoc_count();
        core.transact("note type", |core, ctx| {
            let mut note = TypeModel::topic_type(NOTE, "Note", DataType::Identity)?;
            note.add_comp_def(CompDefModel::new(NOTE, NAME, Cardinality::One))?;
            core.create_topic_type(ctx, note)
        })
        .expect("note");

        let (_, directives) = core
            .transact("delete", |core, ctx| core.delete_topic_type(ctx, NOTE))
            .expect("delete");
        assert_eq!(directives[0].kind, DirectiveKind::DeleteTopicType);
        assert_eq!(core.get_topic_type(NOTE).expect_err("gone").kind(), ErrorKind::NotFound);
        assert_eq!(core.storage().assoc_count(), before);
    }

    /// T4.4: A failed operation leaves neither data nor types behind.
    #[test]
    fn failed_operation_rolls_back() {
        let mut core = contacts(MemoryStore::new());
        let topics = core.storage().topic_count();

        let result: Result<((), _), DmxError> = core.transact("doomed", |core, ctx| {
            core.create_topic_type(ctx, TypeModel::topic_type(NOTE, "Note", DataType::Value)?)?;
            core.create_topic(ctx, TopicModel::new(NOTE).with_value("draft"))?;
            Err(DmxError::InvalidState("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(core.storage().topic_count(), topics);
        assert_eq!(core.get_topic_type(NOTE).expect_err("rolled back").kind(), ErrorKind::NotFound);
    }

    /// T4.5: An association type can't be created as a topic type.
    #[test]
    fn create_checks_kind_and_children() {
        let mut core = contacts(MemoryStore::new());
        let err = core
            .transact("create", |core, ctx| {
                core.create_topic_type(ctx, TypeModel::assoc_type("dmx.test.link", "Link", DataType::Composite)?)
            })
            .expect_err("wrong kind");
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);

        let err = core
            .transact("create", |core, ctx| {
                let mut orphan = TypeModel::topic_type(NOTE, "Note", DataType::Identity)?;
                orphan.add_comp_def(CompDefModel::new(NOTE, "dmx.nowhere", Cardinality::One))?;
                core.create_topic_type(ctx, orphan)
            })
            .expect_err("missing child type");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(core.get_topic_type(ASSOC_TYPE).is_ok());
    }

    /// T4.6: Everything survives closing and reopening a redb store.
    #[test]
    fn redb_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dmx.redb");
        let id: ObjectId = {
            let mut core = contacts(RedbStore::open(&path).expect("open"));
            let (person, _) = core
                .transact("create", |core, ctx| core.create_topic(ctx, alice()))
                .expect("create");
            person.id().expect("id")
        };

        let core = CoreService::new(RedbStore::open(&path).expect("reopen")).expect("bootstrap");
        let person = core.get_topic(id, true).expect("person");
        assert_eq!(person.value().to_string(), "Alice 123, 456");
        assert_eq!(person.childs().get_many(PHONE).len(), 2);
        assert_eq!(core.get_topic_type(PERSON).expect("type").comp_def_uris(), [NAME, PHONE]);
    }

    /// T4.7: Changing a type keeps the association ids of its remaining CompDefs.
    #[test]
    fn comp_def_ids_survive_type_changes() {
        let mut core = contacts(MemoryStore::new());
        core.transact("note type", |core, ctx| {
            core.create_topic_type(ctx, TypeModel::topic_type(NOTE, "Note", DataType::Value)?)
        })
        .expect("note");
        let comp_def_id = |core: &CoreService<MemoryStore>, uri: &str| {
            let person = core.get_topic_type(PERSON).expect("person");
            person.comp_def(uri).expect("comp def").id().expect("id")
        };
        let name_id = comp_def_id(&core, NAME);
        let phone_id = comp_def_id(&core, PHONE);
        let before = core.storage().assoc_count();

        core.transact("add", |core, ctx| {
            assert_eq!(ctx.operation(), "add");
            core.add_comp_def(ctx, PERSON, CompDefModel::new(PERSON, NOTE, Cardinality::One))
        })
        .expect("add");
        assert_eq!(comp_def_id(&core, NAME), name_id);
        assert_eq!(comp_def_id(&core, PHONE), phone_id);
        core.transact("remove", |core, ctx| core.remove_comp_def(ctx, PERSON, NOTE))
            .expect("remove");
        assert_eq!(core.storage().assoc_count(), before);

        core.transact("remove", |core, ctx| core.remove_comp_def(ctx, PERSON, NAME))
            .expect("remove");
        assert!(core.storage().fetch_assoc(name_id).expect("fetch").is_none());
        let reloaded = CoreService::new(core.storage().clone()).expect("reload");
        assert_eq!(reloaded.get_topic_type(PERSON).expect("person").comp_def_uris(), [PHONE]);
        assert_eq!(comp_def_id(&reloaded, PHONE), phone_id);
    }

    /// T4.8: Replacing a type keeps the CompDefs it still names.
    #[test]
    fn update_type_replaces_schema() {
        let mut core = contacts(MemoryStore::new());
        let name_def = core.get_topic_type(PERSON).expect("person").comp_def(NAME).expect("name").id().expect("id");

        let (view, directives) = core
            .transact("replace", |core, ctx| {
                let mut person = TypeModel::topic_type(PERSON, "Human", DataType::Identity)?;
                person.add_comp_def(CompDefModel::new(PERSON, NAME, Cardinality::One).with_include_in_label(true))?;
                core.update_type(ctx, person)
            })
            .expect("replace");
        assert_eq!(view.comp_def_uris(), [NAME]);
        assert_eq!(view.comp_def(NAME).expect("name").id().expect("id"), name_def);
        assert_eq!(view.type_kind(), TypeKind::TopicType);
        assert_eq!(view.label(), "Human");
        assert_eq!(view.data_type(), DataType::Identity);
        assert_eq!(view.label_config(), [NAME]);
        assert!(view.index_modes().is_empty());
        assert_eq!(view.view_config().config_topics().count(), 0);
        assert_eq!(directives[0].kind, DirectiveKind::UpdateTopicType);

        let person = create(&mut core, TopicModel::new(PERSON).with_child(NAME, TopicModel::new(NAME).with_value("Zoe")));
        assert_eq!(person.value().to_string(), "Zoe");

        let err = core
            .transact("replace", |core, ctx| {
                core.update_type(ctx, TypeModel::assoc_type(PERSON, "Person", DataType::Composite)?)
            })
            .expect_err("kind changed");
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }
}
