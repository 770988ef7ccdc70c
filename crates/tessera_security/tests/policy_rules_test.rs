//! Chat-room policies evaluated against an in-memory store.
//!
//! - `User.status` is private unless the principal is the user or shares
//!   a room with them
//! - `ChatRoom.members` never lists busy users
//! - `User.pswd` is visible only to its owner
//! - users may only write their own fields

use std::sync::Arc;
use tessera_core::record::memory::{MemRecord, MemStore};
use tessera_core::{
    read_through, write_through, AccessError, AccessKind, FieldRef, Record, RecordRef, RecordSet, Value,
};
use tessera_security::{AccessScope, FieldSelector, Policy, PolicyConfig, PolicyContext, PolicyRegistry, RuleEnv};

fn user_of(env: &RuleEnv<'_>) -> Option<RecordRef> {
    env.principal().read_field("user").as_record().cloned()
}

fn is_me(env: &RuleEnv<'_>, record: &dyn Record) -> bool {
    user_of(env).is_some_and(|me| me.key() == record.key())
}

fn chat_policy(store: Arc<MemStore>) -> Policy {
    Policy::new("ChatPrivacy", "Client")
        .restrict(FieldSelector::field("User", "status"))
        .reads()
        .described("status hidden from strangers")
        .when(move |env, s| {
            let Some(me) = user_of(env) else { return true };
            if me.key() == s.record.key() {
                return false;
            }
            let shares_room = store.all("ChatRoom").iter().any(|room| {
                let members = RecordSet::from_value(room.read_field("members"));
                members.iter().any(|m| m.as_record().is_some_and(|r| r.key() == me.key()))
                    && members.iter().any(|m| m.as_record().is_some_and(|r| r.key() == s.record.key()))
            });
            !shares_room
        })
        .restrict(FieldSelector::field("ChatRoom", "members"))
        .reads()
        .reject(|_, s| {
            s.value
                .and_then(Value::as_record)
                .is_some_and(|member| member.read_field("status").as_str() == Some("busy"))
        })
        .restrict(FieldSelector::field("User", "pswd"))
        .unless(|env, s| is_me(env, s.record))
        .allow_write(FieldSelector::all_of("User"))
        .when(|env, s| is_me(env, s.record))
}

struct Chat {
    scope: AccessScope,
    room: Arc<MemRecord>,
    alice: Arc<MemRecord>,
    bob: Arc<MemRecord>,
    carol: Arc<MemRecord>,
}

fn chat() -> Chat {
    let store = Arc::new(MemStore::new());
    let alice = store.create("User", [("name", Value::from("alice")), ("status", Value::from("active"))]);
    let bob = store.create("User", [("name", Value::from("bob")), ("status", Value::from("busy"))]);
    let carol = store.create("User", [("name", Value::from("carol")), ("status", Value::from("active"))]);
    alice.set("pswd", "a-secret");
    let members: Vec<Value> = [&alice, &bob]
        .into_iter()
        .map(|u| Value::Record(Arc::clone(u) as RecordRef))
        .collect();
    let room = store.create("ChatRoom", [("name", Value::from("g708")), ("members", Value::List(members))]);

    let registry = PolicyRegistry::new().with(chat_policy(Arc::clone(&store)));
    let context = Arc::new(PolicyContext::new(registry, PolicyConfig::default()));
    Chat {
        scope: AccessScope::new(context),
        room,
        alice,
        bob,
        carol,
    }
}

fn client_for(user: &Arc<MemRecord>, id: u64) -> RecordRef {
    MemRecord::new("Client", id)
        .with("user", Value::Record(Arc::clone(user) as RecordRef))
        .shared()
}

fn member_names(value: &Value) -> Vec<String> {
    RecordSet::from_value(value.clone())
        .map(|m| m.as_record().map(|r| r.read_field("name").to_string()).unwrap_or_default())
}

#[test]
fn test_busy_members_are_filtered_for_everyone() {
    let mut chat = chat();
    let members = FieldRef::new("ChatRoom", "members").many();
    let room = Arc::clone(&chat.room);

    for principal in [client_for(&chat.alice, 1), client_for(&chat.bob, 2)] {
        let names = chat.scope.with_policy_scope(&principal, |s| {
            let mut guard = s.guard().unwrap();
            member_names(&read_through(&mut [&mut guard], &*room, &members).unwrap())
        });
        assert_eq!(names, vec!["alice"]);
    }

    // the stored collection is untouched
    assert_eq!(RecordSet::from_value(room.read_field("members")).len(), 2);
}

#[test]
fn test_status_hidden_from_strangers() {
    let mut chat = chat();
    let status = FieldRef::new("User", "status");
    let bob = Arc::clone(&chat.bob);

    let alice_client = client_for(&chat.alice, 1);
    let seen = chat.scope.with_policy_scope(&alice_client, |s| {
        let mut guard = s.guard().unwrap();
        read_through(&mut [&mut guard], &*bob, &status)
    });
    assert_eq!(seen.unwrap(), Value::from("busy"));

    let carol_client = client_for(&chat.carol, 3);
    let denied = chat.scope.with_policy_scope(&carol_client, |s| {
        let mut guard = s.guard().unwrap();
        read_through(&mut [&mut guard], &*bob, &status)
    });
    match denied {
        Err(AccessError::Denied(d)) => {
            assert_eq!(d.op, AccessKind::Read);
            assert_eq!(d.field, "User.status");
            assert_eq!(d.rule, "status hidden from strangers");
            assert_eq!(d.record, bob.key());
        }
        other => panic!("expected a denial, got {other:?}"),
    }
}

#[test]
fn test_password_and_writes_belong_to_owner() {
    let mut chat = chat();
    let pswd = FieldRef::new("User", "pswd");
    let name = FieldRef::new("User", "name");
    let alice = Arc::clone(&chat.alice);

    let own = client_for(&chat.alice, 1);
    chat.scope.with_policy_scope(&own, |s| {
        let mut guard = s.guard().unwrap();
        assert_eq!(read_through(&mut [&mut guard], &*alice, &pswd).unwrap(), Value::from("a-secret"));
        write_through(&mut [&mut guard], &*alice, &name, "alicia".into()).unwrap();
    });
    assert_eq!(alice.read_field("name"), Value::from("alicia"));

    let other = client_for(&chat.bob, 2);
    chat.scope.with_policy_scope(&other, |s| {
        let mut guard = s.guard().unwrap();
        assert!(read_through(&mut [&mut guard], &*alice, &pswd).is_err());
        assert!(write_through(&mut [&mut guard], &*alice, &name, "mallory".into()).is_err());
    });
    assert_eq!(alice.read_field("name"), Value::from("alicia"));
}

#[test]
fn test_scope_restored_after_error_return() {
    let mut chat = chat();
    let pswd = FieldRef::new("User", "pswd");
    let alice = Arc::clone(&chat.alice);
    let other = client_for(&chat.bob, 2);

    let outcome: Result<Value, AccessError> = chat.scope.with_policy_scope(&other, |s| {
        let mut guard = s.guard().unwrap();
        let value = read_through(&mut [&mut guard], &*alice, &pswd)?;
        Ok(value)
    });
    assert!(outcome.is_err());
    assert!(chat.scope.active_principal().is_none());
    assert!(chat.scope.guard().is_none());
}
