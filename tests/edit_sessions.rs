mod helpers;

use std::collections::BTreeMap;

use crm::access::Actor;
use crm::edit::{Editor, SubmitOutcome, Submission};
use crm::errors::CrmError;
use crm::fields::actions::SubmittedValue;
use crm::fields::{FieldValue, StoredValue};
use crm::resource::{StagedChanges, UserRole, VariantKind, DATE_ORDER_WARNING};
use crm::storage;
use helpers::{editor, AccountBuilder, OpportunityBuilder, TestDb, UserBuilder};

fn form(entries: &[(&str, &str)]) -> Submission {
    let values: BTreeMap<String, SubmittedValue> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), SubmittedValue::Text(v.to_string())))
        .collect();
    Submission {
        values,
        ..Default::default()
    }
}

fn action(name: &str, entries: &[(&str, &str)]) -> Submission {
    Submission {
        action: Some(name.to_string()),
        ..form(entries)
    }
}

async fn create_session(editor: &Editor, actor: &Actor, kind: VariantKind) -> String {
    editor
        .start_create(actor, kind, StagedChanges::default(), None)
        .await
        .unwrap()
        .token
}

#[tokio::test]
async fn test_create_user_through_session() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, admin) = UserBuilder::new("root").admin().create(db.connection()).await;

    let token = create_session(&editor, &admin, VariantKind::User).await;
    let outcome = editor
        .submit(
            &admin,
            &token,
            form(&[
                ("username", "alice"),
                ("password", "secret123"),
                ("password.confirmation", "secret123"),
                ("role", "Sales"),
            ]),
        )
        .await
        .unwrap();

    let SubmitOutcome::Committed { id, redirect } = outcome else {
        panic!("Expected a commit, got {outcome:?}");
    };
    assert_eq!(redirect, format!("/resources/{id}"));
    assert!(editor.sessions.is_empty());

    let alice = storage::get_resource(db.connection(), id).await.unwrap();
    let hash = alice.row().get("password").and_then(StoredValue::as_text).unwrap();
    assert_ne!(hash, "secret123");
    assert_eq!(alice.value("password"), Some(FieldValue::Masked));
    assert_eq!(alice.value("role"), Some(FieldValue::Choice("Sales".into())));
    assert!(storage::verify_login(db.connection(), "alice", "secret123")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_mismatched_confirmation_keeps_session_open() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, admin) = UserBuilder::new("root").admin().create(db.connection()).await;

    let token = create_session(&editor, &admin, VariantKind::User).await;
    let outcome = editor
        .submit(
            &admin,
            &token,
            form(&[
                ("username", "alice"),
                ("password", "secret123"),
                ("password.confirmation", "secret321"),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SubmitOutcome::Form {
            redirect: format!("/sessions/{token}")
        }
    );

    let view = editor.view(&admin, &token).await.unwrap();
    let password = view.fields.iter().find(|f| f.name == "password").unwrap();
    assert_eq!(password.messages.len(), 1);
    assert_eq!(password.messages[0].message, "Passwords do not match.");
    // Staged input survives the failed attempt
    let username = view.fields.iter().find(|f| f.name == "username").unwrap();
    assert_eq!(username.value, FieldValue::Text("alice".into()));

    let users = storage::list_resources(db.connection(), VariantKind::User)
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert!(storage::find_user_by_username(db.connection(), "alice")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_deleted_users_keep_their_username() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, admin) = UserBuilder::new("root").admin().create(db.connection()).await;
    let (mut bob, _) = UserBuilder::new("bob").create(db.connection()).await;
    storage::soft_delete(db.connection(), &editor.policy, &mut bob, &admin)
        .await
        .unwrap();

    let token = create_session(&editor, &admin, VariantKind::User).await;
    let outcome = editor
        .submit(
            &admin,
            &token,
            form(&[
                ("username", "bob"),
                ("password", "secret123"),
                ("password.confirmation", "secret123"),
            ]),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Form { .. }));

    let view = editor.view(&admin, &token).await.unwrap();
    let username = view.fields.iter().find(|f| f.name == "username").unwrap();
    assert_eq!(username.messages.len(), 1);
    assert_eq!(username.messages[0].id, "username.taken");

    // Login lookups still skip deleted users
    assert!(storage::find_user_by_username(db.connection(), "bob")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_session_is_invisible_to_other_users() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let (_, b) = UserBuilder::new("b").create(db.connection()).await;

    let token = create_session(&editor, &a, VariantKind::Account).await;

    let foreign = editor.view(&b, &token).await;
    let unknown = editor.view(&b, "does-not-exist").await;
    assert!(matches!(foreign, Err(CrmError::NotFound(_))));
    assert!(matches!(unknown, Err(CrmError::NotFound(_))));

    let submit = editor.submit(&b, &token, form(&[("name", "Hijack")])).await;
    assert!(matches!(submit, Err(CrmError::NotFound(_))));
    assert!(editor.view(&a, &token).await.is_ok());
}

#[tokio::test]
async fn test_edit_requires_write_access() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let (_, b) = UserBuilder::new("b").create(db.connection()).await;
    let account = AccountBuilder::new("Acme").create(db.connection(), &a).await;

    let denied = editor.start_edit(&b, account.id().unwrap()).await;
    assert!(matches!(denied, Err(CrmError::AccessDenied)));
    assert!(editor.start_edit(&a, account.id().unwrap()).await.is_ok());
}

#[tokio::test]
async fn test_session_picks_up_concurrent_changes() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let account = AccountBuilder::new("Acme").create(db.connection(), &a).await;
    let id = account.id().unwrap();

    let session = editor.start_edit(&a, id).await.unwrap();
    editor
        .submit(&a, &session.token, action("phone.set_value", &[("phone", "555-0100")]))
        .await
        .unwrap();

    // Someone else renames the account meanwhile
    let mut other = storage::get_resource(db.connection(), id).await.unwrap();
    other
        .set("name", crm::fields::Argument::Value(FieldValue::Text("Acme Ltd".into())))
        .unwrap();
    helpers::save(db.connection(), &mut other, &a).await.unwrap();

    let view = editor.view(&a, &session.token).await.unwrap();
    let value = |name: &str| {
        view.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.clone())
            .unwrap()
    };
    assert_eq!(value("name"), FieldValue::Text("Acme Ltd".into()));
    assert_eq!(value("phone"), FieldValue::Text("555-0100".into()));

    let outcome = editor.submit(&a, &session.token, form(&[])).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Committed { .. }));
    let saved = storage::get_resource(db.connection(), id).await.unwrap();
    assert_eq!(saved.value("name"), Some(FieldValue::Text("Acme Ltd".into())));
    assert_eq!(saved.value("phone"), Some(FieldValue::Text("555-0100".into())));
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let token = create_session(&editor, &a, VariantKind::Account).await;

    for name in ["name.explode", "nonexistent.set_value", "no_dot", "name.create_new"] {
        let result = editor.submit(&a, &token, action(name, &[])).await;
        assert!(
            matches!(result, Err(CrmError::BadRequest(_))),
            "{name} should be rejected"
        );
    }
}

#[tokio::test]
async fn test_table_actions_stage_rows_until_commit() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let account = AccountBuilder::new("Acme").create(db.connection(), &a).await;
    let first = OpportunityBuilder::new("First").create(db.connection(), &a).await;
    let second = OpportunityBuilder::new("Second").create(db.connection(), &a).await;
    let (first, second) = (first.id().unwrap(), second.id().unwrap());
    let id = account.id().unwrap();

    let session = editor.start_edit(&a, id).await.unwrap();
    let selected = format!("{first},{second}");
    let outcome = editor
        .submit(
            &a,
            &session.token,
            action("opportunities.add_row", &[("opportunities.selected", &selected)]),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Form { .. }));

    let view = editor.view(&a, &session.token).await.unwrap();
    let rows = view.fields.iter().find(|f| f.name == "opportunities").unwrap();
    assert_eq!(rows.value, FieldValue::Rows(vec![first, second]));
    // Nothing persisted yet
    let stored = storage::get_resource(db.connection(), id).await.unwrap();
    assert_eq!(stored.value("opportunities"), Some(FieldValue::Rows(vec![])));

    editor
        .submit(
            &a,
            &session.token,
            action(
                "opportunities.remove_selected",
                &[("opportunities.selected", &second.to_string())],
            ),
        )
        .await
        .unwrap();
    let outcome = editor.submit(&a, &session.token, form(&[])).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Committed { .. }));

    let stored = storage::get_resource(db.connection(), id).await.unwrap();
    assert_eq!(stored.value("opportunities"), Some(FieldValue::Rows(vec![first])));
}

#[tokio::test]
async fn test_adding_wrong_kind_of_row_is_a_field_error() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let account = AccountBuilder::new("Acme").create(db.connection(), &a).await;

    let session = editor.start_edit(&a, account.id().unwrap()).await.unwrap();
    editor
        .submit(
            &a,
            &session.token,
            action(
                "opportunities.add_row",
                &[("opportunities.selected", &account.id().unwrap().to_string())],
            ),
        )
        .await
        .unwrap();

    let view = editor.view(&a, &session.token).await.unwrap();
    let rows = view.fields.iter().find(|f| f.name == "opportunities").unwrap();
    assert_eq!(rows.messages[0].id, "opportunities.unknown_row");
    assert_eq!(rows.value, FieldValue::Rows(vec![]));
}

#[tokio::test]
async fn test_cannot_adopt_row_without_write_access_to_it() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let (_, b) = UserBuilder::new("b").create(db.connection()).await;
    let a_account = AccountBuilder::new("A Corp").create(db.connection(), &a).await;
    let a_opportunity = OpportunityBuilder::new("A deal")
        .for_account(a_account.id().unwrap())
        .create(db.connection(), &a)
        .await;
    let b_account = AccountBuilder::new("B Corp").create(db.connection(), &b).await;
    let opportunity_id = a_opportunity.id().unwrap();

    let session = editor.start_edit(&b, b_account.id().unwrap()).await.unwrap();
    editor
        .submit(
            &b,
            &session.token,
            action(
                "opportunities.add_row",
                &[("opportunities.selected", &opportunity_id.to_string())],
            ),
        )
        .await
        .unwrap();

    let view = editor.view(&b, &session.token).await.unwrap();
    let rows = view.fields.iter().find(|f| f.name == "opportunities").unwrap();
    assert_eq!(rows.messages[0].id, "opportunities.unknown_row");
    assert_eq!(
        rows.messages[0].message,
        format!("No Opportunity with id {opportunity_id} exists.")
    );
    assert_eq!(rows.value, FieldValue::Rows(vec![]));

    // Committing the rest of the form leaves A's opportunity where it was
    let outcome = editor.submit(&b, &session.token, form(&[])).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Committed { .. }));
    let stored = storage::get_resource(db.connection(), opportunity_id).await.unwrap();
    assert_eq!(
        stored.value("account"),
        Some(FieldValue::Reference(a_account.id().unwrap()))
    );
}

#[tokio::test]
async fn test_create_new_spawns_child_session() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let account = AccountBuilder::new("Acme").create(db.connection(), &a).await;
    let id = account.id().unwrap();

    let parent = editor.start_edit(&a, id).await.unwrap();
    let outcome = editor
        .submit(&a, &parent.token, action("opportunities.create_new", &[]))
        .await
        .unwrap();
    let SubmitOutcome::Spawned { redirect } = outcome else {
        panic!("Expected a nested session, got {outcome:?}");
    };
    let child_token = redirect.trim_start_matches("/sessions/").to_string();
    assert_ne!(child_token, parent.token);

    let view = editor.view(&a, &child_token).await.unwrap();
    assert_eq!(view.kind, VariantKind::Opportunity);
    let back_reference = view.fields.iter().find(|f| f.name == "account").unwrap();
    assert_eq!(back_reference.value, FieldValue::Reference(id));

    let outcome = editor
        .submit(&a, &child_token, form(&[("name", "Renewal")]))
        .await
        .unwrap();
    let SubmitOutcome::Committed { id: child, redirect } = outcome else {
        panic!("Expected a commit, got {outcome:?}");
    };
    assert_eq!(redirect, parent.form_url());

    let view = editor.view(&a, &parent.token).await.unwrap();
    let rows = view.fields.iter().find(|f| f.name == "opportunities").unwrap();
    assert_eq!(rows.value, FieldValue::Rows(vec![child]));
}

#[tokio::test]
async fn test_create_new_needs_saved_parent() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let token = create_session(&editor, &a, VariantKind::Account).await;

    let outcome = editor
        .submit(&a, &token, action("opportunities.create_new", &[]))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Form { .. }));
    assert_eq!(editor.sessions.len(), 1);
}

#[tokio::test]
async fn test_date_warning_blocks_until_dismissed() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let token = create_session(&editor, &a, VariantKind::SalesOrder).await;

    let outcome = editor
        .submit(
            &a,
            &token,
            form(&[
                ("description", "Support contract"),
                ("start_date", "2025-02-01"),
                ("end_date", "2025-01-01"),
                ("base_price", "1234.5"),
                ("base_price.currency", "USD"),
            ]),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Form { .. }));

    let view = editor.view(&a, &token).await.unwrap();
    let end = view.fields.iter().find(|f| f.name == "end_date").unwrap();
    assert_eq!(end.messages[0].id, DATE_ORDER_WARNING);
    assert_eq!(end.messages[0].dismiss_label.as_deref(), Some("Save anyway"));

    let outcome = editor
        .submit(
            &a,
            &token,
            Submission {
                dismissed: vec![DATE_ORDER_WARNING.to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let SubmitOutcome::Committed { id, .. } = outcome else {
        panic!("Expected a commit, got {outcome:?}");
    };

    let order = storage::get_resource(db.connection(), id).await.unwrap();
    assert_eq!(order.title(), "Support contract");
    assert_eq!(
        order.value("base_price").map(|v| v.to_string()),
        Some("$1,234.50".to_string())
    );
}

#[tokio::test]
async fn test_invalid_input_is_field_scoped() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (_, a) = UserBuilder::new("a").create(db.connection()).await;
    let token = create_session(&editor, &a, VariantKind::SalesOrder).await;

    editor
        .submit(
            &a,
            &token,
            form(&[
                ("start_date", "first of May"),
                ("opportunity", "9999"),
                ("hourly_price", "12.345"),
            ]),
        )
        .await
        .unwrap();

    let view = editor.view(&a, &token).await.unwrap();
    for name in ["start_date", "opportunity", "hourly_price"] {
        let field = view.fields.iter().find(|f| f.name == name).unwrap();
        assert!(!field.messages.is_empty(), "{name} should carry an error");
    }
    assert!(storage::list_resources(db.connection(), VariantKind::SalesOrder)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unwritable_fields_are_skipped() {
    let db = TestDb::new().await;
    let editor = editor(db.connection());
    let (alice, alice_actor) = UserBuilder::new("alice").create(db.connection()).await;
    let id = alice.id().unwrap();

    let session = editor.start_edit(&alice_actor, id).await.unwrap();
    let view = editor.view(&alice_actor, &session.token).await.unwrap();
    let role = view.fields.iter().find(|f| f.name == "role").unwrap();
    assert!(!role.editable);

    let outcome = editor
        .submit(
            &alice_actor,
            &session.token,
            form(&[("username", "alice2"), ("role", "Administrator"), ("password", "")]),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Committed { .. }));

    let saved = storage::get_resource(db.connection(), id).await.unwrap();
    assert_eq!(saved.value("username"), Some(FieldValue::Text("alice2".into())));
    assert_eq!(saved.value("role"), Some(FieldValue::Choice("Sales".into())));
    let actor = storage::verify_login(db.connection(), "alice2", "password123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(actor.role, UserRole::Sales);
    assert_eq!(actor.id, id);
}
