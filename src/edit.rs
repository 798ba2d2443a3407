//! Edit sessions: token-addressed, user-scoped edit transactions that carry
//! staged changes across requests until they commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::DatabaseConnection;
use serde::Serialize;

use crate::access::{AccessPolicy, AccessType, Actor};
use crate::errors::CrmError;
use crate::fields::actions::{self, ActionInput, ActionKind, SubmittedValue};
use crate::fields::mutations::{ADD_ROW, REMOVE_ROW};
use crate::fields::{Argument, Field, FieldValue, RowRef};
use crate::mutation::{CommitContext, CommitException, ExceptionPolicy, Mutation};
use crate::resource::{Resource, ResourceId, StagedChanges, VariantKind};
use crate::settings;
use crate::storage;

/// Form key naming a custom action as `<field>.<action>`.
pub const ACTION_KEY: &str = "__action";
/// Repeatable form key carrying a warning id to override.
pub const DISMISS_KEY: &str = "__dismiss";

#[derive(Debug, Clone)]
pub struct EditSession {
    pub token: String,
    pub kind: VariantKind,
    /// `None` while creating
    pub resource_id: Option<ResourceId>,
    pub creator: ResourceId,
    pub staged: StagedChanges,
    /// Messages not bound to a field
    pub messages: Vec<CommitException>,
    pub field_messages: BTreeMap<String, Vec<CommitException>>,
    pub finished_url: Option<String>,
    last_access: i64,
}

impl EditSession {
    pub fn form_url(&self) -> String {
        format!("/sessions/{}", self.token)
    }

    fn finished_url_for(&self, id: ResourceId) -> String {
        self.finished_url
            .clone()
            .unwrap_or_else(|| format!("/resources/{id}"))
    }

    fn record(&mut self, exceptions: &[CommitException]) {
        self.messages.clear();
        self.field_messages.clear();
        for exception in exceptions {
            match &exception.field {
                Some(field) => self
                    .field_messages
                    .entry(field.clone())
                    .or_default()
                    .push(exception.clone()),
                None => self.messages.push(exception.clone()),
            }
        }
    }
}

/// Process-wide session store. Sessions idle for longer than `ttl_secs` are
/// treated as unknown and swept.
pub struct EditSessionStore {
    sessions: DashMap<String, EditSession>,
    ttl_secs: i64,
    max_per_user: usize,
}

impl EditSessionStore {
    pub fn new(cfg: &settings::EditSessions) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl_secs: cfg.ttl_secs,
            max_per_user: cfg.max_per_user.max(1),
        }
    }

    fn is_expired(&self, session: &EditSession, now: i64) -> bool {
        now - session.last_access > self.ttl_secs
    }

    /// Mint a session bound to `creator`. A user over the limit loses their
    /// least recently used session.
    pub fn create(
        &self,
        kind: VariantKind,
        resource_id: Option<ResourceId>,
        creator: ResourceId,
        staged: StagedChanges,
        finished_url: Option<String>,
    ) -> EditSession {
        let now = Utc::now().timestamp();

        let mut owned: Vec<(String, i64)> = self
            .sessions
            .iter()
            .filter(|s| s.creator == creator)
            .map(|s| (s.token.clone(), s.last_access))
            .collect();
        owned.sort_by_key(|(_, last_access)| *last_access);
        while owned.len() >= self.max_per_user {
            let (token, _) = owned.remove(0);
            self.sessions.remove(&token);
            tracing::debug!(%token, user_id = %creator, "Evicted least recently used edit session");
        }

        let mut token = storage::random_id();
        while self.sessions.contains_key(&token) {
            token = storage::random_id();
        }

        let session = EditSession {
            token: token.clone(),
            kind,
            resource_id,
            creator,
            staged,
            messages: Vec::new(),
            field_messages: BTreeMap::new(),
            finished_url,
            last_access: now,
        };
        self.sessions.insert(token, session.clone());
        session
    }

    /// Unknown, foreign and expired tokens all yield `None`.
    pub fn get(&self, token: &str, actor: &Actor) -> Option<EditSession> {
        let now = Utc::now().timestamp();
        let expired = {
            let mut entry = self.sessions.get_mut(token)?;
            if entry.creator != actor.id {
                return None;
            }
            if !self.is_expired(&entry, now) {
                entry.last_access = now;
                return Some(entry.clone());
            }
            true
        };

        if expired {
            self.sessions.remove(token);
            tracing::info!(%token, "Edit session expired");
        }
        None
    }

    pub fn update(&self, mut session: EditSession) {
        session.last_access = Utc::now().timestamp();
        self.sessions.insert(session.token.clone(), session);
    }

    pub fn remove(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session idle at `now`. Returns how many were dropped.
    pub fn cleanup_at(&self, now: i64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !self.is_expired(s, now));
        before - self.sessions.len()
    }

    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now().timestamp())
    }
}

/// One form post against a session.
#[derive(Debug, Default)]
pub struct Submission {
    pub values: BTreeMap<String, SubmittedValue>,
    /// `<field>.<action>`
    pub action: Option<String>,
    pub dismissed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Saved; the session is gone
    Committed { id: ResourceId, redirect: String },
    /// Back to the form with messages, or after a non-committing action
    Form { redirect: String },
    /// A nested create session was opened
    Spawned { redirect: String },
}

impl SubmitOutcome {
    pub fn redirect(&self) -> &str {
        match self {
            Self::Committed { redirect, .. }
            | Self::Form { redirect }
            | Self::Spawned { redirect } => redirect,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FieldView {
    pub name: &'static str,
    pub label: String,
    pub widget: &'static str,
    pub value: FieldValue,
    pub editable: bool,
    pub actions: Vec<&'static str>,
    pub messages: Vec<CommitException>,
}

/// Render payload for a session form.
#[derive(Debug, Serialize)]
pub struct EditView {
    pub token: String,
    pub kind: VariantKind,
    pub resource_id: Option<ResourceId>,
    pub title: String,
    pub form_url: String,
    pub fields: Vec<FieldView>,
    pub messages: Vec<CommitException>,
}

/// Entry point tying sessions to storage and access control.
#[derive(Clone)]
pub struct Editor {
    pub db: DatabaseConnection,
    pub policy: Arc<AccessPolicy>,
    pub sessions: Arc<EditSessionStore>,
    pub default_currency: String,
}

impl Editor {
    /// Open a session editing an existing resource.
    pub async fn start_edit(&self, actor: &Actor, id: ResourceId) -> Result<EditSession, CrmError> {
        let resource = storage::get_resource(&self.db, id).await?;
        if !self.policy.check_resource(&resource, actor, AccessType::Write) {
            return Err(CrmError::AccessDenied);
        }

        let session = self.sessions.create(
            resource.kind(),
            Some(id),
            actor.id,
            StagedChanges::default(),
            None,
        );
        tracing::info!(token = %session.token, resource_id = %id, "Edit session created");
        Ok(session)
    }

    /// Open a session creating a new resource of `kind`.
    pub async fn start_create(
        &self,
        actor: &Actor,
        kind: VariantKind,
        staged: StagedChanges,
        finished_url: Option<String>,
    ) -> Result<EditSession, CrmError> {
        let mut resource = Resource::new(kind);
        resource.set_created_by(actor.id)?;
        if !self.policy.check_resource(&resource, actor, AccessType::Create) {
            return Err(CrmError::AccessDenied);
        }

        let session = self
            .sessions
            .create(kind, None, actor.id, staged, finished_url);
        tracing::info!(token = %session.token, kind = %kind, "Create session created");
        Ok(session)
    }

    /// Current persisted state with the session's staged edits on top.
    pub async fn open(&self, session: &EditSession) -> Result<Resource, CrmError> {
        let mut resource = match session.resource_id {
            Some(id) => storage::get_resource(&self.db, id).await?,
            None => {
                let mut resource = Resource::new(session.kind);
                resource.set_created_by(session.creator)?;
                resource
            }
        };
        resource.restage(session.staged.clone());
        Ok(resource)
    }

    pub async fn view(&self, actor: &Actor, token: &str) -> Result<EditView, CrmError> {
        let session = self
            .sessions
            .get(token, actor)
            .ok_or_else(|| CrmError::not_found("edit session"))?;
        let resource = self.open(&session).await?;

        let fields = resource
            .fields()
            .filter(|field| {
                self.policy
                    .check_field(&resource, field, actor, AccessType::Read)
            })
            .map(|field| FieldView {
                name: field.name,
                label: field.label.clone(),
                widget: field.widget,
                value: resource.value(field.name).unwrap_or(FieldValue::Empty),
                editable: self.policy.can_edit_field(&resource, field, actor),
                actions: actions::table_for(&field.kind)
                    .iter()
                    .map(|a| a.name)
                    .collect(),
                messages: session
                    .field_messages
                    .get(field.name)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();

        Ok(EditView {
            token: session.token.clone(),
            kind: session.kind,
            resource_id: session.resource_id,
            title: resource.title(),
            form_url: session.form_url(),
            fields,
            messages: session.messages.clone(),
        })
    }

    /// Apply one submission: either a named action or the default
    /// set-value path followed by a commit attempt.
    pub async fn submit(
        &self,
        actor: &Actor,
        token: &str,
        submission: Submission,
    ) -> Result<SubmitOutcome, CrmError> {
        let mut session = self
            .sessions
            .get(token, actor)
            .ok_or_else(|| CrmError::not_found("edit session"))?;
        let mut resource = self.open(&session).await?;

        let access = if resource.is_new() {
            AccessType::Create
        } else {
            AccessType::Write
        };
        if !self.policy.check_resource(&resource, actor, access) {
            return Err(CrmError::AccessDenied);
        }

        let mut ctx = CommitContext::new(ExceptionPolicy::dismissing(submission.dismissed.clone()));

        if let Some(action) = submission.action.as_deref().filter(|a| !a.is_empty()) {
            return self
                .run_action(actor, &mut session, &mut resource, &mut ctx, action, &submission)
                .await;
        }

        for field in resource.fields() {
            if field.is_table() || !submission.values.contains_key(field.name) {
                continue;
            }
            if !self.policy.can_edit_field(&resource, field, actor) {
                tracing::debug!(field = field.name, "Skipping field without write access");
                continue;
            }
            let input = ActionInput::for_field(field, &submission.values, &self.default_currency);
            self.stage_set_value(&mut resource, &mut ctx, field, &input)?;
        }

        for mutation in resource.pending_mutations() {
            ctx.add(mutation);
        }
        resource.validate(&self.db, &mut ctx).await?;
        ctx.mark_validated();

        if ctx.has_exceptions() {
            tracing::warn!(
                token = %session.token,
                exceptions = ctx.exceptions().len(),
                "Commit refused"
            );
            session.staged = resource.staged().clone();
            session.record(ctx.exceptions());
            let redirect = session.form_url();
            self.sessions.update(session);
            return Ok(SubmitOutcome::Form { redirect });
        }

        let id = storage::commit(&self.db, &mut resource, &mut ctx, actor).await?;
        self.sessions.remove(&session.token);
        tracing::info!(token = %session.token, resource_id = %id, "Edit session committed");

        Ok(SubmitOutcome::Committed {
            id,
            redirect: session.finished_url_for(id),
        })
    }

    fn stage_set_value(
        &self,
        resource: &mut Resource,
        ctx: &mut CommitContext,
        field: &'static Field,
        input: &ActionInput<'_>,
    ) -> Result<(), CrmError> {
        match actions::parse_set_value(field, input) {
            Ok(Some(argument)) => resource.set(field.name, argument),
            Ok(None) => Ok(()),
            Err(e) => {
                ctx.field(field.name)
                    .error(&format!("{}.invalid", field.name), &e.to_string());
                Ok(())
            }
        }
    }

    async fn run_action(
        &self,
        actor: &Actor,
        session: &mut EditSession,
        resource: &mut Resource,
        ctx: &mut CommitContext,
        action: &str,
        submission: &Submission,
    ) -> Result<SubmitOutcome, CrmError> {
        let (field_name, action_name) = action
            .split_once('.')
            .ok_or_else(|| CrmError::BadRequest(format!("malformed action `{action}`")))?;
        let field = resource
            .field(field_name)
            .ok_or_else(|| CrmError::BadRequest(format!("unknown action `{action}`")))?;
        let spec = field
            .action(action_name)
            .ok_or_else(|| CrmError::BadRequest(format!("unknown action `{action}`")))?;
        if !self.policy.can_edit_field(resource, field, actor) {
            return Err(CrmError::AccessDenied);
        }

        let input = ActionInput::for_field(field, &submission.values, &self.default_currency);
        tracing::debug!(token = %session.token, action, "Running field action");

        match spec.kind {
            ActionKind::SetValue => self.stage_set_value(resource, ctx, field, &input)?,
            ActionKind::AddRow | ActionKind::RemoveSelected => {
                let mutation = if spec.kind == ActionKind::AddRow {
                    ADD_ROW
                } else {
                    REMOVE_ROW
                };
                match actions::parse_selected(&input) {
                    Ok(ids) => {
                        for id in ids {
                            if let Some(row) = self.child_row(actor, ctx, field, id).await? {
                                resource.stage(Mutation::new(field, mutation, Argument::Row(row))?)?;
                            }
                        }
                    }
                    Err(e) => ctx
                        .field(field.name)
                        .error(&format!("{}.invalid", field.name), &e.to_string()),
                }
            }
            ActionKind::CreateNew => {
                if let Some(redirect) = self.spawn_child(actor, session, resource, ctx, field).await? {
                    return Ok(SubmitOutcome::Spawned { redirect });
                }
            }
        }

        for mutation in resource.staged().iter().cloned().collect::<Vec<_>>() {
            mutation.check(ctx);
        }
        session.staged = resource.staged().clone();
        session.record(ctx.exceptions());
        let redirect = session.form_url();
        self.sessions.update(session.clone());
        Ok(SubmitOutcome::Form { redirect })
    }

    /// Row argument for a child of the table's child type whose back
    /// reference the actor may rewrite. Missing, foreign-kind and
    /// unwritable children all get the same field error.
    async fn child_row(
        &self,
        actor: &Actor,
        ctx: &mut CommitContext,
        field: &'static Field,
        id: ResourceId,
    ) -> Result<Option<RowRef>, CrmError> {
        let foreign = field.foreign_field().ok_or_else(|| {
            CrmError::Integrity(format!("{}.{} has no foreign field", field.owner, field.name))
        })?;

        match storage::get_resource(&self.db, id).await {
            Ok(child)
                if child.kind() == foreign.owner
                    && self.policy.can_edit_field(&child, foreign, actor) =>
            {
                Ok(Some(RowRef {
                    id,
                    title: child.title(),
                }))
            }
            Ok(_) | Err(CrmError::NotFound(_)) => {
                tracing::debug!(child = %id, field = field.name, "Rejected table row");
                ctx.field(field.name).error(
                    &format!("{}.unknown_row", field.name),
                    &format!("No {} with id {id} exists.", foreign.owner.label()),
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Open a create session for the table's child type with its back
    /// reference preset. Returns the child form URL.
    async fn spawn_child(
        &self,
        actor: &Actor,
        session: &mut EditSession,
        resource: &Resource,
        ctx: &mut CommitContext,
        field: &'static Field,
    ) -> Result<Option<String>, CrmError> {
        let foreign = field.foreign_field().ok_or_else(|| {
            CrmError::Integrity(format!("{}.{} has no foreign field", field.owner, field.name))
        })?;

        let Some(parent) = resource.id() else {
            ctx.field(field.name).error(
                &format!("{}.unsaved_parent", field.name),
                &format!("Save this {} before adding rows.", resource.kind().label()),
            );
            return Ok(None);
        };

        let mut staged = StagedChanges::default();
        staged.stage(Mutation::set_value(
            foreign,
            Argument::Value(FieldValue::Reference(parent)),
        )?);

        session.staged = resource.staged().clone();
        self.sessions.update(session.clone());

        let child = self
            .start_create(actor, foreign.owner, staged, Some(session.form_url()))
            .await?;
        Ok(Some(child.form_url()))
    }
}
