//! Mutations and the commit context that validates and applies them.

use std::collections::HashSet;

use serde::Serialize;

use crate::errors::CrmError;
use crate::fields::mutations::{ADD_ROW, REMOVE_ROW, SET_VALUE};
use crate::fields::{Argument, Field, MutationSpec, StoredRow, StoredValue, Upload};
use crate::resource::ResourceId;

/// One staged change against one field.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub field: &'static Field,
    pub spec: &'static MutationSpec,
    pub argument: Argument,
}

impl Mutation {
    /// Resolve `name` in the field's mutation table.
    pub fn new(field: &'static Field, name: &str, argument: Argument) -> Result<Self, CrmError> {
        let spec = field.mutation(name).ok_or_else(|| {
            CrmError::BadRequest(format!("no mutation `{name}` on field `{}`", field.name))
        })?;
        Ok(Self {
            field,
            spec,
            argument,
        })
    }

    pub fn set_value(field: &'static Field, argument: Argument) -> Result<Self, CrmError> {
        Self::new(field, SET_VALUE, argument)
    }

    pub fn is_set_value(&self) -> bool {
        self.spec.name == SET_VALUE
    }

    pub fn is_add_row(&self) -> bool {
        self.spec.name == ADD_ROW
    }

    pub fn is_remove_row(&self) -> bool {
        self.spec.name == REMOVE_ROW
    }

    /// Child id for row mutations.
    pub fn row_id(&self) -> Option<ResourceId> {
        match &self.argument {
            Argument::Row(row) => Some(row.id),
            _ => None,
        }
    }

    pub fn check(&self, ctx: &mut CommitContext) {
        let mut scope = ctx.field(self.field.name);
        (self.spec.check)(self.field, &self.argument, &mut scope);
    }

    pub fn commit(&self, plan: &mut CommitPlan) -> Result<(), CrmError> {
        (self.spec.commit)(self.field, &self.argument, plan)
    }

    pub fn describe(&self) -> String {
        (self.spec.describe)(self.field, &self.argument)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A problem raised while checking or validating a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitException {
    pub id: String,
    pub message: String,
    pub severity: Severity,
    pub fatal: bool,
    /// Field the message belongs to, if any
    pub field: Option<String>,
    /// Button text offered to override a warning
    pub dismiss_label: Option<String>,
}

/// Decides which exceptions are dropped and which fail the context.
#[derive(Debug, Clone, Default)]
pub struct ExceptionPolicy {
    /// Warning ids the user chose to override
    pub dismissed: HashSet<String>,
    pub escalate_warnings: bool,
}

impl ExceptionPolicy {
    pub fn dismissing<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dismissed: ids.into_iter().map(Into::into).collect(),
            escalate_warnings: false,
        }
    }

    pub fn ignore(&self, exception: &CommitException) -> bool {
        exception.severity == Severity::Warning && self.dismissed.contains(&exception.id)
    }

    pub fn is_fatal(&self, exception: &CommitException) -> bool {
        exception.fatal || (self.escalate_warnings && exception.severity == Severity::Warning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextState {
    Open,
    Validated,
    Committed,
    Failed,
}

/// Validation and transaction envelope for one batch of mutations. A
/// context is used for exactly one attempt.
#[derive(Debug)]
pub struct CommitContext {
    state: ContextState,
    policy: ExceptionPolicy,
    mutations: Vec<Mutation>,
    exceptions: Vec<CommitException>,
}

impl CommitContext {
    pub fn new(policy: ExceptionPolicy) -> Self {
        Self {
            state: ContextState::Open,
            policy,
            mutations: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Queue a mutation and check it right away.
    pub fn add(&mut self, mutation: Mutation) {
        mutation.check(self);
        self.mutations.push(mutation);
    }

    pub fn exception(&mut self, exception: CommitException) {
        if self.policy.ignore(&exception) {
            tracing::debug!(id = %exception.id, "Dismissed warning dropped");
            return;
        }
        if self.policy.is_fatal(&exception) {
            self.state = ContextState::Failed;
        }
        self.exceptions.push(exception);
    }

    pub fn error(&mut self, id: &str, message: &str) {
        self.raise(id, message, Severity::Error, None, None);
    }

    pub fn warning(&mut self, id: &str, message: &str, dismiss_label: Option<&str>) {
        self.raise(id, message, Severity::Warning, None, dismiss_label);
    }

    fn raise(
        &mut self,
        id: &str,
        message: &str,
        severity: Severity,
        field: Option<&str>,
        dismiss_label: Option<&str>,
    ) {
        self.exception(CommitException {
            id: id.to_string(),
            message: message.to_string(),
            severity,
            fatal: severity == Severity::Error,
            field: field.map(str::to_string),
            dismiss_label: dismiss_label.map(str::to_string),
        });
    }

    /// Exceptions raised through the scope are bound to `field`.
    pub fn field(&mut self, field: &'static str) -> FieldScope<'_> {
        FieldScope { ctx: self, field }
    }

    pub fn has_failed(&self) -> bool {
        self.state == ContextState::Failed
    }

    pub fn has_exceptions(&self) -> bool {
        !self.exceptions.is_empty()
    }

    pub fn exceptions(&self) -> &[CommitException] {
        &self.exceptions
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.mutations.iter().map(Mutation::describe).collect()
    }

    /// Close the check phase. A failed context stays failed.
    pub fn mark_validated(&mut self) {
        if self.state == ContextState::Open {
            self.state = ContextState::Validated;
        }
    }

    /// Run every commit step in staging order and hand back the resulting
    /// write plan. Refused once any fatal exception has been recorded.
    pub fn commit(&mut self) -> Result<CommitPlan, CrmError> {
        match self.state {
            ContextState::Validated => {}
            ContextState::Failed => {
                return Err(CrmError::CommitRejected(self.exceptions.len()));
            }
            ContextState::Open | ContextState::Committed => {
                return Err(CrmError::Other(format!(
                    "commit attempted in state {:?}",
                    self.state
                )));
            }
        }

        let mut plan = CommitPlan::default();
        for mutation in &self.mutations {
            if let Err(e) = mutation.commit(&mut plan) {
                self.state = ContextState::Failed;
                return Err(e);
            }
            plan.log.push(mutation.describe());
        }

        self.state = ContextState::Committed;
        Ok(plan)
    }
}

/// A view of a [`CommitContext`] bound to one field.
pub struct FieldScope<'a> {
    ctx: &'a mut CommitContext,
    field: &'static str,
}

impl FieldScope<'_> {
    pub fn error(&mut self, id: &str, message: &str) {
        self.ctx
            .raise(id, message, Severity::Error, Some(self.field), None);
    }

    pub fn warning(&mut self, id: &str, message: &str, dismiss_label: Option<&str>) {
        self.ctx
            .raise(id, message, Severity::Warning, Some(self.field), dismiss_label);
    }
}

/// Re-pointing a child row's reference field at (or away from) the parent
/// being committed.
#[derive(Debug, Clone)]
pub enum Relink {
    Attach {
        foreign: &'static Field,
        child: ResourceId,
    },
    Detach {
        foreign: &'static Field,
        child: ResourceId,
    },
}

/// Everything one commit writes, applied by `storage::persist` inside a
/// single transaction.
#[derive(Debug, Default)]
pub struct CommitPlan {
    pub columns: StoredRow,
    pub blobs: Vec<Upload>,
    pub relinks: Vec<Relink>,
    /// Audit lines, one per mutation
    pub log: Vec<String>,
}

impl CommitPlan {
    pub fn set_columns(&mut self, columns: Vec<(String, StoredValue)>) {
        self.columns.extend(columns);
    }
}
