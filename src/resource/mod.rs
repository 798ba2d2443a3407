//! Polymorphic resources: one global id space shared by every variant kind,
//! with per-instance staged changes layered over the persisted row.

pub mod schema;
pub mod staging;

use std::collections::BTreeMap;

use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};

use crate::access::AccessTarget;
use crate::errors::CrmError;
use crate::fields::{Argument, Field, FieldKind, FieldValue, StoredRow};
use crate::mutation::{CommitContext, Mutation};
use crate::storage;

pub use schema::{UserRole, VariantKind, VariantSchema};
pub use staging::StagedChanges;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub i64);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolve a variant type by name (`SalesOrder` or `sales_order`).
pub fn get_type(name: &str) -> Option<VariantKind> {
    VariantKind::from_name(name)
}

/// Resolve `Type.field` to its descriptor.
pub fn resolve_field_reference(reference: &str) -> Option<&'static Field> {
    let (type_name, field_name) = reference.split_once('.')?;
    get_type(type_name)?.schema().field(field_name)
}

/// Warning id offered for sales orders whose end precedes their start.
pub const DATE_ORDER_WARNING: &str = "sales_order.end_before_start";

/// One resource instance, transient or loaded from storage.
#[derive(Debug, Clone)]
pub struct Resource {
    pub(crate) kind: VariantKind,
    pub(crate) id: Option<ResourceId>,
    pub(crate) variant_id: Option<i64>,
    pub(crate) created_by: Option<ResourceId>,
    pub(crate) deleted_by: Option<ResourceId>,
    pub(crate) assigned: Vec<ResourceId>,
    pub(crate) row: StoredRow,
    /// Persisted child ids per table field
    pub(crate) children: BTreeMap<&'static str, Vec<ResourceId>>,
    pub(crate) staged: StagedChanges,
}

impl Resource {
    /// A transient instance with nothing persisted.
    pub fn new(kind: VariantKind) -> Self {
        Self {
            kind,
            id: None,
            variant_id: None,
            created_by: None,
            deleted_by: None,
            assigned: Vec::new(),
            row: StoredRow::new(),
            children: BTreeMap::new(),
            staged: StagedChanges::default(),
        }
    }

    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    pub fn id(&self) -> Option<ResourceId> {
        self.id
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn variant_id(&self) -> Option<i64> {
        self.variant_id
    }

    pub fn deleted_by(&self) -> Option<ResourceId> {
        self.deleted_by
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_by.is_some()
    }

    /// Only settable before the first save.
    pub fn set_created_by(&mut self, user: ResourceId) -> Result<(), CrmError> {
        if !self.is_new() {
            return Err(CrmError::BadRequest("created_by is immutable".into()));
        }
        self.created_by = Some(user);
        Ok(())
    }

    pub fn schema(&self) -> &'static VariantSchema {
        self.kind.schema()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static Field> {
        self.schema().fields.iter()
    }

    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.schema().field(name)
    }

    pub fn row(&self) -> &StoredRow {
        &self.row
    }

    pub fn staged(&self) -> &StagedChanges {
        &self.staged
    }

    /// Swap in staged changes carried over from an earlier request.
    pub fn restage(&mut self, staged: StagedChanges) {
        self.staged = staged;
    }

    pub fn persisted_value(&self, name: &str) -> Option<FieldValue> {
        let field = self.field(name)?;
        Some(match field.kind {
            FieldKind::Table(_) => FieldValue::Rows(
                self.children.get(field.name).cloned().unwrap_or_default(),
            ),
            _ => field.from_storage(&self.row),
        })
    }

    /// Current value with staged changes applied. Table fields yield the
    /// persisted children plus pending adds minus pending removals.
    pub fn value(&self, name: &str) -> Option<FieldValue> {
        let field = self.field(name)?;

        if field.is_table() {
            let removed = self.staged.removed(name);
            let mut rows: Vec<ResourceId> = self
                .children
                .get(field.name)
                .into_iter()
                .flatten()
                .copied()
                .filter(|id| !removed.contains(id))
                .collect();
            for id in self.staged.added(name) {
                if !rows.contains(&id) {
                    rows.push(id);
                }
            }
            return Some(FieldValue::Rows(rows));
        }

        match self.staged.value(name) {
            Some(argument) => Some(argument.preview()),
            None => self.persisted_value(name),
        }
    }

    /// Stage a mutation; it must target one of this kind's fields.
    pub fn stage(&mut self, mutation: Mutation) -> Result<(), CrmError> {
        if mutation.field.owner != self.kind {
            return Err(CrmError::BadRequest(format!(
                "field `{}.{}` does not belong to {}",
                mutation.field.owner, mutation.field.name, self.kind
            )));
        }
        self.staged.stage(mutation);
        Ok(())
    }

    /// Stage `set_value` on the named field.
    pub fn set(&mut self, name: &str, argument: Argument) -> Result<(), CrmError> {
        let field = self
            .field(name)
            .ok_or_else(|| CrmError::BadRequest(format!("{} has no field `{name}`", self.kind)))?;
        self.stage(Mutation::set_value(field, argument)?)
    }

    /// Staged mutations that still change something, in staging order.
    pub fn pending_mutations(&mut self) -> Vec<Mutation> {
        self.staged.prune(&self.row, &self.children);
        self.staged.iter().cloned().collect()
    }

    pub fn title(&self) -> String {
        let text = |name: &str| match self.value(name) {
            Some(FieldValue::Text(s)) if !s.is_empty() => Some(s),
            _ => None,
        };

        let title = match self.kind {
            VariantKind::Account | VariantKind::Opportunity => text("name"),
            VariantKind::SalesOrder => text("description"),
            VariantKind::User => text("username"),
        };

        title.unwrap_or_else(|| match self.id {
            Some(id) => format!("{} #{id}", self.kind.label()),
            None => format!("New {}", self.kind.label()),
        })
    }

    /// Resource-level validation on top of the per-mutation checks:
    /// required fields, reference targets, and per-kind business rules.
    pub async fn validate<C: ConnectionTrait>(
        &self,
        db: &C,
        ctx: &mut CommitContext,
    ) -> Result<(), CrmError> {
        for field in self.fields() {
            if field.required {
                let missing = match field.kind {
                    FieldKind::Password => self.is_new() && self.staged.value(field.name).is_none(),
                    _ => self.value(field.name).map(|v| v.is_empty()).unwrap_or(true),
                };
                if missing {
                    ctx.field(field.name).error(
                        &format!("{}.required", field.name),
                        &format!("{} is required.", field.label),
                    );
                }
            }

            if let FieldKind::Reference(target) = field.kind {
                if let Some(Argument::Value(FieldValue::Reference(id))) =
                    self.staged.value(field.name)
                {
                    if storage::resource_kind(db, *id).await? != Some(target) {
                        ctx.field(field.name).error(
                            &format!("{}.unknown_reference", field.name),
                            &format!("No {} with id {id} exists.", target.label()),
                        );
                    }
                }
            }
        }

        match self.kind {
            VariantKind::User => self.validate_user(db, ctx).await?,
            VariantKind::SalesOrder => self.validate_sales_order(ctx),
            VariantKind::Account | VariantKind::Opportunity => {}
        }

        Ok(())
    }

    async fn validate_user<C: ConnectionTrait>(
        &self,
        db: &C,
        ctx: &mut CommitContext,
    ) -> Result<(), CrmError> {
        if !self.staged.is_dirty("username") {
            return Ok(());
        }
        if let Some(FieldValue::Text(username)) = self.value("username") {
            if !username.is_empty() && storage::username_taken(db, &username, self.id).await? {
                ctx.field("username").error(
                    "username.taken",
                    &format!("The username \"{username}\" is already taken."),
                );
            }
        }
        Ok(())
    }

    fn validate_sales_order(&self, ctx: &mut CommitContext) {
        if let (Some(FieldValue::Date(start)), Some(FieldValue::Date(end))) =
            (self.value("start_date"), self.value("end_date"))
        {
            if end < start {
                ctx.field("end_date").warning(
                    DATE_ORDER_WARNING,
                    "The end date lies before the start date.",
                    Some("Save anyway"),
                );
            }
        }
    }
}

impl AccessTarget for Resource {
    fn resource_id(&self) -> Option<ResourceId> {
        self.id
    }

    fn created_by(&self) -> Option<ResourceId> {
        self.created_by
    }

    fn assigned_users(&self) -> &[ResourceId] {
        &self.assigned
    }
}
