pub mod engine;
pub mod errors;
pub mod loader;
pub mod policy;
pub mod types;

use std::collections::HashMap;

pub use engine::{AccessTarget, Actor};
pub use types::{AccessControlList, AccessGroup, AccessType};

use crate::fields::Field;
use crate::resource::{Resource, VariantKind};

/// Effective ACLs: the static schema ACLs with any configured overrides on
/// top. Immutable after startup.
#[derive(Debug, Default)]
pub struct AccessPolicy {
    /// Overrides keyed by resource type
    pub(crate) resources: HashMap<VariantKind, AccessControlList>,
    /// Overrides keyed by (owning type, field name)
    pub(crate) fields: HashMap<(VariantKind, &'static str), AccessControlList>,
}

impl AccessPolicy {
    /// Policy with no overrides.
    pub fn from_schema() -> Self {
        Self::default()
    }

    pub fn resource_acl(&self, kind: VariantKind) -> &AccessControlList {
        self.resources
            .get(&kind)
            .unwrap_or_else(|| &kind.schema().acl)
    }

    pub fn field_acl(&self, field: &'static Field) -> &AccessControlList {
        self.fields
            .get(&(field.owner, field.name))
            .unwrap_or(&field.acl)
    }

    /// Whole-resource gate (view, create, delete, edit).
    pub fn check_resource(&self, resource: &Resource, actor: &Actor, access: AccessType) -> bool {
        engine::check(self.resource_acl(resource.kind()), resource, actor, access)
    }

    /// Field-only gate, independent of the resource-level ACL.
    pub fn check_field(
        &self,
        resource: &Resource,
        field: &'static Field,
        actor: &Actor,
        access: AccessType,
    ) -> bool {
        engine::check(self.field_acl(field), resource, actor, access)
    }

    /// Both layers: the resource must be writable (or creatable while it is
    /// transient) and so must the field.
    pub fn can_edit_field(&self, resource: &Resource, field: &'static Field, actor: &Actor) -> bool {
        let access = if resource.is_new() {
            AccessType::Create
        } else {
            AccessType::Write
        };
        self.check_resource(resource, actor, access)
            && self.check_field(resource, field, actor, access)
    }
}
