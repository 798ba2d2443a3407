use crate::access::types::{AccessControlList, AccessGroup, AccessType};
use crate::resource::schema::UserRole;
use crate::resource::ResourceId;

/// The authenticated user a request acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ResourceId,
    pub username: String,
    pub role: UserRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Administrator
    }
}

/// What the engine needs to know about a resource instance.
pub trait AccessTarget {
    /// `None` while the instance has never been persisted.
    fn resource_id(&self) -> Option<ResourceId>;
    fn created_by(&self) -> Option<ResourceId>;
    fn assigned_users(&self) -> &[ResourceId];
}

/// Pure allow-list evaluation: true iff any listed group matches.
pub fn check(
    acl: &AccessControlList,
    target: &impl AccessTarget,
    actor: &Actor,
    access: AccessType,
) -> bool {
    acl.groups(access)
        .iter()
        .any(|group| group_matches(*group, target, actor))
}

fn group_matches(group: AccessGroup, target: &impl AccessTarget, actor: &Actor) -> bool {
    match group {
        AccessGroup::Other => true,
        AccessGroup::SelfUser => target.resource_id() == Some(actor.id),
        AccessGroup::Owner => target.created_by() == Some(actor.id),
        AccessGroup::Assigned => target.assigned_users().contains(&actor.id),
        AccessGroup::Admin => actor.is_admin(),
        // No group membership model exists yet.
        AccessGroup::Group => false,
    }
}
