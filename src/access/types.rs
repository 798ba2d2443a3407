use serde::{Deserialize, Serialize};

use crate::access::errors::AclError;

/// Fallback used by every resource type and field that declares no ACL.
pub const DEFAULT_ACL: &str = "read=sAaOg,write=sAO,delete=OA,create=o";

/// Subject groups an ACL entry can grant access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessGroup {
    /// The acting user is the target resource itself.
    SelfUser,
    /// The acting user created the resource.
    Owner,
    /// The acting user is in the resource's assigned users.
    Assigned,
    Group,
    /// The acting user has the Administrator role.
    Admin,
    /// Anyone.
    Other,
}

impl AccessGroup {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            's' => Some(Self::SelfUser),
            'O' => Some(Self::Owner),
            'a' => Some(Self::Assigned),
            'g' => Some(Self::Group),
            'A' => Some(Self::Admin),
            'o' => Some(Self::Other),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::SelfUser => 's',
            Self::Owner => 'O',
            Self::Assigned => 'a',
            Self::Group => 'g',
            Self::Admin => 'A',
            Self::Other => 'o',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    Read,
    Write,
    Create,
    Delete,
}

impl AccessType {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "r" | "read" => Some(Self::Read),
            "w" | "write" => Some(Self::Write),
            "c" | "create" => Some(Self::Create),
            "d" | "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Create => "create",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Allow-list of subject groups per access type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlList {
    read: Vec<AccessGroup>,
    write: Vec<AccessGroup>,
    create: Vec<AccessGroup>,
    delete: Vec<AccessGroup>,
}

impl AccessControlList {
    /// Everything defaults to `groups`; narrow with the `*_by` methods in
    /// read, write, create, delete order.
    pub fn readable_by(groups: &[AccessGroup]) -> Self {
        Self {
            read: groups.to_vec(),
            write: groups.to_vec(),
            create: groups.to_vec(),
            delete: groups.to_vec(),
        }
    }

    pub fn writable_by(mut self, groups: &[AccessGroup]) -> Self {
        self.write = groups.to_vec();
        self.create = groups.to_vec();
        self.delete = groups.to_vec();
        self
    }

    pub fn creatable_by(mut self, groups: &[AccessGroup]) -> Self {
        self.create = groups.to_vec();
        self.delete = groups.to_vec();
        self
    }

    pub fn deletable_by(mut self, groups: &[AccessGroup]) -> Self {
        self.delete = groups.to_vec();
        self
    }

    /// Parse the compact form, e.g. `read=sAaOg,write=sAO,delete=OA,create=o`.
    /// Access types missing from the string are left empty.
    pub fn parse(source: &str) -> Result<Self, AclError> {
        let mut acl = Self {
            read: Vec::new(),
            write: Vec::new(),
            create: Vec::new(),
            delete: Vec::new(),
        };

        for part in source.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, groups) = part
                .split_once('=')
                .ok_or_else(|| AclError::Malformed(part.to_string()))?;
            let access = AccessType::from_key(key.trim())
                .ok_or_else(|| AclError::UnknownAccessType(key.trim().to_string()))?;

            let list = acl.groups_mut(access);
            for letter in groups.trim().chars() {
                let group = AccessGroup::from_letter(letter).ok_or(AclError::UnknownGroup(letter))?;
                if !list.contains(&group) {
                    list.push(group);
                }
            }
        }

        Ok(acl)
    }

    pub fn groups(&self, access: AccessType) -> &[AccessGroup] {
        match access {
            AccessType::Read => &self.read,
            AccessType::Write => &self.write,
            AccessType::Create => &self.create,
            AccessType::Delete => &self.delete,
        }
    }

    fn groups_mut(&mut self, access: AccessType) -> &mut Vec<AccessGroup> {
        match access {
            AccessType::Read => &mut self.read,
            AccessType::Write => &mut self.write,
            AccessType::Create => &mut self.create,
            AccessType::Delete => &mut self.delete,
        }
    }

    pub fn allows_group(&self, access: AccessType, group: AccessGroup) -> bool {
        self.groups(access).contains(&group)
    }
}

impl Default for AccessControlList {
    fn default() -> Self {
        use AccessGroup::*;
        Self {
            read: vec![SelfUser, Admin, Assigned, Owner, Group],
            write: vec![SelfUser, Admin, Owner],
            create: vec![Other],
            delete: vec![Owner, Admin],
        }
    }
}

impl std::fmt::Display for AccessControlList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts = [
            AccessType::Read,
            AccessType::Write,
            AccessType::Create,
            AccessType::Delete,
        ]
        .into_iter()
        .map(|access| {
            let letters: String = self.groups(access).iter().map(|g| g.letter()).collect();
            format!("{access}={letters}")
        })
        .collect::<Vec<_>>();
        f.write_str(&parts.join(","))
    }
}

/// One `acl` node from a policy file: a resource type or `Type.field`
/// target and its replacement ACL.
#[derive(Debug, Clone)]
pub struct AclOverride {
    pub target: String,
    pub acl: AccessControlList,
}

#[cfg(test)]
mod tests {
    use super::*;
    use AccessGroup::*;

    #[test]
    fn test_default_matches_fallback_string() {
        let parsed = AccessControlList::parse(DEFAULT_ACL).unwrap();
        assert_eq!(parsed, AccessControlList::default());
    }

    #[test]
    fn test_parse_short_and_long_keys() {
        let acl = AccessControlList::parse("r=o,write=sA,c=A,delete=O").unwrap();
        assert_eq!(acl.groups(AccessType::Read), &[Other]);
        assert_eq!(acl.groups(AccessType::Write), &[SelfUser, Admin]);
        assert_eq!(acl.groups(AccessType::Create), &[Admin]);
        assert_eq!(acl.groups(AccessType::Delete), &[Owner]);
    }

    #[test]
    fn test_parse_leaves_missing_types_empty() {
        let acl = AccessControlList::parse("read=o").unwrap();
        assert!(acl.groups(AccessType::Write).is_empty());
        assert!(acl.groups(AccessType::Delete).is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_group() {
        let err = AccessControlList::parse("read=sX").unwrap_err();
        assert!(matches!(err, AclError::UnknownGroup('X')));
    }

    #[test]
    fn test_parse_rejects_unknown_access_type() {
        let err = AccessControlList::parse("execute=A").unwrap_err();
        assert!(matches!(err, AclError::UnknownAccessType(ref k) if k == "execute"));
    }

    #[test]
    fn test_parse_rejects_missing_equals() {
        assert!(matches!(
            AccessControlList::parse("read").unwrap_err(),
            AclError::Malformed(_)
        ));
    }

    #[test]
    fn test_builder_chains_like_keyword_defaults() {
        let acl = AccessControlList::readable_by(&[Other]).writable_by(&[Admin]);
        assert_eq!(acl.groups(AccessType::Read), &[Other]);
        assert_eq!(acl.groups(AccessType::Create), &[Admin]);
        assert_eq!(acl.groups(AccessType::Delete), &[Admin]);
    }

    #[test]
    fn test_display_is_parseable() {
        let acl = AccessControlList::default();
        let reparsed = AccessControlList::parse(&acl.to_string()).unwrap();
        assert_eq!(acl, reparsed);
    }
}
