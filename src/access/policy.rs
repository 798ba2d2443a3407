use crate::access::errors::AclError;
use crate::access::types::{AccessControlList, AclOverride};
use kdl::KdlDocument;

/// Parse a KDL document into ACL overrides.
///
/// Two node shapes are accepted:
/// ```kdl
/// acl "Opportunity" "read=aOA,write=OA"
///
/// acl "User.role" {
///     read "o"
///     write "A"
/// }
/// ```
pub fn parse_kdl_document(source: &str) -> Result<Vec<AclOverride>, AclError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AclError::KdlParse(e.to_string()))?;

    let mut overrides = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "acl" => {
                let mut args = string_args(node).into_iter();
                let target = args.next().ok_or_else(|| {
                    AclError::InvalidOverride(
                        "acl node requires a target argument (e.g. acl \"Account\")".into(),
                    )
                })?;

                let mut parts: Vec<String> = args.collect();

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        let key = child.name().value();
                        let groups = string_args(child).into_iter().next().ok_or_else(|| {
                            AclError::InvalidOverride(format!(
                                "`{key}` in acl `{target}` requires a group string"
                            ))
                        })?;
                        parts.push(format!("{key}={groups}"));
                    }
                }

                if parts.is_empty() {
                    return Err(AclError::InvalidOverride(format!(
                        "acl `{target}` declares no access rules"
                    )));
                }

                let acl = AccessControlList::parse(&parts.join(","))?;
                overrides.push(AclOverride { target, acl });
            }
            other => {
                return Err(AclError::InvalidOverride(format!(
                    "unknown node type `{other}` (expected `acl`)"
                )));
            }
        }
    }

    Ok(overrides)
}

fn string_args(node: &kdl::KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::types::{AccessGroup, AccessType};

    #[test]
    fn test_parse_inline_override() {
        let overrides = parse_kdl_document(r#"acl "Opportunity" "read=aOA,write=OA""#).unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].target, "Opportunity");
        assert_eq!(
            overrides[0].acl.groups(AccessType::Write),
            &[AccessGroup::Owner, AccessGroup::Admin]
        );
    }

    #[test]
    fn test_parse_block_override() {
        let kdl = r#"
acl "User.role" {
    read "o"
    write "A"
}
"#;
        let overrides = parse_kdl_document(kdl).unwrap();
        assert_eq!(overrides[0].target, "User.role");
        assert_eq!(overrides[0].acl.groups(AccessType::Read), &[AccessGroup::Other]);
        assert_eq!(overrides[0].acl.groups(AccessType::Write), &[AccessGroup::Admin]);
        assert!(overrides[0].acl.groups(AccessType::Delete).is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_letter() {
        let err = parse_kdl_document(r#"acl "Account" "read=Z""#).unwrap_err();
        assert!(matches!(err, AclError::UnknownGroup('Z')));
    }

    #[test]
    fn test_parse_rejects_unknown_node() {
        let err = parse_kdl_document(r#"role "admin""#).unwrap_err();
        assert!(matches!(err, AclError::InvalidOverride(_)));
    }

    #[test]
    fn test_parse_rejects_empty_rules() {
        let err = parse_kdl_document(r#"acl "Account""#).unwrap_err();
        assert!(matches!(err, AclError::InvalidOverride(_)));
    }

    #[test]
    fn test_parse_invalid_kdl() {
        let err = parse_kdl_document("acl \"Account\" {").unwrap_err();
        assert!(matches!(err, AclError::KdlParse(_)));
    }
}
