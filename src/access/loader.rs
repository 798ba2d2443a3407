use std::collections::HashMap;
use std::path::Path;

use crate::access::errors::AclError;
use crate::access::policy::parse_kdl_document;
use crate::access::types::AclOverride;
use crate::access::AccessPolicy;
use crate::resource;

/// Load all `.kdl` override files from the given directory and compile them
/// on top of the schema ACLs.
pub fn load_policies(dir: &Path) -> Result<AccessPolicy, AclError> {
    if !dir.is_dir() {
        return Err(AclError::InvalidOverride(format!(
            "policies directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "kdl")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    let mut all = Vec::new();
    let mut file_count = 0;
    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| AclError::PolicyLoadError {
                path: path.display().to_string(),
                source,
            })?;
        all.extend(parse_kdl_document(&contents)?);
        file_count += 1;
    }

    let policy = compile_overrides(all)?;

    tracing::info!(
        files = file_count,
        resource_overrides = policy.resources.len(),
        field_overrides = policy.fields.len(),
        "Loaded ACL overrides"
    );

    Ok(policy)
}

/// Resolve override targets against the schema registry. Later overrides
/// for the same target replace earlier ones.
pub fn compile_overrides(overrides: Vec<AclOverride>) -> Result<AccessPolicy, AclError> {
    let mut resources = HashMap::new();
    let mut fields = HashMap::new();

    for o in overrides {
        match o.target.split_once('.') {
            None => {
                let kind = resource::get_type(&o.target)
                    .ok_or_else(|| AclError::UnknownResourceType(o.target.clone()))?;
                resources.insert(kind, o.acl);
            }
            Some((type_name, _)) => {
                resource::get_type(type_name)
                    .ok_or_else(|| AclError::UnknownResourceType(type_name.to_string()))?;
                let field = resource::resolve_field_reference(&o.target)
                    .ok_or_else(|| AclError::UnknownField(o.target.clone()))?;
                fields.insert((field.owner, field.name), o.acl);
            }
        }
    }

    Ok(AccessPolicy { resources, fields })
}
