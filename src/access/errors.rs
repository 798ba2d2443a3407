use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AclError {
    #[error("Failed to load ACL policy file `{path}`")]
    #[diagnostic(
        code(crm::access::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid ACL string: unknown access type identifier `{0}`")]
    #[diagnostic(
        code(crm::access::unknown_access_type),
        help("Access types are r/read, w/write, c/create and d/delete")
    )]
    UnknownAccessType(String),

    #[error("Invalid ACL string: unknown access group identifier `{0}`")]
    #[diagnostic(
        code(crm::access::unknown_group),
        help("Groups are s (self), O (owner), a (assigned), g (group), A (admin) and o (other)")
    )]
    UnknownGroup(char),

    #[error("Invalid ACL string: malformed part `{0}`")]
    #[diagnostic(
        code(crm::access::malformed),
        help("ACL strings look like: read=sAaOg,write=sAO,delete=OA,create=o")
    )]
    Malformed(String),

    #[error("Invalid ACL override: {0}")]
    #[diagnostic(
        code(crm::access::invalid_override),
        help("Overrides look like: acl \"Opportunity\" \"read=aOA,write=OA\" or acl \"User.role\" \"write=A\"")
    )]
    InvalidOverride(String),

    #[error("Unknown resource type `{0}` in ACL override")]
    #[diagnostic(
        code(crm::access::unknown_type),
        help("Known resource types are Account, Opportunity, SalesOrder and User")
    )]
    UnknownResourceType(String),

    #[error("Unknown field `{0}` in ACL override")]
    #[diagnostic(code(crm::access::unknown_field))]
    UnknownField(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(crm::access::kdl_parse),
        help("Check the KDL syntax (https://kdl.dev)")
    )]
    KdlParse(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(crm::access::io))]
    Io(#[from] std::io::Error),
}
