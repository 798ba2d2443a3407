use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::access::{AccessControlList, AccessGroup};
use crate::fields::{label_from_name, Choices, Column, Field, FieldKind};

/// Closed set of concrete resource types. Declaration order is the probing
/// order used when resolving a resource row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariantKind {
    Account,
    Opportunity,
    SalesOrder,
    User,
}

impl VariantKind {
    pub const ALL: [VariantKind; 4] = [
        VariantKind::Account,
        VariantKind::Opportunity,
        VariantKind::SalesOrder,
        VariantKind::User,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Account => "Account",
            Self::Opportunity => "Opportunity",
            Self::SalesOrder => "SalesOrder",
            Self::User => "User",
        }
    }

    pub fn snake_name(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Opportunity => "opportunity",
            Self::SalesOrder => "sales_order",
            Self::User => "user",
        }
    }

    /// Accepts `SalesOrder` as well as `sales_order`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == name || k.snake_name() == name)
    }

    /// Variant table holding this kind's field columns.
    pub fn table(self) -> &'static str {
        match self {
            Self::Account => "accounts",
            Self::Opportunity => "opportunities",
            Self::SalesOrder => "sales_orders",
            Self::User => "users",
        }
    }

    /// Foreign key column on the `resources` table pointing at this kind's
    /// variant table.
    pub fn resource_column(self) -> &'static str {
        match self {
            Self::Account => "account_id",
            Self::Opportunity => "opportunity_id",
            Self::SalesOrder => "sales_order_id",
            Self::User => "user_id",
        }
    }

    /// Human readable name, e.g. `Sales Order`.
    pub fn label(self) -> String {
        label_from_name(self.snake_name())
    }

    pub fn schema(self) -> &'static VariantSchema {
        match self {
            Self::Account => &ACCOUNT,
            Self::Opportunity => &OPPORTUNITY,
            Self::SalesOrder => &SALES_ORDER,
            Self::User => &USER,
        }
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    Administrator,
    Sales,
}

impl UserRole {
    pub const VARIANTS: &'static [&'static str] = &["Administrator", "Sales"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::Sales => "Sales",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Administrator" => Ok(Self::Administrator),
            "Sales" => Ok(Self::Sales),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

pub const OPPORTUNITY_STAGES: &[&str] = &[
    "Prospecting",
    "Qualification",
    "Proposal",
    "Negotiation",
    "Closed Won",
    "Closed Lost",
];

/// Static descriptor of one variant type: its table, resource-level ACL and
/// ordered field list.
#[derive(Debug)]
pub struct VariantSchema {
    pub kind: VariantKind,
    pub acl: AccessControlList,
    pub fields: Vec<Field>,
}

impl VariantSchema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Every storage column in field order. `id`, `created_by` and
    /// `deleted_by` are not included.
    pub fn columns(&self) -> Vec<Column> {
        self.fields.iter().flat_map(|f| f.columns()).collect()
    }
}

static ACCOUNT: LazyLock<VariantSchema> = LazyLock::new(|| {
    let kind = VariantKind::Account;
    VariantSchema {
        kind,
        acl: AccessControlList::default(),
        fields: vec![
            Field::new(kind, "name", FieldKind::Text).required(),
            Field::new(kind, "description", FieldKind::Text).widget("textarea"),
            Field::new(kind, "email", FieldKind::Text).label("E-Mail Address"),
            Field::new(kind, "phone", FieldKind::Text).label("Phone Number"),
            Field::new(kind, "mail_address", FieldKind::Text).widget("textarea"),
            Field::new(kind, "billing_address", FieldKind::Text).widget("textarea"),
            Field::new(kind, "logo", FieldKind::File),
            Field::new(kind, "opportunities", FieldKind::Table("Opportunity.account")),
        ],
    }
});

static OPPORTUNITY: LazyLock<VariantSchema> = LazyLock::new(|| {
    let kind = VariantKind::Opportunity;
    VariantSchema {
        kind,
        acl: AccessControlList::default(),
        fields: vec![
            Field::new(kind, "name", FieldKind::Text).required(),
            Field::new(kind, "description", FieldKind::Text).widget("textarea"),
            Field::new(kind, "account", FieldKind::Reference(VariantKind::Account)),
            Field::new(kind, "stage", FieldKind::Choice(Choices::List(OPPORTUNITY_STAGES))),
            Field::new(kind, "sales_orders", FieldKind::Table("SalesOrder.opportunity")),
        ],
    }
});

static SALES_ORDER: LazyLock<VariantSchema> = LazyLock::new(|| {
    let kind = VariantKind::SalesOrder;
    VariantSchema {
        kind,
        acl: AccessControlList::default(),
        fields: vec![
            Field::new(kind, "opportunity", FieldKind::Reference(VariantKind::Opportunity)),
            Field::new(kind, "description", FieldKind::Text).widget("textarea"),
            Field::new(kind, "start_date", FieldKind::Date),
            Field::new(kind, "end_date", FieldKind::Date),
            Field::new(kind, "base_price", FieldKind::Currency),
            Field::new(kind, "hourly_price", FieldKind::Currency),
        ],
    }
});

static USER: LazyLock<VariantSchema> = LazyLock::new(|| {
    use AccessGroup::*;

    let kind = VariantKind::User;
    VariantSchema {
        kind,
        acl: AccessControlList::readable_by(&[Other])
            .writable_by(&[SelfUser, Admin])
            .creatable_by(&[Admin]),
        fields: vec![
            Field::new(kind, "username", FieldKind::Text).required(),
            Field::new(kind, "password", FieldKind::Password).required(),
            Field::new(
                kind,
                "role",
                FieldKind::Choice(Choices::Enumeration {
                    name: "UserRole",
                    variants: UserRole::VARIANTS,
                }),
            )
            .acl(AccessControlList::readable_by(&[Other]).writable_by(&[Admin])),
        ],
    }
});
