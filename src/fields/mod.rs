//! Field descriptors: storage layout, conversion between stored columns and
//! presentation values, and the per-kind mutation and action tables.

pub mod actions;
pub mod currency;
pub mod mutations;
pub mod password;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::access::{AccessControlList, AccessGroup};
use crate::errors::CrmError;
use crate::resource::{self, ResourceId, VariantKind};

pub use actions::{ActionKind, ActionSpec};
pub use currency::CurrencyValue;
pub use mutations::MutationSpec;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single column value as read from or written to a variant table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StoredValue {
    Null,
    Integer(i64),
    Text(String),
}

impl StoredValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoredValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            StoredValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

/// Column name to value, for one variant row.
pub type StoredRow = BTreeMap<String, StoredValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Choices {
    /// A Rust enum exposed through its variant names
    Enumeration {
        name: &'static str,
        variants: &'static [&'static str],
    },
    List(&'static [&'static str]),
}

impl Choices {
    pub fn variants(&self) -> &'static [&'static str] {
        match self {
            Choices::Enumeration { variants, .. } | Choices::List(variants) => variants,
        }
    }

    fn check(&self, value: &str) -> Result<(), FieldError> {
        if self.variants().contains(&value) {
            return Ok(());
        }
        match self {
            Choices::Enumeration { name, .. } => Err(FieldError::UnknownVariant {
                enumeration: name,
                value: value.to_string(),
            }),
            Choices::List(_) => Err(FieldError::InvalidVariant(value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Text,
    Password,
    Choice(Choices),
    Currency,
    Date,
    File,
    Reference(VariantKind),
    /// Child rows whose reference field (`Type.field`) points back here.
    Table(&'static str),
}

impl FieldKind {
    fn default_widget(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Password => "password",
            FieldKind::Choice(_) => "choice",
            FieldKind::Currency => "currency",
            FieldKind::Date => "date",
            FieldKind::File => "image",
            FieldKind::Reference(_) => "reference",
            FieldKind::Table(_) => "table",
        }
    }
}

/// Validation failures attributable to a single field. The display text is
/// shown next to the field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("Invalid variant \"{0}\".")]
    InvalidVariant(String),

    #[error("Unknown {enumeration} variant \"{value}\".")]
    UnknownVariant {
        enumeration: &'static str,
        value: String,
    },

    #[error("\"{0}\" is not a valid amount.")]
    InvalidAmount(String),

    #[error("Currency \"{0}\" is not supported.")]
    UnsupportedCurrency(String),

    #[error("\"{0}\" is not a valid date.")]
    InvalidDate(String),

    #[error("\"{0}\" is not a valid reference.")]
    InvalidReference(String),

    #[error("Passwords do not match.")]
    PasswordMismatch,

    #[error("This value cannot be assigned to the field.")]
    WrongArgument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRef {
    pub hash: String,
    pub filename: String,
}

/// Presentation value of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Empty,
    Text(String),
    /// Stands in for a password hash
    Masked,
    Choice(String),
    Currency(CurrencyValue),
    Date(NaiveDate),
    File(FileRef),
    Reference(ResourceId),
    Rows(Vec<ResourceId>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(s) | FieldValue::Choice(s) => s.is_empty(),
            FieldValue::Rows(rows) => rows.is_empty(),
            _ => false,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Empty => Ok(()),
            FieldValue::Text(s) | FieldValue::Choice(s) => f.write_str(s),
            FieldValue::Masked => f.write_str(password::MASK),
            FieldValue::Currency(v) => write!(f, "{v}"),
            FieldValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            FieldValue::File(file) => f.write_str(&file.filename),
            FieldValue::Reference(id) => write!(f, "#{id}"),
            FieldValue::Rows(rows) => write!(f, "{} row(s)", rows.len()),
        }
    }
}

/// Uploaded bytes, keyed by their SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub content: Vec<u8>,
    pub hash: String,
}

impl Upload {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        let hash = hex::encode(Sha256::digest(&content));
        Self {
            filename: filename.into(),
            content,
            hash,
        }
    }
}

/// A child row named in a table mutation, with the title it had when staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRef {
    pub id: ResourceId,
    pub title: String,
}

/// What a mutation carries to its field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Value(FieldValue),
    Secret {
        password: String,
        confirmation: Option<String>,
    },
    Upload(Upload),
    Row(RowRef),
}

impl Argument {
    /// The value a reader sees while this argument is staged.
    pub fn preview(&self) -> FieldValue {
        match self {
            Argument::Value(v) => v.clone(),
            Argument::Secret { .. } => FieldValue::Masked,
            Argument::Upload(u) => FieldValue::File(FileRef {
                hash: u.hash.clone(),
                filename: u.filename.clone(),
            }),
            Argument::Row(_) => FieldValue::Empty,
        }
    }
}

#[derive(Debug)]
pub struct Field {
    pub owner: VariantKind,
    pub name: &'static str,
    pub label: String,
    pub widget: &'static str,
    pub kind: FieldKind,
    pub acl: AccessControlList,
    pub required: bool,
}

impl Field {
    pub fn new(owner: VariantKind, name: &'static str, kind: FieldKind) -> Self {
        Self {
            owner,
            name,
            label: label_from_name(name),
            widget: kind.default_widget(),
            kind,
            acl: AccessControlList::readable_by(&[AccessGroup::Other]),
            required: false,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn widget(mut self, widget: &'static str) -> Self {
        self.widget = widget;
        self
    }

    pub fn acl(mut self, acl: AccessControlList) -> Self {
        self.acl = acl;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn columns(&self) -> Vec<Column> {
        let name = self.name;
        match &self.kind {
            FieldKind::Text | FieldKind::Password | FieldKind::Choice(_) | FieldKind::Date => {
                vec![Column::new(name, ColumnType::Text)]
            }
            FieldKind::Currency => vec![
                Column::new(format!("{name}_amount"), ColumnType::Integer),
                Column::new(format!("{name}_currency"), ColumnType::Text),
            ],
            FieldKind::File => vec![
                Column::new(name, ColumnType::Text),
                Column::new(format!("{name}_filename"), ColumnType::Text),
            ],
            FieldKind::Reference(_) => vec![Column::new(name, ColumnType::Integer)],
            FieldKind::Table(_) => Vec::new(),
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self.kind, FieldKind::Table(_))
    }

    /// The child reference field a table field lists.
    pub fn foreign_field(&self) -> Option<&'static Field> {
        match self.kind {
            FieldKind::Table(reference) => resource::resolve_field_reference(reference),
            _ => None,
        }
    }

    pub fn mutation(&self, name: &str) -> Option<&'static MutationSpec> {
        mutations::table_for(&self.kind)
            .iter()
            .find(|spec| spec.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&'static ActionSpec> {
        actions::table_for(&self.kind)
            .iter()
            .find(|spec| spec.name == name)
    }

    fn text_column<'r>(&self, row: &'r StoredRow, column: &str) -> Option<&'r str> {
        row.get(column).and_then(StoredValue::as_text)
    }

    pub fn from_storage(&self, row: &StoredRow) -> FieldValue {
        let name = self.name;
        match &self.kind {
            FieldKind::Text => {
                FieldValue::Text(self.text_column(row, name).unwrap_or_default().to_string())
            }
            FieldKind::Password => FieldValue::Masked,
            FieldKind::Choice(_) => match self.text_column(row, name) {
                Some(s) => FieldValue::Choice(s.to_string()),
                None => FieldValue::Empty,
            },
            FieldKind::Currency => {
                let amount = row
                    .get(&format!("{name}_amount"))
                    .and_then(StoredValue::as_integer);
                let code = self.text_column(row, &format!("{name}_currency"));
                match (amount, code) {
                    (Some(amount), Some(code)) => FieldValue::Currency(CurrencyValue {
                        amount,
                        currency: code.to_string(),
                    }),
                    _ => FieldValue::Empty,
                }
            }
            FieldKind::Date => match self.text_column(row, name) {
                Some(s) => match NaiveDate::parse_from_str(s, DATE_FORMAT) {
                    Ok(date) => FieldValue::Date(date),
                    Err(_) => {
                        tracing::warn!(field = name, value = s, "Stored date is not ISO formatted");
                        FieldValue::Empty
                    }
                },
                None => FieldValue::Empty,
            },
            FieldKind::File => match self.text_column(row, name) {
                Some(hash) => FieldValue::File(FileRef {
                    hash: hash.to_string(),
                    filename: self
                        .text_column(row, &format!("{name}_filename"))
                        .unwrap_or_default()
                        .to_string(),
                }),
                None => FieldValue::Empty,
            },
            FieldKind::Reference(_) => match row.get(name).and_then(StoredValue::as_integer) {
                Some(id) => FieldValue::Reference(ResourceId(id)),
                None => FieldValue::Empty,
            },
            FieldKind::Table(_) => FieldValue::Rows(Vec::new()),
        }
    }

    /// Check that `argument` fits this field without touching storage.
    pub fn validate(&self, argument: &Argument) -> Result<(), FieldError> {
        use Argument as A;
        use FieldValue as V;

        match (&self.kind, argument) {
            (FieldKind::Text, A::Value(V::Text(_) | V::Empty)) => Ok(()),
            (
                FieldKind::Password,
                A::Secret {
                    password,
                    confirmation,
                },
            ) => match confirmation {
                Some(c) if c != password => Err(FieldError::PasswordMismatch),
                _ => Ok(()),
            },
            (FieldKind::Choice(choices), A::Value(V::Choice(value))) => choices.check(value),
            (FieldKind::Choice(_), A::Value(V::Empty)) => Ok(()),
            (FieldKind::Currency, A::Value(V::Currency(v))) => {
                if currency::is_supported(&v.currency) {
                    Ok(())
                } else {
                    Err(FieldError::UnsupportedCurrency(v.currency.clone()))
                }
            }
            (FieldKind::Currency, A::Value(V::Empty)) => Ok(()),
            (FieldKind::Date, A::Value(V::Date(_) | V::Empty)) => Ok(()),
            (FieldKind::File, A::Upload(_)) => Ok(()),
            (FieldKind::Reference(_), A::Value(V::Reference(_) | V::Empty)) => Ok(()),
            (FieldKind::Table(_), A::Row(_)) => Ok(()),
            _ => Err(FieldError::WrongArgument),
        }
    }

    /// Column values to write for `argument`. Passwords are hashed here.
    pub fn to_storage(&self, argument: &Argument) -> Result<Vec<(String, StoredValue)>, CrmError> {
        self.validate(argument)
            .map_err(|e| CrmError::BadRequest(format!("{}: {e}", self.name)))?;

        let name = self.name.to_string();
        let text = |s: &str| StoredValue::Text(s.to_string());

        let columns = match (&self.kind, argument) {
            (FieldKind::Password, Argument::Secret { password, .. }) => {
                vec![(name, StoredValue::Text(password::hash_password(password)?))]
            }
            (FieldKind::File, Argument::Upload(upload)) => vec![
                (format!("{name}_filename"), text(&upload.filename)),
                (name, text(&upload.hash)),
            ],
            (FieldKind::Currency, Argument::Value(FieldValue::Currency(v))) => vec![
                (format!("{name}_amount"), StoredValue::Integer(v.amount)),
                (format!("{name}_currency"), text(&v.currency)),
            ],
            (FieldKind::Currency, _) => vec![
                (format!("{name}_amount"), StoredValue::Null),
                (format!("{name}_currency"), StoredValue::Null),
            ],
            (FieldKind::Table(_), _) => Vec::new(),
            (_, Argument::Value(value)) => {
                let stored = match value {
                    FieldValue::Empty => StoredValue::Null,
                    FieldValue::Text(s) | FieldValue::Choice(s) => text(s),
                    FieldValue::Date(d) => StoredValue::Text(d.format(DATE_FORMAT).to_string()),
                    FieldValue::Reference(id) => StoredValue::Integer(id.0),
                    _ => return Err(CrmError::BadRequest(format!("{name}: unsupported value"))),
                };
                vec![(name, stored)]
            }
            _ => return Err(CrmError::BadRequest(format!("{name}: unsupported value"))),
        };

        Ok(columns)
    }

    /// Whether `argument` reproduces what is already stored.
    pub fn compare(&self, row: &StoredRow, argument: &Argument) -> bool {
        match (&self.kind, argument) {
            (FieldKind::Password, Argument::Secret { password, .. }) => self
                .text_column(row, self.name)
                .map(|hash| password::verify_password(hash, password))
                .unwrap_or(false),
            (FieldKind::File, Argument::Upload(upload)) => {
                self.text_column(row, self.name) == Some(upload.hash.as_str())
                    && self.text_column(row, &format!("{}_filename", self.name))
                        == Some(upload.filename.as_str())
            }
            (FieldKind::Table(_), _) => false,
            (FieldKind::Text, Argument::Value(FieldValue::Empty)) => {
                self.from_storage(row) == FieldValue::Text(String::new())
            }
            (_, Argument::Value(value)) => self.from_storage(row) == *value,
            _ => false,
        }
    }
}

/// `mail_address` -> `Mail Address`
pub fn label_from_name(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(kind: VariantKind, name: &str) -> &'static Field {
        kind.schema().field(name).unwrap()
    }

    fn stored(field: &Field, argument: &Argument) -> StoredRow {
        field.to_storage(argument).unwrap().into_iter().collect()
    }

    #[test]
    fn test_label_from_name() {
        assert_eq!(label_from_name("mail_address"), "Mail Address");
        assert_eq!(label_from_name("name"), "Name");
        assert_eq!(label_from_name("start_date"), "Start Date");
    }

    #[test]
    fn test_text_null_reads_as_empty_string() {
        let name = field(VariantKind::Account, "name");
        assert_eq!(name.from_storage(&StoredRow::new()), FieldValue::Text(String::new()));
        assert!(name.compare(&StoredRow::new(), &Argument::Value(FieldValue::Text(String::new()))));
    }

    #[test]
    fn test_round_trip_presentation_values() {
        let cases = [
            (
                field(VariantKind::Account, "name"),
                FieldValue::Text("Acme".into()),
            ),
            (
                field(VariantKind::Opportunity, "stage"),
                FieldValue::Choice("Proposal".into()),
            ),
            (
                field(VariantKind::SalesOrder, "base_price"),
                FieldValue::Currency(CurrencyValue {
                    amount: 123450,
                    currency: "EUR".into(),
                }),
            ),
            (
                field(VariantKind::SalesOrder, "start_date"),
                FieldValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            ),
            (
                field(VariantKind::Opportunity, "account"),
                FieldValue::Reference(ResourceId(42)),
            ),
        ];

        for (field, value) in cases {
            let argument = Argument::Value(value.clone());
            let row = stored(field, &argument);
            assert_eq!(field.from_storage(&row), value, "{}", field.name);
            assert!(field.compare(&row, &argument), "{}", field.name);
        }
    }

    #[test]
    fn test_password_is_hashed_and_masked() {
        let password = field(VariantKind::User, "password");
        let secret = Argument::Secret {
            password: "secret123".into(),
            confirmation: Some("secret123".into()),
        };
        let row = stored(password, &secret);

        let hash = row.get("password").and_then(StoredValue::as_text).unwrap();
        assert_ne!(hash, "secret123");
        assert_eq!(password.from_storage(&row), FieldValue::Masked);
        assert_eq!(password.from_storage(&row).to_string(), "*******");
        assert!(password.compare(&row, &secret));

        let wrong = Argument::Secret {
            password: "nope".into(),
            confirmation: None,
        };
        assert!(!password.compare(&row, &wrong));
    }

    #[test]
    fn test_password_confirmation_mismatch() {
        let password = field(VariantKind::User, "password");
        let secret = Argument::Secret {
            password: "secret123".into(),
            confirmation: Some("secret124".into()),
        };
        assert_eq!(password.validate(&secret), Err(FieldError::PasswordMismatch));
        assert!(password.to_storage(&secret).is_err());
    }

    #[test]
    fn test_choice_rejects_unknown_values() {
        let stage = field(VariantKind::Opportunity, "stage");
        assert_eq!(
            stage.validate(&Argument::Value(FieldValue::Choice("Won".into()))),
            Err(FieldError::InvalidVariant("Won".into()))
        );

        let role = field(VariantKind::User, "role");
        let err = role
            .validate(&Argument::Value(FieldValue::Choice("Root".into())))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown UserRole variant \"Root\".");
    }

    #[test]
    fn test_same_bytes_same_hash() {
        let a = Upload::new("a.png", b"\x89PNG".to_vec());
        let b = Upload::new("b.png", b"\x89PNG".to_vec());
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);

        let logo = field(VariantKind::Account, "logo");
        let row_a = stored(logo, &Argument::Upload(a.clone()));
        let row_b = stored(logo, &Argument::Upload(b.clone()));
        assert_eq!(row_a.get("logo"), row_b.get("logo"));
        assert_ne!(row_a.get("logo_filename"), row_b.get("logo_filename"));
        assert!(logo.compare(&row_a, &Argument::Upload(a)));
        assert!(!logo.compare(&row_a, &Argument::Upload(b)));
    }

    #[test]
    fn test_wrong_argument_shape() {
        let name = field(VariantKind::Account, "name");
        assert_eq!(
            name.validate(&Argument::Value(FieldValue::Reference(ResourceId(1)))),
            Err(FieldError::WrongArgument)
        );
    }

    #[test]
    fn test_table_field_resolves_foreign_field() {
        let opportunities = field(VariantKind::Account, "opportunities");
        let foreign = opportunities.foreign_field().unwrap();
        assert_eq!(foreign.owner, VariantKind::Opportunity);
        assert_eq!(foreign.name, "account");
        assert!(opportunities.columns().is_empty());
    }
}
