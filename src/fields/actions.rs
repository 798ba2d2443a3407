use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::fields::{
    Argument, CurrencyValue, Field, FieldError, FieldKind, FieldValue, Upload, DATE_FORMAT,
};
use crate::resource::ResourceId;

pub const SET_VALUE: &str = "set_value";
pub const ADD_ROW: &str = "add_row";
pub const REMOVE_SELECTED: &str = "remove_selected";
pub const CREATE_NEW: &str = "create_new";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Stage a `set_value` mutation from the submitted value
    SetValue,
    /// Stage `add_row` for every id in `<field>.selected`
    AddRow,
    /// Stage `remove_row` for every id in `<field>.selected`
    RemoveSelected,
    /// Open a nested create session for the child type
    CreateNew,
}

/// A named action a field kind exposes to forms.
#[derive(Debug)]
pub struct ActionSpec {
    pub name: &'static str,
    pub kind: ActionKind,
}

static VALUE_ACTIONS: [ActionSpec; 1] = [ActionSpec {
    name: SET_VALUE,
    kind: ActionKind::SetValue,
}];

static TABLE_ACTIONS: [ActionSpec; 3] = [
    ActionSpec {
        name: ADD_ROW,
        kind: ActionKind::AddRow,
    },
    ActionSpec {
        name: REMOVE_SELECTED,
        kind: ActionKind::RemoveSelected,
    },
    ActionSpec {
        name: CREATE_NEW,
        kind: ActionKind::CreateNew,
    },
];

pub fn table_for(kind: &FieldKind) -> &'static [ActionSpec] {
    match kind {
        FieldKind::Table(_) => &TABLE_ACTIONS,
        _ => &VALUE_ACTIONS,
    }
}

/// One submitted form entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmittedValue {
    Text(String),
    File { filename: String, content: Vec<u8> },
}

/// What a field's action sees of a request: its own value plus the
/// `<field>.<argument>` entries with the prefix stripped.
#[derive(Debug)]
pub struct ActionInput<'a> {
    pub value: Option<&'a SubmittedValue>,
    pub arguments: BTreeMap<&'a str, &'a str>,
    pub default_currency: &'a str,
}

impl<'a> ActionInput<'a> {
    pub fn for_field(
        field: &Field,
        values: &'a BTreeMap<String, SubmittedValue>,
        default_currency: &'a str,
    ) -> Self {
        let prefix = format!("{}.", field.name);
        let arguments = values
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(&prefix)?;
                match value {
                    SubmittedValue::Text(text) => Some((name, text.as_str())),
                    SubmittedValue::File { .. } => None,
                }
            })
            .collect();

        Self {
            value: values.get(field.name),
            arguments,
            default_currency,
        }
    }

    pub fn argument(&self, name: &str) -> Option<&'a str> {
        self.arguments.get(name).copied()
    }

    fn text(&self) -> Option<&'a str> {
        match self.value {
            Some(SubmittedValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// Build the `set_value` argument for a submission. `Ok(None)` stages
/// nothing: no value was sent, an empty password, or an empty filename.
pub fn parse_set_value(field: &Field, input: &ActionInput<'_>) -> Result<Option<Argument>, FieldError> {
    let value = |v: FieldValue| Ok(Some(Argument::Value(v)));

    if let FieldKind::File = field.kind {
        return match input.value {
            Some(SubmittedValue::File { filename, content }) if !filename.is_empty() => {
                Ok(Some(Argument::Upload(Upload::new(filename.clone(), content.clone()))))
            }
            Some(SubmittedValue::File { .. }) | None => Ok(None),
            Some(SubmittedValue::Text(text)) if text.is_empty() => Ok(None),
            Some(SubmittedValue::Text(_)) => Err(FieldError::WrongArgument),
        };
    }

    let Some(text) = input.text() else {
        return Ok(None);
    };

    match &field.kind {
        FieldKind::Text => value(FieldValue::Text(text.to_string())),
        FieldKind::Password if text.is_empty() => Ok(None),
        FieldKind::Password => Ok(Some(Argument::Secret {
            password: text.to_string(),
            confirmation: input.argument("confirmation").map(str::to_string),
        })),
        _ if text.trim().is_empty() => value(FieldValue::Empty),
        FieldKind::Choice(_) => value(FieldValue::Choice(text.to_string())),
        FieldKind::Currency => {
            let code = input
                .argument("currency")
                .filter(|c| !c.is_empty())
                .unwrap_or(input.default_currency);
            value(FieldValue::Currency(CurrencyValue::parse(text, code)?))
        }
        FieldKind::Date => NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
            .map(|d| Some(Argument::Value(FieldValue::Date(d))))
            .map_err(|_| FieldError::InvalidDate(text.to_string())),
        FieldKind::Reference(_) => text
            .trim()
            .parse::<i64>()
            .map(|id| Some(Argument::Value(FieldValue::Reference(ResourceId(id)))))
            .map_err(|_| FieldError::InvalidReference(text.to_string())),
        FieldKind::File | FieldKind::Table(_) => Err(FieldError::WrongArgument),
    }
}

/// Ids listed in `<field>.selected`, comma separated.
pub fn parse_selected(input: &ActionInput<'_>) -> Result<Vec<ResourceId>, FieldError> {
    let Some(selected) = input.argument("selected") else {
        return Ok(Vec::new());
    };

    selected
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map(ResourceId)
                .map_err(|_| FieldError::InvalidReference(part.to_string()))
        })
        .collect()
}
