use crate::errors::CrmError;
use crate::fields::{Argument, Field, FieldKind, FieldValue};
use crate::mutation::{CommitPlan, FieldScope, Relink};

pub const SET_VALUE: &str = "set_value";
pub const ADD_ROW: &str = "add_row";
pub const REMOVE_ROW: &str = "remove_row";

type CheckFn = fn(&Field, &Argument, &mut FieldScope<'_>);
type CommitFn = fn(&Field, &Argument, &mut CommitPlan) -> Result<(), CrmError>;
type DescribeFn = fn(&Field, &Argument) -> String;

/// One named mutation a field kind supports: a side-effect free check, the
/// commit step that writes into a [`CommitPlan`], and an audit description.
pub struct MutationSpec {
    pub name: &'static str,
    pub check: CheckFn,
    pub commit: CommitFn,
    pub describe: DescribeFn,
}

impl std::fmt::Debug for MutationSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationSpec").field("name", &self.name).finish()
    }
}

static VALUE_MUTATIONS: [MutationSpec; 1] = [MutationSpec {
    name: SET_VALUE,
    check: check_argument,
    commit: commit_set_value,
    describe: describe_set_value,
}];

static PASSWORD_MUTATIONS: [MutationSpec; 1] = [MutationSpec {
    name: SET_VALUE,
    check: check_argument,
    commit: commit_set_value,
    describe: describe_password,
}];

static FILE_MUTATIONS: [MutationSpec; 1] = [MutationSpec {
    name: SET_VALUE,
    check: check_argument,
    commit: commit_upload,
    describe: describe_upload,
}];

static TABLE_MUTATIONS: [MutationSpec; 2] = [
    MutationSpec {
        name: ADD_ROW,
        check: check_argument,
        commit: commit_add_row,
        describe: describe_add_row,
    },
    MutationSpec {
        name: REMOVE_ROW,
        check: check_argument,
        commit: commit_remove_row,
        describe: describe_remove_row,
    },
];

pub fn table_for(kind: &FieldKind) -> &'static [MutationSpec] {
    match kind {
        FieldKind::Password => &PASSWORD_MUTATIONS,
        FieldKind::File => &FILE_MUTATIONS,
        FieldKind::Table(_) => &TABLE_MUTATIONS,
        _ => &VALUE_MUTATIONS,
    }
}

fn check_argument(field: &Field, argument: &Argument, scope: &mut FieldScope<'_>) {
    if let Err(e) = field.validate(argument) {
        scope.error(&format!("{}.invalid", field.name), &e.to_string());
    }
}

fn commit_set_value(field: &Field, argument: &Argument, plan: &mut CommitPlan) -> Result<(), CrmError> {
    plan.set_columns(field.to_storage(argument)?);
    Ok(())
}

fn commit_upload(field: &Field, argument: &Argument, plan: &mut CommitPlan) -> Result<(), CrmError> {
    if let Argument::Upload(upload) = argument {
        plan.blobs.push(upload.clone());
    }
    commit_set_value(field, argument, plan)
}

fn row_relink(field: &Field, argument: &Argument, attach: bool) -> Result<Relink, CrmError> {
    let foreign = field.foreign_field().ok_or_else(|| {
        CrmError::Integrity(format!("table field `{}` has no foreign field", field.name))
    })?;
    let Argument::Row(row) = argument else {
        return Err(CrmError::BadRequest(format!(
            "{}: row mutation without a row",
            field.name
        )));
    };
    Ok(if attach {
        Relink::Attach {
            foreign,
            child: row.id,
        }
    } else {
        Relink::Detach {
            foreign,
            child: row.id,
        }
    })
}

fn commit_add_row(field: &Field, argument: &Argument, plan: &mut CommitPlan) -> Result<(), CrmError> {
    plan.relinks.push(row_relink(field, argument, true)?);
    Ok(())
}

fn commit_remove_row(field: &Field, argument: &Argument, plan: &mut CommitPlan) -> Result<(), CrmError> {
    plan.relinks.push(row_relink(field, argument, false)?);
    Ok(())
}

fn describe_set_value(field: &Field, argument: &Argument) -> String {
    match argument.preview() {
        FieldValue::Empty => format!("Clear field \"{}\".", field.label),
        value => format!("Change field \"{}\" to \"{value}\".", field.label),
    }
}

fn describe_password(field: &Field, _argument: &Argument) -> String {
    format!("Change field \"{}\".", field.label)
}

fn describe_upload(field: &Field, argument: &Argument) -> String {
    match argument {
        Argument::Upload(upload) => {
            format!("Upload \"{}\" to field \"{}\".", upload.filename, field.label)
        }
        _ => describe_set_value(field, argument),
    }
}

fn row_title(argument: &Argument) -> String {
    match argument {
        Argument::Row(row) => row.title.clone(),
        _ => String::new(),
    }
}

fn describe_add_row(field: &Field, argument: &Argument) -> String {
    format!("Add \"{}\" to \"{}\".", row_title(argument), field.label)
}

fn describe_remove_row(field: &Field, argument: &Argument) -> String {
    format!("Remove \"{}\" from \"{}\".", row_title(argument), field.label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{CurrencyValue, RowRef, Upload};
    use crate::resource::{ResourceId, VariantKind};

    fn field(kind: VariantKind, name: &str) -> &'static Field {
        kind.schema().field(name).unwrap()
    }

    #[test]
    fn test_lookup_by_name() {
        let name = field(VariantKind::Account, "name");
        assert!(name.mutation(SET_VALUE).is_some());
        assert!(name.mutation(ADD_ROW).is_none());

        let rows = field(VariantKind::Account, "opportunities");
        assert!(rows.mutation(ADD_ROW).is_some());
        assert!(rows.mutation(REMOVE_ROW).is_some());
        assert!(rows.mutation(SET_VALUE).is_none());
    }

    #[test]
    fn test_descriptions() {
        let email = field(VariantKind::Account, "email");
        let spec = email.mutation(SET_VALUE).unwrap();
        let arg = Argument::Value(FieldValue::Text("a@example.com".into()));
        assert_eq!(
            (spec.describe)(email, &arg),
            "Change field \"E-Mail Address\" to \"a@example.com\"."
        );

        let price = field(VariantKind::SalesOrder, "base_price");
        let arg = Argument::Value(FieldValue::Currency(CurrencyValue {
            amount: 500,
            currency: "USD".into(),
        }));
        assert_eq!(
            (price.mutation(SET_VALUE).unwrap().describe)(price, &arg),
            "Change field \"Base Price\" to \"$5.00\"."
        );

        let password = field(VariantKind::User, "password");
        let arg = Argument::Secret {
            password: "hunter2".into(),
            confirmation: None,
        };
        let text = (password.mutation(SET_VALUE).unwrap().describe)(password, &arg);
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_commit_upload_collects_blob() {
        let logo = field(VariantKind::Account, "logo");
        let upload = Upload::new("logo.png", vec![1, 2, 3]);
        let mut plan = CommitPlan::default();
        (logo.mutation(SET_VALUE).unwrap().commit)(logo, &Argument::Upload(upload.clone()), &mut plan)
            .unwrap();

        assert_eq!(plan.blobs, vec![upload.clone()]);
        assert_eq!(
            plan.columns.get("logo").and_then(|v| v.as_text()),
            Some(upload.hash.as_str())
        );
    }

    #[test]
    fn test_commit_rows_become_relinks() {
        let rows = field(VariantKind::Account, "opportunities");
        let arg = Argument::Row(RowRef {
            id: ResourceId(9),
            title: "Deal".into(),
        });
        let mut plan = CommitPlan::default();
        (rows.mutation(ADD_ROW).unwrap().commit)(rows, &arg, &mut plan).unwrap();
        (rows.mutation(REMOVE_ROW).unwrap().commit)(rows, &arg, &mut plan).unwrap();

        assert!(matches!(plan.relinks[0], Relink::Attach { child: ResourceId(9), .. }));
        assert!(matches!(plan.relinks[1], Relink::Detach { child: ResourceId(9), .. }));
        assert_eq!(
            (rows.mutation(REMOVE_ROW).unwrap().describe)(rows, &arg),
            "Remove \"Deal\" from \"Opportunities\"."
        );
    }
}
