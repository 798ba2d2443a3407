use std::collections::BTreeMap;

use crate::fields::{Argument, StoredRow};
use crate::mutation::Mutation;
use crate::resource::ResourceId;

/// Ordered, uncommitted mutations for one resource instance.
///
/// A new `set_value` replaces any earlier one for the same field. Row
/// mutations for the same child cancel in pairs and repeats are ignored.
#[derive(Debug, Clone, Default)]
pub struct StagedChanges {
    mutations: Vec<Mutation>,
}

impl StagedChanges {
    pub fn stage(&mut self, mutation: Mutation) {
        let field = mutation.field.name;

        if let Some(id) = mutation.row_id() {
            let same_row =
                |m: &Mutation| m.field.name == field && m.row_id() == Some(id);

            if let Some(pos) = self
                .mutations
                .iter()
                .position(|m| same_row(m) && m.spec.name != mutation.spec.name)
            {
                self.mutations.remove(pos);
                return;
            }
            if self
                .mutations
                .iter()
                .any(|m| same_row(m) && m.spec.name == mutation.spec.name)
            {
                return;
            }
        } else {
            self.mutations
                .retain(|m| !(m.field.name == field && m.spec.name == mutation.spec.name));
        }

        self.mutations.push(mutation);
    }

    /// Drop mutations that would reproduce persisted state.
    pub fn prune(&mut self, row: &StoredRow, children: &BTreeMap<&'static str, Vec<ResourceId>>) {
        self.mutations.retain(|m| {
            if m.is_set_value() {
                return !m.field.compare(row, &m.argument);
            }
            let Some(id) = m.row_id() else {
                return true;
            };
            let persisted = children
                .get(m.field.name)
                .map(|ids| ids.contains(&id))
                .unwrap_or(false);
            if m.is_add_row() {
                !persisted
            } else {
                persisted
            }
        });
    }

    /// Latest staged `set_value` argument for `field`.
    pub fn value(&self, field: &str) -> Option<&Argument> {
        self.mutations
            .iter()
            .rev()
            .find(|m| m.field.name == field && m.is_set_value())
            .map(|m| &m.argument)
    }

    pub fn added(&self, field: &str) -> Vec<ResourceId> {
        self.rows(field, Mutation::is_add_row)
    }

    pub fn removed(&self, field: &str) -> Vec<ResourceId> {
        self.rows(field, Mutation::is_remove_row)
    }

    fn rows(&self, field: &str, pick: fn(&Mutation) -> bool) -> Vec<ResourceId> {
        self.mutations
            .iter()
            .filter(|m| m.field.name == field && pick(m))
            .filter_map(Mutation::row_id)
            .collect()
    }

    pub fn is_dirty(&self, field: &str) -> bool {
        self.mutations.iter().any(|m| m.field.name == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn clear(&mut self) {
        self.mutations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::mutations::{ADD_ROW, REMOVE_ROW};
    use crate::fields::{Field, FieldValue, RowRef, StoredValue};
    use crate::resource::VariantKind;

    fn field(name: &str) -> &'static Field {
        VariantKind::Account.schema().field(name).unwrap()
    }

    fn set_name(value: &str) -> Mutation {
        Mutation::set_value(field("name"), Argument::Value(FieldValue::Text(value.into()))).unwrap()
    }

    fn row(name: &str, id: i64) -> Mutation {
        Mutation::new(
            field("opportunities"),
            name,
            Argument::Row(RowRef {
                id: ResourceId(id),
                title: String::new(),
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_last_set_value_wins() {
        let mut staged = StagedChanges::default();
        staged.stage(set_name("A"));
        staged.stage(set_name("B"));
        assert_eq!(staged.len(), 1);
        assert_eq!(
            staged.value("name"),
            Some(&Argument::Value(FieldValue::Text("B".into())))
        );
    }

    #[test]
    fn test_restaging_persisted_value_prunes_to_nothing() {
        let mut row_data = StoredRow::new();
        row_data.insert("name".into(), StoredValue::Text("Acme".into()));

        let mut staged = StagedChanges::default();
        staged.stage(set_name("Other"));
        staged.stage(set_name("Acme"));
        staged.prune(&row_data, &BTreeMap::new());

        assert!(staged.is_empty());
        assert!(!staged.is_dirty("name"));
    }

    #[test]
    fn test_add_then_remove_cancels() {
        let mut staged = StagedChanges::default();
        staged.stage(row(ADD_ROW, 4));
        staged.stage(row(REMOVE_ROW, 4));
        assert!(staged.is_empty());
    }

    #[test]
    fn test_remove_then_add_cancels() {
        let mut staged = StagedChanges::default();
        staged.stage(row(REMOVE_ROW, 4));
        staged.stage(row(ADD_ROW, 4));
        assert!(staged.is_empty());
    }

    #[test]
    fn test_duplicate_row_mutations_are_noops() {
        let mut staged = StagedChanges::default();
        staged.stage(row(ADD_ROW, 4));
        staged.stage(row(ADD_ROW, 4));
        staged.stage(row(ADD_ROW, 5));
        assert_eq!(staged.added("opportunities"), vec![ResourceId(4), ResourceId(5)]);
        assert!(staged.removed("opportunities").is_empty());
    }

    #[test]
    fn test_prune_row_mutations_against_children() {
        let mut children = BTreeMap::new();
        children.insert("opportunities", vec![ResourceId(1)]);

        let mut staged = StagedChanges::default();
        staged.stage(row(ADD_ROW, 1)); // already a child
        staged.stage(row(REMOVE_ROW, 2)); // never was one
        staged.stage(row(ADD_ROW, 3));
        staged.stage(row(REMOVE_ROW, 1));
        // add(1) then remove(1) cancelled each other already
        staged.prune(&StoredRow::new(), &children);

        assert_eq!(staged.added("opportunities"), vec![ResourceId(3)]);
        assert!(staged.removed("opportunities").is_empty());
    }
}
