use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use crate::error::ConfigurationError;
use crate::field::FieldDescriptor;
use crate::table::TableDescriptor;

/// A named subset of a table's columns, used as a request or response shape by the HTTP layer.
///
/// An empty `include` list selects every column. `exclude` is applied on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldView {
    pub name: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl FieldView {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), include: vec![], exclude: vec![] }
    }

    pub fn include<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.include.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn exclude<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.exclude.extend(columns.into_iter().map(Into::into));
        self
    }

    fn check_lists(&self) -> Result<(), ConfigurationError> {
        for (list, columns) in [("include", &self.include), ("exclude", &self.exclude)] {
            let mut seen = HashSet::new();
            for column in columns {
                if !seen.insert(column) {
                    return Err(ConfigurationError::DuplicateInList {
                        view: self.name.clone(),
                        list,
                        column: column.clone(),
                    });
                }
            }
        }
        if let Some(column) = self.include.iter().find(|c| self.exclude.contains(c)) {
            return Err(ConfigurationError::IncludedAndExcluded {
                view: self.name.clone(),
                column: column.clone(),
            });
        }
        Ok(())
    }

    fn check_known(&self, table: &TableDescriptor) -> Result<(), ConfigurationError> {
        for column in self.include.iter().chain(self.exclude.iter()) {
            if !table.has_field(column) {
                return Err(ConfigurationError::UnknownViewColumn {
                    table: table.qualified_name(),
                    view: self.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    fn selects(&self, column: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|c| c == column);
        included && !self.exclude.iter().any(|c| c == column)
    }

    /// Returns the field for `column` if this view exposes it, `None` if the view leaves it out.
    pub fn create_field<'a>(
        &self,
        table: &'a TableDescriptor,
        column: &str,
    ) -> Result<Option<&'a FieldDescriptor>, ConfigurationError> {
        self.check_lists()?;
        self.check_known(table)?;
        let field = table.field(column).ok_or_else(|| ConfigurationError::UnknownViewColumn {
            table: table.qualified_name(),
            view: self.name.clone(),
            column: column.into(),
        })?;
        Ok(self.selects(column).then_some(field))
    }

    /// All fields of the view, in table column order.
    pub fn resolve<'a>(
        &self,
        table: &'a TableDescriptor,
    ) -> Result<Vec<&'a FieldDescriptor>, ConfigurationError> {
        self.check_lists()?;
        self.check_known(table)?;
        Ok(table.fields.values().filter(|f| self.selects(&f.name)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataType, TableBuilder};

    fn widget() -> TableDescriptor {
        TableBuilder::new("app", "widget")
            .field(FieldDescriptor::new("id", DataType::Integer).primary_key())
            .field(FieldDescriptor::new("name", DataType::Text))
            .field(FieldDescriptor::new("secret", DataType::Text))
            .field(FieldDescriptor::new("size", DataType::Integer))
            .build()
            .unwrap()
    }

    #[test]
    fn empty_include_means_everything() {
        let table = widget();
        let view = FieldView::new("public").exclude(["secret"]);
        let names: Vec<_> = view.resolve(&table).unwrap().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "size"]);
    }

    #[test]
    fn result_follows_table_order() {
        let table = widget();
        let view = FieldView::new("short").include(["size", "id"]);
        let names: Vec<_> = view.resolve(&table).unwrap().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "size"]);
    }

    #[test]
    fn create_field() {
        let table = widget();
        let view = FieldView::new("short").include(["name"]);
        assert_eq!(view.create_field(&table, "name").unwrap().unwrap().name, "name");
        assert_eq!(view.create_field(&table, "size").unwrap(), None);
        assert!(matches!(
            view.create_field(&table, "nope"),
            Err(ConfigurationError::UnknownViewColumn { .. })
        ));
    }

    #[test]
    fn conflicts() {
        let table = widget();
        let both = FieldView::new("v").include(["name"]).exclude(["name"]);
        assert_eq!(both.create_field(&table, "name"), Err(ConfigurationError::IncludedAndExcluded {
            view: "v".into(),
            column: "name".into(),
        }));
        let twice = FieldView::new("v").exclude(["size", "size"]);
        assert_eq!(twice.resolve(&table), Err(ConfigurationError::DuplicateInList {
            view: "v".into(),
            list: "exclude",
            column: "size".into(),
        }));
        let unknown = FieldView::new("v").include(["colour"]);
        assert!(matches!(
            unknown.resolve(&table),
            Err(ConfigurationError::UnknownViewColumn { .. })
        ));

    }
}
