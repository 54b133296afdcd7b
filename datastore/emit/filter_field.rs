use indexmap::IndexMap;
use itertools::Itertools;
use un0_schema::{Edge, EmitterKind, LookupFamily, QualifiedName, TableDescriptor, TableKind};
use crate::ast::{Expr, FromItem, Insert, InsertSource, OnConflict, Select, Statement};
use super::{EmissionError, EmitContext, Emitter};

pub struct FilterFieldEmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GraphType {
    Property,
    Vertex,
    Edge,
}

impl GraphType {
    fn as_str(self) -> &'static str {
        match self {
            GraphType::Property => "PROPERTY",
            GraphType::Vertex => "VERTEX",
            GraphType::Edge => "EDGE",
        }
    }
}

struct FilterField {
    accessor: String,
    label: String,
    data_type: String,
    graph_type: GraphType,
    lookups: LookupFamily,
    /// `(table, direction)` pairs the field is reachable from.
    tables: Vec<(QualifiedName, &'static str)>,
}

fn filterfield_table() -> QualifiedName {
    QualifiedName::new("un0", "filterfield")
}

/// The column of `table` holding the far end of `edge`.
fn edge_column<'a>(table: &'a TableDescriptor, edge: &'a Edge) -> &'a str {
    let is_fk = |column: &str| table.field(column).map_or(false, |f| f.is_foreign_key());
    if is_fk(&edge.end.column) {
        &edge.end.column
    } else {
        &edge.start.column
    }
}

fn collect(table: &TableDescriptor) -> Vec<FilterField> {
    let this = table.qualified_name();
    let mut fields = vec![];
    for field in table.fields.values().filter(|f| !f.is_foreign_key()) {
        fields.push(FilterField {
            accessor: field.name.clone(),
            label: field.name.clone(),
            data_type: field.data_type.sql_name(),
            graph_type: GraphType::Property,
            lookups: field.lookup_family(),
            tables: vec![(this.clone(), "FROM")],
        });
    }

    if let TableKind::Normal(vertex) = &table.kind {
        let id_type = table
            .field(&vertex.id_column)
            .map(|f| f.data_type.sql_name())
            .unwrap_or_default();
        fields.push(FilterField {
            accessor: table.name.clone(),
            label: vertex.label.clone(),
            data_type: id_type,
            graph_type: GraphType::Vertex,
            lookups: LookupFamily::Related,
            tables: vec![(this.clone(), "FROM")],
        });
    }

    for edge in table.edges() {
        let column = edge_column(table, edge);
        fields.push(FilterField {
            accessor: column.to_string(),
            label: edge.label.clone(),
            data_type: table.field(column).map(|f| f.data_type.sql_name()).unwrap_or_default(),
            graph_type: GraphType::Edge,
            lookups: LookupFamily::Related,
            tables: vec![(edge.start.table.clone(), "FROM"), (edge.end.table.clone(), "TO")],
        });
    }
    fields
}

fn link(field: &FilterField, table: &QualifiedName, direction: &'static str) -> Statement {
    let select = Select::new(vec![
        Expr::qualified("f", "id"),
        Expr::qualified("t", "id"),
        Expr::text(direction).cast("un0.edge_direction"),
    ])
    .from(FromItem::aliased(filterfield_table(), "f"))
    .from(FromItem::aliased(QualifiedName::new("un0", "table_type"), "t"))
    .filter(Expr::all([
        Expr::eq(Expr::qualified("f", "label"), Expr::text(field.label.as_str())),
        Expr::eq(
            Expr::qualified("f", "graph_type"),
            Expr::text(field.graph_type.as_str()).cast("un0.graph_type"),
        ),
        Expr::eq(Expr::qualified("t", "db_schema"), Expr::text(table.schema.as_str())),
        Expr::eq(Expr::qualified("t", "name"), Expr::text(table.name.as_str())),
    ]));
    Statement::Insert(Insert {
        table: QualifiedName::new("un0", "filterfield_tabletype"),
        columns: vec!["filterfield_id".into(), "table_type_id".into(), "direction".into()],
        source: InsertSource::Select(select),
        on_conflict: OnConflict::DoNothing,
    })
}

impl Emitter for FilterFieldEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::FilterFields
    }

    fn emit(
        &self,
        _cx: &EmitContext,
        table: &TableDescriptor,
    ) -> Result<Vec<Statement>, EmissionError> {
        // (label, graph type) is unique in un0.filterfield; OWNS may come from several keys
        let mut fields: IndexMap<(String, GraphType), FilterField> = IndexMap::new();
        for field in collect(table) {
            match fields.get_mut(&(field.label.clone(), field.graph_type)) {
                Some(existing) => existing.tables.extend(field.tables),
                None => {
                    fields.insert((field.label.clone(), field.graph_type), field);
                }
            }
        }
        if fields.is_empty() {
            return Ok(vec![]);
        }

        let rows = fields
            .values()
            .map(|f| {
                vec![
                    Expr::text(f.accessor.as_str()),
                    Expr::text(f.label.as_str()),
                    Expr::text(f.data_type.as_str()),
                    Expr::text(f.graph_type.as_str()).cast("un0.graph_type"),
                    Expr::Array(f.lookups.lookups().iter().map(|l| Expr::text(*l)).collect())
                        .cast("TEXT[]"),

                ]
            })
            .collect();
        let mut statements = vec![Statement::Insert(Insert {
            table: filterfield_table(),
            columns: ["accessor", "label", "data_type", "graph_type", "lookups"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            source: InsertSource::Values(rows),
            on_conflict: OnConflict::DoNothingOn(vec!["label".into(), "graph_type".into()]),
        })];

        for field in fields.values() {
            for (table, direction) in field.tables.iter().unique() {
                statements.push(link(field, table, *direction));
            }
        }
        Ok(statements)
    }
}
