//! Keeps the AGE graph in step with the relational rows.
//!
//! Vertex tables get one vertex per row and maintain the edges of their foreign keys.
//! Association tables have no vertices and maintain only edges. Everything runs in `AFTER`
//! triggers, inside the transaction of the statement that changed the rows.

use indexmap::IndexSet;
use un0_schema::{Edge, EdgeEnd, EmitterKind, QualifiedName, TableDescriptor, TableKind, Vertex};
use crate::ast::{
    Expr, FromItem, Function, PlBlock, PlStmt, Select, Statement, Timing, Trigger, TriggerLevel,
};
use crate::cypher::{Clause, CypherCall, NodePattern, Pattern, Query, RelPattern};
use super::{trigger_name, EmissionError, EmitContext, Emitter};

pub struct GraphEmitter;

impl Emitter for GraphEmitter {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Graph
    }

    fn emit(
        &self,
        cx: &EmitContext,
        table: &TableDescriptor,
    ) -> Result<Vec<Statement>, EmissionError> {
        let projector = Projector { cx, table };
        match &table.kind {
            TableKind::Normal(vertex) => projector.vertex_table(vertex),
            TableKind::Association(edges) if edges.is_empty() => Ok(vec![]),
            TableKind::Association(edges) => projector.association_table(edges),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Row {
    New,
    Old,
}

impl Row {
    fn column(self, name: &str) -> Expr {
        match self {
            Row::New => Expr::new_row(name),
            Row::Old => Expr::old_row(name),
        }
    }

    fn record(self) -> Expr {
        match self {
            Row::New => Expr::Raw("NEW"),
            Row::Old => Expr::Raw("OLD"),
        }
    }
}

/// An edge together with the id property keys of its two vertices.
struct ResolvedEdge<'a> {
    edge: &'a Edge,
    start_key: &'a str,
    end_key: &'a str,
}

struct Projector<'a> {
    cx: &'a EmitContext<'a>,
    table: &'a TableDescriptor,
}

impl<'a> Projector<'a> {
    fn graph(&self) -> &str {
        &self.cx.settings.graph_name
    }

    fn end_vertex(&self, edge: &Edge, end: &EdgeEnd) -> Result<&'a Vertex, EmissionError> {
        let table: &'a TableDescriptor = self.table;
        let target = if end.table == table.qualified_name() {
            Some(table)
        } else {
            self.cx.registry.get(&end.table).map(|t| t.as_ref())
        };
        match target {
            None => Err(EmissionError::UnknownVertex {
                table: self.table.qualified_name(),
                edge: edge.label.clone(),
                target: end.table.clone(),
            }),
            Some(target) => target.vertex().ok_or_else(|| EmissionError::NotAVertex {
                table: self.table.qualified_name(),
                edge: edge.label.clone(),
                target: end.table.clone(),
            }),
        }
    }

    fn resolve(&self, edges: &'a [Edge]) -> Result<Vec<ResolvedEdge<'a>>, EmissionError> {
        edges
            .iter()
            .map(|edge| {
                let start = self.end_vertex(edge, &edge.start)?;
                let end = self.end_vertex(edge, &edge.end)?;
                Ok(ResolvedEdge { edge, start_key: &start.id_column, end_key: &end.id_column })
            })
            .collect()
    }

    fn label_lookup(&self, label: &str) -> Select {
        Select::new(vec![])
            .from(FromItem::aliased(QualifiedName::new("ag_catalog", "ag_label"), "l"))
            .from(FromItem::aliased(QualifiedName::new("ag_catalog", "ag_graph"), "g"))
            .filter(Expr::all([
                Expr::eq(Expr::qualified("g", "graphid"), Expr::qualified("l", "graph")),
                Expr::eq(Expr::qualified("g", "name"), Expr::text(self.graph())),
                Expr::eq(Expr::qualified("l", "name"), Expr::text(label)),
            ]))
    }

    /// Creates the label and an index on its lookup columns unless the label exists.
    fn create_label(&self, function: &'static str, label: &str, columns: &[&str]) -> Statement {
        let create = Expr::call_schema(
            QualifiedName::new("ag_catalog", function),
            vec![Expr::text(self.graph()), Expr::text(label)],
        );
        let index = Statement::CreateIndex {
            name: format!("{}_{}_idx", label, columns.join("_")),
            table: QualifiedName::new(self.graph(), label),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        };
        Statement::Do(PlBlock::guarded(
            self.label_lookup(label),
            vec![PlStmt::Perform(create), PlStmt::sql(index)],
        ))
    }

    fn edge_labels(&self, edges: &[Edge]) -> Vec<Statement> {
        let labels: IndexSet<&str> = edges.iter().map(|e| e.label.as_str()).collect();
        labels
            .into_iter()
            .map(|label| self.create_label("create_elabel", label, &["start_id", "end_id"]))
            .collect()
    }

    fn cypher(&self, query: Query) -> PlStmt {
        PlStmt::Cypher(CypherCall::new(self.graph(), query))
    }

    fn ends_present(&self, edge: &ResolvedEdge, row: Row) -> Expr {
        Expr::and(
            row.column(&edge.edge.start.column).is_not_null(),
            row.column(&edge.edge.end.column).is_not_null(),
        )
    }

    fn start_node(&self, edge: &ResolvedEdge, row: Row) -> NodePattern {
        let e = edge.edge;
        NodePattern::new("v", &e.start.label).prop(edge.start_key, row.column(&e.start.column))
    }

    fn end_node(&self, edge: &ResolvedEdge, row: Row) -> NodePattern {
        let e = edge.edge;
        NodePattern::new("w", &e.end.label).prop(edge.end_key, row.column(&e.end.column))
    }

    fn create_edge(&self, edge: &ResolvedEdge, row: Row) -> PlStmt {
        let e = edge.edge;
        let props = e.properties.iter().map(|p| (p.name.clone(), row.column(&p.name))).collect();
        let query = Query::new()
            .clause(Clause::Match(vec![
                Pattern::Node(self.start_node(edge, row)),
                Pattern::Node(self.end_node(edge, row)),
            ]))
            .clause(Clause::Create(Pattern::Path(
                NodePattern::bound("v"),
                RelPattern::new("e", &e.label).props(props),
                NodePattern::bound("w"),
            )));
        PlStmt::if_then(self.ends_present(edge, row), vec![self.cypher(query)])
    }

    /// Deletes the edge `row` created. Association edges are matched on their row key as well,
    /// so edges of other rows linking the same two vertices stay.
    fn delete_edge(&self, edge: &ResolvedEdge, row: Row) -> PlStmt {
        let e = edge.edge;
        let keys = e.keys.iter().map(|k| (k.clone(), row.column(k))).collect();
        let query = Query::new()
            .clause(Clause::Match(vec![Pattern::Path(
                self.start_node(edge, row),
                RelPattern::new("e", &e.label).props(keys),
                self.end_node(edge, row),
            )]))
            .clause(Clause::Delete("e"));
        PlStmt::if_then(self.ends_present(edge, row), vec![self.cypher(query)])
    }

    fn edge_changed(&self, edge: &ResolvedEdge) -> Expr {
        let changed = |column: &str| Expr::IsDistinctFrom {
            left: Box::new(Row::New.column(column)),
            right: Box::new(Row::Old.column(column)),
        };
        Expr::or(changed(&edge.edge.start.column), changed(&edge.edge.end.column))
    }

    /// `<schema>.<table>_<concern>()` fired by `<table>_<concern>_trigger`.
    fn function_and_trigger(
        &self,
        concern: &str,
        events: Vec<&'static str>,
        level: TriggerLevel,
        body: Vec<PlStmt>,
    ) -> [Statement; 2] {
        let name =
            QualifiedName::new(&self.table.schema, format!("{}_{}", self.table.name, concern));
        [
            Statement::CreateFunction(Function::trigger(name.clone(), PlBlock::new(body))),
            Statement::CreateTrigger(Trigger {
                name: trigger_name(self.table, concern),
                table: self.table.qualified_name(),
                timing: Timing::After,
                events,
                level,
                function: name,
            }),
        ]
    }

    /// `insert_<what>`, `update_<what>` and `delete_<what>` row triggers.
    fn row_triggers(
        &self,
        what: &str,
        insert: Vec<PlStmt>,
        update: Vec<PlStmt>,
        delete: Vec<PlStmt>,
    ) -> Vec<Statement> {
        [("insert", "INSERT", insert), ("update", "UPDATE", update), ("delete", "DELETE", delete)]
            .into_iter()
            .flat_map(|(verb, event, body)| {
                let concern = format!("{}_{}", verb, what);
                self.function_and_trigger(&concern, vec![event], TriggerLevel::Row, body)
            })
            .collect()
    }

    fn vertex_table(&self, vertex: &'a Vertex) -> Result<Vec<Statement>, EmissionError> {
        let edges = self.resolve(&vertex.edges)?;
        let mut statements = vec![self.create_label("create_vlabel", &vertex.label, &["id"])];
        statements.extend(self.edge_labels(&vertex.edges));

        let id = &vertex.id_column;
        let this = |row: Row| NodePattern::new("v", &vertex.label).prop(id, row.column(id));

        let mut props = NodePattern::new("v", &vertex.label);
        for p in &vertex.properties {
            props = props.prop(&p.name, Row::New.column(&p.name));
        }
        let mut insert =
            vec![self.cypher(Query::new().clause(Clause::Create(Pattern::Node(props))))];
        insert.extend(edges.iter().map(|e| self.create_edge(e, Row::New)));
        insert.push(PlStmt::Return(Row::New.record()));

        let set = vertex
            .properties
            .iter()
            .map(|p| (p.name.clone(), Row::New.column(&p.name)))
            .collect();
        let mut update = vec![self.cypher(
            Query::new()
                .clause(Clause::Match(vec![Pattern::Node(this(Row::Old))]))
                .clause(Clause::Set("v", set)),
        )];
        for edge in &edges {
            update.push(PlStmt::if_then(
                self.edge_changed(edge),
                vec![self.delete_edge(edge, Row::Old), self.create_edge(edge, Row::New)],
            ));
        }
        update.push(PlStmt::Return(Row::New.record()));

        let delete = vec![
            self.cypher(
                Query::new()
                    .clause(Clause::Match(vec![Pattern::Node(this(Row::Old))]))
                    .clause(Clause::DetachDelete("v")),
            ),
            PlStmt::Return(Row::Old.record()),
        ];

        let truncate = vec![
            self.cypher(
                Query::new()
                    .clause(Clause::Match(vec![Pattern::Node(NodePattern::new(
                        "v",
                        &vertex.label,
                    ))]))
                    .clause(Clause::DetachDelete("v")),
            ),
            PlStmt::ReturnNull,
        ];

        statements.extend(self.row_triggers("vertex", insert, update, delete));
        statements.extend(self.function_and_trigger(
            "truncate_vertex",
            vec!["TRUNCATE"],
            TriggerLevel::Statement,
            truncate,
        ));
        Ok(statements)
    }

    fn association_table(&self, edges: &'a [Edge]) -> Result<Vec<Statement>, EmissionError> {
        let resolved = self.resolve(edges)?;
        let mut statements = self.edge_labels(edges);

        let mut insert: Vec<PlStmt> =
            resolved.iter().map(|e| self.create_edge(e, Row::New)).collect();
        insert.push(PlStmt::Return(Row::New.record()));

        let mut update = vec![];
        for edge in &resolved {
            update.push(self.delete_edge(edge, Row::Old));
            update.push(self.create_edge(edge, Row::New));
        }
        update.push(PlStmt::Return(Row::New.record()));

        let mut delete: Vec<PlStmt> =
            resolved.iter().map(|e| self.delete_edge(e, Row::Old)).collect();
        delete.push(PlStmt::Return(Row::Old.record()));

        let mut truncate: Vec<PlStmt> = edges
            .iter()
            .map(|e| {
                self.cypher(
                    Query::new()
                        .clause(Clause::Match(vec![Pattern::Path(
                            NodePattern::new("v", &e.start.label),
                            RelPattern::new("e", &e.label),
                            NodePattern::new("w", &e.end.label),
                        )]))
                        .clause(Clause::Delete("e")),
                )
            })
            .collect();
        truncate.push(PlStmt::ReturnNull);

        statements.extend(self.row_triggers("edge", insert, update, delete));
        statements.extend(self.function_and_trigger(
            "truncate_edge",
            vec!["TRUNCATE"],
            TriggerLevel::Statement,
            truncate,
        ));
        Ok(statements)
    }
}
