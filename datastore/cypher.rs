//! Just enough Cypher to keep the graph in sync with the relational rows.
//!
//! A query is rendered into the text of an `ag_catalog.cypher` call that PL/pgSQL runs with
//! `EXECUTE format(...)`. Values never appear in the query text: each one becomes a `%s`
//! placeholder whose argument is the value as JSON, so a row can not inject Cypher.

use crate::ast::Expr;
use crate::emit::EmissionError;
use crate::sql_writer::SqlWriter;

#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub var: &'static str,
    pub label: Option<String>,
    pub props: Vec<(String, Expr)>,
}

impl NodePattern {
    pub fn new(var: &'static str, label: impl Into<String>) -> Self {
        Self { var, label: Some(label.into()), props: vec![] }
    }

    /// A node referring back to a variable bound by an earlier clause.
    pub fn bound(var: &'static str) -> Self {
        Self { var, label: None, props: vec![] }
    }

    pub fn prop(mut self, key: impl Into<String>, value: Expr) -> Self {
        self.props.push((key.into(), value));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub var: &'static str,
    pub label: Option<String>,
    pub props: Vec<(String, Expr)>,
}

impl RelPattern {
    pub fn new(var: &'static str, label: impl Into<String>) -> Self {
        Self { var, label: Some(label.into()), props: vec![] }
    }

    pub fn props(mut self, props: Vec<(String, Expr)>) -> Self {
        self.props = props;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Node(NodePattern),
    /// `(start)-[rel]->(end)`
    Path(NodePattern, RelPattern, NodePattern),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Match(Vec<Pattern>),
    Create(Pattern),
    Set(&'static str, Vec<(String, Expr)>),
    Delete(&'static str),
    DetachDelete(&'static str),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub clauses: Vec<Clause>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// The query text with `%s` placeholders, and the values for them in order.
    pub fn render(&self) -> (String, Vec<&Expr>) {
        let mut r = Renderer { text: String::new(), params: vec![] };
        for (i, clause) in self.clauses.iter().enumerate() {
            if i != 0 {
                r.text.push(' ');
            }
            match clause {
                Clause::Match(patterns) => {
                    r.text.push_str("MATCH ");
                    for (j, pattern) in patterns.iter().enumerate() {
                        if j != 0 {
                            r.text.push_str(", ");
                        }
                        r.pattern(pattern);
                    }
                }
                Clause::Create(pattern) => {
                    r.text.push_str("CREATE ");
                    r.pattern(pattern);
                }
                Clause::Set(var, props) => {
                    r.text.push_str("SET ");
                    for (j, (key, value)) in props.iter().enumerate() {
                        if j != 0 {
                            r.text.push_str(", ");
                        }
                        r.text.push_str(var);
                        r.text.push('.');
                        r.quoted(key);
                        r.text.push_str(" = ");
                        r.param(value);
                    }
                }
                Clause::Delete(var) => {
                    r.text.push_str("DELETE ");
                    r.text.push_str(var);
                }
                Clause::DetachDelete(var) => {
                    r.text.push_str("DETACH DELETE ");
                    r.text.push_str(var);
                }
            }
        }
        (r.text, r.params)
    }
}

struct Renderer<'a> {
    text: String,
    params: Vec<&'a Expr>,
}

impl<'a> Renderer<'a> {
    /// Back-quoted label or key. `%` is doubled because the text is a `format()` template.
    fn quoted(&mut self, name: &str) {
        self.text.push('`');
        for c in name.chars() {
            match c {
                '`' => self.text.push_str("``"),
                '%' => self.text.push_str("%%"),
                c => self.text.push(c),
            }
        }
        self.text.push('`');
    }

    fn param(&mut self, value: &'a Expr) {
        self.text.push_str("%s");
        self.params.push(value);
    }

    fn props(&mut self, props: &'a [(String, Expr)]) {
        if props.is_empty() {
            return;
        }
        self.text.push_str(" {");
        for (i, (key, value)) in props.iter().enumerate() {
            if i != 0 {
                self.text.push_str(", ");
            }
            self.quoted(key);
            self.text.push_str(": ");
            self.param(value);
        }
        self.text.push('}');
    }

    fn node(&mut self, node: &'a NodePattern) {
        self.text.push('(');
        self.text.push_str(node.var);
        if let Some(label) = &node.label {
            self.text.push(':');
            self.quoted(label);
        }
        self.props(&node.props);
        self.text.push(')');
    }

    fn pattern(&mut self, pattern: &'a Pattern) {
        match pattern {
            Pattern::Node(node) => self.node(node),
            Pattern::Path(start, rel, end) => {
                self.node(start);
                self.text.push_str("-[");
                self.text.push_str(rel.var);
                if let Some(label) = &rel.label {
                    self.text.push(':');
                    self.quoted(label);
                }
                self.props(&rel.props);
                self.text.push_str("]->");
                self.node(end);
            }
        }
    }
}

/// A value as JSON text that is safe inside the `$cypher$` quoted query:
/// `replace(coalesce(to_json(<value>)::text, 'null'), '$', '\u0024')`.
pub fn json_param(value: Expr) -> Expr {
    let json = Expr::call("to_json", vec![value]).cast("text");
    let text = Expr::call("coalesce", vec![json, Expr::text("null")]);
    Expr::call("replace", vec![text, Expr::text("$"), Expr::text("\\u0024")])

}

/// A Cypher query run against one graph from PL/pgSQL.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherCall {
    pub graph: String,
    pub query: Query,
}

impl CypherCall {
    pub fn new(graph: impl Into<String>, query: Query) -> Self {
        Self { graph: graph.into(), query }
    }

    pub(crate) fn render(&self, w: &mut SqlWriter) -> Result<(), EmissionError> {
        let (text, params) = self.query.render();
        let mut format = SqlWriter::new();
        format.write_str("SELECT * FROM ag_catalog.cypher(%L, ");
        format.write_dollar_quoted("cypher", &text)?;
        format.write_str(") AS (a ag_catalog.agtype)");

        w.write_str("EXECUTE format(");
        w.write_literal(&format.build());
        w.write_str(", ");
        w.write_literal(&self.graph);
        for param in params {
            w.write_str(", ");
            w.write(&json_param(param.clone()));
        }
        w.write_str(")");
        Ok(())
    }
}
