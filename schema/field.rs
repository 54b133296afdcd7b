use serde::{Deserialize, Serialize};
use crate::table::QualifiedName;

/// Column types supported by the emitters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    VarChar(u32),
    /// 26 character ULID, as produced by `un0.generate_ulid()`.
    Ulid,
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Numeric,
    Date,
    Time,
    Timestamp,
    Interval,
    Json,
    Enum(QualifiedName),
    Array(Box<DataType>),
}

/// Which group of filter lookups applies to a column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFamily {
    /// Foreign keys: equality and membership only.
    Related,
    Numeric,
    String,
}

impl LookupFamily {
    pub fn lookups(self) -> &'static [&'static str] {
        match self {
            Self::Related => &["equal", "not_equal", "null", "not_null", "in", "not_in"],
            Self::Numeric => &[
                "equal", "not_equal", "null", "not_null", "in", "not_in",
                "greater_than", "greater_than_equal", "less_than", "less_than_equal",
            ],
            Self::String => &[
                "equal", "not_equal", "null", "not_null", "in", "not_in",
                "contains", "i_contains", "starts_with", "i_starts_with",
                "ends_with", "i_ends_with",
            ],
        }
    }
}

impl DataType {
    /// The type as it is spelled in DDL.
    pub fn sql_name(&self) -> String {
        match self {
            Self::Text => "TEXT".into(),
            Self::VarChar(n) => format!("VARCHAR({})", n),
            Self::Ulid => "VARCHAR(26)".into(),
            Self::Boolean => "BOOLEAN".into(),
            Self::SmallInt => "SMALLINT".into(),
            Self::Integer => "INTEGER".into(),
            Self::BigInt => "BIGINT".into(),
            Self::Double => "DOUBLE PRECISION".into(),
            Self::Numeric => "NUMERIC".into(),
            Self::Date => "DATE".into(),
            Self::Time => "TIME".into(),
            Self::Timestamp => "TIMESTAMP WITH TIME ZONE".into(),
            Self::Interval => "INTERVAL".into(),
            Self::Json => "JSONB".into(),
            Self::Enum(name) => format!("{}.{}", name.schema, name.name),
            Self::Array(elem) => format!("{}[]", elem.sql_name()),
        }
    }

    pub fn lookup_family(&self) -> LookupFamily {
        match self {
            Self::SmallInt
            | Self::Integer
            | Self::BigInt
            | Self::Double
            | Self::Numeric
            | Self::Date
            | Self::Time
            | Self::Timestamp
            | Self::Interval => LookupFamily::Numeric,
            _ => LookupFamily::String,
        }
    }

    pub fn enum_name(&self) -> Option<&QualifiedName> {
        match self {
            Self::Enum(name) => Some(name),
            Self::Array(elem) => elem.enum_name(),
            _ => None,
        }
    }
}

/// A column default. Defaults are typed so that no developer-authored SQL ends up in the DDL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Now,
    GenerateUlid,
    /// `GENERATED BY DEFAULT AS IDENTITY`.
    Identity,
    EmptyArray,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

impl OnDelete {
    pub fn sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::Restrict => "RESTRICT",
        }
    }
}

/// Graph edges derived from a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeLabels {
    /// Label of the edge from this row to the referenced row.
    pub forward: String,
    /// Label of the edge from the referenced row back to this row, if any.
    pub reverse: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: QualifiedName,
    pub column: String,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub unique: bool,
    pub index: bool,
    pub primary_key: bool,
    pub default: Option<DefaultValue>,
    pub foreign_key: Option<ForeignKey>,
    /// Graph projection of the foreign key.
    pub edge: Option<EdgeLabels>,
    pub editable: bool,
    pub doc: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            unique: false,
            index: false,
            primary_key: false,
            default: None,
            foreign_key: None,
            edge: None,
            editable: true,
            doc: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// References `table.column`, with `NO ACTION` on delete.
    pub fn references(mut self, table: QualifiedName, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey {
            table,
            column: column.into(),
            on_delete: OnDelete::NoAction,
        });
        self
    }

    /// Sets the delete action of the foreign key declared with [`Self::references`].
    pub fn on_delete(mut self, on_delete: OnDelete) -> Self {
        if let Some(fk) = &mut self.foreign_key {
            fk.on_delete = on_delete;
        }
        self
    }

    /// Projects the foreign key into the graph. Without a foreign key this is rejected when the
    /// table is built.
    pub fn edge(mut self, forward: impl Into<String>, reverse: Option<&str>) -> Self {
        self.edge = Some(EdgeLabels {
            forward: forward.into(),
            reverse: reverse.map(String::from),
        });

        self
    }

    pub fn editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Edge labels, only when the field really is a foreign key.
    pub fn edge_labels(&self) -> Option<&EdgeLabels> {
        self.foreign_key.as_ref().and(self.edge.as_ref())
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }

    pub fn lookup_family(&self) -> LookupFamily {
        if self.is_foreign_key() {
            LookupFamily::Related
        } else {
            self.data_type.lookup_family()
        }
    }
}
