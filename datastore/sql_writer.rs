use std::fmt::{self, Write};
use un0_schema::QualifiedName;
use crate::emit::EmissionError;

/// Helper struct for generating SQL statements.
///
/// Every name and literal that ends up in the generated SQL goes through one of the `write_*`
/// methods, which take care of quoting and escaping.
#[derive(Debug, Default)]
pub struct SqlWriter {
    text: String,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self { text: String::new() }
    }

    /// Overloaded helper method that calls a `write_*` method depending on the type `T`.
    pub fn write<T: WriteSql + ?Sized>(&mut self, x: &T) {
        x.write_sql(self);
    }

    /// Appends the string verbatim into the SQL statement.
    pub fn write_str(&mut self, x: &str) {
        self.text.push_str(x);
    }

    /// Appends the name as a quoted identifier into the SQL statement.
    pub fn write_name(&mut self, name: &str) {
        self.text.reserve(2 + name.len());
        self.text.push('"');
        for c in name.chars() {
            if c == '"' {
                self.text.push_str("\"\"");
            } else {
                self.text.push(c);
            }
        }
        self.text.push('"');
    }

    pub fn write_qualified(&mut self, name: &QualifiedName) {
        self.write_name(&name.schema);
        self.text.push('.');
        self.write_name(&name.name);
    }

    /// Appends a comma separated list of quoted identifiers.
    pub fn write_names<S: AsRef<str>>(&mut self, names: &[S]) {
        for (i, name) in names.iter().enumerate() {
            if i != 0 {
                self.text.push_str(", ");
            }
            self.write_name(name.as_ref());
        }
    }

    /// Appends the string as a single-quoted literal.
    pub fn write_literal(&mut self, value: &str) {
        self.text.reserve(2 + value.len());
        self.text.push('\'');
        for c in value.chars() {
            if c == '\'' {
                self.text.push_str("''");
            } else {
                self.text.push(c);
            }
        }
        self.text.push('\'');
    }

    /// Appends `body` between `$tag$` delimiters.
    ///
    /// Fails if the body itself contains the delimiter, because the quoted text would end early.
    pub fn write_dollar_quoted(&mut self, tag: &str, body: &str) -> Result<(), EmissionError> {
        let delimiter = format!("${}$", tag);
        if body.contains(&delimiter) {
            return Err(EmissionError::UnsafeLiteral { tag: tag.into() });
        }
        self.text.push_str(&delimiter);
        self.text.push_str(body);
        self.text.push_str(&delimiter);
        Ok(())
    }

    /// Writes `items` separated by `sep`, using `f` for every item.
    pub fn write_list<T, F>(&mut self, items: &[T], sep: &str, mut f: F)
        where F: FnMut(&mut Self, &T)
    {
        for (i, item) in items.iter().enumerate() {
            if i != 0 {
                self.text.push_str(sep);
            }
            f(self, item);
        }
    }

    /// This method makes the `write!` macro work with this struct.
    pub fn write_fmt(&mut self, fmt: fmt::Arguments<'_>) {
        self.text.write_fmt(fmt).expect("formatting failed")
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns the produced SQL statement.
    pub fn build(self) -> String {
        self.text
    }
}

pub trait WriteSql {
    fn write_sql(&self, writer: &mut SqlWriter);
}

impl WriteSql for str {
    fn write_sql(&self, writer: &mut SqlWriter) {
        writer.write_str(self);
    }
}

impl WriteSql for QualifiedName {
    fn write_sql(&self, writer: &mut SqlWriter) {
        writer.write_qualified(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unquote_name(quoted: &str) -> Option<String> {
        let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
        if inner.replace("\"\"", "").contains('"') {
            return None;
        }
        Some(inner.replace("\"\"", "\""))
    }

    #[test]
    fn names_and_literals() {
        let mut w = SqlWriter::new();
        w.write_qualified(&QualifiedName::new("un0", "user"));
        w.write(" = ");
        w.write_literal("it's");
        assert_eq!(w.build(), r#""un0"."user" = 'it''s'"#);
    }

    #[test]
    fn dollar_quote_collision() {
        let mut w = SqlWriter::new();
        w.write_dollar_quoted("fn", "BEGIN RETURN NEW; END;").unwrap();
        assert_eq!(w.build(), "$fn$BEGIN RETURN NEW; END;$fn$");

        let mut w = SqlWriter::new();
        let err = w.write_dollar_quoted("fn", "SELECT $fn$ oops").unwrap_err();
        assert!(matches!(err, EmissionError::UnsafeLiteral { .. }));
    }

    proptest! {
        #[test]
        fn quoted_names_round_trip(name in ".*") {
            let mut w = SqlWriter::new();
            w.write_name(&name);
            prop_assert_eq!(unquote_name(&w.build()), Some(name));
        }

        #[test]
        fn literals_have_no_lone_quotes(value in ".*") {
            let mut w = SqlWriter::new();
            w.write_literal(&value);
            let text = w.build();
            let inner = &text[1..text.len() - 1];
            prop_assert!(!inner.replace("''", "").contains('\''));
        }
    }
}
