//! Dialect-aware SQL text assembly (spec.md §4.4).
//!
//! Grounded directly on the teacher's `datastore::sql_writer::SqlWriter`:
//! same accumulate-into-a-`String`-with-a-`write_param` shape, generalized
//! from the teacher's two-dialect `AnyKind::{Sqlite,Postgres}` dispatch to
//! the three dialects spec.md names (`Postgres`, `Mssql`, `Mock`).

use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Mssql,
    /// Emits a dialect-neutral, readable form used by `explain()` and the
    /// demo CLI's in-memory driver; not meant to run against a real engine.
    Mock,
}

#[derive(Debug)]
pub struct SqlWriter {
    dialect: Dialect,
    text: String,
    param_count: usize,
}

impl SqlWriter {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect, text: String::new(), param_count: 0 }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn write_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    /// Appends a double-quoted identifier, escaping embedded quotes per
    /// `SqlWriter::write_name` in the teacher.
    pub fn write_ident(&mut self, name: &str) {
        let (quote, close) = match self.dialect {
            Dialect::Mssql => ('[', ']'),
            Dialect::Postgres => ('"', '"'),
            // bare identifiers, per spec.md §4.4: "a third, testing-only
            // dialect emits bare identifiers"
            Dialect::Mock => {
                self.text.push_str(name);
                return;
            }
        };
        self.text.reserve(2 + name.len());
        self.text.push(quote);
        for c in name.chars() {
            if c == close {
                self.text.push(close);
                self.text.push(close);
            } else {
                self.text.push(c);
            }
        }
        self.text.push(close);
    }

    /// Appends a bound-parameter placeholder and returns its zero-based
    /// index, mirroring `write_param`'s `$n`/`?n` dispatch but additionally
    /// returning the index so callers can push the bound value in lockstep.
    pub fn write_param(&mut self) -> usize {
        let idx = self.param_count;
        self.param_count += 1;
        match self.dialect {
            Dialect::Postgres => {
                write!(self, "${}", idx + 1).expect("formatting to a String cannot fail");
            }
            Dialect::Mssql => {
                write!(self, "@p{}", idx + 1).expect("formatting to a String cannot fail");
            }
            Dialect::Mock => {
                write!(self, "?{}", idx + 1).expect("formatting to a String cannot fail");
            }
        }
        idx
    }

    pub fn build(self) -> String {
        self.text
    }
}

impl fmt::Write for SqlWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.text.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_params_are_dollar_numbered() {
        let mut w = SqlWriter::new(Dialect::Postgres);
        assert_eq!(w.write_param(), 0);
        assert_eq!(w.write_param(), 1);
        assert_eq!(w.build(), "$1$2");
    }

    #[test]
    fn mssql_identifiers_use_brackets() {
        let mut w = SqlWriter::new(Dialect::Mssql);
        w.write_ident("Account Name");
        assert_eq!(w.build(), "[Account Name]");
    }

    #[test]
    fn postgres_identifiers_escape_embedded_quotes() {
        let mut w = SqlWriter::new(Dialect::Postgres);
        w.write_ident("weird\"name");
        assert_eq!(w.build(), "\"weird\"\"name\"");
    }

    #[test]
    fn mock_identifiers_are_bare() {
        let mut w = SqlWriter::new(Dialect::Mock);
        w.write_ident("Account Name");
        assert_eq!(w.build(), "Account Name");
    }
}
