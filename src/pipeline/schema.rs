use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Integer,
}

impl ColumnKind {
    pub fn label(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "integer",
        }
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Text => "VARCHAR",
            ColumnKind::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub meaning: &'static str,
    /// Enumerated values the column may hold; empty when unconstrained.
    pub allowed: &'static [&'static str],
    /// Inclusive numeric range for bounded integers.
    pub range: Option<(i64, i64)>,
}

/// The one table every prompt is grounded in.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaDescriptor {
    pub table: &'static str,
    pub columns: &'static [ColumnDescriptor],
}

pub const STUDENT_SCHEMA: SchemaDescriptor = SchemaDescriptor {
    table: "STUDENT",
    columns: &[
        ColumnDescriptor {
            name: "NAME",
            kind: ColumnKind::Text,
            meaning: "student full name",
            allowed: &[],
            range: None,
        },
        ColumnDescriptor {
            name: "CLASS",
            kind: ColumnKind::Text,
            meaning: "department",
            allowed: &["CSE", "Data Science", "AIML", "CSE-AIML", "CAI"],
            range: None,
        },
        ColumnDescriptor {
            name: "SECTION",
            kind: ColumnKind::Text,
            meaning: "section",
            allowed: &["A", "B", "C"],
            range: None,
        },
        ColumnDescriptor {
            name: "GENDER",
            kind: ColumnKind::Text,
            meaning: "gender",
            allowed: &["Male", "Female"],
            range: None,
        },
        ColumnDescriptor {
            name: "MARKS",
            kind: ColumnKind::Integer,
            meaning: "score out of 100",
            allowed: &[],
            range: Some((0, 100)),
        },
    ],
};

impl SchemaDescriptor {
    /// Column block used at the top of every SQL prompt.
    pub fn describe(&self) -> String {
        let width = self.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
        let mut out = format!(
            "The database table is named {} with these columns:\n",
            self.table
        );

        for column in self.columns {
            let mut line = format!(
                "  {:<width$} ({}) - {}",
                column.name,
                column.kind.label(),
                column.meaning,
                width = width
            );
            if !column.allowed.is_empty() {
                line.push_str(": ");
                line.push_str(&column.allowed.join(", "));
            }
            out.push_str(&line);
            out.push('\n');
        }

        out
    }

    /// One-line restatement of the enumerated values for the output rules.
    pub fn value_rules(&self) -> String {
        self.columns
            .iter()
            .filter(|c| !c.allowed.is_empty())
            .map(|c| format!("{} values are {}.", c.name, c.allowed.join(", ")))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Compact `NAME (text), ...` listing for the sample question prompt.
    pub fn column_summary(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} ({})", c.name, c.kind.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn create_table_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.kind.sql_type()))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n);", self.table, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lists_every_column_with_values() {
        let text = STUDENT_SCHEMA.describe();
        assert!(text.contains("named STUDENT"));
        for column in STUDENT_SCHEMA.columns {
            assert!(text.contains(column.name));
        }
        assert!(text.contains("CSE, Data Science, AIML, CSE-AIML, CAI"));
        assert!(text.contains("Male, Female"));
    }

    #[test]
    fn value_rules_skip_free_text_columns() {
        let rules = STUDENT_SCHEMA.value_rules();
        assert!(rules.starts_with("CLASS values are"));
        assert!(!rules.contains("NAME"));
        assert!(!rules.contains("MARKS"));
    }

    #[test]
    fn create_table_is_idempotent_ddl() {
        let ddl = STUDENT_SCHEMA.create_table_sql();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS STUDENT"));
        assert!(ddl.contains("MARKS INTEGER"));
    }
}
