// COPY statement generation for both transfer directions

/// Quote a SQL identifier, doubling embedded double quotes.
///
/// Always quotes, so the name is used exactly as written.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name (`schema.table`), each part separately
pub fn quote_table_name(table_name: &str) -> String {
    table_name
        .split('.')
        .map(|part| quote_identifier(part.trim()))
        .collect::<Vec<_>>()
        .join(".")
}

/// Render a string as a SQL literal.
///
/// Single quotes are doubled. Values containing a backslash use the `E''`
/// form with the backslash escaped, so the literal reads the same whatever
/// `standard_conforming_strings` is set to.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

/// Strip surrounding whitespace and trailing semicolons from a query so it can
/// be embedded in `COPY (...)`
pub fn clean_query(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Build the export statement.
///
/// `query` must already have its parameters substituted.
pub fn export_command(query: &str, has_header: bool) -> String {
    format!(
        "COPY ({}) TO STDOUT WITH (FORMAT csv, HEADER {})",
        query, has_header
    )
}

/// Options of the import statement
#[derive(Debug, Clone)]
pub struct ImportCommand<'a> {
    pub table_name: &'a str,
    pub columns: Option<&'a [String]>,
    pub has_header: bool,
    pub delimiter: &'a str,
    pub quote_char: &'a str,
    pub null_string: &'a str,
}

impl ImportCommand<'_> {
    /// Render `COPY <table> [(<columns>)] FROM STDIN WITH (...)`
    pub fn to_sql(&self) -> String {
        let column_clause = match self.columns {
            Some(columns) if !columns.is_empty() => format!(
                " ({})",
                columns
                    .iter()
                    .map(|c| quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            _ => String::new(),
        };

        format!(
            "COPY {}{} FROM STDIN WITH (FORMAT csv, HEADER {}, DELIMITER {}, QUOTE {}, NULL {})",
            quote_table_name(self.table_name),
            column_clause,
            self.has_header,
            quote_literal(self.delimiter),
            quote_literal(self.quote_char),
            quote_literal(self.null_string)
        )
    }
}

/// Build the truncate statement issued before a load
pub fn truncate_command(table_name: &str) -> String {
    format!("TRUNCATE TABLE {}", quote_table_name(table_name))
}

/// Build the statement applying the per-transaction statement timeout
pub fn statement_timeout_command(timeout_minutes: u64) -> String {
    format!(
        "SET LOCAL statement_timeout = {}",
        timeout_minutes.saturating_mul(60 * 1000)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_command_with_and_without_header() {
        assert_eq!(
            export_command("SELECT 1 AS id, 'a' AS name", true),
            "COPY (SELECT 1 AS id, 'a' AS name) TO STDOUT WITH (FORMAT csv, HEADER true)"
        );
        assert_eq!(
            export_command("SELECT 1", false),
            "COPY (SELECT 1) TO STDOUT WITH (FORMAT csv, HEADER false)"
        );
    }

    #[test]
    fn test_import_command_defaults() {
        let command = ImportCommand {
            table_name: "my_table",
            columns: None,
            has_header: true,
            delimiter: ",",
            quote_char: "\"",
            null_string: "",
        };

        assert_eq!(
            command.to_sql(),
            "COPY \"my_table\" FROM STDIN WITH (FORMAT csv, HEADER true, DELIMITER ',', QUOTE '\"', NULL '')"
        );
    }

    #[test]
    fn test_import_command_with_schema_and_columns() {
        let columns = vec!["col_a".to_string(), "Col B".to_string()];
        let command = ImportCommand {
            table_name: "staging.my_table",
            columns: Some(&columns),
            has_header: false,
            delimiter: "|",
            quote_char: "'",
            null_string: "\\N",
        };

        assert_eq!(
            command.to_sql(),
            "COPY \"staging\".\"my_table\" (\"col_a\", \"Col B\") FROM STDIN WITH \
             (FORMAT csv, HEADER false, DELIMITER '|', QUOTE '''', NULL E'\\\\N')"
        );
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_table_name("a.b"), "\"a\".\"b\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_literal("C:\\tmp"), "E'C:\\\\tmp'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn test_clean_query() {
        assert_eq!(clean_query("  SELECT 1;  "), "SELECT 1");
        assert_eq!(clean_query("SELECT 1;;\n"), "SELECT 1");
        assert_eq!(clean_query("SELECT ';' AS s"), "SELECT ';' AS s");
        assert_eq!(clean_query(" ; "), "");
    }

    #[test]
    fn test_truncate_and_timeout_commands() {
        assert_eq!(truncate_command("public.events"), "TRUNCATE TABLE \"public\".\"events\"");
        assert_eq!(statement_timeout_command(60), "SET LOCAL statement_timeout = 3600000");
        assert_eq!(statement_timeout_command(0), "SET LOCAL statement_timeout = 0");
    }
}
