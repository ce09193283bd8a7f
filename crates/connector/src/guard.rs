use crate::error::ConnectorError;

/// Keywords that must never appear in a generated statement.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT",
    "REVOKE", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "EXEC", "EXECUTE", "CALL",
    "COPY",
];

/// Reject anything that is not a single `SELECT` or `WITH ... SELECT` statement.
pub fn validate_read_only(sql: &str) -> Result<(), ConnectorError> {
    let stripped = strip_literals_and_comments(sql);
    let statement = stripped.trim().trim_end_matches(';').trim();

    if statement.is_empty() {
        return Err(ConnectorError::NotReadOnly("empty statement".into()));
    }
    if statement.contains(';') {
        return Err(ConnectorError::NotReadOnly("multiple statements".into()));
    }

    let upper = statement.to_ascii_uppercase();
    let mut words = upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty());

    match words.next() {
        Some("SELECT") | Some("WITH") => {}
        Some(other) => {
            return Err(ConnectorError::NotReadOnly(format!(
                "statement starts with {other}"
            )))
        }
        None => return Err(ConnectorError::NotReadOnly("empty statement".into())),
    }

    if let Some(word) = words.find(|w| FORBIDDEN_KEYWORDS.contains(w)) {
        return Err(ConnectorError::NotReadOnly(format!("contains {word}")));
    }

    Ok(())
}

/// Blank out quoted literals and comments so keywords inside them are ignored.
fn strip_literals_and_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push(' ');
                while let Some(inner) = chars.next() {
                    if inner == quote {
                        // doubled quote is an escape
                        if chars.peek() == Some(&quote) {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_select_is_allowed() {
        assert!(validate_read_only("SELECT * FROM sales.orders;").is_ok());
        assert!(validate_read_only("  select count(*) from t").is_ok());
    }

    #[test]
    fn cte_is_allowed() {
        let sql = "WITH recent AS (SELECT * FROM orders) SELECT * FROM recent";
        assert!(validate_read_only(sql).is_ok());
    }

    #[test]
    fn dml_is_rejected() {
        assert!(validate_read_only("DELETE FROM orders").is_err());
        assert!(validate_read_only("UPDATE t SET a = 1").is_err());
    }

    #[test]
    fn stacked_statements_are_rejected() {
        let err = validate_read_only("SELECT 1; DROP TABLE orders").unwrap_err();
        assert!(err.to_string().contains("multiple statements"));
    }

    #[test]
    fn keywords_inside_literals_are_ignored() {
        assert!(validate_read_only("SELECT * FROM t WHERE note = 'please delete; me'").is_ok());
        assert!(validate_read_only("SELECT \"Update\" FROM t -- drop later").is_ok());
    }

    #[test]
    fn hidden_write_in_cte_is_rejected() {
        let sql = "WITH x AS (DELETE FROM t RETURNING *) SELECT * FROM x";
        assert!(validate_read_only(sql).is_err());
    }
}
