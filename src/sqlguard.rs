use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::pluginlib::PluginError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SqlAccessType {
    ReadOnly,
    Write,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct SqlClassification {
    pub access: SqlAccessType,
    pub reason: Option<String>,
}

impl SqlClassification {
    fn read_only() -> Self {
        Self {
            access: SqlAccessType::ReadOnly,
            reason: None,
        }
    }

    fn write(reason: impl Into<String>) -> Self {
        Self {
            access: SqlAccessType::Write,
            reason: Some(reason.into()),
        }
    }

    fn unknown(reason: impl Into<String>) -> Self {
        Self {
            access: SqlAccessType::Unknown,
            reason: Some(reason.into()),
        }
    }
}

const ALLOWED_STARTERS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "SHOW", "DESCRIBE", "VALUES"];

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE", "UPSERT", "CREATE", "ALTER", "DROP",
    "TRUNCATE", "RENAME", "GRANT", "REVOKE", "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT",
    "RELEASE", "SET", "USE", "COPY", "LOAD", "UNLOAD", "VACUUM", "ANALYZE", "OPTIMIZE",
    "REFRESH", "CALL", "EXEC", "EXECUTE", "INDEX", "SEQUENCE", "CONSTRAINT", "LOCK", "INTO",
];

/// Token-level read-only classification: exactly one statement, an
/// allowlisted first keyword and no forbidden keyword anywhere (which also
/// blocks `SELECT … INTO`). Strings and quoted identifiers never match.
pub fn classify_sql(sql: &str) -> SqlClassification {
    if sql.trim().is_empty() {
        return SqlClassification::unknown("empty SQL");
    }

    let tokens = match Tokenizer::new(&GenericDialect {}, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => return SqlClassification::write(format!("SQL could not be tokenized: {e}")),
    };

    let statements = split_statements(&tokens);
    if statements.is_empty() {
        return SqlClassification::unknown("no SQL keywords found");
    }
    if statements.len() != 1 {
        return SqlClassification::write("multiple SQL statements are not allowed");
    }

    let statement = &statements[0];
    let first = statement[0];
    let Token::Word(first_word) = first else {
        return SqlClassification::unknown("only punctuation, no SQL statement");
    };

    let starter = first_word.value.to_uppercase();
    if !ALLOWED_STARTERS.contains(&starter.as_str()) {
        return SqlClassification::write(format!(
            "statement starts with disallowed keyword: {starter}"
        ));
    }

    for token in statement {
        if let Token::Word(word) = token {
            if word.quote_style.is_some() {
                continue;
            }
            let value = word.value.to_uppercase();
            if FORBIDDEN_KEYWORDS.contains(&value.as_str()) {
                return SqlClassification::write(format!("forbidden keyword: {value}"));
            }
        }
    }

    SqlClassification::read_only()
}

/// Gate used before any `run_sql` dispatch.
pub fn ensure_read_only(sql: &str) -> Result<(), PluginError> {
    let decision = classify_sql(sql);
    if decision.access != SqlAccessType::ReadOnly {
        return Err(PluginError::PermissionDenied(
            decision
                .reason
                .unwrap_or_else(|| "SQL is not read-only".to_string()),
        ));
    }
    Ok(())
}

fn split_statements(tokens: &[Token]) -> Vec<Vec<&Token>> {
    let mut statements = Vec::new();
    let mut current = Vec::new();

    for token in tokens {
        match token {
            Token::Whitespace(_) => continue,
            Token::SemiColon => {
                if !current.is_empty() {
                    statements.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        statements.push(current);
    }

    statements
}
