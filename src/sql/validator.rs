use serde::Serialize;
use sqlparser::ast::{Statement, visit_statements};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::ops::ControlFlow;

/// Statement keywords that may not appear anywhere in a query as bare words.
pub const DENIED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "EXEC", "EXECUTE", "GRANT", "REVOKE", "ATTACH", "DETACH", "PRAGMA",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
    /// Normalized rendering of the statement, only for valid input.
    pub formatted: Option<String>,
}

impl ValidationResult {
    fn accepted(formatted: String) -> Self {
        Self {
            valid: true,
            error: None,
            formatted: Some(formatted),
        }
    }

    fn rejected(reason: String) -> Self {
        Self {
            valid: false,
            error: Some(reason),
            formatted: None,
        }
    }
}

/// Read-only gate for generated and user-supplied SQL. A statement passes
/// when it is a single query that starts with `SELECT`, mentions no denied
/// keyword outside string literals, quoted identifiers and comments, and
/// contains no nested non-query statement.
#[derive(Debug, Clone, Default)]
pub struct SqlValidator;

impl SqlValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, sql: &str) -> ValidationResult {
        match check(sql) {
            Ok(formatted) => ValidationResult::accepted(formatted),
            Err(reason) => {
                tracing::warn!("Rejected SQL: {}", reason);
                ValidationResult::rejected(reason)
            }
        }
    }
}

fn check(sql: &str) -> Result<String, String> {
    let candidate = sql.trim();
    if candidate.is_empty() {
        return Err("No SQL statement provided".to_string());
    }

    let dialect = DuckDbDialect {};
    let tokens = Tokenizer::new(&dialect, candidate)
        .tokenize()
        .map_err(|e| format!("SQL syntax error: {e}"))?;

    if let Some(keyword) = first_denied_keyword(&tokens) {
        return Err(format!(
            "Query contains potentially dangerous keyword: '{keyword}'. Only SELECT queries are allowed."
        ));
    }

    let leading = tokens.iter().find_map(|token| match token {
        Token::Whitespace(_) => None,
        Token::Word(word) => Some(word.value.to_uppercase()),
        _ => Some(String::new()),
    });
    if leading.as_deref() != Some("SELECT") {
        return Err("Only SELECT queries are allowed.".to_string());
    }

    let statements =
        Parser::parse_sql(&dialect, candidate).map_err(|e| format!("SQL syntax error: {e}"))?;
    let statement = match statements.as_slice() {
        [single] => single,
        [] => return Err("No SQL statement provided".to_string()),
        _ => return Err("Only a single SQL statement is allowed.".to_string()),
    };

    if let ControlFlow::Break(kind) = visit_statements(statement, |nested| match nested {
        Statement::Query(_) => ControlFlow::Continue(()),
        other => ControlFlow::Break(statement_kind(other)),
    }) {
        return Err(format!("Only read-only queries are allowed; found a {kind} statement."));
    }

    Ok(format!("{statement:#}"))
}

// A denied word followed by `(` is a function call (e.g. REPLACE(name, 'a', 'b'))
fn first_denied_keyword(tokens: &[Token]) -> Option<String> {
    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|token| !matches!(token, Token::Whitespace(_)))
        .collect();

    significant.iter().enumerate().find_map(|(idx, token)| {
        let Token::Word(word) = token else {
            return None;
        };
        if word.quote_style.is_some() {
            return None;
        }

        let upper = word.value.to_uppercase();
        if !DENIED_KEYWORDS.contains(&upper.as_str()) {
            return None;
        }
        let is_call = matches!(significant.get(idx + 1), Some(Token::LParen));
        (!is_call).then_some(upper)
    })
}

fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("non-query")
        .to_uppercase()
}
