//! Lightweight inspection of SQL statement text.
//!
//! Classification looks only at leading keywords, after skipping whitespace
//! and comments. It is a heuristic over the text, not a parser: vendor
//! specific spellings it does not know are treated as ordinary statements.

mod scanner;

use scanner::{CodeBytes, is_word_byte, leading_words};

/// Transaction-control statements recognised by the shim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxControl {
    /// `BEGIN [DEFERRED|IMMEDIATE|EXCLUSIVE] [TRANSACTION]`
    Begin,
    /// `COMMIT` / `END` `[TRANSACTION]`
    Commit,
    /// `ROLLBACK [TRANSACTION]`
    Rollback,
    /// `SAVEPOINT name`
    Savepoint(String),
    /// `RELEASE [SAVEPOINT] name`
    Release(String),
    /// `ROLLBACK [TRANSACTION] TO [SAVEPOINT] name`
    RollbackTo(String),
}

/// Classify a single statement as transaction control, or `None` for anything else.
#[must_use]
pub fn classify(sql: &str) -> Option<TxControl> {
    let words = leading_words(sql, 6);
    let mut rest = words.iter().map(String::as_str);
    match rest.next()? {
        "BEGIN" => Some(TxControl::Begin),
        "COMMIT" | "END" => Some(TxControl::Commit),
        "SAVEPOINT" => rest.next().map(|name| TxControl::Savepoint(name.to_owned())),
        "RELEASE" => {
            let name = match rest.next()? {
                "SAVEPOINT" => rest.next()?,
                name => name,
            };
            Some(TxControl::Release(name.to_owned()))
        }
        "ROLLBACK" => {
            let mut next = rest.next();
            if next == Some("TRANSACTION") {
                next = rest.next();
            }
            match next {
                None => Some(TxControl::Rollback),
                Some("TO") => {
                    let name = match rest.next()? {
                        "SAVEPOINT" => rest.next()?,
                        name => name,
                    };
                    Some(TxControl::RollbackTo(name.to_owned()))
                }
                Some(_) => Some(TxControl::Rollback),
            }
        }
        _ => None,
    }
}

/// First keyword of the statement, uppercased.
#[must_use]
pub fn leading_keyword(sql: &str) -> Option<String> {
    leading_words(sql, 1).pop()
}

/// True for statements whose rowid result is meaningful (`INSERT`, `REPLACE`).
#[must_use]
pub fn is_insert_shaped(sql: &str) -> bool {
    matches!(leading_keyword(sql).as_deref(), Some("INSERT" | "REPLACE"))
}

/// True for statements whose `changes()` count belongs to them (DML, possibly behind a CTE).
#[must_use]
pub fn is_dml_shaped(sql: &str) -> bool {
    matches!(
        leading_keyword(sql).as_deref(),
        Some("INSERT" | "REPLACE" | "UPDATE" | "DELETE" | "WITH")
    )
}

/// Number of `?` placeholders in live code (literals and comments are skipped).
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    CodeBytes::new(sql).filter(|&(_, b)| b == b'?').count()
}

/// Split multi-statement text on top-level semicolons.
///
/// Semicolons inside literals and comments do not split, and a
/// `CREATE TRIGGER` body is kept whole up to its closing `END`.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_code = false;
    let mut current_word = String::new();
    let mut last_word = String::new();

    for (idx, b) in CodeBytes::new(sql) {
        if is_word_byte(b) {
            current_word.push(b.to_ascii_uppercase() as char);
            has_code = true;
            continue;
        }
        if !current_word.is_empty() {
            last_word = std::mem::take(&mut current_word);
        }
        if b != b';' {
            has_code |= !b.is_ascii_whitespace();
            continue;
        }
        let candidate = &sql[start..idx];
        if is_trigger_definition(candidate) && last_word != "END" {
            continue;
        }
        if has_code {
            statements.push(candidate.trim());
        }
        start = idx + 1;
        has_code = false;
        last_word.clear();
    }

    if has_code {
        statements.push(sql[start..].trim());
    }
    statements
}

fn is_trigger_definition(sql: &str) -> bool {
    let words = leading_words(sql, 3);
    match words.as_slice() {
        [create, trigger, ..] if create == "CREATE" && trigger == "TRIGGER" => true,
        [create, temp, trigger]
            if create == "CREATE"
                && (temp == "TEMP" || temp == "TEMPORARY")
                && trigger == "TRIGGER" =>
        {
            true
        }
        _ => false,
    }
}
