//! The fixed vocabulary of filter suffixes (`field__op`).

use crate::error::OrmError;

/// A validated lookup operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Exact,
    IExact,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    IContains,
    StartsWith,
    EndsWith,
    In,
    IsNull,
}

/// How many values a lookup binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one placeholder.
    One,
    /// One placeholder per list element.
    Many,
    /// A boolean switch that binds nothing.
    Flag,
}

/// Rewrites applied to a bound value before it reaches the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transform {
    None,
    Contains,
    StartsWith,
    EndsWith,
}

impl Transform {
    /// Wrap a text operand in `%` wildcards, escaping LIKE metacharacters.
    pub(crate) fn apply(self, text: &str) -> String {
        let escaped = escape_like(text);
        match self {
            Transform::None => text.to_owned(),
            Transform::Contains => format!("%{escaped}%"),
            Transform::StartsWith => format!("{escaped}%"),
            Transform::EndsWith => format!("%{escaped}"),
        }
    }

    pub(crate) fn is_pattern(self) -> bool {
        self != Transform::None
    }
}

#[derive(Debug)]
pub struct LookupEntry {
    pub token: &'static str,
    pub lookup: Lookup,
    /// Fragment with `{col}` standing for the column; `?` marks placeholders.
    pub template: &'static str,
    pub arity: Arity,
    pub(crate) transform: Transform,
}

const fn entry(
    token: &'static str,
    lookup: Lookup,
    template: &'static str,
    arity: Arity,
    transform: Transform,
) -> LookupEntry {
    LookupEntry {
        token,
        lookup,
        template,
        arity,
        transform,
    }
}

pub(crate) static LOOKUPS: [LookupEntry; 13] = [
    entry("exact", Lookup::Exact, "{col} = ?", Arity::One, Transform::None),
    entry("iexact", Lookup::IExact, "LOWER({col}) = LOWER(?)", Arity::One, Transform::None),
    entry("ne", Lookup::Ne, "{col} != ?", Arity::One, Transform::None),
    entry("gt", Lookup::Gt, "{col} > ?", Arity::One, Transform::None),
    entry("gte", Lookup::Gte, "{col} >= ?", Arity::One, Transform::None),
    entry("lt", Lookup::Lt, "{col} < ?", Arity::One, Transform::None),
    entry("lte", Lookup::Lte, "{col} <= ?", Arity::One, Transform::None),
    entry("contains", Lookup::Contains, "{col} LIKE ? ESCAPE '\\'", Arity::One, Transform::Contains),
    entry(
        "icontains",
        Lookup::IContains,
        "LOWER({col}) LIKE LOWER(?) ESCAPE '\\'",
        Arity::One,
        Transform::Contains,
    ),
    entry("startswith", Lookup::StartsWith, "{col} LIKE ? ESCAPE '\\'", Arity::One, Transform::StartsWith),
    entry("endswith", Lookup::EndsWith, "{col} LIKE ? ESCAPE '\\'", Arity::One, Transform::EndsWith),
    entry("in", Lookup::In, "{col} IN ({list})", Arity::Many, Transform::None),
    entry("isnull", Lookup::IsNull, "{col} IS NULL", Arity::Flag, Transform::None),
];

impl Lookup {
    /// Resolve a suffix token.
    ///
    /// # Errors
    /// Returns `OrmError::Query` naming the token when it is not in the table.
    pub fn parse(token: &str) -> Result<Self, OrmError> {
        LOOKUPS
            .iter()
            .find(|e| e.token == token)
            .map(|e| e.lookup)
            .ok_or_else(|| OrmError::Query(format!("Unknown lookup operator '{token}'")))
    }

    #[must_use]
    pub fn entry(self) -> &'static LookupEntry {
        // The table lists every variant exactly once, in declaration order.
        &LOOKUPS[self as usize]
    }

    #[must_use]
    pub fn token(self) -> &'static str {
        self.entry().token
    }
}

/// Split `field__op` into the field name and its lookup.
///
/// A key that names a field outright is an `exact` match, so field names
/// containing `__` still work. Otherwise the text after the last `__` must
/// be a known lookup. An unknown field is returned as-is for the caller to report.
pub(crate) fn split_key<'k>(
    key: &'k str,
    is_field: impl Fn(&str) -> bool,
) -> Result<(&'k str, Lookup), OrmError> {
    if is_field(key) {
        return Ok((key, Lookup::Exact));
    }
    match key.rsplit_once("__") {
        Some((field, op)) if is_field(field) => Ok((field, Lookup::parse(op)?)),
        Some((field, _)) => Ok((field, Lookup::Exact)),
        None => Ok((key, Lookup::Exact)),
    }
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
