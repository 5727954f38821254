//! Django-style query sets compiled to one parameterized statement per terminal.
//!
//! Every chaining call validates field names and lookups against the model
//! schema immediately, so a bad reference fails with `OrmError::Query` before
//! any SQL exists. Compilation walks conditions in declaration order and
//! pushes each bound value as its placeholder is written, which keeps the
//! parameter list aligned with the statement text.

use std::sync::Arc;

use crate::codec;
use crate::error::OrmError;
use crate::model::ModelSchema;
use crate::types::{FilterArg, SqlValue};

pub(crate) mod dml;
mod lookup;
mod manager;
mod select;

pub use lookup::{Arity, Lookup, LookupEntry};
pub use manager::Manager;

/// Limits applied while compiling query sets.
///
/// Threaded into each model (and overridable per manager) rather than held in
/// process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPolicy {
    /// Largest accepted `offset`.
    pub max_offset: u64,
    /// Largest accepted `limit`; `None` means unbounded.
    pub max_limit: Option<u64>,
    /// Allow `update()`/`delete()` on an unfiltered query set.
    pub allow_unfiltered_writes: bool,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            max_offset: 100_000,
            max_limit: None,
            allow_unfiltered_writes: false,
        }
    }
}

impl QueryPolicy {
    #[must_use]
    pub fn builder() -> QueryPolicyBuilder {
        QueryPolicyBuilder::default()
    }
}

/// Fluent builder for [`QueryPolicy`], starting from the defaults.
#[derive(Debug, Default, Clone)]
pub struct QueryPolicyBuilder {
    policy: QueryPolicy,
}

impl QueryPolicyBuilder {
    #[must_use]
    pub fn max_offset(mut self, max_offset: u64) -> Self {
        self.policy.max_offset = max_offset;
        self
    }

    #[must_use]
    pub fn max_limit(mut self, max_limit: Option<u64>) -> Self {
        self.policy.max_limit = max_limit;
        self
    }

    #[must_use]
    pub fn allow_unfiltered_writes(mut self, allow: bool) -> Self {
        self.policy.allow_unfiltered_writes = allow;
        self
    }

    #[must_use]
    pub fn build(self) -> QueryPolicy {
        self.policy
    }
}

/// Validated operand of one condition.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    One(SqlValue),
    Many(Vec<SqlValue>),
    Flag(bool),
}

/// `(field, operator, value)` after parsing and validation.
#[derive(Debug, Clone, PartialEq)]
struct Condition {
    column: usize,
    lookup: Lookup,
    operand: Operand,
}

/// Conditions from one `filter`/`exclude` call.
#[derive(Debug, Clone, PartialEq)]
struct ConditionGroup {
    negated: bool,
    conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderTerm {
    column: usize,
    descending: bool,
}

/// A lazy query over one model.
///
/// Chaining methods consume the query set and return the refined one; clone
/// first to keep the original.
#[derive(Debug, Clone)]
pub struct QuerySet {
    schema: Arc<ModelSchema>,
    groups: Vec<ConditionGroup>,
    ordering: Vec<OrderTerm>,
    limit: Option<u64>,
    offset: Option<u64>,
    projection: Option<Vec<usize>>,
    policy: QueryPolicy,
}

impl QuerySet {
    #[must_use]
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        let policy = schema.policy().clone();
        Self::with_policy(schema, policy)
    }

    #[must_use]
    pub fn with_policy(schema: Arc<ModelSchema>, policy: QueryPolicy) -> Self {
        Self {
            schema,
            groups: Vec::new(),
            ordering: Vec::new(),
            limit: None,
            offset: None,
            projection: None,
            policy,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    #[must_use]
    pub fn policy(&self) -> &QueryPolicy {
        &self.policy
    }

    /// True when at least one `filter`/`exclude` condition is present.
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        self.groups.iter().any(|g| !g.conditions.is_empty())
    }

    /// Add one `field__op = value` condition.
    ///
    /// A NULL operand is rejected for comparison lookups; match missing
    /// values with `field__isnull = true` instead.
    ///
    /// # Errors
    /// Returns `OrmError::Query` for unknown fields, unknown operators or an
    /// operand of the wrong shape, and `OrmError::Validation` when the value
    /// cannot represent the field's type.
    pub fn filter(self, key: &str, value: impl Into<FilterArg>) -> Result<Self, OrmError> {
        self.filter_all([(key, value.into())])
    }

    /// Add several conditions at once; they conjoin exactly like chained `filter` calls.
    ///
    /// # Errors
    /// See [`QuerySet::filter`].
    pub fn filter_all<K: AsRef<str>>(
        self,
        lookups: impl IntoIterator<Item = (K, FilterArg)>,
    ) -> Result<Self, OrmError> {
        self.push_group(false, lookups)
    }

    /// Exclude rows matching one condition (`NOT (...)`).
    ///
    /// # Errors
    /// See [`QuerySet::filter`].
    pub fn exclude(self, key: &str, value: impl Into<FilterArg>) -> Result<Self, OrmError> {
        self.exclude_all([(key, value.into())])
    }

    /// Exclude rows matching all of the given conditions together.
    ///
    /// # Errors
    /// See [`QuerySet::filter`].
    pub fn exclude_all<K: AsRef<str>>(
        self,
        lookups: impl IntoIterator<Item = (K, FilterArg)>,
    ) -> Result<Self, OrmError> {
        self.push_group(true, lookups)
    }

    /// Append ordering terms; a leading `-` sorts descending.
    ///
    /// # Errors
    /// Returns `OrmError::Query` for unknown field names.
    pub fn order_by(mut self, fields: &[&str]) -> Result<Self, OrmError> {
        for spec in fields {
            let (name, descending) = match spec.strip_prefix('-') {
                Some(name) => (name, true),
                None => (*spec, false),
            };
            let column = self.column(name)?;
            self.ordering.push(OrderTerm { column, descending });
        }
        Ok(self)
    }

    /// # Errors
    /// Returns `OrmError::Query` for negative values or values above the policy maximum.
    pub fn limit(mut self, n: i64) -> Result<Self, OrmError> {
        let n = u64::try_from(n).map_err(|_| OrmError::Query("Limit cannot be negative".into()))?;
        if let Some(max) = self.policy.max_limit
            && n > max
        {
            return Err(OrmError::Query(format!("Limit cannot exceed {max}")));
        }
        self.limit = Some(n);
        Ok(self)
    }

    /// # Errors
    /// Returns `OrmError::Query` for negative values or values above the policy maximum.
    pub fn offset(mut self, n: i64) -> Result<Self, OrmError> {
        let n = u64::try_from(n).map_err(|_| OrmError::Query("Offset cannot be negative".into()))?;
        if n > self.policy.max_offset {
            return Err(OrmError::Query(format!(
                "Offset cannot exceed {}",
                self.policy.max_offset
            )));
        }
        self.offset = Some(n);
        Ok(self)
    }

    /// Load only the named fields (plus the primary key); the rest stay deferred.
    ///
    /// # Errors
    /// Returns `OrmError::Query` for unknown field names.
    pub fn only(mut self, fields: &[&str]) -> Result<Self, OrmError> {
        let mut columns = self.columns(fields)?;
        columns.push(self.schema.pk_index());
        columns.sort_unstable();
        columns.dedup();
        self.projection = Some(columns);
        Ok(self)
    }

    fn column(&self, name: &str) -> Result<usize, OrmError> {
        self.schema
            .position(name)
            .ok_or_else(|| OrmError::unknown_field(name, self.schema.name()))
    }

    fn columns(&self, names: &[&str]) -> Result<Vec<usize>, OrmError> {
        names.iter().map(|name| self.column(name)).collect()
    }

    fn push_group<K: AsRef<str>>(
        mut self,
        negated: bool,
        lookups: impl IntoIterator<Item = (K, FilterArg)>,
    ) -> Result<Self, OrmError> {
        let mut conditions = Vec::new();
        for (key, arg) in lookups {
            conditions.push(self.condition(key.as_ref(), arg)?);
        }
        if !conditions.is_empty() {
            self.groups.push(ConditionGroup {
                negated,
                conditions,
            });
        }
        Ok(self)
    }

    fn condition(&self, key: &str, arg: FilterArg) -> Result<Condition, OrmError> {
        let (name, lookup) = lookup::split_key(key, |name| self.schema.field(name).is_some())?;
        let column = self.column(name)?;
        let field = &self.schema.fields()[column];
        let entry = lookup.entry();

        let operand = match (entry.arity, arg) {
            (Arity::One, FilterArg::One(value)) if entry.transform.is_pattern() => {
                let text = match value {
                    SqlValue::Text(text) => text,
                    other => {
                        return Err(OrmError::Query(format!(
                            "lookup '{}' on '{name}' requires a text value, got {}",
                            entry.token,
                            other.kind()
                        )));
                    }
                };
                Operand::One(SqlValue::Text(entry.transform.apply(&text)))
            }
            (Arity::One, FilterArg::One(value)) if lookup == Lookup::IExact => match value {
                SqlValue::Text(_) => Operand::One(value),
                other => Operand::One(codec::encode_operand(field, other)?),
            },
            (Arity::One, FilterArg::One(value)) => {
                if value.is_null() {
                    return Err(OrmError::Query(format!(
                        "cannot compare '{name}' with NULL; use '{name}__isnull'"
                    )));
                }
                Operand::One(codec::encode_operand(field, value)?)
            }
            (Arity::Many, FilterArg::Many(values)) => Operand::Many(
                values
                    .into_iter()
                    .map(|v| codec::encode_operand(field, v))
                    .collect::<Result<_, _>>()?,
            ),
            (Arity::Flag, FilterArg::One(value)) => match value.as_bool() {
                Some(flag) if matches!(value, SqlValue::Bool(_) | SqlValue::Int(0 | 1)) => {
                    Operand::Flag(flag)
                }
                _ => {
                    return Err(OrmError::Query(format!(
                        "lookup 'isnull' on '{name}' requires a boolean"
                    )));
                }
            },
            (Arity::Many, FilterArg::One(_)) => {
                return Err(OrmError::Query(format!(
                    "lookup 'in' on '{name}' requires a list of values"
                )));
            }
            (_, FilterArg::Many(_)) => {
                return Err(OrmError::Query(format!(
                    "lookup '{}' on '{name}' takes a single value",
                    entry.token
                )));
            }
        };

        Ok(Condition {
            column,
            lookup,
            operand,
        })
    }

    /// ` WHERE ...` with bound values appended to `params`, or empty when unfiltered.
    fn render_where(&self, params: &mut Vec<SqlValue>) -> String {
        let mut parts = Vec::new();
        for group in &self.groups {
            let rendered: Vec<String> = group
                .conditions
                .iter()
                .map(|c| self.render_condition(c, params))
                .collect();
            if group.negated {
                parts.push(format!("NOT ({})", rendered.join(" AND ")));
            } else {
                parts.extend(rendered);
            }
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    fn render_condition(&self, condition: &Condition, params: &mut Vec<SqlValue>) -> String {
        let column = self.schema.fields()[condition.column].name();
        let entry = condition.lookup.entry();
        match &condition.operand {
            Operand::One(value) => {
                params.push(value.clone());
                entry.template.replace("{col}", column)
            }
            Operand::Many(values) if values.is_empty() => "0 = 1".to_owned(),
            Operand::Many(values) => {
                params.extend(values.iter().cloned());
                let list = vec!["?"; values.len()].join(", ");
                entry
                    .template
                    .replace("{col}", column)
                    .replace("{list}", &list)
            }
            Operand::Flag(true) => entry.template.replace("{col}", column),
            Operand::Flag(false) => format!("{column} IS NOT NULL"),
        }
    }

    fn render_order(&self) -> String {
        if self.ordering.is_empty() {
            return String::new();
        }
        let terms: Vec<String> = self
            .ordering
            .iter()
            .map(|term| {
                let column = self.schema.fields()[term.column].name();
                let direction = if term.descending { "DESC" } else { "ASC" };
                format!("{column} {direction}")
            })
            .collect();
        format!(" ORDER BY {}", terms.join(", "))
    }

    /// Limit and offset are validated integers and inlined rather than bound.
    fn render_window(&self, limit: Option<u64>) -> String {
        match (limit, self.offset) {
            (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
            (Some(limit), None) => format!(" LIMIT {limit}"),
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
            (None, None) => String::new(),
        }
    }

    fn has_window(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    fn select_columns(&self) -> String {
        match &self.projection {
            Some(columns) => columns
                .iter()
                .map(|&idx| self.schema.fields()[idx].name())
                .collect::<Vec<_>>()
                .join(", "),
            None => self.schema.column_list(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;

    fn games() -> Arc<ModelSchema> {
        ModelSchema::builder("SampleGame")
            .table("test_games")
            .field(Field::string("title").max_length(200).not_null())
            .field(Field::integer("score").default(0))
            .field(Field::boolean("is_published").default(false))
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_fields_fail_at_chain_time() {
        let qs = QuerySet::new(games());
        let err = qs.clone().filter("invalid_field", "x").unwrap_err();
        assert!(matches!(err, OrmError::Query(ref m) if m.contains("Field 'invalid_field' does not exist")));
        assert!(qs.clone().order_by(&["-nope"]).is_err());
        assert!(qs.only(&["nope"]).is_err());
    }

    #[test]
    fn unknown_operator_is_reported() {
        let err = QuerySet::new(games()).filter("score__between", 1).unwrap_err();
        assert!(matches!(err, OrmError::Query(ref m) if m.contains("'between'")));
    }

    #[test]
    fn limits_and_offsets_are_bounded() {
        let qs = QuerySet::new(games());
        assert!(matches!(qs.clone().limit(-1), Err(OrmError::Query(ref m)) if m == "Limit cannot be negative"));
        assert!(matches!(qs.clone().offset(-1), Err(OrmError::Query(ref m)) if m == "Offset cannot be negative"));
        assert!(matches!(qs.clone().offset(100_001), Err(OrmError::Query(ref m)) if m == "Offset cannot exceed 100000"));
        assert!(qs.clone().offset(100_000).is_ok());

        let strict = QueryPolicy::builder().max_limit(Some(50)).build();
        let qs = QuerySet::with_policy(games(), strict);
        assert!(qs.clone().limit(51).is_err());
        assert!(qs.limit(50).is_ok());
    }

    #[test]
    fn null_operand_points_to_isnull() {
        let qs = QuerySet::new(games());
        let err = qs.clone().filter("title", SqlValue::Null).unwrap_err();
        assert!(matches!(err, OrmError::Query(ref m) if m.contains("title__isnull")));
        let stmt = qs.filter("title__isnull", true).unwrap().compile_select().unwrap();
        assert!(stmt.sql.ends_with(" WHERE title IS NULL"));
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn operand_shapes_are_checked() {
        let qs = QuerySet::new(games());
        assert!(qs.clone().filter("score__in", 3).is_err());
        assert!(qs.clone().filter("score__gt", vec![1, 2]).is_err());
        assert!(qs.clone().filter("title__isnull", "yes").is_err());
        assert!(qs.clone().filter("score__contains", 5).is_err());
        assert!(qs.clone().filter("score", SqlValue::Null).is_err());
        assert!(matches!(
            qs.filter("score", "high"),
            Err(OrmError::Validation { ref field, .. }) if field == "score"
        ));
    }

    #[test]
    fn empty_filter_calls_add_nothing() {
        let qs = QuerySet::new(games())
            .filter_all(Vec::<(&str, FilterArg)>::new())
            .unwrap();
        assert!(!qs.is_filtered());
    }
}
