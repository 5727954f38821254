use chrono::Utc;

use crate::codec;
use crate::database::{BoundStatement, D1Database};
use crate::error::OrmError;
use crate::model::Record;
use crate::types::SqlValue;

use super::QuerySet;

impl QuerySet {
    fn guard_unfiltered(&self, verb: &str) -> Result<(), OrmError> {
        if self.is_filtered() || self.policy.allow_unfiltered_writes {
            Ok(())
        } else {
            Err(OrmError::Query(format!("{verb} without WHERE clause not allowed")))
        }
    }

    /// WHERE clause for UPDATE/DELETE. A limit, offset or ordering is applied
    /// through a primary-key sub-select, since the engine has no `UPDATE ... LIMIT`.
    fn write_target(&self, params: &mut Vec<SqlValue>) -> String {
        if self.has_window() {
            let pk = self.schema.primary_key().name();
            let inner = self.select_sql(pk, self.limit, params);
            format!(" WHERE {pk} IN ({inner})")
        } else {
            self.render_where(params)
        }
    }

    /// `UPDATE ... SET` for the given assignments over the filtered rows.
    ///
    /// `auto_now` fields not assigned explicitly are set to the current time.
    ///
    /// # Errors
    /// Returns `OrmError::Query` for unknown or primary-key fields, an empty
    /// assignment list, or an unfiltered query set the policy forbids, and
    /// `OrmError::Validation` for values violating a field contract.
    pub fn compile_update<K: AsRef<str>>(
        &self,
        assignments: impl IntoIterator<Item = (K, SqlValue)>,
    ) -> Result<BoundStatement, OrmError> {
        self.guard_unfiltered("UPDATE")?;
        let mut columns = codec::encode_assignments(&self.schema, assignments)?;
        if columns.is_empty() {
            return Err(OrmError::Query("update() requires at least one field".into()));
        }
        let now = SqlValue::Timestamp(Utc::now());
        for field in self.schema.fields().iter().filter(|f| f.is_auto_now()) {
            if !columns.iter().any(|(name, _)| *name == field.name()) {
                columns.push((field.name(), codec::encode_value(field, now.clone())?));
            }
        }

        let set_clause = columns
            .iter()
            .map(|(name, _)| format!("{name} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut params: Vec<SqlValue> = columns.into_iter().map(|(_, value)| value).collect();
        let target = self.write_target(&mut params);
        let sql = format!(
            "UPDATE {} SET {set_clause}{target}",
            self.schema.table_name()
        );
        Ok(BoundStatement::new(sql, params))
    }

    /// # Errors
    /// Returns `OrmError::Query` for an unfiltered query set the policy forbids.
    pub fn compile_delete(&self) -> Result<BoundStatement, OrmError> {
        self.guard_unfiltered("DELETE")?;
        let mut params = Vec::new();
        let target = self.write_target(&mut params);
        let sql = format!("DELETE FROM {}{target}", self.schema.table_name());
        Ok(BoundStatement::new(sql, params))
    }

    /// Update the filtered rows; returns the number of rows changed.
    ///
    /// # Errors
    /// See [`QuerySet::compile_update`]; execution errors come from the backend.
    pub async fn update<D, K>(
        self,
        db: &D,
        assignments: impl IntoIterator<Item = (K, SqlValue)>,
    ) -> Result<usize, OrmError>
    where
        D: D1Database + ?Sized,
        K: AsRef<str>,
    {
        let stmt = self.compile_update(assignments)?;
        let result = db.run(&stmt.sql, &stmt.params).await?;
        Ok(result.meta.changes)
    }

    /// Delete the filtered rows; returns the number of rows removed.
    ///
    /// # Errors
    /// See [`QuerySet::compile_delete`]; execution errors come from the backend.
    pub async fn delete<D: D1Database + ?Sized>(self, db: &D) -> Result<usize, OrmError> {
        let stmt = self.compile_delete()?;
        let result = db.run(&stmt.sql, &stmt.params).await?;
        Ok(result.meta.changes)
    }
}

/// `INSERT ... RETURNING` every column, so one round trip yields the stored row.
pub(crate) fn insert_returning(record: &Record) -> Result<BoundStatement, OrmError> {
    let schema = record.schema();
    let columns = codec::encode_insert(record)?;
    let returning = schema.column_list();
    if columns.is_empty() {
        let sql = format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {returning}",
            schema.table_name()
        );
        return Ok(BoundStatement::new(sql, Vec::new()));
    }
    let names = columns.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({names}) VALUES ({placeholders}) RETURNING {returning}",
        schema.table_name()
    );
    let params = columns.into_iter().map(|(_, value)| value).collect();
    Ok(BoundStatement::new(sql, params))
}

fn require_pk(record: &Record, action: &str) -> Result<SqlValue, OrmError> {
    let pk = record.pk();
    if pk.is_null() {
        return Err(OrmError::Query(format!(
            "cannot {action} a {} that has no primary key",
            record.schema().name()
        )));
    }
    Ok(codec::lower_value(pk.clone()))
}

/// Write every loaded, non-key field back by primary key.
pub(crate) fn update_by_pk(record: &Record) -> Result<BoundStatement, OrmError> {
    let pk_value = require_pk(record, "update")?;
    let schema = record.schema();
    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (field, value) in schema.fields().iter().zip(record.raw_values()) {
        let Some(value) = value else { continue };
        if field.is_primary_key() || (value.is_null() && field.is_server_generated()) {
            continue;
        }
        params.push(codec::encode_value(field, value.clone())?);
        assignments.push(format!("{} = ?", field.name()));
    }
    if assignments.is_empty() {
        return Err(OrmError::Query(format!(
            "no loaded fields to save on {}",
            schema.name()
        )));
    }
    params.push(pk_value);
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        schema.table_name(),
        assignments.join(", "),
        schema.primary_key().name()
    );
    Ok(BoundStatement::new(sql, params))
}

pub(crate) fn delete_by_pk(record: &Record) -> Result<BoundStatement, OrmError> {
    let pk_value = require_pk(record, "delete")?;
    let schema = record.schema();
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        schema.table_name(),
        schema.primary_key().name()
    );
    Ok(BoundStatement::new(sql, vec![pk_value]))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{Field, ModelSchema};
    use crate::query_builder::QueryPolicy;
    use crate::results::Row;

    fn items() -> Arc<ModelSchema> {
        ModelSchema::builder("Item")
            .table("items")
            .field(Field::string("name").unique().not_null())
            .field(Field::integer("qty").default(0))
            .field(Field::boolean("active").default(true))
            .build()
            .unwrap()
    }

    #[test]
    fn update_binds_assignments_before_filters() {
        let stmt = QuerySet::new(items())
            .filter("name__contains", "a")
            .unwrap()
            .compile_update([("qty", SqlValue::Int(5)), ("active", SqlValue::Bool(false))])
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE items SET qty = ?, active = ? WHERE name LIKE ? ESCAPE '\\'"
        );
        assert_eq!(
            stmt.params,
            vec![SqlValue::Int(5), SqlValue::Int(0), SqlValue::Text("%a%".into())]
        );
    }

    #[test]
    fn update_rejects_primary_key_unknown_fields_and_nulls() {
        let qs = QuerySet::new(items()).filter("qty", 1).unwrap();
        assert!(matches!(qs.compile_update([("id", SqlValue::Int(1))]), Err(OrmError::Query(_))));
        assert!(matches!(qs.compile_update([("bogus", SqlValue::Int(1))]), Err(OrmError::Query(_))));
        assert!(matches!(
            qs.compile_update([("name", SqlValue::Null)]),
            Err(OrmError::Validation { .. })
        ));
        assert!(qs.compile_update(Vec::<(&str, SqlValue)>::new()).is_err());
    }

    #[test]
    fn unfiltered_writes_follow_policy() {
        let qs = QuerySet::new(items());
        assert!(matches!(
            qs.compile_delete(),
            Err(OrmError::Query(ref m)) if m == "DELETE without WHERE clause not allowed"
        ));
        assert!(qs.compile_update([("qty", SqlValue::Int(1))]).is_err());

        let permissive = QueryPolicy::builder().allow_unfiltered_writes(true).build();
        let stmt = QuerySet::with_policy(items(), permissive).compile_delete().unwrap();
        assert_eq!(stmt.sql, "DELETE FROM items");
    }

    #[test]
    fn windowed_delete_uses_key_subselect() {
        let stmt = QuerySet::new(items())
            .filter("active", true)
            .unwrap()
            .order_by(&["-qty"])
            .unwrap()
            .limit(3)
            .unwrap()
            .compile_delete()
            .unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM items WHERE id IN (SELECT id FROM items WHERE active = ? ORDER BY qty DESC LIMIT 3)"
        );
        assert_eq!(stmt.params, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn insert_returns_every_column() {
        let record = Record::new(&items(), [("name", SqlValue::from("a"))]).unwrap();
        let stmt = insert_returning(&record).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO items (name, qty, active) VALUES (?, ?, ?) RETURNING id, name, qty, active"
        );
        assert_eq!(
            stmt.params,
            vec![SqlValue::Text("a".into()), SqlValue::Int(0), SqlValue::Int(1)]
        );
    }

    #[test]
    fn key_statements_need_a_saved_record() {
        let fresh = Record::new(&items(), [("name", SqlValue::from("a"))]).unwrap();
        assert!(matches!(delete_by_pk(&fresh), Err(OrmError::Query(_))));

        let schema = items();
        let row = Row::from_pairs([
            ("id", SqlValue::Int(7)),
            ("name", SqlValue::Text("a".into())),
            ("qty", SqlValue::Int(2)),
        ]);
        let loaded = codec::decode_row(&schema, &row);
        let stmt = update_by_pk(&loaded).unwrap();
        assert_eq!(stmt.sql, "UPDATE items SET name = ?, qty = ? WHERE id = ?");
        assert_eq!(stmt.params.last(), Some(&SqlValue::Int(7)));
        assert_eq!(delete_by_pk(&loaded).unwrap().params, vec![SqlValue::Int(7)]);
    }
}
