use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::field::Field;
use crate::error::OrmError;
use crate::query_builder::QueryPolicy;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// True when `name` can be used unquoted as a table or column name.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Definition-time schema of one entity: ordered fields, table name and primary key.
///
/// Immutable once built; every `QuerySet` holds it through an `Arc`.
#[derive(Debug)]
pub struct ModelSchema {
    name: String,
    table: String,
    fields: Vec<Field>,
    positions: HashMap<String, usize>,
    pk_index: usize,
    policy: QueryPolicy,
}

impl ModelSchema {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder::new(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.positions.get(name).map(|&idx| &self.fields[idx])
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Look up a field, failing with a `QueryError` naming it when absent.
    ///
    /// # Errors
    /// Returns `OrmError::Query` if the model has no field called `name`.
    pub fn require_field(&self, name: &str) -> Result<&Field, OrmError> {
        self.field(name)
            .ok_or_else(|| OrmError::unknown_field(name, &self.name))
    }

    #[must_use]
    pub fn primary_key(&self) -> &Field {
        &self.fields[self.pk_index]
    }

    #[must_use]
    pub fn pk_index(&self) -> usize {
        self.pk_index
    }

    #[must_use]
    pub fn policy(&self) -> &QueryPolicy {
        &self.policy
    }

    /// Comma separated column list in declaration order.
    #[must_use]
    pub fn column_list(&self) -> String {
        self.fields
            .iter()
            .map(Field::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Fluent builder for [`ModelSchema`].
#[derive(Debug)]
pub struct ModelSchemaBuilder {
    name: String,
    table: Option<String>,
    primary_key: Option<String>,
    fields: Vec<Field>,
    policy: QueryPolicy,
}

impl ModelSchemaBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            table: None,
            primary_key: None,
            fields: Vec::new(),
            policy: QueryPolicy::default(),
        }
    }

    /// Table name; defaults to the lowercased model name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Name a declared field as the primary key instead of the implicit `id`.
    #[must_use]
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Default query policy for querysets created from this model.
    #[must_use]
    pub fn policy(mut self, policy: QueryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate identifiers and the primary key, then freeze the schema.
    ///
    /// # Errors
    /// Returns `OrmError::Schema` for invalid or duplicate names, or more than one primary key.
    pub fn build(self) -> Result<Arc<ModelSchema>, OrmError> {
        let table = self
            .table
            .unwrap_or_else(|| self.name.to_ascii_lowercase());
        if !is_valid_identifier(&table) {
            return Err(OrmError::Schema(format!("invalid table name '{table}'")));
        }

        let mut fields = self.fields;
        if let Some(pk_name) = &self.primary_key {
            let field = fields
                .iter_mut()
                .find(|f| f.name() == pk_name)
                .ok_or_else(|| {
                    OrmError::Schema(format!(
                        "primary key '{pk_name}' is not a field of '{}'",
                        self.name
                    ))
                })?;
            *field = field.clone().primary_key();
        }

        let declared_pks = fields.iter().filter(|f| f.is_primary_key()).count();
        if declared_pks > 1 {
            return Err(OrmError::Schema(format!(
                "model '{}' declares {declared_pks} primary keys",
                self.name
            )));
        }
        if declared_pks == 0 {
            fields.insert(0, Field::auto_id("id"));
        }

        let mut positions = HashMap::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            if !is_valid_identifier(field.name()) {
                return Err(OrmError::Schema(format!(
                    "invalid field name '{}' on '{}'",
                    field.name(),
                    self.name
                )));
            }
            if positions.insert(field.name().to_owned(), idx).is_some() {
                return Err(OrmError::Schema(format!(
                    "duplicate field '{}' on '{}'",
                    field.name(),
                    self.name
                )));
            }
        }
        let pk_index = fields
            .iter()
            .position(Field::is_primary_key)
            .ok_or_else(|| OrmError::Schema("primary key missing".into()))?;

        Ok(Arc::new(ModelSchema {
            name: self.name,
            table,
            fields,
            positions,
            pk_index,
            policy: self.policy,
        }))
    }
}
