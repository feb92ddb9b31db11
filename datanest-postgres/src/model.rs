//! Relational adapter

use async_trait::async_trait;
use datanest_core::{
    is_identifier, Adapter, CompiledSchema, FindOptions, Predicate, Record, Result, SchemaDef,
    SchemaError, StoreError, ValidationError,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::builder::Select;
use crate::connect::PgHandle;
use crate::ddl::{create_table, CREATE_EXTENSION};
use crate::query::{Statement, Table};

/// One table bound to a compiled schema and a connection handle
#[derive(Debug)]
pub struct PgModel {
    name: String,
    schema: CompiledSchema,
    handle: PgHandle,
}

impl PgModel {
    /// Compile the schema and create the table if it does not exist yet.
    /// Declaring the same model again is a no-op against existing rows.
    pub async fn declare(handle: PgHandle, name: &str, def: &SchemaDef) -> Result<Self> {
        let model = Self::attach(handle, name, def)?;

        // gen_random_uuid() is built in from PostgreSQL 13; older servers need
        // the extension, which an unprivileged role may not be able to create
        if let Err(e) = model.handle.execute(&Statement::new(CREATE_EXTENSION)).await {
            warn!(error = %e, "Could not ensure pgcrypto extension");
        }

        let ddl = create_table(&model.name, &model.schema);
        model
            .handle
            .execute(&Statement::new(ddl))
            .await
            .map_err(|e| StoreError::operation(format!("create table {}", model.name), e))?;

        info!(
            table = %model.name,
            columns = model.schema.fields().len(),
            "Declared table"
        );
        Ok(model)
    }

    /// Bind to a table without issuing any DDL.
    pub fn attach(handle: PgHandle, name: &str, def: &SchemaDef) -> Result<Self> {
        if !is_identifier(name) {
            return Err(SchemaError::InvalidIdentifier {
                name: name.to_string(),
            }
            .into());
        }
        Ok(Self {
            name: name.to_string(),
            schema: CompiledSchema::compile(def)?,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &PgHandle {
        &self.handle
    }

    pub fn table(&self) -> Table<'_> {
        Table::new(&self.name, &self.schema)
    }

    /// Start a fluent select chain. An empty list or `"*"` selects every column.
    pub fn select(&self, columns: &[&str]) -> Select<'_> {
        Select::new(self, columns)
    }

    async fn fetch(&self, context: &str, stmt: &Statement) -> Result<Vec<Record>> {
        self.handle
            .fetch_records(stmt)
            .await
            .map_err(|e| StoreError::operation(format!("{} on {}", context, self.name), e))
    }

    async fn execute(&self, context: &str, stmt: &Statement) -> Result<u64> {
        self.handle
            .execute(stmt)
            .await
            .map_err(|e| StoreError::operation(format!("{} on {}", context, self.name), e))
    }

    async fn insert(&self, mut doc: Record) -> Result<Record> {
        self.schema.apply_defaults(&mut doc);
        let stmt = self.table().insert(&doc)?;
        self.fetch("insert", &stmt)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::operation(format!("insert on {}", self.name), "no row returned"))
    }
}

#[async_trait]
impl Adapter for PgModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    async fn add(&self, doc: Record) -> Result<Record> {
        self.schema.validate_insert(&doc)?;
        self.insert(doc).await
    }

    /// Sequential inserts after every record has passed validation. Not
    /// transactional: a store failure part-way leaves the earlier rows.
    async fn add_many(&self, docs: Vec<Record>) -> Result<Vec<Record>> {
        if docs.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        for doc in &docs {
            self.schema.validate_insert(doc)?;
        }

        let mut stored = Vec::with_capacity(docs.len());
        for doc in docs {
            stored.push(self.insert(doc).await?);
        }
        debug!(table = %self.name, rows = stored.len(), "Inserted batch");
        Ok(stored)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        let stmt = self.table().select_by_id(id)?;
        Ok(self.fetch("find by id", &stmt).await?.into_iter().next())
    }

    async fn find_one(&self, predicate: &Predicate, opts: &FindOptions) -> Result<Option<Record>> {
        let opts = opts.clone().limit(1);
        let stmt = self.table().select(predicate, &opts)?;
        Ok(self.fetch("find one", &stmt).await?.into_iter().next())
    }

    async fn find(&self, predicate: &Predicate, opts: &FindOptions) -> Result<Vec<Record>> {
        let stmt = self.table().select(predicate, opts)?;
        self.fetch("find", &stmt).await
    }

    async fn update_by_id(&self, id: &str, data: Record) -> Result<Option<Record>> {
        self.schema.validate_update(&data)?;
        let stmt = self.table().update_by_id(id, &data)?;
        Ok(self.fetch("update by id", &stmt).await?.into_iter().next())
    }

    async fn update(&self, predicate: &Predicate, data: Record) -> Result<u64> {
        self.schema.validate_update(&data)?;
        let stmt = self.table().update(predicate, &data)?;
        self.execute("update", &stmt).await
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let stmt = self.table().count(predicate)?;
        let rows = self.fetch("count", &stmt).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    async fn remove_by_id(&self, id: &str) -> Result<u64> {
        let stmt = self.table().delete_by_id(id)?;
        self.execute("remove by id", &stmt).await
    }

    async fn remove(&self, predicate: &Predicate) -> Result<u64> {
        let stmt = self.table().delete(predicate)?;
        self.execute("remove", &stmt).await
    }

    async fn remove_many(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let stmt = self.table().delete_many(ids)?;
        self.execute("remove many", &stmt).await
    }
}
