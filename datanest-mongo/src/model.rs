//! Document adapter

use async_trait::async_trait;
use datanest_core::{
    Adapter, CompiledSchema, FindOptions, Predicate, Record, Result, SchemaDef, SchemaError,
    StoreError, ValidationError, ID_FIELD,
};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::options::{self, FindOneOptions, ReturnDocument, UpdateOptions};
use mongodb::{Collection, Database};
use serde_json::Value;
use tracing::{debug, info};

use crate::convert::{filter, object_id, sort_document, to_document, to_record, update_pipeline};

/// Creation timestamp set on every validated insert
pub const CREATED_FIELD: &str = "createdAt";

/// Options for [`MongoModel::update_raw`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawUpdate {
    /// Insert when nothing matches
    pub upsert: bool,
    /// Update every match instead of the first
    pub multi: bool,
}

/// One collection bound to a compiled schema
#[derive(Debug, Clone)]
pub struct MongoModel {
    name: String,
    schema: CompiledSchema,
    collection: Collection<Document>,
}

impl MongoModel {
    /// Compile the schema and select the collection. No I/O happens here;
    /// the collection is created by the server on first insert.
    pub fn declare(db: &Database, name: &str, def: &SchemaDef) -> Result<Self> {
        if name.is_empty() || name.contains('$') || name.starts_with("system.") {
            return Err(SchemaError::InvalidIdentifier {
                name: name.to_string(),
            }
            .into());
        }
        let schema = CompiledSchema::compile(def)?;
        info!(
            collection = name,
            database = %db.name(),
            fields = schema.fields().len(),
            "Declared collection"
        );
        Ok(Self {
            name: name.to_string(),
            schema,
            collection: db.collection(name),
        })
    }

    pub fn collection(&self) -> &Collection<Document> {
        &self.collection
    }

    /// Insert documents as given: no validation, no defaults, no timestamp.
    /// Accepts one object or an array of objects.
    pub async fn add_bulk(&self, docs: Value) -> Result<Vec<Record>> {
        let records = match docs {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    _ => Err(ValidationError::NotAnObject),
                })
                .collect::<std::result::Result<Vec<_>, _>>()?,
            Value::Object(map) => vec![map],
            _ => return Err(ValidationError::NotAnObject.into()),
        };
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let docs: Vec<Document> = records.iter().map(to_document).collect();
        self.insert_documents("add bulk", docs).await
    }

    /// Pass an update document straight to the store, operators included.
    /// Returns matched documents, plus one when an upsert inserted.
    pub async fn update_raw(
        &self,
        predicate: &Predicate,
        update: Record,
        opts: RawUpdate,
    ) -> Result<u64> {
        if update.is_empty() {
            return Err(ValidationError::Empty.into());
        }
        let query = filter(predicate)?;
        let update = to_document(&update);
        let mut options = UpdateOptions::default();
        options.upsert = Some(opts.upsert);

        let result = if opts.multi {
            self.collection
                .update_many(query, update)
                .with_options(options)
                .await
        } else {
            self.collection
                .update_one(query, update)
                .with_options(options)
                .await
        }
        .map_err(|e| self.failed("update raw", e))?;

        Ok(result.matched_count + u64::from(result.upserted_id.is_some()))
    }

    async fn insert_documents(&self, context: &str, mut docs: Vec<Document>) -> Result<Vec<Record>> {
        let result = self
            .collection
            .insert_many(&docs)
            .await
            .map_err(|e| self.failed(context, e))?;

        for (index, id) in result.inserted_ids {
            if let Some(doc) = docs.get_mut(index) {
                doc.insert(ID_FIELD, id);
            }
        }
        debug!(collection = %self.name, documents = docs.len(), "Inserted batch");
        Ok(docs.into_iter().map(to_record).collect())
    }

    fn prepare(&self, mut record: Record) -> Document {
        self.schema.apply_defaults(&mut record);
        let mut doc = to_document(&record);
        doc.insert(CREATED_FIELD, DateTime::now());
        doc
    }

    fn failed(&self, context: &str, source: mongodb::error::Error) -> StoreError {
        StoreError::operation(format!("{} on {}", context, self.name), source)
    }
}

fn find_options(opts: &FindOptions) -> options::FindOptions {
    let mut options = options::FindOptions::default();
    options.sort = sort_document(&opts.sort);
    options.limit = opts.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
    options.skip = opts.skip;
    options
}

fn find_one_options(opts: &FindOptions) -> FindOneOptions {
    let mut options = FindOneOptions::default();
    options.sort = sort_document(&opts.sort);
    options.skip = opts.skip;
    options
}

#[async_trait]
impl Adapter for MongoModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    async fn add(&self, doc: Record) -> Result<Record> {
        self.schema.validate_insert(&doc)?;
        let mut doc = self.prepare(doc);
        let result = self
            .collection
            .insert_one(&doc)
            .await
            .map_err(|e| self.failed("insert", e))?;
        doc.insert(ID_FIELD, result.inserted_id);
        Ok(to_record(doc))
    }

    async fn add_many(&self, docs: Vec<Record>) -> Result<Vec<Record>> {
        if docs.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        for doc in &docs {
            self.schema.validate_insert(doc)?;
        }
        let docs = docs.into_iter().map(|doc| self.prepare(doc)).collect();
        self.insert_documents("insert many", docs).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        let id = object_id(id)?;
        let found = self
            .collection
            .find_one(doc! { ID_FIELD: id })
            .await
            .map_err(|e| self.failed("find by id", e))?;
        Ok(found.map(to_record))
    }

    async fn find_one(&self, predicate: &Predicate, opts: &FindOptions) -> Result<Option<Record>> {
        let found = self
            .collection
            .find_one(filter(predicate)?)
            .with_options(find_one_options(opts))
            .await
            .map_err(|e| self.failed("find one", e))?;
        Ok(found.map(to_record))
    }

    async fn find(&self, predicate: &Predicate, opts: &FindOptions) -> Result<Vec<Record>> {
        let cursor = self
            .collection
            .find(filter(predicate)?)
            .with_options(find_options(opts))
            .await
            .map_err(|e| self.failed("find", e))?;
        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| self.failed("find", e))?;
        Ok(docs.into_iter().map(to_record).collect())
    }

    async fn update_by_id(&self, id: &str, data: Record) -> Result<Option<Record>> {
        self.schema.validate_update(&data)?;
        let id = object_id(id)?;
        let updated = self
            .collection
            .find_one_and_update(doc! { ID_FIELD: id }, update_pipeline(&data))
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| self.failed("update by id", e))?;
        Ok(updated.map(to_record))
    }

    async fn update(&self, predicate: &Predicate, data: Record) -> Result<u64> {
        self.schema.validate_update(&data)?;
        let result = self
            .collection
            .update_many(filter(predicate)?, update_pipeline(&data))
            .await
            .map_err(|e| self.failed("update", e))?;
        Ok(result.matched_count)
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        self.collection
            .count_documents(filter(predicate)?)
            .await
            .map_err(|e| self.failed("count", e))
    }

    async fn remove_by_id(&self, id: &str) -> Result<u64> {
        let id = object_id(id)?;
        let result = self
            .collection
            .delete_one(doc! { ID_FIELD: id })
            .await
            .map_err(|e| self.failed("remove by id", e))?;
        Ok(result.deleted_count)
    }

    async fn remove(&self, predicate: &Predicate) -> Result<u64> {
        let result = self
            .collection
            .delete_many(filter(predicate)?)
            .await
            .map_err(|e| self.failed("remove", e))?;
        Ok(result.deleted_count)
    }

    async fn remove_many(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids
            .iter()
            .map(|id| object_id(id).map(Bson::ObjectId))
            .collect::<Result<Vec<_>>>()?;
        let result = self
            .collection
            .delete_many(doc! { ID_FIELD: { "$in": ids } })
            .await
            .map_err(|e| self.failed("remove many", e))?;
        Ok(result.deleted_count)
    }
}
