//! The CRUD contract every storage backend implements

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{FindOptions, Listing, Predicate, Record};
use crate::schema::CompiledSchema;

/// Schema-validated CRUD against one table or collection.
///
/// Write paths validate before touching storage, so a validation failure
/// never leaves a partial write behind. Store failures surface as
/// [`StoreError::Operation`](crate::StoreError::Operation) with the driver
/// error as the source; nothing is retried.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Table or collection name
    fn name(&self) -> &str;

    fn schema(&self) -> &CompiledSchema;

    /// Validate, backfill defaults and insert one record. Returns the stored
    /// record including its `_id`.
    async fn add(&self, doc: Record) -> Result<Record>;

    /// Validate every record, then insert them all.
    async fn add_many(&self, docs: Vec<Record>) -> Result<Vec<Record>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>>;

    async fn find_one(&self, predicate: &Predicate, opts: &FindOptions) -> Result<Option<Record>>;

    async fn find(&self, predicate: &Predicate, opts: &FindOptions) -> Result<Vec<Record>>;

    /// Partial update of one record. Composite values merge into the
    /// existing value instead of replacing it.
    async fn update_by_id(&self, id: &str, data: Record) -> Result<Option<Record>>;

    /// Partial update of every matching record. Returns the match count.
    async fn update(&self, predicate: &Predicate, data: Record) -> Result<u64>;

    async fn count(&self, predicate: &Predicate) -> Result<u64>;

    /// One page of matches plus the total match count.
    async fn list(&self, predicate: &Predicate, opts: &FindOptions) -> Result<Listing> {
        let list = self.find(predicate, opts).await?;
        let count = self.count(predicate).await?;
        Ok(Listing { list, count })
    }

    async fn remove_by_id(&self, id: &str) -> Result<u64>;

    async fn remove(&self, predicate: &Predicate) -> Result<u64>;

    async fn remove_many(&self, ids: &[String]) -> Result<u64>;
}
