//! datanest-core: schema compilation and the storage-agnostic CRUD contract
//!
//! Domain models declare their fields once as a [`SchemaDef`]. Compiling it
//! yields a [`CompiledSchema`] holding two validator sets (insert and update)
//! plus the default-value table. Storage backends implement [`Adapter`] on
//! top of a compiled schema so calling code never sees the driver.

pub mod adapter;
pub mod config;
pub mod error;
pub mod record;
pub mod schema;
pub mod validate;

pub use adapter::Adapter;
pub use config::{BackendKind, ConnectionKind, DataConfig};
pub use error::{ConfigError, ConnectionError, Result, SchemaError, StoreError, ValidationError};
pub use record::{into_record, is_identifier, FindOptions, Listing, Predicate, Record, SortOrder, ID_FIELD};
pub use schema::{Accepts, CompiledSchema, FieldSpec, FieldType, SchemaDef};
pub use validate::{FieldValidator, RuleSet};
