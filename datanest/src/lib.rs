//! datanest: backend-agnostic models
//!
//! A [`Backend`] is chosen once at startup from [`DataConfig`] and handed to
//! whatever declares models. Every [`Model`] it declares exposes the same
//! [`Adapter`] operations whichever store sits underneath.

pub mod users;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use datanest_mongo::{MongoConnections, MongoModel};
use datanest_postgres::{PgConnections, PgModel};
use tracing::info;

pub use datanest_core::{
    Accepts, Adapter, BackendKind, ConnectionKind, DataConfig, FieldSpec, FieldType, FindOptions,
    Listing, Predicate, Record, Result, SchemaDef, SortOrder, StoreError,
};
pub use users::{public_view, user_schema, NewUser, UserModel};

/// The store selected for this process, with its connection manager
#[derive(Clone)]
pub enum Backend {
    Document(Arc<MongoConnections>),
    Relational(Arc<PgConnections>),
}

impl Backend {
    pub fn from_config(config: &DataConfig) -> Self {
        match config.backend {
            BackendKind::Document => Backend::Document(Arc::new(MongoConnections::new(config))),
            BackendKind::Relational => Backend::Relational(Arc::new(PgConnections::new(config))),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Document(_) => BackendKind::Document,
            Backend::Relational(_) => BackendKind::Relational,
        }
    }

    /// Create both handles up front.
    pub async fn connect(&self) -> Result<()> {
        match self {
            Backend::Document(conns) => {
                conns.create_pool().await?;
                conns.create_client().await?;
            }
            Backend::Relational(conns) => {
                conns.create_pool().await?;
                conns.create_client().await?;
            }
        }
        info!(backend = %self.kind(), "Connected");
        Ok(())
    }

    /// Compile `def` and bind it to `name` on the requested handle. On the
    /// relational backend this also creates the table if needed.
    pub async fn declare(&self, kind: ConnectionKind, name: &str, def: &SchemaDef) -> Result<Model> {
        match self {
            Backend::Document(conns) => {
                let db = conns.handle(kind).await?;
                Ok(MongoModel::declare(&db, name, def)?.into())
            }
            Backend::Relational(conns) => {
                let handle = conns.handle(kind).await?;
                Ok(PgModel::declare(handle, name, def).await?.into())
            }
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Document(conns) => f.debug_tuple("Document").field(conns).finish(),
            Backend::Relational(conns) => f.debug_tuple("Relational").field(conns).finish(),
        }
    }
}

/// A declared table or collection. Derefs to [`Adapter`].
#[derive(Debug)]
pub struct Model {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Document(MongoModel),
    Relational(PgModel),
}

impl Model {
    pub fn kind(&self) -> BackendKind {
        match &self.inner {
            Inner::Document(_) => BackendKind::Document,
            Inner::Relational(_) => BackendKind::Relational,
        }
    }

    /// The relational model, for the fluent select chain
    pub fn as_relational(&self) -> Option<&PgModel> {
        match &self.inner {
            Inner::Relational(model) => Some(model),
            Inner::Document(_) => None,
        }
    }

    /// The document model, for bulk inserts and raw updates
    pub fn as_document(&self) -> Option<&MongoModel> {
        match &self.inner {
            Inner::Document(model) => Some(model),
            Inner::Relational(_) => None,
        }
    }

    pub fn adapter(&self) -> &(dyn Adapter + 'static) {
        match &self.inner {
            Inner::Document(model) => model,
            Inner::Relational(model) => model,
        }
    }
}

impl Deref for Model {
    type Target = dyn Adapter;

    fn deref(&self) -> &Self::Target {
        self.adapter()
    }
}

impl From<MongoModel> for Model {
    fn from(model: MongoModel) -> Self {
        Self {
            inner: Inner::Document(model),
        }
    }
}

impl From<PgModel> for Model {
    fn from(model: PgModel) -> Self {
        Self {
            inner: Inner::Relational(model),
        }
    }
}
