//! datanest-mongo: document backend
//!
//! - [`MongoConnections`] owns the process-wide pooled and single clients
//! - [`convert`] moves records between JSON and BSON
//! - [`MongoModel`] implements the [`Adapter`](datanest_core::Adapter) contract,
//!   plus the unchecked [`MongoModel::add_bulk`] and pass-through
//!   [`MongoModel::update_raw`]

pub mod connect;
pub mod convert;
pub mod model;

pub use connect::MongoConnections;
pub use model::{MongoModel, RawUpdate};
