//! datanest-postgres: relational backend
//!
//! - [`PgConnections`] owns the process-wide pooled and single handles
//! - [`ddl`] maps field types to column types and builds `CREATE TABLE`
//! - [`query`] turns records and predicates into parameterized statements
//! - [`Select`] is the fluent select/where/order/limit/offset chain
//! - [`PgModel`] implements the [`Adapter`](datanest_core::Adapter) contract

pub mod builder;
pub mod connect;
pub mod ddl;
pub mod model;
pub mod query;

pub use builder::Select;
pub use connect::{PgConnections, PgHandle, SingleConnection};
pub use model::PgModel;
pub use query::Statement;
