//! Postgres access helper: an environment-configured connection pool, a `query` function that
//! prefixes a fixed set of table names with `public.`, and a `with_transaction` wrapper that
//! runs a closure between `BEGIN` and `COMMIT`/`ROLLBACK` on one pooled connection.

pub mod config;
pub mod error;
pub mod gateway;
pub mod postgres;
pub mod prelude;
pub mod results;
pub mod schema;
pub mod session;
pub mod types;

pub use config::{PoolConfig, SslPolicy};
pub use error::GatewayError;
pub use gateway::{Gateway, Transaction};
pub use results::{CustomDbRow, ResultSet};
pub use schema::{SchemaRewriter, prefix_public_schema};
pub use session::{ConnectionSource, Session};
pub use types::RowValues;
