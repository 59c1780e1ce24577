//! Convenient imports for common functionality.

pub use crate::config::{PoolConfig, SslPolicy};
pub use crate::error::GatewayError;
pub use crate::gateway::{Gateway, Transaction};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::schema::{SchemaRewriter, prefix_public_schema};
pub use crate::session::{ConnectionSource, Session};
pub use crate::types::RowValues;

pub use futures_util::future::BoxFuture;
