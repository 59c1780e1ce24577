use async_trait::async_trait;

use crate::error::GatewayError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// One checked-out database connection.
///
/// Dropping the session releases it back to wherever it came from.
#[async_trait]
pub trait Session: Send {
    /// Run one or more statements without parameters or results (`BEGIN`, `COMMIT`, ...).
    async fn batch_execute(&mut self, sql: &str) -> Result<(), GatewayError>;

    /// Run a single parameterized statement and collect its rows.
    async fn query(&mut self, sql: &str, params: &[RowValues])
    -> Result<ResultSet, GatewayError>;
}

/// Hands out sessions, normally by checking them out of a pool.
///
/// Sessions are `'static` so an interrupted transaction can be rolled back on a spawned task.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Conn: Session + 'static;

    async fn acquire(&self) -> Result<Self::Conn, GatewayError>;
}
