use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use futures_util::TryStreamExt;
use tokio_postgres::types::ToSql;

use super::params::Params;
use super::query::build_result_set;
use crate::error::GatewayError;
use crate::results::ResultSet;
use crate::session::{ConnectionSource, Session};
use crate::types::RowValues;

/// A pooled Postgres connection; returns to the pool when dropped.
pub struct PgSession {
    client: Object,
}

impl PgSession {
    #[must_use]
    pub fn new(client: Object) -> Self {
        Self { client }
    }

    /// Give back the underlying pooled object.
    #[must_use]
    pub fn into_inner(self) -> Object {
        self.client
    }
}

#[async_trait]
impl Session for PgSession {
    async fn batch_execute(&mut self, sql: &str) -> Result<(), GatewayError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, GatewayError> {
        // Not `prepare_cached`: the per-connection cache is unbounded and queries are ad hoc.
        let stmt = self.client.prepare(sql).await?;
        let converted = Params::convert(params);
        let stream = self
            .client
            .query_raw(&stmt, converted.as_refs().iter().map(|p| *p as &dyn ToSql))
            .await?;
        let mut stream = std::pin::pin!(stream);

        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            rows.push(row);
        }
        build_result_set(&stmt, &rows, stream.rows_affected())
    }
}

#[async_trait]
impl ConnectionSource for Pool {
    type Conn = PgSession;

    async fn acquire(&self) -> Result<PgSession, GatewayError> {
        let client = self.get().await?;
        Ok(PgSession::new(client))
    }
}
