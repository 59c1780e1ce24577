//! Query gateway: schema-prefixed pooled queries and transaction-scoped execution.

use std::borrow::Cow;

use deadpool_postgres::{Pool, Status};
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{PoolConfig, load_dotenv};
use crate::error::GatewayError;
use crate::postgres::spawn_idle_reaper;
use crate::results::ResultSet;
use crate::schema::SchemaRewriter;
use crate::session::{ConnectionSource, Session};
use crate::types::RowValues;

/// Entry point for database access.
///
/// Build one per process and share it (by reference or `Arc`) with everything that needs the
/// database.
pub struct Gateway<S = Pool> {
    source: S,
    rewriter: SchemaRewriter,
    reaper: Option<JoinHandle<()>>,
}

impl Gateway<Pool> {
    /// Build a gateway from `.env` and the `PG*` environment variables.
    ///
    /// Must be called inside a Tokio runtime: it spawns the idle-connection reaper.
    ///
    /// # Errors
    /// Returns `GatewayError::ConfigError` for invalid variables, or the error from
    /// [`PoolConfig::build_pool`].
    pub fn from_env() -> Result<Self, GatewayError> {
        load_dotenv();
        let config = PoolConfig::from_env()?;
        Self::from_config(&config)
    }

    /// Build a gateway from an explicit configuration.
    ///
    /// # Errors
    /// Returns the error from [`PoolConfig::build_pool`].
    pub fn from_config(config: &PoolConfig) -> Result<Self, GatewayError> {
        let pool = config.build_pool()?;
        let reaper = (!config.idle_timeout.is_zero())
            .then(|| spawn_idle_reaper(pool.clone(), config.idle_timeout));
        Ok(Self {
            source: pool,
            rewriter: SchemaRewriter::default(),
            reaper,
        })
    }

    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.source
    }

    /// Current pool size and availability.
    #[must_use]
    pub fn status(&self) -> Status {
        self.source.status()
    }

    /// Close the pool and stop the idle reaper. Checked-out connections close on release.
    pub fn close(&self) {
        self.source.close();
        if let Some(reaper) = &self.reaper {
            reaper.abort();
        }
    }
}

impl<S: ConnectionSource> Gateway<S> {
    /// Wrap an existing connection source with the default schema rewrite.
    pub fn new(source: S) -> Self {
        Self::with_rewriter(source, SchemaRewriter::default())
    }

    pub fn with_rewriter(source: S, rewriter: SchemaRewriter) -> Self {
        Self {
            source,
            rewriter,
            reaper: None,
        }
    }

    #[must_use]
    pub fn rewriter(&self) -> &SchemaRewriter {
        &self.rewriter
    }

    /// Run one statement on a pooled connection.
    ///
    /// The connection is checked out for this statement only and released before returning.
    ///
    /// # Errors
    /// Returns the pool error if no connection could be acquired, or the driver error if the
    /// statement fails.
    pub async fn query(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, GatewayError> {
        let sql = rewrite_logged(&self.rewriter, sql);
        let mut conn = self.source.acquire().await?;
        conn.query(&sql, params).await
    }

    /// Run `f` inside a transaction on one exclusively held connection.
    ///
    /// `BEGIN` is issued before `f`, `COMMIT` after it succeeds. If `BEGIN`, `f` or `COMMIT`
    /// fails, `ROLLBACK` is attempted and the original error is returned; a failing rollback
    /// is logged and never replaces it. The connection is released exactly once, on every
    /// path. If the returned future is dropped early or `f` panics, the rollback runs on a
    /// spawned task before the connection goes back to the pool.
    ///
    /// ```rust,no_run
    /// # use pg_gateway::prelude::*;
    /// # async fn demo(gateway: &Gateway) -> Result<(), GatewayError> {
    /// let order_id = gateway
    ///     .with_transaction(|tx| {
    ///         Box::pin(async move {
    ///             let rows = tx
    ///                 .query(
    ///                     "INSERT INTO orders (user_id) VALUES ($1) RETURNING id",
    ///                     &[RowValues::Int(42)],
    ///                 )
    ///                 .await?;
    ///             let id = rows.first().and_then(|r| r.get("id")).cloned();
    ///             tx.query("DELETE FROM cart_items WHERE user_id = $1", &[RowValues::Int(42)])
    ///                 .await?;
    ///             Ok::<_, GatewayError>(id)
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = order_id;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns the error from acquiring the connection, `BEGIN`, `f`, or `COMMIT`.
    pub async fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction<'_, S::Conn>) -> BoxFuture<'t, Result<T, E>>,
        E: From<GatewayError>,
    {
        let mut guard = RollbackGuard::new(self.source.acquire().await.map_err(E::from)?);
        let conn = guard.session().map_err(E::from)?;

        let outcome = match conn.batch_execute("BEGIN").await {
            Err(err) => Err(E::from(err)),
            Ok(()) => {
                let mut tx = Transaction {
                    conn: &mut *conn,
                    rewriter: &self.rewriter,
                };
                match f(&mut tx).await {
                    Ok(value) => conn
                        .batch_execute("COMMIT")
                        .await
                        .map(|()| value)
                        .map_err(E::from),
                    Err(err) => Err(err),
                }
            }
        };

        if outcome.is_err() {
            if let Err(rollback_err) = conn.batch_execute("ROLLBACK").await {
                warn!(error = %rollback_err, "rollback failed; returning the original error");
            } else {
                debug!("transaction rolled back");
            }
        }

        guard.release();
        outcome
    }
}

/// Owns a transaction's connection until the transaction has finished.
///
/// Dropped while still armed (cancelled future, panic in the callback), it sends `ROLLBACK`
/// from a spawned task and only then lets the connection go back to the pool.
struct RollbackGuard<C: Session + 'static> {
    conn: Option<C>,
    armed: bool,
}

impl<C: Session + 'static> RollbackGuard<C> {
    fn new(conn: C) -> Self {
        Self {
            conn: Some(conn),
            armed: true,
        }
    }

    fn session(&mut self) -> Result<&mut C, GatewayError> {
        self.conn.as_mut().ok_or_else(|| {
            GatewayError::ExecutionError("transaction connection already released".into())
        })
    }

    /// The transaction ended with `COMMIT` or an explicit `ROLLBACK`; release normally.
    fn release(mut self) {
        self.armed = false;
    }
}

impl<C: Session + 'static> Drop for RollbackGuard<C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("transaction interrupted; rolling back in the background");
                handle.spawn(async move {
                    if let Err(err) = conn.batch_execute("ROLLBACK").await {
                        warn!(error = %err, "background rollback failed");
                    }
                });
            }
            // Without a runtime the connection is dropped; the server aborts the transaction
            // when the socket closes.
            Err(_) => warn!("transaction interrupted outside a runtime; dropping connection"),
        }
    }
}

impl<S> Drop for Gateway<S> {
    fn drop(&mut self) {
        // The reaper holds its own pool handle.
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
    }
}

/// A transaction in progress, bound to one connection.
///
/// Only handed out by [`Gateway::with_transaction`]; statements run in program order and
/// share the transaction.
pub struct Transaction<'c, C> {
    conn: &'c mut C,
    rewriter: &'c SchemaRewriter,
}

impl<C: Session> Transaction<'_, C> {
    /// Run one statement inside the transaction, with the same schema rewrite as
    /// [`Gateway::query`].
    ///
    /// # Errors
    /// Returns the driver error if the statement fails.
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, GatewayError> {
        let sql = rewrite_logged(self.rewriter, sql);
        self.conn.query(&sql, params).await
    }
}

fn rewrite_logged<'a>(rewriter: &SchemaRewriter, sql: &'a str) -> Cow<'a, str> {
    let rewritten = rewriter.rewrite(sql);
    if let Cow::Owned(text) = &rewritten {
        debug!(original = sql, rewritten = %text, "prefixed table names");
    }
    rewritten
}
