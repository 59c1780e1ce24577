use deadpool_postgres::{
    Config as PgConfig, Pool, PoolConfig as DeadpoolPoolConfig, Runtime, SslMode, Timeouts,
};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::NoTls;
use tracing::info;

use crate::config::{PoolConfig, SslPolicy};
use crate::error::GatewayError;

impl PoolConfig {
    /// Translate into a `deadpool_postgres::Config`.
    ///
    /// The connection timeout bounds both pool checkout and connection setup; a zero value
    /// leaves them unbounded.
    #[must_use]
    pub fn to_deadpool(&self) -> PgConfig {
        let mut cfg = PgConfig::new();
        cfg.host.clone_from(&self.host);
        cfg.port = self.port;
        cfg.dbname.clone_from(&self.database);
        cfg.user.clone_from(&self.user);
        cfg.password.clone_from(&self.password);
        cfg.keepalives = Some(self.keep_alive);
        cfg.keepalives_idle = Some(self.keep_alive_initial_delay);
        cfg.ssl_mode = Some(match self.ssl {
            SslPolicy::Disabled => SslMode::Disable,
            SslPolicy::Enabled { .. } => SslMode::Require,
        });

        let connection_timeout =
            (!self.connection_timeout.is_zero()).then_some(self.connection_timeout);
        cfg.connect_timeout = connection_timeout;

        let mut timeouts = Timeouts::default();
        timeouts.wait = connection_timeout;
        timeouts.create = connection_timeout;

        let mut pool = DeadpoolPoolConfig::new(self.max_connections);
        pool.timeouts = timeouts;
        cfg.pool = Some(pool);
        cfg
    }

    /// Create the connection pool on the Tokio runtime.
    ///
    /// No connection is opened until the first checkout.
    ///
    /// # Errors
    /// Returns `GatewayError::TlsError` if the TLS connector cannot be built or
    /// `GatewayError::CreatePoolError` if deadpool rejects the configuration.
    pub fn build_pool(&self) -> Result<Pool, GatewayError> {
        let cfg = self.to_deadpool();
        let pool = match self.ssl {
            SslPolicy::Disabled => cfg.create_pool(Some(Runtime::Tokio1), NoTls)?,
            SslPolicy::Enabled {
                reject_unauthorized,
            } => {
                let connector = TlsConnector::builder()
                    .danger_accept_invalid_certs(!reject_unauthorized)
                    .danger_accept_invalid_hostnames(!reject_unauthorized)
                    .build()?;
                cfg.create_pool(Some(Runtime::Tokio1), MakeTlsConnector::new(connector))?
            }
        };

        info!(
            host = self.host.as_deref().unwrap_or("<default>"),
            database = self.database.as_deref().unwrap_or("<default>"),
            max_connections = self.max_connections,
            ssl = ?self.ssl,
            "postgres pool created"
        );
        Ok(pool)
    }
}
