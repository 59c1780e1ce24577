use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error(transparent)]
    PoolError(#[from] deadpool_postgres::PoolError),

    #[error(transparent)]
    CreatePoolError(#[from] deadpool_postgres::CreatePoolError),

    #[error(transparent)]
    TlsError(#[from] native_tls::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl GatewayError {
    /// Build a configuration error for an environment variable that failed to parse.
    pub(crate) fn invalid_env(name: &str, value: &str, expected: &str) -> Self {
        GatewayError::ConfigError(format!("{name}={value:?} is not a valid {expected}"))
    }
}
