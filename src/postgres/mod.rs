// Postgres backend:
// - config: PoolConfig -> deadpool pool, TLS selection
// - params: RowValues as tokio-postgres parameters
// - query: decoding rows into a ResultSet
// - decode: text forms for NUMERIC/UUID/INTERVAL/enums, raw bytes otherwise
// - session: Session/ConnectionSource over deadpool objects
// - reaper: idle connection timeout

pub mod config;
pub mod decode;
pub mod params;
pub mod query;
pub mod reaper;
pub mod session;

pub use params::Params;
pub use query::{build_result_set, postgres_extract_value};
pub use reaper::spawn_idle_reaper;
pub use session::PgSession;
