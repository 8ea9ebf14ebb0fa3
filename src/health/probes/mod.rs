//! Wire-level probe implementations for each backend protocol, per §6's
//! verbatim wire formats.

pub mod http;
pub mod mysql;
pub mod postgres;
pub mod redis;
pub mod tcp;

pub use http::http_probe;
pub use mysql::mysql_probe;
pub use postgres::postgres_probe;
pub use redis::redis_probe;
pub use tcp::tcp_probe;
