//! Database-aware routing — components H, I, J.

pub mod classify;
pub mod pool;
pub mod session;

pub use classify::{classify_query, extract_query_text, sniff, DbProtocol, QueryKind};
pub use pool::{Pool, PoolConfig};
pub use session::{SessionId, SessionRouter};
