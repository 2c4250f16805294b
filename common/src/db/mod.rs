// Database layer module
// SQLite connection pool plus the repositories built on top of it

pub mod pool;
pub mod repositories;

pub use pool::DbPool;
