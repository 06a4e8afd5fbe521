//! Persistence for sessions.

pub mod common;
pub mod memory;
pub mod postgres;
pub mod session;
pub mod transaction;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;
pub use session::{SessionFilter, SessionLookup, SessionStore, StoreError};
