//! Session storage and lifecycle management.
//!
//! The storage interface is deliberately narrow (insert/get/update/remove/
//! scan-by-user plus the expired-record sweep) so the mutex-guarded
//! in-memory map and the Redis-backed store are interchangeable. All policy
//! lives in [`SessionManager`].

mod manager;
mod store;

pub use manager::SessionManager;
pub use store::{MemorySessionStore, RedisSessionStore, SessionStore};
