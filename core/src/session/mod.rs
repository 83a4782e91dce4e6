//! Session module
//!
//! A session binds an agent kind to a validated working directory.

mod memory_store;
mod model;
mod repository;

pub use memory_store::InMemorySessionStore;
pub use model::Session;
pub use repository::SessionStore;
