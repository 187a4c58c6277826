//! Persistence: notebook and document records in SQLite, plus the
//! per-notebook vector index stored alongside them.

pub mod consistency;
pub mod sqlite;
pub mod vector_index;

pub use sqlite::*;
