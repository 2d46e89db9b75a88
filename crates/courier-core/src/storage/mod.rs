//! Store implementations.
//!
//! `PgStore` is the production PostgreSQL backend. `MemoryStore` implements
//! the same contract over in-process maps and backs the unit and pipeline
//! tests across the workspace.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;
