//! modeldb Connection - Database handles and model registration
//!
//! A `Database` is created from a connection string, connects lazily and keeps
//! track of the record shapes registered against it.

mod database;
mod registration;

pub use database::Database;
pub use registration::RegisteredModel;
