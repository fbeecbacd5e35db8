//! SQLite database driver implementation

mod conn_string;
mod connection;
mod dialect;
mod driver;

pub use conn_string::{build_connection_string, parse_connection_string};
pub use connection::{SqliteConnection, SqliteTransaction};
pub use dialect::sqlite_dialect;
pub use driver::SqliteDriver;
