//! Glazyr database layer.
//!
//! SQLite connection management and schema migrations for the capture
//! history.
//!
//! ```no_run
//! use glazyr::database::Database;
//!
//! let db = Database::open("glazyr.db").expect("failed to open database");
//! let conn = db.connection();
//! ```

pub mod connection;
pub mod migrations;

pub use connection::Database;
