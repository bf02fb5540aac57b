//! Database initialization, migrations and settings access

pub mod init;
pub mod migrations;

pub use init::*;
pub use migrations::*;
