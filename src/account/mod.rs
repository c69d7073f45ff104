//! Account management module
//!
//! PostgreSQL-based user lookups for the internal and third-party APIs.

pub mod models;
pub mod repository;

pub use models::{User, UserStatus};
pub use repository::{UserDirectory, UserRepository};

#[cfg(test)]
pub use repository::mock::MockUserDirectory;
