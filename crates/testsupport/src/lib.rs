//! Shared test fixtures for the database crates.

pub mod fixtures;

pub mod prelude {
    pub use crate::fixtures::{exec, rows, scratch_db};
}
