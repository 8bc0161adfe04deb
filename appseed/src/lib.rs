pub mod bridge;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod driver;
pub mod errors;
pub mod identity;
pub mod machine;
pub mod poll;
pub mod restore;
pub mod secrets;
pub mod vault;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
