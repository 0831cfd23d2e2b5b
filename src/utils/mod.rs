//! Utility modules

pub mod file_storage;
pub mod memory_clients;
pub mod memory_storage;
pub mod validation;

pub use file_storage::*;
pub use memory_clients::*;
pub use memory_storage::*;
pub use validation::*;
