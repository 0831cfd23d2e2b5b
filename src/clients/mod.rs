//! HTTP adapters for the bank and the budgeting service

pub mod n26;
pub mod ynab;

#[cfg(test)]
pub(crate) mod test_server;

pub use n26::N26Client;
pub use ynab::YnabClient;
