//! Core types, the storage trait and the credit workflows of the SWHIT airdrop.
//!
//! This crate is free of HTTP and database dependencies. Backends implement
//! [`store::AirdropStore`]; the API layer drives [`service::AirdropService`].

pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod referral_code;
pub mod retry;
pub mod service;
pub mod store;
pub mod task;
pub mod user;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
