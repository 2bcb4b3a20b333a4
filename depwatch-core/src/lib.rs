#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod abi;
pub mod classifier;
pub mod config;
pub mod entities;
pub mod events;
pub mod framework;
pub mod guard;
pub mod ledger;
pub mod payout;
pub mod processors;
pub mod registry;
pub mod sink;
pub mod utils;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;
