//! Core state for a Chaumian CoinJoin coordinator.
//!
//! A coordinator runs an endless sequence of rounds. During each round two
//! anonymous populations register the parts of one joint transaction:
//! input-providers contribute UTXOs and receive a change output, while
//! output-claimers each receive one denomination-sized output. This crate
//! holds the round state machine data: the phase tag, the concurrent
//! registries both populations write into, the per-round parameters
//! (denomination, fees, anonymity target) and the coin-join assembler.
//!
//! The async driver that advances phases lives in `mixpool_coordinator`;
//! this crate never suspends and has no runtime dependency.

pub mod coinjoin;
pub mod config;
pub mod entry;
pub mod error;
pub mod params;
pub mod phase;
pub mod round;

pub use config::{CoordinatorConfig, DenominationAlgorithm};
pub use error::{MixpoolError, Result};
pub use phase::Phase;
pub use round::{Round, RoundParams};
