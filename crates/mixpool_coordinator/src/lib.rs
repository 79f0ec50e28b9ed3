//! The driver loop of the mixpool coordinator.
//!
//! One long-lived task owns the current [`mixpool_core::Round`] and walks
//! it through the four phases with per-phase timeouts, early-advance
//! signals and fallback-on-failure restarts. Request handlers get at the
//! round through [`Coordinator::current_round`] and learn about phase
//! changes through the [`broadcast::PhaseBroadcaster`].
//!
//! The two external observations a round needs (a fee rate and an
//! exchange rate) come in through the async traits in [`clients`];
//! `mixpool_rpc` provides the production implementations.

pub mod broadcast;
pub mod clients;
pub mod scheduler;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("scheduler fault: {0}")]
    SchedulerFault(String),

    #[error(transparent)]
    Core(#[from] mixpool_core::MixpoolError),
}

pub type Result<T> = std::result::Result<T, CoordError>;

pub use broadcast::{PhaseBroadcaster, PhaseEvent};
pub use clients::{ExchangeRate, FeeEstimator, RateProvider};
pub use scheduler::Coordinator;
