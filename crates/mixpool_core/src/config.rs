//! Read-only parameter bundle for the coordinator.
//!
//! Loading (file parsing, CLI flags) is the binary's concern; the
//! coordinator only ever sees this immutable bundle.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MixpoolError, Result};

/// How the per-round denomination is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenominationAlgorithm {
    /// Constant BTC denomination taken from [`CoordinatorConfig::denomination_btc`].
    FixedBtc,
    /// BTC denomination recomputed every round from the USD exchange rate
    /// so that it stays near [`CoordinatorConfig::denomination_usd`].
    FixedUsd,
}

/// Coordinator tuning knobs. Immutable once the coordinator starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub input_registration_phase_timeout_seconds: u64,
    pub connection_confirmation_phase_timeout_seconds: u64,
    pub output_registration_phase_timeout_seconds: u64,
    pub signing_phase_timeout_seconds: u64,

    /// Lower bound for the adaptive anonymity-set target.
    pub minimum_anonymity_set: usize,
    /// Upper bound for the adaptive anonymity-set target.
    pub maximum_anonymity_set: usize,
    /// Desired wall-clock duration of InputRegistration; the anonymity
    /// target adapts so observed durations converge to this.
    pub average_time_to_spend_in_input_registration_seconds: u64,

    pub denomination_algorithm: DenominationAlgorithm,
    /// Fixed denomination for `FixedBtc`, and the fallback value when the
    /// exchange-rate provider is unavailable and no prior round exists.
    pub denomination_btc: f64,
    /// USD target for `FixedUsd`.
    pub denomination_usd: f64,

    /// Fee rate substituted when the node's estimator has never answered.
    pub fallback_sat_per_byte: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            input_registration_phase_timeout_seconds: 86_400,
            connection_confirmation_phase_timeout_seconds: 60,
            output_registration_phase_timeout_seconds: 60,
            signing_phase_timeout_seconds: 60,
            minimum_anonymity_set: 21,
            maximum_anonymity_set: 100,
            average_time_to_spend_in_input_registration_seconds: 180,
            denomination_algorithm: DenominationAlgorithm::FixedUsd,
            denomination_btc: 0.1,
            denomination_usd: 10_000.0,
            fallback_sat_per_byte: 100,
        }
    }
}

impl CoordinatorConfig {
    /// Check internal consistency. Call once before handing the bundle
    /// to the coordinator.
    pub fn validate(&self) -> Result<()> {
        if self.minimum_anonymity_set == 0 {
            return Err(MixpoolError::Validation(
                "minimum_anonymity_set must be at least 1".into(),
            ));
        }
        if self.minimum_anonymity_set > self.maximum_anonymity_set {
            return Err(MixpoolError::Validation(format!(
                "minimum_anonymity_set ({}) exceeds maximum_anonymity_set ({})",
                self.minimum_anonymity_set, self.maximum_anonymity_set
            )));
        }
        if !(self.denomination_btc.is_finite() && self.denomination_btc > 0.0) {
            return Err(MixpoolError::Validation(format!(
                "denomination_btc must be a positive amount, got {}",
                self.denomination_btc
            )));
        }
        for (name, secs) in [
            (
                "input_registration_phase_timeout_seconds",
                self.input_registration_phase_timeout_seconds,
            ),
            (
                "connection_confirmation_phase_timeout_seconds",
                self.connection_confirmation_phase_timeout_seconds,
            ),
            (
                "output_registration_phase_timeout_seconds",
                self.output_registration_phase_timeout_seconds,
            ),
            ("signing_phase_timeout_seconds", self.signing_phase_timeout_seconds),
        ] {
            if secs == 0 {
                return Err(MixpoolError::Validation(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    pub fn input_registration_timeout(&self) -> Duration {
        Duration::from_secs(self.input_registration_phase_timeout_seconds)
    }

    pub fn connection_confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_confirmation_phase_timeout_seconds)
    }

    pub fn output_registration_timeout(&self) -> Duration {
        Duration::from_secs(self.output_registration_phase_timeout_seconds)
    }

    pub fn signing_timeout(&self) -> Duration {
        Duration::from_secs(self.signing_phase_timeout_seconds)
    }

    pub fn average_input_registration_time(&self) -> Duration {
        Duration::from_secs(self.average_time_to_spend_in_input_registration_seconds)
    }
}
