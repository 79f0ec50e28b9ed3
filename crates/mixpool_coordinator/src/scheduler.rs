//! The phase scheduler.
//!
//! `Coordinator::run` drives rounds forever: it creates a fresh
//! [`Round`] at the top of every `InputRegistration`, computes the
//! round's parameters from the external oracles, walks the four phases
//! with timed waits, and restarts with the fallback flag set whenever a
//! completeness check fails. A per-round fault never takes the
//! coordinator down.
//!
//! Two cancel sources compose: the caller's shutdown token, and a
//! per-phase child token that [`Coordinator::advance_phase`] fires to cut
//! the current wait short (a request handler calls it when it sees the
//! anonymity target reached, everyone confirmed, or everything signed).
//! Cancelling the shutdown token cancels the phase token with it.

use std::sync::Arc;
use std::time::Duration;

use bitcoin::Amount;
use futures_util::FutureExt;
use mixpool_core::coinjoin;
use mixpool_core::params;
use mixpool_core::round::{Round, RoundParams};
use mixpool_core::{CoordinatorConfig, DenominationAlgorithm, Phase};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::PhaseBroadcaster;
use crate::clients::{FeeEstimator, RateProvider};
use crate::{CoordError, Result};

/// How one round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundOutcome {
    /// Fully signed coin-join produced.
    Completed,
    /// A completeness check failed; the next round is a fallback.
    Failed(&'static str),
    /// The shutdown token fired mid-round.
    Shutdown,
}

/// State the scheduler carries from one round into the next.
struct CarryState {
    next_round_id: u64,
    fallback: bool,
    anonymity_target: usize,
    /// Duration of the most recent non-fallback InputRegistration.
    input_registration_duration: Duration,
    denomination: Option<Amount>,
    fees: Option<(Amount, Amount)>,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    fixed_denomination: Amount,
    fee_estimator: Arc<dyn FeeEstimator>,
    rate_provider: Arc<dyn RateProvider>,
    broadcaster: PhaseBroadcaster,
    round: RwLock<Arc<Round>>,
    phase_cancel: Mutex<CancellationToken>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        fee_estimator: Arc<dyn FeeEstimator>,
        rate_provider: Arc<dyn RateProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let fixed_denomination = Amount::from_btc(config.denomination_btc)
            .map_err(|err| CoordError::Config(format!("denomination_btc: {err}")))?;

        // Placeholder round so `current_round` is total; it never accepts
        // anything. Round ids handed to clients start at 1.
        let placeholder = Round::new(
            0,
            false,
            RoundParams {
                denomination: fixed_denomination,
                fee_per_input: params::fee_per_input(config.fallback_sat_per_byte),
                fee_per_output: params::fee_per_output(config.fallback_sat_per_byte),
                anonymity_target: config.minimum_anonymity_set,
            },
        );

        Ok(Self {
            config,
            fixed_denomination,
            fee_estimator,
            rate_provider,
            broadcaster: PhaseBroadcaster::default(),
            round: RwLock::new(Arc::new(placeholder)),
            phase_cancel: Mutex::new(CancellationToken::new()),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &PhaseBroadcaster {
        &self.broadcaster
    }

    /// Handle to the round currently being driven. Request handlers go
    /// through this for every registration operation.
    pub fn current_round(&self) -> Arc<Round> {
        self.round.read().clone()
    }

    /// Cut the current phase short. The scheduler wakes from its timed
    /// wait and performs the transition it would have performed on
    /// timeout; it stays the only writer of the phase tag.
    pub fn advance_phase(&self) {
        debug!("phase advance requested");
        self.phase_cancel.lock().cancel();
    }

    /// Drive rounds until `shutdown` fires. Per-round faults (including
    /// panics out of the round body) are logged and answered with a
    /// fallback restart; this function only returns on shutdown.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut carry = CarryState {
            next_round_id: 1,
            fallback: false,
            anonymity_target: self.config.minimum_anonymity_set,
            // Seeded one second past the average so the first round uses
            // the minimum anonymity target.
            input_registration_duration: self.config.average_input_registration_time()
                + Duration::from_secs(1),
            denomination: None,
            fees: None,
        };

        info!(
            algorithm = ?self.config.denomination_algorithm,
            min_anonymity = self.config.minimum_anonymity_set,
            max_anonymity = self.config.maximum_anonymity_set,
            "coordinator started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let round_result = std::panic::AssertUnwindSafe(self.run_round(&shutdown, &mut carry))
                .catch_unwind()
                .await;
            match round_result {
                Ok(RoundOutcome::Completed) => carry.fallback = false,
                Ok(RoundOutcome::Failed(reason)) => {
                    warn!(reason, "round failed, restarting with fallback");
                    carry.fallback = true;
                }
                Ok(RoundOutcome::Shutdown) => break,
                Err(panic) => {
                    let fault = CoordError::SchedulerFault(panic_message(panic));
                    warn!(error = %fault, "restarting with fallback");
                    carry.fallback = true;
                }
            }
        }

        info!("coordinator stopped");
    }

    async fn run_round(&self, shutdown: &CancellationToken, carry: &mut CarryState) -> RoundOutcome {
        // ---- InputRegistration ----
        let round_params = self.next_round_params(shutdown, carry).await;
        let round = Arc::new(Round::new(carry.next_round_id, carry.fallback, round_params));
        carry.next_round_id += 1;
        *self.round.write() = round.clone();
        self.reset_phase_cancel(shutdown);

        info!(
            round_id = round.id(),
            fallback = round.is_fallback(),
            denomination = %round_params.denomination,
            fee_per_input = %round_params.fee_per_input,
            fee_per_output = %round_params.fee_per_output,
            anonymity_target = round_params.anonymity_target,
            "input registration open"
        );
        round.set_accepting(true);
        self.broadcaster.publish(
            Phase::InputRegistration,
            format!("round {} open for input registration", round.id()),
        );
        let registration_started = Instant::now();
        self.wait_phase(self.config.input_registration_timeout()).await;
        if shutdown.is_cancelled() {
            return RoundOutcome::Shutdown;
        }
        if !round.is_fallback() {
            carry.input_registration_duration = registration_started.elapsed();
        }

        // ---- ConnectionConfirmation ----
        self.set_phase(&round, Phase::ConnectionConfirmation, shutdown);
        self.broadcaster
            .publish(Phase::ConnectionConfirmation, "confirm your connection");
        self.wait_phase(self.config.connection_confirmation_timeout()).await;
        if shutdown.is_cancelled() {
            return RoundOutcome::Shutdown;
        }
        if round.input_entry_count() == 0 {
            return RoundOutcome::Failed("no inputs registered");
        }
        if !round.all_connections_confirmed() {
            warn!(
                round_id = round.id(),
                unconfirmed = round.unconfirmed_count(),
                registered = round.input_entry_count(),
                "connection confirmation incomplete"
            );
            return RoundOutcome::Failed("connection confirmation incomplete");
        }

        // ---- OutputRegistration ----
        self.set_phase(&round, Phase::OutputRegistration, shutdown);
        round.set_accepting(true);
        self.broadcaster
            .publish(Phase::OutputRegistration, "register denomination outputs");
        self.wait_phase(self.config.output_registration_timeout()).await;
        if shutdown.is_cancelled() {
            return RoundOutcome::Shutdown;
        }
        // Claimers are anonymous, so non-registration cannot be pinned on
        // anyone; this phase always proceeds to Signing.

        // ---- Signing ----
        self.set_phase(&round, Phase::Signing, shutdown);
        let tx = coinjoin::build_coin_join(
            round_params.denomination,
            &round.input_entries(),
            &round.output_entries(),
        );
        info!(
            round_id = round.id(),
            inputs = tx.input.len(),
            outputs = tx.output.len(),
            "coin-join assembled"
        );
        round.set_coinjoin(tx);
        round.set_accepting(true);
        self.broadcaster.publish(Phase::Signing, "sign the coin-join");
        self.wait_phase(self.config.signing_timeout()).await;
        round.set_accepting(false);
        let signed = round.fully_signed();
        let coinjoin = round.take_coinjoin();
        if shutdown.is_cancelled() {
            return RoundOutcome::Shutdown;
        }
        match (signed, coinjoin) {
            (true, Some(tx)) => {
                info!(
                    round_id = round.id(),
                    txid = %tx.compute_txid(),
                    "round complete, coin-join ready for broadcast"
                );
                RoundOutcome::Completed
            }
            _ => RoundOutcome::Failed("signing incomplete"),
        }
    }

    /// Parameters for the round about to open, consulting the external
    /// oracles. Provider failures degrade to the previous round's values
    /// (or the configured fallbacks) rather than blocking the round.
    async fn next_round_params(
        &self,
        shutdown: &CancellationToken,
        carry: &mut CarryState,
    ) -> RoundParams {
        carry.anonymity_target = params::adjust_anonymity_target(
            carry.anonymity_target,
            carry.input_registration_duration,
            self.config.average_input_registration_time(),
            self.config.minimum_anonymity_set,
            self.config.maximum_anonymity_set,
        );

        let denomination = match self.config.denomination_algorithm {
            DenominationAlgorithm::FixedBtc => self.fixed_denomination,
            DenominationAlgorithm::FixedUsd => {
                match self.rate_provider.get_exchange_rates(shutdown.child_token()).await {
                    Ok(rates) => {
                        let usd = rates.iter().find(|rate| rate.code == "USD");
                        match usd.and_then(|usd| {
                            params::usd_denomination(self.config.denomination_usd, usd.rate)
                        }) {
                            Some(denomination) => denomination,
                            None => {
                                warn!("no usable USD rate in provider response");
                                carry.denomination.unwrap_or(self.fixed_denomination)
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "exchange-rate provider unavailable");
                        carry.denomination.unwrap_or(self.fixed_denomination)
                    }
                }
            }
        };
        carry.denomination = Some(denomination);

        let fees = match self
            .fee_estimator
            .estimate_sat_per_byte(shutdown.child_token())
            .await
        {
            Ok(rate) => (params::fee_per_input(rate), params::fee_per_output(rate)),
            Err(err) => {
                warn!(error = %err, "fee estimator unavailable");
                carry.fees.unwrap_or_else(|| {
                    let fallback = self.config.fallback_sat_per_byte;
                    (params::fee_per_input(fallback), params::fee_per_output(fallback))
                })
            }
        };
        carry.fees = Some(fees);

        RoundParams {
            denomination,
            fee_per_input: fees.0,
            fee_per_output: fees.1,
            anonymity_target: carry.anonymity_target,
        }
    }

    /// Transition the round: close admissions, swap the phase tag and
    /// fire-and-replace the phase-cancel signal, releasing any wait that
    /// still blocks on the old phase.
    fn set_phase(&self, round: &Round, phase: Phase, shutdown: &CancellationToken) {
        round.set_accepting(false);
        round.set_phase(phase);
        self.reset_phase_cancel(shutdown);
    }

    fn reset_phase_cancel(&self, shutdown: &CancellationToken) {
        let mut cancel = self.phase_cancel.lock();
        cancel.cancel();
        *cancel = shutdown.child_token();
    }

    /// Block until the phase times out or its cancel signal fires. The
    /// signal is a child of the shutdown token, so shutdown is observed
    /// here too.
    async fn wait_phase(&self, timeout: Duration) {
        let cancel = self.phase_cancel.lock().clone();
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "round body panicked".to_string()
    }
}
