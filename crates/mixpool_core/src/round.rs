//! One mixing round: phase flags, registries and the assembled join.
//!
//! The scheduler owns a `Round` for the lifetime of one cycle through the
//! phases and replaces it wholesale when the next round starts. Request
//! handlers hold a clone of the `Arc<Round>` and go through the
//! registration methods below; those methods are safe under concurrent
//! callers and never suspend. The scheduler is the only writer of the
//! phase and accepting flags.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use bitcoin::{Amount, ScriptBuf, Transaction, Witness};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::coinjoin;
use crate::entry::{ClaimedInput, InputEntry, InputEntryState, OutputEntry};
use crate::error::{MixpoolError, Result};
use crate::phase::Phase;

/// Parameters fixed at round creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundParams {
    pub denomination: Amount,
    pub fee_per_input: Amount,
    pub fee_per_output: Amount,
    pub anonymity_target: usize,
}

pub struct Round {
    id: u64,
    /// True iff this round was entered because the previous one failed.
    fallback: bool,
    params: RoundParams,
    phase: AtomicU8,
    accepting: AtomicBool,
    input_entries: Mutex<Vec<InputEntry>>,
    output_entries: Mutex<Vec<OutputEntry>>,
    coinjoin: Mutex<Option<Transaction>>,
}

impl Round {
    /// Fresh round in `InputRegistration`, not yet accepting.
    pub fn new(id: u64, fallback: bool, params: RoundParams) -> Self {
        Self {
            id,
            fallback,
            params,
            phase: AtomicU8::new(Phase::InputRegistration.to_u8()),
            accepting: AtomicBool::new(false),
            input_entries: Mutex::new(Vec::new()),
            output_entries: Mutex::new(Vec::new()),
            coinjoin: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn params(&self) -> &RoundParams {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Scheduler-only: swap the phase tag.
    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.to_u8(), Ordering::Release);
    }

    /// Scheduler-only: open or close registration for the current phase.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    fn require_phase(&self, expected: Phase) -> Result<()> {
        let actual = self.phase();
        if actual != expected {
            return Err(MixpoolError::WrongPhase { expected, actual });
        }
        Ok(())
    }

    fn require_accepting(&self, expected: Phase) -> Result<()> {
        self.require_phase(expected)?;
        if !self.is_accepting() {
            return Err(MixpoolError::WrongPhase {
                expected,
                actual: self.phase(),
            });
        }
        Ok(())
    }

    /// Register an input-provider. Only admitted while `InputRegistration`
    /// is accepting. Verifies the amount arithmetic leaves a non-negative
    /// change; UTXO existence is the caller's responsibility.
    pub fn register_input(
        &self,
        inputs: Vec<ClaimedInput>,
        change_script: ScriptBuf,
    ) -> Result<Uuid> {
        self.require_accepting(Phase::InputRegistration)?;
        if inputs.is_empty() {
            return Err(MixpoolError::Validation("no inputs claimed".into()));
        }

        let mut total = Amount::ZERO;
        for claimed in &inputs {
            total = total
                .checked_add(claimed.amount)
                .ok_or_else(|| MixpoolError::Validation("input amounts overflow".into()))?;
        }
        let input_fees = self
            .params
            .fee_per_input
            .checked_mul(inputs.len() as u64)
            .ok_or_else(|| MixpoolError::Validation("input fees overflow".into()))?;
        let change_amount = total
            .checked_sub(self.params.denomination)
            .and_then(|rest| rest.checked_sub(input_fees))
            .and_then(|rest| rest.checked_sub(self.params.fee_per_output))
            .ok_or_else(|| {
                MixpoolError::Validation(format!(
                    "claimed inputs ({total}) do not cover denomination plus fees"
                ))
            })?;

        let mut entries = self.input_entries.lock();
        for claimed in &inputs {
            let duplicate = inputs
                .iter()
                .filter(|other| other.outpoint == claimed.outpoint)
                .count()
                > 1
                || entries.iter().any(|e| e.claims_outpoint(&claimed.outpoint));
            if duplicate {
                return Err(MixpoolError::Validation(format!(
                    "input {} already registered in this round",
                    claimed.outpoint
                )));
            }
        }
        let entry = InputEntry::new(inputs, change_script, change_amount);
        let id = entry.id();
        entries.push(entry);
        Ok(id)
    }

    /// Mark an input-provider as connected. Only during
    /// `ConnectionConfirmation`.
    pub fn confirm_connection(&self, id: Uuid) -> Result<()> {
        self.require_phase(Phase::ConnectionConfirmation)?;
        let mut entries = self.input_entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or(MixpoolError::UnknownId(id))?;
        entry.confirm();
        Ok(())
    }

    /// Register an output-claimer. Only admitted while
    /// `OutputRegistration` is accepting, and only while claimers do not
    /// outnumber providers. A script already registered this round is
    /// silently absorbed: claimers are anonymous, so there is nobody to
    /// report the collision to.
    pub fn register_output(&self, script: ScriptBuf) -> Result<()> {
        self.require_accepting(Phase::OutputRegistration)?;
        let providers = self.input_entries.lock().len();
        let mut entries = self.output_entries.lock();
        if entries.iter().any(|e| *e.script() == script) {
            return Ok(());
        }
        if entries.len() >= providers {
            return Err(MixpoolError::Validation(
                "denomination outputs exhausted for this round".into(),
            ));
        }
        entries.push(OutputEntry::new(script));
        Ok(())
    }

    /// Accept one witness for the coin-join input at `input_index`. Only
    /// during `Signing`. The input at that position must spend one of the
    /// entry's claimed UTXOs; script-level signature validity is left to
    /// the Bitcoin library downstream.
    pub fn submit_signature(&self, id: Uuid, input_index: usize, witness: Witness) -> Result<()> {
        self.require_phase(Phase::Signing)?;
        if witness.is_empty() {
            return Err(MixpoolError::Validation("empty witness".into()));
        }

        let mut entries = self.input_entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or(MixpoolError::UnknownId(id))?;

        let mut coinjoin = self.coinjoin.lock();
        let tx = coinjoin
            .as_mut()
            .ok_or_else(|| MixpoolError::Validation("coin-join not assembled yet".into()))?;
        let outpoint = tx
            .input
            .get(input_index)
            .map(|input| input.previous_output)
            .ok_or_else(|| {
                MixpoolError::Validation(format!("no coin-join input at index {input_index}"))
            })?;
        if !entry.claims_outpoint(&outpoint) {
            return Err(MixpoolError::Validation(format!(
                "input {input_index} does not belong to registration {id}"
            )));
        }

        tx.input[input_index].witness = witness.clone();
        entry.record_signature(input_index, witness);
        Ok(())
    }

    /// Look up an input-provider by its registration id.
    pub fn find_input_entry(&self, id: Uuid) -> Result<InputEntry> {
        self.input_entries
            .lock()
            .iter()
            .find(|e| e.id() == id)
            .cloned()
            .ok_or(MixpoolError::UnknownId(id))
    }

    /// Snapshot of the input-provider registry, in registration order.
    pub fn input_entries(&self) -> Vec<InputEntry> {
        self.input_entries.lock().clone()
    }

    /// Snapshot of the output-claimer registry, in registration order.
    pub fn output_entries(&self) -> Vec<OutputEntry> {
        self.output_entries.lock().clone()
    }

    pub fn input_entry_count(&self) -> usize {
        self.input_entries.lock().len()
    }

    pub fn output_entry_count(&self) -> usize {
        self.output_entries.lock().len()
    }

    /// Providers that never confirmed their connection.
    pub fn unconfirmed_count(&self) -> usize {
        self.input_entries
            .lock()
            .iter()
            .filter(|e| e.state() == InputEntryState::Registered)
            .count()
    }

    pub fn all_connections_confirmed(&self) -> bool {
        self.unconfirmed_count() == 0
    }

    /// Scheduler-only: install the assembled join before `Signing` opens.
    pub fn set_coinjoin(&self, tx: Transaction) {
        *self.coinjoin.lock() = Some(tx);
    }

    /// Clone of the current join, if one is assembled.
    pub fn coinjoin(&self) -> Option<Transaction> {
        self.coinjoin.lock().clone()
    }

    /// Scheduler-only: remove and return the join at round end.
    pub fn take_coinjoin(&self) -> Option<Transaction> {
        self.coinjoin.lock().take()
    }

    /// Whether the assembled join carries a witness on every input.
    pub fn fully_signed(&self) -> bool {
        self.coinjoin
            .lock()
            .as_ref()
            .is_some_and(coinjoin::fully_signed)
    }
}
