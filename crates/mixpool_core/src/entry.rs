use std::collections::BTreeMap;

use bitcoin::{Amount, OutPoint, ScriptBuf, Witness};
use uuid::Uuid;

/// A UTXO an input-provider claims to control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimedInput {
    pub outpoint: OutPoint,
    pub amount: Amount,
}

/// Progress of an input-provider through the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEntryState {
    Registered,
    ConnectionConfirmed,
    Signed,
}

/// An input-provider's registration: the UTXOs they bring into the join
/// and the change output they get back.
///
/// Entries are plain data; they never point back into round state.
#[derive(Debug, Clone)]
pub struct InputEntry {
    id: Uuid,
    inputs: Vec<ClaimedInput>,
    change_script: ScriptBuf,
    change_amount: Amount,
    state: InputEntryState,
    /// Witnesses received so far, keyed by input index in the assembled
    /// coin-join transaction.
    signatures: BTreeMap<usize, Witness>,
}

impl InputEntry {
    pub(crate) fn new(inputs: Vec<ClaimedInput>, change_script: ScriptBuf, change_amount: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            inputs,
            change_script,
            change_amount,
            state: InputEntryState::Registered,
            signatures: BTreeMap::new(),
        }
    }

    /// Coordinator-assigned opaque identifier, surfaced to the client.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn inputs(&self) -> &[ClaimedInput] {
        &self.inputs
    }

    pub fn change_script(&self) -> &ScriptBuf {
        &self.change_script
    }

    pub fn change_amount(&self) -> Amount {
        self.change_amount
    }

    pub fn state(&self) -> InputEntryState {
        self.state
    }

    pub fn signatures(&self) -> &BTreeMap<usize, Witness> {
        &self.signatures
    }

    pub fn claims_outpoint(&self, outpoint: &OutPoint) -> bool {
        self.inputs.iter().any(|claimed| claimed.outpoint == *outpoint)
    }

    pub(crate) fn confirm(&mut self) {
        if self.state == InputEntryState::Registered {
            self.state = InputEntryState::ConnectionConfirmed;
        }
    }

    /// Record one witness. Flips the entry to `Signed` once a witness has
    /// arrived for each of its claimed inputs.
    pub(crate) fn record_signature(&mut self, input_index: usize, witness: Witness) {
        self.signatures.insert(input_index, witness);
        if self.signatures.len() == self.inputs.len() {
            self.state = InputEntryState::Signed;
        }
    }
}

/// An output-claimer's registration: one opaque script that will receive
/// exactly one denomination-sized output. Carries no identity at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    script: ScriptBuf,
}

impl OutputEntry {
    pub(crate) fn new(script: ScriptBuf) -> Self {
        Self { script }
    }

    pub fn script(&self) -> &ScriptBuf {
        &self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    fn claimed(index: u8, sats: u64) -> ClaimedInput {
        ClaimedInput {
            outpoint: OutPoint {
                txid: Txid::from_byte_array([index; 32]),
                vout: 0,
            },
            amount: Amount::from_sat(sats),
        }
    }

    #[test]
    fn entry_ids_are_unique() {
        let a = InputEntry::new(vec![claimed(1, 1000)], ScriptBuf::new(), Amount::ZERO);
        let b = InputEntry::new(vec![claimed(2, 1000)], ScriptBuf::new(), Amount::ZERO);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn signing_completes_after_every_input() {
        let mut entry = InputEntry::new(
            vec![claimed(1, 1000), claimed(2, 1000)],
            ScriptBuf::new(),
            Amount::ZERO,
        );
        entry.confirm();
        assert_eq!(entry.state(), InputEntryState::ConnectionConfirmed);

        entry.record_signature(4, Witness::from_slice(&[[0xaa; 72]]));
        assert_eq!(entry.state(), InputEntryState::ConnectionConfirmed);

        entry.record_signature(1, Witness::from_slice(&[[0xbb; 72]]));
        assert_eq!(entry.state(), InputEntryState::Signed);
    }

    #[test]
    fn duplicate_index_does_not_complete_early() {
        let mut entry = InputEntry::new(
            vec![claimed(1, 1000), claimed(2, 1000)],
            ScriptBuf::new(),
            Amount::ZERO,
        );
        entry.record_signature(3, Witness::from_slice(&[[0xaa; 72]]));
        entry.record_signature(3, Witness::from_slice(&[[0xcc; 72]]));
        assert_eq!(entry.state(), InputEntryState::Registered);
        assert_eq!(entry.signatures().len(), 1);
    }
}
