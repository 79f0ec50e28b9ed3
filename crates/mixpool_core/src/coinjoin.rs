//! Joint transaction assembly.
//!
//! Builds the single coin-join transaction from a round's registries:
//! one denomination output per output-claimer, then per input-provider
//! (in registration order) all of its inputs and one change output.
//! Inputs and outputs are then shuffled independently so positions leak
//! nothing about which change belongs to which inputs.

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::entry::{InputEntry, OutputEntry};

/// Assemble and shuffle the coin-join transaction.
///
/// Shuffling is a Fisher–Yates permutation drawn from the operating
/// system's entropy source.
pub fn build_coin_join(
    denomination: Amount,
    input_entries: &[InputEntry],
    output_entries: &[OutputEntry],
) -> Transaction {
    build_coin_join_with(denomination, input_entries, output_entries, &mut OsRng)
}

/// [`build_coin_join`] with a caller-supplied RNG. Tests seed this to
/// check that shuffling is a pure permutation.
pub fn build_coin_join_with<R: Rng>(
    denomination: Amount,
    input_entries: &[InputEntry],
    output_entries: &[OutputEntry],
    rng: &mut R,
) -> Transaction {
    let mut outputs: Vec<TxOut> = output_entries
        .iter()
        .map(|entry| TxOut {
            value: denomination,
            script_pubkey: entry.script().clone(),
        })
        .collect();

    let mut inputs = Vec::new();
    for entry in input_entries {
        for claimed in entry.inputs() {
            inputs.push(TxIn {
                previous_output: claimed.outpoint,
                script_sig: ScriptBuf::new(),
                // Final sequence: the join must not be replaceable once
                // signatures start attaching to it.
                sequence: Sequence::MAX,
                witness: Witness::new(),
            });
        }
        outputs.push(TxOut {
            value: entry.change_amount(),
            script_pubkey: entry.change_script().clone(),
        });
    }

    inputs.shuffle(rng);
    outputs.shuffle(rng);

    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    }
}

/// Whether every input of the transaction carries a witness.
pub fn fully_signed(tx: &Transaction) -> bool {
    !tx.input.is_empty() && tx.input.iter().all(|input| !input.witness.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ClaimedInput;
    use bitcoin::hashes::Hash;
    use bitcoin::{OutPoint, Txid};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn claimed(index: u8) -> ClaimedInput {
        ClaimedInput {
            outpoint: OutPoint {
                txid: Txid::from_byte_array([index; 32]),
                vout: u32::from(index),
            },
            amount: Amount::from_sat(2_000_000),
        }
    }

    fn script(tag: u8) -> ScriptBuf {
        ScriptBuf::from_bytes(vec![tag; 22])
    }

    fn input_entry(tags: &[u8], change_sats: u64) -> InputEntry {
        InputEntry::new(
            tags.iter().map(|&t| claimed(t)).collect(),
            script(0xc0 | tags[0]),
            Amount::from_sat(change_sats),
        )
    }

    #[test]
    fn counts_match_registrations() {
        let alices = vec![input_entry(&[1, 2], 5_000), input_entry(&[3], 7_000)];
        let bobs = vec![OutputEntry::new(script(0xa1)), OutputEntry::new(script(0xa2))];

        let tx = build_coin_join(Amount::from_sat(1_000_000), &alices, &bobs);

        assert_eq!(tx.input.len(), 3);
        // one denomination output per claimer + one change per provider
        assert_eq!(tx.output.len(), 4);
    }

    #[test]
    fn denomination_outputs_pay_the_denomination() {
        let alices = vec![input_entry(&[1], 5_000)];
        let bobs = vec![OutputEntry::new(script(0xa1)), OutputEntry::new(script(0xa2))];
        let denomination = Amount::from_sat(1_000_000);

        let tx = build_coin_join(denomination, &alices, &bobs);
        let denominated = tx
            .output
            .iter()
            .filter(|out| out.value == denomination)
            .count();
        assert_eq!(denominated, 2);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let alices = vec![
            input_entry(&[1, 2], 5_000),
            input_entry(&[3, 4], 6_000),
            input_entry(&[5], 7_000),
        ];
        let bobs: Vec<OutputEntry> = (0xa0..0xa4).map(|t| OutputEntry::new(script(t))).collect();
        let denomination = Amount::from_sat(1_000_000);

        let mut seeded = StdRng::seed_from_u64(7);
        let shuffled = build_coin_join_with(denomination, &alices, &bobs, &mut seeded);

        // Rebuild without shuffling by sorting both sides into multisets.
        let mut got_inputs: Vec<OutPoint> =
            shuffled.input.iter().map(|i| i.previous_output).collect();
        let mut want_inputs: Vec<OutPoint> = alices
            .iter()
            .flat_map(|a| a.inputs().iter().map(|c| c.outpoint))
            .collect();
        got_inputs.sort();
        want_inputs.sort();
        assert_eq!(got_inputs, want_inputs);

        let mut got_outputs: Vec<(Amount, ScriptBuf)> = shuffled
            .output
            .iter()
            .map(|o| (o.value, o.script_pubkey.clone()))
            .collect();
        let mut want_outputs: Vec<(Amount, ScriptBuf)> = bobs
            .iter()
            .map(|b| (denomination, b.script().clone()))
            .chain(
                alices
                    .iter()
                    .map(|a| (a.change_amount(), a.change_script().clone())),
            )
            .collect();
        got_outputs.sort();
        want_outputs.sort();
        assert_eq!(got_outputs, want_outputs);
    }

    #[test]
    fn zero_claimers_yields_change_only_join() {
        let alices = vec![input_entry(&[1], 5_000), input_entry(&[2], 6_000)];
        let tx = build_coin_join(Amount::from_sat(1_000_000), &alices, &[]);
        assert_eq!(tx.input.len(), 2);
        assert_eq!(tx.output.len(), 2);
    }

    #[test]
    fn fully_signed_requires_every_witness() {
        let alices = vec![input_entry(&[1, 2], 5_000)];
        let mut tx = build_coin_join(Amount::from_sat(1_000_000), &alices, &[]);
        assert!(!fully_signed(&tx));

        tx.input[0].witness = Witness::from_slice(&[[0xaa; 72]]);
        assert!(!fully_signed(&tx));

        tx.input[1].witness = Witness::from_slice(&[[0xbb; 72]]);
        assert!(fully_signed(&tx));
    }

    #[test]
    fn empty_transaction_is_not_fully_signed() {
        let tx = build_coin_join(Amount::from_sat(1_000_000), &[], &[]);
        assert!(!fully_signed(&tx));
    }
}
