#![no_main]
use libfuzzer_sys::fuzz_target;

use bitcoin::hashes::Hash;
use bitcoin::{Amount, OutPoint, ScriptBuf, Txid};
use mixpool_core::coinjoin::build_coin_join_with;
use mixpool_core::entry::ClaimedInput;
use mixpool_core::round::{Round, RoundParams};
use rand::rngs::StdRng;
use rand::SeedableRng;

fuzz_target!(|data: &[u8]| {
    // Need a seed plus at least one provider record
    if data.len() < 10 {
        return;
    }

    let seed = u64::from_le_bytes(data[..8].try_into().unwrap());
    let denomination = Amount::from_sat(1_000_000);
    let round = Round::new(
        1,
        false,
        RoundParams {
            denomination,
            fee_per_input: Amount::from_sat(136),
            fee_per_output: Amount::from_sat(66),
            anonymity_target: 2,
        },
    );
    round.set_accepting(true);

    // One provider per byte pair: low nibbles choose input count and
    // claimer participation
    let mut tag = 0u8;
    let mut expected_inputs = 0usize;
    let mut providers = 0usize;
    for chunk in data[8..].chunks(2).take(16) {
        let input_count = (chunk[0] % 3) as usize + 1;
        let claims: Vec<ClaimedInput> = (0..input_count)
            .map(|_| {
                tag = tag.wrapping_add(1);
                ClaimedInput {
                    outpoint: OutPoint {
                        txid: Txid::from_byte_array([tag; 32]),
                        vout: 0,
                    },
                    amount: Amount::from_sat(2_000_000),
                }
            })
            .collect();
        let change = ScriptBuf::from_bytes(vec![0xc0, tag]);
        if round.register_input(claims, change).is_ok() {
            expected_inputs += input_count;
            providers += 1;
        }
    }

    if providers == 0 {
        return;
    }

    use mixpool_core::Phase;
    round.set_phase(Phase::OutputRegistration);
    let claimer_target = (data[9] as usize) % (providers + 1);
    for i in 0..claimer_target {
        round
            .register_output(ScriptBuf::from_bytes(vec![0xa0, i as u8]))
            .expect("claimers never outnumber providers here");
    }

    let alices = round.input_entries();
    let bobs = round.output_entries();
    let mut rng = StdRng::seed_from_u64(seed);
    let tx = build_coin_join_with(denomination, &alices, &bobs, &mut rng);

    // Count invariants
    assert_eq!(tx.input.len(), expected_inputs);
    assert_eq!(tx.output.len(), bobs.len() + alices.len());

    // Shuffle is a permutation of the registered sets
    let mut got: Vec<OutPoint> = tx.input.iter().map(|i| i.previous_output).collect();
    let mut want: Vec<OutPoint> = alices
        .iter()
        .flat_map(|a| a.inputs().iter().map(|c| c.outpoint))
        .collect();
    got.sort();
    want.sort();
    assert_eq!(got, want);

    // Determinism: same seed, same permutation
    let mut rng2 = StdRng::seed_from_u64(seed);
    let tx2 = build_coin_join_with(denomination, &alices, &bobs, &mut rng2);
    assert_eq!(tx, tx2);
});
