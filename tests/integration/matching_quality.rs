//! Matching-engine quality guarantees over recorded descriptors.

use std::collections::BTreeMap;

use proptest::prelude::*;
use reprox::replay::matching::{score, select_best, MatchRequest, MatchWeights};
use reprox::{CallDescriptor, Frame, Normalizer, Value};

fn descriptor(name: &str, index: u64, args: Vec<Value>) -> CallDescriptor {
    let mut desc = CallDescriptor::new(name, index);
    desc.args = args;
    desc
}

#[test]
fn exact_argument_tuple_scores_zero_and_dominates() {
    let weights = MatchWeights::default();
    let normalizer = Normalizer::default();
    let descs = vec![
        descriptor("foo", 0, vec![Value::Int(1), Value::Str("x".to_string())]),
        descriptor("foo", 1, vec![Value::Int(2), Value::Str("y".to_string())]),
        descriptor("foo", 2, vec![Value::Int(3), Value::Str("z".to_string())]),
    ];

    let args = vec![Value::Int(2), Value::Str("y".to_string())];
    let kwargs = BTreeMap::new();
    let request = MatchRequest {
        name: "foo",
        args: &args,
        kwargs: &kwargs,
        callstack: &[],
        call_index: 1,
    };

    let scores: Vec<u64> = descs
        .iter()
        .map(|d| score(&weights, &normalizer, &request, d))
        .collect();
    assert_eq!(scores[1], 0);
    assert!(scores[0] > 0 && scores[2] > 0);
    assert_eq!(select_best("foo", &scores).unwrap(), 1);
}

#[test]
fn ties_select_the_first_candidate() {
    let weights = MatchWeights::default();
    let normalizer = Normalizer::default();
    let descs = vec![
        descriptor("foo", 0, vec![Value::Int(7)]),
        descriptor("foo", 0, vec![Value::Int(7)]),
    ];
    let args = vec![Value::Int(7)];
    let kwargs = BTreeMap::new();
    let request = MatchRequest {
        name: "foo",
        args: &args,
        kwargs: &kwargs,
        callstack: &[],
        call_index: 0,
    };
    let scores: Vec<u64> = descs
        .iter()
        .map(|d| score(&weights, &normalizer, &request, d))
        .collect();
    assert_eq!(select_best("foo", &scores).unwrap(), 0);
}

#[test]
fn name_mismatch_outweighs_argument_differences() {
    let weights = MatchWeights::default();
    let normalizer = Normalizer::default();
    let renamed = descriptor("bar", 0, vec![Value::Int(1)]);
    let args = vec![Value::Int(1)];
    let kwargs = BTreeMap::new();
    let request = MatchRequest {
        name: "foo",
        args: &args,
        kwargs: &kwargs,
        callstack: &[],
        call_index: 0,
    };
    assert_eq!(score(&weights, &normalizer, &request, &renamed), 100);
}

#[test]
fn custom_weights_are_honored() {
    let weights = MatchWeights {
        call_index: 0,
        ..MatchWeights::default()
    };
    let normalizer = Normalizer::default();
    let desc = descriptor("foo", 9, vec![]);
    let kwargs = BTreeMap::new();
    let request = MatchRequest {
        name: "foo",
        args: &[],
        kwargs: &kwargs,
        callstack: &[],
        call_index: 0,
    };
    assert_eq!(score(&weights, &normalizer, &request, &desc), 0);
}

#[test]
fn paired_frames_score_file_function_and_line() {
    let weights = MatchWeights::default();
    let normalizer = Normalizer::default();
    let mut desc = descriptor("foo", 0, vec![]);
    desc.callstack = vec![Frame::new("tests/a.rs", 100, "test_segments")];

    let stack = vec![Frame::new("tests/b.rs", 90, "test_other")];
    let kwargs = BTreeMap::new();
    let request = MatchRequest {
        name: "foo",
        args: &[],
        kwargs: &kwargs,
        callstack: &stack,
        call_index: 0,
    };
    // 100 (file) + 100 (function) + 10 (line delta)
    assert_eq!(score(&weights, &normalizer, &request, &desc), 210);
}

proptest! {
    /// For descriptors with pairwise-distinct argument tuples, a request
    /// using exactly one recorded tuple scores that descriptor 0 and every
    /// other strictly higher.
    #[test]
    fn exact_tuple_always_dominates(
        tuples in proptest::collection::btree_set((0i64..1000, 0i64..1000), 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let tuples: Vec<(i64, i64)> = tuples.into_iter().collect();
        let target = pick.index(tuples.len());

        let descs: Vec<CallDescriptor> = tuples
            .iter()
            .enumerate()
            .map(|(i, (a, b))| {
                descriptor("f", i as u64, vec![Value::Int(*a), Value::Int(*b)])
            })
            .collect();

        let weights = MatchWeights::default();
        let normalizer = Normalizer::default();
        let (a, b) = tuples[target];
        let args = vec![Value::Int(a), Value::Int(b)];
        let kwargs = BTreeMap::new();
        let request = MatchRequest {
            name: "f",
            args: &args,
            kwargs: &kwargs,
            callstack: &[],
            call_index: target as u64,
        };

        let scores: Vec<u64> = descs
            .iter()
            .map(|d| score(&weights, &normalizer, &request, d))
            .collect();
        prop_assert_eq!(scores[target], 0);
        for (i, s) in scores.iter().enumerate() {
            if i != target {
                prop_assert!(*s > 0);
            }
        }
        prop_assert_eq!(select_best("f", &scores).unwrap(), target);
    }
}
