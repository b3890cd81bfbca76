use phylomatic::domain::models::{Statistics, Verdict};
use phylomatic::services::convergence_policy::{discard, ConvergencePolicy, Precheck};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn policy(min_cycles: u64, max_gen: u64) -> ConvergencePolicy {
    ConvergencePolicy {
        min_cycles,
        max_gen,
        max_effsize: 300,
        min_rel_diff: 0.1,
        min_maxdiff: 0.05,
        max_discard: 1000,
    }
}

fn converging_statistics() -> impl Strategy<Value = Statistics> {
    (301u64..100_000, 0.0f64..0.1, 0.0f64..0.05).prop_map(|(effsize, rel, max)| Statistics {
        effsize,
        loglik_rel_diff: rel,
        max_diff: max,
    })
}

/// Statistics where at least one of the three signals disagrees.
fn diverging_statistics() -> impl Strategy<Value = Statistics> {
    prop_oneof![
        (0u64..=300, 0.0f64..1.0, 0.0f64..1.0),
        (0u64..100_000, 0.1f64..1.0, 0.0f64..1.0),
        (0u64..100_000, 0.0f64..1.0, 0.05f64..1.0),
    ]
    .prop_map(|(effsize, rel, max)| Statistics {
        effsize,
        loglik_rel_diff: rel,
        max_diff: max,
    })
}

proptest! {
    /// Property: burn-in is a tenth of progress, capped, and never shrinks
    #[test]
    fn prop_discard_is_bounded_and_monotonic(
        g in 0u64..10_000_000,
        step in 0u64..100_000,
        max_discard in 0u64..100_000,
    ) {
        let d = discard(g, max_discard);
        prop_assert_eq!(d, (g / 10).min(max_discard));
        prop_assert!(d <= max_discard);
        prop_assert!(discard(g + step, max_discard) >= d);
    }

    /// Property: one chain at or under the minimum keeps every chain waiting
    #[test]
    fn prop_any_slow_chain_is_below_minimum(
        min_cycles in 0u64..10_000,
        slow in 0u64..=1,
        others in prop::collection::vec(0u64..1_000_000, 0..6),
        position in 0usize..7,
    ) {
        let slow_value = min_cycles.saturating_sub(slow);
        let mut generations = others;
        let index = position.min(generations.len());
        generations.insert(index, slow_value);

        prop_assert_eq!(
            policy(min_cycles, 30_000).precheck(&generations),
            Precheck::BelowMinimumCycles
        );
    }

    /// Property: past the limit without agreement stops unconverged
    #[test]
    fn prop_limit_without_agreement_stops_unconverged(
        max_gen in 0u64..100_000,
        excess in prop::collection::vec(1u64..10_000, 1..6),
        statistics in diverging_statistics(),
    ) {
        let policy = policy(0, max_gen);
        let generations: Vec<u64> = excess.iter().map(|e| max_gen + e).collect();

        let Precheck::Evaluate { above_max_gen, .. } = policy.precheck(&generations) else {
            return Err(TestCaseError::fail("chains past the limit must be evaluated"));
        };
        prop_assert!(above_max_gen);
        prop_assert_eq!(policy.decide(above_max_gen, &statistics), Verdict::Stop { converged: false });
    }

    /// Property: agreement on all three signals always stops converged
    #[test]
    fn prop_agreement_stops_converged(
        above_max_gen in any::<bool>(),
        statistics in converging_statistics(),
    ) {
        prop_assert_eq!(
            policy(100, 30_000).decide(above_max_gen, &statistics),
            Verdict::Stop { converged: true }
        );
    }

    /// Property: under the limit without agreement the loop carries on
    #[test]
    fn prop_disagreement_under_limit_continues(statistics in diverging_statistics()) {
        prop_assert_eq!(policy(100, 30_000).decide(false, &statistics), Verdict::Continue);
    }
}
