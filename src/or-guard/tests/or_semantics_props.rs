//! Property tests: the combinator behaves as a logical OR over guard decisions

use cretoai_or_guard::{guard_fn, GuardError, GuardLocator, GuardRegistry, GuardResult, OrGuard, OrGuardConfig};
use futures::stream;
use proptest::prelude::*;
use std::sync::Arc;

/// One generated guard: its decision, whether it fails instead, and its result shape
#[derive(Debug, Clone, Copy)]
struct GuardSpec {
    allowed: bool,
    fails: bool,
    shape: u8,
}

fn guard_spec() -> impl Strategy<Value = GuardSpec> {
    (any::<bool>(), prop::bool::weighted(0.2), 0u8..3).prop_map(|(allowed, fails, shape)| GuardSpec {
        allowed,
        fails,
        shape,
    })
}

fn result_for(spec: GuardSpec) -> GuardResult {
    let decision = if spec.fails {
        Err(anyhow::anyhow!("guard failure"))
    } else {
        Ok(spec.allowed)
    };

    match spec.shape {
        0 => GuardResult::from(decision),
        1 => GuardResult::deferred(async move {
            tokio::task::yield_now().await;
            decision
        }),
        _ => GuardResult::stream(stream::once(async move { decision })),
    }
}

fn combinator(specs: &[GuardSpec], config: OrGuardConfig) -> OrGuard<()> {
    let registry = Arc::new(GuardRegistry::<()>::new());
    let mut ids = Vec::with_capacity(specs.len());

    for (i, spec) in specs.iter().copied().enumerate() {
        let id = format!("guard-{}", i);
        registry.register(id.clone(), guard_fn(move |_: &()| result_for(spec)));
        ids.push(id);
    }

    OrGuard::build(ids, config, registry as Arc<dyn GuardLocator<()>>).unwrap()
}

proptest! {
    #[test]
    fn granted_iff_some_guard_approves(specs in prop::collection::vec(guard_spec(), 1..8)) {
        let expected = specs.iter().any(|spec| spec.allowed && !spec.fails);

        let or = combinator(&specs, OrGuardConfig::default());
        let outcome = tokio_test::block_on(or.evaluate(())).unwrap();

        prop_assert_eq!(outcome.is_granted(), expected);
    }

    #[test]
    fn strict_policy_matches_default_without_failures(
        specs in prop::collection::vec(guard_spec(), 1..8)
    ) {
        let specs: Vec<GuardSpec> = specs
            .into_iter()
            .map(|spec| GuardSpec { fails: false, ..spec })
            .collect();

        let lenient = tokio_test::block_on(combinator(&specs, OrGuardConfig::default()).evaluate(()));
        let strict = tokio_test::block_on(
            combinator(&specs, OrGuardConfig::default().stop_on_first_error(true)).evaluate(()),
        );

        prop_assert_eq!(lenient.unwrap(), strict.unwrap());
    }

    #[test]
    fn strict_policy_faults_when_every_guard_fails(
        shapes in prop::collection::vec(0u8..3, 1..8)
    ) {
        let specs: Vec<GuardSpec> = shapes
            .into_iter()
            .map(|shape| GuardSpec { allowed: true, fails: true, shape })
            .collect();

        let or = combinator(&specs, OrGuardConfig::default().stop_on_first_error(true));
        let result = tokio_test::block_on(or.evaluate(()));

        let is_guard_failure = matches!(result, Err(GuardError::GuardFailed { .. }));
        prop_assert!(is_guard_failure);
    }
}
