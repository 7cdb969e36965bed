//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: Σ(current power) == live units after any op sequence
//! - Historical fidelity: past queries replay exactly what the model saw
//! - Ring floor semantics match a linear-scan model, evictions included
//! - Idempotency: repeated identical delegations journal nothing new

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use votes_core::checkpoint::CheckpointRing;
use votes_core::contain::{ObserverError, Stipend};
use votes_core::{
    AccountId, AdminList, Config, DomainEvent, Error, ExternalHooks, InMemoryOwnership,
    ManualClock, UnitId, UnitObserver, VoteLedger, VotePower,
};

/// A ledger with its collaborators and backing directory
struct World {
    ledger: VoteLedger,
    ownership: Arc<InMemoryOwnership>,
    clock: Arc<ManualClock>,
    admin: Arc<AdminList>,
    _temp: TempDir,
}

fn hooks_of(
    ownership: &Arc<InMemoryOwnership>,
    admin: &Arc<AdminList>,
    clock: &Arc<ManualClock>,
    observer: Option<Arc<dyn UnitObserver>>,
) -> ExternalHooks {
    ExternalHooks {
        ownership: ownership.clone(),
        admin: admin.clone(),
        clock: clock.clone(),
        observer,
    }
}

async fn open_world(tweak: impl FnOnce(&mut Config)) -> World {
    open_world_with_observer(tweak, None).await
}

async fn open_world_with_observer(
    tweak: impl FnOnce(&mut Config),
    observer: Option<Arc<dyn UnitObserver>>,
) -> World {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp.path().to_path_buf();
    tweak(&mut config);

    let ownership = Arc::new(InMemoryOwnership::new());
    let clock = Arc::new(ManualClock::starting_at(1));
    let admin = Arc::new(AdminList::new());

    let ledger = VoteLedger::open(config, hooks_of(&ownership, &admin, &clock, observer))
        .await
        .unwrap();

    World {
        ledger,
        ownership,
        clock,
        admin,
        _temp: temp,
    }
}

fn acct(name: impl Into<String>) -> AccountId {
    AccountId::new(name)
}

async fn mint(world: &World, unit: UnitId, to: &AccountId) {
    world.ownership.set_holder(unit, to.clone());
    world
        .ledger
        .ownership_changed(unit, None, Some(to.clone()))
        .await
        .unwrap();
}

async fn transfer(world: &World, unit: UnitId, from: &AccountId, to: &AccountId) {
    world.ownership.set_holder(unit, to.clone());
    world
        .ledger
        .ownership_changed(unit, Some(from.clone()), Some(to.clone()))
        .await
        .unwrap();
}

async fn burn(world: &World, unit: UnitId, from: &AccountId) {
    world.ownership.remove(unit);
    world
        .ledger
        .ownership_changed(unit, Some(from.clone()), None)
        .await
        .unwrap();
}

// Model-checked operation sequences

const ACCOUNTS: usize = 4;
const UNITS: u64 = 8;

#[derive(Debug, Clone)]
enum Op {
    Mint { unit: u64, to: usize },
    Transfer { unit: u64, to: usize },
    Burn { unit: u64 },
    Delegate { unit: u64, to: usize },
    Clear { unit: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..UNITS, 0..ACCOUNTS).prop_map(|(unit, to)| Op::Mint { unit, to }),
        (0..UNITS, 0..ACCOUNTS).prop_map(|(unit, to)| Op::Transfer { unit, to }),
        (0..UNITS).prop_map(|unit| Op::Burn { unit }),
        (0..UNITS, 0..ACCOUNTS).prop_map(|(unit, to)| Op::Delegate { unit, to }),
        (0..UNITS).prop_map(|unit| Op::Clear { unit }),
    ]
}

fn model_acct(i: usize) -> AccountId {
    acct(format!("acct{i}"))
}

/// Powers per account index implied by the model's holders and overrides
fn model_powers(
    holders: &HashMap<u64, usize>,
    overrides: &HashMap<u64, usize>,
) -> HashMap<usize, u64> {
    let mut powers = HashMap::new();
    for (unit, holder) in holders {
        let delegate = overrides.get(unit).copied().unwrap_or(*holder);
        *powers.entry(delegate).or_insert(0) += 1;
    }
    powers
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: conservation holds and every past snapshot replays exactly
    #[test]
    fn prop_conservation_and_replay(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let world = open_world(|_| {}).await;

            let mut holders: HashMap<u64, usize> = HashMap::new();
            let mut overrides: HashMap<u64, usize> = HashMap::new();
            let mut snapshots: Vec<(u64, HashMap<usize, u64>)> = Vec::new();

            for op in &ops {
                world.clock.advance(1);
                match *op {
                    Op::Mint { unit, to } => {
                        if !holders.contains_key(&unit) {
                            mint(&world, UnitId::new(unit), &model_acct(to)).await;
                            holders.insert(unit, to);
                        }
                    }
                    Op::Transfer { unit, to } => {
                        // A self-transfer is inert and keeps its override
                        if let Some(&from) = holders.get(&unit) {
                            if from != to {
                                transfer(
                                    &world,
                                    UnitId::new(unit),
                                    &model_acct(from),
                                    &model_acct(to),
                                )
                                .await;
                                holders.insert(unit, to);
                                overrides.remove(&unit);
                            }
                        }
                    }
                    Op::Burn { unit } => {
                        if let Some(from) = holders.remove(&unit) {
                            burn(&world, UnitId::new(unit), &model_acct(from)).await;
                            overrides.remove(&unit);
                        }
                    }
                    Op::Delegate { unit, to } => {
                        if let Some(&holder) = holders.get(&unit) {
                            world
                                .ledger
                                .set_delegate(model_acct(holder), UnitId::new(unit), model_acct(to))
                                .await
                                .unwrap();
                            if to == holder {
                                overrides.remove(&unit);
                            } else {
                                overrides.insert(unit, to);
                            }
                        }
                    }
                    Op::Clear { unit } => {
                        if let Some(&holder) = holders.get(&unit) {
                            world
                                .ledger
                                .clear_delegate(model_acct(holder), UnitId::new(unit))
                                .await
                                .unwrap();
                            overrides.remove(&unit);
                        }
                    }
                }
                let seq = world.clock.current_sequence_point();
                snapshots.push((seq, model_powers(&holders, &overrides)));
            }

            // Conservation at the quiescent point
            prop_assert!(world.ledger.check_conservation().await.unwrap());

            // Current powers match the model
            let expected = model_powers(&holders, &overrides);
            for i in 0..ACCOUNTS {
                let power = world.ledger.current_power(model_acct(i)).await.unwrap();
                let want = expected.get(&i).copied().unwrap_or(0);
                prop_assert_eq!(power, VotePower::from(want));
            }

            // Every past snapshot replays exactly (default capacity is far
            // larger than the op count, so nothing was evicted)
            world.clock.advance(1);
            for (seq, powers) in &snapshots {
                for i in 0..ACCOUNTS {
                    let power = world
                        .ledger
                        .historical_power(model_acct(i), *seq)
                        .await
                        .unwrap();
                    let want = powers.get(&i).copied().unwrap_or(0);
                    prop_assert_eq!(power, VotePower::from(want));
                }
            }

            world.ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: ring floor queries match a linear-scan model, and queries
    /// below the retained window are refused exactly when eviction happened
    #[test]
    fn prop_ring_matches_linear_scan(
        capacity in 1u32..16,
        steps in prop::collection::vec((0u64..3, 0u128..1_000), 1..60),
    ) {
        let mut ring = CheckpointRing::new(capacity);
        let mut history: Vec<(u64, u128)> = Vec::new();
        let mut seq = 0u64;

        for (delta, value) in steps {
            seq += delta;
            ring.record(seq, VotePower::new(value)).unwrap();
            match history.last_mut() {
                Some(last) if last.0 == seq => last.1 = value,
                _ => history.push((seq, value)),
            }
        }

        let retained_from = history.len().saturating_sub(capacity as usize);
        let retained = &history[retained_from..];
        let evicted = retained_from > 0;

        prop_assert_eq!(ring.len() as usize, retained.len());
        prop_assert_eq!(
            ring.current_power(),
            VotePower::new(history.last().unwrap().1)
        );

        for query in 0..=seq + 1 {
            let expected = history
                .iter()
                .rev()
                .find(|(s, _)| *s <= query)
                .map(|(_, v)| *v);
            match ring.power_at(query) {
                Ok(power) => match expected {
                    Some(value) if query >= retained[0].0 => {
                        prop_assert_eq!(power, VotePower::new(value));
                    }
                    _ => {
                        // Below all history with no eviction: zero
                        prop_assert!(!evicted);
                        prop_assert_eq!(power, VotePower::ZERO);
                    }
                },
                Err(Error::HistoryPruned { .. }) => {
                    prop_assert!(evicted);
                    prop_assert!(query < retained[0].0);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_boundary_walkthrough() {
        let world = open_world(|_| {}).await;
        let (a, b, c) = (acct("A"), acct("B"), acct("C"));
        let unit = UnitId::new(0);

        world.clock.advance(1);
        mint(&world, unit, &a).await;
        assert_eq!(
            world.ledger.current_power(a.clone()).await.unwrap(),
            VotePower::ONE
        );
        assert_eq!(
            world.ledger.effective_delegate(unit).await.unwrap(),
            a.clone()
        );

        world.clock.advance(1);
        world
            .ledger
            .set_delegate(a.clone(), unit, b.clone())
            .await
            .unwrap();
        assert_eq!(
            world.ledger.current_power(a.clone()).await.unwrap(),
            VotePower::ZERO
        );
        assert_eq!(
            world.ledger.current_power(b.clone()).await.unwrap(),
            VotePower::ONE
        );

        // Transfer A -> C debits the override, not the prior holder
        world.clock.advance(1);
        transfer(&world, unit, &a, &c).await;
        assert_eq!(
            world.ledger.current_power(b.clone()).await.unwrap(),
            VotePower::ZERO
        );
        assert_eq!(
            world.ledger.current_power(c.clone()).await.unwrap(),
            VotePower::ONE
        );
        assert_eq!(world.ledger.effective_delegate(unit).await.unwrap(), c);

        // Clearing with no override is a complete no-op
        world.clock.advance(1);
        let events = world.ledger.clear_delegate(c.clone(), unit).await.unwrap();
        assert!(events.is_empty());

        assert!(world.ledger.check_conservation().await.unwrap());
        world.ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ring_window_and_pruned_refusal() {
        let world = open_world(|c| c.ring_capacity = 8).await;
        let (alice, bob) = (acct("alice"), acct("bob"));
        let unit = UnitId::new(0);

        world.clock.advance(1);
        mint(&world, unit, &alice).await;

        // 20 delegate/clear cycles force well past 8 checkpoints per account
        for _ in 0..20 {
            world.clock.advance(1);
            world
                .ledger
                .set_delegate(alice.clone(), unit, bob.clone())
                .await
                .unwrap();
            world.clock.advance(1);
            world
                .ledger
                .clear_delegate(alice.clone(), unit)
                .await
                .unwrap();
        }

        // Latest value is still exact
        assert_eq!(
            world.ledger.current_power(alice.clone()).await.unwrap(),
            VotePower::ONE
        );

        let now = world.clock.current_sequence_point();

        // Within the retained window the history is exact: the last cycle
        // left alice at 0 on the delegate step and 1 on the clear step.
        assert_eq!(
            world
                .ledger
                .historical_power(alice.clone(), now - 1)
                .await
                .unwrap(),
            VotePower::ZERO
        );

        // A point evicted from the ring is refused, not zeroed
        let err = world
            .ledger
            .historical_power(alice.clone(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HistoryPruned { .. }));

        // The present and future are refused outright
        let err = world
            .ledger
            .historical_power(alice.clone(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FutureQuery { .. }));

        // An account that never overflowed still answers pre-history with 0
        assert_eq!(
            world
                .ledger
                .historical_power(acct("stranger"), 1)
                .await
                .unwrap(),
            VotePower::ZERO
        );

        world.ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_idempotent_delegation_journals_nothing() {
        let world = open_world(|_| {}).await;
        let (alice, bob) = (acct("alice"), acct("bob"));
        let unit = UnitId::new(0);

        world.clock.advance(1);
        mint(&world, unit, &alice).await;

        world.clock.advance(1);
        let first = world
            .ledger
            .set_delegate(alice.clone(), unit, bob.clone())
            .await
            .unwrap();
        assert!(!first.is_empty());

        let journal_len = world.ledger.events_since(0).unwrap().len();

        world.clock.advance(1);
        let second = world
            .ledger
            .set_delegate(alice.clone(), unit, bob.clone())
            .await
            .unwrap();
        assert!(second.is_empty());
        assert_eq!(world.ledger.events_since(0).unwrap().len(), journal_len);

        world.ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_shares_one_sequence_point() {
        let world = open_world(|_| {}).await;
        let (alice, bob) = (acct("alice"), acct("bob"));
        let units: Vec<UnitId> = (0..10).map(UnitId::new).collect();

        for unit in &units {
            world.clock.advance(1);
            mint(&world, *unit, &alice).await;
        }

        world.clock.advance(1);
        let events = world
            .ledger
            .set_delegate_batch(alice.clone(), units.clone(), bob.clone())
            .await
            .unwrap();

        // Ten moves were journaled, all at the same sequence point
        let moves: Vec<u64> = events
            .iter()
            .filter_map(|record| match &record.event {
                DomainEvent::PowerMoved { sequence_point, .. } => Some(*sequence_point),
                _ => None,
            })
            .collect();
        assert_eq!(moves.len(), 10);
        assert!(moves.windows(2).all(|w| w[0] == w[1]));

        // Intra-call intermediates were compressed away: one checkpoint per
        // account for the whole batch
        assert_eq!(
            world.ledger.metrics().checkpoints_compressed_total.get(),
            18
        );

        assert_eq!(
            world.ledger.current_power(bob.clone()).await.unwrap(),
            VotePower::from(10u64)
        );
        assert!(world.ledger.check_conservation().await.unwrap());
        world.ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_self_transfer_is_complete_noop() {
        let world = open_world(|_| {}).await;
        let (alice, bob) = (acct("alice"), acct("bob"));
        let unit = UnitId::new(0);

        world.clock.advance(1);
        mint(&world, unit, &alice).await;
        world.clock.advance(1);
        world
            .ledger
            .set_delegate(alice.clone(), unit, bob.clone())
            .await
            .unwrap();

        let journal_len = world.ledger.events_since(0).unwrap().len();

        world.clock.advance(1);
        let events = world
            .ledger
            .ownership_changed(unit, Some(alice.clone()), Some(alice.clone()))
            .await
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(world.ledger.events_since(0).unwrap().len(), journal_len);
        // The override survived
        assert_eq!(world.ledger.effective_delegate(unit).await.unwrap(), bob);

        world.ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_null_delegate_rejected() {
        let world = open_world(|_| {}).await;
        let alice = acct("alice");
        let unit = UnitId::new(0);

        world.clock.advance(1);
        mint(&world, unit, &alice).await;

        let err = world
            .ledger
            .set_delegate(alice.clone(), unit, acct(""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDelegate));
        world.ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_limit_reconfiguration() {
        let world = open_world(|_| {}).await;
        let (root, alice, bob) = (acct("root"), acct("alice"), acct("bob"));
        world.admin.grant(root.clone());

        for i in 0..5 {
            world.clock.advance(1);
            mint(&world, UnitId::new(i), &alice).await;
        }

        // Non-admin cannot reconfigure
        let err = world
            .ledger
            .set_batch_limit(alice.clone(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));

        world.ledger.set_batch_limit(root.clone(), 3).await.unwrap();
        assert_eq!(world.ledger.batch_limit().await.unwrap(), 3);

        let units: Vec<UnitId> = (0..5).map(UnitId::new).collect();
        world.clock.advance(1);
        let err = world
            .ledger
            .set_delegate_batch(alice.clone(), units, bob.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BatchTooLarge { len: 5, limit: 3 }));

        world.ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_recovery_after_restart() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp.path().to_path_buf();

        let ownership = Arc::new(InMemoryOwnership::new());
        let clock = Arc::new(ManualClock::starting_at(1));
        let admin = Arc::new(AdminList::new());
        admin.grant(acct("root"));

        let (alice, bob) = (acct("alice"), acct("bob"));
        let unit = UnitId::new(0);

        let journal_len;
        {
            let ledger = VoteLedger::open(
                config.clone(),
                hooks_of(&ownership, &admin, &clock, None),
            )
            .await
            .unwrap();

            ownership.set_holder(unit, alice.clone());
            clock.advance(1);
            ledger
                .ownership_changed(unit, None, Some(alice.clone()))
                .await
                .unwrap();
            clock.advance(1);
            ledger
                .set_delegate(alice.clone(), unit, bob.clone())
                .await
                .unwrap();

            journal_len = ledger.events_since(0).unwrap().len();
            ledger.shutdown().await.unwrap();
        }

        let ledger = VoteLedger::open(config, hooks_of(&ownership, &admin, &clock, None))
            .await
            .unwrap();

        // Powers, overrides, journal, and conservation all survived
        assert_eq!(
            ledger.current_power(bob.clone()).await.unwrap(),
            VotePower::ONE
        );
        assert_eq!(ledger.effective_delegate(unit).await.unwrap(), bob);
        assert_eq!(ledger.events_since(0).unwrap().len(), journal_len);
        assert!(ledger.check_conservation().await.unwrap());

        // Historical queries survive the restart too: alice still held the
        // vote herself at the mint sequence point
        let now = clock.current_sequence_point();
        assert_eq!(
            ledger
                .historical_power(alice.clone(), now - 1)
                .await
                .unwrap(),
            VotePower::ONE
        );

        // The capacity lock is persistent: a unit was minted before restart
        let err = ledger
            .set_ring_capacity(acct("root"), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CapacityLocked));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ring_capacity_admin_flow() {
        let world = open_world(|_| {}).await;
        let root = acct("root");
        world.admin.grant(root.clone());

        world
            .ledger
            .set_ring_capacity(root.clone(), 64)
            .await
            .unwrap();
        assert_eq!(world.ledger.ring_capacity().await.unwrap(), 64);

        world.clock.advance(1);
        mint(&world, UnitId::new(0), &acct("alice")).await;

        let err = world
            .ledger
            .set_ring_capacity(root.clone(), 128)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CapacityLocked));

        world.ledger.shutdown().await.unwrap();
    }

    // Contained observer behavior

    struct FailingObserver;

    impl UnitObserver for FailingObserver {
        fn unit_minted(
            &self,
            _unit: UnitId,
            _holder: &AccountId,
            _stipend: &mut Stipend,
        ) -> Result<(), ObserverError> {
            Err(ObserverError::Failed("renderer offline".to_string()))
        }
    }

    struct PanickingObserver;

    impl UnitObserver for PanickingObserver {
        fn unit_minted(
            &self,
            _unit: UnitId,
            _holder: &AccountId,
            _stipend: &mut Stipend,
        ) -> Result<(), ObserverError> {
            panic!("renderer crashed");
        }
    }

    struct GreedyObserver;

    impl UnitObserver for GreedyObserver {
        fn unit_minted(
            &self,
            _unit: UnitId,
            _holder: &AccountId,
            stipend: &mut Stipend,
        ) -> Result<(), ObserverError> {
            loop {
                stipend.consume(10_000)?;
            }
        }
    }

    async fn assert_contained_mint(observer: Arc<dyn UnitObserver>, expect_reason: &str) {
        let world = open_world_with_observer(|_| {}, Some(observer)).await;
        let alice = acct("alice");
        let unit = UnitId::new(0);

        world.clock.advance(1);
        world.ownership.set_holder(unit, alice.clone());
        let events = world
            .ledger
            .ownership_changed(unit, None, Some(alice.clone()))
            .await
            .unwrap();

        // The mint itself succeeded despite the observer
        assert_eq!(
            world.ledger.current_power(alice.clone()).await.unwrap(),
            VotePower::ONE
        );

        // Exactly one containment event was journaled
        let failures: Vec<&str> = events
            .iter()
            .filter_map(|record| match &record.event {
                DomainEvent::ObserverFailed { reason, .. } => Some(reason.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(
            failures[0].contains(expect_reason),
            "reason {:?} should contain {:?}",
            failures[0],
            expect_reason
        );

        world.ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_observer_cannot_block_mint() {
        assert_contained_mint(Arc::new(FailingObserver), "renderer offline").await;
    }

    #[tokio::test]
    async fn test_panicking_observer_cannot_block_mint() {
        assert_contained_mint(Arc::new(PanickingObserver), "renderer crashed").await;
    }

    #[tokio::test]
    async fn test_greedy_observer_runs_out_of_stipend() {
        assert_contained_mint(Arc::new(GreedyObserver), "stipend exhausted").await;
    }

    #[tokio::test]
    async fn test_journal_indices_are_dense() {
        let world = open_world(|_| {}).await;
        let alice = acct("alice");

        for i in 0..6 {
            world.clock.advance(1);
            mint(&world, UnitId::new(i), &alice).await;
        }

        let events = world.ledger.events_since(0).unwrap();
        assert_eq!(events.len(), 6);
        for (i, record) in events.iter().enumerate() {
            assert_eq!(record.index, i as u64);
        }

        let stats = world.ledger.stats().unwrap();
        assert_eq!(stats.total_accounts, 1);

        world.ledger.shutdown().await.unwrap();
    }
}
