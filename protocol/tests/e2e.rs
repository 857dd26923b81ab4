//! End-to-end integration tests for the settlement pipeline.
//!
//! These tests drive the protocol pieces the way a settler does, without
//! the contract in front: append signed actions, replay and prove a batch,
//! verify the proof, promote the staged snapshot, retire the batch.
//!
//! Each test stands alone with its own store, log and proof system.

use std::sync::Arc;

use nameledger_protocol::actions::{Action, ActionLog, ActionLogConfig, SignedAction};
use nameledger_protocol::crypto::keys::{Address, Keypair};
use nameledger_protocol::names::{Name, NameRecord, PremiumSchedule};
use nameledger_protocol::rules::TransitionRules;
use nameledger_protocol::settlement::{
    replay, GeneratorConfig, SettlementError, SettlementProof, SettlementProofGenerator,
};
use nameledger_protocol::storage::{NameDb, Snapshot, StateRoot, StateStore};
use nameledger_protocol::zkp::{Groth16ProofSystem, MimcParams, ProofSystem};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const CAPACITY: usize = 3;

struct Pipeline {
    store: Arc<StateStore>,
    log: Arc<ActionLog>,
    system: Arc<dyn ProofSystem>,
    generator: SettlementProofGenerator,
}

fn kp(seed: u8) -> Keypair {
    Keypair::from_seed(&[seed; 32])
}

fn admin() -> Address {
    kp(0).address()
}

fn name(s: &str) -> Name {
    Name::parse(s).unwrap()
}

fn system() -> Arc<dyn ProofSystem> {
    let system = Groth16ProofSystem::with_seed(CAPACITY, 42).with_mimc(MimcParams::new(4));
    system.compile().expect("setup");
    Arc::new(system)
}

fn pipeline_with(store: StateStore, log: ActionLog) -> Pipeline {
    let store = Arc::new(store);
    let log = Arc::new(log);
    let system = system();
    let generator = SettlementProofGenerator::new(
        Arc::clone(&store),
        Arc::clone(&log),
        Arc::clone(&system),
        GeneratorConfig::default(),
    );
    Pipeline {
        store,
        log,
        system,
        generator,
    }
}

fn pipeline() -> Pipeline {
    pipeline_with(
        StateStore::new(TransitionRules::new(admin())),
        ActionLog::new(ActionLogConfig::default()),
    )
}

fn register(n: &str, signer: &Keypair, nonce: u64) -> SignedAction {
    SignedAction::sign(
        Action::Register {
            name: name(n),
            record: NameRecord::new(signer.address()),
        },
        signer,
        nonce,
    )
}

impl Pipeline {
    /// Verify, promote and retire, the way the contract does.
    fn accept(&self, proof: &SettlementProof) -> StateRoot {
        let statement = &proof.statement;
        assert!(self.system.verify(&proof.proof, statement).unwrap());
        let seqs = statement.seqs();
        self.store
            .promote(&statement.old_root, &statement.new_root, &seqs)
            .unwrap();
        self.log.retire_settled(&seqs);
        statement.new_root
    }

    fn settle(&self) -> StateRoot {
        let (proof, _) = self.generator.create_settlement_proof().unwrap();
        self.accept(&proof)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn full_settlement_lifecycle() {
    let p = pipeline();
    let alice = kp(1);
    p.log.append(register("alice", &alice, 0)).unwrap();
    p.log.append(register("bob", &kp(2), 0)).unwrap();

    let genesis = p.store.committed_root();
    let (proof, staged) = p.generator.create_settlement_proof().unwrap();
    assert_eq!(proof.old_root(), genesis);
    assert_eq!(proof.new_root(), staged);
    assert_eq!(proof.statement.seqs(), vec![0, 1]);
    assert!(proof.dropped().is_empty());

    // Staged, not committed.
    assert!(p.store.get(&name("alice")).is_none());
    assert_eq!(p.store.staged_count(), 1);

    let root = p.accept(&proof);
    assert_eq!(p.store.committed_root(), root);
    assert_eq!(p.store.get(&name("alice")).unwrap().owner, alice.address());
    assert!(p.log.is_empty());
    assert_eq!(p.store.staged_count(), 0);
}

#[test]
fn empty_log_has_nothing_to_prove() {
    let p = pipeline();
    assert!(matches!(
        p.generator.create_settlement_proof(),
        Err(SettlementError::EmptyBatch)
    ));
    assert_eq!(p.store.staged_count(), 0);
}

#[test]
fn chain_of_settlements() {
    let p = pipeline();
    let mut previous = p.store.committed_root();
    for round in 0..3u64 {
        p.log
            .append(register(&format!("round{round}"), &kp(1), round))
            .unwrap();
        let (proof, _) = p.generator.create_settlement_proof().unwrap();
        assert_eq!(proof.old_root(), previous);
        previous = p.accept(&proof);
    }
    assert_eq!(p.store.with_committed(|s| s.len()), 3);
}

#[test]
fn batch_is_capped_by_circuit_capacity() {
    let p = pipeline();
    for i in 0..CAPACITY as u64 + 2 {
        p.log.append(register(&format!("n{i}"), &kp(1), i)).unwrap();
    }
    let (proof, _) = p.generator.create_settlement_proof().unwrap();
    assert_eq!(proof.statement.len(), CAPACITY);
    p.accept(&proof);
    assert_eq!(p.log.len(), 2);

    let (rest, _) = p.generator.create_settlement_proof().unwrap();
    assert_eq!(rest.statement.seqs(), vec![CAPACITY as u64, CAPACITY as u64 + 1]);
    p.accept(&rest);
    assert!(p.log.is_empty());
}

// ---------------------------------------------------------------------------
// Proof binding
// ---------------------------------------------------------------------------

#[test]
fn proof_does_not_verify_a_different_statement() {
    let p = pipeline();
    p.log.append(register("alice", &kp(1), 0)).unwrap();
    p.log.append(register("bob", &kp(2), 0)).unwrap();
    let (proof, _) = p.generator.create_settlement_proof().unwrap();

    let mut wrong_root = proof.statement.clone();
    wrong_root.new_root = proof.statement.old_root;
    assert!(!p.system.verify(&proof.proof, &wrong_root).unwrap());

    let mut reordered = proof.statement.clone();
    reordered.actions.swap(0, 1);
    assert!(!p.system.verify(&proof.proof, &reordered).unwrap());

    let mut truncated = proof.statement.clone();
    truncated.actions.pop();
    assert!(!p.system.verify(&proof.proof, &truncated).unwrap());
}

#[test]
fn stale_promotion_is_refused() {
    let p = pipeline();
    p.log.append(register("alice", &kp(1), 0)).unwrap();
    let (first, _) = p.generator.create_settlement_proof().unwrap();
    let (second, _) = p.generator.create_settlement_proof().unwrap();
    assert_eq!(first.new_root(), second.new_root());

    p.accept(&first);
    assert!(p
        .store
        .promote(&second.old_root(), &second.new_root(), &second.statement.seqs())
        .is_err());
}

// ---------------------------------------------------------------------------
// Replay semantics
// ---------------------------------------------------------------------------

#[test]
fn replay_is_deterministic_across_independent_stores() {
    let a = pipeline();
    let b = pipeline();
    for p in [&a, &b] {
        p.log.append(register("alice", &kp(1), 0)).unwrap();
        p.log.append(register("alice", &kp(2), 0)).unwrap();
        p.log
            .append(SignedAction::sign(
                Action::SetPremium {
                    schedule: PremiumSchedule::new([3; 6]),
                },
                &kp(0),
                0,
            ))
            .unwrap();
    }
    let (pa, _) = a.generator.create_settlement_proof().unwrap();
    let (pb, _) = b.generator.create_settlement_proof().unwrap();
    assert_eq!(pa.new_root(), pb.new_root());
    assert_eq!(pa.outcomes, pb.outcomes);
    assert_eq!(pa.dropped().len(), 1);
}

#[test]
fn transcript_chains_roots_step_by_step() {
    let rules = TransitionRules::new(admin());
    let log = ActionLog::new(ActionLogConfig::default());
    let owner = kp(1);
    log.append(register("alice", &owner, 0)).unwrap();
    log.append(register("alice", &kp(2), 0)).unwrap();
    log.append(SignedAction::sign(
        Action::TransferOwnership {
            name: name("alice"),
            new_owner: kp(3).address(),
        },
        &owner,
        1,
    ))
    .unwrap();

    let batch: Vec<_> = log.pending().iter().collect();
    let base = Snapshot::genesis();
    let replayed = replay(&rules, &base, &batch);

    assert!(replayed.transcript.is_consistent());
    assert_eq!(replayed.transcript.old_root, base.root());
    assert_eq!(replayed.transcript.new_root(), replayed.snapshot.root());
    let steps = &replayed.transcript.steps;
    assert_eq!(steps.len(), 3);
    // The dropped duplicate leaves the root where it was.
    assert!(!steps[1].outcome.is_applied());
    assert_eq!(steps[1].pre_root, steps[1].post_root);
    assert_eq!(
        replayed.snapshot.get(&name("alice")).unwrap().owner,
        kp(3).address()
    );
    // Every step carries a read proof against its pre-state.
    for step in steps {
        assert!(step.read_proof.verify(step.pre_root.as_bytes()));
    }
}

// ---------------------------------------------------------------------------
// Concurrency and persistence
// ---------------------------------------------------------------------------

#[test]
fn appends_during_proving_stay_pending() {
    let p = Arc::new(pipeline());
    for i in 0..2u64 {
        p.log.append(register(&format!("early{i}"), &kp(1), i)).unwrap();
    }

    let appender = {
        let p = Arc::clone(&p);
        std::thread::spawn(move || {
            for i in 0..8u64 {
                p.log.append(register(&format!("late{i}"), &kp(2), i)).unwrap();
            }
        })
    };
    let (proof, _) = p.generator.create_settlement_proof().unwrap();
    appender.join().unwrap();

    // Whatever the batch caught, it is a gap-free prefix of the log.
    let seqs = proof.statement.seqs();
    assert_eq!(seqs, (0..seqs.len() as u64).collect::<Vec<_>>());
    p.accept(&proof);
    assert_eq!(p.log.len(), 10 - seqs.len());
}

#[test]
fn db_persistence_survives_reopen() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = {
        let db = Arc::new(NameDb::open(tmp.path()).unwrap());
        let p = pipeline_with(
            StateStore::open(TransitionRules::new(admin()), Arc::clone(&db)).unwrap(),
            ActionLog::open(ActionLogConfig::default(), Arc::clone(&db)).unwrap(),
        );
        p.log.append(register("alice", &kp(1), 0)).unwrap();
        let root = p.settle();
        p.log.append(register("bob", &kp(2), 0)).unwrap();
        db.flush().unwrap();
        root
    };

    let db = Arc::new(NameDb::open(tmp.path()).unwrap());
    let p = pipeline_with(
        StateStore::open(TransitionRules::new(admin()), Arc::clone(&db)).unwrap(),
        ActionLog::open(ActionLogConfig::default(), db).unwrap(),
    );
    assert_eq!(p.store.committed_root(), root);
    assert!(p.store.get(&name("alice")).is_some());
    assert_eq!(p.log.len(), 1);
    assert_eq!(p.log.next_seq(), 2);

    let (proof, _) = p.generator.create_settlement_proof().unwrap();
    assert_eq!(proof.old_root(), root);
    p.accept(&proof);
    assert!(p.store.get(&name("bob")).is_some());
}
