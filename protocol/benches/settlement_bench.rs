// Settlement pipeline benchmarks for the nameledger protocol.
//
// Replay of a full batch, the native MiMC hash, Groth16 setup for a small
// circuit, and proving/verifying one settlement at that size.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ark_bn254::Fr;

use nameledger_protocol::actions::{Action, ActionLog, ActionLogConfig, LoggedAction, SignedAction};
use nameledger_protocol::crypto::keys::Keypair;
use nameledger_protocol::names::{Name, NameRecord};
use nameledger_protocol::rules::TransitionRules;
use nameledger_protocol::settlement::{replay, ActionRef, SettlementStatement, Transcript};
use nameledger_protocol::storage::Snapshot;
use nameledger_protocol::zkp::{Groth16ProofSystem, MimcParams, ProofSystem};

const CAPACITY: usize = 4;

fn batch(n: usize) -> (TransitionRules, Vec<LoggedAction>) {
    let admin = Keypair::from_seed(&[0; 32]);
    let log = ActionLog::new(ActionLogConfig::default());
    for i in 0..n {
        let signer = Keypair::from_seed(&[(i % 200) as u8 + 1; 32]);
        let action = Action::Register {
            name: Name::parse(&format!("bench{i}")).unwrap(),
            record: NameRecord::new(signer.address()),
        };
        log.append(SignedAction::sign(action, &signer, i as u64)).unwrap();
    }
    let pending = log.pending().iter().collect();
    (TransitionRules::new(admin.address()), pending)
}

fn statement_for(batch: &[LoggedAction], transcript: &Transcript) -> SettlementStatement {
    SettlementStatement {
        old_root: transcript.old_root,
        new_root: transcript.new_root(),
        actions: batch.iter().map(ActionRef::from).collect(),
    }
}

fn bench_replay(c: &mut Criterion) {
    let (rules, pending) = batch(16);
    let base = Snapshot::genesis();
    c.bench_function("settlement/replay_16", |b| {
        b.iter(|| replay(&rules, black_box(&base), black_box(&pending)));
    });
}

fn bench_mimc_hash(c: &mut Criterion) {
    let mimc = MimcParams::default();
    let (a, b) = (Fr::from(7u64), Fr::from(11u64));
    c.bench_function("settlement/mimc_hash2", |bench| {
        bench.iter(|| mimc.hash2(black_box(a), black_box(b)));
    });
}

fn bench_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement");
    group.sample_size(10);
    group.bench_function("groth16_setup_4", |b| {
        b.iter(|| {
            let system = Groth16ProofSystem::with_seed(CAPACITY, 42);
            system.compile().unwrap();
        });
    });
    group.finish();
}

fn bench_prove_and_verify(c: &mut Criterion) {
    let system = Arc::new(Groth16ProofSystem::with_seed(CAPACITY, 42));
    system.compile().unwrap();

    let (rules, pending) = batch(CAPACITY);
    let replayed = replay(&rules, &Snapshot::genesis(), &pending);
    let statement = statement_for(&pending, &replayed.transcript);
    let proof = system.prove(&statement, &replayed.transcript).unwrap();

    let mut group = c.benchmark_group("settlement");
    group.sample_size(10);
    group.bench_function("groth16_prove_4", |b| {
        b.iter(|| system.prove(&statement, &replayed.transcript).unwrap());
    });
    group.bench_function("groth16_verify_4", |b| {
        b.iter(|| system.verify(black_box(&proof), &statement).unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_replay,
    bench_mimc_hash,
    bench_setup,
    bench_prove_and_verify,
);
criterion_main!(benches);
