// Sparse Merkle tree benchmarks for the nameledger state store.
//
// Covers single inserts into a populated tree, proof generation and
// verification, and folding one registration into a populated snapshot.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use nameledger_protocol::actions::Action;
use nameledger_protocol::crypto::keys::{Address, Keypair};
use nameledger_protocol::names::{Name, NameRecord};
use nameledger_protocol::rules::TransitionRules;
use nameledger_protocol::storage::{Snapshot, SparseMerkleTree};

fn key(i: u64) -> [u8; 32] {
    *blake3::hash(&i.to_be_bytes()).as_bytes()
}

fn populated(n: u64) -> SparseMerkleTree {
    let mut tree = SparseMerkleTree::new();
    for i in 0..n {
        tree.insert(key(i), key(i + n));
    }
    tree
}

fn bench_insert(c: &mut Criterion) {
    let tree = populated(1_000);
    c.bench_function("smt/insert_into_1k", |b| {
        b.iter_batched(
            || tree.clone(),
            |mut t| t.insert(key(1_000_000), key(7)),
            BatchSize::SmallInput,
        );
    });
}

fn bench_prove(c: &mut Criterion) {
    let tree = populated(1_000);
    let target = key(500);
    c.bench_function("smt/prove_inclusion_1k", |b| {
        b.iter(|| tree.prove(black_box(&target)));
    });
}

fn bench_verify(c: &mut Criterion) {
    let tree = populated(1_000);
    let root = tree.root();
    let proof = tree.prove(&key(500));
    c.bench_function("smt/verify_inclusion_1k", |b| {
        b.iter(|| proof.verify(black_box(&root)));
    });
}

fn register(name: &str, owner: Address) -> Action {
    Action::Register {
        name: Name::parse(name).unwrap(),
        record: NameRecord::new(owner),
    }
}

fn bench_snapshot_fold(c: &mut Criterion) {
    let owner = Keypair::from_seed(&[1; 32]).address();
    let rules = TransitionRules::new(owner);
    let mut snapshot = Snapshot::genesis();
    for i in 0..256u32 {
        rules
            .fold(&mut snapshot, &register(&format!("name{i}"), owner), &owner)
            .unwrap();
    }
    let fresh = register("fresh", owner);
    c.bench_function("smt/snapshot_fold_register_256", |b| {
        b.iter_batched(
            || snapshot.clone(),
            |mut s| {
                rules.fold(&mut s, &fresh, &owner).unwrap();
                s.root()
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_prove,
    bench_verify,
    bench_snapshot_fold,
);
criterion_main!(benches);
