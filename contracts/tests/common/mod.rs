//! Shared harness: one directory instance with a small Groth16 circuit.

#![allow(dead_code)]

use std::sync::Arc;

use nameledger_contracts::NameService;
use nameledger_protocol::actions::{Action, ActionLog, ActionLogConfig, SignedAction};
use nameledger_protocol::crypto::keys::{Address, Keypair};
use nameledger_protocol::names::{Name, NameRecord, PremiumSchedule};
use nameledger_protocol::rules::TransitionRules;
use nameledger_protocol::settlement::{
    GeneratorConfig, SettlementProof, SettlementProofGenerator, SettlementReceipt,
};
use nameledger_protocol::storage::{NameDb, StateStore};
use nameledger_protocol::zkp::{Groth16ProofSystem, MimcParams, ProofSystem};

/// Circuit capacity used by the tests. Small, so setup stays fast.
pub const CAPACITY: usize = 4;

pub struct Directory {
    pub admin: Keypair,
    pub store: Arc<StateStore>,
    pub log: Arc<ActionLog>,
    pub service: NameService,
    pub generator: SettlementProofGenerator,
}

pub fn proof_system() -> Arc<dyn ProofSystem> {
    let system = Groth16ProofSystem::with_seed(CAPACITY, 42).with_mimc(MimcParams::new(4));
    system.compile().expect("setup");
    Arc::new(system)
}

impl Directory {
    pub fn new() -> Self {
        let admin = kp(0);
        let store = Arc::new(StateStore::new(TransitionRules::new(admin.address())));
        let log = Arc::new(ActionLog::new(ActionLogConfig::default()));
        Self::assemble(admin, store, log)
    }

    pub fn open(db: Arc<NameDb>) -> Self {
        let admin = kp(0);
        let store = Arc::new(
            StateStore::open(TransitionRules::new(admin.address()), Arc::clone(&db)).expect("store"),
        );
        let log = Arc::new(ActionLog::open(ActionLogConfig::default(), db).expect("log"));
        Self::assemble(admin, store, log)
    }

    fn assemble(admin: Keypair, store: Arc<StateStore>, log: Arc<ActionLog>) -> Self {
        let prover = proof_system();
        let service = NameService::deploy(Arc::clone(&store), Arc::clone(&log), Arc::clone(&prover));
        let generator = SettlementProofGenerator::new(
            Arc::clone(&store),
            Arc::clone(&log),
            prover,
            GeneratorConfig::default(),
        );
        Self {
            admin,
            store,
            log,
            service,
            generator,
        }
    }

    /// A second generator over the same store and log with a tighter cap.
    pub fn generator_capped(&self, max_batch: usize) -> SettlementProofGenerator {
        SettlementProofGenerator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.log),
            proof_system(),
            GeneratorConfig { max_batch },
        )
    }

    pub fn prove(&self) -> SettlementProof {
        self.generator.create_settlement_proof().expect("proof").0
    }

    /// Prove and settle the head of the log.
    pub fn settle(&self) -> SettlementReceipt {
        let proof = self.prove();
        self.service.settle(&proof).expect("settle")
    }
}

pub fn kp(seed: u8) -> Keypair {
    Keypair::from_seed(&[seed; 32])
}

pub fn name(s: &str) -> Name {
    Name::parse(s).unwrap()
}

pub fn register(n: &str, signer: &Keypair, nonce: u64) -> SignedAction {
    register_with(n, NameRecord::new(signer.address()), signer, nonce)
}

pub fn register_with(n: &str, record: NameRecord, signer: &Keypair, nonce: u64) -> SignedAction {
    SignedAction::sign(
        Action::Register {
            name: name(n),
            record,
        },
        signer,
        nonce,
    )
}

pub fn set_record(n: &str, record: NameRecord, signer: &Keypair, nonce: u64) -> SignedAction {
    SignedAction::sign(
        Action::SetRecord {
            name: name(n),
            record,
        },
        signer,
        nonce,
    )
}

pub fn transfer(n: &str, to: Address, signer: &Keypair, nonce: u64) -> SignedAction {
    SignedAction::sign(
        Action::TransferOwnership {
            name: name(n),
            new_owner: to,
        },
        signer,
        nonce,
    )
}

pub fn set_premium(schedule: PremiumSchedule, signer: &Keypair, nonce: u64) -> SignedAction {
    SignedAction::sign(Action::SetPremium { schedule }, signer, nonce)
}
