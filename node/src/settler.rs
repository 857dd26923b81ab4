//! # Local Settlement Target
//!
//! Connects the scheduler to an in-process generator and contract. Proof
//! construction is CPU-bound and can take seconds, so each attempt runs on
//! the blocking pool and the runtime stays free for API traffic.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use nameledger_contracts::NameService;
use nameledger_protocol::settlement::{
    SettlementProofGenerator, SettlementReceipt, SettlementTarget,
};

use crate::metrics::SharedMetrics;

/// Settles against a [`NameService`] running in this process.
pub struct LocalSettlement {
    service: Arc<NameService>,
    generator: Arc<SettlementProofGenerator>,
    metrics: SharedMetrics,
}

impl LocalSettlement {
    pub fn new(
        service: Arc<NameService>,
        generator: Arc<SettlementProofGenerator>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            service,
            generator,
            metrics,
        }
    }

    /// Bring the state gauges in line with the contract.
    pub fn refresh_gauges(&self) {
        self.metrics
            .pending_actions
            .set(self.service.pending_count() as i64);
        self.metrics
            .committed_names
            .set(self.service.name_count() as i64);
    }
}

#[async_trait]
impl SettlementTarget for LocalSettlement {
    async fn pending_actions(&self) -> Result<usize> {
        let pending = self.service.pending_count();
        self.metrics.pending_actions.set(pending as i64);
        Ok(pending)
    }

    async fn settle(&self) -> Result<SettlementReceipt> {
        let service = Arc::clone(&self.service);
        let generator = Arc::clone(&self.generator);
        let metrics = Arc::clone(&self.metrics);

        let outcome = tokio::task::spawn_blocking(move || -> Result<SettlementReceipt> {
            let timer = metrics.proof_generation_seconds.start_timer();
            let (proof, staged) = generator
                .create_settlement_proof()
                .context("building settlement proof")?;
            timer.observe_duration();

            service.settle(&proof).map_err(|e| {
                // The staged snapshot can never be promoted now.
                service.store().discard_staged(&staged);
                anyhow::Error::new(e).context("contract rejected settlement")
            })
        })
        .await
        .context("settlement task panicked")?;

        match &outcome {
            Ok(receipt) => {
                self.metrics.settlements_total.inc();
                self.metrics
                    .dropped_actions_total
                    .inc_by(receipt.dropped.len() as u64);
            }
            Err(_) => self.metrics.settlement_failures_total.inc(),
        }
        self.refresh_gauges();
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metrics::SettlerMetrics;
    use nameledger_protocol::actions::{Action, ActionLog, ActionLogConfig, SignedAction};
    use nameledger_protocol::crypto::keys::Keypair;
    use nameledger_protocol::names::{Name, NameRecord};
    use nameledger_protocol::rules::TransitionRules;
    use nameledger_protocol::settlement::{
        Decision, GeneratorConfig, SchedulerConfig, SettlementScheduler,
    };
    use nameledger_protocol::storage::StateStore;
    use nameledger_protocol::zkp::{Groth16ProofSystem, MimcParams, ProofSystem};

    pub(crate) struct Harness {
        pub admin: Keypair,
        pub service: Arc<NameService>,
        pub generator: Arc<SettlementProofGenerator>,
        pub metrics: SharedMetrics,
    }

    /// A directory with a tiny, deterministic circuit.
    pub(crate) fn harness() -> Harness {
        let admin = Keypair::from_seed(&[0; 32]);
        let store = Arc::new(StateStore::new(TransitionRules::new(admin.address())));
        let log = Arc::new(ActionLog::new(ActionLogConfig::default()));
        let system = Groth16ProofSystem::with_seed(2, 42).with_mimc(MimcParams::new(4));
        system.compile().unwrap();
        let system: Arc<dyn ProofSystem> = Arc::new(system);

        let service = Arc::new(NameService::deploy(
            Arc::clone(&store),
            Arc::clone(&log),
            Arc::clone(&system),
        ));
        let generator = Arc::new(SettlementProofGenerator::new(
            store,
            log,
            system,
            GeneratorConfig::default(),
        ));
        Harness {
            admin,
            service,
            generator,
            metrics: Arc::new(SettlerMetrics::new().unwrap()),
        }
    }

    pub(crate) fn register(name: &str, seed: u8) -> SignedAction {
        let kp = Keypair::from_seed(&[seed; 32]);
        SignedAction::sign(
            Action::Register {
                name: Name::parse(name).unwrap(),
                record: NameRecord::new(kp.address()),
            },
            &kp,
            0,
        )
    }

    fn target(h: &Harness) -> Arc<LocalSettlement> {
        Arc::new(LocalSettlement::new(
            Arc::clone(&h.service),
            Arc::clone(&h.generator),
            Arc::clone(&h.metrics),
        ))
    }

    #[tokio::test]
    async fn settles_backlog_and_updates_metrics() {
        let h = harness();
        h.service.submit(register("alice", 1)).unwrap();
        h.service.submit(register("alice", 2)).unwrap();

        let target = target(&h);
        assert_eq!(target.pending_actions().await.unwrap(), 2);

        let receipt = target.settle().await.unwrap();
        assert_eq!(receipt.applied, 1);
        assert_eq!(receipt.dropped.len(), 1);
        assert_eq!(h.service.committed_root(), receipt.new_root);
        assert_eq!(h.metrics.settlements_total.get(), 1);
        assert_eq!(h.metrics.dropped_actions_total.get(), 1);
        assert_eq!(h.metrics.pending_actions.get(), 0);
        assert_eq!(h.metrics.committed_names.get(), 1);
    }

    #[tokio::test]
    async fn empty_backlog_counts_as_failure() {
        let h = harness();
        let target = target(&h);
        assert!(target.settle().await.is_err());
        assert_eq!(h.metrics.settlement_failures_total.get(), 1);
        assert_eq!(h.metrics.settlements_total.get(), 0);
    }

    #[tokio::test]
    async fn scheduler_drives_local_target() {
        let h = harness();
        h.service.submit(register("bob", 3)).unwrap();

        let config = SchedulerConfig {
            min_actions_to_settle: 1,
            ..SchedulerConfig::default()
        };
        let scheduler = SettlementScheduler::new(target(&h), config);
        let report = scheduler.run_cycle(0).await;

        assert!(matches!(report.decision, Decision::Settled(_)));
        assert_eq!(report.next_counter, 0);
        assert!(h
            .service
            .resolve_name(&Name::parse("bob").unwrap())
            .is_ok());
    }
}
