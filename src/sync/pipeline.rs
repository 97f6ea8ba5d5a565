//! Wiring of the two loops per subject
//!
//! For every enabled subject a fast [`StatePoller`] stages the primary's
//! state into a [`HandoffStore`], and a slower [`ConsensusLoop`] runs
//! detect → stabilize → validate → publish on whatever is latest. Both loops
//! share one [`SyncContext`] and stop on one cancellation token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::alert::{Alert, AlertSink};
use super::clock::Clock;
use super::consensus::{ConsensusPolicy, ConsensusValidator, Verdict};
use super::detector::{ChangeDetector, Detection};
use super::handoff::HandoffStore;
use super::poller::StatePoller;
use super::publisher::{LedgerPublisher, PublishOutcome};
use super::record::{AgreementRecord, RecordStage};
use super::stability::{StabilityOutcome, StabilityPolicy, StabilityWaiter};
use crate::error::{Error, Result};
use crate::model::{FlowSet, HostSet, Snapshot, SubjectKind, TopologySnapshot};
use crate::onos::ControllerApi;

/// Ledger stream per subject
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamNames {
    pub flows: String,
    pub hosts: String,
    pub topology: String,
}

impl Default for StreamNames {
    fn default() -> Self {
        Self {
            flows: SubjectKind::Flows.default_stream().to_string(),
            hosts: SubjectKind::Hosts.default_stream().to_string(),
            topology: SubjectKind::Topology.default_stream().to_string(),
        }
    }
}

impl StreamNames {
    pub fn for_kind(&self, kind: SubjectKind) -> &str {
        match kind {
            SubjectKind::Flows => &self.flows,
            SubjectKind::Hosts => &self.hosts,
            SubjectKind::Topology => &self.topology,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub poll_interval: Duration,
    pub check_interval: Duration,
    pub stability: StabilityPolicy,
    pub consensus: ConsensusPolicy,
    pub streams: StreamNames,
    pub ledger_key: String,
    pub reconcile_on_disagreement: bool,
    pub handoff_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            check_interval: Duration::from_secs(1),
            stability: StabilityPolicy::default(),
            consensus: ConsensusPolicy::default(),
            streams: StreamNames::default(),
            ledger_key: "key1".to_string(),
            reconcile_on_disagreement: false,
            handoff_dir: None,
        }
    }
}

/// Everything both loops share, created once at start-up
pub struct SyncContext {
    pub primary: Arc<dyn ControllerApi>,
    pub backup: Arc<dyn ControllerApi>,
    pub publisher: Arc<LedgerPublisher>,
    pub alerts: Arc<dyn AlertSink>,
    pub clock: Arc<dyn Clock>,
    pub settings: PipelineSettings,
    /// Identity of this node, reported in alerts
    pub origin: String,
}

/// Slow loop for one subject
pub struct ConsensusLoop<S> {
    ctx: Arc<SyncContext>,
    detector: ChangeDetector<S>,
    waiter: StabilityWaiter,
    validator: ConsensusValidator,
}

impl<S: Snapshot> ConsensusLoop<S> {
    pub fn new(ctx: Arc<SyncContext>, detector: ChangeDetector<S>) -> Self {
        let waiter = StabilityWaiter::new(ctx.primary.clone(), ctx.settings.stability);
        let validator = ConsensusValidator::new(ctx.backup.clone(), ctx.settings.consensus);
        Self {
            ctx,
            detector,
            waiter,
            validator,
        }
    }

    fn stream(&self) -> &str {
        self.ctx.settings.streams.for_kind(S::KIND)
    }

    /// One iteration: returns the finished record if a change was processed
    pub async fn tick(&mut self, cancel: &CancellationToken) -> Option<AgreementRecord<S>> {
        let Detection::Changed {
            snapshot,
            detected_at,
        } = self.detector.check(self.ctx.clock.now())
        else {
            return None;
        };

        info!("Change in the {} detected at {}", S::KIND, detected_at);
        let record = AgreementRecord::new(
            snapshot,
            self.ctx.primary.address(),
            self.ctx.backup.address(),
            detected_at,
        );
        let record = self.process(record, cancel).await;
        record.log_summary();
        Some(record)
    }

    #[instrument(skip_all, fields(kind = %S::KIND, primary = %record.primary))]
    async fn process(
        &mut self,
        mut record: AgreementRecord<S>,
        cancel: &CancellationToken,
    ) -> AgreementRecord<S> {
        let subject = record.subject.clone();
        match self.waiter.wait(subject, cancel).await {
            StabilityOutcome::Stable { snapshot, polls } => {
                info!("{} stable after {} re-polls, beginning consensus", S::KIND, polls);
                self.detector.accept(&snapshot);
                record.mark_stable(snapshot, self.ctx.clock.now());
            }
            StabilityOutcome::TimedOut {
                last,
                polls,
                elapsed,
            } => {
                self.ctx.alerts.raise(&Alert::StabilityTimeout {
                    kind: S::KIND,
                    primary: record.primary.clone(),
                    polls,
                    elapsed,
                    unsettled: last.unsettled(),
                });
                record.subject = last;
                record.finish(RecordStage::TimedOut, self.ctx.clock.now());
                return record;
            }
            StabilityOutcome::Cancelled => {
                record.finish(RecordStage::Cancelled, self.ctx.clock.now());
                return record;
            }
        }

        let verdict = match self.validator.validate(&record.subject, cancel).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(
                    "Could not query backup {} for {}, retrying on next check: {}",
                    record.backup,
                    S::KIND,
                    e
                );
                self.detector.retry(&record.subject);
                record.finish(RecordStage::QueryFailed, self.ctx.clock.now());
                return record;
            }
        };

        match verdict {
            Verdict::Agreement { agreed } => {
                record.subject = agreed;
                record.mark_agreed(self.ctx.clock.now());
            }
            Verdict::Disagreement { divergence, .. } => {
                self.ctx.alerts.raise(&Alert::ConsensusFailure {
                    kind: S::KIND,
                    primary: record.primary.clone(),
                    backup: record.backup.clone(),
                    origin: self.ctx.origin.clone(),
                    divergence,
                    detected_at: record.detected_at,
                });
                if self.ctx.settings.reconcile_on_disagreement {
                    self.reconcile(&record.subject).await;
                }
                record.finish(RecordStage::ConsensusFailed, self.ctx.clock.now());
                return record;
            }
            Verdict::Cancelled => {
                record.finish(RecordStage::Cancelled, self.ctx.clock.now());
                return record;
            }
        }

        let stream = self.stream().to_string();
        let key = self.ctx.settings.ledger_key.clone();
        let stage = match self.ctx.publisher.publish(&stream, &key, &record.subject).await {
            Ok(PublishOutcome::Published(_)) => RecordStage::Published,
            Ok(PublishOutcome::Duplicate { .. }) => RecordStage::Duplicate,
            Err(Error::UnsafePayload(e)) => {
                self.ctx.alerts.raise(&Alert::UnsafePayload {
                    kind: S::KIND,
                    stream,
                    reason: e.to_string(),
                });
                RecordStage::PublishFailed
            }
            Err(e) => {
                self.ctx.alerts.raise(&Alert::PublishFailure {
                    kind: S::KIND,
                    stream,
                    key,
                    reason: e.to_string(),
                });
                RecordStage::PublishFailed
            }
        };
        record.finish(stage, self.ctx.clock.now());
        record
    }

    /// Push the primary's state to the backup after a disagreement
    async fn reconcile(&self, snapshot: &S) {
        let backup = self.validator.backup();
        match S::install(backup.as_ref(), snapshot).await {
            Ok(()) => info!(
                "Propagated primary {} state to {}",
                S::KIND,
                backup.address()
            ),
            Err(e) => warn!(
                "Failed to propagate {} state to {}: {}",
                S::KIND,
                backup.address(),
                e
            ),
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Starting {} consensus loop every {:?}",
            S::KIND,
            self.ctx.settings.check_interval
        );

        let mut ticker = interval(self.ctx.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick(&cancel).await;
        }

        info!("{} consensus loop stopped", S::KIND);
    }
}

/// One-shot agreement check outside the loops.
///
/// Fetches the primary, waits for it to settle and compares it with the
/// backup. Returns the agreed, normalized snapshot.
pub async fn check_once<S: Snapshot>(
    primary: Arc<dyn ControllerApi>,
    backup: Arc<dyn ControllerApi>,
    settings: &PipelineSettings,
    cancel: &CancellationToken,
) -> Result<S> {
    let snapshot = S::fetch(primary.as_ref()).await?;

    let waiter = StabilityWaiter::new(primary.clone(), settings.stability);
    let stable = match waiter.wait(snapshot, cancel).await {
        StabilityOutcome::Stable { snapshot, .. } => snapshot,
        StabilityOutcome::TimedOut { polls, elapsed, .. } => {
            return Err(Error::StabilityTimeout {
                kind: S::KIND,
                polls,
                elapsed,
            })
        }
        StabilityOutcome::Cancelled => return Err(Error::Cancelled),
    };

    let validator = ConsensusValidator::new(backup.clone(), settings.consensus);
    match validator.validate(&stable, cancel).await? {
        Verdict::Agreement { agreed } => Ok(agreed),
        Verdict::Disagreement { divergence, .. } => Err(Error::ConsensusFailure {
            kind: S::KIND,
            primary: primary.address().to_string(),
            backup: backup.address().to_string(),
            divergence,
        }),
        Verdict::Cancelled => Err(Error::Cancelled),
    }
}

/// Fetch the primary once to seed the accepted baseline
async fn seed_baseline<S: Snapshot>(primary: &dyn ControllerApi) -> Option<S> {
    match S::fetch(primary).await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(
                "Initial {} fetch from {} failed, first observed state counts as a change: {}",
                S::KIND,
                primary.address(),
                e
            );
            None
        }
    }
}

async fn open_store<S: Snapshot>(settings: &PipelineSettings) -> Result<HandoffStore<S>> {
    match &settings.handoff_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            HandoffStore::with_mirror(dir.join(format!("{}.json", S::KIND))).await
        }
        None => Ok(HandoffStore::new()),
    }
}

/// Spawn the poller and consensus loop for one subject
pub async fn spawn_subject<S: Snapshot>(
    ctx: Arc<SyncContext>,
    cancel: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>> {
    let store = Arc::new(open_store::<S>(&ctx.settings).await?);
    let baseline = seed_baseline::<S>(ctx.primary.as_ref()).await;

    let detector = ChangeDetector::new(store.reader(), baseline);
    let poller = StatePoller::new(ctx.primary.clone(), store, ctx.settings.poll_interval);
    let consensus = ConsensusLoop::new(ctx, detector);

    Ok(vec![
        tokio::spawn(poller.run(cancel.child_token())),
        tokio::spawn(consensus.run(cancel.child_token())),
    ])
}

/// All running loops, stopped together
pub struct SyncService {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SyncService {
    pub async fn start(ctx: Arc<SyncContext>, subjects: &[SubjectKind]) -> Result<Self> {
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        for kind in subjects {
            let spawned = match kind {
                SubjectKind::Flows => spawn_subject::<FlowSet>(ctx.clone(), &cancel).await?,
                SubjectKind::Hosts => spawn_subject::<HostSet>(ctx.clone(), &cancel).await?,
                SubjectKind::Topology => {
                    spawn_subject::<TopologySnapshot>(ctx.clone(), &cancel).await?
                }
            };
            handles.extend(spawned);
        }

        info!("Started sync for {} subject(s)", subjects.len());
        Ok(Self { cancel, handles })
    }

    /// Signal every loop and wait for them to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Sync task ended abnormally: {:?}", e);
            }
        }
        info!("All sync loops stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Divergence;
    use crate::sync::clock::ManualClock;
    use crate::sync::normalize::Normalize;
    use crate::sync::test_support::{
        flow_set, host_set, RecordingAlerts, RecordingLedger, ScriptedController,
    };
    use chrono::Utc;

    struct Harness<S = FlowSet> {
        primary: Arc<ScriptedController>,
        backup: Arc<ScriptedController>,
        ledger: Arc<RecordingLedger>,
        alerts: Arc<RecordingAlerts>,
        store: Arc<HandoffStore<S>>,
        consensus: ConsensusLoop<S>,
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            poll_interval: Duration::from_millis(100),
            check_interval: Duration::from_secs(1),
            stability: StabilityPolicy {
                poll_interval: Duration::from_secs(1),
                max_wait: Duration::from_secs(30),
                max_polls: 5,
            },
            consensus: ConsensusPolicy {
                recheck_delay: Duration::from_secs(1),
                max_rechecks: 1,
            },
            ..PipelineSettings::default()
        }
    }

    fn harness_with<S: Snapshot>(
        settings: PipelineSettings,
        ledger: RecordingLedger,
    ) -> Harness<S> {
        let primary = Arc::new(ScriptedController::new("192.168.1.39"));
        let backup = Arc::new(ScriptedController::new("192.168.1.40"));
        let ledger = Arc::new(ledger);
        let alerts = Arc::new(RecordingAlerts::default());

        let ctx = Arc::new(SyncContext {
            primary: primary.clone(),
            backup: backup.clone(),
            publisher: Arc::new(LedgerPublisher::new(ledger.clone(), 1 << 20)),
            alerts: alerts.clone(),
            clock: Arc::new(ManualClock::new(Utc::now())),
            settings,
            origin: "sync-node-1".to_string(),
        });

        let store = Arc::new(HandoffStore::new());
        let detector = ChangeDetector::new(store.reader(), None);
        Harness {
            primary,
            backup,
            ledger,
            alerts,
            store,
            consensus: ConsensusLoop::new(ctx, detector),
        }
    }

    fn harness() -> Harness {
        harness_with::<FlowSet>(settings(), RecordingLedger::default())
    }

    fn topology(devices: u64, links: u64, time: u64) -> TopologySnapshot {
        serde_json::from_value(serde_json::json!({
            "time": time, "devices": devices, "links": links, "clusters": 1
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_tick_does_nothing() {
        let mut h = harness();
        assert!(h.consensus.tick(&CancellationToken::new()).await.is_none());
        assert_eq!(h.backup.flow_fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_flow_is_published_once_after_agreement() {
        let mut h = harness();
        h.store
            .stage(flow_set(&[("PENDING", "aa:bb", 1)]))
            .await
            .unwrap();
        h.primary.push_flows(Ok(flow_set(&[("ADDED", "aa:bb", 5)])));

        // same rule on the backup under its own id and counters
        let mut replica = flow_set(&[("ADDED", "aa:bb", 7)]);
        replica.flows[0].id = Some("9".to_string());
        h.backup.push_flows(Ok(replica));

        let cancel = CancellationToken::new();
        let record = h.consensus.tick(&cancel).await.unwrap();
        assert_eq!(record.stage, RecordStage::Published);
        assert!(record.stabilized_at.is_some());
        assert!(record.checked_at.is_some());
        assert!(h.alerts.alerts().is_empty());

        let calls = h.ledger.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sdn_flows");
        assert_eq!(calls[0].1, "key1");
        let published = &calls[0].2["json"]["flows"][0];
        assert_eq!(published["state"], "ADDED");
        assert!(published.get("life").is_none());
        assert!(published.get("id").is_none());

        // the poller catching up with the installed state is not a new change
        h.store
            .stage(flow_set(&[("ADDED", "aa:bb", 11)]).normalized())
            .await
            .unwrap();
        assert!(h.consensus.tick(&cancel).await.is_none());
        assert_eq!(h.ledger.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_backup_entry_raises_alert_and_skips_ledger() {
        let mut h = harness();
        h.store
            .stage(flow_set(&[("ADDED", "aa:bb", 1)]))
            .await
            .unwrap();
        h.backup.push_flows(Ok(flow_set(&[
            ("ADDED", "aa:bb", 1),
            ("ADDED", "aa:cc", 1),
        ])));

        let record = h.consensus.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.stage, RecordStage::ConsensusFailed);
        assert!(h.ledger.calls().is_empty());
        // one initial fetch plus one re-check
        assert_eq!(h.backup.flow_fetches(), 2);

        let alerts = h.alerts.alerts();
        assert_eq!(alerts.len(), 1);
        match &alerts[0] {
            Alert::ConsensusFailure {
                kind,
                primary,
                backup,
                origin,
                divergence,
                ..
            } => {
                assert_eq!(*kind, SubjectKind::Flows);
                assert_eq!(primary, "192.168.1.39");
                assert_eq!(backup, "192.168.1.40");
                assert_eq!(origin, "sync-node-1");
                assert_eq!(
                    *divergence,
                    Divergence::LengthMismatch {
                        primary: 1,
                        backup: 2
                    }
                );
            }
            other => panic!("unexpected alert {other:?}"),
        }
        assert!(h.backup.inserted_flows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disagreement_reconciles_backup_when_enabled() {
        let mut h = harness_with::<FlowSet>(
            PipelineSettings {
                reconcile_on_disagreement: true,
                ..settings()
            },
            RecordingLedger::default(),
        );
        h.store
            .stage(flow_set(&[("ADDED", "aa:bb", 1)]))
            .await
            .unwrap();
        h.backup.push_flows(Ok(FlowSet::default()));

        let record = h.consensus.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.stage, RecordStage::ConsensusFailed);
        assert!(h.ledger.calls().is_empty());

        let inserted = h.backup.inserted_flows();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsettled_state_never_reaches_backup_or_ledger() {
        let mut h = harness();
        h.store
            .stage(flow_set(&[("PENDING_ADD", "aa:bb", 1)]))
            .await
            .unwrap();
        h.primary
            .push_flows(Ok(flow_set(&[("PENDING_ADD", "aa:bb", 2)])));

        let record = h.consensus.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.stage, RecordStage::TimedOut);
        assert_eq!(h.primary.flow_fetches(), 5);
        assert_eq!(h.backup.flow_fetches(), 0);
        assert!(h.ledger.calls().is_empty());

        let alerts = h.alerts.alerts();
        assert!(matches!(
            alerts.as_slice(),
            [Alert::StabilityTimeout {
                polls: 5,
                unsettled: 1,
                ..
            }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_query_failure_raises_no_alert() {
        let mut h = harness();
        h.store
            .stage(flow_set(&[("ADDED", "aa:bb", 1)]))
            .await
            .unwrap();
        h.backup.push_flows(Err(503));

        let record = h.consensus.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.stage, RecordStage::QueryFailed);
        assert!(h.alerts.alerts().is_empty());
        assert!(h.ledger.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_is_retried_after_backup_outage() {
        let mut h = harness();
        h.store
            .stage(flow_set(&[("ADDED", "aa:bb", 1)]))
            .await
            .unwrap();
        h.backup.push_flows(Err(503));
        h.backup.push_flows(Ok(flow_set(&[("ADDED", "aa:bb", 4)])));

        let cancel = CancellationToken::new();
        let first = h.consensus.tick(&cancel).await.unwrap();
        assert_eq!(first.stage, RecordStage::QueryFailed);
        assert!(h.ledger.calls().is_empty());

        // the poller restages the same state meanwhile
        h.store
            .stage(flow_set(&[("ADDED", "aa:bb", 2)]).normalized())
            .await
            .unwrap();

        let second = h.consensus.tick(&cancel).await.unwrap();
        assert_eq!(second.stage, RecordStage::Published);
        assert_eq!(h.ledger.calls().len(), 1);
        assert_eq!(h.backup.flow_fetches(), 2);

        assert!(h.consensus.tick(&cancel).await.is_none());
        assert_eq!(h.ledger.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_agreement_is_published_to_hosts_stream() {
        let mut h = harness_with::<HostSet>(settings(), RecordingLedger::default());
        let hosts = host_set(&[
            ("00:00:00:00:00:01", "10.0.0.1"),
            ("00:00:00:00:00:02", "10.0.0.2"),
        ]);
        h.store.stage(hosts.clone()).await.unwrap();
        h.backup.push_hosts(Ok(hosts));

        let record = h.consensus.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.stage, RecordStage::Published);
        assert_eq!(record.kind, SubjectKind::Hosts);
        assert_eq!(h.backup.host_fetches(), 1);

        let calls = h.ledger.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sdn_hosts");
        assert_eq!(calls[0].2["json"]["hosts"][1]["ipAddresses"][0], "10.0.0.2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_disagreement_reports_first_differing_entry() {
        let mut h = harness_with::<HostSet>(settings(), RecordingLedger::default());
        h.store
            .stage(host_set(&[
                ("00:00:00:00:00:01", "10.0.0.1"),
                ("00:00:00:00:00:02", "10.0.0.2"),
            ]))
            .await
            .unwrap();
        h.backup.push_hosts(Ok(host_set(&[
            ("00:00:00:00:00:01", "10.0.0.1"),
            ("00:00:00:00:00:02", "10.0.0.9"),
        ])));

        let record = h.consensus.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.stage, RecordStage::ConsensusFailed);
        assert!(h.ledger.calls().is_empty());
        assert!(matches!(
            h.alerts.alerts().as_slice(),
            [Alert::ConsensusFailure {
                kind: SubjectKind::Hosts,
                divergence: Divergence::EntryMismatch { index: 1 },
                ..
            }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_topology_publishes_to_topology_stream() {
        let mut h = harness_with::<TopologySnapshot>(settings(), RecordingLedger::default());
        h.store.stage(topology(4, 6, 1_000)).await.unwrap();
        // observed later, same graph
        h.backup.push_topology(Ok(topology(4, 6, 9_000)));

        let record = h.consensus.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.stage, RecordStage::Published);

        let calls = h.ledger.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sdn_topology");
        assert_eq!(calls[0].2["json"]["devices"], 4);
        assert!(calls[0].2["json"].get("time").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_once_returns_agreed_snapshot() {
        let primary = Arc::new(ScriptedController::new("192.168.1.39"));
        primary.push_flows(Ok(flow_set(&[("PENDING_ADD", "aa:bb", 1)])));
        primary.push_flows(Ok(flow_set(&[("ADDED", "aa:bb", 3)])));
        let backup = Arc::new(ScriptedController::new("192.168.1.40"));
        backup.push_flows(Ok(flow_set(&[("ADDED", "aa:bb", 8)])));

        let agreed: FlowSet = check_once(primary, backup, &settings(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(agreed.len(), 1);
        assert!(agreed.flows[0].life.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_once_disagreement_is_consensus_failure() {
        let primary = Arc::new(ScriptedController::new("192.168.1.39"));
        primary.push_hosts(Ok(host_set(&[("00:00:00:00:00:01", "10.0.0.1")])));
        let backup = Arc::new(ScriptedController::new("192.168.1.40"));
        backup.push_hosts(Ok(HostSet::default()));

        let err = check_once::<HostSet>(primary, backup, &settings(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            Error::ConsensusFailure {
                kind,
                primary,
                backup,
                divergence,
            } => {
                assert_eq!(kind, SubjectKind::Hosts);
                assert_eq!(primary, "192.168.1.39");
                assert_eq!(backup, "192.168.1.40");
                assert_eq!(
                    divergence,
                    Divergence::LengthMismatch {
                        primary: 1,
                        backup: 0
                    }
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_once_unsettled_primary_is_stability_timeout() {
        let primary = Arc::new(ScriptedController::new("192.168.1.39"));
        primary.push_flows(Ok(flow_set(&[("PENDING_ADD", "aa:bb", 1)])));
        let backup = Arc::new(ScriptedController::new("192.168.1.40"));

        let err = check_once::<FlowSet>(
            primary,
            backup.clone(),
            &settings(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Error::StabilityTimeout {
                kind: SubjectKind::Flows,
                polls: 5,
                ..
            }
        ));
        assert_eq!(backup.flow_fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_once_unreachable_primary_is_query_failure() {
        let primary = Arc::new(ScriptedController::new("192.168.1.39"));
        primary.push_flows(Err(503));
        let backup = Arc::new(ScriptedController::new("192.168.1.40"));

        let err = check_once::<FlowSet>(primary, backup, &settings(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryFailure(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_once_cancelled() {
        let primary = Arc::new(ScriptedController::new("192.168.1.39"));
        primary.push_flows(Ok(flow_set(&[("PENDING_ADD", "aa:bb", 1)])));
        let backup = Arc::new(ScriptedController::new("192.168.1.40"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = check_once::<FlowSet>(primary, backup, &settings(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_failure_raises_publish_alert() {
        let mut h =
            harness_with::<FlowSet>(settings(), RecordingLedger::failing("connection refused"));
        h.store
            .stage(flow_set(&[("ADDED", "aa:bb", 1)]))
            .await
            .unwrap();
        h.backup.push_flows(Ok(flow_set(&[("ADDED", "aa:bb", 3)])));

        let record = h.consensus.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.stage, RecordStage::PublishFailed);

        let alerts = h.alerts.alerts();
        assert_eq!(alerts.len(), 1);
        match &alerts[0] {
            Alert::PublishFailure {
                stream,
                key,
                reason,
                ..
            } => {
                assert_eq!(stream, "sdn_flows");
                assert_eq!(key, "key1");
                assert!(reason.contains("connection refused"));
            }
            other => panic!("unexpected alert {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_staged_state_is_processed() {
        let mut h = harness();
        h.store.stage(flow_set(&[("ADDED", "aa:01", 1)])).await.unwrap();
        h.store.stage(flow_set(&[("ADDED", "aa:02", 1)])).await.unwrap();
        h.backup.push_flows(Ok(flow_set(&[("ADDED", "aa:02", 1)])));

        let record = h.consensus.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(record.stage, RecordStage::Published);
        assert_eq!(h.ledger.calls().len(), 1);
        assert!(h.consensus.tick(&CancellationToken::new()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_stability_wait() {
        let mut h = harness();
        h.store
            .stage(flow_set(&[("PENDING_ADD", "aa:bb", 1)]))
            .await
            .unwrap();
        h.primary
            .push_flows(Ok(flow_set(&[("PENDING_ADD", "aa:bb", 2)])));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let record = h.consensus.tick(&cancel).await.unwrap();
        assert_eq!(record.stage, RecordStage::Cancelled);
        assert!(h.alerts.alerts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let h = harness();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.consensus.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_seeds_baseline_and_shuts_down() {
        let primary = Arc::new(ScriptedController::new("192.168.1.39"));
        primary.push_flows(Ok(flow_set(&[("ADDED", "aa:bb", 1)])));
        let backup = Arc::new(ScriptedController::new("192.168.1.40"));
        let ledger = Arc::new(RecordingLedger::default());

        let ctx = Arc::new(SyncContext {
            primary: primary.clone(),
            backup: backup.clone(),
            publisher: Arc::new(LedgerPublisher::new(ledger.clone(), 1 << 20)),
            alerts: Arc::new(RecordingAlerts::default()),
            clock: Arc::new(ManualClock::new(Utc::now())),
            settings: settings(),
            origin: "sync-node-1".to_string(),
        });

        let service = SyncService::start(ctx, &[SubjectKind::Flows]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        service.shutdown().await;

        // unchanged since start-up, so nothing was validated or published
        assert!(primary.flow_fetches() > 1);
        assert_eq!(backup.flow_fetches(), 0);
        assert!(ledger.calls().is_empty());
    }
}
