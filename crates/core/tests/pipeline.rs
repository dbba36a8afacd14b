//! End-to-end behaviour of the orchestrator with fake collaborators.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use foundry_core::collaborators::{
    Deployer, DeploymentBundle, DeploymentReport, FilesystemDeployer, Generator,
    GeneratorRegistry, RunMetadata, StageContext,
};
use foundry_core::models::{
    ApprovalSpec, ArtifactMap, BusinessProcess, FieldType, FormField, FormSpec, IntegrationSpec,
    Requirement, RunOptions,
};
use foundry_core::pipeline::{
    categories, FailureKind, Orchestrator, OrchestratorConfig, PipelinePhase, ProgressBroadcaster,
    ProgressEvent, StageId, StageKind, Subscription, STAGE_TABLE,
};
use foundry_core::state::{MemoryRunStore, RunStatus, RunStatusUpdate, RunStore};
use foundry_core::PipelineError;

fn artifacts(names: &[&str]) -> ArtifactMap {
    names
        .iter()
        .map(|n| (n.to_string(), format!("// {}", n)))
        .collect()
}

struct Fixed(ArtifactMap);

#[async_trait]
impl Generator for Fixed {
    async fn generate(&self, _: &Requirement, _: &StageContext) -> anyhow::Result<ArtifactMap> {
        Ok(self.0.clone())
    }
}

struct Failing;

#[async_trait]
impl Generator for Failing {
    async fn generate(&self, _: &Requirement, _: &StageContext) -> anyhow::Result<ArtifactMap> {
        anyhow::bail!("backend unavailable")
    }
}

struct Panicking;

#[async_trait]
impl Generator for Panicking {
    async fn generate(&self, _: &Requirement, _: &StageContext) -> anyhow::Result<ArtifactMap> {
        panic!("generator blew up")
    }
}

/// Fails `failures` times, then succeeds
struct Flaky {
    failures: usize,
    calls: AtomicUsize,
}

impl Flaky {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Generator for Flaky {
    async fn generate(&self, _: &Requirement, _: &StageContext) -> anyhow::Result<ArtifactMap> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("transient failure {}", call + 1);
        }
        Ok(artifacts(&["flaky.out"]))
    }
}

/// Records every stage it serves, in call order
struct Recording {
    log: Arc<Mutex<Vec<StageId>>>,
}

#[async_trait]
impl Generator for Recording {
    async fn generate(&self, _: &Requirement, ctx: &StageContext) -> anyhow::Result<ArtifactMap> {
        self.log.lock().unwrap().push(ctx.stage);
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(artifacts(&[format!("{}.out", ctx.stage).as_str()]))
    }
}

/// Tracks the highest number of concurrent calls
struct Tracking {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Generator for Tracking {
    async fn generate(&self, _: &Requirement, ctx: &StageContext) -> anyhow::Result<ArtifactMap> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(artifacts(&[format!("{}.out", ctx.stage).as_str()]))
    }
}

/// Signals when it starts and waits for permission to finish
struct Gated {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Generator for Gated {
    async fn generate(&self, _: &Requirement, _: &StageContext) -> anyhow::Result<ArtifactMap> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(artifacts(&["gated.sql"]))
    }
}

struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for Counting {
    async fn generate(&self, _: &Requirement, _: &StageContext) -> anyhow::Result<ArtifactMap> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(artifacts(&["counted.out"]))
    }
}

struct FakeDeployer {
    success: bool,
    calls: AtomicUsize,
}

impl FakeDeployer {
    fn new(success: bool) -> Arc<Self> {
        Arc::new(Self {
            success,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Deployer for FakeDeployer {
    async fn deploy(
        &self,
        _: &Requirement,
        metadata: &RunMetadata,
        _: DeploymentBundle,
    ) -> anyhow::Result<DeploymentReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DeploymentReport {
            success: self.success,
            deployment_url: self
                .success
                .then(|| format!("https://apps.example.test/{}", metadata.run_id)),
            metrics: None,
        })
    }
}

struct UnreachableDeployer;

#[async_trait]
impl Deployer for UnreachableDeployer {
    async fn deploy(
        &self,
        _: &Requirement,
        _: &RunMetadata,
        _: DeploymentBundle,
    ) -> anyhow::Result<DeploymentReport> {
        anyhow::bail!("network down")
    }
}

struct BrokenStore;

#[async_trait]
impl RunStore for BrokenStore {
    async fn update_run_status(&self, _: &str, _: RunStatusUpdate) -> anyhow::Result<()> {
        anyhow::bail!("database is locked")
    }
}

/// A fixed generator for every generate stage
fn base_registry() -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    for spec in STAGE_TABLE.iter().filter(|s| s.kind == StageKind::Generate) {
        let name = format!("{}.out", spec.id);
        registry.insert(spec.id, Arc::new(Fixed(artifacts(&[name.as_str()]))));
    }
    registry
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry_backoff_ms: 0,
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(
    config: OrchestratorConfig,
    registry: GeneratorRegistry,
    deployer: Arc<dyn Deployer>,
) -> Orchestrator {
    Orchestrator::new(config, registry, deployer, Arc::new(ProgressBroadcaster::new()))
}

fn requirement() -> Requirement {
    Requirement::from_text("Purchase order tracking with manager approvals")
}

/// Everything already queued on a subscription
fn drain(subscription: &mut Subscription) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_happy_path_completes_and_deploys() {
    let deployer = FakeDeployer::new(true);
    let orchestrator = orchestrator(fast_config(), base_registry(), deployer.clone());
    let mut subscription = orchestrator.broadcaster().subscribe("run-happy");

    let result = orchestrator
        .run("run-happy", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Complete);
    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(
        result.deployment_url.as_deref(),
        Some("https://apps.example.test/run-happy")
    );
    assert_eq!(deployer.calls.load(Ordering::SeqCst), 1);

    let events = drain(&mut subscription);
    assert_eq!(events.first().unwrap().stage, PipelinePhase::Init);
    let last = events.last().unwrap();
    assert_eq!(last.stage, PipelinePhase::Complete);
    assert_eq!(last.percent, 100);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.iter().all(|e| e.run_id == "run-happy"));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ordered() {
    let mut registry = base_registry();
    registry.insert(StageId::Crm, Arc::new(Failing));
    let orchestrator = orchestrator(fast_config(), registry, FakeDeployer::new(true));
    let mut subscription = orchestrator.broadcaster().subscribe("run-order");

    orchestrator
        .run("run-order", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    let events = drain(&mut subscription);
    for pair in events.windows(2) {
        assert!(pair[1].percent >= pair[0].percent, "percent went backwards");
        assert!(pair[1].stage >= pair[0].stage, "phase went backwards");
        assert_eq!(pair[1].seq, pair[0].seq + 1);
        // Errors are append-only
        assert!(pair[1].errors.starts_with(&pair[0].errors));
    }
}

#[tokio::test]
async fn test_optional_failure_is_isolated() {
    let mut registry = base_registry();
    registry.insert(StageId::Crm, Arc::new(Failing));
    let orchestrator = orchestrator(fast_config(), registry, FakeDeployer::new(true));

    let result = orchestrator
        .run("run-isolated", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Complete);
    assert!(result.success);
    assert!(!result.artifacts.contains_key(categories::CRM));
    assert!(result.artifacts.contains_key(categories::SALES_AUTOMATION));
    assert!(result.artifacts.contains_key(categories::DOCUMENTATION));

    assert_eq!(result.errors.len(), 1);
    let error = &result.errors[0];
    assert_eq!(error.stage, StageId::Crm);
    assert_eq!(error.kind, FailureKind::Error);
    assert_eq!(error.attempts, 3);
    assert!(error.message.contains("backend unavailable"));
}

#[tokio::test]
async fn test_panicking_generator_is_contained() {
    let mut registry = base_registry();
    registry.insert(StageId::Voice, Arc::new(Panicking));
    let orchestrator = orchestrator(fast_config(), registry, FakeDeployer::new(true));

    let result = orchestrator
        .run("run-panic", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Complete);
    let error = result.errors.iter().find(|e| e.stage == StageId::Voice).unwrap();
    assert_eq!(error.kind, FailureKind::Panic);
    assert!(error.message.contains("generator blew up"));
}

#[tokio::test]
async fn test_required_schema_failure_fails_run() {
    let mut registry = base_registry();
    registry.insert(StageId::Schema, Arc::new(Failing));
    let deployer = FakeDeployer::new(true);
    let orchestrator = orchestrator(fast_config(), registry, deployer.clone());
    let mut subscription = orchestrator.broadcaster().subscribe("run-schema");

    let result = orchestrator
        .run("run-schema", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Failed);
    assert!(!result.success);
    assert!(result.deployment_url.is_none());
    assert_eq!(deployer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.errors[0].stage, StageId::Schema);
    // Earlier artifacts are still part of the result
    assert!(result.artifacts.contains_key(categories::COMPONENTS));

    let events = drain(&mut subscription);
    assert!(events.iter().all(|e| e.stage != PipelinePhase::Deploy));
    assert!(events.iter().all(|e| e.stage != PipelinePhase::GenerateOptional));
    let last = events.last().unwrap();
    assert!(last.is_failed());
    let before = &events[events.len() - 2];
    assert_eq!(last.percent, before.percent);
}

#[tokio::test]
async fn test_required_stage_is_not_retried() {
    let flaky = Flaky::new(1);
    let mut registry = base_registry();
    registry.insert(StageId::Ui, flaky.clone());
    let orchestrator = orchestrator(fast_config(), registry, FakeDeployer::new(true));

    let result = orchestrator
        .run("run-ui", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Failed);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.errors[0].attempts, 1);
}

#[tokio::test]
async fn test_retries_recover_flaky_optional_stage() {
    let flaky = Flaky::new(2);
    let mut registry = base_registry();
    registry.insert(StageId::Crm, flaky.clone());
    let orchestrator = orchestrator(fast_config(), registry, FakeDeployer::new(true));

    let result = orchestrator
        .run("run-flaky", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    assert!(result.errors.is_empty());
    assert!(result.artifacts[categories::CRM].contains_key("flaky.out"));
    assert!(result
        .warnings
        .contains(&"crm succeeded after 3 attempts".to_string()));
}

#[tokio::test]
async fn test_sequential_policy_runs_stages_in_table_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = GeneratorRegistry::new();
    for spec in STAGE_TABLE.iter().filter(|s| s.kind == StageKind::Generate) {
        registry.insert(spec.id, Arc::new(Recording { log: log.clone() }));
    }
    let orchestrator = orchestrator(
        OrchestratorConfig::sequential(),
        registry,
        FakeDeployer::new(true),
    );

    let options = RunOptions::default();
    orchestrator
        .run("run-sequential", &requirement(), &options)
        .await
        .unwrap();

    let expected: Vec<StageId> = STAGE_TABLE
        .iter()
        .filter(|s| s.kind == StageKind::Generate && s.id.enabled_by(&options))
        .map(|s| s.id)
        .collect();
    assert_eq!(*log.lock().unwrap(), expected);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut registry = base_registry();
    for spec in STAGE_TABLE
        .iter()
        .filter(|s| s.phase == PipelinePhase::GenerateOptional)
    {
        registry.insert(
            spec.id,
            Arc::new(Tracking {
                current: current.clone(),
                peak: peak.clone(),
            }),
        );
    }
    let config = OrchestratorConfig {
        max_concurrency: 2,
        ..fast_config()
    };
    let orchestrator = orchestrator(config, registry, FakeDeployer::new(true));

    let result = orchestrator
        .run("run-bounded", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Complete);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_blank_components_fail_validation() {
    let deployer = FakeDeployer::new(true);
    let mut registry = base_registry();
    let mut blank = ArtifactMap::new();
    blank.insert("App.tsx".to_string(), "  \n".to_string());
    registry.insert(StageId::Ui, Arc::new(Fixed(blank)));
    let orchestrator = orchestrator(fast_config(), registry, deployer.clone());

    let result = orchestrator
        .run("run-blank", &requirement(), &RunOptions::minimal())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Failed);
    assert_eq!(deployer.calls.load(Ordering::SeqCst), 0);
    let error = result.errors.last().unwrap();
    assert_eq!(error.stage, StageId::Validate);
    assert_eq!(error.kind, FailureKind::Validation);
    assert!(error.message.contains("components"));
    assert!(!error.message.contains("apiEndpoints"));
}

#[tokio::test]
async fn test_late_subscriber_sees_only_later_events() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let mut registry = base_registry();
    registry.insert(
        StageId::Schema,
        Arc::new(Gated {
            started: started.clone(),
            release: release.clone(),
        }),
    );
    let orchestrator = Arc::new(orchestrator(fast_config(), registry, FakeDeployer::new(true)));

    let handle = orchestrator
        .spawn_run("run-late", requirement(), RunOptions::default())
        .unwrap();

    started.notified().await;
    let mut subscription = orchestrator.broadcaster().subscribe("run-late");
    release.notify_one();

    let mut events = Vec::new();
    while let Some(event) = subscription.recv().await {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    let result = handle.join.await.unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Complete);
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e.stage >= PipelinePhase::GenerateSchema));
    assert_eq!(events.last().unwrap().stage, PipelinePhase::Complete);
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent_and_run_continues() {
    let orchestrator = orchestrator(fast_config(), base_registry(), FakeDeployer::new(true));
    let broadcaster = orchestrator.broadcaster().clone();

    let mut leaving = broadcaster.subscribe("run-leave");
    let dropped = broadcaster.subscribe("run-leave");
    drop(dropped);

    assert!(broadcaster.unsubscribe("run-leave", leaving.id));
    assert!(!broadcaster.unsubscribe("run-leave", leaving.id));

    let result = orchestrator
        .run("run-leave", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Complete);
    assert!(leaving.try_recv().is_none());
    assert_eq!(broadcaster.observer_count("run-leave"), 0);
}

#[tokio::test]
async fn test_deployment_failure_completes_without_success() {
    let store = Arc::new(MemoryRunStore::new());
    let orchestrator = orchestrator(fast_config(), base_registry(), FakeDeployer::new(false))
        .with_run_store(store.clone());

    let result = orchestrator
        .run("run-undeployed", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Complete);
    assert!(!result.success);
    assert!(result
        .errors
        .iter()
        .any(|e| e.stage == StageId::Deploy && e.kind == FailureKind::Deployment));
    assert!(store.updates("run-undeployed").is_empty());
}

#[tokio::test]
async fn test_deployer_error_is_recorded_once() {
    let orchestrator = orchestrator(
        fast_config(),
        base_registry(),
        Arc::new(UnreachableDeployer),
    );

    let result = orchestrator
        .run("run-offline", &requirement(), &RunOptions::minimal())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Complete);
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, StageId::Deploy);
    assert_eq!(result.errors[0].kind, FailureKind::Deployment);
    assert!(result.errors[0].message.contains("network down"));
}

#[tokio::test]
async fn test_run_store_updated_once_after_deployment() {
    let store = Arc::new(MemoryRunStore::new());
    let orchestrator = orchestrator(fast_config(), base_registry(), FakeDeployer::new(true))
        .with_run_store(store.clone());

    orchestrator
        .run("run-stored", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(
        store.updates("run-stored"),
        vec![RunStatusUpdate {
            status: RunStatus::Deployed,
            completion_percentage: 100,
        }]
    );
}

#[tokio::test]
async fn test_run_store_failure_keeps_success() {
    let orchestrator = orchestrator(fast_config(), base_registry(), FakeDeployer::new(true))
        .with_run_store(Arc::new(BrokenStore));

    let result = orchestrator
        .run("run-store-down", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("database is locked")));
}

#[tokio::test]
async fn test_invalid_run_id_rejected_before_any_event() {
    let deployer = FakeDeployer::new(true);
    let orchestrator = orchestrator(fast_config(), base_registry(), deployer.clone());
    let mut subscription = orchestrator.broadcaster().subscribe("bad id");

    let error = orchestrator
        .run("bad id", &requirement(), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(error, PipelineError::InvalidRunId { .. }));
    assert!(subscription.try_recv().is_none());
    assert_eq!(deployer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_metrics_count_core_categories() {
    let mut registry = base_registry();
    registry.insert(
        StageId::Ui,
        Arc::new(Fixed(artifacts(&[
            "App.tsx", "Nav.tsx", "Home.tsx", "Orders.tsx", "Order.tsx", "Login.tsx", "Admin.tsx",
        ]))),
    );
    registry.insert(
        StageId::Schema,
        Arc::new(Fixed(artifacts(&["orders.sql", "users.sql"]))),
    );
    let orchestrator = orchestrator(fast_config(), registry, FakeDeployer::new(true));

    let result = orchestrator
        .run("run-metrics", &requirement(), &RunOptions::minimal())
        .await
        .unwrap();

    assert_eq!(result.metrics.component_count, 7);
    assert_eq!(result.metrics.endpoint_count, 1);
    assert_eq!(result.metrics.schema_table_count, 2);
}

#[tokio::test]
async fn test_empty_dependency_skips_dependent_stage() {
    let workflow_ui = Arc::new(Counting {
        calls: AtomicUsize::new(0),
    });
    let mut registry = base_registry();
    registry.insert(StageId::Workflows, Arc::new(Fixed(ArtifactMap::new())));
    registry.insert(StageId::WorkflowUi, workflow_ui.clone());
    let orchestrator = orchestrator(fast_config(), registry, FakeDeployer::new(true));

    let result = orchestrator
        .run("run-deps", &requirement(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.final_stage, PipelinePhase::Complete);
    assert_eq!(workflow_ui.calls.load(Ordering::SeqCst), 0);
    let kinds: Vec<(StageId, FailureKind)> =
        result.errors.iter().map(|e| (e.stage, e.kind)).collect();
    assert!(kinds.contains(&(StageId::Workflows, FailureKind::NoArtifacts)));
    assert!(kinds.contains(&(StageId::WorkflowUi, FailureKind::DependencyUnavailable)));
}

#[tokio::test]
async fn test_disabled_stages_are_silent() {
    let orchestrator = orchestrator(fast_config(), base_registry(), FakeDeployer::new(true));

    let result = orchestrator
        .run("run-minimal", &requirement(), &RunOptions::minimal())
        .await
        .unwrap();

    assert!(result.errors.is_empty());
    let categories: Vec<&str> = result.artifacts.keys().map(String::as_str).collect();
    assert_eq!(
        categories,
        vec!["analysis", "apiEndpoints", "components", "databaseSchema"]
    );
}

#[tokio::test]
async fn test_start_run_assigns_fresh_ids() {
    let orchestrator = Arc::new(orchestrator(
        fast_config(),
        base_registry(),
        FakeDeployer::new(true),
    ));

    let first = orchestrator.start_run(requirement(), RunOptions::minimal());
    let second = orchestrator.start_run(requirement(), RunOptions::minimal());
    assert_ne!(first.run_id, second.run_id);

    let first_result = first.join.await.unwrap();
    let second_result = second.join.await.unwrap();
    assert_eq!(first_result.run_id, first.run_id);
    assert_eq!(second_result.final_stage, PipelinePhase::Complete);
}

#[tokio::test]
async fn test_scaffold_generators_end_to_end() {
    let out = tempfile::tempdir().unwrap();
    let config = fast_config();
    let orchestrator = orchestrator(
        config.clone(),
        GeneratorRegistry::scaffold(config.approval_thresholds),
        Arc::new(FilesystemDeployer::new(out.path())),
    );

    let mut requirement = Requirement::from_text("Procurement portal\nRaise and approve purchase orders.");
    requirement.forms.push(FormSpec {
        name: "Purchase order".to_string(),
        fields: vec![
            FormField {
                name: "vendor".to_string(),
                field_type: FieldType::Text,
                required: true,
            },
            FormField {
                name: "total".to_string(),
                field_type: FieldType::Currency,
                required: true,
            },
        ],
    });
    requirement.processes.push(BusinessProcess {
        name: "Procurement".to_string(),
        description: "Order to delivery".to_string(),
        steps: vec!["Request".to_string(), "Approve".to_string(), "Receive".to_string()],
        roles: vec!["buyer".to_string(), "manager".to_string()],
    });
    requirement.approvals.push(ApprovalSpec {
        name: "Quote approval".to_string(),
        approver_roles: vec!["manager".to_string(), "finance".to_string()],
        amount_field: Some("total".to_string()),
    });
    requirement.integrations.push(IntegrationSpec {
        system: "ledger".to_string(),
        purpose: "Post approved orders".to_string(),
    });

    let result = orchestrator
        .run("run-scaffold", &requirement, &RunOptions::default())
        .await
        .unwrap();

    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert!(result.success);
    assert!(result.artifacts[categories::WORKFLOWS].contains_key("quote-approval.workflow.json"));
    assert!(result.artifacts[categories::FORMS].contains_key("purchase-order.schema.json"));
    assert!(out
        .path()
        .join("local/run-scaffold/components/PurchaseOrderForm.tsx")
        .exists());
}
