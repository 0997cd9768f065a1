//! End-to-end tests of the guarded clone workflow and the restore command.
//!
//! Environment files live in a temporary directory; a connector hands out
//! in-memory stores keyed by URL and a scripted prompt plays the operator.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use async_trait::async_trait;
use envclone::{
    CloneRequest, Command, Context, GlobalArgs, SecureCloneWorkflow, WorkflowOutcome, execute,
    cli::{CloneArgs, ListArgs, PairArgs, RestoreArgs, VerifyArgs},
};
use envclone_core::{
    BackupManager, CloneOptions, EnvCloneError, EnvironmentLoader, EnvironmentValidator,
    SecurityLevel, SecurityManager, TableCatalog,
    config::EnvironmentConfig,
    security::ScriptedPrompt,
    store::{Connector, DataStore, MemoryStore, StoreCall, TableRules},
    verify::TableCount,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

#[derive(Default)]
struct UrlConnector {
    stores: HashMap<String, Arc<MemoryStore>>,
}

#[async_trait]
impl Connector for UrlConnector {
    async fn connect(&self, config: &EnvironmentConfig) -> envclone_core::Result<Arc<dyn DataStore>> {
        let store: Arc<dyn DataStore> = match self.stores.get(&config.url) {
            Some(store) => store.clone(),
            None => Arc::new(MemoryStore::new().offline()),
        };
        Ok(store)
    }
}

fn url(name: &str) -> String {
    format!("https://{}.example.co", name)
}

fn zones(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({"id": format!("z{}", i), "name": format!("Zone {}", i), "created_at": "2024-01-01T00:00:00Z"}))
        .collect()
}

fn source_store() -> MemoryStore {
    MemoryStore::new()
        .with_table("profiles", vec![json!({"id": "p1"})])
        .with_table("zone_areas", zones(3))
}

fn target_store() -> MemoryStore {
    MemoryStore::new()
        .with_table("profiles", vec![json!({"id": "p1"})])
        .with_table("zone_areas", vec![json!({"id": "stale", "name": "Stale"})])
        .with_rules("zone_areas", TableRules::with_columns(["id", "name"]))
}

struct Harness {
    dir: TempDir,
    stores: HashMap<String, Arc<MemoryStore>>,
}

impl Harness {
    fn new(environments: Vec<(&str, MemoryStore)>) -> Self {
        let dir = tempdir().unwrap();
        let mut stores = HashMap::new();
        for (name, store) in environments {
            std::fs::write(
                dir.path().join(format!(".env.{}", name)),
                format!(
                    "NEXT_PUBLIC_SUPABASE_URL={}\nSUPABASE_SERVICE_ROLE_KEY=service-secret\n",
                    url(name)
                ),
            )
            .unwrap();
            stores.insert(name.to_string(), Arc::new(store));
        }
        Self { dir, stores }
    }

    fn store(&self, name: &str) -> &Arc<MemoryStore> {
        &self.stores[name]
    }

    fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(UrlConnector {
            stores: self
                .stores
                .iter()
                .map(|(name, store)| (url(name), store.clone()))
                .collect(),
        })
    }

    fn backup_dir(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    fn audit_dir(&self) -> PathBuf {
        self.dir.path().join("audit")
    }

    fn workflow(&self, prompt: &Arc<ScriptedPrompt>) -> SecureCloneWorkflow {
        self.workflow_with_backups(prompt, &self.backup_dir())
    }

    fn workflow_with_backups(&self, prompt: &Arc<ScriptedPrompt>, backup_dir: &Path) -> SecureCloneWorkflow {
        let catalog = TableCatalog::builtin().unwrap();
        let loader = EnvironmentLoader::new(self.dir.path()).with_connector(self.connector());
        SecureCloneWorkflow::new(
            EnvironmentValidator::new(loader),
            SecurityManager::new(prompt.clone()),
            BackupManager::new(backup_dir, catalog.clone()),
            catalog,
            self.audit_dir(),
        )
    }

    fn global(&self) -> GlobalArgs {
        GlobalArgs {
            verbose: 0,
            quiet: true,
            config_dir: self.dir.path().to_path_buf(),
            backup_dir: self.backup_dir(),
        }
    }
}

fn request(source: &str, target: &str) -> CloneRequest {
    CloneRequest {
        source: source.to_string(),
        target: target.to_string(),
        options: CloneOptions::new().with_include_tables(vec!["zone_areas".to_string()]),
        force_backup: false,
    }
}

fn confirming_prompt() -> Arc<ScriptedPrompt> {
    Arc::new(ScriptedPrompt::new(["YES", "CONFIRM"]))
}

#[tokio::test]
async fn test_workflow_clones_and_writes_audit() {
    let harness = Harness::new(vec![("prod", source_store()), ("test", target_store())]);
    let prompt = confirming_prompt();

    let outcome = harness.workflow(&prompt).run(&request("prod", "test")).await.unwrap();
    let WorkflowOutcome::Completed { report, audit_path } = outcome else {
        unreachable!("workflow was confirmed");
    };

    assert!(report.confirmed);
    assert_eq!(report.security_level, SecurityLevel::Standard);
    assert_eq!(report.backup_id, None);
    assert_eq!(report.operation, "clone_prod_to_test");
    assert_eq!(report.total_records, 3);
    assert!(report.operation_id.starts_with("op_"));

    let rows = harness.store("test").rows("zone_areas");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| !row.contains_key("created_at")));

    assert_eq!(audit_path, harness.audit_dir().join(report.file_name()));
    let audit: Value = serde_json::from_str(&std::fs::read_to_string(&audit_path).unwrap()).unwrap();
    assert_eq!(audit["operationId"], json!(report.operation_id));
    assert_eq!(audit["securityLevel"], json!("STANDARD"));
    assert_eq!(audit["results"]["zone_areas"]["targetRecords"], json!(3));

    let verification = report.verification.as_ref().unwrap();
    assert!(verification.is_consistent());
    assert_eq!(verification.tables, vec![TableCount::new("zone_areas", 3, 3)]);
    assert_eq!(audit["verification"]["tables"][0]["sourceCount"], json!(3));
    assert_eq!(audit["verification"]["tables"][0]["difference"], json!(0));

    assert!(report.started_at <= report.completed_at);
    assert_eq!(audit["startedAt"], json!(report.started_at));
    assert_eq!(audit["completedAt"], json!(report.completed_at));

    // not protected, so no backup was taken
    assert!(!harness.backup_dir().exists());
    assert_eq!(prompt.remaining(), 0);
}

#[tokio::test]
async fn test_workflow_cancellation_touches_nothing() {
    for answers in [vec!["no"], vec!["YES", "confirm"], vec![]] {
        let harness = Harness::new(vec![("prod", source_store()), ("test", target_store())]);
        let prompt = Arc::new(ScriptedPrompt::new(answers));

        let outcome = harness.workflow(&prompt).run(&request("prod", "test")).await.unwrap();
        assert!(matches!(outcome, WorkflowOutcome::Cancelled));
        assert_eq!(harness.store("test").write_count(), 0);
        assert!(!harness.audit_dir().exists());
    }
}

#[tokio::test]
async fn test_workflow_rejects_forbidden_direction_before_prompting() {
    let harness = Harness::new(vec![("test", source_store()), ("prod", target_store())]);
    let prompt = confirming_prompt();

    let error = harness.workflow(&prompt).run(&request("test", "prod")).await.unwrap_err();
    assert!(matches!(error, EnvCloneError::Validation { .. }));
    assert!(prompt.transcript().is_empty());
    assert_eq!(harness.store("prod").write_count(), 0);
}

#[tokio::test]
async fn test_workflow_dry_run_skips_confirmation() {
    let harness = Harness::new(vec![("prod", source_store()), ("test", target_store())]);
    let prompt = Arc::new(ScriptedPrompt::new(Vec::<String>::new()));
    let mut dry = request("prod", "test");
    dry.options = dry.options.with_dry_run(true);

    let outcome = harness.workflow(&prompt).run(&dry).await.unwrap();
    let WorkflowOutcome::Completed { report, .. } = outcome else {
        unreachable!("dry runs are not gated");
    };
    assert!(report.dry_run);
    assert!(!report.confirmed);
    assert_eq!(report.total_records, 3);
    assert_eq!(harness.store("test").write_count(), 0);
    assert!(prompt.transcript().is_empty());
    assert!(report.verification.is_none());
}

#[tokio::test]
async fn test_workflow_backs_up_protected_target() {
    let harness = Harness::new(vec![("prod", source_store()), ("prod-eu", target_store())]);
    let prompt = confirming_prompt();

    let outcome = harness.workflow(&prompt).run(&request("prod", "prod-eu")).await.unwrap();
    let WorkflowOutcome::Completed { report, .. } = outcome else {
        unreachable!("workflow was confirmed");
    };

    assert_eq!(report.security_level, SecurityLevel::Critical);
    let backup_id = report.backup_id.clone().unwrap();
    assert!(backup_id.starts_with("backup_prod-eu_clone_prod_to_prod-eu_"));

    let manager = BackupManager::new(harness.backup_dir(), TableCatalog::builtin().unwrap());
    let document = manager.load_backup(&backup_id).await.unwrap();
    assert_eq!(document.data["zone_areas"].len(), 1);
    assert_eq!(document.data["zone_areas"][0]["id"], json!("stale"));

    // production banner shown before the questions
    assert!(prompt.transcript().iter().any(|line| line.contains("PRODUCTION ENVIRONMENT")));
}

#[tokio::test]
async fn test_workflow_aborts_when_required_backup_fails() {
    let harness = Harness::new(vec![("prod", source_store()), ("prod-eu", target_store())]);
    let blocked = harness.dir.path().join("not-a-directory");
    std::fs::write(&blocked, "occupied").unwrap();
    let prompt = confirming_prompt();

    let error = harness
        .workflow_with_backups(&prompt, &blocked)
        .run(&request("prod", "prod-eu"))
        .await
        .unwrap_err();
    assert!(matches!(error, EnvCloneError::Backup { .. }));
    assert_eq!(harness.store("prod-eu").write_count(), 0);
    assert_eq!(harness.store("prod-eu").rows("zone_areas").len(), 1);
}

#[tokio::test]
async fn test_workflow_forced_backup_on_unprotected_target() {
    let harness = Harness::new(vec![("prod", source_store()), ("test", target_store())]);
    let prompt = confirming_prompt();
    let mut forced = request("prod", "test");
    forced.force_backup = true;

    let outcome = harness.workflow(&prompt).run(&forced).await.unwrap();
    let WorkflowOutcome::Completed { report, .. } = outcome else {
        unreachable!("workflow was confirmed");
    };
    assert!(report.backup_id.is_some());
}

#[tokio::test]
async fn test_clone_command_exits_cleanly_on_cancellation() {
    let harness = Harness::new(vec![("prod", source_store()), ("test", target_store())]);
    let command = Command::Clone(CloneArgs {
        pair: PairArgs {
            source: "prod".to_string(),
            target: "test".to_string(),
        },
        dry_run: false,
        anonymize: false,
        include: Some("zone_areas".to_string()),
        exclude: None,
        batch_size: 50,
        no_adapt: false,
        backup: false,
        catalog: None,
        audit_dir: harness.audit_dir(),
    });
    let context = Context {
        prompt: Arc::new(ScriptedPrompt::new(["no"])),
        connector: Some(harness.connector()),
    };

    assert_eq!(execute(&command, &harness.global(), &context).await.unwrap(), 0);
    assert_eq!(harness.store("test").write_count(), 0);
    assert!(!harness.audit_dir().exists());
}

#[tokio::test]
async fn test_workflow_backs_up_tables_in_dependency_order() {
    let target = target_store()
        .with_table("lofts", vec![json!({"id": "l1"})])
        .with_table("tasks", vec![json!({"id": "t1", "loft_id": "l1"})]);
    let harness = Harness::new(vec![("prod", source_store()), ("prod-eu", target)]);
    let prompt = confirming_prompt();
    let mut out_of_order = request("prod", "prod-eu");
    out_of_order.options = CloneOptions::new().with_include_tables(vec![
        "tasks".to_string(),
        "lofts".to_string(),
        "zone_areas".to_string(),
    ]);

    let outcome = harness.workflow(&prompt).run(&out_of_order).await.unwrap();
    let WorkflowOutcome::Completed { report, .. } = outcome else {
        unreachable!("workflow was confirmed");
    };

    let manager = BackupManager::new(harness.backup_dir(), TableCatalog::builtin().unwrap());
    let document = manager.load_backup(&report.backup_id.unwrap()).await.unwrap();
    assert_eq!(document.metadata.tables, vec!["zone_areas", "lofts", "tasks"]);
    assert!(document.data.keys().map(String::as_str).eq(["zone_areas", "lofts", "tasks"]));
}

#[tokio::test]
async fn test_verify_command_compares_counts() {
    let harness = Harness::new(vec![
        ("prod", source_store()),
        ("test", target_store()),
        ("dev", source_store()),
    ]);
    let context = Context {
        prompt: Arc::new(ScriptedPrompt::new(Vec::<String>::new())),
        connector: Some(harness.connector()),
    };
    let verify = |target: &str| {
        Command::Verify(VerifyArgs {
            pair: PairArgs {
                source: "prod".to_string(),
                target: target.to_string(),
            },
            tables: Some("zone_areas,profiles".to_string()),
            catalog: None,
            json: false,
        })
    };

    // 3 zones against 1 stale row
    assert_eq!(execute(&verify("test"), &harness.global(), &context).await.unwrap(), 1);
    assert_eq!(execute(&verify("dev"), &harness.global(), &context).await.unwrap(), 0);

    // counting never writes and reads tables in dependency order
    let calls = harness.store("test").calls();
    assert_eq!(
        calls,
        vec![
            StoreCall::Count { table: "zone_areas".to_string() },
            StoreCall::Count { table: "profiles".to_string() },
        ]
    );
}

#[tokio::test]
async fn test_restore_command_requires_restore_keyword() {
    let harness = Harness::new(vec![("prod", source_store()), ("test", target_store())]);
    let manager = BackupManager::new(harness.backup_dir(), TableCatalog::builtin().unwrap());
    let loader = EnvironmentLoader::new(harness.dir.path()).with_connector(harness.connector());
    let prod = loader.load_environment("prod").await.unwrap();
    let backup = manager
        .create_backup(&prod, &["zone_areas".to_string()], "snapshot")
        .await
        .unwrap();

    let command = Command::Restore(RestoreArgs {
        backup_id: backup.backup_id.clone(),
        environment: "test".to_string(),
    });

    // the clone keyword does not authorize a restore
    let context = Context {
        prompt: Arc::new(ScriptedPrompt::new(["YES", "CONFIRM"])),
        connector: Some(harness.connector()),
    };
    assert_eq!(execute(&command, &harness.global(), &context).await.unwrap(), 0);
    assert_eq!(harness.store("test").write_count(), 0);

    let context = Context {
        prompt: Arc::new(ScriptedPrompt::new(["YES", "RESTORE"])),
        connector: Some(harness.connector()),
    };
    assert_eq!(execute(&command, &harness.global(), &context).await.unwrap(), 1);
    // zone_areas in the target rejects created_at, so the table fails
    assert_eq!(harness.store("test").rows("zone_areas").len(), 0);
}

#[tokio::test]
async fn test_backups_command_on_empty_ledger() {
    let harness = Harness::new(vec![]);
    let context = Context {
        prompt: Arc::new(ScriptedPrompt::new(Vec::<String>::new())),
        connector: None,
    };
    let code = execute(&Command::Backups(ListArgs { json: true }), &harness.global(), &context)
        .await
        .unwrap();
    assert_eq!(code, 0);
}
