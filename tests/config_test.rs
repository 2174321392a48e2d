//! Settings, manifest and event-log file integration tests

use std::io::Write;

use intenton_node::{
    auth::PolicyVariant,
    config::{AzureArgs, AzureSettings, FileConfig},
    logging::{EventLogger, EventType, NodeEvent},
    orchestrator::{ChildSpec, Manifest},
    Domain, NodeError, NodeTree, TreeOptions,
};
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_yaml_settings() {
    let file = write_temp(
        r#"
azure:
  tenant_id: contoso-tenant
  client_id: 0000-app
"#,
    );

    let config = FileConfig::load(file.path()).unwrap();
    assert_eq!(config.azure.tenant_id.as_deref(), Some("contoso-tenant"));
    assert_eq!(config.azure.client_id.as_deref(), Some("0000-app"));

    let settings = AzureSettings::resolve(&config.azure, &AzureArgs::default());
    assert_eq!(settings.tenant_id.as_deref(), Some("contoso-tenant"));
    assert!(!settings.has_client_secret());
}

#[test]
fn test_environment_wins_over_yaml() {
    let file = write_temp("azure:\n  tenant_id: from-file\n  client_id: file-app\n");
    let config = FileConfig::load(file.path()).unwrap();

    let env = AzureArgs {
        azure_tenant_id: Some("from-env".into()),
        azure_client_id: None,
        azure_client_secret: Some("s3cret".into()),
    };
    let settings = AzureSettings::resolve(&config.azure, &env);
    assert_eq!(settings.tenant_id.as_deref(), Some("from-env"));
    assert_eq!(settings.client_id.as_deref(), Some("file-app"));
    assert!(settings.has_client_secret());
}

#[test]
fn test_missing_or_broken_settings_are_empty() {
    let missing = std::path::Path::new("/nonexistent/config.yaml");
    assert!(matches!(
        FileConfig::load(missing),
        Err(NodeError::ConfigUnavailable(_))
    ));
    assert_eq!(FileConfig::load_or_default(missing), FileConfig::default());

    let broken = write_temp("azure: [unterminated");
    assert!(matches!(
        FileConfig::load(broken.path()),
        Err(NodeError::ConfigUnavailable(_))
    ));
    assert_eq!(FileConfig::load_or_default(broken.path()), FileConfig::default());

    let empty = write_temp("");
    assert_eq!(FileConfig::load(empty.path()).unwrap(), FileConfig::default());
}

#[test]
fn test_load_manifest_file() {
    let file = write_temp(
        r#"{
  "recursive": { "enabled": true, "max_depth": 2 },
  "children": [ { "domain": "Business" }, {} ]
}"#,
    );

    let manifest = Manifest::load(file.path()).unwrap();
    assert!(manifest.recursive.enabled);
    assert_eq!(manifest.recursive.max_depth, 2);
    assert_eq!(
        manifest.children,
        vec![ChildSpec::new("Business"), ChildSpec::same_domain()]
    );

    let broken = write_temp("{ not json");
    assert_eq!(Manifest::load_or_default(broken.path()), Manifest::default());
}

#[tokio::test]
async fn test_manifest_file_drives_tree() {
    let file = write_temp(
        r#"{"recursive":{"enabled":true,"max_depth":1},"children":[{"domain":"Business"}]}"#,
    );
    let manifest = Manifest::load_or_default(file.path());

    let mut tree = NodeTree::new(
        Domain::Family,
        TreeOptions::new(PolicyVariant::Extended).with_manifest(manifest),
    );
    let root = tree.root().clone();
    assert!(tree.initialize(&root).await);
    assert_eq!(tree.len(), 2);
}

#[tokio::test]
async fn test_event_log_file_receives_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let events = EventLogger::with_file(&path).unwrap();

    let mut tree = NodeTree::new(
        Domain::Personal,
        TreeOptions::new(PolicyVariant::Extended)
            .with_manifest(Manifest::recursive(1, vec![ChildSpec::new("Business")]))
            .with_events(events.clone()),
    );
    let root = tree.root().clone();
    assert!(tree.initialize(&root).await);

    let raw = std::fs::read_to_string(&path).unwrap();
    let logged: Vec<NodeEvent> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(logged.len(), events.events().len());
    assert_eq!(logged[0].event_type, EventType::NodeCreated);
    assert_eq!(logged[0].agent_id, root);
    assert!(logged
        .iter()
        .any(|e| e.event_type == EventType::ChildSpawned && e.agent_id == root));
    assert_eq!(
        logged.last().map(|e| e.event_type),
        Some(EventType::NodeInitialized)
    );
}
