//! IntentON node - bootstrap a tree of identity-bound agent nodes

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intenton_node::{
    auth::{Action, AuthConfig},
    config::{Args, FileConfig},
    logging::EventLogger,
    orchestrator::{Manifest, NodeTree, TreeOptions},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let json = args.json_logs();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("intenton_node={},info", log_level).into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }
    let variant = args.policy_variant()?;

    let file = FileConfig::load_or_default(&args.config);
    let manifest = Manifest::load_or_default(&args.manifest);
    let azure = args.azure_settings(&file);

    let events = match &args.event_log {
        Some(path) => match EventLogger::with_file(path) {
            Ok(events) => events,
            Err(e) => {
                warn!("Cannot open event log {}: {}", path.display(), e);
                EventLogger::new()
            }
        },
        None => EventLogger::new(),
    };

    info!("======================================");
    info!("  IntentON node");
    info!("======================================");
    info!("Root domain: {}", args.root_domain());
    info!("Policy variant: {:?}", variant);
    info!(
        "Enterprise flow: {}",
        if azure.has_client_secret() { "service-to-service" } else { "interactive" }
    );
    info!(
        "Recursion: {} (max depth {}, {} child spec(s))",
        if manifest.recursive.enabled { "enabled" } else { "disabled" },
        manifest.recursive.max_depth,
        manifest.children.len()
    );
    if let Some(path) = events.path() {
        info!("Event log: {}", path.display());
    }
    info!("======================================");

    let auth = AuthConfig::new(azure, args.platform_env());
    let options = TreeOptions::new(variant)
        .with_manifest(manifest)
        .with_auth(auth)
        .with_events(events);

    let mut tree = NodeTree::new(args.root_domain(), options);
    let root = tree.root().clone();

    if !tree.initialize(&root).await {
        error!("Root node {} failed to initialize", root);
        std::process::exit(1);
    }

    let node = tree
        .node_mut(&root)
        .context("root node missing after initialization")?;
    let identity = node.identity().clone();
    let audit = node.policy_mut().check(Action::Audit);

    info!("Node initialized: {}", identity.agent_id);
    info!(
        "Platform identity: {}",
        identity.source_platform_identity.as_deref().unwrap_or("-")
    );
    info!(
        "Enterprise identity: {}",
        identity.enterprise_identity.as_deref().unwrap_or("-")
    );
    info!(
        "Roles: {}",
        identity
            .roles
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("Audit capability: {}", if audit { "enabled" } else { "disabled" });
    info!("Tree size: {} node(s)", tree.len());

    if args.print_tree {
        if let Some(summary) = tree.summary() {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
