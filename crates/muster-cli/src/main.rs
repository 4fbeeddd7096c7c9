use clap::{Parser, Subcommand};
use muster_bus::EventBus;
use muster_collab::{CollabConfig, CollaborationProtocol};
use muster_core::EventKind;
use muster_match::{Capability, CapabilityMatcher};
use muster_router::{RetryPolicy, TaskRouter, TaskSpec, TaskStatus};
use muster_team::{InMemoryWorkspaceStore, RoleMapping, TeamManager, TeamPlan, WorkspaceStore};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "muster", about = "Muster - agent team orchestration engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "muster.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a deployment config and report what it would build
    Check,
    /// Run a scripted routing round against the config
    Simulate,
}

#[derive(Deserialize)]
struct MusterConfig {
    #[serde(default)]
    capabilities: Vec<Capability>,
    #[serde(default)]
    roles: Vec<RoleMapping>,
    team: Option<TeamPlan>,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
    #[serde(default)]
    router: RetryPolicy,
    #[serde(default)]
    collab: CollabConfig,
}

struct Stack {
    bus: Arc<EventBus>,
    teams: Arc<TeamManager>,
    router: TaskRouter,
}

fn build_stack(config: &MusterConfig) -> Stack {
    let mut matcher = CapabilityMatcher::new();
    for capability in &config.capabilities {
        matcher.register_capability(capability.clone());
    }

    let bus = Arc::new(EventBus::new());
    let store: Arc<dyn WorkspaceStore> = Arc::new(InMemoryWorkspaceStore::new());
    let teams = Arc::new(TeamManager::new(Arc::clone(&bus), Arc::clone(&store)));
    let collab = Arc::new(CollaborationProtocol::new(
        Arc::clone(&bus),
        Arc::clone(&teams),
        store,
        config.collab.clone(),
    ));
    let router = TaskRouter::new(
        Arc::clone(&bus),
        Arc::new(matcher),
        Arc::clone(&teams),
        collab,
        config.router.clone(),
    );
    Stack { bus, teams, router }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config: MusterConfig = toml::from_str(&config_str)?;

    match cli.command {
        Commands::Check => check(config).await,
        Commands::Simulate => simulate(config).await,
    }
}

/// Build the whole stack from the config without routing anything, so a bad
/// deployment file fails here instead of in production.
async fn check(config: MusterConfig) -> anyhow::Result<()> {
    let stack = build_stack(&config);
    for role in &config.roles {
        stack.teams.register_role_mapping(role.clone()).await;
    }
    println!("Capabilities registered: {}", config.capabilities.len());
    println!("Role mappings registered: {}", config.roles.len());

    match &config.team {
        Some(plan) => {
            let team_id = stack.teams.form_team(plan).await?;
            let team = stack
                .teams
                .get_team(team_id)
                .await
                .ok_or_else(|| anyhow::anyhow!("team missing right after formation"))?;
            println!("Team '{}' forms with {} member(s):", team.name, team.members.len());
            for member in &team.members {
                println!(
                    "  {} as {} [{}]",
                    member.agent_id,
                    member.role_id,
                    member.capabilities.join(", ")
                );
            }
        }
        None => println!("No [team] section; skipping formation check."),
    }

    if !config.tasks.is_empty() {
        println!("Scenario tasks: {}", config.tasks.len());
    }
    println!("Config OK");
    Ok(())
}

/// Form the configured team, submit the scenario tasks, drive whatever got
/// assigned through a start/complete round, and report the queue afterwards.
async fn simulate(config: MusterConfig) -> anyhow::Result<()> {
    let Some(plan) = config.team.clone() else {
        anyhow::bail!("simulate needs a [team] section in the config");
    };
    let stack = build_stack(&config);
    for role in &config.roles {
        stack.teams.register_role_mapping(role.clone()).await;
    }

    // Mirror every bus event to stdout so the round is auditable.
    for kind in EventKind::ALL {
        stack.bus.subscribe(kind, |event| {
            println!("  event {}", serde_json::to_string(event)?);
            Ok(())
        });
    }

    let team_id = stack.teams.form_team(&plan).await?;
    info!(team_id = %team_id, project_id = %plan.project_id, "Team formed");

    let mut submitted = Vec::new();
    for spec in config.tasks.clone() {
        let label = spec.task_id.clone();
        let id = stack.router.submit(spec).await;
        submitted.push((id, label));
    }
    let swept = stack.router.rebalance().await;
    println!(
        "Submitted {} task(s); rebalance picked up {} leftover(s)",
        submitted.len(),
        swept
    );

    for (id, label) in &submitted {
        let Some(task) = stack.router.get_task(*id).await else {
            continue;
        };
        if task.status != TaskStatus::Assigned {
            continue;
        }
        let Some(agent) = task.assigned_agent_id else {
            continue;
        };
        stack.router.start(*id, &agent).await;
        stack
            .router
            .complete(*id, json!({"simulated": true, "task": label}))
            .await;
    }

    let status = stack.router.queue_status().await;
    println!("Queue after round: {}", serde_json::to_string_pretty(&status)?);

    if let Some(health) = stack.teams.team_health(team_id).await {
        println!("Team health: {health}");
    }
    for suggestion in stack.teams.recovery_suggestions(team_id).await {
        println!("  hint: {suggestion}");
    }
    Ok(())
}
