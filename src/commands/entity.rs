//! Entity hierarchy CLI commands.

use std::sync::Arc;

use clap::{Args, Subcommand};
use futures::TryStreamExt;
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use crate::output::{self, OutputFormat};
use orgtree_core::config::AppConfig;
use orgtree_core::error::AppError;
use orgtree_core::types::PageRequest;
use orgtree_database::{PgTreeStore, TreeStore, UserDependents};
use orgtree_entity::node::{
    EntityFilter, EntityNode, EntityTreeNode, EntityType, IntegrityIssue, IntegrityProblem,
};
use orgtree_service::{CreateEntityRequest, HierarchyService, RequestContext, TreeService};

/// Arguments for entity commands
#[derive(Debug, Args)]
pub struct EntityArgs {
    /// Tenant that owns the entities
    #[arg(long)]
    pub tenant: Uuid,

    /// Acting user recorded in audit fields
    #[arg(long)]
    pub actor: Option<Uuid>,

    /// Entity subcommand
    #[command(subcommand)]
    pub command: EntityCommand,
}

/// Entity subcommands
#[derive(Debug, Subcommand)]
pub enum EntityCommand {
    /// Create a new entity
    Create {
        /// Entity name
        #[arg(short, long)]
        name: String,
        /// Entity type: generic, company, or department
        #[arg(short = 't', long = "type", default_value = "generic")]
        entity_type: String,
        /// Parent entity ID (omit for a root)
        #[arg(short, long)]
        parent: Option<Uuid>,
        /// Metadata as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,
    },
    /// Show one entity
    Get {
        /// Entity ID
        id: Uuid,
    },
    /// List entities with optional filters
    List {
        /// Only entities of this type
        #[arg(short = 't', long = "type")]
        entity_type: Option<String>,
        /// Only children of this entity
        #[arg(short, long)]
        parent: Option<Uuid>,
        /// Only root entities
        #[arg(long)]
        roots: bool,
        /// Case-insensitive name substring
        #[arg(short, long)]
        name: Option<String>,
        /// Deepest level to include
        #[arg(long)]
        max_level: Option<i32>,
        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: u64,
        /// Items per page
        #[arg(long, default_value = "25")]
        page_size: u64,
    },
    /// List the direct children of an entity
    Children {
        /// Entity ID
        id: Uuid,
    },
    /// Rename an entity and its descendants' paths
    Rename {
        /// Entity ID
        id: Uuid,
        /// New name
        #[arg(short, long)]
        name: String,
    },
    /// Move an entity under a new parent, or make it a root
    Move {
        /// Entity ID
        id: Uuid,
        /// New parent entity ID
        #[arg(short, long, conflicts_with = "root")]
        parent: Option<Uuid>,
        /// Make the entity a root
        #[arg(long)]
        root: bool,
    },
    /// Deactivate an entity with no active children or dependents
    Remove {
        /// Entity ID
        id: Uuid,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List the hierarchy in path order
    Hierarchy {
        /// Deepest level to include
        #[arg(long, allow_negative_numbers = true)]
        max_depth: Option<i32>,
    },
    /// Show the hierarchy as a tree
    Tree {
        /// Deepest level to include
        #[arg(long, allow_negative_numbers = true)]
        max_depth: Option<i32>,
    },
    /// Show the breadcrumb trail of an entity
    Ancestors {
        /// Entity ID
        id: Uuid,
    },
    /// Show entity counts and level figures
    Stats,
    /// Check stored paths and levels against the parent links
    Verify,
}

/// Entity display row
#[derive(Debug, Serialize, Tabled)]
struct EntityRow {
    /// Entity ID
    id: String,
    /// Name
    name: String,
    /// Type
    #[tabled(rename = "type")]
    entity_type: String,
    /// Path
    path: String,
    /// Level
    level: i32,
    /// Parent ID
    parent: String,
    /// Last update
    updated_at: String,
}

impl From<&EntityNode> for EntityRow {
    fn from(node: &EntityNode) -> Self {
        Self {
            id: node.id.to_string(),
            name: node.name.clone(),
            entity_type: node.entity_type.to_string(),
            path: node.path.clone(),
            level: node.level,
            parent: node
                .parent_id
                .map_or_else(|| "(root)".to_string(), |p| p.to_string()),
            updated_at: node.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Integrity issue display row
#[derive(Debug, Serialize, Tabled)]
struct IssueRow {
    /// Entity ID
    entity_id: String,
    /// Stored path
    path: String,
    /// Problem
    problem: String,
}

impl From<&IntegrityIssue> for IssueRow {
    fn from(issue: &IntegrityIssue) -> Self {
        let problem = match &issue.problem {
            IntegrityProblem::OrphanedParent { parent_id } => {
                format!("parent {parent_id} is missing or inactive")
            }
            IntegrityProblem::PathMismatch { expected } => format!("path should be '{expected}'"),
            IntegrityProblem::LevelMismatch { expected } => format!("level should be {expected}"),
            IntegrityProblem::Cycle => "entity is its own ancestor".to_string(),
        };
        Self {
            entity_id: issue.entity_id.to_string(),
            path: issue.path.clone(),
            problem,
        }
    }
}

/// Execute entity commands
pub async fn execute(
    args: &EntityArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let (hierarchy, trees) = build_services(&config).await?;
    let ctx = match args.actor {
        Some(actor) => RequestContext::new(actor),
        None => RequestContext::system(),
    };
    let tenant = args.tenant;

    match &args.command {
        EntityCommand::Create {
            name,
            entity_type,
            parent,
            metadata,
        } => {
            let mut req = CreateEntityRequest::new(name.clone(), entity_type.parse()?, *parent);
            if let Some(raw) = metadata {
                req.metadata = serde_json::from_str(raw)
                    .map_err(|e| AppError::validation(format!("Invalid metadata JSON: {e}")))?;
            }
            let node = hierarchy.create(&ctx, tenant, req).await?;
            print_node(&node, format);
        }
        EntityCommand::Get { id } => {
            let node = hierarchy.get(&ctx, tenant, *id).await?;
            print_node(&node, format);
        }
        EntityCommand::List {
            entity_type,
            parent,
            roots,
            name,
            max_level,
            page,
            page_size,
        } => {
            let filter = EntityFilter {
                entity_type: entity_type
                    .as_deref()
                    .map(str::parse::<EntityType>)
                    .transpose()?,
                parent_id: *parent,
                roots_only: *roots,
                name_contains: name.clone(),
                max_level: *max_level,
            };
            let page = PageRequest::new(*page, *page_size);
            let result = hierarchy.list(&ctx, tenant, &filter, &page).await?;

            match format {
                OutputFormat::Json => output::print_json(&result),
                OutputFormat::Table => {
                    print_nodes(&result.items, format);
                    println!(
                        "Page {}/{} ({} entities)",
                        result.page, result.total_pages, result.total_items
                    );
                }
            }
        }
        EntityCommand::Children { id } => {
            let children = hierarchy.children(&ctx, tenant, *id).await?;
            print_nodes(&children, format);
        }
        EntityCommand::Rename { id, name } => {
            let node = hierarchy.rename(&ctx, tenant, *id, name).await?;
            print_node(&node, format);
        }
        EntityCommand::Move { id, parent, root } => {
            if parent.is_none() && !root {
                return Err(AppError::validation(
                    "Specify a new parent with --parent or pass --root",
                ));
            }
            let node = hierarchy.move_entity(&ctx, tenant, *id, *parent).await?;
            print_node(&node, format);
        }
        EntityCommand::Remove { id, yes } => {
            let node = hierarchy.get(&ctx, tenant, *id).await?;
            if !yes {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!("Deactivate entity '{}'?", node.path))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {e}")))?;

                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let removed = hierarchy.remove(&ctx, tenant, *id).await?;
            output::print_success(&format!("Entity '{}' deactivated", removed.path));
        }
        EntityCommand::Hierarchy { max_depth } => {
            let nodes: Vec<EntityNode> = hierarchy
                .find_hierarchy(tenant, *max_depth)?
                .try_collect()
                .await?;
            print_nodes(&nodes, format);
        }
        EntityCommand::Tree { max_depth } => {
            let forest = trees.tree(&ctx, tenant, *max_depth).await?;
            match format {
                OutputFormat::Json => output::print_json(&forest),
                OutputFormat::Table => print_forest(&forest),
            }
        }
        EntityCommand::Ancestors { id } => {
            let chain = trees.ancestors(&ctx, tenant, *id).await?;
            print_nodes(&chain, format);
        }
        EntityCommand::Stats => {
            let stats = hierarchy.stats(&ctx, tenant).await?;
            match format {
                OutputFormat::Json => output::print_json(&stats),
                OutputFormat::Table => {
                    output::print_kv("Total entities", &stats.total.to_string());
                    let max_level = stats
                        .max_level
                        .map(|l| l.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    output::print_kv("Deepest level", &max_level);
                    for (kind, count) in &stats.count_by_type {
                        let avg = stats
                            .average_level_by_type
                            .get(kind)
                            .copied()
                            .unwrap_or_default();
                        output::print_kv(
                            kind.as_str(),
                            &format!("{count} (average level {avg:.2})"),
                        );
                    }
                }
            }
        }
        EntityCommand::Verify => {
            let issues = trees.verify(&ctx, tenant).await?;
            match format {
                OutputFormat::Json => output::print_json(&issues),
                OutputFormat::Table if issues.is_empty() => {
                    output::print_success("No integrity issues found");
                }
                OutputFormat::Table => {
                    let rows: Vec<IssueRow> = issues.iter().map(IssueRow::from).collect();
                    output::print_list(&rows, format);
                }
            }
        }
    }

    Ok(())
}

/// Wire the hierarchy services over PostgreSQL.
async fn build_services(
    config: &AppConfig,
) -> Result<(Arc<HierarchyService>, TreeService), AppError> {
    let db = super::connect(config).await?;
    db.ensure_schema().await?;
    let pool = db.into_pool();

    let store: Arc<dyn TreeStore> = Arc::new(PgTreeStore::new(pool.clone(), &config.hierarchy));
    let dependents = Arc::new(UserDependents::new(pool));
    let hierarchy = Arc::new(HierarchyService::new(
        store,
        dependents,
        config.hierarchy.clone(),
    ));
    let trees = TreeService::new(Arc::clone(&hierarchy));
    Ok((hierarchy, trees))
}

fn print_node(node: &EntityNode, format: OutputFormat) {
    match format {
        OutputFormat::Json => output::print_json(node),
        OutputFormat::Table => output::print_item(&EntityRow::from(node), format),
    }
}

fn print_nodes(nodes: &[EntityNode], format: OutputFormat) {
    match format {
        OutputFormat::Json => output::print_json(nodes),
        OutputFormat::Table => {
            let rows: Vec<EntityRow> = nodes.iter().map(EntityRow::from).collect();
            output::print_list(&rows, format);
        }
    }
}

/// Print a forest as an indented outline, walking it with an explicit stack.
fn print_forest(forest: &[EntityTreeNode]) {
    if forest.is_empty() {
        println!("No results found.");
        return;
    }
    let mut stack: Vec<(&EntityTreeNode, usize)> = forest.iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        println!("{}├── {} [{}]", "  ".repeat(depth), node.name, node.entity_type);
        stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
    }
}
