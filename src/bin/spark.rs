//! Spark CLI — inspect and drive categorization automations.
//!
//! Usage:
//!   spark automation list --user <id> [--status pending] [--source ai] [--db path]
//!   spark automation approve <id> --user <id> [--db path]
//!   spark category list [--db path]

use clap::{Parser, Subcommand};
use spark::{
    AutomationEngine, AutomationFilter, AutomationSource, AutomationStatus, EngineError,
    EntityCatalog, OpenStore, SparkStore, SqliteStore, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "spark",
    version,
    about = "Categorization automation engine for the Spark knowledge base"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage automations
    Automation {
        #[command(subcommand)]
        action: AutomationAction,
        /// User the operations run as
        #[arg(long, global = true, default_value = "")]
        user: String,
        /// Path to SQLite database file
        #[arg(long, global = true)]
        db: Option<PathBuf>,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
        /// Path to SQLite database file
        #[arg(long, global = true)]
        db: Option<PathBuf>,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        action: TagAction,
        /// User whose tags to list
        #[arg(long, global = true, default_value = "")]
        user: String,
        /// Path to SQLite database file
        #[arg(long, global = true)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AutomationAction {
    /// List automations, optionally filtered
    List {
        /// Filter by status (pending, approved, rejected, reverted)
        #[arg(long)]
        status: Option<String>,
        /// Filter by source (ai, user, system)
        #[arg(long)]
        source: Option<String>,
    },
    /// Show one automation with its action log
    Show {
        /// Automation id
        id: String,
    },
    /// Approve a pending automation
    Approve {
        /// Automation id
        id: String,
    },
    /// Reject a pending automation
    Reject {
        /// Automation id
        id: String,
    },
    /// Revert an approved automation
    Revert {
        /// Automation id
        id: String,
    },
}

#[derive(Subcommand)]
enum CategoryAction {
    /// List all categories
    List,
    /// Delete a category and every association referencing it
    Delete {
        /// Category id
        id: String,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// List the user's tags
    List,
    /// Delete a tag and every association referencing it
    Delete {
        /// Tag id
        id: String,
    },
}

/// Get the default database path (~/.local/share/spark/spark.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let spark_dir = data_dir.join("spark");
    std::fs::create_dir_all(&spark_dir).ok();
    spark_dir.join("spark.db")
}

fn open_store(db: Option<PathBuf>) -> Result<Arc<SqliteStore>, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store =
        SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(store))
}

fn require_user(user: &str) -> Result<&str, String> {
    if user.is_empty() {
        Err("--user is required".to_string())
    } else {
        Ok(user)
    }
}

async fn cmd_automation_list(
    engine: &AutomationEngine,
    user: &str,
    status: Option<String>,
    source: Option<String>,
) -> i32 {
    let mut filter = AutomationFilter::new();
    if let Some(raw) = status {
        match raw.parse::<AutomationStatus>() {
            Ok(s) => filter = filter.with_status(s),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    if let Some(raw) = source {
        match raw.parse::<AutomationSource>() {
            Ok(s) => filter = filter.with_source(s),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }

    match engine.list_automations(user, filter).await {
        Ok(automations) => {
            if automations.is_empty() {
                println!("No automations.");
                return 0;
            }
            println!("{:<36}  {:<24}  {:<8}  {:<9}", "ID", "NAME", "SOURCE", "STATUS");
            println!("{}", "-".repeat(84));
            for a in automations {
                println!("{:<36}  {:<24}  {:<8}  {:<9}", a.id, a.name, a.source, a.status);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_automation_show(engine: &AutomationEngine, user: &str, id: &str) -> i32 {
    match engine.get_automation(user, id).await {
        Ok(Some(detail)) => {
            let a = &detail.automation;
            println!("{} ({})", a.name, a.id);
            println!("  source: {}   status: {}   created: {}", a.source, a.status, a.created_at);
            for action in &detail.actions {
                let when = action
                    .executed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  [{}] {:<15}  {:<9}  {}",
                    action.position,
                    action.data.kind_str(),
                    action.status,
                    when
                );
            }
            0
        }
        Ok(None) => {
            eprintln!("Error: automation '{}' not found", id);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_automation_approve(engine: &AutomationEngine, user: &str, id: &str) -> i32 {
    match engine.approve_automation(user, id).await {
        Ok(receipt) => {
            println!(
                "Approved automation {} ({} categories, {} tags created)",
                receipt.automation_id,
                receipt.created_categories.len(),
                receipt.created_tags.len()
            );
            0
        }
        Err(e) => report_engine_error(e),
    }
}

async fn cmd_automation_reject(engine: &AutomationEngine, user: &str, id: &str) -> i32 {
    match engine.reject_automation(user, id).await {
        Ok(()) => {
            println!("Rejected automation {}", id);
            0
        }
        Err(e) => report_engine_error(e),
    }
}

async fn cmd_automation_revert(engine: &AutomationEngine, user: &str, id: &str) -> i32 {
    match engine.revert_automation(user, id).await {
        Ok(report) => {
            println!(
                "Reverted automation {} ({} actions undone)",
                report.automation_id,
                report.reverted.len()
            );
            for skip in &report.skipped {
                println!("  skipped {}: {}", skip.action_id, skip.reason);
            }
            0
        }
        Err(e) => report_engine_error(e),
    }
}

async fn cmd_category_list(store: &SqliteStore) -> i32 {
    match store.list_categories().await {
        Ok(categories) => {
            if categories.is_empty() {
                println!("No categories.");
                return 0;
            }
            println!("{:<36}  {:<24}  {:<24}", "ID", "NAME", "SLUG");
            println!("{}", "-".repeat(88));
            for c in categories {
                println!("{:<36}  {:<24}  {:<24}", c.id, c.name, c.slug);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_category_delete(catalog: &EntityCatalog, id: &str) -> i32 {
    match catalog.delete_category(id).await {
        Ok(true) => {
            println!("Deleted category {}", id);
            0
        }
        Ok(false) => {
            eprintln!("Error: category '{}' not found", id);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_tag_delete(catalog: &EntityCatalog, id: &str) -> i32 {
    match catalog.delete_tag(id).await {
        Ok(true) => {
            println!("Deleted tag {}", id);
            0
        }
        Ok(false) => {
            eprintln!("Error: tag '{}' not found", id);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_tag_list(store: &SqliteStore, user: &str) -> i32 {
    match store.list_tags(user).await {
        Ok(tags) => {
            if tags.is_empty() {
                println!("No tags.");
                return 0;
            }
            println!("{:<36}  {:<24}", "ID", "NAME");
            println!("{}", "-".repeat(62));
            for t in tags {
                println!("{:<36}  {:<24}", t.id, t.name);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn report_engine_error(e: EngineError) -> i32 {
    eprintln!("Error: {}", e);
    1
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Automation { action, user, db } => {
            let user = match require_user(&user) {
                Ok(u) => u.to_string(),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            let engine = match open_store(db) {
                Ok(store) => AutomationEngine::new(store),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            match action {
                AutomationAction::List { status, source } => {
                    cmd_automation_list(&engine, &user, status, source).await
                }
                AutomationAction::Show { id } => cmd_automation_show(&engine, &user, &id).await,
                AutomationAction::Approve { id } => {
                    cmd_automation_approve(&engine, &user, &id).await
                }
                AutomationAction::Reject { id } => {
                    cmd_automation_reject(&engine, &user, &id).await
                }
                AutomationAction::Revert { id } => {
                    cmd_automation_revert(&engine, &user, &id).await
                }
            }
        }
        Commands::Category { action, db } => {
            let store = match open_store(db) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            match action {
                CategoryAction::List => cmd_category_list(&store).await,
                CategoryAction::Delete { id } => {
                    let catalog = EntityCatalog::new(store.clone(), Arc::new(SystemClock));
                    cmd_category_delete(&catalog, &id).await
                }
            }
        }
        Commands::Tag { action, user, db } => {
            let store = match open_store(db) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            match action {
                TagAction::List => {
                    let user = match require_user(&user) {
                        Ok(u) => u.to_string(),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            std::process::exit(1);
                        }
                    };
                    cmd_tag_list(&store, &user).await
                }
                TagAction::Delete { id } => {
                    let catalog = EntityCatalog::new(store.clone(), Arc::new(SystemClock));
                    cmd_tag_delete(&catalog, &id).await
                }
            }
        }
    };
    std::process::exit(code);
}
