use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

use camp_catalog::backfill::{self, BackfillOptions, BackfillReport};
use camp_catalog::category::{self, CategoryChange, CategoryNode, ProductFields};
use camp_catalog::config::Settings;
use camp_catalog::db;

#[derive(Parser)]
#[command(name = "camp_catalog", about = "Camping catalog taxonomy and description maintenance")]
struct Cli {
    /// SQLite database (overrides CAMP_DB_PATH / config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// JSON rule file replacing the built-in category rules
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BatchArgs {
    /// Report what would change without writing
    #[arg(long)]
    dry_run: bool,
    /// Max products to scan (default: all)
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Print the canonical category path for product text
    Classify {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        html: Option<String>,
        #[arg(long)]
        brand: Option<String>,
    },
    /// Create any missing categories along a path ("A > B > C")
    EnsurePath { path: String },
    /// Show the category tree
    Tree,
    /// List all categories
    Categories,
    /// List a category and every category below it
    Descendants { id: i64 },
    /// Recompute path, level and slug for every category
    Rebuild,
    /// Add a category
    AddCategory {
        name: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Rename and/or move a category
    UpdateCategory {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "root")]
        parent: Option<i64>,
        /// Move to the top level
        #[arg(long)]
        root: bool,
    },
    /// Delete an empty leaf category
    DeleteCategory { id: i64 },
    /// Print a product's description sections as JSON
    Sections { product_id: i64 },
    /// Link products to categories from their raw category text
    BackfillCategories {
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Reclassify every product with the category rules
    ReassignCategories {
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Clean stored descriptions and regenerate briefs
    CleanDescriptions {
        #[arg(long)]
        max_chars: Option<usize>,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Derive long descriptions, short descriptions and briefs
    BackfillLong {
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Regenerate brief descriptions
    BackfillBrief {
        #[command(flatten)]
        batch: BatchArgs,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load().context("loading settings")?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if let Some(rules) = cli.rules {
        settings.rules_path = Some(rules);
    }

    let result = run(cli.command, &settings);

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run(command: Commands, settings: &Settings) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            open_db(&settings.db_path)?;
            println!("Schema ready at {}", settings.db_path.display());
        }
        Commands::Classify {
            name,
            category,
            description,
            html,
            brand,
        } => {
            let rules = settings.load_rules()?;
            let path = category::normalize_product_category(
                &ProductFields {
                    name: name.as_deref(),
                    category: category.as_deref(),
                    description: description.as_deref(),
                    html_description: html.as_deref(),
                    brand: brand.as_deref(),
                },
                &rules,
            );
            println!("{}", path);
        }
        Commands::EnsurePath { path } => {
            let conn = open_db(&settings.db_path)?;
            let tx = db::immediate_transaction(&conn)?;
            let ensured = category::ensure_category_path(&*tx, &path)?;
            tx.commit()?;
            match ensured {
                Some(e) => println!("{} | {}", e.category_id, e.category_path),
                None => println!("Empty category path, nothing created."),
            }
        }
        Commands::Tree => {
            let conn = open_db(&settings.db_path)?;
            let tree = category::category_tree(&conn)?;
            if tree.is_empty() {
                println!("No categories.");
            }
            print_tree(&tree, 0);
        }
        Commands::Categories => {
            let conn = open_db(&settings.db_path)?;
            let rows = category::all_categories(&conn)?;
            if rows.is_empty() {
                println!("No categories.");
                return Ok(());
            }
            println!("{:>5} | {:>6} | {:>5} | {:<24} | {}", "id", "parent", "level", "slug", "path");
            println!("{}", "-".repeat(80));
            for c in &rows {
                let parent = c.parent_id.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:>5} | {:>6} | {:>5} | {:<24} | {}",
                    c.category_id,
                    parent,
                    c.level,
                    truncate(&c.slug, 24),
                    c.path
                );
            }
            println!("\n{} categories", rows.len());
        }
        Commands::Descendants { id } => {
            let conn = open_db(&settings.db_path)?;
            let ids = category::descendant_category_ids(&conn, id)?;
            if ids.is_empty() {
                println!("Category {} not found.", id);
                return Ok(());
            }
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            println!("{}", ids.join(", "));
        }
        Commands::Rebuild => {
            let conn = open_db(&settings.db_path)?;
            let tx = db::immediate_transaction(&conn)?;
            let summary = category::rebuild_category_metadata(&*tx)?;
            tx.commit()?;
            println!(
                "Rebuilt {} categories: {} updated, {} isolated.",
                summary.total, summary.updated, summary.isolated
            );
        }
        Commands::AddCategory { name, parent } => {
            let conn = open_db(&settings.db_path)?;
            let id = category::create_category(&conn, &name, parent)?;
            println!("Created category {}.", id);
        }
        Commands::UpdateCategory {
            id,
            name,
            parent,
            root,
        } => {
            let conn = open_db(&settings.db_path)?;
            let change = CategoryChange {
                name,
                parent: if root { Some(None) } else { parent.map(Some) },
            };
            let updated = category::update_category(&conn, id, &change)?;
            println!("{} | {}", updated.category_id, updated.path);
        }
        Commands::DeleteCategory { id } => {
            let conn = open_db(&settings.db_path)?;
            category::delete_category(&conn, id)?;
            println!("Deleted category {}.", id);
        }
        Commands::Sections { product_id } => {
            let conn = open_db(&settings.db_path)?;
            match db::product_sections(&conn, product_id)? {
                Some(sections) => println!("{}", serde_json::to_string_pretty(&sections)?),
                None => println!("Product {} not found.", product_id),
            }
        }
        Commands::BackfillCategories { batch } => {
            let conn = open_db(&settings.db_path)?;
            let report = backfill::backfill_categories(&conn, &batch_options(settings, &batch))?;
            print_report(&report)?;
        }
        Commands::ReassignCategories { batch } => {
            let conn = open_db(&settings.db_path)?;
            let rules = settings.load_rules()?;
            let report = backfill::reassign_categories(&conn, &batch_options(settings, &batch), &rules)?;
            print_report(&report)?;
        }
        Commands::CleanDescriptions { max_chars, batch } => {
            let conn = open_db(&settings.db_path)?;
            let max_chars = max_chars.unwrap_or(settings.description_max_chars);
            let report = backfill::clean_descriptions(&conn, &batch_options(settings, &batch), max_chars)?;
            print_report(&report)?;
        }
        Commands::BackfillLong { batch } => {
            let conn = open_db(&settings.db_path)?;
            let report = backfill::backfill_long_descriptions(
                &conn,
                &batch_options(settings, &batch),
                settings.long_description_max_chars,
                settings.short_description_max_chars,
            )?;
            print_report(&report)?;
        }
        Commands::BackfillBrief { batch } => {
            let conn = open_db(&settings.db_path)?;
            let report = backfill::backfill_brief_descriptions(&conn, &batch_options(settings, &batch))?;
            print_report(&report)?;
        }
    }
    Ok(())
}

fn open_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let conn = db::connect(path).with_context(|| format!("opening {}", path.display()))?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn batch_options(settings: &Settings, batch: &BatchArgs) -> BackfillOptions {
    BackfillOptions::from_settings(settings, batch.dry_run, batch.limit)
}

fn print_report(report: &BackfillReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn print_tree(nodes: &[CategoryNode], depth: usize) {
    for node in nodes {
        println!(
            "{}{} [{}]",
            "  ".repeat(depth),
            node.category.name,
            node.category.category_id
        );
        print_tree(&node.children, depth + 1);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
