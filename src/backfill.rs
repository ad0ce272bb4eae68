//! Batch passes that recompute derived product fields.
//!
//! Every product is written in its own transaction, so stopping a run midway
//! keeps whatever was already committed. Dry runs roll each transaction back.

use anyhow::Result;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use tracing::{debug, info};

use crate::category::{ensure_category_path, normalize_product_category, ProductFields, RuleSet};
use crate::config::Settings;
use crate::db::{fetch_product_texts, immediate_transaction, ProductScope};
use crate::store::{DerivedFields, ProductStore, ProductText};
use crate::text::normalize::truncate_chars;
use crate::text::{clean_description_for_storage, generate_brief_description, BriefInput, CleanInput};

const PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub preview_limit: usize,
    pub chunk_size: usize,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        BackfillOptions {
            dry_run: false,
            limit: None,
            preview_limit: 20,
            chunk_size: 500,
        }
    }
}

impl BackfillOptions {
    pub fn from_settings(settings: &Settings, dry_run: bool, limit: Option<usize>) -> Self {
        BackfillOptions {
            dry_run,
            limit,
            preview_limit: settings.preview_limit,
            chunk_size: settings.chunk_size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    pub product_id: i64,
    pub name: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub mode: &'static str,
    pub scanned: usize,
    pub changed: usize,
    pub preview: Vec<PreviewRow>,
}

impl BackfillReport {
    fn new(dry_run: bool) -> Self {
        let started_at = Utc::now();
        BackfillReport {
            run_id: format!("run-{}", started_at.format("%Y%m%dT%H%M%S")),
            started_at,
            mode: if dry_run { "dry-run" } else { "write" },
            scanned: 0,
            changed: 0,
            preview: Vec::new(),
        }
    }

    fn record(&mut self, preview_limit: usize, product: &ProductText, before: &str, after: &str) {
        self.changed += 1;
        debug!(product_id = product.product_id, before, after, "product changed");
        if self.preview.len() < preview_limit {
            self.preview.push(PreviewRow {
                product_id: product.product_id,
                name: product.name.clone().unwrap_or_default(),
                before: truncate_chars(before, PREVIEW_CHARS).to_string(),
                after: truncate_chars(after, PREVIEW_CHARS).to_string(),
            });
        }
    }
}

/// A derived update for one product, plus the before/after shown in previews.
struct Change {
    before: String,
    after: String,
    fields: DerivedFields,
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn finish(tx: Transaction<'_>, dry_run: bool) -> Result<()> {
    if dry_run {
        tx.rollback()?;
    } else {
        tx.commit()?;
    }
    Ok(())
}

fn trimmed(value: Option<&str>) -> &str {
    value.map(str::trim).unwrap_or_default()
}

/// Derive in parallel chunk by chunk, then write changes one product at a time.
fn run_text_backfill<F>(conn: &Connection, pass: &str, options: &BackfillOptions, derive: F) -> Result<BackfillReport>
where
    F: Fn(&ProductText) -> Option<Change> + Sync,
{
    let mut report = BackfillReport::new(options.dry_run);
    let products = fetch_product_texts(conn, ProductScope::All, options.limit)?;
    info!(pass, run_id = %report.run_id, mode = report.mode, products = products.len(), "backfill started");

    let pb = progress_bar(products.len())?;
    for chunk in products.chunks(options.chunk_size.max(1)) {
        let changes: Vec<Option<Change>> = chunk.par_iter().map(&derive).collect();

        for (product, change) in chunk.iter().zip(changes) {
            report.scanned += 1;
            let Some(change) = change else {
                continue;
            };
            let tx = immediate_transaction(conn)?;
            tx.write_product_derived_fields(product.product_id, &change.fields)?;
            finish(tx, options.dry_run)?;
            report.record(options.preview_limit, product, &change.before, &change.after);
        }
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    info!(pass, run_id = %report.run_id, scanned = report.scanned, changed = report.changed, "backfill finished");
    Ok(report)
}

/// Resolve a target path per product and point the product at it, creating
/// missing categories on the way.
fn run_category_backfill<F>(
    conn: &Connection,
    pass: &str,
    options: &BackfillOptions,
    scope: ProductScope,
    target_path: F,
) -> Result<BackfillReport>
where
    F: Fn(&ProductText) -> String,
{
    let mut report = BackfillReport::new(options.dry_run);
    let products = fetch_product_texts(conn, scope, options.limit)?;
    info!(pass, run_id = %report.run_id, mode = report.mode, products = products.len(), "backfill started");

    let pb = progress_bar(products.len())?;
    for product in &products {
        report.scanned += 1;
        pb.inc(1);

        let target = target_path(product);
        let tx = immediate_transaction(conn)?;
        let Some(ensured) = ensure_category_path(&*tx, &target)? else {
            continue;
        };

        let current = trimmed(product.category.as_deref());
        if product.category_id == Some(ensured.category_id) && current == ensured.category_path {
            finish(tx, options.dry_run)?;
            continue;
        }

        tx.write_product_derived_fields(
            product.product_id,
            &DerivedFields {
                category: Some(ensured.category_path.clone()),
                category_id: Some(ensured.category_id),
                ..Default::default()
            },
        )?;
        finish(tx, options.dry_run)?;
        report.record(options.preview_limit, product, current, &ensured.category_path);
    }
    pb.finish_and_clear();

    info!(pass, run_id = %report.run_id, scanned = report.scanned, changed = report.changed, "backfill finished");
    Ok(report)
}

/// Link every product that has raw category text to the matching tree node.
pub fn backfill_categories(conn: &Connection, options: &BackfillOptions) -> Result<BackfillReport> {
    run_category_backfill(conn, "backfill-categories", options, ProductScope::WithRawCategory, |product| {
        product.category.clone().unwrap_or_default()
    })
}

/// Re-run the rule classifier over every product.
pub fn reassign_categories(conn: &Connection, options: &BackfillOptions, rules: &RuleSet) -> Result<BackfillReport> {
    run_category_backfill(conn, "reassign-categories", options, ProductScope::All, |product| {
        normalize_product_category(
            &ProductFields {
                name: product.name.as_deref(),
                category: product.category.as_deref(),
                description: product.description.as_deref(),
                html_description: product.html_description.as_deref(),
                brand: product.brand.as_deref(),
            },
            rules,
        )
    })
}

/// `description` becomes the cleaned text, `brief_description` its teaser.
pub fn clean_descriptions(conn: &Connection, options: &BackfillOptions, max_chars: usize) -> Result<BackfillReport> {
    run_text_backfill(conn, "clean-descriptions", options, |product| {
        let name = product.name.as_deref();
        let cleaned = clean_description_for_storage(&CleanInput {
            description: product.description.as_deref(),
            html_description: product.html_description.as_deref(),
            name,
            max_chars,
        })?;
        let brief = generate_brief_description(&BriefInput {
            description: Some(&cleaned),
            html_description: None,
            name,
        });

        let current = trimmed(product.description.as_deref());
        let current_brief = trimmed(product.brief_description.as_deref());
        if current == cleaned && current_brief == brief.as_deref().unwrap_or_default() {
            return None;
        }
        Some(Change {
            before: current.to_string(),
            after: cleaned.clone(),
            fields: DerivedFields {
                description: Some(cleaned),
                brief_description: brief,
                ..Default::default()
            },
        })
    })
}

/// `long_description` from the richest source, then a shorter `description`
/// cut from it and a brief from that.
pub fn backfill_long_descriptions(
    conn: &Connection,
    options: &BackfillOptions,
    long_max_chars: usize,
    short_max_chars: usize,
) -> Result<BackfillReport> {
    run_text_backfill(conn, "backfill-long", options, |product| {
        let name = product.name.as_deref();
        let current_long = trimmed(product.long_description.as_deref());
        let long = clean_description_for_storage(&CleanInput {
            description: if current_long.is_empty() {
                product.description.as_deref()
            } else {
                Some(current_long)
            },
            html_description: product.html_description.as_deref(),
            name,
            max_chars: long_max_chars,
        })?;
        let short = clean_description_for_storage(&CleanInput {
            description: Some(&long),
            html_description: None,
            name,
            max_chars: short_max_chars,
        });
        let brief = generate_brief_description(&BriefInput {
            description: short.as_deref(),
            html_description: None,
            name,
        });

        let unchanged = current_long == long
            && trimmed(product.description.as_deref()) == short.as_deref().unwrap_or_default()
            && trimmed(product.brief_description.as_deref()) == brief.as_deref().unwrap_or_default();
        if unchanged {
            return None;
        }
        Some(Change {
            before: current_long.to_string(),
            after: long.clone(),
            fields: DerivedFields {
                long_description: Some(long),
                description: short,
                brief_description: brief,
                ..Default::default()
            },
        })
    })
}

pub fn backfill_brief_descriptions(conn: &Connection, options: &BackfillOptions) -> Result<BackfillReport> {
    run_text_backfill(conn, "backfill-brief", options, |product| {
        let brief = generate_brief_description(&BriefInput {
            description: product.description.as_deref(),
            html_description: product.html_description.as_deref(),
            name: product.name.as_deref(),
        })?;
        let current = trimmed(product.brief_description.as_deref());
        if current == brief {
            return None;
        }
        Some(Change {
            before: current.to_string(),
            after: brief.clone(),
            fields: DerivedFields {
                brief_description: Some(brief),
                ..Default::default()
            },
        })
    })
}
