//! `tablesync` - load Notion databases into the local snapshot cache.
//!
//! Usage: `tablesync [--sequential] [--strict] [--page <id>]... <database-id>...`
//!
//! Configuration comes from the environment (a `.env` file is read when present):
//! `NOTION_API_KEY`, `NOTION_VERSION`, `NOTION_API_URL`, `NOTION_TIMEOUT_SECS`,
//! `TABLESYNC_DB_PATH` (default `tablesync.db`) and `TABLESYNC_FILTER` (JSON filter
//! applied to every database).

use std::sync::Arc;

use anyhow::{bail, Context};
use log::{info, warn};
use serde_json::Value;

use tablesync_core::sync::{
    fetch_record, CancelSignal, CoordinatorOptions, DataSource, PostProcessPolicy,
    PropertiesDeserializer, ProgressNotifier, SyncCoordinator, SyncMode, TableRegistration,
    TableSynchronizer,
};
use tablesync_core::{PersistentSnapshotStore, TypedCache};
use tablesync_notion::{NotionClient, NotionConfig};
use tablesync_storage_sqlite::SqliteKeyValueStore;

const DEFAULT_DB_PATH: &str = "tablesync.db";

#[derive(Debug, Default)]
struct Args {
    databases: Vec<String>,
    pages: Vec<String>,
    options: CoordinatorOptions,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sequential" => parsed.options.mode = SyncMode::Sequential,
            "--strict" => parsed.options.post_process = PostProcessPolicy::AllOrNothing,
            "--page" => {
                let id = args.next().context("--page needs a page id")?;
                parsed.pages.push(id);
            }
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ => parsed.databases.push(arg),
        }
    }
    if parsed.databases.is_empty() && parsed.pages.is_empty() {
        bail!("usage: tablesync [--sequential] [--strict] [--page <id>]... <database-id>...");
    }
    Ok(parsed)
}

fn db_path() -> String {
    std::env::var("TABLESYNC_DB_PATH")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
}

fn filter_from_env() -> anyhow::Result<Option<Value>> {
    match std::env::var("TABLESYNC_FILTER") {
        Ok(raw) if !raw.trim().is_empty() => {
            let filter = serde_json::from_str(&raw).context("TABLESYNC_FILTER is not valid JSON")?;
            Ok(Some(filter))
        }
        _ => Ok(None),
    }
}

/// Reports load progress through the log.
struct LogProgress;

impl ProgressNotifier for LogProgress {
    fn start(&self) {
        info!("[Load] Started");
    }

    fn update(&self, ratio: f32) {
        info!("[Load] {:.0}%", ratio * 100.0);
    }

    fn end(&self) {
        info!("[Load] Finished");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = NotionConfig::from_env().context("Notion configuration")?;
    let filter = filter_from_env()?;

    let path = db_path();
    let store = SqliteKeyValueStore::open(&path)
        .with_context(|| format!("opening snapshot database {}", path))?;

    let api = Arc::new(NotionClient::new(config));
    let cache = Arc::new(TypedCache::new());
    let synchronizer = TableSynchronizer::new(
        api.clone(),
        Arc::clone(&cache),
        PersistentSnapshotStore::new(Arc::new(store)),
    );

    let cancel = CancelSignal::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling load");
            on_ctrl_c.cancel();
        }
    });

    let mut coordinator = SyncCoordinator::new(synchronizer).with_options(args.options);
    for id in &args.databases {
        let mut source = DataSource::new(id.clone());
        if let Some(filter) = &filter {
            source = source.with_filter(filter.clone());
        }
        let label = id.clone();
        coordinator.register(TableRegistration::new(source, PropertiesDeserializer).on_loaded(
            move |records| info!("[Load] {} ready with {} records", label, records.len()),
        ));
    }

    let report = coordinator.run(&LogProgress, &cancel).await;
    if report.cancelled {
        bail!("load cancelled");
    }

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => println!(
                "{}\t{} records\t{}{}",
                outcome.source_id,
                summary.count,
                summary.origin.as_str(),
                if summary.page_errors.is_empty() {
                    String::new()
                } else {
                    format!("\t{} malformed page(s)", summary.page_errors.len())
                }
            ),
            Err(err) => println!("{}\tfailed\t{}", outcome.source_id, err),
        }
    }

    for page_id in &args.pages {
        match fetch_record(api.as_ref(), &cache, page_id, &PropertiesDeserializer, true).await {
            Ok(Some(properties)) => println!(
                "{}\t{}",
                page_id,
                serde_json::to_string(properties.as_ref())?
            ),
            Ok(None) => println!("{}\tno properties", page_id),
            Err(err) => println!("{}\tfailed\t{}", page_id, err),
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{} of {} database(s) failed to load", failed, report.outcomes.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_flags_and_ids() {
        let parsed = args(&["--sequential", "db-1", "--strict", "--page", "p-1", "db-2"]).unwrap();
        assert_eq!(parsed.databases, vec!["db-1", "db-2"]);
        assert_eq!(parsed.pages, vec!["p-1"]);
        assert_eq!(parsed.options.mode, SyncMode::Sequential);
        assert_eq!(parsed.options.post_process, PostProcessPolicy::AllOrNothing);
    }

    #[test]
    fn rejects_missing_ids_and_unknown_flags() {
        assert!(args(&[]).is_err());
        assert!(args(&["--verbose", "db-1"]).is_err());
        assert!(args(&["--page"]).is_err());
    }
}
