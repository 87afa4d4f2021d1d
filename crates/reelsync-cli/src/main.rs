// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use reelsync_application::{
    preferences_from_config, slugify, AppState, DownloadPlan, StaticIndexer,
};
use reelsync_config::load as load_config;
use reelsync_domain::{Source, SourcePreferences, SourceType};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Index a metadata dump for a source and print the download plan of every item.
#[derive(Parser, Debug)]
#[command(name = "reelsync", version, about, long_about = None)]
struct CliArgs {
    /// Metadata dump from the indexer: a single item or a (nested) playlist
    metadata_path: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source type: 'channel' or 'playlist'
    #[arg(long = "type", value_parser = SourceType::from_str, default_value = "channel")]
    source_type: SourceType,

    /// Source key, defaults to the dump's id or the file stem
    #[arg(long)]
    key: Option<String>,

    /// Source name, defaults to the dump's title or the key
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = load_config(args.config.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    let state = AppState::in_memory(config);
    state.on_start();

    tokio::select! {
        result = run(&state, &args) => result,
        _ = tokio::signal::ctrl_c() => {
            info!(target: "cli", "interrupted");
            Ok(())
        }
    }
}

fn init_tracing(default_level: &str) {
    let fmt_layer = fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// A dump of a single item is treated as a one-entry playlist.
fn as_index_response(dump: Value) -> Value {
    if dump.get("entries").is_some() {
        dump
    } else {
        json!({ "entries": [dump] })
    }
}

fn build_source(args: &CliArgs, dump: &Value, preferences: SourcePreferences) -> Source {
    let file_stem = args
        .metadata_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    let key = args
        .key
        .clone()
        .or_else(|| dump["id"].as_str().map(str::to_string))
        .unwrap_or(file_stem);
    let name = args
        .name
        .clone()
        .or_else(|| dump["title"].as_str().map(str::to_string))
        .unwrap_or_else(|| key.clone());
    let directory = match slugify(&name) {
        slug if slug.is_empty() => slugify(&key),
        slug => slug,
    };
    Source::new(args.source_type, key, name, directory).with_preferences(preferences)
}

fn read_dump(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading metadata dump {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing metadata dump {}", path.display()))
}

async fn run(state: &AppState, args: &CliArgs) -> Result<()> {
    let dump = read_dump(&args.metadata_path)?;
    let preferences = preferences_from_config(&state.config.source_defaults)?;
    let source = build_source(args, &dump, preferences);
    let source = state.catalog.add_source(source).await?;

    let indexer = StaticIndexer::new(as_index_response(dump));
    let summary = state.catalog.index_source(source.id, &indexer).await?;
    info!(
        target: "cli",
        source = %source.name,
        format = %source.preferences.format_summary(),
        created = summary.created,
        downloadable = summary.downloadable,
        "metadata indexed"
    );

    let mut plans = Vec::new();
    for media in state.catalog.list_media(source.id).await? {
        let plan = state.catalog.plan_download(media.id).await?;
        match &plan {
            DownloadPlan::Ready(request) => info!(
                target: "cli",
                key = %media.key,
                format = %request.format_string,
                exact = request.matched_exactly,
                path = %request.file_path.display(),
                "download planned"
            ),
            DownloadPlan::Undownloadable => {
                warn!(target: "cli", key = %media.key, "no viable format")
            }
        }
        let metadata = media.metadata_view(source.source_type);
        plans.push(json!({
            "key": media.key,
            "name": media.name(source.source_type),
            "duration": metadata.duration_formatted(),
            "plan": plan,
        }));
    }

    let source = state.catalog.source(source.id).await?;
    let report = json!({
        "source": source.key,
        "next_index_due": source.next_index_due(),
        "summary": summary,
        "plans": plans,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
