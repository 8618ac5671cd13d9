//! `pods` subcommand: list the Pods controlled by an object

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use k8s_openapi::api::core::v1::Pod;

use controlled_pods::cluster;
use controlled_pods::config::{Config, ConfigLoader, parse_namespace};
use controlled_pods::identity::controller_ref_of;

/// Output format for the pod list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

/// Arguments of the `pods` subcommand
#[derive(Args, Debug)]
pub struct PodsArgs {
    /// Name of the controlling object
    pub name: String,

    /// Kind of the controlling object
    #[arg(long, short = 'k', default_value = "Deployment")]
    pub kind: String,

    /// API version of the controlling object
    #[arg(long, default_value = "apps/v1")]
    pub api_version: String,

    /// Namespace of the object; also limits the Pod and ReplicaSet watches
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Seconds to wait for the caches to sync (overrides configuration)
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Resolve and print the Pods controlled by the requested object
pub async fn handle_pods_command(args: PodsArgs, mut config: Config) -> Result<()> {
    if let Some(namespace) = &args.namespace {
        config.namespace = parse_namespace(namespace);
    }
    if let Some(timeout) = args.timeout {
        config.sync_timeout_secs = timeout;
    }
    ConfigLoader::validate(&config)?;

    let client = cluster::create_client().await?;

    let target = cluster::fetch_object(
        &client,
        &args.api_version,
        &args.kind,
        config.namespace.as_deref(),
        &args.name,
    )
    .await?;

    let indexer = cluster::start_indexer(&client, &config)?;
    tracing::debug!("Waiting up to {}s for caches to sync", config.sync_timeout_secs);
    if !indexer
        .wait_for_cache_sync(tokio::time::sleep(config.sync_timeout()))
        .await
    {
        anyhow::bail!(
            "Pod and ReplicaSet caches did not sync within {}s",
            config.sync_timeout_secs
        );
    }

    let pods = indexer
        .pods_controlled_by(&target)
        .with_context(|| format!("Cannot list pods of {} {}", args.kind, args.name))?;

    let rendered = render(&pods, args.output)?;
    print!("{}", rendered);
    Ok(())
}

fn render(pods: &[Arc<Pod>], output: OutputFormat) -> Result<String> {
    let plain: Vec<&Pod> = pods.iter().map(|pod| pod.as_ref()).collect();
    match output {
        OutputFormat::Table => Ok(render_table(pods)),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&plain).context("Failed to serialize pods")?;
            Ok(format!("{}\n", json))
        }
        OutputFormat::Yaml => serde_yaml::to_string(&plain).context("Failed to serialize pods"),
    }
}

const HEADERS: [&str; 5] = ["NAMESPACE", "NAME", "PHASE", "NODE", "CONTROLLER"];

/// Render pods as an aligned, kubectl-style table
pub fn render_table(pods: &[Arc<Pod>]) -> String {
    if pods.is_empty() {
        return "No pods found.\n".to_string();
    }

    let rows: Vec<[String; 5]> = pods.iter().map(|pod| table_row(pod)).collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header = HEADERS.map(str::to_string);
    for row in std::iter::once(&header).chain(&rows) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("   ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn table_row(pod: &Pod) -> [String; 5] {
    let or_dash = |value: Option<&str>| value.unwrap_or("-").to_string();
    let controller = controller_ref_of(pod)
        .map(|c| format!("{}/{}", c.kind, c.name))
        .unwrap_or_else(|| "-".to_string());
    [
        or_dash(pod.metadata.namespace.as_deref()),
        or_dash(pod.metadata.name.as_deref()),
        or_dash(pod.status.as_ref().and_then(|s| s.phase.as_deref())),
        or_dash(pod.spec.as_ref().and_then(|s| s.node_name.as_deref())),
        controller,
    ]
}
