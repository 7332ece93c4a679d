//! Samples host metrics plus random demo values into InfluxDB.
//!
//! ```text
//! cargo run --example sample_importer -- --database Sample_Database --interval 1s
//! ```

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use metrics_importer::{sampler::producer, ImporterConfig, Pipeline, Producer, Sample};
use rand::Rng;
use sysinfo::System;

#[derive(Debug, Parser)]
#[command(about = "Import sampled metrics into InfluxDB")]
struct Args {
    /// TOML configuration file; command line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Time between samples, e.g. `1s` or `500ms`
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Extra tag attached to every point, `key=value`
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// Fail instead of dropping batches the server keeps refusing
    #[arg(long)]
    strict: bool,
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    Ok((key.to_owned(), value.to_owned()))
}

fn load_config(args: Args) -> Result<ImporterConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ImporterConfig::from_toml_str(&text)?
        }
        None => ImporterConfig {
            database: "Sample_Database".into(),
            ..ImporterConfig::default()
        },
    };
    if config.tags.is_empty() {
        config
            .tags
            .insert("Sample_Tag".into(), "Sample_Tag_Value".into());
    }
    if let Some(database) = args.database {
        config.database = database;
    }
    if let Some(host) = args.host {
        config.influx.host = host;
    }
    if let Some(port) = args.port {
        config.influx.port = port;
    }
    if let Some(username) = args.username {
        config.influx.username = username;
    }
    if let Some(password) = args.password {
        config.influx.password = password;
    }
    if let Some(interval) = args.interval {
        config.sample_interval = interval;
    }
    config.tags.extend(args.tags);
    if args.strict {
        config.ignore_errors = false;
    }
    config.validate()?;
    Ok(config)
}

fn producers() -> Vec<Producer> {
    let mut sys = System::new_all();
    let host = producer(move || {
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Ok(Sample::new("host")
            .field("cpu_usage", sys.global_cpu_usage())
            .field("used_memory", sys.used_memory() as i64)
            .field("total_memory", sys.total_memory() as i64))
    });
    let random = producer(|| {
        let mut rng = rand::thread_rng();
        Ok(Sample::new("sample_measurement")
            .field("low_val", rng.gen_range(10..50_i64))
            .field("medium_val", rng.gen_range(50..100_i64))
            .field("high_val", rng.gen_range(100..150_i64)))
    });
    vec![host, random]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = load_config(Args::parse())?;
    tracing::info!(
        database = %config.database,
        server = %config.influx.base_url(),
        interval = ?config.sample_interval,
        "sample importer starting"
    );

    let mut pipeline = Pipeline::connect(config, producers())?;
    pipeline.start()?;

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    tokio::task::spawn_blocking(move || pipeline.join()).await??;
    Ok(())
}
