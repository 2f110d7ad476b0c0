use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use daybook_pipeline::Worker;
use tracing::{info, warn};

use crate::cmd_report;
use crate::wiring;

pub fn execute(config_path: &Path, date: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = wiring::load_config(config_path)?;
    let date = wiring::resolve_date(&config, date)?;
    let pipeline = Arc::new(wiring::memory_pipeline(&config));
    let worker = Worker::new(pipeline.clone(), &config.queue);

    let stats = tokio::runtime::Runtime::new()?.block_on(async {
        pipeline.decompose(date).await?;
        worker.drain().await
    })?;
    info!(?stats, "wave drained");
    if stats.dead_lettered > 0 {
        warn!(
            dead_lettered = stats.dead_lettered,
            "some jobs exhausted their retries; the report may be incomplete"
        );
    }

    let report = pipeline
        .store()
        .report(date)?
        .with_context(|| format!("no report produced for {date}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", cmd_report::render(&report));
    }
    if let Some(summary) = pipeline.summary_store().map(|s| s.get(date)).transpose()?.flatten() {
        println!("\n{summary}");
    }
    Ok(())
}
