use std::path::Path;

use crate::wiring::{self, Durable};

pub fn execute(config_path: &Path, date: Option<&str>) -> anyhow::Result<()> {
    let config = wiring::load_config(config_path)?;
    let date = wiring::resolve_date(&config, date)?;
    let pipeline = Durable::open(&config)?.pipeline(&config);

    let jobs = tokio::runtime::Runtime::new()?.block_on(pipeline.decompose(date))?;
    println!("Queued {jobs} jobs for {date}");
    Ok(())
}
