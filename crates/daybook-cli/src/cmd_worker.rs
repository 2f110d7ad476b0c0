use std::path::Path;
use std::sync::Arc;

use daybook_pipeline::Worker;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::wiring::{self, Durable};

pub fn execute(config_path: &Path) -> anyhow::Result<()> {
    let config = wiring::load_config(config_path)?;
    let durable = Durable::open(&config)?;
    let purged = durable.reports.purge_expired()?;
    if purged > 0 {
        info!(purged, "removed expired keys");
    }

    let worker = Worker::new(Arc::new(durable.pipeline(&config)), &config.queue);
    let cancel = CancellationToken::new();
    wiring::ctrlc_cancel(cancel.clone());

    tokio::runtime::Runtime::new()?.block_on(worker.run(cancel))
}
