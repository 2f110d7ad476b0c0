use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use daybook_pipeline::{scheduler, Worker};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::wiring::{self, Durable};

pub fn execute(
    config_path: &Path,
    bind: Option<String>,
    port: Option<u16>,
    worker: bool,
    schedule: bool,
) -> anyhow::Result<()> {
    let config = wiring::load_config(config_path)?;
    let mut serve_config = config.serve.clone();
    if let Some(bind) = bind {
        serve_config.bind = bind;
    }
    if let Some(port) = port {
        serve_config.port = port;
    }
    let trigger = if schedule {
        Some(
            config
                .schedule
                .trigger()?
                .context("--schedule needs schedule.daily_at in the config")?,
        )
    } else {
        None
    };

    let durable = Durable::open(&config)?;
    let pipeline = Arc::new(durable.pipeline(&config));
    let cancel = CancellationToken::new();
    wiring::ctrlc_cancel(cancel.clone());

    tokio::runtime::Runtime::new()?.block_on(async move {
        let mut background = JoinSet::new();
        if worker {
            let consumer = Worker::new(pipeline.clone(), &config.queue);
            let cancel = cancel.clone();
            background.spawn(async move { consumer.run(cancel).await });
        }
        if let Some(trigger) = trigger {
            background.spawn(scheduler::run_daily(pipeline.clone(), trigger, cancel.clone()));
        }

        let served = daybook_serve::serve(pipeline, &serve_config, cancel.clone()).await;
        cancel.cancel();
        while let Some(joined) = background.join_next().await {
            joined??;
        }
        served
    })
}
