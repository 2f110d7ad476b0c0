use std::path::Path;

use daybook_queue::JobQueue;

use crate::wiring::{self, Durable};

pub fn execute(config_path: &Path) -> anyhow::Result<()> {
    let config = wiring::load_config(config_path)?;
    let queue = Durable::open(&config)?.queue;

    let (pending, dead) = tokio::runtime::Runtime::new()?.block_on(async {
        anyhow::Ok((queue.pending().await?, queue.dead_letters().await?))
    })?;

    println!("Pending:       {pending}");
    println!("Dead-lettered: {}", dead.len());
    for letter in &dead {
        println!("  #{} {} ({} attempts)", letter.id, letter.job, letter.attempts);
    }
    Ok(())
}
