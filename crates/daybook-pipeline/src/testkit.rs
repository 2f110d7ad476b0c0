use std::sync::Arc;

use daybook_core::config::PipelineConfig;
use daybook_core::{BranchConvention, Registry, RepositoryRef};
use daybook_queue::MemoryQueue;
use daybook_source::StaticSource;
use daybook_store::{CoordinationStore, MemoryStore, SummaryStore, Ttls};
use daybook_summary::Summarizer;

use crate::Pipeline;

pub(crate) struct Kit {
    pub pipeline: Pipeline,
    pub source: Arc<StaticSource>,
    pub queue: Arc<MemoryQueue>,
    pub kv: Arc<MemoryStore>,
    pub summaries: Arc<MemoryStore>,
}

fn registry(repositories: Vec<RepositoryRef>) -> Registry {
    Registry {
        user: "octocat".into(),
        repositories,
        convention: BranchConvention::default(),
    }
}

pub(crate) fn kit(repositories: Vec<RepositoryRef>) -> Kit {
    let source = Arc::new(StaticSource::new("octocat"));
    let queue = Arc::new(MemoryQueue::default());
    let kv = Arc::new(MemoryStore::new());
    let store = CoordinationStore::new(kv.clone(), Ttls::default());
    let pipeline = Pipeline::new(registry(repositories), source.clone(), store, queue.clone())
        .with_timings(PipelineConfig {
            settle_timeout_secs: 600,
            poll_interval_secs: 1,
        });
    Kit {
        pipeline,
        source,
        queue,
        kv,
        summaries: Arc::new(MemoryStore::new()),
    }
}

pub(crate) fn kit_with_summarizer(
    repositories: Vec<RepositoryRef>,
    summarizer: Arc<dyn Summarizer>,
) -> Kit {
    let mut k = kit(repositories);
    let summary_store = SummaryStore::new(k.summaries.clone(), Ttls::default().report);
    k.pipeline = k.pipeline.with_summaries(summary_store, summarizer);
    k
}
