//! Deployment orchestrator: validation gate, run guard and the polling API

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::deploy::aggregate::Summary;
use crate::deploy::pipeline::DeployPipeline;
use crate::errors::FleetError;
use crate::fanout::context::{RunContext, RunKind, RunSlot};
use crate::fanout::poller::{self, tick};
use crate::fanout::sink::ProgressSink;
use crate::models::event::PipelineEvent;
use crate::models::host::HostDescriptor;
use crate::models::result::PipelineResult;
use crate::validation::validate_hosts;

/// Starts deployment runs, one at a time
pub struct Deployer {
    pipeline: DeployPipeline,
    slot: RunSlot,
    max_concurrency: usize,
    poll_options: poller::Options,
}

impl Deployer {
    pub fn new(pipeline: DeployPipeline, max_concurrency: usize, poll: poller::Options) -> Self {
        Self {
            pipeline,
            slot: RunSlot::new(),
            max_concurrency,
            poll_options: poll,
        }
    }

    /// Whether a deployment run is active
    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    /// Validate `hosts` and start one pipeline per host.
    ///
    /// Nothing touches the network if validation fails. A second submission
    /// while a run is active is rejected and leaves that run untouched.
    pub fn submit(&self, hosts: Vec<HostDescriptor>) -> Result<DeploymentRun, FleetError> {
        validate_hosts(&hosts).map_err(FleetError::ValidationFailed)?;

        let permit = self
            .slot
            .try_acquire()
            .ok_or_else(|| FleetError::RunInProgress(RunKind::Deployment.to_string()))?;

        let pipeline = self.pipeline.clone();
        let context = RunContext::create(
            RunKind::Deployment,
            hosts,
            permit,
            self.max_concurrency,
            move |host, events| {
                let pipeline = pipeline.clone();
                async move { pipeline.run(host, events).await }
            },
        );

        Ok(DeploymentRun {
            id: context.id(),
            hosts: context.hosts().to_vec(),
            started_at: context.started_at(),
            context: Some(context),
            pending: Vec::new(),
            summary: None,
            poll_options: self.poll_options.clone(),
        })
    }
}

/// One active or finished deployment.
///
/// The run context, and with it the run slot, is released as soon as the
/// summary has been produced.
pub struct DeploymentRun {
    id: Uuid,
    hosts: Vec<HostDescriptor>,
    started_at: DateTime<Utc>,
    context: Option<RunContext<PipelineResult>>,
    /// Events drained while finishing, not yet handed out
    pending: Vec<PipelineEvent>,
    summary: Option<Summary>,
    poll_options: poller::Options,
}

impl DeploymentRun {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn hosts(&self) -> &[HostDescriptor] {
        &self.hosts
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Events queued since the last call; empty when there are none
    pub fn try_drain_events(&mut self) -> Vec<PipelineEvent> {
        let mut events = std::mem::take(&mut self.pending);
        if let Some(context) = self.context.as_mut() {
            events.extend(context.try_drain_events());
        }
        events
    }

    pub fn is_complete(&self) -> bool {
        match &self.context {
            Some(context) => context.is_complete(),
            None => true,
        }
    }

    /// The summary once every pipeline has finished
    pub fn collect_summary(&mut self) -> Option<Summary> {
        if self.summary.is_none() {
            let context = self.context.as_mut()?;
            if !context.is_complete() {
                return None;
            }
            let results = context.collect()?;
            self.pending.extend(context.try_drain_events());
            self.finish(results);
        }
        self.summary.clone()
    }

    fn finish(&mut self, results: Vec<PipelineResult>) {
        let summary = Summary::aggregate(results);
        info!(
            "Deployment {} finished: {} succeeded, {} failed",
            self.id, summary.succeeded, summary.failed
        );
        self.summary = Some(summary);
        self.context = None;
    }

    /// One poller tick: forward events to `sink`, return the summary when done
    pub fn poll<K: ProgressSink + ?Sized>(&mut self, sink: &mut K) -> Option<Summary> {
        for event in std::mem::take(&mut self.pending) {
            sink.on_event(event);
        }
        if let Some(summary) = &self.summary {
            return Some(summary.clone());
        }
        let context = self.context.as_mut()?;
        let results = tick(context.handle_mut(), sink)?;
        self.finish(results);
        self.summary.clone()
    }

    /// Tick at the configured interval until the run completes
    pub async fn wait<K: ProgressSink + ?Sized>(&mut self, sink: &mut K) -> Summary {
        self.wait_with(sink, tokio::time::sleep).await
    }

    /// [`DeploymentRun::wait`] with an injected sleep function
    pub async fn wait_with<K, S, F>(&mut self, sink: &mut K, sleep_fn: S) -> Summary
    where
        K: ProgressSink + ?Sized,
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        if let Some(summary) = self.poll(sink) {
            return summary;
        }
        let results = match self.context.as_mut() {
            Some(context) => {
                poller::run_until_complete(&self.poll_options, context.handle_mut(), sink, sleep_fn).await
            }
            None => Vec::new(),
        };
        self.finish(results);
        self.summary.clone().unwrap_or_else(|| Summary::aggregate(Vec::new()))
    }
}
