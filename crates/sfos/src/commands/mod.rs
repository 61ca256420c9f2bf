//! Command dispatch: bridges CLI args -> Connector operations -> output.
//!
//! Every target gets its own Connector; targets run concurrently on a
//! `JoinSet`, bounded by a semaphore. A failed target never stops the
//! others; the first failure (in target order) decides the exit code.

pub mod download;
pub mod info;
pub mod licenses;
pub mod run;
pub mod send;
pub mod templates;
pub mod util;

use std::future::Future;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use sfos_api::{Connector, HttpTransport, Scheme, SfosResponse, TemplateRegistry};

use crate::cli::{Command, GlobalOpts, OutputFormat};
use crate::config::{self, Config, TargetSpec};
use crate::error::CliError;

/// Everything a handler needs besides its own arguments.
pub struct Context {
    pub config: Config,
    pub output: OutputFormat,
    pub color: bool,
    pub quiet: bool,
    pub concurrency: usize,
    pub plain_http: bool,
    pub transport: Arc<HttpTransport>,
    pub templates: Arc<TemplateRegistry>,
}

impl Context {
    pub fn new(config: Config, global: &GlobalOpts) -> Result<Self, CliError> {
        Ok(Self {
            output: config::output_format(&config, global)?,
            color: crate::output::should_color(global.color),
            quiet: global.quiet,
            concurrency: config::concurrency(&config, global),
            plain_http: global.plain_http,
            transport: Arc::new(HttpTransport::new(config::transport_config(&config))),
            templates: Arc::new(config::template_registry(&config, global)),
            config,
        })
    }

    fn connector(&self, spec: &TargetSpec) -> Connector {
        let mut address = spec.address();
        if self.plain_http {
            address = address.with_scheme(Scheme::Http);
        }
        Connector::with_transport(
            address,
            Some(spec.credentials()),
            Arc::clone(&self.transport),
            Arc::clone(&self.templates),
        )
    }
}

/// Responses collected from one target.
#[derive(Debug)]
pub struct TargetRun {
    pub name: String,
    pub responses: Vec<SfosResponse>,
}

impl TargetRun {
    pub fn first_failure(&self) -> Option<CliError> {
        self.responses.iter().find_map(CliError::from_response)
    }
}

/// Dispatch a firewall-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Info => info::handle(ctx, global).await,
        Command::Licenses => licenses::handle(ctx, global).await,
        Command::Send(args) => send::handle(ctx, args, global).await,
        Command::Run(args) => run::handle(ctx, args, global).await,
        Command::Download(args) => download::handle(ctx, args, global).await,
        Command::Templates => {
            templates::handle(ctx);
            Ok(())
        }
        // Completions are handled before dispatch
        Command::Completions(_) => Ok(()),
    }
}

/// Run `op` once per target, at most `ctx.concurrency` at a time.
///
/// Results come back in target order.
pub async fn fan_out<F, Fut>(ctx: &Context, targets: Vec<TargetSpec>, op: F) -> Vec<TargetRun>
where
    F: Fn(Connector) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<SfosResponse>> + Send + 'static,
{
    let op = Arc::new(op);
    let permits = Arc::new(Semaphore::new(ctx.concurrency));
    let progress = progress_bar(ctx, targets.len());
    let mut set = JoinSet::new();

    for (index, spec) in targets.into_iter().enumerate() {
        let connector = ctx.connector(&spec);
        let op = Arc::clone(&op);
        let permits = Arc::clone(&permits);
        let progress = progress.clone();
        set.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            debug!(target_name = %spec.name, "starting target");
            let responses = op(connector).await;
            if let Some(ref bar) = progress {
                bar.inc(1);
            }
            (
                index,
                TargetRun {
                    name: spec.name,
                    responses,
                },
            )
        });
    }

    let mut runs = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(run) => runs.push(run),
            Err(e) => error!(error = %e, "target task did not complete"),
        }
    }
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    runs.sort_by_key(|(index, _)| *index);
    runs.into_iter().map(|(_, run)| run).collect()
}

/// Exit status for a batch: the first failing target's error.
pub fn outcome(runs: &[TargetRun]) -> Result<(), CliError> {
    let mut first = None;
    for run in runs {
        if let Some(err) = run.first_failure() {
            warn!(target_name = %run.name, error = %err, "target failed");
            first.get_or_insert(err);
        }
    }
    first.map_or(Ok(()), Err)
}

fn progress_bar(ctx: &Context, len: usize) -> Option<ProgressBar> {
    if ctx.quiet || len < 2 || !std::io::stderr().is_terminal() {
        return None;
    }
    let bar = ProgressBar::new(u64::try_from(len).unwrap_or(u64::MAX));
    if let Ok(style) = ProgressStyle::with_template("{spinner} {pos}/{len} firewalls {wide_bar}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    Some(bar)
}
