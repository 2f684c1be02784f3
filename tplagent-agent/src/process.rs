//! The render process: one worker per template spec, driven for the lifetime
//! of a configuration generation.
//!
//! Workers initialize in parallel, then loop over `{cancel, trigger, tick}`.
//! Renders are totally ordered within a template and never overlap; across
//! templates there is no ordering. A worker exits when its generation is
//! cancelled, when a render-once tick completes, or when the consecutive
//! failure breaker trips.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, Span};

use crate::actions;
use crate::config::expand::{expand_all, expand_str};
use crate::config::{ActionConfig, AgentSpec, MissingKeyPolicy, TemplateSpec};
use crate::errors::AgentError;
use crate::exec::{ExecError, Executor};
use crate::render::{Sink, SinkError};
use crate::supervisor::Generation;
use crate::template::{ActionableTemplate, TemplateError};

const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;
const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single tick.
#[derive(Error, Debug)]
pub enum TickError {
    #[error(transparent)]
    Render(#[from] SinkError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("render task failed: {0}")]
    Task(String),
}

impl TickError {
    /// Identical contents are a successful no-op: the breaker resets and the
    /// post-render command is skipped.
    pub fn is_identical(&self) -> bool {
        matches!(self, TickError::Render(SinkError::ContentsIdentical))
    }
}

/// Failure of an externally triggered refresh.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("no template named {0}")]
    NotFound(String),

    #[error("render worker for {0} is gone")]
    WorkerGone(String),

    #[error(transparent)]
    Tick(#[from] TickError),
}

pub(crate) struct TriggerRequest {
    respond_to: oneshot::Sender<Result<(), TickError>>,
}

/// A sanitized, runtime-ready template spec: paths and args expanded,
/// defaults applied, render-once inferred.
#[derive(Debug, Clone)]
pub(crate) struct SinkExecSpec {
    pub name: String,
    pub destination: String,
    pub raw: Option<String>,
    pub read_from: Option<String>,
    pub html: bool,
    pub delimiters: Option<(String, String)>,
    pub missing_key: MissingKeyPolicy,
    pub actions: Vec<ActionConfig>,
    pub static_data: Arc<serde_json::Value>,
    pub refresh_interval: Duration,
    pub render_once: bool,
    pub refresh_on_trigger: bool,
    pub exec: Option<Executor>,
}

pub(crate) fn make_sink_exec_specs<'a>(
    templates: impl IntoIterator<Item = (&'a String, &'a TemplateSpec)>,
) -> Vec<SinkExecSpec> {
    templates
        .into_iter()
        .map(|(name, spec)| {
            let exec = spec.exec.as_ref().map(|e| {
                Executor::new(
                    e.cmd.clone(),
                    expand_all(&e.cmd_args),
                    e.env.clone(),
                    e.cmd_timeout.unwrap_or(DEFAULT_EXEC_TIMEOUT),
                )
            });

            let delimiters = spec.template_delimiters.as_ref().and_then(|d| match d.as_slice() {
                [left, right] => Some((left.clone(), right.clone())),
                _ => None,
            });

            SinkExecSpec {
                name: name.clone(),
                destination: expand_str(&spec.destination),
                raw: spec.raw.clone().filter(|r| !r.is_empty()),
                read_from: spec
                    .source
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map(expand_str),
                html: spec.html,
                delimiters,
                missing_key: spec.missing_key,
                actions: spec.actions.clone(),
                static_data: Arc::new(spec.static_data.clone()),
                refresh_interval: spec.refresh_interval,
                render_once: spec.render_once || spec.refresh_interval.is_zero(),
                refresh_on_trigger: spec.refresh_on_trigger,
                exec,
            }
        })
        .collect()
}

/// Orchestrates the render workers of one configuration generation and routes
/// external refresh triggers to them.
pub struct RenderProcess {
    max_consecutive_failures: u32,
    triggers: Mutex<HashMap<String, mpsc::Sender<TriggerRequest>>>,
}

impl RenderProcess {
    pub fn new(agent: &AgentSpec) -> Arc<Self> {
        let max = if agent.max_consecutive_failures == 0 {
            DEFAULT_MAX_CONSECUTIVE_FAILURES
        } else {
            agent.max_consecutive_failures
        };
        Arc::new(RenderProcess {
            max_consecutive_failures: max,
            triggers: Mutex::new(HashMap::new()),
        })
    }

    /// Spawn one worker per template and collect their terminal results.
    /// The aggregate is fatal only when every worker terminated fatally;
    /// otherwise errors are joined into a non-fatal aggregate.
    pub async fn start(
        self: Arc<Self>,
        generation: Generation,
        templates: std::collections::BTreeMap<String, TemplateSpec>,
    ) -> Result<(), AgentError> {
        let specs = make_sink_exec_specs(templates.iter());

        let mut workers: JoinSet<Result<(), AgentError>> = JoinSet::new();
        for spec in specs {
            let trigger_rx = if spec.refresh_on_trigger {
                let (tx, rx) = mpsc::channel(1);
                self.triggers.lock().insert(spec.name.clone(), tx);
                Some(rx)
            } else {
                None
            };
            workers.spawn(run_worker(
                spec,
                self.max_consecutive_failures,
                trigger_rx,
                generation.clone(),
            ));
        }

        let mut finished = 0usize;
        let mut errors = Vec::new();
        while let Some(joined) = workers.join_next().await {
            finished += 1;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e.to_string()),
                Err(e) => errors.push(format!("render worker panicked: {}", e)),
            }
        }
        self.triggers.lock().clear();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == finished {
            Err(AgentError::AllWorkersFailed { errors })
        } else {
            Err(AgentError::WorkerErrors { errors })
        }
    }

    /// Request one out-of-band render of the named template and wait for its
    /// result. The caller imposes any timeout.
    pub async fn trigger_refresh(&self, name: &str) -> Result<(), RefreshError> {
        let sender = self
            .triggers
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RefreshError::NotFound(name.to_string()))?;

        let (tx, rx) = oneshot::channel();
        sender
            .send(TriggerRequest { respond_to: tx })
            .await
            .map_err(|_| RefreshError::WorkerGone(name.to_string()))?;
        match rx.await {
            Ok(result) => result.map_err(RefreshError::Tick),
            Err(_) => Err(RefreshError::WorkerGone(name.to_string())),
        }
    }
}

/// The template, sink and static data a worker renders with. Moved onto a
/// blocking thread for every render: action functions may perform blocking
/// I/O.
struct RenderUnit {
    template: ActionableTemplate,
    sink: Sink,
    data: Arc<serde_json::Value>,
}

impl RenderUnit {
    fn render(&mut self) -> Result<(), SinkError> {
        let ctx = minijinja::Value::from_serialize(&*self.data);
        self.sink.render(&self.template, &ctx)
    }
}

fn build_template(spec: &SinkExecSpec, span: &Span) -> Result<ActionableTemplate, TemplateError> {
    let mut template = ActionableTemplate::new(&spec.name, spec.html);
    match configure_template(&mut template, spec, span) {
        Ok(()) => Ok(template),
        Err(e) => {
            // actions attached before the failure still need their Close
            template.close_actions();
            Err(e)
        }
    }
}

fn configure_template(
    template: &mut ActionableTemplate,
    spec: &SinkExecSpec,
    span: &Span,
) -> Result<(), TemplateError> {
    if let Some((left, right)) = &spec.delimiters {
        template.set_delimiters(left, right)?;
    }
    template.set_missing_key_policy(spec.missing_key);
    actions::attach(template, &spec.actions, span)?;

    let text = match (&spec.raw, &spec.read_from) {
        (Some(raw), _) => raw.clone(),
        (None, Some(path)) => {
            std::fs::read_to_string(path).map_err(|e| TemplateError::ReadSource {
                path: path.clone(),
                source: e,
            })?
        }
        (None, None) => return Err(TemplateError::MissingSource),
    };
    template.parse(&text)
}

async fn run_worker(
    spec: SinkExecSpec,
    max_failures: u32,
    mut trigger_rx: Option<mpsc::Receiver<TriggerRequest>>,
    generation: Generation,
) -> Result<(), AgentError> {
    let span = info_span!("render", template = %spec.name);

    // Init runs on a blocking thread: actions may build blocking HTTP clients
    // inside set_config.
    let init_span = span.clone();
    let (spec, built) = tokio::task::spawn_blocking(move || {
        let built = build_template(&spec, &init_span);
        (spec, built)
    })
    .await
    .map_err(|e| AgentError::Task(format!("template init task failed: {}", e)))?;

    let template = match built {
        Ok(template) => template,
        Err(e) => {
            span.in_scope(|| error!(error = %e, "template init failed"));
            return Err(AgentError::TemplateInit {
                template: spec.name.clone(),
                source: e,
            });
        }
    };

    let mut unit = Some(RenderUnit {
        template,
        sink: Sink::new(&spec.destination),
        data: spec.static_data.clone(),
    });

    if spec.render_once {
        let result = tick(&generation, &mut unit, spec.exec.as_ref()).await;
        match &result {
            Err(e) if !e.is_identical() => {
                span.in_scope(|| error!(error = %e, once = true, "refresh failed"))
            }
            _ => span.in_scope(|| info!(once = true, "refresh complete")),
        }
        close_unit(unit).await;
        return Ok(());
    }

    let mut consecutive_failures: u32 = 0;
    let mut ticker = interval_at(
        Instant::now() + spec.refresh_interval,
        spec.refresh_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    enum Event {
        Cancelled,
        Trigger(TriggerRequest),
        Tick,
    }

    let exit = loop {
        let event = tokio::select! {
            biased;
            _ = generation.cancelled() => Event::Cancelled,
            request = recv_trigger(&mut trigger_rx) => match request {
                Some(request) => Event::Trigger(request),
                None => {
                    trigger_rx = None;
                    continue;
                }
            },
            _ = ticker.tick() => Event::Tick,
        };

        match event {
            Event::Cancelled => {
                span.in_scope(|| info!(cause = generation.cause_str(), "stopping render loop"));
                break Ok(());
            }
            Event::Trigger(request) => {
                let result = tick(&generation, &mut unit, spec.exec.as_ref()).await;
                classify(&span, &result, &mut consecutive_failures);
                let _ = request.respond_to.send(result);
            }
            Event::Tick => {
                let result = tick(&generation, &mut unit, spec.exec.as_ref()).await;
                classify(&span, &result, &mut consecutive_failures);
            }
        }

        if consecutive_failures >= max_failures {
            break Err(AgentError::TooManyFailures {
                template: spec.name.clone(),
                failures: consecutive_failures,
            });
        }
    };

    close_unit(unit).await;
    exit
}

async fn recv_trigger(rx: &mut Option<mpsc::Receiver<TriggerRequest>>) -> Option<TriggerRequest> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// One render (plus, if configured, the post-render command). The command
/// deliberately runs outside the generation's cancellation scope, bounded by
/// its own timeout only.
async fn tick(
    generation: &Generation,
    unit: &mut Option<RenderUnit>,
    executor: Option<&Executor>,
) -> Result<(), TickError> {
    if generation.is_cancelled() {
        return Ok(());
    }

    let mut taken = unit
        .take()
        .ok_or_else(|| TickError::Task("render unit missing".to_string()))?;
    let (taken, rendered) = tokio::task::spawn_blocking(move || {
        let rendered = taken.render();
        (taken, rendered)
    })
    .await
    .map_err(|e| TickError::Task(e.to_string()))?;
    *unit = Some(taken);
    rendered?;

    if let Some(executor) = executor {
        executor.exec().await?;
    }
    Ok(())
}

fn classify(span: &Span, result: &Result<(), TickError>, failures: &mut u32) {
    match result {
        Ok(()) => {
            *failures = 0;
            span.in_scope(|| info!("refresh complete"));
        }
        Err(e) if e.is_identical() => {
            *failures = 0;
            span.in_scope(|| debug!("contents identical, render skipped"));
        }
        Err(TickError::Exec(ExecError::Failed { status, stderr })) => {
            *failures += 1;
            span.in_scope(|| error!(status, stderr = %stderr, "post-render command failed"));
        }
        Err(e) => {
            *failures += 1;
            span.in_scope(|| error!(error = %e, "refresh failed"));
        }
    }
}

/// Tear the render unit down off the async runtime: closing actions can drop
/// blocking clients.
async fn close_unit(unit: Option<RenderUnit>) {
    if let Some(mut unit) = unit {
        let _ = tokio::task::spawn_blocking(move || {
            unit.template.close_actions();
            drop(unit);
        })
        .await;
    }
}
