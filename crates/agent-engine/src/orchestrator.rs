use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_policy::{
    PolicyGate, PolicySnapshot, PolicyVerdict, ProposedAction, RiskTier, ToolCatalog,
};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use ui_control::{ControlPathSelector, ElementQuery, UiControlError, UiIntent};

use crate::audit::{AuditEvent, AuditSink, NullAuditSink};
use crate::cancel::KillSwitch;
use crate::client::{ModelClient, ModelOptions, ModelReply, ReplyItem, TurnContext};
use crate::confirm::ConfirmationUi;
use crate::error::{BudgetKind, EngineError};
use crate::executor::ToolExecutor;
use crate::settings::{capture_snapshot, SettingsStore};
use crate::turn::{
    ActionOutcome, Message, RequestSnapshot, Round, Turn, TurnOutcome, TurnPhase,
};

/// Transient model failures are retried this many times within a round
/// before the turn aborts as unavailable.
const MODEL_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub system_prompt: String,
    /// Rounds per turn before the loop fails with a budget error.
    pub max_rounds: u32,
    /// Wall-clock budget for the whole turn.
    pub turn_budget: Duration,
    /// Per-call deadline for the model client.
    pub model_timeout: Duration,
    /// Concurrent tool executions per round.
    pub fan_out: usize,
    /// Trailing conversation messages included in each model request.
    pub history_window: usize,
    pub model_options: ModelOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.trim().to_string(),
            max_rounds: crate::DEFAULT_MAX_ROUNDS,
            turn_budget: Duration::from_secs(90),
            model_timeout: Duration::from_secs(10),
            fan_out: 4,
            history_window: 24,
            model_options: ModelOptions::default(),
        }
    }
}

/// Drives the turn loop: sends context to the model, routes every proposed
/// action through the policy gate, executes what may run (UI interactions
/// via the control-path selector), feeds outcomes back, and repeats until a
/// terminal condition. Sole writer of turn and round state.
pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    catalog: Arc<ToolCatalog>,
    gate: PolicyGate,
    tools: IndexMap<String, Arc<dyn ToolExecutor>>,
    selector: Option<Arc<ControlPathSelector>>,
    confirm: Arc<dyn ConfirmationUi>,
    settings: Arc<dyn SettingsStore>,
    audit: Arc<dyn AuditSink>,
    kill: KillSwitch,
    config: EngineConfig,
    history: Vec<Message>,
    next_turn_id: u64,
}

impl Orchestrator {
    pub fn builder(
        model: Arc<dyn ModelClient>,
        settings: Arc<dyn SettingsStore>,
        confirm: Arc<dyn ConfirmationUi>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(model, settings, confirm)
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill.clone()
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Run one turn to its terminal outcome. Failures are part of the turn
    /// record, never a Rust error: the caller always gets the full story.
    pub async fn run_turn(&mut self, input: &str) -> Turn {
        let turn_id = self.next_turn_id;
        self.next_turn_id += 1;
        let deadline = Instant::now() + self.config.turn_budget;
        let cancel = self.kill.token();

        self.audit.record(AuditEvent::TurnStarted {
            turn: turn_id,
            input: input.to_string(),
        });
        self.history.push(Message::User {
            content: input.to_string(),
        });
        if let Some(selector) = &self.selector {
            selector.begin_turn().await;
        }

        let mut rounds: Vec<Round> = Vec::new();
        let mut reply_buffer: Vec<String> = Vec::new();
        let mut quota: HashMap<String, u32> = HashMap::new();

        let exit = loop {
            if cancel.is_cancelled() {
                break TurnExit::Stopped;
            }
            if rounds.len() as u32 >= self.config.max_rounds {
                break TurnExit::Failed(EngineError::BudgetExceeded(BudgetKind::Rounds));
            }
            if Instant::now() >= deadline {
                break TurnExit::TimedOut;
            }

            let sequence = rounds.len() as u32;
            // Settings frozen at round start; a mid-round change waits for
            // the next round.
            let snapshot = capture_snapshot(self.settings.as_ref());
            let context = self.build_context();
            let request = RequestSnapshot {
                message_count: context.messages.len(),
                tool_count: context.tools.len(),
                autonomy: snapshot.autonomy,
            };

            self.set_phase(turn_id, TurnPhase::Understanding);
            let reply = match self.call_model(&context, deadline, &cancel).await {
                Ok(reply) => reply,
                Err(exit) => break exit,
            };

            self.set_phase(turn_id, TurnPhase::Planning);
            let (texts, proposed) = partition_reply(reply, sequence);
            reply_buffer.extend(texts);

            if proposed.is_empty() {
                rounds.push(Round {
                    sequence,
                    request,
                    proposed,
                    outcomes: Vec::new(),
                });
                break TurnExit::Completed;
            }

            self.set_phase(turn_id, TurnPhase::Executing);
            let outcomes = self
                .execute_round(&proposed, &snapshot, &mut quota, &cancel, deadline)
                .await;

            self.set_phase(turn_id, TurnPhase::Verifying);
            let executed = outcomes.iter().filter(|outcome| outcome.success).count();
            for outcome in &outcomes {
                self.audit.record(AuditEvent::ActionRecorded {
                    turn: turn_id,
                    round: sequence,
                    tool: outcome.action.tool.clone(),
                    success: outcome.success,
                    control_path: outcome.control_path,
                    duration_ms: outcome.duration_ms,
                    side_effects_kept: outcome.success,
                });
                self.history.push(Message::ToolResult {
                    tool: outcome.action.tool.clone(),
                    success: outcome.success,
                    content: outcome.payload.clone(),
                });
            }
            self.audit.record(AuditEvent::RoundClosed {
                turn: turn_id,
                round: sequence,
                proposed: proposed.len(),
                executed,
            });
            rounds.push(Round {
                sequence,
                request,
                proposed,
                outcomes,
            });

            // A trip during execution closes the turn before any new round.
            if cancel.is_cancelled() {
                break TurnExit::Stopped;
            }
        };

        self.close_turn(turn_id, input, rounds, reply_buffer, exit)
    }

    fn close_turn(
        &mut self,
        turn_id: u64,
        input: &str,
        rounds: Vec<Round>,
        reply_buffer: Vec<String>,
        exit: TurnExit,
    ) -> Turn {
        let (phase, outcome, reply) = match exit {
            TurnExit::Completed => {
                let text = reply_buffer.join("\n\n");
                let reply = if text.is_empty() {
                    "Done.".to_string()
                } else {
                    text
                };
                (TurnPhase::Responding, TurnOutcome::Completed, reply)
            }
            TurnExit::Stopped => (
                TurnPhase::Stopped,
                TurnOutcome::Stopped,
                // Buffered text is discarded: a stopped turn reports the stop,
                // not a half-finished answer.
                "Stopped by the kill switch before the task finished. Actions already applied \
                 were kept, not rolled back; the audit record lists them."
                    .to_string(),
            ),
            TurnExit::TimedOut => (
                TurnPhase::Failed,
                TurnOutcome::TimedOut,
                "The task ran out of time before completing.".to_string(),
            ),
            TurnExit::Failed(error) => {
                let reply = format!("The task failed: {error}.");
                (
                    TurnPhase::Failed,
                    TurnOutcome::Failed { error },
                    reply,
                )
            }
        };

        self.set_phase(turn_id, phase);
        self.history.push(Message::Assistant {
            content: reply.clone(),
        });
        self.audit.record(AuditEvent::TurnClosed {
            turn: turn_id,
            outcome: outcome.clone(),
        });
        debug!(
            target: "agent_engine::orchestrator",
            turn = turn_id,
            rounds = rounds.len(),
            outcome = ?outcome,
            "turn closed"
        );

        Turn {
            id: turn_id,
            input: input.to_string(),
            rounds,
            outcome,
            reply,
        }
    }

    fn build_context(&self) -> TurnContext {
        let start = self.history.len().saturating_sub(self.config.history_window);
        TurnContext {
            system_prompt: self.config.system_prompt.clone(),
            tools: self.catalog.descriptors(),
            messages: self.history[start..].to_vec(),
            options: self.config.model_options.clone(),
        }
    }

    async fn call_model(
        &self,
        context: &TurnContext,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<ModelReply, TurnExit> {
        let mut attempts = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TurnExit::TimedOut);
            }
            let per_call = self.config.model_timeout.min(remaining);

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(TurnExit::Stopped),
                result = timeout(per_call, self.model.send(context)) => result,
            };

            match result {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(err)) if err.is_fatal() => {
                    return Err(TurnExit::Failed(EngineError::ModelClientUnavailable {
                        reason: err.to_string(),
                    }));
                }
                Ok(Err(err)) => {
                    attempts += 1;
                    warn!(
                        target: "agent_engine::orchestrator",
                        error = %err,
                        attempt = attempts,
                        "transient model failure"
                    );
                    if attempts > MODEL_RETRIES {
                        return Err(TurnExit::Failed(EngineError::ModelClientUnavailable {
                            reason: err.to_string(),
                        }));
                    }
                }
                Err(_elapsed) => {
                    attempts += 1;
                    warn!(
                        target: "agent_engine::orchestrator",
                        attempt = attempts,
                        "model call exceeded its deadline"
                    );
                    if attempts > MODEL_RETRIES {
                        return Err(TurnExit::Failed(EngineError::ModelClientUnavailable {
                            reason: "model call repeatedly exceeded its deadline".to_string(),
                        }));
                    }
                }
            }
        }
    }

    /// Resolve every proposed action of one round. Allowed actions run
    /// concurrently up to the fan-out limit; confirmations block only their
    /// own action; denials and quota misses synthesize failures without
    /// executing anything. Every execution is bounded by the turn deadline,
    /// independently of any timeout the executor itself applies.
    async fn execute_round(
        &self,
        proposed: &[ProposedAction],
        snapshot: &PolicySnapshot,
        quota: &mut HashMap<String, u32>,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Vec<ActionOutcome> {
        let mut synthesized: Vec<(usize, ActionOutcome)> = Vec::new();
        let mut planned: Vec<PlannedAction> = Vec::new();

        for (index, action) in proposed.iter().enumerate() {
            // Arguments are checked against the declared schema before the
            // gate ever sees the action.
            if let Err(violation) = self.catalog.validate_arguments(&action.tool, &action.arguments)
            {
                synthesized.push((
                    index,
                    ActionOutcome::failed(
                        action.clone(),
                        EngineError::ToolExecutionFailed {
                            message: violation.to_string(),
                            retryable: true,
                        },
                        0,
                    ),
                ));
                continue;
            }

            let confirm_request = match self.gate.evaluate(action, snapshot) {
                PolicyVerdict::Allow => None,
                PolicyVerdict::RequireConfirmation { reason, risk } => Some((reason, risk)),
                PolicyVerdict::Deny { reason } => {
                    debug!(
                        target: "agent_engine::orchestrator",
                        tool = %action.tool,
                        %reason,
                        "action denied by policy"
                    );
                    synthesized.push((
                        index,
                        ActionOutcome::failed(
                            action.clone(),
                            EngineError::PolicyDenied { reason },
                            0,
                        ),
                    ));
                    continue;
                }
            };

            if let Some(limit) = self
                .catalog
                .get(&action.tool)
                .and_then(|descriptor| descriptor.max_calls_per_turn)
            {
                let used = quota.entry(action.tool.clone()).or_insert(0);
                if *used >= limit {
                    synthesized.push((
                        index,
                        ActionOutcome::failed(
                            action.clone(),
                            EngineError::ToolExecutionFailed {
                                message: format!(
                                    "{} exceeded its quota of {} calls this turn",
                                    action.tool, limit
                                ),
                                retryable: false,
                            },
                            0,
                        ),
                    ));
                    continue;
                }
                *used += 1;
            }

            let ui_interaction = self
                .catalog
                .get(&action.tool)
                .map(|descriptor| descriptor.ui_interaction)
                .unwrap_or(false);
            planned.push(PlannedAction {
                index,
                action: action.clone(),
                confirm_request,
                ui_interaction,
                executor: self.tools.get(&action.tool).cloned(),
            });
        }

        let confirm = self.confirm.clone();
        let selector = self.selector.clone();
        let deadline = tokio::time::Instant::from_std(deadline);
        let futures: Vec<_> = planned
            .into_iter()
            .map(|planned| {
                let confirm = confirm.clone();
                let selector = selector.clone();
                let cancel = cancel.clone();
                async move {
                    let started = Instant::now();
                    let index = planned.index;
                    let action = planned.action.clone();
                    let resolved = timeout_at(
                        deadline,
                        resolve_planned(planned, confirm, selector, cancel, started),
                    )
                    .await;
                    match resolved {
                        Ok(outcome) => (index, outcome),
                        // The turn's wall-clock budget ran out mid-action.
                        Err(_elapsed) => (
                            index,
                            ActionOutcome::failed(
                                action,
                                EngineError::BudgetExceeded(BudgetKind::Time),
                                elapsed_ms(started),
                            ),
                        ),
                    }
                }
            })
            .collect();

        let mut results: Vec<(usize, ActionOutcome)> = stream::iter(futures)
            .buffer_unordered(self.config.fan_out.max(1))
            .collect()
            .await;
        results.append(&mut synthesized);
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn set_phase(&self, turn: u64, phase: TurnPhase) {
        debug!(target: "agent_engine::orchestrator", turn, phase = ?phase, "phase change");
        self.audit.record(AuditEvent::PhaseChanged { turn, phase });
    }
}

struct PlannedAction {
    index: usize,
    action: ProposedAction,
    confirm_request: Option<(String, RiskTier)>,
    ui_interaction: bool,
    executor: Option<Arc<dyn ToolExecutor>>,
}

enum TurnExit {
    Completed,
    Stopped,
    TimedOut,
    Failed(EngineError),
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn partition_reply(reply: ModelReply, round: u32) -> (Vec<String>, Vec<ProposedAction>) {
    let mut texts = Vec::new();
    let mut proposed = Vec::new();
    for item in reply.items {
        match item {
            ReplyItem::Text { content } => {
                if !content.trim().is_empty() {
                    texts.push(content);
                }
            }
            ReplyItem::ToolCall { name, arguments } => {
                proposed.push(ProposedAction::new(name, arguments, round));
            }
        }
    }
    (texts, proposed)
}

/// Carry one planned action to its outcome: wait for confirmation when the
/// gate asked for one, then dispatch to the selector or executor.
async fn resolve_planned(
    planned: PlannedAction,
    confirm: Arc<dyn ConfirmationUi>,
    selector: Option<Arc<ControlPathSelector>>,
    cancel: CancellationToken,
    started: Instant,
) -> ActionOutcome {
    let PlannedAction {
        index: _,
        action,
        confirm_request,
        ui_interaction,
        executor,
    } = planned;

    if let Some((reason, risk)) = confirm_request {
        let approved = tokio::select! {
            _ = cancel.cancelled() => {
                return ActionOutcome::failed(action, EngineError::Cancelled, elapsed_ms(started));
            }
            decision = confirm.request(&action, &reason, risk) => match decision {
                Ok(approved) => approved,
                Err(err) => {
                    warn!(
                        target: "agent_engine::orchestrator",
                        error = %err,
                        "confirmation surface failed, treating as denied"
                    );
                    false
                }
            },
        };
        if !approved {
            return ActionOutcome::failed(
                action.clone(),
                EngineError::ConfirmationDenied {
                    tool: action.tool.clone(),
                },
                elapsed_ms(started),
            );
        }
    }

    if ui_interaction {
        dispatch_ui(&action, selector.as_deref(), &cancel, started).await
    } else {
        dispatch_executor(&action, executor, &cancel, started).await
    }
}

async fn dispatch_executor(
    action: &ProposedAction,
    executor: Option<Arc<dyn ToolExecutor>>,
    cancel: &CancellationToken,
    started: Instant,
) -> ActionOutcome {
    let Some(executor) = executor else {
        return ActionOutcome::failed(
            action.clone(),
            EngineError::ToolExecutionFailed {
                message: format!("no executor registered for {}", action.tool),
                retryable: false,
            },
            elapsed_ms(started),
        );
    };

    tokio::select! {
        _ = cancel.cancelled() => ActionOutcome::failed(
            action.clone(),
            EngineError::Cancelled,
            elapsed_ms(started),
        ),
        result = executor.execute(action.arguments.clone()) => match result {
            Ok(payload) => ActionOutcome::succeeded(action.clone(), payload, elapsed_ms(started)),
            Err(failure) => ActionOutcome::failed(
                action.clone(),
                EngineError::ToolExecutionFailed {
                    message: failure.message,
                    retryable: failure.retryable,
                },
                elapsed_ms(started),
            ),
        },
    }
}

async fn dispatch_ui(
    action: &ProposedAction,
    selector: Option<&ControlPathSelector>,
    cancel: &CancellationToken,
    started: Instant,
) -> ActionOutcome {
    let Some(selector) = selector else {
        return ActionOutcome::failed(
            action.clone(),
            EngineError::ToolExecutionFailed {
                message: "no control-path selector is configured".to_string(),
                retryable: false,
            },
            elapsed_ms(started),
        );
    };

    let intent = match decode_ui_intent(&action.tool, &action.arguments) {
        Ok(intent) => intent,
        Err(message) => {
            return ActionOutcome::failed(
                action.clone(),
                EngineError::ToolExecutionFailed {
                    message,
                    retryable: true,
                },
                elapsed_ms(started),
            );
        }
    };

    // The selector checks the token between strategy attempts; racing it
    // here preempts an in-flight strategy too, including the slow vision
    // call.
    let performed = tokio::select! {
        _ = cancel.cancelled() => {
            return ActionOutcome::failed(
                action.clone(),
                EngineError::Cancelled,
                elapsed_ms(started),
            );
        }
        performed = selector.perform(&intent, cancel) => performed,
    };

    match performed {
        Ok(report) => {
            let payload = json!({
                "status": "ok",
                "control_path": report.path.as_str(),
                "billed": report.billed,
                "fallbacks": report.attempts,
                "result": report.payload,
            });
            ActionOutcome::succeeded(action.clone(), payload, elapsed_ms(started))
                .with_control_path(report.path)
        }
        Err(UiControlError::ForegroundLockFailed { .. }) => ActionOutcome::failed(
            action.clone(),
            EngineError::ForegroundLockFailed,
            elapsed_ms(started),
        ),
        Err(UiControlError::Cancelled) => {
            ActionOutcome::failed(action.clone(), EngineError::Cancelled, elapsed_ms(started))
        }
        Err(err @ UiControlError::Exhausted { .. }) => ActionOutcome::failed(
            action.clone(),
            EngineError::ToolExecutionFailed {
                message: err.to_string(),
                retryable: true,
            },
            elapsed_ms(started),
        ),
    }
}

/// Map a UI tool's argument payload onto the selector's intent model, the
/// same way the catalog's desktop defaults declare them.
fn decode_ui_intent(tool: &str, arguments: &Value) -> Result<UiIntent, String> {
    #[derive(Deserialize)]
    struct ElementArgs {
        app: String,
        element: ElementQuery,
    }
    #[derive(Deserialize)]
    struct TypeArgs {
        app: String,
        element: ElementQuery,
        text: String,
    }
    #[derive(Deserialize)]
    struct ReadArgs {
        app: String,
    }

    match tool {
        "ui_click" => serde_json::from_value::<ElementArgs>(arguments.clone())
            .map(|args| UiIntent::Click {
                app: args.app,
                element: args.element,
            })
            .map_err(|err| format!("invalid ui_click payload: {err}")),
        "ui_type" => serde_json::from_value::<TypeArgs>(arguments.clone())
            .map(|args| UiIntent::TypeText {
                app: args.app,
                element: args.element,
                text: args.text,
            })
            .map_err(|err| format!("invalid ui_type payload: {err}")),
        "screen_read" => serde_json::from_value::<ReadArgs>(arguments.clone())
            .map(|args| UiIntent::ReadScreen { app: args.app })
            .map_err(|err| format!("invalid screen_read payload: {err}")),
        other => Err(format!("{other} is not a known UI interaction")),
    }
}

pub struct OrchestratorBuilder {
    model: Arc<dyn ModelClient>,
    settings: Arc<dyn SettingsStore>,
    confirm: Arc<dyn ConfirmationUi>,
    config: EngineConfig,
    catalog: ToolCatalog,
    tools: Vec<(String, Arc<dyn ToolExecutor>)>,
    selector: Option<Arc<ControlPathSelector>>,
    audit: Arc<dyn AuditSink>,
    kill: KillSwitch,
}

impl OrchestratorBuilder {
    fn new(
        model: Arc<dyn ModelClient>,
        settings: Arc<dyn SettingsStore>,
        confirm: Arc<dyn ConfirmationUi>,
    ) -> Self {
        Self {
            model,
            settings,
            confirm,
            config: EngineConfig::default(),
            catalog: ToolCatalog::with_desktop_defaults(),
            tools: Vec::new(),
            selector: None,
            audit: Arc::new(NullAuditSink),
            kill: KillSwitch::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_catalog(mut self, catalog: ToolCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_selector(mut self, selector: Arc<ControlPathSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_kill_switch(mut self, kill: KillSwitch) -> Self {
        self.kill = kill;
        self
    }

    pub fn register_tool(mut self, name: impl Into<String>, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tools.push((name.into(), executor));
        self
    }

    pub fn build(self) -> Orchestrator {
        let catalog = Arc::new(self.catalog);
        let mut tools = IndexMap::new();
        for (name, executor) in self.tools {
            tools.insert(name, executor);
        }
        Orchestrator {
            model: self.model,
            gate: PolicyGate::new(catalog.clone()),
            catalog,
            tools,
            selector: self.selector,
            confirm: self.confirm,
            settings: self.settings,
            audit: self.audit,
            kill: self.kill,
            config: self.config,
            history: Vec::new(),
            next_turn_id: 0,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"
You are Valet, a supervised desktop companion. You accomplish the user's goal
by proposing tool calls and reading their results.
Rules:
- Prefer tools over guessing; after each call, wait for the observation.
- Some actions need the user's approval and may come back declined. Respect
  the refusal and re-plan instead of retrying the same call.
- When the goal is met (or cannot be met), reply with plain text only and no
  further tool calls.
"#;
