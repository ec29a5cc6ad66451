use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use gradeloop_store::{LoopStore, RunDir};
use gradeloop_types::{
    GenerationOptions, ProgressEvent, ResultRecord, RunConfig, StateUpdate, TestCase, TokenUsage,
};

use crate::backend::{ChatBackend, ChatMessage};
use crate::cancel::CancelToken;
use crate::clock::{Sleeper, TokioSleeper};
use crate::error::RunError;
use crate::knowledge;
use crate::progress::ProgressSink;
use crate::retry::RetryingCaller;
use crate::rubric;

/// Fixed pacing delay between test cases.
pub const CASE_PACING: Duration = Duration::from_millis(1500);

/// Default retry bound per model call (attempts = retries + 1).
pub const DEFAULT_MAX_RETRIES: u32 = 2;

const FAILED_ANSWER_PLACEHOLDER: &str = "N/A (call failed)";

/// How a run ended. Exactly one terminal event has been emitted in each case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed(String),
}

/// Run-lifetime mutable state: the global task counter and the cumulative
/// token total. Owned exclusively by the orchestrator; helper methods take
/// it by mutable reference, never through globals.
struct RunContext {
    current_task: u64,
    total_tasks: u64,
    total_tokens: u64,
}

impl RunContext {
    fn new(total_tasks: u64) -> Self {
        Self {
            current_task: 0,
            total_tasks,
            total_tokens: 0,
        }
    }

    fn next_task(&mut self) -> u64 {
        self.current_task += 1;
        self.current_task
    }

    /// Progress fraction as a percentage: currentTask / totalTasks * 100.
    fn progress(&self) -> f64 {
        (self.current_task as f64 / self.total_tasks as f64) * 100.0
    }
}

pub struct OrchestratorBuilder {
    backend: Option<Arc<dyn ChatBackend>>,
    sink: Option<Arc<dyn ProgressSink>>,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelToken,
    output_root: PathBuf,
    max_retries: u32,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            sink: None,
            sleeper: Arc::new(TokioSleeper),
            cancel: CancelToken::new(),
            output_root: PathBuf::from("output"),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Root under which `project/<name>/knowledge` is looked up and
    /// `result/<timestamp>` run directories are created.
    pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn build(self) -> Result<RunOrchestrator> {
        Ok(RunOrchestrator {
            backend: self
                .backend
                .ok_or_else(|| anyhow::anyhow!("backend must be set"))?,
            sink: self.sink.ok_or_else(|| anyhow::anyhow!("sink must be set"))?,
            sleeper: self.sleeper,
            cancel: self.cancel,
            output_root: self.output_root,
            max_retries: self.max_retries,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequences loops, test cases and phases for one evaluation run. Strictly
/// sequential: no two model calls are ever in flight concurrently.
pub struct RunOrchestrator {
    backend: Arc<dyn ChatBackend>,
    sink: Arc<dyn ProgressSink>,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelToken,
    output_root: PathBuf,
    max_retries: u32,
}

impl RunOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Handle to the run's cancellation token, for wiring to a transport
    /// abort signal or Ctrl-C.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute the run end to end. Emits exactly one terminal event: `done`
    /// on success, `error` carrying the failure or cancellation message
    /// otherwise.
    pub async fn execute(&self, config: &RunConfig) -> RunStatus {
        match self.run(config).await {
            Ok(()) => {
                self.sink.emit(&ProgressEvent::Done {
                    message: "All tasks completed successfully.".to_string(),
                });
                RunStatus::Completed
            }
            Err(err) => {
                if matches!(err.downcast_ref::<RunError>(), Some(RunError::Cancelled)) {
                    tracing::info!("run cancelled by client");
                    self.sink.emit(&ProgressEvent::Error {
                        message: RunError::Cancelled.to_string(),
                    });
                    RunStatus::Cancelled
                } else {
                    tracing::error!(error = %err, "run failed");
                    self.sink.emit(&ProgressEvent::Error {
                        message: err.to_string(),
                    });
                    RunStatus::Failed(err.to_string())
                }
            }
        }
    }

    /// Emit one progress event, observing the cancellation token on the
    /// emission path: once cancelled, nothing further is streamed and the
    /// run unwinds. Terminal events bypass this and go to the sink directly.
    fn emit(&self, event: &ProgressEvent) -> Result<(), RunError> {
        self.cancel.check()?;
        self.sink.emit(event);
        Ok(())
    }

    async fn run(&self, config: &RunConfig) -> Result<()> {
        let total_tasks =
            config.test_cases.len() as u64 * 2 * u64::from(config.test_config.loop_count);
        let mut ctx = RunContext::new(total_tasks);

        let run_dir = RunDir::create(self.output_root.join("result")).await?;
        if let Some(name) = run_dir.path().file_name() {
            self.emit(&ProgressEvent::Log {
                message: format!("Result directory created: {}", name.to_string_lossy()),
            })?;
        }

        // Base context is assembled once per run, not per loop.
        self.emit(&ProgressEvent::Log {
            message: format!(
                "Loading background material for project '{}'...",
                config.project.project_name
            ),
        })?;
        let knowledge_dir = self
            .output_root
            .join("project")
            .join(&config.project.project_name)
            .join("knowledge");
        let (base_context, warning) =
            knowledge::build_base_context(&config.project, &knowledge_dir).await;
        if let Some(message) = warning {
            self.emit(&ProgressEvent::Log { message })?;
        }

        let caller = RetryingCaller::new(self.backend.as_ref(), self.sleeper.as_ref());

        for loop_index in 1..=config.test_config.loop_count {
            self.cancel.check()?;
            let mut store = run_dir.loop_store(loop_index).await?;
            // The final work-model system prompt is identical across loops.
            let final_system_prompt = base_context.clone();
            for case in &config.test_cases {
                self.run_case(
                    config,
                    case,
                    &caller,
                    &mut ctx,
                    &mut store,
                    &final_system_prompt,
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn run_case(
        &self,
        config: &RunConfig,
        case: &TestCase,
        caller: &RetryingCaller<'_>,
        ctx: &mut RunContext,
        store: &mut LoopStore,
        system_prompt: &str,
    ) -> Result<()> {
        // Phase 1: answering.
        let current = ctx.next_task();
        self.emit(&ProgressEvent::Update {
            active_task_message: format!("Answering question {}...", case.id),
            progress: ctx.progress(),
            current_task: current,
        })?;

        let mut work_options = GenerationOptions::from_params(&config.models.work_params);
        work_options.system_prompt = system_prompt.to_string();
        work_options.tool_server_url = config
            .project
            .tool_server_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let work_messages = [ChatMessage::user(&case.question)];

        self.cancel.check()?;
        let work_result = caller
            .call(&config.models.work, &work_messages, &work_options, self.max_retries)
            .await;

        let mut work_tokens = 0u64;
        if let Some(usage) = work_result.token_usage {
            work_tokens = usage.total_tokens;
            self.record_usage(ctx, usage)?;
        }
        let work_duration_ms = work_result
            .duration_usage
            .map(|d| d.total_ms())
            .unwrap_or(0);

        let model_answer = match (&work_result.content, work_result.success) {
            (Some(content), true) => content.clone(),
            _ => {
                self.emit(&ProgressEvent::Log {
                    message: format!(
                        "Warning: answering question #{} failed; scoring skipped.",
                        case.id
                    ),
                })?;
                FAILED_ANSWER_PLACEHOLDER.to_string()
            }
        };

        // First half of the state merge: question and answer, score pending.
        self.emit(&ProgressEvent::StateUpdate(StateUpdate::Answer {
            question_id: case.id,
            question_text: case.question.clone(),
            model_answer: model_answer.clone(),
        }))?;

        // Phase 2: scoring. The slot counts toward progress even when the
        // call is skipped, so progress tracks the two-phase structure.
        let current = ctx.next_task();
        let mut score = 0u32;
        let mut score_tokens = 0u64;
        let mut score_duration_ms = 0u64;
        if work_result.success {
            self.emit(&ProgressEvent::Update {
                active_task_message: format!("Evaluating question {}...", case.id),
                progress: ctx.progress(),
                current_task: current,
            })?;

            let mut score_options = GenerationOptions::from_params(&config.models.score_params);
            score_options.system_prompt = rubric::scoring_system_prompt(case.score);
            // The scoring model never sees the tool server.
            let score_messages = [ChatMessage::user(rubric::scoring_user_message(
                &case.question,
                &case.answer,
                &model_answer,
            ))];

            self.cancel.check()?;
            let score_result = caller
                .call(
                    &config.models.score,
                    &score_messages,
                    &score_options,
                    self.max_retries,
                )
                .await;

            if let Some(usage) = score_result.token_usage {
                score_tokens = usage.total_tokens;
                self.record_usage(ctx, usage)?;
            }
            score_duration_ms = score_result
                .duration_usage
                .map(|d| d.total_ms())
                .unwrap_or(0);

            if score_result.success {
                score = rubric::parse_score(score_result.content.as_deref().unwrap_or_default());
            } else {
                self.emit(&ProgressEvent::Log {
                    message: format!("Warning: evaluating question #{} failed.", case.id),
                })?;
            }
        }

        // Second half of the state merge: resolved score onto the same record.
        self.emit(&ProgressEvent::StateUpdate(StateUpdate::Score {
            score,
            max_score: case.score,
        }))?;

        let record = ResultRecord {
            id: case.id,
            question: case.question.clone(),
            reference_answer: case.answer.clone(),
            model_answer,
            max_score: case.score,
            score,
            work_token_usage: work_tokens,
            work_duration_ms,
            score_token_usage: score_tokens,
            score_duration_ms,
            error: work_result.error.clone(),
        };
        store.append(record).await?;

        self.sleeper.sleep(CASE_PACING).await;
        Ok(())
    }

    /// Fold one call's usage into the run total and report the new
    /// cumulative value. The counter is never decremented.
    fn record_usage(&self, ctx: &mut RunContext, usage: TokenUsage) -> Result<(), RunError> {
        ctx.total_tokens += usage.total_tokens;
        self.emit(&ProgressEvent::TokenUsage {
            token_usage: ctx.total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatResponse;
    use crate::clock::NoopSleeper;
    use crate::progress::MemorySink;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use gradeloop_types::{
        DurationUsage, ModelParams, ModelSelection, ProjectConfig, TestConfig,
    };
    use serde_json::json;
    use std::sync::Mutex;

    const WORK_MODEL: &str = "work-model";
    const SCORE_MODEL: &str = "score-model";

    /// Scripted backend: fixed reply (or failure) per model id, recording
    /// the order of models called. Optionally cancels a token while the
    /// nth call (1-based) is being served.
    struct ScriptedBackend {
        calls: Mutex<Vec<String>>,
        work: Result<String, String>,
        score: Result<String, String>,
        cancel_on_call: Option<(usize, CancelToken)>,
    }

    impl ScriptedBackend {
        fn new(work: Result<String, String>, score: Result<String, String>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                work,
                score,
                cancel_on_call: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(
            &self,
            model: &str,
            _messages: &[ChatMessage],
            _options: &GenerationOptions,
        ) -> Result<ChatResponse> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(model.to_string());
            let call_index = calls.len();
            drop(calls);
            if let Some((index, token)) = &self.cancel_on_call {
                if call_index == *index {
                    token.cancel();
                }
            }

            let reply = if model == SCORE_MODEL {
                &self.score
            } else {
                &self.work
            };
            match reply {
                Ok(content) => Ok(ChatResponse {
                    content: json!(content),
                    usage: Some(gradeloop_types::TokenUsage {
                        total_tokens: if model == SCORE_MODEL { 40 } else { 100 },
                        prompt_tokens: 10,
                        completion_tokens: 5,
                    }),
                    duration: Some(DurationUsage {
                        total_duration: 2_000_000_000,
                        load_duration: 0,
                        prompt_eval_duration: 0,
                        eval_duration: 0,
                    }),
                }),
                Err(msg) => Err(anyhow!("{msg}")),
            }
        }
    }

    fn config(cases: Vec<TestCase>, loop_count: u32) -> RunConfig {
        RunConfig {
            project: ProjectConfig {
                project_name: "demo".to_string(),
                system_prompt: "Be accurate.".to_string(),
                tool_server_url: None,
            },
            models: ModelSelection {
                work: WORK_MODEL.to_string(),
                score: SCORE_MODEL.to_string(),
                work_params: ModelParams::default(),
                score_params: ModelParams::default(),
            },
            test_config: TestConfig { loop_count },
            test_cases: cases,
        }
    }

    fn case(id: u64) -> TestCase {
        TestCase {
            id,
            question: "Q".to_string(),
            answer: "42".to_string(),
            score: 10,
        }
    }

    struct Harness {
        backend: Arc<ScriptedBackend>,
        sink: Arc<MemorySink>,
        orchestrator: RunOrchestrator,
        output_root: tempfile::TempDir,
    }

    fn harness(backend: ScriptedBackend) -> Harness {
        let output_root = tempfile::tempdir().unwrap();
        let backend = Arc::new(backend);
        let sink = Arc::new(MemorySink::new());
        let orchestrator = RunOrchestrator::builder()
            .backend(backend.clone())
            .sink(sink.clone())
            .sleeper(Arc::new(NoopSleeper))
            .output_root(output_root.path())
            .build()
            .unwrap();
        Harness {
            backend,
            sink,
            orchestrator,
            output_root,
        }
    }

    async fn loop_snapshot(h: &Harness, loop_index: u32) -> Vec<ResultRecord> {
        let result_root = h.output_root.path().join("result");
        let mut dirs = std::fs::read_dir(&result_root)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect::<Vec<_>>();
        dirs.sort();
        let run_dir = dirs.pop().expect("run directory exists");
        let path = run_dir.join(loop_index.to_string()).join("results.json");
        if !path.exists() {
            return Vec::new();
        }
        gradeloop_store::read_snapshot(path).await.unwrap()
    }

    fn terminal_events(events: &[ProgressEvent]) -> Vec<&ProgressEvent> {
        events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Done { .. } | ProgressEvent::Error { .. }))
            .collect()
    }

    #[tokio::test]
    async fn happy_path_scores_and_persists_one_record() {
        let h = harness(ScriptedBackend::new(
            Ok("The answer is 42".to_string()),
            Ok("9".to_string()),
        ));
        let status = h.orchestrator.execute(&config(vec![case(1)], 1)).await;
        assert_eq!(status, RunStatus::Completed);

        let records = loop_snapshot(&h, 1).await;
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, 1);
        assert_eq!(r.model_answer, "The answer is 42");
        assert_eq!(r.score, 9);
        assert_eq!(r.max_score, 10);
        assert!(r.error.is_none());
        assert_eq!(r.work_token_usage, 100);
        assert_eq!(r.score_token_usage, 40);
        assert_eq!(r.work_duration_ms, 2000);

        let events = h.sink.events();
        let terminals = terminal_events(&events);
        assert_eq!(terminals.len(), 1);
        assert!(matches!(terminals[0], ProgressEvent::Done { .. }));
        assert_eq!(h.backend.calls(), vec![WORK_MODEL, SCORE_MODEL]);
    }

    #[tokio::test]
    async fn failed_answer_skips_scoring_and_records_placeholder() {
        let h = harness(ScriptedBackend::new(
            Err("model exploded".to_string()),
            Ok("9".to_string()),
        ));
        let status = h.orchestrator.execute(&config(vec![case(1)], 1)).await;
        assert_eq!(status, RunStatus::Completed);

        // Retries exhausted on the work model, scoring never invoked.
        let calls = h.backend.calls();
        assert_eq!(calls.len(), DEFAULT_MAX_RETRIES as usize + 1);
        assert!(calls.iter().all(|m| m == WORK_MODEL));

        let records = loop_snapshot(&h, 1).await;
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.model_answer, "N/A (call failed)");
        assert_eq!(r.score, 0);
        assert!(r.error.as_deref().unwrap().contains("model exploded"));

        // The scoring slot still produced the second state update.
        let events = h.sink.events();
        assert!(events.contains(&ProgressEvent::StateUpdate(StateUpdate::Score {
            score: 0,
            max_score: 10
        })));
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::Log { message } if message.contains("scoring skipped")
        )));
    }

    #[tokio::test]
    async fn cancellation_before_run_makes_no_calls() {
        let h = harness(ScriptedBackend::new(
            Ok("unused".to_string()),
            Ok("unused".to_string()),
        ));
        h.orchestrator.cancel_token().cancel();
        let status = h.orchestrator.execute(&config(vec![case(1)], 1)).await;
        assert_eq!(status, RunStatus::Cancelled);
        assert!(h.backend.calls().is_empty());

        let events = h.sink.events();
        let terminals = terminal_events(&events);
        assert_eq!(terminals.len(), 1);
        match terminals[0] {
            ProgressEvent::Error { message } => assert!(message.contains("cancelled")),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    fn cancelling_harness(cancel_on_call: usize) -> Harness {
        let mut backend = ScriptedBackend::new(
            Ok("The answer is 42".to_string()),
            Ok("9".to_string()),
        );
        let token = CancelToken::new();
        backend.cancel_on_call = Some((cancel_on_call, token.clone()));

        let output_root = tempfile::tempdir().unwrap();
        let backend = Arc::new(backend);
        let sink = Arc::new(MemorySink::new());
        let orchestrator = RunOrchestrator::builder()
            .backend(backend.clone())
            .sink(sink.clone())
            .sleeper(Arc::new(NoopSleeper))
            .cancel_token(token)
            .output_root(output_root.path())
            .build()
            .unwrap();
        Harness {
            backend,
            sink,
            orchestrator,
            output_root,
        }
    }

    #[tokio::test]
    async fn cancellation_during_answering_stops_the_stream() {
        let h = cancelling_harness(1);
        let status = h.orchestrator.execute(&config(vec![case(1)], 1)).await;
        assert_eq!(status, RunStatus::Cancelled);

        // The work call happened; the next emission noticed the token, so
        // nothing streamed after it and no record was finalized.
        assert_eq!(h.backend.calls(), vec![WORK_MODEL]);
        assert!(loop_snapshot(&h, 1).await.is_empty());
        let events = h.sink.events();
        assert!(!events
            .iter()
            .any(|e| matches!(e, ProgressEvent::StateUpdate(_))));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ProgressEvent::TokenUsage { .. })));
        let terminals = terminal_events(&events);
        assert_eq!(terminals.len(), 1);
        assert!(matches!(terminals[0], ProgressEvent::Error { .. }));
    }

    #[tokio::test]
    async fn cancellation_during_scoring_persists_nothing_further() {
        let h = cancelling_harness(2);
        let status = h.orchestrator.execute(&config(vec![case(1)], 1)).await;
        assert_eq!(status, RunStatus::Cancelled);

        // Both calls completed, but the run unwound at the first emission
        // after the scoring call: no usage report, no score update, and the
        // scored record never reached the snapshot.
        assert_eq!(h.backend.calls(), vec![WORK_MODEL, SCORE_MODEL]);
        assert!(loop_snapshot(&h, 1).await.is_empty());

        let events = h.sink.events();
        assert!(!events.iter().any(|e| matches!(
            e,
            ProgressEvent::StateUpdate(StateUpdate::Score { .. })
        )));
        let usage_reports = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::TokenUsage { .. }))
            .count();
        // Only the work call's usage got out before the token was set.
        assert_eq!(usage_reports, 1);
        let terminals = terminal_events(&events);
        assert_eq!(terminals.len(), 1);
        assert!(matches!(terminals[0], ProgressEvent::Error { .. }));
    }

    #[tokio::test]
    async fn progress_counts_two_slots_per_case_per_loop() {
        let h = harness(ScriptedBackend::new(
            Ok("The answer is 42".to_string()),
            Ok("9".to_string()),
        ));
        let status = h
            .orchestrator
            .execute(&config(vec![case(1), case(2)], 2))
            .await;
        assert_eq!(status, RunStatus::Completed);

        let events = h.sink.events();
        let updates: Vec<(u64, f64)> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Update {
                    current_task,
                    progress,
                    ..
                } => Some((*current_task, *progress)),
                _ => None,
            })
            .collect();

        // 2 cases x 2 phases x 2 loops = 8 task slots.
        assert_eq!(updates.last().unwrap().0, 8);
        assert!(updates.iter().all(|(_, p)| *p <= 100.0));
        assert_eq!(updates.last().unwrap().1, 100.0);
    }

    #[tokio::test]
    async fn token_usage_is_monotonically_non_decreasing() {
        let h = harness(ScriptedBackend::new(
            Ok("The answer is 42".to_string()),
            Ok("9".to_string()),
        ));
        h.orchestrator
            .execute(&config(vec![case(1), case(2)], 2))
            .await;

        let totals: Vec<u64> = h
            .sink
            .events()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::TokenUsage { token_usage } => Some(*token_usage),
                _ => None,
            })
            .collect();
        assert!(!totals.is_empty());
        assert!(totals.windows(2).all(|w| w[0] <= w[1]));
        // 2 loops x 2 cases x (100 work + 40 score).
        assert_eq!(*totals.last().unwrap(), 560);
    }

    #[tokio::test]
    async fn state_updates_come_in_answer_then_score_pairs() {
        let h = harness(ScriptedBackend::new(
            Ok("The answer is 42".to_string()),
            Ok("9".to_string()),
        ));
        h.orchestrator
            .execute(&config(vec![case(1), case(2)], 1))
            .await;

        let events = h.sink.events();
        let state_updates: Vec<&StateUpdate> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::StateUpdate(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(state_updates.len(), 4);
        assert!(matches!(state_updates[0], StateUpdate::Answer { question_id: 1, .. }));
        assert!(matches!(state_updates[1], StateUpdate::Score { score: 9, .. }));
        assert!(matches!(state_updates[2], StateUpdate::Answer { question_id: 2, .. }));
        assert!(matches!(state_updates[3], StateUpdate::Score { score: 9, .. }));
    }

    #[tokio::test]
    async fn each_loop_gets_its_own_snapshot_in_input_order() {
        let h = harness(ScriptedBackend::new(
            Ok("The answer is 42".to_string()),
            Ok("7".to_string()),
        ));
        h.orchestrator
            .execute(&config(vec![case(1), case(2), case(3)], 2))
            .await;

        for loop_index in 1..=2 {
            let records = loop_snapshot(&h, loop_index).await;
            assert_eq!(records.len(), 3);
            assert_eq!(
                records.iter().map(|r| r.id).collect::<Vec<_>>(),
                vec![1, 2, 3]
            );
        }
    }
}
