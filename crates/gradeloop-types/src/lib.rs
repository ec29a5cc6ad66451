use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// One question of the evaluation suite: the prompt put to the work model,
/// the reference answer the grader compares against, and the maximum score
/// the grader may award.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u64,
    pub question: String,
    pub answer: String,
    pub score: u32,
}

/// Full configuration for one evaluation run. Supplied once at run start and
/// immutable for the run's duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub project: ProjectConfig,
    pub models: ModelSelection,
    pub test_config: TestConfig,
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub project_name: String,
    pub system_prompt: String,
    /// Address of an optional tool server forwarded to the work model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_server_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSelection {
    /// Model whose answers are being evaluated.
    pub work: String,
    /// Model that judges the answers against the reference.
    pub score: String,
    #[serde(default)]
    pub work_params: ModelParams,
    #[serde(default)]
    pub score_params: ModelParams,
}

/// Per-model generation knobs. Unset fields fall back to the defaults in
/// `GenerationOptions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    pub loop_count: u32,
}

/// Parameters for a single non-streaming chat completion, built freshly per
/// call from the run config plus per-phase overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub timeout_ms: u64,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_server_url: Option<String>,
    pub max_tool_calls: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: 8192,
            temperature: 1.0,
            top_p: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            timeout_ms: 90_000,
            system_prompt: String::new(),
            tool_server_url: None,
            max_tool_calls: 10,
        }
    }
}

impl GenerationOptions {
    /// Apply per-model overrides on top of the defaults.
    pub fn from_params(params: &ModelParams) -> Self {
        let base = Self::default();
        Self {
            max_output_tokens: params.max_tokens.unwrap_or(base.max_output_tokens),
            temperature: params.temperature.unwrap_or(base.temperature),
            top_p: params.top_p.unwrap_or(base.top_p),
            presence_penalty: params.presence_penalty.unwrap_or(base.presence_penalty),
            frequency_penalty: params.frequency_penalty.unwrap_or(base.frequency_penalty),
            ..base
        }
    }
}

/// Token counts as reported by the backend for one completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Wall-clock breakdown of one completion, nanosecond resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DurationUsage {
    pub total_duration: u64,
    pub load_duration: u64,
    pub prompt_eval_duration: u64,
    pub eval_duration: u64,
}

impl DurationUsage {
    /// Total duration rounded to milliseconds.
    pub fn total_ms(&self) -> u64 {
        (self.total_duration as f64 / 1e6).round() as u64
    }
}

/// Outcome of a (possibly retried) model call. Never partially populated:
/// `success == true` implies `content` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_usage: Option<DurationUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallOutcome {
    pub fn succeeded(
        content: String,
        token_usage: Option<TokenUsage>,
        duration_usage: Option<DurationUsage>,
    ) -> Self {
        Self {
            success: true,
            content: Some(content),
            token_usage,
            duration_usage,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            token_usage: None,
            duration_usage: None,
            error: Some(error.into()),
        }
    }
}

/// Finalized per-test-case-per-loop outcome, appended to the loop's result
/// list and persisted after every test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: u64,
    pub question: String,
    pub reference_answer: String,
    pub model_answer: String,
    pub max_score: u32,
    pub score: u32,
    pub work_token_usage: u64,
    pub work_duration_ms: u64,
    pub score_token_usage: u64,
    pub score_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Live progress event streamed to the caller while a run executes.
/// Ephemeral: never replayed, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Log {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        active_task_message: String,
        progress: f64,
        current_task: u64,
    },
    StateUpdate(StateUpdate),
    #[serde(rename_all = "camelCase")]
    TokenUsage {
        token_usage: u64,
    },
    Done {
        message: String,
    },
    Error {
        message: String,
    },
}

/// Partial state merge keyed by question id. Two are emitted per test case:
/// the answer half after phase one, the score half after phase two. The
/// consumer merges the second onto the record started by the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateUpdate {
    #[serde(rename_all = "camelCase")]
    Answer {
        question_id: u64,
        question_text: String,
        model_answer: String,
    },
    #[serde(rename_all = "camelCase")]
    Score { score: u32, max_score: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct SummaryRow {
    id: u64,
    score: String,
    tokens: u64,
    duration_ms: u64,
    question: String,
    error: String,
}

/// Render one loop's records as a table plus a totals line.
pub fn summary_table(records: &[ResultRecord]) -> String {
    use tabled::Table;
    let rows: Vec<SummaryRow> = records
        .iter()
        .map(|r| SummaryRow {
            id: r.id,
            score: format!("{}/{}", r.score, r.max_score),
            tokens: r.work_token_usage + r.score_token_usage,
            duration_ms: r.work_duration_ms + r.score_duration_ms,
            question: truncate(r.question.clone(), 64),
            error: truncate(r.error.clone().unwrap_or_default(), 48),
        })
        .collect();

    let table_str = Table::new(rows).to_string();

    let total_score: u64 = records.iter().map(|r| u64::from(r.score)).sum();
    let total_max: u64 = records.iter().map(|r| u64::from(r.max_score)).sum();
    let total_tokens: u64 = records
        .iter()
        .map(|r| r.work_token_usage + r.score_token_usage)
        .sum();

    let summary_text = format!(
        "Cases: {}  Score: {}/{}  Tokens: {}",
        records.len(),
        total_score,
        total_max,
        total_tokens
    );

    format!("{}\n\n{}\n", table_str, summary_text)
}

fn truncate(s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
    truncated.push('…');
    truncated
}
