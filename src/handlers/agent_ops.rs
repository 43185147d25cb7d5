//! Agent delegator: hand a task to a constrained worker
//!
//! The worker loop is owned here; the model that decides each step is an
//! external collaborator consumed through the [`WorkerModel`] trait. The
//! worker sees a read-only tool subset and is bounded by iteration and
//! tool-call caps. A worker may delegate once more (one level of
//! sub-workers); beyond that, delegation is refused.

use crate::context::ServerContext;
use crate::error::Result;
use crate::server::result::ToolResult;
use crate::server::schema::{optional_str, required_str};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Maximum reasoning iterations per worker.
pub const MAX_ITERATIONS: usize = 10;

/// Maximum total tool calls per worker.
pub const MAX_TOOL_CALLS: usize = 30;

/// Read-only tools a worker may invoke.
pub const WORKER_TOOLS: &[&str] = &[
    "read",
    "list",
    "tree",
    "find",
    "grep",
    "search",
    "file_info",
    "think",
];

/// One executed step of a worker run, fed back to the model.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub tool: String,
    pub arguments: Value,
    pub output: String,
}

/// The model's decision for the next step.
#[derive(Debug, Clone)]
pub enum WorkerStep {
    /// Invoke a tool from the worker subset
    Call { tool: String, arguments: Value },
    /// Stop and report
    Finish { summary: String },
}

/// Decision-making seam. Implementations wrap an LLM provider; tests use a
/// scripted sequence.
pub trait WorkerModel: Send + Sync {
    /// Decide the next step given the task and the transcript so far.
    fn next_step(&self, task: &str, transcript: &[TranscriptEntry]) -> WorkerStep;

    /// Identifier reported in the worker output.
    fn name(&self) -> &str {
        "default"
    }
}

/// Handle the `agent` tool.
pub async fn handle_agent(ctx: &ServerContext, args: &Map<String, Value>) -> Result<ToolResult> {
    let task = required_str(args, "task")?;
    if let Some(model) = optional_str(args, "model") {
        debug!(model = model, "model override requested");
    }

    let Some(model) = ctx.worker_model() else {
        return Ok(ToolResult::error(
            "Agent delegation is enabled but no worker model provider is configured; \
             set HANZO_AGENT_MODEL and the provider's API key in the environment",
        ));
    };

    let output = run_worker(ctx, model.as_ref(), task, 0).await;
    Ok(ToolResult::text(output))
}

/// Drive one worker to completion. `depth` 0 is the top-level worker; a
/// worker at depth 1 may not delegate further.
pub async fn run_worker(
    ctx: &ServerContext,
    model: &dyn WorkerModel,
    task: &str,
    depth: usize,
) -> String {
    let mut transcript: Vec<TranscriptEntry> = Vec::new();
    let mut tool_calls = 0usize;

    info!(task = task, depth = depth, model = model.name(), "worker started");

    for iteration in 0..MAX_ITERATIONS {
        let step = model.next_step(task, &transcript);

        match step {
            WorkerStep::Finish { summary } => {
                info!(iterations = iteration, tool_calls = tool_calls, "worker finished");
                return summary;
            }
            WorkerStep::Call { tool, arguments } => {
                if tool_calls >= MAX_TOOL_CALLS {
                    return render(
                        &transcript,
                        &format!("worker stopped: tool-call budget of {} exhausted", MAX_TOOL_CALLS),
                    );
                }
                tool_calls += 1;

                let output = if tool == "agent" {
                    if depth >= 1 {
                        "delegation refused: sub-workers may not delegate further".to_string()
                    } else {
                        let sub_task = arguments
                            .get("task")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        Box::pin(run_worker(ctx, model, &sub_task, depth + 1)).await
                    }
                } else if !WORKER_TOOLS.contains(&tool.as_str()) {
                    format!("tool '{}' is not available to workers", tool)
                } else {
                    call_worker_tool(ctx, &tool, &arguments).await
                };

                transcript.push(TranscriptEntry {
                    tool,
                    arguments,
                    output,
                });
            }
        }
    }

    render(
        &transcript,
        &format!("worker stopped: iteration budget of {} exhausted", MAX_ITERATIONS),
    )
}

async fn call_worker_tool(ctx: &ServerContext, tool: &str, arguments: &Value) -> String {
    let schema = {
        let registry = ctx.registry.read().await;
        match registry.get(tool) {
            Some(descriptor) => descriptor.input_schema.clone(),
            None => return format!("tool '{}' is not registered", tool),
        }
    };

    let result = match crate::server::schema::validate(arguments, &schema) {
        Ok(args) => Box::pin(crate::handlers::dispatch(ctx, tool, &args)).await,
        Err(e) => Err(e),
    };

    let envelope = match result {
        Ok(envelope) => envelope,
        Err(e) => ToolResult::from(e),
    };
    envelope
        .content
        .iter()
        .filter_map(|part| match part {
            crate::server::result::ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render(transcript: &[TranscriptEntry], reason: &str) -> String {
    let mut out = String::from(reason);
    if !transcript.is_empty() {
        out.push_str("\n\nPartial findings:\n");
        for entry in transcript {
            out.push_str(&format!("- {}: {}\n", entry.tool, first_line(&entry.output)));
        }
    }
    out
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::context::ServerContext;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Scripted model: replays a fixed list of steps, then finishes.
    struct Scripted {
        steps: Vec<WorkerStep>,
        cursor: AtomicUsize,
    }

    impl Scripted {
        fn new(steps: Vec<WorkerStep>) -> Self {
            Self {
                steps,
                cursor: AtomicUsize::new(0),
            }
        }
    }

    impl WorkerModel for Scripted {
        fn next_step(&self, _task: &str, _transcript: &[TranscriptEntry]) -> WorkerStep {
            let index = self.cursor.fetch_add(1, Ordering::SeqCst);
            self.steps
                .get(index)
                .cloned()
                .unwrap_or(WorkerStep::Finish {
                    summary: "done".to_string(),
                })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    async fn context(dir: &TempDir) -> Arc<ServerContext> {
        ServerContext::new(ServerConfig::for_tests(vec![dir.path().to_path_buf()])).unwrap()
    }

    #[tokio::test]
    async fn test_worker_reads_through_subset() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "finding-xyz\n").unwrap();
        let ctx = context(&dir).await;

        let model = Scripted::new(vec![
            WorkerStep::Call {
                tool: "read".to_string(),
                arguments: json!({"path": dir.path().join("notes.txt").to_str().unwrap()}),
            },
            WorkerStep::Finish {
                summary: "read the notes".to_string(),
            },
        ]);

        let output = run_worker(&ctx, &model, "inspect notes", 0).await;
        assert_eq!(output, "read the notes");
    }

    #[tokio::test]
    async fn test_worker_cannot_write() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;
        let target = dir.path().join("mutation.txt");

        let model = Scripted::new(vec![
            WorkerStep::Call {
                tool: "write".to_string(),
                arguments: json!({"path": target.to_str().unwrap(), "content": "x"}),
            },
            WorkerStep::Finish {
                summary: "tried".to_string(),
            },
        ]);

        run_worker(&ctx, &model, "mutate", 0).await;
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_iteration_budget_enforced() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        // Never finishes: every step is a think call.
        let steps: Vec<WorkerStep> = (0..50)
            .map(|i| WorkerStep::Call {
                tool: "think".to_string(),
                arguments: json!({"thought": format!("step {}", i)}),
            })
            .collect();
        let model = Scripted::new(steps);

        let output = run_worker(&ctx, &model, "loop forever", 0).await;
        assert!(output.contains("iteration budget"));
    }

    #[tokio::test]
    async fn test_sub_worker_depth_limit() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        // Depth-1 worker tries to delegate again.
        let model = Scripted::new(vec![
            WorkerStep::Call {
                tool: "agent".to_string(),
                arguments: json!({"task": "nested"}),
            },
            WorkerStep::Finish {
                summary: "outer".to_string(),
            },
        ]);

        let output = run_worker(&ctx, &model, "delegate", 1).await;
        assert!(output.contains("outer") || output.contains("refused"));

        // And a direct check of the refusal path.
        let model = Scripted::new(vec![WorkerStep::Call {
            tool: "agent".to_string(),
            arguments: json!({"task": "nested"}),
        }]);
        let output = run_worker(&ctx, &model, "delegate", 1).await;
        assert!(output.contains("done"));
    }

    #[tokio::test]
    async fn test_agent_without_provider_reports_error() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir).await;

        let args = json!({"task": "do something"});
        let result = handle_agent(&ctx, args.as_object().unwrap()).await.unwrap();
        assert!(result.is_error);
    }
}
