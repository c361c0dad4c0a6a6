//! The agent loop: one user request's lifecycle as a spawned task.
//!
//! A [`Task`] drives the ReAct cycle: stream a model response through the
//! incremental parser, publish display updates, execute the parsed tool
//! calls sequentially, feed results back into history, and repeat until the
//! model invokes the completion tool, produces an empty turn, trips the
//! loop-count circuit breaker, or is cancelled.

pub mod context;
pub mod events;
pub mod snapshot;

pub use context::{ContextProvider, DiffTracker, NoContext, NoDiffTracker};
pub use events::{EventSink, TaskEvent, TaskEventEmitter, TaskEventPayload, TaskId};
pub use snapshot::ToolCallSnapshot;

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::conversation::{ConversationEntry, ConversationStore, InMemoryConversation};
use crate::error::recovery::{RecoveryTracker, RETRY_BACKOFF};
use crate::error::SableError;
use crate::parser::AssistantMessageParser;
use crate::tools::{ToolExecutor, COMPLETION_TOOL};
use crate::transport::{Transport, TransportEvent};
use crate::types::{ContentBlock, HistoryItem, TokenUsage, ToolUse};

/// Default iteration cap; see [`crate::config::SableConfig::max_loops`].
pub use crate::config::DEFAULT_MAX_LOOPS;

/// Corrective instruction injected when a turn produces prose but no tool
/// call, steering the model back into the tool-use protocol.
pub const NO_TOOL_USE_MESSAGE: &str = "You responded without invoking a tool. Every response must \
    invoke exactly one tool using XML tags, for example:\n\
    <read_file>\n<path>src/main.rs</path>\n</read_file>\n\
    If the task is finished, invoke <attempt_completion> with a <result> parameter.";

/// Observable lifecycle state, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running(u32),
    AwaitingToolResults,
    Cancelled,
    Completed,
}

/// Terminal outcome delivered through [`TaskHandle::wait`].
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Normal completion. Carries the completion tool's result text when the
    /// model ended the task with it.
    Completed { result: Option<String> },
    Cancelled,
    /// Unrecoverable error or loop-limit trip. The same message was emitted
    /// as an [`TaskEventPayload::Error`] event.
    Failed { message: String },
}

/// Everything needed to start a task.
pub struct TaskRequest {
    pub task_id: TaskId,
    pub user_message: String,
    pub system_prompt: String,
    pub max_loops: u32,
    pub event_sink: Option<EventSink>,
    pub context: Arc<dyn ContextProvider>,
    pub diff_tracker: Arc<dyn DiffTracker>,
    pub conversation: Arc<dyn ConversationStore>,
}

impl TaskRequest {
    pub fn new(user_message: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            user_message: user_message.into(),
            system_prompt: system_prompt.into(),
            max_loops: DEFAULT_MAX_LOOPS,
            event_sink: None,
            context: Arc::new(NoContext),
            diff_tracker: Arc::new(NoDiffTracker),
            conversation: Arc::new(InMemoryConversation::new()),
        }
    }

    pub fn with_max_loops(mut self, max_loops: u32) -> Self {
        self.max_loops = max_loops;
        self
    }

    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn with_context(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = context;
        self
    }

    pub fn with_diff_tracker(mut self, tracker: Arc<dyn DiffTracker>) -> Self {
        self.diff_tracker = tracker;
        self
    }

    pub fn with_conversation(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversation = store;
        self
    }
}

/// Handle for an in-flight task.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    cancel: CancellationToken,
    state_rx: watch::Receiver<TaskState>,
    result_rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Request cooperative cancellation. Idempotent: a second call, or a
    /// call after natural completion, is a no-op.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn state_receiver(&self) -> watch::Receiver<TaskState> {
        self.state_rx.clone()
    }

    /// Wait for the terminal outcome.
    pub async fn wait(self) -> TaskOutcome {
        self.result_rx.await.unwrap_or(TaskOutcome::Cancelled)
    }
}

/// Spawns the agent loop.
pub struct Task;

impl Task {
    pub fn spawn(
        request: TaskRequest,
        transport: Arc<dyn Transport>,
        executor: Arc<ToolExecutor>,
    ) -> TaskHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(TaskState::Running(0));
        let (result_tx, result_rx) = oneshot::channel();

        let handle = TaskHandle {
            task_id: request.task_id,
            cancel: cancel.clone(),
            state_rx,
            result_rx,
        };

        tokio::spawn(async move {
            let emitter = TaskEventEmitter::new(request.task_id, request.event_sink.clone());
            let worker = TaskWorker {
                task_id: request.task_id,
                system_prompt: request.system_prompt,
                max_loops: request.max_loops,
                context: request.context,
                diff_tracker: request.diff_tracker,
                conversation: request.conversation,
                transport,
                executor,
                cancel,
                state_tx,
                emitter,
                history: Vec::new(),
                recovery: RecoveryTracker::new(),
                loop_count: 0,
                completed: false,
            };
            let outcome = worker.run(request.user_message).await;
            let _ = result_tx.send(outcome);
        });

        handle
    }
}

enum TurnOutcome {
    /// Recurse with the updated history.
    Continue,
    /// The completion tool fired, or the turn was fully empty.
    Complete { result: Option<String> },
    Cancelled,
}

struct TaskWorker {
    task_id: TaskId,
    system_prompt: String,
    max_loops: u32,
    context: Arc<dyn ContextProvider>,
    diff_tracker: Arc<dyn DiffTracker>,
    conversation: Arc<dyn ConversationStore>,
    transport: Arc<dyn Transport>,
    executor: Arc<ToolExecutor>,
    cancel: CancellationToken,
    state_tx: watch::Sender<TaskState>,
    emitter: TaskEventEmitter,
    history: Vec<HistoryItem>,
    recovery: RecoveryTracker,
    loop_count: u32,
    completed: bool,
}

impl TaskWorker {
    async fn run(mut self, user_message: String) -> TaskOutcome {
        debug!(task_id = %self.task_id, "task start");

        let formatted = match self.context.format_user_message(&user_message).await {
            Ok(formatted) => formatted,
            Err(err) => {
                let report = self.recovery.classify("task_start", &err);
                self.emitter.emit(TaskEventPayload::Error {
                    message: report.message.clone(),
                });
                return self.finish_failed(report.message).await;
            }
        };
        self.history.push(HistoryItem::user(formatted));
        self.persist(ConversationEntry::user(user_message)).await;

        self.drive_loop().await
    }

    /// The turn-taking loop. Iterative rather than self-recursive, with the
    /// same per-turn ordering guarantees.
    async fn drive_loop(mut self) -> TaskOutcome {
        loop {
            if self.cancel.is_cancelled() {
                return self.finish_cancelled().await;
            }
            if self.loop_count >= self.max_loops {
                let message = format!(
                    "Task stopped after reaching the {}-iteration limit",
                    self.max_loops
                );
                self.emitter.emit(TaskEventPayload::Error {
                    message: message.clone(),
                });
                return self.finish_failed(message).await;
            }

            self.loop_count += 1;
            self.set_state(TaskState::Running(self.loop_count));
            let operation = format!("agent_loop_{}", self.loop_count);

            match self.turn().await {
                Ok(TurnOutcome::Continue) => {
                    self.recovery.reset(&operation);
                }
                Ok(TurnOutcome::Complete { result }) => {
                    self.recovery.reset(&operation);
                    return self.finish_completed(result).await;
                }
                Ok(TurnOutcome::Cancelled) => {
                    return self.finish_cancelled().await;
                }
                Err(err) => {
                    if self.recovery.attempt_recovery(&operation, &err) {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                        continue;
                    }
                    let message = err.user_message();
                    self.emitter.emit(TaskEventPayload::Error {
                        message: message.clone(),
                    });
                    return self.finish_failed(message).await;
                }
            }
        }
    }

    /// One full request/response/tool-execution cycle.
    async fn turn(&mut self) -> Result<TurnOutcome, SableError> {
        let registry = self.executor.registry();
        let tool_names = registry.tool_names();
        let param_names = registry.param_names();
        let raw_content_tools = registry.raw_content_tools();
        let mut parser = AssistantMessageParser::new(&tool_names, &param_names)
            .with_raw_content_tools(&raw_content_tools);

        let mut stream = self
            .transport
            .create_message(&self.system_prompt, &self.history, self.cancel.child_token())
            .await?;

        let mut usage: Option<TokenUsage> = None;
        let mut snapshots: HashMap<usize, ToolCallSnapshot> = HashMap::new();
        let mut last_display = String::new();

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(TurnOutcome::Cancelled),
                next = stream.next() => match next {
                    Some(result) => result?,
                    None => break,
                },
            };
            match event {
                TransportEvent::Content { text } => {
                    parser.process_chunk(&text)?;
                    self.publish_partial(parser.content_blocks(), &mut snapshots, &mut last_display);
                }
                TransportEvent::Usage { usage: reported } => usage = Some(reported),
            }
        }

        let blocks = parser.finalize_content_blocks().to_vec();
        let display = display_text(&blocks);
        self.emitter.emit(TaskEventPayload::StreamChunk {
            text: display.clone(),
            streaming: false,
        });
        if let Some(usage) = usage {
            self.emitter.emit(TaskEventPayload::TokenUsage { usage });
        }

        // The transport must see exactly what the model produced; the
        // display side gets the parsed blocks with markup stripped.
        let raw = parser.raw_text().trim().to_string();
        if !raw.is_empty() {
            self.history.push(HistoryItem::assistant(raw));
        }
        self.persist(ConversationEntry::assistant(blocks.clone())).await;

        let tool_uses: Vec<ToolUse> = blocks
            .into_iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(tool) => Some(tool),
                ContentBlock::Text { .. } => None,
            })
            .collect();

        if tool_uses.is_empty() {
            if display.is_empty() {
                // Fully empty turn: natural termination.
                return Ok(TurnOutcome::Complete { result: None });
            }
            // Reasoning without tool use: steer the model back.
            debug!(task_id = %self.task_id, "turn produced no tool call, injecting steering message");
            self.history.push(HistoryItem::user(NO_TOOL_USE_MESSAGE));
            return Ok(TurnOutcome::Continue);
        }

        self.set_state(TaskState::AwaitingToolResults);
        let mut completion_result: Option<String> = None;

        // Sequential by design: later calls may depend on earlier side
        // effects, and permission prompts must not overlap.
        for mut call in tool_uses {
            let call_id = call.ensure_id().to_string();
            self.emitter.emit(TaskEventPayload::ToolCall { call: call.clone() });

            let result = self
                .executor
                .execute_tool(&call)
                .await
                .with_call_id(call_id.as_str());

            if call.name == COMPLETION_TOOL && !result.is_error {
                completion_result = Some(result.content.clone());
            }

            self.history.push(HistoryItem::tool_result(result.clone()));
            self.persist(ConversationEntry::tool_result(result.clone())).await;

            // A tool started before cancellation was observed runs to
            // completion; its result is not published afterwards.
            if self.cancel.is_cancelled() {
                return Ok(TurnOutcome::Cancelled);
            }
            self.emitter.emit(TaskEventPayload::ToolResult { result });

            if completion_result.is_some() {
                break;
            }
        }

        if let Some(result) = completion_result {
            return Ok(TurnOutcome::Complete {
                result: Some(result),
            });
        }
        Ok(TurnOutcome::Continue)
    }

    /// Publish incremental updates after one chunk, suppressing immaterial
    /// tool-call changes and unchanged display text.
    fn publish_partial(
        &self,
        blocks: &[ContentBlock],
        snapshots: &mut HashMap<usize, ToolCallSnapshot>,
        last_display: &mut String,
    ) {
        for (index, block) in blocks.iter().enumerate() {
            let ContentBlock::ToolUse(tool) = block else {
                continue;
            };
            let snapshot = ToolCallSnapshot::of(tool);
            if snapshots.get(&index) != Some(&snapshot) {
                snapshots.insert(index, snapshot);
                self.emitter.emit(TaskEventPayload::ToolCall { call: tool.clone() });
            }
        }

        let display = display_text(blocks);
        if !display.is_empty() && display != *last_display {
            *last_display = display.clone();
            self.emitter.emit(TaskEventPayload::StreamChunk {
                text: display,
                streaming: true,
            });
        }
    }

    async fn persist(&self, entry: ConversationEntry) {
        if let Err(err) = self.conversation.append(entry).await {
            warn!(task_id = %self.task_id, error = %err, "conversation store append failed");
        }
    }

    fn set_state(&self, state: TaskState) {
        let _ = self.state_tx.send(state);
    }

    // -- completion paths --
    //
    // Every terminal path funnels through `finish`, guarded by a single
    // latch, so diff finalization and the task-complete event fire at most
    // once per task.

    async fn finish_completed(mut self, result: Option<String>) -> TaskOutcome {
        self.finish(TaskState::Completed).await;
        TaskOutcome::Completed { result }
    }

    async fn finish_cancelled(mut self) -> TaskOutcome {
        self.finish(TaskState::Cancelled).await;
        TaskOutcome::Cancelled
    }

    async fn finish_failed(mut self, message: String) -> TaskOutcome {
        self.finish(TaskState::Completed).await;
        TaskOutcome::Failed { message }
    }

    async fn finish(&mut self, state: TaskState) {
        if self.completed {
            return;
        }
        self.completed = true;
        if let Some(diff) = self.diff_tracker.finalize().await {
            self.emitter.emit(TaskEventPayload::TaskDiff { diff });
        }
        self.emitter.emit(TaskEventPayload::TaskComplete);
        self.set_state(state);
        debug!(task_id = %self.task_id, turns = self.loop_count, ?state, "task finished");
    }
}

/// Concatenated non-empty text blocks, the running assistant display text.
fn display_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { content, .. } if !content.is_empty() => Some(content.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
