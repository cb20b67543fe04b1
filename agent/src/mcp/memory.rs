//! In-memory backend adapter
//!
//! Models backend behaviour without spawning processes: a scripted tool
//! catalog, scripted call outcomes, and counters for launched/open sessions
//! and observed calls. Used by unit and integration tests; outside this
//! crate's own tests it needs the `test-util` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::session::{BackendLauncher, BackendSession, SessionError};
use super::types::{BackendDescriptor, ToolOutput, ToolSpec};

/// Build an MCP-shaped text result payload
pub fn text_payload(text: impl Into<String>) -> Value {
    json!({
        "content": [{"type": "text", "text": text.into()}],
        "isError": false,
    })
}

/// Outcome of the next call made against a memory backend
#[derive(Debug, Clone)]
pub enum ScriptedCall {
    Reply(Value),
    /// The backend answers with `isError: true`
    ToolError(String),
    Fail(SessionError),
    /// Never answers
    Hang,
    Delay(Duration, Value),
}

/// A call observed by a memory backend
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub tool: String,
    pub arguments: Option<Map<String, Value>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted behaviour and counters for one backend
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tools: Vec<ToolSpec>,
    launch_error: Option<String>,
    launch_delay: Option<Duration>,
    discovery_error: Option<SessionError>,
    close_delay: Option<Duration>,
    script: Arc<Mutex<VecDeque<ScriptedCall>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    launches: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool with an empty object schema
    pub fn tool(mut self, name: &str, description: &str) -> Self {
        self.tools.push(ToolSpec::new(
            name,
            description,
            json!({"type": "object", "properties": {}}),
        ));
        self
    }

    /// Queue the outcome of the next unanswered call
    pub fn script(self, call: ScriptedCall) -> Self {
        lock(&self.script).push_back(call);
        self
    }

    /// Queue an outcome on an already-registered backend
    pub fn push_script(&self, call: ScriptedCall) {
        lock(&self.script).push_back(call);
    }

    pub fn failing_launch(mut self, reason: &str) -> Self {
        self.launch_error = Some(reason.to_string());
        self
    }

    pub fn slow_launch(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    pub fn failing_discovery(mut self, error: SessionError) -> Self {
        self.discovery_error = Some(error);
        self
    }

    /// Sessions take this long to shut down
    pub fn slow_close(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    /// Calls received so far, in arrival order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Sessions launched and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Poll until at most `open` sessions remain; false if `within` elapses first
    pub async fn wait_for_open_sessions(&self, open: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while self.open_sessions() > open {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

/// Launcher resolving descriptors to registered memory backends by name
#[derive(Debug, Clone, Default)]
pub struct InMemoryLauncher {
    backends: HashMap<String, MemoryBackend>,
}

impl InMemoryLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, name: &str, backend: MemoryBackend) -> Self {
        self.backends.insert(name.to_string(), backend);
        self
    }

    pub fn backend(&self, name: &str) -> Option<&MemoryBackend> {
        self.backends.get(name)
    }

    /// Sessions still open across every backend
    pub fn open_sessions(&self) -> usize {
        self.backends.values().map(MemoryBackend::open_sessions).sum()
    }
}

#[async_trait]
impl BackendLauncher for InMemoryLauncher {
    async fn launch(
        &self,
        descriptor: &BackendDescriptor,
    ) -> Result<Arc<dyn BackendSession>, SessionError> {
        let backend = self.backends.get(&descriptor.name).cloned().ok_or_else(|| {
            SessionError::Launch(format!("command not found: {}", descriptor.command))
        })?;

        if let Some(delay) = backend.launch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &backend.launch_error {
            return Err(SessionError::Launch(reason.clone()));
        }

        backend.launches.fetch_add(1, Ordering::SeqCst);
        backend.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySession {
            backend,
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemorySession {
    backend: MemoryBackend,
    closed: AtomicBool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed("session closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendSession for MemorySession {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, SessionError> {
        self.ensure_open()?;
        if let Some(err) = &self.backend.discovery_error {
            return Err(err.clone());
        }
        Ok(self.backend.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutput, SessionError> {
        self.ensure_open()?;
        lock(&self.backend.calls).push(RecordedCall {
            tool: name.to_string(),
            arguments,
        });

        let next = lock(&self.backend.script).pop_front();
        let payload = match next {
            None => text_payload(format!("{} ok", name)),
            Some(ScriptedCall::Reply(payload)) => payload,
            Some(ScriptedCall::ToolError(message)) => {
                return Ok(ToolOutput {
                    payload: json!({
                        "content": [{"type": "text", "text": message}],
                        "isError": true,
                    }),
                    is_error: true,
                });
            }
            Some(ScriptedCall::Fail(err)) => return Err(err),
            Some(ScriptedCall::Hang) => std::future::pending().await,
            Some(ScriptedCall::Delay(delay, payload)) => {
                tokio::time::sleep(delay).await;
                payload
            }
        };

        Ok(ToolOutput {
            payload,
            is_error: false,
        })
    }

    async fn close(&self) -> Result<(), SessionError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Some(delay) = self.backend.close_delay {
                tokio::time::sleep(delay).await;
            }
            self.backend.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
