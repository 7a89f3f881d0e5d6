//! Mock transport for testing
//!
//! This transport stands in for an instrument without requiring hardware. It
//! provides:
//! - Scripted responses per exact command
//! - Controllable failure injection
//! - Call logging for test verification
//!
//! Clones share state, so a test can keep one handle while the driver owns
//! another.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One recorded transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `write(command)`
    Write(String),
    /// `ask(command)` or `ask_timeout(command, _)`
    Ask(String),
    /// `read_line()`
    Read,
    /// `clear()`
    Clear,
}

impl MockCall {
    /// Command text of a write or ask.
    pub fn command(&self) -> Option<&str> {
        match self {
            MockCall::Write(cmd) | MockCall::Ask(cmd) => Some(cmd),
            MockCall::Read | MockCall::Clear => None,
        }
    }
}

#[derive(Default)]
struct MockState {
    responses: HashMap<String, VecDeque<String>>,
    pending: VecDeque<String>,
    late: HashMap<String, String>,
    fail_next: Option<String>,
    calls: Vec<MockCall>,
}

/// Mock transport for testing
///
/// # Example
///
/// ```
/// use scpi_dmm::adapters::{MockTransport, Transport};
///
/// # tokio_test_block(async {
/// let mock = MockTransport::new().with_response(":read?", "+1.25E+00");
/// let mut transport = mock.clone();
/// assert_eq!(transport.ask(":read?").await.unwrap(), "+1.25E+00");
/// assert_eq!(mock.call_count(), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport with no scripted responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response to `command`.
    ///
    /// Several responses for the same command are served in order; the last
    /// one keeps being returned once the others are used up.
    pub fn with_response(self, command: &str, response: &str) -> Self {
        self.push_response(command, response);
        self
    }

    /// Script a response on an existing handle.
    pub fn push_response(&self, command: &str, response: &str) {
        self.lock()
            .responses
            .entry(command.to_string())
            .or_default()
            .push_back(response.to_string());
    }

    /// Answer the next timed query for `command` only after its deadline.
    ///
    /// `ask_timeout` fails with `Timeout` and `response` is left unread, the
    /// way a slow instrument's reply arrives after the caller gave up.
    pub fn with_late_response(self, command: &str, response: &str) -> Self {
        self.lock()
            .late
            .insert(command.to_string(), response.to_string());
        self
    }

    /// Make the next operation fail with `TransportError::Injected`.
    pub fn inject_next_failure(&self, reason: &str) {
        self.lock().fail_next = Some(reason.to_string());
    }

    /// Get the call log
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of transport operations performed so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Commands sent with `write`, in order.
    pub fn writes(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Write(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear the call log
    pub fn clear_log(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MockState {
    fn check_failure(&mut self) -> Result<(), TransportError> {
        match self.fail_next.take() {
            Some(reason) => Err(TransportError::Injected(reason)),
            None => Ok(()),
        }
    }

    fn response_for(&mut self, command: &str) -> Option<String> {
        let queue = self.responses.get_mut(command)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, command: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Write(command.to_string()));
        state.check_failure()?;

        if command.trim_end().ends_with('?') {
            if let Some(response) = state.response_for(command) {
                state.pending.push_back(response);
            }
        }
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Read);
        state.check_failure()?;

        state.pending.pop_front().ok_or(TransportError::Closed)
    }

    async fn ask(&mut self, command: &str) -> Result<String, TransportError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Ask(command.to_string()));
        state.check_failure()?;

        state.response_for(command).ok_or(TransportError::Closed)
    }

    async fn ask_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Ask(command.to_string()));
        state.check_failure()?;

        if let Some(response) = state.late.remove(command) {
            state.pending.push_back(response);
            return Err(TransportError::Timeout(timeout));
        }
        state.response_for(command).ok_or(TransportError::Closed)
    }

    async fn clear(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Clear);
        state.check_failure()?;
        state.pending.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "MockTransport".to_string()
    }
}
