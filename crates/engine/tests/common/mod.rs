//! Shared fakes for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use engine::QueryExecutor;
use protocol::{ExecutorConfig, Request, Response, ToolkitError, Transport};
use serde_json::Value;
use tokio::time::Instant;

type Responder = Box<dyn Fn(&Request, usize) -> Result<Response, ToolkitError> + Send + Sync>;
type DelayFn = Box<dyn Fn(&Request) -> Duration + Send + Sync>;

/// Transport whose answers come from a closure, with call accounting.
pub struct ScriptedTransport {
    responder: Responder,
    delay: DelayFn,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// Answers call `n` with `outcomes[n]`, repeating the last outcome forever.
    pub fn sequence(outcomes: Vec<Result<Response, ToolkitError>>) -> Self {
        assert!(!outcomes.is_empty(), "sequence needs at least one outcome");
        Self::from_fn(move |_, call| outcomes[call.min(outcomes.len() - 1)].clone())
    }

    /// Answers every call with `responder(request, call_index)`.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&Request, usize) -> Result<Response, ToolkitError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: Box::new(|_| Duration::ZERO),
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sleeps `delay` inside every call.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    /// Sleeps `delay(request)` inside every call.
    pub fn with_delay_fn<F>(mut self, delay: F) -> Self
    where
        F: Fn(&Request) -> Duration + Send + Sync + 'static,
    {
        self.delay = Box::new(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Response, ToolkitError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = (self.delay)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.responder)(request, call)
    }
}

pub fn ok(data: Value) -> Result<Response, ToolkitError> {
    Ok(Response::from_data(data))
}

pub fn network(message: &str) -> Result<Response, ToolkitError> {
    Err(ToolkitError::Network {
        message: message.to_string(),
    })
}

pub fn rate_limited(secs: u64) -> Result<Response, ToolkitError> {
    Err(ToolkitError::RateLimited {
        retry_after: Duration::from_secs(secs),
    })
}

pub fn config(retry_attempts: u32) -> ExecutorConfig {
    let mut config = ExecutorConfig::new("test-key", "http://tracker.test/graphql");
    config.retry_attempts = retry_attempts;
    config.retry_delay = Duration::from_millis(100);
    config
}

pub fn executor(transport: &Arc<ScriptedTransport>, retry_attempts: u32) -> QueryExecutor {
    QueryExecutor::new(&config(retry_attempts), Arc::clone(transport) as Arc<dyn Transport>)
}
