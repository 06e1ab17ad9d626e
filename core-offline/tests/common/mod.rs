#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::network::{ConnectivitySignal, ConnectivitySource, NetworkChangeStream};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Canned reply for [`ScriptedHttpClient`].
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Status(u16, &'static str),
    Timeout,
    Refused,
}

/// HTTP client that answers from a script, then from a fallback reply.
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<String>>,
}

impl ScriptedHttpClient {
    pub fn new(fallback: Reply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, reply: Reply) -> Self {
        self.script.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(request.url.clone());
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        match reply {
            Reply::Status(status, body) => Ok(HttpResponse::new(status, body)),
            Reply::Timeout => Err(BridgeError::Timeout),
            Reply::Refused => Err(BridgeError::Connection("connection refused".into())),
        }
    }
}

/// Connectivity source driven by the test.
pub struct ManualConnectivity {
    current: Mutex<ConnectivitySignal>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConnectivitySignal>>>,
}

impl ManualConnectivity {
    pub fn new(signal: ConnectivitySignal) -> Self {
        Self {
            current: Mutex::new(signal),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn offline() -> Self {
        Self::new(ConnectivitySignal::offline())
    }

    pub fn online() -> Self {
        Self::new(ConnectivitySignal::new(true, "wifi"))
    }

    /// Report a platform change to every subscriber.
    pub fn push(&self, signal: ConnectivitySignal) {
        *self.current.lock().unwrap() = signal.clone();
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Wait until a change stream has been opened.
    pub async fn wait_for_subscriber(&self) {
        for _ in 0..100 {
            if self.subscriber_count() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no connectivity subscriber registered");
    }
}

#[async_trait]
impl ConnectivitySource for ManualConnectivity {
    fn current(&self) -> Result<ConnectivitySignal> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        Ok(Box::new(ChannelStream(rx)))
    }
}

struct ChannelStream(mpsc::UnboundedReceiver<ConnectivitySignal>);

#[async_trait]
impl NetworkChangeStream for ChannelStream {
    async fn next(&mut self) -> Option<ConnectivitySignal> {
        self.0.recv().await
    }
}
