//! Shared test harness: a scripted mock link standing in for the mount

#![allow(dead_code)]

use mountlink_core::protocol::{
    CommandDispatcher, DeviceContext, DispatcherConfig, ProtocolError, Transport,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock mount does when a response is expected
#[derive(Debug, Clone)]
pub enum Reply {
    /// Terminated text response
    Text(String),
    /// Exact bytes, terminator included
    Raw(Vec<u8>),
    /// Receive bound expires
    Timeout,
    /// Link broken
    Fault(String),
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

/// Something a transport did on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Clear,
    Transmit(String),
    Receive(String),
    ReceiveFailed,
}

type Responder = Box<dyn FnMut(&str) -> Reply + Send>;

struct LinkState {
    events: Vec<(usize, Event)>,
    scripted: VecDeque<Reply>,
    transmit_failures: VecDeque<ProtocolError>,
    responder: Option<Responder>,
    last_command: String,
    latency: Duration,
}

/// The physical link; every [`MockTransport`] made from it shares one event log
#[derive(Clone)]
pub struct MockLink {
    state: Arc<Mutex<LinkState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LinkState {
                events: Vec::new(),
                scripted: VecDeque::new(),
                transmit_failures: VecDeque::new(),
                responder: None,
                last_command: String::new(),
                latency: Duration::ZERO,
            })),
        }
    }

    /// Answer by looking the transmitted command up in a table
    pub fn with_table(table: &[(&str, &str)]) -> Self {
        let table: HashMap<String, String> = table
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::with_responder(move |command| match table.get(command) {
            Some(reply) => Reply::Text(reply.clone()),
            None => Reply::Fault(format!("unexpected command {}", command)),
        })
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Reply + Send + 'static,
    {
        let link = Self::new();
        link.state.lock().unwrap().responder = Some(Box::new(responder));
        link
    }

    /// Queue a reply; queued replies win over the responder
    pub fn script(&self, reply: Reply) -> &Self {
        self.state.lock().unwrap().scripted.push_back(reply);
        self
    }

    /// Make the next transmit fail
    pub fn fail_next_transmit(&self, error: ProtocolError) {
        self.state.lock().unwrap().transmit_failures.push_back(error);
    }

    /// Time each transmit takes on the wire
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = latency;
    }

    pub fn transport(&self, id: usize) -> MockTransport {
        MockTransport {
            id,
            link: self.clone(),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.tagged_events().into_iter().map(|(_, e)| e).collect()
    }

    pub fn tagged_events(&self) -> Vec<(usize, Event)> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn transmitted(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Transmit(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn transmit_count(&self, command: &str) -> usize {
        self.transmitted().iter().filter(|c| *c == command).count()
    }

    fn record(&self, id: usize, event: Event) {
        self.state.lock().unwrap().events.push((id, event));
    }
}

/// One driver instance's view of the link
pub struct MockTransport {
    id: usize,
    link: MockLink,
}

impl Transport for MockTransport {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let command = String::from_utf8_lossy(bytes).to_string();
        self.link.record(self.id, Event::Transmit(command.clone()));

        let (failure, latency) = {
            let mut state = self.link.state.lock().unwrap();
            state.last_command = command;
            (state.transmit_failures.pop_front(), state.latency)
        };
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn receive_until(&mut self, terminator: u8) -> Result<Vec<u8>, ProtocolError> {
        let reply = {
            let mut state = self.link.state.lock().unwrap();
            let last = state.last_command.clone();
            match state.scripted.pop_front() {
                Some(reply) => reply,
                None => match state.responder.as_mut() {
                    Some(responder) => responder(&last),
                    None => Reply::Timeout,
                },
            }
        };

        let result = match reply {
            Reply::Text(text) => {
                let mut bytes = text.into_bytes();
                bytes.push(terminator);
                Ok(bytes)
            }
            Reply::Raw(bytes) => Ok(bytes),
            Reply::Timeout => Err(ProtocolError::TransportTimeout),
            Reply::Fault(msg) => Err(ProtocolError::TransportFault(msg)),
        };
        let event = match &result {
            Ok(bytes) => Event::Receive(String::from_utf8_lossy(bytes).to_string()),
            Err(_) => Event::ReceiveFailed,
        };
        self.link.record(self.id, event);
        result
    }

    fn clear_buffers(&mut self) -> Result<(), ProtocolError> {
        self.link.record(self.id, Event::Clear);
        Ok(())
    }
}

/// Tuning for tests: short bounds, no settle pause
pub fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        command_timeout: Duration::from_millis(500),
        settle_delay: Duration::ZERO,
    }
}

/// Dispatcher over a fresh, isolated device context
pub fn dispatcher(link: &MockLink, lock_dir: &Path) -> CommandDispatcher<MockTransport> {
    let context = Arc::new(DeviceContext::new("test.Mount", lock_dir));
    CommandDispatcher::new(link.transport(0), context, test_config())
}

/// Route library logs to the test harness; RUST_LOG picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
