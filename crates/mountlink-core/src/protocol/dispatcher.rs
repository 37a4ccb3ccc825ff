//! Command dispatch
//!
//! Serializes all traffic to one mount over a half-duplex link. Each call to
//! [`CommandDispatcher::execute`] runs inside an exclusive session:
//!
//! 1. acquire the device's session lock (bounded by the command timeout)
//! 2. serve fresh cached answers without touching the link
//! 3. invalidate cached answers the command makes stale, then transmit
//! 4. read the terminated response (sync only) and cache it if cacheable
//! 5. retry once on a receive timeout
//!
//! The session is a drop guard, so it is released on every exit path.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use super::{
    cache::ResponseCache,
    commands::{CommandKind, Mnemonic},
    formatter::{CommandFormatter, TERMINATOR},
    lock::SessionLock,
    ProtocolError, Transport, DEFAULT_TIMEOUT_MS,
};
use crate::config::DriverSettings;

/// Dispatcher tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Bound for acquiring the session
    pub command_timeout: Duration,
    /// Pause after commands the firmware needs time to digest
    pub settle_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

/// Per-device state shared by every dispatcher talking to that device
///
/// Holds the session lock handle, the compiled command tables and the
/// response cache.
#[derive(Debug)]
pub struct DeviceContext {
    lock: SessionLock,
    formatter: CommandFormatter,
    cache: ResponseCache,
}

type Registry = Mutex<HashMap<PathBuf, Weak<DeviceContext>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

impl DeviceContext {
    /// Create an independent context with an empty cache
    pub fn new(device_id: &str, lock_dir: &Path) -> Self {
        let formatter = CommandFormatter::new();
        let cache = ResponseCache::from_formatter(&formatter);
        Self {
            lock: SessionLock::new(device_id, lock_dir),
            formatter,
            cache,
        }
    }

    /// Get the process-wide context for a device, creating it on first use
    ///
    /// Dispatchers built from the same device identity and lock directory
    /// share one cache for as long as any of them is alive.
    pub fn shared(device_id: &str, lock_dir: &Path) -> Arc<Self> {
        let candidate = Self::new(device_id, lock_dir);
        let key = candidate.lock.path().to_path_buf();

        let mut contexts = registry().lock();
        if let Some(existing) = contexts.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        contexts.retain(|_, weak| weak.strong_count() > 0);
        let context = Arc::new(candidate);
        contexts.insert(key, Arc::downgrade(&context));
        debug!(device = device_id, "device context created");
        context
    }

    /// Device identity
    pub fn device_id(&self) -> &str {
        self.lock.device_id()
    }

    /// Session lock for this device
    pub fn session_lock(&self) -> &SessionLock {
        &self.lock
    }

    /// Response cache for this device
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Compiled command tables
    pub fn formatter(&self) -> &CommandFormatter {
        &self.formatter
    }
}

/// Check if a bool-query response means success
pub fn is_affirmative(response: &str) -> bool {
    matches!(response, "1" | "Ok")
}

/// Orchestrates exclusion, caching and retry around a [`Transport`]
pub struct CommandDispatcher<T: Transport> {
    transport: Mutex<T>,
    context: Arc<DeviceContext>,
    config: DispatcherConfig,
}

impl<T: Transport> CommandDispatcher<T> {
    /// Create a dispatcher over an explicit context
    pub fn new(transport: T, context: Arc<DeviceContext>, config: DispatcherConfig) -> Self {
        Self {
            transport: Mutex::new(transport),
            context,
            config,
        }
    }

    /// Create a dispatcher sharing the process-wide context of the configured device
    pub fn from_settings(transport: T, settings: &DriverSettings) -> Self {
        let context = DeviceContext::shared(&settings.device_id, &settings.resolved_lock_dir());
        Self::new(transport, context, settings.dispatcher_config())
    }

    /// Device context this dispatcher works in
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.context
    }

    /// Dispatcher tuning
    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    /// Send a command and return its response
    ///
    /// * `raw` - the command is already framed and is sent as is
    /// * `asynchronous` - do not wait for a response; returns `""`
    ///
    /// Empty or whitespace-only commands return `""` without touching the
    /// link or the cache.
    pub fn execute(
        &self,
        command: &str,
        raw: bool,
        asynchronous: bool,
    ) -> Result<String, ProtocolError> {
        if command.trim().is_empty() {
            return Ok(String::new());
        }

        let wire = CommandFormatter::normalize(command, raw);
        let session = self
            .context
            .lock
            .acquire(self.config.command_timeout)
            .inspect_err(|e| error!(command = %wire, error = %e, "could not acquire session"))?;
        trace!(command = %wire, recovered = session.recovered_abandoned(), "session acquired");

        let result = {
            let mut transport = self.transport.lock();
            self.run_session(&mut *transport, &wire, asynchronous)
        };
        drop(session);

        if let Err(e) = &result {
            error!(command = %wire, error = %e, "command failed");
        }
        result
    }

    /// Steps run while holding the session
    fn run_session(
        &self,
        transport: &mut T,
        wire: &str,
        asynchronous: bool,
    ) -> Result<String, ProtocolError> {
        let cache = &self.context.cache;

        if !asynchronous {
            if let Some(hit) = cache.lookup(wire) {
                debug!(command = %wire, response = %hit, "served from cache");
                return Ok(hit);
            }
        }

        // Stale-soon answers must be gone before the write reaches the mount
        for key in self.context.formatter.invalidation_targets(wire) {
            cache.invalidate(key);
            trace!(command = %wire, key = %key, "cache entry invalidated");
        }

        transport.clear_buffers()?;
        match self.exchange(transport, wire, asynchronous) {
            Err(e) if e.is_retryable() => {
                warn!(command = %wire, error = %e, "transport timeout, retrying once");
                transport.clear_buffers()?;
                self.exchange(transport, wire, asynchronous)
            }
            other => other,
        }
    }

    /// One transmit (and receive, when synchronous)
    fn exchange(
        &self,
        transport: &mut T,
        wire: &str,
        asynchronous: bool,
    ) -> Result<String, ProtocolError> {
        let started = Instant::now();
        debug!(command = %wire, asynchronous, "request");
        transport.transmit(wire.as_bytes())?;

        if asynchronous {
            let settle = self.config.settle_delay;
            if self.context.formatter.needs_settle_delay(wire) && !settle.is_zero() {
                trace!(
                    command = %wire,
                    delay_ms = settle.as_millis() as u64,
                    "settling"
                );
                std::thread::sleep(settle);
            }
            return Ok(String::new());
        }

        let bytes = transport.receive_until(TERMINATOR)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            ProtocolError::MalformedResponse(format!("non-ASCII response to {}: {}", wire, e))
        })?;
        let response = CommandFormatter::strip_terminator(&text).to_string();
        let cached = self.context.cache.store(wire, &response);

        debug!(
            command = %wire,
            response = %response,
            cached,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response"
        );
        Ok(response)
    }

    /// Fire-and-forget command
    pub fn command_blind(&self, command: &str, raw: bool) -> Result<(), ProtocolError> {
        self.execute(command, raw, true).map(|_| ())
    }

    /// Command answered with success ("1"/"Ok") or failure
    pub fn command_bool(&self, command: &str, raw: bool) -> Result<bool, ProtocolError> {
        self.execute(command, raw, false)
            .map(|response| is_affirmative(&response))
    }

    /// Command answered with a terminated string
    pub fn command_string(&self, command: &str, raw: bool) -> Result<String, ProtocolError> {
        self.execute(command, raw, false)
    }

    /// Send a mnemonic from the command set, waiting for a response unless it is blind
    pub fn send(&self, mnemonic: Mnemonic, args: &str) -> Result<String, ProtocolError> {
        let wire = CommandFormatter::frame_mnemonic(mnemonic, args);
        self.execute(&wire, true, mnemonic.kind() == CommandKind::Blind)
    }

    /// Send a bool-query mnemonic
    pub fn send_bool(&self, mnemonic: Mnemonic, args: &str) -> Result<bool, ProtocolError> {
        self.send(mnemonic, args)
            .map(|response| is_affirmative(&response))
    }
}
