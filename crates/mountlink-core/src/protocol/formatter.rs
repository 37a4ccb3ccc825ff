//! Command Formatter
//!
//! Frames mnemonics into wire commands and answers the table questions the
//! dispatcher asks about a framed command.
//!
//! Wire format: `#:<mnemonic><args>#`, responses terminated by `#`.
//!
//! The framed string doubles as the response-cache key, so raw (pre-framed)
//! and non-raw entry must normalize to the same text.

use std::collections::HashMap;
use std::time::Duration;

use super::commands::Mnemonic;

/// Prefix opening every framed command
pub const COMMAND_PREFIX: &str = "#:";

/// Byte terminating framed commands and responses
pub const TERMINATOR: u8 = b'#';

/// Frames commands and resolves cache/invalidation rules for framed commands
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    /// Write prefix -> cache keys it obsoletes, longest prefix first
    invalidation_map: Vec<(String, Vec<String>)>,
    /// Cache key -> lifetime
    cacheable: HashMap<String, Duration>,
    /// Prefixes of commands that need a post-transmit settle delay
    settle_prefixes: Vec<String>,
}

impl CommandFormatter {
    /// Build the formatter from the compiled command set
    pub fn new() -> Self {
        let mut invalidation_map: Vec<(String, Vec<String>)> = Mnemonic::ALL
            .iter()
            .filter(|m| !m.invalidates().is_empty())
            .map(|m| {
                let keys = m.invalidates().iter().map(|t| Self::key_for(*t)).collect();
                (Self::prefix_for(*m), keys)
            })
            .collect();
        invalidation_map.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let cacheable = Mnemonic::ALL
            .iter()
            .filter_map(|m| m.cache_ttl().map(|ttl| (Self::key_for(*m), ttl)))
            .collect();

        let settle_prefixes = Mnemonic::ALL
            .iter()
            .filter(|m| m.needs_settle_delay())
            .map(|m| Self::prefix_for(*m))
            .collect();

        Self {
            invalidation_map,
            cacheable,
            settle_prefixes,
        }
    }

    /// Wrap a mnemonic (with any arguments) in prefix and terminator
    pub fn frame(mnemonic: &str) -> String {
        format!("{}{}{}", COMMAND_PREFIX, mnemonic.trim(), TERMINATOR as char)
    }

    /// Frame a command unless it is already framed
    ///
    /// Raw input is only trimmed, so `"#:GR#"` and `"GR"` land on the same key.
    pub fn normalize(command: &str, raw: bool) -> String {
        if raw {
            command.trim().to_string()
        } else {
            Self::frame(command)
        }
    }

    /// Frame a mnemonic from the command set followed by its arguments
    pub fn frame_mnemonic(mnemonic: Mnemonic, args: &str) -> String {
        Self::frame(&format!("{}{}", mnemonic.code(), args))
    }

    /// Cache key of an argument-less query
    pub fn key_for(mnemonic: Mnemonic) -> String {
        Self::frame(mnemonic.code())
    }

    /// Framed prefix used to recognise a command regardless of its arguments
    fn prefix_for(mnemonic: Mnemonic) -> String {
        format!("{}{}", COMMAND_PREFIX, mnemonic.code())
    }

    /// Cache keys made stale by sending this framed command
    ///
    /// Longest matching write prefix wins; commands that change nothing
    /// return an empty slice.
    pub fn invalidation_targets(&self, wire: &str) -> &[String] {
        self.invalidation_map
            .iter()
            .find(|(prefix, _)| wire.starts_with(prefix.as_str()))
            .map(|(_, keys)| keys.as_slice())
            .unwrap_or(&[])
    }

    /// Cache lifetime for a framed query, `None` if its answer is never cached
    pub fn cache_ttl(&self, wire: &str) -> Option<Duration> {
        self.cacheable.get(wire).copied()
    }

    /// Check if the firmware needs a pause after this framed command
    pub fn needs_settle_delay(&self, wire: &str) -> bool {
        self.settle_prefixes
            .iter()
            .any(|prefix| wire.starts_with(prefix.as_str()))
    }

    /// Cacheable keys and their lifetimes
    pub fn cache_table(&self) -> impl Iterator<Item = (&str, Duration)> + '_ {
        self.cacheable.iter().map(|(k, ttl)| (k.as_str(), *ttl))
    }

    /// Remove trailing terminators from a response
    pub fn strip_terminator(response: &str) -> &str {
        response.trim_end_matches(TERMINATOR as char)
    }
}

impl Default for CommandFormatter {
    fn default() -> Self {
        Self::new()
    }
}
