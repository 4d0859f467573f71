use serde::{Deserialize, Serialize};

use crate::errors::{MirrorError, Result};

/// Where trace output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutput {
    /// No tracing; warnings and errors still reach stderr.
    None,
    /// Trace to stdout.
    Console,
    /// Trace to an already-open file descriptor.
    Descriptor(i32),
}

impl TraceOutput {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, TraceOutput::None)
    }

    fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "" | "none" | "off" => Ok(TraceOutput::None),
            "console" | "stdout" => Ok(TraceOutput::Console),
            other => other
                .strip_prefix("fd:")
                .and_then(|fd| fd.parse::<i32>().ok())
                .filter(|fd| *fd >= 0)
                .map(TraceOutput::Descriptor)
                .ok_or_else(|| {
                    MirrorError::Configuration(format!("unrecognised trace output '{}'", other))
                }),
        }
    }
}

/// Startup configuration for the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Trace output destination
    pub trace_output: TraceOutput,

    /// Check managed handles before they enter the tables
    pub validate_references: bool,

    /// Running inside an embedding host rather than a standalone launcher
    pub embedded: bool,

    /// Maximum nesting of native calls
    pub max_call_depth: usize,

    /// Initial slot count of the mirror table
    pub initial_table_capacity: usize,

    /// Initial slot count of the global reference cache
    pub initial_ref_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            trace_output: TraceOutput::None,
            validate_references: false,
            embedded: false,
            max_call_depth: 16,
            initial_table_capacity: 64,
            initial_ref_capacity: 64,
        }
    }
}

pub const ENV_TRACE: &str = "RFFI_TRACE";
pub const ENV_VALIDATE_REFS: &str = "RFFI_VALIDATE_REFS";
pub const ENV_EMBEDDED: &str = "RFFI_EMBEDDED";
pub const ENV_MAX_CALL_DEPTH: &str = "RFFI_MAX_CALL_DEPTH";

impl BridgeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(json)
            .map_err(|e| MirrorError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `RFFI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BridgeConfig::default();
        if let Some(value) = lookup(ENV_TRACE) {
            config.trace_output = TraceOutput::parse(&value)?;
        }
        if let Some(value) = lookup(ENV_VALIDATE_REFS) {
            config.validate_references = parse_flag(ENV_VALIDATE_REFS, &value)?;
        }
        if let Some(value) = lookup(ENV_EMBEDDED) {
            config.embedded = parse_flag(ENV_EMBEDDED, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CALL_DEPTH) {
            config.max_call_depth = value.trim().parse().map_err(|_| {
                MirrorError::Configuration(format!("{} must be a number, got '{}'", ENV_MAX_CALL_DEPTH, value))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_trace_output(mut self, trace_output: TraceOutput) -> Self {
        self.trace_output = trace_output;
        self
    }

    pub fn with_validate_references(mut self, validate: bool) -> Self {
        self.validate_references = validate;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_initial_table_capacity(mut self, capacity: usize) -> Self {
        self.initial_table_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_call_depth == 0 {
            return Err(MirrorError::Configuration(
                "max_call_depth must be at least 1".to_string(),
            ));
        }
        if self.initial_table_capacity == 0 || self.initial_ref_capacity == 0 {
            return Err(MirrorError::Configuration(
                "table capacities must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(MirrorError::Configuration(format!(
            "{} must be on or off, got '{}'",
            key, value
        ))),
    }
}
