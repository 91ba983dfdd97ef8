//! JSON configuration schema and loading.
//!
//! The configuration document describes the board, the real-time thread
//! frequencies, and the module list:
//!
//! ```json
//! {
//!     "Board": "PRU-Core",
//!     "Threads": [
//!         { "Thread": "Base",  "Frequency": 40000 },
//!         { "Thread": "Servo", "Frequency": 1000 }
//!     ],
//!     "Modules": [
//!         { "Thread": "Servo", "Type": "PWM", "PWM Pin": "PA_6", ... }
//!     ]
//! }
//! ```
//!
//! Module entries carry type-specific fields; they are kept as raw JSON and
//! read through typed accessors by each module constructor. The loader
//! resolves every entry's `ThreadFreq` from its thread name before module
//! construction.

use crate::protocol::{BASE_FREQ_DEFAULT, SERVO_FREQ_DEFAULT, THREAD_BASE, THREAD_SERVO};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

/// Built-in fallback document: a single Blink on the servo thread. Used when
/// the storage collaborator has no stored configuration.
pub const DEFAULT_DOCUMENT: &str = r#"{
    "Board": "PRU-Core",
    "Modules": [
        {
            "Thread": "Servo",
            "Type": "Blink",
            "Comment": "Blinky",
            "Pin": "PB_0",
            "Frequency": 4
        }
    ]
}"#;

/// Error type for configuration loading.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// JSON parsing failed.
    #[error("failed to parse configuration document: {0}")]
    ParseFailed(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// One entry of the `Threads` list.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadConfig {
    /// Thread name ("Base" or "Servo").
    #[serde(rename = "Thread")]
    pub thread: String,

    /// Target update frequency [Hz].
    #[serde(rename = "Frequency")]
    pub frequency: u32,
}

/// One entry of the `Modules` list.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Thread the module runs on ("Base", "Servo", or "On load").
    #[serde(rename = "Thread")]
    pub thread: String,

    /// Module type tag ("PWM", "QEI", ...).
    #[serde(rename = "Type")]
    pub type_tag: String,

    /// Free-form comment, echoed to the log during load.
    #[serde(rename = "Comment", default)]
    pub comment: Option<String>,

    /// Type-specific fields, read through the typed accessors below.
    #[serde(flatten)]
    pub fields: Map<String, Value>,

    /// Update frequency of the owning thread [Hz], resolved by
    /// [`BoardConfig::resolve_thread_freqs`]. 0 for on-load modules.
    #[serde(skip)]
    pub thread_freq: u32,
}

impl ModuleConfig {
    /// String-valued field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Integer-valued field, narrowed to `u32`.
    pub fn u32_field(&self, key: &str) -> Option<u32> {
        self.fields.get(key).and_then(Value::as_u64).map(|v| v as u32)
    }

    /// Index-valued field, narrowed to `usize`.
    pub fn index_field(&self, key: &str) -> Option<usize> {
        self.fields.get(key).and_then(Value::as_u64).map(|v| v as usize)
    }

    /// Float-valued field (accepts integer JSON numbers too).
    pub fn f32_field(&self, key: &str) -> Option<f32> {
        self.fields.get(key).and_then(Value::as_f64).map(|v| v as f32)
    }

    /// "True"/"False" string flag, as the host tooling emits them.
    pub fn flag_field(&self, key: &str) -> bool {
        self.str_field(key) == Some("True")
    }
}

/// Parsed configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    /// Board name, informational.
    #[serde(rename = "Board", default)]
    pub board: String,

    /// Real-time thread frequencies. Missing entries fall back to the
    /// build-time defaults.
    #[serde(rename = "Threads", default)]
    pub threads: Vec<ThreadConfig>,

    /// Module list. A missing array is treated as empty, not as an error.
    #[serde(rename = "Modules", default)]
    pub modules: Vec<ModuleConfig>,
}

impl BoardConfig {
    /// Parse and validate a configuration document from raw bytes.
    pub fn from_slice(content: &[u8]) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_slice(content)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        config.resolve_thread_freqs();
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for thread in &self.threads {
            if thread.frequency == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "thread '{}' has zero frequency",
                    thread.thread
                )));
            }
        }
        Ok(())
    }

    /// Frequency of the named thread, or `None` if the document does not
    /// list it.
    pub fn thread_freq(&self, name: &str) -> Option<u32> {
        self.threads
            .iter()
            .find(|t| t.thread == name)
            .map(|t| t.frequency)
    }

    /// Base thread frequency [Hz], defaulted when not configured.
    pub fn base_freq(&self) -> u32 {
        self.thread_freq(THREAD_BASE).unwrap_or(BASE_FREQ_DEFAULT)
    }

    /// Servo thread frequency [Hz], defaulted when not configured.
    pub fn servo_freq(&self) -> u32 {
        self.thread_freq(THREAD_SERVO).unwrap_or(SERVO_FREQ_DEFAULT)
    }

    /// Stamp every module entry with its owning thread's frequency.
    ///
    /// Entries bound to a thread the document does not name (e.g. "On load")
    /// resolve to 0.
    fn resolve_thread_freqs(&mut self) {
        let base = self.base_freq();
        let servo = self.servo_freq();
        info!("Thread frequencies: base={base}Hz, servo={servo}Hz");

        for module in &mut self.modules {
            module.thread_freq = match module.thread.as_str() {
                THREAD_BASE => base,
                THREAD_SERVO => servo,
                _ => 0,
            };
        }
    }
}
