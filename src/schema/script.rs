/// Narrative script engine boundary — the narrow interface the director
/// and modules consume. Parsing, branching and choice resolution live
/// behind this trait.
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A primitive value passed from the script engine to an external function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptValue {
    String(String),
    Float(f32),
    Int(i32),
    Bool(bool),
}

/// Severity reported through the engine's error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptErrorKind {
    Warning,
    Error,
}

/// An external function registered with the engine. Receives the raw
/// arguments of the call as evaluated by the script.
pub type ExternalFunction = Box<dyn FnMut(&[ScriptValue])>;

/// Callback invoked by the engine for warnings and runtime errors.
pub type ScriptErrorHandler = Box<dyn FnMut(&str, ScriptErrorKind)>;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script path not found: {0}")]
    PathNotFound(String),
    #[error("invalid story state: {0}")]
    State(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// The operations the director needs from a narrative script engine.
pub trait ScriptEngine {
    /// True while another line can be produced without player input.
    fn can_continue(&self) -> bool;

    /// Evaluate and return the next line. External functions referenced by
    /// the line are invoked during this call.
    fn continue_story(&mut self) -> String;

    /// Tags attached to the line most recently returned by `continue_story`.
    fn current_tags(&self) -> &[String];

    /// Move the execution cursor to a named path (e.g. `"intro.begin"`).
    fn choose_path(&mut self, path: &str) -> Result<(), ScriptError>;

    fn bind_external_function(&mut self, name: &str, function: ExternalFunction);

    /// Remove a binding. Unbinding a name that is not bound is a no-op.
    fn unbind_external_function(&mut self, name: &str);

    fn is_bound(&self, name: &str) -> bool;

    /// Serialize the engine state into an opaque JSON blob.
    fn state_to_json(&self) -> Result<String, ScriptError>;

    fn load_state_json(&mut self, json: &str) -> Result<(), ScriptError>;

    fn set_error_handler(&mut self, handler: ScriptErrorHandler);
}
