/// Line script — a small in-memory narrative engine.
///
/// Knots are flat lists of lines addressed by path (`"intro.begin"`). A line
/// carries its text, its tags, the external calls evaluated when the line
/// is produced, and an optional divert to another path.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::schema::script::{
    ExternalFunction, ScriptEngine, ScriptError, ScriptErrorHandler, ScriptErrorKind, ScriptValue,
};

/// An external function call evaluated when its line is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCall {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ScriptValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub calls: Vec<ExternalCall>,
    #[serde(default)]
    pub divert: Option<String>,
}

/// The serializable script content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptSource {
    pub knots: HashMap<String, Vec<ScriptLine>>,
}

/// Execution cursor, persisted as the story state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Cursor {
    path: Option<String>,
    index: usize,
}

pub struct LineScript {
    source: ScriptSource,
    cursor: Cursor,
    current_tags: Vec<String>,
    functions: FxHashMap<String, ExternalFunction>,
    error_handler: Option<ScriptErrorHandler>,
}

impl LineScript {
    pub fn new(source: ScriptSource) -> Self {
        Self {
            source,
            cursor: Cursor::default(),
            current_tags: Vec::new(),
            functions: FxHashMap::default(),
            error_handler: None,
        }
    }

    pub fn load_from_ron(path: &Path) -> Result<LineScript, ScriptError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<LineScript, ScriptError> {
        let source: ScriptSource = ron::from_str(input)?;
        Ok(Self::new(source))
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    pub fn current_path(&self) -> Option<&str> {
        self.cursor.path.as_deref()
    }

    /// Call an external function as if the script had evaluated it.
    /// Unbound names fall back to a warning.
    pub fn invoke(&mut self, name: &str, args: &[ScriptValue]) {
        match self.functions.get_mut(name) {
            Some(function) => function(args),
            None => self.report(
                &format!("external function '{}' is not bound; call ignored", name),
                ScriptErrorKind::Warning,
            ),
        }
    }

    fn report(&mut self, message: &str, kind: ScriptErrorKind) {
        match self.error_handler.as_mut() {
            Some(handler) => handler(message, kind),
            None => match kind {
                ScriptErrorKind::Warning => log::warn!("{}", message),
                ScriptErrorKind::Error => log::error!("{}", message),
            },
        }
    }

    fn current_line(&self) -> Option<&ScriptLine> {
        let path = self.cursor.path.as_ref()?;
        self.source.knots.get(path)?.get(self.cursor.index)
    }
}

impl ScriptEngine for LineScript {
    fn can_continue(&self) -> bool {
        self.current_line().is_some()
    }

    fn continue_story(&mut self) -> String {
        let Some(line) = self.current_line().cloned() else {
            self.report("continue called with no content left", ScriptErrorKind::Error);
            return String::new();
        };

        match line.divert {
            Some(ref target) if self.source.knots.contains_key(target) => {
                self.cursor = Cursor {
                    path: Some(target.clone()),
                    index: 0,
                };
            }
            Some(ref target) => {
                self.report(
                    &format!("divert target '{}' not found", target),
                    ScriptErrorKind::Error,
                );
                self.cursor.index += 1;
            }
            None => self.cursor.index += 1,
        }

        for call in &line.calls {
            self.invoke(&call.name, &call.args);
        }

        self.current_tags = line.tags;
        line.text
    }

    fn current_tags(&self) -> &[String] {
        &self.current_tags
    }

    fn choose_path(&mut self, path: &str) -> Result<(), ScriptError> {
        if !self.source.knots.contains_key(path) {
            return Err(ScriptError::PathNotFound(path.to_string()));
        }
        self.cursor = Cursor {
            path: Some(path.to_string()),
            index: 0,
        };
        self.current_tags.clear();
        Ok(())
    }

    fn bind_external_function(&mut self, name: &str, function: ExternalFunction) {
        self.functions.insert(name.to_string(), function);
    }

    fn unbind_external_function(&mut self, name: &str) {
        self.functions.remove(name);
    }

    fn is_bound(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn state_to_json(&self) -> Result<String, ScriptError> {
        Ok(serde_json::to_string(&self.cursor)?)
    }

    fn load_state_json(&mut self, json: &str) -> Result<(), ScriptError> {
        let cursor: Cursor = serde_json::from_str(json)?;
        if let Some(ref path) = cursor.path {
            if !self.source.knots.contains_key(path) {
                return Err(ScriptError::PathNotFound(path.clone()));
            }
        }
        self.cursor = cursor;
        self.current_tags.clear();
        Ok(())
    }

    fn set_error_handler(&mut self, handler: ScriptErrorHandler) {
        self.error_handler = Some(handler);
    }
}
