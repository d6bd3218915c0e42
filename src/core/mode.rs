use std::collections::HashSet;
use std::fmt;

use crate::error::SessionError;
use crate::tools::ToolRef;

/// Name of the implicit mode used when no modes are configured.
pub const DEFAULT_MODE_NAME: &str = "default";

/// A named bundle of tools plus an optional message sent to the model on entry.
#[derive(Clone)]
pub struct Mode {
    name: String,
    capabilities: Vec<ToolRef>,
    switch_message: Option<String>,
}

impl Mode {
    pub fn new(name: impl Into<String>, capabilities: Vec<ToolRef>) -> Self {
        Self {
            name: name.into(),
            capabilities,
            switch_message: None,
        }
    }

    /// An empty message is treated as no message.
    pub fn with_switch_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.switch_message = if message.trim().is_empty() {
            None
        } else {
            Some(message)
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &[ToolRef] {
        &self.capabilities
    }

    pub fn switch_message(&self) -> Option<&str> {
        self.switch_message.as_deref()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|t| t.name()).collect()
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mode")
            .field("name", &self.name)
            .field("capabilities", &self.tool_names())
            .field("switch_message", &self.switch_message)
            .finish()
    }
}

/// The configured modes of a session, in configuration order.
#[derive(Debug, Clone)]
pub struct ModeRegistry {
    modes: Vec<Mode>,
    initial: usize,
    enabled: bool,
}

impl ModeRegistry {
    /// Build a registry. An empty list disables modes; otherwise `initial`
    /// must name one of the modes and defaults to the first.
    pub fn new(modes: Vec<Mode>, initial: Option<&str>) -> Result<Self, SessionError> {
        if modes.is_empty() {
            if let Some(name) = initial {
                return Err(SessionError::Config(format!(
                    "initial mode \"{}\" given but no modes are configured",
                    name
                )));
            }
            return Ok(Self::tools_only(Vec::new()));
        }

        let mut seen = HashSet::new();
        for mode in &modes {
            if mode.name.trim().is_empty() {
                return Err(SessionError::Config("mode names must not be empty".to_string()));
            }
            if !seen.insert(mode.name.as_str()) {
                return Err(SessionError::Config(format!(
                    "duplicate mode name \"{}\"",
                    mode.name
                )));
            }
        }

        let initial = match initial {
            None => 0,
            Some(name) => modes.iter().position(|m| m.name == name).ok_or_else(|| {
                SessionError::Config(format!(
                    "initial mode \"{}\" is not one of: {}",
                    name,
                    modes.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join(", ")
                ))
            })?,
        };

        Ok(Self {
            modes,
            initial,
            enabled: true,
        })
    }

    /// Modes disabled; the implicit default mode carries `capabilities`.
    pub fn tools_only(capabilities: Vec<ToolRef>) -> Self {
        Self {
            modes: vec![Mode::new(DEFAULT_MODE_NAME, capabilities)],
            initial: 0,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of configured modes (zero when disabled).
    pub fn len(&self) -> usize {
        if self.enabled {
            self.modes.len()
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn initial(&self) -> &Mode {
        &self.modes[self.initial]
    }

    pub fn lookup(&self, name: &str) -> Result<&Mode, SessionError> {
        if self.enabled {
            if let Some(mode) = self.modes.iter().find(|m| m.name == name) {
                return Ok(mode);
            }
        }
        Err(SessionError::UnknownMode {
            name: name.to_string(),
            available: self.all_names().into_iter().map(str::to_string).collect(),
        })
    }

    pub fn all_names(&self) -> Vec<&str> {
        if !self.enabled {
            return Vec::new();
        }
        self.modes.iter().map(|m| m.name.as_str()).collect()
    }

    /// Successor of `name` in circular order, `None` with fewer than two modes.
    pub fn next_after(&self, name: &str) -> Option<&str> {
        if self.len() < 2 {
            return None;
        }
        let index = self.modes.iter().position(|m| m.name == name)?;
        Some(self.modes[(index + 1) % self.modes.len()].name.as_str())
    }
}
