//! Formatting context threaded through schema lowering.

/// Settings that hold for a whole compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeSettings {
    pub allow_new_lines: bool,
    pub scope_pad_spaces: u32,
}

/// Immutable per-depth state. `descend` is the only way to get a child scope,
/// so sibling subtrees each derive their own copy from the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeState {
    pub settings: ScopeSettings,
    pub nesting_depth: u32,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self { allow_new_lines: true, scope_pad_spaces: 4 }
    }
}

impl ScopeState {
    pub fn new(settings: ScopeSettings) -> Self {
        Self { settings, nesting_depth: 0 }
    }

    pub fn descend(&self) -> Self {
        Self { settings: self.settings, nesting_depth: self.nesting_depth + 1 }
    }

    /// Same depth, newlines switched off. Used for values nested inside
    /// free-form JSON, which is always rendered on one line.
    pub fn without_new_lines(&self) -> Self {
        Self {
            settings: ScopeSettings { allow_new_lines: false, ..self.settings },
            nesting_depth: self.nesting_depth,
        }
    }

    pub fn allow_new_lines(&self) -> bool {
        self.settings.allow_new_lines
    }

    pub fn pad_spaces(&self) -> u32 {
        self.settings.scope_pad_spaces
    }
}

impl Default for ScopeState {
    fn default() -> Self {
        Self::new(ScopeSettings::default())
    }
}
