use std::fmt;

use crate::error::{ModelError, Result};

/// Lifecycle of a `GraphModel`.
///
/// `Created → Compiled → Built → Closed`. A model is built lazily by the
/// first operation that needs variables; `close` can happen from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Created,
    Compiled,
    Built,
    Closed,
}

impl ModelState {
    pub fn is_closed(&self) -> bool {
        *self == ModelState::Closed
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ModelError::ModelClosed);
        }
        Ok(())
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelState::Created => "created",
            ModelState::Compiled => "compiled",
            ModelState::Built => "built",
            ModelState::Closed => "closed",
        };
        f.write_str(name)
    }
}
