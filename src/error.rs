use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `prism`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; user handler code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum EngineError {
    // ── Schema registration ─────────────────────────────────────────────
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),

    // ── State instance ──────────────────────────────────────────────────
    #[error("state: {0}")]
    State(#[from] StateError),

    // ── Session ─────────────────────────────────────────────────────────
    #[error("session: {0}")]
    Session(#[from] SessionError),

    // ── Event dispatch ──────────────────────────────────────────────────
    #[error("dispatch: {0}")]
    Dispatch(#[from] DispatchError),

    // ── Scheduled tasks ─────────────────────────────────────────────────
    #[error("task: {0}")]
    Task(#[from] TaskError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Schema registration errors ─────────────────────────────────────────────
//
// These fire while a state type is being registered. They indicate a
// programming defect, so registration aborts instead of degrading.

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("computed var '{var}' depends on itself")]
    CyclicComputed { var: String },

    #[error("handler '{name}' collides with the derived setter of a base var")]
    HandlerCollision { name: String },

    #[error("var '{name}' is declared twice")]
    DuplicateVar { name: String },

    #[error("handler '{name}' is declared twice")]
    DuplicateHandler { name: String },

    #[error("state type '{name}' is already registered")]
    DuplicateStateType { name: String },
}

// ─── State instance errors ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot assign computed var '{var}'; computed vars are derived, not set")]
    ReadOnly { var: String },

    #[error("unknown var '{var}'")]
    UnknownVar { var: String },
}

// ─── Session errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session no longer exists: {session_id}")]
    Gone { session_id: String },
}

// ─── Dispatch errors ────────────────────────────────────────────────────────
//
// Per-invocation failures. They travel back inside the dispatch outcome next
// to whatever partial delta was produced; they never crash the serving
// process.

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown state type '{name}'")]
    UnknownStateType { name: String },

    #[error("unknown handler '{name}'")]
    UnknownHandler { name: String },

    #[error("invalid argument for handler '{handler}': {reason}")]
    InvalidArgument { handler: String, reason: String },

    #[error("handler execution failed: {0}")]
    HandlerFailed(#[source] anyhow::Error),
}

// ─── Task errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task join failed: {0}")]
    Join(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_computed_displays_var_name() {
        let err = EngineError::Schema(SchemaError::CyclicComputed {
            var: "total".into(),
        });
        assert!(err.to_string().contains("total"));
        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn read_only_displays_var_name() {
        let err = EngineError::State(StateError::ReadOnly {
            var: "double".into(),
        });
        assert!(err.to_string().contains("double"));
    }

    #[test]
    fn invalid_argument_displays_handler_and_reason() {
        let err = EngineError::Dispatch(DispatchError::InvalidArgument {
            handler: "set_count".into(),
            reason: "expects int, got string".into(),
        });
        assert!(err.to_string().contains("set_count"));
        assert!(err.to_string().contains("expects int"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let engine_err: EngineError = anyhow_err.into();
        assert!(engine_err.to_string().contains("something went wrong"));
    }

    #[test]
    fn handler_failed_wraps_source_opaquely() {
        let err = DispatchError::HandlerFailed(anyhow::anyhow!("division by zero"));
        assert!(err.to_string().contains("handler execution failed"));
        assert!(err.to_string().contains("division by zero"));
    }
}
