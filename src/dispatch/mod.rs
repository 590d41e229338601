//! Event dispatch: resolve a handler by name, validate its arguments,
//! invoke it against the right state instance, and package the result.

mod actions;
mod envelope;

pub use actions::{
    Action, HandlerValue, ToastVariant, alert, normalize, redirect, refresh, toast, toast_with,
};
pub use envelope::{EventEnvelope, SyncEnvelope};

use crate::error::DispatchError;
use crate::schema::{ParamSpec, StateSchema, json_type_name};
use crate::state::{Delta, StateInstance};
use serde_json::Value;

/// Result of one handler invocation against one session.
///
/// The delta is computed whether or not the handler succeeded: mutations
/// applied before a mid-handler failure are not rolled back (handler-author
/// responsibility), and the remote side must still converge on them.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub session_id: String,
    pub delta: Delta,
    pub actions: Vec<Action>,
    pub failure: Option<DispatchError>,
}

impl DispatchOutcome {
    pub fn ok(&self) -> bool {
        self.failure.is_none()
    }

    /// Render the outcome into the outbound envelope. A failure also becomes
    /// a diagnostic alert action so the remote side never silently loses a
    /// response.
    pub fn to_envelope(&self) -> SyncEnvelope {
        let error = self.failure.as_ref().map(ToString::to_string);
        let mut actions = self.actions.clone();
        if let Some(message) = &error {
            actions.push(alert(message.clone()));
        }
        SyncEnvelope {
            session_id: self.session_id.clone(),
            delta: self.delta.clone(),
            actions,
            error,
        }
    }
}

/// Resolve and run `handler_name` against `instance`.
///
/// Declared handlers win; otherwise the derived-setter convention is tried
/// (`set_<base var>` delegates to the generic assignment path). Arguments
/// are validated in full before anything runs, so an argument failure never
/// mutates state.
pub(crate) fn invoke(
    schema: &StateSchema,
    instance: &mut StateInstance,
    handler_name: &str,
    args: &[Value],
) -> (Vec<Action>, Option<DispatchError>) {
    if let Some(handler) = schema.handler(handler_name) {
        if let Err(failure) = validate_args(handler_name, &handler.params, args) {
            return (Vec::new(), Some(failure));
        }
        return match (handler.run)(instance, args) {
            Ok(value) => (normalize(value), None),
            Err(source) => (Vec::new(), Some(DispatchError::HandlerFailed(source))),
        };
    }

    if let Some(target) = schema.setter_target(handler_name) {
        let target = target.to_string();
        let param = schema
            .var(&target)
            .map(|descriptor| ParamSpec::new(target.clone(), descriptor.ty));
        let params: Vec<ParamSpec> = param.into_iter().collect();
        if let Err(failure) = validate_args(handler_name, &params, args) {
            return (Vec::new(), Some(failure));
        }
        return match instance.set(&target, args[0].clone()) {
            Ok(_) => (Vec::new(), None),
            Err(source) => (
                Vec::new(),
                Some(DispatchError::HandlerFailed(source.into())),
            ),
        };
    }

    (
        Vec::new(),
        Some(DispatchError::UnknownHandler {
            name: handler_name.to_string(),
        }),
    )
}

fn validate_args(
    handler: &str,
    params: &[ParamSpec],
    args: &[Value],
) -> Result<(), DispatchError> {
    if args.len() != params.len() {
        return Err(DispatchError::InvalidArgument {
            handler: handler.to_string(),
            reason: format!("expects {} argument(s), got {}", params.len(), args.len()),
        });
    }
    for (param, arg) in params.iter().zip(args) {
        if !param.ty.accepts(arg) {
            return Err(DispatchError::InvalidArgument {
                handler: handler.to_string(),
                reason: format!(
                    "argument '{}' expects {}, got {}",
                    param.name,
                    param.ty,
                    json_type_name(arg)
                ),
            });
        }
    }
    Ok(())
}
