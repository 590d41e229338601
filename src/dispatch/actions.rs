//! Out-of-band side-effect instructions returned by handlers.
//!
//! Actions are stateless and immutable; their order relative to other
//! actions from the same invocation is preserved all the way to the remote
//! side. The `kind` tag is the routing key the transport adapter uses to map
//! each action onto the matching remote-side effect.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToastVariant {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    /// Navigate the remote view to a different URL.
    Redirect { url: String },
    /// Show a blocking alert.
    Alert { message: String },
    /// Show a transient toast notification.
    Toast {
        message: String,
        #[serde(default)]
        variant: ToastVariant,
        #[serde(default = "default_toast_duration_ms")]
        duration_ms: u64,
    },
    /// Re-render the current view.
    Refresh,
}

fn default_toast_duration_ms() -> u64 {
    3000
}

pub fn redirect(url: impl Into<String>) -> Action {
    Action::Redirect { url: url.into() }
}

pub fn alert(message: impl Into<String>) -> Action {
    Action::Alert {
        message: message.into(),
    }
}

pub fn toast(message: impl Into<String>) -> Action {
    toast_with(message, ToastVariant::Info, default_toast_duration_ms())
}

pub fn toast_with(message: impl Into<String>, variant: ToastVariant, duration_ms: u64) -> Action {
    Action::Toast {
        message: message.into(),
        variant,
        duration_ms,
    }
}

pub fn refresh() -> Action {
    Action::Refresh
}

// ─── Normalization ──────────────────────────────────────────────────────────

/// What a handler hands back: nothing, one action, or an ordered batch.
#[derive(Debug, Default)]
pub enum HandlerValue {
    #[default]
    None,
    One(Action),
    Many(Vec<Action>),
}

impl From<Action> for HandlerValue {
    fn from(action: Action) -> Self {
        Self::One(action)
    }
}

impl From<Vec<Action>> for HandlerValue {
    fn from(actions: Vec<Action>) -> Self {
        Self::Many(actions)
    }
}

impl From<Option<Action>> for HandlerValue {
    fn from(action: Option<Action>) -> Self {
        action.map_or(Self::None, Self::One)
    }
}

/// Canonicalize a handler's return value into an action sequence. Pure: no
/// state access, order preserved.
pub fn normalize(value: HandlerValue) -> Vec<Action> {
    match value {
        HandlerValue::None => Vec::new(),
        HandlerValue::One(action) => vec![action],
        HandlerValue::Many(actions) => actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_none_is_empty() {
        assert!(normalize(HandlerValue::None).is_empty());
    }

    #[test]
    fn normalize_single_action_is_one_element() {
        let actions = normalize(redirect("/dashboard").into());
        assert_eq!(actions, vec![redirect("/dashboard")]);
    }

    #[test]
    fn normalize_preserves_batch_order() {
        let batch: HandlerValue = vec![toast("saved"), redirect("/home")].into();
        let actions = normalize(batch);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Toast { .. }));
        assert!(matches!(actions[1], Action::Redirect { .. }));
    }

    #[test]
    fn actions_serialize_with_stable_kind_tags() {
        assert_eq!(
            serde_json::to_value(redirect("/dashboard")).unwrap(),
            json!({"kind": "redirect", "url": "/dashboard"})
        );
        assert_eq!(
            serde_json::to_value(refresh()).unwrap(),
            json!({"kind": "refresh"})
        );
        let value = serde_json::to_value(toast("hi")).unwrap();
        assert_eq!(value["kind"], "toast");
        assert_eq!(value["variant"], "info");
        assert_eq!(value["duration_ms"], 3000);
    }

    #[test]
    fn toast_defaults_fill_in_on_deserialize() {
        let action: Action =
            serde_json::from_value(json!({"kind": "toast", "message": "hi"})).unwrap();
        assert_eq!(action, toast("hi"));
    }
}
