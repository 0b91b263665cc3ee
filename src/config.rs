use crate::position::DEFAULT_STORAGE_KEY;
use bevy::prelude::*;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/chat";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DRAG_DEAD_ZONE: f32 = 4.0;
pub const DEFAULT_GREETING: &str = "Hello! I am your assistant. How can I help you today?";
pub const DEFAULT_QUICK_ACTIONS: [&str; 3] =
    ["All pending leaves", "Team performance", "Approve all leaves"];

pub const GUEST_USER_ID: &str = "guest";
pub const BASELINE_ROLE: &str = "executive";

/// widget settings. insert before adding the plugin to override
/// [`WidgetConfig::from_env`].
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct WidgetConfig {
    /// assistant chat endpoint (POST)
    pub endpoint: String,
    /// upper bound for one exchange; expiry reads as a transport failure.
    pub request_timeout: Duration,
    /// pointer travel (px) before a press becomes a drag.
    pub drag_dead_zone: f32,
    pub quick_actions: Vec<String>,
    pub greeting: Option<String>,
    pub storage_key: String,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            drag_dead_zone: DEFAULT_DRAG_DEAD_ZONE,
            quick_actions: DEFAULT_QUICK_ACTIONS.iter().map(|s| s.to_string()).collect(),
            greeting: Some(DEFAULT_GREETING.to_string()),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl WidgetConfig {
    /// `ASSISTANT_ENDPOINT`, `ASSISTANT_TIMEOUT_SECS`, `ASSISTANT_GREETING`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("ASSISTANT_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            config.endpoint = endpoint.trim().to_string();
        }

        if let Some(raw) = lookup("ASSISTANT_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => warn!(
                    target: "bevy_assistant_widget",
                    "ignoring ASSISTANT_TIMEOUT_SECS='{}', using {:?}", raw, config.request_timeout
                ),
            }
        }

        if let Some(greeting) = lookup("ASSISTANT_GREETING") {
            config.greeting = (!greeting.trim().is_empty()).then_some(greeting);
        }

        config
    }
}

/// identity supplied by the host application. blank values count as absent.
#[derive(Resource, Clone, Debug, Default, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: Option<String>,
    pub role: Option<String>,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self { user_id: Some(user_id.into()), role: Some(role.into()) }
    }

    pub fn resolved_user_id(&self) -> &str {
        non_blank(self.user_id.as_deref()).unwrap_or(GUEST_USER_ID)
    }

    pub fn resolved_role(&self) -> &str {
        non_blank(self.role.as_deref()).unwrap_or(BASELINE_ROLE)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = WidgetConfig::from_lookup(|_| None);
        assert_eq!(config, WidgetConfig::default());
        assert_eq!(config.endpoint, "http://localhost:8000/chat");
        assert_eq!(config.quick_actions.len(), 3);
    }

    #[test]
    fn env_overrides() {
        let config = WidgetConfig::from_lookup(lookup(&[
            ("ASSISTANT_ENDPOINT", " https://assist.example.com/chat "),
            ("ASSISTANT_TIMEOUT_SECS", "5"),
            ("ASSISTANT_GREETING", ""),
        ]));
        assert_eq!(config.endpoint, "https://assist.example.com/chat");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.greeting, None);
    }

    #[test]
    fn invalid_timeout_keeps_default() {
        for raw in ["0", "soon", "-3"] {
            let config = WidgetConfig::from_lookup(lookup(&[("ASSISTANT_TIMEOUT_SECS", raw)]));
            assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        }
    }

    #[test]
    fn identity_falls_back_to_guest_and_baseline_role() {
        let anon = UserIdentity::default();
        assert_eq!(anon.resolved_user_id(), "guest");
        assert_eq!(anon.resolved_role(), "executive");

        let blank = UserIdentity::new("  ", "");
        assert_eq!(blank.resolved_user_id(), "guest");
        assert_eq!(blank.resolved_role(), "executive");

        let known = UserIdentity::new("u-42", "teamlead");
        assert_eq!(known.resolved_user_id(), "u-42");
        assert_eq!(known.resolved_role(), "teamlead");
    }
}
