//! the widget controller: visibility, input buffer, quick actions and the
//! two halves of sending a message.
//!
//! `submit` is the synchronous half (guards, user message, busy flag) and
//! hands back the payload to put on the wire; `complete` is the other half
//! and always appends exactly one assistant message. state changes are
//! queued as [`WidgetNotice`]s for the view to consume.

use crate::config::{UserIdentity, WidgetConfig};
use crate::conversation::{Conversation, Message};
use crate::format::format_reply;
use crate::position::AnchorPosition;
use crate::transport::{ChatPayload, TransportError};
use bevy::prelude::*;
use serde_json::Value;

/// state-change notifications for the rendering layer.
#[derive(Event, Clone, Debug, PartialEq)]
pub enum WidgetNotice {
    MessageAppended { index: usize },
    ScrollToLatest,
    VisibilityChanged { open: bool },
    BusyChanged { sending: bool },
    InputChanged,
    AnchorMoved(AnchorPosition),
}

#[derive(Resource, Debug)]
pub struct AssistantWidget {
    open: bool,
    input: String,
    quick_actions: Vec<String>,
    endpoint: String,
    conversation: Conversation,
    notices: Vec<WidgetNotice>,
}

impl AssistantWidget {
    pub fn new(config: &WidgetConfig) -> Self {
        let mut widget = Self {
            open: false,
            input: String::new(),
            quick_actions: config.quick_actions.clone(),
            endpoint: config.endpoint.clone(),
            conversation: Conversation::default(),
            notices: Vec::new(),
        };
        if let Some(greeting) = &config.greeting {
            widget.append(Message::assistant(greeting.clone()));
        }
        widget
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn quick_actions(&self) -> &[String] {
        &self.quick_actions
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_sending(&self) -> bool {
        self.conversation.is_sending()
    }

    pub fn open(&mut self) {
        if !self.open {
            self.open = true;
            self.notices.push(WidgetNotice::VisibilityChanged { open: true });
        }
        self.notices.push(WidgetNotice::ScrollToLatest);
    }

    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            self.notices.push(WidgetNotice::VisibilityChanged { open: false });
        }
    }

    pub fn toggle(&mut self) {
        if self.open {
            self.close();
        } else {
            self.open();
        }
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.input {
            self.input = text;
            self.notices.push(WidgetNotice::InputChanged);
        }
    }

    /// copies a canned prompt into the input buffer; never sends.
    pub fn apply_quick_action(&mut self, index: usize) -> bool {
        let Some(prompt) = self.quick_actions.get(index).cloned() else {
            return false;
        };
        self.set_input(prompt);
        true
    }

    /// no-op (returns `None`) for blank input or while a request is in flight.
    pub fn submit(&mut self, identity: &UserIdentity) -> Option<ChatPayload> {
        let text = self.input.trim();
        if text.is_empty() || self.is_sending() {
            return None;
        }
        let message = text.to_string();

        self.append(Message::user(message.clone()));
        self.set_sending(true);
        self.set_input(String::new());

        Some(ChatPayload {
            user_id: identity.resolved_user_id().to_string(),
            role: identity.resolved_role().to_string(),
            team_id: None,
            message,
        })
    }

    /// settles the in-flight request. ignored when nothing is in flight.
    pub fn complete(&mut self, outcome: Result<Value, TransportError>) {
        if !self.is_sending() {
            warn!(target: "bevy_assistant_widget", "dropping reply with no request in flight");
            return;
        }
        let text = match outcome {
            Ok(payload) => format_reply(&payload),
            Err(err) => self.unreachable_text(&err),
        };
        self.append(Message::assistant(text));
        self.set_sending(false);
    }

    pub fn has_notices(&self) -> bool {
        !self.notices.is_empty()
    }

    pub fn drain_notices(&mut self) -> Vec<WidgetNotice> {
        std::mem::take(&mut self.notices)
    }

    fn unreachable_text(&self, err: &TransportError) -> String {
        format!(
            "Could not connect to the assistant backend at {}. Please make sure the server is running.\n\nError: {}",
            self.endpoint, err
        )
    }

    fn append(&mut self, message: Message) {
        let index = self.conversation.push(message);
        self.notices.push(WidgetNotice::MessageAppended { index });
        self.notices.push(WidgetNotice::ScrollToLatest);
    }

    fn set_sending(&mut self, sending: bool) {
        self.conversation.set_sending(sending);
        self.notices.push(WidgetNotice::BusyChanged { sending });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn quiet() -> WidgetConfig {
        WidgetConfig { greeting: None, ..WidgetConfig::default() }
    }

    #[test]
    fn greeting_is_first_message() {
        let widget = AssistantWidget::new(&WidgetConfig::default());
        assert_eq!(widget.conversation().len(), 1);
        assert_eq!(widget.conversation().messages()[0].role, Role::Assistant);
        assert!(!widget.is_open());
    }

    #[test]
    fn submit_then_complete_appends_one_of_each() {
        let mut widget = AssistantWidget::new(&quiet());
        widget.set_input("  All pending leaves ");

        let payload = widget.submit(&UserIdentity::default()).unwrap();
        assert_eq!(payload.message, "All pending leaves");
        assert_eq!(payload.user_id, "guest");
        assert_eq!(payload.team_id, None);
        assert_eq!(widget.conversation().messages(), &[Message::user("All pending leaves")]);
        assert!(widget.is_sending());
        assert_eq!(widget.input(), "");

        widget.complete(Ok(json!({ "reply": [] })));
        assert_eq!(widget.conversation().len(), 2);
        assert_eq!(widget.conversation().last(), Some(&Message::assistant("No records found.")));
        assert!(!widget.is_sending());
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut widget = AssistantWidget::new(&quiet());
        for blank in ["", "   ", "\n\t"] {
            widget.set_input(blank);
            assert_eq!(widget.submit(&UserIdentity::default()), None);
        }
        assert!(widget.conversation().is_empty());
        assert!(!widget.is_sending());
    }

    #[test]
    fn second_submit_while_sending_is_ignored() {
        let mut widget = AssistantWidget::new(&quiet());
        widget.set_input("first");
        assert!(widget.submit(&UserIdentity::default()).is_some());

        widget.set_input("second");
        assert_eq!(widget.submit(&UserIdentity::default()), None);
        assert_eq!(widget.conversation().len(), 1);
        // the draft survives for after the reply
        assert_eq!(widget.input(), "second");
    }

    #[test]
    fn transport_failure_becomes_assistant_message() {
        let mut widget = AssistantWidget::new(&quiet());
        widget.set_input("hi");
        widget.submit(&UserIdentity::default()).unwrap();

        widget.complete(Err(TransportError::Status(502)));
        let last = widget.conversation().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.text.contains("Could not connect"), "{}", last.text);
        assert!(last.text.contains("server error: 502"), "{}", last.text);
        assert!(!widget.is_sending());
    }

    #[test]
    fn stray_completion_is_dropped() {
        let mut widget = AssistantWidget::new(&quiet());
        widget.complete(Ok(json!({ "message": "late" })));
        assert!(widget.conversation().is_empty());
    }

    #[test]
    fn quick_action_fills_input_without_sending() {
        let mut widget = AssistantWidget::new(&quiet());
        assert!(widget.apply_quick_action(1));
        assert_eq!(widget.input(), "Team performance");
        assert!(widget.conversation().is_empty());
        assert!(!widget.apply_quick_action(99));
    }

    #[test]
    fn notices_follow_state_changes() {
        let mut widget = AssistantWidget::new(&quiet());
        widget.toggle();
        widget.open();
        widget.set_input("hey");
        widget.submit(&UserIdentity::default()).unwrap();
        widget.complete(Ok(json!({ "action": "approve_leave" })));
        widget.toggle();

        assert_eq!(
            widget.drain_notices(),
            vec![
                WidgetNotice::VisibilityChanged { open: true },
                WidgetNotice::ScrollToLatest,
                WidgetNotice::ScrollToLatest,
                WidgetNotice::InputChanged,
                WidgetNotice::MessageAppended { index: 0 },
                WidgetNotice::ScrollToLatest,
                WidgetNotice::BusyChanged { sending: true },
                WidgetNotice::InputChanged,
                WidgetNotice::MessageAppended { index: 1 },
                WidgetNotice::ScrollToLatest,
                WidgetNotice::BusyChanged { sending: false },
                WidgetNotice::VisibilityChanged { open: false },
            ]
        );
        assert!(widget.drain_notices().is_empty());
    }
}
