//! AMI responses and event-list aggregation state

use crate::{
    constants::{
        EVENT_LIST_START, RESPONSE_ERROR, RESPONSE_FOLLOWS, RESPONSE_GOODBYE, RESPONSE_SUCCESS,
    },
    error::{AmiError, AmiResult},
    event::AmiEvent,
    fields::FieldMap,
    names::FieldName,
};
use tracing::debug;

/// Classification of the `Response` field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseStatus {
    /// `Response: Success`
    Success,
    /// `Response: Error`
    Error,
    /// `Response: Follows` (legacy `Command` output)
    Follows,
    /// `Response: Goodbye` (reply to `Logoff`)
    Goodbye,
    /// Any other value, or no `Response` field at all (empty string).
    Other(String),
}

impl ResponseStatus {
    fn from_field(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case(RESPONSE_SUCCESS) => ResponseStatus::Success,
            Some(v) if v.eq_ignore_ascii_case(RESPONSE_ERROR) => ResponseStatus::Error,
            Some(v) if v.eq_ignore_ascii_case(RESPONSE_FOLLOWS) => ResponseStatus::Follows,
            Some(v) if v.eq_ignore_ascii_case(RESPONSE_GOODBYE) => ResponseStatus::Goodbye,
            Some(v) => ResponseStatus::Other(v.to_string()),
            None => ResponseStatus::Other(String::new()),
        }
    }
}

/// Server response to one action.
///
/// A response carrying `EventList: start` opens an event list: it starts
/// incomplete and collects events through [`add_event`](Self::add_event)
/// until the list terminator arrives. Completion happens once and never
/// reverts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiResponse {
    fields: FieldMap,
    status: ResponseStatus,
    events: Vec<AmiEvent>,
    completion: Option<AmiEvent>,
    complete: bool,
}

impl AmiResponse {
    /// Wrap decoded fields. List responses start incomplete.
    pub fn from_fields(fields: FieldMap) -> Self {
        let status = ResponseStatus::from_field(fields.get(FieldName::Response));
        let mut response = Self {
            fields,
            status,
            events: Vec::new(),
            completion: None,
            complete: true,
        };
        response.complete = !response.is_list();
        response
    }

    /// All fields of the opening response block.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// First value of a field (case-insensitive).
    pub fn field(&self, name: impl AsRef<str>) -> Option<&str> {
        self.fields
            .get(name)
    }

    /// Every value of a repeated field.
    pub fn field_all(&self, name: impl AsRef<str>) -> &[String] {
        self.fields
            .get_all(name)
    }

    /// Classification of the `Response` field.
    pub fn status(&self) -> &ResponseStatus {
        &self.status
    }

    /// `true` for `Success`, `Follows` and `Goodbye`.
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            ResponseStatus::Success | ResponseStatus::Follows | ResponseStatus::Goodbye
        )
    }

    /// `ActionID` echoed from the action.
    pub fn action_id(&self) -> Option<&str> {
        self.field(FieldName::ActionId)
    }

    /// Human-readable `Message` field.
    pub fn message(&self) -> Option<&str> {
        self.field(FieldName::Message)
    }

    /// `EventList` field of the opening block.
    pub fn event_list(&self) -> Option<&str> {
        self.field(FieldName::EventList)
    }

    /// Whether this response opens an event list (`EventList: start`).
    ///
    /// Decided by `EventList` alone; a missing field means `false`.
    pub fn is_list(&self) -> bool {
        self.event_list()
            .is_some_and(|v| v.eq_ignore_ascii_case(EVENT_LIST_START))
    }

    /// `false` only while a list response waits for its terminator.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Record an event belonging to this list response.
    ///
    /// A terminator (see [`AmiEvent::is_list_terminator`]) completes the
    /// response and is kept as [`completion_event`](Self::completion_event);
    /// other events are appended to [`events`](Self::events). Returns `true`
    /// when this call completed the response. Events arriving after
    /// completion are ignored.
    pub fn add_event(&mut self, event: AmiEvent) -> bool {
        if self.complete {
            debug!(
                "Ignoring {:?} for already complete response {:?}",
                event.name(),
                self.action_id()
            );
            return false;
        }
        if event.is_list_terminator() {
            self.completion = Some(event);
            self.complete = true;
            true
        } else {
            self.events
                .push(event);
            false
        }
    }

    /// Events collected for a list response, in arrival order.
    pub fn events(&self) -> &[AmiEvent] {
        &self.events
    }

    /// Take the collected events.
    pub fn into_events(self) -> Vec<AmiEvent> {
        self.events
    }

    /// The event that terminated the list.
    pub fn completion_event(&self) -> Option<&AmiEvent> {
        self.completion
            .as_ref()
    }

    /// `ListItems` count announced by the terminator.
    pub fn list_items(&self) -> Option<usize> {
        self.completion
            .as_ref()?
            .list_items()
    }

    /// Output of a `Command` action, one line per `Output` field.
    pub fn output(&self) -> Option<String> {
        let lines = self.field_all(FieldName::Output);
        if lines.is_empty() {
            return None;
        }
        Some(lines.join("\n"))
    }

    /// Value of a `GetVar` response.
    pub fn value(&self) -> Option<&str> {
        self.field(FieldName::Value)
    }

    /// `Ok(self)` on success, `ActionFailed` carrying `Message` otherwise.
    pub fn into_result(self) -> AmiResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let message = self
            .message()
            .unwrap_or("no message")
            .to_string();
        Err(AmiError::ActionFailed { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(pairs: &[(&str, &str)]) -> AmiResponse {
        AmiResponse::from_fields(
            pairs
                .iter()
                .copied()
                .collect(),
        )
    }

    fn event(pairs: &[(&str, &str)]) -> AmiEvent {
        AmiEvent::from_fields(
            pairs
                .iter()
                .copied()
                .collect(),
        )
    }

    #[test]
    fn plain_success_is_complete() {
        let resp = response(&[
            ("Response", "Success"),
            ("ActionID", "test"),
            ("Message", "Test Message"),
        ]);
        assert_eq!(resp.status(), &ResponseStatus::Success);
        assert_eq!(resp.message(), Some("Test Message"));
        assert!(!resp.is_list());
        assert!(resp.is_complete());
        assert!(resp
            .events()
            .is_empty());
    }

    #[test]
    fn is_list_false_without_event_list_or_message() {
        let resp = response(&[("Response", "Success"), ("ActionID", "test")]);
        assert_eq!(resp.message(), None);
        assert!(!resp.is_list());
        assert!(resp.is_complete());
    }

    #[test]
    fn is_list_ignores_message_text() {
        let resp = response(&[
            ("Response", "Success"),
            ("Message", "Channel status will follow"),
        ]);
        assert!(!resp.is_list());
    }

    #[test]
    fn is_list_detects_start_case_insensitively() {
        for value in ["start", "Start", "START"] {
            let resp = response(&[
                ("Response", "Success"),
                ("ActionID", "test"),
                ("EventList", value),
                ("Message", "Events will follow"),
            ]);
            assert!(resp.is_list(), "EventList: {value}");
            assert!(!resp.is_complete());
        }
    }

    #[test]
    fn list_collects_events_then_completes_once() {
        let mut resp = response(&[
            ("Response", "Success"),
            ("ActionID", "a-1"),
            ("EventList", "start"),
            ("Message", "Channels will follow"),
        ]);

        for n in 0..3 {
            let channel = format!("SIP/100-{n}");
            let completed = resp.add_event(event(&[
                ("Event", "CoreShowChannel"),
                ("ActionID", "a-1"),
                ("Channel", channel.as_str()),
            ]));
            assert!(!completed);
            assert!(!resp.is_complete());
        }

        let completed = resp.add_event(event(&[
            ("Event", "CoreShowChannelsComplete"),
            ("EventList", "Complete"),
            ("ListItems", "3"),
            ("ActionID", "a-1"),
        ]));
        assert!(completed);
        assert!(resp.is_complete());
        assert_eq!(
            resp.events()
                .len(),
            3
        );
        let channels: Vec<_> = resp
            .events()
            .iter()
            .map(|e| e.channel())
            .collect();
        assert_eq!(
            channels,
            [Some("SIP/100-0"), Some("SIP/100-1"), Some("SIP/100-2")]
        );
        assert_eq!(resp.list_items(), Some(3));

        // Never reopened, never completed twice.
        assert!(!resp.add_event(event(&[("Event", "CoreShowChannel")])));
        assert!(!resp.add_event(event(&[("EventList", "Complete")])));
        assert!(resp.is_complete());
        assert_eq!(
            resp.events()
                .len(),
            3
        );
    }

    #[test]
    fn add_event_without_event_list_or_name() {
        let mut resp = response(&[
            ("Response", "Success"),
            ("ActionID", "test"),
            ("EventList", "start"),
            ("Message", "Events will follow"),
        ]);
        assert!(!resp.add_event(event(&[("Privilege", "system,all")])));
        assert!(!resp.add_event(AmiEvent::from_fields(FieldMap::new())));
        assert!(!resp.is_complete());
        assert_eq!(
            resp.events()
                .len(),
            2
        );

        assert!(resp.add_event(event(&[
            ("Event", "CoreShowChannelsComplete"),
            ("EventList", "Complete"),
            ("ListItems", "0"),
            ("ActionID", "test"),
        ])));
        assert!(resp.is_complete());
    }

    #[test]
    fn terminator_by_name_alone_completes() {
        let mut resp = response(&[("Response", "Success"), ("EventList", "start")]);
        assert!(resp.add_event(event(&[("Event", "PeerlistComplete")])));
        assert!(resp.is_complete());
        assert!(resp
            .events()
            .is_empty());
        assert_eq!(
            resp.completion_event()
                .and_then(|e| e.name()),
            Some("PeerlistComplete")
        );
    }

    #[test]
    fn error_into_result() {
        let resp = response(&[
            ("Response", "Error"),
            ("Message", "Permission denied"),
        ]);
        assert!(!resp.is_success());
        match resp.into_result() {
            Err(AmiError::ActionFailed { message }) => assert_eq!(message, "Permission denied"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn error_without_message_into_result() {
        let resp = response(&[("Response", "Error")]);
        assert!(matches!(
            resp.into_result(),
            Err(AmiError::ActionFailed { .. })
        ));
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            response(&[("Response", "Goodbye")]).status(),
            &ResponseStatus::Goodbye
        );
        assert_eq!(
            response(&[("Response", "follows")]).status(),
            &ResponseStatus::Follows
        );
        assert_eq!(
            response(&[("Response", "Weird")]).status(),
            &ResponseStatus::Other("Weird".into())
        );
        assert_eq!(
            response(&[]).status(),
            &ResponseStatus::Other(String::new())
        );
    }

    #[test]
    fn command_output_lines() {
        let resp = response(&[
            ("Response", "Success"),
            ("Output", "Channel  Location"),
            ("Output", "0 active channels"),
        ]);
        assert_eq!(
            resp.output()
                .as_deref(),
            Some("Channel  Location\n0 active channels")
        );
        assert_eq!(response(&[("Response", "Success")]).output(), None);
    }
}
