//! AMI event messages

use crate::{
    constants::{EVENT_LIST_COMPLETE, LIST_COMPLETE_SUFFIX},
    fields::FieldMap,
    names::FieldName,
};

pub(crate) fn ends_with_ignore_ascii_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.as_bytes()[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

/// Server-pushed AMI event.
///
/// Every accessor returns `None` when its field is missing; nothing here
/// panics on a sparse event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiEvent {
    fields: FieldMap,
}

impl AmiEvent {
    /// Event with only its `Event` field set.
    pub fn new(name: &str) -> Self {
        let mut fields = FieldMap::new();
        fields.insert(FieldName::Event.as_str(), name);
        Self { fields }
    }

    /// Wrap an already decoded field mapping.
    pub fn from_fields(fields: FieldMap) -> Self {
        Self { fields }
    }

    /// All fields.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Take the underlying fields.
    pub fn into_fields(self) -> FieldMap {
        self.fields
    }

    /// Set or overwrite a field.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields
            .insert(name, value);
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

    /// Event name (`Event` field).
    pub fn name(&self) -> Option<&str> {
        self.field(FieldName::Event)
    }

    /// `ActionID` linking this event to the action that produced it.
    pub fn action_id(&self) -> Option<&str> {
        self.field(FieldName::ActionId)
    }

    /// `EventList` field (`Complete` on list terminators).
    pub fn event_list(&self) -> Option<&str> {
        self.field(FieldName::EventList)
    }

    /// `Privilege` field (e.g. `call,all`).
    pub fn privilege(&self) -> Option<&str> {
        self.field(FieldName::Privilege)
    }

    /// `Channel` field.
    pub fn channel(&self) -> Option<&str> {
        self.field(FieldName::Channel)
    }

    /// `Uniqueid` field.
    pub fn unique_id(&self) -> Option<&str> {
        self.field(FieldName::Uniqueid)
    }

    /// `ListItems` count carried by list terminators.
    pub fn list_items(&self) -> Option<usize> {
        self.field(FieldName::ListItems)?
            .trim()
            .parse()
            .ok()
    }

    /// Case-insensitive comparison against the event name.
    pub fn is_named(&self, name: &str) -> bool {
        self.name()
            .is_some_and(|n| n.eq_ignore_ascii_case(name))
    }

    /// Whether this event ends an event list.
    ///
    /// Either signal is sufficient: `EventList: Complete`, or an event name
    /// ending in `Complete` (`CoreShowChannelsComplete`, `PeerlistComplete`).
    pub fn is_list_terminator(&self) -> bool {
        let by_name = self
            .name()
            .is_some_and(|n| ends_with_ignore_ascii_case(n, LIST_COMPLETE_SUFFIX));
        self.has_event_list_complete() || by_name
    }

    /// Whether the event carries `EventList: Complete` itself.
    pub fn has_event_list_complete(&self) -> bool {
        self.event_list()
            .is_some_and(|v| v.eq_ignore_ascii_case(EVENT_LIST_COMPLETE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pairs: &[(&str, &str)]) -> AmiEvent {
        AmiEvent::from_fields(
            pairs
                .iter()
                .copied()
                .collect(),
        )
    }

    #[test]
    fn accessors_on_sparse_event() {
        let ev = event(&[("Privilege", "system,all")]);
        assert_eq!(ev.name(), None);
        assert_eq!(ev.action_id(), None);
        assert_eq!(ev.event_list(), None);
        assert_eq!(ev.channel(), None);
        assert_eq!(ev.unique_id(), None);
        assert_eq!(ev.list_items(), None);
        assert!(ev
            .field_all("Variable")
            .is_empty());
        assert!(!ev.is_named("PeerStatus"));
        assert!(!ev.is_list_terminator());
        assert_eq!(ev.privilege(), Some("system,all"));
    }

    #[test]
    fn peer_status_fields() {
        let ev = event(&[
            ("Event", "PeerStatus"),
            ("Privilege", "system,all"),
            ("ChannelType", "SIP"),
            ("Peer", "SIP/test"),
            ("PeerStatus", "Registered"),
        ]);
        assert!(ev.is_named("peerstatus"));
        assert_eq!(ev.field("peer"), Some("SIP/test"));
        assert_eq!(ev.field("PeerStatus"), Some("Registered"));
    }

    #[test]
    fn terminator_by_event_list_field() {
        let ev = event(&[("Event", "Whatever"), ("EventList", "complete")]);
        assert!(ev.is_list_terminator());
        assert!(ev.has_event_list_complete());
    }

    #[test]
    fn terminator_by_name_suffix() {
        let ev = event(&[("Event", "CoreShowChannelsComplete")]);
        assert!(ev.is_list_terminator());
        let ev = event(&[("Event", "PeerlistCOMPLETE")]);
        assert!(ev.is_list_terminator());
        assert!(!ev.has_event_list_complete());
    }

    #[test]
    fn ordinary_list_item_is_not_terminator() {
        let ev = event(&[("Event", "CoreShowChannel"), ("ActionID", "a-1")]);
        assert!(!ev.is_list_terminator());
    }

    #[test]
    fn list_items_parses_count() {
        let ev = event(&[
            ("Event", "CoreShowChannelsComplete"),
            ("EventList", "Complete"),
            ("ListItems", "3"),
        ]);
        assert_eq!(ev.list_items(), Some(3));
        let ev = event(&[("ListItems", "many")]);
        assert_eq!(ev.list_items(), None);
    }

    #[test]
    fn suffix_helper() {
        assert!(ends_with_ignore_ascii_case("StatusComplete", "complete"));
        assert!(!ends_with_ignore_ascii_case("Comp", "complete"));
        assert!(!ends_with_ignore_ascii_case("Completed", "complete"));
    }
}
