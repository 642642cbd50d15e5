//! Classification of decoded blocks

use crate::{
    action::AmiAction, event::AmiEvent, fields::FieldMap, names::FieldName, response::AmiResponse,
};

/// A decoded AMI block, classified once at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmiMessage {
    /// A block carrying `Action` (only seen when the peer echoes or proxies actions).
    Action(AmiAction),
    /// A block carrying `Response`.
    Response(AmiResponse),
    /// A block carrying `Event`.
    Event(AmiEvent),
    /// None of the above (including empty blocks).
    Unknown(FieldMap),
}

impl AmiMessage {
    /// Classify by `Response`, then `Event`, then `Action`.
    pub fn from_fields(fields: FieldMap) -> Self {
        if fields.contains(FieldName::Response) {
            return AmiMessage::Response(AmiResponse::from_fields(fields));
        }
        if fields.contains(FieldName::Event) {
            return AmiMessage::Event(AmiEvent::from_fields(fields));
        }
        if let Some(name) = fields
            .get(FieldName::Action)
            .map(|s| s.to_string())
        {
            let mut action = AmiAction::new(name);
            for (key, value) in fields.iter() {
                if key.eq_ignore_ascii_case(FieldName::Action.as_str()) {
                    continue;
                }
                if key.eq_ignore_ascii_case(FieldName::ActionId.as_str()) {
                    action.set_action_id(value.to_string());
                } else {
                    action.push_decoded(key, value);
                }
            }
            return AmiMessage::Action(action);
        }
        AmiMessage::Unknown(fields)
    }

    /// Correlation identifier, if the block carries one.
    pub fn action_id(&self) -> Option<&str> {
        match self {
            AmiMessage::Action(a) => a.action_id(),
            AmiMessage::Response(r) => r.action_id(),
            AmiMessage::Event(e) => e.action_id(),
            AmiMessage::Unknown(f) => f.get(FieldName::ActionId),
        }
    }

    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            AmiMessage::Action(_) => "action",
            AmiMessage::Response(_) => "response",
            AmiMessage::Event(_) => "event",
            AmiMessage::Unknown(_) => "unknown",
        }
    }
}
