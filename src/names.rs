//! Typed names for well-known AMI fields.

/// Error returned when parsing an unrecognized field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFieldNameError(pub String);

impl std::fmt::Display for ParseFieldNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AMI field: {}", self.0)
    }
}

impl std::error::Error for ParseFieldNameError {}

define_field_enum! {
    error_type: ParseFieldNameError,
    /// Field names shared across the AMI action and event catalogs.
    ///
    /// Lookups through [`FieldMap`](crate::FieldMap) are case-insensitive, so
    /// these work against `ActionID`, `ActionId` or `actionid` alike.
    pub enum FieldName {
        Action => "Action",
        ActionId => "ActionID",
        Response => "Response",
        Event => "Event",
        Message => "Message",
        EventList => "EventList",
        ListItems => "ListItems",
        Privilege => "Privilege",
        Username => "Username",
        Secret => "Secret",
        Events => "Events",
        Command => "Command",
        Output => "Output",
        Channel => "Channel",
        Uniqueid => "Uniqueid",
        Linkedid => "Linkedid",
        Context => "Context",
        Exten => "Exten",
        Priority => "Priority",
        Variable => "Variable",
        Value => "Value",
        Cause => "Cause",
        Timeout => "Timeout",
        Application => "Application",
        Data => "Data",
        CallerId => "CallerID",
        Async => "Async",
        EventMask => "EventMask",
    }
}
