//! Outbound AMI actions

use crate::{
    constants::LINE_TERMINATOR,
    error::{AmiError, AmiResult},
    fields::FieldMap,
    names::FieldName,
};
use std::fmt;

/// Reject values that would inject extra lines (or end the block early).
fn validate_no_newlines(s: &str, context: &str) -> AmiResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AmiError::InvalidField {
            field: format!("{} must not contain newlines", context),
        });
    }
    Ok(())
}

fn validate_field_name(name: &str) -> AmiResult<()> {
    validate_no_newlines(name, "field name")?;
    if name
        .trim()
        .is_empty()
        || name.contains(':')
    {
        return Err(AmiError::InvalidField {
            field: format!("invalid field name {:?}", name),
        });
    }
    Ok(())
}

/// A client-issued AMI command.
///
/// `Action` is always written first and `ActionID` second; the rest follow
/// in insertion order. If no `ActionID` is set, the client assigns one on
/// send.
///
/// ```
/// use asterisk_ami_tokio::AmiAction;
///
/// let action = AmiAction::new("Originate")
///     .field("Channel", "PJSIP/100").unwrap()
///     .field("Context", "default").unwrap()
///     .variable("CALLERID(name)", "Reception").unwrap()
///     .variable("PLAYBACK", "hello-world").unwrap();
/// let wire = action.to_wire_format().unwrap();
/// assert!(wire.starts_with("Action: Originate\r\n"));
/// assert!(wire.contains("Variable: CALLERID(name)=Reception\r\nVariable: PLAYBACK=hello-world\r\n"));
/// assert!(wire.ends_with("\r\n\r\n"));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct AmiAction {
    name: String,
    action_id: Option<String>,
    fields: FieldMap,
}

impl fmt::Debug for AmiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case(FieldName::Secret.as_str()) {
                    (k, "[REDACTED]")
                } else {
                    (k, v)
                }
            })
            .collect();
        f.debug_struct("AmiAction")
            .field("name", &self.name)
            .field("action_id", &self.action_id)
            .field("fields", &fields)
            .finish()
    }
}

impl AmiAction {
    /// Start an action with the given `Action` name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_id: None,
            fields: FieldMap::new(),
        }
    }

    /// The `Action` name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caller-supplied or client-assigned `ActionID`.
    pub fn action_id(&self) -> Option<&str> {
        self.action_id
            .as_deref()
    }

    /// Use a specific `ActionID` instead of a generated one.
    pub fn with_action_id(mut self, action_id: impl Into<String>) -> AmiResult<Self> {
        let action_id = action_id.into();
        validate_no_newlines(&action_id, "ActionID")?;
        self.action_id = Some(action_id);
        Ok(self)
    }

    pub(crate) fn set_action_id(&mut self, action_id: String) {
        self.action_id = Some(action_id);
    }

    /// Fields of a decoded action block skip validation; they are never re-sent.
    pub(crate) fn push_decoded(&mut self, name: &str, value: &str) {
        self.fields
            .append(name, value);
    }

    /// Set a field, replacing earlier values of the same name.
    ///
    /// `Action` and `ActionID` are managed separately; use
    /// [`with_action_id`](Self::with_action_id) for the latter.
    pub fn field(mut self, name: &str, value: impl AsRef<str>) -> AmiResult<Self> {
        let value = value.as_ref();
        validate_field_name(name)?;
        validate_no_newlines(value, "field value")?;
        if name.eq_ignore_ascii_case(FieldName::ActionId.as_str()) {
            self.action_id = Some(value.to_string());
        } else if name.eq_ignore_ascii_case(FieldName::Action.as_str()) {
            self.name = value.to_string();
        } else {
            self.fields
                .insert(name, value);
        }
        Ok(self)
    }

    /// Append a field, keeping earlier values of the same name.
    pub fn append_field(mut self, name: &str, value: impl AsRef<str>) -> AmiResult<Self> {
        let value = value.as_ref();
        validate_field_name(name)?;
        validate_no_newlines(value, "field value")?;
        self.fields
            .append(name, value);
        Ok(self)
    }

    /// Append a `Variable: name=value` line (repeatable).
    pub fn variable(self, name: &str, value: impl AsRef<str>) -> AmiResult<Self> {
        validate_no_newlines(name, "variable name")?;
        let line = format!("{}={}", name, value.as_ref());
        self.append_field(FieldName::Variable.as_str(), line)
    }

    /// Fields other than `Action` and `ActionID`.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// First value of a field other than `Action`/`ActionID`.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.fields
            .get(name)
    }

    /// Encode to the wire, including the blank line that ends the block.
    pub fn to_wire_format(&self) -> AmiResult<String> {
        use std::fmt::Write;
        validate_field_name(&self.name)?;

        let mut out = String::new();
        let _ = write!(
            out,
            "{}: {}{}",
            FieldName::Action,
            self.name,
            LINE_TERMINATOR
        );
        if let Some(id) = &self.action_id {
            let _ = write!(out, "{}: {}{}", FieldName::ActionId, id, LINE_TERMINATOR);
        }
        for (key, value) in self
            .fields
            .iter()
        {
            let _ = write!(out, "{}: {}{}", key, value, LINE_TERMINATOR);
        }
        out.push_str(LINE_TERMINATOR);
        Ok(out)
    }

    /// `Login` with event delivery on or off.
    pub fn login(username: &str, secret: &str, events: bool) -> AmiResult<Self> {
        Self::new("Login")
            .field(FieldName::Username.as_str(), username)?
            .field(FieldName::Secret.as_str(), secret)?
            .field(FieldName::Events.as_str(), if events { "on" } else { "off" })
    }

    /// `Logoff`; the server answers `Response: Goodbye` and closes.
    pub fn logoff() -> Self {
        Self::new("Logoff")
    }

    /// `Ping` keep-alive.
    pub fn ping() -> Self {
        Self::new("Ping")
    }

    /// Run a CLI command; output arrives as `Output` lines.
    pub fn command(command: &str) -> AmiResult<Self> {
        Self::new("Command").field(FieldName::Command.as_str(), command)
    }

    /// Change the event mask (`on`, `off`, or a class list like `call,system`).
    pub fn events(mask: &str) -> AmiResult<Self> {
        Self::new("Events").field(FieldName::EventMask.as_str(), mask)
    }

    /// List active channels (event list ending in `CoreShowChannelsComplete`).
    pub fn core_show_channels() -> Self {
        Self::new("CoreShowChannels")
    }

    /// Channel status, for one channel or all (event list ending in `StatusComplete`).
    pub fn status(channel: Option<&str>) -> AmiResult<Self> {
        let action = Self::new("Status");
        match channel {
            Some(c) => action.field(FieldName::Channel.as_str(), c),
            None => Ok(action),
        }
    }

    /// Hang up a channel with an optional Q.850 cause code.
    pub fn hangup(channel: &str, cause: Option<u32>) -> AmiResult<Self> {
        let action = Self::new("Hangup").field(FieldName::Channel.as_str(), channel)?;
        match cause {
            Some(c) => action.field(FieldName::Cause.as_str(), c.to_string()),
            None => Ok(action),
        }
    }

    /// Asynchronous `Originate` into a dialplan extension.
    ///
    /// The result arrives later as an `OriginateResponse` event carrying the
    /// same `ActionID`.
    pub fn originate(channel: &str, context: &str, exten: &str, priority: u32) -> AmiResult<Self> {
        Self::new("Originate")
            .field(FieldName::Channel.as_str(), channel)?
            .field(FieldName::Context.as_str(), context)?
            .field(FieldName::Exten.as_str(), exten)?
            .field(FieldName::Priority.as_str(), priority.to_string())?
            .field(FieldName::Async.as_str(), "true")
    }

    /// Read a channel or global variable.
    pub fn get_var(channel: Option<&str>, variable: &str) -> AmiResult<Self> {
        let mut action = Self::new("Getvar");
        if let Some(c) = channel {
            action = action.field(FieldName::Channel.as_str(), c)?;
        }
        action.field(FieldName::Variable.as_str(), variable)
    }

    /// Set a channel or global variable.
    pub fn set_var(channel: Option<&str>, variable: &str, value: &str) -> AmiResult<Self> {
        let mut action = Self::new("Setvar");
        if let Some(c) = channel {
            action = action.field(FieldName::Channel.as_str(), c)?;
        }
        action
            .field(FieldName::Variable.as_str(), variable)?
            .field(FieldName::Value.as_str(), value)
    }

    /// List the actions the server supports.
    pub fn list_commands() -> Self {
        Self::new("ListCommands")
    }
}
