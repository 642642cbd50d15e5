//! AMI wire codec: banner line, block framing and block decoding

use crate::{
    buffer::AmiBuffer,
    constants::{BLOCK_TERMINATOR, END_COMMAND_MARKER, LINE_TERMINATOR, MAX_BLOCK_SIZE},
    error::{AmiError, AmiResult},
    fields::FieldMap,
    message::AmiMessage,
    names::FieldName,
};
use tracing::trace;

/// Decode one block (without its terminating blank line) into fields.
///
/// Never fails. Each line is split on its first colon and one leading space
/// is stripped from the value; repeated keys accumulate. A line without a
/// colon continues the previous field's value (joined by CRLF), or is
/// skipped if there is no previous field. Legacy `Response: Follows` output
/// ending in `--END COMMAND--` is stored as `Output` lines.
pub(crate) fn decode_block(block: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    let mut last_key: Option<&str> = None;

    for line in block.split(LINE_TERMINATOR) {
        if line.is_empty() {
            continue;
        }

        if let Some(payload) = line.strip_suffix(END_COMMAND_MARKER) {
            for out in payload
                .split('\n')
                .map(|l| l.trim_end_matches('\r'))
                .filter(|l| !l.is_empty())
            {
                fields.append(FieldName::Output.as_str(), out);
            }
            last_key = None;
            continue;
        }

        match line.split_once(':') {
            Some((key, value))
                if !key
                    .trim()
                    .is_empty() =>
            {
                let key = key.trim();
                let value = value
                    .strip_prefix(' ')
                    .unwrap_or(value);
                fields.append(key, value);
                last_key = Some(key);
            }
            _ => match last_key {
                Some(key) => {
                    fields.continue_last(key, line, LINE_TERMINATOR);
                }
                None => trace!("[RECV] Skipping unparsable line: {:?}", line),
            },
        }
    }

    fields
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    AwaitingBanner,
    Blocks,
}

/// Incremental AMI parser, one per connection.
pub(crate) struct AmiParser {
    buffer: AmiBuffer,
    state: ParseState,
}

impl AmiParser {
    /// Parser expecting the greeting banner first.
    pub(crate) fn new() -> Self {
        Self {
            buffer: AmiBuffer::new(),
            state: ParseState::AwaitingBanner,
        }
    }

    /// Add socket data to the buffer.
    pub(crate) fn add_data(&mut self, data: &[u8]) -> AmiResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()
    }

    /// Take the banner line once it is complete.
    pub(crate) fn parse_banner(&mut self) -> AmiResult<Option<String>> {
        if self.state != ParseState::AwaitingBanner {
            return Err(AmiError::protocol_error("banner already received"));
        }
        match self
            .buffer
            .extract_until_pattern(LINE_TERMINATOR.as_bytes())
        {
            Some(line) => {
                self.buffer
                    .compact();
                self.state = ParseState::Blocks;
                Ok(Some(
                    String::from_utf8_lossy(&line)
                        .trim()
                        .to_string(),
                ))
            }
            None if self
                .buffer
                .len()
                > MAX_BLOCK_SIZE =>
            {
                Err(AmiError::protocol_error("no banner line in greeting"))
            }
            None => Ok(None),
        }
    }

    /// Take the next raw block, if one is complete.
    pub(crate) fn next_block(&mut self) -> AmiResult<Option<String>> {
        if self.state != ParseState::Blocks {
            return Err(AmiError::protocol_error("block requested before banner"));
        }
        match self
            .buffer
            .extract_until_pattern(BLOCK_TERMINATOR.as_bytes())
        {
            Some(block) => {
                self.buffer
                    .compact();
                Ok(Some(
                    String::from_utf8_lossy(&block).into_owned(),
                ))
            }
            None if self
                .buffer
                .len()
                > MAX_BLOCK_SIZE =>
            {
                Err(AmiError::protocol_error(format!(
                    "unterminated block exceeds {} bytes",
                    MAX_BLOCK_SIZE
                )))
            }
            None => Ok(None),
        }
    }

    /// Take, decode and classify the next block.
    pub(crate) fn parse_message(&mut self) -> AmiResult<Option<AmiMessage>> {
        Ok(self
            .next_block()?
            .map(|block| AmiMessage::from_fields(decode_block(&block))))
    }
}

impl Default for AmiParser {
    fn default() -> Self {
        Self::new()
    }
}
