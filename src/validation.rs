//! Validation for node ids, channel slots and operator command payloads.
//!
//! Operator payloads end up inside tagged radio text (`MAN_<DIRECTION>`,
//! `MSSN_<COMMAND>`), so anything that could break the tag framing on the
//! vehicle side is refused before it reaches the queue.

/// Longest operator payload accepted (bytes, after trimming).
pub const MAX_PAYLOAD_BYTES: usize = 64;

/// Highest Meshtastic channel slot.
pub const MAX_CHANNEL_INDEX: u32 = 7;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Node id '{0}' must be '!' followed by 8 hex digits")]
    InvalidNodeId(String),

    #[error("Channel index {0} is out of range (0-{max})", max = MAX_CHANNEL_INDEX)]
    ChannelOutOfRange(u32),

    #[error("Payload is required")]
    EmptyPayload,

    #[error("Payload is too long (maximum {max} bytes)")]
    PayloadTooLong { max: usize },

    #[error("Payload contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },
}

/// Accept `!eb15a9fe` style ids. Hex digits are compared case-insensitively
/// by callers, so the id is returned lowercased.
pub fn validate_node_id(id: &str) -> Result<String, ValidationError> {
    let trimmed = id.trim();
    let hex = match trimmed.strip_prefix('!') {
        Some(h) => h,
        None => return Err(ValidationError::InvalidNodeId(trimmed.to_string())),
    };
    if hex.len() != 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidNodeId(trimmed.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}

pub fn validate_channel_index(channel: u32) -> Result<u32, ValidationError> {
    if channel > MAX_CHANNEL_INDEX {
        return Err(ValidationError::ChannelOutOfRange(channel));
    }
    Ok(channel)
}

/// Validate a MAN/MSSN payload and return it trimmed.
pub fn validate_command_payload(payload: &str) -> Result<String, ValidationError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyPayload);
    }
    if trimmed.len() > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::PayloadTooLong {
            max: MAX_PAYLOAD_BYTES,
        });
    }
    let mut bad: Vec<char> = trimmed
        .chars()
        .filter(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ')))
        .collect();
    if !bad.is_empty() {
        bad.sort_unstable();
        bad.dedup();
        let chars = bad.into_iter().map(|c| c.escape_default().to_string()).collect();
        return Err(ValidationError::InvalidCharacters { chars });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids() {
        assert_eq!(validate_node_id("!EB15A9FE").unwrap(), "!eb15a9fe");
        assert!(validate_node_id("eb15a9fe").is_err());
        assert!(validate_node_id("!eb15a9f").is_err());
        assert!(validate_node_id("!eb15a9fz").is_err());
    }

    #[test]
    fn channel_range() {
        assert_eq!(validate_channel_index(5), Ok(5));
        assert_eq!(
            validate_channel_index(8),
            Err(ValidationError::ChannelOutOfRange(8))
        );
    }

    #[test]
    fn payloads() {
        assert_eq!(validate_command_payload("  forward ").unwrap(), "forward");
        assert_eq!(validate_command_payload("RTL"), Ok("RTL".to_string()));
        assert_eq!(validate_command_payload("   "), Err(ValidationError::EmptyPayload));
        assert!(matches!(
            validate_command_payload("UP|LAT=1"),
            Err(ValidationError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            validate_command_payload(&"A".repeat(65)),
            Err(ValidationError::PayloadTooLong { max: 64 })
        ));
    }

    #[test]
    fn invalid_chars_are_listed_once() {
        match validate_command_payload("a:b:c|") {
            Err(ValidationError::InvalidCharacters { chars }) => assert_eq!(chars, ":|"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
