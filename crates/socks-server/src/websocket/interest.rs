//! Inbound interest declarations and their acknowledgments.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::channels::{ChannelSet, ChannelsError, channels_field};

/// Reply to every inbound subscriber frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscribeAck {
    /// Whether the declaration was accepted.
    pub success: bool,
    /// Accepted channels, deduplicated and sorted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    /// Client-facing failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubscribeAck {
    /// Successful declaration of `channels`.
    pub fn accepted(channels: &ChannelSet) -> Self {
        Self {
            success: true,
            channels: Some(channels.to_sorted_vec()),
            error: None,
        }
    }

    /// Rejected declaration.
    pub fn rejected(err: &InterestError) -> Self {
        Self {
            success: false,
            channels: None,
            error: Some(err.to_string()),
        }
    }
}

/// Why an inbound frame was not a valid interest declaration.
///
/// The display strings are sent to clients verbatim.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InterestError {
    /// Frame is not JSON.
    #[error("Invalid JSON.")]
    InvalidJson,
    /// `channels` missing or empty.
    #[error("No channels provided.")]
    NoChannels,
    /// `channels` present but not an array of strings.
    #[error("Channels must be an array.")]
    NotAnArray,
}

impl From<ChannelsError> for InterestError {
    fn from(err: ChannelsError) -> Self {
        match err {
            ChannelsError::Missing => Self::NoChannels,
            ChannelsError::NotAnArray => Self::NotAnArray,
        }
    }
}

/// Parse one inbound frame into the channel set it declares.
pub fn parse_interest(text: &str) -> Result<ChannelSet, InterestError> {
    let body: Value = serde_json::from_str(text).map_err(|_| InterestError::InvalidJson)?;
    Ok(channels_field(&body)?)
}
