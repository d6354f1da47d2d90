//! Channel sets and the JSON shape checks shared by subscribers and publishers.

use std::collections::HashSet;

use serde_json::Value;

/// Deduplicated, unordered set of channel names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelSet(HashSet<String>);

impl ChannelSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct channels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no channels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `channel` is in the set.
    pub fn contains(&self, channel: &str) -> bool {
        self.0.contains(channel)
    }

    /// Whether the two sets share at least one channel.
    pub fn intersects(&self, other: &ChannelSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.0.iter().any(|c| large.0.contains(c))
    }

    /// Iterate over channel names in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Channel names in sorted order, for stable wire output.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.iter().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl<S: Into<String>> FromIterator<S> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Why a `channels` field was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelsError {
    /// Missing, `null`, or an empty value.
    Missing,
    /// Present but not an array of strings.
    NotAnArray,
}

/// Whether a JSON value counts as empty: `null`, `false`, `0`, `""`, `[]`, `{}`.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Extract the `channels` field of a JSON object.
///
/// A non-object body has no `channels` field and reports [`ChannelsError::Missing`].
/// Emptiness is checked before type, so `{"channels": ""}` is `Missing`.
pub fn channels_field(body: &Value) -> Result<ChannelSet, ChannelsError> {
    let channels = match body.get("channels") {
        Some(v) if !is_blank(v) => v,
        _ => return Err(ChannelsError::Missing),
    };
    let Value::Array(items) = channels else {
        return Err(ChannelsError::NotAnArray);
    };
    items
        .iter()
        .map(|item| item.as_str().ok_or(ChannelsError::NotAnArray))
        .collect()
}
