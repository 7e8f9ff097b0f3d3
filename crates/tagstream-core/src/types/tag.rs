use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const TAG_DELIMITER: char = ':';
pub const MAX_GROUP_LEN: usize = 64;
pub const MAX_CONTENT_LEN: usize = 256;

/// A consistency boundary, written as `group:content`.
///
/// Both halves are validated when the tag is built, so an invalid tag can
/// never be attached to an event. The group is restricted to ASCII
/// alphanumerics plus `_`, `-` and `.`; the content may be any printable,
/// non-whitespace text (including further `:` characters).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag {
    group: String,
    content: String,
}

impl Tag {
    pub fn new(group: impl Into<String>, content: impl Into<String>) -> Result<Self, ValidationError> {
        let group = group.into();
        let content = content.into();
        validate_group(&group)?;
        validate_content(&content)?;
        Ok(Self { group, content })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_in_group(&self, group: &str) -> bool {
        self.group == group
    }
}

fn validate_group(group: &str) -> Result<(), ValidationError> {
    if group.is_empty() {
        return Err(ValidationError::EmptyTagGroup);
    }
    let len = group.chars().count();
    if len > MAX_GROUP_LEN {
        return Err(ValidationError::TagGroupTooLong { len, max: MAX_GROUP_LEN });
    }
    if let Some(ch) = group
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(ValidationError::InvalidTagGroupChar { ch });
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::EmptyTagContent);
    }
    let len = content.chars().count();
    if len > MAX_CONTENT_LEN {
        return Err(ValidationError::TagContentTooLong { len, max: MAX_CONTENT_LEN });
    }
    if let Some(ch) = content.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidTagContentChar { ch });
    }
    Ok(())
}

impl FromStr for Tag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, content) = s
            .split_once(TAG_DELIMITER)
            .ok_or_else(|| ValidationError::MissingTagDelimiter(s.to_string()))?;
        Tag::new(group, content)
    }
}

impl TryFrom<String> for Tag {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.group, TAG_DELIMITER, self.content)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}
