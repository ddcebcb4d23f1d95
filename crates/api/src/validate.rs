//! Static checks run before any Slack call.

use std::collections::BTreeSet;

use huddle_core::normalize::normalize_email;

use crate::ChannelSpec;

pub const MAX_NAME_LEN: usize = 80;
pub const MAX_TOPIC_LEN: usize = 250;
pub const MAX_DESCRIPTION_LEN: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("invalid_name: channel name must not be empty")]
    EmptyName,
    #[error("invalid_name: channel name {0:?} exceeds 80 characters")]
    NameTooLong(String),
    #[error("invalid_name: channel name {0:?} may only contain lowercase letters, digits, '-' and '_'")]
    NameCharacters(String),
    #[error("invalid_topic: topic exceeds 250 characters")]
    TopicTooLong,
    #[error("invalid_description: description exceeds 250 characters")]
    DescriptionTooLong,
    #[error("invalid_user: {0:?} is not an email address")]
    InvalidEmail(String),
    #[error("invalid_user: {0:?} is listed more than once")]
    DuplicateUser(String),
}

pub(crate) fn spec(spec: &ChannelSpec) -> Result<(), SpecError> {
    let name = spec.name.as_str();
    if name.is_empty() {
        return Err(SpecError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(SpecError::NameTooLong(name.to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
        return Err(SpecError::NameCharacters(name.to_string()));
    }
    if spec.topic.chars().count() > MAX_TOPIC_LEN {
        return Err(SpecError::TopicTooLong);
    }
    if spec.description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(SpecError::DescriptionTooLong);
    }
    let mut seen = BTreeSet::new();
    for user in &spec.users {
        let email = normalize_email(user);
        if !looks_like_email(&email) {
            return Err(SpecError::InvalidEmail(user.clone()));
        }
        if !seen.insert(email) {
            return Err(SpecError::DuplicateUser(user.clone()));
        }
    }
    Ok(())
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !s.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
