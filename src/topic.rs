//! MQTT topic pattern matching for stored ACL rules.

use std::borrow::Cow;

/// Placeholder replaced by the requesting username.
pub const USERNAME_PLACEHOLDER: &str = "%u";
/// Placeholder replaced by the requesting client identifier.
pub const CLIENT_ID_PLACEHOLDER: &str = "%c";

const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Returns whether `topic` satisfies the stored `pattern`.
///
/// The pattern is split into levels before `%u` and `%c` are replaced by
/// `username` and `client_id`, so only wildcards written in the stored
/// pattern are honored. A level whose placeholder would expand to a value
/// containing `+`, `#` or `/` never matches. Wildcards in `topic` are
/// ordinary literals.
pub fn topic_matches(pattern: &str, topic: &str, username: &str, client_id: &str) -> bool {
    let mut pattern_levels = pattern.split('/').peekable();
    let mut topic_levels = topic.split('/');

    while let Some(level) = pattern_levels.next() {
        if level == MULTI_LEVEL {
            // `#` is only valid as the last level.
            return pattern_levels.peek().is_none();
        }
        let Some(candidate) = topic_levels.next() else {
            return false;
        };
        let matched = if level == SINGLE_LEVEL {
            !candidate.is_empty()
        } else {
            level_matches(level, candidate, username, client_id)
        };
        if !matched {
            return false;
        }
    }

    topic_levels.next().is_none()
}

/// Replaces identity placeholders in `pattern`.
pub fn substitute<'a>(pattern: &'a str, username: &str, client_id: &str) -> Cow<'a, str> {
    if !pattern.contains('%') {
        return Cow::Borrowed(pattern);
    }

    let mut out = String::with_capacity(pattern.len() + username.len());
    let mut rest = pattern;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with(USERNAME_PLACEHOLDER) {
            out.push_str(username);
            rest = &tail[USERNAME_PLACEHOLDER.len()..];
        } else if tail.starts_with(CLIENT_ID_PLACEHOLDER) {
            out.push_str(client_id);
            rest = &tail[CLIENT_ID_PLACEHOLDER.len()..];
        } else {
            out.push('%');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn level_matches(level: &str, candidate: &str, username: &str, client_id: &str) -> bool {
    if !level.contains('%') {
        return level == candidate;
    }
    let unsafe_username = level.contains(USERNAME_PLACEHOLDER) && !is_plain_level(username);
    let unsafe_client_id = level.contains(CLIENT_ID_PLACEHOLDER) && !is_plain_level(client_id);
    if unsafe_username || unsafe_client_id {
        return false;
    }
    substitute(level, username, client_id) == candidate
}

fn is_plain_level(value: &str) -> bool {
    !value.contains(['/', '+', '#'])
}
