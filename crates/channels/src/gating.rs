//! JID classification and sender allowlists.

use serde::{Deserialize, Serialize};

const GROUP_SUFFIX: &str = "@g.us";
const BROADCAST_SUFFIX: &str = "@broadcast";
const DIRECT_SUFFIXES: &[&str] = &["@s.whatsapp.net", "@c.us", "@lid"];

/// What kind of conversation a WhatsApp JID addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JidKind {
    /// A single user (`123@s.whatsapp.net`, `123@lid`).
    Direct,
    /// A group conversation (`123-456@g.us`).
    Group,
    /// Status updates and broadcast lists (`status@broadcast`).
    Broadcast,
    /// Anything else (newsletters, unknown servers).
    Other,
}

impl JidKind {
    pub fn of(jid: &str) -> Self {
        let jid = jid.trim();
        if jid.ends_with(GROUP_SUFFIX) {
            Self::Group
        } else if jid.ends_with(BROADCAST_SUFFIX) {
            Self::Broadcast
        } else if DIRECT_SUFFIXES.iter().any(|s| jid.ends_with(s)) {
            Self::Direct
        } else {
            Self::Other
        }
    }
}

/// Check if a sender is allowed to talk to the bot.
///
/// An empty allowlist means everyone is allowed. Entries are matched
/// case-insensitively against the full JID and against its user part
/// (the digits before `@`), with `*` as a wildcard.
pub fn is_allowed(jid: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let jid_lower = jid.to_lowercase();
    let user = jid_lower.split('@').next().unwrap_or(&jid_lower);
    allowlist.iter().any(|pattern| {
        let pat = pattern.trim().to_lowercase();
        if pat.contains('*') {
            glob_match(&pat, &jid_lower) || glob_match(&pat, user)
        } else {
            pat == jid_lower || pat == user
        }
    })
}

/// Glob matching where `*` stands for any run of characters.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut segments = pattern.split('*');
    let Some(first) = segments.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = segments.collect();
    let Some((last, middle)) = tail.split_last() else {
        // No `*` at all.
        return rest.is_empty();
    };

    for part in middle {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
