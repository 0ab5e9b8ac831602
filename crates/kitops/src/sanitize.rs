//! Helpers for keeping repository URLs out of logs and cluster labels.
//!
//! Repository URLs may carry credentials in their userinfo part; these
//! functions make sure neither log lines nor label values leak them.

use sha2::{Digest, Sha256};

/// Maximum length of a Kubernetes label value.
pub const MAX_LABEL_VALUE_LEN: usize = 63;

const LABEL_HASH_LEN: usize = 8;

/// Strips userinfo/tokens from a git remote URL.
///
/// - `https://ghp_token@github.com/user/repo` → `https://****@github.com/user/repo`
/// - `git@github.com:user/repo.git` → `git@github.com:user/repo.git` (no change)
/// - `https://github.com/user/repo` → `https://github.com/user/repo` (no change)
pub fn redact_repo_url(url: &str) -> String {
    // SSH URLs don't contain tokens
    if url.starts_with("git@") {
        return url.to_string();
    }

    match split_userinfo(url) {
        Some((scheme, _, rest)) => format!("{}****@{}", scheme, rest),
        None => url.to_string(),
    }
}

/// Removes the userinfo part of a URL entirely.
fn strip_userinfo(url: &str) -> String {
    if url.starts_with("git@") {
        return url.to_string();
    }

    match split_userinfo(url) {
        Some((scheme, _, rest)) => format!("{}{}", scheme, rest),
        None => url.to_string(),
    }
}

/// Splits `scheme://user@rest` into `("scheme://", "user", "rest")`.
fn split_userinfo(url: &str) -> Option<(&str, &str, &str)> {
    let scheme_end = url.find("://")? + 3;
    let after_scheme = &url[scheme_end..];
    let host_end = after_scheme.find('/').unwrap_or(after_scheme.len());
    let at_pos = after_scheme[..host_end].rfind('@')?;

    Some((
        &url[..scheme_end],
        &after_scheme[..at_pos],
        &after_scheme[at_pos + 1..],
    ))
}

/// Derives a valid label value identifying a repository URL.
///
/// `:` and `/` become `-`, any other character outside `[A-Za-z0-9._-]`
/// becomes `-`, and non-alphanumeric characters are trimmed from both ends.
/// Values longer than 63 characters are truncated and suffixed with a short
/// hash of the URL so distinct repositories keep distinct values.
pub fn label_value_from_url(url: &str) -> String {
    let url = strip_userinfo(url.trim());

    let replaced: String = url
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect();
    let value = trim_non_alphanumeric(&replaced);

    if value.is_empty() {
        return format!("repo-{}", short_hash(&url));
    }

    if value.len() <= MAX_LABEL_VALUE_LEN {
        return value.to_string();
    }

    // All characters are ASCII at this point, so byte slicing is safe.
    let keep = MAX_LABEL_VALUE_LEN - LABEL_HASH_LEN - 1;
    let prefix = trim_non_alphanumeric(&value[..keep]);
    format!("{}-{}", prefix, short_hash(&url))
}

fn trim_non_alphanumeric(value: &str) -> &str {
    value.trim_matches(|c: char| !c.is_ascii_alphanumeric())
}

fn short_hash(input: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..LABEL_HASH_LEN].to_string()
}
