//! Domain label sanitizing and FQDN validation.
//!
//! Everything downstream of this module only ever sees normalized hosts:
//! lowercase, dot-separated labels of 1-63 `[a-z0-9-]` characters that
//! neither start nor end with a hyphen.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::{HarborError, Result};

pub const MAX_LABEL_LEN: usize = 63;

/// Derives a DNS label from free text such as a directory name.
///
/// Strips diacritics, lowercases, turns every run of disallowed characters
/// into one hyphen and trims hyphens from both ends.
pub fn sanitize_label(raw: &str) -> String {
    let mut label = String::with_capacity(raw.len());
    let mut pending_hyphen = false;

    for c in raw.nfd().filter(|c| !is_combining_mark(*c)) {
        for lower in c.to_lowercase() {
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
                if pending_hyphen && !label.is_empty() {
                    label.push('-');
                }
                pending_hyphen = false;
                label.push(lower);
            } else {
                pending_hyphen = true;
            }
        }
    }

    label.truncate(MAX_LABEL_LEN);
    label.trim_end_matches('-').to_string()
}

/// Appends `suffix` to a bare label; anything containing a dot is returned as-is.
pub fn ensure_fqdn(input: &str, suffix: &str) -> String {
    let input = input.trim();
    let suffix = suffix.trim().trim_start_matches('.');

    if input.is_empty() || input.contains('.') {
        input.to_string()
    } else {
        format!("{input}.{suffix}")
    }
}

pub fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_LABEL_LEN {
        return false;
    }
    let allowed = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-';
    bytes.iter().all(allowed) && bytes[0] != b'-' && bytes[bytes.len() - 1] != b'-'
}

pub fn is_valid_domain(fqdn: &str) -> bool {
    !fqdn.is_empty() && fqdn.split('.').all(is_valid_label)
}

/// Canonical FQDN for user input under the given default suffix.
///
/// A bare label is sanitized and gets the suffix appended; input that
/// already names a domain is only trimmed and lowercased.
pub fn normalize(input: &str, suffix: &str) -> Result<String> {
    let trimmed = input.trim();
    let fqdn = if trimmed.contains('.') {
        trimmed.to_lowercase()
    } else {
        ensure_fqdn(&sanitize_label(trimmed), suffix)
    };

    if is_valid_domain(&fqdn) {
        Ok(fqdn)
    } else {
        Err(HarborError::InvalidDomain(if fqdn.is_empty() {
            trimmed.to_string()
        } else {
            fqdn
        }))
    }
}

/// Final label of a host (`frontend.test` -> `test`).
pub fn suffix_of(host: &str) -> &str {
    host.rsplit('.').next().unwrap_or(host)
}

/// Replaces a trailing `.old_suffix` with `.new_suffix`.
pub fn replace_suffix(host: &str, old_suffix: &str, new_suffix: &str) -> Option<String> {
    host.strip_suffix(&format!(".{old_suffix}"))
        .map(|stem| format!("{stem}.{new_suffix}"))
}

/// Reduces a proxy target to the `host[:port]` form the proxy daemon expects.
///
/// Accepts `localhost:3000`, `http://localhost:3000` and
/// `https://example.com/path`; the scheme, path and credentials are dropped.
pub fn normalize_proxy_target(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();

    let candidate = match ["http://", "https://"]
        .iter()
        .find(|scheme| lower.starts_with(*scheme))
    {
        Some(scheme) => {
            let rest = &lower[scheme.len()..];
            let authority = rest
                .split(['/', '?', '#'])
                .next()
                .unwrap_or_default();
            authority
                .rsplit('@')
                .next()
                .unwrap_or_default()
                .to_string()
        }
        None => trimmed.to_string(),
    };

    if is_host_port(&candidate) {
        Ok(candidate)
    } else {
        Err(HarborError::InvalidProxyTarget(input.to_string()))
    }
}

fn is_host_port(value: &str) -> bool {
    let (host, port) = match value.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (value, None),
    };

    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let port_ok = port.map_or(true, |p| {
        !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())
    });

    host_ok && port_ok
}

/// New default suffixes: 2-63 ASCII letters.
pub fn is_valid_tld(tld: &str) -> bool {
    (2..=MAX_LABEL_LEN).contains(&tld.len()) && tld.chars().all(|c| c.is_ascii_alphabetic())
}
