//! Parsing of git remote URLs in their https, ssh and scp-like forms.

use crate::error::{Error, Result};

/// A string is treated as a remote URL if it has a scheme or a user part.
pub fn is_url(s: &str) -> bool {
    s.contains("://") || s.contains('@')
}

/// Split a remote URL into `(host, path)`.
fn split(url: &str) -> Result<(&str, &str)> {
    let url = url.trim();
    if let Some((_, rest)) = url.split_once("://") {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host_port = authority.rsplit('@').next().unwrap_or(authority);
        let host = host_port.split(':').next().unwrap_or(host_port);
        return Ok((host, path));
    }
    if let Some((_, rest)) = url.split_once('@') {
        if let Some((host, path)) = rest.split_once(':') {
            return Ok((host, path));
        }
    }
    Err(Error::InvalidRemoteUrl(url.to_string()))
}

/// Host name of a remote URL, without credentials or port.
pub fn host_from_url(url: &str) -> Result<String> {
    let (host, _) = split(url)?;
    if host.is_empty() {
        return Err(Error::InvalidRemoteUrl(url.to_string()));
    }
    Ok(host.to_ascii_lowercase())
}

/// Extract `owner/name` (or `group/sub/name`) from a remote URL.
///
/// ```
/// use devplan_core::remote_url::full_name_from_url;
/// assert_eq!(full_name_from_url("git@github.com:o/r.git").unwrap(), "o/r");
/// ```
pub fn full_name_from_url(url: &str) -> Result<String> {
    let (_, path) = split(url)?;
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let path = path.trim_end_matches('/');
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(Error::InvalidRemoteUrl(url.trim().to_string()));
    }
    Ok(path.to_string())
}
