//! M3U playlist reading for bulk scans

use std::path::Path;

use serde::Serialize;

use crate::error::{EngineResult, ProbeEngineError};

/// Group used when an entry has no `group-title`
pub const DEFAULT_GROUP: &str = "General";

/// One channel line from a playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistEntry {
    pub name: String,
    pub group: String,
    pub url: String,
}

/// Parse M3U text.
///
/// Each non-comment line is a URL; the preceding `#EXTINF` line, if any,
/// supplies the name (text after the last comma) and `group-title`. URLs
/// without an `#EXTINF` are kept and named after themselves.
pub fn parse_m3u(text: &str) -> Vec<PlaylistEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<(String, String)> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }

        if let Some(info) = line.strip_prefix("#EXTINF:") {
            let name = info
                .rsplit_once(',')
                .map(|(_, name)| name.trim().to_string())
                .unwrap_or_default();
            let group = quoted_attribute(info, "group-title")
                .unwrap_or(DEFAULT_GROUP)
                .to_string();
            pending = Some((name, group));
        } else if !line.starts_with('#') {
            let (name, group) = pending
                .take()
                .unwrap_or_else(|| (String::new(), DEFAULT_GROUP.to_string()));
            let name = if name.is_empty() { line.to_string() } else { name };
            entries.push(PlaylistEntry {
                name,
                group,
                url: line.to_string(),
            });
        }
    }

    entries
}

/// `key="value"` lookup inside an `#EXTINF` line
fn quoted_attribute<'a>(info: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("{}=\"", key);
    let start = info.find(&marker)? + marker.len();
    let len = info[start..].find('"')?;
    Some(&info[start..start + len])
}

/// Read and parse a playlist file; an empty playlist is an error
pub fn read_playlist(path: &Path) -> EngineResult<Vec<PlaylistEntry>> {
    let text = std::fs::read_to_string(path)?;
    let entries = parse_m3u(&text);
    if entries.is_empty() {
        return Err(ProbeEngineError::Playlist {
            message: format!("no stream URLs found in {}", path.display()),
        });
    }
    Ok(entries)
}
