// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event Template Builders
//!
//! Constructors for every event kind the publisher emits. Templates carry
//! no identity; a [`crate::signer::Signer`] completes them.

use serde::{Deserialize, Serialize};

use super::{kinds, unix_time, Event, EventTemplate, Tag};
use crate::scan::FileEntry;

/// Client name advertised in announcement tags.
pub const CLIENT_NAME: &str = "driftsite";

/// Lifetime of blob-server authorization events, seconds.
pub const AUTH_LIFETIME_SECS: u64 = 120;

/// Profile fields published as kind-0 content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// File announcement: `d` = logical path, `x` = content hash, plus media
/// type, decimal size and the client tag.
pub fn file_announcement(entry: &FileEntry) -> EventTemplate {
    EventTemplate::new(
        kinds::FILE_ANNOUNCEMENT,
        vec![
            Tag::new("d", [entry.path.as_str()]),
            Tag::new("x", [entry.hash.as_str()]),
            Tag::new("m", [entry.media_type.as_str()]),
            Tag::new("size", [entry.size.to_string()]),
            Tag::new("client", [CLIENT_NAME]),
        ],
        "",
    )
}

/// Blob-server authorization for uploading one blob.
pub fn upload_authorization(hash: &str, path: &str) -> EventTemplate {
    authorization("upload", hash, format!("Upload {path}"))
}

/// Blob-server authorization for deleting one blob.
pub fn delete_authorization(hash: &str) -> EventTemplate {
    authorization("delete", hash, format!("Delete {hash}"))
}

fn authorization(action: &str, hash: &str, description: String) -> EventTemplate {
    EventTemplate::new(
        kinds::BLOB_AUTH,
        vec![
            Tag::new("t", [action]),
            Tag::new("x", [hash]),
            Tag::new(
                "expiration",
                [(unix_time() + AUTH_LIFETIME_SECS).to_string()],
            ),
        ],
        description,
    )
}

/// Deletion event referencing a file announcement. The expiration tag is
/// advisory; relays may or may not honor it.
pub fn deletion(announcement: &Event) -> EventTemplate {
    EventTemplate::new(
        kinds::DELETION,
        vec![
            Tag::new("e", [announcement.id.as_str()]),
            Tag::new(
                "expiration",
                [(unix_time() + AUTH_LIFETIME_SECS).to_string()],
            ),
        ],
        "",
    )
}

/// Relay list: one `r` tag per relay.
pub fn relay_list(relays: &[String]) -> EventTemplate {
    EventTemplate::new(
        kinds::RELAY_LIST,
        relays.iter().map(|url| Tag::new("r", [url.as_str()])).collect(),
        "",
    )
}

/// Server list: one `server` tag per blob server.
pub fn server_list(servers: &[String]) -> EventTemplate {
    EventTemplate::new(
        kinds::SERVER_LIST,
        servers
            .iter()
            .map(|url| Tag::new("server", [url.as_str()]))
            .collect(),
        "",
    )
}

/// Profile metadata; content is the JSON of the profile fields.
pub fn profile(profile: &Profile) -> EventTemplate {
    let content = serde_json::to_string(profile).expect("profile serialization cannot fail");
    EventTemplate::new(kinds::PROFILE, vec![], content)
}
