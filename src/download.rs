//! Content-Disposition for the stitched artifact.
//!
//! The header is stored as object metadata so that whoever serves the output
//! either plays it inline or forces a download under a chosen file name.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// How the final artifact should be presented when fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DownloadBehavior {
    PlayInBrowser,
    Download {
        #[serde(default)]
        file_name: Option<String>,
    },
}

/// Percent-encodings of reserved characters. A file name already carrying one
/// of these was encoded by the caller and is passed through untouched.
const ENCODED_RESERVED: [&str; 17] = [
    "%3A", "%2F", "%3F", "%23", "%5B", "%5D", "%40", "%21", "%24", "%26", "%27", "%28", "%29",
    "%2A", "%2B", "%2C", "%3B",
];

fn contains_encoded_reserved(file_name: &str) -> bool {
    ENCODED_RESERVED
        .iter()
        .any(|encoded| file_name.contains(encoded))
}

/// URI component encoding: everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`
/// is emitted as `%XX` per UTF-8 byte.
fn encode_uri_component(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => encoded.push(byte as char),
            _ => {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
    }
    encoded
}

/// Build the `Content-Disposition` value for a download behavior.
///
/// Returns `None` when the artifact should play inline.
pub fn content_disposition_header(behavior: Option<&DownloadBehavior>) -> Option<String> {
    let file_name = match behavior? {
        DownloadBehavior::PlayInBrowser => return None,
        DownloadBehavior::Download { file_name: None } => return Some("attachment".to_string()),
        DownloadBehavior::Download {
            file_name: Some(file_name),
        } => file_name,
    };

    if contains_encoded_reserved(file_name) {
        return Some(format!("attachment; filename=\"{file_name}\""));
    }

    let encoded = file_name
        .split('/')
        .map(encode_uri_component)
        .collect::<Vec<_>>()
        .join("/");
    Some(format!("attachment; filename=\"{encoded}\""))
}
