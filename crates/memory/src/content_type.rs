//! Content-type resolution for store paths.
//!
//! Structured files (`.json`, `.yaml`, `.yml`) go through four layers, first
//! match wins:
//!
//! 1. dual-extension markers (`notes.knowledge.yaml`, `hello.msg.json`)
//! 2. directory hints (`knowledge/`, `inbox/`, `outbox/`, `messages/`)
//! 3. byte signatures (binary magic numbers or NUL bytes → octet-stream)
//! 4. a sniff of the first [`SNIFF_BYTES`] for marker keys
//!
//! Any parse failure in the sniff falls back to the extension's family.

use cybermem_core::ContentType;
use std::io::Read;
use std::path::Path;

/// How much of a file the sniffer looks at.
pub const SNIFF_BYTES: usize = 1024;

const KNOWLEDGE_KEYS: [&str; 3] = ["title", "tags", "category"];
const MESSAGE_KEYS: [&str; 3] = ["to", "from", "subject"];

const KNOWLEDGE_DIRS: [&str; 1] = ["knowledge"];
const MESSAGE_DIRS: [&str; 3] = ["inbox", "outbox", "messages"];

/// Leading bytes of common binary formats.
const MAGIC: &[&[u8]] = &[
    b"\x89PNG",
    b"\xFF\xD8\xFF",
    b"GIF8",
    b"%PDF",
    b"PK\x03\x04",
    b"\x1F\x8B",
    b"\x7FELF",
    b"BZh",
    b"7z\xBC\xAF",
    b"RIFF",
    b"\x00asm",
    b"SQLite format 3",
];

/// Resolve the content type of a file on disk.
///
/// Reads at most [`SNIFF_BYTES`]; an unreadable file is typed from its name alone.
pub fn detect_file(absolute: &Path, relative: &str) -> ContentType {
    if absolute.is_dir() {
        return ContentType::Unknown;
    }
    let head = read_head(absolute).unwrap_or_default();
    detect(relative, &head)
}

/// Resolve the content type from a store path and a content prefix.
pub fn detect(relative: &str, head: &[u8]) -> ContentType {
    let name = relative
        .rsplit('/')
        .next()
        .unwrap_or(relative)
        .to_ascii_lowercase();
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

    let family = match extension {
        "json" => Some(ContentType::Json),
        "yaml" | "yml" => Some(ContentType::Yaml),
        "md" | "markdown" => return ContentType::Markdown,
        "txt" | "log" => return ContentType::TextPlain,
        _ => None,
    };

    let Some(family) = family else {
        return if looks_binary(head) {
            ContentType::OctetStream
        } else {
            ContentType::TextPlain
        };
    };

    if let Some(marked) = dual_extension(&name) {
        return marked;
    }
    if let Some(hinted) = directory_hint(relative) {
        return hinted;
    }
    if looks_binary(head) {
        return ContentType::OctetStream;
    }
    sniff(family, head).unwrap_or(family)
}

fn dual_extension(name: &str) -> Option<ContentType> {
    let stem = name.rsplit_once('.').map(|(stem, _)| stem)?;
    let inner = stem.rsplit_once('.').map(|(_, inner)| inner)?;
    match inner {
        "knowledge" => Some(ContentType::Knowledge),
        "msg" | "message" => Some(ContentType::Message),
        _ => None,
    }
}

fn directory_hint(relative: &str) -> Option<ContentType> {
    let segments: Vec<String> = relative
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect();
    let ancestors = segments.split_last().map(|(_, dirs)| dirs).unwrap_or(&[]);

    // The nearest ancestor decides.
    ancestors.iter().rev().find_map(|dir| {
        if KNOWLEDGE_DIRS.contains(&dir.as_str()) {
            Some(ContentType::Knowledge)
        } else if MESSAGE_DIRS.contains(&dir.as_str()) {
            Some(ContentType::Message)
        } else {
            None
        }
    })
}

/// Binary magic numbers, or a NUL byte anywhere in the prefix.
pub fn looks_binary(head: &[u8]) -> bool {
    MAGIC.iter().any(|magic| head.starts_with(magic)) || head.contains(&0)
}

fn sniff(family: ContentType, head: &[u8]) -> Option<ContentType> {
    let text = std::str::from_utf8(head).ok()?;
    let keys: Vec<String> = match family {
        ContentType::Json => match serde_json::from_str::<serde_json::Value>(text).ok()? {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            _ => return None,
        },
        ContentType::Yaml => match serde_yaml::from_str::<serde_yaml::Value>(text).ok()? {
            serde_yaml::Value::Mapping(map) => map
                .keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect(),
            _ => return None,
        },
        _ => return None,
    };

    let has_all = |wanted: &[&str]| wanted.iter().all(|w| keys.iter().any(|k| k == w));
    if has_all(&KNOWLEDGE_KEYS[..]) {
        Some(ContentType::Knowledge)
    } else if has_all(&MESSAGE_KEYS[..]) {
        Some(ContentType::Message)
    } else {
        None
    }
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut head = Vec::with_capacity(SNIFF_BYTES);
    file.take(SNIFF_BYTES as u64).read_to_end(&mut head)?;
    Ok(head)
}
