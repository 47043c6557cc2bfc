//! Upload intake: filename validation against the extension allow-list and on-disk name
//! sanitization.

use thiserror::Error;

/// Extensions accepted by `POST /predict`, in the order they are reported to callers.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "docx", "txt"];

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Client-side problems with an upload, detected before any storage or processing happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeError {
    /// The multipart body carried no `file` part.
    #[error("No file part")]
    MissingFile,
    /// The `file` part had an empty filename.
    #[error("No selected file")]
    EmptyFilename,
    /// The filename extension is not on the allow-list.
    #[error("File type not allowed. Allowed types: {}", ALLOWED_EXTENSIONS.join(", "))]
    UnsupportedType,
    /// The multipart body could not be parsed.
    #[error("Malformed multipart body: {0}")]
    MalformedBody(String),
    /// The request body exceeded the configured upload limit.
    #[error("Uploaded file exceeds the maximum allowed size of {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },
}

/// A validated upload ready to be staged on disk.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename exactly as supplied by the client.
    pub original_name: String,
    /// Filename safe to use as an on-disk name.
    pub sanitized_name: String,
    /// Lowercased extension, guaranteed to be on the allow-list.
    pub extension: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Build an upload from a filename already checked by [`validate`], which returned
    /// `extension`.
    pub fn new(original_name: &str, extension: String, bytes: Vec<u8>) -> Self {
        Self {
            original_name: original_name.to_string(),
            sanitized_name: sanitize_filename(original_name, &extension),
            extension,
            bytes,
        }
    }
}

/// Check a filename against the allow-list and return its lowercased extension.
pub fn validate(filename: Option<&str>) -> Result<String, IntakeError> {
    let name = match filename {
        Some(name) if !name.is_empty() => name,
        _ => return Err(IntakeError::EmptyFilename),
    };

    let extension = extension_of(name);
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(IntakeError::UnsupportedType)
    }
}

/// Substring after the last `.`, lowercased. Empty when the name has no `.`.
pub fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Turn a client-supplied filename into a safe on-disk name.
///
/// Path separators and whitespace collapse into `_`, anything outside `[A-Za-z0-9._-]` is
/// dropped, and leading/trailing `.`/`_` are stripped so the result can never escape its
/// directory. The validated extension is re-appended if stripping lost it, and Windows device
/// names get a `_` prefix. Falls back to `document.<extension>` when nothing usable is left.
pub fn sanitize_filename(name: &str, extension: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.chars() {
        if ch == '/' || ch == '\\' || ch.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            if pending_separator && !cleaned.is_empty() {
                cleaned.push('_');
            }
            pending_separator = false;
            cleaned.push(ch);
        }
    }

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return format!("document.{extension}");
    }

    let mut sanitized = trimmed.to_string();
    if extension_of(&sanitized) != extension {
        sanitized = format!("{sanitized}.{extension}");
    }

    let stem = sanitized.split('.').next().unwrap_or_default();
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        format!("_{sanitized}")
    } else {
        sanitized
    }
}
