//! Upload naming rules shared by both storage backends.
//!
//! Clients generate an identifier for each attachment before uploading it and embed it in the
//! multipart file name as `<client_id>__<original name>`. The identifier is what the wizard uses
//! to reconcile upload results with its image list, so it must survive the round trip through
//! either backend unchanged.

use crate::constants::{
    CLIENT_ID_SEPARATOR, FORBIDDEN_EXTENSIONS, MAX_CLIENT_ID_LEN, MAX_SEGMENT_LEN,
    MIN_CLIENT_ID_LEN,
};
use crate::FilesError;

/// A validated `<client_id>__<original name>` upload file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFileName {
    client_id: String,
    original: String,
}

impl ClientFileName {
    /// Builds a name from its two parts, sanitising the original file name.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidName`] when the client id is malformed, the sanitised name is
    /// empty, or the extension is forbidden.
    pub fn new(client_id: &str, original: &str) -> Result<Self, FilesError> {
        validate_client_id(client_id)?;
        let original = sanitise_original(original)?;
        Ok(Self {
            client_id: client_id.to_string(),
            original,
        })
    }

    /// Parses an uploaded file name that embeds the client id.
    pub fn parse(file_name: &str) -> Result<Self, FilesError> {
        let (client_id, original) = file_name.split_once(CLIENT_ID_SEPARATOR).ok_or_else(|| {
            FilesError::InvalidName(format!(
                "file name must be '<client_id>{}<name>', got '{}'",
                CLIENT_ID_SEPARATOR, file_name
            ))
        })?;
        Self::new(client_id, original)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// The stored file name.
    pub fn file_name(&self) -> String {
        format!("{}{}{}", self.client_id, CLIENT_ID_SEPARATOR, self.original)
    }
}

impl std::fmt::Display for ClientFileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_name())
    }
}

fn validate_client_id(client_id: &str) -> Result<(), FilesError> {
    let len_ok = (MIN_CLIENT_ID_LEN..=MAX_CLIENT_ID_LEN).contains(&client_id.len());
    let chars_ok = client_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    // A trailing '_' would merge into the separator and not parse back.
    let edges_ok = !client_id.ends_with('_');
    if !len_ok || !chars_ok || !edges_ok || client_id.contains(CLIENT_ID_SEPARATOR) {
        return Err(FilesError::InvalidName(format!(
            "client id must be {}-{} characters of [A-Za-z0-9_-], not ending in '_', got '{}'",
            MIN_CLIENT_ID_LEN, MAX_CLIENT_ID_LEN, client_id
        )));
    }
    Ok(())
}

/// Reduces a user-supplied name to a single safe path segment.
///
/// Directory components are dropped, anything outside `[A-Za-z0-9._-]` becomes `_`, and leading
/// dots are stripped so the result can never be a hidden file or a traversal.
fn sanitise_original(original: &str) -> Result<String, FilesError> {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned = cleaned.trim_start_matches('.').to_string();
    cleaned.truncate(MAX_SEGMENT_LEN);

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return Err(FilesError::InvalidName(format!(
            "file name '{}' has no usable characters",
            original
        )));
    }

    if let Some((_, ext)) = cleaned.rsplit_once('.') {
        let ext = ext.to_ascii_lowercase();
        if FORBIDDEN_EXTENSIONS.contains(&ext.as_str()) {
            return Err(FilesError::InvalidName(format!(
                "files with extension '.{}' are not accepted",
                ext
            )));
        }
    }

    Ok(cleaned)
}

/// Validates a folder name used to group one requisition's attachments.
pub fn validate_folder(folder: &str) -> Result<(), FilesError> {
    let ok = !folder.is_empty()
        && folder.len() <= MAX_SEGMENT_LEN
        && !folder.starts_with('.')
        && folder
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if !ok {
        return Err(FilesError::InvalidName(format!(
            "folder must be a single segment of [A-Za-z0-9._-], got '{}'",
            folder
        )));
    }
    Ok(())
}
