//! Constants used throughout the requisition tracker core crate.

/// Default directory for the document store when none is configured.
pub const DEFAULT_DATA_DIR: &str = "reqtrack_data";

/// Directory (under the data dir) used by the local attachment backend by default.
pub const UPLOADS_DIR_NAME: &str = "uploads";

/// File name of every stored document inside its sharded record directory.
pub const DOCUMENT_FILENAME: &str = "document.yaml";

/// Default multipart body limit for attachment uploads (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// National health card (CNS) number length.
pub const CNS_LEN: usize = 15;

/// Health unit registry (CNES) code length.
pub const CNES_LEN: usize = 7;

/// Minimum number of characters in a patient's name.
pub const MIN_PATIENT_NAME_CHARS: usize = 3;

/// Phone numbers are stored as digits only: area code plus 8 or 9 digits.
pub const MIN_PHONE_DIGITS: usize = 10;
pub const MAX_PHONE_DIGITS: usize = 11;

/// Upper bound on a single procedure line's quantity.
pub const MAX_PROCEDURE_QUANTITY: u32 = 99;

/// Longest free-text note accepted on requisitions and transitions.
pub const MAX_NOTE_CHARS: usize = 2_000;
