/// Separator between the client-generated identifier and the original file name.
pub const CLIENT_ID_SEPARATOR: &str = "__";

/// Bounds on the client-generated identifier embedded in upload file names.
pub const MIN_CLIENT_ID_LEN: usize = 8;
pub const MAX_CLIENT_ID_LEN: usize = 64;

/// Longest folder or file name segment accepted by either backend.
pub const MAX_SEGMENT_LEN: usize = 200;

/// Extensions that are never stored, whatever the backend.
pub const FORBIDDEN_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", // cspell:ignore dylib
    "sh", "bash", "zsh", "fish", "bat", "cmd", "ps1", "app", "bin", "run", "js", "html",
];

pub const DEFAULT_DRIVE_API_URL: &str = "https://api.dropboxapi.com";
pub const DEFAULT_DRIVE_CONTENT_URL: &str = "https://content.dropboxapi.com";
pub const DEFAULT_DRIVE_AUTH_URL: &str = "https://api.dropbox.com";
pub const DEFAULT_DRIVE_ROOT_FOLDER: &str = "/requisitions";

/// Seconds before expiry at which a cached access token is considered stale.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
