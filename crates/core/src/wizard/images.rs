//! Attachment items tracked by the wizard while their files upload.

use crate::error::FieldError;
use serde::{Deserialize, Serialize};

/// Upload progress of one attachment.
///
/// ```text
/// Pending ──► Uploading ──► Uploaded
///                │  ▲
///                ▼  │ (manual retry)
///               Error
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImageStatus {
    Pending,
    Uploading,
    Uploaded { reference: String },
    Error { message: String },
}

impl ImageStatus {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, ImageStatus::Uploaded { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Uploading => "uploading",
            ImageStatus::Uploaded { .. } => "uploaded",
            ImageStatus::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    /// Identifier generated by the client; also the prefix of the stored file name.
    pub client_id: String,
    pub file_name: String,
    pub status: ImageStatus,
}

impl ImageItem {
    pub fn new(client_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            file_name: file_name.into(),
            status: ImageStatus::Pending,
        }
    }

    /// Moves to `Uploading`. Allowed from `Pending` and, for a retry, from `Error`.
    pub fn start_upload(&mut self) -> Result<(), FieldError> {
        match self.status {
            ImageStatus::Pending | ImageStatus::Error { .. } => {
                self.status = ImageStatus::Uploading;
                Ok(())
            }
            _ => Err(self.refuse("start uploading")),
        }
    }

    pub fn finish_upload(&mut self, reference: impl Into<String>) -> Result<(), FieldError> {
        match self.status {
            ImageStatus::Uploading => {
                self.status = ImageStatus::Uploaded {
                    reference: reference.into(),
                };
                Ok(())
            }
            _ => Err(self.refuse("finish uploading")),
        }
    }

    pub fn fail_upload(&mut self, message: impl Into<String>) -> Result<(), FieldError> {
        match self.status {
            ImageStatus::Uploading => {
                self.status = ImageStatus::Error {
                    message: message.into(),
                };
                Ok(())
            }
            _ => Err(self.refuse("fail")),
        }
    }

    /// Storage reference once uploaded.
    pub fn reference(&self) -> Option<&str> {
        match &self.status {
            ImageStatus::Uploaded { reference } => Some(reference),
            _ => None,
        }
    }

    fn refuse(&self, what: &str) -> FieldError {
        FieldError::new(
            "images",
            format!(
                "image {} cannot {} while {}",
                self.client_id,
                what,
                self.status.label()
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut item = ImageItem::new("a1b2c3d4", "exame.jpg");
        item.start_upload().unwrap();
        item.finish_upload("local:req/a1b2c3d4__exame.jpg").unwrap();
        assert_eq!(item.reference(), Some("local:req/a1b2c3d4__exame.jpg"));
    }

    #[test]
    fn failed_upload_can_be_retried() {
        let mut item = ImageItem::new("a1b2c3d4", "exame.jpg");
        item.start_upload().unwrap();
        item.fail_upload("timeout").unwrap();
        assert!(matches!(item.status, ImageStatus::Error { .. }));
        item.start_upload().unwrap();
        assert_eq!(item.status, ImageStatus::Uploading);
    }

    #[test]
    fn uploaded_only_from_uploading() {
        let mut item = ImageItem::new("a1b2c3d4", "exame.jpg");
        assert!(item.finish_upload("x").is_err());
        assert_eq!(item.status, ImageStatus::Pending);

        item.start_upload().unwrap();
        item.finish_upload("x").unwrap();
        assert!(item.start_upload().is_err());
        assert!(item.fail_upload("late").is_err());
        assert!(item.status.is_uploaded());
    }

    #[test]
    fn status_serialises_with_tag() {
        let json = serde_json::to_value(ImageStatus::Uploaded {
            reference: "drive:/r/x".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "uploaded", "reference": "drive:/r/x"})
        );
    }
}
