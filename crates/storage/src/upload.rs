//! Editor uploads.
//!
//! Files uploaded from the content editor (images, audio, video and generic
//! files) arrive as an [`UploadedFileInfo`] extracted from the request by the
//! web layer. [`EditorUpload::validate`] checks the file against the field's
//! accepted kinds and the per-kind extension table, reads image dimensions,
//! and produces a [`ValidatedUpload`], which is the only thing
//! [`save_resource`](crate::StorageStrategy::save_resource) accepts.

use crate::error::{ErrorKind, Result};
use crate::path::validate_segment;
use crate::tree::TreeOps;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use derive_more::Display;
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const IMAGE_TYPES: &[(&str, &str)] = &[("image/png", "png"), ("image/jpeg", "jpeg"), ("image/jpg", "jpg"), ("image/gif", "gif")];
const AUDIO_TYPES: &[(&str, &str)] = &[
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/x-wav", "wav"),
    ("audio/wav", "wav"),
    ("application/ogg", "ogg"),
    ("audio/ogg", "ogg"),
    ("video/ogg", "ogg"),
];
const VIDEO_TYPES: &[(&str, &str)] = &[("video/webm", "webm"), ("video/mp4", "mp4"), ("video/ogg", "ogg")];

/// Broad category of an uploaded file, as declared by the editor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FileKind {
    #[display("image")]
    Image,
    #[display("audio")]
    Audio,
    #[display("video")]
    Video,
    #[display("file")]
    File,
}
impl FileKind {
    /// Directory the kind is stored under, relative to the content (or
    /// editor) directory: `images`, `audios`, `videos` or `files`.
    pub fn directory(self) -> String {
        format!("{self}s")
    }

    fn mime_types(self) -> Option<&'static [(&'static str, &'static str)]> {
        match self {
            FileKind::Image => Some(IMAGE_TYPES),
            FileKind::Audio => Some(AUDIO_TYPES),
            FileKind::Video => Some(VIDEO_TYPES),
            FileKind::File => None,
        }
    }
}

/// Why an upload was refused.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Rejection {
    #[display("cannot get file type")]
    MissingType,
    #[display("file type not allowed")]
    TypeNotAllowed,
    #[display("{_0} file type not allowed")]
    ExtensionNotAllowed(FileKind),
    #[display("cannot read image")]
    UnreadableImage,
    #[display("cannot read image metadata")]
    UnreadableImageMetadata,
    #[display("upload carries no data")]
    MissingData,
}

/// What the web layer extracted from the upload request.
#[derive(Debug, Clone, Default)]
pub struct UploadedFileInfo {
    /// Original file name as sent by the browser.
    pub name: String,
    pub size: u64,
    /// Kind declared by the editor field.
    pub kind: Option<FileKind>,
    /// Kinds the field accepts.
    pub accepted: Vec<FileKind>,
    /// Extension of the original file, with or without the leading dot.
    pub extension: String,
    /// Where the request body was spooled to, if not sent inline.
    pub temp_path: Option<PathBuf>,
    /// Inline base64 payload, used instead of `temp_path` when present.
    pub base64_data: Option<String>,
}
impl UploadedFileInfo {
    fn extension(&self) -> String {
        self.extension.trim_start_matches('.').to_lowercase()
    }
}

/// Response body for the editor once a file is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    /// Path relative to the content (or editor) directory.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<usize>,
}

/// An upload that has not been validated yet.
#[derive(Debug, Clone)]
pub struct EditorUpload {
    info: UploadedFileInfo,
}
impl EditorUpload {
    pub fn new(info: UploadedFileInfo) -> Self {
        Self { info }
    }

    /// Checks the upload's kind and extension, and for images that the data
    /// is a readable image with dimensions.
    pub async fn validate(self, tree: &TreeOps) -> Result<ValidatedUpload> {
        let Some(kind) = self.info.kind else {
            exn::bail!(ErrorKind::InvalidUpload(Rejection::MissingType));
        };
        if !self.info.accepted.contains(&kind) {
            exn::bail!(ErrorKind::InvalidUpload(Rejection::TypeNotAllowed));
        }

        let extension = self.info.extension();
        let mime = match kind.mime_types() {
            None => None,
            Some(table) => match table.iter().find(|(_, ext)| *ext == extension) {
                Some((mime, _)) => Some(mime.to_string()),
                None => exn::bail!(ErrorKind::InvalidUpload(Rejection::ExtensionNotAllowed(kind))),
            },
        };

        let (mut width, mut height) = (None, None);
        if kind == FileKind::Image {
            let data = match self.payload(tree).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(error = %e, file = %self.info.name, "Could not read uploaded image");
                    exn::bail!(ErrorKind::InvalidUpload(Rejection::UnreadableImage));
                },
            };
            let Ok(size) = imagesize::blob_size(&data) else {
                exn::bail!(ErrorKind::InvalidUpload(Rejection::UnreadableImageMetadata));
            };
            (width, height) = (Some(size.width), Some(size.height));
        }

        let name = stored_name(&self.info.name, &extension);
        validate_segment(&name)?;
        Ok(ValidatedUpload { info: self.info, kind, name, mime, width, height })
    }

    async fn payload(&self, tree: &TreeOps) -> Result<Vec<u8>> {
        payload(&self.info, tree).await
    }
}

/// An upload that passed validation and can be stored.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    info: UploadedFileInfo,
    kind: FileKind,
    name: String,
    mime: Option<String>,
    width: Option<usize>,
    height: Option<usize>,
}
impl ValidatedUpload {
    /// Unique stored file name: `<original stem>-<uuid>.<extension>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<kind>s/<name>`, relative to wherever the upload is saved.
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.kind.directory()).join(&self.name)
    }

    pub fn result(&self) -> UploadResult {
        UploadResult {
            path: format!("{}/{}", self.kind.directory(), self.name),
            mime: self.mime.clone(),
            width: self.width,
            height: self.height,
        }
    }

    pub(crate) fn base64_data(&self) -> Option<&str> {
        self.info.base64_data.as_deref()
    }

    pub(crate) fn temp_path(&self) -> Option<&Path> {
        self.info.temp_path.as_deref()
    }
}

/// Decodes an inline base64 payload.
pub(crate) fn decode_base64(data: &str) -> Result<Vec<u8>> {
    // Data URLs are accepted as well as bare base64.
    let data = data.split_once(";base64,").map_or(data, |(_, encoded)| encoded);
    Ok(BASE64.decode(data.trim()).map_err(|e| ErrorKind::Encoding(e.to_string()))?)
}

async fn payload(info: &UploadedFileInfo, tree: &TreeOps) -> Result<Vec<u8>> {
    match (&info.base64_data, &info.temp_path) {
        (Some(data), _) => decode_base64(data),
        (None, Some(path)) => tree.read(path).await,
        (None, None) => exn::bail!(ErrorKind::InvalidUpload(Rejection::MissingData)),
    }
}

fn stored_name(original: &str, extension: &str) -> String {
    let stem = Path::new(original).file_stem().and_then(|s| s.to_str()).filter(|s| !s.is_empty()).unwrap_or("file");
    match extension.is_empty() {
        true => format!("{stem}-{}", Uuid::new_v4()),
        false => format!("{stem}-{}.{extension}", Uuid::new_v4()),
    }
}
