use crate::config::{ALLOWED_EXTENSIONS, ALLOWED_MIME_TYPES};
use mime::Mime;
use std::path::Path;
use thiserror::Error;

/// Why an upload was refused. Each variant maps to a stable error code so that a
/// client uploading many images can report a reason per file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("MIME type '{declared}' is not allowed. Only JPEG, PNG, GIF and WebP images are accepted.")]
    UnsupportedType { declared: String },

    #[error("File '{filename}' does not have an image extension (jpeg, jpg, png, gif, webp)")]
    UnsupportedExtension { filename: String },

    #[error("File content looks like '{detected}', not an image")]
    ContentMismatch { detected: String },

    #[error("File size {size} bytes exceeds maximum allowed {max} bytes ({} MB)", .max / 1024 / 1024)]
    TooLarge { size: usize, max: usize },

    #[error("Upload exceeds the maximum allowed size of {max} bytes ({} MB)", .max / 1024 / 1024)]
    ExceedsLimit { max: usize },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::UnsupportedType { .. } => "INVALID_MIME_TYPE",
            ValidationError::UnsupportedExtension { .. } => "INVALID_EXTENSION",
            ValidationError::ContentMismatch { .. } => "CONTENT_MISMATCH",
            ValidationError::TooLarge { .. } | ValidationError::ExceedsLimit { .. } => {
                "FILE_TOO_LARGE"
            }
        }
    }
}

/// Result of a successful validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImage {
    pub display_name: String,
    pub mime_type: String,
    pub extension: String,
}

/// Runs every intake check in order: size, declared type, extension, content sniffing.
/// Nothing is written to disk until this returns Ok.
pub fn validate_image(
    filename: &str,
    content_type: Option<&str>,
    data: &[u8],
    max_size: usize,
) -> Result<ValidatedImage, ValidationError> {
    validate_file_size(data.len(), max_size)?;
    let mime_type = validate_mime_type(content_type.unwrap_or(""))?;
    let display_name = sanitize_filename(filename);
    let extension = validate_extension(&display_name)?;
    verify_magic_bytes(data)?;

    Ok(ValidatedImage {
        display_name,
        mime_type,
        extension,
    })
}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ValidationError> {
    if size > max_size {
        return Err(ValidationError::TooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}

/// Validates the declared MIME type against the image allowlist and returns its
/// normalised form (`image/jpg` and `image/pjpeg` become `image/jpeg`).
pub fn validate_mime_type(content_type: &str) -> Result<String, ValidationError> {
    let rejected = || ValidationError::UnsupportedType {
        declared: content_type.to_string(),
    };

    let parsed: Mime = content_type.trim().parse().map_err(|_| rejected())?;
    if parsed.type_() != mime::IMAGE {
        return Err(rejected());
    }

    let normalized = match parsed.subtype().as_str().to_lowercase().as_str() {
        "jpg" | "pjpeg" => mime::IMAGE_JPEG.essence_str().to_string(),
        other => format!("image/{}", other),
    };

    if ALLOWED_MIME_TYPES.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(rejected())
    }
}

/// Checks the client-supplied name carries an image extension; returns it lower-cased
pub fn validate_extension(filename: &str) -> Result<String, ValidationError> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| ValidationError::UnsupportedExtension {
            filename: filename.to_string(),
        })
}

/// Rejects bodies whose magic bytes identify a known non-image format.
/// Unrecognised content is let through; the detector is the final judge.
pub fn verify_magic_bytes(data: &[u8]) -> Result<(), ValidationError> {
    match infer::get(data) {
        Some(kind) if kind.matcher_type() != infer::MatcherType::Image => {
            Err(ValidationError::ContentMismatch {
                detected: kind.mime_type().to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Reduces a client-supplied name to a display-safe file name component.
/// The result is only ever shown back to the client, never used as a path.
pub fn sanitize_filename(filename: &str) -> String {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    let sanitized: String = last
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        "unnamed".to_string()
    } else {
        sanitized
    }
}
