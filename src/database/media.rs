use std::fmt::{self, Display};
use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::info;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// Image payload resolved once at the request boundary: either the inline
/// `data:image/<ext>;base64,<payload>` form or raw bytes from a binary
/// upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ImageInput {
    InlineEncoded { payload: String, extension: String },
    RawBytes { bytes: Vec<u8>, extension: String },
}

#[derive(Debug)]
pub struct ImageFormatError {
    info: String,
}

impl ImageFormatError {
    fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl Display for ImageFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for ImageFormatError {}

impl TryFrom<String> for ImageInput {
    type Error = ImageFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let rest = value
            .strip_prefix("data:image/")
            .ok_or(ImageFormatError::new("image must be a data:image URI"))?;
        let (extension, payload) = rest
            .split_once(";base64,")
            .ok_or(ImageFormatError::new("image payload must be base64-encoded"))?;

        if extension.is_empty() || payload.is_empty() {
            return Err(ImageFormatError::new("empty image type or payload"));
        }

        Ok(Self::InlineEncoded {
            payload: payload.to_string(),
            extension: extension.to_ascii_lowercase(),
        })
    }
}

impl ImageInput {
    pub fn extension(&self) -> &str {
        match self {
            Self::InlineEncoded { extension, .. } | Self::RawBytes { extension, .. } => extension,
        }
    }

    pub fn into_bytes(self) -> Result<(Vec<u8>, String), ApiError> {
        match self {
            Self::InlineEncoded { payload, extension } => STANDARD
                .decode(payload.as_bytes())
                .map(|bytes| (bytes, extension))
                .map_err(|_| ApiError::single("image", "invalid base64 image payload")),
            Self::RawBytes { bytes, extension } => Ok((bytes, extension)),
        }
    }
}

/// Writes decoded images under the media root with generated file names,
/// returning the stored relative reference.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn store_image(&self, input: ImageInput) -> Result<String, ApiError> {
        let (bytes, extension) = input.into_bytes()?;
        let name = format!("{}.{extension}", Uuid::new_v4());

        fs::create_dir_all(&self.root)
            .map_err(|e| ApiError::Internal(format!("could not create media directory: {e}")))?;
        fs::write(self.root.join(&name), &bytes)
            .map_err(|e| ApiError::Internal(format!("could not store image: {e}")))?;

        info!("stored image {name} ({} bytes)", bytes.len());
        Ok(format!("media/{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_data_uri() {
        let input = ImageInput::try_from(String::from("data:image/PNG;base64,aGVsbG8=")).unwrap();
        assert_eq!(
            input,
            ImageInput::InlineEncoded {
                payload: String::from("aGVsbG8="),
                extension: String::from("png"),
            }
        );
        assert_eq!(input.extension(), "png");
    }

    #[test]
    fn rejects_non_image_uris() {
        assert!(ImageInput::try_from(String::from("data:text/plain;base64,aGk=")).is_err());
        assert!(ImageInput::try_from(String::from("aGVsbG8=")).is_err());
        assert!(ImageInput::try_from(String::from("data:image/png;base64,")).is_err());
        assert!(ImageInput::try_from(String::from("data:image/;base64,aGk=")).is_err());
    }

    #[test]
    fn decodes_inline_payload() {
        let input = ImageInput::try_from(String::from("data:image/png;base64,aGVsbG8=")).unwrap();
        let (bytes, extension) = input.into_bytes().unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(extension, "png");
    }

    #[test]
    fn invalid_base64_is_a_validation_error() {
        let input = ImageInput::InlineEncoded {
            payload: String::from("not base64!!"),
            extension: String::from("png"),
        };
        match input.into_bytes() {
            Err(ApiError::Validation(errors)) => {
                assert!(!errors.messages("image").is_empty());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn raw_bytes_pass_through() {
        let input = ImageInput::RawBytes {
            bytes: vec![1, 2, 3],
            extension: String::from("jpg"),
        };
        assert_eq!(input.into_bytes().unwrap(), (vec![1, 2, 3], String::from("jpg")));
    }

    #[test]
    fn stores_decoded_image_with_extension() {
        let dir = std::env::temp_dir().join(format!("kokki-media-{}", Uuid::new_v4()));
        let store = MediaStore::new(&dir);
        let input = ImageInput::try_from(String::from("data:image/gif;base64,aGVsbG8=")).unwrap();

        let reference = store.store_image(input).unwrap();
        assert!(reference.starts_with("media/"));
        assert!(reference.ends_with(".gif"));

        let name = reference.trim_start_matches("media/");
        assert_eq!(fs::read(dir.join(name)).unwrap(), b"hello");
        fs::remove_dir_all(dir).unwrap();
    }
}
