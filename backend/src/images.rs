use std::path::PathBuf;

use aws_config::SdkConfig;
use aws_sdk_s3::{primitives::ByteStream, Client};
use lambda_http::tracing;
use ulid::Ulid;

use crate::{constants::UPLOAD_URL_PREFIX, models::book::Image};

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Only image files are allowed, got {0}")]
    UnsupportedType(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("S3 PutObject error: {0}")]
    S3Put(#[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::put_object::PutObjectError>),
    #[error("S3 DeleteObject error: {0}")]
    S3Delete(
        #[from] aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::delete_object::DeleteObjectError>,
    ),
}

/// An uploaded file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// File extension for each accepted image type. Anything else, including
/// `image/svg+xml`, is rejected so stored files are never served as markup.
fn image_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

impl Upload {
    /// The client's file name is ignored; the extension follows the content type.
    fn object_name(&self) -> Result<String, ImageError> {
        let ext = image_extension(&self.content_type)
            .ok_or_else(|| ImageError::UnsupportedType(self.content_type.clone()))?;
        Ok(format!("book-{}.{}", Ulid::new().to_string().to_lowercase(), ext))
    }
}

#[derive(Debug, Clone)]
pub enum ImageStore {
    /// Files under `<dir>/books`, served at `/uploads/books`.
    Local { dir: PathBuf },
    S3 {
        client: Client,
        bucket: String,
        region: String,
    },
}

impl ImageStore {
    pub fn local(dir: PathBuf) -> Self {
        Self::Local { dir }
    }

    pub fn s3(config: &SdkConfig, bucket: String) -> Self {
        let region = config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "us-east-1".to_string());
        Self::S3 {
            client: Client::new(config),
            bucket,
            region,
        }
    }

    pub async fn save(&self, upload: Upload) -> Result<Image, ImageError> {
        let name = upload.object_name()?;
        tracing::debug!("Storing upload {:?} as {}", upload.file_name, name);

        match self {
            Self::Local { dir } => {
                let folder = dir.join("books");
                tokio::fs::create_dir_all(&folder).await?;
                tokio::fs::write(folder.join(&name), &upload.bytes).await?;
                Ok(Image {
                    public_id: format!("books/{}", name),
                    url: format!("{}/books/{}", UPLOAD_URL_PREFIX, name),
                })
            }
            Self::S3 {
                client,
                bucket,
                region,
            } => {
                let key = format!("books/{}", name);
                client
                    .put_object()
                    .bucket(bucket)
                    .key(&key)
                    .content_type(&upload.content_type)
                    .body(ByteStream::from(upload.bytes))
                    .send()
                    .await?;
                Ok(Image {
                    url: format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
                    public_id: key,
                })
            }
        }
    }

    pub async fn delete(&self, image: &Image) -> Result<(), ImageError> {
        match self {
            Self::Local { dir } => {
                // public ids are generated by `save`, never taken from clients
                match tokio::fs::remove_file(dir.join(&image.public_id)).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Self::S3 { client, bucket, .. } => {
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(&image.public_id)
                    .send()
                    .await?;
                Ok(())
            }
        }
    }

    /// Stores every upload or none: on failure the already stored files are
    /// removed again.
    pub async fn save_all(&self, uploads: Vec<Upload>) -> Result<Vec<Image>, ImageError> {
        let mut saved = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.save(upload).await {
                Ok(image) => saved.push(image),
                Err(e) => {
                    self.discard(&saved).await;
                    return Err(e);
                }
            }
        }
        Ok(saved)
    }

    /// Best-effort removal used to compensate a failed listing write.
    pub async fn discard(&self, images: &[Image]) {
        for image in images {
            if let Err(e) = self.delete(image).await {
                tracing::warn!("Failed to remove orphaned image {}: {}", image.public_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, content_type: &str) -> Upload {
        Upload {
            file_name: Some(name.to_string()),
            content_type: content_type.to_string(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("kitabyatra-img-{}", Ulid::new()))
    }

    #[tokio::test]
    async fn local_save_and_delete() {
        let dir = temp_dir();
        let store = ImageStore::local(dir.clone());

        let image = store.save(upload("cover.PNG", "image/png")).await.unwrap();
        assert!(image.url.starts_with("/uploads/books/book-"));
        assert!(image.url.ends_with(".png"));
        assert!(dir.join(&image.public_id).exists());

        store.delete(&image).await.unwrap();
        assert!(!dir.join(&image.public_id).exists());
        // deleting twice is fine
        store.delete(&image).await.unwrap();
    }

    #[tokio::test]
    async fn non_images_are_rejected_and_batch_rolls_back() {
        let dir = temp_dir();
        let store = ImageStore::local(dir.clone());

        let err = store
            .save_all(vec![
                upload("a.jpg", "image/jpeg"),
                upload("notes.pdf", "application/pdf"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedType(_)));

        let mut entries = tokio::fs::read_dir(dir.join("books")).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extension_follows_content_type_not_file_name() {
        let store = ImageStore::local(temp_dir());

        let image = store.save(upload("x.html", "image/png")).await.unwrap();
        assert!(image.url.ends_with(".png"));
        let image = store
            .save(upload("photo", "image/jpeg; charset=binary"))
            .await
            .unwrap();
        assert!(image.url.ends_with(".jpg"));

        for content_type in ["image/svg+xml", "text/html", ""] {
            let err = store.save(upload("x.png", content_type)).await.unwrap_err();
            assert!(matches!(err, ImageError::UnsupportedType(_)));
        }
    }
}
