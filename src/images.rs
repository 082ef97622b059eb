use crate::error::AppError;
use bytes::Bytes;
use image::io::Reader as ImageReader;
use image::{ImageFormat, ImageOutputFormat};
use log::{debug, info};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Directory of uploaded images, one `<uuid>.jpg` file per request.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn create<P: Into<PathBuf>>(dir: P) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(ImageStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn persist(&self, jpeg: &[u8]) -> std::io::Result<PathBuf> {
        let name = format!("{}.jpg", Uuid::new_v4().simple());
        let path = self.dir.join(name);
        tokio::fs::write(&path, jpeg).await?;
        info!("Saved image to {:?}", path);
        Ok(path)
    }
}

/// Image bytes ready for recognition, plus where they were saved.
#[derive(Debug)]
pub struct PreparedImage {
    pub jpeg: Bytes,
    pub path: Option<PathBuf>,
}

/// Pre-recognition stages. Each is toggled on its own; recognition always
/// sees the output of the last enabled stage.
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    mirror: bool,
    jpeg_quality: u8,
    store: Option<ImageStore>,
}

impl ImagePipeline {
    pub fn new(mirror: bool, jpeg_quality: u8, store: Option<ImageStore>) -> Self {
        ImagePipeline {
            mirror,
            jpeg_quality,
            store,
        }
    }

    pub async fn prepare(&self, jpeg: Bytes) -> Result<PreparedImage, AppError> {
        let jpeg = if self.mirror {
            let quality = self.jpeg_quality;
            tokio::task::spawn_blocking(move || mirror_jpeg(&jpeg, quality))
                .await
                .map_err(|e| AppError::Internal(format!("Image worker failed: {}", e)))??
        } else {
            jpeg
        };

        let path = match &self.store {
            Some(store) => Some(store.persist(&jpeg).await?),
            None => None,
        };
        Ok(PreparedImage { jpeg, path })
    }
}

/// Flips a JPEG left-to-right and re-encodes it as JPEG.
pub fn mirror_jpeg(jpeg: &[u8], quality: u8) -> Result<Bytes, AppError> {
    let image = ImageReader::with_format(Cursor::new(jpeg), ImageFormat::Jpeg)
        .decode()
        .map_err(|e| AppError::InvalidImage(e.to_string()))?;
    let mirrored = image.fliph();

    let mut out = Cursor::new(Vec::with_capacity(jpeg.len()));
    mirrored
        .write_to(&mut out, ImageOutputFormat::Jpeg(quality))
        .map_err(|e| AppError::Internal(format!("Failed to encode image: {}", e)))?;
    debug!(
        "Mirrored {}x{} image ({} -> {} bytes)",
        mirrored.width(),
        mirrored.height(),
        jpeg.len(),
        out.get_ref().len()
    );
    Ok(Bytes::from(out.into_inner()))
}


#[cfg(test)]
mod tests {
    use super::testing::half_white_jpeg;
    use super::*;

    fn luma_at(jpeg: &[u8], x: u32, y: u32) -> u8 {
        let image = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg).unwrap();
        image.to_luma8().get_pixel(x, y)[0]
    }

    #[test]
    fn mirror_swaps_left_and_right() {
        let original = half_white_jpeg();
        assert!(luma_at(&original, 2, 8) > 200);
        assert!(luma_at(&original, 29, 8) < 50);

        let mirrored = mirror_jpeg(&original, 90).unwrap();
        assert!(luma_at(&mirrored, 2, 8) < 50);
        assert!(luma_at(&mirrored, 29, 8) > 200);
    }

    #[test]
    fn mirror_keeps_dimensions_and_format() {
        let mirrored = mirror_jpeg(&half_white_jpeg(), 90).unwrap();
        assert_eq!(image::guess_format(&mirrored).unwrap(), ImageFormat::Jpeg);
        let image = image::load_from_memory(&mirrored).unwrap();
        assert_eq!((image.width(), image.height()), (32, 16));
    }

    #[test]
    fn mirror_rejects_non_jpeg() {
        assert!(matches!(
            mirror_jpeg(b"definitely not a jpeg", 90),
            Err(AppError::InvalidImage(_))
        ));
    }

    #[tokio::test]
    async fn pass_through_pipeline_leaves_bytes_alone() {
        let pipeline = ImagePipeline::new(false, 90, None);
        let prepared = pipeline
            .prepare(Bytes::from_static(b"opaque bytes"))
            .await
            .unwrap();
        assert_eq!(prepared.jpeg, Bytes::from_static(b"opaque bytes"));
        assert_eq!(prepared.path, None);
    }

    #[tokio::test]
    async fn persisted_image_uses_uuid_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::create(dir.path().join("uploads")).unwrap();
        let pipeline = ImagePipeline::new(false, 90, Some(store));

        let first = pipeline.prepare(Bytes::from_static(b"one")).await.unwrap();
        let second = pipeline.prepare(Bytes::from_static(b"two")).await.unwrap();

        let first_path = first.path.unwrap();
        assert_eq!(first_path.extension().unwrap(), "jpg");
        assert_eq!(first_path.file_stem().unwrap().len(), 32);
        assert_ne!(Some(first_path.clone()), second.path);
        assert_eq!(std::fs::read(&first_path).unwrap(), b"one");
    }

    #[tokio::test]
    async fn mirror_then_persist_saves_mirrored_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::create(dir.path()).unwrap();
        let pipeline = ImagePipeline::new(true, 90, Some(store));

        let prepared = pipeline
            .prepare(Bytes::from(half_white_jpeg()))
            .await
            .unwrap();
        let saved = std::fs::read(prepared.path.unwrap()).unwrap();
        assert_eq!(saved, prepared.jpeg.to_vec());
        assert!(luma_at(&saved, 2, 8) < 50);
    }
}
