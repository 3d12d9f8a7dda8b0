//! Image decoding for demo textures.
//!
//! Decoding happens off the render thread; the session uploads finished images on its own
//! thread and caches the resulting textures by name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};
use image::GenericImageView;
use tracing::debug;

use crate::error::RenderError;

/// Tightly packed RGBA8 pixels plus the name they were loaded under.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// 1x1 image of a single color.
    pub fn solid(name: impl Into<String>, rgba: [u8; 4]) -> Self {
        Self {
            name: name.into(),
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
        }
    }

    /// Stand-in used when the first demo cannot be loaded. Mid-grey depth means no displacement.
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self::solid(name, [128, 128, 128, 255])
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Resolves an image name to decoded pixels.
pub trait ImageSource: Send + Sync {
    fn load(&self, name: &str) -> Result<DecodedImage, RenderError>;
}

/// Loads images from files below a root directory.
#[derive(Debug, Clone)]
pub struct AssetDirectory {
    root: PathBuf,
}

impl AssetDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ImageSource for AssetDirectory {
    fn load(&self, name: &str) -> Result<DecodedImage, RenderError> {
        let path = self.resolve(name);
        if !path.is_file() {
            return Err(RenderError::texture_load(
                name,
                format_args!("not found at {}", path.display()),
            ));
        }
        let image = image::open(&path).map_err(|err| RenderError::texture_load(name, err))?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(RenderError::texture_load(name, "image has no pixels"));
        }
        let rgba = image.to_rgba8();
        debug!(name, width, height, path = %path.display(), "decoded image");
        Ok(DecodedImage {
            name: name.to_string(),
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

/// Pending result of decoding a batch of images.
pub enum DecodeFuture {
    Ready(Result<Vec<DecodedImage>, RenderError>),
    Threaded {
        receiver: Receiver<Result<Vec<DecodedImage>, RenderError>>,
    },
    Taken,
}

impl DecodeFuture {
    /// Decodes `names` on a worker thread. The batch fails as a whole if any image fails.
    pub fn spawn(source: Arc<dyn ImageSource>, names: Vec<String>) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let spawned = thread::Builder::new()
            .name("parallax-decode".into())
            .spawn(move || {
                let result = names
                    .iter()
                    .map(|name| source.load(name))
                    .collect::<Result<Vec<_>, _>>();
                let _ = sender.send(result);
            });
        match spawned {
            Ok(_) => DecodeFuture::Threaded { receiver },
            Err(err) => DecodeFuture::Ready(Err(RenderError::texture_load(
                "decode worker",
                format_args!("failed to spawn: {err}"),
            ))),
        }
    }

    /// Decodes `names` on the calling thread.
    pub fn immediate(source: &dyn ImageSource, names: &[String]) -> Self {
        DecodeFuture::Ready(names.iter().map(|name| source.load(name)).collect())
    }

    /// Returns the batch once it is finished; `Ok(None)` while still decoding.
    pub fn poll(&mut self) -> Result<Option<Vec<DecodedImage>>, RenderError> {
        match self {
            DecodeFuture::Ready(_) => match std::mem::replace(self, DecodeFuture::Taken) {
                DecodeFuture::Ready(result) => result.map(Some),
                _ => Ok(None),
            },
            DecodeFuture::Threaded { receiver } => match receiver.try_recv() {
                Ok(result) => {
                    *self = DecodeFuture::Taken;
                    result.map(Some)
                }
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => {
                    *self = DecodeFuture::Taken;
                    Err(RenderError::texture_load(
                        "decode worker",
                        "disconnected before returning a result",
                    ))
                }
            },
            DecodeFuture::Taken => Ok(None),
        }
    }

    /// Blocks until the batch is finished.
    pub fn wait(self) -> Result<Vec<DecodedImage>, RenderError> {
        match self {
            DecodeFuture::Ready(result) => result,
            DecodeFuture::Threaded { receiver } => receiver.recv().unwrap_or_else(|_| {
                Err(RenderError::texture_load(
                    "decode worker",
                    "disconnected before returning a result",
                ))
            }),
            DecodeFuture::Taken => Ok(Vec::new()),
        }
    }
}

impl fmt::Debug for DecodeFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            DecodeFuture::Ready(_) => "ready",
            DecodeFuture::Threaded { .. } => "threaded",
            DecodeFuture::Taken => "taken",
        };
        f.debug_tuple("DecodeFuture").field(&state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
    }

    #[test]
    fn loads_images_relative_to_root() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "img/wide.png", 4, 2);

        let assets = AssetDirectory::new(dir.path());
        let image = assets.load("img/wide.png").unwrap();
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(image.pixels.len(), 4 * 2 * 4);
        assert_eq!(&image.pixels[..4], &[10, 20, 30, 255]);
        assert_eq!(image.name, "img/wide.png");
    }

    #[test]
    fn missing_file_is_a_texture_load_error() {
        let dir = TempDir::new().unwrap();
        let err = AssetDirectory::new(dir.path()).load("img/none.jpg").unwrap_err();
        assert!(matches!(err, RenderError::TextureLoad { ref name, .. } if name == "img/none.jpg"));
    }

    #[test]
    fn corrupt_file_is_a_texture_load_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let err = AssetDirectory::new(dir.path()).load("broken.png").unwrap_err();
        assert!(matches!(err, RenderError::TextureLoad { .. }));
    }

    #[test]
    fn threaded_decode_completes() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "a.png", 2, 2);
        write_png(dir.path(), "b.png", 3, 1);

        let source: Arc<dyn ImageSource> = Arc::new(AssetDirectory::new(dir.path()));
        let mut future = DecodeFuture::spawn(source, vec!["a.png".into(), "b.png".into()]);

        let deadline = Instant::now() + Duration::from_secs(5);
        let images = loop {
            if let Some(images) = future.poll().unwrap() {
                break images;
            }
            assert!(Instant::now() < deadline, "decode never finished");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].width, 3);
        assert!(future.poll().unwrap().is_none());
    }

    #[test]
    fn batch_fails_when_any_image_fails() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "a.png", 2, 2);
        let source = AssetDirectory::new(dir.path());
        let future = DecodeFuture::immediate(&source, &["a.png".to_string(), "missing.png".to_string()]);
        assert!(future.wait().is_err());
    }
}
