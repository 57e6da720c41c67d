use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use log::{debug, warn};
use thiserror::Error;

pub const MODELS_DIR: &str = "models";
pub const TEST_IMAGES_DIR: &str = "test_images";
const COLOR_TAG: &str = "_color";
const MASK_TAG: &str = "_mask";

/// Dataset structure violations, detected once before any matching
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset root {0} does not exist or is not a directory")]
    InvalidRoot(PathBuf),
    #[error("object directory `{0}` is missing")]
    MissingObjectDir(String),
    #[error("object `{0}` lacks a `models` or `test_images` directory")]
    MissingModelsOrTests(String),
    #[error("dataset root {0} contains no object directories")]
    NoObjects(PathBuf),
    #[error("I/O error reading dataset: {0}")]
    Io(#[from] std::io::Error),
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// One reference view: grayscale exemplar plus its optional foreground mask
#[derive(Debug, Clone)]
pub struct ModelView {
    pub name: String,
    pub image: GrayImage,
    pub mask: Option<GrayImage>,
}

/// Access to a dataset of object directories, each with `models/` and `test_images/`
pub trait DatasetLoader {
    /// Fails on the first structural violation; `required` names objects that must exist
    fn check_integrity(&self, required: &[&str]) -> DatasetResult<()>;

    /// Object directory names, sorted
    fn list_object_keys(&self) -> DatasetResult<Vec<String>>;

    /// Reference views of an object; views whose color image cannot be read are skipped
    fn load_model_views(&self, key: &str) -> DatasetResult<Vec<ModelView>>;

    /// Test image paths of an object, sorted
    fn list_test_images(&self, key: &str) -> DatasetResult<Vec<PathBuf>>;

    /// `None` when the file cannot be decoded
    fn load_test_image(&self, path: &Path) -> Option<DynamicImage> {
        read_image(path)
    }
}

/// Dataset laid out on the local filesystem
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl DatasetLoader for FileSystemLoader {
    fn check_integrity(&self, required: &[&str]) -> DatasetResult<()> {
        if !self.root.is_dir() {
            return Err(DatasetError::InvalidRoot(self.root.clone()));
        }
        for key in required {
            if !self.object_dir(key).is_dir() {
                return Err(DatasetError::MissingObjectDir(key.to_string()));
            }
        }

        let keys = self.list_object_keys()?;
        if keys.is_empty() {
            return Err(DatasetError::NoObjects(self.root.clone()));
        }
        for key in &keys {
            let dir = self.object_dir(key);
            if !dir.join(MODELS_DIR).is_dir() || !dir.join(TEST_IMAGES_DIR).is_dir() {
                return Err(DatasetError::MissingModelsOrTests(key.clone()));
            }
        }
        Ok(())
    }

    fn list_object_keys(&self) -> DatasetResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            // hidden directories are never objects
            if !name.starts_with('.') {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn load_model_views(&self, key: &str) -> DatasetResult<Vec<ModelView>> {
        let models = self.object_dir(key).join(MODELS_DIR);
        let mut views = Vec::new();

        for path in sorted_files(&models)? {
            let Some((base, mask_path)) = view_paths(&path) else {
                continue;
            };
            let Some(color) = read_image(&path) else {
                warn!("{key}: skipping view {base}, color image unreadable");
                continue;
            };
            let image = color.to_luma8();

            let mask = if mask_path.is_file() {
                read_image(&mask_path)
                    .map(|m| m.to_luma8())
                    .filter(|m| {
                        let fits = m.dimensions() == image.dimensions();
                        if !fits {
                            warn!("{key}: ignoring mask of {base}, size differs from its view");
                        }
                        fits
                    })
            } else {
                debug!("{key}: view {base} has no mask");
                None
            };

            views.push(ModelView {
                name: base,
                image,
                mask,
            });
        }

        debug!("{key}: loaded {} reference views", views.len());
        Ok(views)
    }

    fn list_test_images(&self, key: &str) -> DatasetResult<Vec<PathBuf>> {
        sorted_files(&self.object_dir(key).join(TEST_IMAGES_DIR))
    }
}

/// View name and mask path for a `<name>_color.<ext>` file
fn view_paths(path: &Path) -> Option<(String, PathBuf)> {
    let stem = path.file_stem()?.to_str()?;
    let base = stem.strip_suffix(COLOR_TAG)?;
    if base.is_empty() {
        return None;
    }
    let mask_name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{base}{MASK_TAG}.{ext}"),
        None => format!("{base}{MASK_TAG}"),
    };
    Some((base.to_string(), path.with_file_name(mask_name)))
}

fn sorted_files(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn read_image(path: &Path) -> Option<DynamicImage> {
    match image::open(path) {
        Ok(img) => Some(img),
        Err(e) => {
            warn!("cannot read {}: {e}", path.display());
            None
        }
    }
}
