use crate::common::{FaceGateError, Result};
use crate::storage::key::SampleKey;
use image::{GrayImage, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};

const SAMPLE_EXTENSION: &str = "png";

/// One raw entry of the store. `name` is the storage key text, which may not
/// parse if foreign files were dropped into the dataset.
pub struct StoredSample {
    pub name: String,
    pub image: GrayImage,
}

pub type SampleIter<'a> = Box<dyn Iterator<Item = Result<StoredSample>> + 'a>;

pub trait SampleStore {
    /// Writes a sample, silently replacing any sample with the same key.
    fn put(&self, key: SampleKey, image: &GrayImage) -> Result<()>;

    /// Fresh full scan on every call.
    fn list_all(&self) -> Result<SampleIter<'_>>;
}

/// Flat directory of grayscale PNGs named `user_<id>_<seq>.png`.
pub struct FsSampleStore {
    dataset_dir: PathBuf,
}

impl FsSampleStore {
    pub fn new(dataset_dir: impl Into<PathBuf>) -> Result<Self> {
        let dataset_dir = dataset_dir.into();
        fs::create_dir_all(&dataset_dir)?;
        Ok(Self { dataset_dir })
    }

    pub fn dataset_dir(&self) -> &Path {
        &self.dataset_dir
    }

    pub fn sample_path(&self, key: SampleKey) -> PathBuf {
        self.dataset_dir.join(format!("{}.{}", key, SAMPLE_EXTENSION))
    }
}

impl SampleStore for FsSampleStore {
    fn put(&self, key: SampleKey, image: &GrayImage) -> Result<()> {
        let path = self.sample_path(key);
        image.save_with_format(&path, ImageFormat::Png)?;
        tracing::debug!("Wrote sample {:?}", path);
        Ok(())
    }

    fn list_all(&self) -> Result<SampleIter<'_>> {
        if !self.dataset_dir.exists() {
            return Ok(Box::new(std::iter::empty()));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dataset_dir)? {
            let path = entry?.path();
            let is_sample = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(SAMPLE_EXTENSION);
            if is_sample {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(Box::new(paths.into_iter().map(|path| load_sample(&path))))
    }
}

fn load_sample(path: &Path) -> Result<StoredSample> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| FaceGateError::Storage(format!("Non UTF-8 sample name: {:?}", path)))?
        .to_string();

    let image = image::open(path)
        .map_err(|e| FaceGateError::Storage(format!("Failed to read {:?}: {}", path, e)))?
        .to_luma8();

    Ok(StoredSample { name, image })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::key::Identifier;
    use image::Luma;
    use tempfile::TempDir;

    #[test]
    fn put_then_scan_returns_key_names() {
        let tmp = TempDir::new().unwrap();
        let store = FsSampleStore::new(tmp.path().join("dataset")).unwrap();
        let img = GrayImage::from_pixel(4, 3, Luma([9]));

        store.put(SampleKey::new(Identifier(3), 0), &img).unwrap();
        store.put(SampleKey::new(Identifier(3), 1), &img).unwrap();

        let names: Vec<String> = store
            .list_all()
            .unwrap()
            .map(|s| s.unwrap().name)
            .collect();
        assert_eq!(names, vec!["user_3_0", "user_3_1"]);
    }

    #[test]
    fn same_key_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = FsSampleStore::new(tmp.path()).unwrap();
        let key = SampleKey::new(Identifier(1), 0);

        store.put(key, &GrayImage::from_pixel(2, 2, Luma([10]))).unwrap();
        store.put(key, &GrayImage::from_pixel(2, 2, Luma([200]))).unwrap();

        let samples: Vec<StoredSample> = store.list_all().unwrap().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].image.get_pixel(0, 0), &Luma([200]));
    }

    #[test]
    fn ignores_non_png_files() {
        let tmp = TempDir::new().unwrap();
        let store = FsSampleStore::new(tmp.path()).unwrap();
        fs::write(tmp.path().join("notes.txt"), b"hello").unwrap();
        assert_eq!(store.list_all().unwrap().count(), 0);
    }

    #[test]
    fn scan_is_restartable() {
        let tmp = TempDir::new().unwrap();
        let store = FsSampleStore::new(tmp.path()).unwrap();
        store.put(SampleKey::new(Identifier(5), 0), &GrayImage::new(3, 3)).unwrap();

        assert_eq!(store.list_all().unwrap().count(), 1);
        store.put(SampleKey::new(Identifier(5), 1), &GrayImage::new(3, 3)).unwrap();
        assert_eq!(store.list_all().unwrap().count(), 2);
    }
}
