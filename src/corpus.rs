use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, AnnotationError, parse_label};
use crate::error::DatasetError;
use crate::store::FileStore;

/// Image extensions probed by default, in priority order.
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".bmp"];

/// Default sidecar label extension.
pub const DEFAULT_ANNOTATION_EXTENSION: &str = ".txt";

/// How images and their sidecar label files are named on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetLayout {
    /// Image extensions with leading dot; order defines probe priority.
    pub image_extensions: Vec<String>,
    /// Label file extension with leading dot.
    pub annotation_extension: String,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            image_extensions: DEFAULT_IMAGE_EXTENSIONS.map(String::from).to_vec(),
            annotation_extension: DEFAULT_ANNOTATION_EXTENSION.to_string(),
        }
    }
}

impl DatasetLayout {
    /// Check the extensions are usable for pairing.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.image_extensions.is_empty() {
            return Err(DatasetError::configuration(
                "at least one image extension is required",
            ));
        }
        for ext in self
            .image_extensions
            .iter()
            .chain(std::iter::once(&self.annotation_extension))
        {
            if !ext.starts_with('.') || ext.len() < 2 {
                return Err(DatasetError::configuration(format!(
                    "extension `{ext}` must start with a dot"
                )));
            }
        }
        if self
            .image_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(&self.annotation_extension))
        {
            return Err(DatasetError::configuration(format!(
                "annotation extension `{}` is also an image extension",
                self.annotation_extension
            )));
        }
        Ok(())
    }

    /// Stem and priority rank of an image file, matching extensions case-insensitively.
    pub fn image_stem<'a>(&self, path: &'a Path) -> Option<(&'a str, usize)> {
        let name = path.file_name()?.to_str()?;
        self.image_extensions
            .iter()
            .enumerate()
            .find_map(|(rank, ext)| strip_suffix_ignore_case(name, ext).map(|stem| (stem, rank)))
    }

    /// Stem of a label file; the annotation extension matches case-sensitively.
    pub fn label_stem<'a>(&self, path: &'a Path) -> Option<&'a str> {
        path.file_name()?
            .to_str()?
            .strip_suffix(self.annotation_extension.as_str())
            .filter(|stem| !stem.is_empty())
    }

    /// Sidecar label path for an image: same directory, same stem.
    pub fn label_path_for(&self, image: &Path) -> Option<PathBuf> {
        let (stem, _) = self.image_stem(image)?;
        let name = format!("{stem}{}", self.annotation_extension);
        Some(match image.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        })
    }
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = name.split_at(split);
    (!stem.is_empty() && tail.eq_ignore_ascii_case(suffix)).then_some(stem)
}

#[derive(Debug, Clone)]
struct ImageEntry {
    path: PathBuf,
    stem: String,
    rank: usize,
}

#[derive(Debug, Clone)]
struct LabelEntry {
    path: PathBuf,
    stem: String,
}

/// One-shot listing of a flat dataset directory.
///
/// Every decision in a run is made against this listing, so deletions made
/// later in the same run never change what an earlier pass saw.
#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    dir: PathBuf,
    images: Vec<ImageEntry>,
    labels: Vec<LabelEntry>,
}

impl DirectorySnapshot {
    /// List `dir` once and classify its files into images and labels.
    pub fn capture(
        store: &impl FileStore,
        dir: &Path,
        layout: &DatasetLayout,
    ) -> Result<Self, DatasetError> {
        let files = store
            .list_files(dir)
            .map_err(|e| DatasetError::io(dir, e))?;

        let mut images = Vec::new();
        let mut labels = Vec::new();
        for path in files {
            if let Some(stem) = layout.label_stem(&path) {
                let stem = stem.to_string();
                labels.push(LabelEntry { path, stem });
            } else if let Some((stem, rank)) = layout.image_stem(&path) {
                let stem = stem.to_string();
                images.push(ImageEntry { path, stem, rank });
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            images,
            labels,
        })
    }

    /// The directory this snapshot was taken of.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Image files with their stems, in listing order.
    pub fn images(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.images.iter().map(|e| (e.path.as_path(), e.stem.as_str()))
    }

    /// Label files with their stems, in listing order.
    pub fn labels(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.labels.iter().map(|e| (e.path.as_path(), e.stem.as_str()))
    }

    /// Whether a label file with this stem was present.
    pub fn has_label(&self, stem: &str) -> bool {
        self.labels.iter().any(|e| e.stem == stem)
    }

    /// Resolve the image paired with `stem`.
    ///
    /// When several images share the stem, the one whose extension comes
    /// first in the layout wins and the others are reported.
    pub fn resolve_image(&self, stem: &str) -> Option<&Path> {
        let mut candidates: Vec<&ImageEntry> =
            self.images.iter().filter(|e| e.stem == stem).collect();
        candidates.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.path.cmp(&b.path)));

        let (chosen, ignored) = candidates.split_first()?;
        if !ignored.is_empty() {
            tracing::warn!(
                "Ambiguous images for stem '{stem}': using {}, ignoring {:?}",
                chosen.path.display(),
                ignored.iter().map(|e| &e.path).collect::<Vec<_>>()
            );
        }
        Some(chosen.path.as_path())
    }
}

/// An image together with the annotations from its sidecar label file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedSample {
    /// Image file.
    pub image_path: PathBuf,
    /// Sidecar label file.
    pub label_path: PathBuf,
    /// Annotations in physical line order.
    pub annotations: Vec<Annotation>,
}

impl AnnotatedSample {
    /// Read and parse the label file of a pair.
    ///
    /// Malformed lines are returned separately, the sample keeps only the
    /// lines that parsed.
    pub fn load(
        store: &impl FileStore,
        image_path: &Path,
        label_path: &Path,
    ) -> Result<(Self, Vec<AnnotationError>), DatasetError> {
        let contents = store
            .read_to_string(label_path)
            .map_err(|e| DatasetError::io(label_path, e))?;
        let parsed = parse_label(&contents);
        Ok((
            Self {
                image_path: image_path.to_path_buf(),
                label_path: label_path.to_path_buf(),
                annotations: parsed.annotations,
            },
            parsed.malformed,
        ))
    }

    /// Class ids in line order.
    pub fn class_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.annotations.iter().map(|a| a.class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryFileStore;

    #[test]
    fn test_layout_stems() {
        let layout = DatasetLayout::default();
        assert_eq!(layout.image_stem(Path::new("d/cat.JPG")), Some(("cat", 0)));
        assert_eq!(layout.image_stem(Path::new("d/cat.png")), Some(("cat", 2)));
        assert_eq!(layout.image_stem(Path::new("d/cat.gif")), None);
        assert_eq!(layout.label_stem(Path::new("d/cat.txt")), Some("cat"));
        assert_eq!(layout.label_stem(Path::new("d/cat.TXT")), None);
        assert_eq!(layout.image_stem(Path::new("d/.jpg")), None);
        assert_eq!(layout.image_stem(Path::new("d/.JPEG")), None);
        assert_eq!(layout.label_stem(Path::new("d/.txt")), None);
        assert_eq!(layout.label_path_for(Path::new("d/.png")), None);
        assert_eq!(
            layout.label_path_for(Path::new("d/a.b.jpeg")),
            Some(PathBuf::from("d/a.b.txt"))
        );
    }

    #[test]
    fn test_layout_validate() {
        assert!(DatasetLayout::default().validate().is_ok());

        let no_images = DatasetLayout {
            image_extensions: vec![],
            ..Default::default()
        };
        assert!(no_images.validate().is_err());

        let no_dot = DatasetLayout {
            image_extensions: vec!["jpg".to_string()],
            ..Default::default()
        };
        assert!(no_dot.validate().is_err());

        let clash = DatasetLayout {
            image_extensions: vec![".TXT".to_string()],
            ..Default::default()
        };
        assert!(clash.validate().is_err());
    }

    #[test]
    fn test_snapshot_resolves_by_priority() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.png", ""),
            ("d/a.jpg", ""),
            ("d/a.txt", "0 1 2 3 4\n"),
            ("d/b.txt", ""),
            ("d/notes.md", ""),
        ]);
        let snapshot = DirectorySnapshot::capture(&store, Path::new("d"), &DatasetLayout::default())?;
        assert_eq!(snapshot.images().count(), 2);
        assert_eq!(snapshot.labels().count(), 2);
        assert_eq!(snapshot.resolve_image("a"), Some(Path::new("d/a.jpg")));
        assert_eq!(snapshot.resolve_image("b"), None);
        assert!(snapshot.has_label("b"));
        assert!(!snapshot.has_label("c"));
        Ok(())
    }

    #[test]
    fn test_load_sample() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([("d/a.txt", "1 .1 .2 .3 .4\nbad\n\n0 .5 .5 .5 .5\n")]);
        let (sample, malformed) =
            AnnotatedSample::load(&store, Path::new("d/a.jpg"), Path::new("d/a.txt"))?;
        assert_eq!(sample.class_ids().collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(malformed.len(), 1);
        Ok(())
    }
}
