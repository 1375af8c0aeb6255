use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::corpus::DatasetLayout;
use crate::error::DatasetError;
use crate::store::{FileStore, LocalFileStore};

/// Tolerance on the sum of the split ratios.
pub const RATIO_TOLERANCE: f64 = 1e-6;

/// Dataset split enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    /// Training split.
    Train,
    /// Validation split.
    Val,
    /// Test split.
    Test,
}

impl Split {
    /// All splits in manifest order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// Manifest file name of the split.
    pub fn file_name(&self) -> &'static str {
        match self {
            Split::Train => "train.txt",
            Split::Val => "val.txt",
            Split::Test => "test.txt",
        }
    }
}

impl TryFrom<&str> for Split {
    type Error = DatasetError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Ok(match s {
            "train" => Split::Train,
            "val" => Split::Val,
            "test" => Split::Test,
            _ => return Err(DatasetError::configuration(format!("Invalid split: {s}"))),
        })
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Split::Train => "train",
                Split::Val => "val",
                Split::Test => "test",
            }
        )
    }
}

/// Train/validation/test proportions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    /// Fraction assigned to train.
    pub train: f64,
    /// Fraction assigned to validation.
    pub val: f64,
    /// Fraction assigned to test.
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            val: 0.15,
            test: 0.05,
        }
    }
}

impl SplitRatios {
    /// Create validated ratios.
    pub fn new(train: f64, val: f64, test: f64) -> Result<Self, DatasetError> {
        let ratios = Self { train, val, test };
        ratios.validate()?;
        Ok(ratios)
    }

    /// Check each ratio is a non-negative number and that they sum to 1.0.
    pub fn validate(&self) -> Result<(), DatasetError> {
        for (split, ratio) in Split::ALL.iter().zip([self.train, self.val, self.test]) {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(DatasetError::configuration(format!(
                    "{split} ratio must be a non-negative number, got {ratio}"
                )));
            }
        }
        let sum = self.train + self.val + self.test;
        if (sum - 1.0).abs() >= RATIO_TOLERANCE {
            return Err(DatasetError::configuration(format!(
                "train, validation, and test ratios must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }

    /// End indices of the train and validation slices for `total` items.
    ///
    /// Both are truncated, so any remainder falls into the test slice.
    pub fn boundaries(&self, total: usize) -> (usize, usize) {
        let count = |ratio: f64| (total as f64 * ratio).floor() as usize;
        let train_end = count(self.train).min(total);
        let val_end = (train_end + count(self.val)).min(total);
        (train_end, val_end)
    }
}

/// Image paths assigned to each split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitManifest {
    /// Training images.
    pub train: Vec<PathBuf>,
    /// Validation images.
    pub val: Vec<PathBuf>,
    /// Test images.
    pub test: Vec<PathBuf>,
    /// Ratios used to cut the shuffled list.
    pub ratios: SplitRatios,
    /// Shuffle seed.
    pub seed: u64,
}

impl SplitManifest {
    /// Images of one split.
    pub fn get(&self, split: Split) -> &[PathBuf] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    /// Total number of images across splits.
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    /// Whether no image was assigned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Manifest file contents for one split: one path per line.
    pub fn render(&self, split: Split) -> String {
        self.get(split)
            .iter()
            .map(|path| format!("{}\n", path.to_string_lossy()))
            .collect()
    }
}

/// Paths of the written manifest files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestFiles {
    /// `train.txt`.
    pub train: PathBuf,
    /// `val.txt`.
    pub val: PathBuf,
    /// `test.txt`.
    pub test: PathBuf,
}

impl ManifestFiles {
    fn in_dir(dir: &Path) -> Self {
        Self {
            train: dir.join(Split::Train.file_name()),
            val: dir.join(Split::Val.file_name()),
            test: dir.join(Split::Test.file_name()),
        }
    }

    /// Path of one split's manifest.
    pub fn get(&self, split: Split) -> &Path {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }
}

/// Partitioner configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionerConfig {
    /// Root walked recursively for image/label pairs.
    pub dataset_root: PathBuf,
    /// Directory receiving `train.txt`, `val.txt` and `test.txt`.
    pub output_dir: PathBuf,
    /// Split proportions.
    pub ratios: SplitRatios,
    /// Image and label extensions.
    pub layout: DatasetLayout,
    /// Shuffle seed.
    pub seed: u64,
}

/// Default configuration for the partitioner.
impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("."),
            output_dir: PathBuf::from("output"),
            ratios: SplitRatios::default(),
            layout: DatasetLayout {
                image_extensions: vec![".jpg".into(), ".jpeg".into(), ".png".into()],
                ..Default::default()
            },
            seed: 42,
        }
    }
}

/// Splits a dataset tree into train/val/test manifests.
pub struct DatasetPartitioner<S = LocalFileStore> {
    config: PartitionerConfig,
    store: S,
}

impl DatasetPartitioner {
    /// Create a partitioner operating on the local filesystem.
    pub fn new(config: PartitionerConfig) -> Result<Self, DatasetError> {
        Self::with_store(config, LocalFileStore)
    }
}

impl<S: FileStore> DatasetPartitioner<S> {
    /// Create a partitioner operating on the given store.
    ///
    /// Ratios and extensions are validated here, before any file is read.
    pub fn with_store(config: PartitionerConfig, store: S) -> Result<Self, DatasetError> {
        config.ratios.validate()?;
        config.layout.validate()?;
        Ok(Self { config, store })
    }

    /// Collect, split and write the manifests.
    pub fn run(&self) -> Result<(SplitManifest, ManifestFiles), DatasetError> {
        let pairs = self.collect_valid_pairs()?;
        let manifest = self.split_dataset(pairs);
        let files = self.write_manifests(&manifest)?;
        Ok((manifest, files))
    }

    /// Images under the dataset root that have a sidecar label file, in walk order.
    pub fn collect_valid_pairs(&self) -> Result<Vec<PathBuf>, DatasetError> {
        let root = &self.config.dataset_root;
        tracing::info!("Scanning '{}' for image-label pairs...", root.display());

        let files = self
            .store
            .walk_files(root)
            .map_err(|e| DatasetError::io(root, e))?;

        let mut pairs = Vec::new();
        for image in files {
            let Some(label) = self.config.layout.label_path_for(&image) else {
                continue;
            };
            if self.store.exists(&label) {
                pairs.push(image);
            } else {
                tracing::warn!("Missing annotation for image '{}'", image.display());
            }
        }

        tracing::info!("Total valid image-label pairs found: {}", pairs.len());
        Ok(pairs)
    }

    /// Shuffle with the configured seed and cut into contiguous slices.
    pub fn split_dataset(&self, mut pairs: Vec<PathBuf>) -> SplitManifest {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        pairs.shuffle(&mut rng);

        let (train_end, val_end) = self.config.ratios.boundaries(pairs.len());
        let test = pairs.split_off(val_end);
        let val = pairs.split_off(train_end);
        let manifest = SplitManifest {
            train: pairs,
            val,
            test,
            ratios: self.config.ratios,
            seed: self.config.seed,
        };

        for split in Split::ALL {
            tracing::info!("{split} set size: {}", manifest.get(split).len());
        }
        manifest
    }

    /// Write one manifest file per split into the output directory.
    pub fn write_manifests(&self, manifest: &SplitManifest) -> Result<ManifestFiles, DatasetError> {
        let dir = &self.config.output_dir;
        self.store
            .create_dir_all(dir)
            .map_err(|e| DatasetError::io(dir, e))?;

        let files = ManifestFiles::in_dir(dir);
        for split in Split::ALL {
            let path = files.get(split);
            self.store
                .write(path, &manifest.render(split))
                .map_err(|e| DatasetError::io(path, e))?;
            tracing::info!("{}: {} entries", split.file_name(), manifest.get(split).len());
        }
        tracing::info!("Split files written to '{}'", dir.display());
        Ok(files)
    }
}
