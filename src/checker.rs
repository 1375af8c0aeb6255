use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::annotation::AnnotationError;
use crate::corpus::{AnnotatedSample, DatasetLayout, DirectorySnapshot};
use crate::error::{DatasetError, FileFailure};
use crate::store::{FileStore, LocalFileStore};

/// Consistency checker configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetCheckerConfig {
    /// Flat directory holding images and label files.
    pub dataset_dir: PathBuf,
    /// Class ids a label file may reference.
    pub allowed_class_ids: BTreeSet<u32>,
    /// File naming of the dataset.
    pub layout: DatasetLayout,
}

/// Default configuration for the consistency checker.
impl Default for DatasetCheckerConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("."),
            allowed_class_ids: BTreeSet::from([0]),
            layout: DatasetLayout::default(),
        }
    }
}

/// Why a label file disqualifies its pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A line references a class outside the allowed set.
    DisallowedClass(u32),
    /// A line's class id does not parse.
    Malformed(AnnotationError),
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::DisallowedClass(id) => write!(f, "class {id} is not allowed"),
            Violation::Malformed(err) => write!(f, "{err}"),
        }
    }
}

/// A planned deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// Image with no label file of the same stem.
    OrphanImage {
        /// Image to delete.
        image: PathBuf,
    },
    /// Label file with no matching image.
    OrphanLabel {
        /// Label file to delete.
        label: PathBuf,
    },
    /// Pair whose label file references a disallowed or unparsable class.
    InvalidPair {
        /// Label file to delete.
        label: PathBuf,
        /// Image to delete.
        image: PathBuf,
        /// First offending line.
        violation: Violation,
    },
}

impl Removal {
    /// Files this removal deletes, label first.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Removal::OrphanImage { image } => vec![image.as_path()],
            Removal::OrphanLabel { label } => vec![label.as_path()],
            Removal::InvalidPair { label, image, .. } => vec![label.as_path(), image.as_path()],
        }
    }
}

/// Deletions decided from a single directory snapshot.
#[derive(Debug, Default)]
pub struct CleanupPlan {
    /// Deletions in the order they will be applied: orphan images first.
    pub removals: Vec<Removal>,
    /// Pairs that passed every check.
    pub kept_pairs: usize,
    /// Label files that could not be read; their pairs are left alone.
    pub failures: Vec<FileFailure>,
}

/// Summary of a cleaning run.
#[derive(Debug, Default)]
pub struct CleanReport {
    /// Images deleted for lack of a label file.
    pub orphan_images_removed: usize,
    /// Label files deleted for lack of an image.
    pub orphan_labels_removed: usize,
    /// Pairs deleted because of invalid classes.
    pub invalid_pairs_removed: usize,
    /// Pairs kept.
    pub kept_pairs: usize,
    /// Files that could not be read or deleted.
    pub failures: Vec<FileFailure>,
}

/// Enforces image/label pairing and the allowed class set.
pub struct DatasetChecker<S = LocalFileStore> {
    config: DatasetCheckerConfig,
    store: S,
}

impl DatasetChecker {
    /// Create a checker operating on the local filesystem.
    pub fn new(config: DatasetCheckerConfig) -> Result<Self, DatasetError> {
        Self::with_store(config, LocalFileStore)
    }
}

impl<S: FileStore> DatasetChecker<S> {
    /// Create a checker operating on the given store.
    pub fn with_store(config: DatasetCheckerConfig, store: S) -> Result<Self, DatasetError> {
        config.layout.validate()?;
        if config.allowed_class_ids.is_empty() {
            tracing::warn!("No allowed class ids: every non-empty label file will be removed");
        }
        Ok(Self { config, store })
    }

    /// Plan and apply the cleanup.
    pub fn clean_dataset(&self) -> Result<CleanReport, DatasetError> {
        let plan = self.plan()?;
        let report = self.apply(plan);
        tracing::info!(
            "Dataset check and cleaning completed: {} orphan images, {} orphan labels, {} invalid pairs removed, {} pairs kept, {} failures",
            report.orphan_images_removed,
            report.orphan_labels_removed,
            report.invalid_pairs_removed,
            report.kept_pairs,
            report.failures.len()
        );
        Ok(report)
    }

    /// Decide every deletion from one snapshot of the dataset directory.
    ///
    /// Both passes look at the same listing: a pair removed for an invalid
    /// class does not make another file an orphan within the same run.
    pub fn plan(&self) -> Result<CleanupPlan, DatasetError> {
        let snapshot = DirectorySnapshot::capture(
            &self.store,
            &self.config.dataset_dir,
            &self.config.layout,
        )?;
        let mut plan = CleanupPlan::default();

        for (image, stem) in snapshot.images() {
            if !snapshot.has_label(stem) {
                plan.removals.push(Removal::OrphanImage {
                    image: image.to_path_buf(),
                });
            }
        }

        for (label, stem) in snapshot.labels() {
            let Some(image) = snapshot.resolve_image(stem) else {
                plan.removals.push(Removal::OrphanLabel {
                    label: label.to_path_buf(),
                });
                continue;
            };
            match self.find_violation(label, image) {
                Ok(None) => plan.kept_pairs += 1,
                Ok(Some(violation)) => plan.removals.push(Removal::InvalidPair {
                    label: label.to_path_buf(),
                    image: image.to_path_buf(),
                    violation,
                }),
                Err(error) => {
                    tracing::error!("Failed to check {}: {error}", label.display());
                    plan.failures.push(FileFailure {
                        path: label.to_path_buf(),
                        error,
                    });
                }
            }
        }

        Ok(plan)
    }

    /// Apply a plan, continuing past files that fail to delete.
    pub fn apply(&self, plan: CleanupPlan) -> CleanReport {
        let mut report = CleanReport {
            kept_pairs: plan.kept_pairs,
            failures: plan.failures,
            ..Default::default()
        };

        for removal in plan.removals {
            let mut deleted = true;
            for path in removal.paths() {
                if let Err(source) = self.store.remove_file(path) {
                    let error = DatasetError::io(path, source);
                    tracing::error!("Failed to remove {}: {error}", path.display());
                    report.failures.push(FileFailure {
                        path: path.to_path_buf(),
                        error,
                    });
                    deleted = false;
                    break;
                }
            }
            if !deleted {
                continue;
            }

            match &removal {
                Removal::OrphanImage { image } => {
                    tracing::info!("Removed image without label: {}", image.display());
                    report.orphan_images_removed += 1;
                }
                Removal::OrphanLabel { label } => {
                    tracing::info!("Removed label without image: {}", label.display());
                    report.orphan_labels_removed += 1;
                }
                Removal::InvalidPair {
                    label,
                    image,
                    violation,
                } => {
                    tracing::info!(
                        "Removed pair with invalid class: {}, {} ({violation})",
                        label.display(),
                        image.display()
                    );
                    report.invalid_pairs_removed += 1;
                }
            }
        }

        report
    }

    fn find_violation(&self, label: &Path, image: &Path) -> Result<Option<Violation>, DatasetError> {
        let (sample, malformed) = AnnotatedSample::load(&self.store, image, label)?;
        if let Some(err) = malformed.into_iter().next() {
            return Ok(Some(Violation::Malformed(err)));
        }
        Ok(sample
            .class_ids()
            .find(|id| !self.config.allowed_class_ids.contains(id))
            .map(Violation::DisallowedClass))
    }
}
