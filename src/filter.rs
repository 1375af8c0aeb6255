use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotation, parse_label, render_label};
use crate::corpus::{DatasetLayout, DirectorySnapshot};
use crate::error::{DatasetError, FileFailure};
use crate::store::{FileStore, LocalFileStore};

/// Class filter configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassFilterConfig {
    /// Flat directory holding images and label files.
    pub dataset_dir: PathBuf,
    /// Class ids to keep; the position of an id is its re-encoded value.
    ///
    /// A repeated id maps to its first position, leaving a gap in the
    /// re-encoded range.
    pub keep_ids: Vec<u32>,
    /// Whether to rewrite kept class ids to their index in `keep_ids`.
    pub reencode: bool,
    /// Whether to delete label and image when no annotation survives.
    pub remove_empty: bool,
    /// File naming of the dataset.
    pub layout: DatasetLayout,
}

/// Default configuration for the class filter.
impl Default for ClassFilterConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("."),
            keep_ids: vec![0],
            reencode: false,
            remove_empty: false,
            layout: DatasetLayout::default(),
        }
    }
}

/// What happened to a single label file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The file was rewritten with the surviving annotations.
    Rewritten {
        /// Number of surviving annotations.
        kept: usize,
    },
    /// The surviving annotations already matched the file contents.
    Unchanged {
        /// Number of surviving annotations.
        kept: usize,
    },
    /// Nothing survived and the file was truncated.
    Emptied,
    /// Nothing survived and the pair was deleted.
    Removed {
        /// The deleted image.
        image: PathBuf,
    },
    /// No image matched the label file; it was left untouched.
    MissingImage,
}

/// Summary of a filter run.
#[derive(Debug, Default)]
pub struct FilterReport {
    /// Label files with a resolved image that were filtered.
    pub processed: usize,
    /// Label files rewritten with fewer or re-encoded annotations.
    pub rewritten: usize,
    /// Label files whose contents were already filtered.
    pub unchanged: usize,
    /// Label files truncated to zero bytes.
    pub emptied: usize,
    /// Image/label pairs deleted.
    pub removed_pairs: usize,
    /// Label files skipped because no image matched.
    pub missing_image: usize,
    /// Lines dropped because their class id did not parse.
    pub malformed_lines: usize,
    /// Files whose processing failed.
    pub failures: Vec<FileFailure>,
}

impl FilterReport {
    fn record(&mut self, outcome: &FilterOutcome) {
        match outcome {
            FilterOutcome::MissingImage => {
                self.missing_image += 1;
                return;
            }
            FilterOutcome::Rewritten { .. } => self.rewritten += 1,
            FilterOutcome::Unchanged { .. } => self.unchanged += 1,
            FilterOutcome::Emptied => self.emptied += 1,
            FilterOutcome::Removed { .. } => self.removed_pairs += 1,
        }
        self.processed += 1;
    }
}

/// Rewrites label files so they only contain the requested classes.
pub struct ClassFilter<S = LocalFileStore> {
    config: ClassFilterConfig,
    store: S,
}

impl ClassFilter {
    /// Create a filter operating on the local filesystem.
    pub fn new(config: ClassFilterConfig) -> Result<Self, DatasetError> {
        Self::with_store(config, LocalFileStore)
    }
}

impl<S: FileStore> ClassFilter<S> {
    /// Create a filter operating on the given store.
    pub fn with_store(config: ClassFilterConfig, store: S) -> Result<Self, DatasetError> {
        if config.keep_ids.is_empty() {
            return Err(DatasetError::configuration("keep_ids must not be empty"));
        }
        for (index, id) in config.keep_ids.iter().enumerate() {
            if config.keep_ids[..index].contains(id) {
                tracing::warn!(
                    "Class id {id} appears more than once in keep_ids; its first position is used"
                );
            }
        }
        config.layout.validate()?;
        Ok(Self { config, store })
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClassFilterConfig {
        &self.config
    }

    /// Filter every label file in the dataset directory.
    ///
    /// A failure on one file is recorded in the report and does not stop the
    /// others. Only failing to list the directory aborts the run.
    pub fn filter_dataset(&self) -> Result<FilterReport, DatasetError> {
        let dir = &self.config.dataset_dir;
        let snapshot = DirectorySnapshot::capture(&self.store, dir, &self.config.layout)?;

        let mut report = FilterReport::default();
        for (label_path, stem) in snapshot.labels() {
            let outcome = match snapshot.resolve_image(stem) {
                Some(image_path) => self.filter_label(label_path, image_path, &mut report),
                None => {
                    tracing::warn!("No image found for {}", label_path.display());
                    Ok(FilterOutcome::MissingImage)
                }
            };
            match outcome {
                Ok(outcome) => report.record(&outcome),
                Err(error) => {
                    let path = error.path().unwrap_or(label_path).to_path_buf();
                    tracing::error!("Failed to filter {}: {error}", path.display());
                    report.failures.push(FileFailure { path, error });
                }
            }
        }

        tracing::info!(
            "Filtered {} label files in {}: {} rewritten, {} unchanged, {} emptied, {} pairs removed, {} failures",
            report.processed,
            dir.display(),
            report.rewritten,
            report.unchanged,
            report.emptied,
            report.removed_pairs,
            report.failures.len()
        );
        Ok(report)
    }

    fn filter_label(
        &self,
        label_path: &Path,
        image_path: &Path,
        report: &mut FilterReport,
    ) -> Result<FilterOutcome, DatasetError> {
        let contents = self
            .store
            .read_to_string(label_path)
            .map_err(|e| DatasetError::io(label_path, e))?;
        let parsed = parse_label(&contents);
        for err in &parsed.malformed {
            tracing::warn!("Skipping line in {}: {err}", label_path.display());
        }
        report.malformed_lines += parsed.malformed.len();

        let survivors = self.select(parsed.annotations);
        tracing::info!(
            "Processing: {} -> {} valid annotations",
            label_path.display(),
            survivors.len()
        );

        if !survivors.is_empty() {
            let kept = survivors.len();
            let rendered = render_label(&survivors);
            if rendered == contents {
                return Ok(FilterOutcome::Unchanged { kept });
            }
            self.write(label_path, &rendered)?;
            return Ok(FilterOutcome::Rewritten { kept });
        }

        if self.config.remove_empty {
            // Image first: a failed delete never leaves an image without its label.
            self.remove(image_path)?;
            self.remove(label_path)?;
            tracing::info!(
                "Removed: {} and image {} (empty annotations)",
                label_path.display(),
                image_path.display()
            );
            return Ok(FilterOutcome::Removed {
                image: image_path.to_path_buf(),
            });
        }

        if !contents.is_empty() {
            self.write(label_path, "")?;
        }
        Ok(FilterOutcome::Emptied)
    }

    /// Keep annotations whose class is listed, re-encoding ids when requested.
    fn select(&self, annotations: Vec<Annotation>) -> Vec<Annotation> {
        annotations
            .into_iter()
            .filter_map(|mut annotation| {
                let position = self
                    .config
                    .keep_ids
                    .iter()
                    .position(|&id| id == annotation.class_id)?;
                if self.config.reencode {
                    annotation.class_id = u32::try_from(position).ok()?;
                }
                Some(annotation)
            })
            .collect()
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), DatasetError> {
        self.store
            .write(path, contents)
            .map_err(|e| DatasetError::io(path, e))
    }

    fn remove(&self, path: &Path) -> Result<(), DatasetError> {
        self.store
            .remove_file(path)
            .map_err(|e| DatasetError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryFileStore;

    fn config(keep_ids: Vec<u32>, reencode: bool, remove_empty: bool) -> ClassFilterConfig {
        ClassFilterConfig {
            dataset_dir: PathBuf::from("d"),
            keep_ids,
            reencode,
            remove_empty,
            ..Default::default()
        }
    }

    #[test]
    fn test_reencode_single_class() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "0 .1 .2 .3 .4\n1 .1 .2 .3 .4\n"),
            ("d/a.jpg", "img"),
        ]);
        let filter = ClassFilter::with_store(config(vec![1], true, false), &store)?;
        let report = filter.filter_dataset()?;

        assert_eq!(store.contents("d/a.txt").as_deref(), Some("0 .1 .2 .3 .4\n"));
        assert_eq!(report.processed, 1);
        assert_eq!(report.rewritten, 1);
        Ok(())
    }

    #[test]
    fn test_keep_ids_order_defines_mapping() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "2 a\n5 b\n3 c\n5 d\n"),
            ("d/a.png", "img"),
        ]);
        let filter = ClassFilter::with_store(config(vec![5, 2], true, false), &store)?;
        filter.filter_dataset()?;
        assert_eq!(store.contents("d/a.txt").as_deref(), Some("1 a\n0 b\n0 d\n"));
        Ok(())
    }

    #[test]
    fn test_without_reencode_keeps_ids() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "2 a\n5 b\n3 c\n"),
            ("d/a.jpg", "img"),
        ]);
        let filter = ClassFilter::with_store(config(vec![5, 2], false, false), &store)?;
        filter.filter_dataset()?;
        assert_eq!(store.contents("d/a.txt").as_deref(), Some("2 a\n5 b\n"));
        Ok(())
    }

    #[test]
    fn test_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "0 .1 .2\n\n1   .3 .4\n7 .5 .6\n"),
            ("d/a.jpg", "img"),
            ("d/b.txt", "1 .1 .1\n"),
            ("d/b.bmp", "img"),
        ]);
        let filter = ClassFilter::with_store(config(vec![1, 0], false, false), &store)?;

        filter.filter_dataset()?;
        let first = (store.contents("d/a.txt"), store.contents("d/b.txt"));
        let report = filter.filter_dataset()?;
        let second = (store.contents("d/a.txt"), store.contents("d/b.txt"));

        assert_eq!(first, second);
        assert_eq!(report.rewritten, 0);
        assert_eq!(report.unchanged, 2);
        Ok(())
    }

    #[test]
    fn test_remove_empty_deletes_pair() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "3 .1 .2 .3 .4\n"),
            ("d/a.jpeg", "img"),
            ("d/b.txt", "0 .1 .2 .3 .4\n"),
            ("d/b.jpg", "img"),
        ]);
        let filter = ClassFilter::with_store(config(vec![0], false, true), &store)?;
        let report = filter.filter_dataset()?;

        assert_eq!(store.contents("d/a.txt"), None);
        assert_eq!(store.contents("d/a.jpeg"), None);
        assert!(store.contents("d/b.txt").is_some());
        assert_eq!(report.removed_pairs, 1);
        Ok(())
    }

    #[test]
    fn test_empty_file_left_when_not_removing() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "3 .1 .2 .3 .4\n"),
            ("d/a.jpg", "img"),
        ]);
        let filter = ClassFilter::with_store(config(vec![0], false, false), &store)?;
        let report = filter.filter_dataset()?;

        assert_eq!(store.contents("d/a.txt").as_deref(), Some(""));
        assert_eq!(store.contents("d/a.jpg").as_deref(), Some("img"));
        assert_eq!(report.emptied, 1);
        Ok(())
    }

    #[test]
    fn test_missing_image_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([("d/a.txt", "3 .1 .2 .3 .4\n")]);
        let filter = ClassFilter::with_store(config(vec![0], false, true), &store)?;
        let report = filter.filter_dataset()?;

        assert_eq!(store.contents("d/a.txt").as_deref(), Some("3 .1 .2 .3 .4\n"));
        assert_eq!(report.missing_image, 1);
        assert_eq!(report.processed, 0);
        Ok(())
    }

    #[test]
    fn test_malformed_lines_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "zero .1 .2\n0 .3 .4\n"),
            ("d/a.jpg", "img"),
        ]);
        let filter = ClassFilter::with_store(config(vec![0], false, false), &store)?;
        let report = filter.filter_dataset()?;

        assert_eq!(store.contents("d/a.txt").as_deref(), Some("0 .3 .4\n"));
        assert_eq!(report.malformed_lines, 1);
        Ok(())
    }

    #[test]
    fn test_failure_is_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "1 .1\n0 .2\n"),
            ("d/a.jpg", "img"),
            ("d/b.txt", "1 .1\n0 .2\n"),
            ("d/b.jpg", "img"),
        ]);
        store.fail_on("d/a.txt");
        let filter = ClassFilter::with_store(config(vec![0], false, false), &store)?;
        let report = filter.filter_dataset()?;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, PathBuf::from("d/a.txt"));
        assert_eq!(store.contents("d/b.txt").as_deref(), Some("0 .2\n"));
        Ok(())
    }

    #[test]
    fn test_failed_image_delete_keeps_label() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "3 .1 .2 .3 .4\n"),
            ("d/a.jpg", "img"),
        ]);
        store.fail_on("d/a.jpg");
        let filter = ClassFilter::with_store(config(vec![0], false, true), &store)?;
        let report = filter.filter_dataset()?;

        assert_eq!(report.removed_pairs, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, PathBuf::from("d/a.jpg"));
        assert_eq!(store.contents("d/a.txt").as_deref(), Some("3 .1 .2 .3 .4\n"));
        assert_eq!(store.contents("d/a.jpg").as_deref(), Some("img"));
        Ok(())
    }

    #[test]
    fn test_duplicate_keep_ids_use_first_position() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("d/a.txt", "1 a\n2 b\n3 c\n"),
            ("d/a.jpg", "img"),
        ]);
        let filter = ClassFilter::with_store(config(vec![1, 2, 1], true, false), &store)?;
        filter.filter_dataset()?;
        assert_eq!(store.contents("d/a.txt").as_deref(), Some("0 a\n1 b\n"));
        Ok(())
    }

    #[test]
    fn test_invalid_keep_ids() {
        let store = MemoryFileStore::new();
        assert!(matches!(
            ClassFilter::with_store(config(vec![], false, false), &store),
            Err(DatasetError::Configuration(_))
        ));
    }
}
