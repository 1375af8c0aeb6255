#![deny(missing_docs)]

//! YOLO dataset curation in Rust
//!
//! This crate cleans and splits object-detection datasets stored as image
//! files with sidecar label files (`<stem>.txt`, one `class_id field...` line
//! per object). Three independent tools operate on the same corpus:
//!
//! * [`DatasetChecker`] deletes unpaired images and labels, and pairs whose
//!   labels reference classes outside an allowed set.
//! * [`ClassFilter`] drops annotations of unwanted classes, optionally
//!   re-encoding the kept ids to `0..n`.
//! * [`DatasetPartitioner`] walks a dataset tree and writes seeded
//!   `train.txt`, `val.txt` and `test.txt` manifests.
//!
//! # Examples
//!
//! ```no_run
//! use yolo_dataset_tools::{
//!     ClassFilter, ClassFilterConfig, DatasetChecker, DatasetCheckerConfig, DatasetPartitioner,
//!     PartitionerConfig, SplitRatios,
//! };
//!
//! let checker = DatasetChecker::new(DatasetCheckerConfig {
//!     dataset_dir: "datasets/coco".into(),
//!     allowed_class_ids: [0, 2].into(),
//!     ..Default::default()
//! })?;
//! checker.clean_dataset()?;
//!
//! let filter = ClassFilter::new(ClassFilterConfig {
//!     dataset_dir: "datasets/coco".into(),
//!     keep_ids: vec![2, 0],
//!     reencode: true,
//!     remove_empty: true,
//!     ..Default::default()
//! })?;
//! filter.filter_dataset()?;
//!
//! let partitioner = DatasetPartitioner::new(PartitionerConfig {
//!     dataset_root: "datasets".into(),
//!     output_dir: "output".into(),
//!     ratios: SplitRatios::new(0.8, 0.2, 0.0)?,
//!     seed: 123,
//!     ..Default::default()
//! })?;
//! let (manifest, _files) = partitioner.run()?;
//! println!("{} images split", manifest.len());
//! # Ok::<(), yolo_dataset_tools::DatasetError>(())
//! ```

/// Label line parsing and rendering
mod annotation;

/// Consistency checker
mod checker;

/// Dataset layout and directory snapshots
mod corpus;

/// Detection model boundary
mod detector;

/// Error types
mod error;

/// Class filter
mod filter;

/// Train/val/test partitioning
mod partition;

/// File store abstraction
mod store;

pub use annotation::{Annotation, AnnotationError, ParsedLabel, parse_label, render_label};
pub use checker::{
    CleanReport, CleanupPlan, DatasetChecker, DatasetCheckerConfig, Removal, Violation,
};
pub use corpus::{
    AnnotatedSample, DEFAULT_ANNOTATION_EXTENSION, DEFAULT_IMAGE_EXTENSIONS, DatasetLayout,
    DirectorySnapshot,
};
pub use detector::{
    BoundingBox, DetectionModel, DetectionResult, ModelArtifact, ModelRef, PredictParams,
    TrainParams,
};
pub use error::{DatasetError, FileFailure};
pub use filter::{ClassFilter, ClassFilterConfig, FilterOutcome, FilterReport};
pub use partition::{
    DatasetPartitioner, ManifestFiles, PartitionerConfig, RATIO_TOLERANCE, Split, SplitManifest,
    SplitRatios,
};
pub use store::{FileStore, LocalFileStore, MemoryFileStore};
