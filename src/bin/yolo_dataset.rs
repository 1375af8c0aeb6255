//! Command line front end for the dataset curation tools.

use argh::FromArgs;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use yolo_dataset_tools::{
    ClassFilter, ClassFilterConfig, DatasetChecker, DatasetCheckerConfig, DatasetError,
    DatasetLayout, DatasetPartitioner, PartitionerConfig, SplitRatios,
};

#[derive(FromArgs)]
/// YOLO dataset curation tools
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Filter(FilterArgs),
    Check(CheckArgs),
    Split(SplitArgs),
}

#[derive(FromArgs)]
/// Keep only some classes in every label file of a directory
#[argh(subcommand, name = "filter")]
struct FilterArgs {
    /// directory holding images and label files
    #[argh(option)]
    dataset_dir: PathBuf,

    /// class id to keep; repeat for several, order defines re-encoding
    #[argh(option)]
    keep: Vec<u32>,

    /// rewrite kept class ids to their position in the keep list
    #[argh(switch)]
    reencode: bool,

    /// delete label and image when no annotation survives
    #[argh(switch)]
    remove_empty: bool,

    /// image extension to probe, in priority order; repeat for several
    #[argh(option)]
    image_ext: Vec<String>,
}

#[derive(FromArgs)]
/// Remove unpaired files and pairs with disallowed classes
#[argh(subcommand, name = "check")]
struct CheckArgs {
    /// directory holding images and label files
    #[argh(option)]
    dataset_dir: PathBuf,

    /// allowed class id; repeat for several
    #[argh(option)]
    allow: Vec<u32>,

    /// allow no class at all, removing every non-empty label file and its image
    #[argh(switch)]
    allow_none: bool,

    /// image extension to probe, in priority order; repeat for several
    #[argh(option)]
    image_ext: Vec<String>,
}

#[derive(FromArgs)]
/// Write seeded train/val/test manifests for a dataset tree
#[argh(subcommand, name = "split")]
struct SplitArgs {
    /// root walked recursively for image/label pairs
    #[argh(option)]
    dataset_root: PathBuf,

    /// directory receiving train.txt, val.txt and test.txt
    #[argh(option, default = "PathBuf::from(\"output\")")]
    output_dir: PathBuf,

    /// fraction of pairs for training
    #[argh(option, default = "0.8")]
    train_ratio: f64,

    /// fraction of pairs for validation
    #[argh(option, default = "0.15")]
    val_ratio: f64,

    /// fraction of pairs for testing
    #[argh(option, default = "0.05")]
    test_ratio: f64,

    /// image extension; repeat for several
    #[argh(option)]
    image_ext: Vec<String>,

    /// label file extension
    #[argh(option, default = "\".txt\".to_string()")]
    annotation_ext: String,

    /// shuffle seed
    #[argh(option, default = "42")]
    seed: u64,
}

fn layout(image_ext: Vec<String>, default: DatasetLayout) -> DatasetLayout {
    if image_ext.is_empty() {
        default
    } else {
        DatasetLayout {
            image_extensions: image_ext,
            ..default
        }
    }
}

fn allowed_ids(allow: Vec<u32>, allow_none: bool) -> Result<BTreeSet<u32>, DatasetError> {
    match (allow.is_empty(), allow_none) {
        (true, false) => Err(DatasetError::configuration(
            "pass at least one --allow, or --allow-none to remove every annotated pair",
        )),
        (false, true) => Err(DatasetError::configuration(
            "--allow and --allow-none are mutually exclusive",
        )),
        _ => Ok(allow.into_iter().collect()),
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("yolo_dataset_tools=info,yolo_dataset=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(env_filter)
            .init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Args = argh::from_env();
    init_tracing();

    let failures = match args.command {
        Command::Filter(args) => {
            let config = ClassFilterConfig {
                dataset_dir: args.dataset_dir,
                keep_ids: args.keep,
                reencode: args.reencode,
                remove_empty: args.remove_empty,
                layout: layout(args.image_ext, DatasetLayout::default()),
            };
            ClassFilter::new(config)?.filter_dataset()?.failures
        }
        Command::Check(args) => {
            let config = DatasetCheckerConfig {
                dataset_dir: args.dataset_dir,
                allowed_class_ids: allowed_ids(args.allow, args.allow_none)?,
                layout: layout(args.image_ext, DatasetLayout::default()),
            };
            DatasetChecker::new(config)?.clean_dataset()?.failures
        }
        Command::Split(args) => {
            let defaults = PartitionerConfig::default();
            let config = PartitionerConfig {
                dataset_root: args.dataset_root,
                output_dir: args.output_dir,
                ratios: SplitRatios::new(args.train_ratio, args.val_ratio, args.test_ratio)?,
                layout: DatasetLayout {
                    annotation_extension: args.annotation_ext,
                    ..layout(args.image_ext, defaults.layout)
                },
                seed: args.seed,
            };
            DatasetPartitioner::new(config)?.run()?;
            Vec::new()
        }
    };

    if !failures.is_empty() {
        for failure in &failures {
            tracing::error!("{}: {}", failure.path.display(), failure.error);
        }
        return Err(format!("{} files failed", failures.len()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_requires_allowed_ids() {
        assert!(matches!(
            allowed_ids(vec![], false),
            Err(DatasetError::Configuration(_))
        ));
        assert!(matches!(
            allowed_ids(vec![0], true),
            Err(DatasetError::Configuration(_))
        ));
    }

    #[test]
    fn test_check_allowed_ids() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(allowed_ids(vec![2, 0, 2], false)?, BTreeSet::from([0, 2]));
        assert!(allowed_ids(vec![], true)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_check_args_parse() -> Result<(), Box<dyn std::error::Error>> {
        let args = Args::from_args(&["yolo-dataset"], &["check", "--dataset-dir", "d"])
            .map_err(|e| e.output)?;
        let Command::Check(check) = args.command else {
            return Err("expected the check subcommand".into());
        };
        assert!(check.allow.is_empty());
        assert!(!check.allow_none);
        assert!(allowed_ids(check.allow, check.allow_none).is_err());
        Ok(())
    }
}
