use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{EvaluationConfig, Method};
use crate::constants::results::{ADAPTED_SUFFIX, AUG_SUFFIX, RESULTS_FILENAME};
use crate::errors::EvaluationError;
use crate::metrics::AccuracySummary;
use crate::types::SettingDescriptor;

/// One persisted run: setting descriptor, checkpoint epoch, and accuracy line.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRecord {
    /// Experiment descriptor, see [`experiment_setting`].
    pub setting: SettingDescriptor,
    /// Training epoch of the evaluated checkpoint.
    pub epoch: i64,
    /// Aggregate accuracy.
    pub summary: AccuracySummary,
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Setting: {}\n Retrieved model from epoch {}\n Acc: {} \n",
            self.setting,
            self.epoch,
            self.summary.accuracy_line()
        )
    }
}

/// Describe the evaluated configuration.
///
/// Baselines report the swap count; episodic methods report the training way instead.
pub fn experiment_setting(config: &EvaluationConfig, method: Method) -> SettingDescriptor {
    let mut aug = String::new();
    if config.train_aug {
        aug.push_str(AUG_SUFFIX);
    }
    if config.adaptation {
        aug.push_str(ADAPTED_SUFFIX);
    }
    let prefix = format!(
        "{}-{}-{}-{}{}",
        config.dataset,
        config.split_descriptor(),
        config.backbone,
        method,
        aug
    );
    if method.is_baseline() {
        format!(
            "{prefix} {}shot {}way_test {}swaps",
            config.n_shot, config.test_n_way, config.n_swaps
        )
    } else {
        format!(
            "{prefix} {}shot {}way_train {}way_test",
            config.n_shot, config.train_n_way, config.test_n_way
        )
    }
}

/// Append-only text log shared by every run of one `(dataset, backbone, method)`.
#[derive(Clone, Debug)]
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    /// Log at an explicit path.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Log for a run: `<root>/<dataset>/<backbone>_<method>/results.txt`.
    pub fn for_run<P: AsRef<Path>>(
        root: P,
        dataset: &str,
        backbone: &str,
        method: Method,
    ) -> Self {
        Self::at(Self::run_dir(root, dataset, backbone, method).join(RESULTS_FILENAME))
    }

    /// Run directory holding the log.
    pub fn run_dir<P: AsRef<Path>>(
        root: P,
        dataset: &str,
        backbone: &str,
        method: Method,
    ) -> PathBuf {
        root.as_ref().join(dataset).join(format!("{backbone}_{method}"))
    }

    /// File path of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating parent directories on first use.
    pub fn append(&self, record: &ResultRecord) -> Result<(), EvaluationError> {
        ensure_parent_dir(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(record.to_string().as_bytes())?;
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), EvaluationError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
