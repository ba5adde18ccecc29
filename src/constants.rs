/// Constants used by accuracy aggregation.
pub mod metrics {
    /// z-score of the two-sided 95% normal interval.
    pub const CONFIDENCE_Z: f64 = 1.96;
}

/// Constants used by the evaluation loop.
pub mod evaluation {
    /// Progress is logged on every iteration index divisible by this value.
    pub const PROGRESS_LOG_INTERVAL: usize = 10;
    /// `save_iter` value that selects the best checkpoint instead of a fixed epoch.
    pub const BEST_CHECKPOINT_ITER: i64 = -1;
    /// Inner-loop update count used by gradient meta-learners when adaptation is enabled.
    pub const ADAPTATION_TASK_UPDATE_NUM: usize = 100;
    /// Input image side for `Conv*` backbones on the image-episode path.
    pub const CONV_IMAGE_SIZE: usize = 84;
    /// Input image side for every other backbone on the image-episode path.
    pub const DEFAULT_IMAGE_SIZE: usize = 224;
    /// Backbone name prefix that selects [`CONV_IMAGE_SIZE`].
    pub const CONV_BACKBONE_PREFIX: &str = "Conv";
}

/// Constants used by the persisted result log.
pub mod results {
    /// Default root directory for per-run outputs.
    pub const DEFAULT_OUTPUT_ROOT: &str = "output";
    /// File name of the append-only result log inside a run directory.
    pub const RESULTS_FILENAME: &str = "results.txt";
    /// Suffix appended to the method when training used augmentation.
    pub const AUG_SUFFIX: &str = "-aug";
    /// Suffix appended to the method when test-time adaptation is enabled.
    pub const ADAPTED_SUFFIX: &str = "-adapted";
}

/// Constants used by the CLI runner.
pub mod cli {
    /// Program name reported by `--help`.
    pub const PROGRAM_NAME: &str = "evaluate_features";
}
