use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueEnum, error::ErrorKind};
use serde_json::Value;
use tracing::info;

use crate::classifier::ClassifierFactory;
use crate::config::{EvaluationConfig, Split};
use crate::constants::cli::PROGRAM_NAME;
use crate::constants::evaluation::BEST_CHECKPOINT_ITER;
use crate::constants::results::DEFAULT_OUTPUT_ROOT;
use crate::data::{FeatureSet, ModelState};
use crate::evaluation::{EvaluationReport, MethodEvaluation};

/// Factory over untyped (JSON) checkpoint state.
pub type DynFactory = Box<dyn ClassifierFactory<Value>>;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SplitArg {
    Base,
    Val,
    Novel,
}

impl From<SplitArg> for Split {
    fn from(value: SplitArg) -> Self {
        match value {
            SplitArg::Base => Split::Base,
            SplitArg::Val => Split::Val,
            SplitArg::Novel => Split::Novel,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = PROGRAM_NAME,
    disable_help_subcommand = true,
    about = "Episodic few-shot evaluation over precomputed features",
    long_about = "Sample N-way K-shot episodes from a feature file, classify the queries with a trained model, and append the mean accuracy with its 95% confidence half-width to the run's results.txt.",
    after_help = "Set RUST_LOG=info to see pool size, the drawn seed, and progress every 10 episodes."
)]
/// CLI for `evaluate_features`.
///
/// Common usage:
/// - Evaluate a prototypical network: `--method protonet --features f.json --model-state m.json`
/// - Inject support label noise: `--n-swaps 2`
/// - Reproduce a previous run: `--seed <SEED>` with the seed it reported
struct EvaluateFeaturesCli {
    #[arg(long, default_value = "CUB", help = "Dataset identifier")]
    dataset: String,
    #[arg(long, default_value = "Conv4", help = "Backbone identifier")]
    model: String,
    #[arg(
        long,
        default_value = "baseline",
        help = "baseline, baseline++, protonet, matchingnet, relationnet, relationnet_softmax, maml or maml_approx"
    )]
    method: String,
    #[arg(
        long = "train-n-way",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Classes per task used during training"
    )]
    train_n_way: usize,
    #[arg(
        long = "test-n-way",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Classes per evaluation episode"
    )]
    test_n_way: usize,
    #[arg(
        long = "n-shot",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Labeled support instances per class"
    )]
    n_shot: usize,
    #[arg(long = "n-query", default_value_t = 15, help = "Query instances per class")]
    n_query: usize,
    #[arg(long = "train-aug", help = "The model was trained with data augmentation")]
    train_aug: bool,
    #[arg(long, value_enum, default_value = "novel", help = "Feature partition")]
    split: SplitArg,
    #[arg(
        long = "save-iter",
        default_value_t = BEST_CHECKPOINT_ITER,
        allow_negative_numbers = true,
        help = "Checkpoint epoch the features come from; -1 selects the best checkpoint"
    )]
    save_iter: i64,
    #[arg(
        long = "n-iter",
        default_value_t = 600,
        value_parser = parse_positive_usize,
        help = "Number of episodes"
    )]
    n_iter: usize,
    #[arg(long, help = "Adapt to each episode's support set before predicting")]
    adaptation: bool,
    #[arg(long, help = "Optional deterministic seed; a fresh one is drawn and reported otherwise")]
    seed: Option<u64>,
    #[arg(
        long = "n-swaps",
        default_value_t = 0,
        help = "Support label swaps per episode"
    )]
    n_swaps: usize,
    #[arg(
        long,
        value_name = "PATH",
        help = "JSON feature file with `features` and `labels`"
    )]
    features: PathBuf,
    #[arg(
        long = "model-state",
        value_name = "PATH",
        help = "JSON checkpoint with `state` and `epoch`"
    )]
    model_state: PathBuf,
    #[arg(
        long = "output-root",
        value_name = "DIR",
        default_value = DEFAULT_OUTPUT_ROOT,
        help = "Root directory for per-run result logs"
    )]
    output_root: PathBuf,
}

impl EvaluateFeaturesCli {
    fn into_parts(self) -> (EvaluationConfig, PathBuf, PathBuf) {
        let config = EvaluationConfig {
            dataset: self.dataset,
            backbone: self.model,
            method: self.method,
            train_n_way: self.train_n_way,
            test_n_way: self.test_n_way,
            n_shot: self.n_shot,
            n_query: self.n_query,
            train_aug: self.train_aug,
            split: self.split.into(),
            save_iter: self.save_iter,
            n_iter: self.n_iter,
            adaptation: self.adaptation,
            random_seed: self.seed,
            n_swaps: self.n_swaps,
            output_root: self.output_root,
        };
        (config, self.features, self.model_state)
    }
}

/// Parse arguments, evaluate one model on a feature file, and print the outcome.
///
/// `build_factory` supplies the classifiers; it is only invoked after the
/// configuration has been validated and both input files have loaded.
/// Returns `Ok(None)` when help or version output was requested.
pub fn run_evaluate_features<Build, I>(
    args_iter: I,
    build_factory: Build,
) -> Result<Option<EvaluationReport>, Box<dyn Error>>
where
    Build: FnOnce() -> DynFactory,
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<EvaluateFeaturesCli, _>(
        std::iter::once(PROGRAM_NAME.to_string()).chain(args_iter),
    )?
    else {
        return Ok(None);
    };

    let (config, features_path, model_path) = cli.into_parts();
    let evaluation = MethodEvaluation::new(config)?;

    let model = ModelState::<Value>::from_json_path(&model_path)?;
    info!(path = %model_path.display(), epoch = model.epoch, "loaded model state");
    let features = FeatureSet::from_json_path(&features_path)?;
    info!(
        path = %features_path.display(),
        rows = features.len(),
        "loaded features"
    );

    let factory = build_factory();
    let report = evaluation.evaluate_features(&model, &features, factory.as_ref())?;

    println!("=== {} ===", report.setting);
    println!("seed: {}", report.seed);
    println!("{}", report.summary.accuracy_line());
    println!("appended to: {}", report.result_log.display());
    Ok(Some(report))
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Vec<String> {
        let mut all = vec![
            PROGRAM_NAME.to_string(),
            "--features".to_string(),
            "f.json".to_string(),
            "--model-state".to_string(),
            "m.json".to_string(),
        ];
        all.extend(extra.iter().map(|arg| arg.to_string()));
        all
    }

    #[test]
    fn defaults_match_evaluation_config() {
        let cli = parse_cli::<EvaluateFeaturesCli, _>(args(&[]))
            .unwrap()
            .unwrap();
        let (config, features, model) = cli.into_parts();
        let defaults = EvaluationConfig::default();
        assert_eq!(config.dataset, defaults.dataset);
        assert_eq!(config.backbone, defaults.backbone);
        assert_eq!(config.method, defaults.method);
        assert_eq!(config.task_shape(), defaults.task_shape());
        assert_eq!(config.save_iter, -1);
        assert_eq!(config.n_iter, 600);
        assert_eq!(config.split, Split::Novel);
        assert_eq!(config.random_seed, None);
        assert_eq!(config.output_root, defaults.output_root);
        assert_eq!(features, PathBuf::from("f.json"));
        assert_eq!(model, PathBuf::from("m.json"));
    }

    #[test]
    fn overrides_are_applied() {
        let cli = parse_cli::<EvaluateFeaturesCli, _>(args(&[
            "--method",
            "relationnet",
            "--test-n-way",
            "20",
            "--n-shot",
            "1",
            "--split",
            "val",
            "--save-iter",
            "-1",
            "--seed",
            "42",
            "--n-swaps",
            "3",
            "--adaptation",
        ]))
        .unwrap()
        .unwrap();
        let (config, _, _) = cli.into_parts();
        assert_eq!(config.method, "relationnet");
        assert_eq!(config.test_n_way, 20);
        assert_eq!(config.n_shot, 1);
        assert_eq!(config.split, Split::Val);
        assert_eq!(config.random_seed, Some(42));
        assert_eq!(config.n_swaps, 3);
        assert!(config.adaptation);
    }

    #[test]
    fn zero_shot_is_rejected_by_the_parser() {
        assert!(parse_cli::<EvaluateFeaturesCli, _>(args(&["--n-shot", "0"])).is_err());
        assert!(parse_positive_usize("abc").is_err());
        assert_eq!(parse_positive_usize("7").unwrap(), 7);
    }

    #[test]
    fn missing_inputs_are_rejected() {
        let result = parse_cli::<EvaluateFeaturesCli, _>(vec![PROGRAM_NAME.to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn help_short_circuits() {
        let help = vec![PROGRAM_NAME.to_string(), "--help".to_string()];
        let parsed = parse_cli::<EvaluateFeaturesCli, _>(help).unwrap();
        assert!(parsed.is_none());
    }
}
