use std::error::Error;

#[path = "common/prototype_classifier.rs"]
mod prototype_classifier;

fn main() -> Result<(), Box<dyn Error>> {
    fewshot_eval::example_apps::run_evaluate_features(
        std::env::args().skip(1),
        prototype_classifier::build_prototype_factory,
    )?;
    Ok(())
}
