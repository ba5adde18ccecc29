/// Class label attached to each feature row by upstream extraction.
/// Examples: `0`, `117`, `199`
pub type ClassLabel = i64;
/// Index of a class inside one episode, assigned in class-selection order.
/// Range: `0..n_way`
pub type ClassIndex = usize;
/// Scalar type of precomputed feature vectors.
pub type Feature = f32;
/// Accuracy of one episode, in percent.
/// Range: `0.0..=100.0`
pub type AccuracyPercent = f64;
/// Dataset identifier.
/// Examples: `CUB`, `miniImageNet`
pub type DatasetId = String;
/// Backbone architecture identifier.
/// Examples: `Conv4`, `Conv6`, `ResNet18`
pub type BackboneId = String;
/// One human-readable experiment descriptor line.
/// Example: `CUB-novel-Conv4-protonet 5shot 5way_train 5way_test`
pub type SettingDescriptor = String;
