use super::*;
use tempfile::tempdir;

#[test]
fn missing_files_fall_back_to_defaults() {
    let dir = tempdir().unwrap();
    let project = load_project_settings(dir.path(), "demo").unwrap();
    assert!(project.is_dynamic());
    let (_, nn) = load_nn_settings(&profile_dir(dir.path(), "demo", "default")).unwrap();
    assert_eq!(nn.pipeline.trace_dimension, 60);
    assert_eq!(nn.prototype_distance, DistanceMetric::Dtw);
    assert_eq!(nn.nearest_neighbors, 1);
}

#[test]
fn reads_fixed_shape_count() {
    let reader = ConfigReader::from_toml_str("num_shapes = 10\n").unwrap();
    let project: ProjectSettings = reader.settings().unwrap();
    project.validate().unwrap();
    assert!(!project.is_dynamic());
    assert_eq!(project.fixed_shape_count(), Some(10));
}

#[test]
fn rejects_unknown_shape_keyword() {
    let reader = ConfigReader::from_toml_str("num_shapes = \"open\"\n").unwrap();
    let project: ProjectSettings = reader.settings().unwrap();
    assert!(project.validate().is_err());
}

#[test]
fn nn_settings_parse_kebab_case_enums() {
    let text = r#"
prototype_selection = "lvq"
cluster_stop = "average-silhouette"
linkage = "complete"
prototype_distance = "euclidean"
model_file_mode = "binary"
dtw_euclidean_filter = 30

[pipeline]
trace_dimension = 12
"#;
    let reader = ConfigReader::from_toml_str(text).unwrap();
    let nn: NnSettings = reader.settings().unwrap();
    nn.validate().unwrap();
    assert_eq!(nn.prototype_selection, PrototypeSelection::Lvq);
    assert_eq!(nn.cluster_stop, ClusterStop::AverageSilhouette);
    assert_eq!(nn.linkage, Linkage::Complete);
    assert_eq!(nn.model_file_mode, FileMode::Binary);
    assert_eq!(nn.dtw_euclidean_filter, Some(30));
    assert_eq!(nn.pipeline.trace_dimension, 12);
    assert_eq!(reader.get_value("pipeline.trace_dimension").as_deref(), Some("12"));
    assert_eq!(reader.get_value("linkage").as_deref(), Some("complete"));
    assert_eq!(reader.get_value("pipeline.missing"), None);
}

#[test]
fn banding_outside_unit_interval_is_rejected() {
    let reader = ConfigReader::from_toml_str("dtw_banding = 0.0\n").unwrap();
    let nn: NnSettings = reader.settings().unwrap();
    let err = nn.validate().unwrap_err();
    assert!(err.to_string().contains("dtw_banding"));
}

#[test]
fn parse_error_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(NN_CONFIG_FILE_NAME);
    std::fs::write(&path, "nearest_neighbors = = 3").unwrap();
    let err = load_nn_settings(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseToml { ref path, .. } if path.ends_with(NN_CONFIG_FILE_NAME)));
}

#[test]
fn mlp_settings_require_hidden_units() {
    let reader = ConfigReader::from_toml_str("hidden_layer_units = []\n").unwrap();
    let mlp: MlpSettings = reader.settings().unwrap();
    assert!(mlp.validate().is_err());
}
