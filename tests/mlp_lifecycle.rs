mod support;

use shaperec::{
    ClassifierControl, MlpClassifier, RecognitionQuery, ShapeRecError, ShapeRecognizer,
    TrainRequest, TrainingInput,
};
use support::{PROFILE, PROJECT, ProjectFixture, line, three_shape_samples, vee};

const MLP_CONFIG: &str = "hidden_layer_units = [6]
max_iterations = 3000
total_error = 0.001
individual_error = 0.05

[pipeline]
trace_dimension = 12
";

fn classifier(fixture: &ProjectFixture) -> MlpClassifier {
    let control = ClassifierControl::new(fixture.root(), PROJECT, PROFILE);
    MlpClassifier::new(&control).expect("construct MLP classifier")
}

fn trained(fixture: &ProjectFixture) -> MlpClassifier {
    fixture.write_profile_config("mlp.toml", MLP_CONFIG);
    let mut mlp = classifier(fixture);
    let list = fixture.write_ink_list("train", &three_shape_samples());
    let summary = mlp
        .train(&TrainRequest::new(list, TrainingInput::InkList))
        .expect("train");
    assert_eq!(summary.class_counts.values().sum::<usize>(), 9);
    assert!(summary.iterations >= 1);
    mlp
}

#[test]
fn trained_network_recognizes_each_shape() {
    let fixture = ProjectFixture::new("\"dynamic\"");
    let mut mlp = trained(&fixture);
    mlp.load_model_data().unwrap();
    assert_eq!(mlp.network().unwrap().layers(), &[60, 6, 3]);
    assert_eq!(mlp.class_ids(), &[0, 1, 2]);

    let query = RecognitionQuery::default();
    assert_eq!(mlp.recognize(&line(0.0, 0.25), &query).unwrap()[0].class_id, 0);
    assert_eq!(mlp.recognize(&line(90.0, 0.25), &query).unwrap()[0].class_id, 1);
    let results = mlp.recognize(&vee(0.25), &query).unwrap();
    assert_eq!(results[0].class_id, 2);
    let subset = RecognitionQuery {
        class_subset: Some(vec![0, 1]),
        ..RecognitionQuery::default()
    };
    let restricted = mlp.recognize(&vee(0.25), &subset).unwrap();
    assert!(restricted.iter().all(|result| result.class_id != 2));
}

#[test]
fn class_set_mutation_is_unsupported() {
    let fixture = ProjectFixture::new("\"dynamic\"");
    let mut mlp = trained(&fixture);
    mlp.load_model_data().unwrap();
    assert!(matches!(
        mlp.add_class(&[vee(1.0)]),
        Err(ShapeRecError::Unsupported(_))
    ));
    assert!(matches!(
        mlp.get_trace_groups(0, 0),
        Err(ShapeRecError::Unsupported(_))
    ));
}

#[test]
fn project_size_change_invalidates_the_model() {
    let fixture = ProjectFixture::new("\"dynamic\"");
    drop(trained(&fixture));
    std::fs::write(
        fixture
            .root()
            .join("projects")
            .join(PROJECT)
            .join("config")
            .join("project.toml"),
        "num_shapes = 3\n",
    )
    .unwrap();
    let mut mlp = classifier(&fixture);
    assert!(matches!(
        mlp.load_model_data(),
        Err(ShapeRecError::ModelMismatch { key, .. }) if key == "NUMSHAPES"
    ));
}
