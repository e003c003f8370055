//! Developer utility to train a shape classifier for a project profile.

use std::path::PathBuf;

use shaperec::classifier::{
    ClassifierControl, MlpClassifier, NnClassifier, ShapeRecognizer, TrainRequest, TrainingInput,
};
use shaperec::{app_dirs, logging};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Nn,
    Mlp,
}

#[derive(Debug, Clone)]
struct CliOptions {
    root: Option<PathBuf>,
    project: String,
    profile: String,
    algorithm: Algorithm,
    input: PathBuf,
    kind: TrainingInput,
    header: Option<PathBuf>,
    comment: String,
    dataset: String,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let root = match options.root.clone() {
        Some(root) => root,
        None => app_dirs::toolkit_root().map_err(|err| err.to_string())?,
    };
    let log_dir = root.join("logs");
    if let Err(err) = logging::init(&log_dir) {
        eprintln!("Logging disabled: {err}");
    }

    let control = ClassifierControl::new(&root, &options.project, &options.profile);
    let mut classifier: Box<dyn ShapeRecognizer> = match options.algorithm {
        Algorithm::Nn => Box::new(NnClassifier::new(&control).map_err(|err| err.to_string())?),
        Algorithm::Mlp => Box::new(MlpClassifier::new(&control).map_err(|err| err.to_string())?),
    };
    let request = TrainRequest {
        header_path: options.header.clone(),
        comment: options.comment.clone(),
        dataset: options.dataset.clone(),
        ..TrainRequest::new(&options.input, options.kind)
    };
    let summary = classifier.train(&request).map_err(|err| err.to_string())?;

    let total: usize = summary.class_counts.values().sum();
    println!(
        "trained {} classes, {total} {} ({} iterations)",
        summary.class_counts.len(),
        match options.algorithm {
            Algorithm::Nn => "prototypes",
            Algorithm::Mlp => "samples",
        },
        summary.iterations
    );
    for (class_id, count) in &summary.class_counts {
        println!("class {class_id:>4}  {count}");
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut root: Option<PathBuf> = None;
    let mut project: Option<String> = None;
    let mut profile = "default".to_string();
    let mut algorithm = Algorithm::Nn;
    let mut input: Option<(PathBuf, TrainingInput)> = None;
    let mut header: Option<PathBuf> = None;
    let mut comment = String::new();
    let mut dataset = String::new();

    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        if matches!(flag, "-h" | "--help") {
            return Err(help_text());
        }
        idx += 1;
        let value = args
            .get(idx)
            .ok_or_else(|| format!("{flag} requires a value"))?;
        match flag {
            "--root" => root = Some(PathBuf::from(value)),
            "--project" => project = Some(value.clone()),
            "--profile" => profile = value.clone(),
            "--algo" => {
                algorithm = match value.to_ascii_lowercase().as_str() {
                    "nn" => Algorithm::Nn,
                    "mlp" => Algorithm::Mlp,
                    _ => return Err(format!("Invalid --algo value: {value}")),
                };
            }
            "--ink-list" => input = Some((PathBuf::from(value), TrainingInput::InkList)),
            "--features" => input = Some((PathBuf::from(value), TrainingInput::FeatureFile)),
            "--header" => header = Some(PathBuf::from(value)),
            "--comment" => comment = value.clone(),
            "--dataset" => dataset = value.clone(),
            _ => return Err(format!("Unknown argument: {flag}\n\n{}", help_text())),
        }
        idx += 1;
    }

    let project = project.ok_or_else(|| format!("--project is required\n\n{}", help_text()))?;
    let (input, kind) = input.ok_or_else(|| {
        format!("one of --ink-list or --features is required\n\n{}", help_text())
    })?;
    Ok(CliOptions {
        root,
        project,
        profile,
        algorithm,
        input,
        kind,
        header,
        comment,
        dataset,
    })
}

fn help_text() -> String {
    [
        "shaperec-train",
        "",
        "Train a shape classifier and write its model file into the profile directory.",
        "",
        "Usage:",
        "  shaperec-train --project <name> (--ink-list <file> | --features <file>) [options]",
        "",
        "Options:",
        "  --root <dir>        Toolkit root (default: $SHAPEREC_HOME or the OS config dir).",
        "  --project <name>    Project under <root>/projects.",
        "  --profile <name>    Profile directory (default: default).",
        "  --algo <nn|mlp>     Classifier to train (default: nn).",
        "  --ink-list <file>   Lines of `<ink file> <class id>`.",
        "  --features <file>   Lines of `<class id> <feature vector>`.",
        "  --header <file>     Extra KEY=VALUE header fields for the model file.",
        "  --comment <text>    COMMENT header field.",
        "  --dataset <text>    DATASET header field.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parses_required_and_optional_flags() {
        let options = parse_args(args(&[
            "--project", "demo", "--features", "train.txt", "--algo", "MLP", "--profile", "p1",
        ]))
        .unwrap();
        assert_eq!(options.project, "demo");
        assert_eq!(options.profile, "p1");
        assert_eq!(options.algorithm, Algorithm::Mlp);
        assert_eq!(options.kind, TrainingInput::FeatureFile);
    }

    #[test]
    fn missing_input_is_reported() {
        let err = parse_args(args(&["--project", "demo"])).unwrap_err();
        assert!(err.contains("--ink-list"));
        assert!(parse_args(args(&["--project"])).is_err());
    }
}
