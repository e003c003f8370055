//! Developer utility to score a trained profile against a labeled feature file.

use std::path::PathBuf;

use shaperec::classifier::training_data::read_training_samples;
use shaperec::classifier::{
    ClassifierControl, MlpClassifier, NnClassifier, RecognitionQuery, ShapeRecognizer,
    TrainingInput,
};
use shaperec::ink::JsonInkLoader;
use shaperec::ml::metrics::{ConfusionMatrix, EvaluationReport};
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
    json_out: Option<PathBuf>,
    top: usize,
}

#[derive(Debug, Clone)]
struct Misrecognition {
    line: usize,
    truth: u32,
    predicted: Option<u32>,
    confidence: f32,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let root = match options.root.clone() {
        Some(root) => root,
        None => app_dirs::toolkit_root().map_err(|err| err.to_string())?,
    };
    if let Err(err) = logging::init(&root.join("logs")) {
        eprintln!("Logging disabled: {err}");
    }

    let control = ClassifierControl::new(&root, &options.project, &options.profile);
    let mut classifier: Box<dyn ShapeRecognizer> = match options.algorithm {
        Algorithm::Nn => Box::new(NnClassifier::new(&control).map_err(|err| err.to_string())?),
        Algorithm::Mlp => Box::new(MlpClassifier::new(&control).map_err(|err| err.to_string())?),
    };
    classifier.load_model_data().map_err(|err| err.to_string())?;
    let samples = read_training_samples(
        &options.input,
        options.kind,
        classifier.pipeline(),
        &JsonInkLoader,
    )
    .map_err(|err| err.to_string())?;

    let mut cm = ConfusionMatrix::new(samples.iter().map(|sample| sample.class_id));
    let mut misses = Vec::new();
    let query = RecognitionQuery {
        num_choices: Some(1),
        ..RecognitionQuery::default()
    };
    for (idx, sample) in samples.iter().enumerate() {
        let results = classifier
            .recognize_features(&sample.features, &query)
            .map_err(|err| err.to_string())?;
        let top = results.first();
        let predicted = top.map(|result| result.class_id);
        cm.add(sample.class_id, predicted);
        if predicted != Some(sample.class_id) {
            misses.push(Misrecognition {
                line: idx + 1,
                truth: sample.class_id,
                predicted,
                confidence: top.map_or(0.0, |result| result.confidence),
            });
        }
    }

    let report = EvaluationReport::from_matrix(&cm);
    println!("samples: {}", report.samples);
    println!("accuracy: {:.4}", report.accuracy);
    println!("rejection rate: {:.4}", report.rejection_rate);
    for (class_id, stats) in &report.per_class {
        println!(
            "class {class_id:>4}  precision={:.3}  recall={:.3}  f1={:.3}  support={}",
            stats.precision, stats.recall, stats.f1, stats.support
        );
    }
    println!("confusion matrix (rows=true, cols=pred, last col=rejected):");
    for &truth in cm.classes() {
        let mut row = format!("{truth:>4} |");
        for &pred in cm.classes() {
            row.push_str(&format!("{:6}", cm.get(truth, pred)));
        }
        row.push_str(&format!("{:6}", cm.rejected(truth)));
        println!("{row}");
    }
    misses.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    if !misses.is_empty() && options.top > 0 {
        println!("most confident misrecognitions:");
        for miss in misses.iter().take(options.top) {
            let predicted = miss
                .predicted
                .map_or_else(|| "reject".to_string(), |id| id.to_string());
            println!(
                "  sample {:>5}  truth={}  predicted={predicted}  confidence={:.3}",
                miss.line, miss.truth, miss.confidence
            );
        }
    }

    if let Some(path) = &options.json_out {
        let json = serde_json::to_string_pretty(&report).map_err(|err| err.to_string())?;
        std::fs::write(path, json).map_err(|err| format!("{}: {err}", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut root: Option<PathBuf> = None;
    let mut project: Option<String> = None;
    let mut profile = "default".to_string();
    let mut algorithm = Algorithm::Nn;
    let mut input: Option<(PathBuf, TrainingInput)> = None;
    let mut json_out: Option<PathBuf> = None;
    let mut top = 10usize;

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
            "--json" => json_out = Some(PathBuf::from(value)),
            "--top" => {
                top = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --top value: {value}"))?;
            }
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
        json_out,
        top,
    })
}

fn help_text() -> String {
    [
        "shaperec-eval",
        "",
        "Recognize every sample of a labeled file with a trained profile and report accuracy.",
        "",
        "Usage:",
        "  shaperec-eval --project <name> (--ink-list <file> | --features <file>) [options]",
        "",
        "Options:",
        "  --root <dir>        Toolkit root (default: $SHAPEREC_HOME or the OS config dir).",
        "  --project <name>    Project under <root>/projects.",
        "  --profile <name>    Profile directory (default: default).",
        "  --algo <nn|mlp>     Classifier to load (default: nn).",
        "  --json <file>       Write the evaluation report as JSON.",
        "  --top <n>           Misrecognitions to list (default: 10).",
    ]
    .join("\n")
}
