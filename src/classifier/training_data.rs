//! Training input readers.
//!
//! Two line-oriented formats are accepted:
//! - ink list: `<ink file path> <class id>`, paths relative to the list file
//! - feature file: `<class id> <feature>|<feature>|...`
//!
//! Class ids must be non-negative and non-decreasing through the file; a
//! violation aborts the read. Any other malformed line is skipped.

use std::path::{Path, PathBuf};

use super::codec::parse_class_id;
use super::{ShapeRecError, ShapeSample, TrainingInput};
use crate::features::vector_from_text;
use crate::ink::InkLoader;
use crate::registry::Pipeline;

/// Read every usable sample from `path`, in file order.
pub fn read_training_samples(
    path: &Path,
    input: TrainingInput,
    pipeline: &Pipeline,
    loader: &dyn InkLoader,
) -> Result<Vec<ShapeSample>, ShapeRecError> {
    let text = std::fs::read_to_string(path).map_err(|source| ShapeRecError::io(path, source))?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut order = ClassOrder::default();
    let mut samples = Vec::new();
    let mut skipped = 0usize;
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed = match input {
            TrainingInput::InkList => parse_ink_line(line, &base, pipeline, loader, &mut order),
            TrainingInput::FeatureFile => parse_feature_line(line, pipeline, &mut order),
        };
        match parsed {
            Ok(sample) => samples.push(sample),
            Err(err @ ShapeRecError::ShapeId { .. }) => return Err(err),
            Err(err) => {
                skipped += 1;
                tracing::warn!("Skipping {}:{}: {err}", path.display(), idx + 1);
            }
        }
    }
    tracing::info!(
        "Read {} training samples from {} ({} skipped)",
        samples.len(),
        path.display(),
        skipped
    );
    if samples.is_empty() {
        return Err(ShapeRecError::EmptyInput(format!(
            "no usable training samples in {}",
            path.display()
        )));
    }
    Ok(samples)
}

/// Split samples into runs of equal class id, preserving order.
pub fn group_by_class(samples: Vec<ShapeSample>) -> Vec<(u32, Vec<ShapeSample>)> {
    let mut groups: Vec<(u32, Vec<ShapeSample>)> = Vec::new();
    for sample in samples {
        match groups.last_mut() {
            Some((class_id, members)) if *class_id == sample.class_id => members.push(sample),
            _ => groups.push((sample.class_id, vec![sample])),
        }
    }
    groups
}

#[derive(Debug, Default)]
struct ClassOrder {
    last: Option<u32>,
}

impl ClassOrder {
    fn accept(&mut self, class_id: u32) -> Result<(), ShapeRecError> {
        if let Some(last) = self.last
            && class_id < last
        {
            return Err(ShapeRecError::ShapeId {
                id: i64::from(class_id),
                reason: "class ids must be non-decreasing through the training file",
            });
        }
        self.last = Some(class_id);
        Ok(())
    }
}

fn parse_ink_line(
    line: &str,
    base: &Path,
    pipeline: &Pipeline,
    loader: &dyn InkLoader,
    order: &mut ClassOrder,
) -> Result<ShapeSample, ShapeRecError> {
    let (file, id) = line
        .rsplit_once(char::is_whitespace)
        .ok_or_else(|| ShapeRecError::InputFormat(format!("expected <path> <class id>, got {line:?}")))?;
    let class_id = parse_class_id(id)?;
    order.accept(class_id)?;
    let file = PathBuf::from(file.trim());
    let file = if file.is_relative() { base.join(file) } else { file };
    let ink = loader.load(&file)?;
    Ok(ShapeSample::new(class_id, pipeline.extract(&ink)?))
}

fn parse_feature_line(
    line: &str,
    pipeline: &Pipeline,
    order: &mut ClassOrder,
) -> Result<ShapeSample, ShapeRecError> {
    let (id, features) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| ShapeRecError::InputFormat(format!("expected <class id> <features>, got {line:?}")))?;
    let class_id = parse_class_id(id)?;
    order.accept(class_id)?;
    let features = vector_from_text(features, pipeline.extractor())?;
    Ok(ShapeSample::new(class_id, features))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigReader, PipelineSettings};
    use crate::ink::{JsonInkLoader, Trace, TraceGroup, save_json_ink};

    fn pipeline() -> Pipeline {
        let settings = PipelineSettings {
            trace_dimension: 4,
            ..PipelineSettings::default()
        };
        Pipeline::from_settings(&settings, &ConfigReader::default()).unwrap()
    }

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn malformed_feature_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "train.txt",
            "0 0 0 0 1 0|1 1 0 1 1\n0 nonsense\n\n2 1 1 0 1 1\n",
        );
        let samples =
            read_training_samples(&path, TrainingInput::FeatureFile, &pipeline(), &JsonInkLoader)
                .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].class_id, 2);
    }

    #[test]
    fn out_of_order_ids_abort() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "train.txt", "3 0 0 0 1 0\n1 0 0 0 1 0\n");
        let err =
            read_training_samples(&path, TrainingInput::FeatureFile, &pipeline(), &JsonInkLoader)
                .unwrap_err();
        assert!(matches!(err, ShapeRecError::ShapeId { id: 1, .. }));
    }

    #[test]
    fn negative_ids_abort() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "train.txt", "-1 0 0 0 1 0\n");
        let err =
            read_training_samples(&path, TrainingInput::FeatureFile, &pipeline(), &JsonInkLoader)
                .unwrap_err();
        assert!(matches!(err, ShapeRecError::ShapeId { id: -1, .. }));
    }

    #[test]
    fn ink_list_paths_resolve_against_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let ink = TraceGroup::new(vec![Trace::from_xy(&[(0.0, 0.0), (2.0, 3.0), (4.0, 0.0)])]);
        save_json_ink(&dir.path().join("a.json"), &ink).unwrap();
        let path = write(dir.path(), "list.txt", "a.json 0\nmissing.json 0\na.json 1\n");
        let samples =
            read_training_samples(&path, TrainingInput::InkList, &pipeline(), &JsonInkLoader)
                .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].features.len(), 4);
        let groups = group_by_class(samples);
        assert_eq!(groups.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn empty_file_is_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "train.txt", "\n");
        let err =
            read_training_samples(&path, TrainingInput::FeatureFile, &pipeline(), &JsonInkLoader)
                .unwrap_err();
        assert!(matches!(err, ShapeRecError::EmptyInput(_)));
    }
}
