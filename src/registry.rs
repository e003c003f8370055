//! Static registry of preprocessing and feature-extraction collaborators.
//!
//! Collaborators are chosen by name at classifier construction time and owned
//! by the resulting [`Pipeline`]; dropping the pipeline releases them.

use crate::classifier::ShapeRecError;
use crate::config::{ConfigError, ConfigReader, PipelineSettings};
use crate::features::{FeatureExtractor, FeatureVector, PointFloatExtractor};
use crate::ink::{DeviceContext, TraceGroup};
use crate::preprocess::{BasicPreprocessor, PreprocThresholds, Preprocessor};

type PreprocessorFactory = fn(&PipelineSettings) -> Box<dyn Preprocessor>;
type ExtractorFactory = fn(&ConfigReader) -> Result<Box<dyn FeatureExtractor>, ShapeRecError>;

/// Key read by the point-float extractor factory.
pub const DIRECTION_STEP_KEY: &str = "point_float.direction_step";

const PREPROCESSORS: &[(&str, PreprocessorFactory)] = &[
    ("CommonPreProc", basic_preprocessor),
    ("basic", basic_preprocessor),
];

const EXTRACTORS: &[(&str, ExtractorFactory)] = &[
    ("PointFloatShapeFeatureExtractor", point_float_extractor),
    ("point-float", point_float_extractor),
];

fn basic_preprocessor(settings: &PipelineSettings) -> Box<dyn Preprocessor> {
    Box::new(BasicPreprocessor::new(settings))
}

fn point_float_extractor(reader: &ConfigReader) -> Result<Box<dyn FeatureExtractor>, ShapeRecError> {
    let step = match reader.get_value(DIRECTION_STEP_KEY) {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|step| *step > 0)
            .ok_or_else(|| {
                ConfigError::invalid(DIRECTION_STEP_KEY, format!("expected a positive integer, got {raw:?}"))
            })?,
        None => 1,
    };
    Ok(Box::new(PointFloatExtractor::new(step)))
}

/// Registered preprocessor names.
pub fn preprocessor_names() -> impl Iterator<Item = &'static str> {
    PREPROCESSORS.iter().map(|(name, _)| *name)
}

/// Registered feature extractor names.
pub fn feature_extractor_names() -> impl Iterator<Item = &'static str> {
    EXTRACTORS.iter().map(|(name, _)| *name)
}

pub fn create_preprocessor(
    settings: &PipelineSettings,
) -> Result<Box<dyn Preprocessor>, ShapeRecError> {
    PREPROCESSORS
        .iter()
        .find(|(name, _)| *name == settings.preprocessor)
        .map(|(_, factory)| factory(settings))
        .ok_or_else(|| {
            ShapeRecError::Resource(format!("Unknown preprocessor {:?}", settings.preprocessor))
        })
}

pub fn create_feature_extractor(
    name: &str,
    reader: &ConfigReader,
) -> Result<Box<dyn FeatureExtractor>, ShapeRecError> {
    let (_, factory) = EXTRACTORS
        .iter()
        .find(|(registered, _)| *registered == name)
        .ok_or_else(|| ShapeRecError::Resource(format!("Unknown feature extractor {name:?}")))?;
    factory(reader)
}

/// Preprocessor, feature extractor and the step sequence joining them.
pub struct Pipeline {
    preprocessor: Box<dyn Preprocessor>,
    extractor: Box<dyn FeatureExtractor>,
    sequence: Vec<String>,
}

impl Pipeline {
    pub fn from_settings(
        settings: &PipelineSettings,
        reader: &ConfigReader,
    ) -> Result<Self, ShapeRecError> {
        let preprocessor = create_preprocessor(settings)?;
        let extractor = create_feature_extractor(&settings.feature_extractor, reader)?;
        tracing::debug!(
            "Pipeline uses {} and {} {}",
            settings.preprocessor,
            extractor.name(),
            extractor.version()
        );
        Ok(Self {
            preprocessor,
            extractor,
            sequence: settings.preprocessing_sequence.clone(),
        })
    }

    pub fn new(
        preprocessor: Box<dyn Preprocessor>,
        extractor: Box<dyn FeatureExtractor>,
        sequence: Vec<String>,
    ) -> Self {
        Self {
            preprocessor,
            extractor,
            sequence,
        }
    }

    pub fn preprocess(&self, ink: &TraceGroup) -> Result<TraceGroup, ShapeRecError> {
        let mut current = ink.clone();
        for step in &self.sequence {
            current = self.preprocessor.apply_named_step(step, &current)?;
        }
        Ok(current)
    }

    /// Preprocess then extract features.
    pub fn extract(&self, ink: &TraceGroup) -> Result<FeatureVector, ShapeRecError> {
        if ink.is_empty() {
            return Err(ShapeRecError::EmptyInput("trace group has no points".to_string()));
        }
        let processed = self.preprocess(ink)?;
        self.extractor.extract_features(&processed)
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor {
        self.extractor.as_ref()
    }

    pub fn trace_dimension(&self) -> usize {
        self.preprocessor.trace_dimension()
    }

    pub fn thresholds(&self) -> PreprocThresholds {
        self.preprocessor.thresholds()
    }

    /// Sequence signature stored in model headers.
    pub fn sequence_signature(&self) -> String {
        format!("{{{}}}", self.sequence.join(","))
    }

    pub fn set_device_context(&mut self, context: &DeviceContext) {
        self.preprocessor.set_device_context(context);
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("extractor", &self.extractor.name())
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::Trace;

    #[test]
    fn default_settings_resolve_registered_collaborators() {
        let pipeline =
            Pipeline::from_settings(&PipelineSettings::default(), &ConfigReader::default()).unwrap();
        assert_eq!(pipeline.trace_dimension(), 60);
        assert_eq!(
            pipeline.sequence_signature(),
            "{CommonPreProc::normalizeSize,CommonPreProc::resampleTraceGroup,CommonPreProc::normalizeSize}"
        );
        let ink = TraceGroup::new(vec![Trace::from_xy(&[(0.0, 0.0), (4.0, 4.0)])]);
        assert_eq!(pipeline.extract(&ink).unwrap().len(), 60);
    }

    #[test]
    fn unknown_names_are_resource_errors() {
        let settings = PipelineSettings {
            feature_extractor: "L7".to_string(),
            ..PipelineSettings::default()
        };
        let err = Pipeline::from_settings(&settings, &ConfigReader::default()).unwrap_err();
        assert!(matches!(err, ShapeRecError::Resource(_)));
        assert!(preprocessor_names().any(|name| name == "CommonPreProc"));
        assert!(feature_extractor_names().count() >= 1);
    }

    #[test]
    fn extractor_options_come_from_the_config_reader() {
        let reader = ConfigReader::from_toml_str("[point_float]\ndirection_step = 3\n").unwrap();
        let pipeline = Pipeline::from_settings(&PipelineSettings::default(), &reader).unwrap();
        let ink = TraceGroup::new(vec![Trace::from_xy(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (2.0, 2.0),
        ])]);
        let raw = pipeline.preprocess(&ink).unwrap();
        let features = pipeline.extractor().extract_features(&raw).unwrap();
        let expected = PointFloatExtractor::new(3).extract_features(&raw).unwrap();
        let unstepped = PointFloatExtractor::default().extract_features(&raw).unwrap();
        assert_eq!(crate::features::flatten(&features), crate::features::flatten(&expected));
        assert_ne!(crate::features::flatten(&features), crate::features::flatten(&unstepped));

        let reader = ConfigReader::from_toml_str("[point_float]\ndirection_step = 0\n").unwrap();
        let err = Pipeline::from_settings(&PipelineSettings::default(), &reader).unwrap_err();
        assert!(matches!(err, ShapeRecError::Config(ConfigError::Invalid { .. })));
    }
}
