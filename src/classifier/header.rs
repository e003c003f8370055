//! Model file header: named fields recording how a model was produced.

use std::collections::BTreeMap;

use semver::Version;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::ShapeRecError;
use crate::config::{FileMode, ProjectSettings};
use crate::registry::Pipeline;

/// Header value that never participates in validation.
pub const NOT_APPLICABLE: &str = "NA";

pub const FE_NAME: &str = "FE_NAME";
pub const FE_VER: &str = "FE_VER";
pub const PREPROC_SEQ: &str = "PREPROC_SEQ";
pub const TRACE_DIM: &str = "TRACE_DIM";
pub const PRESER_ASP_RATIO: &str = "PRESER_ASP_RATIO";
pub const PRESER_REL_Y_POS: &str = "PRESER_REL_Y_POS";
pub const ASP_RATIO_THRES: &str = "ASP_RATIO_THRES";
pub const DOT_SIZE_THRES: &str = "DOT_SIZE_THRES";
pub const DOT_THRES: &str = "DOT_THRES";
pub const RESAMP_POINT_ALLOC: &str = "RESAMP_POINT_ALLOC";
pub const SMOOTH_WIND_SIZE: &str = "SMOOTH_WIND_SIZE";
pub const MDT_OPEN_MODE: &str = "MDT_OPEN_MODE";
pub const ALGO_NAME: &str = "ALGO_NAME";
pub const ALGO_VER: &str = "ALGO_VER";
pub const NUMSHAPES: &str = "NUMSHAPES";
pub const PROJECT_TYPE: &str = "PROJECT_TYPE";
pub const COMMENT: &str = "COMMENT";
pub const DATASET: &str = "DATASET";
pub const CREATETIME: &str = "CREATETIME";
pub const CKS: &str = "CKS";
pub const HEADERLEN: &str = "HEADERLEN";

/// Fields compared against the live configuration on every load.
const VALIDATED_KEYS: &[&str] = &[
    FE_NAME,
    FE_VER,
    PREPROC_SEQ,
    TRACE_DIM,
    PRESER_ASP_RATIO,
    PRESER_REL_Y_POS,
    ASP_RATIO_THRES,
    DOT_SIZE_THRES,
    DOT_THRES,
    RESAMP_POINT_ALLOC,
    SMOOTH_WIND_SIZE,
    ALGO_NAME,
    NUMSHAPES,
    PROJECT_TYPE,
];

/// Fields every model file must carry.
const MANDATORY_KEYS: &[&str] = &[
    FE_NAME,
    FE_VER,
    PREPROC_SEQ,
    TRACE_DIM,
    MDT_OPEN_MODE,
    ALGO_NAME,
    ALGO_VER,
];

/// Ordered `KEY=VALUE` header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelHeader {
    fields: BTreeMap<String, String>,
}

impl ModelHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header describing a model produced by `pipeline` under the current configuration.
    pub fn for_pipeline(
        pipeline: &Pipeline,
        project: &ProjectSettings,
        algorithm: &str,
        version: &str,
        mode: FileMode,
    ) -> Self {
        let thresholds = pipeline.thresholds();
        let mut header = Self::new();
        header.set(FE_NAME, pipeline.extractor().name());
        header.set(FE_VER, pipeline.extractor().version());
        header.set(PREPROC_SEQ, pipeline.sequence_signature());
        header.set(TRACE_DIM, pipeline.trace_dimension().to_string());
        header.set(PRESER_ASP_RATIO, thresholds.preserve_aspect_ratio.to_string());
        header.set(
            PRESER_REL_Y_POS,
            thresholds.preserve_relative_y_position.to_string(),
        );
        header.set(ASP_RATIO_THRES, thresholds.aspect_ratio_threshold.to_string());
        header.set(DOT_SIZE_THRES, thresholds.size_threshold.to_string());
        header.set(DOT_THRES, thresholds.dot_threshold.to_string());
        header.set(RESAMP_POINT_ALLOC, thresholds.resampling_allocation);
        header.set(SMOOTH_WIND_SIZE, thresholds.smoothing_window.to_string());
        header.set(MDT_OPEN_MODE, mode.as_str());
        header.set(ALGO_NAME, algorithm);
        header.set(ALGO_VER, version);
        header.set(
            NUMSHAPES,
            project
                .fixed_shape_count()
                .map_or_else(|| "Dynamic".to_string(), |count| count.to_string()),
        );
        header.set(PROJECT_TYPE, project.project_type.clone());
        header
    }

    /// Add the descriptive fields written at train time.
    pub fn with_metadata(mut self, comment: &str, dataset: &str) -> Self {
        self.set(COMMENT, single_line(comment));
        self.set(DATASET, single_line(dataset));
        let created = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| NOT_APPLICABLE.to_string());
        self.set(CREATETIME, created);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Body encoding recorded in the header.
    pub fn file_mode(&self) -> Option<FileMode> {
        self.get(MDT_OPEN_MODE).and_then(FileMode::parse)
    }

    pub fn missing_mandatory(&self) -> Option<&'static str> {
        MANDATORY_KEYS
            .iter()
            .copied()
            .find(|key| self.get(key).is_none())
    }

    /// Compare this stored header with the one the live configuration would write.
    ///
    /// Fields holding [`NOT_APPLICABLE`] on either side are skipped. Numeric
    /// fields compare by value so `3` and `3.0` agree.
    pub fn validate_against(&self, expected: &ModelHeader) -> Result<(), ShapeRecError> {
        for key in VALIDATED_KEYS {
            let Some(wanted) = expected.get(key) else {
                continue;
            };
            let stored = self.get(key).unwrap_or(NOT_APPLICABLE);
            if stored == NOT_APPLICABLE || wanted == NOT_APPLICABLE {
                continue;
            }
            if !values_agree(stored, wanted) {
                return Err(ShapeRecError::ModelMismatch {
                    key: (*key).to_string(),
                    stored: stored.to_string(),
                    expected: wanted.to_string(),
                });
            }
        }
        if let (Some(stored), Some(supported)) = (self.get(ALGO_VER), expected.get(ALGO_VER)) {
            check_version(stored, supported)?;
        }
        Ok(())
    }
}

fn values_agree(stored: &str, expected: &str) -> bool {
    if stored.eq_ignore_ascii_case(expected) {
        return true;
    }
    match (stored.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0),
        _ => false,
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// A stored model is readable when its major version matches and it is not
/// newer than the supported version.
pub fn check_version(stored: &str, supported: &str) -> Result<(), ShapeRecError> {
    let version_error = || ShapeRecError::Version {
        stored: stored.to_string(),
        supported: supported.to_string(),
    };
    let stored_version = Version::parse(stored.trim()).map_err(|_| version_error())?;
    let supported_version = Version::parse(supported.trim()).map_err(|_| version_error())?;
    if stored_version.major != supported_version.major || stored_version > supported_version {
        return Err(version_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(pairs: &[(&str, &str)]) -> ModelHeader {
        let mut header = ModelHeader::new();
        for (k, v) in pairs {
            header.set(k, *v);
        }
        header
    }

    #[test]
    fn trace_dimension_mismatch_is_reported() {
        let stored = header(&[(TRACE_DIM, "12"), (FE_NAME, "pf")]);
        let live = header(&[(TRACE_DIM, "8"), (FE_NAME, "pf")]);
        let err = stored.validate_against(&live).unwrap_err();
        match err {
            ShapeRecError::ModelMismatch { key, stored, expected } => {
                assert_eq!(key, TRACE_DIM);
                assert_eq!(stored, "12");
                assert_eq!(expected, "8");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn not_applicable_fields_are_skipped() {
        let stored = header(&[(DOT_THRES, NOT_APPLICABLE), (ASP_RATIO_THRES, "3")]);
        let live = header(&[(DOT_THRES, "0.01"), (ASP_RATIO_THRES, "3.0")]);
        assert!(stored.validate_against(&live).is_ok());
    }

    #[test]
    fn version_rules() {
        assert!(check_version("1.0.0", "1.2.0").is_ok());
        assert!(check_version("1.3.0", "1.2.0").is_err());
        assert!(check_version("2.0.0", "1.2.0").is_err());
        assert!(matches!(
            check_version("garbage", "1.0.0"),
            Err(ShapeRecError::Version { .. })
        ));
    }

    #[test]
    fn metadata_is_flattened_to_one_line() {
        let header = ModelHeader::new().with_metadata("two\nlines", "set");
        assert_eq!(header.get(COMMENT), Some("two lines"));
        assert!(header.get(CREATETIME).is_some());
    }
}
