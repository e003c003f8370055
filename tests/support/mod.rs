#![allow(dead_code)]

use std::path::{Path, PathBuf};

use shaperec::ink::{Trace, TraceGroup, save_json_ink};
use tempfile::TempDir;

pub const PROJECT: &str = "demo";
pub const PROFILE: &str = "default";

/// A toolkit root in a temp dir with one project and one profile.
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    /// `num_shapes` is written verbatim, e.g. `"\"dynamic\""` or `3`.
    pub fn new(num_shapes: &str) -> Self {
        let dir = tempfile::tempdir().expect("create toolkit root");
        let fixture = Self { dir };
        let config = fixture.root().join("projects").join(PROJECT).join("config");
        std::fs::create_dir_all(config.join(PROFILE)).expect("create profile dir");
        std::fs::write(
            config.join("project.toml"),
            format!("num_shapes = {num_shapes}\n"),
        )
        .expect("write project.toml");
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.root()
            .join("projects")
            .join(PROJECT)
            .join("config")
            .join(PROFILE)
    }

    /// Write `nn.toml` or `mlp.toml` into the profile.
    pub fn write_profile_config(&self, file_name: &str, text: &str) {
        std::fs::write(self.profile_dir().join(file_name), text).expect("write profile config");
    }

    /// Save each sample as JSON ink and list them as `<file> <class id>`.
    pub fn write_ink_list(&self, name: &str, samples: &[(u32, TraceGroup)]) -> PathBuf {
        let ink_dir = self.root().join(format!("{name}-ink"));
        std::fs::create_dir_all(&ink_dir).expect("create ink dir");
        let mut list = String::from("# ink file, class id\n");
        for (idx, (class_id, ink)) in samples.iter().enumerate() {
            let file = ink_dir.join(format!("{class_id}_{idx}.json"));
            save_json_ink(&file, ink).expect("save ink");
            list.push_str(&format!("{name}-ink/{class_id}_{idx}.json {class_id}\n"));
        }
        let path = self.root().join(format!("{name}.lst"));
        std::fs::write(&path, list).expect("write ink list");
        path
    }
}

/// Straight stroke from the origin at `angle` degrees, slightly bent by `jitter`.
pub fn line(angle: f32, jitter: f32) -> TraceGroup {
    let (sin, cos) = angle.to_radians().sin_cos();
    let points: Vec<(f32, f32)> = (0..20)
        .map(|i| {
            let t = i as f32 * 5.0;
            let bend = jitter * (i as f32 * 0.7).sin();
            (t * cos - bend * sin, t * sin + bend * cos)
        })
        .collect();
    TraceGroup::new(vec![Trace::from_xy(&points)])
}

/// Two strokes forming a `V`, spread by `jitter`.
pub fn vee(jitter: f32) -> TraceGroup {
    let left: Vec<(f32, f32)> = (0..10)
        .map(|i| (i as f32 * 5.0, 100.0 - i as f32 * (10.0 + jitter)))
        .collect();
    let right: Vec<(f32, f32)> = (0..10)
        .map(|i| (50.0 + i as f32 * 5.0, i as f32 * (10.0 - jitter)))
        .collect();
    TraceGroup::new(vec![Trace::from_xy(&left), Trace::from_xy(&right)])
}

/// Three jittered copies each of a horizontal line (0), a vertical line (1)
/// and a V (2).
pub fn three_shape_samples() -> Vec<(u32, TraceGroup)> {
    let mut samples = Vec::new();
    for jitter in [0.0, 0.5, 1.0] {
        samples.push((0, line(0.0, jitter)));
    }
    for jitter in [0.0, 0.5, 1.0] {
        samples.push((1, line(90.0, jitter)));
    }
    for jitter in [0.0, 0.5, 1.0] {
        samples.push((2, vee(jitter)));
    }
    samples
}
