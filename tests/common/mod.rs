#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use visiride::core::classifier::{Classifier, FaceDetector, MatchResult};
use visiride::{AppState, Config, DataLayout, MemoryStore, Result, Store};

/// Recognizes whoever is alone in the gallery.
pub struct SoleCandidate;

impl Classifier for SoleCandidate {
    fn classify(&self, probe: &Path, gallery: &Path) -> Result<MatchResult> {
        assert!(probe.exists(), "probe must be written before classification");
        let names: Vec<String> = std::fs::read_dir(gallery)?
            .flatten()
            .filter_map(|e| e.path().file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        match names.as_slice() {
            [only] => Ok(MatchResult::Recognized(only.clone())),
            [] => Ok(MatchResult::NoPersonsFound),
            _ => Ok(MatchResult::UnknownPerson),
        }
    }
}

pub struct Detector(pub bool);

impl FaceDetector for Detector {
    fn contains_face(&self, image_dir: &Path) -> Result<bool> {
        assert!(std::fs::read_dir(image_dir)?.next().is_some());
        Ok(self.0)
    }
}

pub fn photo_base64() -> String {
    let img = RgbImage::from_pixel(24, 16, Rgb([90, 160, 210]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    BASE64.encode(buf.into_inner())
}

pub fn setup_with(config: Config, store: Arc<dyn Store>, face_found: bool) -> (AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    layout.ensure().unwrap();
    let state = AppState::new(
        config,
        layout,
        store,
        Arc::new(SoleCandidate),
        Arc::new(Detector(face_found)),
    );
    (state, tmp)
}

pub fn setup(face_found: bool) -> (AppState, tempfile::TempDir) {
    setup_with(Config::default(), Arc::new(MemoryStore::new()), face_found)
}
