//! Shared fixtures for training integration tests.

#![allow(dead_code)]

use serde_json::json;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use trainyard_training::{JobRunner, TrainerCommand, TrainingLayout};
use zip::write::SimpleFileOptions;

/// A COCO-style dataset with `images` images of 640x480 and `boxes_per_image` boxes each.
///
/// Annotations alternate between the declared category 1 and the undeclared
/// category 9.
pub fn write_coco_dataset(root: &Path, images: usize, boxes_per_image: usize) {
    let annotations_dir = root.join("annotations");
    let image_dir = root.join("train2017");
    fs::create_dir_all(&annotations_dir).unwrap();
    fs::create_dir_all(&image_dir).unwrap();

    let mut image_records = Vec::new();
    let mut annotation_records = Vec::new();
    for i in 0..images {
        let file_name = format!("{i:012}.jpg");
        fs::write(image_dir.join(&file_name), b"\xff\xd8fake-jpeg").unwrap();
        image_records.push(json!({"id": i, "file_name": file_name, "width": 640, "height": 480}));
        for b in 0..boxes_per_image {
            let category_id = if (i + b) % 2 == 0 { 1 } else { 9 };
            annotation_records.push(json!({
                "id": i * 100 + b,
                "image_id": i,
                "category_id": category_id,
                "bbox": [10.0 * b as f64, 20.0, 64.0, 48.0],
            }));
        }
    }

    let coco = json!({
        "images": image_records,
        "annotations": annotation_records,
        "categories": [{"id": 1, "name": "person"}],
    });
    fs::write(annotations_dir.join("train2017.json"), serde_json::to_vec(&coco).unwrap()).unwrap();
}

/// Zip every `(path, contents)` pair into an in-memory archive.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// An archive already in the canonical layout.
pub fn canonical_archive() -> Vec<u8> {
    zip_bytes(&[
        ("data.yaml", b"path: .\ntrain: images/train\nval: images/val\nnc: 1\nnames: [widget]\n"),
        ("images/train/a.jpg", b"img"),
        ("labels/train/a.txt", b"0 0.5 0.5 0.1 0.1\n"),
    ])
}

/// A shell script run through `/bin/sh` so the test binary never execs a freshly written file.
pub fn fake_trainer(dir: &Path, body: &str) -> TrainerCommand {
    let script = dir.join("fake_trainer.sh");
    fs::write(&script, body).unwrap();
    TrainerCommand::new("/bin/sh", vec![script.to_string_lossy().into_owned()])
}

pub fn runner(base: &Path, trainer: TrainerCommand) -> JobRunner {
    let layout = TrainingLayout::for_base_dir(base);
    layout.ensure_dirs().unwrap();
    JobRunner::new(layout, trainer)
}

/// Poll the job log until it contains `needle`.
pub async fn wait_for_log(runner: &JobRunner, needle: &str) {
    for _ in 0..200 {
        if runner.logs().logs.contains(needle) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("log never contained {needle:?}:\n{}", runner.logs().logs);
}

pub fn checkpoint(layout: &TrainingLayout, job_name: &str) -> PathBuf {
    let weights = layout.weights_dir(job_name);
    fs::create_dir_all(&weights).unwrap();
    let path = weights.join("last.pt");
    fs::write(&path, b"checkpoint").unwrap();
    path
}
