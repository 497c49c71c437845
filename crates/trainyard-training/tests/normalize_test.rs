//! Dataset normalization against realistic archive layouts.

mod common;

use common::write_coco_dataset;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use trainyard_training::dataset::{CONVERTED_DIR, MANIFEST_FILE};
use trainyard_training::{DataManifest, DatasetLayout, detect_layout, normalize};

fn label_lines(labels_dir: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in fs::read_dir(labels_dir).unwrap() {
        let content = fs::read_to_string(entry.unwrap().path()).unwrap();
        lines.extend(content.lines().map(str::to_string));
    }
    lines.sort();
    lines
}

#[test]
fn test_coco_conversion_writes_one_line_per_annotation() {
    let temp = TempDir::new().unwrap();
    write_coco_dataset(temp.path(), 10, 3);

    let normalized = normalize(temp.path()).unwrap();
    let report = normalized.conversion.expect("conversion report");
    assert_eq!(report.boxes_written, 30);
    assert_eq!(report.images_copied, 10);
    assert_eq!(report.images_missing, 0);
    assert!(!report.validation_split);

    let output = temp.path().join(CONVERTED_DIR);
    let lines = label_lines(&output.join("labels/train"));
    assert_eq!(lines.len(), 30);
    for line in &lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(fields.len(), 5, "bad row {line}");
        fields[0].parse::<usize>().unwrap();
        for coord in &fields[1..] {
            let v: f64 = coord.parse().unwrap();
            assert!((0.0..=1.0).contains(&v), "coordinate out of range in {line}");
        }
    }
    assert_eq!(fs::read_dir(output.join("images/train")).unwrap().count(), 10);
    assert!(output.join("images/val").is_dir());
}

#[test]
fn test_undeclared_categories_extend_the_manifest() {
    let temp = TempDir::new().unwrap();
    write_coco_dataset(temp.path(), 10, 2);

    let normalized = normalize(temp.path()).unwrap();
    let manifest: DataManifest = serde_yaml::from_str(&fs::read_to_string(&normalized.manifest_path).unwrap()).unwrap();

    assert_eq!(manifest.nc, 2);
    assert_eq!(manifest.names, vec!["person".to_string(), "class_9".to_string()]);
    assert_eq!(manifest.train, "images/train");
    assert_eq!(manifest.val, "images/val");
    assert!(Path::new(&manifest.path).is_absolute());
    assert!(manifest.path.ends_with(CONVERTED_DIR));
}

#[test]
fn test_missing_images_are_counted_not_fatal() {
    let temp = TempDir::new().unwrap();
    write_coco_dataset(temp.path(), 4, 1);
    fs::remove_file(temp.path().join("train2017/000000000002.jpg")).unwrap();

    let report = normalize(temp.path()).unwrap().conversion.unwrap();
    assert_eq!(report.images_copied, 3);
    assert_eq!(report.images_missing, 1);
    assert_eq!(report.boxes_written, 4);
}

#[test]
fn test_reconversion_does_not_duplicate_labels() {
    let temp = TempDir::new().unwrap();
    write_coco_dataset(temp.path(), 5, 2);

    normalize(temp.path()).unwrap();
    let first = label_lines(&temp.path().join(CONVERTED_DIR).join("labels/train"));
    normalize(temp.path()).unwrap();
    let second = label_lines(&temp.path().join(CONVERTED_DIR).join("labels/train"));

    assert_eq!(first.len(), 10);
    assert_eq!(first, second);
}

#[test]
fn test_canonical_dataset_is_left_untouched() {
    let temp = TempDir::new().unwrap();
    let nested = temp.path().join("my_dataset");
    fs::create_dir_all(nested.join("labels/train")).unwrap();
    let manifest_body = "path: .\ntrain: images/train\nval: images/val\nnc: 1\nnames: [widget]\n";
    fs::write(nested.join(MANIFEST_FILE), manifest_body).unwrap();
    fs::write(nested.join("labels/train/a.txt"), "0 0.5 0.5 0.1 0.1\n").unwrap();

    assert_eq!(
        detect_layout(temp.path()),
        Some(DatasetLayout::Canonical { manifest: nested.join(MANIFEST_FILE) })
    );

    for _ in 0..2 {
        let normalized = normalize(temp.path()).unwrap();
        assert!(normalized.conversion.is_none());
        assert_eq!(normalized.manifest_path, nested.join(MANIFEST_FILE));
    }
    assert_eq!(fs::read_to_string(nested.join(MANIFEST_FILE)).unwrap(), manifest_body);
    assert!(!temp.path().join(CONVERTED_DIR).exists());
}

#[test]
fn test_coco_without_image_pool_is_a_format_error() {
    let temp = TempDir::new().unwrap();
    write_coco_dataset(temp.path(), 2, 1);
    fs::remove_dir_all(temp.path().join("train2017")).unwrap();

    let err = normalize(temp.path()).unwrap_err();
    assert!(matches!(err, trainyard_training::TrainingError::Format(_)));
}

/// Adds `val2017.json` and `val2017/` next to the training split.
///
/// Category 9 is only used (never declared) by the training split, while the
/// validation split declares it under another name and adds category 12.
fn write_validation_split(root: &Path) {
    let image_dir = root.join("val2017");
    fs::create_dir_all(&image_dir).unwrap();
    for name in ["v0.jpg", "v1.jpg"] {
        fs::write(image_dir.join(name), b"\xff\xd8fake-jpeg").unwrap();
    }
    let coco = json!({
        "images": [
            {"id": 0, "file_name": "v0.jpg", "width": 100, "height": 100},
            {"id": 1, "file_name": "v1.jpg", "width": 100, "height": 100},
        ],
        "annotations": [
            {"id": 1, "image_id": 0, "category_id": 9, "bbox": [0.0, 0.0, 50.0, 50.0]},
            {"id": 2, "image_id": 1, "category_id": 12, "bbox": [10.0, 10.0, 20.0, 20.0]},
            {"id": 3, "image_id": 1, "category_id": 1, "bbox": [50.0, 50.0, 40.0, 40.0]},
        ],
        "categories": [{"id": 1, "name": "person"}, {"id": 9, "name": "truck"}, {"id": 12, "name": "forklift"}],
    });
    fs::write(root.join("annotations/val2017.json"), serde_json::to_vec(&coco).unwrap()).unwrap();
}

fn class_of(line: &str) -> &str {
    line.split_whitespace().next().unwrap()
}

#[test]
fn test_validation_split_shares_the_category_map() {
    let temp = TempDir::new().unwrap();
    write_coco_dataset(temp.path(), 2, 1);
    write_validation_split(temp.path());

    let normalized = normalize(temp.path()).unwrap();
    let report = normalized.conversion.unwrap();
    assert!(report.validation_split);
    assert_eq!(report.boxes_written, 5);
    assert_eq!(report.names, vec!["person", "class_9", "forklift"]);

    let output = temp.path().join(CONVERTED_DIR);
    let train = label_lines(&output.join("labels/train"));
    assert_eq!(train.iter().map(|l| class_of(l)).collect::<Vec<_>>(), vec!["0", "1"]);

    assert_eq!(fs::read_dir(output.join("images/val")).unwrap().count(), 2);
    let v0 = fs::read_to_string(output.join("labels/val/v0.txt")).unwrap();
    assert_eq!(v0.lines().map(class_of).collect::<Vec<_>>(), vec!["1"]);
    assert_eq!(v0.lines().next().unwrap(), "1 0.25 0.25 0.5 0.5");
    let v1 = fs::read_to_string(output.join("labels/val/v1.txt")).unwrap();
    assert_eq!(v1.lines().map(class_of).collect::<Vec<_>>(), vec!["2", "0"]);

    let manifest: DataManifest = serde_yaml::from_str(&fs::read_to_string(&normalized.manifest_path).unwrap()).unwrap();
    assert_eq!(manifest.nc, 3);
    assert_eq!(manifest.names, report.names);
}

#[test]
fn test_validation_split_needs_both_annotations_and_images() {
    let temp = TempDir::new().unwrap();
    write_coco_dataset(temp.path(), 2, 1);
    write_validation_split(temp.path());
    fs::remove_dir_all(temp.path().join("val2017")).unwrap();

    let report = normalize(temp.path()).unwrap().conversion.unwrap();
    assert!(!report.validation_split);
    assert_eq!(report.boxes_written, 2);
    assert_eq!(fs::read_dir(temp.path().join(CONVERTED_DIR).join("labels/val")).unwrap().count(), 0);
}

#[test]
fn test_previously_converted_upload_is_canonical() {
    let temp = TempDir::new().unwrap();
    let converted = temp.path().join(CONVERTED_DIR);
    fs::create_dir_all(converted.join("images/train")).unwrap();
    fs::create_dir_all(converted.join("labels/train")).unwrap();
    fs::write(converted.join(MANIFEST_FILE), "path: .\ntrain: images/train\nval: images/val\nnc: 1\nnames: [person]\n")
        .unwrap();

    assert_eq!(
        detect_layout(temp.path()),
        Some(DatasetLayout::Canonical { manifest: converted.join(MANIFEST_FILE) })
    );
    let normalized = normalize(temp.path()).unwrap();
    assert!(normalized.conversion.is_none());
    assert_eq!(normalized.manifest_path, converted.join(MANIFEST_FILE));
}
