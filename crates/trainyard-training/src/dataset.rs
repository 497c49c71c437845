//! Dataset staging and layout normalization.
//!
//! The trainer consumes the canonical layout: a `data.yaml` manifest next to
//! `images/<split>` and `labels/<split>` trees, one label file per image with
//! `class cx cy w h` rows in normalized coordinates. Archives exported from
//! public detection datasets instead ship one COCO annotation file per split
//! (`train2017.json`, `val2017.json`) and shared image pools; those are
//! converted into `yolo_formatted/` under the dataset root.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Canonical manifest file name.
pub const MANIFEST_FILE: &str = "data.yaml";

/// Subfolder that receives a converted dataset.
pub const CONVERTED_DIR: &str = "yolo_formatted";

const TRAIN_ANNOTATIONS: &str = "train2017.json";
const VAL_ANNOTATIONS: &str = "val2017.json";
const TRAIN_IMAGES: &str = "train2017";
const VAL_IMAGES: &str = "val2017";

/// Contents of `data.yaml`. Field order is the order the trainer documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataManifest {
    pub path: String,
    pub train: String,
    pub val: String,
    pub nc: usize,
    pub names: Vec<String>,
}

/// Recognized on-disk dataset layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetLayout {
    /// Already trainable; `manifest` is used as-is.
    Canonical { manifest: PathBuf },
    /// COCO-style per-split annotation files that need conversion.
    Coco(CocoLayout),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CocoLayout {
    pub train_annotations: PathBuf,
    pub train_images: Option<PathBuf>,
    pub val_annotations: Option<PathBuf>,
    pub val_images: Option<PathBuf>,
}

/// Counters collected while converting a COCO dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub images_copied: usize,
    pub images_missing: usize,
    pub boxes_written: usize,
    pub annotations_skipped: usize,
    pub validation_split: bool,
    pub names: Vec<String>,
}

/// Result of [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizedDataset {
    pub manifest_path: PathBuf,
    /// Present only when a conversion ran.
    pub conversion: Option<ConversionReport>,
}

/// Inspect `root` and report which layout it is in, if any.
///
/// Interchange files take precedence over a canonical manifest, so an archive
/// that ships both is converted.
pub fn detect_layout(root: &Path) -> Option<DatasetLayout> {
    let mut train_annotations = None;
    let mut val_annotations = None;
    let mut train_images = None;
    let mut val_images = None;
    let mut manifests: Vec<(usize, PathBuf)> = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy();
        let path = entry.path();
        // A previous conversion's output only counts as a canonical dataset.
        if is_converted_output(root, path) {
            if entry.file_type().is_file() && name == MANIFEST_FILE {
                manifests.push((entry.depth(), path.to_path_buf()));
            }
            continue;
        }
        if entry.file_type().is_dir() {
            match &*name {
                TRAIN_IMAGES if train_images.is_none() => train_images = Some(path.to_path_buf()),
                VAL_IMAGES if val_images.is_none() => val_images = Some(path.to_path_buf()),
                _ => {}
            }
        } else if entry.file_type().is_file() {
            match &*name {
                TRAIN_ANNOTATIONS if train_annotations.is_none() => {
                    train_annotations = Some(path.to_path_buf());
                }
                VAL_ANNOTATIONS if val_annotations.is_none() => val_annotations = Some(path.to_path_buf()),
                MANIFEST_FILE => manifests.push((entry.depth(), path.to_path_buf())),
                _ => {}
            }
        }
    }

    if let Some(train_annotations) = train_annotations {
        return Some(DatasetLayout::Coco(CocoLayout {
            train_annotations,
            train_images,
            val_annotations,
            val_images,
        }));
    }

    manifests.sort();
    manifests
        .into_iter()
        .next()
        .map(|(_, manifest)| DatasetLayout::Canonical { manifest })
}

fn is_converted_output(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root).is_ok_and(|rel| rel.components().any(|c| c.as_os_str() == CONVERTED_DIR))
}

/// Bring the dataset under `root` into the canonical layout and return its manifest.
pub fn normalize(root: &Path) -> TrainingResult<NormalizedDataset> {
    match detect_layout(root) {
        Some(DatasetLayout::Canonical { manifest }) => {
            debug!(manifest = %manifest.display(), "dataset already in canonical layout");
            Ok(NormalizedDataset { manifest_path: manifest, conversion: None })
        }
        Some(DatasetLayout::Coco(coco)) => {
            let (manifest_path, report) = convert_coco(root, &coco)?;
            Ok(NormalizedDataset { manifest_path, conversion: Some(report) })
        }
        None => Err(TrainingError::Format(format!(
            "no recognizable dataset format under {} (expected {TRAIN_ANNOTATIONS} or {MANIFEST_FILE})",
            root.display()
        ))),
    }
}

/// Replace `extract_dir` with the contents of the zip archive at `archive_path`.
///
/// Returns the number of archive entries.
pub fn extract_archive(archive_path: &Path, extract_dir: &Path) -> TrainingResult<usize> {
    if extract_dir.exists() {
        fs::remove_dir_all(extract_dir)?;
    }
    fs::create_dir_all(extract_dir)?;

    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))?;
    let entries = archive.len();
    archive.extract(extract_dir)?;

    info!(
        archive = %archive_path.display(),
        dest = %extract_dir.display(),
        entries,
        "extracted dataset archive"
    );
    Ok(entries)
}

// ---------------------------------------------------------------------------
// COCO conversion
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CocoFile {
    #[serde(default)]
    images: Vec<serde_json::Value>,
    #[serde(default)]
    annotations: Vec<serde_json::Value>,
    #[serde(default)]
    categories: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct CocoImage {
    id: i64,
    file_name: String,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct CocoAnnotation {
    image_id: i64,
    category_id: i64,
    bbox: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct CocoCategory {
    id: i64,
    name: String,
}

/// Category id → dense class index, in first-seen order.
#[derive(Debug, Default)]
struct CategoryMap {
    index: HashMap<i64, usize>,
    names: Vec<String>,
}

impl CategoryMap {
    fn declare(&mut self, id: i64, name: &str) {
        if !self.index.contains_key(&id) {
            self.index.insert(id, self.names.len());
            self.names.push(name.to_string());
        }
    }

    /// Ids that were never declared still get a class so no box is lost.
    fn resolve(&mut self, id: i64) -> usize {
        if let Some(idx) = self.index.get(&id) {
            return *idx;
        }
        let idx = self.names.len();
        warn!(category_id = id, class = idx, "annotation uses undeclared category");
        self.index.insert(id, idx);
        self.names.push(format!("class_{id}"));
        idx
    }
}

fn convert_coco(root: &Path, coco: &CocoLayout) -> TrainingResult<(PathBuf, ConversionReport)> {
    let train_images = coco.train_images.as_deref().ok_or_else(|| {
        TrainingError::Format(format!(
            "found {} but no {TRAIN_IMAGES}/ image directory",
            coco.train_annotations.display()
        ))
    })?;

    info!(root = %root.display(), "converting COCO dataset");

    let output = std::path::absolute(root.join(CONVERTED_DIR))?;
    if output.exists() {
        fs::remove_dir_all(&output)?;
    }
    for split in ["train", "val"] {
        fs::create_dir_all(output.join("images").join(split))?;
        fs::create_dir_all(output.join("labels").join(split))?;
    }

    let mut categories = CategoryMap::default();
    let mut report = ConversionReport::default();

    convert_split(&coco.train_annotations, train_images, &output, "train", &mut categories, &mut report)?;

    match (&coco.val_annotations, &coco.val_images) {
        (Some(annotations), Some(images)) => {
            convert_split(annotations, images, &output, "val", &mut categories, &mut report)?;
            report.validation_split = true;
        }
        _ => warn!(root = %root.display(), "no validation split found; images/val left empty"),
    }

    let manifest = DataManifest {
        path: output.to_string_lossy().into_owned(),
        train: "images/train".to_string(),
        val: "images/val".to_string(),
        nc: categories.names.len(),
        names: categories.names.clone(),
    };
    let manifest_path = output.join(MANIFEST_FILE);
    fs::write(&manifest_path, serde_yaml::to_string(&manifest)?)?;

    report.names = categories.names;
    info!(
        manifest = %manifest_path.display(),
        classes = manifest.nc,
        boxes = report.boxes_written,
        "COCO conversion finished"
    );
    Ok((manifest_path, report))
}

fn convert_split(
    annotations_path: &Path,
    image_pool: &Path,
    output: &Path,
    split: &str,
    categories: &mut CategoryMap,
    report: &mut ConversionReport,
) -> TrainingResult<()> {
    let data: CocoFile = serde_json::from_slice(&fs::read(annotations_path)?)?;

    for raw in data.categories {
        match serde_json::from_value::<CocoCategory>(raw) {
            Ok(cat) => categories.declare(cat.id, &cat.name),
            Err(e) => debug!(error = %e, "skipping malformed category"),
        }
    }

    let images_out = output.join("images").join(split);
    let labels_out = output.join("labels").join(split);

    let mut images: HashMap<i64, CocoImage> = HashMap::new();
    for raw in data.images {
        match serde_json::from_value::<CocoImage>(raw) {
            Ok(image) => {
                images.insert(image.id, image);
            }
            Err(e) => debug!(error = %e, "skipping malformed image record"),
        }
    }

    for image in images.values() {
        let Some(file_name) = Path::new(&image.file_name).file_name() else {
            report.images_missing += 1;
            continue;
        };
        let src = image_pool.join(&image.file_name);
        if !src.is_file() {
            report.images_missing += 1;
            continue;
        }
        fs::copy(&src, images_out.join(file_name))?;
        report.images_copied += 1;
    }

    // Group rows per label file so each file is opened once; order within a file follows the source.
    let mut rows: BTreeMap<PathBuf, String> = BTreeMap::new();
    for raw in data.annotations {
        let Ok(ann) = serde_json::from_value::<CocoAnnotation>(raw) else {
            report.annotations_skipped += 1;
            continue;
        };
        let Some(image) = images.get(&ann.image_id) else {
            report.annotations_skipped += 1;
            continue;
        };
        let Some(line) = normalized_box_line(&ann.bbox, image.width, image.height) else {
            report.annotations_skipped += 1;
            continue;
        };
        let Some(stem) = Path::new(&image.file_name).file_stem() else {
            report.annotations_skipped += 1;
            continue;
        };

        let class = categories.resolve(ann.category_id);
        let label_path = labels_out.join(format!("{}.txt", stem.to_string_lossy()));
        let buf = rows.entry(label_path).or_default();
        buf.push_str(&format!("{class} {line}\n"));
        report.boxes_written += 1;
    }

    for (label_path, content) in rows {
        let mut file = OpenOptions::new().create(true).append(true).open(&label_path)?;
        file.write_all(content.as_bytes())?;
    }

    debug!(split, annotations = %annotations_path.display(), "converted split");
    Ok(())
}

/// `cx cy w h` for a pixel-space `[x, y, w, h]` box.
fn normalized_box_line(bbox: &[f64], width: f64, height: f64) -> Option<String> {
    let [x, y, w, h] = <[f64; 4]>::try_from(bbox).ok()?;
    if !(width > 0.0 && height > 0.0) {
        return None;
    }
    let cx = (x + w / 2.0) / width;
    let cy = (y + h / 2.0) / height;
    Some(format!("{} {} {} {}", cx, cy, w / width, h / height))
}
