//! Read-only access to the per-epoch `results.csv` the trainer appends to.
//!
//! The file is written concurrently by another process, so every read is
//! tolerant: an absent, truncated or malformed file means "not ready yet".

use crate::layout::TrainingLayout;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const EPOCH_COLUMN: &str = "epoch";
pub const BOX_LOSS_COLUMN: &str = "train/box_loss";
pub const CLS_LOSS_COLUMN: &str = "train/cls_loss";
pub const MAP50_COLUMN: &str = "metrics/mAP50(B)";

const LOSS_DECIMALS: i32 = 5;
const MAP_DECIMALS: i32 = 3;

/// Chart data: one entry per epoch in each vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSeries {
    pub epoch: Vec<u32>,
    pub box_loss: Vec<f64>,
    pub map50: Vec<f64>,
}

/// Latest epoch, rounded for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub epoch: u32,
    pub box_loss: f64,
    pub cls_loss: f64,
    pub map50: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct EpochRecord {
    epoch: u32,
    box_loss: f64,
    cls_loss: Option<f64>,
    map50: f64,
}

/// Parsed contents of one metrics file.
#[derive(Debug, Clone, Default)]
pub struct MetricsTable {
    records: Vec<EpochRecord>,
}

impl MetricsTable {
    /// Parse `path`. `None` if the file is missing, unreadable, or lacks a
    /// required column. Rows with unparsable required fields are skipped.
    pub fn load(path: &Path) -> Option<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .ok()?;

        let headers = reader.headers().ok()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);
        let epoch_idx = column(EPOCH_COLUMN)?;
        let box_idx = column(BOX_LOSS_COLUMN)?;
        let map_idx = column(MAP50_COLUMN)?;
        let cls_idx = column(CLS_LOSS_COLUMN);

        let mut records = Vec::new();
        for record in reader.records() {
            let Ok(record) = record else { continue };
            let field = |idx: usize| record.get(idx).and_then(|v| v.parse::<f64>().ok()).filter(|v| v.is_finite());

            let (Some(epoch), Some(box_loss), Some(map50)) = (field(epoch_idx), field(box_idx), field(map_idx))
            else {
                continue;
            };
            if epoch < 0.0 {
                continue;
            }
            records.push(EpochRecord {
                epoch: epoch as u32,
                box_loss,
                cls_loss: cls_idx.and_then(field),
                map50,
            });
        }

        Some(Self { records })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn series(&self) -> MetricsSeries {
        MetricsSeries {
            epoch: self.records.iter().map(|r| r.epoch).collect(),
            box_loss: self.records.iter().map(|r| r.box_loss).collect(),
            map50: self.records.iter().map(|r| r.map50).collect(),
        }
    }

    #[must_use]
    pub fn latest(&self) -> Option<MetricsRow> {
        let last = self.records.last()?;
        Some(MetricsRow {
            epoch: last.epoch,
            box_loss: round_to(last.box_loss, LOSS_DECIMALS),
            cls_loss: round_to(last.cls_loss.unwrap_or(0.0), LOSS_DECIMALS),
            map50: round_to(last.map50, MAP_DECIMALS),
        })
    }

    /// Highest mAP50 reached in any epoch.
    #[must_use]
    pub fn best_map50(&self) -> Option<f64> {
        self.records.iter().map(|r| r.map50).reduce(f64::max)
    }

    /// mAP50 of the final epoch.
    #[must_use]
    pub fn last_map50(&self) -> Option<f64> {
        self.records.last().map(|r| r.map50)
    }
}

/// Looks up metrics files by job name.
#[derive(Debug, Clone)]
pub struct MetricsReader {
    layout: TrainingLayout,
}

impl MetricsReader {
    #[must_use]
    pub fn new(layout: TrainingLayout) -> Self {
        Self { layout }
    }

    /// Full per-epoch series for charting.
    #[must_use]
    pub fn read_series(&self, job_name: &str) -> Option<MetricsSeries> {
        MetricsTable::load(&self.layout.metrics_path(job_name)).map(|t| t.series())
    }

    /// Last completed epoch for the progress bar.
    #[must_use]
    pub fn read_latest(&self, job_name: &str) -> Option<MetricsRow> {
        MetricsTable::load(&self.layout.metrics_path(job_name))?.latest()
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
