// Domain types shared by the services, the orchestrator and the HTTP layer

use serde::{Deserialize, Serialize};

/// A corner point in image pixel space. The OCR service omits zero coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vertex {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

impl Vertex {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Ordered corner points, clockwise from top-left.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub vertices: Vec<Vertex>,
}

impl BoundingBox {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self { vertices }
    }

    /// Axis-aligned box from (x0, y0) to (x1, y1)
    pub fn from_corners(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self::new(vec![
            Vertex::new(x0, y0),
            Vertex::new(x1, y0),
            Vertex::new(x1, y1),
            Vertex::new(x0, y1),
        ])
    }

    /// First vertex, (0, 0) when the box carries no vertices
    pub fn top_left(&self) -> Vertex {
        self.vertices.first().copied().unwrap_or_default()
    }

    /// Enclosing (min, max) corners, available once a box has a bottom-right vertex
    pub fn extent(&self) -> Option<(Vertex, Vertex)> {
        if self.vertices.len() < 3 {
            return None;
        }
        let min_x = self.vertices.iter().map(|v| v.x).min()?;
        let min_y = self.vertices.iter().map(|v| v.y).min()?;
        let max_x = self.vertices.iter().map(|v| v.x).max()?;
        let max_y = self.vertices.iter().map(|v| v.y).max()?;
        if max_x <= min_x || max_y <= min_y {
            return None;
        }
        Some((Vertex::new(min_x, min_y), Vertex::new(max_x, max_y)))
    }
}

/// Text found by the OCR service, in the source language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    pub bounding_box: BoundingBox,
}

impl TextRegion {
    pub fn new(text: impl Into<String>, bounding_box: BoundingBox) -> Self {
        Self {
            text: text.into(),
            bounding_box,
        }
    }
}

/// Raw OCR result. Element 0 is the full-image aggregate annotation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextDetection {
    pub annotations: Vec<TextRegion>,
}

impl TextDetection {
    pub fn new(annotations: Vec<TextRegion>) -> Self {
        Self { annotations }
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Aggregate text of the whole image, if any
    pub fn full_text(&self) -> Option<&str> {
        self.annotations.first().map(|r| r.text.as_str())
    }

    /// Individual text regions (the aggregate at index 0 is excluded)
    pub fn regions(&self) -> &[TextRegion] {
        self.annotations.get(1..).unwrap_or(&[])
    }
}

/// A region paired with its non-empty translation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedRegion {
    pub region: TextRegion,
    pub translated_text: String,
}

/// Product image as listed by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: u64,
    #[serde(default)]
    pub product_id: Option<u64>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub alt: Option<String>,
}

/// Product as listed by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
}

/// Replacement image to attach to a product
#[derive(Debug, Clone)]
pub struct NewImage {
    pub jpeg: Vec<u8>,
    pub position: Option<u32>,
    pub alt: Option<String>,
    pub filename: Option<String>,
}

/// Step of the per-image flow that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Render,
    Upload,
}

/// Per-image failure recorded in a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedEntry {
    pub product_id: u64,
    pub image_id: u64,
    pub image_src: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Why an image was left untouched without counting as a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingSource,
    NoText,
    NothingTranslated,
}

/// Outcome of processing one product image
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Replaced,
    Skipped(SkipReason),
    Failed(FailedEntry),
}

/// Accumulated result of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunResult {
    pub products: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<FailedEntry>,
}

impl RunResult {
    pub fn record(&mut self, outcome: ImageOutcome) {
        match outcome {
            ImageOutcome::Replaced => self.succeeded += 1,
            ImageOutcome::Skipped(_) => self.skipped += 1,
            ImageOutcome::Failed(entry) => self.failed.push(entry),
        }
    }
}

/// JSON body returned by the batch endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: &'static str,
    pub updated_images: usize,
    pub skipped_images: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_updates: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_logs: Option<Vec<FailedEntry>>,
}

impl RunSummary {
    pub fn from_run(result: &RunResult) -> Self {
        let status = if result.products == 0 {
            "no products found"
        } else {
            "done"
        };
        let failed = (!result.failed.is_empty()).then(|| result.failed.clone());
        Self {
            status,
            updated_images: result.succeeded,
            skipped_images: result.skipped,
            failed_updates: failed.as_ref().map(Vec::len),
            failed_logs: failed,
        }
    }
}
