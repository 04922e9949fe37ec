//! YOLOv8-style object detection with ONNX Runtime.

use std::{collections::HashMap, path::Path};

use image::{RgbImage as Rgb8, imageops::FilterType};
use ndarray::{Array4, ArrayViewD, Axis};
use ort::{
    execution_providers::CPUExecutionProvider,
    session::{Session, builder::GraphOptimizationLevel},
    value::Value,
};

use crate::model::{Detection, ModelError, ObjectDetector, RgbImage};

/// Side of the square input the exported model expects.
pub const INPUT_SIZE: u32 = 640;

/// Class names of the COCO dataset, in model output order.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Detects COCO objects with a YOLOv8 ONNX export.
pub struct OnnxDetector {
    session: Session,
    input_name: String,
}

impl OnnxDetector {
    pub fn new(model_path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(format!("detection model not found: {}", model_path.display()).into());
        }

        log::info!("Loading detection model from {}", model_path.display());
        let session = Session::builder()?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        Ok(Self {
            session,
            input_name,
        })
    }
}

impl ObjectDetector for OnnxDetector {
    fn detect(&mut self, image: &RgbImage, threshold: f32) -> Result<Vec<Detection>, ModelError> {
        let input = preprocess(image)?;
        let input = Value::from_array(input)?;

        let outputs = self.session.run(ort::inputs![self.input_name.as_str() => input])?;
        let output = outputs[0].try_extract_array::<f32>()?;

        best_per_label(output.view(), threshold)
    }
}

/// Resizes to the model input and lays the pixels out as NCHW in `[0, 1]`.
fn preprocess(image: &RgbImage) -> Result<Array4<f32>, ModelError> {
    let rgb = Rgb8::from_raw(
        image.width() as u32,
        image.height() as u32,
        image.as_slice().to_vec(),
    )
    .ok_or("image buffer does not match its size")?;
    let resized = image::imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    let side = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
        }
    }
    Ok(tensor)
}

/// Reads a `[1, 4 + classes, anchors]` output and keeps, per label, the most
/// confident anchor at or above `threshold`.
fn best_per_label(output: ArrayViewD<f32>, threshold: f32) -> Result<Vec<Detection>, ModelError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] <= 4 {
        return Err(format!("unexpected detection output shape {shape:?}").into());
    }
    let predictions = output.index_axis(Axis(0), 0);
    let num_classes = shape[1] - 4;

    let mut best: HashMap<usize, f32> = HashMap::new();
    for anchor in predictions.axis_iter(Axis(1)) {
        let Some((class, score)) = (0..num_classes)
            .map(|c| (c, anchor[4 + c]))
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        if score < threshold {
            continue;
        }
        let entry = best.entry(class).or_insert(score);
        *entry = entry.max(score);
    }

    Ok(ranked(best))
}

fn ranked(best: HashMap<usize, f32>) -> Vec<Detection> {
    let mut detections: Vec<Detection> = best
        .into_iter()
        .map(|(class, score)| {
            let label = COCO_LABELS
                .get(class)
                .map(|l| l.to_string())
                .unwrap_or_else(|| format!("class {class}"));
            Detection::new(label, score.clamp(0.0, 1.0))
        })
        .collect();
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn keeps_best_anchor_per_label() {
        // 3 anchors, 2 classes (person, bicycle)
        let mut output = Array3::<f32>::zeros((1, 6, 3));
        output[[0, 4, 0]] = 0.6;
        output[[0, 4, 1]] = 0.9;
        output[[0, 5, 2]] = 0.3;

        let detections = best_per_label(output.into_dyn().view(), 0.5).unwrap();
        assert_eq!(detections, vec![Detection::new("person", 0.9)]);
    }

    #[test]
    fn rejects_unexpected_shapes() {
        let output = Array3::<f32>::zeros((1, 4, 3));
        assert!(best_per_label(output.into_dyn().view(), 0.5).is_err());
    }
}
