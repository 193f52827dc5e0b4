use anyhow::{Context, Error};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array, Array3, Axis, IxDyn};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;

use crate::config::config::FaceDetectionConfig;
use crate::modules::FaceDetector;
use crate::utils::coordinate::FaceBox;

/// ONNX face detection client for YOLOv8-face style models.
///
/// The session is built once at startup and serialized behind a mutex so the
/// client can be shared read-only across concurrent verification calls.
pub struct FaceDetectionClient {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_size: u32,
    score_threshold: f32,
    iou_threshold: f32,
    mean: f32,
    scale: f32,
}

impl FaceDetectionClient {
    pub fn new(config: FaceDetectionConfig) -> Result<Self, Error> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.model_path)
            .with_context(|| {
                format!(
                    "face_detection_client - cannot load detection model from {}",
                    config.model_path.display()
                )
            })?;
        let input_name = session.inputs[0].name.clone();
        let output_name = session.outputs[0].name.clone();

        Ok(FaceDetectionClient {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_size: config.input_size,
            score_threshold: config.score_threshold,
            iou_threshold: config.iou_threshold,
            mean: config.mean,
            scale: config.scale,
        })
    }

    /// preprocess letterboxes the image onto a square model canvas and returns
    /// the NCHW input tensor together with the factor that maps model-canvas
    /// coordinates back to source-image coordinates.
    fn preprocess(&self, img: &RgbImage) -> (Array<f32, IxDyn>, f32) {
        let size = self.input_size;
        let ratio = letterbox_ratio(img.width(), img.height(), size);
        let new_w = ((img.width() as f32 * ratio) as u32).clamp(1, size);
        let new_h = ((img.height() as f32 * ratio) as u32).clamp(1, size);

        let resized = imageops::resize(img, new_w, new_h, FilterType::Triangle);
        let mut canvas = RgbImage::new(size, size);
        imageops::replace(&mut canvas, &resized, 0, 0);

        let mut im_tensor = Array3::<f32>::zeros((size as usize, size as usize, 3usize));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                im_tensor[[y as usize, x as usize, c]] = (pixel[c] as f32 - self.mean) * self.scale;
            }
        }

        let transposed_tensor = im_tensor.permuted_axes([2, 0, 1]);
        (transposed_tensor.insert_axis(Axis(0)).into_dyn(), 1.0 / ratio)
    }
}

impl FaceDetector for FaceDetectionClient {
    fn detect(&self, img: &RgbImage) -> Result<Vec<FaceBox>, Error> {
        let (input_tensor, scale_back) = self.preprocess(img);
        let input_value = Value::from_array(input_tensor)?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_value])?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| Error::msg("face_detection_client - no detection output tensor"))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.as_ref().iter().map(|&d| d as usize).collect();

        let candidates = decode_predictions(
            &dims,
            data,
            scale_back,
            img.width(),
            img.height(),
            self.score_threshold,
        )?;
        Ok(nms(candidates, self.iou_threshold))
    }
}

/// letterbox_ratio is the factor that fits the longest source side into the
/// square model canvas.
pub(crate) fn letterbox_ratio(img_w: u32, img_h: u32, input_size: u32) -> f32 {
    let longest_side = img_w.max(img_h).max(1);
    input_size as f32 / longest_side as f32
}

/// decode_predictions decodes `[1, 5, N]` (cx, cy, w, h, score) output into
/// score-filtered corner boxes in source-image coordinates.
pub(crate) fn decode_predictions(
    dims: &[usize],
    data: &[f32],
    scale_back: f32,
    img_w: u32,
    img_h: u32,
    score_threshold: f32,
) -> Result<Vec<FaceBox>, Error> {
    if dims.len() != 3 || dims[1] < 5 {
        return Err(Error::msg(format!(
            "face_detection_client - unexpected detector output shape {dims:?}"
        )));
    }
    let num_predictions = dims[2];
    let at = |channel: usize, idx: usize| data[channel * num_predictions + idx];

    let mut candidates: Vec<FaceBox> = Vec::new();
    for i in 0..num_predictions {
        let score = at(4, i);
        if score < score_threshold {
            continue;
        }
        let cx = at(0, i);
        let cy = at(1, i);
        let w = at(2, i);
        let h = at(3, i);

        let bbox = FaceBox {
            x1: (cx - w / 2.0) * scale_back,
            y1: (cy - h / 2.0) * scale_back,
            x2: (cx + w / 2.0) * scale_back,
            y2: (cy + h / 2.0) * scale_back,
            score,
        };
        candidates.push(bbox.clamped(img_w, img_h));
    }

    Ok(candidates)
}

/// nms drops lower-scored boxes that overlap a kept box above the IoU threshold.
pub(crate) fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<FaceBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if keep.iter().all(|kept| kept.iou(&candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_box(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, score }
    }

    #[test]
    fn test_nms_keeps_highest_scored_of_overlapping_pair() {
        let boxes = vec![
            face_box(0.0, 0.0, 100.0, 100.0, 0.7),
            face_box(5.0, 5.0, 105.0, 105.0, 0.9),
        ];
        let kept = nms(boxes, 0.4);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].score, 0.9);
    }

    #[test]
    fn test_nms_keeps_disjoint_boxes() {
        let boxes = vec![
            face_box(0.0, 0.0, 50.0, 50.0, 0.8),
            face_box(200.0, 200.0, 260.0, 260.0, 0.6),
        ];
        let kept = nms(boxes, 0.4);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(nms(Vec::new(), 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_ratio_shrinks_by_longest_side() {
        // 1280x960 into a 640 canvas: the 1280 side sets the ratio.
        assert_eq!(letterbox_ratio(1280, 960, 640), 0.5);
        assert_eq!(letterbox_ratio(960, 1280, 640), 0.5);
    }

    #[test]
    fn test_letterbox_ratio_upscales_small_images() {
        assert_eq!(letterbox_ratio(320, 160, 640), 2.0);
    }

    #[test]
    fn test_letterbox_ratio_handles_degenerate_dimensions() {
        assert_eq!(letterbox_ratio(0, 0, 640), 640.0);
    }

    /// Lays `[cx, cy, w, h, score]` rows out channel-major, as in the `[1,5,N]`
    /// detector output.
    fn predictions(rows: &[[f32; 5]]) -> (Vec<usize>, Vec<f32>) {
        let n = rows.len();
        let mut data = vec![0.0; 5 * n];
        for (i, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                data[c * n + i] = *value;
            }
        }
        (vec![1, 5, n], data)
    }

    #[test]
    fn test_decode_predictions_maps_canvas_box_to_source_coordinates() {
        // 1280x960 source letterboxed at ratio 0.5, so scale_back is 2.0.
        let (dims, data) = predictions(&[[100.0, 100.0, 40.0, 40.0, 0.9]]);
        let boxes = decode_predictions(&dims, &data, 2.0, 1280, 960, 0.5).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].x1, 160.0);
        assert_eq!(boxes[0].y1, 160.0);
        assert_eq!(boxes[0].x2, 240.0);
        assert_eq!(boxes[0].y2, 240.0);
        assert_eq!(boxes[0].score, 0.9);
    }

    #[test]
    fn test_decode_predictions_drops_below_threshold() {
        let (dims, data) = predictions(&[
            [100.0, 100.0, 40.0, 40.0, 0.3],
            [300.0, 300.0, 40.0, 40.0, 0.8],
        ]);
        let boxes = decode_predictions(&dims, &data, 1.0, 640, 640, 0.5).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].score, 0.8);
    }

    #[test]
    fn test_decode_predictions_clamps_to_image_bounds() {
        // Box centered near the canvas corner spills past the source edges.
        let (dims, data) = predictions(&[[5.0, 5.0, 40.0, 40.0, 0.9]]);
        let boxes = decode_predictions(&dims, &data, 2.0, 100, 80, 0.5).unwrap();
        assert_eq!(boxes[0].x1, 0.0);
        assert_eq!(boxes[0].y1, 0.0);
        assert_eq!(boxes[0].x2, 50.0);
        assert_eq!(boxes[0].y2, 50.0);
    }

    #[test]
    fn test_decode_predictions_rejects_unexpected_shape() {
        assert!(decode_predictions(&[1, 4, 2], &[0.0; 8], 1.0, 640, 640, 0.5).is_err());
        assert!(decode_predictions(&[1, 5], &[0.0; 5], 1.0, 640, 640, 0.5).is_err());
    }
}
