use anyhow::{Context, Error};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array, Array3, Axis, IxDyn};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;

use crate::config::config::FaceEmbeddingConfig;
use crate::modules::FaceEmbedder;

/// ONNX face embedding client for ArcFace-style recognition models.
///
/// Takes a cropped face and produces the raw identity vector; unit
/// normalization is the extraction step's responsibility.
pub struct FaceEmbeddingClient {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    mean: f32,
    scale: f32,
    imsize: (u32, u32),
}

impl FaceEmbeddingClient {
    pub fn new(config: FaceEmbeddingConfig) -> Result<Self, Error> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.model_path)
            .with_context(|| {
                format!(
                    "face_embedding_client - cannot load embedding model from {}",
                    config.model_path.display()
                )
            })?;
        let input_name = session.inputs[0].name.clone();
        let output_name = session.outputs[0].name.clone();

        Ok(FaceEmbeddingClient {
            session: Mutex::new(session),
            input_name,
            output_name,
            mean: config.mean,
            scale: config.scale,
            imsize: config.imsize,
        })
    }

    fn preprocess(&self, face: &RgbImage) -> Array<f32, IxDyn> {
        let (width, height) = self.imsize;
        let resized = imageops::resize(face, width, height, FilterType::Triangle);

        let mut im_tensor = Array3::<f32>::zeros((height as usize, width as usize, 3usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                im_tensor[[y as usize, x as usize, c]] = (pixel[c] as f32 - self.mean) * self.scale;
            }
        }

        let transposed_tensor = im_tensor.permuted_axes([2, 0, 1]);
        transposed_tensor.insert_axis(Axis(0)).into_dyn()
    }
}

impl FaceEmbedder for FaceEmbeddingClient {
    fn embed(&self, face: &RgbImage) -> Result<Vec<f32>, Error> {
        let input_tensor = self.preprocess(face);
        let input_value = Value::from_array(input_tensor)?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_value])?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| Error::msg("face_embedding_client - no embedding output tensor"))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape.as_ref().iter().map(|&d| d as usize).collect();
        if dims.len() != 2 || dims[0] != 1 || dims[1] == 0 {
            return Err(Error::msg(format!(
                "face_embedding_client - unexpected embedding output shape {dims:?}"
            )));
        }

        Ok(data[..dims[1]].to_vec())
    }
}
