//! Road segmentation inference for trained FCN-8s models.
//!
//! Images are resized to the network resolution, scored with keep
//! probability 1.0, thresholded on the road-class softmax and written out as
//! green overlays.

pub mod error;
pub mod export;
pub mod overlay;
pub mod preprocess;
pub mod segment;

pub use error::{InferenceError, InferenceResult};
pub use export::save_inference_samples;
pub use overlay::{overlay_mask, ROAD_OVERLAY};
pub use segment::{road_probabilities, segment_image, RoadMask, Segmentation, ROAD_CLASS};

pub mod prelude {
    pub use crate::{save_inference_samples, segment_image, InferenceError, RoadMask};
}
