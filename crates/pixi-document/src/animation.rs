use serde::{Deserialize, Serialize};

use crate::structure::ImageContainer;

/// Animation payload of a document (newer format versions only).
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationData {
    pub key_frame_groups: Vec<KeyFrameGroup>,
    pub frame_rate: i32,
    pub onion_frames: i32,
    pub onion_opacity: f64,
    pub default_end_frame: i32,
}

impl Default for AnimationData {
    fn default() -> Self {
        Self {
            key_frame_groups: Vec::new(),
            frame_rate: 24,
            onion_frames: 1,
            onion_opacity: 50.0,
            default_end_frame: -1,
        }
    }
}

/// An ordered group of keyframes attached to one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyFrameGroup {
    pub enabled: bool,
    pub node_id: i32,
    pub children: Vec<RasterKeyFrame>,
    pub element_key_frames: Vec<ElementKeyFrame>,
}

/// A keyframe that owns raster content; participates in the container's
/// resource pool like any other image container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RasterKeyFrame {
    pub start_frame: i32,
    pub duration: i32,
    pub guid: u128,
    pub layer_guid: u128,
    pub image: ImageContainer,
}

/// A non-raster keyframe reference: which keyframe drives which node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementKeyFrame {
    pub key_frame_id: i32,
    pub node_id: i32,
}
