use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::structure::ImageContainer;

/// A 2D point in document space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The four transform corners of a reference layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Corners {
    pub top_left: Vec2,
    pub top_right: Vec2,
    pub bottom_left: Vec2,
    pub bottom_right: Vec2,
}

/// A standalone raster overlay that sits outside the structure tree.
///
/// Older format versions size the reference layer in floating-point units
/// and give it a name and opacity; the current version only keeps pixel
/// dimensions. The model carries the superset and the per-version wire
/// structs pick what they need.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceLayer {
    pub name: Option<String>,
    pub enabled: bool,
    pub topmost: bool,
    opacity: f32,
    pub corners: Corners,
    pub width: f32,
    pub height: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub image: ImageContainer,
}

impl Default for ReferenceLayer {
    fn default() -> Self {
        Self {
            name: None,
            enabled: true,
            topmost: false,
            opacity: 1.0,
            corners: Corners::default(),
            width: 0.0,
            height: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
            image: ImageContainer::default(),
        }
    }
}

impl ReferenceLayer {
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, value: f32) -> Result<(), DocumentError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(DocumentError::OpacityOutOfRange(value));
        }
        self.opacity = value;
        Ok(())
    }
}
