use serde::{Deserialize, Serialize};

/// Blend mode of a structure member, as stored in the document metadata.
///
/// The codec only carries the value; compositing semantics live in the host
/// application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum BlendMode {
    Unknown = -1,
    #[default]
    Normal = 0,
    Darken,
    Multiply,
    ColorBurn,
    Lighten,
    Screen,
    ColorDodge,
    LinearDodge,
    Overlay,
    SoftLight,
    HardLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Luminosity,
    Color,
}
