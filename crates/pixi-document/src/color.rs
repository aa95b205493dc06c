use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DocumentError;

/// A single RGBA color quad.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// An ordered collection of RGBA colors (document swatches or palette).
///
/// On the wire the collection is a flat packed byte array, four bytes per
/// color in `[r, g, b, a]` order, instead of the serializer's default
/// per-element encoding. The custom serde impls below are the packed
/// formatter the metadata codec plugs in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorCollection(pub Vec<Color>);

impl ColorCollection {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add an opaque color, returning it for chaining.
    pub fn add_rgb(&mut self, r: u8, g: u8, b: u8) -> Color {
        let color = Color::rgb(r, g, b);
        self.0.push(color);
        color
    }

    /// Add a color with an explicit alpha.
    pub fn add_rgba(&mut self, r: u8, g: u8, b: u8, a: u8) -> Color {
        let color = Color::rgba(r, g, b, a);
        self.0.push(color);
        color
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten into the packed wire form, four bytes per color.
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for color in &self.0 {
            bytes.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        bytes
    }

    /// Rebuild from the packed wire form. Length must be a multiple of 4.
    pub fn from_packed_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        if bytes.len() % 4 != 0 {
            return Err(DocumentError::InvalidPackedColorLength(bytes.len()));
        }
        let colors = bytes
            .chunks_exact(4)
            .map(|quad| Color::rgba(quad[0], quad[1], quad[2], quad[3]))
            .collect();
        Ok(Self(colors))
    }
}

impl FromIterator<Color> for ColorCollection {
    fn from_iter<T: IntoIterator<Item = Color>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for ColorCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_packed_bytes())
    }
}

impl<'de> Deserialize<'de> for ColorCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PackedVisitor;

        impl<'de> Visitor<'de> for PackedVisitor {
            type Value = ColorCollection;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a packed color byte array")
            }

            fn visit_bytes<E: de::Error>(self, bytes: &[u8]) -> Result<Self::Value, E> {
                ColorCollection::from_packed_bytes(bytes).map_err(E::custom)
            }

            fn visit_byte_buf<E: de::Error>(self, bytes: Vec<u8>) -> Result<Self::Value, E> {
                ColorCollection::from_packed_bytes(&bytes).map_err(E::custom)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                ColorCollection::from_packed_bytes(&bytes).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_bytes(PackedVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_roundtrip() {
        let mut colors = ColorCollection::new();
        colors.add_rgba(234, 254, 153, 255);
        colors.add_rgb(1, 2, 3);

        let packed = colors.to_packed_bytes();
        assert_eq!(packed, vec![234, 254, 153, 255, 1, 2, 3, 255]);

        let back = ColorCollection::from_packed_bytes(&packed).unwrap();
        assert_eq!(back, colors);
    }

    #[test]
    fn empty_collection_packs_to_nothing() {
        let colors = ColorCollection::new();
        assert!(colors.to_packed_bytes().is_empty());
        assert!(ColorCollection::from_packed_bytes(&[]).unwrap().is_empty());
    }

    #[test]
    fn unaligned_packed_data_rejected() {
        let err = ColorCollection::from_packed_bytes(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, DocumentError::InvalidPackedColorLength(3));
    }

}
