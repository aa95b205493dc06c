use crate::animation::AnimationData;
use crate::color::ColorCollection;
use crate::graph::NodeGraph;
use crate::reference::ReferenceLayer;
use crate::resources::ResourceStorage;
use crate::structure::Folder;
use crate::version::FormatVersion;

/// Root of a layered-image document.
///
/// Callers build the tree before serializing; the container decoder
/// rebuilds it fresh on read. The version fields are populated only by a
/// decoder and are read-only to everyone else.
#[derive(Clone, Debug, Default)]
pub struct Document {
    pub width: u32,
    pub height: u32,
    pub swatches: ColorCollection,
    pub palette: ColorCollection,
    pub root: Folder,
    pub reference_layer: Option<ReferenceLayer>,
    pub animation_data: Option<AnimationData>,
    pub resources: Option<ResourceStorage>,
    pub graph: Option<NodeGraph>,
    /// Format-name key of the image codec used for layer bytes ("png", "qoi").
    pub image_encoder: Option<String>,
    /// Encoded preview thumbnail, written as its own block in the container.
    pub preview: Option<Vec<u8>>,
    version: Option<FormatVersion>,
    min_version: Option<FormatVersion>,
}

impl Document {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// The `.pixi` version this document was read from, if it was read.
    pub fn version(&self) -> Option<FormatVersion> {
        self.version
    }

    /// The minimum parser version the file declared, if it was read.
    pub fn min_version(&self) -> Option<FormatVersion> {
        self.min_version
    }

    /// Stamp the version fields from a container header. Called by the
    /// container decoder after a successful header validation; not part of
    /// the document's editing surface.
    pub fn stamp_versions(&mut self, version: FormatVersion, min_version: FormatVersion) {
        self.version = Some(version);
        self.min_version = Some(min_version);
    }
}

/// Equality covers document content only. The version stamps are decoder
/// diagnostics, so `decode(encode(doc))` compares equal to `doc` even
/// though only one of the two was ever read from a file.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.swatches == other.swatches
            && self.palette == other.palette
            && self.root == other.root
            && self.reference_layer == other.reference_layer
            && self.animation_data == other.animation_data
            && self.resources == other.resources
            && self.graph == other.graph
            && self.image_encoder == other.image_encoder
            && self.preview == other.preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_absent_until_stamped() {
        let mut doc = Document::new(16, 16);
        assert!(doc.version().is_none());
        assert!(doc.min_version().is_none());

        doc.stamp_versions(FormatVersion::new(5, 0), FormatVersion::new(5, 0));
        assert_eq!(doc.version(), Some(FormatVersion::new(5, 0)));
    }

    #[test]
    fn equality_ignores_version_stamps() {
        let a = Document::new(4, 4);
        let mut b = Document::new(4, 4);
        b.stamp_versions(FormatVersion::new(5, 0), FormatVersion::new(5, 0));
        assert_eq!(a, b);
    }
}
