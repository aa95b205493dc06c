//! Resource indexer: assigns every embedded raster resource its byte range
//! inside the container's trailing resource pool.
//!
//! The traversal order is a wire contract, not an implementation detail:
//! the decoder replays the identical order to find each resource again, so
//! the order is pinned per format major version in [`TraversalOrder`].

use pixi_document::{Document, ImageContainer, StructureMember};

use crate::error::{PixiError, PixiResult};

/// Order of visitation per format major version.
///
/// Both versions walk the structure tree depth-first in insertion order,
/// visiting a member's attached mask immediately after the member itself,
/// then the reference layer. Version 5 additionally walks keyframe images
/// in a separate pass after everything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalOrder {
    V4,
    V5,
}

/// One indexed resource: its byte range in the pool and a human-readable
/// descriptor used in decode diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceEntry {
    pub offset: u64,
    pub size: u64,
    pub descriptor: String,
}

/// The side table produced by one indexing pass and consumed by exactly one
/// encode or decode pass. Offsets and sizes never live on the document
/// model itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourcePlan {
    pub entries: Vec<ResourceEntry>,
}

impl ResourcePlan {
    /// Total bytes the resource pool will occupy.
    pub fn pool_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub(crate) fn cursor(&self) -> PlanCursor<'_> {
        PlanCursor {
            entries: &self.entries,
            next: 0,
        }
    }
}

/// Sequential consumer pairing plan entries with the image containers met
/// during the identical replayed traversal.
pub(crate) struct PlanCursor<'a> {
    entries: &'a [ResourceEntry],
    next: usize,
}

impl PlanCursor<'_> {
    pub(crate) fn take(&mut self) -> PixiResult<&ResourceEntry> {
        let entry = self.entries.get(self.next).ok_or_else(|| {
            PixiError::invalid_format("resource plan exhausted before traversal finished")
        })?;
        self.next += 1;
        Ok(entry)
    }
}

/// Walk the document in the given order and assign each image container a
/// contiguous (offset, size) range in the resource pool.
///
/// Zero-length images get an entry with size 0: they contribute no bytes on
/// either side of the protocol, but the bookkeeping still advances through
/// them so positions stay aligned.
pub fn index_document(document: &Document, order: TraversalOrder) -> ResourcePlan {
    let mut plan = ResourcePlan::default();
    let mut offset = 0u64;

    for (i, member) in document.root.iter_recursive().enumerate() {
        if let Some(image) = member.as_image_container() {
            push(&mut plan, &mut offset, image.len(), member_descriptor(member, i));
        }
        if let Some(mask) = member.mask() {
            let descriptor = mask_descriptor(&member_descriptor(member, i));
            push(&mut plan, &mut offset, mask.image.len(), descriptor);
        }
    }

    if let Some(reference) = &document.reference_layer {
        push(
            &mut plan,
            &mut offset,
            reference.image.len(),
            REFERENCE_DESCRIPTOR.to_string(),
        );
    }

    if order == TraversalOrder::V5 {
        if let Some(animation) = &document.animation_data {
            // Keyframe offsets restart at 0: a historical quirk of the 5.x
            // lineage that existing files depend on. Do not "fix" it.
            let mut keyframe_offset = 0u64;
            for (g, group) in animation.key_frame_groups.iter().enumerate() {
                for (k, keyframe) in group.children.iter().enumerate() {
                    push(
                        &mut plan,
                        &mut keyframe_offset,
                        keyframe.image.len(),
                        keyframe_descriptor(g, k),
                    );
                }
            }
        }
    }

    plan
}

pub(crate) const REFERENCE_DESCRIPTOR: &str = "Reference layer";

pub(crate) fn image_descriptor(name: &str, index: usize) -> String {
    format!("Image '{name}' [{index}]")
}

pub(crate) fn folder_descriptor(name: &str, index: usize) -> String {
    format!("Folder '{name}' [{index}]")
}

pub(crate) fn mask_descriptor(owner: &str) -> String {
    format!("Mask of {owner}")
}

pub(crate) fn keyframe_descriptor(group: usize, frame: usize) -> String {
    format!("Keyframe [group {group}, frame {frame}]")
}

/// Collect the containers that contribute bytes to the pool, in the same
/// order as [`index_document`]. Zero-length containers are excluded, so the
/// returned slices concatenate to exactly `plan.pool_size()` bytes.
pub(crate) fn collect_image_refs(
    document: &Document,
    order: TraversalOrder,
) -> Vec<&ImageContainer> {
    let mut images = Vec::new();

    for member in document.root.iter_recursive() {
        if let Some(image) = member.as_image_container() {
            if !image.is_empty() {
                images.push(image);
            }
        }
        if let Some(mask) = member.mask() {
            if !mask.image.is_empty() {
                images.push(&mask.image);
            }
        }
    }

    if let Some(reference) = &document.reference_layer {
        if !reference.image.is_empty() {
            images.push(&reference.image);
        }
    }

    if order == TraversalOrder::V5 {
        if let Some(animation) = &document.animation_data {
            for group in &animation.key_frame_groups {
                for keyframe in &group.children {
                    if !keyframe.image.is_empty() {
                        images.push(&keyframe.image);
                    }
                }
            }
        }
    }

    images
}

/// Visit every image container in the document, mutably, in the exact order
/// [`index_document`] assigned plan entries. Every container is visited,
/// including empty ones: the decoder pairs this walk positionally with the
/// plan, entry for entry.
pub(crate) fn for_each_image_mut<E>(
    document: &mut Document,
    order: TraversalOrder,
    f: &mut impl FnMut(&mut ImageContainer) -> Result<(), E>,
) -> Result<(), E> {
    document.root.try_for_each_member_mut(&mut |member| {
        if let Some(image) = member.as_image_container_mut() {
            f(image)?;
        }
        if let Some(mask) = member.mask_mut() {
            f(&mut mask.image)?;
        }
        Ok(())
    })?;

    if let Some(reference) = &mut document.reference_layer {
        f(&mut reference.image)?;
    }

    if order == TraversalOrder::V5 {
        if let Some(animation) = &mut document.animation_data {
            for group in &mut animation.key_frame_groups {
                for keyframe in &mut group.children {
                    f(&mut keyframe.image)?;
                }
            }
        }
    }

    Ok(())
}

fn push(plan: &mut ResourcePlan, offset: &mut u64, len: usize, descriptor: String) {
    plan.entries.push(ResourceEntry {
        offset: *offset,
        size: len as u64,
        descriptor,
    });
    *offset += len as u64;
}

fn member_descriptor(member: &StructureMember, index: usize) -> String {
    match member {
        StructureMember::Folder(folder) => folder_descriptor(&folder.name, index),
        StructureMember::ImageLayer(layer) => image_descriptor(&layer.name, index),
    }
}

#[cfg(test)]
mod tests {
    use pixi_document::{
        AnimationData, Folder, ImageContainer, ImageLayer, KeyFrameGroup, Mask, RasterKeyFrame,
        ReferenceLayer, StructureMember,
    };

    use super::*;

    fn layer_with_bytes(name: &str, bytes: &[u8]) -> StructureMember {
        let mut layer = ImageLayer::new(name, 8, 8);
        layer.image = ImageContainer::new(bytes.to_vec());
        StructureMember::ImageLayer(layer)
    }

    #[test]
    fn offsets_are_contiguous_in_traversal_order() {
        let mut doc = Document::new(8, 8);
        doc.root.children.push(layer_with_bytes("a", &[0; 3]));
        doc.root.children.push(layer_with_bytes("b", &[0; 5]));

        let plan = index_document(&doc, TraversalOrder::V4);
        assert_eq!(plan.entries.len(), 2);
        assert_eq!((plan.entries[0].offset, plan.entries[0].size), (0, 3));
        assert_eq!((plan.entries[1].offset, plan.entries[1].size), (3, 5));
        assert_eq!(plan.pool_size(), 8);
    }

    #[test]
    fn mask_indexed_immediately_after_owner() {
        let mut layer = ImageLayer::new("l", 8, 8);
        layer.image = ImageContainer::new(vec![1, 2]);
        layer.mask = Some(Mask {
            image: ImageContainer::new(vec![3, 4, 5]),
            ..Mask::default()
        });

        let mut doc = Document::new(8, 8);
        doc.root.children.push(StructureMember::ImageLayer(layer));
        doc.root.children.push(layer_with_bytes("next", &[9]));

        let plan = index_document(&doc, TraversalOrder::V4);
        let descriptors: Vec<&str> =
            plan.entries.iter().map(|e| e.descriptor.as_str()).collect();
        assert_eq!(
            descriptors,
            ["Image 'l' [0]", "Mask of Image 'l' [0]", "Image 'next' [1]"]
        );
        assert_eq!(plan.entries[1].offset, 2);
        assert_eq!(plan.entries[2].offset, 5);
    }

    #[test]
    fn zero_length_images_advance_by_nothing() {
        let mut doc = Document::new(8, 8);
        doc.root.children.push(layer_with_bytes("empty", &[]));
        doc.root.children.push(layer_with_bytes("full", &[7; 4]));

        let plan = index_document(&doc, TraversalOrder::V4);
        assert_eq!((plan.entries[0].offset, plan.entries[0].size), (0, 0));
        assert_eq!((plan.entries[1].offset, plan.entries[1].size), (0, 4));
    }

    #[test]
    fn reference_layer_visited_after_tree() {
        let mut doc = Document::new(8, 8);
        doc.root.children.push(layer_with_bytes("a", &[1]));
        let mut reference = ReferenceLayer::default();
        reference.image = ImageContainer::new(vec![2, 3]);
        doc.reference_layer = Some(reference);

        let plan = index_document(&doc, TraversalOrder::V4);
        assert_eq!(plan.entries[1].descriptor, "Reference layer");
        assert_eq!(plan.entries[1].offset, 1);
    }

    #[test]
    fn keyframe_offsets_restart_at_zero() {
        let mut doc = Document::new(8, 8);
        doc.root.children.push(layer_with_bytes("a", &[1; 10]));

        let mut group = KeyFrameGroup::default();
        group.children.push(RasterKeyFrame {
            image: ImageContainer::new(vec![4; 6]),
            ..RasterKeyFrame::default()
        });
        group.children.push(RasterKeyFrame {
            image: ImageContainer::new(vec![5; 2]),
            ..RasterKeyFrame::default()
        });
        doc.animation_data = Some(AnimationData {
            key_frame_groups: vec![group],
            ..AnimationData::default()
        });

        let plan = index_document(&doc, TraversalOrder::V5);
        assert_eq!(plan.entries.len(), 3);
        // The quirk: keyframes do not continue the structure-tree total.
        assert_eq!((plan.entries[1].offset, plan.entries[1].size), (0, 6));
        assert_eq!((plan.entries[2].offset, plan.entries[2].size), (6, 2));
    }

    #[test]
    fn v4_ignores_keyframes() {
        let mut doc = Document::new(8, 8);
        let mut group = KeyFrameGroup::default();
        group.children.push(RasterKeyFrame {
            image: ImageContainer::new(vec![1]),
            ..RasterKeyFrame::default()
        });
        doc.animation_data = Some(AnimationData {
            key_frame_groups: vec![group],
            ..AnimationData::default()
        });

        let plan = index_document(&doc, TraversalOrder::V4);
        assert!(plan.entries.is_empty());
    }

    #[test]
    fn folder_contributes_mask_but_no_image() {
        let mut folder = Folder::new("f");
        folder.mask = Some(Mask {
            image: ImageContainer::new(vec![1, 2, 3]),
            ..Mask::default()
        });
        folder.children.push(layer_with_bytes("inner", &[9; 2]));

        let mut doc = Document::new(8, 8);
        doc.root.children.push(StructureMember::Folder(folder));

        let plan = index_document(&doc, TraversalOrder::V4);
        let descriptors: Vec<&str> =
            plan.entries.iter().map(|e| e.descriptor.as_str()).collect();
        assert_eq!(descriptors, ["Mask of Folder 'f' [0]", "Image 'inner' [1]"]);
    }
}
