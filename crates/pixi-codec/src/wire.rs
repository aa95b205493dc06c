//! Wire-side mirror of the structure tree.
//!
//! The metadata blob carries these structs, not the model types: next to
//! every image container the wire form stores the container's byte range in
//! the resource pool. The model stays protocol-agnostic; the conversions
//! here move the bookkeeping between the blob and a [`ResourcePlan`].
//!
//! Conversion order is load-bearing. Encode pulls plan entries through a
//! cursor and decode rebuilds the plan entry by entry, both in the exact
//! order the indexer assigned them: a member's own image, then its mask,
//! then (for folders) the children.

use pixi_document::{BlendMode, Folder, ImageLayer, Mask, StructureMember};
use serde::{Deserialize, Serialize};

use crate::error::{PixiError, PixiResult};
use crate::index::{
    folder_descriptor, image_descriptor, mask_descriptor, PlanCursor, ResourceEntry, ResourcePlan,
};

/// Byte range of one resource inside the trailing pool.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub(crate) struct WireResourceRef {
    pub offset: u64,
    pub size: u64,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct WireMask {
    pub enabled: bool,
    pub width: i32,
    pub height: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub blend_mode: BlendMode,
    pub resource: WireResourceRef,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct WireImageLayer {
    pub name: String,
    pub enabled: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub clip_to_member_below: bool,
    pub lock_alpha: bool,
    pub width: i32,
    pub height: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub mask: Option<WireMask>,
    pub resource: WireResourceRef,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct WireFolder {
    pub name: String,
    pub enabled: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub clip_to_member_below: bool,
    pub mask: Option<WireMask>,
    pub children: Vec<WireMember>,
}

#[derive(Serialize, Deserialize)]
pub(crate) enum WireMember {
    Folder(WireFolder),
    ImageLayer(WireImageLayer),
}

/// Accumulates plan entries while a decoded wire tree is walked, assigning
/// the same positional member indices the indexer would.
#[derive(Default)]
pub(crate) struct PlanBuilder {
    entries: Vec<ResourceEntry>,
    next_index: usize,
}

impl PlanBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_member_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    pub(crate) fn push(&mut self, resource: WireResourceRef, descriptor: String) {
        self.entries.push(ResourceEntry {
            offset: resource.offset,
            size: resource.size,
            descriptor,
        });
    }

    pub(crate) fn finish(self) -> ResourcePlan {
        ResourcePlan {
            entries: self.entries,
        }
    }
}

fn resource_ref(entry: &ResourceEntry) -> WireResourceRef {
    WireResourceRef {
        offset: entry.offset,
        size: entry.size,
    }
}

/// Serialize the root folder. The root itself is a plain container on the
/// wire: any mask attached to it never enters the container, mirroring how
/// the format has always treated the document root.
pub(crate) fn root_to_wire(root: &Folder, cursor: &mut PlanCursor<'_>) -> PixiResult<WireFolder> {
    Ok(WireFolder {
        name: root.name.clone(),
        enabled: root.enabled,
        opacity: root.opacity(),
        blend_mode: root.blend_mode,
        clip_to_member_below: root.clip_to_member_below,
        mask: None,
        children: members_to_wire(&root.children, cursor)?,
    })
}

fn members_to_wire(
    children: &[StructureMember],
    cursor: &mut PlanCursor<'_>,
) -> PixiResult<Vec<WireMember>> {
    children
        .iter()
        .map(|member| member_to_wire(member, cursor))
        .collect()
}

fn member_to_wire(member: &StructureMember, cursor: &mut PlanCursor<'_>) -> PixiResult<WireMember> {
    match member {
        StructureMember::ImageLayer(layer) => {
            let resource = resource_ref(cursor.take()?);
            let mask = layer
                .mask
                .as_ref()
                .map(|mask| mask_to_wire(mask, cursor))
                .transpose()?;
            Ok(WireMember::ImageLayer(WireImageLayer {
                name: layer.name.clone(),
                enabled: layer.enabled,
                opacity: layer.opacity(),
                blend_mode: layer.blend_mode,
                clip_to_member_below: layer.clip_to_member_below,
                lock_alpha: layer.lock_alpha,
                width: layer.width,
                height: layer.height,
                offset_x: layer.offset_x,
                offset_y: layer.offset_y,
                mask,
                resource,
            }))
        }
        StructureMember::Folder(folder) => {
            let mask = folder
                .mask
                .as_ref()
                .map(|mask| mask_to_wire(mask, cursor))
                .transpose()?;
            Ok(WireMember::Folder(WireFolder {
                name: folder.name.clone(),
                enabled: folder.enabled,
                opacity: folder.opacity(),
                blend_mode: folder.blend_mode,
                clip_to_member_below: folder.clip_to_member_below,
                mask,
                children: members_to_wire(&folder.children, cursor)?,
            }))
        }
    }
}

fn mask_to_wire(mask: &Mask, cursor: &mut PlanCursor<'_>) -> PixiResult<WireMask> {
    let resource = resource_ref(cursor.take()?);
    Ok(WireMask {
        enabled: mask.enabled,
        width: mask.width,
        height: mask.height,
        offset_x: mask.offset_x,
        offset_y: mask.offset_y,
        blend_mode: mask.blend_mode,
        resource,
    })
}

/// Rebuild the root folder from its wire form, registering every resource
/// reference met along the way.
pub(crate) fn root_from_wire(wire: WireFolder, builder: &mut PlanBuilder) -> PixiResult<Folder> {
    let mut root = Folder::new(wire.name);
    root.enabled = wire.enabled;
    set_opacity(&mut root, wire.opacity, "root folder")?;
    root.blend_mode = wire.blend_mode;
    root.clip_to_member_below = wire.clip_to_member_below;
    root.children = members_from_wire(wire.children, builder)?;
    Ok(root)
}

fn members_from_wire(
    children: Vec<WireMember>,
    builder: &mut PlanBuilder,
) -> PixiResult<Vec<StructureMember>> {
    children
        .into_iter()
        .map(|member| member_from_wire(member, builder))
        .collect()
}

fn member_from_wire(wire: WireMember, builder: &mut PlanBuilder) -> PixiResult<StructureMember> {
    let index = builder.next_member_index();
    match wire {
        WireMember::ImageLayer(layer) => {
            let descriptor = image_descriptor(&layer.name, index);
            builder.push(layer.resource, descriptor.clone());

            let mut built = ImageLayer::new(layer.name, layer.width, layer.height);
            built.enabled = layer.enabled;
            built
                .set_opacity(layer.opacity)
                .map_err(|e| PixiError::invalid_format(format!("{descriptor}: {e}")))?;
            built.blend_mode = layer.blend_mode;
            built.clip_to_member_below = layer.clip_to_member_below;
            built.lock_alpha = layer.lock_alpha;
            built.offset_x = layer.offset_x;
            built.offset_y = layer.offset_y;
            built.mask = layer
                .mask
                .map(|mask| mask_from_wire(mask, &descriptor, builder));
            Ok(StructureMember::ImageLayer(built))
        }
        WireMember::Folder(folder) => {
            let descriptor = folder_descriptor(&folder.name, index);
            let mut built = Folder::new(folder.name);
            built.enabled = folder.enabled;
            set_opacity(&mut built, folder.opacity, &descriptor)?;
            built.blend_mode = folder.blend_mode;
            built.clip_to_member_below = folder.clip_to_member_below;
            built.mask = folder
                .mask
                .map(|mask| mask_from_wire(mask, &descriptor, builder));
            built.children = members_from_wire(folder.children, builder)?;
            Ok(StructureMember::Folder(built))
        }
    }
}

fn mask_from_wire(wire: WireMask, owner: &str, builder: &mut PlanBuilder) -> Mask {
    builder.push(wire.resource, mask_descriptor(owner));
    Mask {
        enabled: wire.enabled,
        width: wire.width,
        height: wire.height,
        offset_x: wire.offset_x,
        offset_y: wire.offset_y,
        blend_mode: wire.blend_mode,
        image: Default::default(),
    }
}

fn set_opacity(folder: &mut Folder, value: f32, descriptor: &str) -> PixiResult<()> {
    folder
        .set_opacity(value)
        .map_err(|e| PixiError::invalid_format(format!("{descriptor}: {e}")))
}
