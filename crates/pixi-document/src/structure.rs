use crate::blend::BlendMode;
use crate::error::DocumentError;

/// Owner of raw encoded image bytes.
///
/// Inside a `.pixi` file these bytes live in the trailing resource pool;
/// the offset/size bookkeeping for that pool belongs to the codec's side
/// table, never to this type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageContainer {
    pub bytes: Vec<u8>,
}

impl ImageContainer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A raster mask attached to a maskable structure member.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mask {
    pub enabled: bool,
    pub width: i32,
    pub height: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub blend_mode: BlendMode,
    pub image: ImageContainer,
}

/// A raster layer in the structure tree.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageLayer {
    pub name: String,
    pub enabled: bool,
    opacity: f32,
    pub blend_mode: BlendMode,
    pub clip_to_member_below: bool,
    pub lock_alpha: bool,
    pub width: i32,
    pub height: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub mask: Option<Mask>,
    pub image: ImageContainer,
}

impl ImageLayer {
    pub fn new(name: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            clip_to_member_below: false,
            lock_alpha: false,
            width,
            height,
            offset_x: 0,
            offset_y: 0,
            mask: None,
            image: ImageContainer::default(),
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Set the layer opacity. Values outside `[0, 1]` are a contract
    /// violation and are rejected at the mutation point.
    pub fn set_opacity(&mut self, value: f32) -> Result<(), DocumentError> {
        self.opacity = checked_opacity(value)?;
        Ok(())
    }
}

/// A folder grouping structure members, itself a structure member.
#[derive(Clone, Debug, PartialEq)]
pub struct Folder {
    pub name: String,
    pub enabled: bool,
    opacity: f32,
    pub blend_mode: BlendMode,
    pub clip_to_member_below: bool,
    pub mask: Option<Mask>,
    pub children: Vec<StructureMember>,
}

impl Default for Folder {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            clip_to_member_below: false,
            mask: None,
            children: Vec::new(),
        }
    }
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, value: f32) -> Result<(), DocumentError> {
        self.opacity = checked_opacity(value)?;
        Ok(())
    }

    /// Depth-first iteration over all members below this folder, each member
    /// before its own subtree, in insertion order. This is the traversal
    /// order the container protocol replays on both write and read.
    pub fn iter_recursive(&self) -> IterRecursive<'_> {
        IterRecursive {
            stack: vec![self.children.iter()],
        }
    }

    /// Mutable depth-first walk in the same order as [`Self::iter_recursive`].
    pub fn try_for_each_member_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut StructureMember) -> Result<(), E>,
    ) -> Result<(), E> {
        for child in &mut self.children {
            f(child)?;
            if let StructureMember::Folder(folder) = child {
                folder.try_for_each_member_mut(f)?;
            }
        }
        Ok(())
    }
}

/// A node in the document's layer/folder tree.
///
/// The original format models members via interface composition; here the
/// set is closed and capabilities are queried through accessors, so each
/// variant only exposes the facets it actually has.
#[derive(Clone, Debug, PartialEq)]
pub enum StructureMember {
    Folder(Folder),
    ImageLayer(ImageLayer),
}

impl StructureMember {
    pub fn name(&self) -> &str {
        match self {
            Self::Folder(folder) => &folder.name,
            Self::ImageLayer(layer) => &layer.name,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::Folder(folder) => folder.enabled,
            Self::ImageLayer(layer) => layer.enabled,
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            Self::Folder(folder) => folder.opacity(),
            Self::ImageLayer(layer) => layer.opacity(),
        }
    }

    pub fn blend_mode(&self) -> BlendMode {
        match self {
            Self::Folder(folder) => folder.blend_mode,
            Self::ImageLayer(layer) => layer.blend_mode,
        }
    }

    /// The member's attached mask, if it has one.
    pub fn mask(&self) -> Option<&Mask> {
        match self {
            Self::Folder(folder) => folder.mask.as_ref(),
            Self::ImageLayer(layer) => layer.mask.as_ref(),
        }
    }

    pub fn mask_mut(&mut self) -> Option<&mut Mask> {
        match self {
            Self::Folder(folder) => folder.mask.as_mut(),
            Self::ImageLayer(layer) => layer.mask.as_mut(),
        }
    }

    /// The member's own raster content, for variants that carry one.
    pub fn as_image_container(&self) -> Option<&ImageContainer> {
        match self {
            Self::Folder(_) => None,
            Self::ImageLayer(layer) => Some(&layer.image),
        }
    }

    pub fn as_image_container_mut(&mut self) -> Option<&mut ImageContainer> {
        match self {
            Self::Folder(_) => None,
            Self::ImageLayer(layer) => Some(&mut layer.image),
        }
    }
}

/// See [`Folder::iter_recursive`].
pub struct IterRecursive<'a> {
    stack: Vec<std::slice::Iter<'a, StructureMember>>,
}

impl<'a> Iterator for IterRecursive<'a> {
    type Item = &'a StructureMember;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let iter = self.stack.last_mut()?;
            match iter.next() {
                Some(member) => {
                    if let StructureMember::Folder(folder) = member {
                        self.stack.push(folder.children.iter());
                    }
                    return Some(member);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

fn checked_opacity(value: f32) -> Result<f32, DocumentError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(DocumentError::OpacityOutOfRange(value));
    }
    Ok(value)
}
