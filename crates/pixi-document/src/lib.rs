//! In-memory document model for the `.pixi` layered-image format.
//!
//! This crate provides the protocol-agnostic object model that the container
//! codec (`pixi-codec`) reads and writes. Every other pixi crate depends on
//! `pixi-document`.
//!
//! # Key Types
//!
//! - [`Document`] — root of a layered-image document
//! - [`StructureMember`] — a node in the layer/folder tree
//! - [`Folder`] / [`ImageLayer`] / [`Mask`] — the tree member kinds
//! - [`ReferenceLayer`] — standalone raster overlay with transform corners
//! - [`ColorCollection`] — ordered RGBA swatches with a packed wire form
//! - [`AnimationData`] — keyframe groups for animated documents
//! - [`FormatVersion`] — (major, minor) pair stamped by the container codec
//!
//! Serialization bookkeeping (resource offsets and sizes inside a `.pixi`
//! file) deliberately does not appear on any type here; the codec keeps it
//! in a side table so document equality never observes protocol state.

pub mod animation;
pub mod blend;
pub mod color;
pub mod document;
pub mod error;
pub mod graph;
pub mod reference;
pub mod resources;
pub mod structure;
pub mod version;

pub use animation::{AnimationData, ElementKeyFrame, KeyFrameGroup, RasterKeyFrame};
pub use blend::BlendMode;
pub use color::{Color, ColorCollection};
pub use document::Document;
pub use error::DocumentError;
pub use graph::{Node, NodeGraph, NodeProperty, PropertyConnection};
pub use reference::{Corners, ReferenceLayer, Vec2};
pub use resources::{EmbeddedResource, ResourceStorage};
pub use structure::{Folder, ImageContainer, ImageLayer, Mask, StructureMember};
pub use version::FormatVersion;
