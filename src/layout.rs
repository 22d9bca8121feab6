//! Image layout state tracking.
//!
//! The render graph keeps a single authoritative record of the GPU-visible
//! layout of every physical image it touches. Tracking is keyed by the
//! physical image handle, never by logical resource name, so several views
//! onto one image (e.g. per-cascade layers of a shadow atlas) always observe
//! and update the same entry.

use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;

use crate::format;

/// Unique identifier for a physical Vulkan image within the layout tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(u64);

impl From<vk::Image> for ImageId {
    fn from(image: vk::Image) -> Self {
        Self(image.as_raw())
    }
}

impl ImageId {
    /// Create an image ID from a raw Vulkan image handle.
    pub fn from_raw(handle: u64) -> Self {
        Self(handle)
    }

    /// Get the raw handle value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// GPU-visible layout states an image can be in.
///
/// These correspond to `VkImageLayout` values but are abstracted so the
/// tracker can derive the matching pipeline stage and access masks for
/// transitions out of and into each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageState {
    /// Initial state, contents undefined.
    #[default]
    Undefined,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for depth attachment writes.
    DepthAttachment,
    /// Optimal for shader sampling.
    ShaderReadOnly,
    /// Ready for presentation to a surface.
    PresentSrc,
}

impl ImageState {
    /// The attachment state appropriate for a format.
    pub fn attachment_for(format: vk::Format) -> Self {
        if format::is_depth_format(format) {
            Self::DepthAttachment
        } else {
            Self::ColorAttachment
        }
    }

    /// Convert to the Vulkan image layout.
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthAttachment => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Pipeline stage whose prior work must finish when leaving this state.
    pub fn src_stage(self) -> vk::PipelineStageFlags {
        match self {
            Self::Undefined => vk::PipelineStageFlags::TOP_OF_PIPE,
            Self::ColorAttachment => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthAttachment => vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            Self::ShaderReadOnly => vk::PipelineStageFlags::FRAGMENT_SHADER,
            Self::PresentSrc => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        }
    }

    /// Pipeline stage that must wait when entering this state.
    pub fn dst_stage(self) -> vk::PipelineStageFlags {
        match self {
            Self::Undefined => vk::PipelineStageFlags::TOP_OF_PIPE,
            Self::ColorAttachment => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthAttachment => vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            Self::ShaderReadOnly => vk::PipelineStageFlags::FRAGMENT_SHADER,
            Self::PresentSrc => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        }
    }

    /// Access mask for prior work in this state (as transition source).
    pub fn src_access_mask(self) -> vk::AccessFlags {
        match self {
            Self::Undefined => vk::AccessFlags::empty(),
            Self::ColorAttachment => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            Self::DepthAttachment => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            Self::ShaderReadOnly => vk::AccessFlags::SHADER_READ,
            Self::PresentSrc => vk::AccessFlags::empty(),
        }
    }

    /// Access mask for subsequent work in this state (as transition destination).
    pub fn dst_access_mask(self) -> vk::AccessFlags {
        match self {
            Self::Undefined => vk::AccessFlags::empty(),
            Self::ColorAttachment => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            Self::DepthAttachment => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            Self::ShaderReadOnly => vk::AccessFlags::SHADER_READ,
            Self::PresentSrc => vk::AccessFlags::empty(),
        }
    }
}

/// Tracks the current layout of every physical image touched by the graph.
///
/// Invariant: at most one entry per physical image. Images that were never
/// transitioned read as [`ImageState::Undefined`].
#[derive(Debug, Default)]
pub struct LayoutTracker {
    layouts: HashMap<ImageId, ImageState>,
}

impl LayoutTracker {
    /// Create a new empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state of an image, or `Undefined` if not tracked.
    pub fn get(&self, id: ImageId) -> ImageState {
        self.layouts.get(&id).copied().unwrap_or(ImageState::Undefined)
    }

    /// Update the state after a transition.
    pub fn set(&mut self, id: ImageId, state: ImageState) {
        self.layouts.insert(id, state);
    }

    /// Start tracking an image if it is not tracked yet.
    ///
    /// An image that is already tracked keeps its current entry, so
    /// persistent images re-registered every frame carry their
    /// end-of-last-frame state forward.
    pub fn seed(&mut self, id: ImageId, state: ImageState) {
        self.layouts.entry(id).or_insert(state);
    }

    /// Check whether an image is tracked.
    pub fn contains(&self, id: ImageId) -> bool {
        self.layouts.contains_key(&id)
    }

    /// Stop tracking an image (e.g. a transient image dropped at frame end).
    pub fn remove(&mut self, id: ImageId) {
        self.layouts.remove(&id);
    }

    /// Get the number of tracked images.
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Check if any images are being tracked.
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}
