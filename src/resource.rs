//! Frame resources and the resource table.
//!
//! The table holds the frame's named resources along with the layout tracker
//! that records the authoritative state of every physical image. Resources
//! are either *external* (their image is owned and lifetime-managed outside
//! the graph, e.g. a swapchain image or a persistent G-buffer attachment) or
//! *internal* (transient, recreated each frame and dropped by [`ResourceTable::clear`]).

use std::collections::HashMap;

use ash::vk;

use crate::error::GraphicsError;
use crate::format;
use crate::layout::{ImageId, ImageState, LayoutTracker};

/// Clear value for a resource used as an attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// Clear a color attachment with RGBA values.
    Color { r: f32, g: f32, b: f32, a: f32 },
    /// Clear a depth attachment.
    Depth(f32),
    /// Clear depth and stencil attachments.
    DepthStencil { depth: f32, stencil: u32 },
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::Color {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        }
    }
}

impl ClearValue {
    /// Create a color clear value.
    pub fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Color { r, g, b, a }
    }

    /// Create a depth clear value.
    pub fn depth(value: f32) -> Self {
        Self::Depth(value)
    }

    /// Convert to a Vulkan clear value for a color attachment.
    ///
    /// Non-color variants fall back to opaque black.
    pub fn to_vk_color(self) -> vk::ClearValue {
        let float32 = match self {
            Self::Color { r, g, b, a } => [r, g, b, a],
            _ => [0.0, 0.0, 0.0, 1.0],
        };
        vk::ClearValue {
            color: vk::ClearColorValue { float32 },
        }
    }

    /// Convert to a Vulkan clear value for a depth attachment.
    ///
    /// Non-depth variants fall back to `depth = 1.0, stencil = 0`.
    pub fn to_vk_depth_stencil(self) -> vk::ClearValue {
        let (depth, stencil) = match self {
            Self::Depth(depth) => (depth, 0),
            Self::DepthStencil { depth, stencil } => (depth, stencil),
            Self::Color { .. } => (1.0, 0),
        };
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        }
    }
}

/// A named, frame-scoped view onto a physical image.
#[derive(Debug, Clone)]
pub struct GraphResource {
    /// Resource name, unique within one frame's pass list.
    pub name: String,
    /// The physical image backing this resource.
    pub image: vk::Image,
    /// The view a pass renders to or samples from.
    pub view: vk::ImageView,
    /// Pixel format. Decides depth vs color treatment on its own.
    pub format: vk::Format,
    /// Width of the view in pixels.
    pub width: u32,
    /// Height of the view in pixels.
    pub height: u32,
    /// Clear value applied when a pass clears this resource.
    pub clear_value: ClearValue,
    /// Whether the image's lifetime is managed outside the graph.
    pub external: bool,
}

impl GraphResource {
    /// The tracker key for the physical image.
    pub fn id(&self) -> ImageId {
        ImageId::from(self.image)
    }

    /// Check if this resource is treated as a depth attachment.
    pub fn is_depth(&self) -> bool {
        format::is_depth_format(self.format)
    }
}

/// The per-frame set of named resources plus the physical layout tracker.
#[derive(Debug, Default)]
pub struct ResourceTable {
    resources: HashMap<String, GraphResource>,
    layouts: LayoutTracker,
}

impl ResourceTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an externally-owned resource.
    ///
    /// The layout tracker is seeded with `initial_state` only if the image is
    /// not already tracked, so a persistent image re-registered each frame
    /// keeps whatever state it ended the previous frame in. Registering the
    /// same physical image under several names (aliased views) is fine; all
    /// of them share one tracker entry.
    #[allow(clippy::too_many_arguments)]
    pub fn add_external(
        &mut self,
        name: impl Into<String>,
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
        width: u32,
        height: u32,
        initial_state: ImageState,
    ) {
        let name = name.into();
        self.layouts.seed(ImageId::from(image), initial_state);
        self.resources.insert(
            name.clone(),
            GraphResource {
                name,
                image,
                view,
                format,
                width,
                height,
                clear_value: ClearValue::default(),
                external: true,
            },
        );
    }

    /// Insert a transient, frame-local resource.
    ///
    /// Internal resources and their tracker entries are dropped by
    /// [`ResourceTable::clear`]; their images do not persist across frames.
    pub fn add_internal(
        &mut self,
        name: impl Into<String>,
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
        width: u32,
        height: u32,
    ) {
        let name = name.into();
        self.layouts.seed(ImageId::from(image), ImageState::Undefined);
        self.resources.insert(
            name.clone(),
            GraphResource {
                name,
                image,
                view,
                format,
                width,
                height,
                clear_value: ClearValue::default(),
                external: false,
            },
        );
    }

    /// Attach a clear value to an existing resource.
    ///
    /// Unknown names are ignored (logged).
    pub fn set_clear_value(&mut self, name: &str, value: ClearValue) {
        match self.resources.get_mut(name) {
            Some(resource) => resource.clear_value = value,
            None => log::warn!("set_clear_value: unknown resource '{name}'"),
        }
    }

    /// Look up a resource by name.
    pub fn get(&self, name: &str) -> Result<&GraphResource, GraphicsError> {
        self.resources
            .get(name)
            .ok_or_else(|| GraphicsError::UnknownResource(name.to_string()))
    }

    /// Check whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Current state of a physical image.
    pub fn image_state(&self, id: ImageId) -> ImageState {
        self.layouts.get(id)
    }

    /// Record a state change for a physical image.
    pub fn set_image_state(&mut self, id: ImageId, state: ImageState) {
        self.layouts.set(id, state);
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Drop all internal resources and their layout entries.
    ///
    /// External resources persist, as do their tracker entries.
    pub fn clear(&mut self) {
        let layouts = &mut self.layouts;
        self.resources.retain(|_, resource| {
            if !resource.external {
                layouts.remove(resource.id());
            }
            resource.external
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn image(raw: u64) -> vk::Image {
        vk::Image::from_raw(raw)
    }

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    #[test]
    fn test_external_resource_seeds_layout_once() {
        let mut table = ResourceTable::new();
        table.add_external(
            "swap",
            image(1),
            view(10),
            vk::Format::B8G8R8A8_UNORM,
            1920,
            1080,
            ImageState::Undefined,
        );

        let id = table.get("swap").unwrap().id();
        table.set_image_state(id, ImageState::PresentSrc);

        // Next frame re-registers the same image; the tracked state survives.
        table.add_external(
            "swap",
            image(1),
            view(10),
            vk::Format::B8G8R8A8_UNORM,
            1920,
            1080,
            ImageState::Undefined,
        );
        assert_eq!(table.image_state(id), ImageState::PresentSrc);
    }

    #[test]
    fn test_aliased_views_share_one_state() {
        let mut table = ResourceTable::new();
        // Two cascade-layer views onto the same shadow atlas image.
        table.add_external(
            "shadow_cascade_0",
            image(5),
            view(50),
            vk::Format::D32_SFLOAT,
            2048,
            2048,
            ImageState::Undefined,
        );
        table.add_external(
            "shadow_cascade_1",
            image(5),
            view(51),
            vk::Format::D32_SFLOAT,
            2048,
            2048,
            ImageState::Undefined,
        );

        let id0 = table.get("shadow_cascade_0").unwrap().id();
        let id1 = table.get("shadow_cascade_1").unwrap().id();
        assert_eq!(id0, id1);

        table.set_image_state(id0, ImageState::DepthAttachment);
        assert_eq!(table.image_state(id1), ImageState::DepthAttachment);
    }

    #[test]
    fn test_clear_drops_internal_keeps_external() {
        let mut table = ResourceTable::new();
        table.add_external(
            "swap",
            image(1),
            view(10),
            vk::Format::B8G8R8A8_UNORM,
            1920,
            1080,
            ImageState::Undefined,
        );
        table.add_internal("depth", image(2), view(20), vk::Format::D32_SFLOAT, 1920, 1080);

        let swap_id = table.get("swap").unwrap().id();
        let depth_id = table.get("depth").unwrap().id();
        table.set_image_state(swap_id, ImageState::PresentSrc);
        table.set_image_state(depth_id, ImageState::DepthAttachment);

        table.clear();

        assert!(table.contains("swap"));
        assert!(!table.contains("depth"));
        assert_eq!(table.image_state(swap_id), ImageState::PresentSrc);
        // The internal entry is gone; an untracked image reads Undefined.
        assert_eq!(table.image_state(depth_id), ImageState::Undefined);
    }

    #[test]
    fn test_unknown_lookup_is_an_error() {
        let table = ResourceTable::new();
        let err = table.get("missing").unwrap_err();
        assert!(matches!(err, GraphicsError::UnknownResource(name) if name == "missing"));
    }

    #[test]
    fn test_set_clear_value() {
        let mut table = ResourceTable::new();
        table.add_internal("depth", image(2), view(20), vk::Format::D32_SFLOAT, 64, 64);

        table.set_clear_value("depth", ClearValue::depth(1.0));
        assert_eq!(
            table.get("depth").unwrap().clear_value,
            ClearValue::Depth(1.0)
        );

        // Unknown names are a no-op.
        table.set_clear_value("missing", ClearValue::depth(0.0));
    }

    #[test]
    fn test_clear_value_conversions() {
        let color = ClearValue::color(0.1, 0.2, 0.3, 1.0).to_vk_color();
        assert_eq!(unsafe { color.color.float32 }, [0.1, 0.2, 0.3, 1.0]);

        let depth = ClearValue::depth(0.5).to_vk_depth_stencil();
        assert_eq!(unsafe { depth.depth_stencil.depth }, 0.5);

        // A depth attachment with a color clear value falls back to 1.0.
        let fallback = ClearValue::default().to_vk_depth_stencil();
        assert_eq!(unsafe { fallback.depth_stencil.depth }, 1.0);
        assert_eq!(unsafe { fallback.depth_stencil.stencil }, 0);
    }
}
