//! # Vermilion Graphics
//!
//! Bindless rendering core built directly on Vulkan: a render graph that
//! executes declared passes with automatic image layout tracking and minimal
//! batched barriers, plus a bindless registry handing out stable descriptor
//! indices for the process lifetime.
//!
//! ## Overview
//!
//! - [`RenderGraph`] - per-frame pass list, resource table, and executor
//! - [`GraphPass`] - a declared pass with read/write sets and a record callback
//! - [`BindlessRegistry`] - stable integer handles for images and buffers,
//!   written into one persistent update-after-bind descriptor set
//!
//! ## Example
//!
//! ```ignore
//! use vermilion_graphics::{GraphPass, ImageState, RenderGraph};
//!
//! let mut graph = RenderGraph::new(device.clone());
//! graph.add_external_resource("swap", image, view, format, w, h, ImageState::Undefined);
//! graph.add_pass(GraphPass::new("main").writes("swap").record(|ctx| {
//!     // bind pipeline, push bindless indices, draw
//! }));
//! graph.execute(cmd, extent)?;
//! // next frame:
//! graph.clear();
//! ```
//!
//! Surface/device bootstrap, shader compilation, and asset upload live
//! outside this crate; they consume the registry's indices and declare
//! passes on the graph.

pub mod barrier;
pub mod bindless;
pub mod error;
pub mod format;
pub mod graph;
pub mod layout;
pub mod pass;
pub mod resource;

// Re-export main types for convenience
pub use barrier::BarrierBatch;
pub use bindless::{BindingCursor, BindlessRegistry, StorageBufferBinding};
pub use error::GraphicsError;
pub use graph::RenderGraph;
pub use layout::{ImageId, ImageState, LayoutTracker};
pub use pass::{GraphPass, RecordContext};
pub use resource::{ClearValue, GraphResource, ResourceTable};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Vermilion Graphics v{VERSION} initialized");
}
