//! Render graph execution.
//!
//! The graph walks its pass list in declared order. There is no dependency
//! inference or reordering: the declaration order is trusted as a valid
//! topological order, and validation only checks that the declaration is
//! internally consistent (known names, inputs produced before use, at most
//! one depth output per pass).
//!
//! Before each pass, layout transitions for its declared inputs and outputs
//! are batched into a single pipeline barrier. The pass's attachments are
//! then bound in a dynamic rendering scope and its callback records draw or
//! dispatch commands. The final pass additionally hands its external color
//! outputs off to the presentation engine.

use std::collections::HashSet;

use ash::vk;

use crate::barrier::BarrierBatch;
use crate::error::GraphicsError;
use crate::format;
use crate::layout::ImageState;
use crate::pass::{GraphPass, RecordContext};
use crate::resource::{ClearValue, ResourceTable};

/// The render graph: resource table, pass list, and executor.
///
/// # Frame lifecycle
///
/// ```ignore
/// graph.clear();                       // drop last frame's passes/transients
/// graph.add_external_resource(...);    // re-register swapchain image etc.
/// graph.add_pass(GraphPass::new(...)); // declare passes in execution order
/// graph.execute(cmd, extent)?;         // record the frame
/// ```
///
/// The caller owns frame pacing: a physical image must not be re-registered
/// until GPU work from the frame that last used it has retired.
pub struct RenderGraph {
    device: ash::Device,
    resources: ResourceTable,
    passes: Vec<GraphPass>,
}

impl RenderGraph {
    /// Create an empty graph recording through the given device.
    ///
    /// The device must support dynamic rendering (Vulkan 1.3 core).
    pub fn new(device: ash::Device) -> Self {
        Self {
            device,
            resources: ResourceTable::new(),
            passes: Vec::new(),
        }
    }

    /// Register an externally-owned resource (e.g. the swapchain image or a
    /// persistent G-buffer attachment). See [`ResourceTable::add_external`].
    #[allow(clippy::too_many_arguments)]
    pub fn add_external_resource(
        &mut self,
        name: impl Into<String>,
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
        width: u32,
        height: u32,
        initial_state: ImageState,
    ) {
        self.resources
            .add_external(name, image, view, format, width, height, initial_state);
    }

    /// Register a transient frame-local resource.
    pub fn add_internal_resource(
        &mut self,
        name: impl Into<String>,
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
        width: u32,
        height: u32,
    ) {
        self.resources
            .add_internal(name, image, view, format, width, height);
    }

    /// Attach a clear value to a registered resource.
    pub fn set_clear_value(&mut self, name: &str, value: ClearValue) {
        self.resources.set_clear_value(name, value);
    }

    /// Append a pass. Passes execute in the order they are added.
    pub fn add_pass(&mut self, pass: GraphPass) {
        self.passes.push(pass);
    }

    /// Number of declared passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// The frame's resource table.
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// Record the frame into `cmd` (which must be in the recording state).
    ///
    /// Validates the whole frame first, then for each pass in declared
    /// order: emits one batched barrier for its input and output
    /// transitions, opens a dynamic rendering scope over its outputs,
    /// invokes the recording callback, and closes the scope. After the last
    /// pass, external color outputs are transitioned to the presentable
    /// layout.
    pub fn execute(
        &mut self,
        cmd: vk::CommandBuffer,
        frame_extent: vk::Extent2D,
    ) -> Result<(), GraphicsError> {
        validate_frame(&self.resources, &self.passes)?;

        let device = &self.device;
        let resources = &mut self.resources;
        let pass_total = self.passes.len();

        for (index, pass) in self.passes.iter_mut().enumerate() {
            let barriers = plan_pass_barriers(resources, pass)?;
            log::debug!(
                "pass '{}': {} layout transition(s)",
                pass.name(),
                barriers.len()
            );
            barriers.submit(device, cmd);

            let attachments = build_attachments(resources, pass, frame_extent)?;
            let mut rendering_info = vk::RenderingInfo::default()
                .render_area(attachments.render_area)
                .layer_count(1)
                .color_attachments(&attachments.color);
            if let Some(ref depth) = attachments.depth {
                rendering_info = rendering_info.depth_attachment(depth);
            }

            unsafe { device.cmd_begin_rendering(cmd, &rendering_info) };
            if let Some(callback) = pass.callback.as_mut() {
                let ctx = RecordContext { device, cmd };
                callback(&ctx);
            }
            unsafe { device.cmd_end_rendering(cmd) };

            if index + 1 == pass_total {
                let present = plan_present_barriers(resources, pass)?;
                present.submit(device, cmd);
            }
        }

        Ok(())
    }

    /// Drop all passes and all internal resources.
    ///
    /// Called at the start of the next frame, after the caller has waited
    /// for this frame's GPU work on those resources to retire. External
    /// resources and their tracked layouts persist.
    pub fn clear(&mut self) {
        log::debug!(
            "clearing render graph ({} passes, {} resources)",
            self.passes.len(),
            self.resources.len()
        );
        self.passes.clear();
        self.resources.clear();
    }
}

/// Attachment set assembled for one pass.
struct PassAttachments {
    color: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

/// Check the whole frame's declarations before recording anything.
fn validate_frame(resources: &ResourceTable, passes: &[GraphPass]) -> Result<(), GraphicsError> {
    let mut written: HashSet<&str> = HashSet::new();

    for pass in passes {
        for name in pass.inputs() {
            let resource = resources.get(name)?;
            // External contents are produced outside the graph (previous
            // frame, upload path), so only internal inputs need a producer.
            if !resource.external && !written.contains(name.as_str()) {
                return Err(GraphicsError::InputNeverWritten {
                    pass: pass.name().to_string(),
                    resource: name.clone(),
                });
            }
        }

        let mut depth_outputs = 0;
        for name in pass.outputs() {
            let resource = resources.get(name)?;
            if resource.is_depth() {
                depth_outputs += 1;
                if depth_outputs > 1 {
                    return Err(GraphicsError::MultipleDepthOutputs(pass.name().to_string()));
                }
            }
            written.insert(name.as_str());
        }
    }

    Ok(())
}

/// Plan the batched layout transitions a pass needs before recording.
///
/// Inputs move to shader-read, outputs to their format's attachment state
/// with prior contents discarded. The layout tracker is updated immediately,
/// so aliased resources and repeated requests converge without redundant
/// barriers.
fn plan_pass_barriers(
    resources: &mut ResourceTable,
    pass: &GraphPass,
) -> Result<BarrierBatch, GraphicsError> {
    let mut batch = BarrierBatch::new();

    for name in pass.inputs() {
        let resource = resources.get(name)?;
        let id = resource.id();
        let image = resource.image;
        let aspect = format::aspect_mask(resource.format);

        let current = resources.image_state(id);
        if current != ImageState::ShaderReadOnly {
            batch.add_transition(id, image, current, ImageState::ShaderReadOnly, aspect);
            resources.set_image_state(id, ImageState::ShaderReadOnly);
        }
    }

    for name in pass.outputs() {
        let resource = resources.get(name)?;
        let id = resource.id();
        let image = resource.image;
        let aspect = format::aspect_mask(resource.format);
        let target = ImageState::attachment_for(resource.format);

        let current = resources.image_state(id);
        if current != target {
            batch.add_discard_transition(id, image, current, target, aspect);
            resources.set_image_state(id, target);
        }
    }

    Ok(batch)
}

/// Plan the final hand-off of the last pass's external color outputs to the
/// presentable layout. Depth outputs are never presented.
fn plan_present_barriers(
    resources: &mut ResourceTable,
    pass: &GraphPass,
) -> Result<BarrierBatch, GraphicsError> {
    let mut batch = BarrierBatch::new();

    for name in pass.outputs() {
        let resource = resources.get(name)?;
        if !resource.external || resource.is_depth() {
            continue;
        }
        let id = resource.id();
        let image = resource.image;

        let current = resources.image_state(id);
        batch.add_transition(
            id,
            image,
            current,
            ImageState::PresentSrc,
            vk::ImageAspectFlags::COLOR,
        );
        resources.set_image_state(id, ImageState::PresentSrc);
    }

    Ok(batch)
}

/// Assemble the dynamic rendering attachments for a pass.
///
/// One color attachment per non-depth output and at most one depth
/// attachment, all with store-op STORE and the pass's clear/load policy.
/// The render area comes from the first declared output, falling back to
/// the frame extent for output-less passes (pure compute).
fn build_attachments(
    resources: &ResourceTable,
    pass: &GraphPass,
    frame_extent: vk::Extent2D,
) -> Result<PassAttachments, GraphicsError> {
    let load_op = if pass.clears_outputs() {
        vk::AttachmentLoadOp::CLEAR
    } else {
        vk::AttachmentLoadOp::LOAD
    };

    let mut color = Vec::new();
    let mut depth = None;

    for name in pass.outputs() {
        let resource = resources.get(name)?;
        if resource.is_depth() {
            if depth.is_some() {
                return Err(GraphicsError::MultipleDepthOutputs(pass.name().to_string()));
            }
            depth = Some(
                vk::RenderingAttachmentInfo::default()
                    .image_view(resource.view)
                    .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                    .load_op(load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(resource.clear_value.to_vk_depth_stencil()),
            );
        } else {
            color.push(
                vk::RenderingAttachmentInfo::default()
                    .image_view(resource.view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(resource.clear_value.to_vk_color()),
            );
        }
    }

    let render_area = match pass.outputs().first() {
        Some(name) => {
            let resource = resources.get(name)?;
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: resource.width,
                    height: resource.height,
                },
            }
        }
        None => vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: frame_extent,
        },
    };

    Ok(PassAttachments {
        color,
        depth,
        render_area,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ImageId;
    use ash::vk::Handle;

    const COLOR_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
    const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

    fn image(raw: u64) -> vk::Image {
        vk::Image::from_raw(raw)
    }

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    fn table_with_swap() -> ResourceTable {
        let mut table = ResourceTable::new();
        table.add_external(
            "swap",
            image(1),
            view(10),
            COLOR_FORMAT,
            1920,
            1080,
            ImageState::Undefined,
        );
        table
    }

    #[test]
    fn test_validate_unknown_input() {
        let table = table_with_swap();
        let passes = [GraphPass::new("main").reads("missing").writes("swap")];

        let err = validate_frame(&table, &passes).unwrap_err();
        assert!(matches!(err, GraphicsError::UnknownResource(name) if name == "missing"));
    }

    #[test]
    fn test_validate_internal_input_needs_producer() {
        let mut table = table_with_swap();
        table.add_internal("depth", image(2), view(20), DEPTH_FORMAT, 1920, 1080);

        // "depth" is read before any pass writes it.
        let passes = [GraphPass::new("lighting").reads("depth").writes("swap")];
        let err = validate_frame(&table, &passes).unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::InputNeverWritten { pass, resource }
                if pass == "lighting" && resource == "depth"
        ));

        // Declaring the producer first makes the same frame valid.
        let passes = [
            GraphPass::new("depth_prepass").writes("depth"),
            GraphPass::new("lighting").reads("depth").writes("swap"),
        ];
        validate_frame(&table, &passes).unwrap();
    }

    #[test]
    fn test_validate_external_input_has_no_producer_requirement() {
        let mut table = table_with_swap();
        // Persistent atlas rendered by a previous frame.
        table.add_external(
            "shadow_atlas",
            image(3),
            view(30),
            DEPTH_FORMAT,
            2048,
            2048,
            ImageState::Undefined,
        );

        let passes = [GraphPass::new("main").reads("shadow_atlas").writes("swap")];
        validate_frame(&table, &passes).unwrap();
    }

    #[test]
    fn test_validate_rejects_multiple_depth_outputs() {
        let mut table = table_with_swap();
        table.add_internal("depth_a", image(2), view(20), DEPTH_FORMAT, 1920, 1080);
        table.add_internal("depth_b", image(3), view(30), DEPTH_FORMAT, 1920, 1080);

        let passes = [GraphPass::new("geometry").writes("depth_a").writes("depth_b")];
        let err = validate_frame(&table, &passes).unwrap_err();
        assert!(matches!(err, GraphicsError::MultipleDepthOutputs(pass) if pass == "geometry"));
    }

    #[test]
    fn test_swap_clear_and_present() {
        // One external color target, one pass writing it.
        let mut table = table_with_swap();
        let pass = GraphPass::new("main").writes("swap");
        let swap_id = ImageId::from(image(1));

        let barriers = plan_pass_barriers(&mut table, &pass).unwrap();
        assert_eq!(barriers.len(), 1);
        assert_eq!(table.image_state(swap_id), ImageState::ColorAttachment);

        // Last pass: the external output moves on to the presentable layout.
        let present = plan_present_barriers(&mut table, &pass).unwrap();
        assert_eq!(present.len(), 1);
        assert_eq!(table.image_state(swap_id), ImageState::PresentSrc);
        assert!(present
            .src_stage_mask()
            .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert_eq!(
            present.dst_stage_mask(),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        );
    }

    #[test]
    fn test_depth_write_then_sample() {
        // Depth prepass output consumed by the lighting pass.
        let mut table = table_with_swap();
        table.add_internal("depth", image(2), view(20), DEPTH_FORMAT, 1920, 1080);
        let depth_id = ImageId::from(image(2));

        let prepass = GraphPass::new("depth_prepass").writes("depth");
        let barriers = plan_pass_barriers(&mut table, &prepass).unwrap();
        assert_eq!(barriers.len(), 1);
        assert_eq!(table.image_state(depth_id), ImageState::DepthAttachment);

        let lighting = GraphPass::new("lighting").reads("depth").writes("swap");
        let barriers = plan_pass_barriers(&mut table, &lighting).unwrap();
        assert_eq!(barriers.len(), 2);
        assert_eq!(table.image_state(depth_id), ImageState::ShaderReadOnly);
        // The depth read waits on late fragment test writes specifically.
        assert!(barriers
            .src_stage_mask()
            .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert!(barriers
            .dst_stage_mask()
            .contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
    }

    #[test]
    fn test_no_redundant_transitions() {
        let mut table = table_with_swap();

        let first = GraphPass::new("scene").writes("swap");
        assert_eq!(plan_pass_barriers(&mut table, &first).unwrap().len(), 1);

        // The overlay writes the same target already in attachment state.
        let overlay = GraphPass::new("ui").writes("swap").load_outputs();
        assert!(plan_pass_barriers(&mut table, &overlay).unwrap().is_empty());
    }

    #[test]
    fn test_aliased_views_transition_once() {
        let mut table = ResourceTable::new();
        // Two logical names over one physical atlas image.
        table.add_external(
            "cascade_0",
            image(5),
            view(50),
            DEPTH_FORMAT,
            2048,
            2048,
            ImageState::Undefined,
        );
        table.add_external(
            "cascade_1",
            image(5),
            view(51),
            DEPTH_FORMAT,
            2048,
            2048,
            ImageState::Undefined,
        );

        let write = GraphPass::new("shadows").writes("cascade_0");
        plan_pass_barriers(&mut table, &write).unwrap();

        // Sampling through either name sees the shared attachment state; the
        // second name needs no barrier of its own afterwards.
        let read = GraphPass::new("lighting").reads("cascade_1");
        assert_eq!(plan_pass_barriers(&mut table, &read).unwrap().len(), 1);

        let read_again = GraphPass::new("post").reads("cascade_0");
        assert!(plan_pass_barriers(&mut table, &read_again).unwrap().is_empty());
    }

    #[test]
    fn test_present_skips_internal_and_depth_outputs() {
        let mut table = table_with_swap();
        table.add_internal("hdr", image(2), view(20), COLOR_FORMAT, 1920, 1080);
        table.add_internal("depth", image(3), view(30), DEPTH_FORMAT, 1920, 1080);

        let pass = GraphPass::new("final")
            .writes("swap")
            .writes("hdr")
            .writes("depth");
        plan_pass_barriers(&mut table, &pass).unwrap();

        let present = plan_present_barriers(&mut table, &pass).unwrap();
        assert_eq!(present.len(), 1);
        assert_eq!(
            table.image_state(ImageId::from(image(2))),
            ImageState::ColorAttachment
        );
        assert_eq!(
            table.image_state(ImageId::from(image(3))),
            ImageState::DepthAttachment
        );
    }

    #[test]
    fn test_build_attachments_split_and_policy() {
        let mut table = table_with_swap();
        table.add_internal("depth", image(2), view(20), DEPTH_FORMAT, 1920, 1080);
        table.set_clear_value("depth", ClearValue::depth(1.0));

        let pass = GraphPass::new("geometry").writes("swap").writes("depth");
        let extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };

        let attachments = build_attachments(&table, &pass, extent).unwrap();
        assert_eq!(attachments.color.len(), 1);
        assert!(attachments.depth.is_some());
        assert_eq!(attachments.color[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachments.color[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(
            attachments.depth.unwrap().image_layout,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        );
        assert_eq!(attachments.render_area.extent.width, 1920);

        let overlay = GraphPass::new("ui").writes("swap").load_outputs();
        let attachments = build_attachments(&table, &overlay, extent).unwrap();
        assert_eq!(attachments.color[0].load_op, vk::AttachmentLoadOp::LOAD);
    }

    #[test]
    fn test_build_attachments_render_area_falls_back_to_frame_extent() {
        let table = table_with_swap();
        let pass = GraphPass::new("compute_only");
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        let attachments = build_attachments(&table, &pass, extent).unwrap();
        assert!(attachments.color.is_empty());
        assert!(attachments.depth.is_none());
        assert_eq!(attachments.render_area.extent, extent);
    }
}
