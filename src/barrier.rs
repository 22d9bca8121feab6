//! Barrier batching and submission.
//!
//! Layout transitions for a pass are collected into a single batch and
//! submitted as one `vkCmdPipelineBarrier` call with unioned stage masks,
//! instead of one pipeline stall per resource.

use std::collections::HashMap;

use ash::vk;

use crate::layout::{ImageId, ImageState};

/// Information for a single image barrier.
#[derive(Debug, Clone)]
struct ImageBarrierInfo {
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access_mask: vk::AccessFlags,
    dst_access_mask: vk::AccessFlags,
    aspect_mask: vk::ImageAspectFlags,
}

/// A batch of image memory barriers to submit together.
///
/// Barriers are keyed by physical image, so a later transition for the same
/// image replaces an earlier one. Transitions where the state does not change
/// are skipped entirely.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    image_barriers: HashMap<ImageId, ImageBarrierInfo>,
    src_stage_mask: vk::PipelineStageFlags,
    dst_stage_mask: vk::PipelineStageFlags,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layout transition whose source masks are derived from the
    /// image's current state.
    ///
    /// Used for read transitions: prior writes in the old state must be made
    /// visible before the new access begins.
    pub fn add_transition(
        &mut self,
        id: ImageId,
        image: vk::Image,
        old_state: ImageState,
        new_state: ImageState,
        aspect_mask: vk::ImageAspectFlags,
    ) {
        if old_state == new_state {
            return;
        }

        self.push(
            id,
            ImageBarrierInfo {
                image,
                old_layout: old_state.to_vk(),
                new_layout: new_state.to_vk(),
                src_access_mask: old_state.src_access_mask(),
                dst_access_mask: new_state.dst_access_mask(),
                aspect_mask,
            },
            old_state.src_stage(),
            new_state.dst_stage(),
        );
    }

    /// Add a layout transition that discards the image's prior contents.
    ///
    /// Used for attachment writes: whatever the image held before is about
    /// to be overwritten, so no prior work needs to be made visible and the
    /// source collapses to top-of-pipe with no access.
    pub fn add_discard_transition(
        &mut self,
        id: ImageId,
        image: vk::Image,
        old_state: ImageState,
        new_state: ImageState,
        aspect_mask: vk::ImageAspectFlags,
    ) {
        if old_state == new_state {
            return;
        }

        self.push(
            id,
            ImageBarrierInfo {
                image,
                old_layout: old_state.to_vk(),
                new_layout: new_state.to_vk(),
                src_access_mask: vk::AccessFlags::empty(),
                dst_access_mask: new_state.dst_access_mask(),
                aspect_mask,
            },
            vk::PipelineStageFlags::TOP_OF_PIPE,
            new_state.dst_stage(),
        );
    }

    fn push(
        &mut self,
        id: ImageId,
        info: ImageBarrierInfo,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    ) {
        self.image_barriers.insert(id, info);
        self.src_stage_mask |= src_stage;
        self.dst_stage_mask |= dst_stage;
    }

    /// Check if the batch has any barriers.
    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty()
    }

    /// Get the number of barriers in the batch.
    pub fn len(&self) -> usize {
        self.image_barriers.len()
    }

    /// Source pipeline stage mask (union of all barriers).
    pub fn src_stage_mask(&self) -> vk::PipelineStageFlags {
        self.src_stage_mask
    }

    /// Destination pipeline stage mask (union of all barriers).
    pub fn dst_stage_mask(&self) -> vk::PipelineStageFlags {
        self.dst_stage_mask
    }

    /// Submit all barriers in a single pipeline barrier command.
    ///
    /// Does nothing if the batch is empty.
    pub fn submit(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }

        let barriers: Vec<vk::ImageMemoryBarrier> = self
            .image_barriers
            .values()
            .map(|info| {
                vk::ImageMemoryBarrier::default()
                    .old_layout(info.old_layout)
                    .new_layout(info.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(info.image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: info.aspect_mask,
                        base_mip_level: 0,
                        level_count: vk::REMAINING_MIP_LEVELS,
                        base_array_layer: 0,
                        layer_count: vk::REMAINING_ARRAY_LAYERS,
                    })
                    .src_access_mask(info.src_access_mask)
                    .dst_access_mask(info.dst_access_mask)
            })
            .collect();

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                self.src_stage_mask,
                self.dst_stage_mask,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &barriers,
            );
        }
    }

    /// Clear all barriers from the batch.
    pub fn clear(&mut self) {
        self.image_barriers.clear();
        self.src_stage_mask = vk::PipelineStageFlags::empty();
        self.dst_stage_mask = vk::PipelineStageFlags::empty();
    }
}
