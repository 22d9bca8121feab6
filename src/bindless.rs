//! Bindless descriptor registry.
//!
//! A single persistent descriptor set with fixed bindings per resource class.
//! Registration hands out a stable integer index and writes the descriptor
//! immediately; shaders address resources by that index from push-constant
//! payloads, so nothing is rebound per draw.
//!
//! Indices are append-only for the process lifetime. They are never reused
//! or freed, which is what makes concurrent GPU reads of previously written
//! indices safe while new ones are being registered: the set is created with
//! UPDATE_AFTER_BIND and PARTIALLY_BOUND semantics, and no index is ever
//! rewritten while in flight.

use ash::vk;

use crate::error::GraphicsError;

/// Maximum sampled image descriptors (binding 0).
pub const MAX_SAMPLED_IMAGES: u32 = 10_000;
/// Maximum sampled image array descriptors (binding 4).
pub const MAX_SAMPLED_IMAGE_ARRAYS: u32 = 10_000;
/// Maximum storage image descriptors (binding 5).
pub const MAX_STORAGE_IMAGES: u32 = 10_000;
/// Maximum storage buffer descriptors per buffer binding (bindings 1..=3).
pub const MAX_STORAGE_BUFFERS_PER_BINDING: u32 = 2_000;

/// Binding index for sampled images (`sampler2D`).
pub const BINDING_SAMPLED_IMAGES: u32 = 0;
/// Binding index for scene-level storage buffers.
pub const BINDING_SCENE_BUFFERS: u32 = 1;
/// Binding index for material storage buffers.
pub const BINDING_MATERIAL_BUFFERS: u32 = 2;
/// Binding index for light storage buffers.
pub const BINDING_LIGHT_BUFFERS: u32 = 3;
/// Binding index for sampled image arrays (`sampler2DArray`).
pub const BINDING_SAMPLED_IMAGE_ARRAYS: u32 = 4;
/// Binding index for storage images.
pub const BINDING_STORAGE_IMAGES: u32 = 5;

/// Append-only index allocator for one bindless binding.
///
/// The cursor only ever moves forward; there is no free list. Exhausting the
/// capacity is an error, never a wraparound.
#[derive(Debug, Clone)]
pub struct BindingCursor {
    binding: u32,
    capacity: u32,
    next: u32,
}

impl BindingCursor {
    /// Create a cursor for a binding with a fixed capacity.
    pub fn new(binding: u32, capacity: u32) -> Self {
        Self {
            binding,
            capacity,
            next: 0,
        }
    }

    /// Allocate the next free index.
    pub fn allocate(&mut self) -> Result<u32, GraphicsError> {
        if self.next >= self.capacity {
            return Err(GraphicsError::DescriptorCapacityExhausted {
                binding: self.binding,
                capacity: self.capacity,
            });
        }
        let index = self.next;
        self.next += 1;
        Ok(index)
    }

    /// The binding this cursor allocates for.
    pub fn binding(&self) -> u32 {
        self.binding
    }

    /// Number of indices handed out so far.
    pub fn len(&self) -> u32 {
        self.next
    }

    /// Check if no indices have been handed out.
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }

    /// Number of indices still available.
    pub fn remaining(&self) -> u32 {
        self.capacity - self.next
    }
}

/// The storage buffer binding classes.
///
/// Shaders see three independent bindless buffer arrays; registration must
/// name which one the buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageBufferBinding {
    /// Scene-level data (binding 1).
    Scene,
    /// Per-material data (binding 2).
    Material,
    /// Light data (binding 3).
    Light,
}

impl StorageBufferBinding {
    /// The descriptor set binding index for this class.
    pub fn binding(self) -> u32 {
        match self {
            Self::Scene => BINDING_SCENE_BUFFERS,
            Self::Material => BINDING_MATERIAL_BUFFERS,
            Self::Light => BINDING_LIGHT_BUFFERS,
        }
    }

    /// Resolve a raw binding index into a buffer class.
    ///
    /// Anything outside 1..=3 (in particular binding 0, the sampled image
    /// binding) is rejected without touching any allocation state.
    pub fn from_binding(binding: u32) -> Result<Self, GraphicsError> {
        match binding {
            BINDING_SCENE_BUFFERS => Ok(Self::Scene),
            BINDING_MATERIAL_BUFFERS => Ok(Self::Material),
            BINDING_LIGHT_BUFFERS => Ok(Self::Light),
            other => Err(GraphicsError::InvalidBufferBinding(other)),
        }
    }
}

/// The bindless descriptor registry.
///
/// Owns the descriptor set layout, pool, and the single persistent set.
/// Created once at renderer startup and kept for the process lifetime;
/// registration is valid at any point, including steady-state frame setup
/// (e.g. uploading a new light mid-run).
pub struct BindlessRegistry {
    device: ash::Device,
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,

    sampled_images: BindingCursor,
    sampled_image_arrays: BindingCursor,
    storage_images: BindingCursor,
    scene_buffers: BindingCursor,
    material_buffers: BindingCursor,
    light_buffers: BindingCursor,
}

impl BindlessRegistry {
    /// Create the registry: layout, pool, and the persistent set.
    ///
    /// The device must support `descriptorBindingPartiallyBound` and the
    /// update-after-bind features for sampled images, storage images, and
    /// storage buffers.
    pub fn new(device: &ash::Device) -> Result<Self, GraphicsError> {
        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(BINDING_SAMPLED_IMAGES)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(MAX_SAMPLED_IMAGES)
                .stage_flags(vk::ShaderStageFlags::ALL),
            vk::DescriptorSetLayoutBinding::default()
                .binding(BINDING_SCENE_BUFFERS)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(MAX_STORAGE_BUFFERS_PER_BINDING)
                .stage_flags(vk::ShaderStageFlags::ALL),
            vk::DescriptorSetLayoutBinding::default()
                .binding(BINDING_MATERIAL_BUFFERS)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(MAX_STORAGE_BUFFERS_PER_BINDING)
                .stage_flags(vk::ShaderStageFlags::ALL),
            vk::DescriptorSetLayoutBinding::default()
                .binding(BINDING_LIGHT_BUFFERS)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(MAX_STORAGE_BUFFERS_PER_BINDING)
                .stage_flags(vk::ShaderStageFlags::ALL),
            vk::DescriptorSetLayoutBinding::default()
                .binding(BINDING_SAMPLED_IMAGE_ARRAYS)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(MAX_SAMPLED_IMAGE_ARRAYS)
                .stage_flags(vk::ShaderStageFlags::ALL),
            vk::DescriptorSetLayoutBinding::default()
                .binding(BINDING_STORAGE_IMAGES)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(MAX_STORAGE_IMAGES)
                .stage_flags(vk::ShaderStageFlags::ALL),
        ];

        // Writes to fresh indices must be legal while older indices are read
        // by in-flight work.
        let binding_flags = [vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND;
            6];
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .push_next(&mut flags_info);

        let set_layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|e| {
                GraphicsError::Internal(format!("Failed to create bindless set layout: {e:?}"))
            })?;

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: MAX_SAMPLED_IMAGES + MAX_SAMPLED_IMAGE_ARRAYS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 3 * MAX_STORAGE_BUFFERS_PER_BINDING,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: MAX_STORAGE_IMAGES,
            },
        ];

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(1)
            .pool_sizes(&pool_sizes);

        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
                return Err(GraphicsError::Internal(format!(
                    "Failed to create bindless descriptor pool: {e:?}"
                )));
            }
        };

        let set_layouts = [set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);

        let set = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets[0],
            Err(e) => {
                unsafe {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(set_layout, None);
                }
                return Err(GraphicsError::Internal(format!(
                    "Failed to allocate bindless descriptor set: {e:?}"
                )));
            }
        };

        log::info!(
            "Bindless registry created ({MAX_SAMPLED_IMAGES} images, \
             {MAX_STORAGE_BUFFERS_PER_BINDING} buffers per binding)"
        );

        Ok(Self {
            device: device.clone(),
            set_layout,
            pool,
            set,
            sampled_images: BindingCursor::new(BINDING_SAMPLED_IMAGES, MAX_SAMPLED_IMAGES),
            sampled_image_arrays: BindingCursor::new(
                BINDING_SAMPLED_IMAGE_ARRAYS,
                MAX_SAMPLED_IMAGE_ARRAYS,
            ),
            storage_images: BindingCursor::new(BINDING_STORAGE_IMAGES, MAX_STORAGE_IMAGES),
            scene_buffers: BindingCursor::new(
                BINDING_SCENE_BUFFERS,
                MAX_STORAGE_BUFFERS_PER_BINDING,
            ),
            material_buffers: BindingCursor::new(
                BINDING_MATERIAL_BUFFERS,
                MAX_STORAGE_BUFFERS_PER_BINDING,
            ),
            light_buffers: BindingCursor::new(
                BINDING_LIGHT_BUFFERS,
                MAX_STORAGE_BUFFERS_PER_BINDING,
            ),
        })
    }

    /// The descriptor set layout, for pipeline layout creation.
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    /// The persistent descriptor set, bound once per frame by the caller.
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Register a sampled image; returns its permanent index.
    pub fn register_sampled_image(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<u32, GraphicsError> {
        let index = self.sampled_images.allocate()?;
        self.write_image_descriptor(
            BINDING_SAMPLED_IMAGES,
            index,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::DescriptorImageInfo::default()
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image_view(view)
                .sampler(sampler),
        );
        Ok(index)
    }

    /// Register a sampled image array (e.g. a cascaded shadow atlas sampled
    /// as `sampler2DArray`); returns its permanent index.
    pub fn register_sampled_image_array(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Result<u32, GraphicsError> {
        let index = self.sampled_image_arrays.allocate()?;
        self.write_image_descriptor(
            BINDING_SAMPLED_IMAGE_ARRAYS,
            index,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::DescriptorImageInfo::default()
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image_view(view)
                .sampler(sampler),
        );
        Ok(index)
    }

    /// Register a storage image for read/write access from compute passes;
    /// returns its permanent index.
    pub fn register_storage_image(&mut self, view: vk::ImageView) -> Result<u32, GraphicsError> {
        let index = self.storage_images.allocate()?;
        self.write_image_descriptor(
            BINDING_STORAGE_IMAGES,
            index,
            vk::DescriptorType::STORAGE_IMAGE,
            vk::DescriptorImageInfo::default()
                .image_layout(vk::ImageLayout::GENERAL)
                .image_view(view),
        );
        Ok(index)
    }

    /// Register a storage buffer range against one of the three buffer
    /// classes; returns its permanent index within that class.
    ///
    /// Callers holding a raw binding index resolve it with
    /// [`StorageBufferBinding::from_binding`] first; invalid indices fail
    /// there without consuming any slot.
    pub fn register_storage_buffer(
        &mut self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
        binding: StorageBufferBinding,
    ) -> Result<u32, GraphicsError> {
        let cursor = match binding {
            StorageBufferBinding::Scene => &mut self.scene_buffers,
            StorageBufferBinding::Material => &mut self.material_buffers,
            StorageBufferBinding::Light => &mut self.light_buffers,
        };
        let index = cursor.allocate()?;

        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(offset)
            .range(range)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding.binding())
            .dst_array_element(index)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(&buffer_info);

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
        Ok(index)
    }

    fn write_image_descriptor(
        &self,
        binding: u32,
        index: u32,
        descriptor_type: vk::DescriptorType,
        info: vk::DescriptorImageInfo,
    ) {
        let image_info = [info];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding)
            .dst_array_element(index)
            .descriptor_type(descriptor_type)
            .image_info(&image_info);

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }
}

impl Drop for BindlessRegistry {
    fn drop(&mut self) {
        log::info!(
            "Dropping bindless registry ({} sampled images, {} array images, {} storage images)",
            self.sampled_images.len(),
            self.sampled_image_arrays.len(),
            self.storage_images.len()
        );
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}
