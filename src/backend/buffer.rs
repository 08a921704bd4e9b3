// Host-visible vertex buffers
//
// Memory comes from gpu-allocator (CpuToGpu, persistently mapped). The
// mapping is not assumed to be coherent: writes are followed by an explicit
// flush of the touched range.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use super::VulkanDevice;
use crate::error::{RenderError, RenderResult};

pub struct VertexBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    label: String,
    device: Arc<VulkanDevice>,
}

impl VertexBuffer {
    pub fn new(device: &Arc<VulkanDevice>, label: &str, size: vk::DeviceSize) -> RenderResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .map_err(|e| RenderError::vulkan("create vertex buffer", e))?;

        // From here on Drop destroys the buffer, with or without memory
        let mut this = Self {
            buffer,
            allocation: None,
            size,
            label: label.to_string(),
            device: Arc::clone(device),
        };

        let atom = device.properties.limits.non_coherent_atom_size;
        let requirements = atom_aligned(
            unsafe { device.device.get_buffer_memory_requirements(buffer) },
            atom,
        );

        let allocation = device
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name: label,
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| RenderError::Allocation {
                label: label.to_string(),
                reason: e.to_string(),
            })?;

        let bind = unsafe {
            device.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        this.allocation = Some(allocation);
        bind.map_err(|e| RenderError::vulkan("bind vertex buffer memory", e))?;

        log::debug!("Allocated {} ({} bytes)", this.label, size);
        Ok(this)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Copy `bytes` to the start of the mapped range
    pub fn write(&mut self, bytes: &[u8]) -> RenderResult<()> {
        let not_mapped = || RenderError::NotMapped { label: self.label.clone() };

        let mapped = self
            .allocation
            .as_mut()
            .and_then(|a| a.mapped_slice_mut())
            .ok_or_else(not_mapped)?;

        let Some(dst) = mapped.get_mut(..bytes.len()) else {
            return Err(RenderError::Allocation {
                label: self.label.clone(),
                reason: format!("{} bytes do not fit in {} bytes", bytes.len(), self.size),
            });
        };
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Flush the whole buffer range so the device can see host writes
    pub fn flush(&self) -> RenderResult<()> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| RenderError::NotMapped { label: self.label.clone() })?;

        let atom = self.device.properties.limits.non_coherent_atom_size;
        let (offset, size) = flush_range(allocation.offset(), self.size, atom, allocation.size());

        let range = vk::MappedMemoryRange::builder()
            .memory(unsafe { allocation.memory() })
            .offset(offset)
            .size(size)
            .build();

        unsafe { self.device.device.flush_mapped_memory_ranges(&[range]) }
            .map_err(|e| RenderError::vulkan("flush mapped memory", e))
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::warn!("Failed to free {}: {}", self.label, e);
            }
        }
        unsafe { self.device.device.destroy_buffer(self.buffer, None) };
    }
}

/// Grow the allocation to whole non-coherent atoms so every flush range
/// stays inside memory this buffer owns
fn atom_aligned(mut requirements: vk::MemoryRequirements, atom: u64) -> vk::MemoryRequirements {
    let atom = atom.max(1);
    requirements.alignment = requirements.alignment.max(atom);
    requirements.size = requirements.size.div_ceil(atom) * atom;
    requirements
}

/// Widen `offset..offset + size` to whole non-coherent atoms, never past
/// the end of the allocation (`offset + allocation_size`)
fn flush_range(offset: u64, size: u64, atom: u64, allocation_size: u64) -> (u64, u64) {
    let atom = atom.max(1);
    let start = offset - offset % atom;
    let end = ((offset + size).div_ceil(atom) * atom).min(offset + allocation_size);
    (start, end - start)
}
