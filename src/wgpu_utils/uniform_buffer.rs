//! Per-draw uniform storage with dynamic offsets
//!
//! Every draw of a frame appends its uniform block to a CPU staging area.
//! At submit time the whole area is uploaded in one write and each draw
//! binds its block through a dynamic offset.

/// Rounds `block_size` up to the device's dynamic offset alignment.
pub fn aligned_stride(block_size: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    block_size.div_ceil(alignment) * alignment
}

pub struct DynamicUniformBuffer {
    buffer: wgpu::Buffer,
    label: String,
    block_size: u64,
    stride: u64,
    capacity: u64,
    staging: Vec<u8>,
    previous_content: Vec<u8>,
}

impl DynamicUniformBuffer {
    /// Buffer for `capacity` blocks of `block_size` bytes.
    pub fn new(device: &wgpu::Device, label: &str, block_size: u64, capacity: u64) -> Self {
        let stride = aligned_stride(
            block_size,
            device.limits().min_uniform_buffer_offset_alignment as u64,
        );
        let capacity = capacity.max(1);

        Self {
            buffer: Self::allocate(device, label, stride * capacity),
            label: label.to_owned(),
            block_size,
            stride,
            capacity,
            staging: Vec::new(),
            previous_content: Vec::new(),
        }
    }

    fn allocate(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("DynamicUniformBuffer: {}", label)),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Appends one block and returns its dynamic offset.
    ///
    /// Shorter blocks are zero padded; longer ones are truncated to the block size.
    pub fn push(&mut self, block: &[u8]) -> u32 {
        let offset = self.staging.len() as u64;
        let used = block.len().min(self.block_size as usize);
        self.staging.extend_from_slice(&block[..used]);
        self.staging.resize((offset + self.stride) as usize, 0);
        offset as u32
    }

    pub fn len(&self) -> u64 {
        self.staging.len() as u64 / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.staging.is_empty()
    }

    /// Uploads the staged blocks. Returns true when the GPU buffer had to be
    /// reallocated, which invalidates bind groups built on the old one.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        let mut reallocated = false;
        if self.len() > self.capacity {
            self.capacity = self.len().next_power_of_two();
            self.buffer = Self::allocate(device, &self.label, self.stride * self.capacity);
            self.previous_content.clear();
            reallocated = true;
            log::debug!("Grew '{}' to {} blocks", self.label, self.capacity);
        }

        if !self.staging.is_empty() && self.previous_content != self.staging {
            queue.write_buffer(&self.buffer, 0, &self.staging);
            self.previous_content = self.staging.clone();
        }
        reallocated
    }

    /// Drops the staged blocks of the previous frame.
    pub fn clear(&mut self) {
        self.staging.clear();
    }

    /// Binding of a single block; the offset is supplied per draw.
    pub fn binding_resource(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(self.block_size),
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_stride() {
        assert_eq!(aligned_stride(192, 256), 256);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(257, 256), 512);
        assert_eq!(aligned_stride(80, 0), 80);
    }
}
