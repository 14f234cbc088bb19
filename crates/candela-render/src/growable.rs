//! Grow-only GPU buffers for per-frame streaming uploads.
//!
//! Light records, matrices, and directions are re-uploaded every frame with
//! a count that varies between frames. A [`GrowableBuffer`] keeps one wgpu
//! buffer alive across frames and only reallocates when the payload exceeds
//! the current capacity. Capacity never shrinks.

/// Round a requested size up to the next capacity step.
///
/// Doubles from the current capacity until the requirement fits, so repeated
/// small overflows do not cause per-frame reallocation.
pub fn grown_capacity(current: u64, required: u64) -> u64 {
    let mut capacity = current.max(wgpu::COPY_BUFFER_ALIGNMENT);
    while capacity < required {
        capacity *= 2;
    }
    capacity
}

/// A GPU buffer that grows to fit uploads and never shrinks.
pub struct GrowableBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
    len: u64,
    usage: wgpu::BufferUsages,
    label: &'static str,
    generation: u64,
}

impl GrowableBuffer {
    /// Create a buffer with the given initial capacity in bytes.
    /// `COPY_DST` is always added to the usage so uploads work.
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        usage: wgpu::BufferUsages,
        initial_capacity: u64,
    ) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        let capacity = grown_capacity(wgpu::COPY_BUFFER_ALIGNMENT, initial_capacity);
        let buffer = Self::allocate(device, label, usage, capacity);
        Self {
            buffer,
            capacity,
            len: 0,
            usage,
            label,
            generation: 0,
        }
    }

    /// Upload `data` starting at byte 0, growing the buffer first if needed.
    ///
    /// Growth replaces the underlying wgpu buffer; any bind groups built on
    /// the old buffer must be rebuilt by the caller, which is why consumers
    /// check [`Self::generation`] each frame.
    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8]) {
        let required = data.len() as u64;
        if required > self.capacity {
            let capacity = grown_capacity(self.capacity, required);
            log::debug!(
                "growing buffer '{}': {} -> {} bytes",
                self.label,
                self.capacity,
                capacity
            );
            self.buffer = Self::allocate(device, self.label, self.usage, capacity);
            self.capacity = capacity;
            self.generation += 1;
        }
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, data);
        }
        self.len = required;
    }

    /// The underlying wgpu buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Current capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes written by the most recent upload.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when the most recent upload was empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bumped every time the underlying buffer is reallocated.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn allocate(
        device: &wgpu::Device,
        label: &str,
        usage: wgpu::BufferUsages,
        size: u64,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }
}
