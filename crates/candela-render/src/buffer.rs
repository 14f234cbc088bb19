//! Mesh vertex and index buffer management for shadow rendering.

use bytemuck::{Pod, Zeroable};

/// A complete mesh buffer containing vertex and index data ready for GPU rendering.
pub struct MeshBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
}

impl MeshBuffer {
    /// Bind vertex and index buffers to a render pass.
    pub fn bind<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), self.index_format);
    }

    /// Draw the mesh with the given instance range.
    pub fn draw_instanced(&self, render_pass: &mut wgpu::RenderPass, instances: std::ops::Range<u32>) {
        render_pass.draw_indexed(0..self.index_count, 0, instances);
    }
}

/// Index data that can be either u16 or u32 format.
pub enum IndexData<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    /// Get the appropriate wgpu index format for this data.
    pub fn format(&self) -> wgpu::IndexFormat {
        match self {
            IndexData::U16(_) => wgpu::IndexFormat::Uint16,
            IndexData::U32(_) => wgpu::IndexFormat::Uint32,
        }
    }

    /// Get the number of indices.
    pub fn count(&self) -> u32 {
        match self {
            IndexData::U16(data) => data.len() as u32,
            IndexData::U32(data) => data.len() as u32,
        }
    }

    /// Get the raw byte slice for buffer creation.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(data) => bytemuck::cast_slice(data),
            IndexData::U32(data) => bytemuck::cast_slice(data),
        }
    }
}

/// GPU buffer allocator for creating vertex and index buffers.
pub struct BufferAllocator<'a> {
    device: &'a wgpu::Device,
}

impl<'a> BufferAllocator<'a> {
    /// Create a new buffer allocator with the given device.
    pub fn new(device: &'a wgpu::Device) -> Self {
        Self { device }
    }

    /// Create a complete mesh buffer from vertex and index data.
    pub fn create_mesh(&self, label: &str, vertices: &[u8], indices: IndexData) -> MeshBuffer {
        use wgpu::util::DeviceExt;

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{}-vertices", label)),
                contents: vertices,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });

        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{}-indices", label)),
                contents: indices.as_bytes(),
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            });

        MeshBuffer {
            vertex_buffer,
            index_buffer,
            index_count: indices.count(),
            index_format: indices.format(),
        }
    }
}

/// Position-only vertex format. Shadow passes need no other attributes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct VertexPosition {
    pub position: [f32; 3],
}

impl VertexPosition {
    /// Get the vertex buffer layout for this vertex type.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<VertexPosition>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

/// Registry mapping stable mesh ids to uploaded mesh buffers.
///
/// Scene entities reference meshes by id; the shadow batcher groups draws
/// by id and resolves buffers here at encode time.
#[derive(Default)]
pub struct MeshRegistry {
    meshes: Vec<MeshBuffer>,
}

impl MeshRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mesh and return its id.
    pub fn insert(&mut self, mesh: MeshBuffer) -> u64 {
        self.meshes.push(mesh);
        (self.meshes.len() - 1) as u64
    }

    /// Resolve a mesh by id.
    pub fn get(&self, id: u64) -> Option<&MeshBuffer> {
        self.meshes.get(id as usize)
    }

    /// Number of registered meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// True when no meshes are registered.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok()?;
            adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .ok()
        })
    }

    #[test]
    fn test_mesh_buffer_creation_u16() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let allocator = BufferAllocator::new(&device);

        let vertices: &[VertexPosition] = &[
            VertexPosition {
                position: [0.0, 0.0, 0.0],
            },
            VertexPosition {
                position: [1.0, 0.0, 0.0],
            },
            VertexPosition {
                position: [0.0, 1.0, 0.0],
            },
        ];
        let indices: &[u16] = &[0, 1, 2];

        let mesh = allocator.create_mesh(
            "test-triangle",
            bytemuck::cast_slice(vertices),
            IndexData::U16(indices),
        );

        assert_eq!(mesh.index_count, 3);
        assert_eq!(mesh.index_format, wgpu::IndexFormat::Uint16);
    }

    #[test]
    fn test_mesh_buffer_creation_u32() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let allocator = BufferAllocator::new(&device);

        let vertices = vec![0u8; 120];
        let indices: &[u32] = &[0, 1, 2, 2, 3, 0];

        let mesh = allocator.create_mesh("test-quad", &vertices, IndexData::U32(indices));

        assert_eq!(mesh.index_count, 6);
        assert_eq!(mesh.index_format, wgpu::IndexFormat::Uint32);
    }

    #[test]
    fn test_u16_vs_u32_format_selection() {
        let u16_data = IndexData::U16(&[0, 1, 2]);
        let u32_data = IndexData::U32(&[0, 1, 2]);

        assert_eq!(u16_data.format(), wgpu::IndexFormat::Uint16);
        assert_eq!(u32_data.format(), wgpu::IndexFormat::Uint32);
    }

    #[test]
    fn test_index_data_as_bytes() {
        let indices_u16: &[u16] = &[0, 1, 2];
        let data = IndexData::U16(indices_u16);
        assert_eq!(data.as_bytes().len(), 6);

        let indices_u32: &[u32] = &[0, 1, 2];
        let data = IndexData::U32(indices_u32);
        assert_eq!(data.as_bytes().len(), 12);
    }

    #[test]
    fn test_vertex_position_layout() {
        let layout = VertexPosition::layout();
        assert_eq!(layout.array_stride, 12);
        assert_eq!(layout.attributes.len(), 1);
    }

    #[test]
    fn test_registry_assigns_sequential_ids() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let allocator = BufferAllocator::new(&device);
        let mut registry = MeshRegistry::new();

        let a = registry.insert(allocator.create_mesh("a", &[0u8; 12], IndexData::U16(&[0])));
        let b = registry.insert(allocator.create_mesh("b", &[0u8; 12], IndexData::U16(&[0])));

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(a).is_some());
        assert!(registry.get(99).is_none());
    }
}
