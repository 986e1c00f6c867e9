//! Meshes
//!
//! A [`Mesh`] keeps vertex channels and indices on the CPU until
//! [`Mesh::upload_data`] copies them into device buffers. Uploading with
//! `no_longer_accessible` frees the CPU copy; after that the data getters and
//! setters return [`Error::MeshNotAccessible`].
//!
//! Vertex channels are matched to program attributes by name at draw time.

mod primitives;

use prism_core::{Color, Vec2, Vec3, Vec4};
use prism_gpu::{
    BufferHandle, BufferKind, IndexFormat, PrimitiveTopology, RenderDevice, VertexFormat,
};
use slotmap::new_key_type;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::shader::ShaderProgram;

new_key_type! {
    /// Handle to a mesh stored in a scene
    pub struct MeshId;
}

/// Per-vertex data stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexChannel {
    Position,
    Normal,
    TexCoord0,
    Color0,
    Tangent,
}

impl VertexChannel {
    pub const ALL: [VertexChannel; 5] = [
        VertexChannel::Position,
        VertexChannel::Normal,
        VertexChannel::TexCoord0,
        VertexChannel::Color0,
        VertexChannel::Tangent,
    ];

    /// Vertex shader input name this channel binds to
    pub fn attribute_name(self) -> &'static str {
        match self {
            VertexChannel::Position => "POSITION",
            VertexChannel::Normal => "NORMAL",
            VertexChannel::TexCoord0 => "TEXCOORD_0",
            VertexChannel::Color0 => "COLOR_0",
            VertexChannel::Tangent => "TANGENT",
        }
    }

    pub fn from_attribute_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.attribute_name() == name)
    }

    pub fn format(self) -> VertexFormat {
        match self {
            VertexChannel::Position | VertexChannel::Normal => VertexFormat::Float32x3,
            VertexChannel::TexCoord0 => VertexFormat::Float32x2,
            VertexChannel::Color0 | VertexChannel::Tangent => VertexFormat::Float32x4,
        }
    }
}

/// Range of the index (or vertex) stream drawn as one piece
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubMesh {
    pub start: u32,
    pub count: u32,
    pub topology: PrimitiveTopology,
}

impl SubMesh {
    pub fn new(start: u32, count: u32, topology: PrimitiveTopology) -> Self {
        Self {
            start,
            count,
            topology,
        }
    }
}

#[derive(Debug)]
struct GpuBuffer {
    handle: BufferHandle,
    len: usize,
}

#[derive(Debug)]
struct IndexBuffer {
    buffer: GpuBuffer,
    format: IndexFormat,
}

/// Vertex and index data
#[derive(Debug, Default)]
pub struct Mesh {
    name: String,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    colors: Vec<Color>,
    tangents: Vec<Vec4>,
    indices: Vec<u32>,
    sub_meshes: Vec<SubMesh>,
    released: bool,
    dirty: bool,
    vertex_count: u32,
    index_count: u32,
    vertex_buffers: SmallVec<[(VertexChannel, GpuBuffer); 5]>,
    index_buffer: Option<IndexBuffer>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// False once the CPU copy was released by an upload
    pub fn is_accessible(&self) -> bool {
        !self.released
    }

    /// CPU data changed since the last upload
    pub fn needs_upload(&self) -> bool {
        self.dirty && !self.released
    }

    /// Vertex count as of the last upload
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Index count as of the last upload
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    fn check_accessible(&self) -> Result<()> {
        if self.released {
            Err(Error::MeshNotAccessible)
        } else {
            Ok(())
        }
    }

    fn modify<T>(&mut self, write: impl FnOnce(&mut Self) -> T) -> Result<T> {
        self.check_accessible()?;
        self.dirty = true;
        Ok(write(self))
    }

    // CPU data

    pub fn set_positions(&mut self, positions: Vec<Vec3>) -> Result<()> {
        self.modify(|m| m.positions = positions)
    }

    pub fn positions(&self) -> Result<&[Vec3]> {
        self.check_accessible()?;
        Ok(&self.positions)
    }

    pub fn set_normals(&mut self, normals: Vec<Vec3>) -> Result<()> {
        self.modify(|m| m.normals = normals)
    }

    pub fn normals(&self) -> Result<&[Vec3]> {
        self.check_accessible()?;
        Ok(&self.normals)
    }

    pub fn set_uvs(&mut self, uvs: Vec<Vec2>) -> Result<()> {
        self.modify(|m| m.uvs = uvs)
    }

    pub fn uvs(&self) -> Result<&[Vec2]> {
        self.check_accessible()?;
        Ok(&self.uvs)
    }

    pub fn set_colors(&mut self, colors: Vec<Color>) -> Result<()> {
        self.modify(|m| m.colors = colors)
    }

    pub fn colors(&self) -> Result<&[Color]> {
        self.check_accessible()?;
        Ok(&self.colors)
    }

    pub fn set_tangents(&mut self, tangents: Vec<Vec4>) -> Result<()> {
        self.modify(|m| m.tangents = tangents)
    }

    pub fn tangents(&self) -> Result<&[Vec4]> {
        self.check_accessible()?;
        Ok(&self.tangents)
    }

    pub fn set_indices(&mut self, indices: Vec<u32>) -> Result<()> {
        self.modify(|m| m.indices = indices)
    }

    pub fn indices(&self) -> Result<&[u32]> {
        self.check_accessible()?;
        Ok(&self.indices)
    }

    // Sub-meshes

    pub fn add_sub_mesh(&mut self, sub_mesh: SubMesh) {
        self.sub_meshes.push(sub_mesh);
    }

    pub fn clear_sub_mesh(&mut self) {
        self.sub_meshes.clear();
    }

    pub fn sub_meshes(&self) -> &[SubMesh] {
        &self.sub_meshes
    }

    fn channel_bytes(&self, channel: VertexChannel) -> &[u8] {
        match channel {
            VertexChannel::Position => bytemuck::cast_slice(&self.positions),
            VertexChannel::Normal => bytemuck::cast_slice(&self.normals),
            VertexChannel::TexCoord0 => bytemuck::cast_slice(&self.uvs),
            VertexChannel::Color0 => bytemuck::cast_slice(&self.colors),
            VertexChannel::Tangent => bytemuck::cast_slice(&self.tangents),
        }
    }

    /// Copy CPU data into device buffers
    ///
    /// Buffers are updated in place when their size is unchanged and recreated
    /// otherwise. Channels that became empty lose their buffer. Indices use
    /// 16-bit storage when every vertex is addressable with it.
    pub fn upload_data(
        &mut self,
        device: &mut dyn RenderDevice,
        no_longer_accessible: bool,
    ) -> Result<()> {
        self.check_accessible()?;

        for channel in VertexChannel::ALL {
            let existing = self.vertex_buffers.iter().position(|(c, _)| *c == channel);
            let bytes = self.channel_bytes(channel);
            match existing {
                Some(i) if bytes.is_empty() => {
                    let (_, buffer) = self.vertex_buffers.remove(i);
                    device.delete_buffer(buffer.handle);
                }
                None if bytes.is_empty() => {}
                Some(i) => {
                    let existing = &self.vertex_buffers[i].1;
                    let buffer = write_buffer(device, BufferKind::Vertex, Some(existing), bytes)?;
                    self.vertex_buffers[i].1 = buffer;
                }
                None => {
                    let buffer = write_buffer(device, BufferKind::Vertex, None, bytes)?;
                    self.vertex_buffers.push((channel, buffer));
                }
            }
        }

        if self.indices.is_empty() {
            if let Some(old) = self.index_buffer.take() {
                device.delete_buffer(old.buffer.handle);
            }
        } else {
            let format = if self.positions.len() <= usize::from(u16::MAX) + 1 {
                IndexFormat::Uint16
            } else {
                IndexFormat::Uint32
            };
            let narrow: Vec<u16>;
            let bytes: &[u8] = match format {
                IndexFormat::Uint16 => {
                    narrow = self.indices.iter().map(|&i| i as u16).collect();
                    bytemuck::cast_slice(&narrow)
                }
                IndexFormat::Uint32 => bytemuck::cast_slice(&self.indices),
            };
            let buffer = match self.index_buffer.take() {
                Some(old) if old.format == format => {
                    write_buffer(device, BufferKind::Index, Some(&old.buffer), bytes)?
                }
                Some(old) => {
                    device.delete_buffer(old.buffer.handle);
                    write_buffer(device, BufferKind::Index, None, bytes)?
                }
                None => write_buffer(device, BufferKind::Index, None, bytes)?,
            };
            self.index_buffer = Some(IndexBuffer { buffer, format });
        }

        self.vertex_count = self.positions.len() as u32;
        self.index_count = self.indices.len() as u32;
        self.dirty = false;

        if no_longer_accessible {
            self.positions = Vec::new();
            self.normals = Vec::new();
            self.uvs = Vec::new();
            self.colors = Vec::new();
            self.tangents = Vec::new();
            self.indices = Vec::new();
            self.released = true;
        }

        trace!(
            mesh = %self.name,
            vertices = self.vertex_count,
            indices = self.index_count,
            released = no_longer_accessible,
            "uploaded mesh"
        );
        Ok(())
    }

    /// Bind the buffers `program` reads and draw every sub-mesh
    ///
    /// A mesh without sub-meshes draws its whole index (or vertex) range as
    /// triangles. Sub-meshes reaching past the uploaded data are skipped.
    /// Returns the number of draw calls issued.
    pub fn draw(&self, device: &mut dyn RenderDevice, program: &ShaderProgram) -> u32 {
        if self.vertex_count == 0 {
            return 0;
        }
        self.bind(device, program);

        let whole = match &self.index_buffer {
            Some(_) => SubMesh::new(0, self.index_count, PrimitiveTopology::Triangles),
            None => SubMesh::new(0, self.vertex_count, PrimitiveTopology::Triangles),
        };
        let sub_meshes = if self.sub_meshes.is_empty() {
            std::slice::from_ref(&whole)
        } else {
            &self.sub_meshes[..]
        };

        let mut draws = 0;
        for sub_mesh in sub_meshes {
            if self.draw_range(device, sub_mesh) {
                draws += 1;
            }
        }
        draws
    }

    /// Draw one sub-mesh; false if the index or its range is out of bounds
    pub fn draw_sub_mesh(
        &self,
        device: &mut dyn RenderDevice,
        program: &ShaderProgram,
        index: usize,
    ) -> bool {
        let Some(sub_mesh) = self.sub_meshes.get(index) else {
            return false;
        };
        self.bind(device, program);
        self.draw_range(device, sub_mesh)
    }

    fn bind(&self, device: &mut dyn RenderDevice, program: &ShaderProgram) {
        for attribute in program.attributes() {
            let buffer = VertexChannel::from_attribute_name(&attribute.name).and_then(|channel| {
                self.vertex_buffers
                    .iter()
                    .find(|(c, _)| *c == channel)
                    .map(|(c, b)| (c.format(), b.handle))
            });
            match buffer {
                Some((format, handle)) => device.bind_vertex_buffer(attribute.location, handle, format),
                None => trace!(
                    mesh = %self.name,
                    attribute = %attribute.name,
                    "no vertex channel for attribute"
                ),
            }
        }
        if let Some(index) = &self.index_buffer {
            device.bind_index_buffer(index.buffer.handle, index.format);
        }
    }

    fn draw_range(&self, device: &mut dyn RenderDevice, sub_mesh: &SubMesh) -> bool {
        let available = match &self.index_buffer {
            Some(_) => self.index_count,
            None => self.vertex_count,
        };
        let in_bounds = sub_mesh
            .start
            .checked_add(sub_mesh.count)
            .is_some_and(|end| end <= available);
        if !in_bounds {
            warn!(
                mesh = %self.name,
                start = sub_mesh.start,
                count = sub_mesh.count,
                available,
                "sub-mesh range outside uploaded data, skipping"
            );
            return false;
        }

        match &self.index_buffer {
            Some(index) => {
                let Some(offset) = sub_mesh.start.checked_mul(index.format.size()) else {
                    warn!(mesh = %self.name, start = sub_mesh.start, "index offset overflows, skipping");
                    return false;
                };
                device.draw_elements(sub_mesh.topology, sub_mesh.count, offset, index.format);
            }
            None => device.draw_arrays(sub_mesh.topology, sub_mesh.start, sub_mesh.count),
        }
        true
    }

    /// Delete device buffers; CPU data, if still held, can be uploaded again
    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        for (_, buffer) in self.vertex_buffers.drain(..) {
            device.delete_buffer(buffer.handle);
        }
        if let Some(index) = self.index_buffer.take() {
            device.delete_buffer(index.buffer.handle);
        }
        self.vertex_count = 0;
        self.index_count = 0;
        self.dirty = !self.released;
    }
}

/// Write `bytes` into `existing` when sizes match, otherwise into a new buffer
fn write_buffer(
    device: &mut dyn RenderDevice,
    kind: BufferKind,
    existing: Option<&GpuBuffer>,
    bytes: &[u8],
) -> Result<GpuBuffer> {
    match existing {
        Some(buffer) if buffer.len == bytes.len() => {
            device.update_buffer(buffer.handle, 0, bytes)?;
            Ok(GpuBuffer {
                handle: buffer.handle,
                len: buffer.len,
            })
        }
        Some(buffer) => {
            device.delete_buffer(buffer.handle);
            let handle = device.create_buffer(kind, bytes)?;
            Ok(GpuBuffer {
                handle,
                len: bytes.len(),
            })
        }
        None => {
            let handle = device.create_buffer(kind, bytes)?;
            Ok(GpuBuffer {
                handle,
                len: bytes.len(),
            })
        }
    }
}
