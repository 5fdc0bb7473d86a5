use std::rc::Rc;

use rayspace_gfx::commands::barrier::{GfxResourceBarrier, GfxResourceState};
use rayspace_gfx::commands::command_list::GfxCommandList;
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::resources::buffer::GfxBuffer;

/// 所有三角形 mesh 共用的 quad 索引
///
/// 第 `q` 个 quad 的索引为 `q*4 + {0, 1, 2, 0, 2, 3}`。需要更多索引时整体重建，
/// 旧的 buffer 由仍在使用它的 mesh 持有，上传 buffer 保留到 [`Self::cleanup_render`]。
pub struct SharedIndexBuffer {
    device: Rc<dyn GfxDevice>,

    indices: Vec<u32>,
    buffer: Option<Rc<GfxBuffer>>,
    index_count: u32,

    uploads: Vec<GfxBuffer>,
}
// new & init
impl SharedIndexBuffer {
    pub fn new(device: &Rc<dyn GfxDevice>) -> Self {
        Self {
            device: device.clone(),
            indices: Vec::new(),
            buffer: None,
            index_count: 0,
            uploads: Vec::new(),
        }
    }
}
// getter
impl SharedIndexBuffer {
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}
// update
impl SharedIndexBuffer {
    /// 返回能覆盖 `vertex_count` 个顶点的索引 buffer 与所需索引数
    ///
    /// 扩容时录制拷贝，并把状态转换追加到 `barriers`。
    pub fn get_index_buffer(
        &mut self,
        cmd: &mut dyn GfxCommandList,
        vertex_count: u32,
        barriers: &mut Vec<GfxResourceBarrier>,
    ) -> GfxResult<(Rc<GfxBuffer>, u32)> {
        assert!(vertex_count > 0, "index buffer requested for an empty mesh");
        assert!(vertex_count % 4 == 0, "vertex count {vertex_count} is not a multiple of four");

        let required_quads = vertex_count / 4;
        let required_indices = required_quads * 6;

        let buffer = match &self.buffer {
            Some(buffer) if required_indices <= self.index_count => buffer.clone(),
            _ => self.grow(cmd, required_quads, barriers)?,
        };
        Ok((buffer, required_indices))
    }

    pub fn cleanup_render(&mut self) {
        self.uploads.clear();
    }
}
// tools
impl SharedIndexBuffer {
    fn grow(
        &mut self,
        cmd: &mut dyn GfxCommandList,
        required_quads: u32,
        barriers: &mut Vec<GfxResourceBarrier>,
    ) -> GfxResult<Rc<GfxBuffer>> {
        let available_quads = self.index_count / 6;
        for quad in available_quads..required_quads {
            let base = quad * 4;
            self.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        let required_indices = required_quads * 6;
        let size = (required_indices as usize * size_of::<u32>()) as u64;

        let upload = GfxBuffer::new_upload(&self.device, size, "shared-index-upload")?;
        upload.write_bytes(0, bytemuck::cast_slice(&self.indices[..required_indices as usize]))?;

        let buffer = Rc::new(GfxBuffer::new_device_local(
            &self.device,
            size,
            GfxResourceState::COPY_DEST,
            "shared-index-buffer",
        )?);
        cmd.copy_buffer_region(buffer.handle(), 0, upload.handle(), 0, size);
        barriers.push(GfxResourceBarrier::transition(
            buffer.handle(),
            GfxResourceState::COPY_DEST,
            GfxResourceState::INDEX_BUFFER | GfxResourceState::NON_PIXEL_SHADER_RESOURCE,
        ));

        log::debug!("shared index buffer grows {} -> {required_indices} indices", self.index_count);

        self.index_count = required_indices;
        self.uploads.push(upload);
        self.buffer = Some(buffer.clone());
        Ok(buffer)
    }
}
