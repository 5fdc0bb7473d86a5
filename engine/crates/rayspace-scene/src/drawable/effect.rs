use std::rc::Rc;

use rayspace_gfx::commands::barrier::{GfxResourceBarrier, GfxResourceState};
use rayspace_gfx::commands::command_list::GfxCommandList;
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::resources::buffer::GfxBuffer;
use rayspace_gfx::resources::views::{GfxConstantBufferView, GfxVertexBufferView};
use rayspace_utils::id_issuer::IdIssuer;

use crate::camera::Camera;
use crate::drawable::{ActiveChange, Drawable, DrawableCommon, DrawableKind, DrawableVariant, UploadContext};
use crate::gpu_data::{EffectDataBuffer, EffectVertex};
use crate::shader_buffer::ShaderBuffer;

/// 在光追结果之上光栅化的效果
pub struct Effect {
    common: DrawableCommon,
    device: Rc<dyn GfxDevice>,

    /// [`crate::raster_pipeline::RasterPipeline`] 的序号
    pipeline: Option<usize>,
    instance_data: ShaderBuffer,

    geometry: Option<GfxBuffer>,
    vertex_view: Option<GfxVertexBufferView>,
}
// new & init
impl Effect {
    pub fn new(device: &Rc<dyn GfxDevice>, ids: &IdIssuer) -> GfxResult<Self> {
        let id = ids.issue();
        let instance_data = ShaderBuffer::new(
            device,
            size_of::<EffectDataBuffer>() as u32,
            format!("effect {id} instance data"),
        )?;

        Ok(Self {
            common: DrawableCommon::new(id),
            device: device.clone(),
            pipeline: None,
            instance_data,
            geometry: None,
            vertex_view: None,
        })
    }

    pub fn initialize(&mut self, pipeline: usize) {
        assert!(self.pipeline.is_none(), "effect {} is already initialized", self.common.id());
        self.pipeline = Some(pipeline);
    }
}
// getter
impl Effect {
    #[inline]
    pub fn pipeline(&self) -> usize {
        match self.pipeline {
            Some(pipeline) => pipeline,
            None => panic!("effect {} has no pipeline", self.common.id()),
        }
    }

    #[inline]
    pub fn instance_data_view(&self) -> GfxConstantBufferView {
        self.instance_data.descriptor()
    }

    #[inline]
    pub fn vertex_view(&self) -> Option<GfxVertexBufferView> {
        self.vertex_view
    }
}
// update
impl Effect {
    pub fn set_new_vertices(&mut self, vertices: &[EffectVertex]) -> GfxResult<ActiveChange> {
        let count = vertices.len() as u32;
        let change = self.common.handle_modification(count);
        if count > 0 {
            let name = format!("effect {} upload", self.common.id());
            self.common.stage_upload(&self.device, bytemuck::cast_slice(vertices), name)?;
        }
        Ok(change)
    }

    /// 每帧用相机矩阵刷新实例常量
    pub fn update(&mut self, camera: &Camera) -> GfxResult<()> {
        self.common.clear_transform_dirty();
        self.instance_data.write(&EffectDataBuffer {
            pvm: camera.view_projection() * self.common.transform(),
            z_near: camera.near(),
            z_far: camera.far(),
            _padding: [0.0; 2],
        })
    }

    /// 录制绘制命令，管线与实例常量由调用方绑定
    pub fn draw(&self, cmd: &mut dyn GfxCommandList) {
        let (Some(geometry), Some(view)) = (&self.geometry, self.vertex_view) else {
            panic!("effect {} drawn before its data upload", self.common.id());
        };

        let barrier = GfxResourceBarrier::transition(
            geometry.handle(),
            GfxResourceState::NON_PIXEL_SHADER_RESOURCE,
            GfxResourceState::VERTEX_AND_CONSTANT_BUFFER,
        );
        cmd.resource_barriers(&[barrier]);
        cmd.set_vertex_buffer(0, view);
        cmd.draw_instanced(self.common.element_count(), 1, 0, 0);
        cmd.resource_barriers(&[barrier.reversed()]);
    }
}

impl DrawableVariant for Effect {
    const KIND: DrawableKind = DrawableKind::Effect;

    #[inline]
    fn wrap(self) -> Drawable {
        Drawable::Effect(self)
    }

    #[inline]
    fn from_drawable(drawable: &Drawable) -> Option<&Self> {
        match drawable {
            Drawable::Effect(effect) => Some(effect),
            _ => None,
        }
    }

    #[inline]
    fn from_drawable_mut(drawable: &mut Drawable) -> Option<&mut Self> {
        match drawable {
            Drawable::Effect(effect) => Some(effect),
            _ => None,
        }
    }

    #[inline]
    fn common(&self) -> &DrawableCommon {
        &self.common
    }

    #[inline]
    fn common_mut(&mut self) -> &mut DrawableCommon {
        &mut self.common
    }

    fn do_data_upload(&mut self, ctx: &mut UploadContext<'_>) -> GfxResult<()> {
        let id = self.common.id();
        let stride = size_of::<EffectVertex>() as u64;
        let size = self.common.element_count() as u64 * stride;

        let Some(upload) = self.common.upload_buffer() else {
            panic!("effect {id} has no staged data to upload");
        };

        let geometry = GfxBuffer::new_device_local(
            ctx.device,
            size,
            GfxResourceState::COPY_DEST,
            format!("effect {id} geometry"),
        )?;
        ctx.cmd.copy_buffer_region(geometry.handle(), 0, upload.handle(), 0, size);
        ctx.barriers.push(GfxResourceBarrier::transition(
            geometry.handle(),
            GfxResourceState::COPY_DEST,
            GfxResourceState::NON_PIXEL_SHADER_RESOURCE,
        ));

        self.vertex_view = Some(GfxVertexBufferView {
            address: geometry.device_address(),
            size: size as u32,
            stride: stride as u32,
        });
        self.geometry = Some(geometry);
        Ok(())
    }

    fn do_reset(&mut self) {
        self.pipeline = None;
        self.geometry = None;
        self.vertex_view = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_index_buffer::SharedIndexBuffer;
    use ash::vk;
    use rayspace_gfx::headless::{HeadlessDevice, RecordedCommand};

    #[test]
    fn test_upload_then_draw() {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();
        let mut cmd = device.create_command_list(1, "cmd").unwrap();
        cmd.reset(0);
        let mut index_buffer = SharedIndexBuffer::new(&device);

        let mut effect = Effect::new(&device, &IdIssuer::new()).unwrap();
        effect.initialize(0);
        let vertices = vec![EffectVertex::default(); 3];
        assert_eq!(effect.set_new_vertices(&vertices).unwrap(), ActiveChange::Unchanged);

        let mut ctx = UploadContext {
            device: &device,
            cmd: cmd.as_mut(),
            index_buffer: &mut index_buffer,
            barriers: Vec::new(),
        };
        effect.enqueue_data_upload(&mut ctx).unwrap();
        assert_eq!(ctx.barriers.len(), 1);
        effect.common_mut().cleanup_data_upload();

        headless.take_commands();
        effect.draw(cmd.as_mut());
        let commands = headless.take_commands();
        assert!(matches!(commands[0], RecordedCommand::ResourceBarriers(_)));
        assert!(matches!(
            commands[1],
            RecordedCommand::SetVertexBuffer { slot: 0, view } if view.stride == 16 && view.size == 48
        ));
        assert!(matches!(
            commands[2],
            RecordedCommand::DrawInstanced { vertex_count: 3, instance_count: 1, .. }
        ));
        assert!(matches!(commands[3], RecordedCommand::ResourceBarriers(_)));
    }

    #[test]
    fn test_update_writes_projected_transform() {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();
        let ids = IdIssuer::new();
        let mut camera = Camera::new(&device, &ids).unwrap();
        camera.update(vk::Extent2D { width: 4, height: 4 }).unwrap();

        let mut effect = Effect::new(&device, &ids).unwrap();
        effect
            .common_mut()
            .set_transform(glam::vec3(0.0, 0.0, -5.0), glam::Quat::IDENTITY);
        effect.update(&camera).unwrap();

        let bytes = headless
            .read_address(effect.instance_data_view().address, size_of::<EffectDataBuffer>())
            .unwrap();
        let data: EffectDataBuffer = bytemuck::pod_read_unaligned(&bytes);
        let expected = camera.view_projection() * glam::Mat4::from_translation(glam::vec3(0.0, 0.0, -5.0));
        assert!(data.pvm.abs_diff_eq(expected, 1e-5));
        assert_eq!(data.z_near, camera.near());
    }
}
