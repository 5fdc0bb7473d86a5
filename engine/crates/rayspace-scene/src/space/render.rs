use ash::vk;
use rayspace_gfx::commands::barrier::{GfxResourceBarrier, GfxResourceState};
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::raytracing::tlas_generator::{GfxTlasGenerator, GfxTlasInstance};
use rayspace_gfx::resources::buffer::GfxBuffer;
use rayspace_gfx::resources::views::GfxShaderResourceView;
use rayspace_render_interface::render_data::RenderData;

use crate::drawable::{BlasContext, DrawableVariant, Effect, Mesh, UploadContext};
use crate::drawables_group::{variant, variant_mut};
use crate::space::list_source::SpaceListSource;
use crate::space::{FrameUpdateVisitor, Space, Tlas};

// update
impl Space {
    /// 开始录制第 `frame_index` 帧
    pub fn reset(&mut self, frame_index: usize) {
        self.cmd.reset(frame_index);
    }

    /// 推进时间，刷新全局常量、相机以及每个对象的实例常量
    pub fn update(&mut self, delta: f32) -> GfxResult<()> {
        let _span = tracy_client::span!("Space::update");

        self.time += delta;
        self.globals.time = self.time;
        self.globals.light_direction = self.light.direction().to_array();
        self.global_buffer.write(&self.globals)?;
        self.camera.update(self.resolution)?;

        let mut visitor = FrameUpdateVisitor { camera: &self.camera };
        for &handle in self.all_drawables.values() {
            self.drawables[handle].accept(&mut visitor)?;
        }
        Ok(())
    }

    /// 录制一整帧，结束时关闭命令列表
    pub fn render(&mut self, render_data: &RenderData) -> GfxResult<()> {
        let _span = tracy_client::span!("Space::render");
        assert!(self.pipeline.is_some(), "space rendered before the initial setup step two");

        self.cmd.begin_label("space");

        self.enqueue_uploads()?;
        self.update_global_shader_resources()?;
        if let Some(pipeline) = &mut self.pipeline {
            pipeline.resources.bind(self.cmd.as_mut());
        }
        for animation in &self.animations {
            animation.run(&self.drawables, self.cmd.as_mut());
        }
        self.build_acceleration_structures()?;
        self.dispatch_rays();
        self.copy_outputs(render_data);
        self.draw_effects(render_data);

        self.cmd.end_label();
        self.cmd.close()
    }

    /// 上一帧的 GPU 工作完成后调用，释放上传用的临时 buffer
    pub fn cleanup_render(&mut self) {
        self.meshes.cleanup_data_upload(&mut self.drawables);
        self.effects.cleanup_data_upload(&mut self.drawables);
        self.index_buffer.cleanup_render();
        self.retired_tlas.clear();
    }
}
// tools
impl Space {
    fn enqueue_uploads(&mut self) -> GfxResult<()> {
        let mut ctx = UploadContext {
            device: &self.device,
            cmd: self.cmd.as_mut(),
            index_buffer: &mut self.index_buffer,
            barriers: Vec::new(),
        };
        self.meshes.enqueue_data_upload(&mut self.drawables, &mut ctx)?;
        self.effects.enqueue_data_upload(&mut self.drawables, &mut ctx)
    }

    /// 把本帧的激活变化交给着色器资源，必要时重建全局堆
    fn update_global_shader_resources(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("Space::update_global_shader_resources");
        let Some(pipeline) = &mut self.pipeline else {
            return Ok(());
        };

        let mesh_changes = self.meshes.clear_changed(&self.drawables);
        let effect_changes = self.effects.clear_changed(&self.drawables);

        for animation in &mut self.animations {
            animation.update(&mut pipeline.resources, &self.drawables, self.cmd.as_mut())?;
        }

        let layout = pipeline.layout;
        pipeline.resources.request_list_refresh(layout.mesh_instances, &mesh_changes);
        pipeline.resources.request_list_refresh(layout.mesh_geometry, &mesh_changes);

        if !effect_changes.is_empty() {
            let active = self.effects.active();
            let Some(&first) = active.values().next() else {
                panic!("effect changes recorded without an active effect");
            };
            // 空位用第一个激活效果的常量填充
            let mut views =
                vec![variant::<Effect>(&self.drawables, first).instance_data_view(); self.effects.active_capacity()];
            for (index, &handle) in active.iter() {
                views[index.0] = variant::<Effect>(&self.drawables, handle).instance_data_view();
            }
            pipeline
                .resources
                .set_selection_list_content(pipeline.effect_bindings.instance_data(), &views);
        }

        self.last_update = pipeline.resources.update(&SpaceListSource {
            drawables: &self.drawables,
            meshes: &self.meshes,
            animations: &self.animations,
            mesh_instances: layout.mesh_instances,
            mesh_geometry: layout.mesh_geometry,
        })?;
        if self.last_update.resized {
            log::debug!("space descriptor heap resized to {}", self.last_update.heap_size);
        }
        Ok(())
    }

    /// 动画 mesh 先 refit，随后为需要全新 BLAS 的激活 mesh 构建，最后重建 TLAS
    fn build_acceleration_structures(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("Space::build_acceleration_structures");

        let fresh = self
            .meshes
            .active()
            .values()
            .copied()
            .filter(|&handle| variant::<Mesh>(&self.drawables, handle).requires_fresh_blas())
            .collect::<Vec<_>>();

        let mut ctx = BlasContext {
            device: self.device.as_ref(),
            cmd: self.cmd.as_mut(),
            result_allocator: &self.blas_result_allocator,
            scratch_allocator: &self.blas_scratch_allocator,
            uavs: Vec::new(),
        };
        for animation in &self.animations {
            animation.create_blas(&mut self.drawables, &mut ctx)?;
        }
        for handle in fresh {
            variant_mut::<Mesh>(&mut self.drawables, handle).create_blas(&mut ctx, false)?;
        }
        self.blas_result_allocator.create_barriers(&mut *ctx.cmd, &ctx.uavs);

        self.build_tlas()
    }

    /// 每个激活 mesh 一个实例，InstanceID 为激活序号，正面为逆时针
    pub(super) fn build_tlas(&mut self) -> GfxResult<()> {
        let mut generator = GfxTlasGenerator::new();
        for (active, &handle) in self.meshes.active().iter() {
            let mesh = variant::<Mesh>(&self.drawables, handle);
            let Some(blas_address) = mesh.blas_address() else {
                panic!("active mesh {} has no BLAS", mesh.common().id());
            };
            let material = mesh.material();
            generator.add_instance(GfxTlasInstance {
                blas_address,
                transform: mesh.common().transform(),
                instance_id: active.0 as u32,
                hit_group_index: material.hit_group_index,
                mask: material.flags.bits(),
                flags: vk::GeometryInstanceFlagsKHR::TRIANGLE_FRONT_COUNTERCLOCKWISE,
            });
        }

        let sizes = generator.compute_as_buffer_sizes(self.device.as_ref(), false);
        let tlas = Tlas {
            result: GfxBuffer::new_device_local(
                &self.device,
                sizes.result,
                GfxResourceState::RAYTRACING_ACCELERATION_STRUCTURE,
                "tlas",
            )?,
            scratch: GfxBuffer::new_device_local(
                &self.device,
                sizes.scratch,
                GfxResourceState::UNORDERED_ACCESS,
                "tlas-scratch",
            )?,
            instance_descs: GfxBuffer::new_upload(&self.device, sizes.instance_descs, "tlas-instances")?,
        };
        generator.generate(
            self.cmd.as_mut(),
            &tlas.scratch,
            &tlas.result,
            &tlas.instance_descs,
            false,
            None,
        )?;

        if let Some(pipeline) = &mut self.pipeline {
            let bvh = pipeline.layout.bvh;
            pipeline.resources.create_shader_resource_view(
                bvh,
                0,
                GfxShaderResourceView::AccelerationStructure {
                    address: tlas.result.device_address(),
                },
            );
        }

        // 旧的 TLAS 可能仍被在途的帧引用
        if let Some(previous) = self.tlas.replace(tlas) {
            self.retired_tlas.push(previous);
        }
        Ok(())
    }

    fn dispatch_rays(&mut self) {
        let (Some(pipeline), Some(color), Some(depth)) = (&self.pipeline, &self.color_output, &self.depth_output) else {
            panic!("rays dispatched without outputs");
        };
        let barriers = [color.handle(), depth.handle()].map(|texture| {
            GfxResourceBarrier::transition(
                texture,
                GfxResourceState::PIXEL_SHADER_RESOURCE,
                GfxResourceState::UNORDERED_ACCESS,
            )
        });

        self.cmd.begin_label("dispatch-rays");
        self.cmd.resource_barriers(&barriers);
        self.cmd.set_pipeline(vk::PipelineBindPoint::RAY_TRACING_KHR, pipeline.rt_pipeline);
        self.cmd
            .dispatch_rays(&pipeline.sbt.dispatch_rays_desc(self.resolution.width, self.resolution.height));
        self.cmd.end_label();
    }

    /// 光追输出拷贝到宿主的目标，之后输出回到可采样状态
    fn copy_outputs(&mut self, render_data: &RenderData) {
        let (Some(color), Some(depth)) = (&self.color_output, &self.depth_output) else {
            panic!("outputs copied before the resolution dependent setup");
        };

        let barriers = [
            GfxResourceBarrier::transition(
                color.handle(),
                GfxResourceState::UNORDERED_ACCESS,
                GfxResourceState::COPY_SOURCE,
            ),
            GfxResourceBarrier::transition(
                depth.handle(),
                GfxResourceState::UNORDERED_ACCESS,
                GfxResourceState::COPY_SOURCE,
            ),
            GfxResourceBarrier::transition(
                render_data.render_target,
                GfxResourceState::RENDER_TARGET,
                GfxResourceState::COPY_DEST,
            ),
            GfxResourceBarrier::transition(
                render_data.depth_stencil,
                GfxResourceState::DEPTH_WRITE,
                GfxResourceState::COPY_DEST,
            ),
        ];

        self.cmd.begin_label("copy-outputs");
        self.cmd.resource_barriers(&barriers);
        self.cmd.copy_resource(render_data.render_target.into(), color.handle().into());
        self.cmd.copy_resource(render_data.depth_stencil.into(), depth.handle().into());

        let restore = [
            GfxResourceBarrier::transition(
                color.handle(),
                GfxResourceState::COPY_SOURCE,
                GfxResourceState::PIXEL_SHADER_RESOURCE,
            ),
            GfxResourceBarrier::transition(
                depth.handle(),
                GfxResourceState::COPY_SOURCE,
                GfxResourceState::PIXEL_SHADER_RESOURCE,
            ),
            barriers[2].reversed(),
            barriers[3].reversed(),
        ];
        self.cmd.resource_barriers(&restore);
        self.cmd.end_label();
    }

    fn draw_effects(&mut self, render_data: &RenderData) {
        if self.effects.active().count() == 0 {
            return;
        }
        let Some(pipeline) = &mut self.pipeline else {
            return;
        };

        let cmd = self.cmd.as_mut();
        cmd.begin_label("effects");
        cmd.set_render_targets(render_data.render_target, render_data.depth_stencil);
        cmd.set_viewport(render_data.raster.viewport, render_data.raster.scissor);
        pipeline
            .resources
            .update_constant(cmd, pipeline.effect_bindings.time(), self.time.to_bits());

        for (active, &handle) in self.effects.active().iter() {
            let effect = variant::<Effect>(&self.drawables, handle);
            cmd.set_pipeline(
                vk::PipelineBindPoint::GRAPHICS,
                self.raster_pipelines[effect.pipeline()].handle(),
            );
            pipeline
                .resources
                .bind_selection_list_index(pipeline.effect_bindings.instance_data(), active.0 as u32);
            pipeline.resources.resolve_pending_binds(cmd);
            effect.draw(cmd);
        }
        cmd.end_label();
    }
}
