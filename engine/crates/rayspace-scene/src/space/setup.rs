use ash::vk;
use indexmap::IndexMap;
use rayspace_gfx::descriptors::root_signature::{GfxRootParameter, GfxRootSignatureDesc, GfxShaderLocation};
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::pipelines::pipeline_desc::{GfxHitGroupDesc, GfxLocalRootAssociation, GfxRaytracingPipelineDesc};
use rayspace_gfx::pipelines::shader::{ShaderCompileError, ShaderCompiler};
use rayspace_gfx::raytracing::sbt::{GfxSbtEntry, GfxShaderBindingTable};
use rayspace_gfx::resources::texture::{GfxTexture, GfxTextureDesc};
use rayspace_gfx::resources::views::{GfxShaderResourceView, GfxUnorderedAccessView};
use rayspace_render_interface::pipeline_description::SpacePipelineDescription;
use rayspace_render_interface::shader_resources::ShaderResources;

use crate::animation::AnimationController;
use crate::drawable::{Effect, Mesh};
use crate::material::Material;
use crate::raster_pipeline::EffectBindings;
use crate::shader_buffer::ShaderBuffer;
use crate::space::{GlobalLayout, Space, SpacePipeline};

const RAYGEN_SYMBOL: &str = "RayGen";
const MISS_SYMBOL: &str = "Miss";
const SHADOW_MISS_SYMBOL: &str = "ShadowMiss";

const MAX_PAYLOAD_SIZE: u32 = 32;
const MAX_ATTRIBUTE_SIZE: u32 = 8;
const MAX_RECURSION_DEPTH: u32 = 2;

pub const COLOR_OUTPUT_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
pub const DEPTH_OUTPUT_FORMAT: vk::Format = vk::Format::R32_SFLOAT;

/// 两个纹理槽中的纹理
///
/// 数量少于槽位大小时，剩余位置使用占位纹理。同一批纹理的宽高必须一致。
#[derive(Default)]
pub struct SpaceTextures<'a> {
    pub first_slot: Vec<&'a GfxTexture>,
    pub second_slot: Vec<&'a GfxTexture>,
}

fn texture_view(texture: &GfxTexture) -> GfxShaderResourceView {
    GfxShaderResourceView::Texture2D {
        texture: texture.handle(),
        format: texture.format(),
        mip_levels: texture.mip_levels(),
    }
}

// new & init
impl Space {
    /// 录制空场景的 TLAS，并创建占位纹理
    pub fn perform_initial_setup_step_one(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("Space::perform_initial_setup_step_one");

        self.cmd.reset(0);
        self.build_tlas()?;
        self.sentinel_texture = Some(GfxTexture::new(
            &self.device,
            GfxTextureDesc::sampled_2d(vk::Extent2D { width: 1, height: 1 }, vk::Format::R8G8B8A8_UNORM, "sentinel"),
        )?);
        self.cmd.close()
    }

    /// 按分辨率重建光追输出
    pub fn perform_resolution_dependent_setup(&mut self, resolution: vk::Extent2D) -> GfxResult<()> {
        let _span = tracy_client::span!("Space::perform_resolution_dependent_setup");
        assert!(
            resolution.width > 0 && resolution.height > 0,
            "invalid resolution {}x{}",
            resolution.width,
            resolution.height
        );

        self.color_output = Some(GfxTexture::new(
            &self.device,
            GfxTextureDesc::storage_2d(resolution, COLOR_OUTPUT_FORMAT, "space color output"),
        )?);
        self.depth_output = Some(GfxTexture::new(
            &self.device,
            GfxTextureDesc::storage_2d(resolution, DEPTH_OUTPUT_FORMAT, "space depth output"),
        )?);
        self.resolution = resolution;
        self.refresh_output_views();

        log::info!("space outputs resized to {}x{}", resolution.width, resolution.height);
        Ok(())
    }

    /// 编译着色器，创建材质、动画控制器、着色器资源、光追管线与 SBT
    ///
    /// 任一着色器编译失败时把错误交给 `on_error` 并返回 `Ok(false)`。
    pub fn perform_initial_setup_step_two(
        &mut self,
        description: &SpacePipelineDescription,
        compiler: &dyn ShaderCompiler,
        textures: SpaceTextures<'_>,
        on_error: &mut dyn FnMut(&ShaderCompileError),
    ) -> GfxResult<bool> {
        let _span = tracy_client::span!("Space::perform_initial_setup_step_two");
        assert!(self.pipeline.is_none(), "initial setup step two runs twice");
        let Some(sentinel) = &self.sentinel_texture else {
            panic!("initial setup step two runs before step one");
        };

        // 着色器
        let compiled = description
            .libraries()
            .map(|file| compiler.compile_library(&file.path, &file.symbols))
            .collect::<Result<Vec<_>, _>>()
            .and_then(|libraries| {
                let compute_shaders = description
                    .compute_shaders()
                    .map(|file| compiler.compile_compute(&file.path))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((libraries, compute_shaders))
            });
        let (libraries, compute_shaders) = match compiled {
            Ok(shaders) => shaders,
            Err(error) => {
                log::error!("{error}");
                on_error(&error);
                return Ok(false);
            }
        };

        // 材质
        let mut materials = IndexMap::new();
        for (index, material) in description.materials.iter().enumerate() {
            if materials.contains_key(&material.name) {
                log::error!("material '{}' is registered twice", material.name);
                return Ok(false);
            }
            let animation = material.is_animated.then_some(material.animation_shader_index as usize);
            if let Some(animation) = animation {
                assert!(
                    animation < compute_shaders.len(),
                    "material '{}' uses animation {animation} but only {} compute shaders exist",
                    material.name,
                    compute_shaders.len()
                );
            }
            materials.insert(material.name.clone(), Material::new(&self.device, material, index as u32, animation)?);
        }

        let mut animations = compute_shaders
            .into_iter()
            .enumerate()
            .map(|(index, shader)| AnimationController::new(&self.device, shader, index))
            .collect::<Vec<_>>();

        if description.custom_data_buffer_size > 0 {
            self.custom_data = Some(ShaderBuffer::new(
                &self.device,
                description.custom_data_buffer_size,
                "space custom data",
            )?);
        }

        // 着色器资源
        let texture_counts = [
            description.texture_count_first_slot,
            description.texture_count_second_slot,
        ];
        let camera_address = self.camera.buffer_address();
        let custom_data_address = self.custom_data.as_ref().map(ShaderBuffer::address);
        let global_address = self.global_buffer.address();

        let mut graphics_entries = None;
        let mut effect_bindings = None;
        let mut compute_layout = None;
        let mut resources = ShaderResources::new(
            &self.device,
            "space",
            |graphics| {
                graphics.add_heap_descriptor_table(|table| {
                    graphics_entries = Some((
                        table.add_shader_resource_view(GfxShaderLocation::new(0, 0), 1),
                        table.add_shader_resource_view(GfxShaderLocation::new(1, 0), 1),
                    ));
                });
                graphics.add_static_sampler(GfxShaderLocation::new(0, 0), vk::Filter::LINEAR);
                effect_bindings = Some(EffectBindings::set_up(graphics));
            },
            |compute| {
                compute.add_constant_buffer_view(camera_address, GfxShaderLocation::new(0, 0));
                if let Some(address) = custom_data_address {
                    compute.add_constant_buffer_view(address, GfxShaderLocation::new(1, 0));
                }
                compute.add_constant_buffer_view(global_address, GfxShaderLocation::new(2, 0));
                compute.add_static_sampler(GfxShaderLocation::new(0, 0), vk::Filter::LINEAR);

                let mut texture_entries = None;
                compute.add_heap_descriptor_table(|table| {
                    texture_entries = Some([
                        table.add_shader_resource_view(GfxShaderLocation::new(0, 1), texture_counts[0].max(1)),
                        table.add_shader_resource_view(GfxShaderLocation::new(0, 2), texture_counts[1].max(1)),
                    ]);
                });
                let mut frame_entries = None;
                compute.add_heap_descriptor_table(|table| {
                    frame_entries = Some((
                        table.add_shader_resource_view(GfxShaderLocation::new(0, 0), 1),
                        table.add_unordered_access_view(GfxShaderLocation::new(0, 0), 1),
                        table.add_unordered_access_view(GfxShaderLocation::new(1, 0), 1),
                    ));
                });

                let mesh_instances = compute.add_constant_buffer_view_descriptor_list(GfxShaderLocation::new(4, 0));
                let mesh_geometry = compute.add_shader_resource_view_descriptor_list(GfxShaderLocation::new(1, 0));

                for animation in &mut animations {
                    animation.set_up_resource_layout(compute);
                }
                compute_layout = Some((texture_entries, frame_entries, mesh_instances, mesh_geometry));
            },
        )?;

        let (
            Some((color_srv, depth_srv)),
            Some(effect_bindings),
            Some((Some(textures_entries), Some((bvh, color_uav, depth_uav)), mesh_instances, mesh_geometry)),
        ) = (graphics_entries, effect_bindings, compute_layout)
        else {
            panic!("space resource layout is incomplete");
        };
        let layout = GlobalLayout {
            color_srv,
            depth_srv,
            textures: textures_entries,
            bvh,
            color_uav,
            depth_uav,
            mesh_instances,
            mesh_geometry,
        };

        for animation in &mut animations {
            animation.initialize(resources.compute_root_signature())?;
        }

        // 光追管线
        let hit_groups = materials
            .values()
            .flat_map(Material::hit_groups)
            .cloned()
            .collect::<Vec<GfxHitGroupDesc>>();
        let hit_group_root_signature = self.device.create_root_signature(&GfxRootSignatureDesc {
            parameters: vec![GfxRootParameter::ConstantBufferView {
                location: GfxShaderLocation::new(3, 0),
            }],
            local: true,
            name: "space-hit-group".to_string(),
            ..Default::default()
        })?;
        let empty_root_signature = self.device.create_root_signature(&GfxRootSignatureDesc {
            local: true,
            name: "space-empty-local".to_string(),
            ..Default::default()
        })?;

        let rt_pipeline = self.device.create_raytracing_pipeline(&GfxRaytracingPipelineDesc {
            libraries: libraries.iter().collect(),
            hit_groups: hit_groups.clone(),
            global_root_signature: resources.compute_root_signature(),
            local_root_signatures: vec![
                GfxLocalRootAssociation {
                    root_signature: hit_group_root_signature,
                    exports: hit_groups.iter().map(|group| group.name.clone()).collect(),
                },
                GfxLocalRootAssociation {
                    root_signature: empty_root_signature,
                    exports: [RAYGEN_SYMBOL, MISS_SYMBOL, SHADOW_MISS_SYMBOL].map(String::from).to_vec(),
                },
            ],
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_attribute_size: MAX_ATTRIBUTE_SIZE,
            max_recursion_depth: MAX_RECURSION_DEPTH,
            name: "space".to_string(),
        })?;

        let hit_entries = materials.values().flat_map(Material::sbt_entries).collect::<Vec<_>>();
        let sbt = GfxShaderBindingTable::new(
            &self.device,
            rt_pipeline,
            &GfxSbtEntry::new(RAYGEN_SYMBOL),
            &[GfxSbtEntry::new(MISS_SYMBOL), GfxSbtEntry::new(SHADOW_MISS_SYMBOL)],
            &hit_entries,
            "space sbt",
        )?;

        // 纹理槽
        let slots = [&textures.first_slot, &textures.second_slot];
        let mut texture_size: Option<vk::Extent2D> = None;
        for texture in slots.iter().flat_map(|slot| slot.iter()) {
            let extent = texture.extent();
            match texture_size {
                None => texture_size = Some(extent),
                Some(size) => assert!(
                    size.width == extent.width && size.height == extent.height,
                    "texture '{}' is {}x{}, expected {}x{}",
                    texture.name(),
                    extent.width,
                    extent.height,
                    size.width,
                    size.height
                ),
            }
        }
        for ((entry, count), slot) in layout.textures.iter().zip(texture_counts).zip(slots) {
            assert!(
                slot.len() as u32 <= count,
                "{} textures given for a slot of {count}",
                slot.len()
            );
            for offset in 0..count.max(1) {
                let texture = slot.get(offset as usize).copied().unwrap_or(sentinel);
                resources.create_shader_resource_view(*entry, offset, texture_view(texture));
            }
        }
        if let Some(size) = texture_size {
            self.globals.texture_size = [size.width, size.height, 1];
        }

        log::info!(
            "space pipeline ready: {} materials, {} animations, {} hit groups",
            materials.len(),
            animations.len(),
            hit_groups.len()
        );

        self.materials = materials;
        self.animations = animations;
        self.mesh_spool_count = description.mesh_spool_count;
        self.effect_spool_count = description.effect_spool_count;
        self.pipeline = Some(SpacePipeline {
            resources,
            layout,
            effect_bindings,
            rt_pipeline,
            sbt,
        });
        self.refresh_output_views();
        Ok(true)
    }

    /// 按描述预先创建 mesh 与效果
    pub fn spool_up(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("Space::spool_up");

        let (device, ids) = (&self.device, &self.ids);
        self.meshes
            .spool(&mut self.drawables, self.mesh_spool_count as usize, || Mesh::new(device, ids))?;
        self.effects
            .spool(&mut self.drawables, self.effect_spool_count as usize, || Effect::new(device, ids))?;
        Ok(())
    }
}
// tools
impl Space {
    /// 把当前的光追输出写进两个根签名的描述符表，还没有输出或管线时跳过
    fn refresh_output_views(&mut self) {
        let (Some(pipeline), Some(color), Some(depth)) = (&mut self.pipeline, &self.color_output, &self.depth_output)
        else {
            return;
        };
        let layout = pipeline.layout;
        let resources = &mut pipeline.resources;

        resources.create_unordered_access_view(
            layout.color_uav,
            0,
            GfxUnorderedAccessView::Texture2D {
                texture: color.handle(),
                format: color.format(),
            },
        );
        resources.create_unordered_access_view(
            layout.depth_uav,
            0,
            GfxUnorderedAccessView::Texture2D {
                texture: depth.handle(),
                format: depth.format(),
            },
        );
        resources.create_shader_resource_view(layout.color_srv, 0, texture_view(color));
        resources.create_shader_resource_view(layout.depth_srv, 0, texture_view(depth));
    }
}
