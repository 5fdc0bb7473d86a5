use rayspace_gfx::resources::views::GfxViewDescriptor;
use rayspace_render_interface::shader_resources::{DescriptorListSource, ListHandle};

use crate::animation::AnimationController;
use crate::drawable::{ActiveIndex, DrawableArena, Mesh};
use crate::drawables_group::{DrawablesGroup, variant};

/// 全局描述符列表的内容
///
/// mesh 的两个列表按激活序号排列，其余列表属于各个动画控制器。
pub(super) struct SpaceListSource<'a> {
    pub drawables: &'a DrawableArena,
    pub meshes: &'a DrawablesGroup<Mesh>,
    pub animations: &'a [AnimationController],

    pub mesh_instances: ListHandle,
    pub mesh_geometry: ListHandle,
}
impl SpaceListSource<'_> {
    fn animation(&self, list: ListHandle) -> &AnimationController {
        let Some(animation) = self.animations.iter().find(|animation| animation.owns_list(list)) else {
            panic!("descriptor list {list:?} has no owner");
        };
        animation
    }

    fn is_mesh_list(&self, list: ListHandle) -> bool {
        list == self.mesh_instances || list == self.mesh_geometry
    }
}
impl DescriptorListSource for SpaceListSource<'_> {
    fn list_size(&self, list: ListHandle) -> u32 {
        if self.is_mesh_list(list) {
            self.meshes.active_capacity() as u32
        } else {
            self.animation(list).list_size()
        }
    }

    fn list_descriptor(&self, list: ListHandle, index: u32) -> Option<GfxViewDescriptor> {
        if !self.is_mesh_list(list) {
            return self.animation(list).list_descriptor(self.drawables, list, index);
        }

        let handle = *self.meshes.active().get(ActiveIndex(index as usize))?;
        let mesh = variant::<Mesh>(self.drawables, handle);
        if list == self.mesh_instances {
            Some(mesh.instance_data_view().into())
        } else {
            mesh.geometry_view().map(Into::into)
        }
    }

    fn for_each_list_index(&self, list: ListHandle, f: &mut dyn FnMut(u32)) {
        if self.is_mesh_list(list) {
            for active in self.meshes.active().indices() {
                f(active.0 as u32);
            }
        } else {
            self.animation(list).for_each_list_index(f);
        }
    }
}
