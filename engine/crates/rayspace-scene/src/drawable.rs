//! 可绘制对象
//!
//! [`Drawable`] 是 [`Mesh`] 与 [`Effect`] 的和类型，所有对象存放在 [`DrawableArena`] 中，
//! 相互之间只通过 [`DrawableHandle`] 与各种稳定索引引用。
//!
//! 每个对象在以下集合中各占一个位置：
//! - `CommonIndex`：跨类型的全部存活对象
//! - `EntryIndex`：所属 [`crate::drawables_group::DrawablesGroup`] 中的存活对象
//! - `ActiveIndex`：当前参与渲染的对象，只有启用且元素数量非零时存在

pub mod effect;
pub mod mesh;

use std::rc::Rc;

use rayspace_gfx::commands::barrier::GfxResourceBarrier;
use rayspace_gfx::commands::command_list::GfxCommandList;
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_gfx::raytracing::in_buffer_allocator::GfxInBufferAllocator;
use rayspace_gfx::resources::buffer::GfxBuffer;
use rayspace_gfx::resources::handles::BufferHandle;
use rayspace_utils::id_issuer::ObjectId;
use slotmap::SlotMap;

use crate::shared_index_buffer::SharedIndexBuffer;

pub use effect::Effect;
pub use mesh::Mesh;

slotmap::new_key_type! {
    /// 对象在 [`DrawableArena`] 中的永久位置，归还到对象池后依然有效
    pub struct DrawableHandle;
}

rayspace_utils::new_stable_index! {
    /// 在全部存活对象中的位置
    pub struct CommonIndex;
    /// 在所属分组中的位置
    pub struct EntryIndex;
    /// 在所属分组的激活集合中的位置，也是着色器可见的实例序号
    pub struct ActiveIndex;
}

pub type DrawableArena = SlotMap<DrawableHandle, Drawable>;

/// 一次修改之后激活状态需要如何变化
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActiveChange {
    Unchanged,
    Activate,
    Deactivate,
}

/// Mesh 与 Effect 共有的状态
pub struct DrawableCommon {
    id: ObjectId,

    pub(crate) common_index: Option<CommonIndex>,
    pub(crate) entry_index: Option<EntryIndex>,
    pub(crate) active_index: Option<ActiveIndex>,

    enabled: bool,
    position: glam::Vec3,
    rotation: glam::Quat,
    transform: glam::Mat4,
    transform_dirty: bool,

    /// 顶点或包围盒数量
    element_count: u32,
    upload_required: bool,
    upload_enqueued: bool,
    upload_buffer: Option<GfxBuffer>,
}
// new & init
impl DrawableCommon {
    pub(crate) fn new(id: ObjectId) -> Self {
        Self {
            id,
            common_index: None,
            entry_index: None,
            active_index: None,
            enabled: false,
            position: glam::Vec3::ZERO,
            rotation: glam::Quat::IDENTITY,
            transform: glam::Mat4::IDENTITY,
            transform_dirty: true,
            element_count: 0,
            upload_required: false,
            upload_enqueued: false,
            upload_buffer: None,
        }
    }

    /// 回到刚创建时的状态，保留 ID
    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.id);
    }
}
// getter
impl DrawableCommon {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn entry_index(&self) -> Option<EntryIndex> {
        self.entry_index
    }

    #[inline]
    pub fn active_index(&self) -> Option<ActiveIndex> {
        self.active_index
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active_index.is_some()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    #[inline]
    pub fn position(&self) -> glam::Vec3 {
        self.position
    }

    #[inline]
    pub fn rotation(&self) -> glam::Quat {
        self.rotation
    }

    #[inline]
    pub fn transform(&self) -> glam::Mat4 {
        self.transform
    }

    #[inline]
    pub fn is_upload_required(&self) -> bool {
        self.upload_required
    }

    #[inline]
    pub fn is_upload_enqueued(&self) -> bool {
        self.upload_enqueued
    }

    #[inline]
    pub(crate) fn upload_buffer(&self) -> Option<&GfxBuffer> {
        self.upload_buffer.as_ref()
    }
}
// update
impl DrawableCommon {
    pub(crate) fn set_enabled(&mut self, enabled: bool) -> ActiveChange {
        self.enabled = enabled;
        self.active_change()
    }

    pub(crate) fn set_transform(&mut self, position: glam::Vec3, rotation: glam::Quat) {
        self.position = position;
        self.rotation = rotation;
        self.transform = glam::Mat4::from_rotation_translation(rotation, position);
        self.transform_dirty = true;
    }

    /// 返回变换在上次调用后是否改变过
    pub(crate) fn clear_transform_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.transform_dirty, false)
    }

    /// 元素数量变化后的公共处理
    ///
    /// 数量为零时不需要上传，旧的上传数据直接丢弃。
    pub(crate) fn handle_modification(&mut self, element_count: u32) -> ActiveChange {
        assert!(
            !self.upload_enqueued,
            "drawable {} modified while its upload is still in flight",
            self.id
        );

        self.element_count = element_count;
        self.upload_required = element_count > 0;
        if !self.upload_required {
            self.upload_buffer = None;
        }
        self.active_change()
    }

    /// 把新数据放进一个新的上传 buffer
    pub(crate) fn stage_upload(&mut self, device: &Rc<dyn GfxDevice>, data: &[u8], name: String) -> GfxResult<()> {
        let buffer = GfxBuffer::new_upload(device, data.len() as u64, name)?;
        buffer.write_bytes(0, data)?;
        self.upload_buffer = Some(buffer);
        Ok(())
    }

    pub(crate) fn begin_data_upload(&mut self) {
        assert!(self.upload_required, "drawable {} has no pending upload", self.id);
        assert!(!self.upload_enqueued, "drawable {} upload enqueued twice", self.id);
        self.upload_required = false;
        self.upload_enqueued = true;
    }

    pub(crate) fn cleanup_data_upload(&mut self) {
        self.upload_buffer = None;
        self.upload_enqueued = false;
    }

    fn active_change(&self) -> ActiveChange {
        let should_be_active = self.enabled && self.element_count > 0;
        match (should_be_active, self.is_active()) {
            (true, false) => ActiveChange::Activate,
            (false, true) => ActiveChange::Deactivate,
            _ => ActiveChange::Unchanged,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DrawableKind {
    Mesh,
    Effect,
}

pub enum Drawable {
    Mesh(Mesh),
    Effect(Effect),
}
impl Drawable {
    #[inline]
    pub fn kind(&self) -> DrawableKind {
        match self {
            Self::Mesh(_) => DrawableKind::Mesh,
            Self::Effect(_) => DrawableKind::Effect,
        }
    }

    #[inline]
    pub fn common(&self) -> &DrawableCommon {
        match self {
            Self::Mesh(mesh) => mesh.common(),
            Self::Effect(effect) => effect.common(),
        }
    }

    #[inline]
    pub fn common_mut(&mut self) -> &mut DrawableCommon {
        match self {
            Self::Mesh(mesh) => mesh.common_mut(),
            Self::Effect(effect) => effect.common_mut(),
        }
    }

    pub fn accept<V: DrawableVisitor>(&mut self, visitor: &mut V) -> V::Output {
        match self {
            Self::Mesh(mesh) => visitor.visit_mesh(mesh),
            Self::Effect(effect) => visitor.visit_effect(effect),
        }
    }
}

/// 按具体类型分派
pub trait DrawableVisitor {
    type Output;

    fn visit_mesh(&mut self, mesh: &mut Mesh) -> Self::Output;
    fn visit_effect(&mut self, effect: &mut Effect) -> Self::Output;
}

/// 录制数据上传时需要的设备与共享资源
pub struct UploadContext<'a> {
    pub device: &'a Rc<dyn GfxDevice>,
    pub cmd: &'a mut dyn GfxCommandList,
    pub index_buffer: &'a mut SharedIndexBuffer,
    /// 本批上传完成后统一提交的状态转换
    pub barriers: Vec<GfxResourceBarrier>,
}

/// 构建 BLAS 时需要的设备与共享分配器
pub struct BlasContext<'a> {
    pub device: &'a dyn GfxDevice,
    pub cmd: &'a mut dyn GfxCommandList,
    pub result_allocator: &'a GfxInBufferAllocator,
    pub scratch_allocator: &'a GfxInBufferAllocator,
    /// 独立分配的结果 buffer，需要额外的 UAV 屏障
    pub uavs: Vec<BufferHandle>,
}

/// 可以放进 [`crate::drawables_group::DrawablesGroup`] 的具体类型
pub trait DrawableVariant: Sized {
    const KIND: DrawableKind;

    fn wrap(self) -> Drawable;
    fn from_drawable(drawable: &Drawable) -> Option<&Self>;
    fn from_drawable_mut(drawable: &mut Drawable) -> Option<&mut Self>;

    fn common(&self) -> &DrawableCommon;
    fn common_mut(&mut self) -> &mut DrawableCommon;

    /// 录制上传命令，状态转换追加到 `ctx.barriers`
    fn do_data_upload(&mut self, ctx: &mut UploadContext<'_>) -> GfxResult<()>;

    /// 释放类型相关的资源，对象回到可复用的状态
    fn do_reset(&mut self);

    fn enqueue_data_upload(&mut self, ctx: &mut UploadContext<'_>) -> GfxResult<()> {
        self.common_mut().begin_data_upload();
        self.do_data_upload(ctx)
    }

    fn reset(&mut self) {
        self.do_reset();
        self.common_mut().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayspace_utils::id_issuer::IdIssuer;

    #[test]
    fn test_active_change_follows_enabled_and_count() {
        let mut common = DrawableCommon::new(IdIssuer::new().issue());
        assert_eq!(common.set_enabled(true), ActiveChange::Unchanged);
        assert_eq!(common.handle_modification(4), ActiveChange::Activate);
        assert!(common.is_upload_required());

        common.active_index = Some(ActiveIndex(0));
        assert_eq!(common.handle_modification(8), ActiveChange::Unchanged);
        assert_eq!(common.handle_modification(0), ActiveChange::Deactivate);
        assert!(!common.is_upload_required());

        common.active_index = None;
        common.handle_modification(4);
        common.active_index = Some(ActiveIndex(0));
        assert_eq!(common.set_enabled(false), ActiveChange::Deactivate);
    }

    #[test]
    fn test_transform_dirty_is_cleared_once() {
        let mut common = DrawableCommon::new(IdIssuer::new().issue());
        assert!(common.clear_transform_dirty());
        assert!(!common.clear_transform_dirty());

        common.set_transform(glam::vec3(1.0, 0.0, 0.0), glam::Quat::IDENTITY);
        assert_eq!(common.transform().w_axis.x, 1.0);
        assert!(common.clear_transform_dirty());
    }

    #[test]
    #[should_panic(expected = "still in flight")]
    fn test_modification_during_upload_panics() {
        let mut common = DrawableCommon::new(IdIssuer::new().issue());
        common.handle_modification(4);
        common.begin_data_upload();
        common.handle_modification(8);
    }
}
