use std::marker::PhantomData;

use rayspace_gfx::error::GfxResult;
use rayspace_utils::bag::Bag;
use rayspace_utils::integer_set::IntegerSet;

use crate::drawable::{
    ActiveIndex, CommonIndex, DrawableArena, DrawableHandle, DrawableVariant, EntryIndex, UploadContext,
};

/// 同一种可绘制对象的集合
///
/// 对象本身存放在外部的 [`DrawableArena`] 中，这里只记录 handle：
/// - `entries`：所有已创建且未归还的对象
/// - `pool`：已归还、等待复用的对象
/// - `active`：参与渲染的对象，索引即着色器可见的实例序号
/// - `modified`：自上次 [`Self::cleanup_data_upload`] 以来数据被修改过的对象
/// - `activated`：自上次 [`Self::clear_changed`] 以来新占用的激活位置
pub struct DrawablesGroup<D: DrawableVariant> {
    entries: Bag<DrawableHandle, EntryIndex>,
    pool: Vec<DrawableHandle>,

    modified: IntegerSet<EntryIndex>,
    activated: IntegerSet<ActiveIndex>,
    active: Bag<DrawableHandle, ActiveIndex>,

    _marker: PhantomData<fn() -> D>,
}
impl<D: DrawableVariant> Default for DrawablesGroup<D> {
    fn default() -> Self {
        Self {
            entries: Bag::new(),
            pool: Vec::new(),
            modified: IntegerSet::new(),
            activated: IntegerSet::new(),
            active: Bag::new(),
            _marker: PhantomData,
        }
    }
}
// new & init
impl<D: DrawableVariant> DrawablesGroup<D> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 预先创建 `count` 个对象放进对象池
    pub fn spool(
        &mut self,
        objects: &mut DrawableArena,
        count: usize,
        mut make: impl FnMut() -> GfxResult<D>,
    ) -> GfxResult<()> {
        self.pool.reserve(count);
        for _ in 0..count {
            let handle = objects.insert(make()?.wrap());
            self.pool.push(handle);
        }
        log::debug!("{:?} pool spooled to {} objects", D::KIND, self.pool.len());
        Ok(())
    }
}
// getter
impl<D: DrawableVariant> DrawablesGroup<D> {
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.count()
    }

    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    #[inline]
    pub fn active(&self) -> &Bag<DrawableHandle, ActiveIndex> {
        &self.active
    }

    /// 激活集合的容量，即着色器可见的实例列表长度
    #[inline]
    pub fn active_capacity(&self) -> usize {
        self.active.capacity()
    }

    #[inline]
    pub fn is_modified(&self, entry: EntryIndex) -> bool {
        self.modified.contains(entry)
    }

    /// 被修改过的对象，按 entry 序号排列
    pub fn modified(&self) -> impl Iterator<Item = DrawableHandle> + '_ {
        self.modified.iter().map(|entry| self.entries[entry])
    }
}
// update
impl<D: DrawableVariant> DrawablesGroup<D> {
    /// 从对象池取出或新建一个对象，登记后交给 `init` 初始化
    pub fn create(
        &mut self,
        objects: &mut DrawableArena,
        all: &mut Bag<DrawableHandle, CommonIndex>,
        make: impl FnOnce() -> GfxResult<D>,
        init: impl FnOnce(&mut D),
    ) -> GfxResult<DrawableHandle> {
        let handle = match self.pool.pop() {
            Some(handle) => handle,
            None => objects.insert(make()?.wrap()),
        };

        let entry = self.entries.push(handle);
        let common = all.push(handle);

        let drawable = variant_mut::<D>(objects, handle);
        init(drawable);
        let drawable_common = drawable.common_mut();
        drawable_common.entry_index = Some(entry);
        drawable_common.common_index = Some(common);

        Ok(handle)
    }

    pub fn mark_modified(&mut self, drawable: &D) {
        let Some(entry) = drawable.common().entry_index() else {
            panic!("drawable {} is not part of a group", drawable.common().id());
        };
        self.modified.insert(entry);
    }

    pub fn activate(&mut self, handle: DrawableHandle, drawable: &mut D) {
        let common = drawable.common_mut();
        assert!(!common.is_active(), "drawable {} is already active", common.id());

        let active = self.active.push(handle);
        self.activated.insert(active);
        common.active_index = Some(active);
    }

    pub fn deactivate(&mut self, drawable: &mut D) {
        let common = drawable.common_mut();
        let Some(active) = common.active_index.take() else {
            panic!("drawable {} is not active", common.id());
        };
        self.active.pop(active);
        self.activated.erase(active);
    }

    /// 归还对象：移出所有集合并重置，handle 进入对象池
    pub fn return_drawable(
        &mut self,
        handle: DrawableHandle,
        drawable: &mut D,
        all: &mut Bag<DrawableHandle, CommonIndex>,
    ) {
        let common = drawable.common();
        assert!(!common.is_active(), "drawable {} must be deactivated before return", common.id());
        let (Some(entry), Some(common_index)) = (common.entry_index(), common.common_index) else {
            panic!("drawable {} is not part of a group", common.id());
        };

        self.modified.erase(entry);
        self.entries.pop(entry);
        all.pop(common_index);

        drawable.reset();
        self.pool.push(handle);
    }

    /// 本帧需要刷新描述符的激活位置：新激活的，以及被修改过且处于激活状态的
    ///
    /// 调用后清空激活记录。
    pub fn clear_changed(&mut self, objects: &DrawableArena) -> IntegerSet<ActiveIndex> {
        let mut changed = self.activated.clone();
        for entry in self.modified.iter() {
            let drawable = variant::<D>(objects, self.entries[entry]);
            if let Some(active) = drawable.common().active_index() {
                changed.insert(active);
            }
        }
        self.activated.clear();
        changed
    }

    /// 为被修改过的对象录制上传，状态转换合并为一次提交
    pub fn enqueue_data_upload(&mut self, objects: &mut DrawableArena, ctx: &mut UploadContext<'_>) -> GfxResult<()> {
        let _span = tracy_client::span!("DrawablesGroup::enqueue_data_upload");

        for entry in self.modified.iter() {
            let drawable = variant_mut::<D>(objects, self.entries[entry]);
            if drawable.common().is_upload_required() {
                drawable.enqueue_data_upload(ctx)?;
            }
        }

        if !ctx.barriers.is_empty() {
            ctx.cmd.resource_barriers(&ctx.barriers);
            ctx.barriers.clear();
        }
        Ok(())
    }

    /// GPU 完成上传后释放上传 buffer，并清空修改记录
    pub fn cleanup_data_upload(&mut self, objects: &mut DrawableArena) {
        for entry in self.modified.iter() {
            variant_mut::<D>(objects, self.entries[entry])
                .common_mut()
                .cleanup_data_upload();
        }
        self.modified.clear();
    }
}

/// 按类型取出对象，handle 失效或类型不符属于调用错误
pub fn variant<D: DrawableVariant>(objects: &DrawableArena, handle: DrawableHandle) -> &D {
    match objects.get(handle).and_then(D::from_drawable) {
        Some(drawable) => drawable,
        None => panic!("{handle:?} does not refer to a {:?}", D::KIND),
    }
}

pub fn variant_mut<D: DrawableVariant>(objects: &mut DrawableArena, handle: DrawableHandle) -> &mut D {
    match objects.get_mut(handle).and_then(D::from_drawable_mut) {
        Some(drawable) => drawable,
        None => panic!("{handle:?} does not refer to a {:?}", D::KIND),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::drawable::{Effect, Mesh};
    use crate::gpu_data::EffectVertex;
    use rayspace_gfx::foundation::device::GfxDevice;
    use rayspace_gfx::headless::HeadlessDevice;
    use rayspace_utils::id_issuer::IdIssuer;

    struct Fixture {
        device: Rc<dyn GfxDevice>,
        ids: IdIssuer,
        objects: DrawableArena,
        all: Bag<DrawableHandle, CommonIndex>,
        group: DrawablesGroup<Effect>,
    }
    impl Fixture {
        fn new() -> Self {
            Self {
                device: Rc::new(HeadlessDevice::new()),
                ids: IdIssuer::new(),
                objects: DrawableArena::with_key(),
                all: Bag::new(),
                group: DrawablesGroup::new(),
            }
        }

        fn create(&mut self) -> DrawableHandle {
            let (device, ids) = (&self.device, &self.ids);
            self.group
                .create(&mut self.objects, &mut self.all, || Effect::new(device, ids), |effect| effect.initialize(0))
                .unwrap()
        }

        fn effect(&mut self, handle: DrawableHandle) -> &mut Effect {
            variant_mut::<Effect>(&mut self.objects, handle)
        }
    }

    #[test]
    fn test_spooled_objects_are_reused() {
        let mut fixture = Fixture::new();
        let (device, ids) = (fixture.device.clone(), &fixture.ids);
        fixture
            .group
            .spool(&mut fixture.objects, 2, || Effect::new(&device, ids))
            .unwrap();
        assert_eq!(fixture.objects.len(), 2);

        let first = fixture.create();
        let second = fixture.create();
        let third = fixture.create();
        assert_eq!(fixture.objects.len(), 3);
        assert_eq!(fixture.group.pool_size(), 0);
        assert_eq!(fixture.group.entry_count(), 3);
        assert_eq!(fixture.all.count(), 3);

        let effect = variant_mut::<Effect>(&mut fixture.objects, second);
        fixture.group.return_drawable(second, effect, &mut fixture.all);
        assert_eq!(fixture.group.pool_size(), 1);
        assert_eq!(fixture.all.count(), 2);

        // 归还的对象被下一次创建复用，并占用空出的位置
        let fourth = fixture.create();
        assert_eq!(fourth, second);
        assert_eq!(fixture.effect(fourth).common().entry_index(), Some(EntryIndex(1)));
        assert_ne!(first, third);
    }

    #[test]
    fn test_clear_changed_merges_activations_and_modifications() {
        let mut fixture = Fixture::new();
        let a = fixture.create();
        let b = fixture.create();

        for handle in [a, b] {
            let effect = variant_mut::<Effect>(&mut fixture.objects, handle);
            fixture.group.activate(handle, effect);
        }
        let changed = fixture.group.clear_changed(&fixture.objects);
        assert_eq!(changed.iter().collect::<Vec<_>>(), vec![ActiveIndex(0), ActiveIndex(1)]);

        // 激活记录已清空，只剩被修改的对象
        let effect = variant_mut::<Effect>(&mut fixture.objects, b);
        effect.set_new_vertices(&[EffectVertex::default(); 3]).unwrap();
        fixture.group.mark_modified(variant::<Effect>(&fixture.objects, b));
        let changed = fixture.group.clear_changed(&fixture.objects);
        assert_eq!(changed.iter().collect::<Vec<_>>(), vec![ActiveIndex(1)]);
    }

    #[test]
    fn test_deactivate_frees_active_slot() {
        let mut fixture = Fixture::new();
        let a = fixture.create();
        let b = fixture.create();
        for handle in [a, b] {
            let effect = variant_mut::<Effect>(&mut fixture.objects, handle);
            fixture.group.activate(handle, effect);
        }

        let effect = variant_mut::<Effect>(&mut fixture.objects, a);
        fixture.group.deactivate(effect);
        assert_eq!(fixture.group.active().count(), 1);
        assert_eq!(fixture.group.active_capacity(), 2);

        // 新激活的对象填入空位
        let c = fixture.create();
        let effect = variant_mut::<Effect>(&mut fixture.objects, c);
        fixture.group.activate(c, effect);
        assert_eq!(fixture.effect(c).common().active_index(), Some(ActiveIndex(0)));
    }

    #[test]
    #[should_panic(expected = "must be deactivated")]
    fn test_returning_active_drawable_panics() {
        let mut fixture = Fixture::new();
        let a = fixture.create();
        let effect = variant_mut::<Effect>(&mut fixture.objects, a);
        fixture.group.activate(a, effect);
        let effect = variant_mut::<Effect>(&mut fixture.objects, a);
        fixture.group.return_drawable(a, effect, &mut fixture.all);
    }

    #[test]
    #[should_panic(expected = "does not refer to a Mesh")]
    fn test_kind_mismatch_panics() {
        let mut fixture = Fixture::new();
        let a = fixture.create();
        let _ = variant::<Mesh>(&fixture.objects, a);
    }
}
