use crate::resources::handles::ResourceHandle;

bitflags::bitflags! {
    /// 资源在 GPU 上所处的使用状态
    ///
    /// 屏障按「之前状态 -> 之后状态」描述一次转换。
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct GfxResourceState: u32 {
        const COMMON = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const DEPTH_WRITE = 1 << 4;
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        const COPY_DEST = 1 << 10;
        const COPY_SOURCE = 1 << 11;
        const RAYTRACING_ACCELERATION_STRUCTURE = 1 << 22;

        const ALL_SHADER_RESOURCE = Self::NON_PIXEL_SHADER_RESOURCE.bits() | Self::PIXEL_SHADER_RESOURCE.bits();
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::ALL_SHADER_RESOURCE.bits()
            | Self::COPY_SOURCE.bits();
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxBarrierKind {
    /// 状态转换
    Transition {
        before: GfxResourceState,
        after: GfxResourceState,
    },
    /// 同一资源上前后两次无序访问之间的同步
    UnorderedAccess,
}

/// 便捷创建资源屏障的结构体
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxResourceBarrier {
    resource: Option<ResourceHandle>,
    kind: GfxBarrierKind,
}
impl Default for GfxResourceBarrier {
    fn default() -> Self {
        Self {
            resource: None,
            kind: GfxBarrierKind::Transition {
                before: GfxResourceState::COMMON,
                after: GfxResourceState::COMMON,
            },
        }
    }
}
impl GfxResourceBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 对 `resource` 的 UAV 屏障
    #[inline]
    pub fn uav(resource: impl Into<ResourceHandle>) -> Self {
        Self {
            resource: Some(resource.into()),
            kind: GfxBarrierKind::UnorderedAccess,
        }
    }

    /// 对 `resource` 的状态转换
    #[inline]
    pub fn transition(
        resource: impl Into<ResourceHandle>,
        before: GfxResourceState,
        after: GfxResourceState,
    ) -> Self {
        Self::new().resource(resource).state_transfer(before, after)
    }

    /// builder
    #[inline]
    pub fn resource(mut self, resource: impl Into<ResourceHandle>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// builder
    #[inline]
    pub fn state_transfer(mut self, before: GfxResourceState, after: GfxResourceState) -> Self {
        self.kind = GfxBarrierKind::Transition { before, after };
        self
    }

    /// builder
    ///
    /// 前后状态对调，用于把资源恢复到原来的状态
    #[inline]
    pub fn reversed(mut self) -> Self {
        if let GfxBarrierKind::Transition { before, after } = self.kind {
            self.kind = GfxBarrierKind::Transition {
                before: after,
                after: before,
            };
        }
        self
    }
}
// getter
impl GfxResourceBarrier {
    /// 尚未指定资源的屏障不能提交
    #[inline]
    pub fn target(&self) -> Option<ResourceHandle> {
        self.resource
    }

    #[inline]
    pub fn kind(&self) -> GfxBarrierKind {
        self.kind
    }
}
