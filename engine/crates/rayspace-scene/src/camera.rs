use std::rc::Rc;

use ash::vk;
use rayspace_gfx::error::GfxResult;
use rayspace_gfx::foundation::device::GfxDevice;
use rayspace_utils::id_issuer::{IdIssuer, ObjectId};

use crate::gpu_data::CameraParametersBuffer;
use crate::shader_buffer::ShaderBuffer;

/// 透视相机，右手坐标系
pub struct Camera {
    id: ObjectId,
    buffer: ShaderBuffer,

    position: glam::Vec3,
    front: glam::Vec3,
    up: glam::Vec3,
    /// 竖直方向视角，单位为度
    fov: f32,
    near: f32,
    far: f32,

    view_projection: glam::Mat4,
}
// new & init
impl Camera {
    pub fn new(device: &Rc<dyn GfxDevice>, ids: &IdIssuer) -> GfxResult<Self> {
        let id = ids.issue();
        let buffer = ShaderBuffer::new(device, size_of::<CameraParametersBuffer>() as u32, format!("camera {id}"))?;
        Ok(Self {
            id,
            buffer,
            position: glam::Vec3::ZERO,
            front: glam::Vec3::NEG_Z,
            up: glam::Vec3::Y,
            fov: 70.0,
            near: 0.1,
            far: 1000.0,
            view_projection: glam::Mat4::IDENTITY,
        })
    }
}
// getter
impl Camera {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn position(&self) -> glam::Vec3 {
        self.position
    }

    /// 上一次 [`Self::update`] 算出的 `projection * view`
    #[inline]
    pub fn view_projection(&self) -> glam::Mat4 {
        self.view_projection
    }

    #[inline]
    pub fn near(&self) -> f32 {
        self.near
    }

    #[inline]
    pub fn far(&self) -> f32 {
        self.far
    }

    #[inline]
    pub fn buffer_address(&self) -> vk::DeviceAddress {
        self.buffer.address()
    }
}
// update
impl Camera {
    #[inline]
    pub fn set_position(&mut self, position: glam::Vec3) {
        self.position = position;
    }

    #[inline]
    pub fn set_orientation(&mut self, front: glam::Vec3, up: glam::Vec3) {
        self.front = front;
        self.up = up;
    }

    #[inline]
    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
    }

    pub fn set_planes(&mut self, near: f32, far: f32) {
        assert!(near > 0.0, "near plane must be positive, got {near}");
        assert!(far > near, "far plane {far} must lie beyond near plane {near}");
        self.near = near;
        self.far = far;
    }

    /// 计算矩阵并写入常量 buffer
    pub fn update(&mut self, resolution: vk::Extent2D) -> GfxResult<()> {
        let fov_y = self.fov.to_radians();
        let height = resolution.height.max(1) as f32;
        let aspect = resolution.width.max(1) as f32 / height;

        let view = glam::Mat4::look_at_rh(self.position, self.position + self.front, self.up);
        let projection = glam::Mat4::perspective_rh(fov_y, aspect, self.near, self.far);
        self.view_projection = projection * view;

        self.buffer.write(&CameraParametersBuffer {
            view,
            projection,
            view_inverse: view.inverse(),
            projection_inverse: projection.inverse(),
            near: self.near,
            far: self.far,
            spread: (2.0 * (fov_y / 2.0).tan() / height).atan(),
            _padding: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayspace_gfx::headless::HeadlessDevice;

    #[test]
    fn test_update_writes_parameters() {
        let headless = Rc::new(HeadlessDevice::new());
        let device: Rc<dyn GfxDevice> = headless.clone();
        let mut camera = Camera::new(&device, &IdIssuer::new()).unwrap();
        camera.set_planes(0.5, 200.0);
        camera.update(vk::Extent2D { width: 800, height: 600 }).unwrap();

        let bytes = headless
            .read_address(camera.buffer_address(), size_of::<CameraParametersBuffer>())
            .unwrap();
        let parameters: CameraParametersBuffer = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(parameters.near, 0.5);
        assert_eq!(parameters.far, 200.0);
        assert!(parameters.spread > 0.0);
        assert!((parameters.view * parameters.view_inverse).abs_diff_eq(glam::Mat4::IDENTITY, 1e-5));
    }

    #[test]
    #[should_panic(expected = "beyond near plane")]
    fn test_inverted_planes_panic() {
        let device: Rc<dyn GfxDevice> = Rc::new(HeadlessDevice::new());
        let mut camera = Camera::new(&device, &IdIssuer::new()).unwrap();
        camera.set_planes(10.0, 1.0);
    }
}
