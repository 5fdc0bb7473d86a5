/// 方向光，每帧由 [`crate::space::Space::update`] 写入全局常量
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Light {
    direction: glam::Vec3,
}
impl Default for Light {
    fn default() -> Self {
        Self {
            direction: glam::Vec3::NEG_Y,
        }
    }
}
impl Light {
    #[inline]
    pub fn direction(&self) -> glam::Vec3 {
        self.direction
    }

    #[inline]
    pub fn set_direction(&mut self, direction: glam::Vec3) {
        self.direction = direction;
    }
}
