use ash::vk;

/// 向上对齐到 `alignment`，`alignment` 必须是 2 的幂
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// glam 的列主序矩阵转换为光追实例使用的 3x4 行主序矩阵
pub fn get_rt_matrix(mat: &glam::Mat4) -> vk::TransformMatrixKHR {
    let row = |r: usize| {
        let r = mat.row(r);
        [r.x, r.y, r.z, r.w]
    };
    let (r0, r1, r2) = (row(0), row(1), row(2));
    vk::TransformMatrixKHR {
        matrix: [
            r0[0], r0[1], r0[2], r0[3], //
            r1[0], r1[1], r1[2], r1[3], //
            r2[0], r2[1], r2[2], r2[3],
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn test_rt_matrix_keeps_translation_in_last_column() {
        let m = glam::Mat4::from_translation(glam::vec3(1.0, 2.0, 3.0));
        let rt = get_rt_matrix(&m);
        assert_eq!(rt.matrix[3], 1.0);
        assert_eq!(rt.matrix[7], 2.0);
        assert_eq!(rt.matrix[11], 3.0);
        assert_eq!(rt.matrix[0], 1.0);
    }
}
