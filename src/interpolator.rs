use ndarray::{ArrayView2, ArrayView3, Axis};

pub(crate) struct Interpolator;

impl Interpolator {
    /// Maps a corner-aligned normalized coordinate onto a voxel index axis of
    /// `len` samples, clamped to the valid range.
    #[inline]
    pub(crate) fn to_index_space(coord: f32, len: usize) -> f32 {
        let max = (len.max(1) - 1) as f32;
        (coord * max).clamp(0.0, max)
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Trilinear sample at voxel-index coordinates. Callers clamp into range.
    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &ArrayView3<f32>, z: f32, y: f32, x: f32) -> f32 {
        let (depth, _, _) = volume.dim();

        let z0 = z.floor() as usize;
        let z1 = (z0 + 1).min(depth - 1);
        let dz = z - z0 as f32;

        let near = Self::bilinear_interpolate(&volume.index_axis(Axis(0), z0), y, x);
        if z1 == z0 || dz == 0.0 {
            return near;
        }
        let far = Self::bilinear_interpolate(&volume.index_axis(Axis(0), z1), y, x);

        near.mul_add(1.0 - dz, far * dz)
    }

    #[inline]
    pub(crate) fn nearest(volume: &ArrayView3<f32>, z: f32, y: f32, x: f32) -> f32 {
        let (depth, height, width) = volume.dim();
        let z = (z.round() as usize).min(depth - 1);
        let y = (y.round() as usize).min(height - 1);
        let x = (x.round() as usize).min(width - 1);
        volume[[z, y, x]]
    }
}
