use crate::enums::{Interpolation, Orientation};
use crate::interpolator::Interpolator;
use crate::volume_assembler::AssemblerError;

use glam::Vec3;
use ndarray::{Array3, ArrayView3};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VOLUME_ID: AtomicU64 = AtomicU64::new(1);

/// Clamp into `[0, 1]`, sending NaN to 0.
pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Process-unique identity of a [`VolumeField`].
///
/// GPU resources derived from a field remember the id they were built from and
/// are rebuilt when it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId(u64);

impl VolumeId {
    fn next() -> Self {
        Self(NEXT_VOLUME_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Normalized scalar field assembled from a slice stack.
///
/// Storage is `(depth, height, width)`, so the flat order is
/// `data[z * W * H + y * W + x]`. Every value lies in `[0, 1]`. A field is
/// never mutated after construction; share it behind an `Arc`.
#[derive(Debug)]
pub struct VolumeField {
    id: VolumeId,
    data: Array3<f32>,
    window_center: f32,
    window_width: f32,
    spacing: (f32, f32, f32),
}

impl VolumeField {
    pub(crate) fn new(data: Array3<f32>, window_center: f32, window_width: f32) -> Self {
        Self {
            id: VolumeId::next(),
            data,
            window_center,
            window_width,
            spacing: (1.0, 1.0, 1.0),
        }
    }

    /// Builds a field directly from already normalized values. Values are
    /// clamped into `[0, 1]` and NaN becomes 0.
    pub fn from_normalized(mut data: Array3<f32>) -> Result<Self, AssemblerError> {
        if data.is_empty() {
            return Err(AssemblerError::EmptyInput);
        }
        data.mapv_inplace(clamp_unit);
        Ok(Self::new(data, 0.5, 1.0))
    }

    /// Physical voxel spacing in millimetres as (x, y, z).
    pub fn with_spacing(mut self, spacing: (f32, f32, f32)) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn depth(&self) -> usize {
        self.data.dim().0
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn window_center(&self) -> f32 {
        self.window_center
    }

    pub fn window_width(&self) -> f32 {
        self.window_width
    }

    pub fn spacing(&self) -> (f32, f32, f32) {
        self.spacing
    }

    pub fn voxel(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        self.data.get([z, y, x]).copied()
    }

    /// Sample at corner-aligned normalized coordinates: `0` is the first voxel
    /// along an axis and `1` the last. Coordinates are clamped into the cube.
    pub fn sample(&self, position: Vec3, interpolation: Interpolation) -> f32 {
        let (depth, height, width) = self.dim();
        let x = Interpolator::to_index_space(position.x, width);
        let y = Interpolator::to_index_space(position.y, height);
        let z = Interpolator::to_index_space(position.z, depth);
        self.sample_index(x, y, z, interpolation)
    }

    /// Sample at voxel-index coordinates that are already inside the grid.
    pub(crate) fn sample_index(&self, x: f32, y: f32, z: f32, interpolation: Interpolation) -> f32 {
        let view = self.data.view();
        match interpolation {
            Interpolation::Trilinear => Interpolator::trilinear_interpolate(&view, z, y, x),
            Interpolation::Nearest => Interpolator::nearest(&view, z, y, x),
        }
    }

    /// Number of planes along the axis an orientation slices through.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        let (depth, height, width) = self.dim();
        match orientation {
            Orientation::Axial => depth,
            Orientation::Sagittal => width,
            Orientation::Coronal => height,
        }
    }

    /// 1-based plane number closest to `offset`, for display.
    pub fn slice_number(&self, orientation: Orientation, offset: f32) -> usize {
        let last = self.slice_count(orientation).saturating_sub(1);
        let index = (offset.clamp(0.0, 1.0) * last as f32).round() as usize;
        index.min(last) + 1
    }

    /// Offset increment that advances by exactly one plane.
    pub fn offset_step(&self, orientation: Orientation) -> f32 {
        match self.slice_count(orientation) {
            0 | 1 => 1.0,
            count => 1.0 / (count - 1) as f32,
        }
    }

    /// Offset addressing the 0-based plane `index`, clamped to the last plane.
    pub fn offset_for_slice(&self, orientation: Orientation, index: usize) -> f32 {
        let count = self.slice_count(orientation);
        if count <= 1 {
            return 0.0;
        }
        index.min(count - 1) as f32 / (count - 1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn field(depth: usize, height: usize, width: usize) -> VolumeField {
        VolumeField::from_normalized(Array3::from_shape_fn((depth, height, width), |(z, _, _)| {
            z as f32 / (depth - 1).max(1) as f32
        }))
        .unwrap()
    }

    #[test]
    fn ids_are_unique() {
        let a = field(2, 2, 2);
        let b = field(2, 2, 2);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn from_normalized_clamps() {
        let volume = VolumeField::from_normalized(Array3::from_elem((1, 1, 2), 3.0)).unwrap();
        assert_eq!(volume.voxel(0, 0, 0), Some(1.0));
        assert_eq!(volume.voxel(2, 0, 0), None);

        let volume =
            VolumeField::from_normalized(Array3::from_elem((1, 1, 1), f32::NAN)).unwrap();
        assert_eq!(volume.voxel(0, 0, 0), Some(0.0));
    }

    #[test]
    fn from_normalized_rejects_empty() {
        let result = VolumeField::from_normalized(Array3::zeros((0, 4, 4)));
        assert!(matches!(result, Err(AssemblerError::EmptyInput)));
    }

    #[test]
    fn sample_is_corner_aligned() {
        let volume = field(5, 3, 3);
        assert_eq!(volume.sample(Vec3::new(0.3, 0.7, 0.0), Interpolation::Trilinear), 0.0);
        assert_relative_eq!(
            volume.sample(Vec3::new(0.3, 0.7, 1.0), Interpolation::Trilinear),
            1.0,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            volume.sample(Vec3::new(0.5, 0.5, 0.375), Interpolation::Trilinear),
            0.375,
            epsilon = 1e-6
        );
    }

    #[test]
    fn sample_clamps_outside_cube() {
        let volume = field(4, 2, 2);
        assert_eq!(volume.sample(Vec3::new(2.0, -1.0, 7.0), Interpolation::Nearest), 1.0);
    }

    #[test]
    fn slice_helpers_follow_orientation_extent() {
        let volume = field(10, 6, 4);
        assert_eq!(volume.slice_count(Orientation::Axial), 10);
        assert_eq!(volume.slice_count(Orientation::Sagittal), 4);
        assert_eq!(volume.slice_count(Orientation::Coronal), 6);

        assert_eq!(volume.slice_number(Orientation::Axial, 0.0), 1);
        assert_eq!(volume.slice_number(Orientation::Axial, 1.0), 10);
        assert_eq!(volume.slice_number(Orientation::Axial, 0.5), 6);

        assert_relative_eq!(volume.offset_step(Orientation::Sagittal), 1.0 / 3.0);
        assert_relative_eq!(volume.offset_for_slice(Orientation::Sagittal, 2), 2.0 / 3.0);
        assert_eq!(volume.offset_for_slice(Orientation::Sagittal, 99), 1.0);
    }

    #[test]
    fn single_plane_helpers_do_not_divide_by_zero() {
        let volume = field(1, 2, 2);
        assert_eq!(volume.offset_step(Orientation::Axial), 1.0);
        assert_eq!(volume.offset_for_slice(Orientation::Axial, 3), 0.0);
        assert_eq!(volume.slice_number(Orientation::Axial, 0.8), 1);
    }
}
