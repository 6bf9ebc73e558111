use serde::{Deserialize, Serialize};

/// The three orthogonal sampling planes.
///
/// Volume axes are (x, y, z) = (width, height, slice). Each orientation fixes
/// one of them to the slice offset and walks the other two across the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Axial,
    Sagittal,
    Coronal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Sagittal,
        Orientation::Coronal,
    ];

    /// Index used by the WGSL shaders to select the coordinate mapping.
    pub(crate) fn shader_index(self) -> u32 {
        match self {
            Orientation::Axial => 0,
            Orientation::Sagittal => 1,
            Orientation::Coronal => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    Nearest,
    #[default]
    Trilinear,
}

impl Interpolation {
    pub(crate) fn shader_index(self) -> u32 {
        match self {
            Interpolation::Nearest => 0,
            Interpolation::Trilinear => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Processor {
    #[default]
    CPU,
    GPU,
}

/// How raw slice samples become normalized intensities.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum NormalizationPolicy {
    /// Rescale slope/intercept followed by window levelling.
    #[default]
    Windowed,
    /// Divide raw samples by a constant, ignoring calibration metadata.
    RawScaled {
        #[serde(default = "default_raw_divisor")]
        divisor: f32,
    },
}

fn default_raw_divisor() -> f32 {
    255.0
}
