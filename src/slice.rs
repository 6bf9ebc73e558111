use serde::{Deserialize, Serialize};

/// Raw samples as handed over by an image decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    F32(Vec<f32>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::U16(v) => v.len(),
            PixelData::I16(v) => v.len(),
            PixelData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `f` with every sample widened to `f32`, in storage order.
    pub(crate) fn for_each_sample(&self, mut f: impl FnMut(usize, f32)) {
        match self {
            PixelData::U8(v) => v.iter().enumerate().for_each(|(i, &s)| f(i, s as f32)),
            PixelData::U16(v) => v.iter().enumerate().for_each(|(i, &s)| f(i, s as f32)),
            PixelData::I16(v) => v.iter().enumerate().for_each(|(i, &s)| f(i, s as f32)),
            PixelData::F32(v) => v.iter().enumerate().for_each(|(i, &s)| f(i, s)),
        }
    }
}

/// A window attribute may be multi-valued; only the first value is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WindowValue {
    Scalar(f32),
    List(Vec<f32>),
}

impl WindowValue {
    pub fn first(&self) -> Option<f32> {
        match self {
            WindowValue::Scalar(v) => Some(*v),
            WindowValue::List(values) => values.first().copied(),
        }
    }
}

impl From<f32> for WindowValue {
    fn from(value: f32) -> Self {
        WindowValue::Scalar(value)
    }
}

impl From<Vec<f32>> for WindowValue {
    fn from(values: Vec<f32>) -> Self {
        WindowValue::List(values)
    }
}

/// One decoded cross-sectional image and its calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub pixel_data: PixelData,
    pub width: usize,
    pub height: usize,
    pub rescale_slope: Option<f32>,
    pub rescale_intercept: Option<f32>,
    pub window_center: Option<WindowValue>,
    pub window_width: Option<WindowValue>,
}

impl Slice {
    pub fn new(pixel_data: PixelData, width: usize, height: usize) -> Self {
        Self {
            pixel_data,
            width,
            height,
            rescale_slope: None,
            rescale_intercept: None,
            window_center: None,
            window_width: None,
        }
    }

    pub fn with_rescale(mut self, slope: f32, intercept: f32) -> Self {
        self.rescale_slope = Some(slope);
        self.rescale_intercept = Some(intercept);
        self
    }

    pub fn with_window(
        mut self,
        center: impl Into<WindowValue>,
        width: impl Into<WindowValue>,
    ) -> Self {
        self.window_center = Some(center.into());
        self.window_width = Some(width.into());
        self
    }

    pub fn slope(&self) -> f32 {
        self.rescale_slope.unwrap_or(1.0)
    }

    pub fn intercept(&self) -> f32 {
        self.rescale_intercept.unwrap_or(0.0)
    }

    pub fn first_window_center(&self) -> Option<f32> {
        self.window_center.as_ref()?.first()
    }

    pub fn first_window_width(&self) -> Option<f32> {
        self.window_width.as_ref()?.first()
    }

    /// Window from the first listed center and width, when both are present.
    pub fn window(&self) -> Option<(f32, f32)> {
        Some((self.first_window_center()?, self.first_window_width()?))
    }
}
