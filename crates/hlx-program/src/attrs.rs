//! Target encodings of structured instruction attributes.

use serde::{Deserialize, Serialize};

/// Convolution dimension numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvolutionDimensionNumbers {
    pub input_batch_dimension: i64,
    pub input_feature_dimension: i64,
    pub input_spatial_dimensions: Vec<i64>,
    pub kernel_input_feature_dimension: i64,
    pub kernel_output_feature_dimension: i64,
    pub kernel_spatial_dimensions: Vec<i64>,
    pub output_batch_dimension: i64,
    pub output_feature_dimension: i64,
    pub output_spatial_dimensions: Vec<i64>,
}

/// Dot dimension numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotDimensionNumbers {
    pub lhs_batch_dimensions: Vec<i64>,
    pub rhs_batch_dimensions: Vec<i64>,
    pub lhs_contracting_dimensions: Vec<i64>,
    pub rhs_contracting_dimensions: Vec<i64>,
}

/// One group of replicas participating together in a collective.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaGroup {
    pub replica_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonDirection {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

impl ComparisonDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonDirection::Eq => "EQ",
            ComparisonDirection::Ne => "NE",
            ComparisonDirection::Ge => "GE",
            ComparisonDirection::Gt => "GT",
            ComparisonDirection::Le => "LE",
            ComparisonDirection::Lt => "LT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FftType {
    Fft,
    Ifft,
    Rfft,
    Irfft,
}

impl FftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FftType::Fft => "FFT",
            FftType::Ifft => "IFFT",
            FftType::Rfft => "RFFT",
            FftType::Irfft => "IRFFT",
        }
    }
}

/// Transpose applied to the `a` operand of a triangular solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transpose {
    NoTranspose,
    Transpose,
    Adjoint,
}

impl Transpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transpose::NoTranspose => "NO_TRANSPOSE",
            Transpose::Transpose => "TRANSPOSE",
            Transpose::Adjoint => "ADJOINT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriangularSolveOptions {
    pub left_side: bool,
    pub lower: bool,
    pub unit_diagonal: bool,
    pub transpose_a: Transpose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomCallSchedule {
    None,
    Latest,
    Earliest,
}

impl CustomCallSchedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomCallSchedule::None => "SCHEDULE_NONE",
            CustomCallSchedule::Latest => "SCHEDULE_LATEST",
            CustomCallSchedule::Earliest => "SCHEDULE_EARLIEST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomCallApiVersion {
    Unspecified,
    Original,
    StatusReturning,
    StatusReturningUnified,
}

impl CustomCallApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomCallApiVersion::Unspecified => "API_VERSION_UNSPECIFIED",
            CustomCallApiVersion::Original => "API_VERSION_ORIGINAL",
            CustomCallApiVersion::StatusReturning => "API_VERSION_STATUS_RETURNING",
            CustomCallApiVersion::StatusReturningUnified => {
                "API_VERSION_STATUS_RETURNING_UNIFIED"
            }
        }
    }
}

/// Declares that an output (sub)buffer may reuse an operand (sub)buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOperandAliasing {
    pub output_shape_index: Vec<i64>,
    pub operand_index: i64,
    pub operand_shape_index: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceDimension {
    pub start: i64,
    pub limit: i64,
    pub stride: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddingDimension {
    pub edge_padding_low: i64,
    pub edge_padding_high: i64,
    pub interior_padding: i64,
}

/// One spatial dimension of a convolution window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDimension {
    pub size: i64,
    pub stride: i64,
    pub padding_low: i64,
    pub padding_high: i64,
    pub window_dilation: i64,
    pub base_dilation: i64,
}

impl WindowDimension {
    /// A window dimension of `size` with unit stride/dilation and no padding.
    pub fn of_size(size: i64) -> Self {
        Self {
            size,
            stride: 1,
            padding_low: 0,
            padding_high: 0,
            window_dilation: 1,
            base_dilation: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub dimensions: Vec<WindowDimension>,
}

/// Layout hints a bitcast carries in its backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcastBackendConfig {
    pub source_layout: Vec<i64>,
    pub result_layout: Vec<i64>,
}
