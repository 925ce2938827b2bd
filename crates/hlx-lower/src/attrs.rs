//! Attribute translation: source attribute records to target encodings.
//!
//! Every function here is pure. Translation is total over well-formed
//! values; the only failures are data-dependent shape and spelling checks
//! (table rank, column count, enum names, permutations, literal length).

use std::collections::BTreeMap;

use hlx_ir::attr::{
    Attribute, ComparisonDirection, ConvDimensionNumbers, DenseIntElements,
    DotDimensionNumbers as SourceDotDimensionNumbers, ElementsData, OutputOperandAlias,
    PADDING_SENTINEL,
};
use hlx_ir::op::ConvolutionAttrs;
use hlx_ir::types::{ElementType, TensorType};
use hlx_program::attrs::{
    ComparisonDirection as TargetComparisonDirection, ConvolutionDimensionNumbers,
    CustomCallApiVersion, CustomCallSchedule, DotDimensionNumbers, FftType,
    OutputOperandAliasing, ReplicaGroup, Transpose, Window, WindowDimension,
};
use hlx_program::{Layout, Literal, OpSharding};

use crate::error::LowerError;

pub fn convert_conv_dimension_numbers(dn: &ConvDimensionNumbers) -> ConvolutionDimensionNumbers {
    ConvolutionDimensionNumbers {
        input_batch_dimension: dn.input_batch_dimension,
        input_feature_dimension: dn.input_feature_dimension,
        input_spatial_dimensions: dn.input_spatial_dimensions.clone(),
        kernel_input_feature_dimension: dn.kernel_input_feature_dimension,
        kernel_output_feature_dimension: dn.kernel_output_feature_dimension,
        kernel_spatial_dimensions: dn.kernel_spatial_dimensions.clone(),
        output_batch_dimension: dn.output_batch_dimension,
        output_feature_dimension: dn.output_feature_dimension,
        output_spatial_dimensions: dn.output_spatial_dimensions.clone(),
    }
}

/// Build convolution dimension numbers from their individual parts.
#[allow(clippy::too_many_arguments)]
pub fn make_conv_dimension_numbers(
    input_batch_dimension: i64,
    input_feature_dimension: i64,
    input_spatial_dimensions: &[i64],
    kernel_input_feature_dimension: i64,
    kernel_output_feature_dimension: i64,
    kernel_spatial_dimensions: &[i64],
    output_batch_dimension: i64,
    output_feature_dimension: i64,
    output_spatial_dimensions: &[i64],
) -> ConvolutionDimensionNumbers {
    ConvolutionDimensionNumbers {
        input_batch_dimension,
        input_feature_dimension,
        input_spatial_dimensions: input_spatial_dimensions.to_vec(),
        kernel_input_feature_dimension,
        kernel_output_feature_dimension,
        kernel_spatial_dimensions: kernel_spatial_dimensions.to_vec(),
        output_batch_dimension,
        output_feature_dimension,
        output_spatial_dimensions: output_spatial_dimensions.to_vec(),
    }
}

pub fn convert_dot_dimension_numbers(dn: &SourceDotDimensionNumbers) -> DotDimensionNumbers {
    make_dot_dimension_numbers(
        &dn.lhs_batching_dimensions,
        &dn.rhs_batching_dimensions,
        &dn.lhs_contracting_dimensions,
        &dn.rhs_contracting_dimensions,
    )
}

pub fn make_dot_dimension_numbers(
    lhs_batch: &[i64],
    rhs_batch: &[i64],
    lhs_contracting: &[i64],
    rhs_contracting: &[i64],
) -> DotDimensionNumbers {
    DotDimensionNumbers {
        lhs_batch_dimensions: lhs_batch.to_vec(),
        rhs_batch_dimensions: rhs_batch.to_vec(),
        lhs_contracting_dimensions: lhs_contracting.to_vec(),
        rhs_contracting_dimensions: rhs_contracting.to_vec(),
    }
}

/// Rows of a rank-2 table, checked against its declared shape.
fn rows<'a>(name: &str, table: &'a DenseIntElements) -> Result<(usize, usize, &'a [i64]), LowerError> {
    if table.rank() != 2 {
        return Err(LowerError::malformed(
            name,
            format!("expected a rank-2 table, got rank {}", table.rank()),
        ));
    }
    let (rows, cols) = (table.shape[0], table.shape[1]);
    let mismatch = || {
        LowerError::malformed(
            name,
            format!(
                "shape {rows}x{cols} does not match {} values",
                table.values.len()
            ),
        )
    };
    let (Ok(r), Ok(c)) = (usize::try_from(rows), usize::try_from(cols)) else {
        return Err(mismatch());
    };
    if r.checked_mul(c) != Some(table.values.len()) {
        return Err(mismatch());
    }
    Ok((r, c, &table.values))
}

/// One replica group per row, in row order, with padding entries dropped.
pub fn convert_replica_groups(groups: &DenseIntElements) -> Result<Vec<ReplicaGroup>, LowerError> {
    let (rows, cols, values) = rows("replica_groups", groups)?;
    if cols == 0 {
        return Ok(vec![ReplicaGroup::default(); rows]);
    }
    Ok(values
        .chunks(cols)
        .map(|row| ReplicaGroup {
            replica_ids: row
                .iter()
                .copied()
                .filter(|id| *id != PADDING_SENTINEL)
                .collect(),
        })
        .collect())
}

/// An `N x 2` table as a list of pairs. An absent table is empty.
pub fn convert_nx2(
    name: &str,
    table: Option<&DenseIntElements>,
) -> Result<Vec<(i64, i64)>, LowerError> {
    let Some(table) = table else {
        return Ok(Vec::new());
    };
    let (_, cols, values) = rows(name, table)?;
    if cols != 2 {
        return Err(LowerError::malformed(
            name,
            format!("expected 2 columns, got {cols}"),
        ));
    }
    Ok(values.chunks(2).map(|pair| (pair[0], pair[1])).collect())
}

fn unsupported(name: &str, value: &str) -> LowerError {
    LowerError::UnsupportedValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

pub fn convert_fft_type(name: &str) -> Result<FftType, LowerError> {
    match name {
        "FFT" => Ok(FftType::Fft),
        "IFFT" => Ok(FftType::Ifft),
        "RFFT" => Ok(FftType::Rfft),
        "IRFFT" => Ok(FftType::Irfft),
        other => Err(unsupported("fft_type", other)),
    }
}

pub fn convert_transpose(name: &str) -> Result<Transpose, LowerError> {
    match name {
        "NO_TRANSPOSE" => Ok(Transpose::NoTranspose),
        "TRANSPOSE" => Ok(Transpose::Transpose),
        "ADJOINT" => Ok(Transpose::Adjoint),
        other => Err(unsupported("transpose_a", other)),
    }
}

pub fn convert_custom_call_schedule(name: &str) -> Result<CustomCallSchedule, LowerError> {
    match name {
        "SCHEDULE_NONE" => Ok(CustomCallSchedule::None),
        "SCHEDULE_LATEST" => Ok(CustomCallSchedule::Latest),
        "SCHEDULE_EARLIEST" => Ok(CustomCallSchedule::Earliest),
        other => Err(unsupported("custom_call_schedule", other)),
    }
}

pub fn convert_custom_call_api_version(name: &str) -> Result<CustomCallApiVersion, LowerError> {
    match name {
        "API_VERSION_UNSPECIFIED" => Ok(CustomCallApiVersion::Unspecified),
        "API_VERSION_ORIGINAL" => Ok(CustomCallApiVersion::Original),
        "API_VERSION_STATUS_RETURNING" => Ok(CustomCallApiVersion::StatusReturning),
        "API_VERSION_STATUS_RETURNING_UNIFIED" => Ok(CustomCallApiVersion::StatusReturningUnified),
        other => Err(unsupported("api_version", other)),
    }
}

pub fn convert_comparison_direction(direction: ComparisonDirection) -> TargetComparisonDirection {
    match direction {
        ComparisonDirection::Eq => TargetComparisonDirection::Eq,
        ComparisonDirection::Ne => TargetComparisonDirection::Ne,
        ComparisonDirection::Ge => TargetComparisonDirection::Ge,
        ComparisonDirection::Gt => TargetComparisonDirection::Gt,
        ComparisonDirection::Le => TargetComparisonDirection::Le,
        ComparisonDirection::Lt => TargetComparisonDirection::Lt,
    }
}

/// Decode a sharding string: the direct encoding first, then the
/// prettyprinted form. `None` when neither decodes.
pub fn convert_sharding(text: &str) -> Option<OpSharding> {
    OpSharding::decode(text)
        .ok()
        .or_else(|| OpSharding::parse(text).ok())
}

/// Like [`convert_sharding`], but reports why the prettyprinted form failed.
pub fn convert_sharding_strict(name: &str, text: &str) -> Result<OpSharding, LowerError> {
    if let Ok(sharding) = OpSharding::decode(text) {
        return Ok(sharding);
    }
    OpSharding::parse(text).map_err(|source| LowerError::Sharding {
        name: name.to_string(),
        source,
    })
}

pub fn convert_output_operand_aliasing(aliases: &[OutputOperandAlias]) -> Vec<OutputOperandAliasing> {
    aliases
        .iter()
        .map(|alias| OutputOperandAliasing {
            output_shape_index: alias.output_tuple_indices.clone(),
            operand_index: alias.operand_index,
            operand_shape_index: alias.operand_tuple_indices.clone(),
        })
        .collect()
}

/// Flatten an array of integer scalars, or a rank-1 dense integer table.
pub fn convert_i64_array(name: &str, attr: &Attribute) -> Result<Vec<i64>, LowerError> {
    match attr {
        Attribute::Array(items) => items
            .iter()
            .map(|item| match item {
                Attribute::Int(v) => Ok(*v),
                other => Err(LowerError::malformed(
                    name,
                    format!("expected integer elements, found {}", other.kind_name()),
                )),
            })
            .collect(),
        Attribute::DenseInt(table) if table.rank() == 1 => Ok(table.values.clone()),
        other => Err(LowerError::malformed(
            name,
            format!("expected an integer array, found {}", other.kind_name()),
        )),
    }
}

/// A minor-to-major layout for a shape of `rank`.
pub fn convert_layout(name: &str, attr: &Attribute, rank: usize) -> Result<Layout, LowerError> {
    let layout = Layout::new(convert_i64_array(name, attr)?);
    if !layout.is_valid_for_rank(rank) {
        return Err(LowerError::malformed(
            name,
            format!("{layout} is not a permutation of 0..{rank}"),
        ));
    }
    Ok(layout)
}

/// The `frontend_attributes` dictionary. Every value must be a string.
pub fn convert_frontend_attributes(attr: &Attribute) -> Result<BTreeMap<String, String>, LowerError> {
    const NAME: &str = "frontend_attributes";
    let Attribute::Dict(entries) = attr else {
        return Err(LowerError::malformed(
            NAME,
            format!("expected a dictionary, found {}", attr.kind_name()),
        ));
    };
    entries
        .iter()
        .map(|(key, value)| match value.as_str() {
            Some(s) => Ok((key.clone(), s.to_string())),
            None => Err(LowerError::malformed(
                NAME,
                format!("entry `{key}` is a {}, not a string", value.kind_name()),
            )),
        })
        .collect()
}

/// Constant payload for a tensor of type `ty`. A single value is splatted
/// across all elements.
pub fn convert_literal(data: &ElementsData, ty: &TensorType) -> Result<Literal, LowerError> {
    const NAME: &str = "value";
    let count = ty
        .num_elements()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| LowerError::malformed(NAME, format!("invalid tensor shape {ty}")))?;
    let n = data.len();
    if n != count && n != 1 {
        return Err(LowerError::malformed(
            NAME,
            format!("{n} values for {count} elements of {ty}"),
        ));
    }
    fn fill<T: Clone>(values: &[T], count: usize) -> Result<Vec<T>, LowerError> {
        if values.len() == count {
            return Ok(values.to_vec());
        }
        let mut splat = Vec::new();
        splat
            .try_reserve_exact(count)
            .map_err(|_| LowerError::Unsupported(format!("splat constant of {count} elements")))?;
        splat.resize(count, values[0].clone());
        Ok(splat)
    }
    match (data, ty.element) {
        (_, element) if element.is_complex() => Err(LowerError::Unsupported(format!(
            "constant of complex type {ty}"
        ))),
        (ElementsData::Bool(v), ElementType::I1) => Ok(Literal::Pred(fill(v, count)?)),
        (ElementsData::Int(v), element) if element.is_integer() && element != ElementType::I1 => {
            Ok(Literal::Int(fill(v, count)?))
        }
        (ElementsData::Float(v), element) if element.is_float() => {
            Ok(Literal::Float(fill(v, count)?))
        }
        (_, element) => Err(LowerError::malformed(
            NAME,
            format!("payload does not match element type {element}"),
        )),
    }
}

/// The window of a convolution whose kernel has dimensions `kernel_dims`.
pub fn convert_window(attrs: &ConvolutionAttrs, kernel_dims: &[i64]) -> Result<Window, LowerError> {
    let spatial = &attrs.dimension_numbers.kernel_spatial_dimensions;
    let n = spatial.len();
    let sized = |name: &str, values: &Option<Vec<i64>>| -> Result<Vec<i64>, LowerError> {
        match values {
            None => Ok(vec![1; n]),
            Some(v) if v.len() == n => Ok(v.clone()),
            Some(v) => Err(LowerError::malformed(
                name,
                format!("{} entries for {n} spatial dimensions", v.len()),
            )),
        }
    };
    let strides = sized("window_strides", &attrs.window_strides)?;
    let lhs_dilation = sized("lhs_dilation", &attrs.lhs_dilation)?;
    let rhs_dilation = sized("rhs_dilation", &attrs.rhs_dilation)?;
    let mut padding = convert_nx2("padding", attrs.padding.as_ref())?;
    if padding.is_empty() {
        padding = vec![(0, 0); n];
    } else if padding.len() != n {
        return Err(LowerError::malformed(
            "padding",
            format!("{} rows for {n} spatial dimensions", padding.len()),
        ));
    }

    let mut dimensions = Vec::with_capacity(n);
    for (i, &dim) in spatial.iter().enumerate() {
        let size = usize::try_from(dim)
            .ok()
            .and_then(|d| kernel_dims.get(d))
            .copied()
            .ok_or_else(|| {
                LowerError::malformed(
                    "dimension_numbers",
                    format!("kernel spatial dimension {dim} out of range"),
                )
            })?;
        dimensions.push(WindowDimension {
            size,
            stride: strides[i],
            padding_low: padding[i].0,
            padding_high: padding[i].1,
            window_dilation: rhs_dilation[i],
            base_dilation: lhs_dilation[i],
        });
    }
    Ok(Window { dimensions })
}
