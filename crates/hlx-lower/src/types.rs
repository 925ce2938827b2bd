//! Source types to target shapes.

use hlx_ir::{ElementType, Type};
use hlx_program::{PrimitiveType, Shape};

pub fn convert_element_type(element: ElementType) -> PrimitiveType {
    match element {
        ElementType::I1 => PrimitiveType::Pred,
        ElementType::I8 => PrimitiveType::S8,
        ElementType::I16 => PrimitiveType::S16,
        ElementType::I32 => PrimitiveType::S32,
        ElementType::I64 => PrimitiveType::S64,
        ElementType::UI8 => PrimitiveType::U8,
        ElementType::UI16 => PrimitiveType::U16,
        ElementType::UI32 => PrimitiveType::U32,
        ElementType::UI64 => PrimitiveType::U64,
        ElementType::F16 => PrimitiveType::F16,
        ElementType::BF16 => PrimitiveType::Bf16,
        ElementType::F32 => PrimitiveType::F32,
        ElementType::F64 => PrimitiveType::F64,
        ElementType::Complex64 => PrimitiveType::C64,
        ElementType::Complex128 => PrimitiveType::C128,
    }
}

/// Convert a source type to a target shape without a layout.
pub fn convert_type(ty: &Type) -> Shape {
    match ty {
        Type::Tensor(tensor) => Shape::array(convert_element_type(tensor.element), &tensor.shape),
        Type::Tuple(elements) => Shape::tuple(elements.iter().map(convert_type).collect()),
        Type::Token => Shape::token(),
    }
}
