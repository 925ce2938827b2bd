//! Lowering of hlx op modules into flat target programs.
//!
//! The pipeline has four layers: attribute translation ([`attrs`]), the
//! builder adapter that sequences instructions and assigns layouts
//! ([`context`]), whole-module conversion with on-demand callees
//! ([`module`]), and per-block conversion ([`block`]), which is also usable
//! on its own to splice a block into a computation under construction.

pub mod attrs;
pub mod block;
pub mod context;
pub mod error;
pub mod module;
pub mod options;
pub mod types;

pub use block::convert_block;
pub use context::BlockContext;
pub use error::{ErrorClass, LowerError};
pub use module::{convert_module, convert_module_into};
pub use options::{
    fixed_layout, ConversionOptions, LayoutPreference, LayoutPreferenceFn, OptionsError,
    ShapeRepresentationFn,
};
pub use types::{convert_element_type, convert_type};
