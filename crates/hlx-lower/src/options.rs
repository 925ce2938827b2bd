//! Conversion options.
//!
//! The two layout callbacks can only be set from code. The boolean switches
//! can also be loaded from a TOML file:
//!
//! ```toml
//! [lowering]
//! propagate_layouts = true
//! propagate_bitcast_layouts_to_backend_config = true
//! strict_sharding = false
//! ```

use std::fmt;
use std::sync::Arc;

use hlx_program::{Layout, Shape};
use serde::Deserialize;
use thiserror::Error;

use crate::error::LowerError;

/// Layout preference reported for a shape by the layout-preference callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayoutPreference {
    #[default]
    NoPreference,
    PreferCompact,
    PreferLinear,
}

/// Picks a layout preference for a result shape.
pub type LayoutPreferenceFn = Arc<dyn Fn(&Shape) -> LayoutPreference + Send + Sync>;

/// Rewrites a shape (typically its layout) for the given preference.
pub type ShapeRepresentationFn =
    Arc<dyn Fn(&Shape, LayoutPreference) -> Result<Shape, String> + Send + Sync>;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid options file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Options controlling a conversion. Immutable for the duration of a call.
#[derive(Clone, Default)]
pub struct ConversionOptions {
    /// Assign layouts from `minor_to_major` attributes and the shape
    /// representation callback instead of the builder default.
    pub propagate_layouts: bool,
    /// Also record bitcast source/result layouts in the backend config.
    /// Only effective together with `propagate_layouts`.
    pub propagate_bitcast_layouts_to_backend_config: bool,
    pub layout_preference_fn: Option<LayoutPreferenceFn>,
    pub shape_representation_fn: Option<ShapeRepresentationFn>,
    /// Fail on malformed sharding strings instead of dropping them.
    pub strict_sharding: bool,
}

impl fmt::Debug for ConversionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionOptions")
            .field("propagate_layouts", &self.propagate_layouts)
            .field(
                "propagate_bitcast_layouts_to_backend_config",
                &self.propagate_bitcast_layouts_to_backend_config,
            )
            .field("layout_preference_fn", &self.layout_preference_fn.is_some())
            .field(
                "shape_representation_fn",
                &self.shape_representation_fn.is_some(),
            )
            .field("strict_sharding", &self.strict_sharding)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsFile {
    #[serde(default)]
    lowering: LoweringTable,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LoweringTable {
    propagate_layouts: bool,
    propagate_bitcast_layouts_to_backend_config: bool,
    strict_sharding: bool,
}

impl ConversionOptions {
    /// Parse the `[lowering]` table of a TOML document. Missing keys keep
    /// their defaults; unknown keys are rejected.
    pub fn from_toml_str(text: &str) -> Result<Self, OptionsError> {
        let file: OptionsFile = toml::from_str(text)?;
        Ok(Self {
            propagate_layouts: file.lowering.propagate_layouts,
            propagate_bitcast_layouts_to_backend_config: file
                .lowering
                .propagate_bitcast_layouts_to_backend_config,
            strict_sharding: file.lowering.strict_sharding,
            ..Self::default()
        })
    }

    pub fn with_layout_preference_fn(
        mut self,
        f: impl Fn(&Shape) -> LayoutPreference + Send + Sync + 'static,
    ) -> Self {
        self.layout_preference_fn = Some(Arc::new(f));
        self
    }

    pub fn with_shape_representation_fn(
        mut self,
        f: impl Fn(&Shape, LayoutPreference) -> Result<Shape, String> + Send + Sync + 'static,
    ) -> Self {
        self.shape_representation_fn = Some(Arc::new(f));
        self
    }

    pub(crate) fn bitcast_backend_config(&self) -> bool {
        self.propagate_layouts && self.propagate_bitcast_layouts_to_backend_config
    }

    /// The target representation of `shape`: the callback's rewrite when one
    /// is set, with default layouts filling whatever it leaves open.
    pub(crate) fn represent(&self, shape: Shape) -> Result<Shape, LowerError> {
        let Some(represent) = &self.shape_representation_fn else {
            return Ok(shape.with_default_layout());
        };
        let preference = self
            .layout_preference_fn
            .as_ref()
            .map(|f| f(&shape))
            .unwrap_or_default();
        let rewritten = represent(&shape, preference).map_err(LowerError::LayoutCallback)?;
        check_layouts(&rewritten)?;
        Ok(rewritten.with_default_layout())
    }
}

fn check_layouts(shape: &Shape) -> Result<(), LowerError> {
    if shape.is_tuple() {
        return shape.tuple_shapes.iter().try_for_each(check_layouts);
    }
    match &shape.layout {
        Some(layout) if !layout.is_valid_for_rank(shape.rank()) => Err(LowerError::LayoutCallback(
            format!("layout {layout} is not a permutation for {shape}"),
        )),
        _ => Ok(()),
    }
}

/// A shape representation callback that assigns `layout_for(rank)` to every
/// array leaf. Convenient for tests and the CLI.
pub fn fixed_layout(
    layout_for: impl Fn(usize) -> Layout + Send + Sync + 'static,
) -> impl Fn(&Shape, LayoutPreference) -> Result<Shape, String> + Send + Sync + 'static {
    move |shape, _| Ok(assign(shape.clone(), &layout_for))
}

fn assign(mut shape: Shape, layout_for: &dyn Fn(usize) -> Layout) -> Shape {
    if shape.is_tuple() {
        shape.tuple_shapes = shape
            .tuple_shapes
            .into_iter()
            .map(|s| assign(s, layout_for))
            .collect();
    } else if shape.is_array() {
        let layout = layout_for(shape.rank());
        shape.layout = Some(layout);
    }
    shape
}
