// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Types and properties every tree registers on creation.

use understory_invalidation::InvalidateModes;
use understory_property::{
    Property, PropertyError, PropertyMetadataBuilder, PropertyRegistry, TypeKey,
};

use crate::brush::Brush;

/// Type keys registered by every [`Tree`](crate::Tree).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardTypes {
    /// `Visual`, the base of every node type.
    pub visual: TypeKey,
    /// `Grid`, a `Visual` laying out children in rows and columns.
    pub grid: TypeKey,
    /// `ColumnDefinition`, the item type of a grid's column collection.
    pub column_definition: TypeKey,
    /// `RowDefinition`, the item type of a grid's row collection.
    pub row_definition: TypeKey,
}

impl StandardTypes {
    pub(crate) fn register(registry: &mut PropertyRegistry) -> Result<Self, PropertyError> {
        let visual = registry.register_type("Visual", None)?;
        let grid = registry.register_type("Grid", Some(visual))?;
        let column_definition =
            registry.register_type_with("ColumnDefinition", None, InvalidateModes::MEASURE)?;
        let row_definition =
            registry.register_type_with("RowDefinition", None, InvalidateModes::MEASURE)?;
        Ok(Self {
            visual,
            grid,
            column_definition,
            row_definition,
        })
    }
}

/// Properties registered by every [`Tree`](crate::Tree).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StandardProperties {
    /// `Visual.IsVisible`: hidden nodes measure to zero and are not rendered.
    pub is_visible: Property<bool>,
    /// `Visual.Opacity`, clamped to `0.0..=1.0`. NaN is rejected.
    pub opacity: Property<f64>,
    /// `Visual.Background`, drawn by the default render hook.
    pub background: Property<Option<Brush>>,
    /// `Grid.Row`, attached to children of a grid.
    pub grid_row: Property<usize>,
    /// `Grid.Column`, attached to children of a grid.
    pub grid_column: Property<usize>,
}

impl StandardProperties {
    pub(crate) fn register(
        registry: &mut PropertyRegistry,
        types: &StandardTypes,
    ) -> Result<Self, PropertyError> {
        let is_visible = registry.register(
            types.visual,
            "IsVisible",
            PropertyMetadataBuilder::new(true)
                .invalidates(InvalidateModes::MEASURE | InvalidateModes::PARENT_MEASURE)
                .build(),
        )?;
        let opacity = registry.register(
            types.visual,
            "Opacity",
            PropertyMetadataBuilder::new(1.0_f64)
                .invalidates(InvalidateModes::RENDER)
                .convert(|value: f64| {
                    if value.is_nan() {
                        Err("opacity must be a number".into())
                    } else {
                        Ok(value.clamp(0.0, 1.0))
                    }
                })
                .build(),
        )?;
        let background = registry.register(
            types.visual,
            "Background",
            PropertyMetadataBuilder::new(None::<Brush>)
                .invalidates(InvalidateModes::RENDER)
                .build(),
        )?;
        let grid_row = registry.register(
            types.grid,
            "Row",
            PropertyMetadataBuilder::new(0_usize)
                .invalidates(InvalidateModes::PARENT_MEASURE)
                .build(),
        )?;
        let grid_column = registry.register(
            types.grid,
            "Column",
            PropertyMetadataBuilder::new(0_usize)
                .invalidates(InvalidateModes::PARENT_MEASURE)
                .build(),
        )?;
        Ok(Self {
            is_visible,
            opacity,
            background,
            grid_row,
            grid_column,
        })
    }
}
