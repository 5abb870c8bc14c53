// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A grid visual and handles to its rows and columns.
//!
//! Children pick their cell with the attached `Grid.Row` and `Grid.Column`
//! properties. Row and column definitions live in the [`Grid`] visual;
//! [`GridDimension`] is a weak handle to one of them that keeps answering
//! after the definition or the grid is gone.

use kurbo::{Rect, Size};
use understory_invalidation::{CollectionAction, InvalidateReason};

use crate::error::{TreeError, VisualError};
use crate::tree::Tree;
use crate::types::NodeId;
use crate::visual::{ArrangeCtx, MeasureCtx, Visual};

/// Size of a row or column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GridLength {
    /// Sized to the largest child in the track.
    Auto,
    /// A fixed size in logical pixels.
    Pixel(f64),
    /// A weighted share of the space left by the other tracks.
    Star(f64),
}

impl Default for GridLength {
    fn default() -> Self {
        Self::Star(1.0)
    }
}

/// Rows or columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GridAxis {
    /// Horizontal tracks, stacked vertically.
    Row,
    /// Vertical tracks, side by side.
    Column,
}

/// Identity of a row or column definition, unique within its grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DimensionId(u64);

#[derive(Clone, Debug)]
struct Track {
    id: DimensionId,
    length: GridLength,
    actual: f64,
    offset: f64,
}

/// A visual laying out its children in rows and columns.
///
/// A grid without definitions on an axis behaves as if it had a single
/// `Star(1.0)` track on that axis. Children whose row or column is out of
/// range are placed in the last track.
#[derive(Clone, Debug, Default)]
pub struct Grid {
    rows: Vec<Track>,
    columns: Vec<Track>,
    // Largest child extent per effective track, from the last measure.
    row_content: Vec<f64>,
    column_content: Vec<f64>,
    next_id: u64,
}

impl Grid {
    /// Creates a grid without definitions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of row definitions.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of column definitions.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn tracks(&self, axis: GridAxis) -> &[Track] {
        match axis {
            GridAxis::Row => &self.rows,
            GridAxis::Column => &self.columns,
        }
    }

    fn tracks_mut(&mut self, axis: GridAxis) -> &mut Vec<Track> {
        match axis {
            GridAxis::Row => &mut self.rows,
            GridAxis::Column => &mut self.columns,
        }
    }

    fn position(&self, axis: GridAxis, id: DimensionId) -> Option<usize> {
        self.tracks(axis).iter().position(|track| track.id == id)
    }

    fn lengths(&self, axis: GridAxis) -> Vec<GridLength> {
        let tracks = self.tracks(axis);
        if tracks.is_empty() {
            vec![GridLength::default()]
        } else {
            tracks.iter().map(|track| track.length).collect()
        }
    }

    fn cell_of(row: usize, column: usize, rows: usize, columns: usize) -> (usize, usize) {
        (row.min(rows - 1), column.min(columns - 1))
    }
}

impl Visual for Grid {
    fn measure(&mut self, ctx: &mut MeasureCtx<'_>, available: Size) -> Size {
        let props = ctx.properties().clone();
        let rows = self.lengths(GridAxis::Row);
        let columns = self.lengths(GridAxis::Column);
        let mut row_content = vec![0.0_f64; rows.len()];
        let mut column_content = vec![0.0_f64; columns.len()];

        for child in ctx.children() {
            let row = ctx.get_of(child, props.grid_row).unwrap_or(0);
            let column = ctx.get_of(child, props.grid_column).unwrap_or(0);
            let (row, column) = Self::cell_of(row, column, rows.len(), columns.len());
            let offered = Size::new(
                offered_extent(columns[column], available.width),
                offered_extent(rows[row], available.height),
            );
            let size = ctx.measure_child(child, offered);
            column_content[column] = column_content[column].max(size.width);
            row_content[row] = row_content[row].max(size.height);
        }

        let width: f64 = resolve(&columns, &column_content, f64::INFINITY).iter().sum();
        let height: f64 = resolve(&rows, &row_content, f64::INFINITY).iter().sum();
        self.row_content = row_content;
        self.column_content = column_content;
        Size::new(width, height)
    }

    fn arrange(&mut self, ctx: &mut ArrangeCtx<'_>, rect: Rect) -> Result<(), VisualError> {
        let props = ctx.properties().clone();
        let rows = self.lengths(GridAxis::Row);
        let columns = self.lengths(GridAxis::Column);
        let heights = resolve(&rows, &self.row_content, rect.height());
        let widths = resolve(&columns, &self.column_content, rect.width());
        let row_offsets = offsets(&heights);
        let column_offsets = offsets(&widths);

        for (track, (actual, offset)) in self
            .rows
            .iter_mut()
            .zip(heights.iter().zip(&row_offsets))
        {
            track.actual = *actual;
            track.offset = *offset;
        }
        for (track, (actual, offset)) in self
            .columns
            .iter_mut()
            .zip(widths.iter().zip(&column_offsets))
        {
            track.actual = *actual;
            track.offset = *offset;
        }

        for child in ctx.children() {
            let row = ctx.get_of(child, props.grid_row).unwrap_or(0);
            let column = ctx.get_of(child, props.grid_column).unwrap_or(0);
            let (row, column) = Self::cell_of(row, column, rows.len(), columns.len());
            let cell = Rect::from_origin_size(
                (
                    rect.x0 + column_offsets[column],
                    rect.y0 + row_offsets[row],
                ),
                (widths[column], heights[row]),
            );
            ctx.arrange_child(child, cell);
        }
        Ok(())
    }
}

/// The extent offered to a child in a track during measure.
fn offered_extent(length: GridLength, available: f64) -> f64 {
    match length {
        GridLength::Pixel(pixels) => pixels.max(0.0),
        GridLength::Auto => f64::INFINITY,
        GridLength::Star(_) => available,
    }
}

/// Resolves track sizes for `available` space.
///
/// With infinite space, star tracks size to their content, scaled so that
/// the star ratios hold.
fn resolve(lengths: &[GridLength], content: &[f64], available: f64) -> Vec<f64> {
    let content_of = |i: usize| content.get(i).copied().unwrap_or(0.0);
    let mut sizes = vec![0.0; lengths.len()];
    let mut fixed = 0.0;
    let mut total_weight = 0.0;
    for (i, length) in lengths.iter().enumerate() {
        match *length {
            GridLength::Pixel(pixels) => sizes[i] = pixels.max(0.0),
            GridLength::Auto => sizes[i] = content_of(i),
            GridLength::Star(weight) => total_weight += weight.max(0.0),
        }
        fixed += sizes[i];
    }
    if total_weight <= 0.0 {
        return sizes;
    }

    let per_weight = if available.is_finite() {
        (available - fixed).max(0.0) / total_weight
    } else {
        lengths
            .iter()
            .enumerate()
            .filter_map(|(i, length)| match *length {
                GridLength::Star(weight) if weight > 0.0 => Some(content_of(i) / weight),
                _ => None,
            })
            .fold(0.0, f64::max)
    };
    for (i, length) in lengths.iter().enumerate() {
        if let GridLength::Star(weight) = *length {
            sizes[i] = weight.max(0.0) * per_weight;
        }
    }
    sizes
}

fn offsets(sizes: &[f64]) -> Vec<f64> {
    sizes
        .iter()
        .scan(0.0, |offset, size| {
            let start = *offset;
            *offset += size;
            Some(start)
        })
        .collect()
}

/// A weak handle to a row or column of a grid.
///
/// Every query looks the definition up again, so a handle stays correct as
/// definitions are added and removed around it. Once the grid or the
/// definition is gone the handle is unattached: its index is `None` and it
/// has no cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridDimension {
    grid: NodeId,
    id: DimensionId,
    axis: GridAxis,
}

impl GridDimension {
    /// The grid node this dimension belongs to.
    #[must_use]
    pub fn grid(&self) -> NodeId {
        self.grid
    }

    /// Whether this is a row or a column.
    #[must_use]
    pub fn axis(&self) -> GridAxis {
        self.axis
    }

    /// The identity of the definition.
    #[must_use]
    pub fn id(&self) -> DimensionId {
        self.id
    }

    /// Position among the grid's definitions on this axis.
    #[must_use]
    pub fn index(&self, tree: &Tree) -> Option<usize> {
        tree.visual::<Grid>(self.grid)?.position(self.axis, self.id)
    }

    /// Returns `true` while the grid and the definition exist.
    #[must_use]
    pub fn is_attached(&self, tree: &Tree) -> bool {
        self.index(tree).is_some()
    }

    /// The following definition on the same axis.
    #[must_use]
    pub fn next(&self, tree: &Tree) -> Option<Self> {
        let index = self.index(tree)?;
        self.sibling(tree, index.checked_add(1)?)
    }

    /// The preceding definition on the same axis.
    #[must_use]
    pub fn previous(&self, tree: &Tree) -> Option<Self> {
        let index = self.index(tree)?;
        self.sibling(tree, index.checked_sub(1)?)
    }

    /// The declared length.
    #[must_use]
    pub fn length(&self, tree: &Tree) -> Option<GridLength> {
        self.track(tree).map(|track| track.length)
    }

    /// The size from the grid's last arrange.
    #[must_use]
    pub fn actual_size(&self, tree: &Tree) -> Option<f64> {
        self.track(tree).map(|track| track.actual)
    }

    /// The offset from the grid's origin, from the last arrange.
    #[must_use]
    pub fn offset(&self, tree: &Tree) -> Option<f64> {
        self.track(tree).map(|track| track.offset)
    }

    /// The children of the grid placed in this row or column.
    ///
    /// The iterator is lazy; call again to start over.
    pub fn cells<'a>(&self, tree: &'a Tree) -> impl Iterator<Item = NodeId> + 'a {
        let grid = tree.visual::<Grid>(self.grid);
        let index = grid.and_then(|grid| grid.position(self.axis, self.id));
        let count = grid.map_or(0, |grid| grid.tracks(self.axis).len());
        let property = match self.axis {
            GridAxis::Row => tree.properties().grid_row,
            GridAxis::Column => tree.properties().grid_column,
        };
        let children = if index.is_some() {
            tree.children(self.grid)
        } else {
            &[]
        };
        children.iter().copied().filter(move |child| {
            index.is_some_and(|index| {
                tree.get_value(*child, property)
                    .is_ok_and(|cell| cell.min(count - 1) == index)
            })
        })
    }

    fn track<'a>(&self, tree: &'a Tree) -> Option<&'a Track> {
        let tracks = tree.visual::<Grid>(self.grid)?.tracks(self.axis);
        tracks.iter().find(|track| track.id == self.id)
    }

    fn sibling(&self, tree: &Tree, index: usize) -> Option<Self> {
        let track = tree.visual::<Grid>(self.grid)?.tracks(self.axis).get(index)?;
        Some(Self {
            id: track.id,
            ..*self
        })
    }
}

impl Tree {
    /// Appends a column definition to a grid.
    pub fn add_column(
        &mut self,
        grid: NodeId,
        length: GridLength,
    ) -> Result<GridDimension, TreeError> {
        self.insert_dimension(grid, GridAxis::Column, usize::MAX, length)
    }

    /// Appends a row definition to a grid.
    pub fn add_row(&mut self, grid: NodeId, length: GridLength) -> Result<GridDimension, TreeError> {
        self.insert_dimension(grid, GridAxis::Row, usize::MAX, length)
    }

    /// Inserts a definition at `index`, clamped to the definition count.
    pub fn insert_dimension(
        &mut self,
        grid: NodeId,
        axis: GridAxis,
        index: usize,
        length: GridLength,
    ) -> Result<GridDimension, TreeError> {
        let visual = self.grid_mut(grid)?;
        visual.next_id += 1;
        let id = DimensionId(visual.next_id);
        let tracks = visual.tracks_mut(axis);
        let index = index.min(tracks.len());
        tracks.insert(
            index,
            Track {
                id,
                length,
                actual: 0.0,
                offset: 0.0,
            },
        );
        self.dimensions_changed(grid, axis, CollectionAction::Add);
        Ok(GridDimension { grid, id, axis })
    }

    /// Removes the column at `index`. Returns `false` if out of range.
    pub fn remove_column(&mut self, grid: NodeId, index: usize) -> Result<bool, TreeError> {
        self.remove_dimension_at(grid, GridAxis::Column, index)
    }

    /// Removes the row at `index`. Returns `false` if out of range.
    pub fn remove_row(&mut self, grid: NodeId, index: usize) -> Result<bool, TreeError> {
        self.remove_dimension_at(grid, GridAxis::Row, index)
    }

    /// Removes the definition behind a handle.
    ///
    /// Returns `false` if the handle was already unattached.
    pub fn remove_dimension(&mut self, dimension: GridDimension) -> Result<bool, TreeError> {
        match dimension.index(self) {
            Some(index) => self.remove_dimension_at(dimension.grid, dimension.axis, index),
            None => Ok(false),
        }
    }

    /// Replaces the length of a definition.
    ///
    /// Returns `false` if the handle is unattached or the length is unchanged.
    pub fn set_dimension_length(
        &mut self,
        dimension: GridDimension,
        length: GridLength,
    ) -> Result<bool, TreeError> {
        let visual = self.grid_mut(dimension.grid)?;
        let Some(track) = visual
            .tracks_mut(dimension.axis)
            .iter_mut()
            .find(|track| track.id == dimension.id)
        else {
            return Ok(false);
        };
        if track.length == length {
            return Ok(false);
        }
        track.length = length;
        self.dimensions_changed(dimension.grid, dimension.axis, CollectionAction::Replace);
        Ok(true)
    }

    /// Removes every definition on one axis.
    pub fn clear_dimensions(&mut self, grid: NodeId, axis: GridAxis) -> Result<(), TreeError> {
        let tracks = self.grid_mut(grid)?.tracks_mut(axis);
        if tracks.is_empty() {
            return Ok(());
        }
        tracks.clear();
        self.dimensions_changed(grid, axis, CollectionAction::Reset);
        Ok(())
    }

    /// All definitions of a grid on one axis, in order.
    pub fn dimensions(&self, grid: NodeId, axis: GridAxis) -> Result<Vec<GridDimension>, TreeError> {
        let visual = self.visual::<Grid>(grid).ok_or_else(|| match self.node(grid) {
            Ok(_) => TreeError::NotAGrid(grid),
            Err(err) => err,
        })?;
        Ok(visual
            .tracks(axis)
            .iter()
            .map(|track| GridDimension {
                grid,
                id: track.id,
                axis,
            })
            .collect())
    }

    fn remove_dimension_at(
        &mut self,
        grid: NodeId,
        axis: GridAxis,
        index: usize,
    ) -> Result<bool, TreeError> {
        let tracks = self.grid_mut(grid)?.tracks_mut(axis);
        if index >= tracks.len() {
            return Ok(false);
        }
        tracks.remove(index);
        self.dimensions_changed(grid, axis, CollectionAction::Remove);
        Ok(true)
    }

    fn grid_mut(&mut self, grid: NodeId) -> Result<&mut Grid, TreeError> {
        self.node(grid)?;
        self.visual_mut::<Grid>(grid)
            .ok_or(TreeError::NotAGrid(grid))
    }

    fn dimensions_changed(&mut self, grid: NodeId, axis: GridAxis, action: CollectionAction) {
        let item = match axis {
            GridAxis::Row => self.types().row_definition,
            GridAxis::Column => self.types().column_definition,
        };
        let modes = self.registry().collection_modes(item);
        let reason = InvalidateReason::collection_changed(
            self.type_name_of(grid),
            action,
            self.registry().type_name(item),
        );
        self.propagate(grid, modes, reason);
    }
}

#[cfg(test)]
mod tests {
    use understory_invalidation::Stage;

    use crate::visual::Container;

    use super::*;

    #[test]
    fn star_tracks_share_the_remainder() {
        let lengths = [
            GridLength::Pixel(100.0),
            GridLength::Star(1.0),
            GridLength::Star(3.0),
            GridLength::Auto,
        ];
        let content = [0.0, 0.0, 0.0, 20.0];
        assert_eq!(
            resolve(&lengths, &content, 500.0),
            vec![100.0, 95.0, 285.0, 20.0]
        );
        assert_eq!(offsets(&[1.0, 2.0, 3.0]), vec![0.0, 1.0, 3.0]);
    }

    #[test]
    fn unbounded_star_tracks_keep_their_ratio() {
        let lengths = [GridLength::Star(1.0), GridLength::Star(2.0)];
        assert_eq!(
            resolve(&lengths, &[30.0, 20.0], f64::INFINITY),
            vec![30.0, 60.0]
        );
    }

    #[test]
    fn children_are_placed_in_their_cells() {
        let mut tree = Tree::default();
        let grid = tree.insert(tree.types().grid, Grid::new()).unwrap();
        tree.set_root(Some(grid)).unwrap();
        tree.set_viewport(Size::new(300.0, 200.0));
        tree.add_column(grid, GridLength::Pixel(100.0)).unwrap();
        tree.add_column(grid, GridLength::Star(1.0)).unwrap();
        tree.add_row(grid, GridLength::Star(1.0)).unwrap();
        tree.add_row(grid, GridLength::Star(1.0)).unwrap();

        let child = tree.insert(tree.types().visual, Container).unwrap();
        tree.add_child(grid, child).unwrap();
        let (row, column) = (tree.properties().grid_row, tree.properties().grid_column);
        tree.set_value(child, row, 1).unwrap();
        tree.set_value(child, column, 1).unwrap();
        tree.run_pass();

        assert_eq!(
            tree.arranged_rect(child),
            Some(Rect::new(100.0, 100.0, 300.0, 200.0))
        );

        // Moving the child re-measures the grid through its parent modes.
        tree.set_value(child, column, 0).unwrap();
        assert!(tree.needs(grid, Stage::Measure));
        tree.run_pass();
        assert_eq!(
            tree.arranged_rect(child),
            Some(Rect::new(0.0, 100.0, 100.0, 200.0))
        );
    }

    #[test]
    fn dimension_changes_invalidate_the_grid() {
        let mut tree = Tree::default();
        let grid = tree.insert(tree.types().grid, Grid::new()).unwrap();
        let column = tree.add_column(grid, GridLength::Auto).unwrap();
        tree.run_pass();

        assert!(tree.set_dimension_length(column, GridLength::Pixel(5.0)).unwrap());
        assert!(!tree.set_dimension_length(column, GridLength::Pixel(5.0)).unwrap());
        assert!(tree.needs(grid, Stage::Measure));
        assert_eq!(
            tree.last_reason(grid).unwrap().to_string(),
            "CollectionChanged(Grid: replace ColumnDefinition)"
        );
        tree.run_pass();
        assert_eq!(column.actual_size(&tree), Some(5.0));
        assert_eq!(column.offset(&tree), Some(0.0));
    }

    #[test]
    fn non_grid_nodes_are_rejected() {
        let mut tree = Tree::default();
        let node = tree.insert(tree.types().visual, Container).unwrap();
        assert_eq!(
            tree.add_row(node, GridLength::Auto),
            Err(TreeError::NotAGrid(node))
        );
        assert_eq!(
            tree.dimensions(node, GridAxis::Row),
            Err(TreeError::NotAGrid(node))
        );
    }
}
