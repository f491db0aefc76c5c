#![deny(clippy::all)]
#![forbid(unsafe_code)]

use arrayvec::ArrayVec;
use rand::distr::Distribution;
use rand::Rng;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::Bernoulli;
use rayon::prelude::*;
use std::fmt;
use std::ops::{Index, IndexMut};

pub use rand_distr::BernoulliError;

/// A fixed-size grid of live/dead cells, stored row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    size: GridSize,
    cells: Vec<bool>,
}

impl Grid {
    /// An all-dead grid.
    pub fn new(size: GridSize) -> Self {
        assert!(size.width > 0 && size.height > 0);
        Self {
            size,
            cells: vec![false; size.num_cells()],
        }
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells_iter(&self) -> impl DoubleEndedIterator<Item = &bool> + Clone {
        self.cells.iter()
    }

    pub fn get(&self, loc: Loc) -> Option<bool> {
        loc.grid_index(self.size).map(|index| self.cells[index])
    }

    /// Flips the cell at `loc` and returns its new state.
    pub fn toggle(&mut self, loc: Loc) -> bool {
        let cell = &mut self[loc];
        *cell = !*cell;
        *cell
    }

    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|&&alive| alive).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.contains(&true)
    }

    /// Applies the Conway rule to every cell against this grid and returns the
    /// result as a new grid. `self` is only ever read.
    pub fn next_generation(&self) -> Grid {
        let width = self.size.width as usize;
        let mut next_cells = vec![false; self.num_cells()];
        next_cells
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(row, next_row)| {
                for (col, next_cell) in next_row.iter_mut().enumerate() {
                    let loc = Loc::new(row as u32, col as u32);
                    *next_cell = next_alive(self[loc], live_neighbor_count(self, loc));
                }
            });
        Grid {
            size: self.size,
            cells: next_cells,
        }
    }
}

impl Index<Loc> for Grid {
    type Output = bool;

    fn index(&self, loc: Loc) -> &Self::Output {
        let index = loc
            .grid_index(self.size)
            .unwrap_or_else(|| panic!("Index indices {}, {} out of bounds", loc.row, loc.col));
        &self.cells[index]
    }
}

impl IndexMut<Loc> for Grid {
    fn index_mut(&mut self, loc: Loc) -> &mut Self::Output {
        let index = loc
            .grid_index(self.size)
            .unwrap_or_else(|| panic!("Index_mut indices {}, {} out of bounds", loc.row, loc.col));
        &mut self.cells[index]
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.size.width as usize) {
            for &alive in row {
                f.write_str(if alive { "#" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Conway's B3/S23 rule.
pub fn next_alive(alive: bool, live_neighbors: u32) -> bool {
    if alive {
        (2..=3).contains(&live_neighbors)
    } else {
        live_neighbors == 3
    }
}

/// Number of live cells among the up to 8 cells adjacent to `loc`. Cells past
/// the grid edge count as absent; the grid does not wrap.
pub fn live_neighbor_count(grid: &Grid, loc: Loc) -> u32 {
    Neighborhood::new(grid, loc).num_live()
}

pub struct Neighborhood<'a> {
    grid: &'a Grid,
    neighbors: ArrayVec<Loc, 8>,
}

impl<'a> Neighborhood<'a> {
    pub fn new(grid: &'a Grid, center: Loc) -> Self {
        assert!(
            grid.size().contains(center),
            "Neighborhood center {}, {} out of bounds",
            center.row,
            center.col
        );
        Self {
            grid,
            neighbors: center.neighbors(grid.size()),
        }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn for_neighbor_cells<F>(&self, mut f: F)
    where
        F: FnMut(bool),
    {
        for &loc in &self.neighbors {
            f(self.grid[loc]);
        }
    }

    pub fn num_live(&self) -> u32 {
        let mut result = 0;
        self.for_neighbor_cells(|alive| {
            if alive {
                result += 1;
            }
        });
        result
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub fn num_cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, loc: Loc) -> bool {
        loc.row < self.height && loc.col < self.width
    }
}

const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Loc {
    pub row: u32,
    pub col: u32,
}

impl Loc {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    pub fn grid_index(&self, size: GridSize) -> Option<usize> {
        if size.contains(*self) {
            Some(self.row as usize * size.width as usize + self.col as usize)
        } else {
            None
        }
    }

    /// The in-bounds cells at Chebyshev distance 1.
    pub fn neighbors(&self, size: GridSize) -> ArrayVec<Loc, 8> {
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(|&(row_offset, col_offset)| self.offset(row_offset, col_offset, size))
            .collect()
    }

    fn offset(&self, row_offset: i32, col_offset: i32, size: GridSize) -> Option<Loc> {
        let loc = Loc::new(
            self.row.checked_add_signed(row_offset)?,
            self.col.checked_add_signed(col_offset)?,
        );
        size.contains(loc).then_some(loc)
    }
}

/// Fills grids with independently live cells.
#[derive(Clone, Copy, Debug)]
pub struct Seeder {
    alive: Bernoulli,
}

impl Seeder {
    pub fn new(probability_alive: f64) -> Result<Self, BernoulliError> {
        Ok(Self {
            alive: Bernoulli::new(probability_alive)?,
        })
    }

    pub fn seed(&self, size: GridSize, rand: &mut Random) -> Grid {
        let mut grid = Grid::new(size);
        for cell in grid.cells.iter_mut() {
            *cell = rand.sample(&self.alive);
        }
        grid
    }
}

#[derive(Debug)]
pub struct Random {
    rng: SmallRng,
}

impl Random {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_rng(&mut rand::rng()),
        }
    }

    /// Reproducible sequence, for tests and replays.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn sample<T, D>(&mut self, distr: &D) -> T
    where
        D: Distribution<T>,
    {
        self.rng.sample(distr)
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new()
    }
}
