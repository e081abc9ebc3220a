use rand::Rng;
use thiserror::Error;

/// Contents of a single grid cell. The discriminant is the cell code agents observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Cell {
    #[default]
    Empty = 0,
    Food = 1,
    Wall = 2,
    Hazard = 3,
}

impl Cell {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Cell::Empty),
            1 => Some(Cell::Food),
            2 => Some(Cell::Wall),
            3 => Some(Cell::Hazard),
            _ => None,
        }
    }
}

/// Why a grid mutation was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    #[error("Cell ({x}, {y}) is outside the {size}x{size} grid")]
    OutOfBounds { x: i32, y: i32, size: usize },
    #[error("Cell ({x}, {y}) is already occupied")]
    Occupied { x: i32, y: i32 },
    #[error("Cell ({x}, {y}) is empty")]
    Empty { x: i32, y: i32 },
    #[error("A {size}x{size} grid is not addressable")]
    TooLarge { size: usize },
}

/// Per-tick update rules applied by [`update_world`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPolicy {
    /// Probability that one food item regrows on a random empty cell
    pub food_regrowth: f64,
}

/// Square grid of cells; at most one object per cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridWorld {
    size: usize,
    cells: Vec<Cell>,
}

impl GridWorld {
    /// # Panics
    ///
    /// If `size` is too large for [`try_new`](Self::try_new).
    pub fn new(size: usize) -> Self {
        match Self::try_new(size) {
            Ok(world) => world,
            Err(e) => panic!("{}", e),
        }
    }

    /// Builds an empty grid whose side fits `i32` coordinates and whose cell
    /// count fits `usize`.
    pub fn try_new(size: usize) -> Result<Self, GridError> {
        let cells = i32::try_from(size)
            .ok()
            .and_then(|_| size.checked_mul(size))
            .ok_or(GridError::TooLarge { size })?;
        Ok(Self {
            size,
            cells: vec![Cell::Empty; cells],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn index(&self, x: i32, y: i32) -> Result<usize, GridError> {
        let in_bounds = |v: i32| v >= 0 && (v as usize) < self.size;
        if in_bounds(x) && in_bounds(y) {
            Ok(y as usize * self.size + x as usize)
        } else {
            Err(GridError::OutOfBounds {
                x,
                y,
                size: self.size,
            })
        }
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_ok()
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        self.index(x, y).ok().map(|i| self.cells[i])
    }

    pub fn try_spawn(&mut self, x: i32, y: i32, cell: Cell) -> Result<(), GridError> {
        let idx = self.index(x, y)?;
        if self.cells[idx] != Cell::Empty {
            return Err(GridError::Occupied { x, y });
        }
        self.cells[idx] = cell;
        Ok(())
    }

    pub fn try_remove(&mut self, x: i32, y: i32) -> Result<Cell, GridError> {
        let idx = self.index(x, y)?;
        match std::mem::take(&mut self.cells[idx]) {
            Cell::Empty => Err(GridError::Empty { x, y }),
            removed => Ok(removed),
        }
    }

    pub fn try_move(&mut self, from: (i32, i32), to: (i32, i32)) -> Result<(), GridError> {
        let src = self.index(from.0, from.1)?;
        let dst = self.index(to.0, to.1)?;
        if self.cells[src] == Cell::Empty {
            return Err(GridError::Empty {
                x: from.0,
                y: from.1,
            });
        }
        if self.cells[dst] != Cell::Empty {
            return Err(GridError::Occupied { x: to.0, y: to.1 });
        }
        self.cells.swap(src, dst);
        Ok(())
    }

    pub fn count(&self, cell: Cell) -> usize {
        self.cells.iter().filter(|&&c| c == cell).count()
    }

    pub fn empty_cells(&self) -> Vec<(i32, i32)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Cell::Empty)
            .map(|(i, _)| ((i % self.size) as i32, (i / self.size) as i32))
            .collect()
    }

    /// Places up to `count` objects on random empty cells and returns how many were placed.
    pub fn scatter<R: Rng + ?Sized>(&mut self, cell: Cell, count: usize, rng: &mut R) -> usize {
        let mut placed = 0;
        while placed < count {
            let empty = self.empty_cells();
            if empty.is_empty() {
                break;
            }
            let (x, y) = empty[rng.random_range(0..empty.len())];
            if self.try_spawn(x, y, cell).is_ok() {
                placed += 1;
            }
        }
        placed
    }

    /// Square window of cell codes centred on (x, y); cells off the grid read as walls.
    pub fn vision_window(&self, x: i32, y: i32, radius: usize) -> Vec<Vec<u8>> {
        let r = radius as i32;
        (y - r..=y + r)
            .map(|wy| {
                (x - r..=x + r)
                    .map(|wx| self.get(wx, wy).unwrap_or(Cell::Wall).code())
                    .collect()
            })
            .collect()
    }

    /// Row-major cell codes.
    pub fn rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(self.size.max(1))
            .map(|row| row.iter().map(|c| c.code()).collect())
            .collect()
    }
}

pub fn init_grid_world(size: usize) -> GridWorld {
    GridWorld::new(size)
}

/// Places `cell` at (x, y) if the cell is in bounds and empty.
pub fn spawn_object(world: &mut GridWorld, x: i32, y: i32, cell: Cell) -> bool {
    world.try_spawn(x, y, cell).is_ok()
}

/// Clears (x, y); false if out of bounds or already empty.
pub fn remove_object(world: &mut GridWorld, x: i32, y: i32) -> bool {
    world.try_remove(x, y).is_ok()
}

/// Moves the object at (x1, y1) to the empty cell (x2, y2).
pub fn move_object(world: &mut GridWorld, x1: i32, y1: i32, x2: i32, y2: i32) -> bool {
    world.try_move((x1, y1), (x2, y2)).is_ok()
}

/// Applies one tick of world dynamics. The default policy leaves the grid untouched.
pub fn update_world<R: Rng + ?Sized>(world: &mut GridWorld, policy: &WorldPolicy, rng: &mut R) {
    if policy.food_regrowth > 0.0 && rng.random::<f64>() < policy.food_regrowth {
        world.scatter(Cell::Food, 1, rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_try_new_rejects_unaddressable_size() {
        assert_eq!(
            GridWorld::try_new(usize::MAX).unwrap_err(),
            GridError::TooLarge { size: usize::MAX }
        );
        let world = GridWorld::try_new(3).unwrap();
        assert_eq!(world.empty_cells().len(), 9);
    }

    #[test]
    fn test_spawn_on_empty_and_occupied_cell() {
        let mut world = init_grid_world(10);
        assert!(spawn_object(&mut world, 0, 0, Cell::Food));
        assert_eq!(world.get(0, 0), Some(Cell::Food));

        assert!(!spawn_object(&mut world, 0, 0, Cell::Wall));
        assert_eq!(world.get(0, 0), Some(Cell::Food));
    }

    #[test]
    fn test_out_of_bounds_is_distinguishable() {
        let mut world = init_grid_world(4);
        assert!(!spawn_object(&mut world, -1, 0, Cell::Food));
        assert!(!spawn_object(&mut world, 0, 4, Cell::Food));
        assert_eq!(
            world.try_spawn(-1, 2, Cell::Food),
            Err(GridError::OutOfBounds { x: -1, y: 2, size: 4 })
        );
        world.try_spawn(1, 1, Cell::Hazard).unwrap();
        assert_eq!(
            world.try_spawn(1, 1, Cell::Food),
            Err(GridError::Occupied { x: 1, y: 1 })
        );
    }

    #[test]
    fn test_move_from_empty_leaves_world_unchanged() {
        let mut world = init_grid_world(5);
        spawn_object(&mut world, 4, 4, Cell::Wall);
        let before = world.clone();
        assert!(!move_object(&mut world, 0, 0, 1, 1));
        assert_eq!(world, before);
    }

    #[test]
    fn test_move_into_occupied_or_outside_fails() {
        let mut world = init_grid_world(5);
        spawn_object(&mut world, 0, 0, Cell::Food);
        spawn_object(&mut world, 1, 0, Cell::Wall);
        assert!(!move_object(&mut world, 0, 0, 1, 0));
        assert!(!move_object(&mut world, 0, 0, 0, -1));
        assert!(move_object(&mut world, 0, 0, 0, 1));
        assert_eq!(world.get(0, 0), Some(Cell::Empty));
        assert_eq!(world.get(0, 1), Some(Cell::Food));
    }

    #[test]
    fn test_remove() {
        let mut world = init_grid_world(3);
        spawn_object(&mut world, 2, 2, Cell::Hazard);
        assert_eq!(world.try_remove(2, 2), Ok(Cell::Hazard));
        assert!(!remove_object(&mut world, 2, 2));
        assert!(!remove_object(&mut world, 3, 3));
    }

    #[test]
    fn test_vision_window_pads_with_walls() {
        let mut world = init_grid_world(3);
        spawn_object(&mut world, 0, 0, Cell::Food);
        let window = world.vision_window(0, 0, 1);
        assert_eq!(window, vec![vec![2, 2, 2], vec![2, 1, 0], vec![2, 0, 0]]);
    }

    #[test]
    fn test_scatter_respects_free_space() {
        let mut rng = SmallRng::seed_from_u64(9);
        let mut world = init_grid_world(3);
        assert_eq!(world.scatter(Cell::Food, 4, &mut rng), 4);
        assert_eq!(world.scatter(Cell::Wall, 10, &mut rng), 5);
        assert_eq!(world.count(Cell::Empty), 0);
    }

    #[test]
    fn test_default_update_is_identity() {
        let mut rng = SmallRng::seed_from_u64(10);
        let mut world = init_grid_world(6);
        world.scatter(Cell::Hazard, 3, &mut rng);
        let before = world.clone();
        for _ in 0..20 {
            update_world(&mut world, &WorldPolicy::default(), &mut rng);
        }
        assert_eq!(world, before);
    }

    #[test]
    fn test_regrowth_policy_adds_food() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut world = init_grid_world(6);
        update_world(&mut world, &WorldPolicy { food_regrowth: 1.0 }, &mut rng);
        assert_eq!(world.count(Cell::Food), 1);
    }

    #[test]
    fn test_cell_codes_round_trip() {
        for code in 0..4 {
            assert_eq!(Cell::from_code(code).map(Cell::code), Some(code));
        }
        assert_eq!(Cell::from_code(4), None);
        assert_eq!(init_grid_world(2).rows(), vec![vec![0, 0], vec![0, 0]]);
    }
}
