use hive_core::{EntityKey, Positioned};
use hive_space::{CellCoord, Filtered, PointUpdater, SpaceHash, SpaceHashUpdater};
use nalgebra::Vector3;

struct Robot {
    key: EntityKey,
    at: Vector3<f64>,
    enabled: bool,
}

impl Positioned for Robot {
    fn position(&self) -> Vector3<f64> {
        self.at
    }
}

fn robot(key: u64, x: f64, y: f64, z: f64) -> Robot {
    Robot {
        key: EntityKey(key),
        at: Vector3::new(x, y, z),
        enabled: true,
    }
}

fn rebuild<U: SpaceHashUpdater<Robot, EntityKey>>(
    grid: &mut SpaceHash<EntityKey>,
    policy: &U,
    robots: &[Robot],
) {
    grid.clear();
    for r in robots {
        policy.update(grid, r.key, r);
    }
}

fn cell_keys(grid: &SpaceHash<EntityKey>, cell: CellCoord) -> Vec<u64> {
    let mut keys = Vec::new();
    grid.for_each_in_cell(cell, |k| keys.push(k.0));
    keys.sort_unstable();
    keys
}

#[test]
fn unit_cells_split_three_robots() {
    let mut grid = SpaceHash::new(Vector3::new(1.0, 1.0, 1.0)).unwrap();
    let robots = [
        robot(1, 0.1, 0.1, 0.1),
        robot(2, 0.9, 0.9, 0.9),
        robot(3, 1.5, 1.5, 1.5),
    ];
    rebuild(&mut grid, &PointUpdater, &robots);

    assert_eq!(cell_keys(&grid, CellCoord::new(0, 0, 0)), vec![1, 2]);
    assert_eq!(cell_keys(&grid, CellCoord::new(1, 1, 1)), vec![3]);
}

#[test]
fn moved_population_replaces_old_entries() {
    let mut grid = SpaceHash::new(Vector3::new(0.5, 0.5, 0.5)).unwrap();
    let mut robots = vec![robot(1, 0.1, 0.1, 0.0), robot(2, 2.2, 0.1, 0.0)];
    rebuild(&mut grid, &PointUpdater, &robots);

    for r in &mut robots {
        r.at.x += 1.0;
    }
    rebuild(&mut grid, &PointUpdater, &robots);

    let mut everything = Vec::new();
    grid.for_each_in_cell_range(CellCoord::new(-10, -10, -1), CellCoord::new(10, 10, 1), |k| {
        everything.push(k.0)
    });
    everything.sort_unstable();
    assert_eq!(everything, vec![1, 2]);
    assert!(cell_keys(&grid, CellCoord::new(0, 0, 0)).is_empty());
    assert_eq!(cell_keys(&grid, CellCoord::new(2, 0, 0)), vec![1]);
    assert_eq!(cell_keys(&grid, CellCoord::new(6, 0, 0)), vec![2]);
}

#[test]
fn disabled_robots_stay_out_of_the_grid() {
    let mut grid = SpaceHash::new(Vector3::new(1.0, 1.0, 1.0)).unwrap();
    let mut robots = vec![robot(1, 0.2, 0.2, 0.0), robot(2, 0.4, 0.4, 0.0)];
    robots[1].enabled = false;

    let policy = Filtered::new(|r: &Robot| r.enabled, PointUpdater);
    rebuild(&mut grid, &policy, &robots);

    assert_eq!(cell_keys(&grid, CellCoord::new(0, 0, 0)), vec![1]);
}

#[test]
fn neighbourhood_query_across_origin() {
    let mut grid = SpaceHash::new(Vector3::new(1.0, 1.0, 1.0)).unwrap();
    let robots = [
        robot(1, -0.5, 0.0, 0.0),
        robot(2, 0.5, 0.0, 0.0),
        robot(3, -2.5, 0.0, 0.0),
    ];
    rebuild(&mut grid, &PointUpdater, &robots);

    let center = Vector3::new(0.0, 0.0, 0.0);
    let mut near = Vec::new();
    grid.for_each_near(&center, 0.6, |k| {
        let r = &robots[(k.0 - 1) as usize];
        if (r.at - center).norm() <= 0.6 {
            near.push(k.0);
        }
    });
    near.sort_unstable();
    assert_eq!(near, vec![1, 2]);
}
