#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that computes line of sight by geometric sampling.
//!
//! Each pair of tiles is probed with up to 25 candidate segments joining
//! their centers and corners. A tile is visible as soon as one segment
//! clears every wall rectangle, and the first such segment in a fixed
//! scan order (center-to-center probed first) becomes the canonical
//! sightline.
//! Sight is computed per observer and is not guaranteed to be symmetric;
//! callers must not assume that seeing implies being seen.

use std::collections::BTreeMap;

use laser_tactics_core::{GridPos, GridView, SightLine, Visibility};

/// Computes every tile visible from `origin`.
///
/// The result always contains the origin tile itself, with no stored
/// segment. Wall tiles are never recorded as visible.
#[must_use]
pub fn determine_los(grid: GridView<'_>, origin: GridPos) -> Visibility {
    let mut lines: BTreeMap<GridPos, Option<SightLine>> = BTreeMap::new();
    let _ = lines.insert(origin, None);

    for target in grid.open_positions() {
        if target == origin {
            continue;
        }
        if let Some(sight) = line_of_sight(grid, origin, target) {
            let _ = lines.insert(target, Some(sight));
        }
    }

    Visibility::from_lines(lines)
}

/// Finds the first unobstructed segment between two tiles, if any.
///
/// Candidate segments pair the source's five sample points with the
/// target's five, source-major, so the center-to-center segment is probed
/// first. Walls coincident with the target tile do not obstruct.
#[must_use]
pub fn line_of_sight(grid: GridView<'_>, source: GridPos, target: GridPos) -> Option<SightLine> {
    for from in source.sample_points() {
        for to in target.sample_points() {
            let candidate = SightLine::new(from, to);
            let blocked = grid
                .wall_positions()
                .any(|wall| wall != target && segment_touches_tile(&candidate, wall));
            if !blocked {
                return Some(candidate);
            }
        }
    }
    None
}

/// Reports whether the segment touches the tile's bounding rectangle.
///
/// Bounds are inclusive: a segment grazing an edge or corner counts as
/// touching.
fn segment_touches_tile(line: &SightLine, tile: GridPos) -> bool {
    let a = line.from();
    let b = line.to();
    let north = f64::from(tile.row());
    let south = f64::from(tile.row()) + 1.0;
    let west = f64::from(tile.col());
    let east = f64::from(tile.col()) + 1.0;

    // Both endpoints strictly beyond one edge: trivially clear.
    if a.y() < north && b.y() < north {
        return false;
    }
    if a.y() > south && b.y() > south {
        return false;
    }
    if a.x() < west && b.x() < west {
        return false;
    }
    if a.x() > east && b.x() > east {
        return false;
    }

    // Vertical segment: touching is a column containment question.
    if a.x() == b.x() {
        return !(a.x() < west || a.x() > east);
    }

    // Horizontal segment: touching is a row containment question.
    if a.y() == b.y() {
        return !(a.y() < north || a.y() > south);
    }

    // Sloped segment: intersect the four edge lines and check whether any
    // intersection falls within that edge's span.
    let slope = (b.y() - a.y()) / (b.x() - a.x());
    let y_intercept = a.y() - slope * a.x();
    let x_at_north = (north - y_intercept) / slope;
    let x_at_south = (south - y_intercept) / slope;
    let y_at_west = slope * west + y_intercept;
    let y_at_east = slope * east + y_intercept;

    (north..=south).contains(&y_at_west)
        || (north..=south).contains(&y_at_east)
        || (west..=east).contains(&x_at_north)
        || (west..=east).contains(&x_at_south)
}
