#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that computes layered movement ranges over the tile grid.
//!
//! The range of one action point of movement is built by frontier expansion:
//! each step only grows from the tiles that entered on the previous step, so
//! the per-step distance is bounded rather than the total path length.

use laser_tactics_core::{Direction, GridPos, GridView, ReachableSteps, TileKind};

/// Movement parameters of the unit whose range is being computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveProfile {
    /// Tiles of movement bought by one action point.
    pub move_speed: u8,
    /// Whether the unit already stands on elevated ground.
    pub elevated: bool,
    /// Whether the unit climbs elevated tiles without ending its step.
    pub can_climb: bool,
}

/// Computes the tiles reachable from `origin` with one action point.
///
/// Step 0 of the result holds only the origin. Each later step holds the
/// tiles that entered the frontier at that distance. Expansion only checks
/// membership against the previous and current frontiers, so a tile first
/// reached two steps earlier may legally reappear.
#[must_use]
pub fn determine_range(grid: GridView<'_>, origin: GridPos, mover: MoveProfile) -> ReachableSteps {
    let mut steps: Vec<Vec<GridPos>> = vec![vec![origin]];

    for step_index in 1..=usize::from(mover.move_speed) {
        let mut frontier: Vec<GridPos> = Vec::new();
        let previous = &steps[step_index - 1];

        for &tile in previous {
            // Climbing onto high ground ends the step unless the unit is
            // already elevated or can climb. The home tile always expands.
            if step_index > 1
                && grid.kind(tile) == TileKind::Elevated
                && !mover.elevated
                && !mover.can_climb
            {
                continue;
            }

            for direction in Direction::ALL {
                let Some(next) = grid.neighbor(tile, direction) else {
                    continue;
                };
                if !grid.kind(next).is_walkable() {
                    continue;
                }
                if previous.contains(&next) || frontier.contains(&next) {
                    continue;
                }
                if grid.is_occupied(next) {
                    continue;
                }
                // A diagonal step may not cut a wall corner: both flanking
                // cardinals must be clear of walls.
                if let Some((north_south, east_west)) = direction.components() {
                    if grid.kind_toward(tile, north_south).is_wall()
                        || grid.kind_toward(tile, east_west).is_wall()
                    {
                        continue;
                    }
                }
                frontier.push(next);
            }
        }

        steps.push(frontier);
    }

    ReachableSteps::from_steps(steps)
}
