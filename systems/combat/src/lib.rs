#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that computes to-hit totals and resolves attacks.
//!
//! All modifiers are additive and lower totals favor the shooter: the sum
//! of two d6 must meet or exceed the total for a hit. The system never
//! mutates units; the world applies hit effects from the returned outcome.

use laser_tactics_core::{
    AttackOutcome, DiceRoll, Direction, GridPos, RandomSource, ToHitBreakdown, UnitSnapshot,
};

/// Cardinal components of the bearing from one tile toward another.
///
/// A straight bearing yields one component, a diagonal bearing two, and a
/// zero-distance bearing none.
#[must_use]
pub fn bearing(from: GridPos, to: GridPos) -> [Option<Direction>; 2] {
    let north_south = if from.row() > to.row() {
        Some(Direction::North)
    } else if from.row() < to.row() {
        Some(Direction::South)
    } else {
        None
    };
    let east_west = if from.col() > to.col() {
        Some(Direction::West)
    } else if from.col() < to.col() {
        Some(Direction::East)
    } else {
        None
    };
    [north_south, east_west]
}

/// Reports whether the target's cover faces the shooter's position.
///
/// The target is covered when any cardinal component of the bearing from
/// the target toward the shooter matches a set cover flag.
#[must_use]
pub fn is_covered_from(target: &UnitSnapshot, shooter_pos: GridPos) -> bool {
    bearing(target.pos, shooter_pos)
        .into_iter()
        .flatten()
        .any(|direction| target.cover.covered_toward(direction))
}

/// Computes the additive to-hit decomposition for one prospective attack.
#[must_use]
pub fn to_hit_breakdown(
    shooter: &UnitSnapshot,
    target: &UnitSnapshot,
    snapshot: bool,
) -> ToHitBreakdown {
    let shooter_stats = shooter.stats();
    let target_stats = target.stats();

    ToHitBreakdown {
        base: shooter_stats.to_hit,
        elevation_bonus: if shooter.elevated {
            shooter_stats.elevated_hit_bonus
        } else {
            0
        },
        cover_bonus: if is_covered_from(target, shooter.pos) {
            target_stats.cover_defense_bonus
        } else {
            0
        },
        elevation_malus: if target.elevated {
            target_stats.elev_defense_malus
        } else {
            0
        },
        snapshot_penalty: if snapshot {
            shooter_stats.overwatch_penalty
        } else {
            0
        },
    }
}

/// Compares a rolled dice pair against a required total.
#[must_use]
pub fn roll_meets(required: i16, dice: DiceRoll) -> bool {
    i16::from(dice.total()) >= required
}

/// Rolls two d6 from the injected source and resolves one attack.
pub fn resolve_attack(
    shooter: &UnitSnapshot,
    target: &UnitSnapshot,
    snapshot: bool,
    dice: &mut dyn RandomSource,
) -> AttackOutcome {
    let required = to_hit_breakdown(shooter, target, snapshot).total();
    let roll = DiceRoll {
        first: dice.roll_d6(),
        second: dice.roll_d6(),
    };
    AttackOutcome {
        dice: roll,
        required,
        hit: roll_meets(required, roll),
    }
}
