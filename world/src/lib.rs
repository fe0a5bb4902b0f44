#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative match state and turn state machine for Laser Tactics.
//!
//! The world owns the tile grid, the units, both team ledgers and the
//! injected randomness source. Adapters mutate it exclusively through
//! [`apply`], which validates each command against the current turn state,
//! consults the pure reachability, visibility and combat systems, applies
//! the accepted delta, and reports everything that happened, typed
//! rejections included, as [`Event`] values. State never changes on a
//! rejected command.

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use laser_tactics_core::{
    Command, CoverFlags, Direction, Event, FireApCost, FireError, GridPos, GridView, LaserState,
    MapBlueprint, MoveError, RandomSource, ReachableSteps, RngCursor, SelectError, SpawnPoint,
    TargetError, Team, TileKind, TurnError, UnitClass, UnitId, UnitSnapshot, Visibility,
    VictoryCondition,
};
use laser_tactics_system_combat as combat;
use laser_tactics_system_reachability::{determine_range, MoveProfile};
use laser_tactics_system_visibility::determine_los;

/// Fatal problems detected while constructing a world from map data.
///
/// These are the only unrecoverable errors in the engine; every in-match
/// rule violation is reported as a rejection event instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MapIntegrityError {
    /// The blueprint carries no tiles at all.
    #[error("map has no tiles")]
    EmptyGrid,
    /// One row is shorter or longer than the first row.
    #[error("row {row} has {found} tiles, expected {expected}")]
    RaggedRows {
        /// Index of the offending row.
        row: usize,
        /// Number of tiles found in the row.
        found: usize,
        /// Number of tiles every row must have.
        expected: usize,
    },
    /// The blueprint names the reserved edge sentinel kind.
    #[error("tile at row {row}, col {col} uses the reserved edge kind")]
    ReservedTileKind {
        /// Row of the offending tile.
        row: usize,
        /// Column of the offending tile.
        col: usize,
    },
    /// The grid does not fit the supported index range.
    #[error("grid dimensions exceed the supported index range")]
    GridTooLarge,
    /// A spawn descriptor points outside the grid.
    #[error("spawn {index} lies outside the grid")]
    SpawnOutOfBounds {
        /// Index of the offending spawn descriptor.
        index: usize,
    },
    /// A spawn descriptor points at a wall.
    #[error("spawn {index} stands on a blocking tile")]
    SpawnOnBlockingTile {
        /// Index of the offending spawn descriptor.
        index: usize,
    },
    /// Two spawn descriptors claim the same tile.
    #[error("spawn {index} collides with an earlier unit")]
    SpawnCollision {
        /// Index of the offending spawn descriptor.
        index: usize,
    },
    /// A restored snapshot contradicts itself.
    #[error("snapshot state is internally inconsistent")]
    InconsistentSnapshot,
    /// A restored snapshot carries no randomness cursor.
    #[error("snapshot carries no randomness cursor to restore")]
    MissingRandomCursor,
}

/// Progress state of the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPhase {
    /// Both teams are still playing.
    InProgress,
    /// The match is decided; all further commands are rejected.
    Finished {
        /// Team that won.
        winner: Team,
        /// Condition that decided the match.
        condition: VictoryCondition,
    },
}

#[derive(Debug)]
struct TileGrid {
    rows: u32,
    cols: u32,
    kinds: Vec<TileKind>,
    occupants: Vec<Option<UnitId>>,
}

impl TileGrid {
    fn from_rows(rows: &[Vec<TileKind>]) -> Result<Self, MapIntegrityError> {
        let Some(first) = rows.first() else {
            return Err(MapIntegrityError::EmptyGrid);
        };
        let expected = first.len();
        if expected == 0 {
            return Err(MapIntegrityError::EmptyGrid);
        }

        let mut kinds = Vec::with_capacity(rows.len() * expected);
        for (row_index, row) in rows.iter().enumerate() {
            if row.len() != expected {
                return Err(MapIntegrityError::RaggedRows {
                    row: row_index,
                    found: row.len(),
                    expected,
                });
            }
            for (col_index, kind) in row.iter().enumerate() {
                if kind.is_edge() {
                    return Err(MapIntegrityError::ReservedTileKind {
                        row: row_index,
                        col: col_index,
                    });
                }
                kinds.push(*kind);
            }
        }

        Self::from_dense(kinds, rows.len(), expected)
    }

    fn from_dense(
        kinds: Vec<TileKind>,
        row_count: usize,
        col_count: usize,
    ) -> Result<Self, MapIntegrityError> {
        let rows = u32::try_from(row_count).map_err(|_| MapIntegrityError::GridTooLarge)?;
        let cols = u32::try_from(col_count).map_err(|_| MapIntegrityError::GridTooLarge)?;
        let occupants = vec![None; kinds.len()];
        Ok(Self {
            rows,
            cols,
            kinds,
            occupants,
        })
    }

    fn view(&self) -> GridView<'_> {
        GridView::new(&self.kinds, &self.occupants, self.rows, self.cols)
    }

    fn kind(&self, pos: GridPos) -> TileKind {
        self.view().kind(pos)
    }

    fn occupant(&self, pos: GridPos) -> Option<UnitId> {
        self.view().occupant(pos)
    }

    fn occupy(&mut self, unit: UnitId, pos: GridPos) {
        if let Some(index) = self.index(pos) {
            if let Some(slot) = self.occupants.get_mut(index) {
                *slot = Some(unit);
            }
        }
    }

    fn vacate(&mut self, pos: GridPos) {
        if let Some(index) = self.index(pos) {
            if let Some(slot) = self.occupants.get_mut(index) {
                *slot = None;
            }
        }
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        if pos.row() < self.rows && pos.col() < self.cols {
            let row = usize::try_from(pos.row()).ok()?;
            let col = usize::try_from(pos.col()).ok()?;
            let width = usize::try_from(self.cols).ok()?;
            Some(row * width + col)
        } else {
            None
        }
    }

    fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        let cols = self.cols;
        (0..self.kinds.len()).map(move |index| {
            GridPos::new(index as u32 / cols, index as u32 % cols)
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct Unit {
    id: UnitId,
    team: Team,
    class: UnitClass,
    pos: GridPos,
    ap: i8,
    can_move: bool,
    laser: LaserState,
    elevated: bool,
    cover: CoverFlags,
}

#[derive(Clone, Debug)]
struct TeamState {
    score: u32,
    score_limit: u32,
    name: Option<String>,
    bases: Vec<GridPos>,
}

#[derive(Clone, Debug)]
struct Selection {
    unit: UnitId,
    steps: ReachableSteps,
    visibility: Visibility,
    target: Option<UnitId>,
}

/// Default randomness source: a seeded ChaCha8 stream whose cursor can be
/// captured for persistence and replay.
#[derive(Debug)]
struct SeededRandom {
    seed: u64,
    rng: ChaCha8Rng,
}

impl SeededRandom {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn at_cursor(cursor: RngCursor) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(cursor.seed);
        rng.set_word_pos(cursor.word_pos);
        Self {
            seed: cursor.seed,
            rng,
        }
    }
}

impl RandomSource for SeededRandom {
    fn roll_d6(&mut self) -> u8 {
        self.rng.gen_range(1..=6)
    }

    fn shuffle(&mut self, units: &mut [UnitId]) {
        units.shuffle(&mut self.rng);
    }

    fn cursor(&self) -> Option<RngCursor> {
        Some(RngCursor {
            seed: self.seed,
            word_pos: self.rng.get_word_pos(),
        })
    }
}

/// Represents the authoritative Laser Tactics match state.
#[derive(Debug)]
pub struct World {
    grid: TileGrid,
    units: Vec<Unit>,
    red: TeamState,
    blue: TeamState,
    active_team: Team,
    turn_number: u32,
    phase: MatchPhase,
    selection: Option<Selection>,
    random: Box<dyn RandomSource>,
}

impl World {
    /// Builds a match from a map blueprint with the default seeded source.
    pub fn new(blueprint: &MapBlueprint, seed: u64) -> Result<Self, MapIntegrityError> {
        Self::with_random_source(blueprint, Box::new(SeededRandom::new(seed)))
    }

    /// Builds a match from a map blueprint with an injected random source.
    pub fn with_random_source(
        blueprint: &MapBlueprint,
        random: Box<dyn RandomSource>,
    ) -> Result<Self, MapIntegrityError> {
        let grid = TileGrid::from_rows(&blueprint.tiles)?;
        let mut world = Self {
            red: team_state(blueprint, Team::Red, &grid),
            blue: team_state(blueprint, Team::Blue, &grid),
            grid,
            units: Vec::new(),
            active_team: Team::Red,
            turn_number: 1,
            phase: MatchPhase::InProgress,
            selection: None,
            random,
        };
        world.spawn_units(&blueprint.spawns)?;

        // The second team spends the opening turn on the defensive and
        // starts fully overwatch-armed before either side has acted.
        for unit in world.units.iter_mut().filter(|unit| unit.team == Team::Blue) {
            unit.ap = -unit.class.stats().max_overwatch;
        }

        Ok(world)
    }

    /// Restores a match from a snapshot taken by [`query::snapshot`].
    ///
    /// The selection's derived range and sight sets are recomputed; they
    /// are pure functions of the restored state.
    pub fn from_snapshot(snapshot: &MatchSnapshot) -> Result<Self, MapIntegrityError> {
        let expected = usize::try_from(snapshot.rows)
            .ok()
            .and_then(|rows| usize::try_from(snapshot.cols).ok().map(|cols| rows * cols))
            .ok_or(MapIntegrityError::InconsistentSnapshot)?;
        if snapshot.kinds.len() != expected || expected == 0 {
            return Err(MapIntegrityError::InconsistentSnapshot);
        }
        for (index, kind) in snapshot.kinds.iter().enumerate() {
            if kind.is_edge() {
                let cols = usize::try_from(snapshot.cols)
                    .map_err(|_| MapIntegrityError::InconsistentSnapshot)?;
                return Err(MapIntegrityError::ReservedTileKind {
                    row: index / cols,
                    col: index % cols,
                });
            }
        }

        let cursor = snapshot.rng.ok_or(MapIntegrityError::MissingRandomCursor)?;
        let grid = TileGrid::from_dense(
            snapshot.kinds.clone(),
            snapshot.rows as usize,
            snapshot.cols as usize,
        )?;

        let mut world = Self {
            red: TeamState {
                score: snapshot.red.score,
                score_limit: snapshot.red.score_limit,
                name: snapshot.red.name.clone(),
                bases: bases_in(&grid, Team::Red),
            },
            blue: TeamState {
                score: snapshot.blue.score,
                score_limit: snapshot.blue.score_limit,
                name: snapshot.blue.name.clone(),
                bases: bases_in(&grid, Team::Blue),
            },
            grid,
            units: Vec::new(),
            active_team: snapshot.active_team,
            turn_number: snapshot.turn_number,
            phase: snapshot.phase,
            selection: None,
            random: Box::new(SeededRandom::at_cursor(cursor)),
        };

        for record in &snapshot.units {
            let kind = world.grid.kind(record.pos);
            if !kind.is_walkable() || world.grid.occupant(record.pos).is_some() {
                return Err(MapIntegrityError::InconsistentSnapshot);
            }
            world.grid.occupy(record.id, record.pos);
            world.units.push(Unit {
                id: record.id,
                team: record.team,
                class: record.class,
                pos: record.pos,
                ap: record.ap,
                can_move: record.can_move,
                laser: record.laser,
                elevated: record.elevated,
                cover: record.cover,
            });
        }

        if let Some(selected) = snapshot.selected {
            let Some(unit) = world.unit_copy(selected) else {
                return Err(MapIntegrityError::InconsistentSnapshot);
            };
            let target = match snapshot.targeted {
                Some(target) if world.unit_copy(target).is_none() => {
                    return Err(MapIntegrityError::InconsistentSnapshot);
                }
                other => other,
            };
            world.selection = Some(Selection {
                unit: selected,
                steps: world.compute_steps(unit),
                visibility: world.compute_visibility(unit.pos),
                target,
            });
        }

        Ok(world)
    }

    fn spawn_units(&mut self, spawns: &[SpawnPoint]) -> Result<(), MapIntegrityError> {
        for (index, spawn) in spawns.iter().enumerate() {
            let pos = GridPos::new(spawn.row, spawn.col);
            let kind = self.grid.kind(pos);
            if kind.is_edge() {
                return Err(MapIntegrityError::SpawnOutOfBounds { index });
            }
            if !kind.is_walkable() {
                return Err(MapIntegrityError::SpawnOnBlockingTile { index });
            }
            if self.grid.occupant(pos).is_some() {
                return Err(MapIntegrityError::SpawnCollision { index });
            }

            let id = UnitId::new(index as u32);
            let elevated = kind == TileKind::Elevated;
            self.grid.occupy(id, pos);
            self.units.push(Unit {
                id,
                team: spawn.team,
                class: spawn.class,
                pos,
                ap: spawn.class.stats().max_ap,
                can_move: true,
                laser: LaserState::Charged,
                elevated,
                cover: self.cover_at(pos, elevated),
            });
        }
        Ok(())
    }

    fn unit_copy(&self, id: UnitId) -> Option<Unit> {
        self.units.iter().find(|unit| unit.id == id).copied()
    }

    fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.iter_mut().find(|unit| unit.id == id)
    }

    fn team_state(&self, team: Team) -> &TeamState {
        match team {
            Team::Red => &self.red,
            Team::Blue => &self.blue,
        }
    }

    fn team_state_mut(&mut self, team: Team) -> &mut TeamState {
        match team {
            Team::Red => &mut self.red,
            Team::Blue => &mut self.blue,
        }
    }

    fn match_over(&self) -> bool {
        matches!(self.phase, MatchPhase::Finished { .. })
    }

    /// Cover is granted by adjacent walls, and by adjacent elevated tiles
    /// only while the unit itself stands on low ground.
    fn cover_at(&self, pos: GridPos, elevated: bool) -> CoverFlags {
        let view = self.grid.view();
        let mut cover = CoverFlags::none();
        for direction in Direction::CARDINALS {
            let kind = view.kind_toward(pos, direction);
            let covers = if elevated {
                kind.is_wall()
            } else {
                kind.is_wall() || kind == TileKind::Elevated
            };
            cover.set(direction, covers);
        }
        cover
    }

    fn compute_steps(&self, unit: Unit) -> ReachableSteps {
        let stats = unit.class.stats();
        determine_range(
            self.grid.view(),
            unit.pos,
            MoveProfile {
                move_speed: stats.move_speed,
                elevated: unit.elevated,
                can_climb: stats.can_climb,
            },
        )
    }

    fn compute_visibility(&self, pos: GridPos) -> Visibility {
        determine_los(self.grid.view(), pos)
    }

    fn snapshot_unit(&self, unit: Unit) -> UnitSnapshot {
        let selected = self
            .selection
            .as_ref()
            .map_or(false, |selection| selection.unit == unit.id);
        let targeted = self
            .selection
            .as_ref()
            .map_or(false, |selection| selection.target == Some(unit.id));
        let visible_to_selected = self
            .selection
            .as_ref()
            .map_or(false, |selection| selection.visibility.contains(unit.pos));
        UnitSnapshot {
            id: unit.id,
            team: unit.team,
            class: unit.class,
            pos: unit.pos,
            ap: unit.ap,
            can_move: unit.can_move,
            laser: unit.laser,
            elevated: unit.elevated,
            cover: unit.cover,
            selected,
            targeted,
            visible_to_selected,
        }
    }

    /// Applies every consequence of a landed hit in one operation: laser
    /// discharge, immediate base recharge, scoring, and elimination with
    /// victory bookkeeping when the victim's team has no usable base left.
    fn apply_hit(&mut self, victim_id: UnitId, scorer: Team, out_events: &mut Vec<Event>) {
        let Some(victim) = self.unit_copy(victim_id) else {
            return;
        };

        if let Some(unit) = self.unit_mut(victim_id) {
            if unit.ap < 0 {
                unit.ap = 0;
            }
            unit.laser = LaserState::Uncharged;
        }
        out_events.push(Event::LaserDischarged { unit: victim_id });

        if self.grid.kind(victim.pos).is_base_for(victim.team) {
            if let Some(unit) = self.unit_mut(victim_id) {
                unit.laser = LaserState::Charging;
            }
            out_events.push(Event::ChargingStarted { unit: victim_id });
        }

        let score = {
            let team = self.team_state_mut(scorer);
            team.score += 1;
            team.score
        };
        out_events.push(Event::PointScored {
            team: scorer,
            score,
        });

        if self.team_state(victim.team).bases.is_empty() {
            self.eliminate(victim_id, out_events);
        }

        if self.phase == MatchPhase::InProgress && score >= self.team_state(scorer).score_limit {
            self.phase = MatchPhase::Finished {
                winner: scorer,
                condition: VictoryCondition::Score,
            };
            out_events.push(Event::MatchEnded {
                winner: scorer,
                condition: VictoryCondition::Score,
            });
        }
    }

    fn eliminate(&mut self, victim_id: UnitId, out_events: &mut Vec<Event>) {
        let Some(index) = self.units.iter().position(|unit| unit.id == victim_id) else {
            return;
        };
        let victim = self.units[index];
        self.grid.vacate(victim.pos);
        let _ = self.units.remove(index);

        let selection_gone = self
            .selection
            .as_ref()
            .map_or(false, |selection| selection.unit == victim_id);
        if selection_gone {
            self.selection = None;
        } else if let Some(selection) = &mut self.selection {
            if selection.target == Some(victim_id) {
                selection.target = None;
            }
        }

        out_events.push(Event::UnitEliminated {
            unit: victim_id,
            team: victim.team,
            tile: victim.pos,
        });

        let survivors = self
            .units
            .iter()
            .filter(|unit| unit.team == victim.team)
            .count();
        if survivors == 0 && self.phase == MatchPhase::InProgress {
            let winner = victim.team.opponent();
            self.phase = MatchPhase::Finished {
                winner,
                condition: VictoryCondition::Elimination,
            };
            out_events.push(Event::MatchEnded {
                winner,
                condition: VictoryCondition::Elimination,
            });
        }
    }

    /// Runs the overwatch interrupt after a move: every armed enemy with
    /// the mover's tile in sight snapshots in a uniformly random order,
    /// stopping at the first hit.
    fn run_overwatch(&mut self, trigger_id: UnitId, out_events: &mut Vec<Event>) {
        let Some(trigger) = self.unit_copy(trigger_id) else {
            return;
        };
        let defender_team = self.active_team.opponent();

        let mut candidates: Vec<UnitId> = self
            .units
            .iter()
            .filter(|unit| unit.team == defender_team && unit.ap <= -1)
            .filter(|unit| self.compute_visibility(unit.pos).contains(trigger.pos))
            .map(|unit| unit.id)
            .collect();
        if candidates.is_empty() {
            return;
        }

        self.random.shuffle(&mut candidates);
        out_events.push(Event::OverwatchBegan {
            trigger: trigger_id,
            shooters: candidates.len() as u32,
        });

        for shooter_id in candidates {
            let Some(shooter) = self.unit_copy(shooter_id) else {
                continue;
            };
            let Some(target) = self.unit_copy(trigger_id) else {
                break;
            };

            let shooter_snapshot = self.snapshot_unit(shooter);
            let target_snapshot = self.snapshot_unit(target);
            let outcome = combat::resolve_attack(
                &shooter_snapshot,
                &target_snapshot,
                true,
                self.random.as_mut(),
            );

            // A snapshot spends one armed charge whether or not it lands.
            if let Some(unit) = self.unit_mut(shooter_id) {
                unit.ap += 1;
            }

            out_events.push(Event::AttackResolved {
                shooter: shooter_id,
                target: trigger_id,
                snapshot: true,
                dice: outcome.dice,
                required: outcome.required,
                hit: outcome.hit,
            });

            if outcome.hit {
                self.apply_hit(trigger_id, defender_team, out_events);
                break;
            }
        }
    }
}

fn team_state(blueprint: &MapBlueprint, team: Team, grid: &TileGrid) -> TeamState {
    let config = blueprint.team_config(team);
    TeamState {
        score: 0,
        score_limit: config.score_limit,
        name: config.name.clone(),
        bases: bases_in(grid, team),
    }
}

fn bases_in(grid: &TileGrid, team: Team) -> Vec<GridPos> {
    grid.positions()
        .filter(|pos| grid.kind(*pos).is_base_for(team))
        .collect()
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::SelectUnit { unit } => select_unit(world, unit, out_events),
        Command::ClearSelection => clear_selection(world, out_events),
        Command::MoveUnit { destination } => move_unit(world, destination, out_events),
        Command::SelectTarget { unit } => select_target(world, unit, out_events),
        Command::Fire => fire(world, out_events),
        Command::EndTurn => end_turn(world, out_events),
    }
}

fn select_unit(world: &mut World, unit_id: UnitId, out_events: &mut Vec<Event>) {
    let reject = |reason| Event::SelectionRejected {
        unit: unit_id,
        reason,
    };
    if world.match_over() {
        out_events.push(reject(SelectError::MatchOver));
        return;
    }
    let Some(unit) = world.unit_copy(unit_id) else {
        out_events.push(reject(SelectError::UnknownUnit));
        return;
    };
    if unit.team != world.active_team {
        out_events.push(reject(SelectError::NotActiveTeam));
        return;
    }
    if unit.ap <= 0 {
        out_events.push(reject(SelectError::NoActionPoints));
        return;
    }

    // Selecting (or reselecting) replaces any previous selection and
    // pending target atomically, with freshly computed range and sight.
    world.selection = Some(Selection {
        unit: unit_id,
        steps: world.compute_steps(unit),
        visibility: world.compute_visibility(unit.pos),
        target: None,
    });
    out_events.push(Event::UnitSelected { unit: unit_id });
}

fn clear_selection(world: &mut World, out_events: &mut Vec<Event>) {
    if let Some(selection) = world.selection.take() {
        out_events.push(Event::SelectionCleared {
            unit: selection.unit,
        });
    }
}

fn move_unit(world: &mut World, destination: GridPos, out_events: &mut Vec<Event>) {
    let reject = |reason| Event::MoveRejected {
        destination,
        reason,
    };
    if world.match_over() {
        out_events.push(reject(MoveError::MatchOver));
        return;
    }
    let Some(selection) = &world.selection else {
        out_events.push(reject(MoveError::NoSelection));
        return;
    };
    let unit_id = selection.unit;
    let Some(unit) = world.unit_copy(unit_id) else {
        out_events.push(reject(MoveError::NoSelection));
        return;
    };
    if !unit.can_move || unit.ap <= 0 {
        out_events.push(reject(MoveError::MovementLocked));
        return;
    }
    if destination == unit.pos || !selection.steps.contains(destination) {
        out_events.push(reject(MoveError::NotReachable));
        return;
    }
    if world.grid.occupant(destination).is_some() {
        out_events.push(reject(MoveError::Occupied));
        return;
    }

    let from = unit.pos;
    world.grid.vacate(from);
    world.grid.occupy(unit_id, destination);

    let elevated = world.grid.kind(destination) == TileKind::Elevated;
    let cover = world.cover_at(destination, elevated);
    let on_usable_base = world.grid.kind(destination).is_base_for(unit.team);

    let mut began_charging = false;
    let mut remaining_ap = 0;
    if let Some(unit) = world.unit_mut(unit_id) {
        unit.pos = destination;
        unit.elevated = elevated;
        unit.cover = cover;
        if unit.laser == LaserState::Uncharged && on_usable_base {
            unit.laser = LaserState::Charging;
            began_charging = true;
        }
        unit.ap -= 1;
        if unit.ap == 0 {
            unit.can_move = false;
        }
        remaining_ap = unit.ap;
    }

    if began_charging {
        out_events.push(Event::ChargingStarted { unit: unit_id });
    }
    out_events.push(Event::UnitMoved {
        unit: unit_id,
        from,
        to: destination,
        remaining_ap,
    });

    // Movement invalidates any pending target; a fresh one must be acquired.
    if let Some(selection) = &mut world.selection {
        selection.target = None;
    }

    world.run_overwatch(unit_id, out_events);

    // The mover keeps its selection while it can still act; otherwise the
    // turn state returns to idle. Elimination already cleared everything.
    match world.unit_copy(unit_id) {
        Some(unit) if unit.ap > 0 => {
            let steps = world.compute_steps(unit);
            let visibility = world.compute_visibility(unit.pos);
            if let Some(selection) = &mut world.selection {
                selection.steps = steps;
                selection.visibility = visibility;
            }
        }
        Some(_) => {
            if world.selection.is_some() {
                world.selection = None;
                out_events.push(Event::SelectionCleared { unit: unit_id });
            }
        }
        None => {}
    }
}

fn select_target(world: &mut World, target_id: UnitId, out_events: &mut Vec<Event>) {
    let reject = |reason| Event::TargetRejected {
        target: target_id,
        reason,
    };
    if world.match_over() {
        out_events.push(reject(TargetError::MatchOver));
        return;
    }
    let Some(selection) = &world.selection else {
        out_events.push(reject(TargetError::NoSelection));
        return;
    };
    let shooter_id = selection.unit;
    let Some(shooter) = world.unit_copy(shooter_id) else {
        out_events.push(reject(TargetError::NoSelection));
        return;
    };
    let Some(target) = world.unit_copy(target_id) else {
        out_events.push(reject(TargetError::UnknownUnit));
        return;
    };
    if shooter.laser != LaserState::Charged {
        out_events.push(reject(TargetError::LaserNotCharged));
        return;
    }
    if target.team == world.active_team {
        out_events.push(reject(TargetError::NotAnEnemy));
        return;
    }
    if !selection.visibility.contains(target.pos) {
        out_events.push(reject(TargetError::NotVisible));
        return;
    }

    if let Some(selection) = &mut world.selection {
        selection.target = Some(target_id);
    }
    out_events.push(Event::TargetAcquired {
        shooter: shooter_id,
        target: target_id,
    });
}

fn fire(world: &mut World, out_events: &mut Vec<Event>) {
    let reject = |reason| Event::FireRejected { reason };
    if world.match_over() {
        out_events.push(reject(FireError::MatchOver));
        return;
    }
    let Some(selection) = &world.selection else {
        out_events.push(reject(FireError::NoSelection));
        return;
    };
    let shooter_id = selection.unit;
    let Some(target_id) = selection.target else {
        out_events.push(reject(FireError::NoTarget));
        return;
    };
    let Some(shooter) = world.unit_copy(shooter_id) else {
        out_events.push(reject(FireError::NoSelection));
        return;
    };
    let Some(target) = world.unit_copy(target_id) else {
        out_events.push(reject(FireError::NoTarget));
        return;
    };
    if shooter.ap <= 0 {
        out_events.push(reject(FireError::NoActionPoints));
        return;
    }

    let shooter_snapshot = world.snapshot_unit(shooter);
    let target_snapshot = world.snapshot_unit(target);
    let outcome = combat::resolve_attack(
        &shooter_snapshot,
        &target_snapshot,
        false,
        world.random.as_mut(),
    );

    // Spend per the class descriptor; running dry always locks movement.
    let behavior = shooter.class.stats().fire;
    let mut remaining_ap = 0;
    if let Some(unit) = world.unit_mut(shooter_id) {
        unit.ap = match behavior.ap_cost {
            FireApCost::AllRemaining => 0,
            FireApCost::One => unit.ap - 1,
        };
        if behavior.locks_movement || unit.ap == 0 {
            unit.can_move = false;
        }
        remaining_ap = unit.ap;
    }

    out_events.push(Event::AttackResolved {
        shooter: shooter_id,
        target: target_id,
        snapshot: false,
        dice: outcome.dice,
        required: outcome.required,
        hit: outcome.hit,
    });

    if outcome.hit {
        world.apply_hit(target_id, shooter.team, out_events);
    }

    // Firing resolves the engagement. Note that it deliberately does not
    // trigger an overwatch sequence; only movement does.
    if let Some(selection) = &mut world.selection {
        selection.target = None;
    }
    if remaining_ap <= 0 && world.selection.is_some() {
        world.selection = None;
        out_events.push(Event::SelectionCleared { unit: shooter_id });
    }
}

fn end_turn(world: &mut World, out_events: &mut Vec<Event>) {
    if world.match_over() {
        out_events.push(Event::EndTurnRejected {
            reason: TurnError::MatchOver,
        });
        return;
    }
    if world.selection.is_some() {
        out_events.push(Event::EndTurnRejected {
            reason: TurnError::SelectionActive,
        });
        return;
    }

    let outgoing = world.active_team;
    let incoming = outgoing.opponent();

    // Leftover action points convert into overwatch charges, up to the
    // class ceiling. Disabled lasers and spent movement arm nothing.
    for unit in world.units.iter_mut().filter(|unit| unit.team == outgoing) {
        let mut ap = unit.ap.clamp(0, unit.class.stats().max_overwatch);
        if unit.laser == LaserState::Uncharged || !unit.can_move {
            ap = 0;
        }
        unit.ap = -ap;
    }
    out_events.push(Event::TurnEnded { team: outgoing });

    world.active_team = incoming;
    world.turn_number += 1;

    for unit in world.units.iter_mut().filter(|unit| unit.team == incoming) {
        if unit.laser == LaserState::Charging {
            unit.laser = LaserState::Charged;
            out_events.push(Event::LaserCharged { unit: unit.id });
        }
        unit.ap = unit.class.stats().max_ap;
        unit.can_move = true;
    }
    out_events.push(Event::TurnBegan {
        team: incoming,
        turn: world.turn_number,
    });
}

/// Serializable record of one unit inside a [`MatchSnapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Unique identifier assigned to the unit.
    pub id: UnitId,
    /// Team the unit fights for.
    pub team: Team,
    /// Combat class of the unit.
    pub class: UnitClass,
    /// Tile the unit occupies.
    pub pos: GridPos,
    /// Action points; negative values are armed overwatch charges.
    pub ap: i8,
    /// Whether the unit may still move this turn.
    pub can_move: bool,
    /// Charge state of the unit's laser.
    pub laser: LaserState,
    /// Whether the unit stands on elevated ground.
    pub elevated: bool,
    /// Directional cover derived from adjacent terrain.
    pub cover: CoverFlags,
}

/// Serializable record of one team inside a [`MatchSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    /// Points scored so far.
    pub score: u32,
    /// Score at which the team wins.
    pub score_limit: u32,
    /// Display name, when the map provided one.
    pub name: Option<String>,
}

/// Complete serializable mid-match state, including the randomness cursor.
///
/// Everything needed to restore the match bit-for-bit with
/// [`World::from_snapshot`]; derived caches are recomputed on restore.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Number of grid rows.
    pub rows: u32,
    /// Number of grid columns.
    pub cols: u32,
    /// Dense row-major tile kinds.
    pub kinds: Vec<TileKind>,
    /// Every unit still in the match.
    pub units: Vec<UnitRecord>,
    /// Red team ledger.
    pub red: TeamRecord,
    /// Blue team ledger.
    pub blue: TeamRecord,
    /// Team currently acting.
    pub active_team: Team,
    /// One-based turn counter.
    pub turn_number: u32,
    /// Progress state of the match.
    pub phase: MatchPhase,
    /// Currently selected unit, if any.
    pub selected: Option<UnitId>,
    /// Currently targeted unit, if any.
    pub targeted: Option<UnitId>,
    /// Cursor of the seeded randomness source, when it exposes one.
    pub rng: Option<RngCursor>,
}

/// Query functions that provide read-only access to the match state.
pub mod query {
    use super::{MatchPhase, MatchSnapshot, TeamRecord, UnitRecord, World};
    use laser_tactics_core::{
        GridPos, ReachableSteps, Team, TileKind, ToHitBreakdown, UnitId, UnitView, Visibility,
    };
    use laser_tactics_system_combat as combat;

    /// Grid dimensions as `(rows, cols)`.
    #[must_use]
    pub fn dimensions(world: &World) -> (u32, u32) {
        (world.grid.rows, world.grid.cols)
    }

    /// Terrain kind at a position; the edge sentinel beyond the boundary.
    #[must_use]
    pub fn tile_kind(world: &World, pos: GridPos) -> TileKind {
        world.grid.kind(pos)
    }

    /// Unit occupying a tile, if any.
    #[must_use]
    pub fn occupant(world: &World, pos: GridPos) -> Option<UnitId> {
        world.grid.occupant(pos)
    }

    /// Team currently allowed to act.
    #[must_use]
    pub fn active_team(world: &World) -> Team {
        world.active_team
    }

    /// One-based turn counter.
    #[must_use]
    pub fn turn_number(world: &World) -> u32 {
        world.turn_number
    }

    /// Progress state of the match.
    #[must_use]
    pub fn phase(world: &World) -> MatchPhase {
        world.phase
    }

    /// Points scored by the named team.
    #[must_use]
    pub fn score(world: &World, team: Team) -> u32 {
        world.team_state(team).score
    }

    /// Score at which the named team wins.
    #[must_use]
    pub fn score_limit(world: &World, team: Team) -> u32 {
        world.team_state(team).score_limit
    }

    /// Display name of the named team, when the map provided one.
    #[must_use]
    pub fn team_name(world: &World, team: Team) -> Option<&str> {
        world.team_state(team).name.as_deref()
    }

    /// Base tiles the named team may recharge at, in row-major order.
    #[must_use]
    pub fn bases(world: &World, team: Team) -> &[GridPos] {
        &world.team_state(team).bases
    }

    /// Captures a read-only view of every unit still in the match.
    #[must_use]
    pub fn unit_view(world: &World) -> UnitView {
        UnitView::from_snapshots(
            world
                .units
                .iter()
                .map(|unit| world.snapshot_unit(*unit))
                .collect(),
        )
    }

    /// Currently selected unit, if any.
    #[must_use]
    pub fn selected_unit(world: &World) -> Option<UnitId> {
        world.selection.as_ref().map(|selection| selection.unit)
    }

    /// Currently targeted unit, if any.
    #[must_use]
    pub fn targeted_unit(world: &World) -> Option<UnitId> {
        world
            .selection
            .as_ref()
            .and_then(|selection| selection.target)
    }

    /// Freshly computed layered movement range of the named unit.
    #[must_use]
    pub fn reachable_steps(world: &World, unit: UnitId) -> Option<ReachableSteps> {
        world.unit_copy(unit).map(|unit| world.compute_steps(unit))
    }

    /// Freshly computed visibility mapping of the named unit.
    #[must_use]
    pub fn visible_tiles(world: &World, unit: UnitId) -> Option<Visibility> {
        world
            .unit_copy(unit)
            .map(|unit| world.compute_visibility(unit.pos))
    }

    /// To-hit decomposition for a prospective attack between two units.
    #[must_use]
    pub fn to_hit_preview(
        world: &World,
        shooter: UnitId,
        target: UnitId,
        snapshot: bool,
    ) -> Option<ToHitBreakdown> {
        let shooter = world.unit_copy(shooter)?;
        let target = world.unit_copy(target)?;
        Some(combat::to_hit_breakdown(
            &world.snapshot_unit(shooter),
            &world.snapshot_unit(target),
            snapshot,
        ))
    }

    /// Captures the complete serializable state of the match.
    #[must_use]
    pub fn snapshot(world: &World) -> MatchSnapshot {
        MatchSnapshot {
            rows: world.grid.rows,
            cols: world.grid.cols,
            kinds: world.grid.kinds.clone(),
            units: world
                .units
                .iter()
                .map(|unit| UnitRecord {
                    id: unit.id,
                    team: unit.team,
                    class: unit.class,
                    pos: unit.pos,
                    ap: unit.ap,
                    can_move: unit.can_move,
                    laser: unit.laser,
                    elevated: unit.elevated,
                    cover: unit.cover,
                })
                .collect(),
            red: TeamRecord {
                score: world.red.score,
                score_limit: world.red.score_limit,
                name: world.red.name.clone(),
            },
            blue: TeamRecord {
                score: world.blue.score,
                score_limit: world.blue.score_limit,
                name: world.blue.name.clone(),
            },
            active_team: world.active_team,
            turn_number: world.turn_number,
            phase: world.phase,
            selected: world.selection.as_ref().map(|selection| selection.unit),
            targeted: world
                .selection
                .as_ref()
                .and_then(|selection| selection.target),
            rng: world.random.cursor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{apply, query, MapIntegrityError, MatchPhase, World};
    use laser_tactics_core::{
        BaseOwner, Command, Event, GridPos, LaserState, MapBlueprint, SelectError, SpawnPoint,
        Team, TileKind, TurnError, UnitClass, UnitId,
    };

    fn open_map(rows: u32, cols: u32, spawns: Vec<SpawnPoint>) -> MapBlueprint {
        let tiles = (0..rows)
            .map(|_| vec![TileKind::Level; cols as usize])
            .collect();
        MapBlueprint::new(tiles, spawns)
    }

    fn spawn(team: Team, class: UnitClass, row: u32, col: u32) -> SpawnPoint {
        SpawnPoint {
            team,
            class,
            row,
            col,
        }
    }

    #[test]
    fn ragged_rows_are_fatal() {
        let blueprint = MapBlueprint::new(
            vec![vec![TileKind::Level, TileKind::Level], vec![TileKind::Level]],
            Vec::new(),
        );
        assert_eq!(
            World::new(&blueprint, 1).err(),
            Some(MapIntegrityError::RaggedRows {
                row: 1,
                found: 1,
                expected: 2,
            })
        );
    }

    #[test]
    fn the_edge_kind_is_reserved() {
        let blueprint = MapBlueprint::new(vec![vec![TileKind::Level, TileKind::Edge]], Vec::new());
        assert_eq!(
            World::new(&blueprint, 1).err(),
            Some(MapIntegrityError::ReservedTileKind { row: 0, col: 1 })
        );
    }

    #[test]
    fn spawns_are_validated_against_the_grid() {
        let out_of_bounds = open_map(2, 2, vec![spawn(Team::Red, UnitClass::Basic, 5, 0)]);
        assert_eq!(
            World::new(&out_of_bounds, 1).err(),
            Some(MapIntegrityError::SpawnOutOfBounds { index: 0 })
        );

        let mut on_wall = open_map(2, 2, vec![spawn(Team::Red, UnitClass::Basic, 0, 0)]);
        on_wall.tiles[0][0] = TileKind::Wall;
        assert_eq!(
            World::new(&on_wall, 1).err(),
            Some(MapIntegrityError::SpawnOnBlockingTile { index: 0 })
        );

        let collision = open_map(
            2,
            2,
            vec![
                spawn(Team::Red, UnitClass::Basic, 0, 0),
                spawn(Team::Blue, UnitClass::Basic, 0, 0),
            ],
        );
        assert_eq!(
            World::new(&collision, 1).err(),
            Some(MapIntegrityError::SpawnCollision { index: 1 })
        );
    }

    #[test]
    fn the_second_team_starts_overwatch_armed() {
        let blueprint = open_map(
            3,
            3,
            vec![
                spawn(Team::Red, UnitClass::Basic, 0, 0),
                spawn(Team::Blue, UnitClass::Grunt, 2, 2),
            ],
        );
        let world = World::new(&blueprint, 1).expect("world");
        let view = query::unit_view(&world);

        assert_eq!(view.get(UnitId::new(0)).expect("red unit").ap, 3);
        // Grunts arm one extra snapshot.
        assert_eq!(view.get(UnitId::new(1)).expect("blue unit").ap, -3);
    }

    #[test]
    fn selection_is_rejected_for_the_inactive_team() {
        let blueprint = open_map(
            3,
            3,
            vec![
                spawn(Team::Red, UnitClass::Basic, 0, 0),
                spawn(Team::Blue, UnitClass::Basic, 2, 2),
            ],
        );
        let mut world = World::new(&blueprint, 1).expect("world");
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::SelectUnit {
                unit: UnitId::new(1),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::SelectionRejected {
                unit: UnitId::new(1),
                reason: SelectError::NotActiveTeam,
            }]
        );
        assert_eq!(query::selected_unit(&world), None);
    }

    #[test]
    fn end_turn_is_only_reachable_from_idle() {
        let blueprint = open_map(
            3,
            3,
            vec![
                spawn(Team::Red, UnitClass::Basic, 0, 0),
                spawn(Team::Blue, UnitClass::Basic, 2, 2),
            ],
        );
        let mut world = World::new(&blueprint, 1).expect("world");
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::SelectUnit {
                unit: UnitId::new(0),
            },
            &mut events,
        );
        events.clear();
        apply(&mut world, Command::EndTurn, &mut events);
        assert_eq!(
            events,
            vec![Event::EndTurnRejected {
                reason: TurnError::SelectionActive,
            }]
        );

        events.clear();
        apply(&mut world, Command::ClearSelection, &mut events);
        apply(&mut world, Command::EndTurn, &mut events);
        assert!(events.contains(&Event::TurnBegan {
            team: Team::Blue,
            turn: 2,
        }));
    }

    #[test]
    fn end_turn_clamps_negates_and_refills_action_points() {
        let blueprint = open_map(
            4,
            4,
            vec![
                spawn(Team::Red, UnitClass::Basic, 0, 0),
                spawn(Team::Blue, UnitClass::Basic, 3, 3),
            ],
        );
        let mut world = World::new(&blueprint, 1).expect("world");
        let mut events = Vec::new();

        // Red spends nothing: 3 AP clamps to the overwatch ceiling of 2.
        apply(&mut world, Command::EndTurn, &mut events);
        let view = query::unit_view(&world);
        assert_eq!(view.get(UnitId::new(0)).expect("red").ap, -2);
        // Blue refills to full action points.
        assert_eq!(view.get(UnitId::new(1)).expect("blue").ap, 3);
        assert_eq!(query::active_team(&world), Team::Blue);
        assert_eq!(query::turn_number(&world), 2);
    }

    #[test]
    fn charging_resolves_at_the_start_of_the_units_next_turn() {
        let mut blueprint = open_map(
            3,
            3,
            vec![
                spawn(Team::Red, UnitClass::Basic, 0, 0),
                spawn(Team::Blue, UnitClass::Basic, 2, 2),
            ],
        );
        blueprint.tiles[0][1] = TileKind::Base(BaseOwner::Team(Team::Red));
        let world = World::new(&blueprint, 1).expect("world");

        // Disable the red unit's laser by hand through a snapshot cycle.
        let mut snapshot = query::snapshot(&world);
        snapshot.units[0].laser = LaserState::Uncharged;
        let mut world = World::from_snapshot(&snapshot).expect("restore");
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::SelectUnit {
                unit: UnitId::new(0),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::MoveUnit {
                destination: GridPos::new(0, 1),
            },
            &mut events,
        );
        assert!(events.contains(&Event::ChargingStarted {
            unit: UnitId::new(0),
        }));
        let view = query::unit_view(&world);
        assert_eq!(
            view.get(UnitId::new(0)).expect("red").laser,
            LaserState::Charging
        );

        // End red's turn, then blue's; red's laser resolves on its turn.
        events.clear();
        apply(&mut world, Command::ClearSelection, &mut events);
        apply(&mut world, Command::EndTurn, &mut events);
        apply(&mut world, Command::EndTurn, &mut events);
        assert!(events.contains(&Event::LaserCharged {
            unit: UnitId::new(0),
        }));
        let view = query::unit_view(&world);
        assert_eq!(
            view.get(UnitId::new(0)).expect("red").laser,
            LaserState::Charged
        );
    }

    #[test]
    fn moving_updates_elevation_and_cover() {
        let mut blueprint = open_map(
            3,
            3,
            vec![
                spawn(Team::Red, UnitClass::Scout, 1, 0),
                spawn(Team::Blue, UnitClass::Basic, 2, 2),
            ],
        );
        blueprint.tiles[0][1] = TileKind::Wall;
        blueprint.tiles[1][1] = TileKind::Elevated;
        // A red base keeps an unlucky overwatch hit from eliminating the
        // scout mid-test.
        blueprint.tiles[2][0] = TileKind::Base(BaseOwner::Team(Team::Red));
        let mut world = World::new(&blueprint, 1).expect("world");
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::SelectUnit {
                unit: UnitId::new(0),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::MoveUnit {
                destination: GridPos::new(1, 1),
            },
            &mut events,
        );

        let view = query::unit_view(&world);
        let scout = view.get(UnitId::new(0)).expect("scout");
        assert_eq!(scout.pos, GridPos::new(1, 1));
        assert!(scout.elevated);
        // Standing on high ground, only the wall to the north still covers.
        assert!(scout.cover.covered_toward(laser_tactics_core::Direction::North));
        assert!(!scout.cover.covered_toward(laser_tactics_core::Direction::South));
    }

    #[test]
    fn snapshots_restore_through_bincode_bit_for_bit() {
        let blueprint = open_map(
            4,
            4,
            vec![
                spawn(Team::Red, UnitClass::Sniper, 0, 0),
                spawn(Team::Blue, UnitClass::Scout, 3, 3),
            ],
        );
        let mut world = World::new(&blueprint, 99).expect("world");
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::SelectUnit {
                unit: UnitId::new(0),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::MoveUnit {
                destination: GridPos::new(1, 1),
            },
            &mut events,
        );

        let snapshot = query::snapshot(&world);
        let bytes = bincode::serialize(&snapshot).expect("serialize");
        let restored: super::MatchSnapshot = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(restored, snapshot);

        let world = World::from_snapshot(&restored).expect("restore");
        assert_eq!(query::snapshot(&world), snapshot);
    }

    #[test]
    fn restoring_without_a_cursor_is_refused() {
        let blueprint = open_map(2, 2, vec![spawn(Team::Red, UnitClass::Basic, 0, 0)]);
        let world = World::new(&blueprint, 1).expect("world");
        let mut snapshot = query::snapshot(&world);
        snapshot.rng = None;
        assert_eq!(
            World::from_snapshot(&snapshot).err(),
            Some(MapIntegrityError::MissingRandomCursor)
        );
    }

    #[test]
    fn finished_matches_reject_every_command() {
        let blueprint = open_map(
            3,
            3,
            vec![
                spawn(Team::Red, UnitClass::Basic, 0, 0),
                spawn(Team::Blue, UnitClass::Basic, 2, 2),
            ],
        );
        let world = World::new(&blueprint, 1).expect("world");
        let mut snapshot = query::snapshot(&world);
        snapshot.phase = MatchPhase::Finished {
            winner: Team::Red,
            condition: laser_tactics_core::VictoryCondition::Score,
        };
        let mut world = World::from_snapshot(&snapshot).expect("restore");

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::SelectUnit {
                unit: UnitId::new(0),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::SelectionRejected {
                unit: UnitId::new(0),
                reason: SelectError::MatchOver,
            }]
        );
    }
}
