#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Laser Tactics engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the world executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values describing the
//! accepted state delta or a typed rejection. Systems consume read-only
//! views and answer with plain data; they never mutate state themselves.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two sides contesting a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    /// The team that acts first.
    Red,
    /// The team that starts the match overwatch-armed.
    Blue,
}

impl Team {
    /// Returns the opposing team.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }
}

/// Unique identifier assigned to a unit for the lifetime of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(u32);

impl UnitId {
    /// Creates a new unit identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Combat classes a unit may belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitClass {
    /// Baseline trooper with no specialty.
    Basic,
    /// Accurate but slow; may keep firing in place.
    Sniper,
    /// Fast climber that stays mobile after firing.
    Scout,
    /// Terrain specialist with amplified cover and elevation modifiers.
    Grunt,
}

impl UnitClass {
    /// Returns the fixed rule parameters for the class.
    #[must_use]
    pub const fn stats(self) -> ClassStats {
        match self {
            Self::Basic => ClassStats {
                max_ap: 3,
                move_speed: 4,
                to_hit: 6,
                elevated_hit_bonus: -1,
                cover_defense_bonus: 1,
                elev_defense_malus: -1,
                overwatch_penalty: 1,
                max_overwatch: 2,
                can_climb: false,
                fire: FireBehavior {
                    ap_cost: FireApCost::AllRemaining,
                    locks_movement: true,
                    extra_shot_allowed: false,
                },
            },
            Self::Sniper => ClassStats {
                max_ap: 3,
                move_speed: 3,
                to_hit: 5,
                elevated_hit_bonus: -1,
                cover_defense_bonus: 1,
                elev_defense_malus: -1,
                overwatch_penalty: 1,
                max_overwatch: 2,
                can_climb: false,
                fire: FireBehavior {
                    ap_cost: FireApCost::One,
                    locks_movement: true,
                    extra_shot_allowed: true,
                },
            },
            Self::Scout => ClassStats {
                max_ap: 3,
                move_speed: 5,
                to_hit: 7,
                elevated_hit_bonus: -1,
                cover_defense_bonus: 1,
                elev_defense_malus: -1,
                overwatch_penalty: 1,
                max_overwatch: 2,
                can_climb: true,
                fire: FireBehavior {
                    ap_cost: FireApCost::One,
                    locks_movement: false,
                    extra_shot_allowed: true,
                },
            },
            Self::Grunt => ClassStats {
                max_ap: 3,
                move_speed: 4,
                to_hit: 6,
                elevated_hit_bonus: -2,
                cover_defense_bonus: 2,
                elev_defense_malus: 0,
                overwatch_penalty: 2,
                max_overwatch: 3,
                can_climb: false,
                fire: FireBehavior {
                    ap_cost: FireApCost::AllRemaining,
                    locks_movement: true,
                    extra_shot_allowed: false,
                },
            },
        }
    }
}

/// Fixed rule parameters shared by every unit of a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassStats {
    /// Action points granted at the start of each turn.
    pub max_ap: i8,
    /// Tiles of movement bought by one action point.
    pub move_speed: u8,
    /// Base roll the attacker must meet or exceed; lower shoots better.
    pub to_hit: i16,
    /// Roll adjustment while the shooter stands on elevated ground.
    pub elevated_hit_bonus: i16,
    /// Roll adjustment granted to a target covered toward its attacker.
    pub cover_defense_bonus: i16,
    /// Roll adjustment suffered by a target on elevated ground.
    pub elev_defense_malus: i16,
    /// Roll adjustment applied to overwatch snapshots.
    pub overwatch_penalty: i16,
    /// Most action points convertible into overwatch charges.
    pub max_overwatch: i8,
    /// Whether the unit climbs elevated tiles without ending its step.
    pub can_climb: bool,
    /// Data-driven firing behavior consumed by the combat resolver.
    pub fire: FireBehavior,
}

/// Describes what firing costs a class and what it forbids afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FireBehavior {
    /// Action points consumed by one trigger pull.
    pub ap_cost: FireApCost,
    /// Whether firing locks the unit's movement for the rest of the turn.
    pub locks_movement: bool,
    /// Whether the class may fire again while action points remain.
    pub extra_shot_allowed: bool,
}

/// Action-point price of a single shot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireApCost {
    /// Firing consumes every remaining action point.
    AllRemaining,
    /// Firing consumes exactly one action point.
    One,
}

/// Charge state of a unit's laser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaserState {
    /// Ready to fire.
    Charged,
    /// Recharging on a base; resolves at the start of the unit's next turn.
    Charging,
    /// Disabled until the unit reaches a usable base.
    Uncharged,
}

/// The eight adjacency directions of a square tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Toward decreasing row indices.
    North,
    /// Toward increasing row indices.
    South,
    /// Toward increasing column indices.
    East,
    /// Toward decreasing column indices.
    West,
    /// Diagonal toward decreasing rows and columns.
    NorthWest,
    /// Diagonal toward decreasing rows and increasing columns.
    NorthEast,
    /// Diagonal toward increasing rows and decreasing columns.
    SouthWest,
    /// Diagonal toward increasing rows and columns.
    SouthEast,
}

impl Direction {
    /// The four cardinal directions in canonical scan order.
    pub const CARDINALS: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// All eight directions, cardinals before diagonals, in canonical order.
    pub const ALL: [Self; 8] = [
        Self::North,
        Self::South,
        Self::East,
        Self::West,
        Self::NorthWest,
        Self::NorthEast,
        Self::SouthWest,
        Self::SouthEast,
    ];

    /// Reports whether the direction is one of the four cardinals.
    #[must_use]
    pub const fn is_cardinal(self) -> bool {
        matches!(self, Self::North | Self::South | Self::East | Self::West)
    }

    /// Splits a diagonal into its two cardinal components.
    ///
    /// Returns `None` for cardinal directions.
    #[must_use]
    pub const fn components(self) -> Option<(Self, Self)> {
        match self {
            Self::NorthWest => Some((Self::North, Self::West)),
            Self::NorthEast => Some((Self::North, Self::East)),
            Self::SouthWest => Some((Self::South, Self::West)),
            Self::SouthEast => Some((Self::South, Self::East)),
            _ => None,
        }
    }

    /// Row and column delta of a single step in this direction.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::North => (-1, 0),
            Self::South => (1, 0),
            Self::East => (0, 1),
            Self::West => (0, -1),
            Self::NorthWest => (-1, -1),
            Self::NorthEast => (-1, 1),
            Self::SouthWest => (1, -1),
            Self::SouthEast => (1, 1),
        }
    }
}

/// Location of a tile expressed as row and column indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    row: u32,
    col: u32,
}

impl GridPos {
    /// Creates a new grid position.
    #[must_use]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Zero-based row index of the tile.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Zero-based column index of the tile.
    #[must_use]
    pub const fn col(&self) -> u32 {
        self.col
    }

    /// Position one step away, or `None` when the step leaves the index space.
    #[must_use]
    pub fn step(self, direction: Direction) -> Option<Self> {
        let (row_delta, col_delta) = direction.offset();
        Some(Self {
            row: self.row.checked_add_signed(row_delta)?,
            col: self.col.checked_add_signed(col_delta)?,
        })
    }

    /// Center of the tile on the unit-length geometry plane.
    #[must_use]
    pub fn center(self) -> TilePoint {
        TilePoint::new(f64::from(self.col) + 0.5, f64::from(self.row) + 0.5)
    }

    /// North-west corner of the tile.
    #[must_use]
    pub fn north_west(self) -> TilePoint {
        TilePoint::new(f64::from(self.col), f64::from(self.row))
    }

    /// North-east corner of the tile.
    #[must_use]
    pub fn north_east(self) -> TilePoint {
        TilePoint::new(f64::from(self.col) + 1.0, f64::from(self.row))
    }

    /// South-west corner of the tile.
    #[must_use]
    pub fn south_west(self) -> TilePoint {
        TilePoint::new(f64::from(self.col), f64::from(self.row) + 1.0)
    }

    /// South-east corner of the tile.
    #[must_use]
    pub fn south_east(self) -> TilePoint {
        TilePoint::new(f64::from(self.col) + 1.0, f64::from(self.row) + 1.0)
    }

    /// The five sight-line sample points, center first.
    #[must_use]
    pub fn sample_points(self) -> [TilePoint; 5] {
        [
            self.center(),
            self.north_west(),
            self.north_east(),
            self.south_west(),
            self.south_east(),
        ]
    }
}

/// Point on the continuous geometry plane overlaying the tile grid.
///
/// Tiles have unit side length: column `c` spans `c..c+1` on the x axis and
/// row `r` spans `r..r+1` on the y axis, with y growing southward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TilePoint {
    x: f64,
    y: f64,
}

impl TilePoint {
    /// Creates a new point from plane coordinates.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Horizontal coordinate, growing eastward.
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.x
    }

    /// Vertical coordinate, growing southward.
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.y
    }
}

/// Owner of a recharge base tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseOwner {
    /// Either team may recharge here.
    Universal,
    /// Only the named team may recharge here.
    Team(Team),
}

/// Terrain classification of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    /// Shared boundary sentinel answered for queries beyond the grid.
    Edge,
    /// Blocks movement and sight lines.
    Wall,
    /// Open floor with no restrictions.
    Level,
    /// Climbable high ground that alters attack and defense rolls.
    Elevated,
    /// Recharge station for disabled lasers.
    Base(BaseOwner),
}

impl TileKind {
    /// Reports whether the tile is the boundary sentinel.
    #[must_use]
    pub const fn is_edge(self) -> bool {
        matches!(self, Self::Edge)
    }

    /// Reports whether the tile blocks movement and sight.
    #[must_use]
    pub const fn is_wall(self) -> bool {
        matches!(self, Self::Wall)
    }

    /// Reports whether a unit may ever stand on the tile.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        !matches!(self, Self::Edge | Self::Wall)
    }

    /// Reports whether the named team may recharge on the tile.
    #[must_use]
    pub fn is_base_for(self, team: Team) -> bool {
        match self {
            Self::Base(BaseOwner::Universal) => true,
            Self::Base(BaseOwner::Team(owner)) => owner == team,
            _ => false,
        }
    }
}

/// Per-cardinal cover state of a unit, derived from adjacent terrain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverFlags {
    north: bool,
    south: bool,
    east: bool,
    west: bool,
}

impl CoverFlags {
    /// Creates cover flags with every direction exposed.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            north: false,
            south: false,
            east: false,
            west: false,
        }
    }

    /// Reports whether the unit is covered toward the given cardinal.
    ///
    /// Diagonals always answer `false`; callers decompose them first.
    #[must_use]
    pub const fn covered_toward(&self, direction: Direction) -> bool {
        match direction {
            Direction::North => self.north,
            Direction::South => self.south,
            Direction::East => self.east,
            Direction::West => self.west,
            _ => false,
        }
    }

    /// Sets the cover flag for a cardinal direction; diagonals are ignored.
    pub fn set(&mut self, direction: Direction, covered: bool) {
        match direction {
            Direction::North => self.north = covered,
            Direction::South => self.south = covered,
            Direction::East => self.east = covered,
            Direction::West => self.west = covered,
            _ => {}
        }
    }

    /// Reports whether any direction offers cover.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.north || self.south || self.east || self.west
    }
}

/// A sampled segment proven clear between two tiles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SightLine {
    from: TilePoint,
    to: TilePoint,
}

impl SightLine {
    /// Creates a sight line between two sample points.
    #[must_use]
    pub const fn new(from: TilePoint, to: TilePoint) -> Self {
        Self { from, to }
    }

    /// Sample point on the observing tile.
    #[must_use]
    pub const fn from(&self) -> TilePoint {
        self.from
    }

    /// Sample point on the observed tile.
    #[must_use]
    pub const fn to(&self) -> TilePoint {
        self.to
    }
}

/// Layered movement range: one tile set per action point of movement.
///
/// Step 0 holds only the unit's own tile. Later steps hold the tiles that
/// entered the frontier at that distance. Expansion only checks the two
/// newest frontiers, so a tile may legally reappear in a later step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReachableSteps {
    steps: Vec<Vec<GridPos>>,
}

impl ReachableSteps {
    /// Wraps the per-step tile lists produced by the reachability system.
    #[must_use]
    pub fn from_steps(steps: Vec<Vec<GridPos>>) -> Self {
        Self { steps }
    }

    /// The per-step tile lists, step 0 first.
    #[must_use]
    pub fn steps(&self) -> &[Vec<GridPos>] {
        &self.steps
    }

    /// Flat membership test over every step, the unit's own tile included.
    #[must_use]
    pub fn contains(&self, pos: GridPos) -> bool {
        self.steps.iter().any(|step| step.contains(&pos))
    }
}

/// Mapping from visible tile to the canonical sight line proving it.
///
/// The observer's own tile is always present and carries no segment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Visibility {
    lines: BTreeMap<GridPos, Option<SightLine>>,
}

impl Visibility {
    /// Wraps the tile-to-segment mapping produced by the visibility system.
    #[must_use]
    pub fn from_lines(lines: BTreeMap<GridPos, Option<SightLine>>) -> Self {
        Self { lines }
    }

    /// Reports whether the tile is visible to the observer.
    #[must_use]
    pub fn contains(&self, pos: GridPos) -> bool {
        self.lines.contains_key(&pos)
    }

    /// Canonical sight line stored for a visible tile, if one exists.
    #[must_use]
    pub fn sight_line(&self, pos: GridPos) -> Option<&SightLine> {
        self.lines.get(&pos).and_then(|line| line.as_ref())
    }

    /// Iterator over visible tiles in deterministic row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (GridPos, Option<&SightLine>)> {
        self.lines.iter().map(|(pos, line)| (*pos, line.as_ref()))
    }

    /// Number of visible tiles, the observer's own included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Reports whether the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The pair of d6 values produced for one attack resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiceRoll {
    /// Face shown by the first die.
    pub first: u8,
    /// Face shown by the second die.
    pub second: u8,
}

impl DiceRoll {
    /// Sum of both faces.
    #[must_use]
    pub const fn total(&self) -> u8 {
        self.first + self.second
    }
}

/// Additive decomposition of one attack's required roll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToHitBreakdown {
    /// Shooter's base to-hit number.
    pub base: i16,
    /// Contribution from the shooter standing on elevated ground.
    pub elevation_bonus: i16,
    /// Contribution from the target's directional cover.
    pub cover_bonus: i16,
    /// Contribution from the target standing on elevated ground.
    pub elevation_malus: i16,
    /// Contribution from resolving as an overwatch snapshot.
    pub snapshot_penalty: i16,
}

impl ToHitBreakdown {
    /// Total the two-dice roll must meet or exceed to score a hit.
    #[must_use]
    pub const fn total(&self) -> i16 {
        self.base
            + self.elevation_bonus
            + self.cover_bonus
            + self.elevation_malus
            + self.snapshot_penalty
    }
}

/// Result of resolving one attack against the dice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttackOutcome {
    /// The dice pair that was rolled.
    pub dice: DiceRoll,
    /// Total the roll had to meet or exceed.
    pub required: i16,
    /// Whether the attack connected.
    pub hit: bool,
}

/// Source of every random decision taken by the engine.
///
/// Routing dice and shuffle order through one injected implementation keeps
/// whole matches replayable from a fixed seed.
pub trait RandomSource: fmt::Debug {
    /// Rolls one uniform die face in `1..=6`.
    fn roll_d6(&mut self) -> u8;

    /// Places the slice into a uniformly random order.
    fn shuffle(&mut self, units: &mut [UnitId]);

    /// Seed and stream position for persistence, when the source has one.
    fn cursor(&self) -> Option<RngCursor> {
        None
    }
}

/// Replayable position within a seeded random stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngCursor {
    /// Seed the stream was created from.
    pub seed: u64,
    /// Number of 32-bit words already consumed from the stream.
    pub word_pos: u128,
}

/// Immutable representation of a single unit's state used for queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitSnapshot {
    /// Unique identifier assigned to the unit.
    pub id: UnitId,
    /// Team the unit fights for.
    pub team: Team,
    /// Combat class fixing the unit's rule parameters.
    pub class: UnitClass,
    /// Tile the unit currently occupies.
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
    /// Whether the unit is the current selection.
    pub selected: bool,
    /// Whether the unit is the current target.
    pub targeted: bool,
    /// Whether the current selection has the unit's tile in sight.
    pub visible_to_selected: bool,
}

impl UnitSnapshot {
    /// Fixed rule parameters of the unit's class.
    #[must_use]
    pub const fn stats(&self) -> ClassStats {
        self.class.stats()
    }
}

/// Read-only snapshot describing every unit still in the match.
#[derive(Clone, Debug, Default)]
pub struct UnitView {
    snapshots: Vec<UnitSnapshot>,
}

impl UnitView {
    /// Creates a new unit view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<UnitSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitSnapshot> {
        self.snapshots.iter()
    }

    /// Looks up a unit by identifier.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&UnitSnapshot> {
        self.snapshots
            .binary_search_by_key(&id, |snapshot| snapshot.id)
            .ok()
            .map(|index| &self.snapshots[index])
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<UnitSnapshot> {
        self.snapshots
    }
}

/// Read-only view of the tile grid handed to the pure systems.
#[derive(Clone, Copy, Debug)]
pub struct GridView<'a> {
    kinds: &'a [TileKind],
    occupants: &'a [Option<UnitId>],
    rows: u32,
    cols: u32,
}

impl<'a> GridView<'a> {
    /// Captures a view over dense row-major kind and occupancy slices.
    #[must_use]
    pub fn new(
        kinds: &'a [TileKind],
        occupants: &'a [Option<UnitId>],
        rows: u32,
        cols: u32,
    ) -> Self {
        Self {
            kinds,
            occupants,
            rows,
            cols,
        }
    }

    /// Grid dimensions as `(rows, cols)`.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }

    /// Terrain kind at the position; the edge sentinel beyond the boundary.
    #[must_use]
    pub fn kind(&self, pos: GridPos) -> TileKind {
        self.index(pos)
            .and_then(|index| self.kinds.get(index).copied())
            .unwrap_or(TileKind::Edge)
    }

    /// Terrain kind one step away; the edge sentinel when the step leaves
    /// the grid.
    #[must_use]
    pub fn kind_toward(&self, pos: GridPos, direction: Direction) -> TileKind {
        match self.neighbor(pos, direction) {
            Some(next) => self.kind(next),
            None => TileKind::Edge,
        }
    }

    /// In-bounds neighboring position one step away, if any.
    #[must_use]
    pub fn neighbor(&self, pos: GridPos, direction: Direction) -> Option<GridPos> {
        pos.step(direction)
            .filter(|next| next.row() < self.rows && next.col() < self.cols)
    }

    /// Unit occupying the position, if any.
    #[must_use]
    pub fn occupant(&self, pos: GridPos) -> Option<UnitId> {
        self.index(pos)
            .and_then(|index| self.occupants.get(index).copied().flatten())
    }

    /// Reports whether a unit stands on the position.
    #[must_use]
    pub fn is_occupied(&self, pos: GridPos) -> bool {
        self.occupant(pos).is_some()
    }

    /// Iterator over every wall tile in row-major order.
    pub fn wall_positions(&self) -> impl Iterator<Item = GridPos> + 'a {
        let cols = self.cols;
        self.kinds
            .iter()
            .enumerate()
            .filter(|(_, kind)| kind.is_wall())
            .map(move |(index, _)| GridPos::new(index as u32 / cols, index as u32 % cols))
    }

    /// Iterator over every non-wall tile position in row-major order.
    pub fn open_positions(&self) -> impl Iterator<Item = GridPos> + 'a {
        let cols = self.cols;
        self.kinds
            .iter()
            .enumerate()
            .filter(|(_, kind)| !kind.is_wall())
            .map(move |(index, _)| GridPos::new(index as u32 / cols, index as u32 % cols))
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
}

/// Structured map description handed to the world by an external loader.
///
/// The engine performs no file I/O; adapters parse whatever format they
/// like and deliver this plain value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapBlueprint {
    /// Rectangular rows of tile kinds, row 0 first.
    pub tiles: Vec<Vec<TileKind>>,
    /// Units to create at match start.
    pub spawns: Vec<SpawnPoint>,
    /// Metadata for the red team.
    pub red_team: TeamConfig,
    /// Metadata for the blue team.
    pub blue_team: TeamConfig,
}

impl MapBlueprint {
    /// Creates a blueprint with default team metadata.
    #[must_use]
    pub fn new(tiles: Vec<Vec<TileKind>>, spawns: Vec<SpawnPoint>) -> Self {
        Self {
            tiles,
            spawns,
            red_team: TeamConfig::default(),
            blue_team: TeamConfig::default(),
        }
    }

    /// Metadata configured for the named team.
    #[must_use]
    pub fn team_config(&self, team: Team) -> &TeamConfig {
        match team {
            Team::Red => &self.red_team,
            Team::Blue => &self.blue_team,
        }
    }
}

/// Starting position of one unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPoint {
    /// Team the unit fights for.
    pub team: Team,
    /// Combat class of the unit.
    pub class: UnitClass,
    /// Spawn row.
    pub row: u32,
    /// Spawn column.
    pub col: u32,
}

/// Optional per-team metadata carried by a map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Display name, when the map provides one.
    pub name: Option<String>,
    /// Score at which the team wins the match.
    pub score_limit: u32,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            name: None,
            score_limit: 21,
        }
    }
}

/// Commands that express all permissible match mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Selects a unit of the active team for orders.
    SelectUnit {
        /// Unit to select.
        unit: UnitId,
    },
    /// Drops the current selection and any pending target.
    ClearSelection,
    /// Moves the selected unit to a tile inside its computed range.
    MoveUnit {
        /// Tile the unit should move to.
        destination: GridPos,
    },
    /// Marks an enemy unit as the selected unit's target.
    SelectTarget {
        /// Enemy unit to target.
        unit: UnitId,
    },
    /// Fires the selected unit's laser at the current target.
    Fire,
    /// Ends the active team's turn.
    EndTurn,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// Confirms that a unit became the current selection.
    UnitSelected {
        /// Unit that was selected.
        unit: UnitId,
    },
    /// Confirms that the selection (and any pending target) was dropped.
    SelectionCleared {
        /// Unit that had been selected.
        unit: UnitId,
    },
    /// Reports that a selection request was rejected.
    SelectionRejected {
        /// Unit named in the request.
        unit: UnitId,
        /// Specific reason the selection failed.
        reason: SelectError,
    },
    /// Confirms that a unit moved between two tiles.
    UnitMoved {
        /// Unit that moved.
        unit: UnitId,
        /// Tile the unit occupied before moving.
        from: GridPos,
        /// Tile the unit occupies after the move.
        to: GridPos,
        /// Action points remaining after the move.
        remaining_ap: i8,
    },
    /// Reports that a move request was rejected.
    MoveRejected {
        /// Destination named in the request.
        destination: GridPos,
        /// Specific reason the move failed.
        reason: MoveError,
    },
    /// Confirms that an enemy unit was marked as the target.
    TargetAcquired {
        /// Unit that will shoot.
        shooter: UnitId,
        /// Unit that was targeted.
        target: UnitId,
    },
    /// Reports that a targeting request was rejected.
    TargetRejected {
        /// Unit named in the request.
        target: UnitId,
        /// Specific reason the targeting failed.
        reason: TargetError,
    },
    /// Reports one resolved attack, normal or overwatch snapshot.
    AttackResolved {
        /// Unit that fired.
        shooter: UnitId,
        /// Unit that was fired upon.
        target: UnitId,
        /// Whether the attack was an overwatch snapshot.
        snapshot: bool,
        /// The dice pair that was rolled.
        dice: DiceRoll,
        /// Total the roll had to meet or exceed.
        required: i16,
        /// Whether the attack connected.
        hit: bool,
    },
    /// Reports that a fire request was rejected.
    FireRejected {
        /// Specific reason the shot failed.
        reason: FireError,
    },
    /// Announces that a hit disabled the target's laser.
    LaserDischarged {
        /// Unit whose laser was disabled.
        unit: UnitId,
    },
    /// Announces that a unit began recharging on a base.
    ChargingStarted {
        /// Unit that began recharging.
        unit: UnitId,
    },
    /// Announces that a recharging laser became ready.
    LaserCharged {
        /// Unit whose laser finished charging.
        unit: UnitId,
    },
    /// Announces a point scored by a hit.
    PointScored {
        /// Team that scored.
        team: Team,
        /// Team score after the point.
        score: u32,
    },
    /// Announces that a hit removed a unit from the match.
    UnitEliminated {
        /// Unit that was eliminated.
        unit: UnitId,
        /// Team the unit fought for.
        team: Team,
        /// Tile freed by the elimination.
        tile: GridPos,
    },
    /// Announces the start of an overwatch interrupt sequence.
    OverwatchBegan {
        /// Unit whose move triggered the sequence.
        trigger: UnitId,
        /// Number of armed candidates with the trigger in sight.
        shooters: u32,
    },
    /// Reports that an end-turn request was rejected.
    EndTurnRejected {
        /// Specific reason the turn could not end.
        reason: TurnError,
    },
    /// Announces that a team's turn ended.
    TurnEnded {
        /// Team whose turn ended.
        team: Team,
    },
    /// Announces that a team's turn began.
    TurnBegan {
        /// Team now acting.
        team: Team,
        /// One-based turn counter.
        turn: u32,
    },
    /// Announces the end of the match.
    MatchEnded {
        /// Team that won.
        winner: Team,
        /// Condition that decided the match.
        condition: VictoryCondition,
    },
}

/// Reasons a selection request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectError {
    /// The unit does not belong to the active team.
    NotActiveTeam,
    /// The unit has no action points left this turn.
    NoActionPoints,
    /// No unit with the provided identifier exists.
    UnknownUnit,
    /// The match is already decided.
    MatchOver,
}

/// Reasons a move request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveError {
    /// No unit is currently selected.
    NoSelection,
    /// The selected unit may no longer move this turn.
    MovementLocked,
    /// The destination is not in the unit's computed range.
    NotReachable,
    /// Another unit stands on the destination.
    Occupied,
    /// The match is already decided.
    MatchOver,
}

/// Reasons a targeting request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetError {
    /// No unit is currently selected.
    NoSelection,
    /// The selected unit's laser is not charged.
    LaserNotCharged,
    /// The named unit fights for the active team.
    NotAnEnemy,
    /// The named unit's tile is outside the selection's sight.
    NotVisible,
    /// No unit with the provided identifier exists.
    UnknownUnit,
    /// The match is already decided.
    MatchOver,
}

/// Reasons a fire request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FireError {
    /// No unit is currently selected.
    NoSelection,
    /// The selection has no pending target.
    NoTarget,
    /// The selected unit has no action points left.
    NoActionPoints,
    /// The match is already decided.
    MatchOver,
}

/// Reasons an end-turn request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnError {
    /// A selection is still active; the turn may only end from idle.
    SelectionActive,
    /// The match is already decided.
    MatchOver,
}

/// Condition that decided a finished match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VictoryCondition {
    /// The winner reached its score limit.
    Score,
    /// Every unit of the losing team was eliminated.
    Elimination,
}

#[cfg(test)]
mod tests {
    use super::{
        BaseOwner, CoverFlags, Direction, FireApCost, GridPos, GridView, MoveError, RngCursor,
        SelectError, TargetError, Team, TileKind, UnitClass, UnitId, VictoryCondition,
    };
    use serde::{de::DeserializeOwned, Serialize};

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn unit_id_round_trips_through_bincode() {
        assert_round_trip(&UnitId::new(7));
    }

    #[test]
    fn tile_kind_round_trips_through_bincode() {
        assert_round_trip(&TileKind::Base(BaseOwner::Team(Team::Blue)));
    }

    #[test]
    fn grid_pos_round_trips_through_bincode() {
        assert_round_trip(&GridPos::new(3, 9));
    }

    #[test]
    fn rejection_reasons_round_trip_through_bincode() {
        assert_round_trip(&SelectError::NoActionPoints);
        assert_round_trip(&MoveError::NotReachable);
        assert_round_trip(&TargetError::NotVisible);
        assert_round_trip(&VictoryCondition::Elimination);
    }

    #[test]
    fn rng_cursor_round_trips_through_bincode() {
        assert_round_trip(&RngCursor {
            seed: 0xfeed_beef,
            word_pos: 96,
        });
    }

    #[test]
    fn cover_flags_round_trip_through_bincode() {
        let mut cover = CoverFlags::none();
        cover.set(Direction::North, true);
        cover.set(Direction::West, true);
        assert_round_trip(&cover);
    }

    #[test]
    fn diagonals_decompose_into_their_cardinals() {
        assert_eq!(
            Direction::NorthEast.components(),
            Some((Direction::North, Direction::East))
        );
        assert_eq!(
            Direction::SouthWest.components(),
            Some((Direction::South, Direction::West))
        );
        assert_eq!(Direction::North.components(), None);
    }

    #[test]
    fn stepping_off_the_index_space_returns_none() {
        let origin = GridPos::new(0, 0);
        assert_eq!(origin.step(Direction::North), None);
        assert_eq!(origin.step(Direction::West), None);
        assert_eq!(origin.step(Direction::SouthEast), Some(GridPos::new(1, 1)));
    }

    #[test]
    fn sample_points_lead_with_the_center() {
        let points = GridPos::new(2, 3).sample_points();
        assert_eq!(points[0].x(), 3.5);
        assert_eq!(points[0].y(), 2.5);
        assert_eq!(points[1].x(), 3.0);
        assert_eq!(points[1].y(), 2.0);
        assert_eq!(points[4].x(), 4.0);
        assert_eq!(points[4].y(), 3.0);
    }

    #[test]
    fn class_table_matches_tuning() {
        let basic = UnitClass::Basic.stats();
        let sniper = UnitClass::Sniper.stats();
        let scout = UnitClass::Scout.stats();
        let grunt = UnitClass::Grunt.stats();

        assert_eq!(basic.move_speed, 4);
        assert_eq!(sniper.to_hit, 5);
        assert_eq!(scout.move_speed, 5);
        assert!(scout.can_climb && !sniper.can_climb);
        assert_eq!(grunt.max_overwatch, 3);
        assert_eq!(grunt.cover_defense_bonus, 2);
        // Grunts shrug off the elevation defense malus entirely.
        assert_eq!(grunt.elev_defense_malus, 0);
        assert_eq!(basic.elev_defense_malus, -1);

        assert_eq!(basic.fire.ap_cost, FireApCost::AllRemaining);
        assert_eq!(sniper.fire.ap_cost, FireApCost::One);
        assert!(sniper.fire.locks_movement);
        assert!(!scout.fire.locks_movement);
        assert!(scout.fire.extra_shot_allowed);
        assert!(!basic.fire.extra_shot_allowed);
    }

    #[test]
    fn universal_bases_serve_both_teams() {
        let universal = TileKind::Base(BaseOwner::Universal);
        assert!(universal.is_base_for(Team::Red));
        assert!(universal.is_base_for(Team::Blue));

        let blue_only = TileKind::Base(BaseOwner::Team(Team::Blue));
        assert!(blue_only.is_base_for(Team::Blue));
        assert!(!blue_only.is_base_for(Team::Red));
    }

    #[test]
    fn grid_view_answers_the_edge_sentinel_beyond_the_boundary() {
        let kinds = vec![TileKind::Level, TileKind::Wall, TileKind::Level, TileKind::Level];
        let occupants = vec![None, None, Some(UnitId::new(1)), None];
        let view = GridView::new(&kinds, &occupants, 2, 2);

        assert_eq!(view.kind(GridPos::new(0, 1)), TileKind::Wall);
        assert_eq!(view.kind(GridPos::new(5, 5)), TileKind::Edge);
        assert_eq!(
            view.kind_toward(GridPos::new(0, 0), Direction::North),
            TileKind::Edge
        );
        assert_eq!(
            view.kind_toward(GridPos::new(0, 0), Direction::SouthEast),
            TileKind::Level
        );
        assert_eq!(view.occupant(GridPos::new(1, 0)), Some(UnitId::new(1)));
        assert!(!view.is_occupied(GridPos::new(0, 0)));
        assert_eq!(view.wall_positions().collect::<Vec<_>>(), vec![GridPos::new(0, 1)]);
    }
}
