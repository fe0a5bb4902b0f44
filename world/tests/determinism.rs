//! Replay and persistence guarantees of the seeded match state.

use laser_tactics_core::{
    BaseOwner, Command, Event, GridPos, MapBlueprint, SpawnPoint, Team, TileKind, UnitClass,
    UnitId,
};
use laser_tactics_world::{self as world, query, World};

fn blueprint() -> MapBlueprint {
    let mut tiles: Vec<Vec<TileKind>> = (0..5)
        .map(|_| vec![TileKind::Level; 5])
        .collect();
    // Bases on both sides keep hits from escalating into eliminations, so
    // every script plays out to its full length.
    tiles[0][4] = TileKind::Base(BaseOwner::Team(Team::Red));
    tiles[4][0] = TileKind::Base(BaseOwner::Team(Team::Blue));
    MapBlueprint::new(
        tiles,
        vec![
            SpawnPoint {
                team: Team::Red,
                class: UnitClass::Basic,
                row: 0,
                col: 0,
            },
            SpawnPoint {
                team: Team::Blue,
                class: UnitClass::Basic,
                row: 4,
                col: 4,
            },
        ],
    )
}

fn opening_turn() -> Vec<Command> {
    vec![
        Command::SelectUnit {
            unit: UnitId::new(0),
        },
        Command::MoveUnit {
            destination: GridPos::new(0, 2),
        },
        Command::MoveUnit {
            destination: GridPos::new(2, 2),
        },
        Command::ClearSelection,
        Command::EndTurn,
    ]
}

fn reply_turn() -> Vec<Command> {
    vec![
        Command::SelectUnit {
            unit: UnitId::new(1),
        },
        Command::MoveUnit {
            destination: GridPos::new(4, 2),
        },
        Command::ClearSelection,
        Command::EndTurn,
    ]
}

fn run(world: &mut World, commands: &[Command]) -> Vec<Event> {
    let mut events = Vec::new();
    for command in commands {
        world::apply(world, *command, &mut events);
    }
    events
}

#[test]
fn identical_seeds_replay_identically() {
    let mut first = World::new(&blueprint(), 42).expect("world");
    let mut second = World::new(&blueprint(), 42).expect("world");

    let mut script = opening_turn();
    script.extend(reply_turn());

    let first_events = run(&mut first, &script);
    let second_events = run(&mut second, &script);
    assert_eq!(first_events, second_events, "replay diverged between runs");

    let first_snapshot = query::snapshot(&first);
    let second_snapshot = query::snapshot(&second);
    assert_eq!(first_snapshot, second_snapshot);

    let first_bytes = bincode::serialize(&first_snapshot).expect("serialize");
    let second_bytes = bincode::serialize(&second_snapshot).expect("serialize");
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn queries_never_perturb_the_match_state() {
    let mut world = World::new(&blueprint(), 9).expect("world");
    let _ = run(&mut world, &opening_turn());

    // Read-only queries recompute ranges, sight and to-hit totals without
    // touching the randomness cursor or any other state.
    let before = query::snapshot(&world);
    let _ = query::reachable_steps(&world, UnitId::new(1));
    let _ = query::visible_tiles(&world, UnitId::new(1));
    let _ = query::to_hit_preview(&world, UnitId::new(1), UnitId::new(0), true);
    let _ = query::unit_view(&world);
    assert_eq!(query::snapshot(&world), before);
}

#[test]
fn a_mid_match_snapshot_resumes_bit_for_bit() {
    let mut original = World::new(&blueprint(), 7).expect("world");
    let _ = run(&mut original, &opening_turn());

    let checkpoint = query::snapshot(&original);
    let mut restored = World::from_snapshot(&checkpoint).expect("restore");

    let original_events = run(&mut original, &reply_turn());
    let restored_events = run(&mut restored, &reply_turn());
    assert_eq!(
        original_events, restored_events,
        "restored match diverged from the original"
    );

    assert_eq!(query::snapshot(&original), query::snapshot(&restored));
}
