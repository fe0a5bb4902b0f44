#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a scripted Laser Tactics exchange.
//!
//! The engine performs no I/O of its own: this binary supplies a built-in
//! demo map as a plain blueprint value, drives the world through commands,
//! and narrates the resulting event stream.

use anyhow::Result;
use clap::Parser;

use laser_tactics_core::{
    BaseOwner, Command, Event, GridPos, MapBlueprint, SpawnPoint, Team, TileKind, UnitClass,
    UnitId,
};
use laser_tactics_world::{self as world, query, World};

/// Arguments accepted by the demonstration binary.
#[derive(Debug, Parser)]
#[command(name = "laser-tactics", about = "Scripted laser tag skirmish demo")]
struct Args {
    /// Seed for the match randomness source.
    #[arg(long, default_value_t = 0x1a5e_4)]
    seed: u64,
}

/// Entry point for the Laser Tactics command-line interface.
fn main() -> Result<()> {
    let args = Args::parse();
    let blueprint = demo_blueprint();
    let mut world = World::new(&blueprint, args.seed)?;

    println!("laser-tactics demo (seed {})", args.seed);

    let red_basic = UnitId::new(0);
    let blue_basic = UnitId::new(2);

    // Red's opening turn: advance the point unit, then stand down.
    play(
        &mut world,
        &[
            Command::SelectUnit { unit: red_basic },
            Command::MoveUnit {
                destination: GridPos::new(1, 5),
            },
            Command::ClearSelection,
            Command::EndTurn,
        ],
    );

    // Blue's reply: push the basic forward under red overwatch.
    play(
        &mut world,
        &[
            Command::SelectUnit { unit: blue_basic },
            Command::MoveUnit {
                destination: GridPos::new(6, 3),
            },
            Command::ClearSelection,
            Command::EndTurn,
        ],
    );

    // Red tries to line up a shot; fire only if the target is acquired.
    play(&mut world, &[Command::SelectUnit { unit: red_basic }]);
    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::SelectTarget { unit: blue_basic },
        &mut events,
    );
    let acquired = events
        .iter()
        .any(|event| matches!(event, Event::TargetAcquired { .. }));
    narrate(&events);
    if acquired {
        play(&mut world, &[Command::Fire]);
    }

    println!(
        "score: red {} / blue {}",
        query::score(&world, Team::Red),
        query::score(&world, Team::Blue),
    );
    Ok(())
}

fn play(world: &mut World, commands: &[Command]) {
    let mut events = Vec::new();
    for command in commands {
        world::apply(world, *command, &mut events);
    }
    narrate(&events);
}

fn narrate(events: &[Event]) {
    for event in events {
        println!("  {}", describe(event));
    }
}

fn describe(event: &Event) -> String {
    match event {
        Event::UnitSelected { unit } => format!("unit #{} selected", unit.get()),
        Event::SelectionCleared { unit } => format!("unit #{} stood down", unit.get()),
        Event::SelectionRejected { unit, reason } => {
            format!("cannot select unit #{}: {reason:?}", unit.get())
        }
        Event::UnitMoved {
            unit,
            from,
            to,
            remaining_ap,
        } => format!(
            "unit #{} moved ({},{}) -> ({},{}), {remaining_ap} AP left",
            unit.get(),
            from.row(),
            from.col(),
            to.row(),
            to.col(),
        ),
        Event::MoveRejected {
            destination,
            reason,
        } => format!(
            "move to ({},{}) rejected: {reason:?}",
            destination.row(),
            destination.col(),
        ),
        Event::TargetAcquired { shooter, target } => format!(
            "unit #{} locked on to unit #{}",
            shooter.get(),
            target.get(),
        ),
        Event::TargetRejected { target, reason } => {
            format!("cannot target unit #{}: {reason:?}", target.get())
        }
        Event::AttackResolved {
            shooter,
            target,
            snapshot,
            dice,
            required,
            hit,
        } => {
            let kind = if *snapshot { "snapshot" } else { "laser shot" };
            let result = if *hit { "HIT" } else { "miss" };
            format!(
                "{kind}: unit #{} at unit #{}, rolled {}+{}={} vs {required}: {result}",
                shooter.get(),
                target.get(),
                dice.first,
                dice.second,
                dice.total(),
            )
        }
        Event::FireRejected { reason } => format!("cannot fire: {reason:?}"),
        Event::LaserDischarged { unit } => format!("unit #{} laser disabled", unit.get()),
        Event::ChargingStarted { unit } => format!("unit #{} recharging on base", unit.get()),
        Event::LaserCharged { unit } => format!("unit #{} laser ready", unit.get()),
        Event::PointScored { team, score } => format!("{team:?} scores, now {score}"),
        Event::UnitEliminated { unit, team, tile } => format!(
            "unit #{} ({team:?}) eliminated at ({},{})",
            unit.get(),
            tile.row(),
            tile.col(),
        ),
        Event::OverwatchBegan { trigger, shooters } => format!(
            "overwatch: {shooters} shooter(s) react to unit #{}",
            trigger.get(),
        ),
        Event::EndTurnRejected { reason } => format!("cannot end turn: {reason:?}"),
        Event::TurnEnded { team } => format!("{team:?} turn ends"),
        Event::TurnBegan { team, turn } => format!("{team:?} turn {turn} begins"),
        Event::MatchEnded { winner, condition } => {
            format!("match over: {winner:?} wins by {condition:?}")
        }
    }
}

/// Built-in demonstration map: an 8x8 arena with a wall cluster in the
/// middle, one elevated perch, and a recharge base per team.
fn demo_blueprint() -> MapBlueprint {
    let mut tiles: Vec<Vec<TileKind>> = (0..8).map(|_| vec![TileKind::Level; 8]).collect();
    tiles[3][3] = TileKind::Wall;
    tiles[3][4] = TileKind::Wall;
    tiles[4][3] = TileKind::Wall;
    tiles[2][5] = TileKind::Elevated;
    tiles[0][0] = TileKind::Base(BaseOwner::Team(Team::Red));
    tiles[7][7] = TileKind::Base(BaseOwner::Team(Team::Blue));

    MapBlueprint::new(
        tiles,
        vec![
            SpawnPoint {
                team: Team::Red,
                class: UnitClass::Basic,
                row: 1,
                col: 1,
            },
            SpawnPoint {
                team: Team::Red,
                class: UnitClass::Scout,
                row: 2,
                col: 1,
            },
            SpawnPoint {
                team: Team::Blue,
                class: UnitClass::Basic,
                row: 6,
                col: 6,
            },
            SpawnPoint {
                team: Team::Blue,
                class: UnitClass::Grunt,
                row: 5,
                col: 6,
            },
        ],
    )
}
