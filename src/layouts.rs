//! Seating layouts for scripted scenes. All units are feet.
use std::collections::BTreeMap;

use clap::ValueEnum;

use crate::files::{AgentTemplate, RoundFrame, SceneFile};
use crate::simulation::PhonePosition;

pub const CIRCULAR_TABLE_DIAMETER: f64 = 5.0;
pub const PEOPLE_AT_CIRCULAR_TABLE: usize = 8;

pub const RECTANGULAR_TABLE_WIDTH: f64 = 6.0;
pub const RECTANGULAR_TABLE_LENGTH: f64 = 2.5;
pub const PEOPLE_AT_WIDTH_SIDE: usize = 3;
pub const PEOPLE_AT_LENGTH_SIDE: usize = 1;

/// Room for chairs between two tables.
pub const TABLE_GAP: f64 = 4.0;

type Point = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Layout {
    RoundTables,
    Cafeteria,
    Conference,
    SparseCafeteria,
    SparseRoundTables,
    SparseConference,
}

/// Which sides of a rectangular table have chairs.
#[derive(Debug, Clone, Copy)]
struct Sides {
    bottom: bool,
    left: bool,
    top: bool,
    right: bool,
}

fn circle_table(center: Point) -> Vec<Point> {
    (0..PEOPLE_AT_CIRCULAR_TABLE)
        .map(|i| {
            let angle = (i as f64 * 360.0 / PEOPLE_AT_CIRCULAR_TABLE as f64).to_radians();
            (
                center.0 + angle.cos() * CIRCULAR_TABLE_DIAMETER / 2.0,
                center.1 + angle.sin() * CIRCULAR_TABLE_DIAMETER / 2.0,
            )
        })
        .collect()
}

fn rectangular_table(corner: Point, rotation: f64, sides: Sides) -> Vec<Point> {
    let along = (rotation.to_radians().cos(), rotation.to_radians().sin());
    let across = (
        (rotation + 90.0).to_radians().cos(),
        (rotation + 90.0).to_radians().sin(),
    );
    let width_step = RECTANGULAR_TABLE_WIDTH / (PEOPLE_AT_WIDTH_SIDE + 1) as f64;
    let length_step = RECTANGULAR_TABLE_LENGTH / (PEOPLE_AT_LENGTH_SIDE + 1) as f64;

    let mut people = Vec::new();
    if sides.bottom {
        for i in 1..=PEOPLE_AT_WIDTH_SIDE {
            let offset = i as f64 * width_step;
            people.push((corner.0 + offset * along.0, corner.1 + offset * along.1));
        }
    }
    if sides.left {
        for i in 1..=PEOPLE_AT_LENGTH_SIDE {
            let offset = i as f64 * length_step;
            people.push((corner.0 + offset * across.0, corner.1 + offset * across.1));
        }
    }
    if sides.top {
        for i in 1..=PEOPLE_AT_WIDTH_SIDE {
            let offset = i as f64 * width_step;
            people.push((
                corner.0 + offset * along.0 + RECTANGULAR_TABLE_LENGTH * across.0,
                corner.1 + offset * along.1 + RECTANGULAR_TABLE_LENGTH * across.1,
            ));
        }
    }
    if sides.right {
        for i in 1..=PEOPLE_AT_LENGTH_SIDE {
            let offset = i as f64 * length_step;
            people.push((
                corner.0 + offset * across.0 + RECTANGULAR_TABLE_WIDTH * along.0,
                corner.1 + offset * across.1 + RECTANGULAR_TABLE_WIDTH * along.1,
            ));
        }
    }
    people
}

fn round_tables(tables: &[(u32, u32)]) -> Vec<Point> {
    let pitch = CIRCULAR_TABLE_DIAMETER + TABLE_GAP;
    tables
        .iter()
        .flat_map(|(x, y)| circle_table((f64::from(*x) * pitch, f64::from(*y) * pitch)))
        .collect()
}

fn cafeteria_tables(tables: &[(u32, u32)], sides: impl Fn(u32) -> Sides) -> Vec<Point> {
    tables
        .iter()
        .flat_map(|(x, y)| {
            let corner = (
                f64::from(*x) * RECTANGULAR_TABLE_WIDTH,
                f64::from(*y) * (RECTANGULAR_TABLE_LENGTH + TABLE_GAP),
            );
            rectangular_table(corner, 0.0, sides(*x))
        })
        .collect()
}

fn grid(columns: u32, rows: u32) -> Vec<(u32, u32)> {
    (0..columns)
        .flat_map(|x| (0..rows).map(move |y| (x, y)))
        .collect()
}

/// One long row of tables with chairs on the two far ends.
fn conference() -> Vec<Point> {
    const TABLES: u32 = 4;
    cafeteria_tables(&grid(TABLES, 1), |x| Sides {
        bottom: true,
        left: x == 0,
        top: true,
        right: x == TABLES - 1,
    })
}

impl Layout {
    pub const ALL: [Layout; 6] = [
        Layout::RoundTables,
        Layout::Cafeteria,
        Layout::Conference,
        Layout::SparseCafeteria,
        Layout::SparseRoundTables,
        Layout::SparseConference,
    ];

    pub fn file_stem(self) -> &'static str {
        match self {
            Layout::RoundTables => "roundTables",
            Layout::Cafeteria => "cafeteria",
            Layout::Conference => "conference",
            Layout::SparseCafeteria => "sparseCafeteria",
            Layout::SparseRoundTables => "sparseRoundTables",
            Layout::SparseConference => "sparse_conference",
        }
    }

    /// Seat positions, before normalisation.
    pub fn people(self) -> Vec<Point> {
        let long_sides = |_: u32| Sides {
            bottom: true,
            left: false,
            top: true,
            right: false,
        };

        match self {
            Layout::RoundTables => round_tables(&grid(3, 2)),
            Layout::Cafeteria => cafeteria_tables(&grid(3, 2), long_sides),
            Layout::Conference => conference(),
            Layout::SparseCafeteria => cafeteria_tables(&[(0, 0), (2, 1)], |x| Sides {
                left: x == 0,
                ..long_sides(x)
            }),
            Layout::SparseRoundTables => round_tables(&[(0, 0), (2, 1)]),
            // every other chair stays empty
            Layout::SparseConference => conference().into_iter().step_by(2).collect(),
        }
    }

    /// A one-round scene with everyone seated, shifted so the lowest
    /// coordinates are zero.
    pub fn scene(self, range: f64, position: PhonePosition) -> SceneFile {
        let people = self.people();
        let min_x = people.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let min_y = people.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let people: Vec<Point> = people.iter().map(|(x, y)| (x - min_x, y - min_y)).collect();
        let max_x = people.iter().map(|p| p.0).fold(0.0, f64::max);
        let max_y = people.iter().map(|p| p.1).fold(0.0, f64::max);

        let template = AgentTemplate {
            range,
            position: Some(position),
        };

        SceneFile {
            minutes: Some(1.0),
            area: Some((max_x, max_y)),
            agents: (0..people.len() as u32).map(|id| (id, template)).collect(),
            rounds: BTreeMap::from([(
                0,
                RoundFrame {
                    time: None,
                    locations: people
                        .into_iter()
                        .enumerate()
                        .map(|(id, point)| (id as u32, Some(point)))
                        .collect(),
                },
            )]),
        }
    }
}
