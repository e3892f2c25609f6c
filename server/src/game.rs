//! A small stand-in world that produces changes for the replication core
//!
//! Objects wander around a square arena and bounce off its edges, each
//! connected client owns one of them as its viewpoint, sector lights
//! flicker, and objects occasionally vanish with a sound and respawn
//! elsewhere. Everything the world does is reported as [`WorldChange`]s.

use crate::pool::WorldChange;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::delta::{ObjectFields, SectorFields, SoundFields, ZPosition};
use shared::{Angle, Delta, DeltaKind, Fixed, SoundEmitter};
use std::collections::{BTreeMap, HashMap};

/// Half the width of the square arena, in map units
pub const WORLD_HALF_EXTENT: f32 = 2048.0;
pub const OBJECT_SPEED: f32 = 96.0;
pub const PLAYER_SPEED: f32 = 160.0;
/// Chance per object per second of vanishing and respawning
pub const RESPAWN_RATE: f64 = 0.05;
pub const LIGHT_FLICKER_TICKS: u64 = 35;

const OBJECT_STATE: u16 = 1;
const PLAYER_STATE: u16 = 2;
const OBJECT_RADIUS: u8 = 20;
const OBJECT_HEIGHT: u8 = 56;
const VANISH_SOUND: u16 = 31;

#[derive(Debug, Clone)]
pub struct Actor {
    pub object_id: u16,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub is_player: bool,
}

impl Actor {
    pub fn position(&self) -> [f32; 3] {
        [self.x, self.y, 0.0]
    }

    fn angle(&self) -> Angle {
        Angle::from_degrees(self.vel_y.atan2(self.vel_x).to_degrees())
    }

    fn motion_fields(&self) -> ObjectFields {
        ObjectFields {
            origin_x: Some(Fixed::from_f32(self.x)),
            origin_y: Some(Fixed::from_f32(self.y)),
            mom_x: Some(Fixed::from_f32(self.vel_x / 35.0)),
            mom_y: Some(Fixed::from_f32(self.vel_y / 35.0)),
            angle: Some(self.angle()),
            ..Default::default()
        }
    }

    /// Everything a client needs to start tracking the object
    fn full_fields(&self) -> ObjectFields {
        ObjectFields {
            origin_z: Some(ZPosition::OnFloor),
            state: Some(if self.is_player { PLAYER_STATE } else { OBJECT_STATE }),
            radius: Some(OBJECT_RADIUS),
            height: Some(OBJECT_HEIGHT),
            ..self.motion_fields()
        }
    }

    fn change(&self, fields: ObjectFields) -> WorldChange {
        WorldChange::at(
            Delta::Object {
                id: self.object_id,
                fields,
            },
            self.position(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Sector {
    pub id: u16,
    pub light: u8,
}

pub struct GameState {
    pub tick: u64,
    pub objects: BTreeMap<u16, Actor>,
    /// Client id to the object it controls
    pub players: HashMap<u32, u16>,
    pub sectors: Vec<Sector>,
    next_object_id: u16,
    next_sound_id: u16,
    rng: StdRng,
}

impl GameState {
    pub fn new(seed: u64, object_count: usize, sector_count: u16) -> Self {
        let mut state = Self {
            tick: 0,
            objects: BTreeMap::new(),
            players: HashMap::new(),
            sectors: (0..sector_count)
                .map(|id| Sector { id, light: 160 })
                .collect(),
            next_object_id: 1,
            next_sound_id: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        for _ in 0..object_count {
            state.spawn_object(false);
        }
        info!(
            "World created with {} objects and {} sectors",
            object_count, sector_count
        );
        state
    }

    /// Spawns the object a client views the world from
    pub fn add_player(&mut self, client_id: u32) -> WorldChange {
        let object_id = self.spawn_object(true);
        self.players.insert(client_id, object_id);
        info!("Added player {} as object {}", client_id, object_id);
        self.full_change(object_id)
    }

    pub fn remove_player(&mut self, client_id: u32) -> Option<WorldChange> {
        let object_id = self.players.remove(&client_id)?;
        self.objects.remove(&object_id);
        info!("Removed player {}", client_id);
        Some(WorldChange::new(Delta::Null {
            kind: DeltaKind::Object,
            id: object_id,
        }))
    }

    pub fn viewer_position(&self, client_id: u32) -> Option<[f32; 3]> {
        let object_id = self.players.get(&client_id)?;
        self.objects.get(object_id).map(Actor::position)
    }

    /// Full state of everything that exists, for a peer that just became
    /// ready
    pub fn snapshot(&self) -> Vec<WorldChange> {
        let objects = self.objects.keys().map(|&id| self.full_change(id));
        let sectors = self.sectors.iter().map(sector_change);
        objects.chain(sectors).collect()
    }

    /// Advances the world by `dt` seconds and reports what changed
    pub fn step(&mut self, dt: f32) -> Vec<WorldChange> {
        self.tick += 1;
        let mut changes = Vec::new();

        for actor in self.objects.values_mut() {
            actor.x += actor.vel_x * dt;
            actor.y += actor.vel_y * dt;
            if actor.x.abs() > WORLD_HALF_EXTENT {
                actor.x = actor.x.clamp(-WORLD_HALF_EXTENT, WORLD_HALF_EXTENT);
                actor.vel_x = -actor.vel_x;
            }
            if actor.y.abs() > WORLD_HALF_EXTENT {
                actor.y = actor.y.clamp(-WORLD_HALF_EXTENT, WORLD_HALF_EXTENT);
                actor.vel_y = -actor.vel_y;
            }
            changes.push(actor.change(actor.motion_fields()));
        }

        let respawn_chance = (RESPAWN_RATE * dt as f64).clamp(0.0, 1.0);
        let vanished: Vec<u16> = self
            .objects
            .values()
            .filter(|actor| !actor.is_player)
            .map(|actor| actor.object_id)
            .filter(|_| self.rng.gen_bool(respawn_chance))
            .collect();
        for object_id in vanished {
            changes.extend(self.respawn(object_id));
        }

        if self.tick % LIGHT_FLICKER_TICKS == 0 && !self.sectors.is_empty() {
            let index = self.rng.gen_range(0..self.sectors.len());
            let sector = &mut self.sectors[index];
            sector.light = self.rng.gen_range(96..=255);
            changes.push(sector_change(sector));
        }

        changes
    }

    fn respawn(&mut self, object_id: u16) -> Vec<WorldChange> {
        let Some(actor) = self.objects.remove(&object_id) else {
            return Vec::new();
        };
        debug!("Object {} vanished", object_id);

        let origin = actor.position();
        let sound = Delta::Sound {
            emitter: SoundEmitter::World,
            id: self.next_sound_id,
            fields: SoundFields {
                origin: Some(origin.map(Fixed::from_f32)),
                ..SoundFields::start(VANISH_SOUND, 127)
            },
        };
        self.next_sound_id = self.next_sound_id.wrapping_add(1);

        let replacement = self.spawn_object(false);
        vec![
            WorldChange::new(Delta::Null {
                kind: DeltaKind::Object,
                id: object_id,
            }),
            WorldChange::at(sound, origin),
            self.full_change(replacement),
        ]
    }

    fn spawn_object(&mut self, is_player: bool) -> u16 {
        let object_id = self.next_object_id;
        self.next_object_id = self.next_object_id.wrapping_add(1).max(1);

        let speed = if is_player { PLAYER_SPEED } else { OBJECT_SPEED };
        let heading: f32 = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let actor = Actor {
            object_id,
            x: self.rng.gen_range(-WORLD_HALF_EXTENT..WORLD_HALF_EXTENT),
            y: self.rng.gen_range(-WORLD_HALF_EXTENT..WORLD_HALF_EXTENT),
            vel_x: heading.cos() * speed,
            vel_y: heading.sin() * speed,
            is_player,
        };
        self.objects.insert(object_id, actor);
        object_id
    }

    fn full_change(&self, object_id: u16) -> WorldChange {
        match self.objects.get(&object_id) {
            Some(actor) => actor.change(actor.full_fields()),
            None => WorldChange::new(Delta::Null {
                kind: DeltaKind::Object,
                id: object_id,
            }),
        }
    }
}

fn sector_change(sector: &Sector) -> WorldChange {
    WorldChange::new(Delta::Sector {
        id: sector.id,
        fields: SectorFields {
            light: Some(sector.light),
            ..Default::default()
        },
    })
}
