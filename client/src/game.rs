//! Client-side mirror of the replicated world
//!
//! The mirror holds the last known field values of every entity the server
//! has told us about. Deltas are folded in field by field; a null delta
//! forgets the entity. Sounds are events and are queued for the caller
//! instead of being stored as state.

use log::trace;
use shared::delta::{ObjectFields, PlayerFields, PolyobjFields, SectorFields, SideFields, SoundFields};
use shared::{Delta, DeltaKind, SoundEmitter};
use std::collections::{BTreeMap, VecDeque};

/// Sounds kept for the caller before the oldest are dropped
pub const MAX_PENDING_SOUNDS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct SoundEvent {
    pub emitter: SoundEmitter,
    pub id: u16,
    pub fields: SoundFields,
}

#[derive(Debug, Clone, Default)]
pub struct ClientWorld {
    pub objects: BTreeMap<u16, ObjectFields>,
    pub players: BTreeMap<u16, PlayerFields>,
    pub sectors: BTreeMap<u16, SectorFields>,
    pub sides: BTreeMap<u16, SideFields>,
    pub polyobjs: BTreeMap<u16, PolyobjFields>,
    sounds: VecDeque<SoundEvent>,
}

impl ClientWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one delta into the mirror
    pub fn apply(&mut self, delta: &Delta) {
        match delta {
            Delta::Object { id, fields } => self.objects.entry(*id).or_default().merge(fields),
            Delta::Player { id, fields } => self.players.entry(*id).or_default().merge(fields),
            Delta::Sector { id, fields } => self.sectors.entry(*id).or_default().merge(fields),
            Delta::Side { id, fields } => self.sides.entry(*id).or_default().merge(fields),
            Delta::Polyobj { id, fields } => self.polyobjs.entry(*id).or_default().merge(fields),
            Delta::Sound {
                emitter,
                id,
                fields,
            } => {
                if self.sounds.len() == MAX_PENDING_SOUNDS {
                    self.sounds.pop_front();
                }
                self.sounds.push_back(SoundEvent {
                    emitter: *emitter,
                    id: *id,
                    fields: fields.clone(),
                });
            }
            Delta::Null { kind, id } => {
                trace!("Forgetting {:?} {}", kind, id);
                match kind {
                    DeltaKind::Object => {
                        self.objects.remove(id);
                    }
                    DeltaKind::Player => {
                        self.players.remove(id);
                    }
                    DeltaKind::Sector => {
                        self.sectors.remove(id);
                    }
                    DeltaKind::Side => {
                        self.sides.remove(id);
                    }
                    DeltaKind::Polyobj => {
                        self.polyobjs.remove(id);
                    }
                    DeltaKind::Sound(_) => {}
                }
            }
        }
    }

    /// Hands over every sound received since the last call, oldest first
    pub fn take_sounds(&mut self) -> Vec<SoundEvent> {
        self.sounds.drain(..).collect()
    }

    /// Forgets everything, e.g. on a level change
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn entity_count(&self) -> usize {
        self.objects.len()
            + self.players.len()
            + self.sectors.len()
            + self.sides.len()
            + self.polyobjs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Fixed;

    #[test]
    fn test_fields_accumulate() {
        let mut world = ClientWorld::new();
        world.apply(&Delta::Object {
            id: 3,
            fields: ObjectFields {
                origin_x: Some(Fixed::from_int(10)),
                state: Some(4),
                ..Default::default()
            },
        });
        world.apply(&Delta::Object {
            id: 3,
            fields: ObjectFields {
                origin_x: Some(Fixed::from_int(12)),
                ..Default::default()
            },
        });

        let object = &world.objects[&3];
        assert_eq!(object.origin_x, Some(Fixed::from_int(12)));
        assert_eq!(object.state, Some(4));
    }

    #[test]
    fn test_null_forgets_entity() {
        let mut world = ClientWorld::new();
        world.apply(&Delta::Sector {
            id: 1,
            fields: SectorFields {
                light: Some(90),
                ..Default::default()
            },
        });
        assert_eq!(world.entity_count(), 1);
        world.apply(&Delta::Null {
            kind: DeltaKind::Sector,
            id: 1,
        });
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_sounds_are_events() {
        let mut world = ClientWorld::new();
        for id in 0..(MAX_PENDING_SOUNDS as u16 + 5) {
            world.apply(&Delta::Sound {
                emitter: SoundEmitter::Object,
                id,
                fields: SoundFields::start(2, 100),
            });
        }
        assert_eq!(world.entity_count(), 0);
        let sounds = world.take_sounds();
        assert_eq!(sounds.len(), MAX_PENDING_SOUNDS);
        assert_eq!(sounds[0].id, 5);
        assert!(world.take_sounds().is_empty());
    }
}
