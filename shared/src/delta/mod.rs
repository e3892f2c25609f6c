//! Entity change records and their compact binary codec.
//!
//! A [`Delta`] is one entity's changed fields since the peer's last
//! acknowledged state. Every kind of replicated entity is its own variant, so
//! encode and decode are single exhaustive matches.

pub mod codec;
pub mod fields;

pub use codec::{decode, decode_kind, encode, encode_resent, encoded_len, DecodedDelta, Resent};
pub use fields::{
    ObjectFields, PlayerFields, PolyobjFields, Psprite, SectorFields, SideFields, SoundFields,
    ZPosition,
};

/// What a sound is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEmitter {
    /// A free-standing sound at an explicit origin.
    World,
    Object,
    Sector,
    Polyobj,
}

/// Replicated entity category, as carried in the low bits of the type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    Object,
    Player,
    Sector,
    Side,
    Polyobj,
    Sound(SoundEmitter),
}

impl DeltaKind {
    pub const ALL: [DeltaKind; 9] = [
        DeltaKind::Object,
        DeltaKind::Player,
        DeltaKind::Sector,
        DeltaKind::Side,
        DeltaKind::Polyobj,
        DeltaKind::Sound(SoundEmitter::World),
        DeltaKind::Sound(SoundEmitter::Object),
        DeltaKind::Sound(SoundEmitter::Sector),
        DeltaKind::Sound(SoundEmitter::Polyobj),
    ];

    pub fn tag(self) -> u8 {
        match self {
            DeltaKind::Object => 0,
            DeltaKind::Player => 1,
            DeltaKind::Sector => 2,
            DeltaKind::Side => 3,
            DeltaKind::Polyobj => 4,
            DeltaKind::Sound(SoundEmitter::World) => 5,
            DeltaKind::Sound(SoundEmitter::Object) => 6,
            DeltaKind::Sound(SoundEmitter::Sector) => 7,
            DeltaKind::Sound(SoundEmitter::Polyobj) => 8,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        DeltaKind::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    pub fn is_sound(self) -> bool {
        matches!(self, DeltaKind::Sound(_))
    }
}

/// Identity of the replicated thing a delta describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: DeltaKind,
    pub id: u16,
}

/// One entity's change record.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Object { id: u16, fields: ObjectFields },
    Player { id: u16, fields: PlayerFields },
    Sector { id: u16, fields: SectorFields },
    Side { id: u16, fields: SideFields },
    Polyobj { id: u16, fields: PolyobjFields },
    Sound {
        emitter: SoundEmitter,
        id: u16,
        fields: SoundFields,
    },
    /// The entity no longer exists; the receiver stops tracking it.
    Null { kind: DeltaKind, id: u16 },
}

impl Delta {
    pub fn kind(&self) -> DeltaKind {
        match self {
            Delta::Object { .. } => DeltaKind::Object,
            Delta::Player { .. } => DeltaKind::Player,
            Delta::Sector { .. } => DeltaKind::Sector,
            Delta::Side { .. } => DeltaKind::Side,
            Delta::Polyobj { .. } => DeltaKind::Polyobj,
            Delta::Sound { emitter, .. } => DeltaKind::Sound(*emitter),
            Delta::Null { kind, .. } => *kind,
        }
    }

    pub fn target_id(&self) -> u16 {
        match self {
            Delta::Object { id, .. }
            | Delta::Player { id, .. }
            | Delta::Sector { id, .. }
            | Delta::Side { id, .. }
            | Delta::Polyobj { id, .. }
            | Delta::Sound { id, .. }
            | Delta::Null { id, .. } => *id,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            kind: self.kind(),
            id: self.target_id(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Delta::Null { .. })
    }

    /// True when a non-null delta carries no changed field.
    pub fn is_empty(&self) -> bool {
        match self {
            Delta::Object { fields, .. } => fields.is_empty(),
            Delta::Player { fields, .. } => fields.is_empty(),
            Delta::Sector { fields, .. } => fields.is_empty(),
            Delta::Side { fields, .. } => fields.is_empty(),
            Delta::Polyobj { fields, .. } => fields.is_empty(),
            Delta::Sound { fields, .. } => fields.is_empty(),
            Delta::Null { .. } => false,
        }
    }

    /// Folds a newer change for the same entity into this one. Returns false
    /// when the two cannot be combined (different entity, sounds, nulls).
    pub fn merge(&mut self, newer: &Delta) -> bool {
        match (self, newer) {
            (Delta::Object { id, fields }, Delta::Object { id: other, fields: new })
                if id == other =>
            {
                fields.merge(new);
                true
            }
            (Delta::Player { id, fields }, Delta::Player { id: other, fields: new })
                if id == other =>
            {
                fields.merge(new);
                true
            }
            (Delta::Sector { id, fields }, Delta::Sector { id: other, fields: new })
                if id == other =>
            {
                fields.merge(new);
                true
            }
            (Delta::Side { id, fields }, Delta::Side { id: other, fields: new }) if id == other => {
                fields.merge(new);
                true
            }
            (Delta::Polyobj { id, fields }, Delta::Polyobj { id: other, fields: new })
                if id == other =>
            {
                fields.merge(new);
                true
            }
            _ => false,
        }
    }

    /// Removes the fields a newer change for the same entity supersedes.
    pub fn subtract(&mut self, newer: &Delta) {
        match (self, newer) {
            (Delta::Object { id, fields }, Delta::Object { id: other, fields: new })
                if id == other =>
            {
                fields.subtract(new)
            }
            (Delta::Player { id, fields }, Delta::Player { id: other, fields: new })
                if id == other =>
            {
                fields.subtract(new)
            }
            (Delta::Sector { id, fields }, Delta::Sector { id: other, fields: new })
                if id == other =>
            {
                fields.subtract(new)
            }
            (Delta::Side { id, fields }, Delta::Side { id: other, fields: new }) if id == other => {
                fields.subtract(new)
            }
            (Delta::Polyobj { id, fields }, Delta::Polyobj { id: other, fields: new })
                if id == other =>
            {
                fields.subtract(new)
            }
            _ => {}
        }
    }

    /// World-space origin carried by the delta itself, if any.
    pub fn origin(&self) -> Option<[f32; 3]> {
        match self {
            Delta::Object { fields, .. } => fields.origin(),
            Delta::Polyobj { fields, .. } => Some([
                fields.dest_x?.to_f32(),
                fields.dest_y?.to_f32(),
                0.0,
            ]),
            Delta::Sound { fields, .. } => fields
                .origin
                .map(|[x, y, z]| [x.to_f32(), y.to_f32(), z.to_f32()]),
            _ => None,
        }
    }
}
