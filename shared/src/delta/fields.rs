//! Per-kind changed-field sets.
//!
//! Each member is `Some` when the field changed. The wire flag words are
//! derived from presence by the codec, so a field set can never disagree with
//! its flags.

use crate::fixed::{Angle, Fixed};

macro_rules! field_set {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$field_meta:meta])* $field:ident : $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $( $(#[$field_meta])* pub $field: Option<$ty>, )*
        }

        impl $name {
            pub fn is_empty(&self) -> bool {
                true $( && self.$field.is_none() )*
            }

            pub fn field_count(&self) -> usize {
                0 $( + self.$field.is_some() as usize )*
            }

            /// Takes every field present in `newer`.
            pub fn merge(&mut self, newer: &Self) {
                $( if newer.$field.is_some() { self.$field = newer.$field.clone(); } )*
            }

            /// Forgets every field `newer` supersedes.
            pub fn subtract(&mut self, newer: &Self) {
                $( if newer.$field.is_some() { self.$field = None; } )*
            }
        }
    };
}

/// Vertical placement of an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZPosition {
    At(Fixed),
    /// Resting on the floor of its sector; the receiver snaps z itself.
    OnFloor,
}

field_set! {
    pub struct ObjectFields {
        origin_x: Fixed,
        origin_y: Fixed,
        origin_z: ZPosition,
        mom_x: Fixed,
        mom_y: Fixed,
        mom_z: Fixed,
        angle: Angle,
        selector: u16,
        state: u16,
        radius: u8,
        height: u8,
        flags: u32,
        floor_clip: Fixed,
        translucency: u8,
        fade_target: u8,
        /// Explicit type override.
        type_id: u16,
    }
}

impl ObjectFields {
    /// True when any present momentum component overflows 8.8.
    pub fn needs_fast_momentum(&self) -> bool {
        [self.mom_x, self.mom_y, self.mom_z]
            .iter()
            .flatten()
            .any(|mom| !mom.fits_8_8())
    }

    pub fn origin(&self) -> Option<[f32; 3]> {
        let x = self.origin_x?;
        let y = self.origin_y?;
        let z = match self.origin_z {
            Some(ZPosition::At(z)) => z.to_f32(),
            _ => 0.0,
        };
        Some([x.to_f32(), y.to_f32(), z])
    }
}

/// One player weapon sprite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Psprite {
    pub state: u16,
    pub light: u8,
    pub alpha: u8,
    pub offset_x: i16,
    pub offset_y: i16,
}

field_set! {
    pub struct PlayerFields {
        mobj: u16,
        forward_move: i8,
        side_move: i8,
        turn_delta: Angle,
        friction: Fixed,
        extra_light: u8,
        fixed_colormap: u8,
        /// RGBA screen filter.
        filter: u32,
        cl_yaw: Angle,
        cl_pitch: i16,
        psprites: [Psprite; 2],
    }
}

field_set! {
    pub struct SectorFields {
        floor_material: u16,
        ceiling_material: u16,
        light: u8,
        color: [u8; 3],
        floor_height: Fixed,
        ceiling_height: Fixed,
        floor_target: Fixed,
        floor_speed: Fixed,
        ceiling_target: Fixed,
        ceiling_speed: Fixed,
    }
}

field_set! {
    pub struct SideFields {
        top_material: u16,
        middle_material: u16,
        bottom_material: u16,
        line_flags: u8,
        top_color: [u8; 3],
        middle_color: [u8; 4],
        bottom_color: [u8; 3],
        blend_mode: u8,
    }
}

field_set! {
    pub struct PolyobjFields {
        dest_x: Fixed,
        dest_y: Fixed,
        speed: Fixed,
        dest_angle: Angle,
        angle_speed: Angle,
    }
}

/// A sound start/stop. Sounds are events rather than state, so they are
/// never merged with each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoundFields {
    pub sound_id: Option<u16>,
    pub volume: Option<u8>,
    /// Only meaningful for world sounds.
    pub origin: Option<[Fixed; 3]>,
    pub stop: bool,
    pub repeat: bool,
}

impl SoundFields {
    pub fn start(sound_id: u16, volume: u8) -> Self {
        Self {
            sound_id: Some(sound_id),
            volume: Some(volume),
            ..Self::default()
        }
    }

    pub fn stop() -> Self {
        Self {
            stop: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sound_id.is_none()
            && self.volume.is_none()
            && self.origin.is_none()
            && !self.stop
            && !self.repeat
    }
}
