//! 16.16 fixed-point values and the narrowed wire encodings derived from them.
//!
//! The world layer hands over positions, heights and momenta as 16.16 fixed
//! point. On the wire those are narrowed: positions keep a 16-bit integer part
//! plus the top byte of the fraction, momenta are squeezed into 8.8 or 10.6,
//! and binary angles keep their 16 most significant bits.

use serde::{Deserialize, Serialize};

pub const FRACBITS: u32 = 16;
pub const FRACUNIT: i32 = 1 << FRACBITS;

/// Largest magnitude an 8.8 momentum component can carry.
pub const SLOW_MOMENTUM_LIMIT: i32 = 127 * FRACUNIT;

/// A 16.16 fixed-point number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Fixed(pub i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    pub fn from_int(value: i16) -> Self {
        Fixed((value as i32) << FRACBITS)
    }

    pub fn from_f32(value: f32) -> Self {
        Fixed((value * FRACUNIT as f32) as i32)
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / FRACUNIT as f32
    }

    /// Splits into the 16-bit integer part and the top byte of the fraction.
    pub fn to_position(self) -> (i16, u8) {
        ((self.0 >> FRACBITS) as i16, ((self.0 >> 8) & 0xff) as u8)
    }

    pub fn from_position(integer: i16, fraction: u8) -> Self {
        Fixed(((integer as i32) << FRACBITS) | ((fraction as i32) << 8))
    }

    /// Drops the precision a position loses on the wire.
    pub fn quantize_position(self) -> Self {
        let (integer, fraction) = self.to_position();
        Fixed::from_position(integer, fraction)
    }

    /// Saturates outside the ±128 range 8.8 can hold.
    pub fn to_8_8(self) -> i16 {
        (self.0 >> 8).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    pub fn from_8_8(value: i16) -> Self {
        Fixed((value as i32) << 8)
    }

    pub fn to_10_6(self) -> i16 {
        (self.0 >> 10).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    pub fn from_10_6(value: i16) -> Self {
        Fixed((value as i32) << 10)
    }

    pub fn fits_8_8(self) -> bool {
        self.0.unsigned_abs() < SLOW_MOMENTUM_LIMIT as u32
    }
}

/// A 32-bit binary angle (full turn == 2^32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Angle(pub u32);

impl Angle {
    pub const ANG90: Angle = Angle(0x4000_0000);
    pub const ANG180: Angle = Angle(0x8000_0000);

    pub fn to_short(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn from_short(value: u16) -> Self {
        Angle((value as u32) << 16)
    }

    pub fn quantize(self) -> Self {
        Angle::from_short(self.to_short())
    }

    pub fn from_degrees(degrees: f32) -> Self {
        let turns = degrees.rem_euclid(360.0) / 360.0;
        Angle((turns as f64 * 4_294_967_296.0) as u64 as u32)
    }

    pub fn to_degrees(self) -> f32 {
        (self.0 as f64 / 4_294_967_296.0 * 360.0) as f32
    }
}
