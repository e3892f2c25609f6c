//! Flag-driven binary encoding of a single [`Delta`].
//!
//! Layout (little-endian):
//!
//! ```text
//! type tag   u8    bits 0..=5 kind, bit 6 NULL, bit 7 RESENT
//! [set       u8]   RESENT only
//! [resend    u8]   RESENT only
//! target id  u16
//! flags      u8 | u16   (non-null only)
//! [flags2    u8]   objects with MORE set
//! payload          present fields in flag-bit order
//! ```

use super::fields::{
    ObjectFields, PlayerFields, PolyobjFields, Psprite, SectorFields, SideFields, SoundFields,
    ZPosition,
};
use super::{Delta, DeltaKind, SoundEmitter};
use crate::error::ProtocolError;
use crate::fixed::Fixed;
use crate::wire::{ByteReader, ByteWriter};

pub const TAG_KIND_MASK: u8 = 0x3f;
pub const TAG_NULL: u8 = 0x40;
pub const TAG_RESENT: u8 = 0x80;

pub mod object {
    pub const ORIGIN_X: u16 = 0x0001;
    pub const ORIGIN_Y: u16 = 0x0002;
    pub const ORIGIN_Z: u16 = 0x0004;
    pub const MOM_X: u16 = 0x0008;
    pub const MOM_Y: u16 = 0x0010;
    pub const MOM_Z: u16 = 0x0020;
    pub const ANGLE: u16 = 0x0040;
    pub const SELECTOR: u16 = 0x0080;
    pub const STATE: u16 = 0x0100;
    pub const RADIUS: u16 = 0x0200;
    pub const HEIGHT: u16 = 0x0400;
    pub const FLAGS: u16 = 0x0800;
    pub const FLOOR_CLIP: u16 = 0x1000;
    pub const MORE: u16 = 0x8000;
    pub const PRIMARY_DEFINED: u16 = 0x1fff | MORE;

    pub const FAST_MOM: u8 = 0x01;
    pub const TRANSLUCENCY: u8 = 0x02;
    pub const FADE_TARGET: u8 = 0x04;
    pub const ON_FLOOR: u8 = 0x08;
    pub const TYPE: u8 = 0x10;
    pub const SECONDARY_DEFINED: u8 = 0x1f;
}

pub mod player {
    pub const MOBJ: u16 = 0x0001;
    pub const FORWARD_MOVE: u16 = 0x0002;
    pub const SIDE_MOVE: u16 = 0x0004;
    pub const TURN_DELTA: u16 = 0x0008;
    pub const FRICTION: u16 = 0x0010;
    pub const EXTRA_LIGHT: u16 = 0x0020;
    pub const FIXED_COLORMAP: u16 = 0x0040;
    pub const FILTER: u16 = 0x0080;
    pub const CL_YAW: u16 = 0x0100;
    pub const CL_PITCH: u16 = 0x0200;
    pub const PSPRITES: u16 = 0x0400;
    pub const DEFINED: u16 = 0x07ff;
}

pub mod sector {
    pub const FLOOR_MATERIAL: u16 = 0x0001;
    pub const CEILING_MATERIAL: u16 = 0x0002;
    pub const LIGHT: u16 = 0x0004;
    pub const COLOR: u16 = 0x0008;
    pub const FLOOR_HEIGHT: u16 = 0x0010;
    pub const CEILING_HEIGHT: u16 = 0x0020;
    pub const FLOOR_TARGET: u16 = 0x0040;
    pub const FLOOR_SPEED: u16 = 0x0080;
    pub const CEILING_TARGET: u16 = 0x0100;
    pub const CEILING_SPEED: u16 = 0x0200;
    pub const DEFINED: u16 = 0x03ff;
}

pub mod side {
    pub const TOP_MATERIAL: u8 = 0x01;
    pub const MIDDLE_MATERIAL: u8 = 0x02;
    pub const BOTTOM_MATERIAL: u8 = 0x04;
    pub const LINE_FLAGS: u8 = 0x08;
    pub const TOP_COLOR: u8 = 0x10;
    pub const MIDDLE_COLOR: u8 = 0x20;
    pub const BOTTOM_COLOR: u8 = 0x40;
    pub const BLENDMODE: u8 = 0x80;
}

pub mod polyobj {
    pub const DEST_X: u8 = 0x01;
    pub const DEST_Y: u8 = 0x02;
    pub const SPEED: u8 = 0x04;
    pub const DEST_ANGLE: u8 = 0x08;
    pub const ANGLE_SPEED: u8 = 0x10;
    pub const DEFINED: u8 = 0x1f;
}

pub mod sound {
    pub const SOUND_ID: u8 = 0x01;
    pub const VOLUME: u8 = 0x02;
    pub const ORIGIN: u8 = 0x04;
    pub const STOP: u8 = 0x08;
    pub const REPEAT: u8 = 0x10;
    pub const DEFINED: u8 = 0x1f;
}

/// Retransmission header carried by a delta written again after its first
/// frame went unacknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resent {
    pub set: u8,
    pub tag: u8,
}

/// A delta read off the wire along with its retransmission header.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDelta {
    pub delta: Delta,
    pub resent: Option<Resent>,
}

/// Appends `delta` to `writer`.
pub fn encode(delta: &Delta, writer: &mut ByteWriter) -> Result<(), ProtocolError> {
    write_delta(delta, None, writer)
}

/// Appends `delta` with the RESENT header so the receiver can spot a copy it
/// already applied.
pub fn encode_resent(
    delta: &Delta,
    resent: Resent,
    writer: &mut ByteWriter,
) -> Result<(), ProtocolError> {
    write_delta(delta, Some(resent), writer)
}

/// Serialized size of `delta` without the RESENT header.
pub fn encoded_len(delta: &Delta) -> Result<usize, ProtocolError> {
    let mut writer = ByteWriter::with_capacity(32);
    encode(delta, &mut writer)?;
    Ok(writer.len())
}

fn write_delta(
    delta: &Delta,
    resent: Option<Resent>,
    writer: &mut ByteWriter,
) -> Result<(), ProtocolError> {
    if delta.is_empty() {
        return Err(ProtocolError::EmptyDelta);
    }

    let mut tag = delta.kind().tag();
    if delta.is_null() {
        tag |= TAG_NULL;
    }
    if resent.is_some() {
        tag |= TAG_RESENT;
    }
    writer.write_u8(tag);
    if let Some(resent) = resent {
        writer.write_u8(resent.set);
        writer.write_u8(resent.tag);
    }
    writer.write_u16(delta.target_id());

    match delta {
        Delta::Object { fields, .. } => write_object(fields, writer),
        Delta::Player { fields, .. } => write_player(fields, writer),
        Delta::Sector { fields, .. } => write_sector(fields, writer),
        Delta::Side { fields, .. } => write_side(fields, writer),
        Delta::Polyobj { fields, .. } => write_polyobj(fields, writer),
        Delta::Sound {
            emitter, fields, ..
        } => write_sound(*emitter, fields, writer),
        Delta::Null { .. } => {}
    }
    Ok(())
}

fn object_flags(fields: &ObjectFields) -> (u16, u8) {
    use object::*;

    let mut primary = 0;
    let mut secondary = 0;
    if fields.origin_x.is_some() {
        primary |= ORIGIN_X;
    }
    if fields.origin_y.is_some() {
        primary |= ORIGIN_Y;
    }
    match fields.origin_z {
        Some(ZPosition::At(_)) => primary |= ORIGIN_Z,
        Some(ZPosition::OnFloor) => secondary |= ON_FLOOR,
        None => {}
    }
    if fields.mom_x.is_some() {
        primary |= MOM_X;
    }
    if fields.mom_y.is_some() {
        primary |= MOM_Y;
    }
    if fields.mom_z.is_some() {
        primary |= MOM_Z;
    }
    if fields.angle.is_some() {
        primary |= ANGLE;
    }
    if fields.selector.is_some() {
        primary |= SELECTOR;
    }
    if fields.state.is_some() {
        primary |= STATE;
    }
    if fields.radius.is_some() {
        primary |= RADIUS;
    }
    if fields.height.is_some() {
        primary |= HEIGHT;
    }
    if fields.flags.is_some() {
        primary |= FLAGS;
    }
    if fields.floor_clip.is_some() {
        primary |= FLOOR_CLIP;
    }
    if fields.needs_fast_momentum() {
        secondary |= FAST_MOM;
    }
    if fields.translucency.is_some() {
        secondary |= TRANSLUCENCY;
    }
    if fields.fade_target.is_some() {
        secondary |= FADE_TARGET;
    }
    if fields.type_id.is_some() {
        secondary |= TYPE;
    }
    if secondary != 0 {
        primary |= MORE;
    }
    (primary, secondary)
}

fn write_momentum(value: Fixed, fast: bool, writer: &mut ByteWriter) {
    if fast {
        writer.write_i16(value.to_10_6());
    } else {
        writer.write_i16(value.to_8_8());
    }
}

fn write_object(fields: &ObjectFields, writer: &mut ByteWriter) {
    let (primary, secondary) = object_flags(fields);
    writer.write_u16(primary);
    if primary & object::MORE != 0 {
        writer.write_u8(secondary);
    }
    let fast = secondary & object::FAST_MOM != 0;

    if let Some(x) = fields.origin_x {
        writer.write_position(x);
    }
    if let Some(y) = fields.origin_y {
        writer.write_position(y);
    }
    if let Some(ZPosition::At(z)) = fields.origin_z {
        writer.write_position(z);
    }
    for mom in [fields.mom_x, fields.mom_y, fields.mom_z].into_iter().flatten() {
        write_momentum(mom, fast, writer);
    }
    if let Some(angle) = fields.angle {
        writer.write_angle(angle);
    }
    if let Some(selector) = fields.selector {
        writer.write_u16(selector);
    }
    if let Some(state) = fields.state {
        writer.write_u16(state);
    }
    if let Some(radius) = fields.radius {
        writer.write_u8(radius);
    }
    if let Some(height) = fields.height {
        writer.write_u8(height);
    }
    if let Some(flags) = fields.flags {
        writer.write_u32(flags);
    }
    if let Some(clip) = fields.floor_clip {
        writer.write_i16(clip.to_8_8());
    }
    if let Some(translucency) = fields.translucency {
        writer.write_u8(translucency);
    }
    if let Some(fade) = fields.fade_target {
        writer.write_u8(fade);
    }
    if let Some(type_id) = fields.type_id {
        writer.write_u16(type_id);
    }
}

fn write_player(fields: &PlayerFields, writer: &mut ByteWriter) {
    use player::*;

    let mut flags = 0u16;
    for (present, bit) in [
        (fields.mobj.is_some(), MOBJ),
        (fields.forward_move.is_some(), FORWARD_MOVE),
        (fields.side_move.is_some(), SIDE_MOVE),
        (fields.turn_delta.is_some(), TURN_DELTA),
        (fields.friction.is_some(), FRICTION),
        (fields.extra_light.is_some(), EXTRA_LIGHT),
        (fields.fixed_colormap.is_some(), FIXED_COLORMAP),
        (fields.filter.is_some(), FILTER),
        (fields.cl_yaw.is_some(), CL_YAW),
        (fields.cl_pitch.is_some(), CL_PITCH),
        (fields.psprites.is_some(), PSPRITES),
    ] {
        if present {
            flags |= bit;
        }
    }
    writer.write_u16(flags);

    if let Some(mobj) = fields.mobj {
        writer.write_u16(mobj);
    }
    if let Some(forward) = fields.forward_move {
        writer.write_i8(forward);
    }
    if let Some(side) = fields.side_move {
        writer.write_i8(side);
    }
    if let Some(turn) = fields.turn_delta {
        writer.write_angle(turn);
    }
    if let Some(friction) = fields.friction {
        writer.write_i16(friction.to_8_8());
    }
    if let Some(light) = fields.extra_light {
        writer.write_u8(light);
    }
    if let Some(colormap) = fields.fixed_colormap {
        writer.write_u8(colormap);
    }
    if let Some(filter) = fields.filter {
        writer.write_u32(filter);
    }
    if let Some(yaw) = fields.cl_yaw {
        writer.write_angle(yaw);
    }
    if let Some(pitch) = fields.cl_pitch {
        writer.write_i16(pitch);
    }
    if let Some(psprites) = fields.psprites {
        for psp in psprites {
            writer.write_u16(psp.state);
            writer.write_u8(psp.light);
            writer.write_u8(psp.alpha);
            writer.write_i16(psp.offset_x);
            writer.write_i16(psp.offset_y);
        }
    }
}

fn write_sector(fields: &SectorFields, writer: &mut ByteWriter) {
    use sector::*;

    let mut flags = 0u16;
    for (present, bit) in [
        (fields.floor_material.is_some(), FLOOR_MATERIAL),
        (fields.ceiling_material.is_some(), CEILING_MATERIAL),
        (fields.light.is_some(), LIGHT),
        (fields.color.is_some(), COLOR),
        (fields.floor_height.is_some(), FLOOR_HEIGHT),
        (fields.ceiling_height.is_some(), CEILING_HEIGHT),
        (fields.floor_target.is_some(), FLOOR_TARGET),
        (fields.floor_speed.is_some(), FLOOR_SPEED),
        (fields.ceiling_target.is_some(), CEILING_TARGET),
        (fields.ceiling_speed.is_some(), CEILING_SPEED),
    ] {
        if present {
            flags |= bit;
        }
    }
    writer.write_u16(flags);

    if let Some(material) = fields.floor_material {
        writer.write_u16(material);
    }
    if let Some(material) = fields.ceiling_material {
        writer.write_u16(material);
    }
    if let Some(light) = fields.light {
        writer.write_u8(light);
    }
    if let Some(color) = fields.color {
        writer.write_bytes(&color);
    }
    if let Some(height) = fields.floor_height {
        writer.write_position(height);
    }
    if let Some(height) = fields.ceiling_height {
        writer.write_position(height);
    }
    if let Some(target) = fields.floor_target {
        writer.write_position(target);
    }
    if let Some(speed) = fields.floor_speed {
        writer.write_i16(speed.to_8_8());
    }
    if let Some(target) = fields.ceiling_target {
        writer.write_position(target);
    }
    if let Some(speed) = fields.ceiling_speed {
        writer.write_i16(speed.to_8_8());
    }
}

fn write_side(fields: &SideFields, writer: &mut ByteWriter) {
    use side::*;

    let mut flags = 0u8;
    for (present, bit) in [
        (fields.top_material.is_some(), TOP_MATERIAL),
        (fields.middle_material.is_some(), MIDDLE_MATERIAL),
        (fields.bottom_material.is_some(), BOTTOM_MATERIAL),
        (fields.line_flags.is_some(), LINE_FLAGS),
        (fields.top_color.is_some(), TOP_COLOR),
        (fields.middle_color.is_some(), MIDDLE_COLOR),
        (fields.bottom_color.is_some(), BOTTOM_COLOR),
        (fields.blend_mode.is_some(), BLENDMODE),
    ] {
        if present {
            flags |= bit;
        }
    }
    writer.write_u8(flags);

    for material in [
        fields.top_material,
        fields.middle_material,
        fields.bottom_material,
    ]
    .into_iter()
    .flatten()
    {
        writer.write_u16(material);
    }
    if let Some(line_flags) = fields.line_flags {
        writer.write_u8(line_flags);
    }
    if let Some(color) = fields.top_color {
        writer.write_bytes(&color);
    }
    if let Some(color) = fields.middle_color {
        writer.write_bytes(&color);
    }
    if let Some(color) = fields.bottom_color {
        writer.write_bytes(&color);
    }
    if let Some(blend) = fields.blend_mode {
        writer.write_u8(blend);
    }
}

fn write_polyobj(fields: &PolyobjFields, writer: &mut ByteWriter) {
    use polyobj::*;

    let mut flags = 0u8;
    for (present, bit) in [
        (fields.dest_x.is_some(), DEST_X),
        (fields.dest_y.is_some(), DEST_Y),
        (fields.speed.is_some(), SPEED),
        (fields.dest_angle.is_some(), DEST_ANGLE),
        (fields.angle_speed.is_some(), ANGLE_SPEED),
    ] {
        if present {
            flags |= bit;
        }
    }
    writer.write_u8(flags);

    if let Some(x) = fields.dest_x {
        writer.write_position(x);
    }
    if let Some(y) = fields.dest_y {
        writer.write_position(y);
    }
    if let Some(speed) = fields.speed {
        writer.write_i16(speed.to_8_8());
    }
    if let Some(angle) = fields.dest_angle {
        writer.write_angle(angle);
    }
    if let Some(speed) = fields.angle_speed {
        writer.write_angle(speed);
    }
}

fn write_sound(emitter: SoundEmitter, fields: &SoundFields, writer: &mut ByteWriter) {
    use sound::*;

    // Only world sounds are positioned by the delta itself.
    let origin = match emitter {
        SoundEmitter::World => fields.origin,
        _ => None,
    };

    let mut flags = 0u8;
    if fields.sound_id.is_some() {
        flags |= SOUND_ID;
    }
    if fields.volume.is_some() {
        flags |= VOLUME;
    }
    if origin.is_some() {
        flags |= ORIGIN;
    }
    if fields.stop {
        flags |= STOP;
    }
    if fields.repeat {
        flags |= REPEAT;
    }
    writer.write_u8(flags);

    if let Some(id) = fields.sound_id {
        writer.write_u16(id);
    }
    if let Some(volume) = fields.volume {
        writer.write_u8(volume);
    }
    if let Some(origin) = origin {
        for coordinate in origin {
            writer.write_position(coordinate);
        }
    }
}

/// Rejects a flag word announcing fields this kind does not have.
fn check_flags(flags: u32, defined: u32) -> Result<u32, ProtocolError> {
    if flags & !defined != 0 {
        return Err(ProtocolError::UnknownFlags(flags & !defined));
    }
    Ok(flags)
}

/// Reads payload fields strictly in the order the flags announce them.
struct FieldReader<'r, 'a> {
    reader: &'r mut ByteReader<'a>,
    flags: u32,
}

impl<'r, 'a> FieldReader<'r, 'a> {
    fn new(reader: &'r mut ByteReader<'a>, flags: u32) -> Self {
        Self { reader, flags }
    }

    fn present(&self, bit: u32) -> bool {
        self.flags & bit != 0
    }

    /// Reads a field the flags must have announced. Asking for one they did
    /// not is a codec bug.
    fn announced<T>(
        &mut self,
        bit: u32,
        read: impl FnOnce(&mut ByteReader<'a>) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        debug_assert!(
            self.present(bit),
            "decoding field 0x{bit:x} not present in flags 0x{:x}",
            self.flags
        );
        read(&mut *self.reader)
    }

    fn field<T>(
        &mut self,
        bit: u32,
        read: impl FnOnce(&mut ByteReader<'a>) -> Result<T, ProtocolError>,
    ) -> Result<Option<T>, ProtocolError> {
        if !self.present(bit) {
            return Ok(None);
        }
        self.announced(bit, read).map(Some)
    }
}

/// Reads one delta, including its type tag and optional RESENT header.
pub fn decode(reader: &mut ByteReader) -> Result<DecodedDelta, ProtocolError> {
    let tag = reader.read_u8()?;
    let kind = DeltaKind::from_tag(tag & TAG_KIND_MASK).ok_or(ProtocolError::UnknownTypeTag(tag))?;
    let is_null = tag & TAG_NULL != 0;
    if is_null && kind.is_sound() {
        return Err(ProtocolError::UnknownTypeTag(tag));
    }

    let resent = if tag & TAG_RESENT != 0 {
        Some(Resent {
            set: reader.read_u8()?,
            tag: reader.read_u8()?,
        })
    } else {
        None
    };

    let delta = if is_null {
        Delta::Null {
            kind,
            id: reader.read_u16()?,
        }
    } else {
        decode_kind(reader, kind)?
    };

    Ok(DecodedDelta { delta, resent })
}

/// Reads the target id, flags and payload of a non-null delta of `kind`
/// (everything after the type tag and RESENT header).
pub fn decode_kind(reader: &mut ByteReader, kind: DeltaKind) -> Result<Delta, ProtocolError> {
    let id = reader.read_u16()?;
    let delta = match kind {
        DeltaKind::Object => Delta::Object {
            id,
            fields: read_object(reader)?,
        },
        DeltaKind::Player => Delta::Player {
            id,
            fields: read_player(reader)?,
        },
        DeltaKind::Sector => Delta::Sector {
            id,
            fields: read_sector(reader)?,
        },
        DeltaKind::Side => Delta::Side {
            id,
            fields: read_side(reader)?,
        },
        DeltaKind::Polyobj => Delta::Polyobj {
            id,
            fields: read_polyobj(reader)?,
        },
        DeltaKind::Sound(emitter) => Delta::Sound {
            emitter,
            id,
            fields: read_sound(emitter, reader)?,
        },
    };

    if delta.is_empty() {
        return Err(ProtocolError::EmptyDelta);
    }
    Ok(delta)
}

fn read_momentum(reader: &mut ByteReader, fast: bool) -> Result<Fixed, ProtocolError> {
    let raw = reader.read_i16()?;
    Ok(if fast {
        Fixed::from_10_6(raw)
    } else {
        Fixed::from_8_8(raw)
    })
}

// Secondary object flags live in bits 16..24 of the combined flag word.
const SECONDARY_SHIFT: u32 = 16;

fn read_object(reader: &mut ByteReader) -> Result<ObjectFields, ProtocolError> {
    use object::*;

    let primary = check_flags(reader.read_u16()? as u32, PRIMARY_DEFINED as u32)?;
    let secondary = if primary & MORE as u32 != 0 {
        check_flags(reader.read_u8()? as u32, SECONDARY_DEFINED as u32)?
    } else {
        0
    };
    let mut fr = FieldReader::new(reader, primary | secondary << SECONDARY_SHIFT);
    let second = |bit: u8| (bit as u32) << SECONDARY_SHIFT;
    let fast = fr.present(second(FAST_MOM));

    let origin_x = fr.field(ORIGIN_X as u32, |r| r.read_position())?;
    let origin_y = fr.field(ORIGIN_Y as u32, |r| r.read_position())?;
    let mut origin_z = fr
        .field(ORIGIN_Z as u32, |r| r.read_position())?
        .map(ZPosition::At);
    if fr.present(second(ON_FLOOR)) {
        origin_z = Some(ZPosition::OnFloor);
    }

    Ok(ObjectFields {
        origin_x,
        origin_y,
        origin_z,
        mom_x: fr.field(MOM_X as u32, |r| read_momentum(r, fast))?,
        mom_y: fr.field(MOM_Y as u32, |r| read_momentum(r, fast))?,
        mom_z: fr.field(MOM_Z as u32, |r| read_momentum(r, fast))?,
        angle: fr.field(ANGLE as u32, |r| r.read_angle())?,
        selector: fr.field(SELECTOR as u32, |r| r.read_u16())?,
        state: fr.field(STATE as u32, |r| r.read_u16())?,
        radius: fr.field(RADIUS as u32, |r| r.read_u8())?,
        height: fr.field(HEIGHT as u32, |r| r.read_u8())?,
        flags: fr.field(FLAGS as u32, |r| r.read_u32())?,
        floor_clip: fr.field(FLOOR_CLIP as u32, |r| r.read_i16().map(Fixed::from_8_8))?,
        translucency: fr.field(second(TRANSLUCENCY), |r| r.read_u8())?,
        fade_target: fr.field(second(FADE_TARGET), |r| r.read_u8())?,
        type_id: fr.field(second(TYPE), |r| r.read_u16())?,
    })
}

fn read_psprites(reader: &mut ByteReader) -> Result<[Psprite; 2], ProtocolError> {
    let mut psprites = [Psprite::default(); 2];
    for psp in psprites.iter_mut() {
        *psp = Psprite {
            state: reader.read_u16()?,
            light: reader.read_u8()?,
            alpha: reader.read_u8()?,
            offset_x: reader.read_i16()?,
            offset_y: reader.read_i16()?,
        };
    }
    Ok(psprites)
}

fn read_player(reader: &mut ByteReader) -> Result<PlayerFields, ProtocolError> {
    use player::*;

    let flags = check_flags(reader.read_u16()? as u32, DEFINED as u32)?;
    let mut fr = FieldReader::new(reader, flags);
    Ok(PlayerFields {
        mobj: fr.field(MOBJ as u32, |r| r.read_u16())?,
        forward_move: fr.field(FORWARD_MOVE as u32, |r| r.read_i8())?,
        side_move: fr.field(SIDE_MOVE as u32, |r| r.read_i8())?,
        turn_delta: fr.field(TURN_DELTA as u32, |r| r.read_angle())?,
        friction: fr.field(FRICTION as u32, |r| r.read_i16().map(Fixed::from_8_8))?,
        extra_light: fr.field(EXTRA_LIGHT as u32, |r| r.read_u8())?,
        fixed_colormap: fr.field(FIXED_COLORMAP as u32, |r| r.read_u8())?,
        filter: fr.field(FILTER as u32, |r| r.read_u32())?,
        cl_yaw: fr.field(CL_YAW as u32, |r| r.read_angle())?,
        cl_pitch: fr.field(CL_PITCH as u32, |r| r.read_i16())?,
        psprites: fr.field(PSPRITES as u32, read_psprites)?,
    })
}

fn read_rgb(reader: &mut ByteReader) -> Result<[u8; 3], ProtocolError> {
    let bytes = reader.read_bytes(3)?;
    Ok([bytes[0], bytes[1], bytes[2]])
}

fn read_rgba(reader: &mut ByteReader) -> Result<[u8; 4], ProtocolError> {
    let bytes = reader.read_bytes(4)?;
    Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_sector(reader: &mut ByteReader) -> Result<SectorFields, ProtocolError> {
    use sector::*;

    let flags = check_flags(reader.read_u16()? as u32, DEFINED as u32)?;
    let mut fr = FieldReader::new(reader, flags);
    Ok(SectorFields {
        floor_material: fr.field(FLOOR_MATERIAL as u32, |r| r.read_u16())?,
        ceiling_material: fr.field(CEILING_MATERIAL as u32, |r| r.read_u16())?,
        light: fr.field(LIGHT as u32, |r| r.read_u8())?,
        color: fr.field(COLOR as u32, read_rgb)?,
        floor_height: fr.field(FLOOR_HEIGHT as u32, |r| r.read_position())?,
        ceiling_height: fr.field(CEILING_HEIGHT as u32, |r| r.read_position())?,
        floor_target: fr.field(FLOOR_TARGET as u32, |r| r.read_position())?,
        floor_speed: fr.field(FLOOR_SPEED as u32, |r| r.read_i16().map(Fixed::from_8_8))?,
        ceiling_target: fr.field(CEILING_TARGET as u32, |r| r.read_position())?,
        ceiling_speed: fr.field(CEILING_SPEED as u32, |r| r.read_i16().map(Fixed::from_8_8))?,
    })
}

fn read_side(reader: &mut ByteReader) -> Result<SideFields, ProtocolError> {
    use side::*;

    let flags = reader.read_u8()? as u32;
    let mut fr = FieldReader::new(reader, flags);
    Ok(SideFields {
        top_material: fr.field(TOP_MATERIAL as u32, |r| r.read_u16())?,
        middle_material: fr.field(MIDDLE_MATERIAL as u32, |r| r.read_u16())?,
        bottom_material: fr.field(BOTTOM_MATERIAL as u32, |r| r.read_u16())?,
        line_flags: fr.field(LINE_FLAGS as u32, |r| r.read_u8())?,
        top_color: fr.field(TOP_COLOR as u32, read_rgb)?,
        middle_color: fr.field(MIDDLE_COLOR as u32, read_rgba)?,
        bottom_color: fr.field(BOTTOM_COLOR as u32, read_rgb)?,
        blend_mode: fr.field(BLENDMODE as u32, |r| r.read_u8())?,
    })
}

fn read_polyobj(reader: &mut ByteReader) -> Result<PolyobjFields, ProtocolError> {
    use polyobj::*;

    let flags = check_flags(reader.read_u8()? as u32, DEFINED as u32)?;
    let mut fr = FieldReader::new(reader, flags);
    Ok(PolyobjFields {
        dest_x: fr.field(DEST_X as u32, |r| r.read_position())?,
        dest_y: fr.field(DEST_Y as u32, |r| r.read_position())?,
        speed: fr.field(SPEED as u32, |r| r.read_i16().map(Fixed::from_8_8))?,
        dest_angle: fr.field(DEST_ANGLE as u32, |r| r.read_angle())?,
        angle_speed: fr.field(ANGLE_SPEED as u32, |r| r.read_angle())?,
    })
}

fn read_sound(emitter: SoundEmitter, reader: &mut ByteReader) -> Result<SoundFields, ProtocolError> {
    use sound::*;

    let flags = check_flags(reader.read_u8()? as u32, DEFINED as u32)?;
    let mut fr = FieldReader::new(reader, flags);
    let sound_id = fr.field(SOUND_ID as u32, |r| r.read_u16())?;
    let volume = fr.field(VOLUME as u32, |r| r.read_u8())?;
    let origin = fr.field(ORIGIN as u32, |r| {
        Ok([r.read_position()?, r.read_position()?, r.read_position()?])
    })?;
    if origin.is_some() && emitter != SoundEmitter::World {
        return Err(ProtocolError::UnknownTypeTag(DeltaKind::Sound(emitter).tag()));
    }

    Ok(SoundFields {
        sound_id,
        volume,
        origin,
        stop: fr.present(STOP as u32),
        repeat: fr.present(REPEAT as u32),
    })
}
