//! Kitty APC command parser: turns a decoded `<kv_list>[;<data>]`
//! payload into a typed [`Command`].
//!
//! The surrounding VT parser owns base64 decoding and the `ESC _ G … ESC \`
//! framing; this module only ever sees the bytes between `G` and the final
//! `ESC \`, fed one byte at a time so a caller streaming an APC string
//! doesn't need to buffer the whole payload first.

use smallvec::SmallVec;
use std::collections::HashMap;

/// A value attached to a single-letter key: either one printable ASCII
/// character or a (possibly signed, for `z`) decimal integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldValue {
    Char(u8),
    Int(i64),
}

impl FieldValue {
    fn as_u32(self) -> u32 {
        match self {
            FieldValue::Char(c) => c as u32,
            FieldValue::Int(v) => v.max(0) as u32,
        }
    }

    fn as_i32(self) -> i32 {
        match self {
            FieldValue::Char(c) => c as i32,
            FieldValue::Int(v) => v as i32,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            FieldValue::Char(c) => c,
            FieldValue::Int(v) => v as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Key,
    Value,
    IgnoreKey,
    IgnoreValue,
    Data,
}

/// Parse failure. Maps to the wire `EINVAL` response kind; terminal state is
/// never touched on this path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unrecognized action key")]
    UnknownAction,
    #[error("unrecognized delete variant")]
    UnknownDeleteVariant,
    #[error("unrecognized medium")]
    UnknownMedium,
    #[error("unrecognized pixel format")]
    UnknownFormat,
    #[error("unrecognized compression")]
    UnknownCompression,
}

/// Byte-fed state machine assembling one APC payload. States mirror the
/// `{control_key, control_value, data}` triple from the protocol grammar, plus the
/// "ignore" variants entered on overflow (a key longer than one byte, or a
/// value longer than 10 bytes).
#[derive(Debug, Default)]
pub struct CommandParser {
    state_with_data: Option<(State, ParserCore)>,
}

#[derive(Debug, Default, Clone)]
struct ParserCore {
    cur_key: Option<u8>,
    cur_value: SmallVec<[u8; 16]>,
    fields: HashMap<u8, FieldValue>,
    data: Vec<u8>,
}

impl ParserCore {
    fn commit_field(&mut self) {
        let Some(key) = self.cur_key.take() else {
            self.cur_value.clear();
            return;
        };
        let value = if self.cur_value.len() == 1 && !self.cur_value[0].is_ascii_digit() {
            FieldValue::Char(self.cur_value[0])
        } else {
            let s = std::str::from_utf8(&self.cur_value).unwrap_or("0");
            FieldValue::Int(s.parse::<i64>().unwrap_or(0))
        };
        self.fields.insert(key, value);
        self.cur_value.clear();
    }
}

impl CommandParser {
    pub fn new() -> Self {
        Self {
            state_with_data: Some((State::Key, ParserCore::default())),
        }
    }

    /// Feed a single payload byte.
    pub fn feed(&mut self, byte: u8) {
        let Some((state, core)) = self.state_with_data.as_mut() else {
            return;
        };
        match *state {
            State::Key => match byte {
                b',' => {}
                b';' => *state = State::Data,
                b'=' => {
                    if core.cur_key.is_none() {
                        *state = State::IgnoreValue;
                    } else {
                        *state = State::Value;
                    }
                }
                _ => {
                    if core.cur_key.is_none() {
                        core.cur_key = Some(byte);
                    } else {
                        // Second byte of the key before '=': overflow.
                        core.cur_key = None;
                        *state = State::IgnoreKey;
                    }
                }
            },
            State::Value => match byte {
                b',' => {
                    core.commit_field();
                    *state = State::Key;
                }
                b';' => {
                    core.commit_field();
                    *state = State::Data;
                }
                _ => {
                    if core.cur_value.len() >= 10 {
                        core.cur_value.clear();
                        core.cur_key = None;
                        *state = State::IgnoreValue;
                    } else {
                        core.cur_value.push(byte);
                    }
                }
            },
            State::IgnoreKey => match byte {
                b',' => *state = State::Key,
                b';' => *state = State::Data,
                _ => {}
            },
            State::IgnoreValue => match byte {
                b',' => {
                    core.cur_key = None;
                    *state = State::Key;
                }
                b';' => {
                    core.cur_key = None;
                    *state = State::Data;
                }
                _ => {}
            },
            State::Data => core.data.push(byte),
        }
    }

    pub fn feed_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.feed(b);
        }
    }

    /// Finish parsing and resolve the accumulated fields into a typed
    /// [`Command`]. Any field pending at end-of-input (no trailing `;`
    /// payload, i.e. a kv-list with no data section) is committed first.
    pub fn finish(mut self) -> Result<Command, CommandError> {
        let (state, mut core) = self.state_with_data.take().expect("parser used once");
        if matches!(state, State::Value) {
            core.commit_field();
        }
        Command::resolve(core.fields, core.data)
    }

    /// Parse a complete payload in one call; convenience wrapper over the
    /// byte-fed interface for callers that already have the whole buffer.
    pub fn parse(payload: &[u8]) -> Result<Command, CommandError> {
        let mut p = CommandParser::new();
        p.feed_slice(payload);
        p.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quiet {
    #[default]
    No,
    Ok,
    Failures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Rgb,
    Rgba,
    Png,
}

impl Format {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Format::Rgb => 3,
            Format::Rgba | Format::Png => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Medium {
    #[default]
    Direct,
    File,
    TemporaryFile,
    SharedMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    ZlibDeflate,
}

/// The shared field set carried by `query`/`transmit`/`transmit_and_display`/
/// `display` (and the animation actions, which reuse the same wire fields).
/// Real Kitty clients send the same key set for all of these; splitting them
/// into per-action structs would just duplicate every field.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub image_id: u32,
    pub image_number: u32,
    pub placement_id: u32,
    pub format: Format,
    pub medium: Medium,
    pub compression: Compression,
    pub width: u32,
    pub height: u32,
    pub size: u32,
    pub offset: u32,
    pub more: bool,
    pub quiet: Quiet,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub cols: u32,
    pub rows: u32,
    pub z: i32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteVariant {
    All,
    Id { image_id: u32, placement_id: u32 },
    Newest { image_number: u32, placement_id: u32 },
    IntersectCursor,
    IntersectCell { x: u32, y: u32 },
    IntersectCellZ { x: u32, y: u32, z: i32 },
    Column { x: u32 },
    Row { y: u32 },
    Z { z: i32 },
    AnimationFrames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteSpec {
    pub variant: DeleteVariant,
    /// Uppercase letter in the `d` key: also delete the image if it has no
    /// placements left.
    pub delete_images: bool,
}

#[derive(Debug, Clone)]
pub enum Command {
    Query(Payload),
    Transmit(Payload),
    TransmitAndDisplay(Payload),
    Display(Payload),
    Delete(DeleteSpec),
    TransmitAnimationFrame(Payload),
    ControlAnimation(Payload),
    ComposeAnimation(Payload),
}

impl Command {
    fn resolve(fields: HashMap<u8, FieldValue>, data: Vec<u8>) -> Result<Command, CommandError> {
        let get_u32 = |k: u8| fields.get(&k).map(|v| v.as_u32()).unwrap_or(0);
        let get_i32 = |k: u8| fields.get(&k).map(|v| v.as_i32()).unwrap_or(0);
        let get_byte = |k: u8, default: u8| fields.get(&k).map(|v| v.as_byte()).unwrap_or(default);

        let action = get_byte(b'a', b't');
        let quiet = match get_u32(b'q') {
            0 => Quiet::No,
            1 => Quiet::Ok,
            _ => Quiet::Failures,
        };

        if action == b'd' {
            let variant_key = get_byte(b'd', b'a');
            let delete_images = variant_key.is_ascii_uppercase();
            let lower = variant_key.to_ascii_lowercase();
            let variant = match lower {
                b'a' => DeleteVariant::All,
                b'i' => DeleteVariant::Id {
                    image_id: get_u32(b'i'),
                    placement_id: get_u32(b'p'),
                },
                b'n' => DeleteVariant::Newest {
                    image_number: get_u32(b'I'),
                    placement_id: get_u32(b'p'),
                },
                b'c' => DeleteVariant::IntersectCursor,
                b'p' => DeleteVariant::IntersectCell {
                    x: get_u32(b'x'),
                    y: get_u32(b'y'),
                },
                b'q' => DeleteVariant::IntersectCellZ {
                    x: get_u32(b'x'),
                    y: get_u32(b'y'),
                    z: get_i32(b'z'),
                },
                b'x' => DeleteVariant::Column { x: get_u32(b'x') },
                b'y' => DeleteVariant::Row { y: get_u32(b'y') },
                b'z' => DeleteVariant::Z { z: get_i32(b'z') },
                b'f' => DeleteVariant::AnimationFrames,
                _ => return Err(CommandError::UnknownDeleteVariant),
            };
            return Ok(Command::Delete(DeleteSpec {
                variant,
                delete_images,
            }));
        }

        let format = match get_u32(b'f') {
            0 | 24 => Format::Rgb,
            32 => Format::Rgba,
            100 => Format::Png,
            _ => return Err(CommandError::UnknownFormat),
        };
        let medium = match get_byte(b't', b'd') {
            b'd' => Medium::Direct,
            b'f' => Medium::File,
            b't' => Medium::TemporaryFile,
            b's' => Medium::SharedMemory,
            _ => return Err(CommandError::UnknownMedium),
        };
        let compression = match get_byte(b'o', 0) {
            0 => Compression::None,
            b'z' => Compression::ZlibDeflate,
            _ => return Err(CommandError::UnknownCompression),
        };

        let payload = Payload {
            image_id: get_u32(b'i'),
            image_number: get_u32(b'I'),
            placement_id: get_u32(b'p'),
            format,
            medium,
            compression,
            width: get_u32(b's'),
            height: get_u32(b'v'),
            size: get_u32(b'S'),
            offset: get_u32(b'O'),
            more: get_u32(b'm') != 0,
            quiet,
            x: get_u32(b'x'),
            y: get_u32(b'y'),
            w: get_u32(b'w'),
            h: get_u32(b'h'),
            x_offset: get_u32(b'X'),
            y_offset: get_u32(b'Y'),
            cols: get_u32(b'c'),
            rows: get_u32(b'r'),
            z: get_i32(b'z'),
            data,
        };

        Ok(match action {
            b'q' => Command::Query(payload),
            b't' => Command::Transmit(payload),
            b'T' => Command::TransmitAndDisplay(payload),
            b'p' => Command::Display(payload),
            b'f' => Command::TransmitAnimationFrame(payload),
            b'a' => Command::ControlAnimation(payload),
            b'c' => Command::ComposeAnimation(payload),
            _ => return Err(CommandError::UnknownAction),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_transmit_with_data() {
        let cmd = CommandParser::parse(b"i=31,s=1,v=1,a=t,t=d,f=24;AAAA").unwrap();
        match cmd {
            Command::Transmit(p) => {
                assert_eq!(p.image_id, 31);
                assert_eq!(p.width, 1);
                assert_eq!(p.height, 1);
                assert_eq!(p.medium, Medium::Direct);
                assert_eq!(p.format, Format::Rgb);
                assert_eq!(p.data, b"AAAA");
            }
            other => panic!("expected Transmit, got {other:?}"),
        }
    }

    #[test]
    fn defaults_action_to_transmit() {
        let cmd = CommandParser::parse(b"i=31,s=1,v=1,t=d,f=24;AAAA").unwrap();
        assert!(matches!(cmd, Command::Transmit(_)));
    }

    #[test]
    fn query_with_no_data_section() {
        let cmd = CommandParser::parse(b"i=31,s=1,v=1,a=q,t=d,f=24").unwrap();
        match cmd {
            Command::Query(p) => {
                assert_eq!(p.image_id, 31);
                assert!(p.data.is_empty());
            }
            other => panic!("expected Query, got {other:?}"),
        }
    }

    #[test]
    fn byte_fed_matches_one_shot() {
        let payload = b"i=7,a=T,t=f,f=100,p=2;/tmp/x.png";
        let mut p = CommandParser::new();
        for &b in payload {
            p.feed(b);
        }
        let fed = p.finish().unwrap();
        let oneshot = CommandParser::parse(payload).unwrap();
        match (fed, oneshot) {
            (Command::TransmitAndDisplay(a), Command::TransmitAndDisplay(b)) => {
                assert_eq!(a.image_id, b.image_id);
                assert_eq!(a.data, b.data);
            }
            _ => panic!("mismatched variants"),
        }
    }

    #[test]
    fn overlong_key_is_ignored_not_fatal() {
        // "ab=1" -- key overflow, field dropped, parsing continues.
        let cmd = CommandParser::parse(b"ab=1,i=5,a=q,t=d,f=24").unwrap();
        match cmd {
            Command::Query(p) => assert_eq!(p.image_id, 5),
            other => panic!("expected Query, got {other:?}"),
        }
    }

    #[test]
    fn overlong_value_is_ignored_not_fatal() {
        let cmd = CommandParser::parse(b"i=12345678901,p=9,a=q,t=d,f=24").unwrap();
        match cmd {
            Command::Query(p) => {
                assert_eq!(p.image_id, 0); // dropped: >10 digits
                assert_eq!(p.placement_id, 9);
            }
            other => panic!("expected Query, got {other:?}"),
        }
    }

    #[test]
    fn delete_uppercase_sets_delete_images() {
        let cmd = CommandParser::parse(b"a=d,d=I,i=3,p=0").unwrap();
        match cmd {
            Command::Delete(spec) => {
                assert!(spec.delete_images);
                assert_eq!(
                    spec.variant,
                    DeleteVariant::Id {
                        image_id: 3,
                        placement_id: 0
                    }
                );
            }
            other => panic!("expected Delete, got {other:?}"),
        }
    }

    #[test]
    fn delete_default_variant_is_all() {
        let cmd = CommandParser::parse(b"a=d").unwrap();
        match cmd {
            Command::Delete(spec) => {
                assert!(!spec.delete_images);
                assert_eq!(spec.variant, DeleteVariant::All);
            }
            other => panic!("expected Delete, got {other:?}"),
        }
    }

    #[test]
    fn signed_z_field_round_trips_negative() {
        let cmd = CommandParser::parse(b"a=d,d=z,z=-5").unwrap();
        match cmd {
            Command::Delete(spec) => {
                assert_eq!(spec.variant, DeleteVariant::Z { z: -5 });
            }
            other => panic!("expected Delete, got {other:?}"),
        }
    }

    #[test]
    fn unknown_action_is_an_error() {
        let err = CommandParser::parse(b"a=Z").unwrap_err();
        assert_eq!(err, CommandError::UnknownAction);
    }
}
