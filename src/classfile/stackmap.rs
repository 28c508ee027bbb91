//! `StackMapTable` frames.
//!
//! Frames are held with the label of the instruction they describe rather than their
//! delta-encoded offset. On output the deltas are recomputed from the final layout and
//! each frame is written in the most compact form its kind allows.

use std::collections::HashMap;

use crate::{
    assembly::Label,
    file::{io::write_be, parser::Parser},
    Error::LimitExceeded,
    Result,
};

/// A `verification_type_info` item.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// Instance of the `CONSTANT_Class` at the given index
    Object(u16),
    /// Result of the `new` instruction at the given label
    Uninitialized(Label),
}

impl VerificationType {
    fn parse(parser: &mut Parser) -> Result<Self> {
        Ok(match parser.read_be::<u8>()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(parser.read_be::<u16>()?),
            8 => VerificationType::Uninitialized(Label(u32::from(parser.read_be::<u16>()?))),
            tag => return Err(malformed_error!("Unknown verification type tag {}", tag)),
        })
    }

    fn write(&self, out: &mut Vec<u8>, labels: &HashMap<Label, u32>) -> Result<()> {
        match self {
            VerificationType::Top => write_be(out, 0_u8),
            VerificationType::Integer => write_be(out, 1_u8),
            VerificationType::Float => write_be(out, 2_u8),
            VerificationType::Double => write_be(out, 3_u8),
            VerificationType::Long => write_be(out, 4_u8),
            VerificationType::Null => write_be(out, 5_u8),
            VerificationType::UninitializedThis => write_be(out, 6_u8),
            VerificationType::Object(class) => {
                write_be(out, 7_u8);
                write_be(out, *class);
            }
            VerificationType::Uninitialized(label) => {
                write_be(out, 8_u8);
                write_be(out, offset16(labels, *label)?);
            }
        }
        Ok(())
    }
}

/// The shape of a stack map frame relative to the previous one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Same locals, empty stack
    Same,
    /// Same locals, one stack item
    SameLocals1StackItem(VerificationType),
    /// The last `n` locals (1..=3) are absent, empty stack
    Chop(u8),
    /// Additional locals (1..=3), empty stack
    Append(Vec<VerificationType>),
    /// Complete description
    Full {
        /// All locals
        locals: Vec<VerificationType>,
        /// All stack items
        stack: Vec<VerificationType>,
    },
}

/// One frame of a `StackMapTable`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackMapFrame {
    /// Instruction the frame applies to
    pub label: Label,
    /// Frame contents
    pub kind: FrameKind,
}

impl StackMapFrame {
    /// Every label referenced by this frame, including uninitialized `new` sites.
    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        let types: &[VerificationType] = match &self.kind {
            FrameKind::SameLocals1StackItem(item) => std::slice::from_ref(item),
            FrameKind::Append(locals) => locals,
            FrameKind::Full { locals, .. } => locals,
            FrameKind::Same | FrameKind::Chop(_) => &[],
        };
        let stack: &[VerificationType] = match &self.kind {
            FrameKind::Full { stack, .. } => stack,
            _ => &[],
        };

        std::iter::once(self.label).chain(types.iter().chain(stack).filter_map(|t| match t {
            VerificationType::Uninitialized(label) => Some(*label),
            _ => None,
        }))
    }
}

/// Parses the body of a `StackMapTable` attribute into frames with absolute offsets.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for reserved frame types and
/// [`crate::Error::OutOfBounds`] if the data is truncated.
pub fn parse_frames(info: &[u8]) -> Result<Vec<StackMapFrame>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut frames = Vec::with_capacity(usize::from(count));
    let mut previous: Option<u32> = None;

    for _ in 0..count {
        let frame_type = parser.read_be::<u8>()?;
        let (delta, kind) = match frame_type {
            0..=63 => (u16::from(frame_type), FrameKind::Same),
            64..=127 => (
                u16::from(frame_type - 64),
                FrameKind::SameLocals1StackItem(VerificationType::parse(&mut parser)?),
            ),
            247 => {
                let delta = parser.read_be::<u16>()?;
                (
                    delta,
                    FrameKind::SameLocals1StackItem(VerificationType::parse(&mut parser)?),
                )
            }
            248..=250 => (parser.read_be::<u16>()?, FrameKind::Chop(251 - frame_type)),
            251 => (parser.read_be::<u16>()?, FrameKind::Same),
            252..=254 => {
                let delta = parser.read_be::<u16>()?;
                let mut locals = Vec::new();
                for _ in 0..(frame_type - 251) {
                    locals.push(VerificationType::parse(&mut parser)?);
                }
                (delta, FrameKind::Append(locals))
            }
            255 => {
                let delta = parser.read_be::<u16>()?;
                let locals = parse_types(&mut parser)?;
                let stack = parse_types(&mut parser)?;
                (delta, FrameKind::Full { locals, stack })
            }
            reserved => {
                return Err(malformed_error!(
                    "Reserved stack map frame type {}",
                    reserved
                ))
            }
        };

        let offset = match previous {
            None => u32::from(delta),
            Some(prev) => prev + u32::from(delta) + 1,
        };
        previous = Some(offset);
        frames.push(StackMapFrame {
            label: Label(offset),
            kind,
        });
    }

    Ok(frames)
}

fn parse_types(parser: &mut Parser) -> Result<Vec<VerificationType>> {
    let count = parser.read_be::<u16>()?;
    (0..count).map(|_| VerificationType::parse(parser)).collect()
}

/// Serializes frames into the body of a `StackMapTable` attribute.
///
/// Frames are ordered by their resolved offset before deltas are computed.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unresolved labels or two frames at the same
/// offset, [`crate::Error::LimitExceeded`] if an offset does not fit 16 bits.
pub fn write_frames(frames: &[StackMapFrame], labels: &HashMap<Label, u32>) -> Result<Vec<u8>> {
    let mut ordered = frames
        .iter()
        .map(|frame| Ok((offset16(labels, frame.label)?, frame)))
        .collect::<Result<Vec<_>>>()?;
    ordered.sort_by_key(|(offset, _)| *offset);

    let mut out = Vec::new();
    #[allow(clippy::cast_possible_truncation)]
    write_be(&mut out, ordered.len() as u16);

    let mut previous: Option<u16> = None;
    for (offset, frame) in ordered {
        let delta = match previous {
            None => offset,
            Some(prev) if offset > prev => offset - prev - 1,
            Some(_) => {
                return Err(malformed_error!(
                    "Two stack map frames at offset {}",
                    offset
                ))
            }
        };
        previous = Some(offset);

        match &frame.kind {
            FrameKind::Same if delta <= 63 => write_be(&mut out, delta as u8),
            FrameKind::Same => {
                write_be(&mut out, 251_u8);
                write_be(&mut out, delta);
            }
            FrameKind::SameLocals1StackItem(item) => {
                if delta <= 63 {
                    write_be(&mut out, 64 + delta as u8);
                } else {
                    write_be(&mut out, 247_u8);
                    write_be(&mut out, delta);
                }
                item.write(&mut out, labels)?;
            }
            FrameKind::Chop(count) => {
                write_be(&mut out, 251 - count);
                write_be(&mut out, delta);
            }
            FrameKind::Append(locals) => {
                #[allow(clippy::cast_possible_truncation)]
                write_be(&mut out, 251 + locals.len() as u8);
                write_be(&mut out, delta);
                for local in locals {
                    local.write(&mut out, labels)?;
                }
            }
            FrameKind::Full { locals, stack } => {
                write_be(&mut out, 255_u8);
                write_be(&mut out, delta);
                for types in [locals, stack] {
                    #[allow(clippy::cast_possible_truncation)]
                    write_be(&mut out, types.len() as u16);
                    for item in types {
                        item.write(&mut out, labels)?;
                    }
                }
            }
        }
    }

    Ok(out)
}

fn offset16(labels: &HashMap<Label, u32>, label: Label) -> Result<u16> {
    let offset = labels
        .get(&label)
        .ok_or_else(|| malformed_error!("Unresolved label {} in stack map", label))?;
    u16::try_from(*offset).map_err(|_| LimitExceeded(format!("offset {offset} exceeds 65535")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(offsets: &[u32]) -> HashMap<Label, u32> {
        offsets.iter().map(|&o| (Label(o), o)).collect()
    }

    #[test]
    fn absolute_offsets() {
        // same @5, same_locals_1 @10 (delta 4) with int, full @300 (delta 289)
        let mut info = vec![0x00, 0x03, 5, 64 + 4, 1, 255];
        info.extend_from_slice(&289_u16.to_be_bytes());
        info.extend_from_slice(&[0x00, 0x01, 7, 0x00, 0x02, 0x00, 0x00]);

        let frames = parse_frames(&info).unwrap();
        assert_eq!(frames[0].label, Label(5));
        assert_eq!(frames[1].label, Label(10));
        assert_eq!(frames[1].kind, FrameKind::SameLocals1StackItem(VerificationType::Integer));
        assert_eq!(frames[2].label, Label(300));

        let written = write_frames(&frames, &identity(&[5, 10, 300])).unwrap();
        assert_eq!(written, info);
    }

    #[test]
    fn shifted_frames_switch_to_extended_form() {
        let frames = vec![StackMapFrame {
            label: Label(10),
            kind: FrameKind::Same,
        }];
        let mut labels = HashMap::new();
        labels.insert(Label(10), 110);

        let written = write_frames(&frames, &labels).unwrap();
        assert_eq!(written, [0x00, 0x01, 251, 0x00, 110]);
    }

    #[test]
    fn uninitialized_labels_follow_layout() {
        let frames = vec![StackMapFrame {
            label: Label(8),
            kind: FrameKind::SameLocals1StackItem(VerificationType::Uninitialized(Label(2))),
        }];
        assert_eq!(frames[0].labels().collect::<Vec<_>>(), [Label(8), Label(2)]);

        let mut labels = HashMap::new();
        labels.insert(Label(8), 20);
        labels.insert(Label(2), 14);
        let written = write_frames(&frames, &labels).unwrap();
        assert_eq!(written, [0x00, 0x01, 64 + 20, 8, 0x00, 14]);
    }

    #[test]
    fn reserved_type() {
        assert!(parse_frames(&[0x00, 0x01, 128]).is_err());
    }
}
