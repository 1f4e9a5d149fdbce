/*!
This module defines the instructions executed by the VM, along with the
builders that the pattern compiler uses for emitting them.

Instruction encoding format
---------------------------

Every instruction is a fixed-width 64-bit word. The low 8 bits hold the
opcode, bits 8..24 hold the number of *additional* instruction-sized words
that follow the instruction as inline operand payload, and bits 24..48 hold
a 24-bit operand. The operand is interpreted according to the opcode: a
literal byte for `LIT`, a pair of bytes for `EITHER`, `RANGE` and
`JUMP_TABLE_RANGE`, and an absolute instruction index for `JUMP`, `FORK`,
`CHECK_HALT`, `CHECK_BRANCH`, `MATCH` and `SAVE_LABEL`. Offsets larger than
24 bits don't fit in the word and are rejected by the builders.

Two kinds of instruction carry inline payload. `BIT_VECTOR` is followed by a
256-bit byte set packed into 4 words, each word one little-endian 64-bit
limb (bit `i` of the set is bit `i % 64` of limb `i / 64`). `JUMP_TABLE` is
followed by 256 ordinary instruction slots, one per input byte value, each
of them either a `JUMP` or a `HALT`; `JUMP_TABLE_RANGE` is the same with one
slot per byte in its operand range. The VM never lands the program counter
on a payload word, it skips over payload by reading the word count.
*/

use std::fmt::{Debug, Display, Formatter};
use std::mem::size_of;

use bitvec::array::BitArray;

/// A set of byte values, one bit per possible `u8`.
pub type ByteSet = BitArray<[u64; 4]>;

/// Number of instruction-sized words occupied by an inline [`ByteSet`]
/// payload.
pub const BYTE_SET_WORDS: usize = size_of::<ByteSet>() / size_of::<Instr>();

/// Jump offsets are 24-bit; this is the first offset that doesn't fit.
pub const MAX_OFFSET: u32 = 1 << 24;

/// Operation codes for the VM instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Consumes the current byte if it is equal to the literal operand.
    Lit = 0x00,
    /// Consumes the current byte if it is equal to either operand byte.
    Either = 0x01,
    /// Consumes the current byte if it falls in the operand range, both
    /// ends inclusive.
    Range = 0x02,
    /// Consumes the current byte if it is contained in the 256-bit byte
    /// set that follows the instruction as inline payload.
    BitVector = 0x03,
    /// Consumes the current byte and lands the program counter on the
    /// payload slot indexed by it. A `Halt` slot kills the thread.
    JumpTable = 0x04,
    /// Like `JumpTable`, but with one payload slot per byte in the operand
    /// range. Bytes outside the range kill the thread.
    JumpTableRange = 0x05,
    /// Continues execution at the instruction index in the operand.
    Jump = 0x06,
    /// Spawns a new thread at the instruction index in the operand while
    /// the current thread continues at the next instruction.
    Fork = 0x07,
    /// Kills the thread if the check bit in the operand is already set for
    /// the current frame; sets it and continues otherwise. This is the
    /// deduplication primitive bounding live threads by program size.
    CheckHalt = 0x08,
    /// Same runtime behavior as `CheckHalt`. Emitted by compilers that
    /// distinguish converging branches from halting duplicates.
    CheckBranch = 0x09,
    /// Records a match for the pattern label in the operand, ending at the
    /// current offset. The thread keeps running, longer matches may follow.
    Match = 0x0A,
    /// Relabels the thread with the pattern label in the operand.
    SaveLabel = 0x0B,
    /// Kills the thread.
    Halt = 0x0C,
}

impl OpCode {
    /// Decodes an opcode from its wire value. Returns `None` for values
    /// that don't correspond to any instruction; the VM treats threads
    /// sitting on such words as dead.
    #[inline]
    pub fn from_u8(value: u8) -> Option<OpCode> {
        match value {
            0x00 => Some(OpCode::Lit),
            0x01 => Some(OpCode::Either),
            0x02 => Some(OpCode::Range),
            0x03 => Some(OpCode::BitVector),
            0x04 => Some(OpCode::JumpTable),
            0x05 => Some(OpCode::JumpTableRange),
            0x06 => Some(OpCode::Jump),
            0x07 => Some(OpCode::Fork),
            0x08 => Some(OpCode::CheckHalt),
            0x09 => Some(OpCode::CheckBranch),
            0x0A => Some(OpCode::Match),
            0x0B => Some(OpCode::SaveLabel),
            0x0C => Some(OpCode::Halt),
            _ => None,
        }
    }
}

/// A single fixed-width VM instruction word.
///
/// Payload slots that follow `BitVector` instructions are carried in this
/// same type, holding raw 64-bit limbs instead of an encoded instruction.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Instr(u64);

const WORDS_SHIFT: u32 = 8;
const OPERAND_SHIFT: u32 = 24;
const OPERAND_MASK: u64 = (MAX_OFFSET as u64) - 1;

impl Instr {
    fn encode(opcode: OpCode, words: u16, operand: u32) -> Instr {
        debug_assert!((operand as u64) <= OPERAND_MASK);
        Instr(
            opcode as u64
                | (words as u64) << WORDS_SHIFT
                | (operand as u64) << OPERAND_SHIFT,
        )
    }

    /// Creates an instruction word from its raw 64-bit representation.
    /// Used for inline payload limbs and for deserialization.
    #[inline]
    pub fn from_raw(raw: u64) -> Instr {
        Instr(raw)
    }

    /// The raw 64-bit representation of the word.
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// The decoded opcode, or `None` if the word doesn't encode a valid
    /// instruction.
    #[inline]
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.0 as u8)
    }

    /// Number of inline payload words that follow this instruction.
    #[inline]
    pub fn words(&self) -> usize {
        (self.0 >> WORDS_SHIFT) as u16 as usize
    }

    /// The 24-bit operand, used as an absolute instruction index by the
    /// jump-like opcodes and as a pattern label by `Match` and `SaveLabel`.
    #[inline]
    pub fn operand(&self) -> u32 {
        ((self.0 >> OPERAND_SHIFT) & OPERAND_MASK) as u32
    }

    /// The operand as a literal byte.
    #[inline]
    pub fn literal(&self) -> u8 {
        self.operand() as u8
    }

    /// The operand as a pair of bytes, the inclusive ends of a range for
    /// `Range` and `JumpTableRange`, or the two alternatives for `Either`.
    #[inline]
    pub fn range(&self) -> (u8, u8) {
        let operand = self.operand();
        (operand as u8, (operand >> 8) as u8)
    }

    /// Builds a `Lit` instruction matching byte `b`.
    pub fn make_lit(b: u8) -> Instr {
        Instr::encode(OpCode::Lit, 0, b as u32)
    }

    /// Builds an `Either` instruction matching byte `one` or byte `two`.
    pub fn make_either(one: u8, two: u8) -> Instr {
        Instr::encode(OpCode::Either, 0, one as u32 | (two as u32) << 8)
    }

    /// Builds a `Range` instruction matching bytes in `first..=last`.
    pub fn make_range(first: u8, last: u8) -> Instr {
        Instr::encode(OpCode::Range, 0, first as u32 | (last as u32) << 8)
    }

    /// Builds a `Jump` to the absolute instruction index `offset`.
    ///
    /// # Panics
    ///
    /// If `offset` doesn't fit in 24 bits.
    pub fn make_jump(offset: u32) -> Instr {
        assert!(
            offset < MAX_OFFSET,
            "jump offsets are 24 bit; specified offset was {}",
            offset
        );
        Instr::encode(OpCode::Jump, 0, offset)
    }

    /// Builds a `Fork` spawning a thread at the absolute instruction index
    /// `offset`.
    ///
    /// # Panics
    ///
    /// If `offset` doesn't fit in 24 bits.
    pub fn make_fork(offset: u32) -> Instr {
        assert!(
            offset < MAX_OFFSET,
            "jump offsets are 24 bit; specified offset was {}",
            offset
        );
        Instr::encode(OpCode::Fork, 0, offset)
    }

    /// Builds a `CheckHalt` gated on check-state bit `state`.
    ///
    /// # Panics
    ///
    /// If `state` doesn't fit in 24 bits.
    pub fn make_check_halt(state: u32) -> Instr {
        assert!(
            state < MAX_OFFSET,
            "check states are 24 bit; specified state was {}",
            state
        );
        Instr::encode(OpCode::CheckHalt, 0, state)
    }

    /// Builds a `CheckBranch` gated on check-state bit `state`.
    ///
    /// # Panics
    ///
    /// If `state` doesn't fit in 24 bits.
    pub fn make_check_branch(state: u32) -> Instr {
        assert!(
            state < MAX_OFFSET,
            "check states are 24 bit; specified state was {}",
            state
        );
        Instr::encode(OpCode::CheckBranch, 0, state)
    }

    /// Builds a `Match` reporting pattern `label`.
    ///
    /// # Panics
    ///
    /// If `label` doesn't fit in 24 bits.
    pub fn make_match(label: u32) -> Instr {
        assert!(
            label < MAX_OFFSET,
            "pattern labels are 24 bit; specified label was {}",
            label
        );
        Instr::encode(OpCode::Match, 0, label)
    }

    /// Builds a `SaveLabel` relabeling the thread with pattern `label`.
    /// Same encoding as `Jump`, distinct opcode.
    ///
    /// # Panics
    ///
    /// If `label` doesn't fit in 24 bits.
    pub fn make_save_label(label: u32) -> Instr {
        assert!(
            label < MAX_OFFSET,
            "pattern labels are 24 bit; specified label was {}",
            label
        );
        Instr::encode(OpCode::SaveLabel, 0, label)
    }

    /// Builds a `Halt` instruction.
    pub fn make_halt() -> Instr {
        Instr::encode(OpCode::Halt, 0, 0)
    }

    /// Builds a `BitVector` instruction matching the bytes in `set`,
    /// returning the instruction word followed by its 4 payload limbs.
    pub fn make_bit_vector(set: &ByteSet) -> Vec<Instr> {
        let mut code =
            vec![Instr::encode(OpCode::BitVector, BYTE_SET_WORDS as u16, 0)];
        code.extend(
            set.as_raw_slice().iter().map(|limb| Instr::from_raw(*limb)),
        );
        code
    }

    /// Builds a `JumpTable` instruction followed by its 256 slots, one per
    /// byte value. `Some(offset)` slots become jumps, `None` slots halts.
    ///
    /// # Panics
    ///
    /// If any target offset doesn't fit in 24 bits.
    pub fn make_jump_table(targets: &[Option<u32>; 256]) -> Vec<Instr> {
        let mut code = vec![Instr::encode(OpCode::JumpTable, 256, 0)];
        code.extend(targets.iter().map(|target| match target {
            Some(offset) => Instr::make_jump(*offset),
            None => Instr::make_halt(),
        }));
        code
    }

    /// Builds a `JumpTableRange` instruction for bytes in `first..=last`,
    /// followed by one slot per byte in the range.
    ///
    /// # Panics
    ///
    /// If `first > last`, if the number of targets doesn't match the range
    /// width, or if any target offset doesn't fit in 24 bits.
    pub fn make_jump_table_range(
        first: u8,
        last: u8,
        targets: &[Option<u32>],
    ) -> Vec<Instr> {
        assert!(first <= last);
        assert_eq!(targets.len(), last as usize - first as usize + 1);
        let mut code = vec![Instr::encode(
            OpCode::JumpTableRange,
            targets.len() as u16,
            first as u32 | (last as u32) << 8,
        )];
        code.extend(targets.iter().map(|target| match target {
            Some(offset) => Instr::make_jump(*offset),
            None => Instr::make_halt(),
        }));
        code
    }
}

/// Renders a byte as a single printable character, `.` for everything that
/// isn't printable ASCII.
pub(crate) fn gloss(b: u8) -> char {
    if b.is_ascii_graphic() || b == b' ' {
        b as char
    } else {
        '.'
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.opcode() {
            Some(OpCode::Lit) => {
                let b = self.literal();
                write!(f, "LIT {:#04x} '{}'", b, gloss(b))
            }
            Some(OpCode::Either) => {
                let (one, two) = self.range();
                write!(
                    f,
                    "EITHER {:#04x} '{}', {:#04x} '{}'",
                    one,
                    gloss(one),
                    two,
                    gloss(two)
                )
            }
            Some(OpCode::Range) => {
                let (first, last) = self.range();
                write!(
                    f,
                    "RANGE {:#04x} '{}' - {:#04x} '{}'",
                    first,
                    gloss(first),
                    last,
                    gloss(last)
                )
            }
            Some(OpCode::BitVector) => write!(f, "BIT_VECTOR"),
            Some(OpCode::JumpTable) => write!(f, "JUMP_TABLE"),
            Some(OpCode::JumpTableRange) => {
                let (first, last) = self.range();
                write!(
                    f,
                    "JUMP_TABLE_RANGE {:#04x} '{}' - {:#04x} '{}'",
                    first,
                    gloss(first),
                    last,
                    gloss(last)
                )
            }
            Some(OpCode::Jump) => write!(f, "JUMP {:05x}", self.operand()),
            Some(OpCode::Fork) => write!(f, "FORK {:05x}", self.operand()),
            Some(OpCode::CheckHalt) => {
                write!(f, "CHECK_HALT {}", self.operand())
            }
            Some(OpCode::CheckBranch) => {
                write!(f, "CHECK_BRANCH {}", self.operand())
            }
            Some(OpCode::Match) => write!(f, "MATCH {}", self.operand()),
            Some(OpCode::SaveLabel) => {
                write!(f, "SAVE_LABEL {}", self.operand())
            }
            Some(OpCode::Halt) => write!(f, "HALT"),
            None => write!(f, "* UNRECOGNIZED {:#018x} *", self.0),
        }
    }
}

impl Debug for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{ByteSet, Instr, OpCode, BYTE_SET_WORDS};

    #[test]
    fn encoding_round_trip() {
        let i = Instr::make_lit(b'a');
        assert_eq!(i.opcode(), Some(OpCode::Lit));
        assert_eq!(i.literal(), b'a');
        assert_eq!(i.words(), 0);

        let i = Instr::make_either(b'a', b'z');
        assert_eq!(i.opcode(), Some(OpCode::Either));
        assert_eq!(i.range(), (b'a', b'z'));

        let i = Instr::make_range(0x00, 0xFF);
        assert_eq!(i.opcode(), Some(OpCode::Range));
        assert_eq!(i.range(), (0x00, 0xFF));

        let i = Instr::make_jump((1 << 24) - 1);
        assert_eq!(i.opcode(), Some(OpCode::Jump));
        assert_eq!(i.operand(), (1 << 24) - 1);

        let i = Instr::make_match(7);
        assert_eq!(i.opcode(), Some(OpCode::Match));
        assert_eq!(i.operand(), 7);

        let i = Instr::make_save_label(3);
        assert_eq!(i.opcode(), Some(OpCode::SaveLabel));
        assert_eq!(i.operand(), 3);
    }

    #[test]
    #[should_panic(expected = "jump offsets are 24 bit")]
    fn jump_offset_overflow() {
        Instr::make_jump(1 << 24);
    }

    #[test]
    fn bit_vector_payload() {
        let mut set = ByteSet::default();
        set.set(b'a' as usize, true);
        set.set(0x00, true);
        set.set(0xFF, true);

        let code = Instr::make_bit_vector(&set);
        assert_eq!(code.len(), 1 + BYTE_SET_WORDS);
        assert_eq!(code[0].opcode(), Some(OpCode::BitVector));
        assert_eq!(code[0].words(), BYTE_SET_WORDS);

        // Each payload limb carries 64 bits of the set, little-endian.
        for b in 0..=0xFF_usize {
            let limb = code[1 + b / 64].raw();
            assert_eq!(limb >> (b % 64) & 1 == 1, set[b], "byte {:#04x}", b);
        }
    }

    #[test]
    fn jump_table_slots() {
        let mut targets = [None; 256];
        targets[b'x' as usize] = Some(300_u32);

        let code = Instr::make_jump_table(&targets);
        assert_eq!(code.len(), 257);
        assert_eq!(code[0].words(), 256);
        assert_eq!(code[1 + b'x' as usize].opcode(), Some(OpCode::Jump));
        assert_eq!(code[1 + b'x' as usize].operand(), 300);
        assert_eq!(code[1 + b'y' as usize].opcode(), Some(OpCode::Halt));
    }

    #[test]
    fn dump() {
        assert_eq!(Instr::make_lit(b'a').to_string(), "LIT 0x61 'a'");
        assert_eq!(Instr::make_lit(0x07).to_string(), "LIT 0x07 '.'");
        assert_eq!(
            Instr::make_either(b'a', b'b').to_string(),
            "EITHER 0x61 'a', 0x62 'b'"
        );
        assert_eq!(Instr::make_jump(5).to_string(), "JUMP 00005");
        assert_eq!(Instr::make_match(2).to_string(), "MATCH 2");
        assert_eq!(Instr::make_halt().to_string(), "HALT");
    }
}
