/*!
Compiled programs: an ordered sequence of instruction words plus the header
metadata the VM needs for sizing its runtime state, with a binary
serialization for caching compiled patterns.

The serialized layout is the number of checked states as 4 little-endian
bytes, the first-byte set as 32 bytes (bit `i` of byte `i / 8` is set iff
byte `i` is in the set), and then the raw 8-byte instruction records to the
end of the input. The format carries no magic or version and is meant for
round-tripping on the same host only; callers must treat it as opaque.
*/

use std::fmt::{Display, Formatter};
use std::mem::size_of;
use std::ops::Index;

use crate::errors::DecodeError;
use crate::instr::{gloss, ByteSet, Instr, OpCode};

/// Size in bytes of the serialized program header.
const HEADER_LEN: usize = size_of::<u32>() + size_of::<ByteSet>();

/// A compiled program: the instruction stream for one or more patterns,
/// plus the header metadata the VM uses for sizing its runtime state.
///
/// Programs are produced by an external pattern compiler and are immutable
/// thereafter. A single program can be shared by any number of VMs;
/// instruction index 0 is the initial program counter for a fresh thread.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct Program {
    /// Number of distinct check-state indices used by `CHECK_HALT` and
    /// `CHECK_BRANCH` instructions in the body.
    num_checked: u32,
    /// The bytes on which a fresh simulation can legally start: the
    /// first-byte set of the union of the compiled patterns. Used by the
    /// VM as a cold-start filter.
    first: ByteSet,
    code: Vec<Instr>,
}

impl Program {
    /// Creates a program from its header metadata and instruction stream.
    pub fn new(num_checked: u32, first: ByteSet, code: Vec<Instr>) -> Self {
        Self { num_checked, first, code }
    }

    /// Number of distinct check states declared by the compiler.
    #[inline]
    pub fn num_checked(&self) -> u32 {
        self.num_checked
    }

    /// The set of bytes on which a match can start.
    #[inline]
    pub fn first(&self) -> &ByteSet {
        &self.first
    }

    /// Number of instruction words in the program body, payload included.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// True if the program has no instructions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Returns an iterator over `(address, instruction)` pairs, skipping
    /// inline payload words.
    pub fn instrs(&self) -> Instrs<'_> {
        Instrs { code: &self.code, pc: 0 }
    }

    /// Serializes the program as a sequence of bytes.
    ///
    /// The [`Program`] can be restored back by passing the bytes to
    /// [`Program::from_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(HEADER_LEN + self.code.len() * size_of::<Instr>());
        bytes.extend_from_slice(&self.num_checked.to_le_bytes());
        for limb in self.first.as_raw_slice() {
            bytes.extend_from_slice(&limb.to_le_bytes());
        }
        for instr in &self.code {
            bytes.extend_from_slice(&instr.raw().to_le_bytes());
        }
        bytes
    }

    /// Deserializes a program from a sequence of bytes produced by
    /// [`Program::to_bytes`].
    ///
    /// Fails if the data is shorter than the program header. A trailing
    /// partial instruction record is dropped.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::TruncatedHeader {
                expected: HEADER_LEN,
                got: bytes.len(),
            });
        }

        let num_checked = u32::from_le_bytes(bytes[0..4].try_into().unwrap());

        let mut limbs = [0_u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let at = 4 + i * 8;
            *limb = u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());
        }

        let code = bytes[HEADER_LEN..]
            .chunks_exact(size_of::<Instr>())
            .map(|record| {
                Instr::from_raw(u64::from_le_bytes(record.try_into().unwrap()))
            })
            .collect();

        Ok(Self { num_checked, first: ByteSet::new(limbs), code })
    }
}

impl Index<usize> for Program {
    type Output = Instr;

    #[inline]
    fn index(&self, index: usize) -> &Instr {
        &self.code[index]
    }
}

/// Iterator over the instructions of a program, yielding each instruction
/// with its address and stepping over inline payload words.
pub struct Instrs<'a> {
    code: &'a [Instr],
    pc: usize,
}

impl Iterator for Instrs<'_> {
    type Item = (usize, Instr);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pc >= self.code.len() {
            return None;
        }
        let pc = self.pc;
        let instr = self.code[pc];
        self.pc = pc + 1 + instr.words();
        Some((pc, instr))
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        for (addr, instr) in self.instrs() {
            match instr.opcode() {
                Some(OpCode::BitVector) => {
                    write!(f, "{:05x}: BIT_VECTOR", addr)?;
                    for b in 0..=0xFF_u32 {
                        let limb = self.code[addr + 1 + b as usize / 64].raw();
                        if limb >> (b % 64) & 1 == 1 {
                            write!(f, " {:#04x}", b)?;
                        }
                    }
                    writeln!(f)?;
                }
                Some(OpCode::JumpTable | OpCode::JumpTableRange) => {
                    writeln!(f, "{:05x}: {}", addr, instr)?;
                    let base = if instr.opcode() == Some(OpCode::JumpTable) {
                        0
                    } else {
                        instr.range().0 as usize
                    };
                    for slot in 0..instr.words() {
                        let target = self.code[addr + 1 + slot];
                        if target.opcode() == Some(OpCode::Jump) {
                            let b = (base + slot) as u8;
                            writeln!(
                                f,
                                "       {:#04x} '{}' -> {:05x}",
                                b,
                                gloss(b),
                                target.operand()
                            )?;
                        }
                    }
                }
                _ => writeln!(f, "{:05x}: {}", addr, instr)?,
            }
        }
        Ok(())
    }
}
