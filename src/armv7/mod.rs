//! Bit positions in this module follow `ARM7TDMI Data Sheet`, section 4 ("ARM Instruction
//! Set"), which numbers instruction fields from bit 31 down.

use core::fmt::{self, Display, Formatter};

use thiserror::Error;
use yaxpeax_arch::{AddressDiff, Arch, Decoder, LengthedInstruction, Reader, ReadError};

pub mod classify;
pub mod emit;
pub mod table;
pub mod validate;

pub use self::classify::{classify, AluOp, Category, Indexing, Operand2};
pub use self::emit::{compress, EmissionRun, EmitterConfig, RunShape};
pub use self::table::{build_table, default_handlers, DispatchTable, TableError, UNDEFINED_HANDLER};
pub use self::validate::{validate, CanonicalMapping, Mismatch};

/// Index into the dispatch table: bits 27..20 of an instruction word, shifted up by one, with
/// the multiply/swap discriminator in bit 0.
#[cfg_attr(feature="use-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature="use-serde", serde(try_from = "u16", into = "u16"))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct InstructionKey {
    bits: u16
}

impl InstructionKey {
    /// Number of distinct keys, and so the length of every dispatch table.
    pub const COUNT: usize = 512;

    pub fn new(opcode: u8, mul_swp: bool) -> InstructionKey {
        InstructionKey { bits: ((opcode as u16) << 1) | (mul_swp as u16) }
    }

    pub fn from_u16(bits: u16) -> InstructionKey {
        match InstructionKey::try_from(bits) {
            Ok(key) => key,
            Err(_) => panic!("instruction key out of range"),
        }
    }

    /// Project a full instruction word onto its key. The discriminator is set for words carrying
    /// the multiply/swap signature, `1xx1` in bits 7..4.
    pub fn from_word(word: u32) -> InstructionKey {
        let opcode = (word >> 20) as u8;
        let mul_swp = word & 0b1001_0000 == 0b1001_0000;
        InstructionKey::new(opcode, mul_swp)
    }

    /// Bits 27..20 of the instruction.
    pub fn opcode(&self) -> u8 {
        (self.bits >> 1) as u8
    }

    pub fn mul_swp(&self) -> bool {
        self.bits & 1 == 1
    }

    pub fn index(&self) -> usize {
        self.bits as usize
    }

    /// Every key, in table order.
    pub fn all() -> impl Iterator<Item=InstructionKey> {
        (0..InstructionKey::COUNT as u16).map(|bits| InstructionKey { bits })
    }
}

/// A key index outside `[0, InstructionKey::COUNT)`.
#[derive(Debug, PartialEq, Eq, Error)]
#[error("instruction key {0:#x} out of range, keys are below {max:#x}", max = InstructionKey::COUNT)]
pub struct KeyOutOfRange(pub u16);

impl TryFrom<u16> for InstructionKey {
    type Error = KeyOutOfRange;

    fn try_from(bits: u16) -> Result<InstructionKey, KeyOutOfRange> {
        if bits as usize >= InstructionKey::COUNT {
            return Err(KeyOutOfRange(bits));
        }

        Ok(InstructionKey { bits })
    }
}

impl From<InstructionKey> for u16 {
    fn from(key: InstructionKey) -> u16 {
        key.bits
    }
}

impl Display for InstructionKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "0x{:03X}", self.bits)
    }
}

/// An instruction word together with the table slot and category it dispatches to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    word: u32,
    key: InstructionKey,
    category: Category,
}

impl Dispatch {
    pub fn word(&self) -> u32 { self.word }
    pub fn key(&self) -> InstructionKey { self.key }
    pub fn category(&self) -> Category { self.category }

    /// The handler `default_handlers` routes this category to.
    pub fn handler(&self) -> &'static str {
        default_handlers().get(&self.category).copied().unwrap_or(UNDEFINED_HANDLER)
    }
}

impl Default for Dispatch {
    fn default() -> Self {
        Dispatch {
            word: 0,
            key: InstructionKey::new(0, false),
            category: Category::Undefined,
        }
    }
}

impl Display for Dispatch {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:08x}: {} -> {} ({})", self.word, self.key, self.category, self.handler())
    }
}

impl yaxpeax_arch::Instruction for Dispatch {
    fn well_defined(&self) -> bool { self.category != Category::Undefined }
}

impl LengthedInstruction for Dispatch {
    type Unit = AddressDiff<<ARMDispatch as Arch>::Address>;
    fn min_size() -> Self::Unit {
        AddressDiff::from_const(4)
    }
    fn len(&self) -> Self::Unit {
        AddressDiff::from_const(4)
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("exhausted input")]
    ExhaustedInput,
}

impl From<ReadError> for DecodeError {
    fn from(_e: ReadError) -> DecodeError {
        DecodeError::ExhaustedInput
    }
}

impl yaxpeax_arch::DecodeError for DecodeError {
    fn data_exhausted(&self) -> bool { self == &DecodeError::ExhaustedInput }
    // classification is total, so no word is ever rejected
    fn bad_opcode(&self) -> bool { false }
    fn bad_operand(&self) -> bool { false }
    fn description(&self) -> &'static str {
        match self {
            DecodeError::ExhaustedInput => "exhausted input",
        }
    }
}

/// Mask and value of `BX Rm` with the condition and `Rm` fields cleared.
const BX_MASK: u32 = 0x0fff_fff0;
const BX_BITS: u32 = 0x012f_ff10;

#[derive(Default, Debug)]
pub struct InstDecoder {}

impl InstDecoder {
    /// Classify one word. The key alone cannot identify BX, so the full word is checked for it
    /// before the key's category is taken.
    pub fn dispatch(&self, word: u32) -> Dispatch {
        let key = InstructionKey::from_word(word);
        let category = if word & BX_MASK == BX_BITS {
            Category::PossibleBX
        } else {
            key.category()
        };
        Dispatch { word, key, category }
    }
}

impl Decoder<ARMDispatch> for InstDecoder {
    fn decode_into<T: Reader<<ARMDispatch as Arch>::Address, <ARMDispatch as Arch>::Word>>(&self, inst: &mut Dispatch, words: &mut T) -> Result<(), <ARMDispatch as Arch>::DecodeError> {
        let mut word_bytes = [0u8; 4];
        words.next_n(&mut word_bytes)?;
        *inst = self.dispatch(u32::from_le_bytes(word_bytes));
        Ok(())
    }
}

#[cfg(feature="use-serde")]
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct ARMDispatch;

#[cfg(not(feature="use-serde"))]
#[derive(Copy, Clone, Debug)]
pub struct ARMDispatch;

impl Arch for ARMDispatch {
    type Word = u8;
    type Address = u32;
    type Instruction = Dispatch;
    type DecodeError = DecodeError;
    type Decoder = InstDecoder;
    type Operand = ();
}
