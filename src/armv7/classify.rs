//! Classification of the 9-bit dispatch key into an instruction category.
//!
//! The key is bits 27..20 of an ARM instruction word with the multiply/swap discriminator
//! appended below them. At that granularity several instruction families share bit prefixes, so
//! classification is an ordered decision list: the first matching rule wins. The rules are
//! written as one `match` whose arms are in that order.
//!
//! Bit numbering in comments follows the instruction word, so "b25" is bit 5 of `opcode`.

use core::fmt::{self, Display, Formatter};

use super::InstructionKey;

/// The sixteen data-processing operations, in the order bits 24..21 select them.
#[cfg_attr(feature="use-serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AluOp {
    AND,
    EOR,
    SUB,
    RSB,
    ADD,
    ADC,
    SBC,
    RSC,
    TST,
    TEQ,
    CMP,
    CMN,
    ORR,
    MOV,
    BIC,
    MVN,
}

pub(crate) static DATA_PROCESSING_OPCODES: [AluOp; 16] = [
    AluOp::AND,
    AluOp::EOR,
    AluOp::SUB,
    AluOp::RSB,
    AluOp::ADD,
    AluOp::ADC,
    AluOp::SBC,
    AluOp::RSC,
    AluOp::TST,
    AluOp::TEQ,
    AluOp::CMP,
    AluOp::CMN,
    AluOp::ORR,
    AluOp::MOV,
    AluOp::BIC,
    AluOp::MVN,
];

impl AluOp {
    /// Select an operation by its 4-bit encoding. Only the low four bits of `bits` are used.
    pub fn from_bits(bits: u8) -> AluOp {
        DATA_PROCESSING_OPCODES[(bits & 0b1111) as usize]
    }

    /// `TST`, `TEQ`, `CMP` and `CMN` always set flags and write no destination.
    pub fn is_comparison(&self) -> bool {
        match self {
            AluOp::TST | AluOp::TEQ | AluOp::CMP | AluOp::CMN => true,
            _ => false,
        }
    }
}

impl Display for AluOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            AluOp::AND => "AND",
            AluOp::EOR => "EOR",
            AluOp::SUB => "SUB",
            AluOp::RSB => "RSB",
            AluOp::ADD => "ADD",
            AluOp::ADC => "ADC",
            AluOp::SBC => "SBC",
            AluOp::RSC => "RSC",
            AluOp::TST => "TST",
            AluOp::TEQ => "TEQ",
            AluOp::CMP => "CMP",
            AluOp::CMN => "CMN",
            AluOp::ORR => "ORR",
            AluOp::MOV => "MOV",
            AluOp::BIC => "BIC",
            AluOp::MVN => "MVN",
        };
        f.write_str(name)
    }
}

/// Whether the second operand (or transfer offset) is a register or an immediate.
#[cfg_attr(feature="use-serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operand2 {
    Reg,
    Imm,
}

impl Display for Operand2 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Operand2::Reg => f.write_str("REG"),
            Operand2::Imm => f.write_str("IMM"),
        }
    }
}

/// Addressing of a single data transfer. Post-indexed transfers always write the base back, so
/// there is no post-indexed form without writeback.
#[cfg_attr(feature="use-serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Indexing {
    Pre,
    PreWriteback,
    PostWriteback,
}

impl Display for Indexing {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Indexing::Pre => f.write_str("PRE_NOWB"),
            Indexing::PreWriteback => f.write_str("PRE_WB"),
            Indexing::PostWriteback => f.write_str("POST_WB"),
        }
    }
}

/// The instruction class a dispatch key resolves to.
///
/// Flag-setting variants are not distinguished: `MULS` is `MUL`, `ANDS` is `AND`. Whether flags
/// are written is decided when the instruction executes, not when it is dispatched.
#[cfg_attr(feature="use-serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    MRS,
    MSR(Operand2),
    MUL,
    MLA,
    UMULL,
    UMLAL,
    SMULL,
    SMLAL,
    SWP,
    SWPB,
    DataProcessing(AluOp, Operand2),
    STR(Operand2, Indexing),
    STRB(Operand2, Indexing),
    LDR(Operand2, Indexing),
    LDRB(Operand2, Indexing),
    B,
    BL,
    LDM,
    STM,
    SWI,
    LDC(Operand2),
    STC(Operand2),
    MRC,
    MCR,
    /*
     * the nine key bits cannot identify BX on their own. this marks words a caller has confirmed
     * against the full encoding (see `InstDecoder`).
     */
    PossibleBX,
    Undefined,
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Category::MRS => f.write_str("MRS"),
            Category::MSR(op2) => write!(f, "MSR_{}", op2),
            Category::MUL => f.write_str("MUL"),
            Category::MLA => f.write_str("MLA"),
            Category::UMULL => f.write_str("UMULL"),
            Category::UMLAL => f.write_str("UMLAL"),
            Category::SMULL => f.write_str("SMULL"),
            Category::SMLAL => f.write_str("SMLAL"),
            Category::SWP => f.write_str("SWP"),
            Category::SWPB => f.write_str("SWPB"),
            Category::DataProcessing(op, op2) => write!(f, "{}_{}", op, op2),
            Category::STR(op2, idx) => write!(f, "STR_{}_{}", op2, idx),
            Category::STRB(op2, idx) => write!(f, "STRB_{}_{}", op2, idx),
            Category::LDR(op2, idx) => write!(f, "LDR_{}_{}", op2, idx),
            Category::LDRB(op2, idx) => write!(f, "LDRB_{}_{}", op2, idx),
            Category::B => f.write_str("B"),
            Category::BL => f.write_str("BL"),
            Category::LDM => f.write_str("LDM"),
            Category::STM => f.write_str("STM"),
            Category::SWI => f.write_str("SWI"),
            Category::LDC(op2) => write!(f, "LDC_{}", op2),
            Category::STC(op2) => write!(f, "STC_{}", op2),
            Category::MRC => f.write_str("MRC"),
            Category::MCR => f.write_str("MCR"),
            Category::PossibleBX => f.write_str("BX (possible)"),
            Category::Undefined => f.write_str("Undefined/Reserved"),
        }
    }
}

#[inline]
fn bit(opcode: u8, n: u8) -> bool {
    (opcode >> n) & 1 == 1
}

/// Classify a partial opcode. `opcode` is bits 27..20 of the instruction, `mul_swp` the
/// multiply/swap discriminator. Total: every input yields a category, `Category::Undefined` when
/// no rule applies.
pub fn classify(opcode: u8, mul_swp: bool) -> Category {
    // b25 reads as "immediate" for data processing but as "register offset" for single data
    // transfer and coprocessor transfers.
    let dp_operand = if bit(opcode, 5) { Operand2::Imm } else { Operand2::Reg };
    let offset = if bit(opcode, 5) { Operand2::Reg } else { Operand2::Imm };

    match (opcode, mul_swp) {
        // |0 0 0 1 0|x|x|0| mul_swp=0: MRS, MSR (register). MSR/MRS reuse the TST/TEQ/CMP/CMN
        // encodings without S; the remaining overlaps are sorted out by those handlers.
        (op, false) if op & 0b1111_1001 == 0b0001_0000 => {
            if bit(op, 1) {
                Category::MSR(Operand2::Reg)
            } else {
                Category::MRS
            }
        }
        // |0 0 1 1 0|x|x|0| mul_swp=0: MSR (immediate)
        (op, false) if op & 0b1111_1001 == 0b0011_0000 => Category::MSR(Operand2::Imm),
        // |0 0 0 0 0 0|A|S| mul_swp=1
        (op, true) if op & 0b1111_1100 == 0b0000_0000 => {
            if bit(op, 1) { Category::MLA } else { Category::MUL }
        }
        // |0 0 0 0 1|U|A|S| mul_swp=1
        (op, true) if op & 0b1111_1000 == 0b0000_1000 => {
            match (bit(op, 2), bit(op, 1)) {
                (false, false) => Category::UMULL,
                (false, true) => Category::UMLAL,
                (true, false) => Category::SMULL,
                (true, true) => Category::SMLAL,
            }
        }
        // |0 0 0 1 0|B|x|x| mul_swp=1
        (op, true) if op & 0b1111_1000 == 0b0001_0000 => {
            if bit(op, 2) { Category::SWPB } else { Category::SWP }
        }
        // |0 0|I|opcode |S| mul_swp=0
        (op, false) if op & 0b1100_0000 == 0b0000_0000 => {
            Category::DataProcessing(AluOp::from_bits(op >> 1), dp_operand)
        }
        // |0 1|I|P|U|B|W|L| mul_swp=0
        (op, false) if op & 0b1100_0000 == 0b0100_0000 => {
            let indexing = if !bit(op, 4) {
                Indexing::PostWriteback
            } else if bit(op, 1) {
                Indexing::PreWriteback
            } else {
                Indexing::Pre
            };
            match (bit(op, 0), bit(op, 2)) {
                (false, false) => Category::STR(offset, indexing),
                (false, true) => Category::STRB(offset, indexing),
                (true, false) => Category::LDR(offset, indexing),
                (true, true) => Category::LDRB(offset, indexing),
            }
        }
        // |1 0 1|L|x x x x|
        (op, _) if op & 0b1110_0000 == 0b1010_0000 => {
            if bit(op, 4) { Category::BL } else { Category::B }
        }
        // |1 0 0|P|U|S|W|L|
        (op, _) if op & 0b1110_0000 == 0b1000_0000 => {
            if bit(op, 0) { Category::LDM } else { Category::STM }
        }
        // |1 1 1 1|x x x x|
        (op, _) if op & 0b1111_0000 == 0b1111_0000 => Category::SWI,
        // |1 1|x|0|x|N|x|L|
        // manuals disagree on whether N (b22) is set for LDC/STC; both layouts are taken as
        // LDC/STC, which leaves MRC/MCR without a key of their own at this width.
        (op, _) if op & 0b1101_0000 == 0b1100_0000 => {
            if bit(op, 0) { Category::LDC(offset) } else { Category::STC(offset) }
        }
        // BX is `0001 0010 1111 1111 1111 0001` from bit 27 down to bit 4. this rule matches that
        // byte shifted left once, as it sits in a table index, and data processing claims that
        // byte first.
        (0b0010_0100, false) => Category::PossibleBX,
        _ => Category::Undefined,
    }
}

impl InstructionKey {
    /// The category this key classifies as.
    pub fn category(&self) -> Category {
        classify(self.opcode(), self.mul_swp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alu_op_order() {
        for (i, op) in DATA_PROCESSING_OPCODES.iter().enumerate() {
            assert_eq!(AluOp::from_bits(i as u8), *op);
        }
        assert!(AluOp::CMN.is_comparison());
        assert!(!AluOp::MOV.is_comparison());
    }

    #[test]
    fn test_category_names() {
        assert_eq!(Category::DataProcessing(AluOp::AND, Operand2::Reg).to_string(), "AND_REG");
        assert_eq!(Category::LDR(Operand2::Imm, Indexing::PreWriteback).to_string(), "LDR_IMM_PRE_WB");
        assert_eq!(Category::STRB(Operand2::Reg, Indexing::Pre).to_string(), "STRB_REG_PRE_NOWB");
        assert_eq!(Category::MSR(Operand2::Imm).to_string(), "MSR_IMM");
        assert_eq!(Category::PossibleBX.to_string(), "BX (possible)");
        assert_eq!(Category::Undefined.to_string(), "Undefined/Reserved");
    }
}
