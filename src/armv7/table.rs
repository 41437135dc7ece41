//! The 512-entry dispatch table and the category-to-handler map it is built from.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use bitvec::prelude::*;
use log::{debug, warn};
use thiserror::Error;

use super::classify::{AluOp, Category, Indexing, Operand2};
use super::emit::{self, EmissionRun};
use super::InstructionKey;

/// Handler for keys nothing else claims.
pub const UNDEFINED_HANDLER: &str = "exec_arm_undefined";

#[derive(Debug, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("dispatch table needs {} entries, got {len}", InstructionKey::COUNT)]
    WrongLength { len: usize },
}

static HANDLERS: &[(Category, &str)] = &[
    // single data transfer
    (Category::LDR(Operand2::Imm, Indexing::PreWriteback), "exec_arm_ldr_imm_pre_wb"),
    (Category::LDR(Operand2::Imm, Indexing::Pre), "exec_arm_ldr_imm_pre_nowb"),
    (Category::LDR(Operand2::Imm, Indexing::PostWriteback), "exec_arm_ldr_imm_post_wb"),
    (Category::LDR(Operand2::Reg, Indexing::PreWriteback), "exec_arm_ldr_reg_pre_wb"),
    (Category::LDR(Operand2::Reg, Indexing::Pre), "exec_arm_ldr_reg_pre_nowb"),
    (Category::LDR(Operand2::Reg, Indexing::PostWriteback), "exec_arm_ldr_reg_post_wb"),
    (Category::LDRB(Operand2::Imm, Indexing::PreWriteback), "exec_arm_ldrb_imm_pre_wb"),
    (Category::LDRB(Operand2::Imm, Indexing::Pre), "exec_arm_ldrb_imm_pre_nowb"),
    (Category::LDRB(Operand2::Imm, Indexing::PostWriteback), "exec_arm_ldrb_imm_post_wb"),
    (Category::LDRB(Operand2::Reg, Indexing::PreWriteback), "exec_arm_ldrb_reg_pre_wb"),
    (Category::LDRB(Operand2::Reg, Indexing::Pre), "exec_arm_ldrb_reg_pre_nowb"),
    (Category::LDRB(Operand2::Reg, Indexing::PostWriteback), "exec_arm_ldrb_reg_post_wb"),
    (Category::STR(Operand2::Imm, Indexing::PreWriteback), "exec_arm_str_imm_pre_wb"),
    (Category::STR(Operand2::Imm, Indexing::Pre), "exec_arm_str_imm_pre_nowb"),
    (Category::STR(Operand2::Imm, Indexing::PostWriteback), "exec_arm_str_imm_post_wb"),
    (Category::STR(Operand2::Reg, Indexing::PreWriteback), "exec_arm_str_reg_pre_wb"),
    (Category::STR(Operand2::Reg, Indexing::Pre), "exec_arm_str_reg_pre_nowb"),
    (Category::STR(Operand2::Reg, Indexing::PostWriteback), "exec_arm_str_reg_post_wb"),
    (Category::STRB(Operand2::Imm, Indexing::PreWriteback), "exec_arm_strb_imm_pre_wb"),
    (Category::STRB(Operand2::Imm, Indexing::Pre), "exec_arm_strb_imm_pre_nowb"),
    (Category::STRB(Operand2::Imm, Indexing::PostWriteback), "exec_arm_strb_imm_post_wb"),
    (Category::STRB(Operand2::Reg, Indexing::PreWriteback), "exec_arm_strb_reg_pre_wb"),
    (Category::STRB(Operand2::Reg, Indexing::Pre), "exec_arm_strb_reg_pre_nowb"),
    (Category::STRB(Operand2::Reg, Indexing::PostWriteback), "exec_arm_strb_reg_post_wb"),

    // multiply and swap
    (Category::MLA, "exec_arm_mla"),
    (Category::MUL, "exec_arm_mul"),
    (Category::SMLAL, "exec_arm_smlal"),
    (Category::SMULL, "exec_arm_smull"),
    (Category::UMLAL, "exec_arm_umlal"),
    (Category::UMULL, "exec_arm_umull"),
    (Category::SWP, "exec_arm_swp"),
    (Category::SWPB, "exec_arm_swpb"),

    // data processing
    (Category::DataProcessing(AluOp::AND, Operand2::Reg), "exec_arm_and_reg"),
    (Category::DataProcessing(AluOp::AND, Operand2::Imm), "exec_arm_and_imm"),
    (Category::DataProcessing(AluOp::EOR, Operand2::Reg), "exec_arm_eor_reg"),
    (Category::DataProcessing(AluOp::EOR, Operand2::Imm), "exec_arm_eor_imm"),
    (Category::DataProcessing(AluOp::SUB, Operand2::Reg), "exec_arm_sub_reg"),
    (Category::DataProcessing(AluOp::SUB, Operand2::Imm), "exec_arm_sub_imm"),
    (Category::DataProcessing(AluOp::RSB, Operand2::Reg), "exec_arm_rsb_reg"),
    (Category::DataProcessing(AluOp::RSB, Operand2::Imm), "exec_arm_rsb_imm"),
    (Category::DataProcessing(AluOp::ADD, Operand2::Reg), "exec_arm_add_reg"),
    (Category::DataProcessing(AluOp::ADD, Operand2::Imm), "exec_arm_add_imm"),
    (Category::DataProcessing(AluOp::ADC, Operand2::Reg), "exec_arm_adc_reg"),
    (Category::DataProcessing(AluOp::ADC, Operand2::Imm), "exec_arm_adc_imm"),
    (Category::DataProcessing(AluOp::SBC, Operand2::Reg), "exec_arm_sbc_reg"),
    (Category::DataProcessing(AluOp::SBC, Operand2::Imm), "exec_arm_sbc_imm"),
    (Category::DataProcessing(AluOp::RSC, Operand2::Reg), "exec_arm_rsc_reg"),
    (Category::DataProcessing(AluOp::RSC, Operand2::Imm), "exec_arm_rsc_imm"),
    (Category::DataProcessing(AluOp::TST, Operand2::Reg), "exec_arm_tst_reg"),
    (Category::DataProcessing(AluOp::TST, Operand2::Imm), "exec_arm_tst_imm"),
    (Category::DataProcessing(AluOp::TEQ, Operand2::Reg), "exec_arm_teq_reg"),
    (Category::DataProcessing(AluOp::TEQ, Operand2::Imm), "exec_arm_teq_imm"),
    (Category::DataProcessing(AluOp::CMP, Operand2::Reg), "exec_arm_cmp_reg"),
    (Category::DataProcessing(AluOp::CMP, Operand2::Imm), "exec_arm_cmp_imm"),
    (Category::DataProcessing(AluOp::CMN, Operand2::Reg), "exec_arm_cmn_reg"),
    (Category::DataProcessing(AluOp::CMN, Operand2::Imm), "exec_arm_cmn_imm"),
    (Category::DataProcessing(AluOp::ORR, Operand2::Reg), "exec_arm_orr_reg"),
    (Category::DataProcessing(AluOp::ORR, Operand2::Imm), "exec_arm_orr_imm"),
    (Category::DataProcessing(AluOp::MOV, Operand2::Reg), "exec_arm_mov_reg"),
    (Category::DataProcessing(AluOp::MOV, Operand2::Imm), "exec_arm_mov_imm"),
    (Category::DataProcessing(AluOp::BIC, Operand2::Reg), "exec_arm_bic_reg"),
    (Category::DataProcessing(AluOp::BIC, Operand2::Imm), "exec_arm_bic_imm"),
    (Category::DataProcessing(AluOp::MVN, Operand2::Reg), "exec_arm_mvn_reg"),
    (Category::DataProcessing(AluOp::MVN, Operand2::Imm), "exec_arm_mvn_imm"),

    // branch and block transfer
    (Category::B, "exec_arm_b"),
    (Category::BL, "exec_arm_bl"),
    (Category::LDM, "exec_arm_ldm"),
    (Category::STM, "exec_arm_stm"),

    (Category::SWI, "exec_arm_software_interrupt"),

    // coprocessor
    (Category::LDC(Operand2::Imm), "exec_arm_ldc_imm"),
    (Category::LDC(Operand2::Reg), "exec_arm_ldc_reg"),
    (Category::STC(Operand2::Imm), "exec_arm_stc_imm"),
    (Category::STC(Operand2::Reg), "exec_arm_stc_reg"),
    (Category::MCR, "exec_arm_mcr"),
    (Category::MRC, "exec_arm_mrc"),

    // psr transfer and the rest
    (Category::PossibleBX, "exec_arm_bx_possible"),
    (Category::MRS, "exec_arm_mrs"),
    (Category::MSR(Operand2::Reg), "exec_arm_msr_reg"),
    (Category::MSR(Operand2::Imm), "exec_arm_msr_imm"),

    (Category::Undefined, UNDEFINED_HANDLER),
];

/// The handler every category is routed to by default. Built once, on first use.
pub fn default_handlers() -> &'static HashMap<Category, &'static str> {
    static DEFAULT_HANDLERS: OnceLock<HashMap<Category, &'static str>> = OnceLock::new();
    DEFAULT_HANDLERS.get_or_init(|| HANDLERS.iter().copied().collect())
}

/// Handler names indexed by `InstructionKey`. Always exactly `InstructionKey::COUNT` entries.
#[cfg_attr(feature="use-serde", derive(Serialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchTable {
    handlers: Vec<&'static str>,
}

impl DispatchTable {
    /// Wrap a prepared list of handler names.
    pub fn from_handlers(handlers: Vec<&'static str>) -> Result<DispatchTable, TableError> {
        if handlers.len() != InstructionKey::COUNT {
            return Err(TableError::WrongLength { len: handlers.len() });
        }

        Ok(DispatchTable { handlers })
    }

    /// The table `default_handlers` produces.
    pub fn standard() -> DispatchTable {
        build_table(default_handlers(), UNDEFINED_HANDLER)
    }

    pub fn get(&self, key: InstructionKey) -> &'static str {
        self.handlers[key.index()]
    }

    pub fn handlers(&self) -> &[&'static str] {
        &self.handlers
    }

    pub fn iter(&self) -> impl Iterator<Item=(InstructionKey, &'static str)> + '_ {
        InstructionKey::all().zip(self.handlers.iter().copied())
    }

    /// Key-to-name map in the shape the validator compares.
    pub fn to_map(&self) -> BTreeMap<u16, String> {
        self.iter()
            .map(|(key, handler)| (key.index() as u16, handler.to_string()))
            .collect()
    }

    pub fn compress(&self) -> Vec<EmissionRun<'static>> {
        emit::compress(&self.handlers)
    }
}

/// Classify every key and resolve its category through `names`. Categories missing from `names`
/// resolve to `fallback`; each one is logged once as a configuration gap.
pub fn build_table(names: &HashMap<Category, &'static str>, fallback: &'static str) -> DispatchTable {
    let mut handlers = vec![fallback; InstructionKey::COUNT];
    let mut assigned: BitVec = bitvec![0; InstructionKey::COUNT];
    let mut unmapped: Vec<Category> = Vec::new();

    for opcode in 0..=u8::MAX {
        for &mul_swp in &[false, true] {
            let key = InstructionKey::new(opcode, mul_swp);
            let category = key.category();
            handlers[key.index()] = match names.get(&category) {
                Some(&name) => name,
                None => {
                    if !unmapped.contains(&category) {
                        warn!("no handler for {}, using {}", category, fallback);
                        unmapped.push(category);
                    }
                    fallback
                }
            };
            debug_assert!(!assigned[key.index()], "key {} assigned twice", key);
            assigned.set(key.index(), true);
        }
    }

    debug_assert!(assigned.all());
    debug!("built dispatch table, {} categories fell back to {}", unmapped.len(), fallback);

    DispatchTable { handlers }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handlers_cover_every_name() {
        let names = default_handlers();
        assert_eq!(names.len(), HANDLERS.len(), "duplicate category in HANDLERS");
        for opcode in 0..=u8::MAX {
            for &mul_swp in &[false, true] {
                let category = InstructionKey::new(opcode, mul_swp).category();
                assert!(names.contains_key(&category), "no handler for {}", category);
            }
        }
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(
            DispatchTable::from_handlers(vec![UNDEFINED_HANDLER; 3]),
            Err(TableError::WrongLength { len: 3 })
        );
        assert!(DispatchTable::from_handlers(vec![UNDEFINED_HANDLER; 512]).is_ok());
    }
}
