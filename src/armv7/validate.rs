//! Key-by-key comparison of a dispatch table against one written independently, such as the
//! opcode table of another emulator.
//!
//! The two sides name handlers differently, so foreign names are first translated through a
//! `CanonicalMapping`. Every disagreement is reported; nothing here stops early.

use core::fmt::{self, Display, Formatter};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{info, warn};

use super::classify::DATA_PROCESSING_OPCODES;
use super::table::UNDEFINED_HANDLER;

/// Name a reference table is assumed to use for keys it leaves out.
pub const FOREIGN_UNDEFINED: &str = "ILL";
/// Expected name for foreign names with no canonical translation.
pub const UNMAPPED: &str = "(unmapped)";

/// Translation from a foreign handler-naming scheme to ours.
#[cfg_attr(feature="use-serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CanonicalMapping {
    names: HashMap<String, String>,
}

impl CanonicalMapping {
    pub fn new() -> CanonicalMapping {
        CanonicalMapping::default()
    }

    pub fn insert<F: Into<String>, L: Into<String>>(&mut self, foreign: F, local: L) {
        self.names.insert(foreign.into(), local.into());
    }

    pub fn get(&self, foreign: &str) -> Option<&str> {
        self.names.get(foreign).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// mGBA's ARM instruction names. Register-operand ALU forms carry the shift type as a suffix
    /// (`ADDS_LSR`); all shift types and both flag settings collapse onto our single
    /// register-operand handler.
    pub fn mgba() -> CanonicalMapping {
        let mut canon = CanonicalMapping::new();

        for op in DATA_PROCESSING_OPCODES.iter() {
            let name = op.to_string();
            let lower = name.to_lowercase();
            // comparisons always set flags and have no S form
            let flag_forms: &[&str] = if op.is_comparison() { &[""] } else { &["", "S"] };
            for s in flag_forms {
                for shift in &["LSL", "LSR", "ASR", "ROR"] {
                    canon.insert(format!("{}{}_{}", name, s, shift), format!("exec_arm_{}_reg", lower));
                }
                canon.insert(format!("{}{}I", name, s), format!("exec_arm_{}_imm", lower));
            }
        }

        for (foreign, local) in &[
            ("MUL", "exec_arm_mul"),
            ("MULS", "exec_arm_mul"),
            ("MLA", "exec_arm_mla"),
            ("MLAS", "exec_arm_mla"),
            ("UMULL", "exec_arm_umull"),
            ("UMULLS", "exec_arm_umull"),
            ("UMLAL", "exec_arm_umlal"),
            ("UMLALS", "exec_arm_umlal"),
            ("SMULL", "exec_arm_smull"),
            ("SMULLS", "exec_arm_smull"),
            ("SMLAL", "exec_arm_smlal"),
            ("SMLALS", "exec_arm_smlal"),
            ("SWP", "exec_arm_swp"),
            ("SWPB", "exec_arm_swpb"),
            ("MRS", "exec_arm_mrs"),
            ("MRSR", "exec_arm_mrs"),
            ("MSR", "exec_arm_msr_reg"),
            ("MSRR", "exec_arm_msr_reg"),
            ("MSRI", "exec_arm_msr_imm"),
            ("MSRRI", "exec_arm_msr_imm"),
            ("STRI", "exec_arm_str_imm_pre_nowb"),
            ("LDRI", "exec_arm_ldr_imm_pre_nowb"),
            ("STRTI", "exec_arm_str_imm_pre_wb"),
            ("LDRTI", "exec_arm_ldr_imm_pre_wb"),
            ("STRBI", "exec_arm_strb_imm_pre_nowb"),
            ("LDRBI", "exec_arm_ldrb_imm_pre_nowb"),
            ("STRBTI", "exec_arm_strb_imm_pre_wb"),
            ("LDRBTI", "exec_arm_ldrb_imm_pre_wb"),
            ("STRIU", "exec_arm_str_imm_post_wb"),
            ("LDRIU", "exec_arm_ldr_imm_post_wb"),
            ("STRTIU", "exec_arm_str_imm_post_wb"),
            ("LDRTIU", "exec_arm_ldr_imm_post_wb"),
            ("STRBIU", "exec_arm_strb_imm_post_wb"),
            ("LDRBIU", "exec_arm_ldrb_imm_post_wb"),
            ("STRBTIU", "exec_arm_strb_imm_post_wb"),
            ("LDRBTIU", "exec_arm_ldrb_imm_post_wb"),
            ("B", "exec_arm_b"),
            ("BL", "exec_arm_bl"),
            ("STC", "exec_arm_stc_imm"),
            ("LDC", "exec_arm_ldc_imm"),
            ("MCR", "exec_arm_mcr"),
            ("MRC", "exec_arm_mrc"),
            ("CDP", UNDEFINED_HANDLER),
            ("SWI", "exec_arm_software_interrupt"),
            (FOREIGN_UNDEFINED, UNDEFINED_HANDLER),
        ] {
            canon.insert(*foreign, *local);
        }

        // block transfers: {STM,LDM}[S]{DA,IA,DB,IB}[W]
        for (base, local) in &[("STM", "exec_arm_stm"), ("LDM", "exec_arm_ldm")] {
            for user in &["", "S"] {
                for mode in &["DA", "IA", "DB", "IB"] {
                    for wback in &["", "W"] {
                        canon.insert(format!("{}{}{}{}", base, user, mode, wback), *local);
                    }
                }
            }
        }

        canon
    }
}

impl<F: Into<String>, L: Into<String>> core::iter::FromIterator<(F, L)> for CanonicalMapping {
    fn from_iter<I: IntoIterator<Item=(F, L)>>(iter: I) -> Self {
        let mut canon = CanonicalMapping::new();
        for (foreign, local) in iter {
            canon.insert(foreign, local);
        }
        canon
    }
}

/// One key where the two tables disagree.
#[cfg_attr(feature="use-serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub key: u16,
    /// Name in the reference table.
    pub foreign: String,
    /// `foreign` translated to our naming.
    pub expected: String,
    /// Name in our table.
    pub actual: String,
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "Mismatch at key 0x{:03X}: mgba={} (maps to {}), yours={}",
            self.key, self.foreign, self.expected, self.actual
        )
    }
}

/// Compare `local` against `reference` over the union of their keys, in key order.
///
/// A key missing from `reference` counts as `ILL`; one missing from `local` counts as the
/// undefined handler; a foreign name `canon` does not know is expected to be `(unmapped)`.
pub fn validate(
    reference: &BTreeMap<u16, String>,
    local: &BTreeMap<u16, String>,
    canon: &CanonicalMapping,
) -> Vec<Mismatch> {
    let keys: BTreeSet<u16> = reference.keys().chain(local.keys()).copied().collect();

    keys.into_iter()
        .filter_map(|key| {
            let foreign = reference.get(&key).map(|s| s.as_str()).unwrap_or(FOREIGN_UNDEFINED);
            let expected = canon.get(foreign).unwrap_or(UNMAPPED);
            let actual = local.get(&key).map(|s| s.as_str()).unwrap_or(UNDEFINED_HANDLER);
            if expected != actual {
                Some(Mismatch {
                    key,
                    foreign: foreign.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Write every mismatch and the total to the log.
pub fn log_report(mismatches: &[Mismatch]) {
    for mismatch in mismatches {
        warn!("{}", mismatch);
    }
    info!("Total mismatches: {}", mismatches.len());
}

fn parse_hex(s: &str) -> Option<u16> {
    let digits = s.strip_prefix("0x")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `[0x1A3] = LDRBTIU,`
fn parse_reference_line(line: &str) -> Option<(u16, String)> {
    let rest = line.trim_start().strip_prefix('[')?;
    let (index, rest) = rest.split_at(rest.find(']')?);
    let key = parse_hex(index)?;
    let rest = rest[1..].trim_start().strip_prefix('=')?.trim_start();
    let end = rest.find(|c: char| !is_ident_char(c))?;
    if end == 0 || !rest[end..].starts_with(',') {
        return None;
    }
    Some((key, rest[..end].to_string()))
}

/// `"exec_arm_mul",  // 0x001`
fn parse_local_line(line: &str) -> Option<(u16, String)> {
    let rest = line.trim_start().strip_prefix('"')?;
    let (name, rest) = rest.split_at(rest.find('"')?);
    if name.is_empty() || !name.chars().all(is_ident_char) {
        return None;
    }
    let comment = rest[1..].trim_start().strip_prefix(',')?.trim_start().strip_prefix("//")?;
    let key = parse_hex(comment.trim())?;
    Some((key, name.to_string()))
}

/// Collect `[0xNNN] = NAME,` assignments from a reference table source. Other lines are
/// skipped.
pub fn parse_reference_table(text: &str) -> BTreeMap<u16, String> {
    text.lines().filter_map(parse_reference_line).collect()
}

/// Collect entries from a name array written by `emit::write_name_array`. Other lines are
/// skipped.
pub fn parse_local_table(text: &str) -> BTreeMap<u16, String> {
    text.lines().filter_map(parse_local_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_lines() {
        assert_eq!(parse_reference_line("    [0x1A3] = LDRBTIU,"), Some((0x1a3, "LDRBTIU".to_string())));
        assert_eq!(parse_reference_line("[0x000]=AND_LSL,"), Some((0, "AND_LSL".to_string())));
        assert_eq!(parse_reference_line("[0x00f] = ILL, // trailing"), Some((0xf, "ILL".to_string())));
        // no trailing comma
        assert_eq!(parse_reference_line("[0x001] = MUL"), None);
        assert_eq!(parse_reference_line("[1] = MUL,"), None);
        assert_eq!(parse_reference_line("[0x] = MUL,"), None);
        assert_eq!(parse_reference_line("[0x002] = ,"), None);
        assert_eq!(parse_reference_line("// [0x003] = MUL,"), None);
        assert_eq!(parse_reference_line(""), None);
    }

    #[test]
    fn test_local_lines() {
        assert_eq!(parse_local_line("    \"exec_arm_mul\",  // 0x001"), Some((1, "exec_arm_mul".to_string())));
        assert_eq!(parse_local_line("static constexpr const char* arm_exec_fn_names[512] = {"), None);
        assert_eq!(parse_local_line("\"exec_arm_mul\","), None);
        assert_eq!(parse_local_line("\"has space\",  // 0x001"), None);
        assert_eq!(parse_local_line("};"), None);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let mut reference = BTreeMap::new();
        reference.insert(0x10, "NOT_A_NAME".to_string());
        let mut local = BTreeMap::new();
        local.insert(0x20, "exec_arm_b".to_string());

        let mismatches = validate(&reference, &local, &CanonicalMapping::mgba());
        assert_eq!(mismatches, vec![
            Mismatch {
                key: 0x10,
                foreign: "NOT_A_NAME".to_string(),
                expected: UNMAPPED.to_string(),
                actual: UNDEFINED_HANDLER.to_string(),
            },
            Mismatch {
                key: 0x20,
                foreign: FOREIGN_UNDEFINED.to_string(),
                expected: UNDEFINED_HANDLER.to_string(),
                actual: "exec_arm_b".to_string(),
            },
        ]);
        assert_eq!(
            mismatches[0].to_string(),
            "Mismatch at key 0x010: mgba=NOT_A_NAME (maps to (unmapped)), yours=exec_arm_undefined"
        );
    }
}
