//! Compression of a dispatch table into repeat/alternate runs, and the C++ initializer text
//! generated from those runs.
//!
//! The initializer is written against a fixed set of macros: `REPEAT_N` for power-of-two runs of
//! one handler up to 128, `REPEAT_ALT(a, b)` for `a, b, a, b` and `REPEAT_2ALT(a, b)` for
//! `a, a, b, b`. Expanding the emitted runs in order reproduces the table exactly.

use core::fmt::{self, Display, Formatter, Write};

use log::debug;

use super::table::DispatchTable;
use super::InstructionKey;

/// Run lengths the `REPEAT_N` macros cover, largest first.
const BLOCK_SIZES: [usize; 8] = [128, 64, 32, 16, 8, 4, 2, 1];

#[cfg_attr(feature="use-serde", derive(Serialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunShape<'a> {
    /// One handler, `count` times.
    Repeat(&'a str),
    /// `a, b, a, b`
    Alternate(&'a str, &'a str),
    /// `a, a, b, b`
    BlockAlternate(&'a str, &'a str),
}

/// A span `[start, start + count)` of the table that one macro invocation covers.
#[cfg_attr(feature="use-serde", derive(Serialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EmissionRun<'a> {
    pub start: usize,
    pub count: usize,
    pub shape: RunShape<'a>,
}

impl<'a> EmissionRun<'a> {
    /// Handler at offset `i` into the run.
    fn at(&self, i: usize) -> &'a str {
        match self.shape {
            RunShape::Repeat(h) => h,
            RunShape::Alternate(a, b) => if i % 2 == 0 { a } else { b },
            RunShape::BlockAlternate(a, b) => if i % 4 < 2 { a } else { b },
        }
    }

    /// The entries this run stands for, in order.
    pub fn expand(&self) -> impl Iterator<Item=&'a str> + '_ {
        (0..self.count).map(move |i| self.at(i))
    }

    /// Last index covered, inclusive. An empty run ends where it starts.
    pub fn end(&self) -> usize {
        self.start + self.count.saturating_sub(1)
    }

    /// `0x000-0x003: a/b ABAB`
    pub fn comment(&self) -> String {
        let range = if self.count == 1 {
            format!("0x{:03X}", self.start)
        } else {
            format!("0x{:03X}-0x{:03X}", self.start, self.end())
        };
        match self.shape {
            RunShape::Repeat(h) => format!("{}: {}", range, h),
            RunShape::Alternate(a, b) => format!("{}: {}/{} ABAB", range, a, b),
            RunShape::BlockAlternate(a, b) => format!("{}: {}/{} AABB", range, a, b),
        }
    }
}

/// The macro invocation for this run, with its trailing comma.
impl Display for EmissionRun<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.shape {
            RunShape::Alternate(a, b) if self.count == 4 => {
                write!(f, "REPEAT_ALT(ARM_FN({}), ARM_FN({})),", a, b)
            }
            RunShape::BlockAlternate(a, b) if self.count == 4 => {
                write!(f, "REPEAT_2ALT(ARM_FN({}), ARM_FN({})),", a, b)
            }
            RunShape::Repeat(h) if self.count == 1 => {
                write!(f, "ARM_FN({}),", h)
            }
            RunShape::Repeat(h) if BLOCK_SIZES.contains(&self.count) => {
                write!(f, "REPEAT_{}(ARM_FN({})),", self.count, h)
            }
            _ => {
                // no macro for this shape, list every entry
                for (i, h) in self.expand().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "ARM_FN({})", h)?;
                }
                f.write_str(",")
            }
        }
    }
}

type Detector = for<'a> fn(&[&'a str], usize) -> Option<EmissionRun<'a>>;

/// Four-wide patterns, tried in order before falling back to runs of one handler. A single
/// entry is the degenerate case of either pattern, so they have to be looked for first.
static DETECTORS: [Detector; 2] = [detect_alternate, detect_block_alternate];

/// `a, b, a, b` with `a != b`.
fn detect_alternate<'a>(table: &[&'a str], at: usize) -> Option<EmissionRun<'a>> {
    let window = table.get(at..at + 4)?;
    let (a, b) = (window[0], window[1]);
    if a != b && window[2] == a && window[3] == b {
        Some(EmissionRun { start: at, count: 4, shape: RunShape::Alternate(a, b) })
    } else {
        None
    }
}

/// `a, a, b, b` with `a != b`.
fn detect_block_alternate<'a>(table: &[&'a str], at: usize) -> Option<EmissionRun<'a>> {
    let window = table.get(at..at + 4)?;
    let (a, b) = (window[0], window[2]);
    if a != b && window[1] == a && window[3] == b {
        Some(EmissionRun { start: at, count: 4, shape: RunShape::BlockAlternate(a, b) })
    } else {
        None
    }
}

/// Split a run of `len` copies of `handler` into the fewest power-of-two blocks.
fn push_uniform<'a>(runs: &mut Vec<EmissionRun<'a>>, handler: &'a str, mut start: usize, mut len: usize) {
    while len > 0 {
        // BLOCK_SIZES ends in 1, so some size always fits
        let size = BLOCK_SIZES.iter().copied().find(|&size| size <= len).unwrap_or(1);
        runs.push(EmissionRun { start, count: size, shape: RunShape::Repeat(handler) });
        start += size;
        len -= size;
    }
}

/// Cover `table` with runs, scanning from index 0. At each position the four-wide patterns are
/// tried first; otherwise the maximal run of identical entries is taken and split into
/// power-of-two blocks.
pub fn compress<'a>(table: &[&'a str]) -> Vec<EmissionRun<'a>> {
    let mut runs = Vec::new();
    let mut at = 0;

    while at < table.len() {
        if let Some(run) = DETECTORS.iter().find_map(|detect| detect(table, at)) {
            at += run.count;
            runs.push(run);
            continue;
        }

        let handler = table[at];
        let len = table[at..].iter().take_while(|&&h| h == handler).count();
        push_uniform(&mut runs, handler, at, len);
        at += len;
    }

    debug!("compressed {} entries into {} runs", table.len(), runs.len());
    runs
}

/// Concatenate the expansions of `runs`.
pub fn expand<'a>(runs: &[EmissionRun<'a>]) -> Vec<&'a str> {
    runs.iter().flat_map(|run| run.expand()).collect()
}

/// Knobs for the generated initializer.
#[cfg_attr(feature="use-serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitterConfig {
    /// Class the handlers are members of.
    pub owner: String,
    pub table_name: String,
    pub names_table_name: String,
    /// Column the per-run comments start at.
    pub comment_column: usize,
    /// Append the verbatim name array after the table.
    pub include_names: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        EmitterConfig {
            owner: "ARMCPU".to_string(),
            table_name: "arm_exec_table".to_string(),
            names_table_name: "arm_exec_fn_names".to_string(),
            comment_column: 52,
            include_names: false,
        }
    }
}

const INDENT: &str = "        ";

fn write_preamble<W: Write>(out: &mut W, config: &EmitterConfig) -> fmt::Result {
    writeln!(out, "    // The following code is generated by arm-dispatch")?;
    writeln!(out, "    // Helper macros for cleaner instruction table initialization")?;
    writeln!(out, "    #define ARM_FN(func) &{}::func", config.owner)?;
    writeln!(out, "    #define REPEAT_2(handler) handler, handler")?;
    writeln!(out, "    #define REPEAT_4(handler) handler, handler, handler, handler")?;
    writeln!(out, "    #define REPEAT_8(handler) handler, handler, handler, handler, handler, handler, handler, handler")?;
    writeln!(out, "    #define REPEAT_16(handler) REPEAT_8(handler), REPEAT_8(handler)")?;
    writeln!(out, "    #define REPEAT_32(handler) REPEAT_16(handler), REPEAT_16(handler)")?;
    writeln!(out, "    #define REPEAT_64(handler) REPEAT_32(handler), REPEAT_32(handler)")?;
    writeln!(out, "    #define REPEAT_128(handler) REPEAT_64(handler), REPEAT_64(handler)")?;
    writeln!(out, "    #define REPEAT_ALT(a, b) a, b, a, b")?;
    writeln!(out, "    #define REPEAT_2ALT(a, b) a, a, b, b")?;
    writeln!(out)?;
    writeln!(out, "    // Table of {} entries indexed by bits 27-20 and the mul/swp bit", InstructionKey::COUNT)?;
    writeln!(
        out,
        "    static constexpr void ({}::*{}[{}])(uint32_t instruction) = {{",
        config.owner, config.table_name, InstructionKey::COUNT
    )
}

fn write_trailer<W: Write>(out: &mut W) -> fmt::Result {
    writeln!(out, "    }};")?;
    writeln!(out)?;
    writeln!(out, "    // Cleanup macros to avoid polluting the namespace")?;
    for name in &[
        "ARM_FN", "REPEAT_2", "REPEAT_4", "REPEAT_8", "REPEAT_16", "REPEAT_32", "REPEAT_64",
        "REPEAT_128", "REPEAT_ALT", "REPEAT_2ALT",
    ] {
        writeln!(out, "    #undef {}", name)?;
    }
    Ok(())
}

/// One run per line, comments aligned to `comment_column`.
pub fn write_runs<W: Write>(out: &mut W, runs: &[EmissionRun], comment_column: usize) -> fmt::Result {
    for run in runs {
        let code = format!("{}{}", INDENT, run);
        let pad = comment_column.saturating_sub(code.len()).max(1);
        writeln!(out, "{}{:pad$}// {}", code, "", run.comment(), pad = pad)?;
    }
    Ok(())
}

/// `"name",  // 0xNNN` for every key, wrapped in an array declaration.
pub fn write_name_array<W: Write>(out: &mut W, table: &DispatchTable, config: &EmitterConfig) -> fmt::Result {
    writeln!(out, "static constexpr const char* {}[{}] = {{", config.names_table_name, InstructionKey::COUNT)?;
    for (key, handler) in table.iter() {
        writeln!(out, "    \"{}\",  // {}", handler, key)?;
    }
    writeln!(out, "}};")
}

/// Compress `table` and write the whole initializer: macro preamble, runs, cleanup, and the name
/// array when `config.include_names` is set.
pub fn write_table<W: Write>(out: &mut W, table: &DispatchTable, config: &EmitterConfig) -> fmt::Result {
    let runs = table.compress();
    write_preamble(out, config)?;
    write_runs(out, &runs, config.comment_column)?;
    write_trailer(out)?;
    if config.include_names {
        writeln!(out)?;
        write_name_array(out, table, config)?;
    }
    Ok(())
}

pub fn render_table(table: &DispatchTable, config: &EmitterConfig) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_table(&mut out, table, config)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detectors_in_isolation() {
        let table = ["a", "b", "a", "b", "c", "c", "d", "d", "e"];
        assert_eq!(
            detect_alternate(&table, 0),
            Some(EmissionRun { start: 0, count: 4, shape: RunShape::Alternate("a", "b") })
        );
        assert_eq!(detect_block_alternate(&table, 0), None);
        assert_eq!(detect_alternate(&table, 4), None);
        assert_eq!(
            detect_block_alternate(&table, 4),
            Some(EmissionRun { start: 4, count: 4, shape: RunShape::BlockAlternate("c", "d") })
        );
        // not enough entries left
        assert_eq!(detect_alternate(&table, 6), None);
        assert_eq!(detect_block_alternate(&table, 6), None);
    }

    #[test]
    fn test_uniform_is_not_alternation() {
        let table = ["a"; 4];
        assert_eq!(detect_alternate(&table, 0), None);
        assert_eq!(detect_block_alternate(&table, 0), None);
    }

    #[test]
    fn test_greedy_blocks() {
        let mut runs = Vec::new();
        push_uniform(&mut runs, "h", 0, 13);
        let counts: Vec<usize> = runs.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![8, 4, 1]);
        assert_eq!(runs[1].start, 8);
        assert_eq!(runs[2].start, 12);
    }

    #[test]
    fn test_run_text() {
        let run = EmissionRun { start: 0, count: 4, shape: RunShape::Alternate("exec_arm_and_reg", "exec_arm_mul") };
        assert_eq!(run.to_string(), "REPEAT_ALT(ARM_FN(exec_arm_and_reg), ARM_FN(exec_arm_mul)),");
        assert_eq!(run.comment(), "0x000-0x003: exec_arm_and_reg/exec_arm_mul ABAB");

        let run = EmissionRun { start: 0x1e0, count: 32, shape: RunShape::Repeat("exec_arm_software_interrupt") };
        assert_eq!(run.to_string(), "REPEAT_32(ARM_FN(exec_arm_software_interrupt)),");
        assert_eq!(run.comment(), "0x1E0-0x1FF: exec_arm_software_interrupt");

        let run = EmissionRun { start: 0x0ab, count: 1, shape: RunShape::Repeat("exec_arm_mul") };
        assert_eq!(run.to_string(), "ARM_FN(exec_arm_mul),");
        assert_eq!(run.comment(), "0x0AB: exec_arm_mul");

        let run = EmissionRun { start: 0, count: 3, shape: RunShape::Repeat("h") };
        assert_eq!(run.to_string(), "ARM_FN(h), ARM_FN(h), ARM_FN(h),");
    }

    #[test]
    fn test_empty_run_text() {
        let run = EmissionRun { start: 0x10, count: 0, shape: RunShape::Repeat("h") };
        assert_eq!(run.end(), 0x10);
        assert_eq!(run.expand().count(), 0);
        assert_eq!(run.comment(), "0x010-0x010: h");

        let mut out = String::new();
        write_runs(&mut out, &[run], 52).unwrap();
        assert!(out.ends_with("// 0x010-0x010: h\n"));
    }

    #[test]
    fn test_comment_alignment() {
        let runs = [EmissionRun { start: 0, count: 1, shape: RunShape::Repeat("h") }];
        let mut out = String::new();
        write_runs(&mut out, &runs, 52).unwrap();
        assert_eq!(out.find("//"), Some(52));

        let long = "a_handler_name_long_enough_to_pass_the_comment_column";
        let runs = [EmissionRun { start: 0, count: 1, shape: RunShape::Repeat(long) }];
        let mut out = String::new();
        write_runs(&mut out, &runs, 52).unwrap();
        assert!(out.contains("), // 0x000"));
    }
}
