//! `arm-dispatch` classifies the 9-bit partial opcode an ARMv4 interpreter indexes its handler
//! table with, builds the complete 512-entry table from that classification, and writes it out as
//! a compact C++ initializer. A validator compares the result against independently authored
//! tables.

#[cfg(feature="use-serde")]
#[macro_use] extern crate serde_derive;
#[cfg(feature="use-serde")]
extern crate serde;
extern crate yaxpeax_arch;
extern crate bitvec;

pub mod armv7;
