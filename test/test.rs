
use yaxpeax_arch::{Arch, Decoder, U8Reader};

use arm_dispatch::armv7::{classify, ARMDispatch, InstructionKey};

#[test]
fn test_every_key_classifies() {
    for key in InstructionKey::all() {
        let category = classify(key.opcode(), key.mul_swp());
        assert_eq!(category, classify(key.opcode(), key.mul_swp()), "classify is not deterministic at {}", key);
        assert_eq!(category, key.category());
        assert!(!category.to_string().is_empty());
    }
}

#[test]
fn test_words_do_not_panic() {
    let decoder = <ARMDispatch as Arch>::Decoder::default();

    for i in (0..=u32::MAX).step_by(0x1_0001) {
        let bytes = i.to_le_bytes();
        let res = decoder.decode(&mut U8Reader::new(&bytes));
        let instr = res.expect("four bytes always decode");
        assert_eq!(instr.key(), InstructionKey::from_word(i));
        let s = instr.to_string();
        drop(s);
    }
}
