//! End-to-end tests against the public API.

use stackcfi::CfiResolver;
use stackcfi::ErrorKind;
use stackcfi::RuleSet;
use stackcfi::StackFrame;

use test_log::test;


/// Symbol data with the full zoo of record types around the CFI
/// records.
const SYM_DATA: &[u8] = b"MODULE Linux x86_64 5c6786ac5c6786ac5c6786ac5c6786ac0 test.bin
INFO CODE_ID 5c6786ac5c6786ac
FILE 0 src/main.c
FILE 1 src/util.c
INLINE_ORIGIN 0 inlined()
PUBLIC 900 0 _start
FUNC 1000 40 0 main
INLINE 0 10 0 0 1004 8
1000 4 10 0
1004 8 11 0
100c 34 12 0
STACK WIN 4 900 30 1 0 0 0 0 0 1 $T0 .raSearch = $eip $T0 ^ =
STACK CFI INIT 1000 40 .cfa: $rsp 8 + .ra: .cfa -8 + ^
STACK CFI 1004 .cfa: $rsp 16 +
STACK CFI 1008 .cfa: $rbp 16 + $rbp: .cfa -24 + ^
FUNC 2000 20 0 helper
2000 20 20 1
STACK CFI INIT 2000 20 .cfa: $rsp 8 + .ra: .cfa -8 + ^
";

fn frame(instruction: u64) -> StackFrame<'static> {
    StackFrame {
        instruction,
        module: "test.bin",
    }
}

fn lookup(resolver: &CfiResolver, instruction: u64) -> Option<RuleSet> {
    resolver.find_cfi_frame_info(&frame(instruction))
}


/// Walk through the lifetime of a lookup against a realistic symbol
/// file.
#[test]
fn resolve_frame_info() {
    let mut resolver = CfiResolver::new(false);
    let () = resolver
        .load_module("test.bin", 0x7f0000000000, SYM_DATA)
        .unwrap();
    assert!(resolver.has_module("test.bin"));
    assert!(!resolver.is_big_endian());

    // At the start of `main` only the initial rules apply.
    let rules = lookup(&resolver, 0x7f0000001000).unwrap();
    assert_eq!(rules.get(".cfa"), Some("$rsp 8 +"));
    assert_eq!(rules.get(".ra"), Some(".cfa -8 + ^"));
    assert_eq!(rules.get("$rbp"), None);

    // Once the second delta took effect, all three registers have
    // rules, with `.cfa` reflecting the latest delta.
    let rules = lookup(&resolver, 0x7f0000001023).unwrap();
    assert_eq!(rules.len(), 3);
    assert_eq!(rules.get(".cfa"), Some("$rbp 16 +"));
    assert_eq!(rules.get(".ra"), Some(".cfa -8 + ^"));
    assert_eq!(rules.get("$rbp"), Some(".cfa -24 + ^"));

    // `helper`'s range is unaffected by `main`'s deltas.
    let rules = lookup(&resolver, 0x7f0000002010).unwrap();
    assert_eq!(rules.get(".cfa"), Some("$rsp 8 +"));

    // The gap between the two ranges has no coverage.
    assert_eq!(lookup(&resolver, 0x7f0000001040), None);
    // Neither does `_start`, which only has a STACK WIN record.
    assert_eq!(lookup(&resolver, 0x7f0000000900), None);

    assert!(resolver.unload_module("test.bin"));
    assert_eq!(lookup(&resolver, 0x7f0000001000), None);
}

/// Check delta boundary behavior through the public API.
#[test]
fn resolve_at_delta_boundaries() {
    let mut resolver = CfiResolver::new(false);
    let () = resolver
        .load_module("test.bin", 0x7f0000000000, SYM_DATA)
        .unwrap();

    // One before the first delta.
    let rules = lookup(&resolver, 0x7f0000001003).unwrap();
    assert_eq!(rules.get(".cfa"), Some("$rsp 8 +"));
    // Exactly at the first delta.
    let rules = lookup(&resolver, 0x7f0000001004).unwrap();
    assert_eq!(rules.get(".cfa"), Some("$rsp 16 +"));
    // One before the second delta.
    let rules = lookup(&resolver, 0x7f0000001007).unwrap();
    assert_eq!(rules.get(".cfa"), Some("$rsp 16 +"));
    // The last byte of the range.
    let rules = lookup(&resolver, 0x7f000000103f).unwrap();
    assert_eq!(rules.get(".cfa"), Some("$rbp 16 +"));
}

/// Check that malformed rule text surfaces as an empty lookup result,
/// not as an error or a partial rule set.
#[test]
fn resolve_with_malformed_rule_text() {
    let sym_data = b"MODULE Linux x86_64 5c6786ac5c6786ac5c6786ac5c6786ac0 test.bin
STACK CFI INIT 1000 20 .cfa: $rsp 8 + .ra: .cfa -8 + ^
STACK CFI 1008 this is no rule set
STACK CFI INIT 2000 20 broken:
";
    let mut resolver = CfiResolver::new(false);
    let () = resolver
        .load_module("test.bin", 0x7f0000000000, sym_data)
        .unwrap();

    // Before the malformed delta everything is fine.
    assert!(lookup(&resolver, 0x7f0000001004).is_some());
    // At and after it, the lookup is void.
    assert_eq!(lookup(&resolver, 0x7f0000001008), None);
    assert_eq!(lookup(&resolver, 0x7f000000101f), None);
    // As is any lookup in the range with broken initial rules.
    assert_eq!(lookup(&resolver, 0x7f0000002000), None);
}

/// Check that module loading reports errors as expected.
#[test]
fn load_errors() {
    let mut resolver = CfiResolver::new(true);
    assert!(resolver.is_big_endian());

    let err = resolver
        .load_module("test.bin", 0x1000, b"definitely not symbol data\n")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    // The error message names the module.
    assert!(err.to_string().contains("test.bin"), "{err}");

    let () = resolver.load_module("test.bin", 0x1000, SYM_DATA).unwrap();
    let err = resolver
        .load_module("test.bin", 0x2000, SYM_DATA)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
