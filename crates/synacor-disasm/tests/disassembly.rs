//! Integration tests for full-image disassembly against the public API.

use synacor_disasm::disassemble_stream;

#[test]
fn a_greeting_program_coalesces_into_one_string_then_halts() {
    // out 'H'; out 'e'; out 'l'; out 'l'; out 'o'; out '\n'; halt
    let mem: Vec<i16> = vec![19, 72, 19, 101, 19, 108, 19, 108, 19, 111, 19, 10, 0];
    let lines = disassemble_stream(&mem, None);

    assert_eq!(lines[0], "0000: out \"Hello\\n\"");
    assert_eq!(lines[1], "000c: halt");
}

#[test]
fn a_marked_printable_data_region_coalesces_into_one_dw_string() {
    // noop; <three printable data words>; halt
    let mem: Vec<i16> = vec![21, 65, 66, 67, 0];
    let lines = disassemble_stream(&mem, Some(&(1..4)));

    assert_eq!(lines[0], "0000: noop");
    assert_eq!(lines[1], "0001: dw \"ABC\"");
    assert_eq!(lines[2], "0004: halt");
}

#[test]
fn a_marked_non_printable_data_region_splits_into_individual_dw_lines() {
    // noop; <three non-printable data words>; halt
    let mem: Vec<i16> = vec![21, 1, 2, 3, 0];
    let lines = disassemble_stream(&mem, Some(&(1..4)));

    assert_eq!(lines[0], "0000: noop");
    assert_eq!(lines[1], "0001: dw 0001");
    assert_eq!(lines[2], "0002: dw 0002");
    assert_eq!(lines[3], "0003: dw 0003");
    assert_eq!(lines[4], "0004: halt");
}

#[test]
fn an_open_out_run_flushes_before_a_raw_data_word_that_looks_like_out() {
    // out 'H'; out 'i'; <data word whose value happens to equal opcode 19>; halt
    let mem: Vec<i16> = vec![19, 72, 19, 105, 19, 0];
    let lines = disassemble_stream(&mem, Some(&(4..5)));

    assert_eq!(lines[0], "0000: out \"Hi\"");
    assert_eq!(lines[1], "0004: dw 0013");
    assert_eq!(lines[2], "0005: halt");
}

#[test]
fn a_register_operand_never_gets_swept_into_a_coalesced_run() {
    // out 'H'; out r0; out 'i'
    let mem: Vec<i16> = vec![19, 72, 19, -32768, 19, 105];
    let lines = disassemble_stream(&mem, None);

    assert_eq!(lines[0], "0000: out \"H\"");
    assert_eq!(lines[1], "0002: out r0");
    assert_eq!(lines[2], "0004: out \"i\"");
}
