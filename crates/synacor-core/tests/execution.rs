//! Integration tests exercising whole programs against the public API:
//! assemble a word list, pack it into an image, and run it to completion.

use synacor_core::{pack, Breaks, HostIo, Image, Machine, StopReason};

/// Canned input/output harness: feeds `lines` to `in`, one at a time,
/// and records every character the guest writes via `out`.
struct ScriptedIo {
    lines: Vec<String>,
    output: String,
}

impl ScriptedIo {
    fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().rev().map(|s| (*s).to_string()).collect(),
            output: String::new(),
        }
    }
}

impl HostIo for ScriptedIo {
    fn read_line(&mut self) -> Option<String> {
        self.lines.pop()
    }

    fn emit(&mut self, c: char) {
        self.output.push(c);
    }
}

fn assemble(words: &[i16]) -> Image {
    let bytes = pack(words);
    Image::new(bytes)
}

fn run_to_halt(machine: &mut Machine, io: &mut dyn HostIo) -> StopReason {
    let breaks = Breaks::new();
    machine.run(io, &breaks, &|| false)
}

#[test]
fn arithmetic_then_output_then_halt() {
    // add r0, 4, 6; out r0 ('\n' would be 10); halt
    let mut machine = Machine::new(assemble(&[9, -32768, 4, 6, 19, -32768, 0]));
    let mut io = ScriptedIo::new(&[]);
    let stop = run_to_halt(&mut machine, &mut io);

    assert!(matches!(stop, StopReason::Halted(_)));
    assert_eq!(io.output, "\n");
}

#[test]
fn call_pushes_a_shadow_frame_and_ret_pops_it() {
    // call 5; halt; <gap>; ret
    let mut machine = Machine::new(assemble(&[17, 5, 0, 0, 0, 18]));
    let mut io = ScriptedIo::new(&[]);
    let breaks = Breaks::new();

    machine.run_next(&mut io, &breaks, &|| false); // call
    assert_eq!(machine.callstack(), &[0, 0]);

    machine.run_next(&mut io, &breaks, &|| false); // ret
    assert_eq!(machine.callstack(), &[0]);
    assert_eq!(machine.image.ip, 2);
}

#[test]
fn input_is_consumed_character_by_character_across_in_instructions() {
    // in r0; in r0; in r0; halt
    let mut machine = Machine::new(assemble(&[20, -32768, 20, -32768, 20, -32768, 0]));
    let mut io = ScriptedIo::new(&["hi"]);
    let breaks = Breaks::new();

    machine.run_next(&mut io, &breaks, &|| false);
    assert_eq!(machine.image.reg[0], b'h' as u16);
    machine.run_next(&mut io, &breaks, &|| false);
    assert_eq!(machine.image.reg[0], b'i' as u16);
    machine.run_next(&mut io, &breaks, &|| false);
    assert_eq!(machine.image.reg[0], b'\n' as u16);
}

#[test]
fn breakpoint_stops_execution_before_the_watched_instruction() {
    // noop; noop; halt
    let mut machine = Machine::new(assemble(&[21, 21, 0]));
    let mut io = ScriptedIo::new(&[]);
    let mut breaks = Breaks::new();
    breaks.add(1);

    let stop = machine.run(&mut io, &breaks, &|| false);
    assert_eq!(stop, StopReason::Break);
    assert_eq!(machine.image.ip, 1);
    assert!(!machine.is_halted());
}

#[test]
fn snapshot_round_trips_through_the_public_save_load_path() {
    let mut machine = Machine::new(assemble(&[9, -32768, 1, 2, 0]));
    let mut io = ScriptedIo::new(&[]);
    run_to_halt(&mut machine, &mut io);

    let mut buf = Vec::new();
    machine.image.write_snapshot(&mut buf).expect("snapshot write");

    let restored = Image::read_snapshot(&buf[..]).expect("snapshot read");
    assert_eq!(restored.reg[0], machine.image.reg[0]);
    assert_eq!(restored.mem, machine.image.mem);
}
