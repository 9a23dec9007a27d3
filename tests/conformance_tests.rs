//! Conformance tests for the bundled rule set
//!
//! Every action the default rules can emit has a canonical byte sequence
//! that, fed on its own, produces exactly that one event and nothing else.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use termproxy::{compile_default, Event, Param, ParserMode, Recognizer};

const ESC: u8 = 0x1B;
const IAC: u8 = 0xFF;

/// Feed `input` to a fresh recognizer, returning events and unknown reports
fn run(input: &[u8]) -> (Vec<Event>, Vec<Vec<u8>>) {
    let unknown = Arc::new(Mutex::new(Vec::new()));
    let mut recognizer = Recognizer::new(Arc::new(compile_default().unwrap()));
    let sink = Arc::clone(&unknown);
    recognizer.on_unknown_sequence(move |bytes| sink.lock().unwrap().push(bytes.to_vec()));

    let events = recognizer.feed(input);
    assert_eq!(recognizer.mode(), ParserMode::Normal, "input left a submode open: {:?}", input);
    recognizer.flush();

    let unknown = unknown.lock().unwrap().clone();
    (events, unknown)
}

fn esc(rest: &[u8]) -> Vec<u8> {
    let mut v = vec![ESC];
    v.extend_from_slice(rest);
    v
}

fn csi(rest: &[u8]) -> Vec<u8> {
    esc(&[&b"["[..], rest].concat())
}

/// One canonical sequence per (action, sequence) pair
fn canonical_sequences() -> Vec<(&'static str, Vec<u8>)> {
    let mut table: Vec<(&'static str, Vec<u8>)> = vec![
        ("t_printable", b"A".to_vec()),
        ("t_printable", vec![0xE9]),
        // C0 controls
        ("t_null", vec![0x00]),
        ("t_bell", vec![0x07]),
        ("t_backspace", vec![0x08]),
        ("t_tab", vec![0x09]),
        ("t_line_feed", vec![0x0A]),
        ("t_vertical_tab", vec![0x0B]),
        ("t_form_feed", vec![0x0C]),
        ("t_carriage_return", vec![0x0D]),
        ("t_shift_out", vec![0x0E]),
        ("t_shift_in", vec![0x0F]),
        ("t_delete", vec![0x7F]),
        // ESC sequences
        ("t_save_cursor", esc(b"7")),
        ("t_restore_cursor", esc(b"8")),
        ("t_index", esc(b"D")),
        ("t_next_line", esc(b"E")),
        ("t_tab_set", esc(b"H")),
        ("t_reverse_index", esc(b"M")),
        ("t_single_shift_g2", esc(b"N")),
        ("t_single_shift_g3", esc(b"O")),
        ("t_full_reset", esc(b"c")),
        ("t_keypad_application", esc(b"=")),
        ("t_keypad_numeric", esc(b">")),
        ("t_screen_alignment", esc(b"#8")),
        ("t_string_terminator", esc(b"\\")),
        ("t_designate_g0", esc(b"(B")),
        ("t_designate_g1", esc(b")0")),
        ("t_designate_g2", esc(b"*A")),
        ("t_designate_g3", esc(b"+B")),
        ("t_select_coding", esc(b"%G")),
        // OSC
        ("t_osc", esc(b"]0;title\x07")),
        ("t_osc", esc(b"]2;title\x1b\\")),
        // CSI with marker or intermediates
        ("t_csi_unknown", csi(b"z")),
        ("t_dec_private_mode_set", csi(b"?25h")),
        ("t_dec_private_mode_reset", csi(b"?25l")),
        ("t_dec_private_mode_save", csi(b"?1049s")),
        ("t_dec_private_mode_restore", csi(b"?1049r")),
        ("t_dec_device_status_report", csi(b"?6n")),
        ("t_dec_selective_erase_display", csi(b"?2J")),
        ("t_dec_selective_erase_line", csi(b"?1K")),
        ("t_secondary_device_attributes", csi(b">c")),
        ("t_xterm_modify_keys", csi(b">4;2m")),
        ("t_tertiary_device_attributes", csi(b"=c")),
        ("t_soft_reset", csi(b"!p")),
        ("t_cursor_style", csi(b"2 q")),
        // Telnet
        ("t_telnet_data_ff", vec![IAC, IAC]),
        ("t_telnet_will", vec![IAC, 0xFB, 0x01]),
        ("t_telnet_wont", vec![IAC, 0xFC, 0x01]),
        ("t_telnet_do", vec![IAC, 0xFD, 0x18]),
        ("t_telnet_dont", vec![IAC, 0xFE, 0x1F]),
        ("t_telnet_subnegotiation", vec![IAC, 0xFA, 0x18, 0x00, b'x', IAC, 0xF0]),
        ("t_telnet_nop", vec![IAC, 0xF1]),
        ("t_telnet_data_mark", vec![IAC, 0xF2]),
        ("t_telnet_break", vec![IAC, 0xF3]),
        ("t_telnet_interrupt", vec![IAC, 0xF4]),
        ("t_telnet_abort_output", vec![IAC, 0xF5]),
        ("t_telnet_are_you_there", vec![IAC, 0xF6]),
        ("t_telnet_erase_char", vec![IAC, 0xF7]),
        ("t_telnet_erase_line", vec![IAC, 0xF8]),
        ("t_telnet_go_ahead", vec![IAC, 0xF9]),
        ("t_telnet_end_of_record", vec![IAC, 0xEF]),
    ];

    let csi_finals: &[(&str, u8)] = &[
        ("t_insert_chars", b'@'),
        ("t_cursor_up", b'A'),
        ("t_cursor_down", b'B'),
        ("t_cursor_forward", b'C'),
        ("t_cursor_back", b'D'),
        ("t_cursor_next_line", b'E'),
        ("t_cursor_prev_line", b'F'),
        ("t_cursor_column", b'G'),
        ("t_cursor_position", b'H'),
        ("t_cursor_forward_tab", b'I'),
        ("t_erase_display", b'J'),
        ("t_erase_line", b'K'),
        ("t_insert_lines", b'L'),
        ("t_delete_lines", b'M'),
        ("t_delete_chars", b'P'),
        ("t_scroll_up", b'S'),
        ("t_scroll_down", b'T'),
        ("t_erase_chars", b'X'),
        ("t_cursor_back_tab", b'Z'),
        ("t_cursor_column_absolute", b'`'),
        ("t_cursor_column_relative", b'a'),
        ("t_repeat_char", b'b'),
        ("t_device_attributes", b'c'),
        ("t_cursor_row", b'd'),
        ("t_cursor_row_relative", b'e'),
        ("t_cursor_position", b'f'),
        ("t_tab_clear", b'g'),
        ("t_set_mode", b'h'),
        ("t_reset_mode", b'l'),
        ("t_sgr", b'm'),
        ("t_device_status_report", b'n'),
        ("t_scroll_region", b'r'),
        ("t_save_cursor_position", b's'),
        ("t_window_ops", b't'),
        ("t_restore_cursor_position", b'u'),
    ];
    for &(action, final_byte) in csi_finals {
        table.push((action, csi(&[b'1', final_byte])));
    }

    table
}

// ============================================================================
// Round-trip coverage
// ============================================================================

#[test]
fn test_every_canonical_sequence_yields_one_event() {
    for (action, input) in canonical_sequences() {
        let (events, unknown) = run(&input);

        assert_eq!(events.len(), 1, "{} from {:?}: {:?}", action, input, events);
        assert!(events[0].is(action), "expected {} from {:?}, got {:?}", action, input, events[0]);
        assert!(unknown.is_empty(), "{} from {:?} reported {:?}", action, input, unknown);
    }
}

#[test]
fn test_canonical_sequences_cover_every_action() {
    let automaton = compile_default().unwrap();
    let covered: BTreeSet<&str> = canonical_sequences().iter().map(|(a, _)| *a).collect();
    let defined: BTreeSet<&str> = automaton.action_names();

    assert_eq!(covered, defined);
}

#[test]
fn test_canonical_sequences_byte_at_a_time() {
    for (action, input) in canonical_sequences() {
        let mut recognizer = Recognizer::new(Arc::new(compile_default().unwrap()));
        let mut events = Vec::new();
        for b in &input {
            events.extend(recognizer.feed(std::slice::from_ref(b)));
        }
        assert_eq!(events, run(&input).0, "{} split byte by byte", action);
    }
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_cursor_position_params() {
    let (events, _) = run(b"\x1b[1;2H");
    assert_eq!(events.len(), 1);
    assert!(events[0].is("t_cursor_position"));
    assert_eq!(events[0].params, vec![Param::Int(1), Param::Int(2)]);
}

#[test]
fn test_sgr_params() {
    let (events, _) = run(b"\x1b[1;38;5;196m\x1b[m");
    assert_eq!(events[0].ints(), vec![1, 38, 5, 196]);
    assert!(events[1].params.is_empty());
}

#[test]
fn test_sgr_colon_subparams_pass_through() {
    let (events, _) = run(b"\x1b[38:2:255:0:0m");
    assert_eq!(events[0].params, vec![Param::Text("38:2:255:0:0".to_string())]);
}

#[test]
fn test_printable_param() {
    let (events, _) = run(b"A");
    assert_eq!(events[0].params, vec![Param::Byte(b'A')]);
}

#[test]
fn test_telnet_option_captured() {
    let (events, _) = run(&[IAC, 0xFB, 0x01]);
    assert!(events[0].is("t_telnet_will"));
    assert_eq!(events[0].params, vec![Param::Byte(1)]);
}

#[test]
fn test_designation_charset_captured() {
    let (events, _) = run(b"\x1b(0");
    assert_eq!(events[0].params, vec![Param::Byte(b'0')]);
}

#[test]
fn test_unknown_csi_carries_raw_sequence() {
    let (events, unknown) = run(b"\x1b[?99z");
    assert!(events[0].is("t_csi_unknown"));
    assert_eq!(events[0].params, vec![Param::Bytes(b"\x1b[?99z".to_vec())]);
    assert!(unknown.is_empty());
}

// ============================================================================
// Unknown bytes
// ============================================================================

#[test]
fn test_unassigned_control_is_reported() {
    let (events, unknown) = run(&[0x01, b'x']);
    assert_eq!(events.len(), 1);
    assert_eq!(unknown, vec![vec![0x01]]);
}

#[test]
fn test_stuck_telnet_prefix_is_reported_per_byte() {
    let (events, unknown) = run(&[IAC, 0x01]);
    assert!(events.is_empty());
    assert_eq!(unknown, vec![vec![IAC], vec![0x01]]);
}

#[test]
fn test_stray_subnegotiation_end_retried_from_root() {
    // IAC SE outside a subnegotiation has no rule; SE alone is printable
    let (events, unknown) = run(&[IAC, 0xF0]);
    assert_eq!(unknown, vec![vec![IAC]]);
    assert_eq!(events.len(), 1);
    assert!(events[0].is("t_printable"));
    assert_eq!(events[0].params, vec![Param::Byte(0xF0)]);
}

#[test]
fn test_unfinished_sequence_reported_on_flush() {
    let mut recognizer = Recognizer::new(Arc::new(compile_default().unwrap()));
    let unknown = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&unknown);
    recognizer.on_unknown_sequence(move |bytes| sink.lock().unwrap().push(bytes.to_vec()));

    assert!(recognizer.feed(b"\x1b[12").is_empty());
    recognizer.flush();

    assert_eq!(
        *unknown.lock().unwrap(),
        vec![vec![ESC], vec![b'['], vec![b'1'], vec![b'2']]
    );
}
