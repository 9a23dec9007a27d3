//! Termproxy Scanner
//!
//! Feeds a captured byte stream through the recognizer and prints the
//! events it produces, followed by the unknown sequences it saw.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use termproxy::app::{init_logging, Config};
use termproxy::rules::{describe_byte, describe_path};
use termproxy::{Event, Param, Recognizer, SharedDiagnosticLog};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse command line arguments
    let mut input_file: Option<String> = None;
    let mut rules_file: Option<String> = None;
    let mut config_file: Option<String> = None;
    let mut chunk_size: Option<usize> = None;
    let mut output_format = OutputFormat::Text;
    let mut show_help = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-f" | "--file" => {
                i += 1;
                if i < args.len() {
                    input_file = Some(args[i].clone());
                }
            }
            "-r" | "--rules" => {
                i += 1;
                if i < args.len() {
                    rules_file = Some(args[i].clone());
                }
            }
            "-c" | "--chunk" => {
                i += 1;
                if i < args.len() {
                    chunk_size = args[i].parse().ok();
                }
            }
            "--config" => {
                i += 1;
                if i < args.len() {
                    config_file = Some(args[i].clone());
                }
            }
            "-j" | "--json" => {
                output_format = OutputFormat::Json;
            }
            "-h" | "--help" => {
                show_help = true;
            }
            _ => {
                // Treat as input file if no flag
                if input_file.is_none() && !args[i].starts_with('-') {
                    input_file = Some(args[i].clone());
                }
            }
        }
        i += 1;
    }

    if show_help {
        print_help();
        return ExitCode::SUCCESS;
    }

    let mut config = match &config_file {
        Some(path) => match Config::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::load_or_default(),
    };
    if let Some(path) = rules_file {
        config.rules_path = Some(PathBuf::from(path));
    }
    if let Some(size) = chunk_size {
        config.chunk_size = size;
    }

    if let Err(e) = init_logging(&config.log_filter) {
        eprintln!("Error initializing logging: {}", e);
    }

    let automaton = match config.build_automaton() {
        Ok(automaton) => Arc::new(automaton),
        Err(e) => {
            tracing::error!(error = %e, "failed to build recognizer");
            eprintln!("Error compiling rules: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        nodes = automaton.node_count(),
        actions = automaton.action_names().len(),
        "rules loaded"
    );

    // Read input
    let input_data = match &input_file {
        Some(path) => match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut data = Vec::new();
            if let Err(e) = io::stdin().read_to_end(&mut data) {
                eprintln!("Error reading stdin: {}", e);
                return ExitCode::FAILURE;
            }
            data
        }
    };

    let diagnostics = SharedDiagnosticLog::new(config.diagnostic_capacity);
    let mut recognizer = Recognizer::new(automaton);
    diagnostics.attach(&mut recognizer);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Err(e) = scan(&mut recognizer, &config, &input_data, output_format, &mut out) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return ExitCode::SUCCESS;
        }
        eprintln!("Error writing output: {}", e);
        return ExitCode::FAILURE;
    }
    recognizer.flush();

    let log = diagnostics.lock();
    let result = match output_format {
        OutputFormat::Text => {
            writeln!(
                out,
                "--- unknown sequences: {} total, {} kept ---",
                log.total(),
                log.len()
            )
            .and_then(|_| {
                log.iter().try_for_each(|entry| {
                    writeln!(out, "#{} {}", entry.ordinal, describe_path(&entry.bytes))
                })
            })
        }
        OutputFormat::Json => log.iter().try_for_each(|entry| {
            let line = serde_json::json!({ "unknown": entry });
            writeln!(out, "{}", line)
        }),
    };
    if let Err(e) = result.and_then(|_| out.flush()) {
        if e.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("Error writing output: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

/// Feed `input` in configured chunks, writing each event as it completes
fn scan(
    recognizer: &mut Recognizer,
    config: &Config,
    input: &[u8],
    format: OutputFormat,
    out: &mut impl Write,
) -> io::Result<()> {
    for chunk in input.chunks(config.chunk_size.max(1)) {
        recognizer
            .try_feed_with(chunk, |event| write_event(&mut *out, &event, format))
            .map_err(|(_, e)| e)?;

        if config.max_pending_bytes > 0 && recognizer.pending_len() > config.max_pending_bytes {
            tracing::warn!(
                pending = recognizer.pending_len(),
                mode = ?recognizer.mode(),
                "pending bytes over limit, resetting recognizer"
            );
            recognizer.reset();
        }
    }
    Ok(())
}

fn write_event(out: &mut impl Write, event: &Event, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            let line = serde_json::to_string(event).map_err(io::Error::from)?;
            writeln!(out, "{}", line)
        }
        OutputFormat::Text => {
            write!(out, "{}", event.action)?;
            for param in &event.params {
                match param {
                    Param::Byte(b) => write!(out, " {}", describe_byte(*b))?,
                    Param::Int(v) => write!(out, " {}", v)?,
                    Param::Text(s) => write!(out, " {:?}", s)?,
                    Param::Bytes(bytes) => write!(out, " [{}]", describe_path(bytes))?,
                }
            }
            writeln!(out)
        }
    }
}

#[derive(Clone, Copy)]
enum OutputFormat {
    Text,
    Json,
}

fn print_help() {
    println!("Termproxy Scanner");
    println!();
    println!("Usage: termproxy-scan [OPTIONS] [INPUT_FILE]");
    println!();
    println!("Options:");
    println!("  -f, --file <PATH>    Read input from file");
    println!("  -r, --rules <PATH>   Compile rules from file instead of the defaults");
    println!("  -c, --chunk <N>      Feed the recognizer N bytes at a time");
    println!("      --config <PATH>  Load configuration from PATH");
    println!("  -j, --json           Print events as JSON lines");
    println!("  -h, --help           Show this help message");
    println!();
    println!("If no input file is specified, reads from stdin.");
    println!();
    println!("Examples:");
    println!("  printf 'Hi\\x1b[1;2H\\xff\\xfb\\x01' | termproxy-scan");
    println!("  termproxy-scan -c 1 --json session.bin");
}

#[cfg(test)]
mod tests {
    use super::*;
    use termproxy::compile_default;

    fn scan_text(config: &Config, input: &[u8]) -> (Recognizer, Vec<String>) {
        let mut recognizer = Recognizer::new(Arc::new(compile_default().unwrap()));
        let mut out = Vec::new();
        scan(&mut recognizer, config, input, OutputFormat::Text, &mut out).unwrap();
        let lines = String::from_utf8(out).unwrap().lines().map(str::to_string).collect();
        (recognizer, lines)
    }

    /// An OSC with 20 payload bytes that never terminates, then SGR
    fn unterminated_osc() -> Vec<u8> {
        let mut input = b"\x1b]0;".to_vec();
        input.extend_from_slice(&[b'x'; 20]);
        input.extend_from_slice(b"\x1b[1m");
        input
    }

    #[test]
    fn test_pending_cap_resets_recognizer() {
        let config = Config {
            chunk_size: 4,
            max_pending_bytes: 8,
            ..Config::default()
        };
        let (recognizer, lines) = scan_text(&config, &unterminated_osc());

        // The third chunk takes pending to 12; the rest parses from the root
        let printable = lines.iter().filter(|l| l.starts_with("t_printable")).count();
        assert_eq!(printable, 12);
        assert_eq!(lines.last().map(String::as_str), Some("t_sgr 1"));
        assert!(!lines.iter().any(|l| l.starts_with("t_osc")));
        assert_eq!(recognizer.mode(), termproxy::ParserMode::Normal);
        assert_eq!(recognizer.pending_len(), 0);
    }

    #[test]
    fn test_zero_cap_keeps_submode_open() {
        let config = Config {
            chunk_size: 4,
            max_pending_bytes: 0,
            ..Config::default()
        };
        let input = unterminated_osc();
        let (recognizer, lines) = scan_text(&config, &input);

        assert!(lines.is_empty());
        assert_eq!(recognizer.mode(), termproxy::ParserMode::Osc);
        assert_eq!(recognizer.pending_len(), input.len());
    }

    #[test]
    fn test_json_event_line() {
        let mut recognizer = Recognizer::new(Arc::new(compile_default().unwrap()));
        let mut out = Vec::new();
        scan(&mut recognizer, &Config::default(), b"\x1b[2J", OutputFormat::Json, &mut out).unwrap();

        let line: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(line["action"], "t_erase_display");
    }
}
