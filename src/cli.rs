use std::io::{self, Write};
use knnclass::session::format_confidence;
use knnclass::{ModelPayload, ResultSink, SessionController, SessionEvent};

pub enum Command {
    Train { label: String },
    Stop,
    Frame { vec: Vec<f32> },
    Clear { label: String },
    Counts,
    Confidence { label: String },
    Classification,
    Save { path: String },
    Load { path: String },
}

/// Prints session events to the terminal.
struct ConsoleSink;

impl ResultSink for ConsoleSink {
    fn emit(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Ready => println!("Classifier ready"),
            SessionEvent::SampleCounts { labels, counts } => {
                let pairs: Vec<String> = labels.iter()
                    .zip(counts.iter())
                    .map(|(l, c)| format!("{}={}", l, c))
                    .collect();
                println!("Samples: [{}]", pairs.join(", "));
            }
            SessionEvent::Confidences { labels, confidences } => {
                let pairs: Vec<String> = labels.iter()
                    .zip(confidences.iter())
                    .map(|(l, c)| match c {
                        Some(c) => format!("{}={}", l, format_confidence(*c)),
                        None => format!("{}=-", l),
                    })
                    .collect();
                println!("Confidences: [{}]", pairs.join(", "));
            }
            SessionEvent::Classification { label } => println!("Classification: '{}'", label),
            SessionEvent::ModelSaved { name } => println!("Model saved to '{}'", name),
            SessionEvent::ModelLoaded { name } => println!("Model loaded from '{}'", name),
            SessionEvent::Error { code, message } => eprintln!("Error ({}): {}", code, message),
        }
    }
}

/// Parse a command from a provided argument vector
pub fn parse_command_from_args(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command provided. Use: train, stop, frame, clear, counts, confidence, classification, save, load".to_string());
    }

    let command = &args[1];

    match command.as_str() {
        "train" => parse_label(args, "train").map(|label| Command::Train { label }),
        "stop" => Ok(Command::Stop),
        "frame" => parse_frame(args),
        "clear" => parse_label(args, "clear").map(|label| Command::Clear { label }),
        "counts" => Ok(Command::Counts),
        "confidence" => parse_label(args, "confidence").map(|label| Command::Confidence { label }),
        "classification" => Ok(Command::Classification),
        "save" => parse_path(args, "save").map(|path| Command::Save { path }),
        "load" => parse_path(args, "load").map(|path| Command::Load { path }),
        _ => Err(format!("Unknown command: {}. Available: train, stop, frame, clear, counts, confidence, classification, save, load", command)),
    }
}

/// Parse a command taking one label; labels may contain spaces
/// Usage: <command> <label>
fn parse_label(args: &[String], command: &str) -> Result<String, String> {
    if args.len() < 3 {
        return Err(format!("'{}' command requires a label. Usage: {} <label>", command, command));
    }
    Ok(args[2..].join(" "))
}

/// Parse the 'frame' command
/// Usage: frame <v1> <v2> ...
fn parse_frame(args: &[String]) -> Result<Command, String> {
    if args.len() < 3 {
        return Err("'frame' command requires an embedding. Usage: frame <v1> <v2> ...".to_string());
    }

    let vec: Result<Vec<f32>, _> = args[2..].iter()
        .map(|s| s.parse::<f32>())
        .collect();

    match vec {
        Ok(v) => Ok(Command::Frame { vec: v }),
        Err(_) => Err("Failed to parse embedding components as numbers".to_string()),
    }
}

/// Parse a command taking a file path
fn parse_path(args: &[String], command: &str) -> Result<String, String> {
    if args.len() < 3 {
        return Err(format!("'{}' command requires a file path. Usage: {} <path>", command, command));
    }
    Ok(args[2].clone())
}

/// REPL mode - interactive session
pub fn run_repl(session: &mut SessionController) {
    println!("KNNCLASS - Online Nearest-Neighbour Classifier");
    println!("Type 'help' for commands, 'exit' or 'quit' to quit\n");

    loop {
        print!("knnclass> ");
        if let Err(error) = io::stdout().flush() {
            eprintln!("Error writing prompt: {}", error);
        }

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                continue;
            }
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input == "exit" || input == "quit" {
            println!("Goodbye!");
            break;
        }

        if input == "help" {
            print_help();
            continue;
        }

        let mut args: Vec<String> = vec!["knnclass".to_string()];
        args.extend(input.split_whitespace().map(|s| s.to_string()));

        let command = match parse_command_from_args(&args) {
            Ok(cmd) => cmd,
            Err(error) => {
                eprintln!("Error: {}", error);
                continue;
            }
        };

        execute_command(session, command);
    }
}

fn execute_command(session: &mut SessionController, command: Command) {
    let mut sink = ConsoleSink;

    match command {
        Command::Train { label } => {
            if let Ok(slot) = session.train(&label, &mut sink) {
                println!("Training '{}' on slot {}", label, slot);
            }
        }

        Command::Stop => {
            session.stop_training();
            println!("Training stopped");
        }

        Command::Frame { vec } => {
            if session.on_frame(&vec, &mut sink).is_none() {
                println!("No prediction");
            }
        }

        Command::Clear { label } => {
            let _ = session.clear(&label, &mut sink);
        }

        Command::Counts => {
            let counts = session.sample_counts();
            if counts.is_empty() {
                println!("No labels");
            } else {
                for (label, count) in counts {
                    println!("  {}: {}", label, count);
                }
            }
        }

        Command::Confidence { label } => match session.confidence(&label) {
            Some(c) => println!("{}", format_confidence(c)),
            None => eprintln!("Error: no confidence for '{}'", label),
        },

        Command::Classification => {
            println!("'{}'", session.classification().unwrap_or_default());
        }

        Command::Save { path } => {
            if let Ok(payload) = session.save_model(&path, &mut sink) {
                if let Err(error) = payload.save(&path) {
                    eprintln!("Error: {}", error);
                }
            }
        }

        Command::Load { path } => match ModelPayload::load(&path) {
            Ok(payload) => {
                let _ = session.load_model(&path, &payload, &mut sink);
            }
            Err(error) => eprintln!("Error: {}", error),
        },
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  train <label>            - Add the following frames to a label");
    println!("  stop                     - Stop training");
    println!("  frame <v1> <v2> ...      - Feed one embedding and classify it");
    println!("  clear <label>            - Forget a label and its examples");
    println!("  counts                   - Show example count per label");
    println!("  confidence <label>       - Show the last confidence of a label");
    println!("  classification           - Show the current top choice");
    println!("  save <path>              - Save the model to a file");
    println!("  load <path>              - Load a model from a file");
    println!("  help                     - Show this help");
    println!("  exit, quit               - Exit the program");
}
