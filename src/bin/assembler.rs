//! Assembly to bytecode compiler CLI.
//!
//! Reads an assembly source file, compiles it to script bytecode and
//! optionally prints the disassembly or a dry-run gas profile.
//!
//! # Usage
//! ```text
//! assembler <input.asm> [OPTIONS]
//! ```
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.bin`)
//! - `-d, --disassemble`: Print the listing of the compiled script
//! - `-p, --predict [price]`: Estimate execution gas (price defaults to 1)
//! - `--protocol <version>`: Protocol version for the estimate (defaults to latest)
//!
//! # Examples
//! ```text
//! assembler program.asm
//! assembler program.asm -o output.bin -d
//! assembler program.asm -p 100 --protocol 1
//! ```

use ledger_vm::config::{LATEST_PROTOCOL_VERSION, ProtocolVersion, RuntimeConfig};
use ledger_vm::virtual_machine::assembler::assemble_file;
use ledger_vm::virtual_machine::disassembler::disassemble_to_string;
use ledger_vm::virtual_machine::gas::estimate_gas;
use ledger_vm::virtual_machine::vm::ExecutionState;
use ledger_vm::{error, info, warn};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut disassemble = false;
    let mut predict = false;
    let mut gas_price = BigInt::from(1);
    let mut protocol_version: ProtocolVersion = LATEST_PROTOCOL_VERSION;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "--disassemble" | "-d" => {
                disassemble = true;
                i += 1;
            }
            "--predict" | "-p" => {
                predict = true;
                if i + 1 < args.len() && !args[i + 1].starts_with('-') {
                    i += 1;
                    gas_price = args[i].parse::<BigInt>().unwrap_or_else(|_| {
                        error!("Invalid gas price: '{}' is not a valid number", args[i]);
                        process::exit(1);
                    });
                    if gas_price <= BigInt::zero() {
                        error!("Gas price must be greater than 0");
                        process::exit(1);
                    }
                }
                i += 1;
            }
            "--protocol" => {
                i += 1;
                protocol_version = args
                    .get(i)
                    .and_then(|v| v.parse::<ProtocolVersion>().ok())
                    .filter(|v| (1..=LATEST_PROTOCOL_VERSION).contains(v))
                    .unwrap_or_else(|| {
                        error!("--protocol expects a version between 1 and {LATEST_PROTOCOL_VERSION}");
                        process::exit(1);
                    });
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let output_path = output_path.unwrap_or_else(|| {
        let p = Path::new(input_path);
        let stem = p.file_stem().unwrap_or_default().to_string_lossy();
        let parent = p.parent().unwrap_or(Path::new("."));
        parent
            .join(format!("{}.bin", stem))
            .to_string_lossy()
            .into_owned()
    });

    if let Some(parent) = Path::new(&output_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    // assemble_file already logged the diagnostic
    let Ok(assembled) = assemble_file(input_path) else {
        process::exit(1);
    };

    if let Err(e) = fs::write(&output_path, &assembled.script) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }

    info!(
        "Compiled {} -> {} ({} bytes)",
        input_path,
        output_path,
        assembled.script.len()
    );
    for (label, offset) in &assembled.entry_points {
        info!("  pub {label} @ {offset}");
    }

    if disassemble {
        match disassemble_to_string(&assembled.script) {
            Ok(listing) => print!("{listing}"),
            Err(e) => {
                error!("Disassembly failed: {e}");
                process::exit(1);
            }
        }
    }

    if predict {
        let config = RuntimeConfig::default().with_protocol_version(protocol_version);
        let estimate = estimate_gas(&assembled.script, &config).unwrap_or_else(|e| {
            error!("{e}");
            process::exit(1)
        });
        if estimate.state != ExecutionState::Halt {
            warn!("Dry run stopped in state {:?}", estimate.state);
        }

        let profile = estimate.gas.profile();
        let total = profile.total();

        let cat_w = 2 + profile
            .iter()
            .map(|(c, _)| c.as_str().chars().count())
            .max()
            .unwrap_or(0)
            .max("total".chars().count());

        let amt_w = profile
            .iter()
            .map(|(_, a)| format_with_commas(a).chars().count())
            .max()
            .unwrap_or(0)
            .max(format_with_commas(&total).chars().count());

        let dash_w = cat_w + 1 + amt_w + 2 + "( 100.0%)".len();

        println!("Gas Profile (protocol v{protocol_version}):");
        println!("{}", "-".repeat(dash_w));

        for (category, amount) in profile.iter() {
            if amount.is_zero() {
                continue;
            }
            println!(
                "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
                category.as_str(),
                format_with_commas(amount),
                percent(amount, &total),
            );
        }

        println!("{}", "-".repeat(dash_w));
        println!(
            "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
            "total",
            format_with_commas(&total),
            100.0,
        );

        info!(
            "Estimated execution cost: {}",
            format_with_commas(&(&total * &gas_price))
        );
        warn!("Extcalls were charged without effect; actual cost depends on chain state.");
    }
}

fn percent(amount: &BigInt, total: &BigInt) -> f64 {
    match (amount.to_f64(), total.to_f64()) {
        (Some(a), Some(t)) if t > 0.0 => a / t * 100.0,
        _ => 0.0,
    }
}

fn format_with_commas(n: &BigInt) -> String {
    let s = n.to_string();
    let (sign, digits) = s.split_at(if s.starts_with('-') { 1 } else { 0 });
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    result.push_str(sign);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

const USAGE: &str = "\
Assembly Compiler

USAGE:
    {program} <input.asm> [OPTIONS]

ARGS:
    <input.asm>    Assembly source file to compile

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.bin)
    -d, --disassemble       Print the listing of the compiled script
    -p, --predict [price]   Estimate execution gas cost (price defaults to 1)
    --protocol <version>    Protocol version used for the estimate
    -h, --help              Print this help message

EXAMPLES:
    # Compile to default output name
    {program} program.asm

    # Compile with explicit output and print the listing
    {program} program.asm -o output.bin -d

    # Compile and estimate gas cost with custom price under protocol 1
    {program} program.asm -p 100 --protocol 1
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
