//! CLI tool for converting legacy characterization logs.
//!
//! Rewrites a legacy-schema JSON into the native experiment-log schema.
//!
//! # Usage
//!
//! ```bash
//! convert_log old_drivetrain_data.json
//! ```

use std::env;

use yantra_sysid::convert_legacy_log;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let path = match args.as_slice() {
        [_, path] if path != "-h" && path != "--help" => path,
        _ => {
            eprintln!("Usage: {} <LEGACY_LOG.json>", args.first().map(String::as_str).unwrap_or("convert_log"));
            eprintln!();
            eprintln!("Writes the converted log next to the input as <stem>.sysid.json.");
            std::process::exit(1);
        }
    };

    match convert_legacy_log(path) {
        Ok(output) => println!("Converted log written to {}", output.display()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
