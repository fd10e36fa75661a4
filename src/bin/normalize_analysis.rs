//! Offline normalizer: reads a saved analysis response and prints the normalized envelope.

use cfo_gateway_lib::normalize;
use chrono::Utc;
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "normalize_analysis",
    about = "Normalize a saved document-analysis JSON response into P&L fields"
)]
struct Cli {
    /// Analysis JSON file. Reads stdin when omitted or `-`.
    path: Option<PathBuf>,

    /// Pretty-print the output.
    #[arg(long)]
    pretty: bool,

    /// Print only the field map of each document.
    #[arg(long)]
    fields_only: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let text = match cli.path.as_deref() {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let root: serde_json::Value = serde_json::from_str(&text)?;

    let result = normalize::normalize_value(&root);
    let now = Utc::now();
    let output = if cli.fields_only {
        serde_json::to_value(
            result
                .documents
                .iter()
                .map(|doc| &doc.fields)
                .collect::<Vec<_>>(),
        )?
    } else {
        serde_json::to_value(normalize::envelope(result, now, now))?
    };

    if cli.pretty {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{output}");
    }
    Ok(())
}
