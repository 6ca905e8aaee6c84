//! Codecs command - compares compression codecs on a payload.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use casket_codec::CompressionType;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::Context;

const ALL: [CompressionType; 3] = [
    CompressionType::Gzip,
    CompressionType::Lz4,
    CompressionType::QuickLz,
];

/// Arguments for the codecs command.
#[derive(Args, Debug)]
pub struct CodecsArgs {
    /// File to compress (default: a generated session-like payload)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Only try this codec
    #[arg(long)]
    pub codec: Option<String>,
}

#[derive(Debug, Serialize)]
struct CodecReport {
    codec: &'static str,
    input_bytes: usize,
    output_bytes: usize,
    ratio: f64,
}

/// Run the codecs command.
pub async fn run(args: CodecsArgs, ctx: &Context) -> Result<()> {
    let payload = match &args.input {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        None => sample_payload(),
    };

    let kinds = match &args.codec {
        Some(name) => vec![name.parse::<CompressionType>()?],
        None => ALL.to_vec(),
    };

    let mut reports = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let Some(codec) = kind.build() else {
            continue;
        };
        let packed = codec.compress(&payload)?;
        if codec.decompress(&packed)? != payload {
            bail!("{} did not reproduce its input", codec.name());
        }
        reports.push(CodecReport {
            codec: codec.name(),
            input_bytes: payload.len(),
            output_bytes: packed.len(),
            ratio: packed.len() as f64 / payload.len().max(1) as f64,
        });
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Codec Comparison").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    for r in &reports {
        println!(
            "  {:<8} {:>10} -> {:>10}  {}",
            r.codec,
            r.input_bytes,
            r.output_bytes,
            dim.apply_to(format!("{:.1}%", r.ratio * 100.0))
        );
    }
    println!();
    Ok(())
}

/// Repetitive JSON-ish text, shaped like a real session body.
fn sample_payload() -> Vec<u8> {
    let mut out = String::with_capacity(16 * 1024);
    for i in 0..256 {
        out.push_str(&format!(
            "{{\"item\":{i},\"sku\":\"SKU-{:05}\",\"qty\":{},\"note\":\"added from catalogue\"}}\n",
            i * 7,
            i % 5 + 1
        ));
    }
    out.into_bytes()
}
