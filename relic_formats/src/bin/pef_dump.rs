use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relic_formats::pef::{decompress_segment_from_file, read_section_count, read_section_descriptor};

/// List the sections of a PowerPC executable and unpack one of them.
#[derive(Parser)]
struct Args {
    /// Executable data fork
    path: PathBuf,

    /// Section to unpack
    #[arg(long, default_value_t = 1)]
    section: usize,

    /// Write the unpacked section here
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let file = File::open(&args.path).with_context(|| format!("opening {}", args.path.display()))?;
    let mut reader = BufReader::new(file);

    let count = read_section_count(&mut reader)?;
    println!("{} sections in {}", count, args.path.display());
    for index in 0..count as usize {
        let section = read_section_descriptor(&mut reader, index)?;
        println!(
            "{index:>3}  kind {:>2}  offset {:>#10x}  packed {:>8}  unpacked {:>8}  total {:>8}",
            section.kind,
            section.container_offset,
            section.packed_size,
            section.unpacked_size,
            section.total_size
        );
    }

    if let Some(out) = args.out {
        let data = decompress_segment_from_file(&args.path, args.section)?;
        fs::write(&out, &data).with_context(|| format!("writing {}", out.display()))?;
        println!(
            "section {} unpacked to {} ({} bytes)",
            args.section,
            out.display(),
            data.len()
        );
    }

    Ok(())
}
