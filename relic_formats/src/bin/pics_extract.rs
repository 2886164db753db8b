use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use relic_formats::{PictureArchive, PictureKind};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Extract per-age picture archives", version)]
struct Args {
    /// Picture archive to extract (may be passed multiple times)
    #[arg(long = "archive", value_name = "PATH", conflicts_with = "root")]
    archives: Vec<PathBuf>,

    /// Directory scanned recursively for `*pics` archives when --archive is not used
    #[arg(long = "root", value_name = "DIR", conflicts_with = "archives")]
    root: Option<PathBuf>,

    /// Destination directory for the extracted images
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Only extract these picture ids (may repeat)
    #[arg(long = "id", value_name = "ID")]
    ids: Vec<u16>,

    /// Overwrite existing files instead of skipping them
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let archives = resolve_archive_paths(&args);
    if archives.is_empty() {
        bail!("no picture archives to extract");
    }

    let filter: Option<HashSet<u16>> = if args.ids.is_empty() {
        None
    } else {
        Some(args.ids.iter().copied().collect())
    };

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    for path in archives {
        let archive = PictureArchive::open(&path)?;
        extract_archive(&archive, &args.dest, filter.as_ref(), args.overwrite)?;
    }

    Ok(())
}

fn resolve_archive_paths(args: &Args) -> Vec<PathBuf> {
    let mut archives = Vec::new();

    if !args.archives.is_empty() {
        archives.extend(args.archives.iter().cloned());
    } else if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root).into_iter().filter_map(|res| res.ok()) {
            let is_archive = entry
                .file_name()
                .to_str()
                .map(|name| name.len() == 6 && name.to_ascii_lowercase().ends_with("pics"))
                .unwrap_or(false);
            if entry.file_type().is_file() && is_archive {
                archives.push(entry.into_path());
            }
        }
    }

    archives.sort();
    archives.dedup();
    archives
}

fn extract_archive(
    archive: &PictureArchive,
    dest_root: &Path,
    filter: Option<&HashSet<u16>>,
    overwrite: bool,
) -> Result<()> {
    let archive_name = archive
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .unwrap_or_else(|| "pics".to_string());

    let archive_dest = dest_root.join(archive_name);
    fs::create_dir_all(&archive_dest)
        .with_context(|| format!("creating {}", archive_dest.display()))?;

    let mut extracted = 0usize;
    for entry in archive.entries() {
        if filter.is_some_and(|ids| !ids.contains(&entry.id)) {
            continue;
        }

        let extension = match entry.kind {
            PictureKind::Jpeg => "jpg",
            PictureKind::Pict => "pict",
            PictureKind::Unknown(_) => "bin",
        };
        let dest_path = archive_dest.join(format!("{:05}.{extension}", entry.id));
        if dest_path.exists() && !overwrite {
            continue;
        }

        archive
            .extract_entry(entry, &dest_path)
            .with_context(|| format!("extracting picture {}", entry.id))?;
        extracted += 1;
    }

    println!(
        "Extracted {} pictures from {} into {}",
        extracted,
        archive.path().display(),
        archive_dest.display()
    );

    Ok(())
}
