use std::fs::File;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, ensure};
use byteorder::{BigEndian, ByteOrder};
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PictureKind {
    Jpeg,
    Pict,
    Unknown(u16),
}

impl From<u16> for PictureKind {
    fn from(value: u16) -> Self {
        match value {
            0 => PictureKind::Jpeg,
            1 => PictureKind::Pict,
            other => PictureKind::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PictureEntry {
    pub id: u16,
    pub kind: PictureKind,
    pub offset: u32,
    pub size: u32,
    pub width: u16,
    pub height: u16,
}

impl PictureEntry {
    pub fn data_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.size as usize
    }
}

/// Per-age `<prefix>pics` image archive.
#[derive(Debug)]
pub struct PictureArchive {
    path: PathBuf,
    mmap: Mmap,
    entries: Vec<PictureEntry>,
}

impl PictureArchive {
    /// Open the archive for an age prefix (e.g. `sp` -> `sppics`) in `dir`.
    pub fn open_for_prefix(dir: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        Self::open(dir.as_ref().join(format!("{prefix}pics")))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening picture archive at {}", path_buf.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping picture archive {}", path_buf.display()))?;

        let entries = parse_entries(&mmap)
            .with_context(|| format!("parsing picture archive {}", path_buf.display()))?;

        Ok(PictureArchive {
            path: path_buf,
            mmap,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[PictureEntry] {
        &self.entries
    }

    pub fn find_entry(&self, id: u16) -> Option<&PictureEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn read_entry_bytes(&self, entry: &PictureEntry) -> &[u8] {
        &self.mmap[entry.data_range()]
    }

    pub fn extract_entry<P: AsRef<Path>>(&self, entry: &PictureEntry, dest: P) -> Result<()> {
        let mut file = File::create(dest.as_ref())
            .with_context(|| format!("creating {}", dest.as_ref().display()))?;
        file.write_all(self.read_entry_bytes(entry))
            .with_context(|| format!("writing {}", dest.as_ref().display()))?;
        Ok(())
    }
}

fn parse_entries(data: &[u8]) -> Result<Vec<PictureEntry>> {
    const ENTRY_SIZE: usize = 16;

    ensure!(data.len() >= 4, "picture archive is too small to hold a count");
    let count = BigEndian::read_u32(&data[0..4]) as usize;
    let table_end = count
        .checked_mul(ENTRY_SIZE)
        .and_then(|len| len.checked_add(4))
        .ok_or_else(|| anyhow!("picture archive entry count overflow"))?;
    ensure!(
        table_end <= data.len(),
        "picture archive truncated inside its entry table"
    );

    let mut entries = Vec::with_capacity(count);
    for (index, raw) in data[4..table_end].chunks_exact(ENTRY_SIZE).enumerate() {
        let be_u16 = |at: usize| BigEndian::read_u16(&raw[at..at + 2]);
        let entry = PictureEntry {
            offset: BigEndian::read_u32(&raw[0..4]),
            size: BigEndian::read_u32(&raw[4..8]),
            id: be_u16(8),
            kind: PictureKind::from(be_u16(10)),
            width: be_u16(12),
            height: be_u16(14),
        };
        let end = (entry.offset as usize)
            .checked_add(entry.size as usize)
            .ok_or_else(|| anyhow!("picture entry {index} size overflow"))?;
        ensure!(
            end <= data.len(),
            "picture entry {index} (id {}) data extends beyond file",
            entry.id
        );
        entries.push(entry);
    }
    Ok(entries)
}
