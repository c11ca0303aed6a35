// Archive payloads. The client only looks at an archive's leading bytes (and,
// for compressed tarballs, its extension) to pick the content type; it never
// unpacks the archive. Files opened from disk are hashed once up front so the
// service can verify the transfer.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::{ClientError, Result};

/// Archive formats the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    Zip,
}

impl ArchiveKind {
    pub fn content_type(self) -> &'static str {
        match self {
            ArchiveKind::Tar => "application/x-tar",
            ArchiveKind::Zip => "application/zip",
        }
    }

    /// Detect the kind from the first bytes of a file and its name.
    ///
    /// Plain zip and tar archives are recognised by their magic numbers;
    /// old-style tars without the `ustar` magic by their header checksum.
    /// Compressed tarballs only expose the compression magic, so they also
    /// need a tar-like extension.
    pub fn detect(header: &[u8], filename: &str) -> Option<Self> {
        if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
            return Some(ArchiveKind::Zip);
        }
        if header.len() >= 262 && &header[257..262] == b"ustar" {
            return Some(ArchiveKind::Tar);
        }
        if tar_checksum_matches(header) {
            return Some(ArchiveKind::Tar);
        }

        let compressed = header.starts_with(&[0x1f, 0x8b])
            || header.starts_with(b"BZh")
            || header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]);
        let name = filename.to_ascii_lowercase();
        let tar_name = [".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz"]
            .iter()
            .any(|ext| name.ends_with(ext));
        if compressed && tar_name {
            return Some(ArchiveKind::Tar);
        }
        None
    }
}

const TAR_BLOCK: usize = 512;
const TAR_CHKSUM: std::ops::Range<usize> = 148..156;

/// A tar header block stores the sum of its bytes, with the checksum field
/// counted as spaces, as an octal number.
fn tar_checksum_matches(header: &[u8]) -> bool {
    if header.len() < TAR_BLOCK {
        return false;
    }
    let stored = std::str::from_utf8(&header[TAR_CHKSUM])
        .ok()
        .map(|field| field.trim_matches(|c: char| c == ' ' || c == '\0'))
        .filter(|field| !field.is_empty())
        .and_then(|field| u32::from_str_radix(field, 8).ok());
    let Some(stored) = stored else {
        return false;
    };

    let sum: u32 = header[..TAR_BLOCK]
        .iter()
        .enumerate()
        .map(|(i, &b)| if TAR_CHKSUM.contains(&i) { u32::from(b' ') } else { u32::from(b) })
        .sum();
    sum == stored
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Tar => write!(f, "tar"),
            ArchiveKind::Zip => write!(f, "zip"),
        }
    }
}

/// One archive upload. The content stream is read exactly once.
pub struct ArchivePayload {
    /// Explicit project; `None` falls back to the configured default.
    pub project: Option<String>,
    pub filename: String,
    pub content: Box<dyn Read + Send>,
    pub kind: ArchiveKind,
    /// Size in bytes when known, used for the quota precheck.
    pub size: Option<u64>,
    /// Hex MD5 of the content, sent along so the service can verify it.
    pub checksum: Option<String>,
    /// Directory the archive is extracted into, always starting with `/`.
    pub target: String,
}

impl ArchivePayload {
    pub fn new(
        project: Option<String>,
        filename: impl Into<String>,
        content: Box<dyn Read + Send>,
        kind: ArchiveKind,
        size: Option<u64>,
    ) -> Self {
        Self {
            project,
            filename: filename.into(),
            content,
            kind,
            size,
            checksum: None,
            target: "/".into(),
        }
    }

    /// Open an archive file, detect its kind, record its size and checksum.
    pub fn from_path(path: &Path, project: Option<String>) -> Result<Self> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        let mut header = Vec::with_capacity(TAR_BLOCK);
        (&mut file).take(TAR_BLOCK as u64).read_to_end(&mut header)?;
        file.seek(SeekFrom::Start(0))?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("archive")
            .to_string();

        let kind = ArchiveKind::detect(&header, &filename).ok_or_else(|| {
            ClientError::InvalidArchive(format!("'{}' is neither a tar nor a zip archive", path.display()))
        })?;

        let checksum = md5_hex(&mut file)?;
        file.seek(SeekFrom::Start(0))?;

        Ok(Self::new(project, filename, Box::new(file), kind, Some(size)).with_checksum(checksum))
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Set the extraction directory, normalised to a single leading slash.
    pub fn with_target(mut self, target: &str) -> Self {
        self.target = normalize_target(target);
        self
    }
}

impl fmt::Debug for ArchivePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchivePayload")
            .field("project", &self.project)
            .field("filename", &self.filename)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("checksum", &self.checksum)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

const HASH_CHUNK: usize = 1024 * 1024;

/// Hex MD5 of everything left in `reader`, read in 1 MiB chunks.
pub fn md5_hex(reader: &mut impl Read) -> Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn normalize_target(target: &str) -> String {
    format!("/{}", target.trim().trim_matches('/'))
}
