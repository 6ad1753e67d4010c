use crate::error::TailError;
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Read position of one log file. Owned by the loader worker.
#[derive(Debug, Clone)]
pub struct TailHandle {
    path: PathBuf,
    /// Bytes consumed so far.
    offset: u64,
    /// File size observed at the last successful read.
    size: u64,
    encoding: &'static Encoding,
}

impl TailHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn encoding(&self) -> &'static str {
        self.encoding.name()
    }
}

/// Text appended since the previous read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewText {
    pub text: String,
    /// Offset the text starts at.
    pub from: u64,
    /// Offset after the last consumed byte.
    pub to: u64,
}

impl NewText {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Opens `path` for tailing. Nothing is read until the first reload.
pub fn open(path: impl Into<PathBuf>) -> Result<TailHandle, TailError> {
    let path = path.into();
    let meta = fs::metadata(&path).map_err(|e| TailError::from_io(&path, e))?;
    if !meta.is_file() {
        return Err(TailError::NotFound(path));
    }
    Ok(TailHandle {
        path,
        offset: 0,
        size: 0,
        encoding: UTF_8,
    })
}

/// Re-reads the whole file and moves the offset to its end.
pub fn full_reload(handle: &mut TailHandle) -> Result<String, TailError> {
    let bytes = fs::read(&handle.path).map_err(|e| TailError::from_io(&handle.path, e))?;

    let (encoding, bom_len) = match Encoding::for_bom(&bytes) {
        Some((enc, len)) => (enc, len),
        None => (detect(&bytes), 0),
    };

    let body = &bytes[bom_len..];
    let (encoding, (text, consumed)) = match decode(encoding, body, &handle.path) {
        Ok(decoded) => (encoding, decoded),
        // Mostly UTF-8 with a few stray bytes.
        Err(_) if encoding == SHIFT_JIS => (UTF_8, decode_or_replace(UTF_8, body, &handle.path)),
        Err(_) => (encoding, decode_or_replace(encoding, body, &handle.path)),
    };
    handle.encoding = encoding;
    handle.offset = (bom_len + consumed) as u64;
    handle.size = bytes.len() as u64;
    info!(
        "Read {} bytes of {} as {}",
        bytes.len(),
        handle.path.display(),
        encoding.name()
    );
    Ok(text)
}

/// Reads what was appended since the last successful read.
pub fn read_new(handle: &mut TailHandle) -> Result<NewText, TailError> {
    let current = file_size(&handle.path)?;
    if current == handle.size {
        return Ok(NewText {
            from: handle.offset,
            to: handle.offset,
            ..NewText::default()
        });
    }
    if current < handle.size {
        return Err(TailError::Truncated {
            previous: handle.size,
            current,
        });
    }

    let mut file = File::open(&handle.path).map_err(|e| TailError::from_io(&handle.path, e))?;
    file.seek(SeekFrom::Start(handle.offset))
        .map_err(|e| TailError::from_io(&handle.path, e))?;
    let mut bytes = Vec::with_capacity((current - handle.offset) as usize);
    file.take(current - handle.offset)
        .read_to_end(&mut bytes)
        .map_err(|e| TailError::from_io(&handle.path, e))?;

    let (text, consumed) = match decode(handle.encoding, &bytes, &handle.path) {
        Ok(decoded) => decoded,
        Err(_) if handle.encoding == UTF_8 => match decode(SHIFT_JIS, &bytes, &handle.path) {
            Ok(decoded) => {
                debug!("Appended bytes are not UTF-8, switching to Shift_JIS");
                handle.encoding = SHIFT_JIS;
                decoded
            }
            Err(_) => decode_or_replace(UTF_8, &bytes, &handle.path),
        },
        Err(_) => decode_or_replace(handle.encoding, &bytes, &handle.path),
    };

    let from = handle.offset;
    handle.offset += consumed as u64;
    handle.size = current;
    debug!("Read {} new bytes from {}", consumed, handle.path.display());
    Ok(NewText {
        text,
        from,
        to: handle.offset,
    })
}

/// Decodes `bytes`, returning the text and how many bytes it covers. An
/// incomplete UTF-8 sequence at the end is left unconsumed.
fn decode(
    encoding: &'static Encoding,
    bytes: &[u8],
    path: &Path,
) -> Result<(String, usize), TailError> {
    if encoding == UTF_8 {
        return match std::str::from_utf8(bytes) {
            Ok(text) => Ok((text.to_string(), bytes.len())),
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let text = std::str::from_utf8(&bytes[..valid]).unwrap_or_default();
                Ok((text.to_string(), valid))
            }
            Err(_) => Err(TailError::Decode(path.to_path_buf())),
        };
    }

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| (text.into_owned(), bytes.len()))
        .ok_or_else(|| TailError::Decode(path.to_path_buf()))
}

/// Like [`decode`], but bytes no encoding accepts become U+FFFD instead of
/// failing the read.
fn decode_or_replace(encoding: &'static Encoding, bytes: &[u8], path: &Path) -> (String, usize) {
    if let Ok(decoded) = decode(encoding, bytes, path) {
        return decoded;
    }
    warn!(
        "Undecodable bytes in {} ({}), replacing them",
        path.display(),
        encoding.name()
    );
    let end = if encoding == UTF_8 {
        bytes.len() - incomplete_utf8_tail(bytes)
    } else {
        bytes.len()
    };
    let (text, _) = encoding.decode_without_bom_handling(&bytes[..end]);
    (text.into_owned(), end)
}

/// Length of a UTF-8 sequence cut off at the end of `bytes`, 0 if none.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    let tail_start = bytes.len().saturating_sub(3);
    for (idx, &byte) in bytes.iter().enumerate().skip(tail_start).rev() {
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return 0,
        };
        let have = bytes.len() - idx;
        return if have < needed { have } else { 0 };
    }
    0
}

/// Picks a legacy encoding for bytes that are not valid UTF-8.
fn detect(bytes: &[u8]) -> &'static Encoding {
    match std::str::from_utf8(bytes) {
        Ok(_) => UTF_8,
        // Only the last character is cut off.
        Err(e) if e.error_len().is_none() => UTF_8,
        Err(_) => SHIFT_JIS,
    }
}

pub fn file_size(path: &Path) -> Result<u64, TailError> {
    fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|e| TailError::from_io(path, e))
}

/// The most recently modified `<prefix>*<suffix>` file directly inside `dir`.
pub fn latest_log_in(dir: &Path, prefix: &str, suffix: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(prefix) && name.ends_with(suffix)
        })
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((modified, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}
