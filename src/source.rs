//! Source units: named fragments of program text and where to obtain them.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 1-based position of a unit inside its [`SourceSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl SourceId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Produces a fresh reader each time a stream unit is opened.
pub type StreamSupplier = Box<dyn FnMut() -> io::Result<Box<dyn Read + Send>> + Send>;

/// Where the text of a unit comes from.
pub enum SourceOrigin {
    File(PathBuf),
    Text(String),
    Stream(StreamSupplier),
}

impl fmt::Debug for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::File(path) => f.debug_tuple("File").field(path).finish(),
            SourceOrigin::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            SourceOrigin::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// How raw bytes are turned into text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl SourceEncoding {
    pub fn decode(self, bytes: &[u8]) -> Result<String, LoadError> {
        match self {
            SourceEncoding::Utf8 => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(body)
                    .map(str::to_owned)
                    .map_err(|e| LoadError::Encoding {
                        offset: e.valid_up_to(),
                    })
            }
            SourceEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            SourceEncoding::Utf8 => text.as_bytes().to_vec(),
            SourceEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// Why a unit's text could not be produced.
#[derive(Debug)]
pub enum LoadError {
    NotFound(io::Error),
    Binary,
    Encoding { offset: usize },
}

/// Raw bytes and decoded text of an opened unit.
#[derive(Debug, Clone)]
pub struct LoadedText {
    pub bytes: Vec<u8>,
    pub text: String,
}

/// One named fragment of program text.
#[derive(Debug)]
pub struct SourceUnit {
    name: String,
    origin: SourceOrigin,
    id: SourceId,
    checksum: Option<Vec<u8>>,
}

impl SourceUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn origin(&self) -> &SourceOrigin {
        &self.origin
    }

    pub fn checksum(&self) -> Option<&[u8]> {
        self.checksum.as_deref()
    }

    pub fn set_checksum(&mut self, checksum: Vec<u8>) {
        self.checksum = Some(checksum);
    }

    /// Files and streams carry raw bytes; in-memory text does not.
    pub fn is_byte_backed(&self) -> bool {
        !matches!(self.origin, SourceOrigin::Text(_))
    }

    /// Open the unit and decode it. Files are read and streams are pulled
    /// from their supplier at this point, not when the unit was added.
    pub fn load(&mut self, encoding: SourceEncoding) -> Result<LoadedText, LoadError> {
        let bytes = match &mut self.origin {
            SourceOrigin::File(path) => fs::read(path.as_path()).map_err(LoadError::NotFound)?,
            SourceOrigin::Stream(supplier) => {
                let mut reader = supplier().map_err(LoadError::NotFound)?;
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).map_err(LoadError::NotFound)?;
                buf
            }
            SourceOrigin::Text(text) => {
                let bytes = encoding.encode(text);
                let text = encoding.decode(&bytes)?;
                return Ok(LoadedText { bytes, text });
            }
        };
        if bytes.starts_with(b"MZ") {
            return Err(LoadError::Binary);
        }
        let text = encoding.decode(&bytes)?;
        Ok(LoadedText { bytes, text })
    }
}

/// Ordered, append-only collection of source units for one session.
#[derive(Debug, Default)]
pub struct SourceSet {
    units: Vec<SourceUnit>,
    unique_names: bool,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// When enabled, a unit whose name is already present is rejected.
    pub fn with_unique_names(unique_names: bool) -> Self {
        Self {
            units: Vec::new(),
            unique_names,
        }
    }

    /// Append a unit, returning its index, or `None` when the unique-name
    /// policy rejects it.
    pub fn add(&mut self, name: impl Into<String>, origin: SourceOrigin) -> Option<SourceId> {
        let name = name.into();
        if self.unique_names && self.units.iter().any(|u| u.name == name) {
            tracing::warn!(name = %name, "duplicate source name rejected");
            return None;
        }
        let next = u32::try_from(self.units.len() + 1).ok()?;
        let id = SourceId(next);
        tracing::debug!(%id, name = %name, ?origin, "source added");
        self.units.push(SourceUnit {
            name,
            origin,
            id,
            checksum: None,
        });
        Some(id)
    }

    pub fn add_file(&mut self, path: &Path) -> Option<SourceId> {
        let name = path.to_string_lossy().into_owned();
        self.add(name, SourceOrigin::File(path.to_path_buf()))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, id: SourceId) -> Option<&SourceUnit> {
        let idx = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.units.get(idx)
    }

    pub fn first(&self) -> Option<&SourceUnit> {
        self.units.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SourceUnit> {
        self.units.iter_mut()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn indices_are_one_based_and_stable() {
        let mut set = SourceSet::new();
        let a = set.add("a.hs", SourceOrigin::Text("class A { }".into())).unwrap();
        let b = set.add("a.hs", SourceOrigin::Text("class B { }".into())).unwrap();
        assert_eq!(a, SourceId(1));
        assert_eq!(b, SourceId(2));
        assert_eq!(set.get(b).unwrap().name(), "a.hs");
        assert!(set.get(SourceId(0)).is_none());
    }

    #[test]
    fn unique_policy_rejects_duplicates() {
        let mut set = SourceSet::with_unique_names(true);
        assert!(set.add("x", SourceOrigin::Text(String::new())).is_some());
        assert!(set.add("x", SourceOrigin::Text(String::new())).is_none());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let text = SourceEncoding::Utf8.decode(b"\xEF\xBB\xBFclass").unwrap();
        assert_eq!(text, "class");
    }

    #[test]
    fn invalid_utf8_reports_offset() {
        let err = SourceEncoding::Utf8.decode(b"ab\xFFcd").unwrap_err();
        assert!(matches!(err, LoadError::Encoding { offset: 2 }));
    }

    #[test]
    fn latin1_maps_bytes_to_chars() {
        let text = SourceEncoding::Latin1.decode(&[0x63, 0xE9]).unwrap();
        assert_eq!(text, "c\u{e9}");
        assert_eq!(SourceEncoding::Latin1.encode("\u{e9}\u{263a}"), vec![0xE9, b'?']);
    }

    #[test]
    fn stream_with_mz_header_is_binary() {
        let mut set = SourceSet::new();
        let id = set
            .add(
                "payload",
                SourceOrigin::Stream(Box::new(|| {
                    Ok(Box::new(Cursor::new(b"MZ\x90\x00".to_vec())) as Box<dyn Read + Send>)
                })),
            )
            .unwrap();
        let unit = set.iter_mut().find(|u| u.id() == id).unwrap();
        assert!(matches!(unit.load(SourceEncoding::Utf8), Err(LoadError::Binary)));
    }

    #[test]
    fn text_starting_with_mz_is_not_binary() {
        let mut set = SourceSet::new();
        set.add("t", SourceOrigin::Text("MZ".into())).unwrap();
        let unit = set.iter_mut().next().unwrap();
        assert_eq!(unit.load(SourceEncoding::Utf8).unwrap().text, "MZ");
    }

    #[test]
    fn missing_file_is_not_found() {
        let mut set = SourceSet::new();
        set.add_file(Path::new("/definitely/not/here.hs")).unwrap();
        let unit = set.iter_mut().next().unwrap();
        assert!(matches!(unit.load(SourceEncoding::Utf8), Err(LoadError::NotFound(_))));
    }
}
