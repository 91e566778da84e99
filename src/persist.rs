//! Durable storage of emitted images.
//!
//! Images are pretty-printed JSON, written through [`atomic_write`] so a
//! crash mid-write never leaves a truncated image behind.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use crate::error::PersistError;
use crate::runtime::{Image, IMAGE_VERSION};

/// Per-file mutex map to serialize concurrent writes to the same path.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write bytes to `path` via a `.tmp` sibling and a rename.
///
/// 1. Takes the per-file lock
/// 2. Writes and `fsync`s `<name>.tmp`
/// 3. Moves any existing file to `<name>.bak` (best effort)
/// 4. Renames the temp file into place
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), PersistError> {
    let lock = FILE_LOCKS
        .lock()
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let file_name = path.file_name().unwrap_or_default();
    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);
    let mut bak_name = OsString::from(file_name);
    bak_name.push(".bak");
    let bak_path = path.with_file_name(&bak_name);

    let mut file = fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
    file.write_all(data).map_err(io_err(&tmp_path))?;
    file.sync_all().map_err(io_err(&tmp_path))?;
    drop(file);

    if path.exists() {
        let _ = fs::rename(path, &bak_path);
    }
    fs::rename(&tmp_path, path).map_err(io_err(path))?;
    Ok(())
}

pub fn save_image(path: &Path, image: &Image) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(image)?;
    atomic_write(path, json.as_bytes())
}

/// Read an image back, rejecting other format versions.
pub fn load_image(path: &Path) -> Result<Image, PersistError> {
    let data = fs::read_to_string(path).map_err(io_err(path))?;
    let image: Image = serde_json::from_str(&data)?;
    if image.version != IMAGE_VERSION {
        return Err(PersistError::Version {
            found: image.version,
            expected: IMAGE_VERSION,
        });
    }
    Ok(image)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::runtime::image::{MethodImage, Op, TypeImage, TypeKind, TypeTag};

    fn sample() -> Image {
        let mut image = Image::new("sample");
        image.types.push(TypeImage {
            name: "A".into(),
            full_name: "Demo.A".into(),
            namespace: Some("Demo".into()),
            kind: TypeKind::Class,
            public: true,
            parent: None,
            nested: Vec::new(),
            fields: Vec::new(),
            static_fields: Vec::new(),
            methods: vec![MethodImage {
                name: "Run".into(),
                public: true,
                is_static: true,
                params: Vec::new(),
                ret: TypeTag::Void,
                locals: 0,
                code: vec![Op::ReturnVoid],
                lines: Vec::new(),
            }],
            ctor: None,
            static_init: None,
        });
        image
    }

    #[test]
    fn saved_image_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("sample.lib");
        save_image(&path, &sample()).unwrap();
        assert_eq!(load_image(&path).unwrap(), sample());
        assert!(!path.with_file_name("sample.lib.tmp").exists());
    }

    #[test]
    fn overwrite_keeps_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.lib");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert_eq!(fs::read(dir.path().join("x.lib.bak")).unwrap(), b"first");
    }

    #[test]
    fn other_versions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.lib");
        let mut image = sample();
        image.version = IMAGE_VERSION + 1;
        save_image(&path, &image).unwrap();
        assert!(matches!(
            load_image(&path),
            Err(PersistError::Version { found, .. }) if found == IMAGE_VERSION + 1
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_image(&dir.path().join("nope.lib")),
            Err(PersistError::Io { .. })
        ));
    }
}
