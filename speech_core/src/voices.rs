use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Width of a single Kokoro style vector.
pub const STYLE_DIM: usize = 256;

/// Extension of voice files inside the voices directory.
pub const VOICE_EXTENSION: &str = "npy";

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Voice file not found: {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse voice file {name}: {reason}")]
    Parse { name: String, reason: String },
}

impl VoiceError {
    fn parse(name: &str, reason: impl Into<String>) -> Self {
        VoiceError::Parse {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// A speaker style pack.
///
/// Entry `i` is the style used for a phoneme sequence of `i + 1` tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceTensor {
    styles: Vec<[f32; STYLE_DIM]>,
}

impl VoiceTensor {
    pub fn new(styles: Vec<[f32; STYLE_DIM]>) -> Self {
        Self { styles }
    }

    /// Read a `.npy` voice pack from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VoiceError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| VoiceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::from_npy_bytes(&data, &name)
    }

    /// Parse a NumPy `.npy` buffer holding little-endian float32 data in C order.
    pub fn from_npy_bytes(data: &[u8], name: &str) -> Result<Self, VoiceError> {
        if data.len() < 10 {
            return Err(VoiceError::parse(
                name,
                format!("file too short ({} bytes)", data.len()),
            ));
        }
        if &data[0..6] != b"\x93NUMPY" {
            return Err(VoiceError::parse(name, "invalid numpy magic bytes"));
        }

        // v1 stores the header length as u16, v2/v3 as u32
        let major = data[6];
        let (header_len, header_start) = match major {
            1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
            2 | 3 => {
                if data.len() < 12 {
                    return Err(VoiceError::parse(name, "header truncated"));
                }
                (
                    u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
                    12,
                )
            }
            v => {
                return Err(VoiceError::parse(
                    name,
                    format!("unsupported npy format version {v}"),
                ))
            }
        };

        let data_offset = header_start + header_len;
        if data.len() < data_offset {
            return Err(VoiceError::parse(
                name,
                format!(
                    "header truncated (need {data_offset} bytes, got {})",
                    data.len()
                ),
            ));
        }

        let header = String::from_utf8_lossy(&data[header_start..data_offset]);
        if !header.contains("'<f4'") {
            return Err(VoiceError::parse(
                name,
                format!("expected little-endian float32 data, header: {}", header.trim()),
            ));
        }
        if header.contains("'fortran_order': True") {
            return Err(VoiceError::parse(name, "fortran-ordered arrays are not supported"));
        }

        let float_data = &data[data_offset..];
        if float_data.is_empty() {
            return Err(VoiceError::parse(name, "no style data"));
        }
        if float_data.len() % (4 * STYLE_DIM) != 0 {
            return Err(VoiceError::parse(
                name,
                format!(
                    "data length {} is not a whole number of {STYLE_DIM}-float style vectors",
                    float_data.len()
                ),
            ));
        }

        let styles = float_data
            .chunks_exact(4 * STYLE_DIM)
            .map(|raw| {
                let mut style = [0f32; STYLE_DIM];
                for (dst, bytes) in style.iter_mut().zip(raw.chunks_exact(4)) {
                    *dst = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                }
                style
            })
            .collect();

        Ok(Self { styles })
    }

    /// Style vector for a sequence of `token_count` phoneme tokens, clamped to the pack.
    pub fn style_for(&self, token_count: usize) -> &[f32; STYLE_DIM] {
        let idx = token_count
            .saturating_sub(1)
            .min(self.styles.len().saturating_sub(1));
        &self.styles[idx]
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceFile {
    pub name: String,
    pub path: PathBuf,
}

/// Enumerate `*.npy` voice files in `dir`, sorted by name.
///
/// A missing directory is not an error and yields no voices.
pub fn list_voice_files<P: AsRef<Path>>(dir: P) -> std::io::Result<Vec<VoiceFile>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut voices = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(VOICE_EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.is_empty() || stem.starts_with('.') {
            continue;
        }
        voices.push(VoiceFile {
            name: stem.to_string(),
            path: path.clone(),
        });
    }
    voices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(voices)
}

/// Voice tensors loaded on first use and kept for the life of the process.
#[derive(Debug)]
pub struct VoiceCache {
    dir: PathBuf,
    // Using DashMap for concurrent access without blocking
    voices: DashMap<String, Arc<VoiceTensor>>,
}

impl VoiceCache {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            voices: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{VOICE_EXTENSION}"))
    }

    /// Return the cached tensor for `name`, reading it from disk on a miss.
    pub fn load(&self, name: &str) -> Result<Arc<VoiceTensor>, VoiceError> {
        if let Some(cached) = self.voices.get(name) {
            return Ok(Arc::clone(cached.value()));
        }

        let path = self.path_for(name);
        if !path.exists() {
            return Err(VoiceError::NotFound {
                name: name.to_string(),
                path,
            });
        }

        debug!("Loading voice: {name}");
        let tensor = Arc::new(VoiceTensor::load(&path)?);
        // A concurrent miss may have won the race; keep whichever landed first.
        let entry = self
            .voices
            .entry(name.to_string())
            .or_insert_with(|| tensor.clone());
        debug!("Voice loaded: {name} ({} styles)", entry.value().len());
        Ok(Arc::clone(entry.value()))
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.voices.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Load every voice file on disk whose name is in `names`.
    ///
    /// Returns the voices that failed; each failure is also logged.
    pub fn preload(&self, names: &[String]) -> Vec<(String, VoiceError)> {
        let files = match list_voice_files(&self.dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Could not list voices in {}: {e}", self.dir.display());
                return Vec::new();
            }
        };

        let mut failures = Vec::new();
        for file in files.iter().filter(|f| names.contains(&f.name)) {
            match self.load(&file.name) {
                Ok(_) => info!("Pre-loaded voice {}", file.name),
                Err(e) => {
                    warn!("Failed to pre-load {}: {e}", file.name);
                    failures.push((file.name.clone(), e));
                }
            }
        }
        failures
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a v1 `.npy` buffer for `rows` style vectors of shape (rows, 1, 256).
    pub(crate) fn npy_bytes(rows: &[[f32; STYLE_DIM]]) -> Vec<u8> {
        let dict = format!(
            "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, 1, {STYLE_DIM}), }}",
            rows.len()
        );
        // Header (magic + version + len + dict + newline) is padded to 64 bytes.
        let unpadded = 10 + dict.len() + 1;
        let pad = (64 - unpadded % 64) % 64;
        let header = format!("{dict}{}\n", " ".repeat(pad));

        let mut out = Vec::new();
        out.extend_from_slice(b"\x93NUMPY");
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        for row in rows {
            for v in row {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    fn style(fill: f32) -> [f32; STYLE_DIM] {
        [fill; STYLE_DIM]
    }

    #[test]
    fn test_parse_npy_voice_pack() {
        let bytes = npy_bytes(&[style(0.1), style(0.2), style(0.3)]);
        let voice = VoiceTensor::from_npy_bytes(&bytes, "af_test.npy").unwrap();
        assert_eq!(voice.len(), 3);
        assert_eq!(voice.style_for(2)[0], 0.2);
    }

    #[test]
    fn test_style_index_is_clamped() {
        let voice = VoiceTensor::new(vec![style(1.0), style(2.0)]);
        assert_eq!(voice.style_for(0)[0], 1.0);
        assert_eq!(voice.style_for(1)[0], 1.0);
        assert_eq!(voice.style_for(500)[0], 2.0);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let result = VoiceTensor::from_npy_bytes(b"not a numpy file at all", "x.npy");
        assert!(matches!(result, Err(VoiceError::Parse { .. })));
    }

    #[test]
    fn test_rejects_wrong_dtype() {
        let mut swapped = npy_bytes(&[style(0.5)]);
        let pos = swapped.windows(3).position(|w| w == b"<f4").unwrap();
        swapped[pos..pos + 3].copy_from_slice(b"<f8");
        let err = VoiceTensor::from_npy_bytes(&swapped, "x.npy").unwrap_err();
        assert!(err.to_string().contains("float32"));
    }

    #[test]
    fn test_rejects_partial_style_vector() {
        let mut bytes = npy_bytes(&[style(0.5)]);
        bytes.truncate(bytes.len() - 4);
        assert!(VoiceTensor::from_npy_bytes(&bytes, "x.npy").is_err());
    }

    #[test]
    fn test_list_voice_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let pack = npy_bytes(&[style(0.0)]);
        fs::write(dir.path().join("af_kore.npy"), &pack).unwrap();
        fs::write(dir.path().join("af_aoede.npy"), &pack).unwrap();
        fs::write(dir.path().join(".hidden.npy"), &pack).unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("samples")).unwrap();

        let names: Vec<String> = list_voice_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["af_aoede", "af_kore"]);
    }

    #[test]
    fn test_list_voice_files_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let voices = list_voice_files(dir.path().join("nope")).unwrap();
        assert!(voices.is_empty());
    }

    #[test]
    fn test_cache_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("af_aoede.npy");
        fs::write(&path, npy_bytes(&[style(0.7)])).unwrap();

        let cache = VoiceCache::new(dir.path());
        assert!(!cache.is_cached("af_aoede"));
        let first = cache.load("af_aoede").unwrap();
        assert!(cache.is_cached("af_aoede"));

        // Served from memory even after the file is gone.
        fs::remove_file(&path).unwrap();
        let second = cache.load("af_aoede").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_missing_voice() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VoiceCache::new(dir.path());
        let err = cache.load("af_missing").unwrap_err();
        assert!(matches!(err, VoiceError::NotFound { ref name, .. } if name == "af_missing"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_preload_only_selected_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("af_aoede.npy"), npy_bytes(&[style(0.1)])).unwrap();
        fs::write(dir.path().join("af_kore.npy"), b"garbage").unwrap();
        fs::write(dir.path().join("am_adam.npy"), npy_bytes(&[style(0.1)])).unwrap();

        let cache = VoiceCache::new(dir.path());
        let failures = cache.preload(&["af_aoede".to_string(), "af_kore".to_string()]);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "af_kore");
        assert!(cache.is_cached("af_aoede"));
        assert!(!cache.is_cached("am_adam"));
    }
}
