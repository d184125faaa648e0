use crate::error::{FitFrameError, Result};
use crate::measure::TextMeasurer;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Width per char, in em, when a family resolves to no font program.
const FALLBACK_ADVANCE_EM: f32 = 0.6;
const SYSTEM_FONT_SEARCH_DEPTH: usize = 3;

const SANS_SERIF_CANDIDATES: &[&str] = &[
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
    "NotoSans-Regular.ttf",
    "Arial.ttf",
    "arial.ttf",
    "Helvetica.ttf",
    "Roboto-Regular.ttf",
];

const SERIF_CANDIDATES: &[&str] = &[
    "DejaVuSerif.ttf",
    "LiberationSerif-Regular.ttf",
    "NotoSerif-Regular.ttf",
    "Times New Roman.ttf",
    "times.ttf",
    "Georgia.ttf",
];

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, f32>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<f32> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: f32) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

#[derive(Debug)]
pub struct RegisteredFont {
    pub name: String,
    pub data: Arc<Vec<u8>>,
}

/// Font programs available for measuring and drawing, addressed by family
/// name or by the generic `serif` / `sans-serif` keywords.
#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    text_width_cache: Mutex<TextWidthCache>,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn register_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let Ok(entries) = fs::read_dir(path) else {
            tracing::debug!(dir = %path.display(), "font dir unreadable, skipped");
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Err(err) = self.register_file(&path) {
                    tracing::debug!(file = %path.display(), %err, "font skipped");
                }
            }
        }
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|v| v.to_str())
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();
        if ext != "ttf" && ext != "otf" {
            return Err(FitFrameError::Font(format!(
                "unsupported font file {}",
                path.display()
            )));
        }
        let data = fs::read(path)?;
        let source = path.to_string_lossy().into_owned();
        self.register_bytes(data, Some(&source))
    }

    pub fn register_bytes(&mut self, data: Vec<u8>, source_name: Option<&str>) -> Result<String> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(FitFrameError::Font(format!("invalid font data for {source}")));
        };
        let (name, aliases) = font_names(&face, Path::new(source));
        drop(face);

        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data: Arc::new(data),
        });
        for alias in std::iter::once(name.clone()).chain(aliases) {
            self.add_alias(&alias, index);
        }
        Ok(name)
    }

    /// Maps an extra family name onto an already registered font.
    pub fn alias(&mut self, alias: &str, target: &str) -> bool {
        let Some(index) = self.lookup.get(&normalize_name(target)).copied() else {
            return false;
        };
        self.add_alias(alias, index);
        true
    }

    fn add_alias(&mut self, alias: &str, index: usize) {
        let key = normalize_name(alias);
        if key.is_empty() || self.lookup.contains_key(&key) {
            return;
        }
        self.lookup.insert(key, index);
    }

    /// Registers the first installed system font matching each generic family
    /// that has no explicit registration yet.
    pub fn load_system_fallbacks(&mut self) {
        let dirs = system_font_dirs();
        for (generic, candidates) in [
            ("sans-serif", SANS_SERIF_CANDIDATES),
            ("serif", SERIF_CANDIDATES),
        ] {
            if self.lookup.contains_key(&normalize_name(generic)) {
                continue;
            }
            let Some(path) = find_font_file(&dirs, candidates) else {
                tracing::debug!(family = generic, "no system font found");
                continue;
            };
            match self.register_file(&path) {
                Ok(name) => {
                    self.alias(generic, &name);
                    tracing::debug!(family = generic, font = %name, "system fallback registered");
                }
                Err(err) => tracing::debug!(file = %path.display(), %err, "system font skipped"),
            }
        }
    }

    fn resolve_index(&self, family: &str) -> Option<usize> {
        if let Some(index) = self.lookup.get(&normalize_name(family)) {
            return Some(*index);
        }
        // Any registered font beats the fixed-advance estimate.
        if self.fonts.is_empty() { None } else { Some(0) }
    }

    pub fn resolve(&self, family: &str) -> Option<&RegisteredFont> {
        self.resolve_index(family)
            .and_then(|index| self.fonts.get(index))
    }

    pub fn font_data(&self, family: &str) -> Option<Arc<Vec<u8>>> {
        self.resolve(family).map(|font| font.data.clone())
    }

    pub fn measure_text_width(&self, family: &str, font_size: f32, text: &str) -> f32 {
        let fallback = || text.chars().count() as f32 * font_size * FALLBACK_ADVANCE_EM;
        let Some(index) = self.resolve_index(family) else {
            return fallback();
        };
        let cache_key = TextWidthKey {
            font_index: index,
            size_milli: (font_size as f64 * 1000.0).round() as i64,
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }
        let value = self
            .fonts
            .get(index)
            .and_then(|font| shaped_width(&font.data, font_size, text))
            .unwrap_or_else(fallback);
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }
}

impl TextMeasurer for FontRegistry {
    fn text_width(&self, family: &str, font_size: f32, text: &str) -> f32 {
        self.measure_text_width(family, font_size, text)
    }
}

fn shaped_width(data: &[u8], font_size: f32, text: &str) -> Option<f32> {
    if text.is_empty() {
        return Some(0.0);
    }
    let face = HbFace::from_slice(data, 0)?;
    let units_per_em = face.units_per_em().max(1) as f32;

    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return None;
    }
    let total_units: i64 = positions.iter().map(|pos| pos.x_advance as i64).sum();
    Some((total_units.max(0) as f32 / units_per_em) * font_size)
}

pub(crate) fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = family
        .clone()
        .or_else(|| full.clone())
        .or_else(|| post.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let aliases = [family, full, post, stem]
        .into_iter()
        .flatten()
        .filter(|candidate| *candidate != primary)
        .collect();
    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(&home).join(".fonts"));
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    if let Ok(extra) = std::env::var("FITFRAME_FONT_DIR") {
        dirs.extend(std::env::split_paths(&extra).filter(|p| !p.as_os_str().is_empty()));
    }

    dirs
}

/// Candidates are tried in order; for each, every dir is searched a few
/// levels deep since distributions nest fonts by foundry.
fn find_font_file(dirs: &[PathBuf], candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().find_map(|file_name| {
        dirs.iter()
            .find_map(|dir| search_dir(dir, file_name, SYSTEM_FONT_SEARCH_DEPTH))
    })
}

fn search_dir(dir: &Path, file_name: &str, depth: usize) -> Option<PathBuf> {
    let direct = dir.join(file_name);
    if direct.is_file() {
        return Some(direct);
    }
    if depth == 0 {
        return None;
    }
    let entries = fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .find_map(|sub| search_dir(&sub, file_name, depth - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_falls_back_to_fixed_advance() {
        let registry = FontRegistry::new();
        assert!(registry.resolve("sans-serif").is_none());
        let width = registry.measure_text_width("sans-serif", 10.0, "abcde");
        assert!((width - 30.0).abs() < 1e-3, "{width}");
        assert_eq!(registry.text_width("serif", 20.0, ""), 0.0);
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_bytes(vec![0, 1, 2, 3], Some("broken.ttf"))
            .unwrap_err();
        assert!(matches!(err, FitFrameError::Font(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn non_font_files_are_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        let mut registry = FontRegistry::new();
        assert!(registry.register_file(&path).is_err());
        registry.register_dir(dir.path());
        assert!(registry.is_empty());
    }

    #[test]
    fn alias_requires_known_target() {
        let mut registry = FontRegistry::new();
        assert!(!registry.alias("sans-serif", "Inter"));
    }

    #[test]
    fn name_normalization_ignores_case_and_quotes() {
        assert_eq!(normalize_name(" \"Open Sans\" "), "open sans");
        assert_eq!(normalize_name("'SERIF'"), "serif");
    }

    #[test]
    fn rtl_text_is_detected() {
        assert_eq!(detect_direction("hello"), HbDirection::LeftToRight);
        assert_eq!(detect_direction("\u{05D0}\u{05D1}"), HbDirection::RightToLeft);
    }
}
