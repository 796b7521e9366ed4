//! Canonical request parameters and the operation chain built from them.
//!
//! A request arrives as a map of string keys to a single string or a list
//! of strings (repeated query keys). [`Parameters`] keeps it sorted so the
//! fingerprint does not depend on the order the caller supplied it in.
//!
//! ## Reserved keys
//!
//! | Key | Meaning |
//! |---|---|
//! | `op` | operation name, or a list of names / inline specs |
//! | `w`, `h` | target size, `0` derives from the aspect ratio |
//! | `q` | quality 0-100 |
//! | `upscale` | allow enlarging (default `true`) |
//! | `deg` | rotation, 90/180/270 (default 90) |
//! | `pos` | flip axis (`h`/`v`) or flat rectangle (`x0.y0.x1.y1`) |
//! | `stick` | flat corner placement |
//! | `color` | flat background fill |
//! | `fmt` | output format |
//! | `path`, `url` | source image |
//! | `sig` | request signature, never fingerprinted |
//!
//! ## Multiple operations
//!
//! When `op` is a list, each element is either an operation name, which
//! takes its options from the top-level keys, or an inline spec such as
//! `op:flat w:100 pos:0.0.50.50 path:logo.png`. Inline `path:` entries load
//! foreground images from the source store. An inline spec without `op:`
//! is skipped.

use crate::error::{Error, Result};
use crate::file::ImageFile;
use crate::imaging::{EngineOperation, Operation, Options, Quality, Stick};
use crate::storage::Storage;
use crate::types::Format;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

pub const OP: &str = "op";
pub const WIDTH: &str = "w";
pub const HEIGHT: &str = "h";
pub const QUALITY: &str = "q";
pub const UPSCALE: &str = "upscale";
pub const DEGREE: &str = "deg";
pub const POSITION: &str = "pos";
pub const STICK: &str = "stick";
pub const COLOR: &str = "color";
pub const FORMAT: &str = "fmt";
pub const PATH: &str = "path";
pub const URL: &str = "url";
pub const SIGNATURE: &str = "sig";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    List(Vec<String>),
}

impl ParamValue {
    fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Single(s) => serde_json::Value::String(s.clone()),
            ParamValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single-valued key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), ParamValue::Single(value.into()));
    }

    pub fn set(&mut self, key: impl Into<String>, value: ParamValue) {
        self.0.insert(key.into(), value);
    }

    /// Add a value the way a repeated query key does: a second value for
    /// the same key turns it into a list.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let merged = match self.0.remove(&key) {
            None => ParamValue::Single(value),
            Some(ParamValue::Single(first)) => ParamValue::List(vec![first, value]),
            Some(ParamValue::List(mut items)) => {
                items.push(value);
                ParamValue::List(items)
            }
        };
        self.0.insert(key, merged);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Value of a single-valued key. Lists do not count.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ParamValue::Single(s)) => Some(s),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted JSON object of every key except the signature.
    pub fn canonical_json(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .filter(|(k, _)| k.as_str() != SIGNATURE)
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map).to_string()
    }

    /// Requested output format, if any.
    pub fn format(&self) -> Result<Option<Format>> {
        self.get_str(FORMAT)
            .map(Format::from_str)
            .transpose()
            .map_err(Error::Validation)
    }

    pub fn path(&self) -> Option<&str> {
        self.get_str(PATH).filter(|p| !p.is_empty())
    }

    pub fn url(&self) -> Option<&str> {
        self.get_str(URL).filter(|u| !u.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Parameters::new();
        for (k, v) in iter {
            params.append(k, v);
        }
        params
    }
}

/// Parse a boolean the way query strings spell them.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_number(params: &Parameters, key: &str) -> Result<Option<u32>> {
    params
        .get_str(key)
        .map(|raw| {
            raw.parse::<u32>()
                .map_err(|_| Error::Validation(format!("invalid {key} {raw}: not a number")))
        })
        .transpose()
}

/// Options for `operation` from the reserved keys of `params`.
pub fn options_from(
    operation: Operation,
    params: &Parameters,
    default_quality: Quality,
) -> Result<Options> {
    let mut options = Options {
        quality: default_quality,
        ..Options::default()
    };

    if let Some(q) = parse_number(params, QUALITY)? {
        options.quality = Quality::try_new(q).map_err(Error::Validation)?;
    }

    options.position = params.get_str(POSITION).map(str::to_string);
    if options.position.is_none() && operation == Operation::Flip {
        return Err(Error::Validation(format!(
            "parameter \"{POSITION}\" is required for flip"
        )));
    }

    if let Some(stick) = params.get_str(STICK).filter(|s| !s.is_empty()) {
        options.stick = Some(stick.parse::<Stick>().map_err(Error::Validation)?);
    }

    options.color = params
        .get_str(COLOR)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    if let Some(degree) = parse_number(params, DEGREE)? {
        options.degree = degree;
    }

    if let Some(raw) = params.get_str(UPSCALE) {
        options.upscale = parse_bool(raw)
            .ok_or_else(|| Error::Validation(format!("invalid {UPSCALE} {raw}: not a boolean")))?;
    }

    if let Some(width) = parse_number(params, WIDTH)? {
        options.width = width;
    }
    if let Some(height) = parse_number(params, HEIGHT)? {
        options.height = height;
    }

    Ok(options)
}

/// An inline operation spec: `op:<name> key:value ... path:<aux image>`.
struct InlineSpec {
    operation: Option<String>,
    params: Parameters,
    paths: Vec<String>,
}

fn parse_inline(spec: &str) -> InlineSpec {
    let mut parsed = InlineSpec {
        operation: None,
        params: Parameters::new(),
        paths: Vec::new(),
    };
    for (key, value) in spec.split(' ').filter_map(|part| part.split_once(':')) {
        match key {
            PATH => parsed.paths.push(value.to_string()),
            OP => parsed.operation = Some(value.to_string()),
            _ => parsed.params.insert(key, value),
        }
    }
    parsed
}

fn parse_operation(name: &str) -> Result<Operation> {
    name.parse().map_err(Error::Validation)
}

/// Build the ordered operation chain for a request. Every stage encodes in
/// `format`.
pub async fn build_operations(
    source: &Arc<dyn Storage>,
    params: &Parameters,
    format: Format,
    default_quality: Quality,
) -> Result<Vec<EngineOperation>> {
    let mut operations = Vec::new();

    match params.get(OP) {
        None => {}
        Some(ParamValue::Single(name)) => {
            let operation = parse_operation(name)?;
            let options = options_from(operation, params, default_quality)?;
            operations.push(EngineOperation::new(operation, options));
        }
        Some(ParamValue::List(items)) => {
            for item in items {
                if let Ok(operation) = item.parse::<Operation>() {
                    let options = options_from(operation, params, default_quality)?;
                    operations.push(EngineOperation::new(operation, options));
                    continue;
                }

                let spec = parse_inline(item);
                let Some(name) = spec.operation else {
                    continue;
                };
                let operation = parse_operation(&name)?;
                let mut options = options_from(operation, &spec.params, default_quality)?;
                for path in &spec.paths {
                    options
                        .images
                        .push(ImageFile::from_storage(source.clone(), path).await?);
                }
                operations.push(EngineOperation::new(operation, options));
            }
        }
    }

    for op in &mut operations {
        op.options.format = format;
    }
    Ok(operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::MemoryStorage;
    use bytes::Bytes;

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs.iter().copied().collect()
    }

    fn empty_source() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new())
    }

    // =========================================================================
    // Map
    // =========================================================================

    #[test]
    fn repeated_keys_become_lists() {
        let p = params(&[("op", "resize"), ("op", "rotate"), ("w", "10")]);
        assert_eq!(
            p.get("op"),
            Some(&ParamValue::List(vec!["resize".into(), "rotate".into()]))
        );
        assert_eq!(p.get_str("w"), Some("10"));
        assert_eq!(p.get_str("op"), None);
    }

    #[test]
    fn canonical_json_is_sorted_and_unsigned() {
        let p = params(&[("w", "10"), ("sig", "abc"), ("op", "resize")]);
        assert_eq!(p.canonical_json(), r#"{"op":"resize","w":"10"}"#);
    }

    #[test]
    fn canonical_json_keeps_lists() {
        let mut p = Parameters::new();
        p.set("op", ParamValue::List(vec!["resize".into(), "flip".into()]));
        assert_eq!(p.canonical_json(), r#"{"op":["resize","flip"]}"#);
    }

    #[test]
    fn format_parses_aliases_and_rejects_unknown() {
        assert_eq!(params(&[("fmt", "jpg")]).format().unwrap(), Some(Format::Jpeg));
        assert_eq!(params(&[]).format().unwrap(), None);
        let err = params(&[("fmt", "svg")]).format().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn empty_path_and_url_are_absent() {
        let p = params(&[("path", ""), ("url", "")]);
        assert_eq!(p.path(), None);
        assert_eq!(p.url(), None);
    }

    // =========================================================================
    // Options
    // =========================================================================

    #[test]
    fn options_defaults() {
        let o = options_from(Operation::Resize, &Parameters::new(), Quality::DEFAULT).unwrap();
        assert_eq!((o.width, o.height), (0, 0));
        assert!(o.upscale);
        assert_eq!(o.degree, 90);
        assert_eq!(o.quality.value(), 95);
    }

    #[test]
    fn options_from_reserved_keys() {
        let p = params(&[
            ("w", "120"),
            ("h", "80"),
            ("q", "70"),
            ("upscale", "0"),
            ("deg", "180"),
            ("stick", "top-left"),
            ("color", "ff0000"),
        ]);
        let o = options_from(Operation::Flat, &p, Quality::DEFAULT).unwrap();
        assert_eq!((o.width, o.height), (120, 80));
        assert_eq!(o.quality.value(), 70);
        assert!(!o.upscale);
        assert_eq!(o.degree, 180);
        assert_eq!(o.stick, Some(Stick::TopLeft));
        assert_eq!(o.color.as_deref(), Some("ff0000"));
    }

    #[test]
    fn engine_default_quality_applies() {
        let quality = Quality::try_new(60).unwrap();
        let o = options_from(Operation::Resize, &Parameters::new(), quality).unwrap();
        assert_eq!(o.quality.value(), 60);
    }

    #[test]
    fn upscale_accepts_query_booleans() {
        for raw in ["1", "t", "TRUE", "True"] {
            let o = options_from(Operation::Resize, &params(&[("upscale", raw)]), Quality::DEFAULT)
                .unwrap();
            assert!(o.upscale, "{raw}");
        }
        for raw in ["0", "f", "false", "FALSE"] {
            let o = options_from(Operation::Resize, &params(&[("upscale", raw)]), Quality::DEFAULT)
                .unwrap();
            assert!(!o.upscale, "{raw}");
        }
        assert!(
            options_from(Operation::Resize, &params(&[("upscale", "yes")]), Quality::DEFAULT)
                .is_err()
        );
    }

    #[test]
    fn invalid_values_are_validation_errors() {
        for pairs in [
            [("q", "101")],
            [("q", "high")],
            [("w", "-5")],
            [("h", "1.5")],
            [("stick", "middle")],
        ] {
            let err = options_from(Operation::Resize, &params(&pairs), Quality::DEFAULT).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{pairs:?}");
        }
    }

    #[test]
    fn flip_requires_position() {
        let err = options_from(Operation::Flip, &Parameters::new(), Quality::DEFAULT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let o = options_from(Operation::Flip, &params(&[("pos", "h")]), Quality::DEFAULT).unwrap();
        assert_eq!(o.position.as_deref(), Some("h"));
    }

    // =========================================================================
    // Operation chains
    // =========================================================================

    #[tokio::test]
    async fn single_operation_gets_format() {
        let p = params(&[("op", "resize"), ("w", "100")]);
        let ops = build_operations(&empty_source(), &p, Format::Webp, Quality::DEFAULT)
            .await
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation, Operation::Resize);
        assert_eq!(ops[0].options.width, 100);
        assert_eq!(ops[0].options.format, Format::Webp);
    }

    #[tokio::test]
    async fn no_operation_is_an_empty_chain() {
        let ops = build_operations(&empty_source(), &params(&[("w", "1")]), Format::Png, Quality::DEFAULT)
            .await
            .unwrap();
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn unknown_operation_is_validation_error() {
        let err = build_operations(
            &empty_source(),
            &params(&[("op", "crop")]),
            Format::Png,
            Quality::DEFAULT,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("invalid method crop"));
    }

    #[tokio::test]
    async fn operation_list_mixes_names_and_inline_specs() {
        let source: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        source
            .save("logo.png", Bytes::from_static(b"logo"))
            .await
            .unwrap();

        let p = params(&[
            ("op", "resize"),
            ("op", "w:10 h:10"),
            ("op", "op:flat pos:0.0.50.50 path:logo.png"),
            ("w", "200"),
        ]);
        let ops = build_operations(&source, &p, Format::Png, Quality::DEFAULT)
            .await
            .unwrap();

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].operation, Operation::Resize);
        assert_eq!(ops[0].options.width, 200);
        assert_eq!(ops[1].operation, Operation::Flat);
        assert_eq!(ops[1].options.width, 0);
        assert_eq!(ops[1].options.position.as_deref(), Some("0.0.50.50"));
        assert_eq!(ops[1].options.images.len(), 1);
        assert_eq!(ops[1].options.images[0].filepath, "logo.png");
    }

    #[tokio::test]
    async fn inline_spec_with_missing_image_is_not_found() {
        let p = params(&[("op", "op:flat path:missing.png"), ("op", "resize")]);
        let err = build_operations(&empty_source(), &p, Format::Png, Quality::DEFAULT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
