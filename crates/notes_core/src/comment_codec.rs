//! Key/value codec for metadata stored in a single HTML comment.
//!
//! A holder declares an ordered list of [`Field`]s. [`CommentCodec::encode`]
//! writes the fields that carry a value as
//!
//! ```text
//! <!-- versions="alice@2024-01-01 10:00:00:::bob@2024-01-02 09:30:00"---charset="UTF-8" -->
//! ```
//!
//! Fields are separated by `---` and the values of a multi-valued field by
//! `:::`. Both separators are reserved and are not escaped, so they must not
//! appear inside a value.
//!
//! When zlib compression followed by Base64 produces a shorter line, the
//! payload is replaced by a single synthetic field:
//!
//! ```text
//! <!-- data="eNrLTc0tSVQoSczNBQA..." -->
//! ```
//!
//! [`CommentCodec::decode`] detects and reverses this transparently.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Opening of a metadata comment
pub const COMMENT_PREFIX: &str = "<!-- ";
/// Closing of a metadata comment
pub const COMMENT_SUFFIX: &str = " -->";
/// Separator between fields
pub const FIELD_SEPARATOR: &str = "---";
/// Separator between the values of a [`Multiplicity::Multiple`] field
pub const VALUE_SEPARATOR: &str = ":::";
/// Name of the synthetic field holding a compressed payload
pub const DATA_FIELD: &str = "data";

/// Whether a field holds one value or a list of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// One value; absent when `None`
    Single,
    /// A list of values; absent when empty
    Multiple,
}

/// A named field declared by a [`CommentDataHolder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Name written before `="`
    pub name: &'static str,
    /// How many values the field carries
    pub multiplicity: Multiplicity,
}

impl Field {
    /// Declare a single-valued field
    pub const fn single(name: &'static str) -> Self {
        Self {
            name,
            multiplicity: Multiplicity::Single,
        }
    }

    /// Declare a multi-valued field
    pub const fn multiple(name: &'static str) -> Self {
        Self {
            name,
            multiplicity: Multiplicity::Multiple,
        }
    }

    /// Extract this field's raw payload from a `name="value"` token.
    fn payload<'a>(&self, token: &'a str) -> Option<&'a str> {
        token
            .strip_prefix(self.name)?
            .strip_prefix("=\"")?
            .strip_suffix('"')
    }
}

/// Something whose state can be written to and read from a comment block.
///
/// The codec only ever calls the accessor matching a field's multiplicity.
pub trait CommentDataHolder {
    /// Declared fields, in the order they are written
    fn fields(&self) -> &'static [Field];

    /// Value of a single-valued field
    fn single_value(&self, field: &Field) -> Option<String>;

    /// Values of a multi-valued field
    fn multiple_values(&self, field: &Field) -> Vec<String>;

    /// Set a single-valued field from decoded data
    fn set_single_value(&mut self, field: &Field, value: String);

    /// Set a multi-valued field from decoded data
    fn set_multiple_values(&mut self, field: &Field, values: Vec<String>);
}

/// Encoder/decoder for metadata comment blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentCodec {
    compress: bool,
}

impl Default for CommentCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentCodec {
    /// Codec that compresses whenever it shortens the output
    pub fn new() -> Self {
        Self { compress: true }
    }

    /// Codec with compression switched on or off.
    ///
    /// Decoding always understands compressed payloads.
    pub fn with_compression(compress: bool) -> Self {
        Self { compress }
    }

    /// Check whether `text` is framed as a metadata comment.
    pub fn is_comment_with_data(text: &str) -> bool {
        text.starts_with(COMMENT_PREFIX) && text.ends_with(COMMENT_SUFFIX)
    }

    /// Encode the present fields of `holder` into a comment line.
    pub fn encode(&self, holder: &dyn CommentDataHolder) -> String {
        let mut parts: Vec<String> = Vec::new();

        for field in holder.fields() {
            match field.multiplicity {
                Multiplicity::Single => {
                    if let Some(value) = holder.single_value(field) {
                        parts.push(format!("{}=\"{}\"", field.name, value));
                    }
                }
                Multiplicity::Multiple => {
                    let values = holder.multiple_values(field);
                    if !values.is_empty() {
                        parts.push(format!(
                            "{}=\"{}\"",
                            field.name,
                            values.join(VALUE_SEPARATOR)
                        ));
                    }
                }
            }
        }

        let raw = parts.join(FIELD_SEPARATOR);
        let payload = match self.compress.then(|| compress(&raw)).flatten() {
            Some(compressed) if compressed.len() < raw.len() => compressed,
            _ => raw,
        };

        format!("{COMMENT_PREFIX}{payload}{COMMENT_SUFFIX}")
    }

    /// Split a comment line into raw `name="value"` tokens.
    ///
    /// A compressed payload is inflated first. Corrupt compressed data is
    /// logged and the raw tokens are returned unchanged.
    pub fn decode(&self, text: &str) -> Vec<String> {
        let Some(inner) = text
            .strip_prefix(COMMENT_PREFIX)
            .and_then(|rest| rest.strip_suffix(COMMENT_SUFFIX))
        else {
            return Vec::new();
        };

        let tokens: Vec<&str> = inner.split(FIELD_SEPARATOR).collect();
        if let [token] = tokens.as_slice()
            && let Some(data) = Field::single(DATA_FIELD).payload(token)
        {
            match decompress(data) {
                Ok(raw) => return raw.split(FIELD_SEPARATOR).map(String::from).collect(),
                Err(e) => log::warn!("Ignoring corrupt compressed metadata: {}", e),
            }
        }

        tokens.into_iter().map(String::from).collect()
    }

    /// Dispatch decoded tokens to the holder's setters.
    ///
    /// The first declared field whose name matches a token wins; tokens that
    /// match no field are skipped.
    pub fn apply(&self, tokens: &[String], holder: &mut dyn CommentDataHolder) {
        let fields = holder.fields();

        for token in tokens {
            let Some((field, payload)) = fields
                .iter()
                .find_map(|field| field.payload(token).map(|payload| (field, payload)))
            else {
                log::debug!("Skipping unknown metadata token: {}", token);
                continue;
            };

            match field.multiplicity {
                Multiplicity::Single => holder.set_single_value(field, payload.to_string()),
                Multiplicity::Multiple => {
                    let values = if payload.is_empty() {
                        Vec::new()
                    } else {
                        payload.split(VALUE_SEPARATOR).map(String::from).collect()
                    };
                    holder.set_multiple_values(field, values);
                }
            }
        }
    }

    /// Decode `text` and apply the result to `holder`.
    pub fn decode_into(&self, text: &str, holder: &mut dyn CommentDataHolder) {
        let tokens = self.decode(text);
        self.apply(&tokens, holder);
    }
}

/// Compress a raw payload into a `data="..."` token.
fn compress(raw: &str) -> Option<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    let written = encoder.write_all(raw.as_bytes());

    match written.and_then(|()| encoder.finish()) {
        Ok(bytes) => Some(format!("{}=\"{}\"", DATA_FIELD, STANDARD.encode(bytes))),
        Err(e) => {
            log::warn!("Failed to compress metadata, writing it uncompressed: {}", e);
            None
        }
    }
}

/// Reverse [`compress`] on the payload of a `data` token.
fn decompress(data: &str) -> std::result::Result<String, String> {
    let bytes = STANDARD.decode(data).map_err(|e| e.to_string())?;
    let mut raw = String::new();
    ZlibDecoder::new(bytes.as_slice())
        .read_to_string(&mut raw)
        .map_err(|e| e.to_string())?;
    Ok(raw)
}
