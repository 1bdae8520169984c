//! PDF Stream Filters
//!
//! Handles decompression and decoding of PDF streams according to ISO 32000-1
//! Section 7.4. A [`FilterChain`] is built from a stream's `/Filter` and
//! `/DecodeParms` entries and turned into a [`Read`] pipeline. Nothing is
//! decoded until the first read, and every problem (unknown filter, bad
//! parameters, corrupt data) comes out of that read as an
//! [`io::ErrorKind::InvalidData`] error.
//!
//! Image codecs (DCT, JPX, JBIG2, CCITT) are passed through: the chain stops
//! at the first of them and hands out the still-encoded image bytes.

mod ascii85;
mod ascii_hex;
#[cfg(feature = "compression")]
mod flate;
mod lzw;
mod predictor;
mod run_length;

pub use ascii85::decode_ascii85;
pub use ascii_hex::decode_ascii_hex;
pub use lzw::decode_lzw;
pub use predictor::apply_predictor;
pub use run_length::decode_run_length;

use crate::error::{ParseError, ParseResult};
use crate::parser::objects::{PdfDictionary, PdfObject};
use std::io::{self, Cursor, Read};

/// Supported PDF filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ASCIIHexDecode,
    ASCII85Decode,
    LZWDecode,
    FlateDecode,
    RunLengthDecode,
    CCITTFaxDecode,
    JBIG2Decode,
    DCTDecode,
    JPXDecode,
    Crypt,
}

impl Filter {
    /// Parse a filter name, including the abbreviations used by inline images
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "LZWDecode" | "LZW" => Some(Filter::LZWDecode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "RunLengthDecode" | "RL" => Some(Filter::RunLengthDecode),
            "CCITTFaxDecode" | "CCF" => Some(Filter::CCITTFaxDecode),
            "JBIG2Decode" => Some(Filter::JBIG2Decode),
            "DCTDecode" | "DCT" => Some(Filter::DCTDecode),
            "JPXDecode" => Some(Filter::JPXDecode),
            "Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }

    /// Image codecs the reader hands out undecoded
    pub fn is_image_codec(&self) -> bool {
        matches!(
            self,
            Filter::CCITTFaxDecode | Filter::JBIG2Decode | Filter::DCTDecode | Filter::JPXDecode
        )
    }
}

/// Parameters from a `/DecodeParms` dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    pub predictor: i64,
    pub colors: i64,
    pub bits_per_component: i64,
    pub columns: i64,
    pub early_change: bool,
    /// `/Name` of a Crypt filter
    pub crypt_name: Option<String>,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: true,
            crypt_name: None,
        }
    }
}

impl DecodeParams {
    pub fn from_dict(dict: Option<&PdfDictionary>) -> Self {
        let mut params = Self::default();
        let Some(dict) = dict else {
            return params;
        };
        let int = |key: &str| dict.get(key).and_then(PdfObject::as_integer);
        if let Some(v) = int("Predictor") {
            params.predictor = v;
        }
        if let Some(v) = int("Colors") {
            params.colors = v;
        }
        if let Some(v) = int("BitsPerComponent") {
            params.bits_per_component = v;
        }
        if let Some(v) = int("Columns") {
            params.columns = v;
        }
        if let Some(v) = int("EarlyChange") {
            params.early_change = v != 0;
        }
        params.crypt_name = dict
            .get("Name")
            .and_then(PdfObject::as_name)
            .map(str::to_string);
        params
    }

    /// Reject parameters no predictor can honour
    pub fn validate(&self) -> ParseResult<()> {
        if self.predictor <= 1 {
            return Ok(());
        }
        if !matches!(self.predictor, 2 | 10..=15) {
            return Err(ParseError::StreamDecodeError(format!(
                "unsupported predictor {}",
                self.predictor
            )));
        }
        if !(1..=32).contains(&self.colors) {
            return Err(ParseError::StreamDecodeError(format!(
                "invalid Colors {}",
                self.colors
            )));
        }
        if !matches!(self.bits_per_component, 1 | 2 | 4 | 8 | 16) {
            return Err(ParseError::StreamDecodeError(format!(
                "invalid BitsPerComponent {}",
                self.bits_per_component
            )));
        }
        if !(1..=1 << 24).contains(&self.columns) {
            return Err(ParseError::StreamDecodeError(format!(
                "invalid Columns {}",
                self.columns
            )));
        }
        Ok(())
    }
}

/// One filter with its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStage {
    pub filter: Filter,
    pub params: DecodeParams,
}

/// The ordered list of filters declared by a stream
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    /// Build from a stream dictionary whose `/Filter` and `/DecodeParms` are direct
    pub fn from_dict(dict: &PdfDictionary) -> ParseResult<Self> {
        Self::from_objects(
            dict.get("Filter"),
            dict.get("DecodeParms").or_else(|| dict.get("DP")),
        )
    }

    /// Build from already-resolved `/Filter` and `/DecodeParms` values
    pub fn from_objects(filter: Option<&PdfObject>, parms: Option<&PdfObject>) -> ParseResult<Self> {
        let names: Vec<&str> = match filter {
            None | Some(PdfObject::Null) => return Ok(Self::default()),
            Some(PdfObject::Name(name)) => vec![name.as_str()],
            Some(PdfObject::Array(array)) => array
                .0
                .iter()
                .map(|obj| {
                    obj.as_name().ok_or_else(|| {
                        ParseError::StreamDecodeError(format!(
                            "filter array holds a {}",
                            obj.kind_name()
                        ))
                    })
                })
                .collect::<ParseResult<_>>()?,
            Some(other) => {
                return Err(ParseError::StreamDecodeError(format!(
                    "Filter must be a name or array, found {}",
                    other.kind_name()
                )))
            }
        };

        let params: Vec<Option<&PdfDictionary>> = match parms {
            Some(PdfObject::Array(array)) => array.0.iter().map(PdfObject::as_dict).collect(),
            Some(obj) => vec![obj.as_dict()],
            None => Vec::new(),
        };

        let stages = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let filter = Filter::from_name(name)
                    .ok_or_else(|| ParseError::UnsupportedFilter(name.to_string()))?;
                let params = DecodeParams::from_dict(params.get(i).copied().flatten());
                params.validate()?;
                Ok(FilterStage { filter, params })
            })
            .collect::<ParseResult<_>>()?;

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Name of the crypt filter when the chain starts with `/Crypt`
    pub fn crypt_filter(&self) -> Option<&str> {
        self.stages
            .first()
            .filter(|stage| stage.filter == Filter::Crypt)
            .map(|stage| stage.params.crypt_name.as_deref().unwrap_or("Identity"))
    }

    /// Wrap `input` in one decoder per stage
    pub fn reader(self, input: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
        let mut reader = input;
        for stage in self.stages {
            if stage.filter.is_image_codec() {
                break;
            }
            reader = stage_reader(stage, reader);
        }
        reader
    }

    /// Run the whole chain over an in-memory buffer
    pub fn decode(self, data: Vec<u8>) -> ParseResult<Vec<u8>> {
        let mut out = Vec::new();
        self.reader(Box::new(Cursor::new(data)))
            .read_to_end(&mut out)
            .map_err(|e| ParseError::StreamDecodeError(e.to_string()))?;
        Ok(out)
    }
}

/// Decode stream data according to the filters in its dictionary
pub fn decode_stream(data: Vec<u8>, dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    FilterChain::from_dict(dict)?.decode(data)
}

fn stage_reader(stage: FilterStage, input: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
    let FilterStage { filter, params } = stage;
    match filter {
        Filter::FlateDecode => with_predictor(flate_reader(input), params),
        Filter::LZWDecode => {
            let early_change = params.early_change;
            let decoded = BufferedStage::boxed(input, move |data| decode_lzw(&data, early_change));
            with_predictor(decoded, params)
        }
        Filter::ASCII85Decode => BufferedStage::boxed(input, |data| decode_ascii85(&data)),
        Filter::ASCIIHexDecode => BufferedStage::boxed(input, |data| decode_ascii_hex(&data)),
        Filter::RunLengthDecode => BufferedStage::boxed(input, |data| decode_run_length(&data)),
        // Decryption happens before the chain runs
        Filter::Crypt => input,
        Filter::CCITTFaxDecode | Filter::JBIG2Decode | Filter::DCTDecode | Filter::JPXDecode => input,
    }
}

fn with_predictor(input: Box<dyn Read + Send>, params: DecodeParams) -> Box<dyn Read + Send> {
    if params.predictor <= 1 {
        return input;
    }
    BufferedStage::boxed(input, move |data| apply_predictor(&data, &params))
}

#[cfg(feature = "compression")]
fn flate_reader(input: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
    Box::new(flate::FlateReader::new(input))
}

#[cfg(not(feature = "compression"))]
fn flate_reader(_input: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
    Box::new(FailingReader::new(ParseError::UnsupportedFilter(
        "FlateDecode (compression feature disabled)".to_string(),
    )))
}

type DecodeFn = Box<dyn FnOnce(Vec<u8>) -> ParseResult<Vec<u8>> + Send>;

/// A stage that needs all of its input before producing output
struct BufferedStage {
    pending: Option<(Box<dyn Read + Send>, DecodeFn)>,
    output: Cursor<Vec<u8>>,
    error: Option<String>,
}

impl BufferedStage {
    fn boxed<F>(input: Box<dyn Read + Send>, decode: F) -> Box<dyn Read + Send>
    where
        F: FnOnce(Vec<u8>) -> ParseResult<Vec<u8>> + Send + 'static,
    {
        Box::new(Self {
            pending: Some((input, Box::new(decode))),
            output: Cursor::new(Vec::new()),
            error: None,
        })
    }
}

impl Read for BufferedStage {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some((mut input, decode)) = self.pending.take() {
            let mut raw = Vec::new();
            let result = input
                .read_to_end(&mut raw)
                .map_err(|e| e.to_string())
                .and_then(|_| decode(raw).map_err(|e| e.to_string()));
            match result {
                Ok(out) => self.output = Cursor::new(out),
                Err(message) => self.error = Some(message),
            }
        }
        if let Some(message) = &self.error {
            return Err(io::Error::new(io::ErrorKind::InvalidData, message.clone()));
        }
        self.output.read(buf)
    }
}

/// A reader that fails every read with the same error
pub struct FailingReader {
    message: String,
}

impl FailingReader {
    pub fn new(error: ParseError) -> Self {
        Self {
            message: error.to_string(),
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::InvalidData, self.message.clone()))
    }
}
