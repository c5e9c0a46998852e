//! Parse the portal's XML rate export.
//!
//! The export is a `<document>` with one `<row>` element per published rate:
//!
//! ```xml
//! <document><data id="securities"><rows>
//!   <row tradedate="2024-09-02" tradetime="13:30:00" rate="88.7184" clearing="vk" />
//!   <row tradedate="2024-09-02" tradetime="18:30:00" rate="89.0100" clearing="pk" />
//! </rows></data></document>
//! ```
//!
//! Only rows of one clearing category are kept, in document order.

use crate::error::ParseError;
use crate::instrument::Instrument;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Clearing category of the main session.
pub const DEFAULT_CLEARING: &str = "vk";

/// One published rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRecord {
    /// `tradedate` attribute, verbatim.
    pub date: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    /// `tradetime` attribute, verbatim.
    pub time: String,
}

/// All records of one instrument, in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSeries {
    pub instrument: Instrument,
    pub records: Vec<RateRecord>,
}

impl RateSeries {
    pub fn empty(instrument: Instrument) -> Self {
        Self {
            instrument,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Extracts [`RateRecord`]s of a single clearing category.
#[derive(Debug, Clone)]
pub struct RateFileParser {
    clearing: String,
}

impl Default for RateFileParser {
    fn default() -> Self {
        Self::new(DEFAULT_CLEARING)
    }
}

impl RateFileParser {
    pub fn new(clearing: impl Into<String>) -> Self {
        Self {
            clearing: clearing.into(),
        }
    }

    /// Parse a downloaded file.
    ///
    /// A file that does not exist yields an empty series: acquisition may
    /// legitimately have produced nothing, and later stages still run.
    pub fn parse(&self, instrument: Instrument, path: &Path) -> Result<RateSeries, ParseError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), %instrument, "rate file missing, using empty series");
                return Ok(RateSeries::empty(instrument));
            }
            Err(source) => {
                return Err(ParseError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let series = self.parse_str(instrument, &content)?;
        debug!(path = %path.display(), records = series.len(), "parsed rate file");
        Ok(series)
    }

    /// Parse an XML document held in memory.
    pub fn parse_str(&self, instrument: Instrument, xml: &str) -> Result<RateSeries, ParseError> {
        let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut records = Vec::new();
        let mut depth = 0usize;
        let mut root_closed = false;
        let mut rows_seen = 0usize;

        loop {
            let event = reader.read_event().map_err(|e| {
                ParseError::Malformed(format!("at byte {}: {e}", reader.buffer_position()))
            })?;
            match event {
                Event::Start(e) => {
                    if root_closed {
                        return Err(junk_after_root());
                    }
                    if depth > 0 {
                        self.visit(&e, &mut rows_seen, &mut records)?;
                    }
                    depth += 1;
                }
                Event::Empty(e) => {
                    if root_closed {
                        return Err(junk_after_root());
                    }
                    if depth == 0 {
                        // A self-closing root: a valid, empty document.
                        root_closed = true;
                    } else {
                        self.visit(&e, &mut rows_seen, &mut records)?;
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        root_closed = true;
                    }
                }
                Event::Text(t) if depth == 0 && !t.iter().all(u8::is_ascii_whitespace) => {
                    return Err(ParseError::Malformed(
                        "text outside the document element".to_string(),
                    ));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth > 0 {
            return Err(ParseError::Malformed(format!(
                "document ended with {depth} unclosed element(s)"
            )));
        }
        if !root_closed {
            return Err(ParseError::Malformed("no element found".to_string()));
        }

        Ok(RateSeries {
            instrument,
            records,
        })
    }

    fn visit(
        &self,
        element: &BytesStart<'_>,
        rows_seen: &mut usize,
        records: &mut Vec<RateRecord>,
    ) -> Result<(), ParseError> {
        if element.local_name().as_ref() != b"row" {
            return Ok(());
        }
        *rows_seen += 1;
        let row = *rows_seen;

        let mut clearing = None;
        let mut date = None;
        let mut time = None;
        let mut rate = None;
        for attr in element.attributes() {
            let attr = attr.map_err(|e| ParseError::Malformed(format!("row {row}: {e}")))?;
            let value = attr
                .unescape_value()
                .map_err(|e| ParseError::Malformed(format!("row {row}: {e}")))?
                .into_owned();
            match attr.key.local_name().as_ref() {
                b"clearing" => clearing = Some(value),
                b"tradedate" => date = Some(value),
                b"tradetime" => time = Some(value),
                b"rate" => rate = Some(value),
                _ => {}
            }
        }

        if clearing.as_deref() != Some(self.clearing.as_str()) {
            return Ok(());
        }

        let raw = rate.ok_or(ParseError::MissingAttribute {
            row,
            attribute: "rate",
        })?;
        let rate = Decimal::from_str(raw.trim())
            .or_else(|_| Decimal::from_scientific(raw.trim()))
            .map_err(|_| ParseError::InvalidRate {
                row,
                value: raw.clone(),
            })?;

        records.push(RateRecord {
            date: date.unwrap_or_default(),
            rate,
            time: time.unwrap_or_default(),
        });
        Ok(())
    }
}

fn junk_after_root() -> ParseError {
    ParseError::Malformed("junk after document element".to_string())
}
