//! Parsing for the gateway's ASCII frame notifications
use std::io::{BufRead, Lines};

use serde::ser::SerializeStruct;

/// One CAN frame notification as reported by the gateway.
///
/// The gateway announces every frame it receives as a single ASCII line:
///
/// ```text
/// M <port> <format> <canid> [<data bytes> [| dlc=<n>]]
/// ```
///
/// The data bytes stay in the hex text form the gateway sent them in;
/// turning them into raw bytes is the telemetry layer's concern.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GatewayFrame {
    /// CAN interface index on the gateway
    pub port: u32,
    /// Frame kind tag, e.g. standard/extended; opaque beyond tokenization
    pub format: String,
    /// CAN arbitration identifier
    pub canid: u32,
    /// Declared (after `| dlc=`) or inferred data length code
    pub dlc: usize,
    /// Whitespace-separated or contiguous hex byte text, possibly empty
    pub data: String,
}

/// Violations of the gateway's line grammar.
///
/// Every variant carries the offending token so the caller can log what the
/// gateway actually sent.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty line")]
    Empty,
    #[error("invalid message start: {0:?}")]
    BadMarker(String),
    #[error("missing {0} token")]
    MissingField(&'static str),
    #[error("failed to parse port from {0:?}")]
    BadPort(String),
    #[error("failed to parse canid from {0:?}")]
    BadCanId(String),
    #[error("failed to parse dlc annotation from {0:?}")]
    BadDlc(String),
}

impl GatewayFrame {
    /// Parse a single `M`-prefixed notification line.
    ///
    /// Surrounding whitespace is ignored and internal runs of whitespace act
    /// as single token separators. Without a `dlc=` annotation the dlc is the
    /// number of whitespace-separated byte tokens; an explicit annotation is
    /// stored as given and never cross-checked against the byte count.
    pub fn parse(line: &str) -> Result<GatewayFrame, FrameError> {
        let mut parts = line.split_ascii_whitespace();

        let Some(marker) = parts.next() else {
            return Err(FrameError::Empty);
        };
        if marker != "M" {
            return Err(FrameError::BadMarker(marker.to_string()));
        }
        let port = parts.next().ok_or(FrameError::MissingField("port"))?;
        let port: u32 = port
            .parse()
            .map_err(|_| FrameError::BadPort(port.to_string()))?;
        let format = parts
            .next()
            .ok_or(FrameError::MissingField("format"))?
            .to_string();
        let canid = parts.next().ok_or(FrameError::MissingField("canid"))?;
        let canid = parse_hex_id(canid)?;

        // Everything after the canid is the data segment, optionally closed
        // by a `| dlc=<n>` annotation
        let rest = parts.collect::<Vec<_>>().join(" ");
        let (data, dlc) = if let Some((data, annotation)) = rest.split_once('|') {
            let annotation = annotation.trim();
            let dlc = annotation
                .strip_prefix("dlc=")
                .and_then(|n| n.trim().parse().ok())
                .ok_or_else(|| FrameError::BadDlc(annotation.to_string()))?;
            (data.trim().to_string(), dlc)
        } else {
            let dlc = rest.split_ascii_whitespace().count();
            (rest, dlc)
        };

        Ok(GatewayFrame {
            port,
            format,
            canid,
            dlc,
            data,
        })
    }

    /// The data-byte string with whitespace squeezed out, upper-cased
    #[must_use]
    pub fn data_compact(&self) -> String {
        let compact: String = self.data.split_ascii_whitespace().collect();
        compact.to_ascii_uppercase()
    }
}

/// The gateway emits bare hex identifiers, but `0x`-prefixed ones show up in
/// captured dumps too. Accept both.
fn parse_hex_id(token: &str) -> Result<u32, FrameError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u32::from_str_radix(digits, 16).map_err(|_| FrameError::BadCanId(token.to_string()))
}

impl serde::Serialize for GatewayFrame {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GatewayFrame", 5)?;
        state.serialize_field("port", &self.port)?;
        state.serialize_field("format", &self.format)?;
        state.serialize_field("canid", &format!("{:#X}", self.canid))?;
        state.serialize_field("dlc", &self.dlc)?;
        state.serialize_field("data", &self.data_compact())?;
        state.end()
    }
}

/// Parse [GatewayFrame]s from the given reader, e.g. a captured dump
pub struct GatewayParser<R: BufRead> {
    lines: Lines<R>,
}

impl<R: BufRead> GatewayParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

/// One item per non-blank input line. The iterator runs out when the input
/// lines run out
impl<R: BufRead> Iterator for GatewayParser<R> {
    type Item = eyre::Result<GatewayFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(GatewayFrame::parse(&line).map_err(eyre::Report::from)),
                Err(e) => return Some(Err(eyre::eyre!("Failed to read line: {e}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_fixture() -> (&'static str, GatewayFrame) {
        let line = "M 1 EXT 12C21020 01 00 00 32 27 10 23 28\n";
        let frame = GatewayFrame {
            port: 1,
            format: String::from("EXT"),
            canid: 0x12C21020,
            dlc: 8,
            data: String::from("01 00 00 32 27 10 23 28"),
        };
        (line, frame)
    }

    #[test]
    fn test_parse_infers_dlc_from_byte_tokens() {
        let (line, expected) = summary_fixture();
        let actual = GatewayFrame::parse(line).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_parse_explicit_dlc_annotation() {
        let line = "M 1 EXT 12C21021 02 06 00 00 00 28 28 28 | dlc=8";
        let actual = GatewayFrame::parse(line).unwrap();
        assert_eq!(actual.dlc, 8);
        assert_eq!(actual.data, "02 06 00 00 00 28 28 28");
    }

    #[test]
    fn test_parse_declared_dlc_wins_over_byte_count() {
        let line = "M 1 EXT 12C21020 01 02 | dlc=8";
        let actual = GatewayFrame::parse(line).unwrap();
        assert_eq!(actual.dlc, 8);
        assert_eq!(actual.data, "01 02");
    }

    #[test]
    fn test_parse_prefixed_canid() {
        let line = "M 0 STD 0x7FF FF";
        let actual = GatewayFrame::parse(line).unwrap();
        assert_eq!(actual.canid, 0x7FF);
        assert_eq!(actual.dlc, 1);
    }

    #[test]
    fn test_parse_no_data_segment() {
        let line = "M 1 EXT 12C21022";
        let actual = GatewayFrame::parse(line).unwrap();
        assert_eq!(actual.data, "");
        assert_eq!(actual.dlc, 0);
    }

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        let line = "  M   1  EXT   12C21020  AA  BB \n";
        let actual = GatewayFrame::parse(line).unwrap();
        assert_eq!(actual.data, "AA BB");
        assert_eq!(actual.dlc, 2);
    }

    #[test]
    fn test_bad_marker_reports_offending_token() {
        let err = GatewayFrame::parse("X 1 EXT 12C21020").unwrap_err();
        assert_eq!(err, FrameError::BadMarker(String::from("X")));
    }

    #[test]
    fn test_bad_port_reports_offending_token() {
        let err = GatewayFrame::parse("M one EXT 12C21020").unwrap_err();
        assert_eq!(err, FrameError::BadPort(String::from("one")));
    }

    #[test]
    fn test_bad_canid_reports_offending_token() {
        let err = GatewayFrame::parse("M 1 EXT zzz").unwrap_err();
        assert_eq!(err, FrameError::BadCanId(String::from("zzz")));
    }

    #[test]
    fn test_bad_dlc_annotation() {
        let err = GatewayFrame::parse("M 1 EXT 12C21020 AA | dlc=x").unwrap_err();
        assert_eq!(err, FrameError::BadDlc(String::from("dlc=x")));
    }

    #[test]
    fn test_missing_tokens() {
        assert_eq!(GatewayFrame::parse("").unwrap_err(), FrameError::Empty);
        assert_eq!(
            GatewayFrame::parse("M").unwrap_err(),
            FrameError::MissingField("port")
        );
        assert_eq!(
            GatewayFrame::parse("M 1").unwrap_err(),
            FrameError::MissingField("format")
        );
        assert_eq!(
            GatewayFrame::parse("M 1 EXT").unwrap_err(),
            FrameError::MissingField("canid")
        );
    }

    #[test]
    fn test_parser_skips_blank_lines() {
        let lines = b"M 1 EXT 12C21020 01 02\n\
                      \n\
                      M 1 EXT 12C21021 03 04\n\
                     ";
        let actual: Vec<_> = GatewayParser::new(&lines[..])
            .filter_map(|f| f.ok())
            .collect();
        assert_eq!(actual.len(), 2);
        assert_eq!(actual[0].canid, 0x12C21020);
        assert_eq!(actual[1].canid, 0x12C21021);
    }

    #[test]
    fn test_csv_format() {
        let lines = b"M 1 EXT 12C21020 01 00 00 32 27 10 23 28\n\
                      M 0 STD 7FF\n\
                     ";
        let frames = GatewayParser::new(&lines[..]);

        let writer = Vec::<u8>::new();
        let mut writer = csv::Writer::from_writer(writer);
        for frame in frames {
            writer.serialize(frame.unwrap()).unwrap();
        }

        let bytes = writer.into_inner().unwrap();
        let csv_str = String::from_utf8(bytes).unwrap();
        let expected = "port,format,canid,dlc,data\n\
                        1,EXT,0x12C21020,8,0100003227102328\n\
                        0,STD,0x7FF,0,\n\
                       ";
        assert_eq!(csv_str, expected);
    }
}
