//! Trace file readers.
//!
//! Two text formats are understood:
//! - generic, one frame per line: `(1.250000) 1 181#1122334455667788`
//! - Vector ASCII (`.asc`): 3 header lines, then
//!   `1.250000 1 181 Rx d 8 11 22 33 44 55 66 77 88`
//!
//! [`TraceReader`] iterates over the frames of either format.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::TraceError;
use crate::types::BusFrame;

const ASC_HEADER_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    Generic,
    VectorAscii,
}

impl TraceFormat {
    /// `.asc` files are Vector ASCII, anything else generic.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("asc") => TraceFormat::VectorAscii,
            _ => TraceFormat::Generic,
        }
    }

    fn header_lines(self) -> usize {
        match self {
            TraceFormat::Generic => 0,
            TraceFormat::VectorAscii => ASC_HEADER_LINES,
        }
    }

    /// Parses one line. `Ok(None)` for lines carrying no data frame.
    pub fn parse_line(self, line: &str) -> Result<Option<BusFrame>, String> {
        match self {
            TraceFormat::Generic => parse_generic(line),
            TraceFormat::VectorAscii => parse_vector(line),
        }
    }
}

fn parse_timestamp(token: &str) -> Result<f64, String> {
    token.parse().map_err(|_| format!("bad timestamp {:?}", token))
}

/// Accepts `1` as well as interface names like `can1`.
fn parse_channel(token: &str) -> Result<u32, String> {
    token
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .map_err(|_| format!("bad channel {:?}", token))
}

fn parse_cob_id(token: &str) -> Result<u32, String> {
    let digits = token.trim_end_matches(['x', 'X']);
    u32::from_str_radix(digits, 16).map_err(|_| format!("bad identifier {:?}", token))
}

fn parse_generic(line: &str) -> Result<Option<BusFrame>, String> {
    let mut tokens = line
        .split(|c: char| c == '(' || c == ')' || c == '#' || c.is_whitespace())
        .filter(|t| !t.is_empty());

    let Some(timestamp) = tokens.next() else {
        return Ok(None);
    };
    let timestamp = parse_timestamp(timestamp)?;
    let channel = parse_channel(tokens.next().ok_or("missing channel")?)?;
    let cob_id = parse_cob_id(tokens.next().ok_or("missing identifier")?)?;
    let data = match tokens.next() {
        Some(hex_data) => hex::decode(hex_data).map_err(|e| format!("bad data {:?}: {}", hex_data, e))?,
        None => Vec::new(),
    };

    Ok(Some(BusFrame {
        timestamp,
        channel,
        cob_id,
        data,
    }))
}

fn parse_vector(line: &str) -> Result<Option<BusFrame>, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    // Statements such as "Start of measurement" or "End TriggerBlock"
    let Some(Ok(timestamp)) = tokens.first().map(|t| t.parse::<f64>()) else {
        return Ok(None);
    };
    // Error frames, remote frames and bus statistics carry no payload
    if tokens.len() < 6 || !tokens[4].eq_ignore_ascii_case("d") {
        return Ok(None);
    }

    let channel = parse_channel(tokens[1])?;
    let cob_id = parse_cob_id(tokens[2])?;
    let length = usize::from_str_radix(tokens[5], 16).map_err(|_| format!("bad length {:?}", tokens[5]))?;
    let bytes = 6usize
        .checked_add(length)
        .and_then(|end| tokens.get(6..end))
        .ok_or_else(|| format!("{} data bytes expected", length))?;
    let data = hex::decode(bytes.concat()).map_err(|e| format!("bad data: {}", e))?;

    Ok(Some(BusFrame {
        timestamp,
        channel,
        cob_id,
        data,
    }))
}

/// Iterator over the frames of a trace.
pub struct TraceReader<R> {
    lines: Lines<R>,
    format: TraceFormat,
    line_number: usize,
}

impl TraceReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let file = File::open(path).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file), TraceFormat::from_path(path)))
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R, format: TraceFormat) -> Self {
        Self {
            lines: reader.lines(),
            format,
            line_number: 0,
        }
    }

    pub fn format(&self) -> TraceFormat {
        self.format
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<BusFrame, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(TraceError::MalformedLine {
                        line: self.line_number,
                        reason: e.to_string(),
                    }))
                }
            };
            if self.line_number <= self.format.header_lines() {
                continue;
            }
            match self.format.parse_line(&line) {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => continue,
                Err(reason) => {
                    return Some(Err(TraceError::MalformedLine {
                        line: self.line_number,
                        reason,
                    }))
                }
            }
        }
    }
}
