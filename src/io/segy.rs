use crate::core::geometry::TraceHeaderSummary;
use crate::types::{
    DepthAxis, ExtractError, ExtractResult, GeoPoint, GridPoint, SurveyKind, TraceBlock, TraceValue,
    LINE_2D_INLINE,
};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const TEXT_HEADER_LEN: usize = 3200;
pub const BINARY_HEADER_LEN: usize = 400;
pub const TRACE_HEADER_LEN: usize = 240;

// Binary header offsets (0-based, from the start of the file)
const SAMPLE_INTERVAL_OFFSET: usize = 3216;
const SAMPLES_PER_TRACE_OFFSET: usize = 3220;
const FORMAT_CODE_OFFSET: usize = 3224;
const REVISION_OFFSET: usize = 3500;
const FIXED_LENGTH_OFFSET: usize = 3502;
const EXTENDED_HEADERS_OFFSET: usize = 3504;

// Trace header offsets (0-based, from the start of the trace header)
const COORDINATE_SCALAR_OFFSET: usize = 70;
const DELAY_TIME_OFFSET: usize = 104;
const TRACE_SAMPLES_OFFSET: usize = 114;
const TRACE_INTERVAL_OFFSET: usize = 116;

/// Sample encoding declared in the binary header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    IbmFloat,
    Int32,
    Int16,
    IeeeFloat,
    Int8,
}

impl SampleFormat {
    pub fn from_code(code: u16) -> ExtractResult<Self> {
        match code {
            1 => Ok(SampleFormat::IbmFloat),
            2 => Ok(SampleFormat::Int32),
            3 => Ok(SampleFormat::Int16),
            5 => Ok(SampleFormat::IeeeFloat),
            8 => Ok(SampleFormat::Int8),
            other => Err(ExtractError::InvalidFormat(format!(
                "unsupported SEG-Y sample format code {}",
                other
            ))),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            SampleFormat::IbmFloat => 1,
            SampleFormat::Int32 => 2,
            SampleFormat::Int16 => 3,
            SampleFormat::IeeeFloat => 5,
            SampleFormat::Int8 => 8,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::IbmFloat | SampleFormat::Int32 | SampleFormat::IeeeFloat => 4,
            SampleFormat::Int16 => 2,
            SampleFormat::Int8 => 1,
        }
    }

    fn read_sample<R: Read>(&self, reader: &mut R) -> io::Result<TraceValue> {
        Ok(match self {
            SampleFormat::IbmFloat => ibm_to_f32(reader.read_u32::<BigEndian>()?),
            SampleFormat::Int32 => reader.read_i32::<BigEndian>()? as f32,
            SampleFormat::Int16 => reader.read_i16::<BigEndian>()? as f32,
            SampleFormat::IeeeFloat => reader.read_f32::<BigEndian>()?,
            SampleFormat::Int8 => reader.read_i8()? as f32,
        })
    }

    fn write_sample<W: Write>(&self, value: TraceValue, writer: &mut W) -> io::Result<()> {
        match self {
            SampleFormat::IbmFloat => writer.write_u32::<BigEndian>(f32_to_ibm(value)),
            SampleFormat::Int32 => writer.write_i32::<BigEndian>(value.round() as i32),
            SampleFormat::Int16 => writer.write_i16::<BigEndian>(value.round() as i16),
            SampleFormat::IeeeFloat => writer.write_f32::<BigEndian>(value),
            SampleFormat::Int8 => writer.write_i8(value.round() as i8),
        }
    }
}

/// Decode an IBM System/360 single precision float
pub fn ibm_to_f32(bits: u32) -> f32 {
    let fraction = bits & 0x00ff_ffff;
    if fraction == 0 {
        return 0.0;
    }
    let sign = if bits & 0x8000_0000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 24) & 0x7f) as i32 - 64;
    let mantissa = fraction as f64 / 16_777_216.0;
    (sign * mantissa * 16f64.powi(exponent)) as f32
}

/// Encode an IBM System/360 single precision float
pub fn f32_to_ibm(value: f32) -> u32 {
    if value == 0.0 || !value.is_finite() {
        return 0;
    }
    let sign = if value < 0.0 { 0x8000_0000 } else { 0 };
    let mut mantissa = (value as f64).abs();
    let mut exponent: i32 = 64;
    while mantissa >= 1.0 {
        mantissa /= 16.0;
        exponent += 1;
    }
    while mantissa < 0.0625 {
        mantissa *= 16.0;
        exponent -= 1;
    }
    let mut fraction = (mantissa * 16_777_216.0).round() as u32;
    if fraction >= 0x0100_0000 {
        fraction >>= 4;
        exponent += 1;
    }
    if exponent <= 0 {
        return 0;
    }
    if exponent > 127 {
        return sign | 0x7fff_ffff;
    }
    sign | ((exponent as u32) << 24) | fraction
}

/// Trace header byte positions (1-based, as in the SEG-Y standard)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderByteLayout {
    pub cdp_x: usize,
    pub cdp_y: usize,
    pub inline: usize,
    pub crossline: usize,
}

impl Default for HeaderByteLayout {
    fn default() -> Self {
        Self {
            cdp_x: 181,
            cdp_y: 185,
            inline: 189,
            crossline: 193,
        }
    }
}

impl HeaderByteLayout {
    pub fn validate(&self) -> ExtractResult<()> {
        for (name, byte) in [
            ("cdp_x", self.cdp_x),
            ("cdp_y", self.cdp_y),
            ("inline", self.inline),
            ("crossline", self.crossline),
        ] {
            if byte == 0 || byte + 3 > TRACE_HEADER_LEN {
                return Err(ExtractError::Schema(format!(
                    "trace header byte {} for {} is outside 1..={}",
                    byte,
                    name,
                    TRACE_HEADER_LEN - 3
                )));
            }
        }
        Ok(())
    }
}

/// Scaling rule of the SEG-Y coordinate scalar
fn apply_scalar(value: i32, scalar: i16) -> f64 {
    match scalar {
        0 => value as f64,
        s if s > 0 => value as f64 * s as f64,
        s => value as f64 / -(s as f64),
    }
}

/// Binary file header fields needed for reading traces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryHeader {
    pub sample_interval_us: u16,
    pub samples_per_trace: usize,
    pub format: SampleFormat,
    pub extended_headers: usize,
}

/// An opened SEG-Y file with fixed-length traces
#[derive(Debug, Clone)]
pub struct SegyFile {
    path: PathBuf,
    binary: BinaryHeader,
    data_offset: u64,
    trace_count: usize,
}

impl SegyFile {
    pub fn open<P: AsRef<Path>>(path: P) -> ExtractResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)
            .map_err(|e| ExtractError::Path(format!("cannot open SEG-Y file {}: {}", path.display(), e)))?;
        let file_len = file.metadata()?.len();

        let mut header = vec![0u8; TEXT_HEADER_LEN + BINARY_HEADER_LEN];
        file.read_exact(&mut header).map_err(|_| {
            ExtractError::InvalidFormat(format!("{} is too short to be a SEG-Y file", path.display()))
        })?;

        let format = SampleFormat::from_code(BigEndian::read_u16(&header[FORMAT_CODE_OFFSET..]))?;
        let revision = BigEndian::read_u16(&header[REVISION_OFFSET..]);
        let extended = BigEndian::read_i16(&header[EXTENDED_HEADERS_OFFSET..]);
        let extended_headers = if revision >= 0x0100 {
            if extended < 0 {
                return Err(ExtractError::InvalidFormat(format!(
                    "{}: variable number of extended textual headers is not supported",
                    path.display()
                )));
            }
            extended as usize
        } else {
            0
        };
        if revision >= 0x0100 && BigEndian::read_u16(&header[FIXED_LENGTH_OFFSET..]) == 0 {
            log::debug!("{}: fixed length trace flag not set, assuming fixed length traces", path.display());
        }

        let mut binary = BinaryHeader {
            sample_interval_us: BigEndian::read_u16(&header[SAMPLE_INTERVAL_OFFSET..]),
            samples_per_trace: BigEndian::read_u16(&header[SAMPLES_PER_TRACE_OFFSET..]) as usize,
            format,
            extended_headers,
        };
        let data_offset = (TEXT_HEADER_LEN + BINARY_HEADER_LEN + extended_headers * TEXT_HEADER_LEN) as u64;

        // Fall back to the first trace header when the binary header is incomplete
        if binary.samples_per_trace == 0 || binary.sample_interval_us == 0 {
            let mut trace_header = [0u8; TRACE_HEADER_LEN];
            file.seek(SeekFrom::Start(data_offset))?;
            if file.read_exact(&mut trace_header).is_ok() {
                if binary.samples_per_trace == 0 {
                    binary.samples_per_trace = BigEndian::read_u16(&trace_header[TRACE_SAMPLES_OFFSET..]) as usize;
                }
                if binary.sample_interval_us == 0 {
                    binary.sample_interval_us = BigEndian::read_u16(&trace_header[TRACE_INTERVAL_OFFSET..]);
                }
            }
        }
        if binary.samples_per_trace == 0 {
            return Err(ExtractError::InvalidFormat(format!(
                "{}: number of samples per trace is zero",
                path.display()
            )));
        }

        let trace_len = (TRACE_HEADER_LEN + binary.samples_per_trace * format.bytes_per_sample()) as u64;
        let payload = file_len.saturating_sub(data_offset);
        if payload % trace_len != 0 {
            return Err(ExtractError::InvalidFormat(format!(
                "{}: {} bytes of trace data is not a multiple of the trace length {}",
                path.display(),
                payload,
                trace_len
            )));
        }
        let trace_count = (payload / trace_len) as usize;

        log::debug!(
            "Opened {}: {} traces, {} samples, {:?}, interval {} us",
            path.display(),
            trace_count,
            binary.samples_per_trace,
            format,
            binary.sample_interval_us
        );

        Ok(Self { path, binary, data_offset, trace_count })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn binary_header(&self) -> &BinaryHeader {
        &self.binary
    }

    pub fn trace_count(&self) -> usize {
        self.trace_count
    }

    fn trace_data_len(&self) -> usize {
        self.binary.samples_per_trace * self.binary.format.bytes_per_sample()
    }

    fn reader(&self) -> ExtractResult<BufReader<File>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.data_offset))?;
        Ok(BufReader::new(file))
    }

    /// Scan trace headers for coordinates and the depth axis
    pub fn read_headers(&self, kind: SurveyKind, layout: &HeaderByteLayout) -> ExtractResult<TraceHeaderSummary> {
        layout.validate()?;
        let mut reader = self.reader()?;
        let skip = self.trace_data_len() as i64;

        let mut geo_coords: Vec<GeoPoint> = Vec::with_capacity(self.trace_count);
        let mut grid_coords: Vec<GridPoint> = Vec::with_capacity(self.trace_count);
        let mut start_depth = 0.0;
        let mut header = [0u8; TRACE_HEADER_LEN];

        for i in 0..self.trace_count {
            reader.read_exact(&mut header)?;
            reader.seek_relative(skip)?;

            let scalar = BigEndian::read_i16(&header[COORDINATE_SCALAR_OFFSET..]);
            geo_coords.push([
                apply_scalar(BigEndian::read_i32(&header[layout.cdp_x - 1..]), scalar),
                apply_scalar(BigEndian::read_i32(&header[layout.cdp_y - 1..]), scalar),
            ]);
            grid_coords.push(match kind {
                SurveyKind::Survey3D => [
                    BigEndian::read_i32(&header[layout.inline - 1..]) as f64,
                    BigEndian::read_i32(&header[layout.crossline - 1..]) as f64,
                ],
                SurveyKind::Line2D => [LINE_2D_INLINE, i as f64],
            });
            if i == 0 {
                start_depth = BigEndian::read_i16(&header[DELAY_TIME_OFFSET..]) as f64;
            }
        }

        let depth_step = self.binary.sample_interval_us as f64 / 1000.0;
        Ok(TraceHeaderSummary {
            geo_coords,
            grid_coords,
            depth_axis: DepthAxis::new(start_depth, depth_step, self.binary.samples_per_trace),
        })
    }

    /// Read every trace into one flat array
    pub fn read_traces(&self) -> ExtractResult<TraceBlock> {
        let mut reader = self.reader()?;
        let ns = self.binary.samples_per_trace;
        let format = self.binary.format;
        let mut data = Vec::with_capacity(self.trace_count * ns);
        let mut header = [0u8; TRACE_HEADER_LEN];
        let mut buffer = vec![0u8; self.trace_data_len()];

        for _ in 0..self.trace_count {
            reader.read_exact(&mut header)?;
            reader.read_exact(&mut buffer)?;
            let mut samples = buffer.as_slice();
            for _ in 0..ns {
                data.push(format.read_sample(&mut samples)?);
            }
        }

        Ok(TraceBlock { samples_per_trace: ns, data })
    }
}

/// One trace to be written by `SegyWriter`
#[derive(Debug, Clone, PartialEq)]
pub struct SegyTrace {
    pub cdp_x: i32,
    pub cdp_y: i32,
    pub inline: i32,
    pub crossline: i32,
    pub coordinate_scalar: i16,
    pub delay: i16,
    pub samples: Vec<TraceValue>,
}

/// Minimal SEG-Y rev1 writer
#[derive(Debug, Clone)]
pub struct SegyWriter {
    pub format: SampleFormat,
    pub sample_interval_us: u16,
    pub layout: HeaderByteLayout,
}

impl SegyWriter {
    pub fn new(format: SampleFormat, sample_interval_us: u16) -> Self {
        Self {
            format,
            sample_interval_us,
            layout: HeaderByteLayout::default(),
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P, traces: &[SegyTrace]) -> ExtractResult<()> {
        self.layout.validate()?;
        let ns = traces.first().map_or(0, |t| t.samples.len());
        if ns == 0 || ns > u16::MAX as usize {
            return Err(ExtractError::InvalidFormat(format!("cannot write traces with {} samples", ns)));
        }
        if traces.iter().any(|t| t.samples.len() != ns) {
            return Err(ExtractError::InvalidFormat("traces must all have the same length".to_string()));
        }

        let mut out = BufWriter::new(File::create(path.as_ref())?);

        let mut text = vec![b' '; TEXT_HEADER_LEN];
        let banner = b"C01 SYNTHETIC VOLUME";
        text[..banner.len()].copy_from_slice(banner);
        out.write_all(&text)?;

        // Binary header offsets are relative to the file start
        let mut binary = [0u8; BINARY_HEADER_LEN];
        let at = |file_offset: usize| file_offset - TEXT_HEADER_LEN;
        BigEndian::write_u16(&mut binary[at(SAMPLE_INTERVAL_OFFSET)..], self.sample_interval_us);
        BigEndian::write_u16(&mut binary[at(SAMPLES_PER_TRACE_OFFSET)..], ns as u16);
        BigEndian::write_u16(&mut binary[at(FORMAT_CODE_OFFSET)..], self.format.code());
        BigEndian::write_u16(&mut binary[at(REVISION_OFFSET)..], 0x0100);
        BigEndian::write_u16(&mut binary[at(FIXED_LENGTH_OFFSET)..], 1);
        out.write_all(&binary)?;

        let mut header = [0u8; TRACE_HEADER_LEN];
        for trace in traces {
            header.fill(0);
            BigEndian::write_i16(&mut header[COORDINATE_SCALAR_OFFSET..], trace.coordinate_scalar);
            BigEndian::write_i16(&mut header[DELAY_TIME_OFFSET..], trace.delay);
            BigEndian::write_u16(&mut header[TRACE_SAMPLES_OFFSET..], ns as u16);
            BigEndian::write_u16(&mut header[TRACE_INTERVAL_OFFSET..], self.sample_interval_us);
            BigEndian::write_i32(&mut header[self.layout.cdp_x - 1..], trace.cdp_x);
            BigEndian::write_i32(&mut header[self.layout.cdp_y - 1..], trace.cdp_y);
            BigEndian::write_i32(&mut header[self.layout.inline - 1..], trace.inline);
            BigEndian::write_i32(&mut header[self.layout.crossline - 1..], trace.crossline);
            out.write_all(&header)?;

            for &v in &trace.samples {
                self.format.write_sample(v, &mut out)?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ibm_float_known_values() {
        // -118.625 from the IBM reference example
        assert_eq!(ibm_to_f32(0xC276_A000), -118.625);
        assert_eq!(ibm_to_f32(0x4110_0000), 1.0);
        assert_eq!(ibm_to_f32(0), 0.0);
        assert_eq!(f32_to_ibm(-118.625), 0xC276_A000);
        assert_eq!(f32_to_ibm(1.0), 0x4110_0000);
    }

    #[test]
    fn test_coordinate_scalar() {
        assert_eq!(apply_scalar(12345, -100), 123.45);
        assert_eq!(apply_scalar(12, 10), 120.0);
        assert_eq!(apply_scalar(7, 0), 7.0);
    }

    #[test]
    fn test_layout_validation() {
        assert!(HeaderByteLayout::default().validate().is_ok());
        let bad = HeaderByteLayout { inline: 239, ..HeaderByteLayout::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_sample_codecs_are_big_endian() {
        let mut bytes = Vec::new();
        SampleFormat::IbmFloat.write_sample(-118.625, &mut bytes).unwrap();
        assert_eq!(bytes, vec![0xC2, 0x76, 0xA0, 0x00]);

        bytes.clear();
        SampleFormat::Int16.write_sample(-2.0, &mut bytes).unwrap();
        SampleFormat::IeeeFloat.write_sample(1.5, &mut bytes).unwrap();
        SampleFormat::Int8.write_sample(-3.0, &mut bytes).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xFE, 0x3F, 0xC0, 0x00, 0x00, 0xFD]);

        let mut reader = bytes.as_slice();
        assert_eq!(SampleFormat::Int16.read_sample(&mut reader).unwrap(), -2.0);
        assert_eq!(SampleFormat::IeeeFloat.read_sample(&mut reader).unwrap(), 1.5);
        assert_eq!(SampleFormat::Int8.read_sample(&mut reader).unwrap(), -3.0);
        assert!(SampleFormat::Int32.read_sample(&mut reader).is_err());
    }

    #[test]
    fn test_unsupported_format_code() {
        assert!(SampleFormat::from_code(4).is_err());
        assert_eq!(SampleFormat::from_code(5).unwrap(), SampleFormat::IeeeFloat);
    }
}
