//! GDS-II stream reader and writer.
//!
//! Each record is `[2-byte length][2-byte record type][payload]`. The
//! hierarchy is BGNLIB → BGNSTR → BOUNDARY/PATH/SREF/AREF → ENDSTR → ENDLIB.
//! Coordinates are kept in integer database units.

use std::io::{self, Read, Seek};
use thiserror::Error;

use maskview_core::geometry::Point;

use crate::library::{Element, GdsCell, GdsLibrary, Strans};

// ── GDS-II Record Types ──────────────────────────────────────────────

#[allow(dead_code)]
mod record_type {
    pub const HEADER: u16     = 0x0002;
    pub const BGNLIB: u16     = 0x0102;
    pub const LIBNAME: u16    = 0x0206;
    pub const UNITS: u16      = 0x0305;
    pub const ENDLIB: u16     = 0x0400;
    pub const BGNSTR: u16     = 0x0502;
    pub const STRNAME: u16    = 0x0606;
    pub const ENDSTR: u16     = 0x0700;
    pub const BOUNDARY: u16   = 0x0800;
    pub const PATH: u16       = 0x0900;
    pub const SREF: u16       = 0x0A00;
    pub const AREF: u16       = 0x0B00;
    pub const TEXT: u16       = 0x0C00;
    pub const LAYER: u16      = 0x0D02;
    pub const DATATYPE: u16   = 0x0E02;
    pub const WIDTH: u16      = 0x0F03;
    pub const XY: u16         = 0x1003;
    pub const ENDEL: u16      = 0x1100;
    pub const SNAME: u16      = 0x1206;
    pub const COLROW: u16     = 0x1302;
    pub const NODE: u16       = 0x1500;
    pub const STRANS: u16     = 0x1A01;
    pub const MAG: u16        = 0x1B05;
    pub const ANGLE: u16      = 0x1C05;
    pub const PATHTYPE: u16   = 0x2102;
    pub const BOX: u16        = 0x2D00;
}

/// STRANS flag for reflection about the x axis.
const STRANS_REFLECT: u16 = 0x8000;

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum GdsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid GDS-II record at offset {offset}: {message}")]
    InvalidRecord { offset: u64, message: String },

    #[error("Unexpected record type 0x{record_type:04X}, expected 0x{expected:04X}")]
    UnexpectedRecord { record_type: u16, expected: u16 },

    #[error("Invalid coordinate data")]
    InvalidCoordinates,

    #[error("Cell '{0}' referenced but not defined")]
    UndefinedCell(String),

    #[error("Reference cycle through cell '{0}'")]
    CyclicReference(String),

    #[error("Cell '{cell}' placed at unsupported angle {angle}")]
    UnsupportedTransform { cell: String, angle: f64 },
}

// ── GDS-II Record ─────────────────────────────────────────────────────

#[derive(Debug)]
struct GdsRecord {
    record_type: u16,
    data: Vec<u8>,
}

impl GdsRecord {
    fn as_i16_vec(&self) -> Vec<i16> {
        self.data
            .chunks_exact(2)
            .map(|c| i16::from_be_bytes([c[0], c[1]]))
            .collect()
    }

    fn as_i32_vec(&self) -> Vec<i32> {
        self.data
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn as_string(&self) -> String {
        let s: String = self.data.iter().map(|&b| b as char).collect();
        s.trim_end_matches('\0').to_string()
    }

    /// Payload as GDS-II 8-byte reals (excess-64 floating point).
    fn as_f64_vec(&self) -> Vec<f64> {
        self.data
            .chunks_exact(8)
            .map(|c| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(c);
                gds_real8_to_f64(&bytes)
            })
            .collect()
    }

    fn first_i16(&self) -> Option<i16> {
        self.as_i16_vec().first().copied()
    }

    fn first_f64(&self) -> Option<f64> {
        self.as_f64_vec().first().copied()
    }

    fn as_points(&self) -> Vec<Point> {
        self.as_i32_vec()
            .chunks_exact(2)
            .map(|pair| Point::new(pair[0], pair[1]))
            .collect()
    }
}

/// Convert GDS-II excess-64 real format to IEEE 754 f64.
fn gds_real8_to_f64(bytes: &[u8; 8]) -> f64 {
    if bytes.iter().all(|&b| b == 0) {
        return 0.0;
    }

    let sign = if bytes[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (bytes[0] & 0x7F) as i32 - 64;

    let mut mantissa: u64 = 0;
    for &b in &bytes[1..] {
        mantissa = (mantissa << 8) | (b as u64);
    }

    let mantissa_f = mantissa as f64 / (1u64 << 56) as f64;
    sign * mantissa_f * 16.0_f64.powi(exponent)
}

/// Convert IEEE 754 f64 to GDS-II excess-64 real format.
fn f64_to_gds_real8(value: f64) -> [u8; 8] {
    if value == 0.0 {
        return [0u8; 8];
    }

    let sign_bit: u8 = if value < 0.0 { 0x80 } else { 0x00 };
    let mut val = value.abs();

    // 1/16 <= mantissa < 1
    let mut exponent: i32 = 0;
    while val >= 1.0 && exponent < 63 {
        val /= 16.0;
        exponent += 1;
    }
    while val < 1.0 / 16.0 && exponent > -64 {
        val *= 16.0;
        exponent -= 1;
    }

    let mantissa = (val * (1u64 << 56) as f64).round() as u64;
    let mut result = mantissa.to_be_bytes();
    result[0] = sign_bit | ((exponent + 64) as u8 & 0x7F);
    result
}

// ── GDS-II Reader ─────────────────────────────────────────────────────

pub struct GdsReader<R: Read + Seek> {
    reader: R,
}

impl<R: Read + Seek> GdsReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the entire stream into a [`GdsLibrary`].
    pub fn read(&mut self) -> Result<GdsLibrary, GdsError> {
        let mut lib = GdsLibrary::new("imported");

        self.read_header()?;
        self.read_lib(&mut lib)?;

        Ok(lib)
    }

    fn offset(&mut self) -> u64 {
        self.reader.stream_position().unwrap_or(0)
    }

    fn read_record(&mut self) -> Result<Option<GdsRecord>, GdsError> {
        let mut len_buf = [0u8; 2];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(GdsError::Io(e)),
        }

        let total_len = u16::from_be_bytes(len_buf) as usize;
        if total_len < 4 {
            return Err(GdsError::InvalidRecord {
                offset: self.offset(),
                message: format!("Record length {} is too small", total_len),
            });
        }

        let mut type_buf = [0u8; 2];
        self.read_body(&mut type_buf, total_len)?;
        let record_type = u16::from_be_bytes(type_buf);

        let mut data = vec![0u8; total_len - 4];
        if !data.is_empty() {
            self.read_body(&mut data, total_len)?;
        }

        Ok(Some(GdsRecord { record_type, data }))
    }

    /// Fill `buf` from inside a record whose length field was already read.
    fn read_body(&mut self, buf: &mut [u8], total_len: usize) -> Result<(), GdsError> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(GdsError::InvalidRecord {
                offset: self.offset(),
                message: format!("Stream ends inside a {}-byte record", total_len),
            }),
            Err(e) => Err(GdsError::Io(e)),
        }
    }

    /// Like `read_record`, but running out of input is an error.
    fn expect_record(&mut self) -> Result<GdsRecord, GdsError> {
        match self.read_record()? {
            Some(rec) => Ok(rec),
            None => Err(GdsError::InvalidRecord {
                offset: self.offset(),
                message: "Unexpected end of stream".into(),
            }),
        }
    }

    fn read_header(&mut self) -> Result<(), GdsError> {
        let rec = self.read_record()?.ok_or(GdsError::InvalidRecord {
            offset: 0,
            message: "Empty file".into(),
        })?;

        if rec.record_type != record_type::HEADER {
            return Err(GdsError::UnexpectedRecord {
                record_type: rec.record_type,
                expected: record_type::HEADER,
            });
        }

        if let Some(version) = rec.first_i16() {
            log::debug!("GDS-II version: {}", version);
        }

        Ok(())
    }

    fn read_lib(&mut self, lib: &mut GdsLibrary) -> Result<(), GdsError> {
        while let Some(rec) = self.read_record()? {
            match rec.record_type {
                record_type::LIBNAME => {
                    lib.name = rec.as_string();
                    log::debug!("Library name: {}", lib.name);
                }
                record_type::UNITS => {
                    let units = rec.as_f64_vec();
                    if units.len() >= 2 {
                        lib.user_units_per_db = units[0];
                        lib.meters_per_db = units[1];
                        log::debug!(
                            "Database unit: {} user units, {} m",
                            lib.user_units_per_db,
                            lib.meters_per_db
                        );
                    }
                }
                record_type::BGNSTR => {
                    let cell = self.read_structure()?;
                    lib.add_cell(cell);
                }
                record_type::ENDLIB => {
                    log::debug!("End of library. {} cells read.", lib.cell_count());
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn read_structure(&mut self) -> Result<GdsCell, GdsError> {
        let mut cell = GdsCell::new("unnamed");

        loop {
            let rec = self.expect_record()?;
            match rec.record_type {
                record_type::STRNAME => {
                    cell.name = rec.as_string();
                    log::trace!("Reading cell: {}", cell.name);
                }
                record_type::BOUNDARY => {
                    if let Some(element) = self.read_boundary()? {
                        cell.add_element(element);
                    }
                }
                record_type::PATH => {
                    if let Some(element) = self.read_path()? {
                        cell.add_element(element);
                    }
                }
                record_type::SREF | record_type::AREF => {
                    let is_array = rec.record_type == record_type::AREF;
                    if let Some(element) = self.read_reference(is_array)? {
                        cell.add_element(element);
                    }
                }
                record_type::BOX | record_type::TEXT | record_type::NODE => {
                    self.skip_to_endel()?;
                }
                record_type::ENDSTR => break,
                _ => {}
            }
        }

        Ok(cell)
    }

    fn read_boundary(&mut self) -> Result<Option<Element>, GdsError> {
        let mut layer: u16 = 0;
        let mut datatype: u16 = 0;
        let mut points: Vec<Point> = Vec::new();

        loop {
            let rec = self.expect_record()?;
            match rec.record_type {
                record_type::LAYER => layer = rec.first_i16().unwrap_or(0) as u16,
                record_type::DATATYPE => datatype = rec.first_i16().unwrap_or(0) as u16,
                record_type::XY => points = rec.as_points(),
                record_type::ENDEL => break,
                _ => {}
            }
        }

        // Boundaries repeat the first point.
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        if points.len() < 3 {
            log::warn!("Skipping boundary on {}/{} with {} points", layer, datatype, points.len());
            return Ok(None);
        }

        Ok(Some(Element::Boundary {
            layer,
            datatype,
            points,
        }))
    }

    fn read_path(&mut self) -> Result<Option<Element>, GdsError> {
        let mut layer: u16 = 0;
        let mut datatype: u16 = 0;
        let mut pathtype: i16 = 0;
        let mut width: i32 = 0;
        let mut points: Vec<Point> = Vec::new();

        loop {
            let rec = self.expect_record()?;
            match rec.record_type {
                record_type::LAYER => layer = rec.first_i16().unwrap_or(0) as u16,
                record_type::DATATYPE => datatype = rec.first_i16().unwrap_or(0) as u16,
                record_type::PATHTYPE => pathtype = rec.first_i16().unwrap_or(0),
                record_type::WIDTH => width = rec.as_i32_vec().first().copied().unwrap_or(0),
                record_type::XY => points = rec.as_points(),
                record_type::ENDEL => break,
                _ => {}
            }
        }

        if points.len() < 2 {
            return Ok(None);
        }

        Ok(Some(Element::Path {
            layer,
            datatype,
            pathtype,
            width,
            points,
        }))
    }

    fn read_reference(&mut self, is_array: bool) -> Result<Option<Element>, GdsError> {
        let mut cell = String::new();
        let mut strans = Strans::default();
        let mut columns: u16 = 1;
        let mut rows: u16 = 1;
        let mut points: Vec<Point> = Vec::new();

        loop {
            let rec = self.expect_record()?;
            match rec.record_type {
                record_type::SNAME => cell = rec.as_string(),
                record_type::STRANS => {
                    let flags = rec.first_i16().unwrap_or(0) as u16;
                    strans.reflect_x = flags & STRANS_REFLECT != 0;
                }
                record_type::MAG => strans.magnification = rec.first_f64().unwrap_or(1.0),
                record_type::ANGLE => strans.angle = rec.first_f64().unwrap_or(0.0),
                record_type::COLROW => {
                    let vals = rec.as_i16_vec();
                    if vals.len() >= 2 {
                        columns = vals[0].max(1) as u16;
                        rows = vals[1].max(1) as u16;
                    }
                }
                record_type::XY => points = rec.as_points(),
                record_type::ENDEL => break,
                _ => {}
            }
        }

        if cell.is_empty() {
            return Ok(None);
        }

        let element = if is_array {
            if points.len() < 3 {
                return Err(GdsError::InvalidCoordinates);
            }
            Element::Aref {
                cell,
                strans,
                columns,
                rows,
                origin: points[0],
                column_end: points[1],
                row_end: points[2],
            }
        } else {
            let origin = points.first().copied().ok_or(GdsError::InvalidCoordinates)?;
            Element::Sref {
                cell,
                strans,
                origin,
            }
        };
        Ok(Some(element))
    }

    fn skip_to_endel(&mut self) -> Result<(), GdsError> {
        while let Some(rec) = self.read_record()? {
            if rec.record_type == record_type::ENDEL {
                break;
            }
        }
        Ok(())
    }
}

// ── GDS-II Writer ─────────────────────────────────────────────────────

pub struct GdsWriter<W: io::Write> {
    writer: W,
}

impl<W: io::Write> GdsWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a [`GdsLibrary`] as a GDS-II stream.
    pub fn write(&mut self, lib: &GdsLibrary) -> Result<(), GdsError> {
        self.write_i16_record(record_type::HEADER, &[600])?;
        self.write_i16_record(record_type::BGNLIB, &TIMESTAMP)?;
        self.write_string_record(record_type::LIBNAME, &lib.name)?;
        self.write_real8_record(record_type::UNITS, &[lib.user_units_per_db, lib.meters_per_db])?;

        for cell in lib.cells() {
            self.write_cell(cell)?;
        }

        self.write_record(record_type::ENDLIB, &[])?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_record(&mut self, record_type: u16, data: &[u8]) -> Result<(), GdsError> {
        let total_len = u16::try_from(data.len() + 4).map_err(|_| GdsError::InvalidRecord {
            offset: 0,
            message: format!("Payload of {} bytes does not fit in one record", data.len()),
        })?;
        self.writer.write_all(&total_len.to_be_bytes())?;
        self.writer.write_all(&record_type.to_be_bytes())?;
        if !data.is_empty() {
            self.writer.write_all(data)?;
        }
        Ok(())
    }

    fn write_i16_record(&mut self, record_type: u16, values: &[i16]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_i32_record(&mut self, record_type: u16, values: &[i32]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_string_record(&mut self, record_type: u16, s: &str) -> Result<(), GdsError> {
        let mut data: Vec<u8> = s.bytes().collect();
        // GDS strings must be even length
        if data.len() % 2 != 0 {
            data.push(0);
        }
        self.write_record(record_type, &data)
    }

    fn write_real8_record(&mut self, record_type: u16, values: &[f64]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| f64_to_gds_real8(*v)).collect();
        self.write_record(record_type, &data)
    }

    fn write_xy(&mut self, points: &[Point]) -> Result<(), GdsError> {
        let coords: Vec<i32> = points.iter().flat_map(|p| [p.x, p.y]).collect();
        self.write_i32_record(record_type::XY, &coords)
    }

    fn write_layer(&mut self, layer: u16, datatype: u16) -> Result<(), GdsError> {
        self.write_i16_record(record_type::LAYER, &[layer as i16])?;
        self.write_i16_record(record_type::DATATYPE, &[datatype as i16])
    }

    fn write_cell(&mut self, cell: &GdsCell) -> Result<(), GdsError> {
        self.write_i16_record(record_type::BGNSTR, &TIMESTAMP)?;
        self.write_string_record(record_type::STRNAME, &cell.name)?;

        for element in &cell.elements {
            self.write_element(element)?;
        }

        self.write_record(record_type::ENDSTR, &[])
    }

    fn write_element(&mut self, element: &Element) -> Result<(), GdsError> {
        match element {
            Element::Boundary {
                layer,
                datatype,
                points,
            } => {
                self.write_record(record_type::BOUNDARY, &[])?;
                self.write_layer(*layer, *datatype)?;
                let mut closed = points.clone();
                if let Some(first) = points.first() {
                    closed.push(*first);
                }
                self.write_xy(&closed)?;
            }
            Element::Path {
                layer,
                datatype,
                pathtype,
                width,
                points,
            } => {
                self.write_record(record_type::PATH, &[])?;
                self.write_layer(*layer, *datatype)?;
                self.write_i16_record(record_type::PATHTYPE, &[*pathtype])?;
                self.write_i32_record(record_type::WIDTH, &[*width])?;
                self.write_xy(points)?;
            }
            Element::Sref {
                cell,
                strans,
                origin,
            } => {
                self.write_record(record_type::SREF, &[])?;
                self.write_string_record(record_type::SNAME, cell)?;
                self.write_strans(strans)?;
                self.write_xy(&[*origin])?;
            }
            Element::Aref {
                cell,
                strans,
                columns,
                rows,
                origin,
                column_end,
                row_end,
            } => {
                self.write_record(record_type::AREF, &[])?;
                self.write_string_record(record_type::SNAME, cell)?;
                self.write_strans(strans)?;
                self.write_i16_record(record_type::COLROW, &[*columns as i16, *rows as i16])?;
                self.write_xy(&[*origin, *column_end, *row_end])?;
            }
        }
        self.write_record(record_type::ENDEL, &[])
    }

    fn write_strans(&mut self, strans: &Strans) -> Result<(), GdsError> {
        if strans.is_identity() {
            return Ok(());
        }
        let flags = if strans.reflect_x { STRANS_REFLECT } else { 0 };
        self.write_i16_record(record_type::STRANS, &[flags as i16])?;
        if strans.magnification != 1.0 {
            self.write_real8_record(record_type::MAG, &[strans.magnification])?;
        }
        if strans.angle != 0.0 {
            self.write_real8_record(record_type::ANGLE, &[strans.angle])?;
        }
        Ok(())
    }
}

/// Modification and access dates written to BGNLIB and BGNSTR.
const TIMESTAMP: [i16; 12] = [2026, 1, 1, 0, 0, 0, 2026, 1, 1, 0, 0, 0];
