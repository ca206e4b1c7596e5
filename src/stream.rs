//
// stream.rs
// Ceph-Tools-rs
//
// Part 10 stream writer with byte-position tracking: preamble, meta group, data set and raw element framing.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use dicom::core::{DataElementHeader, Length, Tag, VR};
use dicom::dictionary_std::uids;
use dicom::encoding::encode::explicit_le::ExplicitVRLittleEndianEncoder;
use dicom::encoding::encode::Encode;
use dicom::encoding::{TransferSyntax, TransferSyntaxIndex};
use dicom::object::{FileMetaTable, InMemDicomObject};
use dicom::transfer_syntax::TransferSyntaxRegistry;

use crate::error::{CephError, Result};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// Writes a DICOM Part 10 stream in Explicit VR Little Endian and counts every byte written.
///
/// Offsets reported by [`DicomStreamWriter::position`] are relative to the first preamble byte.
pub struct DicomStreamWriter<W: Write> {
    to: W,
    position: u64,
    label: PathBuf,
}

impl DicomStreamWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| CephError::io(path, e))?;
        Ok(Self::new(BufWriter::new(file), path))
    }
}

impl<W: Write> DicomStreamWriter<W> {
    /// `label` names the destination in error messages.
    pub fn new(to: W, label: impl Into<PathBuf>) -> Self {
        Self {
            to,
            position: 0,
            label: label.into(),
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// 128-byte zero preamble, the `DICM` prefix, then the file meta group.
    pub fn write_file_header(&mut self, meta: &FileMetaTable) -> Result<()> {
        self.write_raw(&[0u8; PREAMBLE_LEN])?;
        self.write_raw(MAGIC)?;
        meta.write(&mut *self)
            .map_err(|e| CephError::Dicom(format!("writing file meta group: {}", e)))
    }

    pub fn write_dataset(&mut self, dataset: &InMemDicomObject) -> Result<()> {
        let ts = explicit_vr_le()?;
        dataset.write_dataset_with_ts(&mut *self, ts)?;
        Ok(())
    }

    pub fn write_element_header(&mut self, tag: Tag, vr: VR, len: Length) -> Result<()> {
        ExplicitVRLittleEndianEncoder::default()
            .encode_element_header(&mut *self, DataElementHeader::new(tag, vr, len))?;
        Ok(())
    }

    /// Item tag (FFFE,E000) with a defined length.
    pub fn write_item_header(&mut self, len: u32) -> Result<()> {
        ExplicitVRLittleEndianEncoder::default().encode_item_header(&mut *self, len)?;
        Ok(())
    }

    /// Sequence Delimitation Item (FFFE,E0DD) with zero length.
    pub fn write_sequence_delimiter(&mut self) -> Result<()> {
        ExplicitVRLittleEndianEncoder::default().encode_sequence_delimiter(&mut *self)?;
        Ok(())
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes).map_err(|e| CephError::io(&self.label, e))
    }

    /// Flushes and hands back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.to.flush().map_err(|e| CephError::io(&self.label, e))?;
        Ok(self.to)
    }
}

impl<W: Write> Write for DicomStreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.to.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.to.flush()
    }
}

fn explicit_vr_le() -> Result<&'static TransferSyntax> {
    TransferSyntaxRegistry
        .get(uids::EXPLICIT_VR_LITTLE_ENDIAN)
        .ok_or_else(|| CephError::Dicom("Explicit VR Little Endian is not registered".into()))
}

/// Encodes a bare data set (no preamble or meta) in Explicit VR Little Endian.
pub fn encode_dataset(dataset: &InMemDicomObject) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    dataset.write_dataset_with_ts(&mut bytes, explicit_vr_le()?)?;
    Ok(bytes)
}
