//
// encapsulated.rs
// Ceph-Tools-rs
//
// Frames a compressed payload as encapsulated Pixel Data: offset table, even-length fragments, delimiter.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::{Read, Write};

use dicom::core::{Length, VR};
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{CephError, Result, ValidationError};
use crate::stream::DicomStreamWriter;

/// Largest even fragment length an Item header can declare.
pub const DEFAULT_FRAGMENT_LIMIT: u32 = 0xFFFF_FFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncapsulationSummary {
    pub fragments: usize,
    pub payload_bytes: u64,
}

/// Writes `dataset`, then `payload` as encapsulated Pixel Data (7FE0,0010).
///
/// Each fragment holds at most `fragment_limit` payload bytes. Odd-length fragments
/// get one trailing zero byte and an Item length rounded up to even. On error the
/// destination holds a truncated stream and must be discarded.
pub fn write_encapsulated<W: Write, R: Read>(
    writer: &mut DicomStreamWriter<W>,
    dataset: &InMemDicomObject,
    mut payload: R,
    fragment_limit: u32,
    cancel: Option<&CancelToken>,
) -> Result<EncapsulationSummary> {
    if fragment_limit == 0 {
        return Err(ValidationError::FragmentLimit.into());
    }

    writer.write_dataset(dataset)?;
    writer.write_element_header(tags::PIXEL_DATA, VR::OB, Length::UNDEFINED)?;
    // empty Basic Offset Table
    writer.write_item_header(0)?;

    let mut summary = EncapsulationSummary {
        fragments: 0,
        payload_bytes: 0,
    };
    let mut fragment = Vec::new();
    loop {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(CephError::Cancelled {
                completed: summary.fragments,
            });
        }

        fragment.clear();
        (&mut payload)
            .take(u64::from(fragment_limit))
            .read_to_end(&mut fragment)
            .map_err(|e| CephError::io("pixel payload", e))?;
        if fragment.is_empty() {
            break;
        }

        let padded = fragment.len() % 2 == 1;
        let item_len = u32::try_from(fragment.len() + usize::from(padded))
            .map_err(|_| CephError::Dicom("fragment exceeds 32-bit item length".into()))?;
        writer.write_item_header(item_len)?;
        writer.write_raw(&fragment)?;
        if padded {
            writer.write_raw(&[0])?;
        }

        summary.fragments += 1;
        summary.payload_bytes += fragment.len() as u64;
    }

    writer.write_sequence_delimiter()?;
    debug!(
        fragments = summary.fragments,
        bytes = summary.payload_bytes,
        "wrote encapsulated pixel data"
    );
    Ok(summary)
}
