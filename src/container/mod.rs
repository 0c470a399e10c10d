//! Tagged-bank container interface
//!
//! The outer event container is parsed elsewhere; the decoder only needs
//! child-bank selection by tag range and the flat 32-bit word payload of a
//! bank. [`BankView`] is that boundary, [`Bank`] an owned implementation used
//! by the emulator, the dump files and the tests.
//!
//! # Dump file format
//! A sequence of records, each a `u32` little-endian length followed by a
//! MessagePack-encoded [`Bank`].

use std::io::{ErrorKind, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::EraLayout;

/// Container errors
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("Record of {0} bytes exceeds the size limit")]
    RecordTooLarge(usize),
}

/// Largest record accepted when reading a dump file
pub const MAX_RECORD_BYTES: usize = 256 * 1024 * 1024;

/// Read-only view of a bank in the event container
pub trait BankView {
    /// Bank tag
    fn tag(&self) -> u32;

    /// Bank number
    fn number(&self) -> u32;

    /// Flat 32-bit word payload (empty for container banks)
    fn int_words(&self) -> &[u32];

    /// Direct children whose tag lies in `[min_tag, max_tag]`
    fn child_banks(&self, min_tag: u32, max_tag: u32) -> Vec<&Self>;
}

/// Owned bank tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub tag: u32,
    pub number: u32,
    pub words: Vec<u32>,
    pub children: Vec<Bank>,
}

impl Bank {
    /// Create a container bank holding other banks
    pub fn container(tag: u32, number: u32, children: Vec<Bank>) -> Self {
        Self {
            tag,
            number,
            words: Vec::new(),
            children,
        }
    }

    /// Create a leaf bank holding 32-bit words
    pub fn data(tag: u32, number: u32, words: Vec<u32>) -> Self {
        Self {
            tag,
            number,
            words,
            children: Vec::new(),
        }
    }

    /// Serialize to MessagePack bytes
    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize from MessagePack bytes
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

impl BankView for Bank {
    fn tag(&self) -> u32 {
        self.tag
    }

    fn number(&self) -> u32 {
        self.number
    }

    fn int_words(&self) -> &[u32] {
        &self.words
    }

    fn child_banks(&self, min_tag: u32, max_tag: u32) -> Vec<&Self> {
        self.children
            .iter()
            .filter(|child| child.tag >= min_tag && child.tag <= max_tag)
            .collect()
    }
}

/// ROC banks of an event for the given era
pub fn roc_banks<'a, B: BankView>(event: &'a B, layout: &EraLayout) -> Vec<&'a B> {
    event.child_banks(layout.min_roc_tag, layout.max_roc_tag)
}

/// SVT data banks of a ROC bank for the given era
pub fn data_banks<'a, B: BankView>(roc: &'a B, layout: &EraLayout) -> Vec<&'a B> {
    roc.child_banks(layout.min_data_tag, layout.max_data_tag)
}

/// Write events as length-prefixed MessagePack records
pub fn write_events<W: Write>(writer: &mut W, events: &[Bank]) -> Result<(), ContainerError> {
    for event in events {
        let data = event.to_msgpack()?;
        writer.write_all(&(data.len() as u32).to_le_bytes())?;
        writer.write_all(&data)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read all events from a dump; a truncated trailing record ends the stream
pub fn read_events<R: Read>(reader: &mut R) -> Result<Vec<Bank>, ContainerError> {
    let mut events = Vec::new();
    loop {
        let mut len_bytes = [0u8; 4];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_RECORD_BYTES {
            return Err(ContainerError::RecordTooLarge(len));
        }

        let mut data = vec![0u8; len];
        match reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!(
                    expected = len,
                    read = events.len(),
                    "Truncated record at end of dump"
                );
                break;
            }
            Err(e) => return Err(e.into()),
        }
        events.push(Bank::from_msgpack(&data)?);
    }
    Ok(events)
}
