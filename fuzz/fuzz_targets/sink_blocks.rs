//! Fuzz test for the buffered sink
//!
//! Whatever the block size and however the input is split, the bytes that
//! land in the target must be the concatenation of the pushed pieces.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::io;
use std::sync::{Arc, Mutex};
use tandem_core::{BufferedSink, PositionedWrite};

#[derive(Debug, Arbitrary)]
struct Input {
    block_size: u8,
    pieces: Vec<Vec<u8>>,
}

#[derive(Clone, Default)]
struct MemTarget(Arc<Mutex<Vec<u8>>>);

impl PositionedWrite for MemTarget {
    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut data = self.0.lock().map_err(|_| io::Error::other("poisoned"))?;
        let start = offset as usize;
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

fuzz_target!(|input: Input| {
    let block_size = usize::from(input.block_size).max(1);
    let target = MemTarget::default();

    let Ok(mut sink) = BufferedSink::new(target.clone(), "fuzz", block_size) else {
        return;
    };

    let mut expected = Vec::new();
    for piece in &input.pieces {
        sink.push(piece).unwrap();
        expected.extend_from_slice(piece);
    }

    let report = sink.finish().unwrap();
    assert_eq!(report.bytes_written, expected.len() as u64);
    assert_eq!(*target.0.lock().unwrap(), expected);
});
