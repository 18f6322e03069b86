use std::fs;
use std::path::Path;

use rnlt_data::cifar::{IMAGE_BYTES, RECORD_BYTES};

/// Write a shard of `records` records. Record `i` has label `(first_label + i) % 10`
/// and every pixel byte set to `(i % 256)`.
pub fn write_shard(dir: &Path, name: &str, records: usize, first_label: u8) {
    let mut bytes = Vec::with_capacity(records * RECORD_BYTES);
    for i in 0..records {
        bytes.push(((first_label as usize + i) % 10) as u8);
        bytes.extend(std::iter::repeat((i % 256) as u8).take(IMAGE_BYTES));
    }
    fs::write(dir.join(name), bytes).unwrap();
}
