//! The configuration catalog over a raw medium.
//!
//! Slot addresses are replayed from record sizes on every access; the
//! catalog persists no per-record offsets. The catalog header (record
//! count + active index) is one word and is always read-modify-written as
//! a unit. Monotonic counters are flushed before the object they tag is
//! written, so an index is burned even when the following record write
//! fails.

use serde::Serialize;
use speclink_common::{IdentityProvider, ModelName, SerialTag, MODEL_NAME_LEN, SCAN_NAME_LEN,
    SERIAL_TAG_LEN};

use crate::error::StoreError;
use crate::layout::*;
use crate::medium::NvmMedium;
use crate::record::*;

/// Durable catalog of configuration records plus the fixed auxiliary
/// records (identity, calibration, reference scan, scan name).
pub struct ConfigStore<M: NvmMedium> {
    medium: M,
    identity: Box<dyn IdentityProvider>,
    id_cache: [u32; CATALOG_CAPACITY as usize],
    cache_len: u8,
}

/// One row of the catalog summary used by host tooling.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    /// Slot index.
    pub slot: u8,
    /// Monotonic configuration index.
    pub config_index: u32,
    /// Scan shape.
    pub kind: ScanKind,
    /// Serialized footprint in bytes.
    pub size: usize,
    /// Stamped serial tag, trimmed.
    pub serial: String,
    /// Section count for variable records.
    pub sections: Option<u8>,
}

impl<M: NvmMedium> ConfigStore<M> {
    /// Build a store over `medium`, stamping new records via `identity`.
    pub fn new(medium: M, identity: Box<dyn IdentityProvider>) -> Self {
        ConfigStore {
            medium,
            identity,
            id_cache: [u32::MAX; CATALOG_CAPACITY as usize],
            cache_len: 0,
        }
    }

    /// Borrow the underlying medium (test inspection).
    pub fn medium(&self) -> &M {
        &self.medium
    }

    // ------------------------------------------------------------------
    // Catalog header
    // ------------------------------------------------------------------

    fn read_header(&mut self) -> Result<(u16, u16), StoreError> {
        let word = self.read_u32(CATALOG_HEADER_OFFSET)?;
        Ok(((word & 0xFFFF) as u16, (word >> 16) as u16))
    }

    fn write_header(&mut self, count: u16, active: u16) -> Result<(), StoreError> {
        let word = (count as u32) | ((active as u32) << 16);
        self.write_u32(CATALOG_HEADER_OFFSET, word)
    }

    /// Number of records in the catalog.
    ///
    /// A stored count beyond the fixed capacity is treated as corruption
    /// and reported as zero.
    pub fn record_count(&mut self) -> Result<u8, StoreError> {
        let (count, _) = self.read_header()?;
        if count > CATALOG_CAPACITY as u16 {
            log::warn!("catalog count {} exceeds capacity; treating as empty", count);
            return Ok(0);
        }
        Ok(count as u8)
    }

    /// The active record slot.
    pub fn active_index(&mut self) -> Result<u16, StoreError> {
        let (_, active) = self.read_header()?;
        Ok(active)
    }

    /// Persist the active record slot, keeping the count.
    pub fn set_active_index(&mut self, active: u16) -> Result<(), StoreError> {
        let (count, _) = self.read_header()?;
        self.write_header(count, active)
    }

    // ------------------------------------------------------------------
    // Monotonic counters
    // ------------------------------------------------------------------

    /// Draw the next configuration index.
    ///
    /// The incremented counter is persisted before the caller writes the
    /// record it tags; a failed record write burns the index.
    pub fn allocate_config_index(&mut self) -> Result<u32, StoreError> {
        let next = self.read_u32(NEXT_CONFIG_INDEX_OFFSET)?;
        self.write_u32(NEXT_CONFIG_INDEX_OFFSET, next.wrapping_add(1))?;
        Ok(next)
    }

    /// Draw the next scan index for acquisition tagging.
    pub fn allocate_scan_index(&mut self) -> Result<u32, StoreError> {
        let next = self.read_u32(NEXT_SCAN_INDEX_OFFSET)?;
        self.write_u32(NEXT_SCAN_INDEX_OFFSET, next.wrapping_add(1))?;
        Ok(next)
    }

    /// Peek the configuration-index counter without drawing.
    pub fn next_config_index(&mut self) -> Result<u32, StoreError> {
        self.read_u32(NEXT_CONFIG_INDEX_OFFSET)
    }

    /// Peek the scan-index counter without drawing.
    pub fn next_scan_index(&mut self) -> Result<u32, StoreError> {
        self.read_u32(NEXT_SCAN_INDEX_OFFSET)
    }

    // ------------------------------------------------------------------
    // Record addressing
    // ------------------------------------------------------------------

    /// Resolve the medium offset of `index` by replaying prior sizes.
    ///
    /// Valid for `index <= record_count()` so a save may append one slot;
    /// fails on out-of-range indices, an invalid prior record, or an
    /// offset past the managed region.
    pub fn address_of(&mut self, index: u8) -> Result<usize, StoreError> {
        if index >= CATALOG_CAPACITY {
            return Err(StoreError::IndexOutOfRange {
                index,
                capacity: CATALOG_CAPACITY,
            });
        }
        let count = self.record_count()?;
        if index > count {
            return Err(StoreError::IndexBeyondCount { index, count });
        }

        let mut offset = RECORD_BASE_OFFSET;
        for prior in 0..index {
            let prefix_len = RECORD_HEADER_SIZE + VARIABLE_HEADER_SIZE;
            if offset + prefix_len > STORE_SIZE {
                return Err(StoreError::AddressOverflow);
            }
            let mut prefix = [0u8; RECORD_HEADER_SIZE + VARIABLE_HEADER_SIZE];
            self.medium.read_at(offset, &mut prefix)?;

            if prefix[0] == INVALID_SERIAL_SENTINEL {
                return Err(StoreError::InvalidRecord { index: prior });
            }
            let kind = ScanKind::from_u8(prefix[SERIAL_TAG_LEN])?;
            let section_count = prefix[RECORD_HEADER_SIZE];
            offset += footprint(kind, section_count)?;
            if offset > STORE_SIZE {
                return Err(StoreError::AddressOverflow);
            }
        }

        if offset >= STORE_SIZE {
            return Err(StoreError::AddressOverflow);
        }
        Ok(offset)
    }

    // ------------------------------------------------------------------
    // Record access
    // ------------------------------------------------------------------

    /// Read the record at `index`.
    ///
    /// Reads the maximum possible footprint first, then re-reads with the
    /// variable-sized footprint once the section count is known (the size
    /// lives inside the record itself).
    pub fn get(&mut self, index: u8) -> Result<ConfigRecord, StoreError> {
        let count = self.record_count()?;
        if index >= count {
            return Err(StoreError::IndexBeyondCount { index, count });
        }
        let offset = self.address_of(index)?;

        let max_read = MAX_RECORD_SIZE.min(STORE_SIZE - offset);
        let mut buf = vec![0u8; max_read];
        self.medium.read_at(offset, &mut buf)?;

        if buf[0] == INVALID_SERIAL_SENTINEL {
            return Err(StoreError::InvalidRecord { index });
        }

        let kind = ScanKind::from_u8(buf[SERIAL_TAG_LEN])?;
        if kind == ScanKind::Variable {
            let section_count = buf[RECORD_HEADER_SIZE];
            let size = footprint(kind, section_count)?;
            let mut exact = vec![0u8; size];
            self.medium.read_at(offset, &mut exact)?;
            return decode_record(&exact);
        }
        decode_record(&buf[..FIXED_RECORD_SIZE.min(buf.len())])
    }

    /// Write `record` at `index`, stamping identity and config index.
    ///
    /// Appending (`index == record_count()`) bumps the count. Rewriting a
    /// non-last slot with a different serialized size is not rejected and
    /// corrupts the replayed addresses of every following slot; callers
    /// own that invariant.
    ///
    /// Returns the assigned configuration index.
    pub fn save(&mut self, index: u8, record: &ConfigRecord) -> Result<u32, StoreError> {
        if index >= CATALOG_CAPACITY {
            return Err(StoreError::IndexOutOfRange {
                index,
                capacity: CATALOG_CAPACITY,
            });
        }
        let (count_raw, active) = self.read_header()?;
        let count_before = if count_raw > CATALOG_CAPACITY as u16 {
            0
        } else {
            count_raw
        };

        // Identity stamp. A failed lookup stamps the invalid sentinel
        // across the tag, matching device behavior; the record reads back
        // as corrupt afterwards.
        let serial = match self.identity.serial_number() {
            Ok(tag) => tag,
            Err(err) => {
                log::warn!("identity unavailable, stamping sentinel: {}", err);
                SerialTag::filled(INVALID_SERIAL_SENTINEL)
            }
        };

        // Counter is flushed before the record body; the index is burned
        // even if the write below fails.
        let config_index = self.allocate_config_index()?;
        self.write_u32(RECORD_FORMAT_OFFSET, RECORD_FORMAT_VERSION)?;

        let offset = self.address_of(index)?;

        let mut stamped = record.clone();
        stamped.header.serial = serial;
        stamped.header.config_index = config_index;
        let bytes = encode_record(&stamped);
        if offset + bytes.len() > STORE_SIZE {
            return Err(StoreError::AddressOverflow);
        }
        self.medium.write_at(offset, &bytes)?;

        if index as u16 >= count_before {
            self.write_header(index as u16 + 1, active)?;
        }
        self.cache_len = 0;
        Ok(config_index)
    }

    /// Truncate the catalog to the factory record in slot 0.
    ///
    /// One header write; no record bytes are touched.
    pub fn erase_all(&mut self) -> Result<(), StoreError> {
        self.write_header(1, 0)?;
        self.cache_len = 0;
        Ok(())
    }

    /// Format a blank medium: factory record in slot 0, counters zeroed.
    pub fn initialize(&mut self, factory: &ConfigRecord) -> Result<(), StoreError> {
        self.write_u32(NEXT_CONFIG_INDEX_OFFSET, 0)?;
        self.write_u32(NEXT_SCAN_INDEX_OFFSET, 0)?;
        self.erase_all()?;
        self.save(0, factory)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Id cache
    // ------------------------------------------------------------------

    /// Rebuild the in-memory config-id cache by walking the catalog.
    ///
    /// Unreadable slots cache as `u32::MAX` and never match a lookup.
    pub fn refresh_id_cache(&mut self) -> Result<(), StoreError> {
        let count = self.record_count()?;
        for slot in 0..count {
            self.id_cache[slot as usize] = match self.get(slot) {
                Ok(record) => record.header.config_index,
                Err(err) => {
                    log::warn!("slot {} unreadable while caching ids: {}", slot, err);
                    u32::MAX
                }
            };
        }
        self.cache_len = count;
        Ok(())
    }

    /// Slot carrying `config_id`, or [`NO_SLOT`].
    ///
    /// Serves from the cache built by [`refresh_id_cache`].
    ///
    /// [`refresh_id_cache`]: ConfigStore::refresh_id_cache
    pub fn index_of_config_id(&self, config_id: u32) -> u8 {
        for slot in 0..self.cache_len {
            if self.id_cache[slot as usize] == config_id {
                return slot;
            }
        }
        NO_SLOT
    }

    /// Config id cached for `slot`.
    pub fn config_id_of_index(&self, slot: u8) -> Result<u32, StoreError> {
        if slot >= self.cache_len {
            return Err(StoreError::IndexBeyondCount {
                index: slot,
                count: self.cache_len,
            });
        }
        Ok(self.id_cache[slot as usize])
    }

    /// Summarize every readable record for host tooling.
    pub fn summarize(&mut self) -> Result<Vec<RecordSummary>, StoreError> {
        let count = self.record_count()?;
        let mut rows = Vec::with_capacity(count as usize);
        for slot in 0..count {
            let record = self.get(slot)?;
            let sections = match &record.body {
                RecordBody::Fixed(_) => None,
                RecordBody::Variable(scan) => Some(scan.sections.len() as u8),
            };
            rows.push(RecordSummary {
                slot,
                config_index: record.header.config_index,
                kind: record.kind(),
                size: record.serialized_size(),
                serial: record.header.serial.to_string_lossy(),
                sections,
            });
        }
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Auxiliary versioned records
    // ------------------------------------------------------------------

    /// Stored device serial number.
    pub fn serial_number(&mut self) -> Result<SerialTag, StoreError> {
        let mut buf = [0u8; SERIAL_TAG_LEN];
        self.medium.read_at(SERIAL_NUMBER_OFFSET, &mut buf)?;
        Ok(SerialTag(buf))
    }

    /// Persist the device serial number.
    pub fn set_serial_number(&mut self, tag: &SerialTag) -> Result<(), StoreError> {
        self.medium.write_at(SERIAL_NUMBER_OFFSET, tag.as_bytes())?;
        Ok(())
    }

    /// Stored device model name.
    pub fn model_name(&mut self) -> Result<ModelName, StoreError> {
        let mut buf = [0u8; MODEL_NAME_LEN];
        self.medium.read_at(MODEL_NAME_OFFSET, &mut buf)?;
        Ok(ModelName(buf))
    }

    /// Persist the device model name.
    pub fn set_model_name(&mut self, name: &ModelName) -> Result<(), StoreError> {
        self.medium.write_at(MODEL_NAME_OFFSET, name.as_bytes())?;
        Ok(())
    }

    /// Stored calibration: version word and coefficients.
    pub fn calibration(&mut self) -> Result<(u32, [f32; CALIBRATION_COEFF_COUNT]), StoreError> {
        let version = self.read_u32(CALIBRATION_VERSION_OFFSET)?;
        let mut buf = [0u8; CALIBRATION_COEFF_COUNT * 4];
        self.medium.read_at(CALIBRATION_COEFFS_OFFSET, &mut buf)?;
        let mut coeffs = [0f32; CALIBRATION_COEFF_COUNT];
        for (i, coeff) in coeffs.iter_mut().enumerate() {
            *coeff = f32::from_le_bytes([
                buf[i * 4],
                buf[i * 4 + 1],
                buf[i * 4 + 2],
                buf[i * 4 + 3],
            ]);
        }
        Ok((version, coeffs))
    }

    /// Persist calibration coefficients, version word first.
    pub fn set_calibration(
        &mut self,
        coeffs: &[f32; CALIBRATION_COEFF_COUNT],
    ) -> Result<(), StoreError> {
        self.write_u32(CALIBRATION_VERSION_OFFSET, CALIBRATION_VERSION)?;
        let mut buf = [0u8; CALIBRATION_COEFF_COUNT * 4];
        for (i, coeff) in coeffs.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&coeff.to_le_bytes());
        }
        self.medium.write_at(CALIBRATION_COEFFS_OFFSET, &buf)?;
        Ok(())
    }

    /// Stored reference scan: version word and snapshot.
    pub fn reference_scan(&mut self) -> Result<(u32, [u8; REFERENCE_SNAPSHOT_LEN]), StoreError> {
        let version = self.read_u32(REFERENCE_VERSION_OFFSET)?;
        let mut buf = [0u8; REFERENCE_SNAPSHOT_LEN];
        self.medium.read_at(REFERENCE_SNAPSHOT_OFFSET, &mut buf)?;
        Ok((version, buf))
    }

    /// Persist the reference-scan snapshot, version word first.
    pub fn set_reference_scan(
        &mut self,
        snapshot: &[u8; REFERENCE_SNAPSHOT_LEN],
    ) -> Result<(), StoreError> {
        self.write_u32(REFERENCE_VERSION_OFFSET, REFERENCE_VERSION)?;
        self.medium.write_at(REFERENCE_SNAPSHOT_OFFSET, snapshot)?;
        Ok(())
    }

    /// Stored free-text scan name, trimmed.
    pub fn scan_name(&mut self) -> Result<String, StoreError> {
        let mut buf = [0u8; SCAN_NAME_LEN];
        self.medium.read_at(SCAN_NAME_OFFSET, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).trim_end().to_string())
    }

    /// Persist the free-text scan name, truncated and space padded.
    pub fn set_scan_name(&mut self, name: &str) -> Result<(), StoreError> {
        let mut buf = [b' '; SCAN_NAME_LEN];
        for (dst, src) in buf.iter_mut().zip(name.bytes()) {
            *dst = src;
        }
        self.medium.write_at(SCAN_NAME_OFFSET, &buf)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Word helpers
    // ------------------------------------------------------------------

    fn read_u32(&mut self, offset: usize) -> Result<u32, StoreError> {
        let mut buf = [0u8; 4];
        self.medium.read_at(offset, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u32(&mut self, offset: usize, value: u32) -> Result<(), StoreError> {
        self.medium.write_at(offset, &value.to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::MemMedium;
    use speclink_common::FixedIdentity;

    fn blank_store() -> ConfigStore<MemMedium> {
        ConfigStore::new(
            MemMedium::new(STORE_SIZE),
            Box::new(FixedIdentity::new("SL-1000", "SPECLINK-ONE")),
        )
    }

    #[test]
    fn header_packs_count_and_active_together() {
        let mut store = blank_store();
        store.write_header(3, 2).unwrap();
        assert_eq!(store.record_count().unwrap(), 3);
        assert_eq!(store.active_index().unwrap(), 2);

        store.set_active_index(1).unwrap();
        assert_eq!(store.record_count().unwrap(), 3);
        assert_eq!(store.active_index().unwrap(), 1);
    }

    #[test]
    fn corrupt_count_reads_as_zero() {
        let mut store = blank_store();
        store
            .write_header(CATALOG_CAPACITY as u16 + 1, 0)
            .unwrap();
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn counters_advance_by_one_and_persist() {
        let mut store = blank_store();
        assert_eq!(store.allocate_config_index().unwrap(), 0);
        assert_eq!(store.allocate_config_index().unwrap(), 1);
        assert_eq!(store.allocate_scan_index().unwrap(), 0);
        assert_eq!(store.allocate_config_index().unwrap(), 2);
    }

    #[test]
    fn aux_records_round_trip_with_versions() {
        let mut store = blank_store();

        let tag = SerialTag::from_str_lossy("SL-4242");
        store.set_serial_number(&tag).unwrap();
        assert_eq!(store.serial_number().unwrap(), tag);

        let coeffs = [1.0f32, -0.5, 0.25, 0.0, 3.5, 9.0];
        store.set_calibration(&coeffs).unwrap();
        let (version, read) = store.calibration().unwrap();
        assert_eq!(version, CALIBRATION_VERSION);
        assert_eq!(read, coeffs);

        let mut snapshot = [0u8; REFERENCE_SNAPSHOT_LEN];
        snapshot[0] = 0xAB;
        snapshot[REFERENCE_SNAPSHOT_LEN - 1] = 0xCD;
        store.set_reference_scan(&snapshot).unwrap();
        let (version, read) = store.reference_scan().unwrap();
        assert_eq!(version, REFERENCE_VERSION);
        assert_eq!(read, snapshot);

        store.set_scan_name("wheat sample 7").unwrap();
        assert_eq!(store.scan_name().unwrap(), "wheat sample 7");
    }
}
