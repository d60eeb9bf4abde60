//! Single-file random-access container for a 32x32 grid of chunks.
//!
//! Layout: an 8 KiB header (two 4 KiB tables) followed by a contiguous array
//! of 4 KiB sectors. Table A packs each slot's sector run into one
//! big-endian `u32` (high 3 bytes = starting sector, low byte = sector
//! count); Table B holds a big-endian `u32` Unix-seconds timestamp per slot.
//! A stored chunk is framed as `u32 length BE | u8 compression marker |
//! payload | zero padding to the sector boundary`. The marker byte is
//! always written `0`: compression is owned by the chunk codec one layer up,
//! and this layer treats the payload as opaque so the two never disagree
//! about who compressed what.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ByteOrder};

use crate::error::{StorageError, StorageResult};

use super::coord::{slot_index, RegionCoord, HEADER_LEN, MAX_SECTORS_PER_CHUNK, SECTOR_SIZE, SLOTS_PER_REGION};

const DIRECTORY_TABLE_LEN: u64 = SLOTS_PER_REGION as u64 * 4;
const FRAME_OVERHEAD: usize = 4 + 1; // length prefix + compression marker

fn unix_now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotEntry {
    sector_start: u32,
    sector_count: u8,
    timestamp: u32,
}

impl SlotEntry {
    fn is_empty(&self) -> bool {
        self.sector_count == 0
    }
}

pub struct RegionFile {
    coord: RegionCoord,
    path: PathBuf,
    file: File,
    slots: Box<[SlotEntry; SLOTS_PER_REGION]>,
    /// One bit per data sector (sector index 0 here is absolute sector 2).
    /// Rebuilt from the directory every time a file is opened.
    sector_used: Vec<bool>,
}

impl RegionFile {
    /// Open (or, if `create`, initialize) the region file at `path`.
    pub fn open(coord: RegionCoord, path: impl AsRef<Path>, create: bool) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if create {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::io(&path, e))?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;

        let len = file
            .seek(SeekFrom::End(0))
            .map_err(|e| StorageError::io(&path, e))?;

        if len == 0 && create {
            file.set_len(HEADER_LEN).map_err(|e| StorageError::io(&path, e))?;
        } else if len < HEADER_LEN {
            return Err(StorageError::Truncated {
                expected: HEADER_LEN as usize,
                actual: len as usize,
            });
        }

        let file_len = file
            .metadata()
            .map_err(|e| StorageError::io(&path, e))?
            .len();

        let mut header = vec![0u8; HEADER_LEN as usize];
        file.seek(SeekFrom::Start(0)).map_err(|e| StorageError::io(&path, e))?;
        file.read_exact(&mut header).map_err(|e| StorageError::io(&path, e))?;

        let mut slots: Box<[SlotEntry; SLOTS_PER_REGION]> =
            Box::new([SlotEntry::default(); SLOTS_PER_REGION]);

        let mut data_sectors = ((file_len - HEADER_LEN) / SECTOR_SIZE) as usize;

        for i in 0..SLOTS_PER_REGION {
            let off = i * 4;
            let raw = BigEndian::read_u32(&header[off..off + 4]);
            let sector_start = raw >> 8;
            let sector_count = (raw & 0xFF) as u8;
            if sector_count > 0 {
                if sector_start < 2 {
                    return Err(StorageError::CorruptDirectory {
                        slot: i,
                        sector_start,
                        sector_count,
                    });
                }
                let end = (sector_start as usize - 2) + sector_count as usize;
                data_sectors = data_sectors.max(end);
            }
            slots[i] = SlotEntry {
                sector_start,
                sector_count,
                timestamp: 0,
            };
        }
        for i in 0..SLOTS_PER_REGION {
            let off = DIRECTORY_TABLE_LEN as usize + i * 4;
            slots[i].timestamp = BigEndian::read_u32(&header[off..off + 4]);
        }

        let mut sector_used = vec![false; data_sectors];
        for slot in slots.iter() {
            if slot.is_empty() {
                continue;
            }
            let start = (slot.sector_start - 2) as usize;
            for i in start..start + slot.sector_count as usize {
                sector_used[i] = true;
            }
        }

        Ok(Self {
            coord,
            path,
            file,
            slots,
            sector_used,
        })
    }

    pub fn coord(&self) -> RegionCoord {
        self.coord
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, lx: u8, lz: u8) -> bool {
        !self.slots[slot_index(lx, lz)].is_empty()
    }

    /// Read the payload stored at `(lx, lz)`, or `None` if the slot is empty.
    pub fn read(&mut self, lx: u8, lz: u8) -> StorageResult<Option<Vec<u8>>> {
        let entry = self.slots[slot_index(lx, lz)];
        if entry.is_empty() {
            return Ok(None);
        }

        self.file
            .seek(SeekFrom::Start(entry.sector_start as u64 * SECTOR_SIZE))
            .map_err(|e| StorageError::io(&self.path, e))?;

        let mut len_buf = [0u8; 4];
        self.file
            .read_exact(&mut len_buf)
            .map_err(|e| StorageError::io(&self.path, e))?;
        let payload_len = BigEndian::read_u32(&len_buf) as usize;

        let mut marker = [0u8; 1];
        self.file
            .read_exact(&mut marker)
            .map_err(|e| StorageError::io(&self.path, e))?;

        let sector_capacity = entry.sector_count as usize * SECTOR_SIZE as usize;
        if FRAME_OVERHEAD + payload_len > sector_capacity {
            return Err(StorageError::PayloadSizeMismatch {
                declared: payload_len as u32,
                actual: sector_capacity.saturating_sub(FRAME_OVERHEAD),
            });
        }

        let mut payload = vec![0u8; payload_len];
        self.file
            .read_exact(&mut payload)
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(Some(payload))
    }

    /// Write `payload` into slot `(lx, lz)`, allocating or reusing sectors as
    /// needed. The directory entry is updated only after the data itself has
    /// landed, so a mid-write crash leaves the previous entry intact.
    pub fn write(&mut self, lx: u8, lz: u8, payload: &[u8]) -> StorageResult<()> {
        let needed_len = FRAME_OVERHEAD + payload.len();
        let sectors_needed = needed_len.div_ceil(SECTOR_SIZE as usize) as u32;
        if sectors_needed > MAX_SECTORS_PER_CHUNK {
            return Err(StorageError::RegionFull {
                sectors: sectors_needed as usize,
            });
        }

        let idx = slot_index(lx, lz);
        let existing = self.slots[idx];

        let sector_start = if !existing.is_empty() && existing.sector_count as u32 >= sectors_needed {
            if existing.sector_count as u32 > sectors_needed {
                self.free_sectors(existing.sector_start + sectors_needed, existing.sector_count as u32 - sectors_needed);
            }
            existing.sector_start
        } else {
            if !existing.is_empty() {
                self.free_sectors(existing.sector_start, existing.sector_count as u32);
            }
            self.allocate_sectors(sectors_needed)
        };
        self.mark_sectors(sector_start, sectors_needed);

        let mut frame = Vec::with_capacity(sectors_needed as usize * SECTOR_SIZE as usize);
        let mut len_buf = [0u8; 4];
        BigEndian::write_u32(&mut len_buf, payload.len() as u32);
        frame.extend_from_slice(&len_buf);
        frame.push(0); // compression marker: opaque, owned by the chunk codec
        frame.extend_from_slice(payload);
        frame.resize(sectors_needed as usize * SECTOR_SIZE as usize, 0);

        self.file
            .seek(SeekFrom::Start(sector_start as u64 * SECTOR_SIZE))
            .map_err(|e| StorageError::io(&self.path, e))?;
        self.file.write_all(&frame).map_err(|e| StorageError::io(&self.path, e))?;
        self.file.flush().map_err(|e| StorageError::io(&self.path, e))?;

        self.slots[idx] = SlotEntry {
            sector_start,
            sector_count: sectors_needed as u8,
            timestamp: unix_now_secs(),
        };
        self.write_directory_entry(idx)?;
        Ok(())
    }

    /// Zero the directory entry for `(lx, lz)`. Data bytes are left in place
    /// and their sectors return to the free list.
    pub fn remove(&mut self, lx: u8, lz: u8) -> StorageResult<()> {
        let idx = slot_index(lx, lz);
        let entry = self.slots[idx];
        if entry.is_empty() {
            return Ok(());
        }
        self.free_sectors(entry.sector_start, entry.sector_count as u32);
        self.slots[idx] = SlotEntry::default();
        self.write_directory_entry(idx)
    }

    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_data().map_err(|e| StorageError::io(&self.path, e))
    }

    /// Flush and drop the underlying file handle. Consumes `self` so the
    /// caller cannot use a closed handle by accident.
    pub fn close(mut self) -> StorageResult<()> {
        self.sync()
    }

    fn write_directory_entry(&mut self, idx: usize) -> StorageResult<()> {
        let entry = self.slots[idx];
        let raw = (entry.sector_start << 8) | entry.sector_count as u32;
        let mut buf = [0u8; 4];

        BigEndian::write_u32(&mut buf, raw);
        self.file
            .seek(SeekFrom::Start(idx as u64 * 4))
            .map_err(|e| StorageError::io(&self.path, e))?;
        self.file.write_all(&buf).map_err(|e| StorageError::io(&self.path, e))?;

        BigEndian::write_u32(&mut buf, entry.timestamp);
        self.file
            .seek(SeekFrom::Start(DIRECTORY_TABLE_LEN + idx as u64 * 4))
            .map_err(|e| StorageError::io(&self.path, e))?;
        self.file.write_all(&buf).map_err(|e| StorageError::io(&self.path, e))?;

        self.file.flush().map_err(|e| StorageError::io(&self.path, e))
    }

    fn ensure_sector_capacity(&mut self, upto: usize) {
        if self.sector_used.len() < upto {
            self.sector_used.resize(upto, false);
        }
    }

    fn mark_sectors(&mut self, absolute_start: u32, count: u32) {
        let start = (absolute_start - 2) as usize;
        self.ensure_sector_capacity(start + count as usize);
        for slot in &mut self.sector_used[start..start + count as usize] {
            *slot = true;
        }
    }

    fn free_sectors(&mut self, absolute_start: u32, count: u32) {
        let start = (absolute_start - 2) as usize;
        let end = (start + count as usize).min(self.sector_used.len());
        for slot in &mut self.sector_used[start..end] {
            *slot = false;
        }
    }

    /// First free run of `count` contiguous data sectors, or an appended run
    /// at end-of-file if none fits.
    fn allocate_sectors(&mut self, count: u32) -> u32 {
        let count = count as usize;
        let mut run_start = None;
        let mut run_len = 0usize;

        for (i, used) in self.sector_used.iter().enumerate() {
            if *used {
                run_start = None;
                run_len = 0;
                continue;
            }
            if run_start.is_none() {
                run_start = Some(i);
            }
            run_len += 1;
            if run_len == count {
                return run_start.unwrap() as u32 + 2;
            }
        }

        let append_at = self.sector_used.len();
        self.sector_used.resize(append_at + count, false);
        append_at as u32 + 2
    }
}
