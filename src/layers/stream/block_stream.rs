//! A single-buffer, sector-aligned cache over a [`BlockDevice`] (§4.4).

use crate::config::SECTOR_SIZE;
use crate::layers::bio::{AccessMode, BlockDevice};
use crate::prelude::*;

/// Byte-granular `read`/`write`/`seek`/`tell`/`flush`/`close` on top of a
/// block device, keeping a single sector-aligned cache buffer.
pub struct BlockStream<'a> {
    device: &'a dyn BlockDevice,
    access_mode: AccessMode,
    cache: Option<CacheLine>,
    cache_sectors: u64,
    pos: u64,
    size: u64,
}

struct CacheLine {
    start_sector: u64,
    data: Vec<u8>,
    dirty: bool,
}

impl<'a> BlockStream<'a> {
    /// Opens a stream over `device` with the given access mode and a cache
    /// buffer sized at `cache_sectors` sectors.
    pub fn open(
        device: &'a dyn BlockDevice,
        access_mode: AccessMode,
        cache_sectors: u64,
    ) -> Result<Self> {
        if access_mode.allows_write() && !device.access_mode().allows_write() {
            return_errno_with_msg!(Errno::PermissionDenied, "backing device is read-only");
        }
        let size = device.sector_count() * SECTOR_SIZE as u64;
        Ok(Self {
            device,
            access_mode,
            cache: None,
            cache_sectors: cache_sectors.max(1),
            pos: 0,
            size,
        })
    }

    /// Current byte offset.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Total device size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Moves the cursor. `offset` is interpreted relative to `whence`:
    /// `0` = start, `1` = current, `2` = end. Clamps into `[0, size]`;
    /// a negative result from `End`/`Current` fails `Invalid`.
    pub fn seek(&mut self, offset: i64, whence: i8) -> Result<u64> {
        let base: i64 = match whence {
            0 => 0,
            1 => self.pos as i64,
            2 => self.size as i64,
            _ => return_errno_with_msg!(Errno::Invalid, "unknown seek origin"),
        };
        let target = base
            .checked_add(offset)
            .ok_or_else(|| Error::with_msg(Errno::Invalid, "seek overflow"))?;
        if target < 0 {
            return_errno_with_msg!(Errno::Invalid, "seek before start of device");
        }
        self.pos = (target as u64).min(self.size);
        Ok(self.pos)
    }

    fn cache_line_for(&self, byte_offset: u64) -> u64 {
        let sector = byte_offset / SECTOR_SIZE as u64;
        (sector / self.cache_sectors) * self.cache_sectors
    }

    fn ensure_cache_for(&mut self, byte_offset: u64) -> Result<()> {
        let start_sector = self.cache_line_for(byte_offset);
        if let Some(cache) = &self.cache {
            if cache.start_sector == start_sector {
                return Ok(());
            }
        }
        self.flush_cache_line()?;

        let remaining_sectors = self
            .device
            .sector_count()
            .saturating_sub(start_sector)
            .min(self.cache_sectors);
        let mut buf = vec![0u8; remaining_sectors as usize * SECTOR_SIZE];
        if remaining_sectors > 0 {
            self.device.read(start_sector, &mut buf)?;
        }
        self.cache = Some(CacheLine {
            start_sector,
            data: buf,
            dirty: false,
        });
        Ok(())
    }

    fn flush_cache_line(&mut self) -> Result<()> {
        if let Some(cache) = &self.cache {
            if cache.dirty {
                self.device.write(cache.start_sector, &cache.data)?;
            }
        }
        Ok(())
    }

    /// Reads up to `buf.len()` bytes at the current position, truncating at
    /// end-of-device, and advances the cursor by the amount read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.access_mode.allows_read() {
            return_errno_with_msg!(Errno::PermissionDenied, "stream is not readable");
        }
        let avail = self.size.saturating_sub(self.pos);
        let to_read = (buf.len() as u64).min(avail) as usize;

        let mut done = 0;
        while done < to_read {
            let abs = self.pos + done as u64;
            self.ensure_cache_for(abs)?;
            let cache = self.cache.as_ref().unwrap();
            let line_start = cache.start_sector * SECTOR_SIZE as u64;
            let offset_in_line = (abs - line_start) as usize;
            let chunk = (cache.data.len() - offset_in_line).min(to_read - done);
            buf[done..done + chunk]
                .copy_from_slice(&cache.data[offset_in_line..offset_in_line + chunk]);
            done += chunk;
        }
        self.pos += done as u64;
        Ok(done)
    }

    /// Writes `buf` at the current position, failing `NoSpace` if it would
    /// run past the end of the device, and advances the cursor.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        if !self.access_mode.allows_write() {
            return_errno_with_msg!(Errno::PermissionDenied, "stream is not writable");
        }
        if self.pos + buf.len() as u64 > self.size {
            return_errno_with_msg!(Errno::NoSpace, "write would exceed device size");
        }

        let mut done = 0;
        while done < buf.len() {
            let abs = self.pos + done as u64;
            self.ensure_cache_for(abs)?;
            let cache = self.cache.as_mut().unwrap();
            let line_start = cache.start_sector * SECTOR_SIZE as u64;
            let offset_in_line = (abs - line_start) as usize;
            let chunk = (cache.data.len() - offset_in_line).min(buf.len() - done);
            cache.data[offset_in_line..offset_in_line + chunk]
                .copy_from_slice(&buf[done..done + chunk]);
            cache.dirty = true;
            done += chunk;
        }
        self.pos += done as u64;
        Ok(())
    }

    /// Writes the dirty cache line, if any, then flushes the backing device.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_cache_line()?;
        if let Some(cache) = &mut self.cache {
            cache.dirty = false;
        }
        self.device.flush()
    }

    /// Flushes and releases the cache.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.cache = None;
        Ok(())
    }
}
