//! wl_shm pool and buffer accounting
//!
//! Pools wrap a client-provided memfd mapped read-only via `memmap2`;
//! buffers are validated windows into a pool. The compositor core only
//! consumes buffer geometry — the committed width/height becomes the
//! surface's size — while the rendering collaborator reads the mapped
//! pixels.

use std::collections::HashMap;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use memmap2::{Mmap, MmapOptions};

/// Unique identifier for shm pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShmPoolId(pub u64);

impl ShmPoolId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ShmPoolId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Unique identifier for shm buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShmBufferId(pub u64);

impl ShmBufferId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ShmBufferId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Supported pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmFormat {
    /// 32-bit ARGB (A in the high byte)
    Argb8888,
    /// 32-bit XRGB (alpha ignored)
    Xrgb8888,
    /// Anything else, kept by wire value
    Other(u32),
}

impl ShmFormat {
    /// Create from the wl_shm format value
    pub fn from_wayland(format: u32) -> Self {
        match format {
            0 => ShmFormat::Argb8888,
            1 => ShmFormat::Xrgb8888,
            other => ShmFormat::Other(other),
        }
    }

    /// Convert to the wl_shm format value
    pub fn to_wayland(self) -> u32 {
        match self {
            ShmFormat::Argb8888 => 0,
            ShmFormat::Xrgb8888 => 1,
            ShmFormat::Other(v) => v,
        }
    }

    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> u32 {
        4
    }
}

/// A shared memory pool
#[derive(Debug)]
pub struct ShmPool {
    /// Unique identifier
    pub id: ShmPoolId,
    /// The client's memfd
    file: File,
    /// Pool size in bytes
    pub size: usize,
    /// Lazily created mapping
    map: Option<Mmap>,
}

impl ShmPool {
    fn new(fd: OwnedFd, size: usize) -> Self {
        Self {
            id: ShmPoolId::new(),
            file: File::from(fd),
            size,
            map: None,
        }
    }

    /// Grow the pool; shrinking is a protocol violation the dispatch layer
    /// rejects before getting here
    pub fn resize(&mut self, new_size: usize) {
        if new_size > self.size {
            self.size = new_size;
            // Stale mapping; remapped on next access
            self.map = None;
        }
    }

    /// The mapped pool contents, mapping on first access
    pub fn data(&mut self) -> Option<&[u8]> {
        if self.map.is_none() {
            match unsafe { MmapOptions::new().len(self.size).map(&self.file) } {
                Ok(map) => self.map = Some(map),
                Err(err) => {
                    warn!("Failed to map shm pool {:?}: {}", self.id, err);
                    return None;
                }
            }
        }
        self.map.as_deref()
    }
}

/// A buffer window into a pool
#[derive(Debug, Clone, Copy)]
pub struct ShmBuffer {
    /// Unique identifier
    pub id: ShmBufferId,
    /// Owning pool
    pub pool: ShmPoolId,
    /// Byte offset into the pool
    pub offset: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    /// Pixel format
    pub format: ShmFormat,
}

/// Errors from buffer creation; all are client protocol violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShmError {
    #[error("Unknown pool")]
    InvalidPool,
    #[error("Buffer extends past the end of the pool")]
    BufferTooLarge,
    #[error("Stride smaller than a pixel row")]
    InvalidStride,
}

/// Bookkeeping for all pools and buffers
#[derive(Debug, Default)]
pub struct WlShmHandler {
    pools: HashMap<ShmPoolId, ShmPool>,
    buffers: HashMap<ShmBufferId, ShmBuffer>,
}

impl WlShmHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formats advertised on bind
    pub fn formats(&self) -> Vec<ShmFormat> {
        vec![ShmFormat::Argb8888, ShmFormat::Xrgb8888]
    }

    /// Register a pool over a client fd
    pub fn create_pool(&mut self, fd: OwnedFd, size: usize) -> ShmPoolId {
        let pool = ShmPool::new(fd, size);
        let id = pool.id;
        debug!("Created shm pool {:?}, size {}", id, size);
        self.pools.insert(id, pool);
        id
    }

    /// Grow a pool
    pub fn resize_pool(&mut self, pool: ShmPoolId, new_size: usize) -> Result<(), ShmError> {
        let pool = self.pools.get_mut(&pool).ok_or(ShmError::InvalidPool)?;
        pool.resize(new_size);
        Ok(())
    }

    /// Destroy a pool; existing buffers keep their geometry until released
    pub fn destroy_pool(&mut self, pool: ShmPoolId) {
        debug!("Destroyed shm pool {:?}", pool);
        self.pools.remove(&pool);
    }

    /// Validate and register a buffer
    pub fn create_buffer(
        &mut self,
        pool_id: ShmPoolId,
        offset: u32,
        width: u32,
        height: u32,
        stride: u32,
        format: u32,
    ) -> Result<ShmBufferId, ShmError> {
        let pool = self.pools.get(&pool_id).ok_or(ShmError::InvalidPool)?;
        let format = ShmFormat::from_wayland(format);

        let end = offset as u64 + stride as u64 * height as u64;
        if end > pool.size as u64 {
            return Err(ShmError::BufferTooLarge);
        }
        if stride < width.saturating_mul(format.bytes_per_pixel()) {
            return Err(ShmError::InvalidStride);
        }

        let buffer = ShmBuffer {
            id: ShmBufferId::new(),
            pool: pool_id,
            offset,
            width,
            height,
            stride,
            format,
        };
        let id = buffer.id;
        debug!(
            "Created shm buffer {:?}, {}x{}, format {:?}",
            id, width, height, format
        );
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    pub fn buffer(&self, id: ShmBufferId) -> Option<&ShmBuffer> {
        self.buffers.get(&id)
    }

    /// Destroy a buffer
    pub fn destroy_buffer(&mut self, id: ShmBufferId) {
        debug!("Destroyed shm buffer {:?}", id);
        self.buffers.remove(&id);
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::fd::OwnedFd;

    use super::*;

    fn pool_fd(size: usize) -> OwnedFd {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&vec![0u8; size]).unwrap();
        OwnedFd::from(file)
    }

    #[test]
    fn test_buffer_validation() {
        let mut shm = WlShmHandler::new();
        let pool = shm.create_pool(pool_fd(4096), 4096);

        // 32x32 at 4 bpp = exactly 4096 bytes
        assert!(shm.create_buffer(pool, 0, 32, 32, 128, 0).is_ok());
        assert_eq!(
            shm.create_buffer(pool, 1, 32, 32, 128, 0),
            Err(ShmError::BufferTooLarge)
        );
        assert_eq!(
            shm.create_buffer(pool, 0, 32, 32, 64, 0),
            Err(ShmError::InvalidStride)
        );
        assert_eq!(
            shm.create_buffer(ShmPoolId(999), 0, 1, 1, 4, 0),
            Err(ShmError::InvalidPool)
        );
    }

    #[test]
    fn test_pool_grows_only() {
        let mut shm = WlShmHandler::new();
        let pool = shm.create_pool(pool_fd(1024), 1024);
        shm.resize_pool(pool, 2048).unwrap();
        assert!(shm.create_buffer(pool, 0, 16, 32, 64, 0).is_ok());
    }

    #[test]
    fn test_pool_mapping() {
        let mut shm = WlShmHandler::new();
        let pool_id = shm.create_pool(pool_fd(256), 256);
        let pool = shm.pools.get_mut(&pool_id).unwrap();
        let data = pool.data().unwrap();
        assert_eq!(data.len(), 256);
    }

    #[test]
    fn test_buffer_lifecycle() {
        let mut shm = WlShmHandler::new();
        let pool = shm.create_pool(pool_fd(4096), 4096);
        let buffer = shm.create_buffer(pool, 0, 16, 16, 64, 1).unwrap();
        assert_eq!(shm.buffer(buffer).unwrap().format, ShmFormat::Xrgb8888);
        shm.destroy_buffer(buffer);
        assert!(shm.buffer(buffer).is_none());
        assert_eq!(shm.buffer_count(), 0);
    }

    #[test]
    fn test_format_roundtrip() {
        assert_eq!(ShmFormat::from_wayland(0), ShmFormat::Argb8888);
        assert_eq!(ShmFormat::Argb8888.to_wayland(), 0);
        assert_eq!(ShmFormat::from_wayland(0x3432_3142), ShmFormat::Other(0x3432_3142));
    }
}
