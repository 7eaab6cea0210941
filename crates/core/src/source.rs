// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! External scalar sources.
//!
//! A sensor never owns the value it reports. Something outside the simulation
//! (another process writing a shared memory segment, a test harness, ...) keeps
//! a single word up to date and the devices read it through a [`SourceHandle`].

use anyhow::Context;
use memmap2::MmapMut;
use shmsens_config::SourceConfig;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Directory used for named segments when no explicit directory is configured.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// A readable word owned by someone else.
pub trait ScalarSource: std::fmt::Debug + Send + Sync {
    /// Latest word written by the producer, or `None` when the backing
    /// resource is not available.
    fn load(&self) -> Option<u32>;
}

pub type SourceHandle = Arc<dyn ScalarSource>;

/// In-process source, shared between a producer and any number of devices.
#[derive(Debug, Clone, Default)]
pub struct SharedValue(Arc<AtomicU32>);

impl SharedValue {
    pub fn new(value: u32) -> Self {
        Self(Arc::new(AtomicU32::new(value)))
    }

    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::Release);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn handle(&self) -> SourceHandle {
        Arc::new(self.clone())
    }
}

impl ScalarSource for SharedValue {
    fn load(&self) -> Option<u32> {
        Some(self.get())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantSource(pub u32);

impl ScalarSource for ConstantSource {
    fn load(&self) -> Option<u32> {
        Some(self.0)
    }
}

/// Stand-in for a segment that could not be acquired.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl ScalarSource for Unavailable {
    fn load(&self) -> Option<u32> {
        None
    }
}

/// One little-endian word in a shared memory segment.
#[derive(Debug)]
pub struct ShmSource {
    path: PathBuf,
    mmap: MmapMut,
}

impl ShmSource {
    pub const SEGMENT_SIZE: usize = std::mem::size_of::<u32>();

    /// Create (or truncate) the segment, leaving it zeroed.
    pub fn create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create shared memory segment {:?}", path))?;
        file.set_len(Self::SEGMENT_SIZE as u64)?;
        Self::map(path, &file)
    }

    /// Attach to an existing segment without clearing it.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open shared memory segment {:?}", path))?;
        let len = file.metadata()?.len();
        if len < Self::SEGMENT_SIZE as u64 {
            anyhow::bail!(
                "Shared memory segment {:?} is {} bytes, expected at least {}",
                path,
                len,
                Self::SEGMENT_SIZE
            );
        }
        Self::map(path, &file)
    }

    fn map(path: &Path, file: &std::fs::File) -> anyhow::Result<Self> {
        // SAFETY: the segment is shared with an external writer by design; all
        // accesses below go through volatile word reads/writes.
        let mmap = unsafe { MmapMut::map_mut(file) }
            .with_context(|| format!("Failed to map shared memory segment {:?}", path))?;
        if mmap.len() < Self::SEGMENT_SIZE {
            anyhow::bail!("Mapping of {:?} is shorter than one word", path);
        }
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    /// Resolve a segment name the way the sensors name theirs (`mmsens`, `i2c`).
    pub fn resolve(name: &str, dir: Option<&str>) -> PathBuf {
        let as_path = Path::new(name);
        if as_path.is_absolute() || name.contains('/') {
            return as_path.to_path_buf();
        }
        Path::new(dir.unwrap_or(DEFAULT_SHM_DIR)).join(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Act as the external producer.
    pub fn store(&mut self, value: u32) {
        let ptr = self.mmap.as_mut_ptr() as *mut u32;
        // SAFETY: the mapping is page aligned and at least one word long.
        unsafe { std::ptr::write_volatile(ptr, value.to_le()) };
    }
}

impl ScalarSource for ShmSource {
    fn load(&self) -> Option<u32> {
        let ptr = self.mmap.as_ptr() as *const u32;
        // SAFETY: see `store`.
        let raw = unsafe { std::ptr::read_volatile(ptr) };
        Some(u32::from_le(raw))
    }
}

/// Build the source a device should read.
///
/// `default_segment` is the segment name a device type uses when the config
/// does not say otherwise. Acquisition failures are reported to the caller.
pub fn from_config(
    config: Option<&SourceConfig>,
    default_segment: &str,
) -> anyhow::Result<SourceHandle> {
    let handle: SourceHandle = match config {
        None => Arc::new(ShmSource::create(ShmSource::resolve(default_segment, None))?),
        Some(SourceConfig::Shm { name, dir }) => {
            Arc::new(ShmSource::create(ShmSource::resolve(name, dir.as_deref()))?)
        }
        Some(SourceConfig::Constant { value }) => Arc::new(ConstantSource(*value)),
        Some(SourceConfig::Unavailable) => Arc::new(Unavailable),
    };
    Ok(handle)
}

/// Device-side view of a source: unavailable reads become 0.
///
/// The first failed read after a good one is logged once, so a missing segment
/// does not flood the log at the sampling rate.
#[derive(Debug)]
pub struct SourceReader {
    source: SourceHandle,
    degraded: bool,
}

impl SourceReader {
    pub fn new(source: SourceHandle) -> Self {
        Self {
            source,
            degraded: false,
        }
    }

    pub fn sample(&mut self) -> u32 {
        match self.source.load() {
            Some(value) => {
                self.degraded = false;
                value
            }
            None => {
                if !self.degraded {
                    tracing::warn!("External value source unavailable, reading 0");
                    self.degraded = true;
                }
                0
            }
        }
    }

    /// Low byte of the current word, which is what both sensors report.
    pub fn sample_byte(&mut self) -> u8 {
        (self.sample() & 0xFF) as u8
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_value_is_visible_to_readers() {
        let value = SharedValue::new(7);
        let mut reader = SourceReader::new(value.handle());
        assert_eq!(reader.sample(), 7);
        value.set(0x1234);
        assert_eq!(reader.sample(), 0x1234);
        assert_eq!(reader.sample_byte(), 0x34);
    }

    #[test]
    fn test_unavailable_reads_zero() {
        let mut reader = SourceReader::new(Arc::new(Unavailable));
        assert_eq!(reader.sample(), 0);
        assert!(reader.is_degraded());
        assert_eq!(reader.sample_byte(), 0);
    }

    #[test]
    fn test_shm_create_store_and_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mmsens");

        let mut writer = ShmSource::create(&path)?;
        assert_eq!(writer.load(), Some(0));
        writer.store(0xDEAD_BE42);

        let reader = ShmSource::open(&path)?;
        assert_eq!(reader.load(), Some(0xDEAD_BE42));
        assert_eq!(std::fs::read(&path)?, 0xDEAD_BE42u32.to_le_bytes());

        // Creating again truncates, like a freshly started device.
        let fresh = ShmSource::create(&path)?;
        assert_eq!(fresh.load(), Some(0));
        Ok(())
    }

    #[test]
    fn test_shm_open_rejects_short_segment() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("short");
        std::fs::write(&path, [1u8, 2])?;
        assert!(ShmSource::open(&path).is_err());
        assert!(ShmSource::open(dir.path().join("missing")).is_err());
        Ok(())
    }

    #[test]
    fn test_resolve_names() {
        assert_eq!(
            ShmSource::resolve("mmsens", None),
            PathBuf::from("/dev/shm/mmsens")
        );
        assert_eq!(
            ShmSource::resolve("i2c", Some("/tmp")),
            PathBuf::from("/tmp/i2c")
        );
        assert_eq!(
            ShmSource::resolve("/var/run/x", Some("/tmp")),
            PathBuf::from("/var/run/x")
        );
    }

    #[test]
    fn test_from_config_variants() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let shm = SourceConfig::Shm {
            name: "seg".to_string(),
            dir: Some(dir.path().to_string_lossy().into_owned()),
        };
        assert_eq!(from_config(Some(&shm), "unused")?.load(), Some(0));
        assert!(dir.path().join("seg").exists());

        let constant = SourceConfig::Constant { value: 9 };
        assert_eq!(from_config(Some(&constant), "unused")?.load(), Some(9));

        assert_eq!(
            from_config(Some(&SourceConfig::Unavailable), "unused")?.load(),
            None
        );

        let bad = SourceConfig::Shm {
            name: "seg".to_string(),
            dir: Some(dir.path().join("no/such/dir").to_string_lossy().into_owned()),
        };
        assert!(from_config(Some(&bad), "unused").is_err());
        Ok(())
    }
}
