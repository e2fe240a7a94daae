//! RegionHandle - attach/detach lifecycle for the producer's shared memory.
//!
//! Wraps shm_open, mmap and the producer's named mutex. All three resources
//! are acquired together or not at all; they are released in the order
//! mutex, view, object.

use std::ffi::CString;
use std::os::fd::RawFd;
use std::ptr::NonNull;

use crate::config::PollerConfig;
use crate::error::{AttachError, ProducerError};
use crate::shm::layout::{SnapshotView, SNAPSHOT_SIZE};
use crate::shm::mutex::NamedMutex;

/// Build the POSIX object path (`/name`) for a shared object name.
pub(crate) fn object_path(name: &str) -> Option<CString> {
    let name = name.strip_prefix('/').unwrap_or(name);
    if name.is_empty() || name.contains('/') {
        return None;
    }
    CString::new(format!("/{}", name)).ok()
}

/// An open POSIX shared memory object.
pub struct ShmObject {
    /// Name of the shared memory object.
    name: String,
    /// File descriptor for the shared memory object.
    fd: RawFd,
    /// Whether this instance created the SHM (and should unlink on drop).
    is_owner: bool,
}

impl ShmObject {
    /// Open an existing object read-only.
    ///
    /// # Errors
    /// Returns [`AttachError::ProducerAbsent`] if no producer has created it.
    pub fn open_readonly(name: &str) -> Result<Self, AttachError> {
        let c_name = object_path(name).ok_or_else(|| AttachError::InvalidName {
            name: name.to_string(),
        })?;

        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd < 0 {
            return Err(AttachError::ProducerAbsent {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        Ok(Self {
            name: name.to_string(),
            fd,
            is_owner: false,
        })
    }

    /// Create a new object of `size` bytes, zero filled.
    ///
    /// Producer side only; the object is unlinked when this handle drops.
    pub fn create(name: &str, size: usize) -> Result<Self, ProducerError> {
        let c_name = object_path(name).ok_or_else(|| ProducerError::CreateFailed {
            name: name.to_string(),
            reason: "Invalid name".to_string(),
        })?;

        // SAFETY: c_name is a valid CString, flags are valid POSIX flags
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o600,
            )
        };
        if fd < 0 {
            return Err(ProducerError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        // Owner from here on, so any early return unlinks again
        let object = Self {
            name: name.to_string(),
            fd,
            is_owner: true,
        };

        // SAFETY: fd is a valid file descriptor
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } < 0 {
            return Err(ProducerError::CreateFailed {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", std::io::Error::last_os_error()),
            });
        }

        tracing::debug!(name = %name, size = size, "Created shared memory object");
        Ok(object)
    }

    /// Get the name of this shared memory object.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn stat(&self) -> std::io::Result<libc::stat> {
        // SAFETY: stat is plain old data
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: fd is valid, st is a valid out-pointer
        if unsafe { libc::fstat(self.fd, &mut st) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(st)
    }

    /// Current size of the object in bytes.
    pub fn size(&self) -> std::io::Result<usize> {
        Ok(self.stat()?.st_size as usize)
    }

    /// Whether the name has been unlinked since this handle was opened.
    ///
    /// A producer that restarts by unlinking and recreating its object leaves
    /// existing mappings attached to the old, orphaned object.
    pub fn is_unlinked(&self) -> bool {
        self.stat().map(|st| st.st_nlink == 0).unwrap_or(true)
    }
}

impl Drop for ShmObject {
    fn drop(&mut self) {
        // SAFETY: fd was opened during creation
        unsafe { libc::close(self.fd) };

        if self.is_owner {
            let shm_name = format!("/{}", self.name.trim_start_matches('/'));
            if nix::sys::mman::shm_unlink(shm_name.as_str()).is_ok() {
                tracing::debug!(name = %self.name, "Unlinked shared memory object");
            }
        }
    }
}

/// A mapped view of a [`ShmObject`].
pub struct MappedView {
    /// Pointer to the mapped memory.
    ptr: NonNull<u8>,
    /// Size of the mapping in bytes.
    len: usize,
}

// SAFETY: the view owns its mapping; access to the producer-written bytes goes
// through volatile/unaligned raw reads only.
unsafe impl Send for MappedView {}

impl MappedView {
    /// Map `len` bytes of an object read-only.
    pub fn map_readonly(object: &ShmObject, len: usize) -> Result<Self, AttachError> {
        Self::map(object.fd, len, libc::PROT_READ)
            .map_err(|reason| AttachError::MapFailed { reason })
    }

    /// Map `len` bytes of an object read-write (producer side).
    pub(crate) fn map_writable(object: &ShmObject, len: usize) -> Result<Self, ProducerError> {
        Self::map(object.fd, len, libc::PROT_READ | libc::PROT_WRITE)
            .map_err(|reason| ProducerError::MapFailed { reason })
    }

    fn map(fd: RawFd, len: usize, prot: libc::c_int) -> Result<Self, String> {
        if len < SNAPSHOT_SIZE {
            return Err(format!(
                "Mapping length {} is below snapshot size {}",
                len, SNAPSHOT_SIZE
            ));
        }

        // SAFETY: fd is valid, len is validated, offset 0 is valid
        let ptr = unsafe { libc::mmap(std::ptr::null_mut(), len, prot, libc::MAP_SHARED, fd, 0) };
        if ptr == libc::MAP_FAILED {
            return Err(format!("mmap failed: {}", std::io::Error::last_os_error()));
        }

        let ptr = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| "mmap returned null but not MAP_FAILED".to_string())?;

        Ok(Self { ptr, len })
    }

    /// Size of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty (never true for a live view).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw base pointer of the mapping.
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Typed view of the snapshot at the start of the mapping.
    pub fn snapshot(&self) -> SnapshotView<'_> {
        // SAFETY: mmap returns page-aligned memory and map() rejected any
        // length below SNAPSHOT_SIZE
        unsafe { SnapshotView::from_raw(self.ptr) }
    }
}

impl Drop for MappedView {
    fn drop(&mut self) {
        // SAFETY: ptr and len were set by a successful mmap
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
        if result < 0 {
            tracing::error!(
                error = %std::io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }
    }
}

/// A fully acquired producer attachment.
///
/// Fields drop in declaration order: mutex, then view, then object.
pub struct Attachment {
    mutex: NamedMutex,
    view: MappedView,
    object: ShmObject,
}

impl Attachment {
    fn open(config: &PollerConfig) -> Result<Self, AttachError> {
        let object = ShmObject::open_readonly(&config.shm_name)?;

        let size = object.size().map_err(|e| AttachError::MapFailed {
            reason: format!("fstat failed: {}", e),
        })?;
        if size < config.region_size {
            return Err(AttachError::RegionTooSmall {
                name: config.shm_name.clone(),
                size,
                required: config.region_size,
            });
        }

        let view = MappedView::map_readonly(&object, config.region_size)?;
        let mutex = NamedMutex::open(&config.mutex_name)?;

        Ok(Self {
            mutex,
            view,
            object,
        })
    }

    /// Name of the attached shared memory object.
    pub fn name(&self) -> &str {
        self.object.name()
    }

    /// The producer's named mutex.
    pub fn mutex(&self) -> &NamedMutex {
        &self.mutex
    }

    /// Typed view of the mapped snapshot.
    pub fn snapshot(&self) -> SnapshotView<'_> {
        self.view.snapshot()
    }
}

/// Attach state for the producer's region: either fully attached or empty.
#[derive(Default)]
pub struct RegionHandle {
    attached: Option<Attachment>,
}

impl RegionHandle {
    /// Create an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to the producer's region and mutex.
    ///
    /// A no-op if already attached. On failure the handle stays empty and
    /// everything acquired so far has been released.
    pub fn attach(&mut self, config: &PollerConfig) -> Result<(), AttachError> {
        if self.attached.is_some() {
            return Ok(());
        }

        let attachment = Attachment::open(config)?;
        tracing::debug!(
            name = %attachment.object.name(),
            mutex = %attachment.mutex.name(),
            size = attachment.view.len(),
            "Attached to producer region"
        );

        self.attached = Some(attachment);
        Ok(())
    }

    /// Release the mutex, unmap the view and close the object.
    ///
    /// Safe to call on an empty handle.
    pub fn detach(&mut self) {
        if let Some(attachment) = self.attached.take() {
            let name = attachment.object.name().to_string();
            drop(attachment);
            tracing::debug!(name = %name, "Detached from producer region");
        }
    }

    /// Move the attachment out without releasing it.
    ///
    /// The handle is left empty; the caller decides when the mapping goes.
    pub fn take(&mut self) -> Option<Attachment> {
        self.attached.take()
    }

    /// Whether all resources are held.
    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// The current attachment, if any.
    pub fn attachment(&self) -> Option<&Attachment> {
        self.attached.as_ref()
    }

    /// Whether the attached object has been unlinked by its producer.
    pub fn is_orphaned(&self) -> bool {
        self.attached
            .as_ref()
            .is_some_and(|attachment| attachment.object.is_unlinked())
    }
}

impl Drop for RegionHandle {
    fn drop(&mut self) {
        self.detach();
    }
}
