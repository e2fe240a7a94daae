// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! NamedMutex - the producer's named synchronization object.
//!
//! Backed by a POSIX named semaphore initialised to 1. The producer holds it
//! while rewriting the sensor tables; the locator holds it while scanning.

use std::ptr::NonNull;
use std::time::Duration;

use nix::errno::Errno;

use crate::error::{AttachError, LocateError, ProducerError};
use crate::shm::region::object_path;

/// Handle to a named semaphore used as a cross-process mutex.
pub struct NamedMutex {
    /// Name of the semaphore (without the leading /).
    name: String,
    /// Semaphore returned by sem_open.
    sem: NonNull<libc::sem_t>,
    /// Whether this instance created the semaphore (and should unlink on drop).
    is_owner: bool,
}

// SAFETY: sem_t operations are thread-safe; the handle is only closed on drop.
unsafe impl Send for NamedMutex {}

// SAFETY: sem_timedwait/sem_post may be called concurrently from any thread.
unsafe impl Sync for NamedMutex {}

impl NamedMutex {
    /// Open an existing named mutex.
    ///
    /// # Errors
    /// Returns [`AttachError::MutexAbsent`] if the producer has not created it.
    pub fn open(name: &str) -> Result<Self, AttachError> {
        let c_name = object_path(name).ok_or_else(|| AttachError::InvalidName {
            name: name.to_string(),
        })?;

        // SAFETY: c_name is a valid CString; oflag 0 opens without creating
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(AttachError::MutexAbsent {
                name: name.to_string(),
                reason: format!("sem_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        let sem = NonNull::new(sem).ok_or_else(|| AttachError::MutexAbsent {
            name: name.to_string(),
            reason: "sem_open returned null".to_string(),
        })?;

        tracing::debug!(name = %name, "Opened named mutex");

        Ok(Self {
            name: name.to_string(),
            sem,
            is_owner: false,
        })
    }

    /// Create a new named mutex in the unlocked state.
    ///
    /// Producer side only; the semaphore is unlinked when this handle drops.
    pub fn create(name: &str) -> Result<Self, ProducerError> {
        let c_name = object_path(name).ok_or_else(|| ProducerError::CreateFailed {
            name: name.to_string(),
            reason: "Invalid name".to_string(),
        })?;

        // SAFETY: c_name is a valid CString, mode and initial value are passed
        // as the promoted variadic types sem_open expects
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                1 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(ProducerError::CreateFailed {
                name: name.to_string(),
                reason: format!("sem_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        let sem = NonNull::new(sem).ok_or_else(|| ProducerError::CreateFailed {
            name: name.to_string(),
            reason: "sem_open returned null".to_string(),
        })?;

        tracing::debug!(name = %name, "Created named mutex");

        Ok(Self {
            name: name.to_string(),
            sem,
            is_owner: true,
        })
    }

    /// Get the name of this mutex.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire the mutex, waiting at most `timeout`.
    pub fn lock(&self, timeout: Duration) -> Result<NamedMutexGuard<'_>, LocateError> {
        let deadline = deadline_after(timeout);

        loop {
            // SAFETY: sem is a live semaphore handle and deadline a valid timespec
            let rc = unsafe { libc::sem_timedwait(self.sem.as_ptr(), &deadline) };
            if rc == 0 {
                return Ok(NamedMutexGuard { mutex: self });
            }

            match Errno::last() {
                Errno::EINTR => continue,
                Errno::ETIMEDOUT => {
                    return Err(LocateError::LockTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
                errno => {
                    return Err(LocateError::LockFailed {
                        reason: format!("sem_timedwait failed: {}", errno),
                    })
                }
            }
        }
    }
}

/// Absolute CLOCK_REALTIME deadline for sem_timedwait.
fn deadline_after(timeout: Duration) -> libc::timespec {
    // SAFETY: timespec is plain old data
    let mut now: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: now is a valid out-pointer
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };

    let nanos = now.tv_nsec as u64 + u64::from(timeout.subsec_nanos());
    let mut deadline = now;
    deadline.tv_sec = now
        .tv_sec
        .saturating_add(timeout.as_secs() as libc::time_t)
        .saturating_add((nanos / 1_000_000_000) as libc::time_t);
    deadline.tv_nsec = (nanos % 1_000_000_000) as libc::c_long;
    deadline
}

impl Drop for NamedMutex {
    fn drop(&mut self) {
        // SAFETY: sem was returned by sem_open and is closed exactly once
        if unsafe { libc::sem_close(self.sem.as_ptr()) } < 0 {
            tracing::error!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "Failed to close named mutex"
            );
        }

        if self.is_owner {
            if let Some(c_name) = object_path(&self.name) {
                // SAFETY: c_name is a valid CString
                unsafe { libc::sem_unlink(c_name.as_ptr()) };
                tracing::debug!(name = %self.name, "Unlinked named mutex");
            }
        }
    }
}

/// Releases the mutex when dropped.
pub struct NamedMutexGuard<'a> {
    mutex: &'a NamedMutex,
}

impl Drop for NamedMutexGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only while this thread holds the semaphore
        unsafe { libc::sem_post(self.mutex.sem.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::unique_name;

    #[test]
    fn test_open_missing_mutex() {
        let name = unique_name("mutex-missing");
        let err = NamedMutex::open(&name).err().unwrap();
        assert!(matches!(err, AttachError::MutexAbsent { .. }));
    }

    #[test]
    fn test_lock_and_release() {
        let name = unique_name("mutex-lock");
        let owner = NamedMutex::create(&name).unwrap();
        let opened = NamedMutex::open(&name).unwrap();

        {
            let _guard = opened.lock(Duration::from_millis(100)).unwrap();
            let err = owner.lock(Duration::from_millis(20)).err().unwrap();
            assert!(matches!(err, LocateError::LockTimeout { timeout_ms: 20 }));
        }

        assert!(owner.lock(Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn test_owner_unlinks_on_drop() {
        let name = unique_name("mutex-unlink");
        drop(NamedMutex::create(&name).unwrap());
        assert!(NamedMutex::open(&name).is_err());
    }
}
