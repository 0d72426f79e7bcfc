//! SharedMemoryRegion - POSIX shared memory wrapper.
//!
//! Provides safe abstraction over shm_open and mmap for small named
//! segments. All unsafe operations are encapsulated with bounds checking.

use std::ffi::CString;
use std::ptr::NonNull;

use crate::error::ChannelError;

/// Represents a mapped shared memory region.
///
/// The mapping is released on drop. An owning region additionally unlinks
/// the name on drop unless [`SharedMemoryRegion::unlink`] already did.
pub struct SharedMemoryRegion {
    /// Name of the shared memory object (without the leading slash).
    name: String,
    /// Pointer to the mapped memory.
    ptr: NonNull<u8>,
    /// Size of the mapped region in bytes.
    size: usize,
    /// File descriptor for the shared memory object.
    fd: i32,
    /// Whether this instance is responsible for unlinking the name.
    is_owner: bool,
}

// SAFETY: SharedMemoryRegion owns its mapping; access goes through atomics.
unsafe impl Send for SharedMemoryRegion {}

// SAFETY: Shared access is limited to atomic loads and stores on the mapping.
unsafe impl Sync for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// Minimum size for a region: one 64-bit word.
    pub const MIN_SIZE: usize = 8;

    /// Maximum size for a region (one page).
    pub const MAX_SIZE: usize = 4096;

    /// Longest accepted name (NAME_MAX minus the leading slash).
    const MAX_NAME_LEN: usize = 254;

    /// Create a region, or attach to an existing one with the same name.
    ///
    /// The returned region owns the name and zero-fills the mapping.
    ///
    /// # Errors
    /// Returns ChannelError if the object cannot be opened, sized or mapped.
    pub fn create(name: &str, size: usize) -> Result<Self, ChannelError> {
        Self::validate(name, size, |reason| ChannelError::CreateFailed {
            name: name.to_string(),
            reason,
        })?;
        let c_name = Self::c_name(name, |reason| ChannelError::CreateFailed {
            name: name.to_string(),
            reason,
        })?;

        // SAFETY: c_name is a valid CString, flags are valid POSIX flags
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(ChannelError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            // SAFETY: fd is valid and c_name names the object we just opened
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(ChannelError::CreateFailed {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", errno),
            });
        }

        let ptr = match Self::map(fd, size) {
            Ok(ptr) => ptr,
            Err(reason) => {
                // SAFETY: fd is valid and c_name names the object we just opened
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(ChannelError::MapFailed {
                    name: name.to_string(),
                    reason,
                });
            }
        };

        // SAFETY: ptr is valid for size bytes
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, size);
        }

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            fd,
            is_owner: true,
        })
    }

    /// Attach to an existing region without taking ownership of its name.
    pub fn open(name: &str, size: usize) -> Result<Self, ChannelError> {
        Self::validate(name, size, |reason| ChannelError::AttachFailed {
            name: name.to_string(),
            reason,
        })?;
        let c_name = Self::c_name(name, |reason| ChannelError::AttachFailed {
            name: name.to_string(),
            reason,
        })?;

        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(ChannelError::AttachFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        // Mapping past the object's end would SIGBUS on first access.
        // SAFETY: fd is valid and stat is a plain-old-data out parameter
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        let stat_result = unsafe { libc::fstat(fd, &mut stat) };
        if stat_result < 0 || (stat.st_size as usize) < size {
            let reason = if stat_result < 0 {
                format!("fstat failed: {}", std::io::Error::last_os_error())
            } else {
                format!("segment is {} bytes, expected {}", stat.st_size, size)
            };
            // SAFETY: fd is valid
            unsafe { libc::close(fd) };
            return Err(ChannelError::AttachFailed {
                name: name.to_string(),
                reason,
            });
        }

        let ptr = match Self::map(fd, size) {
            Ok(ptr) => ptr,
            Err(reason) => {
                // SAFETY: fd is valid
                unsafe { libc::close(fd) };
                return Err(ChannelError::MapFailed {
                    name: name.to_string(),
                    reason,
                });
            }
        };

        tracing::debug!(name = %name, size = size, "Attached shared memory region");

        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            fd,
            is_owner: false,
        })
    }

    /// Whether a shared memory object with this name currently exists.
    pub fn exists(name: &str) -> bool {
        let Ok(c_name) = CString::new(format!("/{}", name)) else {
            return false;
        };
        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd < 0 {
            return false;
        }
        // SAFETY: fd was just opened
        unsafe { libc::close(fd) };
        true
    }

    /// Remove the name from the system. The mapping stays valid until drop.
    pub fn unlink(&mut self) -> Result<(), ChannelError> {
        let c_name = Self::c_name(&self.name, |reason| ChannelError::UnlinkFailed {
            name: self.name.clone(),
            reason,
        })?;
        self.is_owner = false;

        // SAFETY: c_name is a valid CString
        let result = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if result < 0 {
            return Err(ChannelError::UnlinkFailed {
                name: self.name.clone(),
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        tracing::debug!(name = %self.name, "Unlinked shared memory region");
        Ok(())
    }

    /// Get the name of this shared memory region.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size of this shared memory region.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether dropping this region unlinks its name.
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Get a raw pointer to the shared memory.
    ///
    /// # Safety
    /// Caller must ensure proper synchronization when accessing the memory.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn validate<F>(name: &str, size: usize, err: F) -> Result<(), ChannelError>
    where
        F: Fn(String) -> ChannelError,
    {
        if name.is_empty() {
            return Err(err("Name cannot be empty".to_string()));
        }
        if name.len() > Self::MAX_NAME_LEN || name.contains('/') {
            return Err(err(format!(
                "Name must be at most {} bytes without '/'",
                Self::MAX_NAME_LEN
            )));
        }
        if !(Self::MIN_SIZE..=Self::MAX_SIZE).contains(&size) {
            return Err(err(format!(
                "Size {} outside {}..={}",
                size,
                Self::MIN_SIZE,
                Self::MAX_SIZE
            )));
        }
        Ok(())
    }

    fn c_name<F>(name: &str, err: F) -> Result<CString, ChannelError>
    where
        F: Fn(String) -> ChannelError,
    {
        CString::new(format!("/{}", name)).map_err(|e| err(format!("Invalid name: {}", e)))
    }

    fn map(fd: i32, size: usize) -> Result<NonNull<u8>, String> {
        // SAFETY: fd is valid, size is validated, offset 0 is valid
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(format!("mmap failed: {}", std::io::Error::last_os_error()));
        }
        NonNull::new(ptr as *mut u8).ok_or_else(|| "mmap returned null".to_string())
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and size were set during creation
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) };
        if result < 0 {
            tracing::error!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }

        // SAFETY: fd was opened during creation
        unsafe { libc::close(self.fd) };

        if self.is_owner {
            if let Err(e) = self.unlink() {
                tracing::error!(error = %e, "Failed to unlink shared memory on drop");
            }
        }
    }
}
