// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use hvisor_defs::PAGE_SIZE;
use std::cell::UnsafeCell;
use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::ptr::NonNull;

fn map_shared(fd: &File, len: usize, offset: u64) -> io::Result<NonNull<libc::c_void>> {
    let offset =
        libc::off_t::try_from(offset).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    // SAFETY: calling mmap as documented to create a new mapping.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            offset,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr).ok_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable))
}

/// A page of device memory shared with the supervisor, viewed as a `T`.
pub struct MappedPage<T>(NonNull<UnsafeCell<T>>);

impl<T> MappedPage<T> {
    pub(crate) fn new(fd: &File, pg_off: u64) -> io::Result<Self> {
        // Make sure any T we're using fits in the bridge page.
        assert!(size_of::<T>() <= PAGE_SIZE);

        let ptr = map_shared(fd, PAGE_SIZE, pg_off * PAGE_SIZE as u64)?;
        Ok(Self(ptr.cast()))
    }

    /// The mapped `T`. The supervisor updates it concurrently, so accesses
    /// must be volatile or otherwise synchronized.
    pub fn as_ptr(&self) -> *mut T {
        UnsafeCell::raw_get(self.0.as_ptr())
    }

    /// The mapped `T`, as a cell.
    pub fn as_ref(&self) -> &UnsafeCell<T> {
        // SAFETY: The pointer is valid and mapped for the lifetime of the struct,
        // it will only ever point to a T, and UnsafeCell allows interior mutability.
        unsafe { self.0.as_ref() }
    }
}

impl<T> std::fmt::Debug for MappedPage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MappedPage").field(&self.0).finish()
    }
}

impl<T> Drop for MappedPage<T> {
    fn drop(&mut self) {
        // SAFETY: unmapping memory mapped at construction.
        unsafe {
            libc::munmap(self.0.as_ptr().cast(), PAGE_SIZE);
        }
    }
}

// SAFETY: this is just a pointer value.
unsafe impl<T> Send for MappedPage<T> {}
// SAFETY: see above comment
unsafe impl<T> Sync for MappedPage<T> {}

/// A mapping of a physical range exposed by the bridge.
pub struct PhysMapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl PhysMapping {
    pub(crate) fn new(fd: &File, addr: u64, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::ErrorKind::InvalidInput.into());
        }
        let ptr = map_shared(fd, len, addr)?;
        Ok(Self {
            ptr: ptr.cast(),
            len,
        })
    }

    /// The length of the mapping.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns false; mappings are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The start of the mapping.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Copies `data` to `offset`.
    ///
    /// Panics if the range is outside the mapping.
    pub fn write_at(&self, offset: usize, data: &[u8]) {
        self.check(offset, data.len());
        // SAFETY: the range is within the mapping, which does not overlap
        // `data`.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.as_ptr().add(offset),
                data.len(),
            );
        }
    }

    /// Copies from `offset` into `data`.
    ///
    /// Panics if the range is outside the mapping.
    pub fn read_at(&self, offset: usize, data: &mut [u8]) {
        self.check(offset, data.len());
        // SAFETY: the range is within the mapping, which does not overlap
        // `data`.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr.as_ptr().add(offset),
                data.as_mut_ptr(),
                data.len(),
            );
        }
    }

    fn check(&self, offset: usize, len: usize) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "access {offset:#x}+{len:#x} outside mapping of {:#x}",
            self.len
        );
    }
}

impl std::fmt::Debug for PhysMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysMapping")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for PhysMapping {
    fn drop(&mut self) {
        // SAFETY: unmapping memory mapped at construction.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

// SAFETY: this is just a pointer value.
unsafe impl Send for PhysMapping {}
// SAFETY: see above comment
unsafe impl Sync for PhysMapping {}
