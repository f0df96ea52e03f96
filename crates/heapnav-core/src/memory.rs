//! # Memory Reader
//!
//! Byte-level access to a frozen snapshot.
//!
//! The engine never owns the snapshot. It borrows a [`MemoryReader`] and
//! copies every range it decodes into owned buffers, so no foreign memory is
//! ever aliased.

use crate::error::ReadError;
use crate::types::Address;

/// Read-only access to snapshot memory
///
/// Implementations must be deterministic: the snapshot is immutable for the
/// lifetime of every navigation or materialization call, so reading the same
/// range twice returns the same bytes.
///
/// ## Thread Safety
///
/// The trait does not require `Sync`. Callers that issue navigation from
/// several threads need a reader that is itself safe for concurrent reads.
pub trait MemoryReader
{
    /// Read exactly `length` bytes starting at `address`
    ///
    /// ## Errors
    ///
    /// Returns a [`ReadError`] if any byte of the range is unmapped or the
    /// snapshot is gone. Short reads are errors, never truncated results.
    fn read_bytes(&self, address: Address, length: usize) -> Result<Vec<u8>, ReadError>;

    /// Width of a stored reference in bytes (4 or 8)
    fn pointer_size(&self) -> usize
    {
        8
    }

    /// Read a stored reference, little-endian, of [`pointer_size`](Self::pointer_size) width
    fn read_pointer(&self, address: Address) -> Result<Address, ReadError>
    {
        let size = self.pointer_size().min(8);
        let bytes = self.read_bytes(address, size)?;
        Ok(Address::new(u64::from_le_bytes(widen(address, &bytes, size)?)))
    }

    /// Read a little-endian `u32`
    fn read_u32(&self, address: Address) -> Result<u32, ReadError>
    {
        let bytes = self.read_bytes(address, 4)?;
        let raw = widen(address, &bytes, 4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Read a little-endian `u64`
    fn read_u64(&self, address: Address) -> Result<u64, ReadError>
    {
        let bytes = self.read_bytes(address, 8)?;
        Ok(u64::from_le_bytes(widen(address, &bytes, 8)?))
    }
}

/// Zero-extend the first `width` bytes of `bytes` to eight
fn widen(address: Address, bytes: &[u8], width: usize) -> Result<[u8; 8], ReadError>
{
    let source = bytes
        .get(..width)
        .ok_or_else(|| ReadError::new(address, width, format!("short read of {} bytes", bytes.len())))?;
    let mut raw = [0u8; 8];
    raw[..width].copy_from_slice(source);
    Ok(raw)
}
