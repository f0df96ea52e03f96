//! # Configuration
//!
//! Knobs for navigation and for laying out in-memory heap images.

/// Byte layout of managed objects in a heap image
///
/// ## Object shapes
///
/// ```text
/// object:  [header: header_size][payload: type size]
/// array:   [header][length: array_length_size][elements...]
/// string:  [header][length: string_length_size][UTF-16 code units...]
/// ```
///
/// The header holds the object's type id, stored as a pointer-sized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLayout
{
    /// Width of a stored reference
    pub pointer_size: u64,
    /// Bytes preceding an object's payload
    pub header_size: u64,
    /// Width of the element count at the start of an array payload
    pub array_length_size: u64,
    /// Width of the character count at the start of a string payload
    pub string_length_size: u64,
}

impl ObjectLayout
{
    /// 64-bit process layout
    pub const fn x64() -> Self
    {
        Self {
            pointer_size: 8,
            header_size: 8,
            array_length_size: 8,
            string_length_size: 4,
        }
    }

    /// 32-bit process layout
    pub const fn x86() -> Self
    {
        Self {
            pointer_size: 4,
            header_size: 4,
            array_length_size: 4,
            string_length_size: 4,
        }
    }
}

impl Default for ObjectLayout
{
    fn default() -> Self
    {
        Self::x64()
    }
}

/// Options controlling field lookup during navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationOptions
{
    /// Retry a missing field as the auto-property backing field `<Name>k__BackingField`
    pub backing_field_fallback: bool,
}

impl Default for NavigationOptions
{
    fn default() -> Self
    {
        Self {
            backing_field_fallback: true,
        }
    }
}
