//! Recursive length-prefix item encoding.

use super::DecodeError;

/// Offset for short byte strings.
pub const STRING_OFFSET: u8 = 0x80;

/// Offset for long byte strings (plus length-of-length).
pub const LONG_STRING_OFFSET: u8 = 0xb7;

/// Offset for short lists.
pub const LIST_OFFSET: u8 = 0xc0;

/// Offset for long lists (plus length-of-length).
pub const LONG_LIST_OFFSET: u8 = 0xf7;

/// Longest payload that still fits the single-byte header.
pub const MAX_SHORT_LENGTH: usize = 55;

/// A value that appends exactly one item to a stream.
pub trait Encodable {
    fn rlp_append(&self, s: &mut RlpStream);

    /// Encode this value as a standalone item.
    fn rlp_bytes(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        self.rlp_append(&mut s);
        s.out()
    }
}

/// A value decodable from exactly one item.
pub trait Decodable: Sized {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError>;
}

/// Encode a single value.
pub fn encode<E: Encodable + ?Sized>(value: &E) -> Vec<u8> {
    value.rlp_bytes()
}

/// Decode a single value, rejecting trailing bytes.
pub fn decode<T: Decodable>(bytes: &[u8]) -> Result<T, DecodeError> {
    let rlp = Rlp::new(bytes);
    rlp.ensure_exact()?;
    T::decode(&rlp)
}

/// Append a header for a payload of `len` bytes.
pub(crate) fn write_header(buf: &mut Vec<u8>, offset: u8, len: usize) {
    if len <= MAX_SHORT_LENGTH {
        buf.push(offset + len as u8);
    } else {
        let be = (len as u64).to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count();
        let width = be.len() - skip;
        buf.push(offset + MAX_SHORT_LENGTH as u8 + width as u8);
        buf.extend_from_slice(&be[skip..]);
    }
}

/// Read a big-endian length field of `width` bytes.
fn read_length(bytes: &[u8], width: usize) -> Result<usize, DecodeError> {
    if width > std::mem::size_of::<usize>() {
        return Err(DecodeError::LengthOverflow);
    }
    if bytes.len() < width {
        return Err(DecodeError::TooShort {
            expected: width,
            got: bytes.len(),
        });
    }
    if bytes[0] == 0 {
        return Err(DecodeError::LeadingZero);
    }
    Ok(bytes[..width]
        .iter()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize))
}

// ============================================================================
// Encoding
// ============================================================================

/// Append-only item writer.
#[derive(Clone, Debug, Default)]
pub struct RlpStream {
    buf: Vec<u8>,
}

impl RlpStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an encodable value.
    pub fn append<E: Encodable + ?Sized>(&mut self, value: &E) -> &mut Self {
        value.rlp_append(self);
        self
    }

    /// Append a byte string item.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        if bytes.len() == 1 && bytes[0] < STRING_OFFSET {
            self.buf.push(bytes[0]);
        } else {
            write_header(&mut self.buf, STRING_OFFSET, bytes.len());
            self.buf.extend_from_slice(bytes);
        }
        self
    }

    /// Append an already-encoded item verbatim.
    pub fn append_raw(&mut self, encoded: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(encoded);
        self
    }

    /// Append a list whose items are written by `f`.
    pub fn list<F: FnOnce(&mut RlpStream)>(&mut self, f: F) -> &mut Self {
        let mut inner = RlpStream::new();
        f(&mut inner);
        write_header(&mut self.buf, LIST_OFFSET, inner.buf.len());
        self.buf.extend_from_slice(&inner.buf);
        self
    }

    /// Append a homogeneous list.
    pub fn append_list<E: Encodable>(&mut self, items: &[E]) -> &mut Self {
        self.list(|s| {
            for item in items {
                s.append(item);
            }
        })
    }

    /// Append a list of already-encoded items.
    pub fn append_raw_list<B: AsRef<[u8]>>(&mut self, items: &[B]) -> &mut Self {
        self.list(|s| {
            for item in items {
                s.append_raw(item.as_ref());
            }
        })
    }

    /// Append an optional value using the zero-or-one-element list convention.
    pub fn append_optional<E: Encodable>(&mut self, value: Option<&E>) -> &mut Self {
        self.list(|s| {
            if let Some(v) = value {
                s.append(v);
            }
        })
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the stream.
    pub fn out(self) -> Vec<u8> {
        self.buf
    }
}

macro_rules! impl_uint {
    ($($t:ty),*) => {$(
        impl Encodable for $t {
            fn rlp_append(&self, s: &mut RlpStream) {
                let be = self.to_be_bytes();
                let skip = be.iter().take_while(|b| **b == 0).count();
                s.append_bytes(&be[skip..]);
            }
        }

        impl Decodable for $t {
            fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
                let data = rlp.data()?;
                let width = std::mem::size_of::<$t>();
                if data.len() > width {
                    return Err(DecodeError::IntegerOverflow(width));
                }
                if data.first() == Some(&0) {
                    return Err(DecodeError::LeadingZero);
                }
                Ok(data
                    .iter()
                    .fold(0 as $t, |acc, b| acc.checked_shl(8).unwrap_or(0) | *b as $t))
            }
        }
    )*};
}

impl_uint!(u8, u16, u32, u64, u128);

impl Encodable for bool {
    fn rlp_append(&self, s: &mut RlpStream) {
        (*self as u8).rlp_append(s);
    }
}

impl Decodable for bool {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        match u8::decode(rlp)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidValue(format!("boolean {}", other))),
        }
    }
}

impl Encodable for [u8] {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_bytes(self);
    }
}

impl Encodable for Vec<u8> {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_bytes(self);
    }
}

impl<const N: usize> Encodable for [u8; N] {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_bytes(self);
    }
}

impl Encodable for str {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_bytes(self.as_bytes());
    }
}

impl Encodable for String {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_bytes(self.as_bytes());
    }
}

impl<T: Encodable + ?Sized> Encodable for &T {
    fn rlp_append(&self, s: &mut RlpStream) {
        (**self).rlp_append(s);
    }
}

impl Decodable for Vec<u8> {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        Ok(rlp.data()?.to_vec())
    }
}

impl<const N: usize> Decodable for [u8; N] {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        let data = rlp.data()?;
        if data.len() != N {
            return Err(DecodeError::InvalidLength {
                expected: N,
                got: data.len(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(data);
        Ok(out)
    }
}

impl Decodable for String {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        String::from_utf8(rlp.data()?.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct PayloadInfo {
    header_len: usize,
    value_len: usize,
    is_list: bool,
}

impl PayloadInfo {
    fn total(&self) -> usize {
        self.header_len + self.value_len
    }
}

fn payload_info(bytes: &[u8]) -> Result<PayloadInfo, DecodeError> {
    let first = *bytes.first().ok_or(DecodeError::Empty)?;
    let info = match first {
        0x00..=0x7f => PayloadInfo {
            header_len: 0,
            value_len: 1,
            is_list: false,
        },
        0x80..=0xb7 => PayloadInfo {
            header_len: 1,
            value_len: (first - STRING_OFFSET) as usize,
            is_list: false,
        },
        0xb8..=0xbf => {
            let width = (first - LONG_STRING_OFFSET) as usize;
            PayloadInfo {
                header_len: 1 + width,
                value_len: read_length(&bytes[1..], width)?,
                is_list: false,
            }
        }
        0xc0..=0xf7 => PayloadInfo {
            header_len: 1,
            value_len: (first - LIST_OFFSET) as usize,
            is_list: true,
        },
        0xf8..=0xff => {
            let width = (first - LONG_LIST_OFFSET) as usize;
            PayloadInfo {
                header_len: 1 + width,
                value_len: read_length(&bytes[1..], width)?,
                is_list: true,
            }
        }
    };
    let total = info
        .header_len
        .checked_add(info.value_len)
        .ok_or(DecodeError::LengthOverflow)?;
    if total > bytes.len() {
        return Err(DecodeError::TooShort {
            expected: total,
            got: bytes.len(),
        });
    }
    Ok(info)
}

/// A view over exactly one encoded item.
#[derive(Clone, Copy, Debug)]
pub struct Rlp<'a> {
    bytes: &'a [u8],
}

impl<'a> Rlp<'a> {
    /// Wrap encoded bytes. Trailing bytes beyond the first item are ignored
    /// unless [`Rlp::ensure_exact`] is called.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Fail unless the wrapped bytes hold exactly one item.
    pub fn ensure_exact(&self) -> Result<(), DecodeError> {
        let info = payload_info(self.bytes)?;
        let extra = self.bytes.len() - info.total();
        if extra > 0 {
            return Err(DecodeError::TrailingBytes(extra));
        }
        Ok(())
    }

    /// The raw encoding of this item (header included).
    pub fn as_raw(&self) -> &'a [u8] {
        match payload_info(self.bytes) {
            Ok(info) => &self.bytes[..info.total()],
            Err(_) => self.bytes,
        }
    }

    /// Check whether this item is a list.
    pub fn is_list(&self) -> bool {
        matches!(self.bytes.first(), Some(b) if *b >= LIST_OFFSET)
    }

    /// Payload of a byte-string item.
    pub fn data(&self) -> Result<&'a [u8], DecodeError> {
        let info = payload_info(self.bytes)?;
        if info.is_list {
            return Err(DecodeError::ExpectedData);
        }
        Ok(&self.bytes[info.header_len..info.total()])
    }

    /// Child items of a list item.
    pub fn items(&self) -> Result<Vec<Rlp<'a>>, DecodeError> {
        let info = payload_info(self.bytes)?;
        if !info.is_list {
            return Err(DecodeError::ExpectedList);
        }
        let mut rest = &self.bytes[info.header_len..info.total()];
        let mut items = Vec::new();
        while !rest.is_empty() {
            let item = payload_info(rest)?;
            let (head, tail) = rest.split_at(item.total());
            items.push(Rlp::new(head));
            rest = tail;
        }
        Ok(items)
    }

    /// Child items, requiring an exact count.
    pub fn expect_items(&self, count: usize) -> Result<Vec<Rlp<'a>>, DecodeError> {
        let items = self.items()?;
        if items.len() != count {
            return Err(DecodeError::WrongItemCount {
                expected: count,
                got: items.len(),
            });
        }
        Ok(items)
    }

    /// Number of child items.
    pub fn item_count(&self) -> Result<usize, DecodeError> {
        Ok(self.items()?.len())
    }

    /// Child item at `index`.
    pub fn at(&self, index: usize) -> Result<Rlp<'a>, DecodeError> {
        self.items()?
            .get(index)
            .copied()
            .ok_or(DecodeError::MissingItem(index))
    }

    /// Decode this item.
    pub fn as_val<T: Decodable>(&self) -> Result<T, DecodeError> {
        T::decode(self)
    }

    /// Decode the child at `index`.
    pub fn val_at<T: Decodable>(&self, index: usize) -> Result<T, DecodeError> {
        T::decode(&self.at(index)?)
    }

    /// Decode every child item.
    pub fn as_list<T: Decodable>(&self) -> Result<Vec<T>, DecodeError> {
        self.items()?.iter().map(T::decode).collect()
    }

    /// Raw encodings of every child item.
    pub fn as_raw_list(&self) -> Result<Vec<Vec<u8>>, DecodeError> {
        Ok(self
            .items()?
            .iter()
            .map(|item| item.as_raw().to_vec())
            .collect())
    }

    /// Decode a zero-or-one-element list into an `Option`.
    pub fn as_optional<T: Decodable>(&self) -> Result<Option<T>, DecodeError> {
        let items = self.items()?;
        match items.as_slice() {
            [] => Ok(None),
            [item] => Ok(Some(T::decode(item)?)),
            _ => Err(DecodeError::WrongItemCount {
                expected: 1,
                got: items.len(),
            }),
        }
    }
}
