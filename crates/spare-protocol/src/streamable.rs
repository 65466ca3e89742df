use std::io::Cursor;

use chia_sha2::Sha256;

use crate::{Bytes32, StreamError, StreamResult};

/// Canonical binary encoding shared by every wire message and persisted record.
///
/// Records are the concatenation of their fields in declaration order, so decoding
/// requires knowing the expected type up front. Integers are big-endian and fixed
/// width, sequences carry a `u32` length prefix, and optional values carry a one
/// byte presence flag. The encoding of a value never depends on anything but the
/// value itself.
///
/// Encoding is infallible for every value the protocol can carry. No sequence in a
/// valid message comes near `u32::MAX` elements, and the decoder never produces one,
/// so callers must not build such a value by hand.
pub trait Streamable: Sized {
    /// # Panics
    ///
    /// If a sequence inside the value has more than `u32::MAX` elements, which no
    /// encoding can represent.
    fn stream(&self, out: &mut Vec<u8>);

    fn parse(input: &mut Cursor<&[u8]>) -> StreamResult<Self>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.stream(&mut out);
        out
    }

    /// Decodes a value that must consume the entire buffer.
    fn from_bytes(bytes: &[u8]) -> StreamResult<Self> {
        let mut input = Cursor::new(bytes);
        let value = Self::parse(&mut input)?;
        let remaining = remaining(&input);
        if remaining != 0 {
            return Err(StreamError::TrailingBytes(remaining));
        }
        Ok(value)
    }

    /// The SHA-256 of the canonical encoding, used as the identifier of records.
    fn hash(&self) -> Bytes32 {
        let mut hasher = Sha256::new();
        hasher.update(self.to_bytes());
        Bytes32::new(hasher.finalize())
    }
}

fn position(input: &Cursor<&[u8]>) -> usize {
    usize::try_from(input.position()).unwrap_or(usize::MAX)
}

fn remaining(input: &Cursor<&[u8]>) -> usize {
    input.get_ref().len().saturating_sub(position(input))
}

/// Takes exactly `len` bytes from the input, advancing the cursor.
pub fn read_bytes<'a>(input: &mut Cursor<&'a [u8]>, len: usize) -> StreamResult<&'a [u8]> {
    let buf: &'a [u8] = *input.get_ref();
    let start = position(input).min(buf.len());
    let available = buf.len() - start;

    if available < len {
        return Err(StreamError::EndOfBuffer {
            needed: len,
            remaining: available,
        });
    }

    input.set_position(input.position() + len as u64);
    Ok(&buf[start..start + len])
}

/// Writes a sequence length prefix.
///
/// # Panics
///
/// If `len` does not fit the `u32` prefix.
pub fn stream_len(len: usize, out: &mut Vec<u8>) {
    let len = u32::try_from(len).expect("sequence length exceeds u32::MAX");
    len.stream(out);
}

/// Reads a sequence length prefix, rejecting lengths that cannot be addressed.
pub fn parse_len(input: &mut Cursor<&[u8]>) -> StreamResult<usize> {
    let len = u32::parse(input)?;
    usize::try_from(len).map_err(|_| StreamError::LengthOutOfRange(len.into()))
}

macro_rules! impl_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Streamable for $ty {
                fn stream(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_be_bytes());
                }

                fn parse(input: &mut Cursor<&[u8]>) -> StreamResult<Self> {
                    let bytes = read_bytes(input, std::mem::size_of::<$ty>())?;
                    let mut buf = [0; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    Ok(<$ty>::from_be_bytes(buf))
                }
            }
        )*
    };
}

impl_int!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

impl Streamable for bool {
    fn stream(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn parse(input: &mut Cursor<&[u8]>) -> StreamResult<Self> {
        match u8::parse(input)? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(StreamError::InvalidBool(value)),
        }
    }
}

impl<T: Streamable> Streamable for Option<T> {
    fn stream(&self, out: &mut Vec<u8>) {
        match self {
            None => out.push(0),
            Some(value) => {
                out.push(1);
                value.stream(out);
            }
        }
    }

    fn parse(input: &mut Cursor<&[u8]>) -> StreamResult<Self> {
        match u8::parse(input)? {
            0 => Ok(None),
            1 => Ok(Some(T::parse(input)?)),
            value => Err(StreamError::InvalidOptional(value)),
        }
    }
}

impl<T: Streamable> Streamable for Vec<T> {
    fn stream(&self, out: &mut Vec<u8>) {
        stream_len(self.len(), out);
        for item in self {
            item.stream(out);
        }
    }

    fn parse(input: &mut Cursor<&[u8]>) -> StreamResult<Self> {
        let len = parse_len(input)?;

        // Every element takes at least one byte, so a prefix larger than the
        // remaining input can't be honest. Don't allocate for it.
        let mut items = Vec::with_capacity(len.min(remaining(input)));
        for _ in 0..len {
            items.push(T::parse(input)?);
        }
        Ok(items)
    }
}

impl Streamable for String {
    fn stream(&self, out: &mut Vec<u8>) {
        stream_len(self.len(), out);
        out.extend_from_slice(self.as_bytes());
    }

    fn parse(input: &mut Cursor<&[u8]>) -> StreamResult<Self> {
        let len = parse_len(input)?;
        let bytes = read_bytes(input, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StreamError::InvalidString)
    }
}

impl<A: Streamable, B: Streamable> Streamable for (A, B) {
    fn stream(&self, out: &mut Vec<u8>) {
        self.0.stream(out);
        self.1.stream(out);
    }

    fn parse(input: &mut Cursor<&[u8]>) -> StreamResult<Self> {
        Ok((A::parse(input)?, B::parse(input)?))
    }
}

impl<A: Streamable, B: Streamable, C: Streamable> Streamable for (A, B, C) {
    fn stream(&self, out: &mut Vec<u8>) {
        self.0.stream(out);
        self.1.stream(out);
        self.2.stream(out);
    }

    fn parse(input: &mut Cursor<&[u8]>) -> StreamResult<Self> {
        Ok((A::parse(input)?, B::parse(input)?, C::parse(input)?))
    }
}
