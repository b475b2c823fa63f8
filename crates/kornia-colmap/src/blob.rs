use crate::error::{ColmapError, Result};

/// A numeric type that can be packed into a blob.
///
/// Values are stored little-endian with no padding and no length prefix.
pub trait BlobScalar: Copy {
    /// Size of one element in bytes.
    const SIZE: usize;

    /// Append the little-endian bytes of the value.
    fn write_le(self, out: &mut Vec<u8>);

    /// Read a value from exactly [`Self::SIZE`] bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_blob_scalar {
    ($($ty:ty),*) => {
        $(
            impl BlobScalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_blob_scalar!(f64, f32, u32, i64, u8);

/// Pack a slice of values into a blob.
pub fn encode_blob<T: BlobScalar>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::SIZE);
    for &v in values {
        v.write_le(&mut out);
    }
    out
}

/// Unpack a blob into a vector of values.
///
/// Fails if the blob length is not a multiple of the element size.
pub fn decode_blob<T: BlobScalar>(blob: &[u8]) -> Result<Vec<T>> {
    if blob.len() % T::SIZE != 0 {
        return Err(ColmapError::Codec {
            len: blob.len(),
            elem_size: T::SIZE,
        });
    }
    Ok(blob.chunks_exact(T::SIZE).map(T::read_le).collect())
}

/// Pack camera parameters into the blob stored in the `cameras` table.
///
/// Example:
///
/// ```
/// use kornia_colmap::blob::{decode_params, encode_params};
///
/// let params = [700.0, 640.0, 360.0, -0.05, 0.01];
/// let blob = encode_params(&params);
/// assert_eq!(blob.len(), 40);
/// assert_eq!(decode_params(&blob).unwrap(), params);
/// ```
pub fn encode_params(params: &[f64]) -> Vec<u8> {
    encode_blob(params)
}

/// Unpack camera parameters from a `cameras` table blob.
pub fn decode_params(blob: &[u8]) -> Result<Vec<f64>> {
    decode_blob(blob)
}
