// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight decoding from a [`DataReader`].
//!
//! Weights are stored back to back in layer order. A record is either raw
//! little-endian `f32` values, or a 4-byte storage tag followed by the
//! values in the tagged encoding.

use crate::{DataReader, ModelError};
use half::f16;
use tensor_core::{Shape, Tensor};

/// Tag for plain `f32` records.
pub const TAG_F32: u32 = 0;

/// Tag for half-precision records (padded to a multiple of 4 bytes).
pub const TAG_F16: u32 = 0x0130_6B47;

/// How a weight record is laid out in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightStorage {
    /// A storage tag precedes the values.
    Tagged,
    /// Plain `f32` values with no tag.
    Raw,
}

/// Sequential weight reader over a [`DataReader`].
pub struct ModelBin<'a> {
    reader: &'a mut dyn DataReader,
    bytes_read: usize,
}

impl<'a> ModelBin<'a> {
    /// Wraps a reader positioned at the first weight record.
    pub fn new(reader: &'a mut dyn DataReader) -> Self {
        Self {
            reader,
            bytes_read: 0,
        }
    }

    /// Total bytes consumed so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Loads the next record of `len` elements as a 1-D tensor.
    pub fn load(&mut self, len: usize, storage: WeightStorage) -> Result<Tensor, ModelError> {
        let values = match storage {
            WeightStorage::Raw => self.read_f32(len)?,
            WeightStorage::Tagged => {
                let tag = self.read_bytes(4)?;
                match u32::from_le_bytes([tag[0], tag[1], tag[2], tag[3]]) {
                    TAG_F32 => self.read_f32(len)?,
                    TAG_F16 => self.read_f16(len)?,
                    other => return Err(ModelError::UnknownWeightTag(other)),
                }
            }
        };
        Ok(Tensor::from_vec(Shape::vector(len), values)?)
    }

    fn read_bytes(&mut self, expected: usize) -> Result<Vec<u8>, ModelError> {
        let mut buf = vec![0u8; expected];
        let actual = self.reader.read(&mut buf);
        self.bytes_read += actual;
        if actual != expected {
            return Err(ModelError::TruncatedWeights { expected, actual });
        }
        Ok(buf)
    }

    fn read_f32(&mut self, len: usize) -> Result<Vec<f32>, ModelError> {
        let buf = self.read_bytes(len * 4)?;
        Ok(buf
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn read_f16(&mut self, len: usize) -> Result<Vec<f32>, ModelError> {
        let padded = (len * 2).next_multiple_of(4);
        let buf = self.read_bytes(padded)?;
        Ok(buf[..len * 2]
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect())
    }
}

impl std::fmt::Debug for ModelBin<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBin")
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryReader;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_raw_f32() {
        let mut reader = MemoryReader::new(f32_bytes(&[1.5, -2.0, 3.25]));
        let mut mb = ModelBin::new(&mut reader);
        let t = mb.load(3, WeightStorage::Raw).unwrap();
        assert_eq!(t.as_slice(), &[1.5, -2.0, 3.25]);
        assert_eq!(t.shape().dims(), &[3]);
        assert_eq!(mb.bytes_read(), 12);
    }

    #[test]
    fn test_tagged_f32() {
        let mut data = TAG_F32.to_le_bytes().to_vec();
        data.extend(f32_bytes(&[0.5, 4.0]));
        let mut reader = MemoryReader::new(data);
        let mut mb = ModelBin::new(&mut reader);
        let t = mb.load(2, WeightStorage::Tagged).unwrap();
        assert_eq!(t.as_slice(), &[0.5, 4.0]);
    }

    #[test]
    fn test_tagged_f16_padding() {
        let mut data = TAG_F16.to_le_bytes().to_vec();
        for v in [1.0f32, -0.5, 2.0] {
            data.extend(f16::from_f32(v).to_le_bytes());
        }
        data.extend([0u8, 0]); // pad 6 -> 8 bytes
        data.extend(f32_bytes(&[7.0]));

        let mut reader = MemoryReader::new(data);
        let mut mb = ModelBin::new(&mut reader);
        let t = mb.load(3, WeightStorage::Tagged).unwrap();
        assert_eq!(t.as_slice(), &[1.0, -0.5, 2.0]);
        let next = mb.load(1, WeightStorage::Raw).unwrap();
        assert_eq!(next.as_slice(), &[7.0]);
        assert_eq!(mb.bytes_read(), 4 + 8 + 4);
    }

    #[test]
    fn test_unknown_tag() {
        let mut reader = MemoryReader::new(0xDEAD_BEEFu32.to_le_bytes().to_vec());
        let mut mb = ModelBin::new(&mut reader);
        let err = mb.load(1, WeightStorage::Tagged).unwrap_err();
        assert!(matches!(err, ModelError::UnknownWeightTag(0xDEAD_BEEF)));
    }

    #[test]
    fn test_truncated() {
        let mut reader = MemoryReader::new(f32_bytes(&[1.0]));
        let mut mb = ModelBin::new(&mut reader);
        let err = mb.load(2, WeightStorage::Raw).unwrap_err();
        assert!(matches!(
            err,
            ModelError::TruncatedWeights {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_missing_tag() {
        let mut reader = MemoryReader::new(vec![0u8; 2]);
        let mut mb = ModelBin::new(&mut reader);
        assert!(matches!(
            mb.load(1, WeightStorage::Tagged),
            Err(ModelError::TruncatedWeights { .. })
        ));
    }

    #[test]
    fn test_empty_record() {
        let mut reader = MemoryReader::new(Vec::<u8>::new());
        let mut mb = ModelBin::new(&mut reader);
        let t = mb.load(0, WeightStorage::Raw).unwrap();
        assert!(t.is_empty());
    }
}
