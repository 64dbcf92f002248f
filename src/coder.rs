//! Binary arithmetic coder: a range coder over a 32-bit
//! interval, driven one bit at a time by a caller-supplied 16-bit
//! probability (typically [`crate::predictor::PredictorBank::predict`]).

use std::io::{self, Read, Write};

use crate::error::IntegrityError;

/// Encodes bits into a byte sink, flushing whole bytes as the `[low,
/// high]` interval narrows.
pub struct Encoder<W: Write> {
    low: u32,
    high: u32,
    out: W,
    bytes_written: u64,
}

impl<W: Write> Encoder<W> {
    pub fn new(out: W) -> Self {
        Self { low: 1, high: 0xFFFF_FFFF, out, bytes_written: 0 }
    }

    /// Encode one bit at probability `p` (16-bit, P(bit == 1)).
    pub fn encode(&mut self, bit: u8, p: u16) -> io::Result<()> {
        let range = (self.high - self.low) as u64;
        let p = p as u64;
        let mid = self.low + ((range >> 16) * p) as u32 + (((range & 0xFFFF) * p) >> 16) as u32;
        debug_assert!(mid >= self.low && mid < self.high);
        if bit == 1 {
            self.high = mid;
        } else {
            self.low = mid + 1;
        }
        while (self.low ^ self.high) & 0xFF00_0000 == 0 {
            self.out.write_all(&[(self.high >> 24) as u8])?;
            self.bytes_written += 1;
            self.low <<= 8;
            self.high = (self.high << 8) | 0xFF;
        }
        Ok(())
    }

    /// Flush the remaining interval so the decoder can recover every
    /// coded bit; a trailing carry byte (`low += (low == 0)`) avoids
    /// emitting a run of four zero bytes that would alias with archive
    /// tag scanning.
    pub fn finish(mut self) -> io::Result<W> {
        if self.low == 0 {
            self.low = 1;
        }
        self.out.write_all(&self.low.to_be_bytes())?;
        self.bytes_written += 4;
        Ok(self.out)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Decodes bits from a byte source driven by the same sequence of
/// probabilities the encoder used.
pub struct Decoder<R: Read> {
    low: u32,
    high: u32,
    curr: u32,
    inp: R,
    byte_offset: u64,
}

impl<R: Read> Decoder<R> {
    pub fn new(mut inp: R) -> io::Result<Self> {
        let mut buf = [0u8; 4];
        inp.read_exact(&mut buf)?;
        Ok(Self {
            low: 1,
            high: 0xFFFF_FFFF,
            curr: u32::from_be_bytes(buf),
            inp,
            byte_offset: 4,
        })
    }

    /// Decode one bit at probability `p`, the same the encoder used at
    /// this position.
    pub fn decode(&mut self, p: u16) -> Result<u8, IntegrityError> {
        let range = (self.high - self.low) as u64;
        let p = p as u64;
        let mid = self.low + ((range >> 16) * p) as u32 + (((range & 0xFFFF) * p) >> 16) as u32;
        if self.curr < self.low || self.curr > self.high {
            return Err(IntegrityError::CoderOutOfRange(self.byte_offset));
        }
        let bit = if self.curr <= mid {
            self.high = mid;
            1
        } else {
            self.low = mid + 1;
            0
        };
        while (self.low ^ self.high) & 0xFF00_0000 == 0 {
            self.low <<= 8;
            self.high = (self.high << 8) | 0xFF;
            let mut b = [0u8; 1];
            let n = self.inp.read(&mut b).map_err(|_| IntegrityError::CoderOutOfRange(self.byte_offset))?;
            self.curr = (self.curr << 8) | (if n == 1 { b[0] as u32 } else { 0xFF });
            self.byte_offset += 1;
        }
        Ok(bit)
    }

    pub fn into_inner(self) -> R {
        self.inp
    }
}
