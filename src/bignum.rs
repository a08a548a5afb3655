//! Fixed-capacity unsigned integers for RSA.
//!
//! [`BigUint`] holds up to [`MAX_BITS`] bits in little-endian 32-bit words.
//! Every operation that could produce a wider value reports
//! [`BignumError::CapacityExceeded`] instead of dropping the high words.
//! Products inside [`BigUint::mod_mul`] use a double-width scratch array so
//! residues of a 4096-bit modulus never overflow.
//!
//! None of this is constant time.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Number of 32-bit words in a [`BigUint`].
pub const MAX_WORDS: usize = 128;

/// Largest representable bit length.
pub const MAX_BITS: usize = MAX_WORDS * 32;

const WIDE_WORDS: usize = MAX_WORDS * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BignumError {
    #[error("Result needs {needed} words, capacity is {}", MAX_WORDS)]
    CapacityExceeded { needed: usize },

    #[error("Output needs {needed} bytes, only {available} available")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Subtraction underflow")]
    Underflow,

    #[error("Division by zero")]
    DivisionByZero,
}

/// Unsigned integer of at most [`MAX_BITS`] bits.
///
/// Words above `size` are always zero, and the word at `size - 1` is
/// never zero.
#[derive(Clone, Copy)]
pub struct BigUint {
    words: [u32; MAX_WORDS],
    size: usize,
}

impl BigUint {
    pub const fn zero() -> Self {
        BigUint {
            words: [0; MAX_WORDS],
            size: 0,
        }
    }

    pub fn one() -> Self {
        Self::from_u32(1)
    }

    pub fn from_u32(value: u32) -> Self {
        let mut r = Self::zero();
        r.words[0] = value;
        r.size = usize::from(value != 0);
        r
    }

    fn from_words(words: &[u32]) -> Result<Self, BignumError> {
        let len = significant(words);
        if len > MAX_WORDS {
            return Err(BignumError::CapacityExceeded { needed: len });
        }
        let mut r = Self::zero();
        r.words[..len].copy_from_slice(&words[..len]);
        r.size = len;
        Ok(r)
    }

    /// Parse a big-endian byte string. Leading zero bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BignumError> {
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        let bytes = &bytes[start..];

        let needed = bytes.len().div_ceil(4);
        if needed > MAX_WORDS {
            return Err(BignumError::CapacityExceeded { needed });
        }

        let mut r = Self::zero();
        for (i, &b) in bytes.iter().rev().enumerate() {
            r.words[i / 4] |= (b as u32) << ((i % 4) * 8);
        }
        // The first remaining byte is non-zero, so is the top word.
        r.size = needed;
        Ok(r)
    }

    /// Write the value big-endian into `out`, zero padded on the left.
    pub fn write_bytes(&self, out: &mut [u8]) -> Result<(), BignumError> {
        let needed = self.bit_len().div_ceil(8);
        if needed > out.len() {
            return Err(BignumError::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }

        out.fill(0);
        let n = out.len();
        for i in 0..needed {
            out[n - 1 - i] = (self.words[i / 4] >> ((i % 4) * 8)) as u8;
        }
        Ok(())
    }

    /// Serialize to exactly `len` big-endian bytes.
    pub fn to_bytes(&self, len: usize) -> Result<Vec<u8>, BignumError> {
        let mut out = vec![0; len];
        self.write_bytes(&mut out)?;
        Ok(out)
    }

    pub fn is_zero(&self) -> bool {
        self.size == 0
    }

    /// Number of significant words.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..self.size]
    }

    pub fn bit_len(&self) -> usize {
        bit_len(self.words())
    }

    /// Test bit `i`, counting from the least significant bit.
    pub fn bit(&self, i: usize) -> bool {
        let w = i / 32;
        w < self.size && (self.words[w] >> (i % 32)) & 1 == 1
    }

    pub fn add(&self, other: &Self) -> Result<Self, BignumError> {
        let n = self.size.max(other.size);
        let mut out = [0u32; MAX_WORDS + 1];
        let mut carry = 0u64;
        for i in 0..n {
            let sum = self.words[i] as u64 + other.words[i] as u64 + carry;
            out[i] = sum as u32;
            carry = sum >> 32;
        }
        out[n] = carry as u32;
        Self::from_words(&out[..=n])
    }

    /// `self - other`, defined only for `self >= other`.
    pub fn sub(&self, other: &Self) -> Result<Self, BignumError> {
        if self < other {
            return Err(BignumError::Underflow);
        }
        let mut r = *self;
        sub_assign(&mut r.words[..self.size], other.words());
        r.size = significant(&r.words[..self.size]);
        Ok(r)
    }

    pub fn mul(&self, other: &Self) -> Result<Self, BignumError> {
        let mut wide = [0u32; WIDE_WORDS];
        let len = mul_into(self.words(), other.words(), &mut wide);
        Self::from_words(&wide[..len])
    }

    pub fn shl(&self, bits: usize) -> Result<Self, BignumError> {
        if self.is_zero() {
            return Ok(*self);
        }
        let needed = (self.bit_len() + bits).div_ceil(32);
        if needed > MAX_WORDS {
            return Err(BignumError::CapacityExceeded { needed });
        }
        let mut r = Self::zero();
        shl_into(self.words(), bits, &mut r.words[..needed]);
        r.size = needed;
        Ok(r)
    }

    pub fn shr(&self, bits: usize) -> Self {
        let word_shift = bits / 32;
        let bit_shift = bits % 32;
        if word_shift >= self.size {
            return Self::zero();
        }

        let mut r = Self::zero();
        let n = self.size - word_shift;
        for i in 0..n {
            let lo = self.words[i + word_shift] >> bit_shift;
            let hi = if bit_shift > 0 && i + word_shift + 1 < self.size {
                self.words[i + word_shift + 1] << (32 - bit_shift)
            } else {
                0
            };
            r.words[i] = lo | hi;
        }
        r.size = significant(&r.words[..n]);
        r
    }

    /// `self mod m` by shift-and-subtract long division.
    pub fn rem(&self, m: &Self) -> Result<Self, BignumError> {
        if m.is_zero() {
            return Err(BignumError::DivisionByZero);
        }
        let mut work = self.words;
        rem_in_place(&mut work[..self.size], m.words());
        Self::from_words(&work[..self.size])
    }

    /// `(self * other) mod m`.
    pub fn mod_mul(&self, other: &Self, m: &Self) -> Result<Self, BignumError> {
        if m.is_zero() {
            return Err(BignumError::DivisionByZero);
        }
        let mut wide = [0u32; WIDE_WORDS];
        let len = mul_into(self.words(), other.words(), &mut wide);
        rem_in_place(&mut wide[..len], m.words());
        Self::from_words(&wide[..len])
    }

    /// `self^exp mod m`, right-to-left square-and-multiply.
    pub fn mod_pow(&self, exp: &Self, m: &Self) -> Result<Self, BignumError> {
        if m.is_zero() {
            return Err(BignumError::DivisionByZero);
        }

        // 1 mod m, which is 0 when m == 1.
        let mut result = Self::one().rem(m)?;
        let mut base = self.rem(m)?;

        for i in 0..exp.bit_len() {
            if exp.bit(i) {
                result = result.mod_mul(&base, m)?;
            }
            base = base.mod_mul(&base, m)?;
        }

        Ok(result)
    }
}

impl Default for BigUint {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialEq for BigUint {
    fn eq(&self, other: &Self) -> bool {
        self.words() == other.words()
    }
}

impl Eq for BigUint {}

impl PartialOrd for BigUint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BigUint {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_words(self.words(), other.words())
    }
}

impl fmt::Debug for BigUint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BigUint(0x")?;
        if self.is_zero() {
            write!(f, "0")?;
        }
        for (i, w) in self.words().iter().rev().enumerate() {
            if i == 0 {
                write!(f, "{:x}", w)?;
            } else {
                write!(f, "{:08x}", w)?;
            }
        }
        write!(f, ")")
    }
}

fn significant(words: &[u32]) -> usize {
    words.iter().rposition(|&w| w != 0).map(|i| i + 1).unwrap_or(0)
}

fn bit_len(words: &[u32]) -> usize {
    let len = significant(words);
    if len == 0 {
        return 0;
    }
    len * 32 - words[len - 1].leading_zeros() as usize
}

fn cmp_words(a: &[u32], b: &[u32]) -> Ordering {
    let la = significant(a);
    let lb = significant(b);
    if la != lb {
        return la.cmp(&lb);
    }
    for i in (0..la).rev() {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            o => return o,
        }
    }
    Ordering::Equal
}

// Caller guarantees a >= b numerically.
fn sub_assign(a: &mut [u32], b: &[u32]) {
    let mut borrow = 0u64;
    for (i, word) in a.iter_mut().enumerate() {
        let bi = b.get(i).copied().unwrap_or(0) as u64;
        let (d, under) = (*word as u64).overflowing_sub(bi + borrow);
        *word = d as u32;
        borrow = under as u64;
    }
}

// out must hold a.len() + b.len() words. Returns that length.
fn mul_into(a: &[u32], b: &[u32], out: &mut [u32]) -> usize {
    let len = a.len() + b.len();
    out[..len].fill(0);
    for (i, &ai) in a.iter().enumerate() {
        let mut carry = 0u64;
        for (j, &bj) in b.iter().enumerate() {
            let t = out[i + j] as u64 + ai as u64 * bj as u64 + carry;
            out[i + j] = t as u32;
            carry = t >> 32;
        }
        out[i + b.len()] = carry as u32;
    }
    len
}

fn shl_into(src: &[u32], bits: usize, dst: &mut [u32]) {
    let word_shift = bits / 32;
    let bit_shift = bits % 32;
    dst.fill(0);
    for (i, &w) in src.iter().enumerate() {
        let idx = i + word_shift;
        if idx < dst.len() {
            dst[idx] |= w << bit_shift;
        }
        if bit_shift > 0 && idx + 1 < dst.len() {
            dst[idx + 1] |= w >> (32 - bit_shift);
        }
    }
}

fn shr1(words: &mut [u32]) {
    let n = words.len();
    for i in 0..n {
        let hi = if i + 1 < n { words[i + 1] << 31 } else { 0 };
        words[i] = (words[i] >> 1) | hi;
    }
}

// rem <- rem mod divisor. rem.len() is at most WIDE_WORDS.
fn rem_in_place(rem: &mut [u32], divisor: &[u32]) {
    let d_bits = bit_len(divisor);
    let r_bits = bit_len(rem);
    if r_bits < d_bits {
        return;
    }

    let shift = r_bits - d_bits;
    let mut scratch = [0u32; WIDE_WORDS];
    let shifted = &mut scratch[..rem.len()];
    shl_into(divisor, shift, shifted);

    for _ in 0..=shift {
        if cmp_words(rem, shifted) != Ordering::Less {
            sub_assign(rem, shifted);
        }
        shr1(shifted);
    }
}
