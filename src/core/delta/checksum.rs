/*!
 * Block checksums for delta detection
 *
 * - Adler-32 rolling checksum (weak, cheap to slide one byte at a time)
 * - BLAKE3 strong block hash (confirms weak matches)
 */

const ADLER_MOD: u32 = 65521;

/// Width of a strong block hash in bytes
pub const BLOCK_HASH_SIZE: usize = 32;

/// Strong hash of one block
pub type BlockHash = [u8; BLOCK_HASH_SIZE];

/// Rolling checksum using Adler-32 algorithm
///
/// This is a weak but fast checksum used for quick block comparisons.
/// The rolling property allows efficient incremental updates.
#[derive(Debug, Clone)]
pub struct RollingChecksum {
    a: u32,
    b: u32,
    window_size: usize,
}

impl RollingChecksum {
    /// Initialize checksum from a block of data
    pub fn from_data(data: &[u8]) -> Self {
        let mut checksum = Self {
            a: 1,
            b: 0,
            window_size: 0,
        };
        checksum.reset(data);
        checksum
    }

    /// Reset the checksum with new data
    pub fn reset(&mut self, data: &[u8]) {
        self.a = 1;
        self.b = 0;

        for &byte in data {
            self.a = (self.a + byte as u32) % ADLER_MOD;
            self.b = (self.b + self.a) % ADLER_MOD;
        }

        self.window_size = data.len();
    }

    /// Slide the window one byte: drop `old_byte`, append `new_byte`
    pub fn roll(&mut self, old_byte: u8, new_byte: u8) {
        let n = (self.window_size as u32) % ADLER_MOD;

        self.a = (self.a + ADLER_MOD - old_byte as u32) % ADLER_MOD;
        // The outgoing byte contributed to every partial sum in the window,
        // plus the leading +1 of the Adler offset.
        let outgoing = (n * old_byte as u32) % ADLER_MOD;
        self.b = (self.b + 2 * ADLER_MOD - 1 - outgoing) % ADLER_MOD;

        self.a = (self.a + new_byte as u32) % ADLER_MOD;
        self.b = (self.b + self.a) % ADLER_MOD;
    }

    /// Get the current checksum value
    pub fn checksum(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

/// Strong hash of a block
pub fn block_hash(data: &[u8]) -> BlockHash {
    *blake3::hash(data).as_bytes()
}

/// Weak checksum of a block
pub fn weak_checksum(data: &[u8]) -> u32 {
    RollingChecksum::from_data(data).checksum()
}
