use crc::{Algorithm, Crc, Digest};

/// zlib-compatible CRC-32, the stamp the bootloader verifies.
pub const CRC_32_ZLIB: Algorithm<u32> = crc::CRC_32_ISO_HDLC;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ZLIB);

/// Incremental stamp computation over a record's parts.
pub struct Hasher {
    digest: Digest<'static, u32>,
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            digest: CRC32.digest(),
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn checksum(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot checksum over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}
