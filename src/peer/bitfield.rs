use bytes::Bytes;

/// A bitfield representing which pieces a peer has.
///
/// Each bit represents whether a piece is available (1) or not (0).
/// Bits are numbered from the high bit of the first byte. Spare bits past
/// the piece count are always zero.
///
/// Pieces can only be added. A neighbor's bitfield grows through
/// [`merge`](Self::merge) and [`set_piece`](Self::set_piece) over the
/// lifetime of its session and is never cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    piece_count: usize,
}

impl Bitfield {
    /// Creates a new empty bitfield for the given number of pieces.
    pub fn new(piece_count: usize) -> Self {
        let byte_count = piece_count.div_ceil(8);
        Self {
            bits: vec![0; byte_count],
            piece_count,
        }
    }

    /// Creates a bitfield from raw bytes.
    ///
    /// Missing trailing bytes are treated as zero, extra bytes and spare
    /// bits are dropped.
    pub fn from_bytes(bytes: &[u8], piece_count: usize) -> Self {
        let expected_bytes = piece_count.div_ceil(8);
        let mut bits = bytes[..bytes.len().min(expected_bytes)].to_vec();

        if bits.len() < expected_bytes {
            bits.resize(expected_bytes, 0);
        }

        let mut bf = Self { bits, piece_count };
        bf.clear_spare_bits();
        bf
    }

    /// Creates a full bitfield (all pieces available).
    pub fn full(piece_count: usize) -> Self {
        let byte_count = piece_count.div_ceil(8);
        let mut bf = Self {
            bits: vec![0xFF; byte_count],
            piece_count,
        };
        bf.clear_spare_bits();
        bf
    }

    /// Returns true if the piece at the given index is available.
    pub fn has_piece(&self, index: usize) -> bool {
        if index >= self.piece_count {
            return false;
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        (self.bits[byte_index] >> bit_index) & 1 == 1
    }

    /// Sets the bit for the piece at the given index.
    ///
    /// Returns `true` if the bit was newly set. Out-of-range indices are
    /// ignored.
    pub fn set_piece(&mut self, index: usize) -> bool {
        if index >= self.piece_count {
            return false;
        }
        let byte_index = index / 8;
        let mask = 1 << (7 - (index % 8));
        let was_set = self.bits[byte_index] & mask != 0;
        self.bits[byte_index] |= mask;
        !was_set
    }

    /// ORs another bitfield into this one.
    pub fn merge(&mut self, other: &Bitfield) {
        debug_assert_eq!(self.piece_count, other.piece_count);
        for (ours, theirs) in self.bits.iter_mut().zip(other.bits.iter()) {
            *ours |= *theirs;
        }
    }

    /// Returns the number of pieces that are available.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Returns true if all pieces are available.
    pub fn is_complete(&self) -> bool {
        self.count() == self.piece_count
    }

    /// Returns true if no pieces are available.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Returns the total number of pieces.
    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    /// Returns the raw bytes of the bitfield.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Converts the bitfield to owned bytes.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }

    /// Returns true if this bitfield has a piece that `ours` lacks.
    pub fn has_any_missing_from(&self, ours: &Bitfield) -> bool {
        self.bits
            .iter()
            .zip(ours.bits.iter())
            .any(|(theirs, ours)| theirs & !ours != 0)
    }

    /// Returns indices of pieces that this bitfield has but `ours` doesn't.
    pub fn missing_pieces(&self, ours: &Bitfield) -> Vec<usize> {
        (0..self.piece_count)
            .filter(|&i| self.has_piece(i) && !ours.has_piece(i))
            .collect()
    }

    /// Returns indices of all available pieces.
    pub fn available_pieces(&self) -> Vec<usize> {
        (0..self.piece_count)
            .filter(|&i| self.has_piece(i))
            .collect()
    }

    /// Clears any spare bits in the last byte that don't correspond to pieces.
    fn clear_spare_bits(&mut self) {
        let spare = (self.bits.len() * 8) - self.piece_count;
        if spare > 0 && spare < 8 && !self.bits.is_empty() {
            let mask = 0xFFu8 << spare;
            let last = self.bits.len() - 1;
            self.bits[last] &= mask;
        }
    }
}
