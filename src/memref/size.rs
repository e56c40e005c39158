//! Memory reference sizing (spec §3 Data Model, §4.A).

/// How a raw memory window is decoded into a number.
///
/// BCD-ness and float-ness are first-class sizes (spec §3 lists
/// "BCD variants" and "Float variants" directly in `size`'s domain),
/// separate from the operand-level `b`/`d`/`p`/`~` prefixes (§4.B
/// grammar) which select *which* cached value of a memref to read
/// (current, delta, prior, inverted) rather than how many bytes to
/// decode. A `b`-prefixed operand simply addresses the BCD-flavored
/// `MemSize` counterpart of the plain size the author wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemSize {
    Bit(u8), // 0..=7
    LowNibble,
    HighNibble,
    Byte,
    Word16LE,
    Word16BE,
    TriByteLE,
    TriByteBE,
    Word32LE,
    Word32BE,
    Bcd8,
    Bcd16LE,
    Bcd16BE,
    Bcd24LE,
    Bcd24BE,
    Bcd32LE,
    Bcd32BE,
    Float32LE,
    Float32BE,
    MBF32,
}

impl MemSize {
    /// Number of raw bytes the host `read_memory` callback must supply.
    pub fn byte_count(self) -> u32 {
        use MemSize::*;
        match self {
            Bit(_) | LowNibble | HighNibble | Byte | Bcd8 => 1,
            Word16LE | Word16BE | Bcd16LE | Bcd16BE => 2,
            TriByteLE | TriByteBE | Bcd24LE | Bcd24BE => 3,
            Word32LE | Word32BE | Bcd32LE | Bcd32BE | Float32LE | Float32BE | MBF32 => 4,
        }
    }

    /// Bit width used for wrapping arithmetic (delta, two's-complement
    /// overflow in the modified-memref graph, §4.C).
    pub fn bit_width(self) -> u32 {
        use MemSize::*;
        match self {
            Bit(_) => 1,
            LowNibble | HighNibble => 4,
            Byte | Bcd8 => 8,
            Word16LE | Word16BE | Bcd16LE | Bcd16BE => 16,
            TriByteLE | TriByteBE | Bcd24LE | Bcd24BE => 24,
            Word32LE | Word32BE | Bcd32LE | Bcd32BE | Float32LE | Float32BE | MBF32 => 32,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, MemSize::Float32LE | MemSize::Float32BE | MemSize::MBF32)
    }

    pub fn is_bcd(self) -> bool {
        matches!(
            self,
            MemSize::Bcd8
                | MemSize::Bcd16LE
                | MemSize::Bcd16BE
                | MemSize::Bcd24LE
                | MemSize::Bcd24BE
                | MemSize::Bcd32LE
                | MemSize::Bcd32BE
        )
    }

    /// The plain (non-BCD) size backing a BCD size, used when decoding:
    /// BCD reads the same bytes as its plain counterpart, then
    /// reinterprets each nibble.
    pub fn bcd_base(self) -> MemSize {
        use MemSize::*;
        match self {
            Bcd8 => Byte,
            Bcd16LE => Word16LE,
            Bcd16BE => Word16BE,
            Bcd24LE => TriByteLE,
            Bcd24BE => TriByteBE,
            Bcd32LE => Word32LE,
            Bcd32BE => Word32BE,
            other => other,
        }
    }

    /// Maps a grammar size-letter (spec §4.B) to a `MemSize`.
    /// `None` (no letter, bare `0x`) is the default 16-bit word.
    pub fn from_letter(letter: Option<char>) -> Option<MemSize> {
        use MemSize::*;
        Some(match letter {
            None | Some(' ') => Word16LE,
            Some('H') => Byte,
            Some('W') => TriByteLE,
            Some('X') => Word32LE,
            Some('M') => Bit(0),
            Some('N') => Bit(1),
            Some('O') => Bit(2),
            Some('P') => Bit(3),
            Some('Q') => Bit(4),
            Some('R') => Bit(5),
            Some('S') => Bit(6),
            Some('T') => Bit(7),
            Some('L') => LowNibble,
            Some('U') => HighNibble,
            Some('V') => Bcd16LE,
            Some('G') => Word32BE,
            Some('I') => Word16BE,
            Some('J') => TriByteBE,
            Some('K') => Bcd8,
            _ => return None,
        })
    }

    /// Inverse of [`from_letter`], used by the canonical re-serializer
    /// (spec §8 property 5, SPEC_FULL §11.5).
    pub fn to_letter(self) -> &'static str {
        use MemSize::*;
        match self {
            Word16LE => "",
            Byte => "H",
            TriByteLE => "W",
            Word32LE => "X",
            Bit(0) => "M",
            Bit(1) => "N",
            Bit(2) => "O",
            Bit(3) => "P",
            Bit(4) => "Q",
            Bit(5) => "R",
            Bit(6) => "S",
            Bit(7) => "T",
            Bit(_) => "M",
            LowNibble => "L",
            HighNibble => "U",
            Bcd16LE => "V",
            Word32BE => "G",
            Word16BE => "I",
            TriByteBE => "J",
            Bcd8 => "K",
            Bcd16BE | Bcd24LE | Bcd24BE | Bcd32LE | Bcd32BE | Float32LE | Float32BE | MBF32 => "X",
        }
    }
}
