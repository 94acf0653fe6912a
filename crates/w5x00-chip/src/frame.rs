//! SPI frame headers.
//!
//! Each chip family frames an addressed access differently:
//!
//! ```text
//! W5100  [op, addr_hi, addr_lo] + 1 data byte        op = 0xF0 write, 0x0F read
//! W5200  [addr_hi, addr_lo, rw|len_hi, len_lo] + N   rw = 0x80 write
//! W5500  [addr_hi, addr_lo, bsb<<3 | rwb | om] + N   rwb = 0x04 write, om = 00
//! ```
//!
//! The W5500 has no flat address map. Its block-select field picks the
//! common block, a socket register block, or a socket's TX/RX ring, and the
//! 16-bit address is an offset inside that block. Ring offsets wrap inside
//! the ring in silicon, which is what "offset addressing" means.

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host reads from the chip.
    Read,
    /// Host writes to the chip.
    Write,
}

/// W5100 framing: one frame per byte.
pub mod w5100 {
    use super::Direction;

    /// Opcode for a write frame.
    pub const OP_WRITE: u8 = 0xF0;
    /// Opcode for a read frame.
    pub const OP_READ: u8 = 0x0F;

    /// Header for a single-byte access at `addr`.
    #[must_use]
    pub const fn header(dir: Direction, addr: u16) -> [u8; 3] {
        let op = match dir {
            Direction::Read => OP_READ,
            Direction::Write => OP_WRITE,
        };
        let [hi, lo] = addr.to_be_bytes();
        [op, hi, lo]
    }

    /// Decode a header; `None` for an unknown opcode.
    #[must_use]
    pub const fn decode(header: [u8; 3]) -> Option<(Direction, u16)> {
        let addr = u16::from_be_bytes([header[1], header[2]]);
        match header[0] {
            OP_WRITE => Some((Direction::Write, addr)),
            OP_READ => Some((Direction::Read, addr)),
            _ => None,
        }
    }
}

/// W5200 framing: 4-byte header carrying a 15-bit length.
pub mod w5200 {
    use super::Direction;

    /// Largest payload one frame can carry.
    pub const MAX_BURST: usize = 0x7FFF;

    const WRITE_FLAG: u8 = 0x80;

    /// Header for a `len`-byte burst at `addr`. `len` is truncated to 15 bits.
    #[must_use]
    pub const fn header(dir: Direction, addr: u16, len: u16) -> [u8; 4] {
        let [hi, lo] = addr.to_be_bytes();
        let [len_hi, len_lo] = len.to_be_bytes();
        let len_hi = match dir {
            Direction::Read => len_hi & 0x7F,
            Direction::Write => (len_hi & 0x7F) | WRITE_FLAG,
        };
        [hi, lo, len_hi, len_lo]
    }

    /// Decode a header into direction, address and length.
    #[must_use]
    pub const fn decode(header: [u8; 4]) -> (Direction, u16, u16) {
        let addr = u16::from_be_bytes([header[0], header[1]]);
        let len = u16::from_be_bytes([header[2] & 0x7F, header[3]]);
        let dir = if header[2] & WRITE_FLAG == 0 {
            Direction::Read
        } else {
            Direction::Write
        };
        (dir, addr, len)
    }
}

/// W5500 framing: 3-byte header with a block-select control byte.
pub mod w5500 {
    use super::Direction;

    /// Logical base of socket register blocks used by the driver.
    pub const SOCKET_REGS: u16 = 0x1000;
    /// Logical base of the TX rings.
    pub const TX_RINGS: u16 = 0x8000;
    /// Logical base of the RX rings.
    pub const RX_RINGS: u16 = 0xC000;

    const RWB_WRITE: u8 = 0x04;

    /// Block addressed by a frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Block {
        /// Common registers.
        Common,
        /// Register block of a socket.
        Socket(u8),
        /// TX ring of a socket.
        Tx(u8),
        /// RX ring of a socket.
        Rx(u8),
    }

    impl Block {
        /// Block-select code.
        #[must_use]
        pub const fn bsb(self) -> u8 {
            match self {
                Self::Common => 0,
                Self::Socket(s) => (s << 2) | 1,
                Self::Tx(s) => (s << 2) | 2,
                Self::Rx(s) => (s << 2) | 3,
            }
        }
    }

    /// Map a logical driver address to a block and the 16-bit address field.
    ///
    /// Ring addresses keep their full value; the chip only uses the bits
    /// below the ring size.
    #[must_use]
    pub const fn locate(addr: u16, buffer_size: u16) -> (Block, u16) {
        if addr < SOCKET_REGS {
            (Block::Common, addr)
        } else if addr < TX_RINGS {
            let socket = ((addr - SOCKET_REGS) >> 8) as u8;
            (Block::Socket(socket), addr & 0x00FF)
        } else if addr < RX_RINGS {
            let socket = ((addr - TX_RINGS) / buffer_size) as u8;
            (Block::Tx(socket), addr)
        } else {
            let socket = ((addr - RX_RINGS) / buffer_size) as u8;
            (Block::Rx(socket), addr)
        }
    }

    /// Header for an access at logical address `addr`.
    #[must_use]
    pub const fn header(dir: Direction, addr: u16, buffer_size: u16) -> [u8; 3] {
        let (block, field) = locate(addr, buffer_size);
        let rwb = match dir {
            Direction::Read => 0,
            Direction::Write => RWB_WRITE,
        };
        let [hi, lo] = field.to_be_bytes();
        [hi, lo, (block.bsb() << 3) | rwb]
    }

    /// Decode a header; `None` for a reserved block-select code.
    #[must_use]
    pub const fn decode(header: [u8; 3]) -> Option<(Direction, Block, u16)> {
        let field = u16::from_be_bytes([header[0], header[1]]);
        let dir = if header[2] & RWB_WRITE == 0 {
            Direction::Read
        } else {
            Direction::Write
        };
        let bsb = header[2] >> 3;
        let socket = bsb >> 2;
        let block = match (bsb & 3, socket) {
            (0, 0) => Block::Common,
            (1, s) => Block::Socket(s),
            (2, s) => Block::Tx(s),
            (3, s) => Block::Rx(s),
            _ => return None,
        };
        Some((dir, block, field))
    }
}
