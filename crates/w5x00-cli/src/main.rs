//! `w5x00`: command-line companion for the W5x00 socket driver.
//!
//! ```text
//! USAGE:
//!   w5x00 layout   --chip <variant> --sockets <n>          Register and ring map
//!   w5x00 encode   --chip <variant> read|write <addr> <len> SPI frame headers
//!   w5x00 selftest --chip <variant> --bytes <n>            Echo test on the simulated chip
//! ```

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::Ipv4Addr;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use w5x00_chip::frame::{w5100, w5200, w5500, Direction};
use w5x00_chip::regs::{self, sn};
use w5x00_driver::backends::{SoftwareBus, W5100, W5200, W5500};
use w5x00_driver::{
    Capabilities, ChipBackend, ChipVariant, DriverConfig, ManualClock, NetConfig, Received,
    SocketDriver, SocketMode,
};

#[derive(Parser)]
#[command(name = "w5x00", about = "WIZnet W5100/W5200/W5500 driver tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print socket register blocks and ring placement.
    Layout {
        /// Chip variant (w5100, w5200, w5500).
        #[arg(long, default_value = "w5500")]
        chip: ChipVariant,
        /// Sockets in use; decides the ring size.
        #[arg(long, default_value_t = 8)]
        sockets: u8,
    },
    /// Print the SPI frame headers for one register or ring access.
    Encode {
        /// Chip variant (w5100, w5200, w5500).
        #[arg(long, default_value = "w5500")]
        chip: ChipVariant,
        /// Sockets in use (W5500 block selection depends on the ring size).
        #[arg(long, default_value_t = 8)]
        sockets: u8,
        /// Transfer direction.
        direction: Dir,
        /// Start address, decimal or 0x-prefixed hex.
        #[arg(value_parser = parse_addr)]
        addr: u16,
        /// Bytes to transfer.
        #[arg(default_value_t = 1)]
        len: u16,
    },
    /// Open a TCP connection on the simulated chip and echo a payload through it.
    Selftest {
        /// Chip variant (w5100, w5200, w5500).
        #[arg(long, default_value = "w5500")]
        chip: ChipVariant,
        /// Sockets in use.
        #[arg(long, default_value_t = 1)]
        sockets: u8,
        /// Payload size.
        #[arg(long, default_value_t = 10_000)]
        bytes: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Dir {
    Read,
    Write,
}

impl From<Dir> for Direction {
    fn from(dir: Dir) -> Self {
        match dir {
            Dir::Read => Self::Read,
            Dir::Write => Self::Write,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Layout { chip, sockets } => cmd_layout(chip, sockets),
        Cmd::Encode {
            chip,
            sockets,
            direction,
            addr,
            len,
        } => cmd_encode(chip, sockets, direction.into(), addr, len),
        Cmd::Selftest {
            chip,
            sockets,
            bytes,
        } => cmd_selftest(chip, sockets, bytes),
    }
}

fn parse_addr(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn cmd_layout(chip: ChipVariant, sockets: u8) -> Result<()> {
    let caps = Capabilities::for_variant(chip, sockets);
    if caps.socket_count != sockets {
        println!("{chip} supports 1..={} sockets, using {}", chip.max_sockets(), caps.socket_count);
    }

    println!("Chip         : {chip}");
    println!("Sockets      : {}", caps.socket_count);
    println!("Ring size    : {} bytes ({} KiB)", caps.buffer_size, caps.buffer_size_kib());
    println!("Offset addr  : {}", if caps.offset_addressing { "yes" } else { "no" });
    if chip == ChipVariant::W5100 {
        println!("TMSR / RMSR  : {:#04x}", ChipVariant::w5100_size_map(caps.buffer_size));
    }
    println!("RTR / RCR    : {:#06x} / {:#06x}", chip.rtr(), chip.rcr());
    if let Some((addr, mask)) = chip.phy_link() {
        println!("Link bit     : {addr:#06x} & {mask:#04x}");
    }
    println!();

    println!("Socket  Registers  TX ring          RX ring");
    let base = chip.socket_register_base();
    for s in 0..caps.socket_count {
        let size = caps.buffer_size;
        let tx = chip.tx_region() + u16::from(s) * size;
        let rx = chip.rx_region() + u16::from(s) * size;
        println!(
            "{s:>6}  {:#06x}     {tx:#06x}-{:#06x}  {rx:#06x}-{:#06x}",
            regs::socket_register(base, s, sn::MR),
            tx + (size - 1),
            rx + (size - 1),
        );
    }
    Ok(())
}

fn cmd_encode(chip: ChipVariant, sockets: u8, dir: Direction, addr: u16, len: u16) -> Result<()> {
    ensure!(len > 0, "length must be at least one byte");
    ensure!(
        u32::from(addr) + u32::from(len) <= 0x1_0000,
        "{len} bytes from {addr:#06x} run past the address space"
    );
    let caps = Capabilities::for_variant(chip, sockets);
    debug!("encoding {dir:?} of {len} bytes at {addr:#06x} for {chip}");

    match chip {
        ChipVariant::W5100 => {
            for i in 0..len {
                let at = addr + i;
                println!("{at:#06x}  {}", hex(&w5100::header(dir, at)));
            }
        }
        ChipVariant::W5200 => {
            let mut at = addr;
            let mut left = usize::from(len);
            while left > 0 {
                let n = left.min(w5200::MAX_BURST);
                println!("{at:#06x}  {}  +{n} bytes", hex(&w5200::header(dir, at, n as u16)));
                at = at.wrapping_add(n as u16);
                left -= n;
            }
        }
        ChipVariant::W5500 => {
            let (block, field) = w5500::locate(addr, caps.buffer_size);
            println!(
                "{addr:#06x}  {}  {block:?} field {field:#06x}  +{len} bytes",
                hex(&w5500::header(dir, addr, caps.buffer_size)),
            );
        }
    }
    Ok(())
}

fn cmd_selftest(chip: ChipVariant, sockets: u8, bytes: usize) -> Result<()> {
    let bus = SoftwareBus::new(chip);
    match chip {
        ChipVariant::W5100 => echo(W5100::new(bus, sockets), W5100::bus_mut, bytes),
        ChipVariant::W5200 => echo(W5200::new(bus, sockets), W5200::bus_mut, bytes),
        ChipVariant::W5500 => echo(W5500::new(bus, sockets), W5500::bus_mut, bytes),
    }
}

/// Send `bytes` to a simulated echo peer and read them back.
fn echo<C: ChipBackend>(chip: C, sim: fn(&mut C) -> &mut SoftwareBus, bytes: usize) -> Result<()> {
    const PEER: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);

    let variant = chip.variant();
    let mut drv = SocketDriver::new(chip, ManualClock::default(), DriverConfig::default())
        .with_context(|| format!("initialising simulated {variant}"))?;
    drv.configure(&NetConfig::new([0x02, 0x00, 0x5E, 0x10, 0x00, 0x01], Ipv4Addr::new(192, 0, 2, 50)))?;

    let id = drv.begin(SocketMode::TCP, 0)?;
    ensure!(drv.is_valid(id), "no free socket");
    if !drv.connect(id, PEER, 7)? {
        bail!("{id}: connect to {PEER}:7 refused");
    }
    info!("{id}: connected from port {}", drv.local_port(id)?);

    let payload: Vec<u8> = (0..bytes).map(|i| (i % 251) as u8).collect();
    let mut echoed = Vec::with_capacity(bytes);
    let mut buf = vec![0u8; usize::from(drv.chip().capabilities().buffer_size)];
    let mut chunks = 0usize;
    let mut offset = 0;

    while offset < payload.len() {
        let sent = drv.send(id, &payload[offset..])?;
        if sent == 0 {
            bail!("{id}: send stalled after {offset} bytes");
        }
        let s = id.index();
        let wire = sim(drv.chip_mut()).sent(s)[offset..offset + sent].to_vec();
        sim(drv.chip_mut()).inject_rx(s, &wire);
        offset += sent;
        chunks += 1;

        while echoed.len() < offset {
            match drv.recv(id, &mut buf)? {
                Received::Data(n) => echoed.extend_from_slice(&buf[..n]),
                other => bail!("{id}: echo ended early ({other:?})"),
            }
        }
    }
    drv.stop(id)?;

    ensure!(echoed == payload, "echoed bytes differ from the payload");
    let stats = sim(drv.chip_mut());
    println!(
        "{variant}: {bytes} bytes echoed in {chunks} chunk(s), {} transactions, {} frames",
        stats.transactions(),
        stats.frames()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_and_decimal_addresses() {
        assert_eq!(parse_addr("0x1003"), Ok(0x1003));
        assert_eq!(parse_addr("4096"), Ok(4096));
        assert!(parse_addr("0xzz").is_err());
    }

    #[test]
    fn selftest_passes_on_every_variant() {
        for chip in ChipVariant::ALL {
            cmd_selftest(chip, 2, 5000).unwrap();
        }
    }

    #[test]
    fn encode_rejects_overflowing_range() {
        assert!(cmd_encode(ChipVariant::W5200, 8, Direction::Read, 0xFFFF, 2).is_err());
        assert!(cmd_encode(ChipVariant::W5500, 8, Direction::Write, 0x8000, 16).is_ok());
    }
}
