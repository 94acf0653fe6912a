//! Shared harness: a driver over the software chip for each variant

#![allow(dead_code)]

use std::net::Ipv4Addr;
use tracing_subscriber::EnvFilter;
use w5x00_driver::backends::{SoftwareBus, W5100, W5200, W5500};
use w5x00_driver::{
    ChipBackend, ChipVariant, DriverConfig, ManualClock, SocketDriver, SocketId, SocketMode,
};

/// Peer used by the connection tests (TEST-NET-3)
pub const PEER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);

/// Backend running on the software chip
pub trait SimChip: ChipBackend + Sized {
    const VARIANT: ChipVariant;
    fn build(bus: SoftwareBus, sockets: u8) -> Self;
    fn sim(&self) -> &SoftwareBus;
    fn sim_mut(&mut self) -> &mut SoftwareBus;
}

macro_rules! impl_sim_chip {
    ($backend:ident, $variant:ident) => {
        impl SimChip for $backend<SoftwareBus> {
            const VARIANT: ChipVariant = ChipVariant::$variant;

            fn build(bus: SoftwareBus, sockets: u8) -> Self {
                $backend::new(bus, sockets)
            }

            fn sim(&self) -> &SoftwareBus {
                self.bus()
            }

            fn sim_mut(&mut self) -> &mut SoftwareBus {
                self.bus_mut()
            }
        }
    };
}

impl_sim_chip!(W5100, W5100);
impl_sim_chip!(W5200, W5200);
impl_sim_chip!(W5500, W5500);

pub type Driver<C> = SocketDriver<C, ManualClock>;

/// Driver with the variant's maximum socket count
pub fn driver<C: SimChip>() -> Driver<C> {
    driver_with::<C>(SoftwareBus::new(C::VARIANT), C::VARIANT.max_sockets(), DriverConfig::default())
}

/// Route driver logs to the test output; `RUST_LOG=w5x00_driver=trace` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Driver over a prepared bus
pub fn driver_with<C: SimChip>(bus: SoftwareBus, sockets: u8, config: DriverConfig) -> Driver<C> {
    init_tracing();
    SocketDriver::new(C::build(bus, sockets), ManualClock::default(), config)
        .expect("software chip initialises")
}

pub fn sim<C: SimChip>(drv: &Driver<C>) -> &SoftwareBus {
    drv.chip().sim()
}

pub fn sim_mut<C: SimChip>(drv: &mut Driver<C>) -> &mut SoftwareBus {
    drv.chip_mut().sim_mut()
}

/// Ring size the driver was built for
pub fn ring<C: SimChip>(drv: &Driver<C>) -> u16 {
    drv.chip().capabilities().buffer_size
}

/// Open a TCP socket and connect it to [`PEER`]:80
pub fn established<C: SimChip>(drv: &mut Driver<C>) -> SocketId {
    let id = drv.begin(SocketMode::TCP, 0).expect("begin");
    assert!(drv.is_valid(id), "no free socket");
    assert!(drv.connect(id, PEER, 80).expect("connect"), "connect refused");
    id
}

/// Deterministic payload of `len` bytes
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

/// Run each generic test body once per chip variant
macro_rules! for_each_variant {
    ($($name:ident),* $(,)?) => {
        $(
            mod $name {
                use w5x00_driver::backends::{SoftwareBus, W5100, W5200, W5500};

                #[test]
                fn w5100() {
                    super::$name::<W5100<SoftwareBus>>();
                }

                #[test]
                fn w5200() {
                    super::$name::<W5200<SoftwareBus>>();
                }

                #[test]
                fn w5500() {
                    super::$name::<W5500<SoftwareBus>>();
                }
            }
        )*
    };
}
