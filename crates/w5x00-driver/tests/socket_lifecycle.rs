//! Integration tests for socket allocation and connection lifecycle
//!
//! Every test body runs against all three chip variants through the
//! software chip.

#[macro_use]
mod common;

use common::*;
use std::cell::Cell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;
use w5x00_driver::backends::{Presence, SoftwareBus, W5100, W5500};
use w5x00_driver::{
    ChipBackend, ChipVariant, Clock, DriverConfig, LinkStatus, ManualClock, Payload, Received,
    SocketCommand, SocketDriver, SocketId, SocketMode, SocketStatus, SpiBus, W5x00Error,
    EPHEMERAL_START,
};

for_each_variant!(
    test_close_then_status_is_closed,
    test_allocation_exhaustion_returns_sentinel,
    test_lingering_socket_is_reclaimed,
    test_connect_established_after_three_polls,
    test_connect_timeout_leaves_socket_closed,
    test_connect_refused_by_peer,
    test_connect_rejects_unusable_addresses,
    test_listen_only_from_init,
    test_stop_waits_for_graceful_close,
    test_stop_forces_close_after_timeout,
    test_connected_while_unread_data_remains,
    test_ephemeral_ports_are_dynamic,
    test_multicast_programs_group_mac,
    test_multicast_ephemeral_port_keeps_zero_destination,
    test_sentinel_is_a_no_op,
);

fn test_close_then_status_is_closed<C: SimChip>() {
    let mut drv = driver::<C>();
    let ids: Vec<_> = (0..drv.socket_count())
        .map(|_| drv.begin(SocketMode::TCP, 0).expect("begin"))
        .collect();
    for &id in &ids {
        assert!(drv.is_valid(id));
        assert_eq!(drv.status(id).unwrap(), SocketStatus::Init);
    }
    for &id in &ids {
        drv.close(id).unwrap();
        assert_eq!(drv.status(id).unwrap(), SocketStatus::Closed, "{id}");
    }
}

fn test_allocation_exhaustion_returns_sentinel<C: SimChip>() {
    let mut drv = driver::<C>();
    let count = drv.socket_count();
    for expected in 0..count {
        let id = drv.begin(SocketMode::TCP, 0).unwrap();
        assert_eq!(id.index(), expected);
    }
    let none = drv.begin(SocketMode::TCP, 0).unwrap();
    assert_eq!(none, drv.unallocated());
    assert_eq!(none.index(), count);
    assert!(!drv.is_valid(none));
}

fn test_lingering_socket_is_reclaimed<C: SimChip>() {
    let mut drv = driver::<C>();
    for _ in 0..drv.socket_count() {
        drv.begin(SocketMode::TCP, 0).unwrap();
    }
    sim_mut(&mut drv).set_status(1, SocketStatus::TimeWait);

    let id = drv.begin(SocketMode::UDP, 4000).unwrap();
    assert_eq!(id.index(), 1);
    assert_eq!(
        sim(&drv).commands(1),
        &[SocketCommand::Open, SocketCommand::Close, SocketCommand::Open]
    );
    assert_eq!(sim(&drv).status(1), SocketStatus::Udp);
    assert_eq!(drv.local_port(id).unwrap(), 4000);
}

fn test_connect_established_after_three_polls<C: SimChip>() {
    let mut drv = driver::<C>();
    let id = drv.begin(SocketMode::TCP, 0).unwrap();
    assert_eq!(id.index(), 0);
    sim_mut(&mut drv).set_connect_after(0, Some(3));

    let before = drv.clock_mut().now();
    assert!(drv.connect(id, PEER, 80).unwrap());
    // two polls saw SYNSENT, each followed by a 1 ms wait
    assert_eq!(drv.clock_mut().since(before), Duration::from_millis(2));
    assert_eq!(sim(&drv).destination(0), (PEER, 80));
    assert_eq!(drv.remote_ip(id).unwrap(), PEER);
    assert_eq!(drv.remote_port(id).unwrap(), 80);
    assert!(drv.connected(id).unwrap());
}

fn test_connect_timeout_leaves_socket_closed<C: SimChip>() {
    let mut drv = driver::<C>();
    let id = drv.begin(SocketMode::TCP, 0).unwrap();
    sim_mut(&mut drv).set_connect_after(id.index(), None);

    let before = drv.clock_mut().now();
    let ok = drv
        .connect_timeout(id, PEER, 443, Duration::from_millis(50))
        .unwrap();
    assert!(!ok);
    assert!(drv.clock_mut().since(before) >= Duration::from_millis(50));
    assert_eq!(drv.status(id).unwrap(), SocketStatus::Closed);
    assert_eq!(sim(&drv).commands(0).last(), Some(&SocketCommand::Close));
}

fn test_connect_refused_by_peer<C: SimChip>() {
    let mut drv = driver::<C>();
    let id = drv.begin(SocketMode::TCP, 0).unwrap();
    sim_mut(&mut drv).set_connect_after(0, None);
    // RST from the peer drops the socket straight to CLOSED
    sim_mut(&mut drv).set_status(0, SocketStatus::Closed);
    assert!(!drv.connect(id, PEER, 80).unwrap());
}

fn test_connect_rejects_unusable_addresses<C: SimChip>() {
    let mut drv = driver::<C>();
    let id = drv.begin(SocketMode::TCP, 0).unwrap();
    assert!(!drv.connect(id, Ipv4Addr::UNSPECIFIED, 80).unwrap());
    assert!(!drv.connect(id, Ipv4Addr::BROADCAST, 80).unwrap());
    assert_eq!(sim(&drv).commands(0), &[SocketCommand::Open]);
    assert_eq!(drv.status(id).unwrap(), SocketStatus::Init);
}

fn test_listen_only_from_init<C: SimChip>() {
    let mut drv = driver::<C>();
    let udp = drv.begin(SocketMode::UDP, 0).unwrap();
    assert!(!drv.listen(udp).unwrap());

    let tcp = drv.begin(SocketMode::TCP, 8080).unwrap();
    assert!(drv.listen(tcp).unwrap());
    assert_eq!(drv.status(tcp).unwrap(), SocketStatus::Listen);
    assert!(!drv.connected(tcp).unwrap());
    assert!(!drv.listen(tcp).unwrap());

    let client = Ipv4Addr::new(198, 51, 100, 9);
    sim_mut(&mut drv).accept(tcp.index(), client, 51000);
    assert!(drv.connected(tcp).unwrap());
    assert_eq!(drv.remote_ip(tcp).unwrap(), client);
    assert_eq!(drv.remote_port(tcp).unwrap(), 51000);
}

fn test_stop_waits_for_graceful_close<C: SimChip>() {
    let mut drv = driver::<C>();
    let id = established(&mut drv);
    sim_mut(&mut drv).set_close_after(id.index(), Some(3));

    drv.stop(id).unwrap();
    assert_eq!(drv.status(id).unwrap(), SocketStatus::Closed);
    assert_eq!(
        sim(&drv).commands(id.index()),
        &[SocketCommand::Open, SocketCommand::Connect, SocketCommand::Disconnect]
    );
}

fn test_stop_forces_close_after_timeout<C: SimChip>() {
    let mut drv = driver::<C>();
    let id = established(&mut drv);
    sim_mut(&mut drv).set_close_after(id.index(), None);

    let before = drv.clock_mut().now();
    drv.stop_timeout(id, Duration::from_millis(20)).unwrap();
    assert!(drv.clock_mut().since(before) >= Duration::from_millis(20));
    assert_eq!(drv.status(id).unwrap(), SocketStatus::Closed);
    assert_eq!(sim(&drv).commands(id.index()).last(), Some(&SocketCommand::Close));
}

fn test_connected_while_unread_data_remains<C: SimChip>() {
    let mut drv = driver::<C>();
    let id = established(&mut drv);
    sim_mut(&mut drv).inject_rx(id.index(), b"bye");
    sim_mut(&mut drv).peer_close(id.index());

    assert_eq!(drv.status(id).unwrap(), SocketStatus::CloseWait);
    assert!(drv.connected(id).unwrap());

    let mut buf = [0u8; 8];
    assert_eq!(drv.recv(id, &mut buf).unwrap(), Received::Data(3));
    assert_eq!(&buf[..3], b"bye");
    assert!(!drv.connected(id).unwrap());
    assert_eq!(drv.recv(id, &mut buf).unwrap(), Received::Closed);
}

fn test_ephemeral_ports_are_dynamic<C: SimChip>() {
    let mut drv = driver::<C>();
    let a = drv.begin(SocketMode::TCP, 0).unwrap();
    let b = drv.begin(SocketMode::TCP, 0).unwrap();
    let pa = drv.local_port(a).unwrap();
    let pb = drv.local_port(b).unwrap();
    assert!(pa >= EPHEMERAL_START);
    assert!(pb >= EPHEMERAL_START);
    assert_ne!(pa, pb);
    assert_eq!(drv.ports().last(), pb);

    let fixed = drv.begin(SocketMode::TCP, 80).unwrap();
    assert_eq!(drv.local_port(fixed).unwrap(), 80);
    assert_eq!(drv.ports().last(), pb);
}

fn test_multicast_programs_group_mac<C: SimChip>() {
    let mut drv = driver::<C>();
    let group = Ipv4Addr::new(239, 129, 2, 3);
    let id = drv.begin_multicast(SocketMode::UDP, group, 5353).unwrap();
    let bus = sim(&drv);
    let s = id.index();
    assert_eq!(bus.destination_mac(s), [0x01, 0x00, 0x5E, 0x01, 0x02, 0x03]);
    assert_eq!(bus.destination(s), (group, 5353));
    assert_eq!(bus.local_port(s), 5353);
    assert_ne!(bus.socket_mode(s).raw() & SocketMode::MULTICAST, 0);
    assert_eq!(bus.socket_mode(s).protocol(), SocketMode::UDP.raw());
    assert_eq!(bus.status(s), SocketStatus::Udp);
}

fn test_multicast_ephemeral_port_keeps_zero_destination<C: SimChip>() {
    let mut drv = driver::<C>();
    let group = Ipv4Addr::new(224, 0, 0, 251);
    let id = drv.begin_multicast(SocketMode::UDP, group, 0).unwrap();
    let bus = sim(&drv);
    let s = id.index();
    assert_eq!(bus.destination(s), (group, 0));
    assert!(bus.local_port(s) >= EPHEMERAL_START, "local port {}", bus.local_port(s));
    assert_eq!(bus.destination_mac(s), [0x01, 0x00, 0x5E, 0x00, 0x00, 0xFB]);
}

fn test_sentinel_is_a_no_op<C: SimChip>() {
    let mut drv = driver::<C>();
    let none = drv.unallocated();
    let mut buf = [0u8; 4];

    assert_eq!(drv.status(none).unwrap(), SocketStatus::Closed);
    drv.close(none).unwrap();
    drv.disconnect(none).unwrap();
    drv.stop(none).unwrap();
    assert!(!drv.listen(none).unwrap());
    assert!(!drv.connect(none, PEER, 80).unwrap());
    assert!(!drv.connected(none).unwrap());
    assert_eq!(drv.send(none, b"x").unwrap(), 0);
    assert_eq!(drv.send_available(none).unwrap(), 0);
    assert_eq!(drv.buffer_data(none, 0, b"x").unwrap(), 0);
    assert_eq!(drv.recv(none, &mut buf).unwrap(), Received::Closed);
    assert_eq!(drv.discard(none, 4).unwrap(), Received::Closed);
    assert_eq!(drv.recv_available(none).unwrap(), 0);
    assert_eq!(drv.peek(none).unwrap(), 0);
    assert!(!drv.start_udp(none, PEER, 53).unwrap());
    assert!(!drv.send_udp(none).unwrap());
    assert_eq!(drv.local_port(none).unwrap(), 0);
    assert_eq!(drv.remote_ip(none).unwrap(), Ipv4Addr::UNSPECIFIED);
    assert_eq!(drv.remote_port(none).unwrap(), 0);
    assert!(!drv.is_same_slot(none, none));
    assert!(drv.slot(none).is_none());

    for s in 0..drv.socket_count() {
        assert!(sim(&drv).commands(s).is_empty(), "socket {s} was touched");
    }

    let a = drv.begin(SocketMode::TCP, 0).unwrap();
    let b = drv.begin(SocketMode::TCP, 0).unwrap();
    assert!(drv.is_same_slot(a, a));
    assert!(drv.is_same_slot(a, SocketId::new(a.index())));
    assert!(!drv.is_same_slot(a, b));
    assert!(!drv.is_same_slot(a, none));
}

// ── Variant-specific ────────────────────────────────────────────────────────

#[test]
fn test_absent_chip_fails_init() {
    let bus = SoftwareBus::new(ChipVariant::W5500).with_presence(Presence::Absent);
    let err = SocketDriver::new(W5500::new(bus, 8), ManualClock::default(), DriverConfig::default())
        .err()
        .expect("absent chip must not initialise");
    assert!(matches!(err, W5x00Error::ChipNotPresent { .. }), "{err}");
}

#[test]
fn test_stuck_chip_reports_busy() {
    let bus = SoftwareBus::new(ChipVariant::W5100).with_presence(Presence::StuckInReset);
    let err = SocketDriver::new(W5100::new(bus, 4), ManualClock::default(), DriverConfig::default())
        .err()
        .expect("stuck chip must not initialise");
    assert!(matches!(err, W5x00Error::ChipBusy { variant: ChipVariant::W5100, .. }));
}

#[test]
fn test_link_unknown_when_init_fails() {
    let bus = SoftwareBus::new(ChipVariant::W5500).with_presence(Presence::Absent);
    let mut chip = W5500::new(bus, 8);
    let mut clock = ManualClock::default();
    assert_eq!(chip.link_status(&mut clock).unwrap(), LinkStatus::Unknown);
    assert!(!chip.is_initialized());
}

#[test]
fn test_init_programs_buffer_sizes() {
    let drv = driver_with::<W5500<SoftwareBus>>(
        SoftwareBus::new(ChipVariant::W5500),
        3,
        DriverConfig::default(),
    );
    assert_eq!(drv.socket_count(), 3);
    assert_eq!(ring(&drv), 4096);
    for s in 0..3 {
        assert_eq!(sim(&drv).buffer_kib(s), (4, 4));
    }
    for s in 3..8 {
        assert_eq!(sim(&drv).buffer_kib(s), (0, 0));
    }

    let drv = driver_with::<W5100<SoftwareBus>>(
        SoftwareBus::new(ChipVariant::W5100),
        2,
        DriverConfig::default(),
    );
    assert_eq!(ring(&drv), 4096);
    // RMSR at 0x1A, TMSR at 0x1B
    assert_eq!(sim(&drv).common(0x1A, 2), &[0x0A, 0x0A]);
    assert_eq!(sim(&drv).ring_size(), 4096);
}

#[test]
fn test_socket_count_is_clamped() {
    let drv = driver_with::<W5100<SoftwareBus>>(
        SoftwareBus::new(ChipVariant::W5100),
        0,
        DriverConfig::default(),
    );
    assert_eq!(drv.socket_count(), 1);
    assert_eq!(ring(&drv), 8192);

    let drv = driver_with::<W5100<SoftwareBus>>(
        SoftwareBus::new(ChipVariant::W5100),
        9,
        DriverConfig::default(),
    );
    assert_eq!(drv.socket_count(), 4);
}

#[test]
fn test_selected_backend_drives_sockets() {
    let chip = w5x00_driver::select_backend(ChipVariant::W5200, SoftwareBus::new(ChipVariant::W5200), 2);
    let mut drv = SocketDriver::new(chip, ManualClock::default(), DriverConfig::default())
        .expect("boxed backend initialises");
    assert_eq!(drv.chip().variant(), ChipVariant::W5200);
    assert_eq!(drv.chip().capabilities().buffer_size, 8192);
    let id = drv.begin(SocketMode::TCP, 0).unwrap();
    assert!(drv.connect(id, PEER, 80).unwrap());
    assert_eq!(drv.send(id, b"boxed").unwrap(), 5);
}

/// Software chip that reports whether a transaction is open
#[derive(Debug)]
struct WatchedBus {
    inner: SoftwareBus,
    open: Rc<Cell<bool>>,
}

impl SpiBus for WatchedBus {
    fn begin_transaction(&mut self) -> w5x00_driver::Result<()> {
        self.inner.begin_transaction()?;
        self.open.set(true);
        Ok(())
    }

    fn end_transaction(&mut self) {
        self.inner.end_transaction();
        self.open.set(false);
    }

    fn frame(&mut self, header: &[u8], payload: Payload<'_>) -> w5x00_driver::Result<()> {
        self.inner.frame(header, payload)
    }
}

/// Clock counting the sleeps and yields taken while the bus is held
#[derive(Debug)]
struct WatchedClock {
    inner: ManualClock,
    open: Rc<Cell<bool>>,
    waits: usize,
    held: usize,
}

impl WatchedClock {
    fn note(&mut self) {
        self.waits += 1;
        if self.open.get() {
            self.held += 1;
        }
    }
}

impl Clock for WatchedClock {
    fn now(&self) -> Duration {
        self.inner.now()
    }

    fn delay(&mut self, duration: Duration) {
        self.note();
        self.inner.delay(duration);
    }

    fn yield_now(&mut self) {
        self.note();
        self.inner.yield_now();
    }
}

#[test]
fn test_bus_released_while_waiting() {
    init_tracing();
    let open = Rc::new(Cell::new(false));
    let bus = WatchedBus {
        inner: SoftwareBus::new(ChipVariant::W5500),
        open: Rc::clone(&open),
    };
    let clock = WatchedClock {
        inner: ManualClock::default(),
        open: Rc::clone(&open),
        waits: 0,
        held: 0,
    };
    let mut drv = SocketDriver::new(W5500::new(bus, 8), clock, DriverConfig::default())
        .expect("watched chip initialises");
    // the reset handshake polls inside its own transaction
    drv.clock_mut().waits = 0;
    drv.clock_mut().held = 0;

    let id = drv.begin(SocketMode::TCP, 0).unwrap();
    let s = id.index();
    drv.chip_mut().bus_mut().inner.set_connect_after(s, Some(3));
    assert!(drv.connect(id, PEER, 80).unwrap());

    let ring = drv.chip().capabilities().buffer_size;
    drv.chip_mut().bus_mut().inner.set_tx_backlog(s, ring, 64);
    assert_eq!(drv.send(id, &pattern(100)).unwrap(), 64);

    drv.chip_mut().bus_mut().inner.set_close_after(s, Some(2));
    drv.stop(id).unwrap();
    assert_eq!(drv.status(id).unwrap(), SocketStatus::Closed);

    let clock = drv.clock_mut();
    assert!(clock.waits >= 3, "only {} waits", clock.waits);
    assert_eq!(clock.held, 0, "{} of {} waits held the bus", clock.held, clock.waits);
    assert!(!open.get());
}
