//! Command-line configuration, mirroring `original_source/main.c`'s
//! `getopt_long` table one option at a time, plus the process-wide
//! operator-toggleable flags block described in spec.md §9's Design Notes.

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use crate::tape::OpenMode;

/// TU58 DECtape II emulator speaking the Radial Serial Protocol.
#[derive(Parser, Debug)]
#[command(name = "tu58em", version, about, long_about = None)]
pub struct Args {
    /// Enable debug-level packet tracing (implies --verbose).
    #[arg(short, long)]
    pub debug: bool,

    /// Enable verbose informational logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Force MRSP (per-byte handshake) mode on startup.
    #[arg(short, long)]
    pub mrsp: bool,

    /// Disable the startup INIT-packet synchronization handshake.
    #[arg(short = 'n', long = "nosync")]
    pub nosync: bool,

    /// Emulate VAX console semantics where they differ from PDP-11.
    #[arg(short = 'x', long)]
    pub vax: bool,

    /// Run detached from the controlling terminal (no operator console).
    #[arg(short = 'b', long)]
    pub background: bool,

    /// Shorthand for `--timing 1` (diagnostic-passing delays).
    #[arg(short = 't')]
    pub timing_diag: bool,

    /// Shorthand for `--timing 2` (real-hardware delays).
    #[arg(short = 'T')]
    pub timing_hw: bool,

    /// Explicit timing profile: 0 = max speed, 1 = diagnostic-passing,
    /// 2 = real hardware. Overrides -t/-T when given.
    #[arg(long = "timing", value_name = "N")]
    pub timing: Option<u8>,

    /// Serial line baud rate.
    #[arg(short = 's', long = "speed", default_value_t = 9600)]
    pub baud: u32,

    /// Serial stop bits (1 or 2).
    #[arg(short = 'S', long = "stop", default_value_t = 1)]
    pub stop_bits: u8,

    /// Serial device path (e.g. /dev/ttyS0), or a bare unit number "N"
    /// that resolves to the platform's Nth serial device.
    #[arg(short, long)]
    pub port: String,

    /// Open a tape image read-only, assigning the next unit slot.
    #[arg(short, long = "read")]
    pub read: Vec<String>,

    /// Open a tape image read-write, assigning the next unit slot.
    #[arg(short, long)]
    pub write: Vec<String>,

    /// Create (and zero-fill) a new blank tape image.
    #[arg(short, long)]
    pub create: Vec<String>,

    /// Create and stamp a new tape image with an RT-11 directory.
    #[arg(short = 'i', long = "initrt11")]
    pub init_rt11: Vec<String>,

    /// Create and stamp a new tape image with an XXDP directory.
    #[arg(short = 'z', long = "initxxdp")]
    pub init_xxdp: Vec<String>,
}

impl Args {
    /// Flatten the per-mode file-list options into assignment order,
    /// matching the original's left-to-right `getopt_long` unit assignment.
    pub fn units(&self) -> Vec<(String, OpenMode)> {
        let mut out = Vec::new();
        for p in &self.read {
            out.push((p.clone(), OpenMode::Read));
        }
        for p in &self.write {
            out.push((p.clone(), OpenMode::Write));
        }
        for p in &self.create {
            out.push((p.clone(), OpenMode::Create));
        }
        for p in &self.init_rt11 {
            out.push((p.clone(), OpenMode::Rt11Init));
        }
        for p in &self.init_xxdp {
            out.push((p.clone(), OpenMode::XxdpInit));
        }
        out
    }

    /// Resolve `-t`/`-T`/`--timing N` down to a single 0..2 level, matching
    /// the original's `case 'T': timing=2; case 't': timing=1;` precedence
    /// with `--timing N` (the only form taking an explicit value) winning
    /// when given.
    pub fn timing_level(&self) -> u8 {
        match self.timing {
            Some(n) => n.min(2),
            None if self.timing_hw => 2,
            None if self.timing_diag => 1,
            None => 0,
        }
    }
}

/// Resolve a `-p/--port` argument: a bare number `N` means the platform's
/// `N`th serial device (1-based, per `original_source/serial.c`'s
/// `sscanf(port, "%u", &n)` then `/dev/ttyS{n-1}`); anything else is a
/// literal device path.
pub fn resolve_port(port: &str) -> String {
    match port.trim().parse::<u32>() {
        Ok(n) if n >= 1 => format!("/dev/ttyS{}", n - 1),
        _ => port.to_string(),
    }
}

/// One row of the `tudelay[]` timing table (milliseconds), indexed by
/// `Config::timing`. Field names follow `tu58drive.c`'s `nop/init/test/
/// seek/read/write` columns.
#[derive(Debug, Clone, Copy)]
pub struct TimingProfile {
    pub nop_ms: u64,
    pub init_ms: u64,
    pub test_ms: u64,
    pub seek_ms: u64,
    pub read_ms: u64,
    pub write_ms: u64,
}

/// timing=0: max speed, negligible artificial delay.
const PROFILE_FAST: TimingProfile = TimingProfile {
    nop_ms: 1,
    init_ms: 1,
    test_ms: 1,
    seek_ms: 0,
    read_ms: 0,
    write_ms: 0,
};
/// timing=1: slow enough to fool the DEC ZTUUF0 diagnostic.
const PROFILE_DIAGNOSTIC: TimingProfile = TimingProfile {
    nop_ms: 1,
    init_ms: 1,
    test_ms: 25,
    seek_ms: 25,
    read_ms: 25,
    write_ms: 25,
};
/// timing=2: approximates real TU58 hardware timing.
const PROFILE_HARDWARE: TimingProfile = TimingProfile {
    nop_ms: 1,
    init_ms: 1,
    test_ms: 25,
    seek_ms: 200,
    read_ms: 100,
    write_ms: 100,
};

pub fn timing_profile(timing: u8) -> TimingProfile {
    match timing {
        1 => PROFILE_DIAGNOSTIC,
        2 => PROFILE_HARDWARE,
        _ => PROFILE_FAST,
    }
}

/// Immutable run configuration, built once from parsed CLI args.
pub struct Config {
    pub port: String,
    pub baud: u32,
    pub stop_bits: u8,
    pub nosync: bool,
    pub vax: bool,
    pub background: bool,
    /// Global MRSP capability (`-m/--mrsp`): whether the emulator will
    /// ever honor a command's MRSP switch bit at all. Immutable after
    /// startup; there is no operator key to toggle it (spec.md §4.5).
    pub mrsp_capable: bool,
    pub timing: TimingProfile,
    pub units: Vec<(String, OpenMode)>,
}

impl Config {
    pub fn from_args(args: Args) -> Config {
        Config {
            port: resolve_port(&args.port),
            baud: args.baud,
            stop_bits: args.stop_bits,
            nosync: args.nosync,
            vax: args.vax,
            background: args.background,
            mrsp_capable: args.mrsp,
            timing: timing_profile(args.timing_level()),
            units: args.units(),
        }
    }
}

/// Operator-toggleable runtime flags (spec.md §9: "process-wide flags"),
/// shared between the operator console thread and the engine thread.
pub struct Flags {
    pub verbose: AtomicBool,
    pub debug: AtomicBool,
    /// Set when the operator presses 'S'; also the initial state derived
    /// from `!nosync`. While set, the engine emits INIT bytes at ~10Hz
    /// whenever it is otherwise idle, clearing itself the moment any byte
    /// arrives from the host (`original_source/tu58drive.c::run`'s
    /// `doinit` variable).
    pub send_init: AtomicBool,
    /// One-shot request from the operator's 'R' key; the engine consumes
    /// it (swap to false) and returns `RunOutcome::Restart`.
    pub restart_requested: AtomicBool,
}

impl Flags {
    pub fn new(verbose: bool, debug: bool, send_init: bool) -> Self {
        Flags {
            verbose: AtomicBool::new(verbose),
            debug: AtomicBool::new(debug),
            send_init: AtomicBool::new(send_init),
            restart_requested: AtomicBool::new(false),
        }
    }

    /// `V`: toggle verbose. Matches the original's coupling, which also
    /// clears debug when verbose is (re-)toggled.
    pub fn toggle_verbose(&self) -> bool {
        let new = !self.verbose.load(Ordering::Relaxed);
        self.verbose.store(new, Ordering::Relaxed);
        self.debug.store(false, Ordering::Relaxed);
        new
    }

    /// `D`: toggle debug. Matches the original's coupling, which also
    /// forces verbose on when debug is toggled.
    pub fn toggle_debug(&self) -> bool {
        let new = !self.debug.load(Ordering::Relaxed);
        self.debug.store(new, Ordering::Relaxed);
        self.verbose.store(true, Ordering::Relaxed);
        new
    }

    /// `S`: toggle continuous-INIT emission.
    pub fn toggle_send_init(&self) -> bool {
        let new = !self.send_init.load(Ordering::Relaxed);
        self.send_init.store(new, Ordering::Relaxed);
        new
    }

    /// `R`: request the engine restart at its next opportunity.
    pub fn request_restart(&self) {
        self.restart_requested.store(true, Ordering::Relaxed);
    }

    /// Consumed by the engine: true at most once per `request_restart`.
    pub fn take_restart_request(&self) -> bool {
        self.restart_requested.swap(false, Ordering::Relaxed)
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags::new(false, false, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_profile_zero_is_near_instant() {
        let p = timing_profile(0);
        assert_eq!(p.seek_ms, 0);
        assert_eq!(p.read_ms, 0);
    }

    #[test]
    fn timing_profile_two_models_hardware_seek() {
        let p = timing_profile(2);
        assert_eq!(p.seek_ms, 200);
        assert_eq!(p.read_ms, 100);
        assert_eq!(p.write_ms, 100);
    }

    #[test]
    fn flags_toggle_round_trips() {
        let flags = Flags::new(false, false, false);
        assert!(flags.toggle_verbose());
        assert!(!flags.toggle_verbose());
    }

    #[test]
    fn toggling_verbose_clears_debug() {
        let flags = Flags::new(false, true, false);
        flags.toggle_verbose();
        assert!(!flags.debug.load(Ordering::Relaxed));
    }

    #[test]
    fn toggling_debug_forces_verbose() {
        let flags = Flags::new(false, false, false);
        flags.toggle_debug();
        assert!(flags.verbose.load(Ordering::Relaxed));
    }

    #[test]
    fn restart_request_is_one_shot() {
        let flags = Flags::default();
        flags.request_restart();
        assert!(flags.take_restart_request());
        assert!(!flags.take_restart_request());
    }

    #[test]
    fn resolve_port_maps_bare_number_to_device() {
        assert_eq!(resolve_port("3"), "/dev/ttyS2");
        assert_eq!(resolve_port("/dev/ttyUSB0"), "/dev/ttyUSB0");
    }
}
