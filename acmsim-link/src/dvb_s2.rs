//! ## acmsim-link::dvb_s2
//! **ACM link contract and the DVB-S2 forward link**
//!
//! The link only models the channel: it is busy for one frame duration after
//! each `send`, and it tells the caller when it will be free again. Pulling
//! the next frame at that date is the scheduler's job.

use serde::Serialize;
use tracing::debug;

use crate::frame::{BbFrame, FrameRecord};
use crate::modcod::{ModcodId, ModcodTable};
use acmsim_core::probe::{Probe, ProbeHandle};
use acmsim_core::{SimTime, Simulation};

/// What an ACM scheduler needs from the link it feeds.
pub trait AcmLink {
    fn modcods(&self) -> &ModcodTable;

    fn nb_modcod(&self) -> usize {
        self.modcods().len()
    }

    fn payload_bits(&self, modcod: ModcodId) -> u64 {
        self.modcods().payload_bits(modcod)
    }

    fn transmission_time(&self, modcod: ModcodId) -> SimTime {
        self.modcods().transmission_time(modcod)
    }

    /// Whether a frame can be sent at `now`.
    fn available(&self, now: SimTime) -> bool;

    /// Puts `frame` on the air. Returns the date the channel becomes free.
    fn send(&mut self, sim: &mut Simulation, frame: BbFrame) -> SimTime;

    /// Back to the idle, never-used state.
    fn reset(&mut self) {}
}

/// Counters of a link since its last reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkStats {
    pub frames: u64,
    pub bytes: u64,
    pub frames_per_modcod: Vec<u64>,
    pub busy_time: SimTime,
}

impl LinkStats {
    /// Airtime of every frame sent so far over `now`. A frame still on air
    /// counts in full.
    pub fn utilisation(&self, now: SimTime) -> f64 {
        if now > 0.0 {
            self.busy_time / now
        } else {
            0.0
        }
    }
}

/// DVB-S2 style forward link carrying one frame at a time.
pub struct DvbS2Link {
    modcods: ModcodTable,
    busy_until: SimTime,
    stats: LinkStats,
    records: Option<Vec<FrameRecord>>,
    volume_probe: Option<ProbeHandle>,
    fill_probe: Option<ProbeHandle>,
}

impl DvbS2Link {
    pub fn new(modcods: ModcodTable) -> Self {
        let stats = LinkStats {
            frames_per_modcod: vec![0; modcods.len()],
            ..LinkStats::default()
        };
        Self {
            modcods,
            busy_until: 0.0,
            stats,
            records: None,
            volume_probe: None,
            fill_probe: None,
        }
    }

    /// Keeps a [`FrameRecord`] for every frame sent.
    pub fn recording(mut self) -> Self {
        self.records = Some(Vec::new());
        self
    }

    /// Probe sampled with the payload bytes of each frame.
    pub fn set_volume_probe(&mut self, probe: Option<ProbeHandle>) {
        self.volume_probe = probe;
    }

    /// Probe sampled with the payload/capacity ratio of each frame.
    pub fn set_fill_probe(&mut self, probe: Option<ProbeHandle>) {
        self.fill_probe = probe;
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn records(&self) -> &[FrameRecord] {
        self.records.as_deref().unwrap_or_default()
    }

    pub fn busy_until(&self) -> SimTime {
        self.busy_until
    }

    /// Fraction of `[0, now]` the channel spent transmitting.
    pub fn utilisation(&self, now: SimTime) -> f64 {
        if now > 0.0 {
            let ahead = (self.busy_until - now).max(0.0);
            (self.stats.busy_time - ahead) / now
        } else {
            0.0
        }
    }
}

impl AcmLink for DvbS2Link {
    fn modcods(&self) -> &ModcodTable {
        &self.modcods
    }

    fn available(&self, now: SimTime) -> bool {
        self.busy_until <= now
    }

    /// # Panics
    ///
    /// Panics if the link is still busy or if the frame exceeds its MODCOD
    /// capacity; both mean the scheduler broke its contract.
    fn send(&mut self, sim: &mut Simulation, frame: BbFrame) -> SimTime {
        let now = sim.now();
        assert!(
            self.available(now),
            "frame sent at {now} while the link is busy until {}",
            self.busy_until
        );
        let modcod = &self.modcods[frame.modcod()];
        assert!(
            frame.volume() as u64 * 8 <= modcod.payload_bits(),
            "frame of {} bytes exceeds {} capacity of {} bits",
            frame.volume(),
            modcod.name(),
            modcod.payload_bits()
        );

        let duration = modcod.transmission_time();
        let fill = (frame.volume() as f64 * 8.0) / modcod.payload_bits() as f64;
        self.busy_until = now + duration;
        self.stats.frames += 1;
        self.stats.bytes += frame.volume() as u64;
        self.stats.frames_per_modcod[frame.modcod().index()] += 1;
        self.stats.busy_time += duration;
        self.volume_probe.sample(frame.volume() as f64);
        self.fill_probe.sample(fill);

        debug!(
            modcod = %frame.modcod(),
            volume = frame.volume(),
            pdus = frame.pdus().len(),
            until = self.busy_until,
            "frame on air"
        );
        if let Some(records) = self.records.as_mut() {
            records.push(FrameRecord::of(&frame, now));
        }
        self.busy_until
    }

    fn reset(&mut self) {
        self.busy_until = 0.0;
        self.stats = LinkStats {
            frames_per_modcod: vec![0; self.modcods.len()],
            ..LinkStats::default()
        };
        if let Some(records) = self.records.as_mut() {
            records.clear();
        }
    }
}
