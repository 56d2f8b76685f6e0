//! Baseband frames.

use serde::Serialize;

use crate::modcod::ModcodId;
use acmsim_core::pdu::Pdu;
use acmsim_core::SimTime;

/// A physical-layer frame packed with PDUs for one MODCOD.
#[derive(Debug, Clone)]
pub struct BbFrame {
    modcod: ModcodId,
    pdus: Vec<Pdu>,
    volume: usize,
    built_at: SimTime,
}

impl BbFrame {
    pub fn new(modcod: ModcodId, built_at: SimTime) -> Self {
        Self {
            modcod,
            pdus: Vec::new(),
            volume: 0,
            built_at,
        }
    }

    pub fn push(&mut self, pdu: Pdu) {
        self.volume += pdu.size();
        self.pdus.push(pdu);
    }

    #[inline]
    pub fn modcod(&self) -> ModcodId {
        self.modcod
    }

    pub fn pdus(&self) -> &[Pdu] {
        &self.pdus
    }

    pub fn into_pdus(self) -> Vec<Pdu> {
        self.pdus
    }

    /// Payload bytes carried.
    #[inline]
    pub fn volume(&self) -> usize {
        self.volume
    }

    pub fn is_empty(&self) -> bool {
        self.pdus.is_empty()
    }

    pub fn built_at(&self) -> SimTime {
        self.built_at
    }
}

/// What a link remembers about a frame it sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    pub sent_at: SimTime,
    pub modcod: ModcodId,
    pub volume: usize,
    pub pdu_ids: Vec<u64>,
}

impl FrameRecord {
    pub fn of(frame: &BbFrame, sent_at: SimTime) -> Self {
        Self {
            sent_at,
            modcod: frame.modcod,
            volume: frame.volume,
            pdu_ids: frame.pdus.iter().map(Pdu::id).collect(),
        }
    }
}
