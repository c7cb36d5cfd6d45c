use tracing::debug;

use super::handshake::SyncRequest;

/// Barrier network for the cores of one system.
///
/// Releases every participant for one cycle once all of them request the
/// same barrier id. Participants requesting different ids never release.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncBarrier {
    participants: u32,
    fire: bool,
}

impl SyncBarrier {
    /// `participants` has bit `i` set for each core taking part.
    pub fn new(participants: u32) -> Self {
        Self {
            participants,
            fire: false,
        }
    }

    pub fn participants(&self) -> u32 {
        self.participants
    }

    pub fn is_participant(&self, core: usize) -> bool {
        core < u32::BITS as usize && (self.participants >> core) & 1 == 1
    }

    /// Clock edge. `requests` are the cores' sync lines of the ending cycle.
    pub fn latch(&mut self, requests: &[SyncRequest]) {
        let mut waiting = requests
            .iter()
            .enumerate()
            .filter(|(core, _)| self.is_participant(*core))
            .map(|(_, request)| request);
        let arrived = match waiting.next() {
            Some(first) => first.enable && waiting.all(|r| r.enable && r.id == first.id),
            None => false,
        };
        // every participant must be attached
        let attached = requests.len() >= u32::BITS as usize
            || self.participants >> requests.len() == 0;
        let fire = !self.fire && arrived && attached;
        if fire {
            debug!(participants = self.participants, "sync barrier released");
        }
        self.fire = fire;
    }

    pub fn ready(&self, core: usize) -> bool {
        self.fire && self.is_participant(core)
    }

    pub fn reset(&mut self) {
        self.fire = false;
    }
}
