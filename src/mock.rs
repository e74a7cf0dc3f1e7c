//! Scripted byte link for exercising handshakes without hardware.

use crate::error::Result;
use crate::protocol::ByteLink;
use std::collections::VecDeque;

/// Link that plays back a fixed script of replies and records what is sent.
///
/// Each read takes the next script entry; `None` entries and an exhausted
/// script read as a timeout.
#[derive(Debug, Default, Clone)]
pub struct ScriptedLink {
    script: VecDeque<Option<u8>>,
    writes: Vec<Vec<u8>>,
    discards: usize,
    reads: usize,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue reply bytes.
    pub fn reply(mut self, bytes: &[u8]) -> Self {
        self.push_reply(bytes);
        self
    }

    /// Queue `reads` timed-out reads.
    pub fn silence(mut self, reads: usize) -> Self {
        self.push_silence(reads);
        self
    }

    pub fn push_reply(&mut self, bytes: &[u8]) {
        self.script.extend(bytes.iter().copied().map(Some));
    }

    pub fn push_silence(&mut self, reads: usize) {
        self.script.extend(std::iter::repeat(None).take(reads));
    }

    /// Every write call, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// All written bytes concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }

    pub fn discards(&self) -> usize {
        self.discards
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Script entries not yet read.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl ByteLink for ScriptedLink {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writes.push(data.to_vec());
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        self.reads += 1;
        Ok(self.script.pop_front().flatten())
    }

    fn discard_input(&mut self) -> Result<()> {
        self.discards += 1;
        Ok(())
    }
}
