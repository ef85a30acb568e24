use crate::network::{pack_into, HostContext, Network};

/// Outgoing state towards one remote host.
#[derive(Default)]
struct HostBatch {
    source: Option<u64>,
    dests: Vec<u32>,
    buffer: Vec<u8>,
}

impl HostBatch {
    // serialize the open (source, dests) record into the send buffer
    fn seal(&mut self) {
        if let Some(source) = self.source {
            if !self.dests.is_empty() {
                pack_into(&mut self.buffer, &(source, &self.dests));
                self.dests.clear();
            }
        }
    }
}

/// One worker's per-destination batches of remote edges.
///
/// Consecutive edges with the same source become one `(source, dests)`
/// record; a destination's buffer goes out once it grows past
/// `flush_threshold` bytes.
pub(crate) struct SendBatcher {
    me: usize,
    flush_threshold: usize,
    batches: Vec<HostBatch>,
}

impl SendBatcher {
    pub(crate) fn new(me: usize, num_hosts: usize, flush_threshold: usize) -> Self {
        SendBatcher {
            me,
            flush_threshold,
            batches: (0..num_hosts).map(|_| HostBatch::default()).collect(),
        }
    }

    pub(crate) fn push<N: Network>(&mut self, ctx: &HostContext<N>, host: usize, src: u64, dst: u32) {
        debug_assert_ne!(host, self.me);
        let batch = &mut self.batches[host];
        if batch.source != Some(src) {
            batch.seal();
            if batch.buffer.len() > self.flush_threshold {
                ctx.send(host, std::mem::take(&mut batch.buffer));
            }
            batch.source = Some(src);
        }
        batch.dests.push(dst);
    }

    /// Seals and sends everything still pending, whatever its size.
    pub(crate) fn finish<N: Network>(mut self, ctx: &HostContext<N>) {
        for (host, batch) in self.batches.iter_mut().enumerate() {
            if host == self.me {
                continue;
            }
            batch.seal();
            if !batch.buffer.is_empty() {
                ctx.send(host, std::mem::take(&mut batch.buffer));
            }
        }
    }
}
