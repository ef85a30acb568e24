//! Host-to-host tagged messaging.
//!
//! Every exchange round in the converter is "send to some hosts, then drain
//! exactly the messages tagged with the current phase". The phase tag lives
//! in [`HostContext`] and is bumped once per completed round. Every host has
//! to bump it the same number of times at the same protocol points; nothing
//! detects a host that drifts.

pub mod local;
pub mod world;

pub use local::LocalNetwork;
pub use world::LamellarNetwork;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Point-to-point transport between hosts.
///
/// Sends never block the caller for long and messages to one host with the
/// same tag are delivered in order. Connection setup and teardown belong to
/// whoever builds the implementation.
pub trait Network: Send + Sync {
    /// This host's ID in `0..num()`.
    fn id(&self) -> usize;

    /// Number of hosts.
    fn num(&self) -> usize;

    fn send_tagged(&self, dest: usize, tag: u64, buf: Vec<u8>);

    /// Next pending message tagged `tag` as `(sender, payload)`, or `None` if
    /// nothing has arrived yet. Messages with other tags stay queued.
    fn receive_tagged(&self, tag: u64) -> Option<(usize, Vec<u8>)>;
}

/// Serializes a typed record into a fresh send buffer.
pub fn pack<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("in-memory records always serialize")
}

/// Appends a typed record to an existing send buffer.
pub fn pack_into<T: Serialize + ?Sized>(buf: &mut Vec<u8>, value: &T) {
    bincode::serialize_into(buf, value).expect("in-memory records always serialize");
}

/// Reads one typed record from the front of `buf`, advancing it.
pub fn unpack_from<T: DeserializeOwned>(buf: &mut &[u8]) -> T {
    bincode::deserialize_from(buf).unwrap_or_else(|e| panic!("corrupt message payload: {e}"))
}

pub fn unpack<T: DeserializeOwned>(buf: &[u8]) -> T {
    bincode::deserialize(buf).unwrap_or_else(|e| panic!("corrupt message payload: {e}"))
}

/// Cluster identity, transport and the shared phase tag for one host.
pub struct HostContext<N> {
    net: N,
    phase: u64,
}

impl<N: Network> HostContext<N> {
    pub fn new(net: N) -> Self {
        HostContext { net, phase: 0 }
    }

    pub fn id(&self) -> usize {
        self.net.id()
    }

    pub fn num(&self) -> usize {
        self.net.num()
    }

    pub fn network(&self) -> &N {
        &self.net
    }

    pub fn phase(&self) -> u64 {
        self.phase
    }

    /// Moves every later send and receive to the next phase. Only called once
    /// the current round is fully drained locally.
    pub fn advance_phase(&mut self) {
        self.phase += 1;
    }

    /// Sends `buf` to `dest` under the current phase.
    pub fn send(&self, dest: usize, buf: Vec<u8>) {
        debug_assert_ne!(dest, self.id(), "hosts never message themselves");
        self.net.send_tagged(dest, self.phase, buf);
    }

    pub fn try_receive(&self) -> Option<(usize, Vec<u8>)> {
        self.net.receive_tagged(self.phase)
    }

    /// Spins until a message of the current phase arrives.
    pub fn receive(&self) -> (usize, Vec<u8>) {
        loop {
            if let Some(msg) = self.try_receive() {
                return msg;
            }
            std::thread::yield_now();
        }
    }

    /// Sends `value` to every other host and hands each host's value to
    /// `on_receive` as it arrives. Ends the round.
    pub fn exchange_with_all<T, F>(&mut self, value: &T, mut on_receive: F)
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(usize, T),
    {
        let me = self.id();
        let num = self.num();
        let buf = pack(value);
        for h in (0..num).filter(|h| *h != me) {
            self.send(h, buf.clone());
        }

        let mut seen = vec![false; num];
        for _ in 1..num {
            let (sender, payload) = self.receive();
            assert!(
                !seen[sender],
                "host {sender} sent twice in phase {}",
                self.phase
            );
            seen[sender] = true;
            on_receive(sender, unpack(&payload));
        }
        self.advance_phase();
    }

    /// Every host's `value`, indexed by host.
    pub fn all_to_all<T>(&mut self, value: &T) -> Vec<T>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let me = self.id();
        let mut gathered: Vec<Option<T>> = vec![None; self.num()];
        gathered[me] = Some(value.clone());
        self.exchange_with_all(value, |sender, v| gathered[sender] = Some(v));
        gathered
            .into_iter()
            .map(|v| v.expect("every host answers once per round"))
            .collect()
    }

    /// Sends `values[h]` to host `h`; returns what every host sent to this one,
    /// indexed by sender. Ends the round.
    pub fn personalized_all_to_all<T>(&mut self, values: &[T]) -> Vec<T>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let me = self.id();
        let num = self.num();
        assert_eq!(values.len(), num, "need one value per host");

        for h in (0..num).filter(|h| *h != me) {
            self.send(h, pack(&values[h]));
        }

        let mut gathered: Vec<Option<T>> = vec![None; num];
        gathered[me] = Some(values[me].clone());
        for _ in 1..num {
            let (sender, payload) = self.receive();
            assert!(
                gathered[sender].is_none(),
                "host {sender} sent twice in phase {}",
                self.phase
            );
            gathered[sender] = Some(unpack(&payload));
        }
        self.advance_phase();

        gathered
            .into_iter()
            .map(|v| v.expect("every host answers once per round"))
            .collect()
    }

    /// Global sum of `local`.
    pub fn accumulate_value(&mut self, local: u64) -> u64 {
        let mut total = local;
        self.exchange_with_all(&local, |_, v: u64| total += v);
        total
    }

    /// Global maximum of `local`.
    pub fn reduce_max(&mut self, local: u64) -> u64 {
        let mut max = local;
        self.exchange_with_all(&local, |_, v: u64| max = max.max(v));
        max
    }

    /// Returns once every host has reached the same barrier.
    pub fn barrier(&mut self) {
        self.exchange_with_all(&(), |_, ()| {});
    }

    /// Number of edges each host ended up owning.
    pub fn edges_per_host(&mut self, local_assigned_edges: u64) -> Vec<u64> {
        tracing::debug!(host = self.id(), "informing other hosts about number of edges");
        self.all_to_all(&local_assigned_edges)
    }
}
