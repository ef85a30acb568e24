use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Network;

type Queue = VecDeque<(usize, Vec<u8>)>;

/// One host's inbox, split by phase tag.
#[derive(Default)]
pub(crate) struct Mailbox {
    by_tag: Mutex<HashMap<u64, Queue>>,
}

impl Mailbox {
    pub(crate) fn deliver(&self, tag: u64, sender: usize, buf: Vec<u8>) {
        self.by_tag
            .lock()
            .entry(tag)
            .or_default()
            .push_back((sender, buf));
    }

    pub(crate) fn take(&self, tag: u64) -> Option<(usize, Vec<u8>)> {
        let mut by_tag = self.by_tag.lock();
        let queue = by_tag.get_mut(&tag)?;
        let msg = queue.pop_front();
        if queue.is_empty() {
            by_tag.remove(&tag);
        }
        msg
    }
}

/// In-process transport: every simulated host shares the same set of
/// mailboxes, one per host. Used to run several hosts as threads of one
/// process.
#[derive(Clone)]
pub struct LocalNetwork {
    id: usize,
    mailboxes: Arc<Vec<Mailbox>>,
}

impl LocalNetwork {
    /// Handles for hosts `0..num`, to be moved onto one thread each.
    pub fn cluster(num: usize) -> Vec<LocalNetwork> {
        assert!(num >= 1, "a cluster needs at least one host");
        let mailboxes: Arc<Vec<Mailbox>> = Arc::new((0..num).map(|_| Mailbox::default()).collect());
        (0..num)
            .map(|id| LocalNetwork {
                id,
                mailboxes: mailboxes.clone(),
            })
            .collect()
    }

    /// A lone host; every collective degenerates to a local no-op.
    pub fn single() -> LocalNetwork {
        LocalNetwork::cluster(1).remove(0)
    }
}

impl Network for LocalNetwork {
    fn id(&self) -> usize {
        self.id
    }

    fn num(&self) -> usize {
        self.mailboxes.len()
    }

    fn send_tagged(&self, dest: usize, tag: u64, buf: Vec<u8>) {
        self.mailboxes[dest].deliver(tag, self.id, buf);
    }

    fn receive_tagged(&self, tag: u64) -> Option<(usize, Vec<u8>)> {
        self.mailboxes[self.id].take(tag)
    }
}
