use lamellar::active_messaging::prelude::*;
use lamellar::darc::prelude::*;

use super::local::Mailbox;
use super::Network;

// Carries one tagged send buffer to the destination PE, where it is parked in
// that PE's mailbox until the receiver asks for its phase.
#[lamellar::AmData]
struct TaggedBufferAm {
    inbox: Darc<Mailbox>,
    tag: u64,
    sender: usize,
    payload: Vec<u8>,
}

#[lamellar::am]
impl LamellarAM for TaggedBufferAm {
    async fn exec() {
        self.inbox
            .deliver(self.tag, self.sender, self.payload.clone());
    }
}

/// Transport over a Lamellar world: one PE per host, one active message per
/// send buffer.
pub struct LamellarNetwork {
    world: LamellarWorld,
    inbox: Darc<Mailbox>,
}

impl LamellarNetwork {
    /// Collective over the world; every PE has to call it.
    pub fn new(world: &LamellarWorld) -> LamellarNetwork {
        let inbox = Darc::new(world, Mailbox::default()).expect("darc should be created");
        world.barrier();
        LamellarNetwork {
            world: world.clone(),
            inbox,
        }
    }

    /// Waits for every message this PE launched, then for every other PE.
    pub fn quiesce(&self) {
        self.world.wait_all();
        self.world.barrier();
    }
}

impl Network for LamellarNetwork {
    fn id(&self) -> usize {
        self.world.my_pe()
    }

    fn num(&self) -> usize {
        self.world.num_pes()
    }

    fn send_tagged(&self, dest: usize, tag: u64, buf: Vec<u8>) {
        let _ = self.world.exec_am_pe(
            dest,
            TaggedBufferAm {
                inbox: self.inbox.clone(),
                tag,
                sender: self.world.my_pe(),
                payload: buf,
            },
        );
    }

    fn receive_tagged(&self, tag: u64) -> Option<(usize, Vec<u8>)> {
        self.inbox.take(tag)
    }
}
