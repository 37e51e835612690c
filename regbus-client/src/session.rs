//! Bus session: sequence bookkeeping, command serialization and reply
//! correlation for one logical connection to a remote register host.

use std::sync::mpsc::{Receiver, RecvTimeoutError, sync_channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use regbus_protocol::{Command, MAX_REG_ADDR, MAX_WORDS, Opcode, Reply, TagPair, flat_addr};

use crate::error::BusError;
use crate::link::{InboundFrame, Link};

/// Delivery contract for commands issued through a session.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum DeliveryMode {
    /// Wait for the host's acknowledgment on every command.
    #[default]
    Blocking,
    /// Return optimistically after transmission; replies are discarded.
    /// Trades correctness feedback for throughput: remote failures are
    /// never surfaced to the caller.
    FireAndForget,
}

/// The single-slot pending-reply holder. Installed by the issuing caller
/// before transmission; claimed (and thereby cleared) by the dispatch
/// thread when a correlated reply arrives.
struct Waiter {
    sequence: u8,
    reply: std::sync::mpsc::SyncSender<Reply>,
}

type PendingSlot = Arc<Mutex<Option<Waiter>>>;

/// Client session bound to one link and one command/reply tag pair.
///
/// Callers on any number of threads may issue operations concurrently; the
/// session lock serializes them into a strict order of transmission, and at
/// most one command is in flight at a time. Replies are correlated against
/// the in-flight command by frame tag and echoed sequence number; anything
/// else on the wire is ignored as stale.
pub struct RegisterBus<L: Link> {
    link: L,
    tags: TagPair,
    mode: DeliveryMode,
    /// Command-issue lock; the guarded value is the next sequence number.
    issue: Mutex<u8>,
    pending: PendingSlot,
}

impl<L: Link> RegisterBus<L> {
    /// Create a session over `link`, consuming the link's inbound channel.
    /// A dispatch thread drains the channel for the life of the link and
    /// wakes whichever caller the arriving reply belongs to.
    pub fn new(
        link: L,
        frames: Receiver<InboundFrame>,
        tags: TagPair,
        mode: DeliveryMode,
    ) -> RegisterBus<L> {
        let pending: PendingSlot = Arc::new(Mutex::new(None));
        {
            let pending = pending.clone();
            let reply_tag = tags.reply();
            thread::spawn(move || dispatch_loop(frames, pending, reply_tag));
        }
        RegisterBus {
            link,
            tags,
            mode,
            issue: Mutex::new(0),
            pending,
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Close the underlying link. Releases any caller still waiting.
    pub fn close(&self) {
        self.link.close();
    }

    /// Write a single word to a device register.
    pub fn write(
        &self,
        device: u8,
        register: u16,
        value: u32,
        timeout: Duration,
    ) -> Result<(), BusError> {
        self.write_multi(device, register, std::slice::from_ref(&value), false, timeout)
    }

    /// Write up to [MAX_WORDS] words starting at a device register.
    /// With `increment`, the register address advances by one per word;
    /// without it, every word targets the same register (FIFO-style).
    pub fn write_multi(
        &self,
        device: u8,
        register: u16,
        values: &[u32],
        increment: bool,
        timeout: Duration,
    ) -> Result<(), BusError> {
        check_register(register)?;
        check_count(values.len())?;
        let reply = self.transact(
            |sequence| Command::Write {
                increment,
                sequence,
                addr: flat_addr(device, register),
                data: values.to_vec(),
            },
            timeout,
        )?;
        match reply {
            None => Ok(()), // fire-and-forget: assume success
            Some(reply) => {
                if reply.opcode != Opcode::write(increment) || !reply.data.is_empty() {
                    return Err(BusError::Malformed);
                }
                if reply.ok() { Ok(()) } else { Err(BusError::Nack) }
            }
        }
    }

    /// Read a single word from a device register.
    pub fn read(&self, device: u8, register: u16, timeout: Duration) -> Result<u32, BusError> {
        Ok(self.read_multi(device, register, 1, false, timeout)?[0])
    }

    /// Read up to [MAX_WORDS] words starting at a device register, with the
    /// same addressing choice as [RegisterBus::write_multi].
    pub fn read_multi(
        &self,
        device: u8,
        register: u16,
        count: usize,
        increment: bool,
        timeout: Duration,
    ) -> Result<Vec<u32>, BusError> {
        check_register(register)?;
        check_count(count)?;
        let reply = self.transact(
            |sequence| Command::Read {
                increment,
                sequence,
                addr: flat_addr(device, register),
                count: count as u8,
            },
            timeout,
        )?;
        match reply {
            // The command was sent (reads may have side effects on the
            // device), but its result is unobtainable on this session.
            None => Err(BusError::WriteOnly),
            Some(reply) => {
                if reply.opcode != Opcode::read(increment)
                    || reply.word_count as usize != count
                    || reply.data.len() != count
                {
                    return Err(BusError::Malformed);
                }
                if reply.ok() {
                    Ok(reply.data)
                } else {
                    Err(BusError::Nack)
                }
            }
        }
    }

    /// Send one command and, in blocking mode, wait for its reply.
    ///
    /// Holds the issue lock for the whole exchange, so concurrent callers
    /// serialize and sequence-based correlation stays unambiguous. The
    /// sequence counter advances on every exit path, including timeouts,
    /// so a late reply to an abandoned exchange can never be mistaken for
    /// the next one's.
    fn transact(
        &self,
        build: impl FnOnce(u8) -> Command,
        timeout: Duration,
    ) -> Result<Option<Reply>, BusError> {
        let mut issue = self.issue.lock().unwrap();
        let sequence = *issue;
        let command = build(sequence);
        let mut frame = Vec::with_capacity(10 + 4 * command.word_count());
        frame.extend_from_slice(&self.tags.command().to_be_bytes());
        command.write_to(&mut frame)?;

        match self.mode {
            DeliveryMode::FireAndForget => {
                let sent = self.link.send_blocking(&frame);
                *issue = sequence.wrapping_add(1);
                drop(issue);
                sent?;
                Ok(None)
            }
            DeliveryMode::Blocking => {
                // Install the waiter before transmitting so a fast reply
                // cannot race past an empty slot.
                let (tx, rx) = sync_channel(1);
                *self.pending.lock().unwrap() = Some(Waiter {
                    sequence,
                    reply: tx,
                });
                if let Err(e) = self.link.send_blocking(&frame) {
                    self.pending.lock().unwrap().take();
                    *issue = sequence.wrapping_add(1);
                    return Err(BusError::Io(e));
                }
                let outcome = rx.recv_timeout(timeout);
                self.pending.lock().unwrap().take();
                *issue = sequence.wrapping_add(1);
                drop(issue);
                match outcome {
                    Ok(reply) => Ok(Some(reply)),
                    Err(RecvTimeoutError::Timeout) => {
                        log::debug!("Timeout waiting for reply (sequence {})", sequence);
                        Err(BusError::Timeout)
                    }
                    Err(RecvTimeoutError::Disconnected) => Err(BusError::LinkClosed),
                }
            }
        }
    }
}

fn check_register(register: u16) -> Result<(), BusError> {
    if register > MAX_REG_ADDR {
        Err(BusError::BadRegister(register))
    } else {
        Ok(())
    }
}

fn check_count(count: usize) -> Result<(), BusError> {
    if (1..=MAX_WORDS).contains(&count) {
        Ok(())
    } else {
        Err(BusError::BadWordCount { got: count })
    }
}

/// Reply-correlation loop, one per session, fed by the link's inbound
/// thread through the bounded frame channel.
///
/// Locks the pending slot only long enough to validate and claim a match;
/// the caller-visible wakeup happens after the lock is released.
fn dispatch_loop(frames: Receiver<InboundFrame>, pending: PendingSlot, reply_tag: u16) {
    for frame in frames.iter() {
        if frame.len() < 2 {
            continue;
        }
        let tag = u16::from_be_bytes([frame[0], frame[1]]);
        if tag != reply_tag {
            log::trace!("Ignoring frame with tag 0x{:04X}", tag);
            continue;
        }
        let mut body = &frame[2..];
        let reply = match Reply::from_reader(&mut body) {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Discarding undecodable reply: {}", e);
                continue;
            }
        };
        let mut slot = pending.lock().unwrap();
        match slot.as_ref() {
            Some(waiter) if waiter.sequence == reply.sequence => {
                let waiter = slot.take().unwrap();
                drop(slot);
                // The waiter may have timed out between the sequence check
                // and this send; that is fine, the reply is then dropped.
                let _ = waiter.reply.send(reply);
            }
            Some(waiter) => {
                log::debug!(
                    "Ignoring stale reply (sequence {}, expected {})",
                    reply.sequence,
                    waiter.sequence
                );
            }
            None => {
                log::trace!("Ignoring unsolicited reply (sequence {})", reply.sequence);
            }
        }
    }
    // Link closed: drop any leftover waiter so its caller unblocks.
    pending.lock().unwrap().take();
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::sync::MutexGuard;
    use std::sync::mpsc::SyncSender;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(100);

    /// Scriptable in-memory register host, standing in for the remote end
    /// of a link. Commands are answered synchronously from `send`, so a
    /// reply is already queued by the time the caller starts waiting.
    #[derive(Default)]
    struct StubHost {
        regs: HashMap<u32, u32>,
        /// Words carried by the most recent write, in arrival order.
        wrval: Option<Vec<u32>>,
        /// Swallow commands instead of replying.
        silent: bool,
        /// Reply with a non-zero status byte.
        nack: bool,
        /// Offset added to the echoed sequence number.
        sequence_skew: u8,
        /// Drop one word from read replies.
        short_read: bool,
    }

    struct StubLink {
        host: Mutex<StubHost>,
        tags: TagPair,
        inbound: SyncSender<InboundFrame>,
    }

    impl StubLink {
        fn new() -> (StubLink, Receiver<InboundFrame>) {
            let (inbound, frames) = sync_channel(32);
            let link = StubLink {
                host: Mutex::new(StubHost::default()),
                tags: TagPair::default(),
                inbound,
            };
            (link, frames)
        }

        fn host(&self) -> MutexGuard<'_, StubHost> {
            self.host.lock().unwrap()
        }

        /// Push a raw frame into the session, as a misbehaving peer would.
        fn inject(&self, frame: InboundFrame) {
            self.inbound.send(frame).unwrap();
        }

        fn reply_frame(&self, reply: &Reply) -> InboundFrame {
            let mut frame = self.tags.reply().to_be_bytes().to_vec();
            reply.write_to(&mut frame).unwrap();
            frame
        }
    }

    impl Link for StubLink {
        fn send(&self, payload: &[u8]) -> io::Result<()> {
            self.send_blocking(payload)
        }

        fn send_blocking(&self, payload: &[u8]) -> io::Result<()> {
            let tag = u16::from_be_bytes([payload[0], payload[1]]);
            if tag != self.tags.command() {
                return Ok(());
            }
            let mut body = &payload[2..];
            let command = Command::from_reader(&mut body).unwrap();
            let mut host = self.host();

            let mut data = Vec::new();
            match &command {
                Command::Write {
                    increment,
                    addr,
                    data: words,
                    ..
                } => {
                    host.wrval = Some(words.clone());
                    for (i, word) in words.iter().enumerate() {
                        let target = addr + if *increment { i as u32 } else { 0 };
                        host.regs.insert(target, *word);
                    }
                }
                Command::Read {
                    increment,
                    addr,
                    count,
                    ..
                } => {
                    for i in 0..*count as u32 {
                        let target = addr + if *increment { i } else { 0 };
                        data.push(host.regs.get(&target).copied().unwrap_or(0));
                    }
                    if host.short_read {
                        data.pop();
                    }
                }
            }
            if host.silent {
                return Ok(());
            }
            let reply = Reply {
                opcode: command.opcode(),
                word_count: command.word_count() as u8,
                sequence: command.sequence().wrapping_add(host.sequence_skew),
                addr: command.addr(),
                data,
                status: if host.nack { 1 } else { 0 },
            };
            let _ = self.inbound.send(self.reply_frame(&reply));
            Ok(())
        }

        fn close(&self) {}
    }

    fn blocking_bus() -> Arc<RegisterBus<StubLink>> {
        let (link, frames) = StubLink::new();
        let bus = RegisterBus::new(link, frames, TagPair::default(), DeliveryMode::Blocking);
        Arc::new(bus)
    }

    #[test]
    fn write_then_read_back() {
        let bus = blocking_bus();
        bus.write(0, 0, 1, TIMEOUT).unwrap();
        assert_eq!(bus.read(0, 0, TIMEOUT).unwrap(), 1);
        assert_eq!(bus.link().host().wrval, Some(vec![1]));
    }

    #[test]
    fn multi_write_preserves_order() {
        let bus = blocking_bus();
        bus.write_multi(1, 1, &[1, 2, 3, 4], true, TIMEOUT).unwrap();
        assert_eq!(bus.link().host().wrval, Some(vec![1, 2, 3, 4]));
        assert_eq!(
            bus.read_multi(1, 1, 4, true, TIMEOUT).unwrap(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn repeat_write_targets_one_register() {
        let bus = blocking_bus();
        bus.write_multi(2, 7, &[10, 20, 30], false, TIMEOUT).unwrap();
        // Last word wins on a non-incrementing write.
        assert_eq!(bus.read(2, 7, TIMEOUT).unwrap(), 30);
    }

    #[test]
    fn timeout_returns_failure_and_session_survives() {
        let bus = blocking_bus();
        bus.link().host().silent = true;
        let start = Instant::now();
        assert!(matches!(bus.read(0, 0, TIMEOUT), Err(BusError::Timeout)));
        let elapsed = start.elapsed();
        assert!(elapsed >= TIMEOUT);
        assert!(elapsed < TIMEOUT * 4);
        // The session must remain usable for the next exchange.
        bus.link().host().silent = false;
        bus.write(0, 3, 99, TIMEOUT).unwrap();
        assert_eq!(bus.read(0, 3, TIMEOUT).unwrap(), 99);
    }

    #[test]
    fn stale_sequence_never_wakes_the_waiter() {
        let bus = blocking_bus();
        bus.link().host().sequence_skew = 1;
        assert!(matches!(bus.read(0, 0, TIMEOUT), Err(BusError::Timeout)));
        bus.link().host().sequence_skew = 0;
        assert_eq!(bus.read(0, 0, TIMEOUT).unwrap(), 0);
    }

    #[test]
    fn injected_stale_reply_is_ignored() {
        let bus = blocking_bus();
        // A delayed duplicate from an exchange long gone.
        let stale = Reply {
            opcode: Opcode::ReadRepeat,
            word_count: 1,
            sequence: 200,
            addr: 0,
            data: vec![0xBAD],
            status: 0,
        };
        let frame = bus.link().reply_frame(&stale);
        bus.link().inject(frame);
        bus.write(0, 5, 7, TIMEOUT).unwrap();
        assert_eq!(bus.read(0, 5, TIMEOUT).unwrap(), 7);
    }

    #[test]
    fn nack_is_distinct_from_timeout() {
        let bus = blocking_bus();
        bus.link().host().nack = true;
        assert!(matches!(bus.write(0, 0, 1, TIMEOUT), Err(BusError::Nack)));
        assert!(matches!(bus.read(0, 0, TIMEOUT), Err(BusError::Nack)));
    }

    #[test]
    fn short_reply_reports_malformed() {
        let bus = blocking_bus();
        bus.link().host().short_read = true;
        assert!(matches!(
            bus.read_multi(0, 0, 4, true, TIMEOUT),
            Err(BusError::Malformed)
        ));
        // Recovery after the host behaves again.
        bus.link().host().short_read = false;
        assert_eq!(bus.read_multi(0, 0, 4, true, TIMEOUT).unwrap().len(), 4);
    }

    #[test]
    fn rejects_invalid_requests_locally() {
        let bus = blocking_bus();
        assert!(matches!(
            bus.read_multi(0, 0, 9, true, TIMEOUT),
            Err(BusError::BadWordCount { got: 9 })
        ));
        assert!(matches!(
            bus.write_multi(0, 0, &[], false, TIMEOUT),
            Err(BusError::BadWordCount { got: 0 })
        ));
        assert!(matches!(
            bus.write(0, 1024, 1, TIMEOUT),
            Err(BusError::BadRegister(1024))
        ));
        assert!(bus.link().host().wrval.is_none());
    }

    #[test]
    fn fast_write_returns_immediately() {
        let (link, frames) = StubLink::new();
        link.host().silent = true;
        let bus = RegisterBus::new(link, frames, TagPair::default(), DeliveryMode::FireAndForget);
        let start = Instant::now();
        bus.write(0, 0, 1, TIMEOUT).unwrap();
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(bus.link().host().wrval, Some(vec![1]));
    }

    #[test]
    fn fast_write_discards_replies_between_transactions() {
        let (link, frames) = StubLink::new();
        let bus = RegisterBus::new(link, frames, TagPair::default(), DeliveryMode::FireAndForget);
        // Host replies to every command; all replies must be discarded
        // without disturbing later exchanges.
        bus.write(0, 0, 1, TIMEOUT).unwrap();
        bus.write(0, 0, 2, TIMEOUT).unwrap();
        assert_eq!(bus.link().host().wrval, Some(vec![2]));
        // Reads on a fire-and-forget session cannot return data.
        assert!(matches!(bus.read(0, 0, TIMEOUT), Err(BusError::WriteOnly)));
    }

    #[test]
    fn concurrent_callers_each_see_their_own_reply() {
        let bus = blocking_bus();
        let mut workers = Vec::new();
        for i in 0..8u32 {
            let bus = bus.clone();
            workers.push(thread::spawn(move || {
                for round in 0..16u32 {
                    let value = i * 1000 + round;
                    bus.write(1, i as u16, value, TIMEOUT).unwrap();
                    assert_eq!(bus.read(1, i as u16, TIMEOUT).unwrap(), value);
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
    }
}
