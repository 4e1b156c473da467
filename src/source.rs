use queues::{IsQueue, Queue};

use crate::phase::{Phase, PhaseHandle};
use crate::tb_obj::TbObj;
use crate::transaction::Transaction;

/// What a source hands to a driver on a clock edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    Item(Transaction),
    /// Nothing to send this cycle.
    Idle,
    /// Nothing to send ever again.
    Exhausted,
}

pub trait TransactionSource {
    fn next(&mut self) -> Next;
}

impl TransactionSource for Box<dyn TransactionSource> {
    fn next(&mut self) -> Next {
        (**self).next()
    }
}

pub struct FnSource<F>(F);

impl<F: FnMut() -> Option<Transaction>> TransactionSource for FnSource<F> {
    fn next(&mut self) -> Next {
        match (self.0)() {
            Some(t) => Next::Item(t),
            None => Next::Idle,
        }
    }
}

/// Source that calls `f` every cycle, `None` means idle. Never runs out.
pub fn from_fn<F: FnMut() -> Option<Transaction>>(f: F) -> FnSource<F> {
    FnSource(f)
}

pub struct IterSource<I>(I);

impl<I: Iterator<Item = Option<Transaction>>> TransactionSource for IterSource<I> {
    fn next(&mut self) -> Next {
        match self.0.next() {
            Some(Some(t)) => Next::Item(t),
            Some(None) => Next::Idle,
            None => Next::Exhausted,
        }
    }
}

/// Finite source, `None` items idle for one cycle.
pub fn from_iter<I>(iter: I) -> IterSource<I::IntoIter>
where
    I: IntoIterator<Item = Option<Transaction>>,
{
    IterSource(iter.into_iter())
}

struct QueueInner {
    queue: Queue<Transaction>,
    closed: bool,
}

/// FIFO shared between test code and a driver.
#[derive(Clone)]
pub struct QueueSource(TbObj<QueueInner>);

impl Default for QueueSource {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueSource {
    pub fn new() -> Self {
        QueueSource(TbObj::new(QueueInner {
            queue: Queue::new(),
            closed: false,
        }))
    }

    pub fn push(&self, t: Transaction) {
        self.0.with_mut(|inner| {
            let _ = inner.queue.add(t);
        });
    }

    /// Once closed and empty the source is exhausted.
    pub fn close(&self) {
        self.0.with_mut(|inner| inner.closed = true);
    }

    pub fn len(&self) -> usize {
        self.0.get().queue.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransactionSource for QueueSource {
    fn next(&mut self) -> Next {
        self.0.with_mut(|inner| match inner.queue.remove() {
            Ok(t) => Next::Item(t),
            Err(_) if inner.closed => Next::Exhausted,
            Err(_) => Next::Idle,
        })
    }
}

/// Idles until the run reaches `Phase::Sim`, is exhausted once it left it.
pub struct PhaseGated<S> {
    phase: PhaseHandle,
    inner: S,
}

impl<S: TransactionSource> PhaseGated<S> {
    pub fn new(phase: PhaseHandle, inner: S) -> Self {
        PhaseGated { phase, inner }
    }
}

impl<S: TransactionSource> TransactionSource for PhaseGated<S> {
    fn next(&mut self) -> Next {
        match self.phase.get() {
            Phase::Setup => Next::Idle,
            Phase::Sim => self.inner.next(),
            Phase::Drain | Phase::Done => Next::Exhausted,
        }
    }
}
