use futures::{
    future::{FutureExt, LocalBoxFuture},
    task::{waker, ArcWake, Context, Poll},
};
use futures_channel::oneshot;
use intmap::IntMap;
use queues::{IsQueue, Queue};
use std::{
    cell::{Cell, RefCell},
    future::Future,
    pin::Pin,
    sync::Arc,
};

use crate::{TbError, TbResult};

// Task futures live in a thread-local table keyed by task id. Wakers only carry
// the id, so they stay Send + Sync while the futures themselves may hold Rc.
thread_local! {
    static READY_QUEUE: RefCell<Queue<u64>> = RefCell::new(Queue::new());
    static TASKS: RefCell<IntMap<TaskSlot>> = RefCell::new(IntMap::new());
    static NEXT_TASK_ID: Cell<u64> = Cell::new(1);
}

struct TaskSlot {
    future: Option<LocalBoxFuture<'static, TbResult>>,
    join_tx: Option<oneshot::Sender<TbResult>>,
    scheduled: bool,
    name: String,
}

pub fn schedule_task(id: u64) {
    let schedule = TASKS.with(|tasks| {
        match tasks.borrow_mut().get_mut(id) {
            Some(slot) if !slot.scheduled => {
                slot.scheduled = true;
                true
            }
            _ => false,
        }
    });
    if schedule {
        READY_QUEUE.with(|q| {
            let _ = q.borrow_mut().add(id);
        });
    }
}

fn next_task() -> Option<u64> {
    READY_QUEUE.with(|q| q.borrow_mut().remove().ok())
}

/// Poll every ready task until the ready queue is empty.
#[inline]
pub fn run_once() {
    while let Some(id) = next_task() {
        process_task(id);
    }
}

#[inline]
fn process_task(id: u64) {
    let fut = TASKS.with(|tasks| {
        tasks.borrow_mut().get_mut(id).and_then(|slot| {
            slot.scheduled = false;
            slot.future.take()
        })
    });
    // cancelled, or already running further up the stack
    let Some(mut fut) = fut else { return };

    let waker = waker(Arc::new(TaskWaker(id)));
    let context = &mut Context::from_waker(&waker);
    match fut.as_mut().poll(context) {
        Poll::Pending => {
            // the slot is gone if the task was cancelled while it ran
            let orphan = TASKS.with(|tasks| match tasks.borrow_mut().get_mut(id) {
                Some(slot) => {
                    slot.future = Some(fut);
                    None
                }
                None => Some(fut),
            });
            drop(orphan);
        }
        Poll::Ready(result) => {
            let slot = TASKS.with(|tasks| tasks.borrow_mut().remove(id));
            drop(fut);
            if let Some(tx) = slot.and_then(|mut s| s.join_tx.take()) {
                let _ = tx.send(result);
            }
        }
    }
}

/// Drop all tasks and forget everything that was scheduled.
pub(crate) fn clear_all_tasks() {
    READY_QUEUE.with(|q| *q.borrow_mut() = Queue::new());
    let slots: Vec<TaskSlot> = TASKS.with(|tasks| {
        tasks.borrow_mut().drain().map(|(_, slot)| slot).collect()
    });
    // dropping futures may wake other tasks, so do it outside of the borrow
    drop(slots);
    READY_QUEUE.with(|q| *q.borrow_mut() = Queue::new());
}

pub(crate) fn task_count() -> usize {
    TASKS.with(|tasks| tasks.borrow().len())
}

/// Names of all tasks that are still alive, in no particular order.
pub(crate) fn task_names() -> Vec<String> {
    TASKS.with(|tasks| tasks.borrow().values().map(|slot| slot.name.clone()).collect())
}

struct TaskWaker(u64);

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(arc_self.0);
    }
}

/// Handle to a task running on the simulation executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Task {
    id: u64,
}

impl Task {
    pub fn fork(future: impl Future<Output = TbResult> + 'static) -> JoinHandle {
        Task::spawn_from_future(future, "forked")
    }
    pub fn spawn_from_future(
        future: impl Future<Output = TbResult> + 'static,
        name: &str,
    ) -> JoinHandle {
        let (task, join_handle) = Task::new(future.boxed_local(), name);
        schedule_task(task.id);
        join_handle
    }
    fn new(fut: LocalBoxFuture<'static, TbResult>, name: &str) -> (Self, JoinHandle) {
        let (tx, rx) = oneshot::channel::<TbResult>();
        let id = NEXT_TASK_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        let slot = TaskSlot {
            future: Some(fut),
            join_tx: Some(tx),
            scheduled: false,
            name: name.to_string(),
        };
        TASKS.with(|tasks| {
            tasks.borrow_mut().insert(id, slot);
        });
        let task = Task { id };
        (
            task,
            JoinHandle {
                awaited_task: Some(task),
                join_rx: rx,
            },
        )
    }
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn is_alive(&self) -> bool {
        TASKS.with(|tasks| tasks.borrow().contains_key(self.id))
    }
    pub fn cancel(&self) {
        // the executor drops the future; a running task is dropped once its poll returns
        let slot = TASKS.with(|tasks| tasks.borrow_mut().remove(self.id));
        drop(slot);
    }
}

pub struct JoinHandle {
    awaited_task: Option<Task>,
    join_rx: oneshot::Receiver<TbResult>,
}

impl JoinHandle {
    pub fn get_task(&self) -> Option<&Task> {
        self.awaited_task.as_ref()
    }
    pub fn cancel(mut self) {
        if let Some(task) = self.awaited_task.take() {
            task.cancel();
        }
    }
}

impl Future for JoinHandle {
    type Output = TbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TbError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
