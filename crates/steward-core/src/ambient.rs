//! Ambient execution state.
//!
//! 実行中のコードから暗黙に参照できる「現在のタスク」「現在のコンテキスト」
//! 「現在の entitlement」と割り込みフラグを保持します。
//!
//! The registers live in a tokio task-local frame. A frame is entered with
//! [`scope`] (async) or [`sync_scope`] (sync); when the scope ends, for any
//! reason, the enclosing frame is visible again. That is what makes inline
//! execution push/pop-symmetric without explicit restore code.
//!
//! Outside of any frame every register reads as absent.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::ExecutionContext;
use crate::domain::{EntitlementContext, JobError};
use crate::task::TaskRef;

tokio::task_local! {
    static FRAME: RefCell<Frame>;
}

#[derive(Clone, Default)]
pub(crate) struct Frame {
    task: Option<TaskRef>,
    context: Option<ExecutionContext>,
    entitlement: Option<EntitlementContext>,
    /// Shared by nested inline frames, so an interrupt raised inside inline
    /// work is seen by the enclosing run and vice versa.
    interrupt: Arc<AtomicBool>,
}

impl Frame {
    /// Root frame for a task executing on the pool.
    ///
    /// The interrupt flag is the task's own cancellation flag.
    pub(crate) fn for_pool_task(task: &TaskRef) -> Self {
        Self {
            task: Some(Arc::clone(task)),
            context: None,
            entitlement: task.tags().entitlement().cloned(),
            interrupt: task.core().cancel_flag(),
        }
    }

    /// Frame for inline execution of `task` in `context`, nested in whatever
    /// frame is current.
    pub(crate) fn nested(task: TaskRef, context: ExecutionContext) -> Self {
        let outer = current_frame().unwrap_or_default();
        Self {
            task: Some(task),
            context: Some(context),
            entitlement: outer.entitlement,
            interrupt: outer.interrupt,
        }
    }
}

fn current_frame() -> Option<Frame> {
    FRAME.try_with(|f| f.borrow().clone()).ok()
}

fn read<R>(f: impl FnOnce(&Frame) -> R) -> Option<R> {
    FRAME.try_with(|cell| f(&cell.borrow())).ok()
}

pub fn current_task() -> Option<TaskRef> {
    read(|f| f.task.clone()).flatten()
}

pub fn current_context() -> Option<ExecutionContext> {
    read(|f| f.context.clone()).flatten()
}

pub fn current_entitlement() -> Option<EntitlementContext> {
    read(|f| f.entitlement.clone()).flatten()
}

pub fn is_interrupted() -> bool {
    read(|f| f.interrupt.load(Ordering::SeqCst)).unwrap_or(false)
}

/// Raise the interrupt flag of the current frame. No-op outside a frame.
pub fn interrupt() {
    let _ = read(|f| f.interrupt.store(true, Ordering::SeqCst));
}

/// Clear the interrupt flag, returning whether it was set.
pub(crate) fn take_interrupt() -> bool {
    read(|f| f.interrupt.swap(false, Ordering::SeqCst)).unwrap_or(false)
}

/// Cooperative cancellation point for long-running jobs.
pub fn checkpoint() -> Result<(), JobError> {
    if is_interrupted() {
        Err(JobError::Interrupted)
    } else {
        Ok(())
    }
}

/// Set or clear the current context register of the current frame.
pub(crate) fn set_context(context: Option<ExecutionContext>) {
    let _ = FRAME.try_with(|cell| cell.borrow_mut().context = context);
}

pub(crate) async fn scope<F: Future>(frame: Frame, fut: F) -> F::Output {
    FRAME.scope(RefCell::new(frame), fut).await
}

pub(crate) fn sync_scope<R>(frame: Frame, f: impl FnOnce() -> R) -> R {
    FRAME.sync_scope(RefCell::new(frame), f)
}

/// Run `fut` with `entitlement` as the current entitlement.
///
/// Other registers are inherited from the enclosing frame.
pub async fn with_entitlement<F: Future>(entitlement: EntitlementContext, fut: F) -> F::Output {
    let mut frame = current_frame().unwrap_or_default();
    frame.entitlement = Some(entitlement);
    scope(frame, fut).await
}
