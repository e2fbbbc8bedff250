//! `table.sort`, a library function that calls back into Lua.
//!
//! The comparator may suspend (yield, pause or wait on an operation). The
//! sort is therefore driven as a heapsort state machine that asks for one
//! comparison at a time:
//!
//! ```text
//! next_comparison() ──► Some((a, b))   call comp(items[a], items[b])
//!        ▲                              │ returns    suspends
//!        └──── answer(less) ◄───────────┘            │
//!                                           capture SortState, unwind
//! ```
//!
//! On suspension the machine, the list and the comparator's own state are
//! captured into the chain. Resuming feeds the comparator's eventual result
//! back in as the pending answer and carries on. Elements are written back
//! to the list only once the sort completes.

use tracing::trace;

use tidal_runtime::arith;
use tidal_runtime::dispatch;
use tidal_runtime::{
    CallResult, CallableId, ExecutionContext, FunctionRef, LuaError, LuaFunction, Outcome,
    ProtocolViolation, ResumeState, Suspension, TableRef, Value,
};

use crate::args::{check_table, opt_function};

/// Largest list `sort` accepts.
const MAX_SORT: i64 = i32::MAX as i64;

/// Which comparison a sift step is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Await {
    /// `less(child, child + 1)`: pick the larger child.
    Sibling,
    /// `less(root, child)`: whether the root sinks.
    Parent,
}

#[derive(Debug)]
struct Sift {
    root: usize,
    end: usize,
    child: usize,
    awaiting: Option<Await>,
}

impl Sift {
    fn new(root: usize, end: usize) -> Self {
        Self {
            root,
            end,
            child: 0,
            awaiting: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Heapify, sifting down from `next - 1` toward the front.
    Build { next: usize },
    /// Move the largest element to `end - 1`, then restore the heap.
    Extract { end: usize },
    Done,
}

/// A heapsort that yields its comparisons instead of making them.
#[derive(Debug)]
pub(crate) struct HeapSort {
    items: Vec<Value>,
    phase: Phase,
    sift: Option<Sift>,
}

impl HeapSort {
    pub(crate) fn new(items: Vec<Value>) -> Self {
        let next = items.len() / 2;
        Self {
            items,
            phase: Phase::Build { next },
            sift: None,
        }
    }

    pub(crate) fn item(&self, i: usize) -> &Value {
        &self.items[i]
    }

    /// The pair to compare as `less(items[a], items[b])`, or `None` once the
    /// items are sorted. Repeats the same pair until it is answered.
    pub(crate) fn next_comparison(&mut self) -> Option<(usize, usize)> {
        loop {
            if let Some(sift) = &mut self.sift {
                match sift.awaiting {
                    Some(Await::Sibling) => return Some((sift.child, sift.child + 1)),
                    Some(Await::Parent) => return Some((sift.root, sift.child)),
                    None => {}
                }
                let child = 2 * sift.root + 1;
                if child < sift.end {
                    sift.child = child;
                    if child + 1 < sift.end {
                        sift.awaiting = Some(Await::Sibling);
                        return Some((child, child + 1));
                    }
                    sift.awaiting = Some(Await::Parent);
                    return Some((sift.root, child));
                }
                self.sift = None;
            }

            let len = self.items.len();
            match self.phase {
                Phase::Build { next: 0 } => self.phase = Phase::Extract { end: len },
                Phase::Build { next } => {
                    self.phase = Phase::Build { next: next - 1 };
                    self.sift = Some(Sift::new(next - 1, len));
                }
                Phase::Extract { end } if end > 1 => {
                    let end = end - 1;
                    self.items.swap(0, end);
                    self.phase = Phase::Extract { end };
                    self.sift = Some(Sift::new(0, end));
                }
                Phase::Extract { .. } | Phase::Done => {
                    self.phase = Phase::Done;
                    return None;
                }
            }
        }
    }

    /// Feed the result of the comparison last returned.
    pub(crate) fn answer(&mut self, less: bool) {
        let Some(sift) = &mut self.sift else { return };
        let finished = match sift.awaiting.take() {
            Some(Await::Sibling) => {
                if less {
                    sift.child += 1;
                }
                sift.awaiting = Some(Await::Parent);
                false
            }
            Some(Await::Parent) if less => {
                self.items.swap(sift.root, sift.child);
                sift.root = sift.child;
                false
            }
            Some(Await::Parent) => true,
            None => false,
        };
        if finished {
            self.sift = None;
        }
    }

    pub(crate) fn into_items(self) -> Vec<Value> {
        self.items
    }
}

/// Saved across a suspended comparator call.
struct SortState {
    list: TableRef,
    comparator: FunctionRef,
    heap: HeapSort,
    /// The callable that suspended, after tail calls were resolved.
    callee: FunctionRef,
    callee_state: Option<ResumeState>,
}

/// `table.sort(list [, comp])`.
pub struct Sort {
    id: CallableId,
}

impl Sort {
    pub fn new() -> Self {
        Self {
            id: CallableId::fresh(),
        }
    }

    pub fn into_ref(self) -> FunctionRef {
        std::sync::Arc::new(self)
    }

    fn run(
        &self,
        ctx: &mut ExecutionContext,
        list: TableRef,
        comparator: Option<FunctionRef>,
        mut heap: HeapSort,
    ) -> CallResult {
        while let Some((a, b)) = heap.next_comparison() {
            let less = match comparator.clone() {
                None => match arith::compare(heap.item(a), heap.item(b)) {
                    Ok(order) => order == Some(std::cmp::Ordering::Less),
                    Err(err) => return Ok(Outcome::Fail(err)),
                },
                Some(comp) => {
                    let mut callee = comp.clone();
                    let args = vec![heap.item(a).clone(), heap.item(b).clone()];
                    match dispatch::call(ctx, &mut callee, args)? {
                        Outcome::Return => first_truthy(ctx.take_returns()),
                        Outcome::Fail(err) => return Ok(Outcome::Fail(err)),
                        Outcome::Suspend(s) => {
                            return Ok(Outcome::Suspend(self.capture(s, list, comp, heap, callee)))
                        }
                    }
                }
            };
            heap.answer(less);
        }

        for (i, value) in heap.into_items().into_iter().enumerate() {
            if let Err(err) = list.set(Value::Integer(i as i64 + 1), value) {
                return Ok(Outcome::Fail(err));
            }
        }
        ctx.set_returns(Vec::new());
        Ok(Outcome::Return)
    }

    fn capture(
        &self,
        suspension: Suspension,
        list: TableRef,
        comparator: FunctionRef,
        heap: HeapSort,
        callee: FunctionRef,
    ) -> Suspension {
        trace!(callee = callee.name(), "comparator suspended mid-sort");
        suspension.capture(|callee_state| {
            ResumeState::new(
                self.id,
                SortState {
                    list,
                    comparator,
                    heap,
                    callee,
                    callee_state,
                },
            )
        })
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::new()
    }
}

fn first_truthy(values: Vec<Value>) -> bool {
    values.first().map_or(false, Value::is_truthy)
}

impl LuaFunction for Sort {
    fn name(&self) -> &str {
        "table.sort"
    }

    fn id(&self) -> CallableId {
        self.id
    }

    fn invoke(&self, ctx: &mut ExecutionContext, args: Vec<Value>) -> CallResult {
        let checked = check_table(&args, 0, "sort").and_then(|list| {
            let comparator = opt_function(&args, 1, "sort")?;
            let len = list.len();
            if len >= MAX_SORT {
                return Err(LuaError::new("bad argument #1 to 'sort' (array too big)"));
            }
            Ok((list, comparator, len))
        });
        let (list, comparator, len) = match checked {
            Ok(checked) => checked,
            Err(err) => return Ok(Outcome::Fail(err)),
        };
        let items = (1..=len).map(|i| list.get(&Value::Integer(i))).collect();
        self.run(ctx, list, comparator, HeapSort::new(items))
    }

    fn resume(&self, ctx: &mut ExecutionContext, state: ResumeState) -> CallResult {
        let saved: SortState = state.take(self.id)?;
        let mut callee = saved.callee;
        let outcome = match saved.callee_state {
            Some(inner) => dispatch::resume(ctx, &mut callee, inner)?,
            None => match ctx.take_continuation() {
                Some(Ok(values)) => {
                    ctx.set_returns(values);
                    Outcome::Return
                }
                Some(Err(err)) => Outcome::Fail(err),
                None => return Err(ProtocolViolation::MissingContinuation),
            },
        };

        let mut heap = saved.heap;
        match outcome {
            Outcome::Return => heap.answer(first_truthy(ctx.take_returns())),
            Outcome::Fail(err) => return Ok(Outcome::Fail(err)),
            Outcome::Suspend(s) => {
                return Ok(Outcome::Suspend(self.capture(
                    s,
                    saved.list,
                    saved.comparator,
                    heap,
                    callee,
                )))
            }
        }
        self.run(ctx, saved.list, Some(saved.comparator), heap)
    }
}
