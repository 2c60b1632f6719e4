//! The single propagation entry point.
//!
//! Every value handed from one node to another goes through [`deliver`].
//! Propagation is synchronous and recursive: `deliver` calls the target's
//! `accept`, which may emit, which delivers again. There is no queue and no
//! scheduler.
//!
//! Recursion is bounded by [`PropagationLimits::max_depth`]. The counter is
//! per thread, so independent networks on different threads never interfere.
//! Exceeding the limit unwinds the whole chain with
//! [`CoreError::PropagationDepthExceeded`]. Outputs already written along the
//! way are kept: every one of them is a legitimate partial join.
//!
//! Depth grows by one per hop, so an acyclic chain longer than the limit
//! fails under the default too. Wrap such writes in [`with_limits`] with a
//! larger `max_depth`, and run them on a thread whose stack can hold that
//! many nested deliveries.

use std::cell::Cell as StdCell;

use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::Node;
use crate::value::LatticeValue;

/// Limits for the synchronous propagation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationLimits {
    /// Maximum number of nested deliveries before propagation is aborted.
    /// Default: 256, which fits the 2 MiB stack of a spawned thread.
    pub max_depth: usize,
}

impl Default for PropagationLimits {
    fn default() -> Self {
        PropagationLimits { max_depth: 256 }
    }
}

thread_local! {
    static DEPTH: StdCell<usize> = const { StdCell::new(0) };
    static LIMITS: StdCell<PropagationLimits> = StdCell::new(PropagationLimits::default());
}

/// Runs `f` with `limits` installed for the current thread, restoring the
/// previous limits afterwards.
pub fn with_limits<R>(limits: PropagationLimits, f: impl FnOnce() -> R) -> R {
    let previous = LIMITS.with(|l| l.replace(limits));
    let _restore = RestoreLimits(previous);
    f()
}

/// Returns the limits currently installed on this thread.
pub fn current_limits() -> PropagationLimits {
    LIMITS.with(|l| l.get())
}

/// Hands `value` to `target`, tagged with the sending node and the input name
/// recorded on the edge.
pub fn deliver(
    target: &dyn Node,
    value: LatticeValue,
    source: Option<NodeId>,
    input: Option<&str>,
) -> Result<(), CoreError> {
    let _guard = DepthGuard::enter(target.id())?;
    tracing::trace!(
        target_node = %target.id(),
        source = ?source,
        input = ?input,
        %value,
        "deliver"
    );
    target.accept(value, source, input)
}

struct DepthGuard;

impl DepthGuard {
    fn enter(node: NodeId) -> Result<Self, CoreError> {
        let limit = current_limits().max_depth;
        DEPTH.with(|d| {
            let depth = d.get();
            if depth >= limit {
                return Err(CoreError::PropagationDepthExceeded { node, limit });
            }
            d.set(depth + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

struct RestoreLimits(PropagationLimits);

impl Drop for RestoreLimits {
    fn drop(&mut self) {
        LIMITS.with(|l| l.set(self.0));
    }
}
