use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::OnceCell;

use crate::{InjectError, Instance, ModuleId, Token};

/// Identity of one provider slot of one module.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct WrapperKey {
    pub module: ModuleId,
    pub token: Token,
    pub slot: usize,
}

/// Lifecycle of an [`InstanceWrapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    Unresolved,
    Resolving,
    Resolved,
    Failed,
}

/// Holder of a lazily produced instance.
///
/// Concurrent callers of [`get_or_try_init`](Self::get_or_try_init) share a
/// single construction: the first caller runs it and the rest wait for its
/// outcome. A failed construction is terminal and every later call returns
/// the recorded error.
#[derive(Default)]
pub struct InstanceWrapper {
    cell: OnceCell<Instance>,
    resolving: AtomicBool,
    failure: OnceLock<InjectError>,
}

impl InstanceWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WrapperState {
        if self.cell.initialized() {
            WrapperState::Resolved
        } else if self.failure.get().is_some() {
            WrapperState::Failed
        } else if self.resolving.load(Ordering::Acquire) {
            WrapperState::Resolving
        } else {
            WrapperState::Unresolved
        }
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.cell.get()
    }

    pub fn failure(&self) -> Option<&InjectError> {
        self.failure.get()
    }

    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<Instance, InjectError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Instance, InjectError>>,
    {
        if let Some(err) = self.failure.get() {
            return Err(err.clone());
        }
        let instance = self
            .cell
            .get_or_try_init(|| async move {
                // Waiters that lost the race to a failed construction land here.
                if let Some(err) = self.failure.get() {
                    return Err(err.clone());
                }
                self.resolving.store(true, Ordering::Release);
                let result = init().await;
                self.resolving.store(false, Ordering::Release);
                if let Err(err) = &result {
                    let _ = self.failure.set(err.clone());
                }
                result
            })
            .await?;
        Ok(instance.clone())
    }
}

#[derive(Default)]
struct InFlightState {
    // Wrapper key -> id of the resolution running its construction.
    owners: HashMap<WrapperKey, u64>,
    // Resolution id -> the wrapper it is blocked on and its frames at that time.
    waits: HashMap<u64, Waiting>,
}

struct Waiting {
    target: WrapperKey,
    frames: Vec<WrapperKey>,
}

/// Wait-for graph of constructions shared by concurrent resolutions.
///
/// A resolution that is about to block on a wrapper built by another
/// resolution first follows the chain of owners and waiters. Reaching itself
/// means the two resolutions wait on each other, which is reported as a
/// circular dependency instead of blocking forever.
#[derive(Default)]
pub(crate) struct InFlight {
    state: Mutex<InFlightState>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, InFlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records that resolution `waiter`, currently at `frames`, blocks on
    /// `target`. The last frame is `target` itself.
    pub fn wait(
        &self,
        waiter: u64,
        frames: &[WrapperKey],
        target: &WrapperKey,
    ) -> Result<(), InjectError> {
        let mut state = self.lock();
        let mut path: Vec<(&WrapperKey, &Waiting)> = Vec::new();
        let mut seen = HashSet::new();
        let mut current = target;
        while let Some(&owner) = state.owners.get(current) {
            if owner == waiter {
                return Err(InjectError::CircularDependency {
                    cycle: cycle_tokens(frames, current, &path),
                });
            }
            if !seen.insert(owner) {
                break;
            }
            let Some(waiting) = state.waits.get(&owner) else {
                break;
            };
            path.push((current, waiting));
            current = &waiting.target;
        }
        state.waits.insert(
            waiter,
            Waiting {
                target: target.clone(),
                frames: frames.to_vec(),
            },
        );
        Ok(())
    }

    /// Marks `owner` as the resolution constructing `key`.
    pub fn claim(&self, owner: u64, key: &WrapperKey) {
        let mut state = self.lock();
        state.waits.remove(&owner);
        state.owners.insert(key.clone(), owner);
    }

    pub fn release(&self, key: &WrapperKey) {
        self.lock().owners.remove(key);
    }

    pub fn resume(&self, waiter: u64) {
        self.lock().waits.remove(&waiter);
    }
}

// Stitches the frames of every resolution on the wait chain into one cycle,
// starting and ending at `start`, the wrapper owned by the detecting
// resolution.
fn cycle_tokens(
    frames: &[WrapperKey],
    start: &WrapperKey,
    path: &[(&WrapperKey, &Waiting)],
) -> Vec<Token> {
    let from = frames.iter().position(|v| v == start).unwrap_or(0);
    let mut cycle: Vec<Token> = frames[from..].iter().map(|v| v.token.clone()).collect();
    for (owned, waiting) in path {
        let from = waiting
            .frames
            .iter()
            .position(|v| v == *owned)
            .map_or(0, |v| v + 1);
        cycle.extend(waiting.frames[from..].iter().map(|v| v.token.clone()));
    }
    cycle
}
