//! The "caller-supplied worker executor" from §5/§6.
//!
//! User handlers may run inline on the connection's event loop
//! (discouraged, §5) or be submitted to an [`Executor`]. This is the
//! engine's abstraction over "a thread/task pool the embedder already
//! has lying around" — concretely, it defaults to `tokio::spawn`, the
//! same default the teacher's doc comments assume ("submit the
//! `Connection` instance to an executor").

use std::future::Future;
use std::pin::Pin;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A worker pool the server dispatches user handlers onto (§4.5 step 2,
/// §6 `executor`).
///
/// `try_spawn` returns `Err(fut)` to hand the future back when the pool
/// is saturated, so the caller can fall back to a rejected-handler or a
/// synthesized 503 (§4.5 step 2) without losing the work that was about
/// to run.
pub trait Executor: Send + Sync {
    fn try_spawn(&self, fut: BoxFuture) -> Result<(), BoxFuture>;
}

/// The default executor: spawns onto the ambient Tokio runtime and never
/// reports saturation (unbounded).
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn try_spawn(&self, fut: BoxFuture) -> Result<(), BoxFuture> {
        tokio::spawn(fut);
        Ok(())
    }
}

/// An executor with a fixed number of in-flight task permits, useful for
/// exercising the §4.5 "executor rejects (saturation)" path in tests and
/// for embedders who want bounded fan-out.
pub struct BoundedExecutor {
    semaphore: std::sync::Arc<tokio::sync::Semaphore>,
}

impl BoundedExecutor {
    pub fn new(permits: usize) -> BoundedExecutor {
        BoundedExecutor {
            semaphore: std::sync::Arc::new(tokio::sync::Semaphore::new(permits)),
        }
    }
}

impl Executor for BoundedExecutor {
    fn try_spawn(&self, fut: BoxFuture) -> Result<(), BoxFuture> {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(fut),
        };
        tokio::spawn(async move {
            fut.await;
            drop(permit);
        });
        Ok(())
    }
}
