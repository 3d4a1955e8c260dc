// src/storage/engine.rs

use log::debug;
use tokio_util::sync::CancellationToken;

use super::{Capacity, CapacityBackend};
use crate::error::{CapacityError, CapacityResult};

/// Upper bound of measure-then-evict rounds in one call. Reports may be
/// stale against concurrent writers, so one pass is not always enough.
pub const ALLOWED_ITERATIONS: usize = 5;

/// Remaining deficit after `freed` bytes were reclaimed. Never wraps.
pub fn deduct(remaining: Capacity, freed: Capacity) -> Capacity {
    if freed >= remaining {
        0
    } else {
        remaining - freed
    }
}

/// Frees space on `backend` until at least `target` bytes are available.
///
/// Evicts strictly in the order the backend streams its removables and stops
/// at the first point the deficit is closed. A failed removal aborts the
/// whole call; the next trigger starts over from a fresh listing.
pub async fn ensure_capacity<B>(
    cancel: &CancellationToken,
    target: Capacity,
    backend: &B,
) -> CapacityResult<()>
where
    B: CapacityBackend + ?Sized,
{
    let _lease = match backend.eviction_lease() {
        Some(lease) => Some(tokio::select! {
            guard = lease.lock() => guard,
            _ = cancel.cancelled() => return Err(cancelled(backend)),
        }),
        None => None,
    };

    for iteration in 0..ALLOWED_ITERATIONS {
        let available = tokio::select! {
            res = backend.available_capacity() => {
                res.map_err(|e| CapacityError::measure(backend.name(), e))?
            }
            _ = cancel.cancelled() => return Err(cancelled(backend)),
        };

        if available >= target {
            return Ok(());
        }

        let deficit = target - available;
        debug!(
            "[capacity] {} short by {} bytes (round {}/{})",
            backend.name(),
            deficit,
            iteration + 1,
            ALLOWED_ITERATIONS
        );

        evict(cancel, deficit, backend).await?;
    }

    Err(CapacityError::Exhausted {
        backend: backend.name(),
        iterations: ALLOWED_ITERATIONS,
    })
}

/// One eviction pass. The listing runs under a child token that is
/// cancelled the moment the deficit reaches zero.
async fn evict<B>(cancel: &CancellationToken, deficit: Capacity, backend: &B) -> CapacityResult<()>
where
    B: CapacityBackend + ?Sized,
{
    let pass = cancel.child_token();
    let _stop_listing = pass.clone().drop_guard();

    let mut removables = tokio::select! {
        res = backend.removables(pass.clone()) => {
            res.map_err(|e| CapacityError::listing(backend.name(), e))?
        }
        _ = cancel.cancelled() => return Err(cancelled(backend)),
    };

    let mut remaining = deficit;
    loop {
        let removal = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(backend)),
            next = removables.recv() => match next {
                Some(removal) => removal,
                None => return Ok(()),
            },
        };

        let item = removal.label().to_string();
        let freed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(backend)),
            res = removal.remove() => {
                res.map_err(|e| CapacityError::removal(backend.name(), item.as_str(), e))?
            }
        };

        debug!("[capacity] {} freed {} bytes from {}", backend.name(), freed, item);

        remaining = deduct(remaining, freed);
        if remaining == 0 {
            pass.cancel();
            return Ok(());
        }
    }
}

fn cancelled<B: CapacityBackend + ?Sized>(backend: &B) -> CapacityError {
    CapacityError::Cancelled {
        backend: backend.name(),
    }
}
