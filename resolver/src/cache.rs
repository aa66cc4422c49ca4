use std::{future::Future, sync::Arc};

use dashmap::DashMap;
use tokio::sync::OnceCell;
use trove_descriptor::{Coordinate, Descriptor};

use crate::Error;

/// In-memory descriptor cache for a single run.
///
/// Concurrent lookups of the same coordinate share one in-flight resolution. Failures are not
/// cached, so a later lookup retries. Nothing is persisted.
#[derive(Clone, Debug, Default)]
pub struct Cache {
    inner: Arc<DashMap<Coordinate, Arc<OnceCell<Arc<Descriptor>>>>>,
}

impl Cache {
    pub fn get(&self, coordinate: &Coordinate) -> Option<Arc<Descriptor>> {
        self.inner.get(coordinate)?.value().get().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn get_or_resolve<F, Fut>(
        &self,
        coordinate: &Coordinate,
        resolve: F,
    ) -> Result<Arc<Descriptor>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Descriptor, Error>>,
    {
        // Clone the cell out so the shard lock is not held across the await.
        let cell = self
            .inner
            .entry(coordinate.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let descriptor = cell
            .get_or_try_init(|| async { resolve().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(descriptor))
    }
}
