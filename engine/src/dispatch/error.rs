use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("the marker dispatcher has been shut down")]
    Closed,
    #[error("failed to spawn the {name} thread")]
    SpawnThread {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build the marker worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
