pub mod batch;
pub mod fetcher;

pub use batch::ConcurrentFetcher;
pub use fetcher::SessionFetcher;
