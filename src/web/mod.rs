pub mod extract;
pub mod fetch;
pub mod search;

pub use fetch::{FetchError, FetchedPage, PageFetcher, PageSource};
pub use search::{BraveSearchClient, SearchBackend, SearchError, SearchResult};
